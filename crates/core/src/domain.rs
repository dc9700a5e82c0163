use serde::{Deserialize, Serialize};

/// One image's persisted label/prediction state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub label: Option<f64>,
    pub predicted_label: Option<f64>,
    /// Epoch seconds of the last write to any field.
    pub updated_at: i64,
}

impl Record {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: None,
            predicted_label: None,
            updated_at: 0,
        }
    }

    /// Presence check only; a label of `0.0` counts as labeled.
    pub fn is_labeled(&self) -> bool {
        self.label.is_some()
    }

    /// The back-fill invariant: a present label is mirrored in `predicted_label`.
    pub fn is_consistent(&self) -> bool {
        match self.label {
            Some(label) => self.predicted_label == Some(label),
            None => true,
        }
    }
}

/// Partial update applied by `RecordStore::upsert`. `None` leaves a field alone.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RecordPatch {
    pub label: Option<f64>,
    pub predicted_label: Option<f64>,
}

impl RecordPatch {
    pub fn label(value: f64) -> Self {
        Self {
            label: Some(value),
            predicted_label: None,
        }
    }

    pub fn predicted(value: f64) -> Self {
        Self {
            label: None,
            predicted_label: Some(value),
        }
    }
}

/// Inclusive range of valid label values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabelRange {
    pub min: f64,
    pub max: f64,
}

impl Default for LabelRange {
    fn default() -> Self {
        Self { min: 0.0, max: 1.0 }
    }
}

impl LabelRange {
    pub fn contains(&self, value: f64) -> bool {
        value.is_finite() && value >= self.min && value <= self.max
    }
}

/// Summary counts for progress reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub total_records: usize,
    pub labeled: usize,
    pub predicted: usize,
    pub unscored: usize,
}
