use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::store::RecordStore;

/// Policy deciding the order in which corpus images are reviewed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Strategy {
    /// Sorted by identifier; ignores the store.
    #[default]
    IdentifierOrder,
    /// Likely-low-quality images first.
    PredictedAscending,
    /// Likely-high-quality images first.
    PredictedDescending,
    /// Images whose prediction is closest to the median first.
    MedianDistance,
}

impl Strategy {
    pub const ALL: [Strategy; 4] = [
        Strategy::IdentifierOrder,
        Strategy::PredictedAscending,
        Strategy::PredictedDescending,
        Strategy::MedianDistance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::IdentifierOrder => "identifier-order",
            Strategy::PredictedAscending => "predicted-ascending",
            Strategy::PredictedDescending => "predicted-descending",
            Strategy::MedianDistance => "median-distance",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "identifier-order" | "identifier" | "id" | "uuid" => Ok(Strategy::IdentifierOrder),
            "predicted-ascending" | "ascending" | "bad-first" => Ok(Strategy::PredictedAscending),
            "predicted-descending" | "descending" | "good-first" => {
                Ok(Strategy::PredictedDescending)
            }
            "median-distance" | "median" | "middle" => Ok(Strategy::MedianDistance),
            other => Err(Error::InvalidConfig(format!(
                "unknown strategy {other:?} (expected one of: identifier-order, predicted-ascending, predicted-descending, median-distance)"
            ))),
        }
    }
}

/// Finite, restartable review sequence computed once per session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewOrder {
    ids: Vec<String>,
}

impl ReviewOrder {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.ids.get(index).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.ids.iter().position(|i| i == id)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.ids
    }
}

impl From<Vec<String>> for ReviewOrder {
    fn from(ids: Vec<String>) -> Self {
        Self { ids }
    }
}

/// Median of all present `predicted_label` values in the store. Mean of the
/// two middle values for an even count.
pub fn median_prediction(store: &RecordStore) -> Option<f64> {
    let mut values: Vec<f64> = store
        .records()
        .iter()
        .filter_map(|r| r.predicted_label)
        .collect();
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

/// Order `corpus_ids` for review. Unscored ids sort after scored ones under
/// every score-based strategy; ties fall back to identifier order.
pub fn plan<S: AsRef<str>>(corpus_ids: &[S], store: &RecordStore, strategy: Strategy) -> ReviewOrder {
    let ids: BTreeSet<&str> = corpus_ids.iter().map(|id| id.as_ref()).collect();

    let key: Box<dyn Fn(&str) -> Option<f64> + '_> = match strategy {
        Strategy::IdentifierOrder => {
            return ReviewOrder::from(ids.into_iter().map(str::to_string).collect::<Vec<_>>());
        }
        Strategy::PredictedAscending => Box::new(|id| predicted(store, id)),
        Strategy::PredictedDescending => Box::new(|id| predicted(store, id).map(|p| -p)),
        Strategy::MedianDistance => match median_prediction(store) {
            Some(median) => Box::new(move |id| predicted(store, id).map(|p| (p - median).abs())),
            None => Box::new(|_| None),
        },
    };

    // BTreeSet iteration is already identifier-sorted and sort_by is stable,
    // so equal keys keep identifier order.
    let mut keyed: Vec<(&str, Option<f64>)> = ids.into_iter().map(|id| (id, key(id))).collect();
    keyed.sort_by(|(_, a), (_, b)| compare_keys(*a, *b));

    ReviewOrder::from(
        keyed
            .into_iter()
            .map(|(id, _)| id.to_string())
            .collect::<Vec<_>>(),
    )
}

fn predicted(store: &RecordStore, id: &str) -> Option<f64> {
    store.get(id).and_then(|r| r.predicted_label)
}

fn compare_keys(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
