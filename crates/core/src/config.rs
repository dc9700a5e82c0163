use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::LabelRange;
use crate::error::{Error, Result};

/// Knobs for one curation run. Built by the caller (CLI flags, a JSON file,
/// or code) and handed to `Curator::open`; nothing here is read from the
/// environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurationConfig {
    pub label_range: LabelRange,
    pub image_extensions: Vec<String>,
    pub prompt_extension: String,
    pub feature_extension: String,
    /// Chance of taking a rolling backup after each committed label.
    pub snapshot_probability: f64,
    /// Skip ids that already carry a human label while reviewing.
    pub skip_labeled: bool,
    /// Prediction pass: save the store after this many processed ids.
    pub flush_every: usize,
    /// Prediction pass: feature vectors per scorer call.
    pub batch_size: usize,
    /// Prediction pass: fraction of scored images copied to the preview folder.
    pub preview_fraction: f64,
}

impl Default for CurationConfig {
    fn default() -> Self {
        Self {
            label_range: LabelRange::default(),
            image_extensions: vec![
                "jpg".to_string(),
                "jpeg".to_string(),
                "png".to_string(),
                "webp".to_string(),
            ],
            prompt_extension: "txt".to_string(),
            feature_extension: "features.json".to_string(),
            snapshot_probability: 0.1,
            skip_labeled: true,
            flush_every: 100,
            batch_size: 16,
            preview_fraction: 0.0,
        }
    }
}

impl CurationConfig {
    /// Read a JSON config file. Missing keys take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let range = self.label_range;
        if !range.min.is_finite() || !range.max.is_finite() || range.min >= range.max {
            return Err(Error::InvalidConfig(format!(
                "label range [{}, {}] is empty",
                range.min, range.max
            )));
        }
        for (name, p) in [
            ("snapshot_probability", self.snapshot_probability),
            ("preview_fraction", self.preview_fraction),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(Error::InvalidConfig(format!("{name} must be within [0, 1], got {p}")));
            }
        }
        if self.flush_every == 0 {
            return Err(Error::InvalidConfig("flush_every must be at least 1".to_string()));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be at least 1".to_string()));
        }
        if self.image_extensions.is_empty() {
            return Err(Error::InvalidConfig("no image extensions configured".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        CurationConfig::default().validate().unwrap();
    }

    #[test]
    fn test_from_file_fills_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        fs::write(&path, r#"{"snapshot_probability": 0.5, "skip_labeled": false}"#).unwrap();

        let config = CurationConfig::from_file(&path).unwrap();
        assert_eq!(config.snapshot_probability, 0.5);
        assert!(!config.skip_labeled);
        assert_eq!(config.flush_every, 100);
        assert_eq!(config.label_range, LabelRange { min: 0.0, max: 1.0 });
    }

    #[test]
    fn test_from_file_rejects_invalid_values() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        fs::write(&path, r#"{"label_range": {"min": 1.0, "max": 0.0}}"#).unwrap();
        assert!(matches!(
            CurationConfig::from_file(&path).unwrap_err(),
            Error::InvalidConfig(_)
        ));
    }

    #[test]
    fn test_validate_rejects_bad_knobs() {
        let mut config = CurationConfig::default();
        config.snapshot_probability = 1.5;
        assert!(config.validate().is_err());

        let mut config = CurationConfig::default();
        config.flush_every = 0;
        assert!(config.validate().is_err());

        let mut config = CurationConfig::default();
        config.batch_size = 0;
        assert!(config.validate().is_err());
    }
}
