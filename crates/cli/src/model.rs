use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use scorelabel_core::error::Error;
use scorelabel_core::predict::Scorer;
use serde::{Deserialize, Serialize};

/// Serialized linear regressor: `score = w · x + b`, optionally squashed
/// through a sigmoid so scores land in `(0, 1)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub weights: Vec<f32>,
    pub bias: f32,
    #[serde(default)]
    pub sigmoid: bool,
}

impl LinearModel {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read model {}", path.display()))?;
        let model: Self = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse model {}", path.display()))?;
        anyhow::ensure!(!model.weights.is_empty(), "model {} has no weights", path.display());
        Ok(model)
    }

    fn score_one(&self, features: &[f32]) -> scorelabel_core::error::Result<f64> {
        if features.len() != self.weights.len() {
            return Err(Error::Scorer(format!(
                "feature vector has {} values, model expects {}",
                features.len(),
                self.weights.len()
            )));
        }
        let linear = self
            .weights
            .iter()
            .zip(features)
            .map(|(&w, &x)| f64::from(w) * f64::from(x))
            .sum::<f64>()
            + f64::from(self.bias);
        Ok(if self.sigmoid {
            1.0 / (1.0 + (-linear).exp())
        } else {
            linear
        })
    }
}

impl Scorer for LinearModel {
    fn score(&self, features: &[Vec<f32>]) -> scorelabel_core::error::Result<Vec<f64>> {
        features.iter().map(|f| self.score_one(f)).collect()
    }

    fn input_dim(&self) -> Option<usize> {
        Some(self.weights.len())
    }
}
