use std::fs;
use std::path::{Path, PathBuf};

use rand::Rng;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::CurationConfig;
use crate::corpus::Corpus;
use crate::domain::{LabelRange, Record};
use crate::error::{Error, Result};
use crate::merge;
use crate::store::RecordStore;

/// The model side of a prediction pass: maps feature vectors to scores, one
/// score per input, in order.
pub trait Scorer {
    fn score(&self, features: &[Vec<f32>]) -> Result<Vec<f64>>;

    /// Length every feature vector must have, when the model fixes one.
    /// Vectors of any other length are skipped as invalid before scoring.
    fn input_dim(&self) -> Option<usize> {
        None
    }
}

impl<F> Scorer for F
where
    F: Fn(&[Vec<f32>]) -> Result<Vec<f64>>,
{
    fn score(&self, features: &[Vec<f32>]) -> Result<Vec<f64>> {
        self(features)
    }
}

/// Progress events emitted while a pass runs.
pub enum PredictProgress {
    /// Starting with this many ids to score.
    Start { total: usize },
    /// An id received a new prediction.
    Scored { id: String, score: f64 },
    /// An id was skipped: missing, unreadable or wrong-width feature sidecar,
    /// or an unusable score.
    Skipped { id: String, reason: String },
    /// The store was saved after `processed` ids.
    Flushed { processed: usize },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredictionSummary {
    /// Ids that received a new prediction.
    pub scored: usize,
    /// Ids left alone because they already carry a human label.
    pub already_labeled: usize,
    /// Ids without a feature sidecar.
    pub missing_features: Vec<String>,
    /// Ids whose sidecar or score could not be used.
    pub invalid: Vec<String>,
    /// Images copied to the preview folder.
    pub previews: usize,
    /// Saves of the record store, including the final one.
    pub flushes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictionOptions {
    pub batch_size: usize,
    pub flush_every: usize,
    pub preview_fraction: f64,
    pub label_range: LabelRange,
}

impl Default for PredictionOptions {
    fn default() -> Self {
        Self::from(&CurationConfig::default())
    }
}

impl From<&CurationConfig> for PredictionOptions {
    fn from(config: &CurationConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            flush_every: config.flush_every,
            preview_fraction: config.preview_fraction,
            label_range: config.label_range,
        }
    }
}

/// Directory receiving preview copies: `<corpus>_predicted_scores`.
pub fn preview_dir_for(corpus_dir: &Path) -> PathBuf {
    let dir = crate::store::named_dir(corpus_dir);
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "corpus".to_string());
    dir.with_file_name(format!("{name}_predicted_scores"))
}

/// Offline batch that scores every unlabeled corpus image and merges the
/// scores into the record store.
pub struct PredictionPass<'a, S: ?Sized> {
    corpus: &'a Corpus,
    scorer: &'a S,
    options: PredictionOptions,
}

impl<'a, S: Scorer + ?Sized> PredictionPass<'a, S> {
    pub fn new(corpus: &'a Corpus, scorer: &'a S, options: PredictionOptions) -> Self {
        Self {
            corpus,
            scorer,
            options,
        }
    }

    /// Score in sub-batches of `batch_size`, saving the store every
    /// `flush_every` processed ids and once at the end. A scorer failure
    /// saves whatever earlier sub-batches produced before returning the error.
    pub fn run<R: Rng>(
        &self,
        store: &mut RecordStore,
        store_path: &Path,
        rng: &mut R,
        mut progress_cb: Option<&mut dyn FnMut(PredictProgress)>,
    ) -> Result<PredictionSummary> {
        let batch_size = self.options.batch_size.max(1);
        let flush_every = self.options.flush_every.max(1);
        let preview_fraction = self.options.preview_fraction.clamp(0.0, 1.0);

        let mut summary = PredictionSummary::default();
        let pending: Vec<&str> = self
            .corpus
            .ids()
            .iter()
            .map(String::as_str)
            .filter(|id| {
                let labeled = store.get(id).is_some_and(Record::is_labeled);
                if labeled {
                    summary.already_labeled += 1;
                }
                !labeled
            })
            .collect();

        info!(
            total = pending.len(),
            already_labeled = summary.already_labeled,
            "predicting scores"
        );
        if let Some(ref mut cb) = progress_cb {
            cb(PredictProgress::Start {
                total: pending.len(),
            });
        }

        let corpus = self.corpus;
        let preview_dir = preview_dir_for(corpus.dir());
        let mut processed = 0usize;
        let mut since_flush = 0usize;
        let mut dirty = false;
        let input_dim = self.scorer.input_dim();

        for chunk in pending.chunks(batch_size) {
            // Sidecar reads are independent; merging stays on this thread.
            let loaded: Vec<(&str, Result<Vec<f32>>)> = chunk
                .par_iter()
                .map(|id| (*id, corpus.load_features(id)))
                .collect();

            let mut ids = Vec::with_capacity(loaded.len());
            let mut features = Vec::with_capacity(loaded.len());
            for (id, result) in loaded {
                let result = result.and_then(|vector| match input_dim {
                    Some(dim) if vector.len() != dim => Err(Error::InvalidFeature {
                        id: id.to_string(),
                        reason: format!("expected {dim} values, found {}", vector.len()),
                    }),
                    _ => Ok(vector),
                });
                match result {
                    Ok(vector) => {
                        ids.push(id);
                        features.push(vector);
                    }
                    Err(e @ Error::MissingFeature(_)) | Err(e @ Error::InvalidFeature { .. }) => {
                        warn!(%id, error = %e, "skipping id");
                        if matches!(e, Error::MissingFeature(_)) {
                            summary.missing_features.push(id.to_string());
                        } else {
                            summary.invalid.push(id.to_string());
                        }
                        if let Some(ref mut cb) = progress_cb {
                            cb(PredictProgress::Skipped {
                                id: id.to_string(),
                                reason: e.to_string(),
                            });
                        }
                    }
                    Err(e) => {
                        self.flush_pending(store, store_path, dirty, &mut summary)?;
                        return Err(e);
                    }
                }
            }

            if !features.is_empty() {
                let scores = match self.score_checked(&features) {
                    Ok(scores) => scores,
                    Err(e) => {
                        self.flush_pending(store, store_path, dirty, &mut summary)?;
                        return Err(e);
                    }
                };

                let mut batch = Vec::with_capacity(scores.len());
                for (id, score) in ids.into_iter().zip(scores) {
                    if !score.is_finite() {
                        warn!(%id, score, "scorer returned a non-finite score");
                        summary.invalid.push(id.to_string());
                        if let Some(ref mut cb) = progress_cb {
                            cb(PredictProgress::Skipped {
                                id: id.to_string(),
                                reason: format!("non-finite score {score}"),
                            });
                        }
                        continue;
                    }
                    let range = self.options.label_range;
                    batch.push((id.to_string(), score.clamp(range.min, range.max)));
                }

                let outcome = merge::apply_predictions(store, &batch);
                summary.scored += outcome.applied;
                dirty |= outcome.applied > 0;

                for (id, score) in &batch {
                    if preview_fraction > 0.0 && rng.random_bool(preview_fraction) {
                        match self.copy_preview(&preview_dir, id, *score) {
                            Ok(()) => summary.previews += 1,
                            Err(e) => warn!(%id, error = %e, "preview copy failed"),
                        }
                    }
                    if let Some(ref mut cb) = progress_cb {
                        cb(PredictProgress::Scored {
                            id: id.clone(),
                            score: *score,
                        });
                    }
                }
            }

            processed += chunk.len();
            since_flush += chunk.len();
            if since_flush >= flush_every {
                let saved = self.flush_pending(store, store_path, dirty, &mut summary)?;
                dirty = false;
                since_flush = 0;
                if saved {
                    if let Some(ref mut cb) = progress_cb {
                        cb(PredictProgress::Flushed { processed });
                    }
                }
            }
        }

        self.flush_pending(store, store_path, dirty, &mut summary)?;
        info!(
            scored = summary.scored,
            missing = summary.missing_features.len(),
            invalid = summary.invalid.len(),
            "prediction pass complete"
        );
        Ok(summary)
    }

    fn score_checked(&self, features: &[Vec<f32>]) -> Result<Vec<f64>> {
        let scores = self.scorer.score(features)?;
        if scores.len() != features.len() {
            return Err(Error::Scorer(format!(
                "returned {} scores for {} inputs",
                scores.len(),
                features.len()
            )));
        }
        Ok(scores)
    }

    fn flush_pending(
        &self,
        store: &RecordStore,
        store_path: &Path,
        dirty: bool,
        summary: &mut PredictionSummary,
    ) -> Result<bool> {
        if !dirty {
            return Ok(false);
        }
        store.save(store_path)?;
        summary.flushes += 1;
        debug!(records = store.len(), "flushed record store");
        Ok(true)
    }

    fn copy_preview(&self, preview_dir: &Path, id: &str, score: f64) -> Result<()> {
        let image = self.corpus.image_path(id);
        let ext = image
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_else(|| "jpg".to_string());
        fs::create_dir_all(preview_dir)?;
        fs::copy(&image, preview_dir.join(format!("{score:.3}_{id}.{ext}")))?;
        Ok(())
    }
}
