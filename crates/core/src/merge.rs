//! Merge rules between human labels and model predictions.
//!
//! Human labels are authoritative: a model score never overwrites a record
//! that carries a `label`, and every labeled record mirrors its label into
//! `predicted_label` so both signals can be sorted on uniformly.

use tracing::debug;

use crate::domain::{Record, RecordPatch};
use crate::store::{now_epoch, RecordStore};

/// Counts reported by `apply_predictions`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Scores written to `predicted_label`.
    pub applied: usize,
    /// Scores dropped because the record already has a human label.
    pub protected: usize,
}

/// Fold a batch of model scores into the store.
pub fn apply_predictions(store: &mut RecordStore, batch: &[(String, f64)]) -> MergeOutcome {
    let now = now_epoch();
    let mut outcome = MergeOutcome::default();

    for (id, score) in batch {
        if store.get(id).is_some_and(Record::is_labeled) {
            outcome.protected += 1;
            continue;
        }
        store.upsert_at(id, RecordPatch::predicted(*score), now);
        outcome.applied += 1;
    }

    debug!(
        applied = outcome.applied,
        protected = outcome.protected,
        "merged prediction batch"
    );
    outcome
}

/// Copy every present `label` into `predicted_label`. Records that already
/// agree are left untouched, so repeated calls are no-ops. Returns the number
/// of records changed.
pub fn backfill_from_labels(store: &mut RecordStore) -> usize {
    let now = now_epoch();
    let mut changed = 0;

    for record in store.records_mut() {
        if record.is_consistent() {
            continue;
        }
        record.predicted_label = record.label;
        record.updated_at = now;
        changed += 1;
    }

    if changed > 0 {
        debug!(changed, "back-filled predicted labels from human labels");
    }
    changed
}

/// Record a human label for `id`. The only path by which review input reaches
/// the store.
pub fn relabel<'a>(store: &'a mut RecordStore, id: &str, label: f64) -> &'a Record {
    store.upsert(
        id,
        RecordPatch {
            label: Some(label),
            predicted_label: Some(label),
        },
    )
}
