pub mod schema;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::atomic;
use crate::domain::{Record, RecordPatch, StoreStats};
use crate::error::{Error, Result};

/// Current wall-clock time in epoch seconds.
pub(crate) fn now_epoch() -> i64 {
    chrono::Utc::now().timestamp()
}

/// `dir` as an absolute path that ends in a real directory name, so `.` and
/// `..` resolve to the directory they stand for.
pub(crate) fn named_dir(dir: &Path) -> PathBuf {
    let absolute = std::path::absolute(dir).unwrap_or_else(|_| dir.to_path_buf());
    if absolute.file_name().is_some() {
        return absolute;
    }
    fs::canonicalize(&absolute).unwrap_or(absolute)
}

/// Record store path for a corpus directory: `<parent>/<dir-name>.csv`.
pub fn store_path_for(corpus_dir: &Path) -> PathBuf {
    let dir = named_dir(corpus_dir);
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "corpus".to_string());
    let parent = dir.parent().unwrap_or_else(|| Path::new(""));
    parent.join(format!("{name}.csv"))
}

/// Key-indexed, in-memory label database backed by a CSV file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordStore {
    records: HashMap<String, Record>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the store at `path`, or an empty store if the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no record store yet, starting empty");
            return Ok(Self::new());
        }

        let corrupt = |reason: String| Error::CorruptStore {
            path: path.to_path_buf(),
            reason,
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(path)?;
        let headers = reader.headers().map_err(|e| corrupt(e.to_string()))?.clone();
        let columns = schema::resolve(&headers).map_err(&corrupt)?;

        let mut store = Self::new();
        for (row, result) in reader.records().enumerate() {
            let line = row + 2;
            let fields = result.map_err(|e| corrupt(e.to_string()))?;
            let cell = |idx: Option<usize>| idx.and_then(|i| fields.get(i)).unwrap_or("");

            // Ids are file stems and may carry spaces; keep them verbatim.
            let id = cell(Some(columns.id));
            if id.is_empty() {
                return Err(corrupt(format!("line {line}: empty id")));
            }
            let record = Record {
                id: id.to_string(),
                label: schema::parse_score(cell(columns.label))
                    .map_err(|e| corrupt(format!("line {line}: {e}")))?,
                predicted_label: schema::parse_score(cell(columns.predicted_label))
                    .map_err(|e| corrupt(format!("line {line}: {e}")))?,
                updated_at: schema::parse_timestamp(cell(columns.updated_at))
                    .map_err(|e| corrupt(format!("line {line}: {e}")))?,
            };
            store.insert_loaded(record);
        }

        debug!(path = %path.display(), records = store.len(), "loaded record store");
        Ok(store)
    }

    /// Older prediction passes could emit the same id twice. Fold such rows
    /// into one record: newer values win, but a present value is never
    /// replaced by an absent one.
    fn insert_loaded(&mut self, record: Record) {
        match self.records.get_mut(&record.id) {
            None => {
                self.records.insert(record.id.clone(), record);
            }
            Some(existing) => {
                warn!(id = %record.id, "duplicate row in record store, merging");
                let (older, newer) = if record.updated_at >= existing.updated_at {
                    (existing.clone(), record)
                } else {
                    (record, existing.clone())
                };
                *existing = Record {
                    id: newer.id,
                    label: newer.label.or(older.label),
                    predicted_label: newer.predicted_label.or(older.predicted_label),
                    updated_at: newer.updated_at,
                };
            }
        }
    }

    /// Serialize the full store to `path`. The file is replaced atomically;
    /// rows are sorted by id.
    pub fn save(&self, path: &Path) -> Result<()> {
        atomic::write_atomic(path, |out| {
            let mut writer = csv::Writer::from_writer(out);
            writer.write_record(schema::HEADER)?;
            for record in self.records() {
                let label = schema::format_score(record.label);
                let predicted = schema::format_score(record.predicted_label);
                let updated_at = record.updated_at.to_string();
                writer.write_record([
                    record.id.as_str(),
                    label.as_str(),
                    predicted.as_str(),
                    updated_at.as_str(),
                ])?;
            }
            writer.flush()?;
            Ok(())
        })?;
        debug!(path = %path.display(), records = self.len(), "saved record store");
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Record> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    /// Insert or merge `patch` into the record for `id`, refreshing `updated_at`.
    pub fn upsert(&mut self, id: &str, patch: RecordPatch) -> &Record {
        self.upsert_at(id, patch, now_epoch())
    }

    pub(crate) fn upsert_at(&mut self, id: &str, patch: RecordPatch, now: i64) -> &Record {
        let record = self
            .records
            .entry(id.to_string())
            .or_insert_with(|| Record::new(id));
        if patch.label.is_some() {
            record.label = patch.label;
        }
        if patch.predicted_label.is_some() {
            record.predicted_label = patch.predicted_label;
        }
        record.updated_at = now;
        record
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records, sorted by id.
    pub fn records(&self) -> Vec<&Record> {
        let mut records: Vec<&Record> = self.records.values().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    pub fn count_labeled(&self) -> usize {
        self.records.values().filter(|r| r.is_labeled()).count()
    }

    pub fn count_predicted(&self) -> usize {
        self.records
            .values()
            .filter(|r| r.predicted_label.is_some())
            .count()
    }

    pub fn stats(&self) -> StoreStats {
        let unscored = self
            .records
            .values()
            .filter(|r| r.label.is_none() && r.predicted_label.is_none())
            .count();
        StoreStats {
            total_records: self.len(),
            labeled: self.count_labeled(),
            predicted: self.count_predicted(),
            unscored,
        }
    }

    /// Mutable access for the merge module, which owns the back-fill invariant.
    pub(crate) fn records_mut(&mut self) -> impl Iterator<Item = &mut Record> {
        self.records.values_mut()
    }
}
