mod atomic;
pub mod backup;
pub mod config;
pub mod corpus;
pub mod domain;
pub mod error;
pub mod merge;
pub mod planner;
pub mod predict;
pub mod session;
pub mod store;

use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use config::CurationConfig;
use corpus::Corpus;
use domain::Record;
use error::Result;
use planner::{ReviewOrder, Strategy};
use predict::{PredictProgress, PredictionOptions, PredictionPass, PredictionSummary, Scorer};
use session::{ReviewSession, SessionOptions};
use store::RecordStore;

/// Progress summary for one corpus directory.
#[derive(Debug, Clone, PartialEq)]
pub struct CurationStats {
    pub corpus_images: usize,
    pub records: usize,
    pub labeled: usize,
    pub predicted: usize,
    /// Corpus images with no human label yet.
    pub unreviewed: usize,
    /// Records whose image is no longer in the corpus directory.
    pub orphaned: usize,
    pub backup: Option<PathBuf>,
}

/// The main entry point: one corpus directory and its record store.
pub struct Curator {
    corpus: Corpus,
    store: RecordStore,
    store_path: PathBuf,
    config: CurationConfig,
    /// Records back-filled in memory but not yet written to disk.
    pending_backfill: usize,
}

impl Curator {
    /// Open the corpus at `corpus_dir` with its store at the derived
    /// `<parent>/<dir-name>.csv` path.
    pub fn open(corpus_dir: &Path, config: CurationConfig) -> Result<Self> {
        let store_path = store::store_path_for(corpus_dir);
        Self::open_with_store(corpus_dir, &store_path, config)
    }

    /// Open with an explicit store path. Labeled records are back-filled in
    /// memory; nothing is written until the next save.
    pub fn open_with_store(
        corpus_dir: &Path,
        store_path: &Path,
        config: CurationConfig,
    ) -> Result<Self> {
        config.validate()?;
        let corpus = Corpus::discover(corpus_dir, &config)?;
        let mut store = RecordStore::load(store_path)?;
        let fixed = merge::backfill_from_labels(&mut store);

        info!(
            corpus = %corpus_dir.display(),
            store = %store_path.display(),
            images = corpus.len(),
            labeled = store.count_labeled(),
            backfilled = fixed,
            "opened corpus"
        );

        Ok(Self {
            corpus,
            store,
            store_path: store_path.to_path_buf(),
            config,
            pending_backfill: fixed,
        })
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    pub fn config(&self) -> &CurationConfig {
        &self.config
    }

    pub fn record(&self, id: &str) -> Option<&Record> {
        self.store.get(id)
    }

    pub fn status(&self) -> Result<CurationStats> {
        let stats = self.store.stats();
        let unreviewed = self
            .corpus
            .ids()
            .iter()
            .filter(|id| !self.store.get(id).is_some_and(Record::is_labeled))
            .count();
        let in_corpus: std::collections::HashSet<&str> =
            self.corpus.ids().iter().map(String::as_str).collect();
        let orphaned = self.store.ids().filter(|id| !in_corpus.contains(id)).count();

        Ok(CurationStats {
            corpus_images: self.corpus.len(),
            records: stats.total_records,
            labeled: stats.labeled,
            predicted: stats.predicted,
            unreviewed,
            orphaned,
            backup: backup::find_backup(&self.store_path)?,
        })
    }

    /// Review order for the current corpus and store.
    pub fn plan(&self, strategy: Strategy) -> ReviewOrder {
        planner::plan(self.corpus.ids(), &self.store, strategy)
    }

    /// Hand the corpus and store over to an interactive session.
    pub fn into_session(self, strategy: Strategy) -> ReviewSession {
        let order = self.plan(strategy);
        let options = SessionOptions::from(&self.config);
        ReviewSession::new(order, self.corpus, self.store, self.store_path, options)
    }

    /// Run the prediction pass over every unlabeled corpus image.
    pub fn predict<S: Scorer + ?Sized>(
        &mut self,
        scorer: &S,
        progress_cb: Option<&mut dyn FnMut(PredictProgress)>,
    ) -> Result<PredictionSummary> {
        let options = PredictionOptions::from(&self.config);
        let pass = PredictionPass::new(&self.corpus, scorer, options);
        let mut rng = StdRng::from_os_rng();
        let summary = pass.run(&mut self.store, &self.store_path, &mut rng, progress_cb)?;
        if summary.flushes > 0 {
            self.pending_backfill = 0;
        }
        Ok(summary)
    }

    /// Back-fill predictions from labels and persist the result. Counts the
    /// records fixed in memory on open as well as any fixed now.
    pub fn backfill(&mut self) -> Result<usize> {
        let changed = self.pending_backfill + merge::backfill_from_labels(&mut self.store);
        if changed > 0 {
            self.save()?;
        }
        Ok(changed)
    }

    pub fn save(&mut self) -> Result<()> {
        self.store.save(&self.store_path)?;
        self.pending_backfill = 0;
        Ok(())
    }

    /// Save, then take a rolling backup unconditionally.
    pub fn snapshot(&mut self) -> Result<PathBuf> {
        self.save()?;
        backup::snapshot(&self.store_path)
    }

    /// Restore the store file from its backup and reload it.
    pub fn restore(&mut self) -> Result<PathBuf> {
        let used = backup::restore(&self.store_path)?;
        self.store = RecordStore::load(&self.store_path)?;
        self.pending_backfill = merge::backfill_from_labels(&mut self.store);
        Ok(used)
    }
}
