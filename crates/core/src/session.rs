//! Interactive review walk over a planned order.
//!
//! ```text
//! Idle ─start─▶ Presenting(i) ─present─▶ AwaitingInput(i)
//!                    ▲                        │
//!                    ├──── Committing(i) ◀────┤ label
//!                    └──── Navigating(i) ◀────┤ next / previous
//!                                             └─▶ Terminating (quit)
//! ```
//!
//! Indices wrap in both directions, so the walk is an unbounded cycle over a
//! finite order. Every label is saved before the next image is presented.

use std::fmt;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::backup::BackupGuard;
use crate::config::CurationConfig;
use crate::corpus::{Corpus, CorpusItem};
use crate::domain::{LabelRange, Record};
use crate::error::{Error, Result};
use crate::merge;
use crate::planner::ReviewOrder;
use crate::store::RecordStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Presenting(usize),
    AwaitingInput(usize),
    Committing(usize),
    Navigating(usize),
    Terminating,
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Presenting(_) => "presenting",
            SessionState::AwaitingInput(_) => "awaiting input",
            SessionState::Committing(_) => "committing",
            SessionState::Navigating(_) => "navigating",
            SessionState::Terminating => "terminating",
        }
    }

    pub fn index(&self) -> Option<usize> {
        match *self {
            SessionState::Presenting(i)
            | SessionState::AwaitingInput(i)
            | SessionState::Committing(i)
            | SessionState::Navigating(i) => Some(i),
            SessionState::Idle | SessionState::Terminating => None,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index() {
            Some(i) => write!(f, "{}({i})", self.name()),
            None => f.write_str(self.name()),
        }
    }
}

/// One reviewer decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReviewInput {
    Label(f64),
    Previous,
    Next,
    Quit,
}

impl ReviewInput {
    /// Parse reviewer text. A lone digit `d` means `d / 10`, matching the
    /// number-row shortcut; any other number is taken as-is.
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim().to_ascii_lowercase();
        match trimmed.as_str() {
            "n" | "next" | "right" => return Ok(ReviewInput::Next),
            "p" | "prev" | "previous" | "left" => return Ok(ReviewInput::Previous),
            "q" | "quit" | "exit" | "esc" => return Ok(ReviewInput::Quit),
            _ => {}
        }

        let mut chars = trimmed.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            if let Some(digit) = c.to_digit(10) {
                return Ok(ReviewInput::Label(f64::from(digit) / 10.0));
            }
        }

        match trimmed.parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(ReviewInput::Label(value)),
            _ => Err(Error::InvalidLabelInput(text.trim().to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionOptions {
    pub skip_labeled: bool,
    pub snapshot_probability: f64,
    pub label_range: LabelRange,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from(&CurationConfig::default())
    }
}

impl From<&CurationConfig> for SessionOptions {
    fn from(config: &CurationConfig) -> Self {
        Self {
            skip_labeled: config.skip_labeled,
            snapshot_probability: config.snapshot_probability,
            label_range: config.label_range,
        }
    }
}

/// What the display collaborator needs to show the current image.
#[derive(Debug, Clone, PartialEq)]
pub struct Presentation {
    pub index: usize,
    pub total: usize,
    pub item: CorpusItem,
    pub record: Option<Record>,
}

impl Presentation {
    /// Overlay text: the human label if present, otherwise the prediction,
    /// followed by the prompt.
    pub fn caption(&self) -> String {
        let score = match &self.record {
            Some(Record {
                label: Some(label), ..
            }) => format!("{label:.2}"),
            Some(Record {
                predicted_label: Some(p),
                ..
            }) => format!("predicted: {p:.2}"),
            _ => "unscored".to_string(),
        };
        match &self.item.prompt {
            Some(prompt) => format!("{score} || {prompt}"),
            None => score,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Backward,
}

pub struct ReviewSession<R = StdRng> {
    order: ReviewOrder,
    corpus: Corpus,
    store: RecordStore,
    store_path: PathBuf,
    guard: BackupGuard<R>,
    options: SessionOptions,
    state: SessionState,
    dirty: bool,
    committed: usize,
    snapshots: usize,
}

impl ReviewSession<StdRng> {
    pub fn new(
        order: ReviewOrder,
        corpus: Corpus,
        store: RecordStore,
        store_path: PathBuf,
        options: SessionOptions,
    ) -> Self {
        Self {
            order,
            corpus,
            store,
            store_path,
            guard: BackupGuard::new(),
            options,
            state: SessionState::Idle,
            dirty: false,
            committed: 0,
            snapshots: 0,
        }
    }
}

impl<R: Rng> ReviewSession<R> {
    /// Swap the backup guard, e.g. for a seeded random source.
    pub fn with_backup_guard<R2: Rng>(self, guard: BackupGuard<R2>) -> ReviewSession<R2> {
        ReviewSession {
            order: self.order,
            corpus: self.corpus,
            store: self.store,
            store_path: self.store_path,
            guard,
            options: self.options,
            state: self.state,
            dirty: self.dirty,
            committed: self.committed,
            snapshots: self.snapshots,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn order(&self) -> &ReviewOrder {
        &self.order
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    /// Labels committed during this session.
    pub fn committed(&self) -> usize {
        self.committed
    }

    /// Rolling backups taken during this session.
    pub fn snapshots(&self) -> usize {
        self.snapshots
    }

    pub fn current_id(&self) -> Option<&str> {
        self.state.index().and_then(|i| self.order.get(i))
    }

    pub fn is_finished(&self) -> bool {
        self.state == SessionState::Terminating
    }

    fn wrong_state(&self, expected: &'static str) -> Error {
        Error::InvalidSessionState {
            expected,
            actual: self.state.to_string(),
        }
    }

    fn is_labeled(&self, index: usize) -> bool {
        self.order
            .get(index)
            .and_then(|id| self.store.get(id))
            .is_some_and(Record::is_labeled)
    }

    fn step(&self, index: usize, direction: Direction) -> usize {
        let n = self.order.len();
        match direction {
            Direction::Forward => (index + 1) % n,
            Direction::Backward => (index + n - 1) % n,
        }
    }

    /// First index at or after `from` (in `direction`) that should be shown.
    /// `None` when every id is already labeled and skipping is on.
    fn seek(&self, from: usize, direction: Direction) -> Option<usize> {
        if self.order.is_empty() {
            return None;
        }
        let mut index = from % self.order.len();
        if !self.options.skip_labeled {
            return Some(index);
        }
        for _ in 0..self.order.len() {
            if !self.is_labeled(index) {
                return Some(index);
            }
            index = self.step(index, direction);
        }
        None
    }

    fn move_to(&mut self, target: Option<usize>) {
        self.state = match target {
            Some(index) => SessionState::Presenting(index),
            None => {
                info!(committed = self.committed, "nothing left to review");
                SessionState::Terminating
            }
        };
    }

    /// `Idle → Presenting(i)`, skipping ids that are already labeled.
    pub fn start(&mut self) -> Result<SessionState> {
        if self.state != SessionState::Idle {
            return Err(self.wrong_state("idle"));
        }
        info!(
            total = self.order.len(),
            labeled = self.store.count_labeled(),
            "starting review session"
        );
        let target = self.seek(0, Direction::Forward);
        self.move_to(target);
        Ok(self.state)
    }

    /// `Presenting(i) → AwaitingInput(i)`: hand the caller what to display.
    pub fn present(&mut self) -> Result<Presentation> {
        let SessionState::Presenting(index) = self.state else {
            return Err(self.wrong_state("presenting"));
        };
        let id = self
            .order
            .get(index)
            .ok_or_else(|| self.wrong_state("presenting"))?
            .to_string();

        self.state = SessionState::AwaitingInput(index);
        Ok(Presentation {
            index,
            total: self.order.len(),
            item: self.corpus.item(&id),
            record: self.store.get(&id).cloned(),
        })
    }

    /// Parse reviewer text and handle it. Unrecognized text leaves the state
    /// untouched.
    pub fn handle_raw(&mut self, text: &str) -> Result<SessionState> {
        if !matches!(self.state, SessionState::AwaitingInput(_)) {
            return Err(self.wrong_state("awaiting input"));
        }
        let input = ReviewInput::parse(text)?;
        self.handle(input)
    }

    /// Apply one reviewer decision from `AwaitingInput(i)`.
    pub fn handle(&mut self, input: ReviewInput) -> Result<SessionState> {
        let SessionState::AwaitingInput(index) = self.state else {
            return Err(self.wrong_state("awaiting input"));
        };

        match input {
            ReviewInput::Label(value) => {
                if !self.options.label_range.contains(value) {
                    return Err(Error::InvalidLabelInput(value.to_string()));
                }
                self.commit(index, value)?;
                let target = self.seek(self.step(index, Direction::Forward), Direction::Forward);
                self.move_to(target);
            }
            ReviewInput::Next | ReviewInput::Previous => {
                self.state = SessionState::Navigating(index);
                let direction = if input == ReviewInput::Next {
                    Direction::Forward
                } else {
                    Direction::Backward
                };
                let target = self.seek(self.step(index, direction), direction);
                debug!(from = index, to = ?target, "navigating");
                self.move_to(target);
            }
            ReviewInput::Quit => {
                self.flush()?;
                info!(committed = self.committed, "review session ended");
                self.state = SessionState::Terminating;
            }
        }
        Ok(self.state)
    }

    fn commit(&mut self, index: usize, value: f64) -> Result<()> {
        let id = self
            .order
            .get(index)
            .ok_or_else(|| self.wrong_state("awaiting input"))?
            .to_string();

        self.state = SessionState::Committing(index);
        merge::relabel(&mut self.store, &id, value);
        self.committed += 1;
        self.dirty = true;

        if let Err(e) = self.flush() {
            self.state = SessionState::AwaitingInput(index);
            return Err(e);
        }
        debug!(%id, label = value, "committed label");

        match self
            .guard
            .maybe_snapshot(&self.store_path, self.options.snapshot_probability)
        {
            Ok(Some(_)) => self.snapshots += 1,
            Ok(None) => {}
            Err(e) => warn!(error = %e, "rolling backup failed"),
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.dirty {
            self.store.save(&self.store_path)?;
            self.dirty = false;
        }
        Ok(())
    }

    /// Flush anything pending and hand the store back.
    pub fn finish(mut self) -> Result<RecordStore> {
        self.flush()?;
        self.state = SessionState::Terminating;
        Ok(self.store)
    }
}
