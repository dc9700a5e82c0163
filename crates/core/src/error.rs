use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("walkdir error: {0}")]
    WalkDir(#[from] walkdir::Error),

    #[error("record store is corrupt: {} ({reason}); run `scorelabel backup restore` to recover", .path.display())]
    CorruptStore { path: PathBuf, reason: String },

    #[error("no backup available for {}", .0.display())]
    NoBackupAvailable(PathBuf),

    #[error("missing feature sidecar for {0}")]
    MissingFeature(String),

    #[error("invalid feature sidecar for {id}: {reason}")]
    InvalidFeature { id: String, reason: String },

    #[error("invalid label input: {0:?}")]
    InvalidLabelInput(String),

    #[error("corpus path does not exist: {}", .0.display())]
    CorpusNotFound(PathBuf),

    #[error("corpus path is not a directory: {}", .0.display())]
    CorpusNotDirectory(PathBuf),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("review session is {actual}, expected {expected}")]
    InvalidSessionState {
        expected: &'static str,
        actual: String,
    },

    #[error("scorer failed: {0}")]
    Scorer(String),
}

pub type Result<T> = std::result::Result<T, Error>;
