use core_library::LibraryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Scan root {root} does not exist or is not a directory")]
    RootNotFound { root: String },

    #[error("Scan already in progress for {root}")]
    ScanInProgress { root: String },

    #[error("Scan cancelled")]
    Cancelled,

    #[error("Walk failed: {0}")]
    Walk(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Library(#[from] LibraryError),
}

pub type Result<T> = std::result::Result<T, SyncError>;
