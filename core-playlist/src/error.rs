use bridge_traits::BridgeError;
use core_library::LibraryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlaylistError {
    /// Bad positions, destinations or entry references. Raised before any write.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Library(#[from] LibraryError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Sync target {target} failed: {source}")]
    SyncTarget {
        target: String,
        #[source]
        source: BridgeError,
    },
}

impl PlaylistError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        PlaylistError::Validation(message.into())
    }

    /// True for caller errors: invalid input, duplicate names.
    pub fn is_validation(&self) -> bool {
        match self {
            PlaylistError::Validation(_) => true,
            PlaylistError::Library(e) => e.is_validation(),
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, PlaylistError::Library(LibraryError::NotFound { .. }))
    }
}

pub type Result<T> = std::result::Result<T, PlaylistError>;
