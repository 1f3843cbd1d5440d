use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {0}")]
    Config(#[from] core_runtime::Error),

    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("Library error: {0}")]
    Library(#[from] core_library::LibraryError),

    #[error("Sync error: {0}")]
    Sync(#[from] core_sync::SyncError),

    #[error("Playlist error: {0}")]
    Playlist(#[from] core_playlist::PlaylistError),

    #[cfg(feature = "desktop-shims")]
    #[error("Bridge error: {0}")]
    Bridge(#[from] bridge_traits::BridgeError),
}

impl ServiceError {
    /// True when the caller's input was rejected before anything was written.
    pub fn is_validation(&self) -> bool {
        match self {
            ServiceError::Library(e) => e.is_validation(),
            ServiceError::Playlist(e) => e.is_validation(),
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            ServiceError::Library(e) => matches!(e, core_library::LibraryError::NotFound { .. }),
            ServiceError::Playlist(e) => e.is_not_found(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
