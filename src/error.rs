//! Errors surfaced by the sync engine to its callers.
use std::any::Any;
use thiserror::Error;

use crate::catalog::CatalogError;
use crate::model::Platform;

/// Largest number of playlists accepted by one batch request.
pub const MAX_BATCH_PLAYLISTS: usize = 10;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("not authenticated with the remote platform")]
    NotAuthenticated,

    #[error("playlist {playlist_id} not found")]
    PlaylistNotFound { playlist_id: i64 },

    #[error("remote playlist for playlist {playlist_id} is unavailable and creation is disabled")]
    RemotePlaylistUnavailable { playlist_id: i64 },

    #[error("a sync of playlist {playlist_id} to {platform} is already in progress")]
    SyncAlreadyInProgress { playlist_id: i64, platform: Platform },

    #[error("batch must contain between 1 and {max} playlists, got {count}")]
    BatchSizeExceeded { count: usize, max: usize },

    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("remote platform error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("storage error: {0:#}")]
    Storage(#[from] anyhow::Error),

    /// A run panicked; the payload message is kept.
    #[error("sync panicked: {0}")]
    Panicked(String),
}

impl SyncError {
    /// Status code an HTTP layer answers with for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            SyncError::NotAuthenticated => 401,
            SyncError::PlaylistNotFound { .. } => 404,
            SyncError::BatchSizeExceeded { .. } | SyncError::UnsupportedPlatform(_) => 400,
            SyncError::SyncAlreadyInProgress { .. } => 409,
            SyncError::RemotePlaylistUnavailable { .. }
            | SyncError::Config(_)
            | SyncError::Catalog(_)
            | SyncError::Storage(_)
            | SyncError::Panicked(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

/// Text of a caught panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_follows_error_kind() {
        assert_eq!(SyncError::NotAuthenticated.http_status(), 401);
        assert_eq!(SyncError::PlaylistNotFound { playlist_id: 1 }.http_status(), 404);
        assert_eq!(
            SyncError::BatchSizeExceeded { count: 11, max: 10 }.http_status(),
            400
        );
        assert_eq!(
            SyncError::SyncAlreadyInProgress {
                playlist_id: 1,
                platform: Platform::Spotify
            }
            .http_status(),
            409
        );
        assert_eq!(
            SyncError::Storage(anyhow::anyhow!("disk full")).http_status(),
            500
        );
        assert_eq!(SyncError::Panicked("boom".into()).http_status(), 500);
    }

    #[test]
    fn panic_payloads_are_readable() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }

    #[test]
    fn catalog_errors_do_not_leak_response_bodies() {
        let err = SyncError::from(CatalogError::Api {
            status: 400,
            body: "{\"error\":\"secret detail\"}".into(),
        });
        assert!(!err.to_string().contains("secret detail"));
    }
}
