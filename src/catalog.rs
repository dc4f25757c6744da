//! Remote catalog capability consumed by the sync engine.
//!
//! A platform client (see `crate::spotify`) implements [`RemoteCatalog`];
//! tests provide recording fakes.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::Platform;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("remote platform rejected the access token")]
    Unauthorized,
    #[error("remote resource not found")]
    NotFound,
    #[error("rate limited by remote platform (retry after {retry_after:?}s)")]
    RateLimited { retry_after: Option<u64> },
    #[error("transient remote failure: {0}")]
    Transient(String),
    #[error("unexpected response from remote platform: {0}")]
    InvalidResponse(String),
    /// `body` is kept for logs; it is not part of the display message.
    #[error("remote platform returned status {status}")]
    Api { status: u16, body: String },
}

impl CatalogError {
    /// Whether retrying the same call later can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CatalogError::RateLimited { .. } | CatalogError::Transient(_)
        )
    }
}

/// Handle on a playlist living on the remote platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemotePlaylist {
    pub id: String,
    pub name: String,
    pub public: Option<bool>,
}

/// One search hit returned by the remote catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackCandidate {
    pub id: String,
    pub name: String,
    pub artists: Vec<String>,
    pub uri: String,
}

#[async_trait]
pub trait RemoteCatalog: Send + Sync {
    fn platform(&self) -> Platform;

    async fn get_playlist(&self, external_id: &str) -> Result<Option<RemotePlaylist>, CatalogError>;

    async fn create_playlist(
        &self,
        owner_account_id: &str,
        name: &str,
        description: Option<&str>,
        public: bool,
    ) -> Result<RemotePlaylist, CatalogError>;

    async fn get_playlist_tracks(&self, external_id: &str) -> Result<Vec<String>, CatalogError>;

    async fn add_tracks(
        &self,
        external_id: &str,
        uris: &[String],
        position: Option<u32>,
    ) -> Result<(), CatalogError>;

    async fn remove_tracks(&self, external_id: &str, uris: &[String]) -> Result<(), CatalogError>;

    async fn search_track(&self, title: &str, artist: &str)
        -> Result<Vec<TrackCandidate>, CatalogError>;

    async fn current_account(&self) -> Result<String, CatalogError>;
}
