//! Input and view models used by repositories.
//!
//! Keep these structs focused on the data written or returned by queries.

use serde::{Deserialize, Serialize};

use crate::model::{LogStatus, SyncAction};

/// Playlist as handed over by an import; songs keep their order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPlaylist {
    pub owner_id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub songs: Vec<NewSong>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSong {
    pub title: String,
    pub artist: String,
    /// Already known Spotify URI, seeded into the identity cache.
    #[serde(default)]
    pub spotify_uri: Option<String>,
}

/// One audit row to append to `sync_logs`.
#[derive(Debug, Clone)]
pub struct NewSyncLog {
    pub sync_id: i64,
    pub song_id: Option<i64>,
    pub run_id: String,
    pub action: SyncAction,
    pub status: LogStatus,
    pub error_message: Option<String>,
    pub remote_uri: Option<String>,
}
