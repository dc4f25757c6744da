use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Remote music platform a playlist is mirrored onto.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Spotify,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Spotify => "spotify",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "spotify" => Some(Platform::Spotify),
            _ => None,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    Pending,
    InProgress,
    Completed,
    Partial,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "PENDING",
            SyncStatus::InProgress => "IN_PROGRESS",
            SyncStatus::Completed => "COMPLETED",
            SyncStatus::Partial => "PARTIAL",
            SyncStatus::Failed => "FAILED",
        }
    }

    pub fn parse_status(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(SyncStatus::Pending),
            "IN_PROGRESS" => Some(SyncStatus::InProgress),
            "COMPLETED" => Some(SyncStatus::Completed),
            "PARTIAL" => Some(SyncStatus::Partial),
            "FAILED" => Some(SyncStatus::Failed),
            _ => None,
        }
    }

    /// Terminal status of a run, evaluated in order: no success with errors
    /// fails, any conflict or error next to a success is partial, anything
    /// else completes.
    pub fn from_counts(success: i64, conflict: i64, error: i64) -> Self {
        if error > 0 && success == 0 {
            SyncStatus::Failed
        } else if (conflict > 0 || error > 0) && success > 0 {
            SyncStatus::Partial
        } else {
            SyncStatus::Completed
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SyncStatus::Completed | SyncStatus::Partial | SyncStatus::Failed
        )
    }
}

/// Action recorded on a sync log row.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SyncAction {
    SearchTrack,
    AddTrack,
    RemoveTrack,
}

impl SyncAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncAction::SearchTrack => "search-track",
            SyncAction::AddTrack => "add-track",
            SyncAction::RemoveTrack => "remove-track",
        }
    }

    pub fn parse_action(s: &str) -> Option<Self> {
        match s {
            "search-track" => Some(SyncAction::SearchTrack),
            "add-track" => Some(SyncAction::AddTrack),
            "remove-track" => Some(SyncAction::RemoveTrack),
            _ => None,
        }
    }
}

/// Outcome recorded on a sync log row.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogStatus {
    Success,
    Cached,
    NotFound,
    Ambiguous,
    Skipped,
    Failed,
}

impl LogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogStatus::Success => "success",
            LogStatus::Cached => "cached",
            LogStatus::NotFound => "not_found",
            LogStatus::Ambiguous => "ambiguous",
            LogStatus::Skipped => "skipped",
            LogStatus::Failed => "failed",
        }
    }

    pub fn parse_log_status(s: &str) -> Option<Self> {
        match s {
            "success" => Some(LogStatus::Success),
            "cached" => Some(LogStatus::Cached),
            "not_found" => Some(LogStatus::NotFound),
            "ambiguous" => Some(LogStatus::Ambiguous),
            "skipped" => Some(LogStatus::Skipped),
            "failed" => Some(LogStatus::Failed),
            _ => None,
        }
    }
}

/// How a search returning several candidates is handled.
///
/// Carried on the wire as the `handleConflicts` flag: `true` picks the first
/// candidate, `false` flags the song and leaves it out of the remote playlist.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(from = "bool", into = "bool")]
pub enum ConflictPolicy {
    #[default]
    AutoResolve,
    FlagAndSkip,
}

impl From<bool> for ConflictPolicy {
    fn from(handle_conflicts: bool) -> Self {
        if handle_conflicts {
            ConflictPolicy::AutoResolve
        } else {
            ConflictPolicy::FlagAndSkip
        }
    }
}

impl From<ConflictPolicy> for bool {
    fn from(policy: ConflictPolicy) -> Self {
        matches!(policy, ConflictPolicy::AutoResolve)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncOptions {
    pub create_if_not_exists: bool,
    pub update_existing: bool,
    #[serde(rename = "handleConflicts")]
    pub conflict_policy: ConflictPolicy,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            create_if_not_exists: true,
            update_existing: true,
            conflict_policy: ConflictPolicy::AutoResolve,
        }
    }
}

/// Per-run counters. `total` is fixed at the song count when the run starts.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncStats {
    pub total: i64,
    pub success: i64,
    pub conflict: i64,
    pub error: i64,
}

impl SyncStats {
    pub fn new(total: i64) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    pub fn status(&self) -> SyncStatus {
        SyncStatus::from_counts(self.success, self.conflict, self.error)
    }

    /// Human-readable summary derived from the counts and the status they
    /// produced.
    pub fn summary(&self, status: SyncStatus) -> String {
        match status {
            SyncStatus::Failed => format!(
                "Sync failed: {} of {} tracks could not be synced",
                self.error, self.total
            ),
            SyncStatus::Partial => format!(
                "Synced {} of {} tracks ({} conflicts, {} errors)",
                self.success, self.total, self.conflict, self.error
            ),
            _ => format!("Synced {} of {} tracks", self.success, self.total),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub success: bool,
    pub status: SyncStatus,
    pub stats: SyncStats,
    pub message: String,
    pub sync_id: Option<i64>,
    pub external_id: Option<String>,
}

impl SyncResult {
    pub fn finished(
        sync_id: i64,
        status: SyncStatus,
        stats: SyncStats,
        external_id: Option<String>,
    ) -> Self {
        Self {
            success: status != SyncStatus::Failed,
            status,
            stats,
            message: stats.summary(status),
            sync_id: Some(sync_id),
            external_id,
        }
    }

    /// Result recorded for a run that errored before producing counts.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            status: SyncStatus::Failed,
            stats: SyncStats::default(),
            message: message.into(),
            sync_id: None,
            external_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BatchEntry {
    pub playlist_id: i64,
    #[serde(flatten)]
    pub result: SyncResult,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub success: bool,
    pub results: Vec<BatchEntry>,
    pub total_playlists: usize,
    pub successful_syncs: usize,
    pub failed_syncs: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Song {
    pub id: i64,
    pub title: String,
    pub artist: String,
    /// Cached identifier on the platform being synced, if resolved before.
    pub remote_uri: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playlist {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub is_public: bool,
    pub songs: Vec<Song>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistSync {
    pub id: i64,
    pub playlist_id: i64,
    pub platform: Platform,
    pub status: SyncStatus,
    pub external_id: Option<String>,
    pub total_count: i64,
    pub success_count: i64,
    pub conflict_count: i64,
    pub error_count: i64,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncLog {
    pub id: i64,
    pub sync_id: i64,
    pub song_id: Option<i64>,
    pub run_id: String,
    pub action: SyncAction,
    pub status: LogStatus,
    pub error_message: Option<String>,
    pub remote_uri: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Answer to a status query for one (playlist, platform) pair.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum SyncStatusReport {
    NotSynced {
        status: &'static str,
    },
    Synced {
        #[serde(flatten)]
        sync: PlaylistSync,
        logs: Vec<SyncLog>,
    },
}

impl SyncStatusReport {
    pub fn not_synced() -> Self {
        SyncStatusReport::NotSynced {
            status: "not_synced",
        }
    }
}
