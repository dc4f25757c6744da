//! Track resolution: local song -> remote track URI.
use anyhow::Result;
use tracing::{debug, instrument, warn};

use crate::catalog::RemoteCatalog;
use crate::db::{self, NewSyncLog, Pool};
use crate::model::{ConflictPolicy, LogStatus, Song, SyncAction, SyncStats};
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// Identifier was already known; no remote call made.
    Cached,
    /// Exactly one candidate.
    Matched,
    /// Several candidates, the first one was taken.
    Ambiguous { candidates: usize },
    /// Several candidates, none taken.
    Skipped { candidates: usize },
    NotFound,
    /// The search call itself failed.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub song_id: i64,
    pub uri: Option<String>,
    pub outcome: ResolveOutcome,
}

impl Resolution {
    /// Add this song's contribution to the run counters.
    pub fn apply(&self, stats: &mut SyncStats) {
        match self.outcome {
            ResolveOutcome::Cached | ResolveOutcome::Matched => stats.success += 1,
            ResolveOutcome::Ambiguous { .. } => {
                stats.success += 1;
                stats.conflict += 1;
            }
            ResolveOutcome::Skipped { .. } | ResolveOutcome::NotFound => stats.conflict += 1,
            ResolveOutcome::Failed(_) => stats.error += 1,
        }
    }

    fn log_entry(&self, sync_id: i64, run_id: &str) -> NewSyncLog {
        let (status, error_message) = match &self.outcome {
            ResolveOutcome::Cached => (LogStatus::Cached, None),
            ResolveOutcome::Matched => (LogStatus::Success, None),
            ResolveOutcome::Ambiguous { candidates } => (
                LogStatus::Ambiguous,
                Some(format!("{} candidates, first one selected", candidates)),
            ),
            ResolveOutcome::Skipped { candidates } => (
                LogStatus::Skipped,
                Some(format!("{} candidates, none selected", candidates)),
            ),
            ResolveOutcome::NotFound => (LogStatus::NotFound, Some("track not found".to_string())),
            ResolveOutcome::Failed(msg) => (LogStatus::Failed, Some(msg.clone())),
        };
        NewSyncLog {
            sync_id,
            song_id: Some(self.song_id),
            run_id: run_id.to_string(),
            action: SyncAction::SearchTrack,
            status,
            error_message,
            remote_uri: self.uri.clone(),
        }
    }
}

pub struct TrackResolver<'a> {
    pool: &'a Pool,
    catalog: &'a dyn RemoteCatalog,
    retry: RetryPolicy,
    policy: ConflictPolicy,
}

impl<'a> TrackResolver<'a> {
    pub fn new(
        pool: &'a Pool,
        catalog: &'a dyn RemoteCatalog,
        retry: RetryPolicy,
        policy: ConflictPolicy,
    ) -> Self {
        Self {
            pool,
            catalog,
            retry,
            policy,
        }
    }

    /// Resolve one song and append its `search-track` log row. A picked
    /// candidate is written to the shared identity cache. Only storage
    /// failures are returned as errors; remote failures become outcomes.
    #[instrument(skip_all, fields(song_id = song.id))]
    pub async fn resolve(&self, sync_id: i64, run_id: &str, song: &Song) -> Result<Resolution> {
        let resolution = self.classify(song).await;

        if resolution.outcome != ResolveOutcome::Cached {
            if let Some(uri) = &resolution.uri {
                db::upsert_song_remote_uri(self.pool, song.id, self.catalog.platform(), uri)
                    .await?;
            }
        }
        db::append_sync_log(self.pool, &resolution.log_entry(sync_id, run_id)).await?;
        debug!(outcome = ?resolution.outcome, "song resolved");
        Ok(resolution)
    }

    async fn classify(&self, song: &Song) -> Resolution {
        let resolution = |uri: Option<String>, outcome| Resolution {
            song_id: song.id,
            uri,
            outcome,
        };

        if let Some(uri) = &song.remote_uri {
            return resolution(Some(uri.clone()), ResolveOutcome::Cached);
        }

        let search = self
            .retry
            .run("search_track", || {
                self.catalog.search_track(&song.title, &song.artist)
            })
            .await;
        let mut candidates = match search {
            Ok(candidates) => candidates,
            Err(err) => {
                warn!(error = %err, title = %song.title, "track search failed");
                return resolution(None, ResolveOutcome::Failed(format!("search failed: {}", err)));
            }
        };

        match candidates.len() {
            0 => resolution(None, ResolveOutcome::NotFound),
            1 => resolution(Some(candidates.remove(0).uri), ResolveOutcome::Matched),
            n => match self.policy {
                ConflictPolicy::AutoResolve => resolution(
                    Some(candidates.remove(0).uri),
                    ResolveOutcome::Ambiguous { candidates: n },
                ),
                ConflictPolicy::FlagAndSkip => {
                    resolution(None, ResolveOutcome::Skipped { candidates: n })
                }
            },
        }
    }
}
