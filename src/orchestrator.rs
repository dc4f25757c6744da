//! One playlist's reconciliation run: claim, provision, clear, resolve, write,
//! finish.
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, instrument, warn, Span};
use uuid::Uuid;

use crate::catalog::RemoteCatalog;
use crate::config::Config;
use crate::db::{self, Pool};
use crate::error::{panic_message, Result, SyncError};
use crate::model::{
    Platform, Playlist, PlaylistSync, SyncOptions, SyncResult, SyncStats, SyncStatus,
    SyncStatusReport,
};
use crate::provisioner::RemotePlaylistProvisioner;
use crate::resolver::TrackResolver;
use crate::retry::RetryPolicy;
use crate::writer::{BatchTrackWriter, ResolvedTrack};

/// Log rows returned with a status report.
pub const STATUS_LOG_LIMIT: i64 = 10;

/// Resolved songs between two progress writes.
const PROGRESS_EVERY: usize = 25;

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub retry: RetryPolicy,
    pub stale_after: chrono::Duration,
    pub precise_chunk_accounting: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::none(),
            stale_after: chrono::Duration::seconds(1800),
            precise_chunk_accounting: false,
        }
    }
}

impl EngineSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            retry: RetryPolicy::from_settings(&cfg.retry),
            stale_after: chrono::Duration::seconds(cfg.sync.stale_after_seconds as i64),
            precise_chunk_accounting: cfg.sync.precise_chunk_accounting,
        }
    }
}

pub struct SyncEngine {
    pool: Pool,
    catalog: Arc<dyn RemoteCatalog>,
    settings: EngineSettings,
}

impl SyncEngine {
    pub fn new(pool: Pool, catalog: Arc<dyn RemoteCatalog>, settings: EngineSettings) -> Self {
        Self {
            pool,
            catalog,
            settings,
        }
    }

    pub fn platform(&self) -> Platform {
        self.catalog.platform()
    }

    /// Mirror one local playlist onto the remote platform.
    ///
    /// Errors are returned only for failures before the run starts (unknown
    /// playlist, concurrent run), for storage failures and for panics. The
    /// latter two still mark the claimed row FAILED. Remote failures end in a
    /// FAILED or PARTIAL result.
    #[instrument(skip(self, options), fields(platform = %self.platform(), run_id = tracing::field::Empty))]
    pub async fn synchronize(
        &self,
        playlist_id: i64,
        owner_id: i64,
        options: &SyncOptions,
    ) -> Result<SyncResult> {
        let platform = self.platform();
        let playlist = db::load_playlist(&self.pool, playlist_id, owner_id, platform)
            .await?
            .ok_or(SyncError::PlaylistNotFound { playlist_id })?;

        let total = playlist.songs.len() as i64;
        let sync = db::claim_sync(&self.pool, playlist_id, platform, total, self.settings.stale_after)
            .await?
            .ok_or_else(|| SyncError::SyncAlreadyInProgress {
                playlist_id,
                platform,
            })?;

        let run_id = Uuid::new_v4().to_string();
        Span::current().record("run_id", run_id.as_str());
        info!(sync_id = sync.id, total, "sync started");

        // A panicking run is treated like any other aborted run so the claim
        // never stays IN_PROGRESS.
        let outcome = AssertUnwindSafe(self.run(&playlist, &sync, &run_id, options))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(SyncError::Panicked(panic_message(panic.as_ref()))));
        match outcome {
            Ok(result) => Ok(result),
            Err(err) => {
                error!(sync_id = sync.id, error = %err, "sync aborted");
                let mut stats = SyncStats::new(total);
                stats.error = total;
                let message = err.to_string();
                if let Err(finish_err) = db::finish_sync(
                    &self.pool,
                    sync.id,
                    SyncStatus::Failed,
                    &stats,
                    Some(&message),
                )
                .await
                {
                    warn!(error = %format!("{:#}", finish_err), "failed to mark aborted sync");
                }
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        playlist: &Playlist,
        sync: &PlaylistSync,
        run_id: &str,
        options: &SyncOptions,
    ) -> Result<SyncResult> {
        let catalog = self.catalog.as_ref();
        let retry = self.settings.retry;
        let mut stats = SyncStats::new(playlist.songs.len() as i64);

        let provisioner = RemotePlaylistProvisioner::new(&self.pool, catalog, retry);
        let provisioned = match provisioner.provision(playlist, sync, options).await {
            Ok(provisioned) => provisioned,
            Err(SyncError::Storage(err)) => return Err(SyncError::Storage(err)),
            Err(err) => {
                warn!(error = %err, "provisioning failed");
                stats.error = stats.total;
                let message = err.to_string();
                db::finish_sync(&self.pool, sync.id, SyncStatus::Failed, &stats, Some(&message))
                    .await?;
                return Ok(SyncResult::finished(
                    sync.id,
                    SyncStatus::Failed,
                    stats,
                    sync.external_id.clone(),
                ));
            }
        };
        let external_id = provisioned.remote.id.clone();

        let writer = BatchTrackWriter::new(
            &self.pool,
            catalog,
            retry,
            self.settings.precise_chunk_accounting,
        );
        if options.update_existing && !provisioned.created {
            let removed = writer.remove_all(sync.id, run_id, &external_id).await?;
            info!(removed, "remote playlist cleared");
        }

        let resolver = TrackResolver::new(&self.pool, catalog, retry, options.conflict_policy);
        let mut tracks = Vec::with_capacity(playlist.songs.len());
        for (index, song) in playlist.songs.iter().enumerate() {
            let resolution = resolver.resolve(sync.id, run_id, song).await?;
            resolution.apply(&mut stats);
            if let Some(uri) = resolution.uri {
                tracks.push(ResolvedTrack {
                    song_id: resolution.song_id,
                    uri,
                });
            }
            // Keeps the claim fresh on long playlists.
            if (index + 1) % PROGRESS_EVERY == 0 {
                db::record_progress(&self.pool, sync.id, &stats).await?;
            }
        }
        db::record_progress(&self.pool, sync.id, &stats).await?;

        let report = writer.write_all(sync.id, run_id, &external_id, &tracks).await?;
        stats.success = (stats.success - report.failed).max(0);
        stats.error += report.failed;

        let status = stats.status();
        let error_message =
            (stats.error > 0).then(|| format!("{} tracks failed to sync", stats.error));
        db::finish_sync(&self.pool, sync.id, status, &stats, error_message.as_deref()).await?;
        info!(
            status = status.as_str(),
            success = stats.success,
            conflict = stats.conflict,
            error = stats.error,
            "sync finished"
        );

        Ok(SyncResult::finished(sync.id, status, stats, Some(external_id)))
    }

    /// Read-only view of the ledger for a playlist the owner can see.
    #[instrument(skip(self))]
    pub async fn status(&self, playlist_id: i64, owner_id: i64) -> Result<SyncStatusReport> {
        if !db::playlist_owned_by(&self.pool, playlist_id, owner_id).await? {
            return Err(SyncError::PlaylistNotFound { playlist_id });
        }
        let report =
            db::sync_status_report(&self.pool, playlist_id, self.platform(), STATUS_LOG_LIMIT)
                .await?;
        Ok(report)
    }
}
