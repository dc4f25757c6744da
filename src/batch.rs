//! Sequential multi-playlist sync with pacing between runs.
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

use crate::error::{panic_message, Result, SyncError, MAX_BATCH_PLAYLISTS};
use crate::model::{BatchEntry, BatchResult, SyncOptions, SyncResult};
use crate::orchestrator::SyncEngine;

/// Reject an empty batch or one above the size limit before doing any work.
pub fn validate_batch(playlist_ids: &[i64]) -> Result<()> {
    if playlist_ids.is_empty() || playlist_ids.len() > MAX_BATCH_PLAYLISTS {
        return Err(SyncError::BatchSizeExceeded {
            count: playlist_ids.len(),
            max: MAX_BATCH_PLAYLISTS,
        });
    }
    Ok(())
}

pub struct BatchCoordinator<'a> {
    engine: &'a SyncEngine,
    delay: Duration,
}

impl<'a> BatchCoordinator<'a> {
    pub fn new(engine: &'a SyncEngine, delay: Duration) -> Self {
        Self { engine, delay }
    }

    /// Run each playlist in request order. A failing run, including one that
    /// panics, becomes a FAILED entry and the batch moves on.
    #[instrument(skip(self, options), fields(count = playlist_ids.len()))]
    pub async fn synchronize_many(
        &self,
        playlist_ids: &[i64],
        owner_id: i64,
        options: &SyncOptions,
    ) -> Result<BatchResult> {
        validate_batch(playlist_ids)?;

        let mut results = Vec::with_capacity(playlist_ids.len());
        for (index, &playlist_id) in playlist_ids.iter().enumerate() {
            if index > 0 && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            let run = self.engine.synchronize(playlist_id, owner_id, options);
            let result = match AssertUnwindSafe(run).catch_unwind().await {
                Ok(Ok(result)) => result,
                Ok(Err(err)) => {
                    warn!(playlist_id, error = %err, "playlist sync failed");
                    SyncResult::rejected(err.to_string())
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    error!(playlist_id, panic = %message, "playlist sync panicked");
                    SyncResult::rejected(format!("sync panicked: {}", message))
                }
            };
            results.push(BatchEntry {
                playlist_id,
                result,
            });
        }

        let successful_syncs = results.iter().filter(|e| e.result.success).count();
        let failed_syncs = results.len() - successful_syncs;
        info!(successful_syncs, failed_syncs, "batch finished");

        Ok(BatchResult {
            success: successful_syncs > 0,
            total_playlists: results.len(),
            successful_syncs,
            failed_syncs,
            results,
        })
    }
}
