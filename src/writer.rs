//! Chunked writes of resolved tracks onto a remote playlist.
use anyhow::Result;
use std::collections::HashSet;
use tracing::{info, instrument, warn};

use crate::catalog::RemoteCatalog;
use crate::db::{self, NewSyncLog, Pool};
use crate::model::{LogStatus, SyncAction};
use crate::retry::RetryPolicy;

/// Tracks per add/remove call; Spotify rejects larger requests.
pub const CHUNK_SIZE: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTrack {
    pub song_id: i64,
    pub uri: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteReport {
    pub written: i64,
    pub failed: i64,
    pub failed_chunks: usize,
}

pub struct BatchTrackWriter<'a> {
    pool: &'a Pool,
    catalog: &'a dyn RemoteCatalog,
    retry: RetryPolicy,
    precise_accounting: bool,
}

impl<'a> BatchTrackWriter<'a> {
    pub fn new(
        pool: &'a Pool,
        catalog: &'a dyn RemoteCatalog,
        retry: RetryPolicy,
        precise_accounting: bool,
    ) -> Self {
        Self {
            pool,
            catalog,
            retry,
            precise_accounting,
        }
    }

    /// Append `tracks` in order, one remote call per chunk. A failed chunk
    /// counts all of its tracks as failed unless precise accounting is on, in
    /// which case its tracks are re-sent one by one. Every track gets an
    /// `add-track` log row.
    #[instrument(skip_all, fields(sync_id = sync_id, external_id = %external_id, tracks = tracks.len()))]
    pub async fn write_all(
        &self,
        sync_id: i64,
        run_id: &str,
        external_id: &str,
        tracks: &[ResolvedTrack],
    ) -> Result<WriteReport> {
        let mut report = WriteReport::default();

        for (index, chunk) in tracks.chunks(CHUNK_SIZE).enumerate() {
            let uris: Vec<String> = chunk.iter().map(|t| t.uri.clone()).collect();
            let outcome = self
                .retry
                .run("add_tracks", || self.catalog.add_tracks(external_id, &uris, None))
                .await;

            let mut entries = Vec::with_capacity(chunk.len());
            match outcome {
                Ok(()) => {
                    report.written += chunk.len() as i64;
                    entries.extend(chunk.iter().map(|t| add_log(sync_id, run_id, t, None)));
                }
                Err(err) if self.precise_accounting => {
                    warn!(chunk = index, error = %err, "chunk write failed; retrying track by track");
                    report.failed_chunks += 1;
                    for track in chunk {
                        let single = std::slice::from_ref(&track.uri);
                        match self
                            .retry
                            .run("add_tracks", || self.catalog.add_tracks(external_id, single, None))
                            .await
                        {
                            Ok(()) => {
                                report.written += 1;
                                entries.push(add_log(sync_id, run_id, track, None));
                            }
                            Err(err) => {
                                report.failed += 1;
                                entries.push(add_log(sync_id, run_id, track, Some(err.to_string())));
                            }
                        }
                    }
                }
                Err(err) => {
                    warn!(chunk = index, size = chunk.len(), error = %err, "chunk write failed");
                    report.failed_chunks += 1;
                    report.failed += chunk.len() as i64;
                    let message = format!("batch write failed: {}", err);
                    entries.extend(
                        chunk
                            .iter()
                            .map(|t| add_log(sync_id, run_id, t, Some(message.clone()))),
                    );
                }
            }
            db::append_sync_logs(self.pool, &entries).await?;
            db::touch_sync(self.pool, sync_id).await?;
        }

        info!(written = report.written, failed = report.failed, "tracks written");
        Ok(report)
    }

    /// Remove every track currently on the remote playlist. Remote failures
    /// end the clearing step and are logged, never returned. Returns the number
    /// of distinct URIs removed.
    #[instrument(skip_all, fields(sync_id = sync_id, external_id = %external_id))]
    pub async fn remove_all(&self, sync_id: i64, run_id: &str, external_id: &str) -> Result<usize> {
        let existing = match self
            .retry
            .run("get_playlist_tracks", || self.catalog.get_playlist_tracks(external_id))
            .await
        {
            Ok(uris) => uris,
            Err(err) => {
                warn!(error = %err, "failed to list remote tracks; skipping clear");
                db::append_sync_log(
                    self.pool,
                    &remove_log(sync_id, run_id, None, Some(format!("listing tracks failed: {}", err))),
                )
                .await?;
                return Ok(0);
            }
        };

        // The remove call drops every occurrence of a URI.
        let mut seen = HashSet::new();
        let unique: Vec<String> = existing
            .into_iter()
            .filter(|uri| seen.insert(uri.clone()))
            .collect();

        let mut removed = 0;
        for chunk in unique.chunks(CHUNK_SIZE) {
            let result = self
                .retry
                .run("remove_tracks", || self.catalog.remove_tracks(external_id, chunk))
                .await;
            let error = result.err().map(|err| format!("remove failed: {}", err));
            if let Some(message) = &error {
                warn!(size = chunk.len(), error = %message, "failed to clear remote tracks");
            } else {
                removed += chunk.len();
            }
            let entries: Vec<NewSyncLog> = chunk
                .iter()
                .map(|uri| remove_log(sync_id, run_id, Some(uri.clone()), error.clone()))
                .collect();
            db::append_sync_logs(self.pool, &entries).await?;
            db::touch_sync(self.pool, sync_id).await?;
            if error.is_some() {
                break;
            }
        }
        Ok(removed)
    }
}

fn add_log(sync_id: i64, run_id: &str, track: &ResolvedTrack, error: Option<String>) -> NewSyncLog {
    NewSyncLog {
        sync_id,
        song_id: Some(track.song_id),
        run_id: run_id.to_string(),
        action: SyncAction::AddTrack,
        status: if error.is_some() {
            LogStatus::Failed
        } else {
            LogStatus::Success
        },
        error_message: error,
        remote_uri: Some(track.uri.clone()),
    }
}

fn remove_log(sync_id: i64, run_id: &str, uri: Option<String>, error: Option<String>) -> NewSyncLog {
    NewSyncLog {
        sync_id,
        song_id: None,
        run_id: run_id.to_string(),
        action: SyncAction::RemoveTrack,
        status: if error.is_some() {
            LogStatus::Failed
        } else {
            LogStatus::Success
        },
        error_message: error,
        remote_uri: uri,
    }
}
