//! Sync ledger: one `playlist_syncs` row per (playlist, platform) and the
//! append-only `sync_logs` audit trail.

use super::model::NewSyncLog;
use super::repo::Pool;
use crate::model::{
    LogStatus, Platform, PlaylistSync, SyncAction, SyncLog, SyncStats, SyncStatus,
    SyncStatusReport,
};
use anyhow::{anyhow, Context, Result};
use chrono::{Duration, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, Transaction};
use tracing::instrument;

const SYNC_COLUMNS: &str = "id, playlist_id, platform, status, external_id, total_count, \
     success_count, conflict_count, error_count, last_sync_at, error_message";

fn sync_from_row(row: &SqliteRow) -> Result<PlaylistSync> {
    let id: i64 = row.get("id");
    let platform_str: String = row.get("platform");
    let status_str: String = row.get("status");
    Ok(PlaylistSync {
        id,
        playlist_id: row.get("playlist_id"),
        platform: Platform::parse(&platform_str)
            .ok_or_else(|| anyhow!("sync {} has unknown platform {}", id, platform_str))?,
        status: SyncStatus::parse_status(&status_str)
            .ok_or_else(|| anyhow!("sync {} has unknown status {}", id, status_str))?,
        external_id: row
            .try_get::<Option<String>, _>("external_id")
            .ok()
            .flatten()
            .filter(|s| !s.trim().is_empty()),
        total_count: row.get("total_count"),
        success_count: row.get("success_count"),
        conflict_count: row.get("conflict_count"),
        error_count: row.get("error_count"),
        last_sync_at: row.try_get("last_sync_at").ok().flatten(),
        error_message: row.try_get::<Option<String>, _>("error_message").ok().flatten(),
    })
}

fn log_from_row(row: &SqliteRow) -> Result<SyncLog> {
    let id: i64 = row.get("id");
    let action_str: String = row.get("action");
    let status_str: String = row.get("status");
    Ok(SyncLog {
        id,
        sync_id: row.get("sync_id"),
        song_id: row.try_get::<Option<i64>, _>("song_id").ok().flatten(),
        run_id: row.get("run_id"),
        action: SyncAction::parse_action(&action_str)
            .ok_or_else(|| anyhow!("sync log {} has unknown action {}", id, action_str))?,
        status: LogStatus::parse_log_status(&status_str)
            .ok_or_else(|| anyhow!("sync log {} has unknown status {}", id, status_str))?,
        error_message: row.try_get::<Option<String>, _>("error_message").ok().flatten(),
        remote_uri: row.try_get::<Option<String>, _>("remote_uri").ok().flatten(),
        created_at: row.get("created_at"),
    })
}

/// Get-or-create the sync row for (playlist, platform) and move it to
/// IN_PROGRESS with counters reset, in one statement.
///
/// Returns `None` when another run holds the row: it is IN_PROGRESS and was
/// touched less than `stale_after` ago. Nothing is written in that case.
#[instrument(skip(pool))]
pub async fn claim_sync(
    pool: &Pool,
    playlist_id: i64,
    platform: Platform,
    total: i64,
    stale_after: Duration,
) -> Result<Option<PlaylistSync>> {
    let now = Utc::now();
    let sql = format!(
        "INSERT INTO playlist_syncs \
           (playlist_id, platform, status, total_count, success_count, conflict_count, error_count, error_message, updated_at) \
         VALUES (?, ?, 'IN_PROGRESS', ?, 0, 0, 0, NULL, ?) \
         ON CONFLICT(playlist_id, platform) DO UPDATE SET \
           status = 'IN_PROGRESS', total_count = excluded.total_count, success_count = 0, \
           conflict_count = 0, error_count = 0, error_message = NULL, updated_at = excluded.updated_at \
         WHERE playlist_syncs.status != 'IN_PROGRESS' \
            OR datetime(playlist_syncs.updated_at) <= datetime(?) \
         RETURNING {}",
        SYNC_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(playlist_id)
        .bind(platform.as_str())
        .bind(total)
        .bind(now)
        .bind(now - stale_after)
        .fetch_optional(pool)
        .await
        .context("failed to claim sync row")?;
    row.as_ref().map(sync_from_row).transpose()
}

#[instrument(skip(pool))]
pub async fn find_sync(
    pool: &Pool,
    playlist_id: i64,
    platform: Platform,
) -> Result<Option<PlaylistSync>> {
    let sql = format!(
        "SELECT {} FROM playlist_syncs WHERE playlist_id = ? AND platform = ?",
        SYNC_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(playlist_id)
        .bind(platform.as_str())
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(sync_from_row).transpose()
}

pub async fn set_sync_external_id(pool: &Pool, sync_id: i64, external_id: &str) -> Result<()> {
    sqlx::query("UPDATE playlist_syncs SET external_id = ?, updated_at = ? WHERE id = ?")
        .bind(external_id)
        .bind(Utc::now())
        .bind(sync_id)
        .execute(pool)
        .await
        .context("failed to persist remote playlist id")?;
    Ok(())
}

/// Write the running counters of an in-flight run. Also refreshes the claim.
#[instrument(skip(pool))]
pub async fn record_progress(pool: &Pool, sync_id: i64, stats: &SyncStats) -> Result<()> {
    sqlx::query(
        "UPDATE playlist_syncs SET success_count = ?, conflict_count = ?, error_count = ?, updated_at = ? \
         WHERE id = ?",
    )
    .bind(stats.success)
    .bind(stats.conflict)
    .bind(stats.error)
    .bind(Utc::now())
    .bind(sync_id)
    .execute(pool)
    .await
    .context("failed to persist sync progress")?;
    Ok(())
}

/// Refresh the claim of an in-flight run without touching its counters.
pub async fn touch_sync(pool: &Pool, sync_id: i64) -> Result<()> {
    sqlx::query("UPDATE playlist_syncs SET updated_at = ? WHERE id = ? AND status = 'IN_PROGRESS'")
        .bind(Utc::now())
        .bind(sync_id)
        .execute(pool)
        .await
        .context("failed to refresh sync claim")?;
    Ok(())
}

#[instrument(skip(pool))]
pub async fn finish_sync(
    pool: &Pool,
    sync_id: i64,
    status: SyncStatus,
    stats: &SyncStats,
    error_message: Option<&str>,
) -> Result<()> {
    let now = Utc::now();
    sqlx::query(
        "UPDATE playlist_syncs SET status = ?, total_count = ?, success_count = ?, conflict_count = ?, \
         error_count = ?, error_message = ?, last_sync_at = ?, updated_at = ? WHERE id = ?",
    )
    .bind(status.as_str())
    .bind(stats.total)
    .bind(stats.success)
    .bind(stats.conflict)
    .bind(stats.error)
    .bind(error_message)
    .bind(now)
    .bind(now)
    .bind(sync_id)
    .execute(pool)
    .await
    .context("failed to persist sync outcome")?;
    Ok(())
}

pub async fn append_sync_log(pool: &Pool, entry: &NewSyncLog) -> Result<i64> {
    let mut tx = pool.begin().await?;
    let id = append_sync_log_tx(&mut tx, entry).await?;
    tx.commit().await?;
    Ok(id)
}

/// Append several audit rows atomically, in order.
pub async fn append_sync_logs(pool: &Pool, entries: &[NewSyncLog]) -> Result<()> {
    if entries.is_empty() {
        return Ok(());
    }
    let mut tx = pool.begin().await?;
    for entry in entries {
        append_sync_log_tx(&mut tx, entry).await?;
    }
    tx.commit().await?;
    Ok(())
}

async fn append_sync_log_tx(tx: &mut Transaction<'_, Sqlite>, entry: &NewSyncLog) -> Result<i64> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO sync_logs (sync_id, song_id, run_id, action, status, error_message, remote_uri, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(entry.sync_id)
    .bind(entry.song_id)
    .bind(&entry.run_id)
    .bind(entry.action.as_str())
    .bind(entry.status.as_str())
    .bind(entry.error_message.as_deref())
    .bind(entry.remote_uri.as_deref())
    .bind(Utc::now())
    .fetch_one(&mut **tx)
    .await
    .context("failed to append sync log")?;
    Ok(id)
}

/// Most recent audit rows of a sync, newest first.
pub async fn recent_sync_logs(pool: &Pool, sync_id: i64, limit: i64) -> Result<Vec<SyncLog>> {
    let rows = sqlx::query(
        "SELECT id, sync_id, song_id, run_id, action, status, error_message, remote_uri, created_at \
         FROM sync_logs WHERE sync_id = ? ORDER BY id DESC LIMIT ?",
    )
    .bind(sync_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    rows.iter().map(log_from_row).collect()
}

/// All audit rows of one run, oldest first.
pub async fn run_sync_logs(pool: &Pool, run_id: &str) -> Result<Vec<SyncLog>> {
    let rows = sqlx::query(
        "SELECT id, sync_id, song_id, run_id, action, status, error_message, remote_uri, created_at \
         FROM sync_logs WHERE run_id = ? ORDER BY id ASC",
    )
    .bind(run_id)
    .fetch_all(pool)
    .await?;
    rows.iter().map(log_from_row).collect()
}

pub async fn count_sync_logs(pool: &Pool, sync_id: i64) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_logs WHERE sync_id = ?")
        .bind(sync_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Read-only status of a (playlist, platform) pair with its latest logs.
#[instrument(skip(pool))]
pub async fn sync_status_report(
    pool: &Pool,
    playlist_id: i64,
    platform: Platform,
    log_limit: i64,
) -> Result<SyncStatusReport> {
    let Some(sync) = find_sync(pool, playlist_id, platform).await? else {
        return Ok(SyncStatusReport::not_synced());
    };
    let logs = recent_sync_logs(pool, sync.id, log_limit).await?;
    Ok(SyncStatusReport::Synced { sync, logs })
}
