use super::model::NewPlaylist;
use crate::model::{Platform, Playlist, Song};
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tracing::instrument;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized)
        .await
        .with_context(|| format!("failed to open database {}", normalized))?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// For file-backed SQLite URLs, expand a leading `~/`, make sure the parent
/// directory exists and ask SQLite to create the file. In-memory URLs and
/// other schemes pass through untouched.
fn prepare_sqlite_url(url: &str) -> String {
    let Some(rest) = url.strip_prefix("sqlite:") else {
        return url.to_string();
    };
    if rest.starts_with(":memory") {
        return url.to_string();
    }
    let rest = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match rest.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (rest, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(tail), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), tail),
        _ => path_part.to_string(),
    };
    if let Some(parent) = std::path::Path::new(&expanded).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let query = match query_part {
        Some(q) if q.contains("mode=") => q.to_string(),
        Some(q) => format!("{}&mode=rwc", q),
        None => "mode=rwc".to_string(),
    };
    format!("sqlite://{}?{}", expanded, query)
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Load a playlist owned by `owner_id` with its songs in stored order. Each
/// song carries its cached identifier for `platform`, if any.
#[instrument(skip(pool))]
pub async fn load_playlist(
    pool: &Pool,
    playlist_id: i64,
    owner_id: i64,
    platform: Platform,
) -> Result<Option<Playlist>> {
    let row = sqlx::query(
        "SELECT id, owner_id, name, description, is_public FROM playlists WHERE id = ? AND owner_id = ?",
    )
    .bind(playlist_id)
    .bind(owner_id)
    .fetch_optional(pool)
    .await?;
    let Some(row) = row else {
        return Ok(None);
    };

    let songs = sqlx::query(
        "SELECT s.id, s.title, s.artist, r.remote_uri \
         FROM playlist_songs ps \
         JOIN songs s ON s.id = ps.song_id \
         LEFT JOIN song_remote_ids r ON r.song_id = s.id AND r.platform = ? \
         WHERE ps.playlist_id = ? \
         ORDER BY ps.position ASC",
    )
    .bind(platform.as_str())
    .bind(playlist_id)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|r| Song {
        id: r.get("id"),
        title: r.get("title"),
        artist: r.get("artist"),
        remote_uri: r
            .try_get::<Option<String>, _>("remote_uri")
            .ok()
            .flatten()
            .filter(|s| !s.trim().is_empty()),
    })
    .collect();

    Ok(Some(Playlist {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        name: row.get("name"),
        description: row.try_get::<Option<String>, _>("description").ok().flatten(),
        is_public: row.get("is_public"),
        songs,
    }))
}

pub async fn playlist_owned_by(pool: &Pool, playlist_id: i64, owner_id: i64) -> Result<bool> {
    let found = sqlx::query_scalar::<_, i64>("SELECT id FROM playlists WHERE id = ? AND owner_id = ?")
        .bind(playlist_id)
        .bind(owner_id)
        .fetch_optional(pool)
        .await?;
    Ok(found.is_some())
}

#[instrument(skip_all)]
pub async fn insert_playlist(
    pool: &Pool,
    owner_id: i64,
    name: &str,
    description: Option<&str>,
    is_public: bool,
) -> Result<i64> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO playlists (owner_id, name, description, is_public) VALUES (?, ?, ?, ?) RETURNING id",
    )
    .bind(owner_id)
    .bind(name)
    .bind(description)
    .bind(is_public)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

#[instrument(skip_all)]
pub async fn get_or_create_song(pool: &Pool, title: &str, artist: &str) -> Result<i64> {
    if let Some(id) =
        sqlx::query_scalar::<_, i64>("SELECT id FROM songs WHERE title = ? AND artist = ?")
            .bind(title)
            .bind(artist)
            .fetch_optional(pool)
            .await?
    {
        return Ok(id);
    }

    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO songs (title, artist) VALUES (?, ?) RETURNING id",
    )
    .bind(title)
    .bind(artist)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

/// Append a song at the end of a playlist. Returns its 1-based position.
#[instrument(skip_all)]
pub async fn append_song(pool: &Pool, playlist_id: i64, song_id: i64) -> Result<i64> {
    let mut tx = pool.begin().await?;
    let max_pos: Option<i64> =
        sqlx::query_scalar("SELECT MAX(position) FROM playlist_songs WHERE playlist_id = ?")
            .bind(playlist_id)
            .fetch_one(&mut *tx)
            .await?;
    let position = max_pos.unwrap_or(0) + 1;
    sqlx::query("INSERT INTO playlist_songs (playlist_id, song_id, position) VALUES (?, ?, ?)")
        .bind(playlist_id)
        .bind(song_id)
        .bind(position)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(position)
}

/// Insert a playlist with its songs, reusing songs that already exist and
/// seeding known Spotify identifiers into the identity cache.
pub async fn import_playlist(pool: &Pool, playlist: &NewPlaylist) -> Result<i64> {
    let playlist_id = insert_playlist(
        pool,
        playlist.owner_id,
        &playlist.name,
        playlist.description.as_deref(),
        playlist.is_public,
    )
    .await
    .context("failed to insert playlist")?;

    for song in &playlist.songs {
        let song_id = get_or_create_song(pool, &song.title, &song.artist).await?;
        append_song(pool, playlist_id, song_id).await?;
        if let Some(uri) = song.spotify_uri.as_deref().filter(|u| !u.trim().is_empty()) {
            upsert_song_remote_uri(pool, song_id, Platform::Spotify, uri).await?;
        }
    }
    Ok(playlist_id)
}

pub async fn song_remote_uri(pool: &Pool, song_id: i64, platform: Platform) -> Result<Option<String>> {
    let uri = sqlx::query_scalar::<_, String>(
        "SELECT remote_uri FROM song_remote_ids WHERE song_id = ? AND platform = ?",
    )
    .bind(song_id)
    .bind(platform.as_str())
    .fetch_optional(pool)
    .await?;
    Ok(uri)
}

/// Record the remote identifier of a song on a platform. The cache is shared
/// by every playlist holding the song and the last writer wins. Writing the
/// same URI again is a no-op; a different URI bumps the version. Returns the
/// resulting version.
#[instrument(skip(pool))]
pub async fn upsert_song_remote_uri(
    pool: &Pool,
    song_id: i64,
    platform: Platform,
    remote_uri: &str,
) -> Result<i64> {
    let version = sqlx::query_scalar::<_, i64>(
        "INSERT INTO song_remote_ids (song_id, platform, remote_uri, version, updated_at) \
         VALUES (?, ?, ?, 1, ?) \
         ON CONFLICT(song_id, platform) DO UPDATE SET \
           version = CASE WHEN song_remote_ids.remote_uri = excluded.remote_uri \
                     THEN song_remote_ids.version ELSE song_remote_ids.version + 1 END, \
           updated_at = CASE WHEN song_remote_ids.remote_uri = excluded.remote_uri \
                        THEN song_remote_ids.updated_at ELSE excluded.updated_at END, \
           remote_uri = excluded.remote_uri \
         RETURNING version",
    )
    .bind(song_id)
    .bind(platform.as_str())
    .bind(remote_uri)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
    .context("failed to persist song remote identifier")?;
    Ok(version)
}
