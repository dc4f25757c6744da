use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use playlist_sync::config;
use playlist_sync::db::{self, NewPlaylist};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Load a playlist (with songs and optional cached Spotify URIs) from a JSON file"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Playlist JSON file
    file: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let raw = tokio::fs::read_to_string(&args.file)
        .await
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let playlist: NewPlaylist =
        serde_json::from_str(&raw).context("playlist file is not valid JSON")?;

    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;

    let playlist_id = db::import_playlist(&pool, &playlist).await?;
    info!(
        playlist_id,
        songs = playlist.songs.len(),
        "playlist imported"
    );
    println!("{}", playlist_id);
    Ok(())
}
