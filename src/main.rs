use anyhow::Result;
use clap::{Args as ClapArgs, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use playlist_sync::batch::BatchCoordinator;
use playlist_sync::config;
use playlist_sync::db;
use playlist_sync::error::SyncError;
use playlist_sync::model::{ConflictPolicy, Platform, SyncOptions};
use playlist_sync::orchestrator::{EngineSettings, SyncEngine};
use playlist_sync::spotify::SpotifyClient;

#[derive(Debug, Parser)]
#[command(author, version, about = "Mirror local playlists onto a streaming platform")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Owner the playlists are scoped to
    #[arg(long)]
    owner: i64,

    /// Target platform
    #[arg(long, default_value = "spotify")]
    platform: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sync one playlist
    Sync {
        playlist_id: i64,
        #[command(flatten)]
        options: OptionArgs,
    },
    /// Sync up to 10 playlists one after another
    Batch {
        #[arg(required = true)]
        playlist_ids: Vec<i64>,
        #[command(flatten)]
        options: OptionArgs,
    },
    /// Show the persisted sync state of a playlist
    Status { playlist_id: i64 },
}

#[derive(Debug, ClapArgs)]
struct OptionArgs {
    /// Fail instead of creating a remote playlist when none is mapped
    #[arg(long)]
    no_create: bool,

    /// Append without clearing the existing remote tracks
    #[arg(long)]
    no_update: bool,

    /// Skip ambiguous matches instead of taking the first candidate
    #[arg(long)]
    flag_conflicts: bool,
}

impl OptionArgs {
    fn to_options(&self) -> SyncOptions {
        SyncOptions {
            create_if_not_exists: !self.no_create,
            update_existing: !self.no_update,
            conflict_policy: if self.flag_conflicts {
                ConflictPolicy::FlagAndSkip
            } else {
                ConflictPolicy::AutoResolve
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(()) => Ok(()),
        Err(err) => {
            error!(error = %err, status = err.http_status(), "command failed");
            Err(err.into())
        }
    }
}

async fn run(args: Args) -> Result<(), SyncError> {
    let platform = Platform::parse(&args.platform)
        .ok_or_else(|| SyncError::UnsupportedPlatform(args.platform.clone()))?;

    let cfg = config::load(Some(&args.config)).map_err(|e| SyncError::Config(e.to_string()))?;
    cfg.ensure_dirs()
        .map_err(|e| SyncError::Config(format!("failed to create data dir: {}", e)))?;

    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;

    let catalog = match platform {
        Platform::Spotify => Arc::new(SpotifyClient::from_config(&cfg)?),
    };
    let engine = SyncEngine::new(pool, catalog, EngineSettings::from_config(&cfg));
    info!(platform = %platform, owner = args.owner, "engine ready");

    match args.command {
        Command::Sync {
            playlist_id,
            options,
        } => {
            let result = engine
                .synchronize(playlist_id, args.owner, &options.to_options())
                .await?;
            print_json(&result)
        }
        Command::Batch {
            playlist_ids,
            options,
        } => {
            let coordinator =
                BatchCoordinator::new(&engine, Duration::from_millis(cfg.sync.batch_delay_ms));
            let result = coordinator
                .synchronize_many(&playlist_ids, args.owner, &options.to_options())
                .await?;
            print_json(&result)
        }
        Command::Status { playlist_id } => {
            let report = engine.status(playlist_id, args.owner).await?;
            print_json(&report)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), SyncError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| SyncError::Storage(anyhow::Error::new(e).context("failed to render result")))?;
    println!("{}", json);
    Ok(())
}
