//! eventcam: capture photos into shared event galleries.
//!
//! The device signs in anonymously on first launch, then each capture is
//! uploaded to object storage and registered as an asset of the chosen event.
//! Gallery reads go through a stale-while-revalidate cache that the capture
//! pipeline invalidates after every successful registration.

#![warn(clippy::all)]

mod auth;
mod cache;
mod camera;
mod cli;
mod config;
mod gallery;
mod http;
mod ledger;
mod pipeline;
mod storage;
mod types;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use auth::{BootstrapState, HttpIdentityService, SessionBootstrap, SessionStore};
use cache::{GalleryQueries, QueryKey};
use camera::FileCamera;
use cli::Command;
use config::{Config, Paths};
use gallery::PostgrestGallery;
use ledger::{CaptureLedger, SqliteLedger};
use pipeline::{CapturePipeline, PipelineError};
use storage::HttpObjectStore;
use types::EventId;

/// Everything a networked command needs, wired once per process.
struct App {
    bootstrap: Arc<SessionBootstrap>,
    queries: Arc<GalleryQueries>,
    camera: Arc<FileCamera>,
    pipeline: CapturePipeline,
}

impl App {
    async fn build(config: &Config) -> anyhow::Result<Self> {
        let client = http::build_client(config.timeout)?;

        let store = SessionStore::new(&config.paths.data_directory);
        tracing::debug!(path = %store.path().display(), "Using session file");
        let identity = HttpIdentityService::new(
            client.clone(),
            &config.backend_url,
            config.api_key.clone(),
            store,
        )?;
        let bootstrap = Arc::new(SessionBootstrap::new(Arc::new(identity)));

        let gallery = Arc::new(PostgrestGallery::new(
            client.clone(),
            &config.backend_url,
            config.api_key.clone(),
        )?);
        let store = Arc::new(HttpObjectStore::new(
            client,
            config.upload_url.clone(),
            config.upload_preset.clone(),
        ));
        let queries = Arc::new(GalleryQueries::new(gallery.clone(), bootstrap.clone()));
        let camera = Arc::new(FileCamera::new(config.paths.spool()));

        let mut pipeline = CapturePipeline::new(
            camera.clone(),
            store,
            gallery,
            bootstrap.clone(),
            queries.clone(),
        );
        match config::open_ledger(&config.paths).await {
            Ok(ledger) => pipeline = pipeline.with_ledger(Arc::new(ledger)),
            Err(e) => tracing::warn!(error = %e, "Capture ledger unavailable, runs will not be recorded"),
        }

        Ok(Self {
            bootstrap,
            queries,
            camera,
            pipeline,
        })
    }

    /// Wait for the device identity, failing with the bootstrap's reason.
    async fn require_identity(&self) -> anyhow::Result<auth::Identity> {
        if let Some(identity) = self.bootstrap.ensure_identity().await {
            return Ok(identity);
        }
        match self.bootstrap.state() {
            BootstrapState::Failed { reason } => anyhow::bail!("No identity available: {reason}"),
            other => anyhow::bail!("No identity available (state: {other:?})"),
        }
    }

    async fn whoami(&self) -> anyhow::Result<()> {
        let identity = self.require_identity().await?;
        println!("{}", identity.subject());
        Ok(())
    }

    async fn events(&self) -> anyhow::Result<()> {
        let stale = self.queries.is_fresh(&QueryKey::EventsList) == Some(false);
        let events = self.queries.events().await?;
        if events.is_empty() {
            println!("No events.");
        }
        for event in events {
            let created = event
                .created_at
                .map(|t| t.format("%Y-%m-%d").to_string())
                .unwrap_or_default();
            println!(
                "  {}  {}  {}",
                event.id,
                event.name.as_deref().unwrap_or("(unnamed)"),
                created
            );
        }
        if stale {
            println!("(stale, refreshing)");
        }
        Ok(())
    }

    async fn assets(&self, event_id: &EventId) -> anyhow::Result<()> {
        let stale = self.queries.is_fresh(&QueryKey::EventAssets(event_id.clone())) == Some(false);
        let assets = self.queries.event_assets(event_id).await?;
        println!("{} photo(s) in {}", assets.len(), event_id);
        for asset in assets {
            let when = asset
                .created_at
                .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                .unwrap_or_default();
            println!(
                "  {}  {}  by {}  {}",
                asset.id,
                asset.media_reference,
                asset
                    .user_id
                    .as_ref()
                    .map(|u| u.as_str())
                    .unwrap_or("unknown"),
                when
            );
        }
        if stale {
            println!("(stale, refreshing)");
        }
        Ok(())
    }

    /// Run one capture. A cancelled shutter is reported, not an error.
    async fn capture(&self, event_id: &EventId, photo: Option<PathBuf>) -> anyhow::Result<()> {
        self.require_identity().await?;
        if let Some(photo) = photo {
            self.camera.load(photo);
        }
        match self.pipeline.capture_photo_for_event(event_id).await {
            Ok(asset_id) => {
                println!("Registered photo {asset_id} in {event_id}");
                Ok(())
            }
            Err(PipelineError::NoPhotoCaptured) => {
                println!("No photo captured.");
                Ok(())
            }
            Err(e) => {
                if let Some(reference) = e.orphaned_reference() {
                    eprintln!("Uploaded media {reference} was not registered.");
                }
                if e.is_recoverable() {
                    eprintln!("You can try the capture again.");
                }
                Err(e.into())
            }
        }
    }
}

/// Run the status command. Needs only the data directory.
async fn run_status(paths: &Paths, args: &cli::StatusArgs) -> anyhow::Result<()> {
    let db_path = paths.ledger();
    if !db_path.exists() {
        println!("No capture ledger found at {}", db_path.display());
        println!("Run a capture first to create it.");
        return Ok(());
    }

    let ledger = SqliteLedger::open(&db_path).await?;
    let summary = ledger.get_summary().await?;

    println!("Capture ledger: {}", db_path.display());
    println!();
    println!("Runs:");
    println!("  Total:               {}", summary.total);
    println!("  Registered:          {}", summary.registered);
    println!("  Cancelled:           {}", summary.cancelled);
    println!("  Upload failed:       {}", summary.upload_failed);
    println!("  Registration failed: {}", summary.registration_failed);
    println!("  In progress:         {}", summary.in_progress);
    if let Some(last) = &summary.last_capture_at {
        println!();
        println!("Last capture: {}", last.format("%Y-%m-%d %H:%M:%S UTC"));
    }

    let orphaned = ledger.get_orphaned().await?;
    if !orphaned.is_empty() {
        println!();
        println!("Orphaned uploads (stored but not registered):");
        for record in orphaned {
            println!(
                "  {} in {} by {} at {} - {}",
                record.media_reference.as_deref().unwrap_or("?"),
                record.event_id,
                record.subject.as_deref().unwrap_or("no identity"),
                record.updated_at.format("%Y-%m-%d %H:%M:%S UTC"),
                record.last_error.as_deref().unwrap_or("interrupted")
            );
        }
    }

    if let Some(limit) = args.recent {
        println!();
        println!("Recent runs:");
        for record in ledger.get_recent(limit).await? {
            let detail = record
                .asset_id
                .as_deref()
                .or(record.media_reference.as_deref())
                .map(str::to_string)
                .or_else(|| record.local_path.as_ref().map(|p| p.display().to_string()))
                .unwrap_or_default();
            println!(
                "  {}  {}  {}  {:<20} {}",
                record.created_at.format("%Y-%m-%d %H:%M:%S"),
                record.run_id,
                record.event_id,
                record.status.as_str(),
                detail
            );
        }
    }

    Ok(())
}

const SHELL_HELP: &str = "\
Commands:
  whoami                   print the device subject
  events                   list events
  assets <event>           list photos in an event
  capture <event> [photo]  capture a photo (no photo = cancelled shutter)
  state                    show bootstrap state
  help                     show this help
  quit                     exit";

/// Line-oriented session over one process, so cached reads and background
/// refreshes are visible across commands.
async fn run_shell(app: App) -> anyhow::Result<()> {
    let bootstrap = app.bootstrap.clone();
    let mut states = bootstrap.subscribe();
    tokio::spawn(async move {
        bootstrap.ensure_identity().await;
    });
    tokio::spawn(async move {
        let settled = states
            .wait_for(BootstrapState::is_settled)
            .await
            .map(|state| state.clone());
        match settled {
            Ok(BootstrapState::Authenticated(identity)) => {
                println!("Signed in as {}", identity.subject());
            }
            Ok(BootstrapState::Failed { reason }) => eprintln!("Sign-in failed: {reason}"),
            _ => {}
        }
    });

    println!("{SHELL_HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let words: Vec<&str> = line.split_whitespace().collect();
        let result = match words.as_slice() {
            [] => continue,
            ["quit" | "exit"] => break,
            ["help"] => {
                println!("{SHELL_HELP}");
                Ok(())
            }
            ["state"] => {
                println!("{:?}", app.bootstrap.state());
                Ok(())
            }
            ["whoami"] => app.whoami().await,
            ["events"] => app.events().await,
            ["assets", event] => match EventId::new(*event) {
                Ok(id) => app.assets(&id).await,
                Err(e) => Err(e.into()),
            },
            ["capture", event, rest @ ..] if rest.len() <= 1 => match EventId::new(*event) {
                Ok(id) => app.capture(&id, rest.first().map(PathBuf::from)).await,
                Err(e) => Err(e.into()),
            },
            _ => {
                println!("Unknown command. Type 'help'.");
                Ok(())
            }
        };
        if let Err(e) = result {
            eprintln!("Error: {e:#}");
        }
    }

    app.queries.clear();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_filter())),
        )
        .init();

    let paths = Paths::from_cli(&cli);
    if let Command::Status(args) = &cli.command {
        return run_status(&paths, args).await;
    }

    let config = Config::from_cli(&cli)?;
    tracing::debug!(config = ?config, "Starting eventcam");
    let app = App::build(&config).await?;

    match cli.command {
        Command::Whoami => app.whoami().await,
        Command::Events => app.events().await,
        Command::Assets(args) => app.assets(&EventId::new(args.event)?).await,
        Command::Capture(args) => app.capture(&EventId::new(args.event)?, args.photo).await,
        Command::Shell => run_shell(app).await,
        Command::Status(_) => Ok(()),
    }
}
