use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::types::LogLevel;

#[derive(Parser, Debug)]
#[command(
    name = "eventcam",
    version,
    about = "Capture photos into shared event galleries"
)]
pub struct Cli {
    #[command(flatten)]
    pub backend: BackendArgs,

    /// Directory for the session file, capture spool and ledger
    #[arg(long, global = true, default_value = "~/.eventcam")]
    pub data_directory: String,

    /// HTTP request timeout in seconds
    #[arg(long, global = true, default_value_t = 30)]
    pub timeout: u64,

    /// Log level
    #[arg(long, global = true, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    #[command(subcommand)]
    pub command: Command,
}

/// Backend endpoints. Required by every command that talks to the network.
#[derive(Args, Debug)]
pub struct BackendArgs {
    /// Base URL of the backend (auth and REST APIs live under it)
    #[arg(long, global = true, env = "EVENTCAM_BACKEND_URL")]
    pub backend_url: Option<String>,

    /// Public API key sent with every backend request.
    /// Prefer the EVENTCAM_API_KEY environment variable over the flag.
    #[arg(long, global = true, env = "EVENTCAM_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Unsigned upload endpoint of the media service
    #[arg(long, global = true, env = "EVENTCAM_UPLOAD_URL")]
    pub upload_url: Option<String>,

    /// Upload preset name for unsigned uploads
    #[arg(long, global = true, env = "EVENTCAM_UPLOAD_PRESET")]
    pub upload_preset: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Establish the device identity and print its subject
    Whoami,

    /// List events this device belongs to
    Events,

    /// List photos registered against an event
    Assets(AssetsArgs),

    /// Take a photo and register it against an event
    Capture(CaptureArgs),

    /// Show the capture ledger: run counts and orphaned uploads
    Status(StatusArgs),

    /// Interactive session reading commands from stdin
    Shell,
}

#[derive(Args, Debug)]
pub struct AssetsArgs {
    /// Event id
    #[arg(short, long)]
    pub event: String,
}

#[derive(Args, Debug)]
pub struct CaptureArgs {
    /// Event id
    #[arg(short, long)]
    pub event: String,

    /// Image to capture. Without it the shutter is cancelled.
    #[arg(long)]
    pub photo: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Also list recent runs
    #[arg(long)]
    pub recent: Option<u32>,
}
