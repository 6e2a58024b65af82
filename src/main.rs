#![forbid(unsafe_code)]

mod config;
mod constants;
mod content;
mod font;
mod hotkeys;
mod layout;
mod overlay;
mod persistence;
mod toggle;
mod x11_utils;

use clap::Parser;
use std::path::PathBuf;
use tracing::{Level as TraceLevel, error, info};
use tracing_subscriber::FmtSubscriber;

use config::OverlayConfig;

#[derive(Parser, Debug)]
#[command(
    name = "web-overlay",
    version,
    about = "Always-on-top transparent overlay composing web sources on X11"
)]
struct Cli {
    /// Configuration document (JSON)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Window bounds file [default: window-state.json beside the config]
    #[arg(long, value_name = "PATH")]
    state: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Parse log level from environment variable
    let log_level = match std::env::var("LOG_LEVEL")
        .unwrap_or_else(|_| "info".to_string())
        .to_lowercase()
        .as_str()
    {
        "trace" => TraceLevel::TRACE,
        "debug" => TraceLevel::DEBUG,
        "warn" => TraceLevel::WARN,
        "error" => TraceLevel::ERROR,
        _ => TraceLevel::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = cli.config.unwrap_or_else(OverlayConfig::default_path);
    let state_path = cli
        .state
        .unwrap_or_else(|| OverlayConfig::state_path_for(&config_path));

    // No window is created without a usable config
    let config = match OverlayConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            error!(path = %e.path().display(), error = %e, "Cannot start overlay");
            std::process::exit(1);
        }
    };
    info!(state = %state_path.display(), hotkey = %config.hotkey, "Starting overlay");

    overlay::run_overlay(&config, &state_path)?;
    Ok(())
}
