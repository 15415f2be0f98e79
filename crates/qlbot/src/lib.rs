//! # qlbot
//!
//! Replay front end for the qlbot agent: reads Quake Live server lines from a
//! file or standard input, runs them through the agent and its plugins, and
//! prints what the bot would have sent back.

mod app;
mod cli;
mod config;
mod logging;
mod replay;
mod signals;

use app::Application;
use cli::CliArgs;
use config::AppConfig;
use tracing::error;

/// Main entry point of the replay tool.
///
/// # Exit Codes
///
/// * **0**: Successful execution and shutdown
/// * **1**: Error during startup, configuration, or runtime
pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    let config = AppConfig::load_from_file(&args.config_path)
        .await
        .unwrap_or_default();

    let mut logging = config.logging.clone();
    if let Some(level) = &args.log_level {
        logging.level = level.clone();
    }
    if let Err(e) = logging::setup_logging(&logging, args.json_logs) {
        eprintln!("❌ Failed to setup logging: {e}");
        std::process::exit(1);
    }

    match Application::new(args).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {:?}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("❌ Failed to start application: {e:?}");
            std::process::exit(1);
        }
    }

    Ok(())
}

pub use app::bundled_plugin;
pub use config::{LoggingSettings, PluginSettings};
pub use replay::{Directive, ReplayHost, Replayer};
