//! Main application logic and lifecycle management.
//!
//! The `Application` builds the agent from the configuration, loads the
//! enabled plugins and replays the input until it ends or a shutdown signal
//! arrives.

use crate::replay::{ReplayHost, Replayer};
use crate::{cli::CliArgs, config::AppConfig, logging::display_banner, signals::setup_signal_handlers};
use plugin_greeter::GreeterPlugin;
use qlbot_event_system::{Agent, Plugin};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

/// Main application struct.
pub struct Application {
    /// Loaded application configuration
    config: AppConfig,
    /// Replay log, `None` for standard input
    input: Option<PathBuf>,
    replayer: Replayer,
}

/// Instantiates a bundled plugin by name.
pub fn bundled_plugin(name: &str) -> Option<Box<dyn Plugin>> {
    match name {
        "greeter" => Some(Box::new(GreeterPlugin::new())),
        _ => None,
    }
}

impl Application {
    /// Creates a new application instance.
    ///
    /// # Arguments
    ///
    /// * `args` - Parsed command-line arguments
    ///
    /// # Process
    ///
    /// 1. Load configuration from file (creating default if missing)
    /// 2. Apply command-line argument overrides
    /// 3. Validate merged configuration
    /// 4. Display startup banner
    /// 5. Build the agent and load the enabled plugins
    pub async fn new(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        info!("🔧 Loading configuration from: {}", args.config_path.display());
        let mut config = AppConfig::load_from_file(&args.config_path).await?;

        if let Some(nickname) = args.nickname {
            config.agent.nickname = nickname;
        }

        if let Some(log_level) = args.log_level {
            config.logging.level = log_level;
        }

        if args.json_logs {
            config.logging.json_format = true;
        }

        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {e}").into());
        } else {
            info!("✅ Configuration loaded and validated successfully");
        }

        display_banner();

        Ok(Self::from_config(config, args.input, args.emit_events))
    }

    /// Builds the application from an already validated configuration.
    pub fn from_config(config: AppConfig, input: Option<PathBuf>, emit_events: bool) -> Self {
        let host = Arc::new(ReplayHost::new());
        let agent = Agent::new(
            config.agent.clone(),
            host.clone(),
            Arc::new(config.permission_store()),
        );

        for name in &config.plugins.enabled {
            match bundled_plugin(name) {
                Some(plugin) => {
                    if let Err(e) = agent.load_plugin(plugin) {
                        error!("❌ Failed to load plugin '{}': {}", name, e);
                    }
                }
                None => warn!("⚠️ Unknown plugin '{}' skipped", name),
            }
        }

        info!(
            "🤖 Agent '{}' ready with {} plugins, command prefix '{}'",
            config.agent.nickname,
            agent.plugin_names().len(),
            config.agent.command_prefix
        );

        Self {
            config,
            input,
            replayer: Replayer::new(agent, host, emit_events),
        }
    }

    pub fn agent(&self) -> &Agent {
        self.replayer.agent()
    }

    /// Replays the input until it ends or a shutdown signal arrives, then
    /// unloads every plugin.
    pub async fn run(mut self) -> Result<(), Box<dyn std::error::Error>> {
        let reader: Box<dyn AsyncBufRead + Unpin + Send> = match &self.input {
            Some(path) => {
                info!("🔄 Replaying {}", path.display());
                Box::new(BufReader::new(tokio::fs::File::open(path).await?))
            }
            None => {
                info!("🔄 Replaying standard input");
                Box::new(BufReader::new(tokio::io::stdin()))
            }
        };

        let replayer = &mut self.replayer;
        let replay = async move {
            let mut lines = reader.lines();
            while let Some(line) = lines.next_line().await? {
                for output in replayer.feed(&line) {
                    println!("{output}");
                }
            }
            Ok::<(), std::io::Error>(())
        };

        tokio::select! {
            result = replay => {
                result?;
                info!("✅ Replay finished");
            }
            result = setup_signal_handlers() => {
                result?;
            }
        }

        self.shutdown();
        Ok(())
    }

    fn shutdown(&self) {
        let agent = self.agent();
        agent.on_unload();
        for output in self.replayer.host().take_output() {
            println!("{output}");
        }

        let stats = agent.bus().stats();
        info!(
            "📊 {} lines, {} events, {} handler calls, {} faults",
            self.replayer.lines(),
            self.replayer.events(),
            stats.handlers_invoked,
            stats.handler_faults
        );
        for fault in agent.bus().recent_faults() {
            warn!("⚠️ Handler fault: {:?}", fault);
        }
        info!("🛑 {} shut down", self.config.agent.nickname);
    }
}
