//! Command-line interface handling for the qlbot replay tool.
//!
//! Arguments override the matching settings of the configuration file.

use clap::{Arg, ArgAction, Command};
use std::path::PathBuf;

/// Command line arguments parsed from user input.
#[derive(Debug, Clone)]
pub struct CliArgs {
    /// Path to the configuration file
    pub config_path: PathBuf,
    /// Server line log to replay. `None` reads standard input.
    pub input: Option<PathBuf>,
    /// Optional override for the bot's nickname
    pub nickname: Option<String>,
    /// Optional override for log level
    pub log_level: Option<String>,
    /// Whether to force JSON log output
    pub json_logs: bool,
    /// Whether to print every dispatched event as a JSON line
    pub emit_events: bool,
}

impl CliArgs {
    /// Parses command line arguments using clap.
    ///
    /// # Returns
    ///
    /// A `CliArgs` instance containing all parsed command-line options.
    pub fn parse() -> Self {
        let matches = Command::new("qlbot")
            .version(env!("CARGO_PKG_VERSION"))
            .about("Replays Quake Live server lines through the bot agent and its plugins")
            .arg(
                Arg::new("input")
                    .value_name("FILE")
                    .help("Server line log to replay (standard input when omitted)")
                    .index(1),
            )
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .value_name("FILE")
                    .help("Configuration file path")
                    .default_value("qlbot.toml"),
            )
            .arg(
                Arg::new("nickname")
                    .short('n')
                    .long("nickname")
                    .value_name("NAME")
                    .help("Name the bot plays under"),
            )
            .arg(
                Arg::new("log-level")
                    .short('l')
                    .long("log-level")
                    .value_name("LEVEL")
                    .help("Log level (trace, debug, info, warn, error)"),
            )
            .arg(
                Arg::new("json-logs")
                    .long("json-logs")
                    .help("Output logs in JSON format")
                    .action(ArgAction::SetTrue),
            )
            .arg(
                Arg::new("emit-events")
                    .short('e')
                    .long("emit-events")
                    .help("Print every dispatched event as a JSON line")
                    .action(ArgAction::SetTrue),
            )
            .get_matches();

        Self {
            config_path: PathBuf::from(
                matches
                    .get_one::<String>("config")
                    .map(String::as_str)
                    .unwrap_or("qlbot.toml"),
            ),
            input: matches.get_one::<String>("input").map(PathBuf::from),
            nickname: matches.get_one::<String>("nickname").cloned(),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
            emit_events: matches.get_flag("emit-events"),
        }
    }
}
