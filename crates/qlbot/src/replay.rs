//! Offline replay of server traffic.
//!
//! A replay log holds one server line per line of text. Lines starting with
//! `#` are directives standing in for the other host callbacks:
//!
//! ```text
//! #gamestate 3 campgrounds
//! #status 8
//! cs 529 "\n\Mino\t\1"
//! chat "12 Mino^7\x19: ^2!hello"
//! #console server restarted
//! #command greeting Hi {name}
//! ## comment
//! ```
//!
//! The [`ReplayHost`] applies each configstring update only after the agent
//! is done with the line, the same way the game client does.

use qlbot_event_system::{Agent, Event, Host};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, warn};

/// Host that collects outbound traffic instead of talking to a server.
#[derive(Debug, Default)]
pub struct ReplayHost {
    configstrings: RwLock<HashMap<u16, String>>,
    output: Mutex<Vec<String>>,
}

impl ReplayHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a configstring on the host side.
    pub fn apply(&self, index: u16, value: &str) {
        self.configstrings
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(index, value.to_string());
    }

    /// Drains everything sent or printed since the last call.
    pub fn take_output(&self) -> Vec<String> {
        std::mem::take(&mut *self.output.lock().unwrap_or_else(|poisoned| poisoned.into_inner()))
    }

    fn push(&self, line: String) {
        self.output
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(line);
    }
}

impl Host for ReplayHost {
    fn send_command(&self, command: &str) {
        self.push(format!(">>> {command}"));
    }

    fn console_print(&self, text: &str) {
        self.push(text.trim_end_matches('\n').to_string());
    }

    fn live_configstring(&self, index: u16) -> Option<String> {
        self.configstrings
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&index)
            .cloned()
    }
}

/// One line of a replay log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive<'a> {
    /// A raw server line
    Line(&'a str),
    Gamestate { index: u16, value: &'a str },
    Status(i32),
    Console(&'a str),
    Command(&'a str),
    /// Blank line or `##` comment
    Skip,
}

impl<'a> Directive<'a> {
    /// Classifies a replay log line.
    ///
    /// # Returns
    ///
    /// An error message for unknown directives and unparsable arguments.
    pub fn parse(line: &'a str) -> Result<Self, String> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() || line.starts_with("##") {
            return Ok(Directive::Skip);
        }
        let Some(directive) = line.strip_prefix('#') else {
            return Ok(Directive::Line(line));
        };

        let (name, rest) = directive.split_once(' ').unwrap_or((directive, ""));
        match name {
            "gamestate" => {
                let (index, value) = rest.split_once(' ').unwrap_or((rest, ""));
                let index = index
                    .parse::<u16>()
                    .map_err(|e| format!("bad gamestate index '{index}': {e}"))?;
                Ok(Directive::Gamestate { index, value })
            }
            "status" => rest
                .trim()
                .parse::<i32>()
                .map(Directive::Status)
                .map_err(|e| format!("bad status code '{rest}': {e}")),
            "console" => Ok(Directive::Console(rest)),
            "command" => Ok(Directive::Command(rest)),
            other => Err(format!("unknown directive '#{other}'")),
        }
    }
}

/// Feeds a replay log through an agent.
#[derive(Debug)]
pub struct Replayer {
    agent: Agent,
    host: Arc<ReplayHost>,
    emit_events: bool,
    lines: u64,
    events: u64,
}

impl Replayer {
    /// # Arguments
    ///
    /// * `agent` - Agent built on top of `host`
    /// * `host` - The agent's host
    /// * `emit_events` - Whether `feed` also returns every event as JSON
    pub fn new(agent: Agent, host: Arc<ReplayHost>, emit_events: bool) -> Self {
        Self {
            agent,
            host,
            emit_events,
            lines: 0,
            events: 0,
        }
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    pub fn host(&self) -> &ReplayHost {
        &self.host
    }

    /// Lines fed so far, directives and skipped lines included.
    pub fn lines(&self) -> u64 {
        self.lines
    }

    /// Events dispatched so far.
    pub fn events(&self) -> u64 {
        self.events
    }

    /// Processes one replay log line.
    ///
    /// # Returns
    ///
    /// The output lines it produced: events as JSON (when enabled), then
    /// outbound commands and console text.
    pub fn feed(&mut self, line: &str) -> Vec<String> {
        self.lines += 1;

        let events = match Directive::parse(line) {
            Ok(Directive::Line(text)) => {
                let events = self.agent.on_message(text);
                for event in &events {
                    if let Event::ConfigstringChanged { index, value } = event {
                        self.host.apply(*index, value);
                    }
                }
                events
            }
            Ok(Directive::Gamestate { index, value }) => {
                let events = self.agent.on_gamestate_field(index, value);
                self.host.apply(index, &value.replace('\n', ""));
                events
            }
            Ok(Directive::Status(code)) => self.agent.on_connection_status(code),
            Ok(Directive::Console(text)) => vec![self.agent.on_console_line(text)],
            Ok(Directive::Command(text)) => {
                let invoked = self.agent.on_console_command(text);
                debug!("Console command '{}' invoked {} commands", text, invoked);
                Vec::new()
            }
            Ok(Directive::Skip) => Vec::new(),
            Err(e) => {
                warn!("⚠️ Skipping replay line {}: {}", self.lines, e);
                Vec::new()
            }
        };
        self.events += events.len() as u64;

        let mut output = Vec::new();
        if self.emit_events {
            for event in &events {
                match serde_json::to_string(event) {
                    Ok(json) => output.push(json),
                    Err(e) => warn!("⚠️ Could not serialize {} event: {}", event.kind().as_str(), e),
                }
            }
        }
        output.extend(self.host.take_output());
        output
    }
}
