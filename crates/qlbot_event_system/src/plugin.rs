//! # Plugin Interface
//!
//! Plugins are the unit of ownership for hooks and commands. A plugin
//! registers its handlers through a [`PluginContext`], which stamps every
//! registration with the plugin's name, so unloading a plugin can remove
//! exactly what it added.
//!
//! ## Plugin Lifecycle
//!
//! 1. **Load** - [`Agent::load_plugin`] rejects duplicate names, then calls
//!    [`Plugin::register`]. A failing or panicking `register` is rolled back.
//! 2. **Operation** - Hooks and commands receive events through the agent.
//! 3. **Unload** - The plugin's own `unload` hooks run, then
//!    [`Plugin::on_unload`], then all of its hooks and commands are removed.

use crate::agent::Agent;
use crate::bus::{Flow, Priority};
use crate::commands::{Command, CommandCall};
use crate::error::{panic_message, PluginError, RegistrationError};
use crate::events::{Event, EventKind};
use crate::utils::lock;
use std::ops::Deref;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{error, info, warn};

/// A bot extension.
///
/// # Examples
///
/// ```rust,no_run
/// use qlbot_event_system::*;
///
/// struct Ping;
///
/// impl Plugin for Ping {
///     fn name(&self) -> &str { "ping" }
///     fn version(&self) -> &str { "1.0.0" }
///
///     fn register(&mut self, ctx: &PluginContext) -> Result<(), PluginError> {
///         let ping = ctx.command(&["ping"], "ping", |agent: &Agent, call: &CommandCall| {
///             agent.msg("pong", &call.channel);
///             Ok(Flow::Continue)
///         });
///         ctx.add_command(ping, Priority::Normal)?;
///         Ok(())
///     }
/// }
/// ```
pub trait Plugin: Send + Sync + 'static {
    /// Unique name, used as the owner of every hook and command.
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    /// Registers hooks and commands.
    ///
    /// # Returns
    ///
    /// `Err(PluginError)` aborts the load; whatever was registered so far is
    /// removed again.
    fn register(&mut self, ctx: &PluginContext) -> Result<(), PluginError>;

    /// Called on unload, after the plugin's `unload` hooks and before its
    /// hooks and commands are removed.
    fn on_unload(&mut self, _ctx: &PluginContext) {}
}

/// Registration handle given to a plugin. Dereferences to the [`Agent`].
#[derive(Debug, Clone)]
pub struct PluginContext {
    owner: String,
    agent: Agent,
}

impl PluginContext {
    pub fn new(owner: &str, agent: Agent) -> Self {
        Self {
            owner: owner.to_string(),
            agent,
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    /// Hooks `callback` into `kind` on behalf of the plugin.
    pub fn add_hook<F>(
        &self,
        kind: EventKind,
        handler: &str,
        priority: Priority,
        callback: F,
    ) -> Result<(), RegistrationError>
    where
        F: Fn(&Agent, &Event) -> anyhow::Result<Flow> + Send + Sync + 'static,
    {
        self.agent
            .bus()
            .add_hook(kind, &self.owner, handler, priority, callback)
    }

    pub fn remove_hook(&self, kind: EventKind, handler: &str) -> Result<(), RegistrationError> {
        self.agent.bus().remove_hook(kind, &self.owner, handler)
    }

    /// Starts building a command owned by the plugin.
    pub fn command<F>(&self, names: &[&str], handler: &str, callback: F) -> Command<Agent>
    where
        F: Fn(&Agent, &CommandCall) -> anyhow::Result<Flow> + Send + Sync + 'static,
    {
        Command::new(&self.owner, names, handler, callback)
    }

    pub fn add_command(&self, command: Command<Agent>, priority: Priority) -> Result<(), RegistrationError> {
        if command.owner() != self.owner {
            warn!(
                "⚠️ Plugin '{}' registers a command owned by '{}'",
                self.owner,
                command.owner()
            );
        }
        self.agent.router().add_command(command, priority)
    }

    pub fn remove_command(&self, name: &str, handler: &str) -> Result<(), RegistrationError> {
        self.agent.router().remove_command(&self.owner, name, handler)
    }
}

impl Deref for PluginContext {
    type Target = Agent;

    fn deref(&self) -> &Agent {
        &self.agent
    }
}

impl Agent {
    /// Loads a plugin and lets it register its handlers.
    ///
    /// # Returns
    ///
    /// `Err(PluginError::AlreadyLoaded)` for a duplicate name, or whatever
    /// error `register` reported. A panic in `register` becomes
    /// `PluginError::InitializationFailed`.
    pub fn load_plugin(&self, mut plugin: Box<dyn Plugin>) -> Result<(), PluginError> {
        let name = plugin.name().to_string();
        if self.is_plugin_loaded(&name) {
            return Err(PluginError::AlreadyLoaded(name));
        }

        info!("🔄 Loading plugin: {} v{}", name, plugin.version());
        let ctx = PluginContext::new(&name, self.clone());
        let outcome = match catch_unwind(AssertUnwindSafe(|| plugin.register(&ctx))) {
            Ok(result) => result,
            Err(panic) => Err(PluginError::InitializationFailed(panic_message(panic.as_ref()))),
        };

        if let Err(e) = outcome {
            error!("❌ Failed to load plugin {}: {}", name, e);
            self.remove_registrations(&name);
            return Err(e);
        }

        let mut table = lock(self.plugin_table());
        if table.iter().any(|p| p.name() == name) {
            drop(table);
            self.remove_registrations(&name);
            return Err(PluginError::AlreadyLoaded(name));
        }
        table.push(plugin);
        info!("✅ Plugin loaded: {}", name);
        Ok(())
    }

    /// Unloads a plugin by name.
    pub fn unload_plugin(&self, name: &str) -> Result<(), PluginError> {
        let plugin = {
            let mut table = lock(self.plugin_table());
            let position = table
                .iter()
                .position(|p| p.name() == name)
                .ok_or_else(|| PluginError::NotFound(name.to_string()))?;
            table.remove(position)
        };
        self.finish_unload(plugin);
        Ok(())
    }

    /// Unloads every plugin, most recently loaded first.
    ///
    /// # Returns
    ///
    /// How many plugins were unloaded.
    pub fn unload_all_plugins(&self) -> usize {
        let plugins: Vec<_> = lock(self.plugin_table()).drain(..).rev().collect();
        let count = plugins.len();
        for plugin in plugins {
            self.finish_unload(plugin);
        }
        count
    }

    pub fn plugin_names(&self) -> Vec<String> {
        lock(self.plugin_table())
            .iter()
            .map(|p| p.name().to_string())
            .collect()
    }

    pub fn is_plugin_loaded(&self, name: &str) -> bool {
        lock(self.plugin_table()).iter().any(|p| p.name() == name)
    }

    fn finish_unload(&self, mut plugin: Box<dyn Plugin>) {
        let name = plugin.name().to_string();
        info!("🛑 Unloading plugin: {}", name);

        let ctx = PluginContext::new(&name, self.clone());
        self.bus()
            .trigger_owner(self, &Event::Unload { owner: name.clone() }, &name);

        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| plugin.on_unload(&ctx))) {
            error!("❌ Plugin {} failed to unload cleanly: {}", name, panic_message(panic.as_ref()));
        }

        let (hooks, commands) = self.remove_registrations(&name);
        info!(
            "🔌 Plugin unloaded: {} ({} hooks, {} commands removed)",
            name, hooks, commands
        );
    }

    fn remove_registrations(&self, owner: &str) -> (usize, usize) {
        (self.bus().remove_owner(owner), self.router().remove_owner(owner))
    }
}
