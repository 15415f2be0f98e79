use qlbot_event_system::{
    Agent, CommandCall, Event, EventKind, Flow, Plugin, PluginContext, PluginError, Priority,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Greeting sent when nobody changed it. `{name}` is replaced with the
/// player's name.
pub const DEFAULT_GREETING: &str = "^7Welcome to the server, {name}^7!";

/// Permission level needed to change the greeting.
pub const GREETING_PERMISSION: u32 = 2;

// ============================================================================
// Greeter Plugin
// ============================================================================

/// Welcomes connecting players with a private message and answers `!hello`.
pub struct GreeterPlugin {
    name: String,
    greeting: Arc<RwLock<String>>,
    welcome_count: Arc<AtomicU32>,
}

impl GreeterPlugin {
    pub fn new() -> Self {
        info!("🎉 GreeterPlugin: Creating new instance");
        Self::with_greeting(DEFAULT_GREETING)
    }

    /// Creates the plugin with a custom greeting template.
    pub fn with_greeting(greeting: &str) -> Self {
        Self {
            name: "greeter".to_string(),
            greeting: Arc::new(RwLock::new(greeting.to_string())),
            welcome_count: Arc::new(AtomicU32::new(0)),
        }
    }

    /// The current greeting template.
    pub fn greeting(&self) -> String {
        read_greeting(&self.greeting)
    }

    /// How many players were welcomed so far.
    pub fn welcome_count(&self) -> u32 {
        self.welcome_count.load(Ordering::Relaxed)
    }
}

impl Default for GreeterPlugin {
    fn default() -> Self {
        Self::new()
    }
}

fn read_greeting(greeting: &RwLock<String>) -> String {
    greeting
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone()
}

fn render(template: &str, name: &str) -> String {
    template.replace("{name}", name)
}

impl Plugin for GreeterPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn register(&mut self, ctx: &PluginContext) -> Result<(), PluginError> {
        info!("👋 GreeterPlugin: Registering event handlers...");

        let greeting = Arc::clone(&self.greeting);
        let welcome_count = Arc::clone(&self.welcome_count);
        ctx.add_hook(
            EventKind::PlayerConnect,
            "welcome",
            Priority::Normal,
            move |agent: &Agent, event: &Event| {
                let Event::PlayerConnect { player } = event else {
                    return Ok(Flow::Continue);
                };
                let message = render(&read_greeting(&greeting), player.captured_name());
                if agent.tell(&message, player) {
                    let total = welcome_count.fetch_add(1, Ordering::Relaxed) + 1;
                    info!(
                        "👋 GreeterPlugin: Welcomed {} ({} so far)",
                        player.captured_name(),
                        total
                    );
                } else {
                    warn!("⚠️ GreeterPlugin: {} has no client id", player.captured_name());
                }
                Ok(Flow::Continue)
            },
        )?;

        ctx.add_hook(
            EventKind::PlayerDisconnect,
            "farewell",
            Priority::Low,
            |_: &Agent, event: &Event| {
                if let Event::PlayerDisconnect { player, reason } = event {
                    debug!(
                        "👋 GreeterPlugin: {} left ({}). Farewell!",
                        player.captured_name(),
                        reason.as_str()
                    );
                }
                Ok(Flow::Continue)
            },
        )?;

        let hello = ctx.command(&["hello", "hi"], "hello", |agent: &Agent, call: &CommandCall| {
            agent.msg(&format!("Hello, {}!", call.player.captured_name()), &call.channel);
            Ok(Flow::Continue)
        });
        ctx.add_command(hello, Priority::Normal)?;

        let greeting = Arc::clone(&self.greeting);
        let set_greeting = ctx
            .command(&["greeting"], "set_greeting", move |agent: &Agent, call: &CommandCall| {
                if call.args.is_empty() {
                    return Ok(Flow::Usage);
                }
                let text = call.args.join(" ");
                *greeting.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = text.clone();
                info!(
                    "👋 GreeterPlugin: {} changed the greeting to '{}'",
                    call.player.captured_name(),
                    text
                );
                agent.msg("^7Greeting updated.", &call.channel);
                Ok(Flow::Continue)
            })
            .permission(GREETING_PERMISSION)
            .usage("<text>");
        ctx.add_command(set_greeting, Priority::Normal)?;

        info!("👋 GreeterPlugin: ✅ All handlers registered successfully!");
        Ok(())
    }

    fn on_unload(&mut self, _ctx: &PluginContext) {
        info!(
            "👋 GreeterPlugin: Shutting down. Welcomed {} players total!",
            self.welcome_count()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qlbot_event_system::testing::RecordingHost;
    use qlbot_event_system::{AgentConfig, MemoryPermissions};

    fn setup() -> (Arc<RecordingHost>, Agent) {
        let host = Arc::new(RecordingHost::new());
        let permissions: MemoryPermissions = [("mino", GREETING_PERMISSION)].into_iter().collect();
        let agent = Agent::new(AgentConfig::default(), host.clone(), Arc::new(permissions));
        agent.load_plugin(Box::new(GreeterPlugin::new())).unwrap();
        (host, agent)
    }

    /// Connects a player the way the game does: the host only reflects the
    /// new record after the agent has seen the line.
    fn connect(host: &RecordingHost, agent: &Agent, cid: u16, name: &str) {
        let vars = format!(r"\n\{name}\t\1");
        agent.on_message(&format!("cs {} \"{}\"", 529 + cid, vars));
        host.set_live(529 + cid, vars);
    }

    #[test]
    fn test_welcomes_connecting_player() {
        let (host, agent) = setup();
        connect(&host, &agent, 2, "Mino");

        assert_eq!(
            host.take_commands(),
            vec!["tell 2 \"^7Welcome to the server, Mino^7!\"".to_string()]
        );
    }

    #[test]
    fn test_hello_replies_on_same_channel() {
        let (host, agent) = setup();
        connect(&host, &agent, 2, "Mino");
        host.take_commands();

        agent.on_message("chat \"12 Mino^7\x19: ^2!hello\"");
        assert_eq!(host.take_commands(), vec!["say \"Hello, Mino!\"".to_string()]);
    }

    #[test]
    fn test_greeting_change_needs_permission_and_text() {
        let (host, agent) = setup();
        connect(&host, &agent, 2, "Mino");
        connect(&host, &agent, 3, "Guest");
        host.take_commands();

        agent.on_message("chat \"13 Guest^7\x19: ^2!greeting hijacked\"");
        assert!(host.take_commands().is_empty());

        agent.on_message("chat \"12 Mino^7\x19: ^2!greeting\"");
        assert_eq!(
            host.take_commands(),
            vec!["say \"^7Usage: ^6!greeting <text>\"".to_string()]
        );

        agent.on_message("chat \"12 Mino^7\x19: ^2!greeting Hi {name}\"");
        assert_eq!(host.take_commands(), vec!["say \"^7Greeting updated.\"".to_string()]);

        connect(&host, &agent, 4, "Newbie");
        assert_eq!(host.take_commands(), vec!["tell 4 \"Hi Newbie\"".to_string()]);
    }

    #[test]
    fn test_unload_removes_handlers() {
        let (_host, agent) = setup();
        agent.unload_plugin("greeter").unwrap();

        assert_eq!(agent.bus().hook_count(EventKind::PlayerConnect), 0);
        assert_eq!(agent.router().command_count(), 0);
    }

    #[test]
    fn test_render_replaces_every_placeholder() {
        assert_eq!(render("{name} and {name}", "Mino"), "Mino and Mino");
        assert_eq!(render("no placeholder", "Mino"), "no placeholder");
    }
}
