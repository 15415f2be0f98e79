//! # Command Router
//!
//! Chat commands layered on top of the `chat` stream. Each command has one or
//! more case-insensitive names, a required permission level, the channels it
//! listens on and the channels it ignores. Like hooks, commands live in five
//! priority buckets and a command can stop the ones after it.
//!
//! ## Usage errors
//!
//! A command that returns [`Flow::Usage`] gets its usage string sent back on
//! the channel it was called from: `^7Usage: ^6!name <usage>`.

use crate::bus::{Flow, Priority, PRIORITY_LEVELS};
use crate::channel::Channel;
use crate::entities::Player;
use crate::error::{panic_message, RegistrationError};
use crate::permissions::Permissions;
use crate::utils::{read, write};
use compact_str::CompactString;
use smallvec::SmallVec;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};
use tracing::{debug, error};

/// Command callback. `C` is the context handed to every command (the agent).
pub type CommandFn<C> = Arc<dyn Fn(&C, &CommandCall) -> anyhow::Result<Flow> + Send + Sync>;

/// Everything a command handler gets to see about one invocation.
#[derive(Debug, Clone)]
pub struct CommandCall {
    pub player: Player,
    /// Name the command was invoked with, lower-cased, without prefix
    pub name: String,
    /// Whitespace-separated arguments after the name
    pub args: Vec<String>,
    /// The full message as typed
    pub message: String,
    pub channel: Channel,
}

/// Which channels a command listens on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ChannelFilter {
    #[default]
    All,
    /// Channel names (`chat`, `tell`) or identities (`tell Mino`)
    Only(Vec<String>),
}

/// A registered chat command.
pub struct Command<C> {
    owner: CompactString,
    names: SmallVec<[CompactString; 2]>,
    handler: CompactString,
    callback: CommandFn<C>,
    permission: u32,
    channels: ChannelFilter,
    exclude: Vec<String>,
    usage: String,
}

impl<C> Command<C> {
    /// Creates a command open to everyone on every channel.
    ///
    /// # Arguments
    ///
    /// * `owner` - Plugin that owns the command
    /// * `names` - One or more names, matched case-insensitively
    /// * `handler` - Handler name, used with the names to identify the command
    /// * `callback` - Function invoked when the command matches
    pub fn new<F>(owner: &str, names: &[&str], handler: &str, callback: F) -> Self
    where
        F: Fn(&C, &CommandCall) -> anyhow::Result<Flow> + Send + Sync + 'static,
    {
        Self {
            owner: CompactString::new(owner),
            names: names
                .iter()
                .map(|n| n.trim())
                .filter(|n| !n.is_empty())
                .map(|n| CompactString::new(n.to_lowercase()))
                .collect(),
            handler: CompactString::new(handler),
            callback: Arc::new(callback),
            permission: 0,
            channels: ChannelFilter::All,
            exclude: Vec::new(),
            usage: String::new(),
        }
    }

    /// Sets the required permission level.
    pub fn permission(mut self, level: u32) -> Self {
        self.permission = level;
        self
    }

    /// Restricts the command to the given channels.
    pub fn channels<S: AsRef<str>>(mut self, channels: &[S]) -> Self {
        self.channels = ChannelFilter::Only(channels.iter().map(|c| c.as_ref().to_string()).collect());
        self
    }

    /// Ignores the given channels, even if they are also listed as eligible.
    pub fn exclude<S: AsRef<str>>(mut self, channels: &[S]) -> Self {
        self.exclude = channels.iter().map(|c| c.as_ref().to_string()).collect();
        self
    }

    /// Sets the text shown after the command name on a usage error.
    pub fn usage(mut self, usage: &str) -> Self {
        self.usage = usage.to_string();
        self
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(CompactString::as_str)
    }

    pub fn handler(&self) -> &str {
        &self.handler
    }

    pub fn required_permission(&self) -> u32 {
        self.permission
    }

    pub fn usage_text(&self) -> &str {
        &self.usage
    }

    pub fn is_eligible_name(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.names.iter().any(|n| *n == name)
    }

    /// Exclusion wins over inclusion.
    pub fn is_eligible_channel(&self, channel: &Channel) -> bool {
        if self.exclude.iter().any(|entry| channel.matches(entry)) {
            return false;
        }
        match &self.channels {
            ChannelFilter::All => true,
            ChannelFilter::Only(list) => list.iter().any(|entry| channel.matches(entry)),
        }
    }

    fn same_identity(&self, other: &Command<C>) -> bool {
        self.owner == other.owner
            && self.handler == other.handler
            && self.names.iter().any(|n| other.names.contains(n))
    }
}

impl<C> fmt::Debug for Command<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("owner", &self.owner)
            .field("names", &self.names)
            .field("handler", &self.handler)
            .field("permission", &self.permission)
            .field("channels", &self.channels)
            .field("exclude", &self.exclude)
            .finish()
    }
}

/// Routes chat and console input to registered commands.
pub struct CommandRouter<C> {
    prefix: String,
    permissions: Permissions,
    buckets: RwLock<[Vec<Arc<Command<C>>>; PRIORITY_LEVELS]>,
}

impl<C> CommandRouter<C> {
    pub fn new(prefix: &str, permissions: Permissions) -> Self {
        Self {
            prefix: prefix.to_string(),
            permissions,
            buckets: RwLock::new(Default::default()),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn permissions(&self) -> &Permissions {
        &self.permissions
    }

    /// Registers a command.
    ///
    /// # Returns
    ///
    /// `Err(RegistrationError::DuplicateCommand)` if the owner already has a
    /// command with the same handler and an overlapping name.
    pub fn add_command(&self, command: Command<C>, priority: Priority) -> Result<(), RegistrationError> {
        if command.names.is_empty() {
            return Err(RegistrationError::EmptyCommandName(command.owner.to_string()));
        }

        let mut buckets = write(&self.buckets);
        if buckets.iter().flatten().any(|c| c.same_identity(&command)) {
            return Err(RegistrationError::DuplicateCommand {
                name: command.names[0].to_string(),
                owner: command.owner.to_string(),
                handler: command.handler.to_string(),
            });
        }

        debug!(
            "🔧 Registered command '{}' for {} ({:?})",
            command.names[0], command.owner, priority
        );
        buckets[priority.bucket()].push(Arc::new(command));
        Ok(())
    }

    /// Removes the command of `owner` that has `handler` and answers to `name`.
    pub fn remove_command(&self, owner: &str, name: &str, handler: &str) -> Result<(), RegistrationError> {
        let mut buckets = write(&self.buckets);
        for bucket in buckets.iter_mut() {
            if let Some(position) = bucket
                .iter()
                .position(|c| c.owner == owner && c.handler == handler && c.is_eligible_name(name))
            {
                bucket.remove(position);
                return Ok(());
            }
        }

        Err(RegistrationError::UnknownCommand {
            name: name.to_string(),
            owner: owner.to_string(),
            handler: handler.to_string(),
        })
    }

    /// Removes every command of `owner`, returning how many were removed.
    pub fn remove_owner(&self, owner: &str) -> usize {
        let mut buckets = write(&self.buckets);
        let mut removed = 0;
        for bucket in buckets.iter_mut() {
            let before = bucket.len();
            bucket.retain(|c| c.owner != owner);
            removed += before - bucket.len();
        }
        removed
    }

    pub fn command_count(&self) -> usize {
        read(&self.buckets).iter().map(Vec::len).sum()
    }

    /// Commands in dispatch order.
    pub fn commands(&self) -> Vec<Arc<Command<C>>> {
        read(&self.buckets).iter().flatten().cloned().collect()
    }

    /// Runs the commands matching a line of input.
    ///
    /// # Arguments
    ///
    /// * `ctx` - Context passed to command callbacks
    /// * `player` - Who typed the line
    /// * `message` - The line as typed
    /// * `channel` - Where it was typed, and where replies go
    /// * `require_prefix` - Whether the first token must start with the prefix
    /// * `reply` - Sink for usage replies
    ///
    /// # Returns
    ///
    /// How many commands were invoked.
    pub fn handle_input(
        &self,
        ctx: &C,
        player: &Player,
        message: &str,
        channel: &Channel,
        require_prefix: bool,
        reply: &dyn Fn(&Channel, &str),
    ) -> usize {
        if message.trim().is_empty() || (require_prefix && !message.starts_with(&self.prefix)) {
            return 0;
        }

        let mut tokens = message.split_whitespace();
        let Some(first) = tokens.next() else {
            return 0;
        };
        let first = if require_prefix {
            first.strip_prefix(self.prefix.as_str()).unwrap_or(first)
        } else {
            first
        };
        let name = first.to_lowercase();
        if name.is_empty() {
            return 0;
        }
        let args: Vec<String> = tokens.map(str::to_string).collect();

        let mut invoked = 0;
        for command in self.commands() {
            if !command.is_eligible_name(&name)
                || !command.is_eligible_channel(channel)
                || !self.permissions.has_permission(player, command.permission)
            {
                continue;
            }

            invoked += 1;
            debug!("[EXECUTE] {}@{} -> {}", name, command.owner, channel);
            let call = CommandCall {
                player: player.clone(),
                name: name.clone(),
                args: args.clone(),
                message: message.to_string(),
                channel: channel.clone(),
            };

            match catch_unwind(AssertUnwindSafe(|| (command.callback)(ctx, &call))) {
                Ok(Ok(Flow::Continue)) => {}
                Ok(Ok(Flow::Stop)) => break,
                Ok(Ok(Flow::Usage)) => {
                    reply(channel, &format!("^7Usage: ^6{}{} {}", self.prefix, name, command.usage));
                }
                Ok(Err(e)) => {
                    error!("❌ Command '{}' ({}@{}) failed: {:?}", name, command.handler, command.owner, e);
                }
                Err(panic) => {
                    error!(
                        "❌ Command '{}' ({}@{}) {}",
                        name,
                        command.handler,
                        command.owner,
                        panic_message(panic.as_ref())
                    );
                }
            }
        }

        invoked
    }
}

impl<C> fmt::Debug for CommandRouter<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandRouter")
            .field("prefix", &self.prefix)
            .field("commands", &self.command_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::MemoryPermissions;
    use crate::variables::VariableMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Ctx {
        calls: Mutex<Vec<String>>,
    }

    impl Ctx {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    type Replies = Mutex<Vec<(String, String)>>;

    fn router() -> CommandRouter<Ctx> {
        let store: MemoryPermissions = [("admin", 5)].into_iter().collect();
        CommandRouter::new("!", Permissions::new("QLBot", Arc::new(store)))
    }

    fn player(name: &str) -> Player {
        Player::detached(0, VariableMap::parse(&format!(r"\n\{name}\t\1")))
    }

    fn tracking(label: &'static str, flow: Flow) -> impl Fn(&Ctx, &CommandCall) -> anyhow::Result<Flow> {
        move |ctx: &Ctx, call: &CommandCall| {
            ctx.calls
                .lock()
                .unwrap()
                .push(format!("{label}:{}:{}", call.name, call.args.join(",")));
            Ok(flow)
        }
    }

    fn run(router: &CommandRouter<Ctx>, ctx: &Ctx, who: &str, message: &str, channel: Channel, prefix: bool) -> Vec<(String, String)> {
        let replies: Replies = Mutex::new(Vec::new());
        router.handle_input(ctx, &player(who), message, &channel, prefix, &|channel, text| {
            replies.lock().unwrap().push((channel.identity(), text.to_string()));
        });
        replies.into_inner().unwrap()
    }

    #[test]
    fn test_basic_dispatch_and_args() {
        let router = router();
        let ctx = Ctx::default();
        router
            .add_command(Command::new("p", &["Map", "m"], "map", tracking("map", Flow::Continue)), Priority::Normal)
            .unwrap();

        run(&router, &ctx, "anyone", "!MAP campgrounds  ca", Channel::Chat, true);
        run(&router, &ctx, "anyone", "!m bloodrun", Channel::Chat, true);
        assert_eq!(ctx.calls(), vec!["map:map:campgrounds,ca", "map:m:bloodrun"]);
    }

    #[test]
    fn test_prefix_and_blank_input() {
        let router = router();
        let ctx = Ctx::default();
        router
            .add_command(Command::new("p", &["help"], "help", tracking("help", Flow::Continue)), Priority::Normal)
            .unwrap();

        run(&router, &ctx, "anyone", "help", Channel::Chat, true);
        run(&router, &ctx, "anyone", "   ", Channel::Chat, true);
        run(&router, &ctx, "anyone", "", Channel::Console, false);
        assert!(ctx.calls().is_empty());

        run(&router, &ctx, "anyone", "help me", Channel::Console, false);
        assert_eq!(ctx.calls(), vec!["help:help:me"]);
    }

    #[test]
    fn test_channel_filters() {
        let router = router();
        let ctx = Ctx::default();
        router
            .add_command(
                Command::new("p", &["chatonly"], "a", tracking("chatonly", Flow::Continue)).channels(&["chat"]),
                Priority::Normal,
            )
            .unwrap();
        router
            .add_command(
                Command::new("p", &["notchat"], "b", tracking("notchat", Flow::Continue)).exclude(&["chat"]),
                Priority::Normal,
            )
            .unwrap();

        run(&router, &ctx, "anyone", "chatonly", Channel::Console, false);
        run(&router, &ctx, "anyone", "!notchat", Channel::Chat, true);
        assert!(ctx.calls().is_empty());

        run(&router, &ctx, "anyone", "!chatonly", Channel::Chat, true);
        run(&router, &ctx, "anyone", "notchat", Channel::Console, false);
        assert_eq!(ctx.calls(), vec!["chatonly:chatonly:", "notchat:notchat:"]);
    }

    #[test]
    fn test_exclusion_beats_inclusion() {
        let router = router();
        let ctx = Ctx::default();
        let tell = Channel::Tell { cid: 3, name: "Mino".into() };
        router
            .add_command(
                Command::new("p", &["x"], "x", tracking("x", Flow::Continue))
                    .channels(&["tell"])
                    .exclude(&["tell Mino"]),
                Priority::Normal,
            )
            .unwrap();

        run(&router, &ctx, "anyone", "!x", tell, true);
        assert!(ctx.calls().is_empty());
        run(&router, &ctx, "anyone", "!x", Channel::Tell { cid: 4, name: "Other".into() }, true);
        assert_eq!(ctx.calls().len(), 1);
    }

    #[test]
    fn test_permission_gate() {
        let router = router();
        let ctx = Ctx::default();
        router
            .add_command(
                Command::new("p", &["kick"], "kick", tracking("kick", Flow::Continue)).permission(3),
                Priority::Normal,
            )
            .unwrap();

        run(&router, &ctx, "nobody", "!kick someone", Channel::Chat, true);
        assert!(ctx.calls().is_empty());
        run(&router, &ctx, "^1Admin", "!kick someone", Channel::Chat, true);
        run(&router, &ctx, "QLBot", "kick other", Channel::Console, false);
        assert_eq!(ctx.calls(), vec!["kick:kick:someone", "kick:kick:other"]);
    }

    #[test]
    fn test_stop_and_priority() {
        let router = router();
        let ctx = Ctx::default();
        router
            .add_command(Command::new("a", &["go"], "late", tracking("late", Flow::Continue)), Priority::Lowest)
            .unwrap();
        router
            .add_command(Command::new("b", &["go"], "early", tracking("early", Flow::Stop)), Priority::Highest)
            .unwrap();

        run(&router, &ctx, "anyone", "!go", Channel::Chat, true);
        assert_eq!(ctx.calls(), vec!["early:go:"]);
    }

    #[test]
    fn test_usage_reply() {
        let router = router();
        let ctx = Ctx::default();
        router
            .add_command(
                Command::new("p", &["greet"], "greet", tracking("greet", Flow::Usage)).usage("<name>"),
                Priority::Normal,
            )
            .unwrap();

        let replies = run(&router, &ctx, "anyone", "!GREET", Channel::TeamChat, true);
        assert_eq!(
            replies,
            vec![("team_chat".to_string(), "^7Usage: ^6!greet <name>".to_string())]
        );
    }

    #[test]
    fn test_faulty_command_does_not_block_others() {
        let router = router();
        let ctx = Ctx::default();
        router
            .add_command(
                Command::new("a", &["x"], "broken", |_: &Ctx, _: &CommandCall| -> anyhow::Result<Flow> {
                    anyhow::bail!("nope")
                }),
                Priority::High,
            )
            .unwrap();
        router
            .add_command(
                Command::new("b", &["x"], "panics", |_: &Ctx, _: &CommandCall| -> anyhow::Result<Flow> {
                    panic!("kaboom")
                }),
                Priority::High,
            )
            .unwrap();
        router
            .add_command(Command::new("c", &["x"], "ok", tracking("ok", Flow::Continue)), Priority::Low)
            .unwrap();

        run(&router, &ctx, "anyone", "!x", Channel::Chat, true);
        assert_eq!(ctx.calls(), vec!["ok:x:"]);
    }

    #[test]
    fn test_registration_errors() {
        let router = router();
        router
            .add_command(Command::new("p", &["a", "b"], "h", tracking("h", Flow::Continue)), Priority::Normal)
            .unwrap();

        let duplicate = router.add_command(Command::new("p", &["b"], "h", tracking("h", Flow::Continue)), Priority::Low);
        assert!(matches!(duplicate, Err(RegistrationError::DuplicateCommand { .. })));

        let empty = router.add_command(Command::new("p", &[" "], "h2", tracking("h", Flow::Continue)), Priority::Low);
        assert!(matches!(empty, Err(RegistrationError::EmptyCommandName(_))));

        assert!(matches!(
            router.remove_command("p", "zzz", "h"),
            Err(RegistrationError::UnknownCommand { .. })
        ));
        router.remove_command("p", "A", "h").unwrap();
        assert_eq!(router.command_count(), 0);
    }

    #[test]
    fn test_remove_owner() {
        let router = router();
        router
            .add_command(Command::new("p", &["a"], "a", tracking("a", Flow::Continue)), Priority::Normal)
            .unwrap();
        router
            .add_command(Command::new("p", &["b"], "b", tracking("b", Flow::Continue)), Priority::Low)
            .unwrap();
        router
            .add_command(Command::new("q", &["c"], "c", tracking("c", Flow::Continue)), Priority::Low)
            .unwrap();

        assert_eq!(router.remove_owner("p"), 2);
        assert_eq!(router.command_count(), 1);
        assert_eq!(router.commands()[0].owner(), "q");
    }
}
