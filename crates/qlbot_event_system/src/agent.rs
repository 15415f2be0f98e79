//! # Agent
//!
//! The [`Agent`] is the single context object of the bot. It owns the
//! configstring cache, the parser, the event bus, the command router and the
//! plugin table, and it is what every hook and command receives as its first
//! argument.
//!
//! The host drives it through the `on_*` methods; plugins drive the server
//! through the convenience API (`msg`, `tell`, `kick`, `put`, ...), which
//! boils down to commands sent through the [`Host`].
//!
//! `Agent` is a cheap handle: clones share the same state.

use crate::bus::{DispatchReport, EventBus};
use crate::channel::Channel;
use crate::commands::CommandRouter;
use crate::configstrings::{ConfigstringStore, CS_MAP, CS_VOTE_NO, CS_VOTE_STRING, CS_VOTE_YES, MAX_CLIENTS};
use crate::entities::{Game, Player, Team};
use crate::error::EntityError;
use crate::events::Event;
use crate::host::Host;
use crate::parser::ProtocolParser;
use crate::permissions::{PermissionStore, Permissions};
use crate::plugin::Plugin;
use crate::utils::{clean_name, lock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

/// Identity of the bot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Name the bot plays under. It always has the highest permission level.
    #[serde(default = "default_nickname")]
    pub nickname: String,
    /// Prefix of chat commands
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,
}

fn default_nickname() -> String {
    "QLBot".to_string()
}

fn default_command_prefix() -> String {
    "!".to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            nickname: default_nickname(),
            command_prefix: default_command_prefix(),
        }
    }
}

/// Connection state reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Closed,
    Disconnected,
    Connecting,
    AwaitingChallenge,
    AwaitingGamestate,
    ReceivingGamestate,
    AwaitingSnapshot,
    Connected,
    Unknown(i32),
}

impl ConnectionStatus {
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => ConnectionStatus::Closed,
            1 => ConnectionStatus::Disconnected,
            3 => ConnectionStatus::Connecting,
            4 => ConnectionStatus::AwaitingChallenge,
            5 => ConnectionStatus::AwaitingGamestate,
            6 => ConnectionStatus::ReceivingGamestate,
            7 => ConnectionStatus::AwaitingSnapshot,
            8 => ConnectionStatus::Connected,
            other => ConnectionStatus::Unknown(other),
        }
    }

    pub fn code(self) -> i32 {
        match self {
            ConnectionStatus::Closed => 0,
            ConnectionStatus::Disconnected => 1,
            ConnectionStatus::Connecting => 3,
            ConnectionStatus::AwaitingChallenge => 4,
            ConnectionStatus::AwaitingGamestate => 5,
            ConnectionStatus::ReceivingGamestate => 6,
            ConnectionStatus::AwaitingSnapshot => 7,
            ConnectionStatus::Connected => 8,
            ConnectionStatus::Unknown(code) => code,
        }
    }
}

struct AgentInner {
    config: AgentConfig,
    host: Arc<dyn Host>,
    store: Arc<ConfigstringStore>,
    parser: ProtocolParser,
    bus: EventBus<Agent>,
    router: CommandRouter<Agent>,
    connected: AtomicBool,
    status: Mutex<ConnectionStatus>,
    ingest: Mutex<()>,
    plugins: Mutex<Vec<Box<dyn Plugin>>>,
}

/// Shared handle to the bot's state.
#[derive(Clone)]
pub struct Agent {
    inner: Arc<AgentInner>,
}

impl Agent {
    /// Creates an agent talking to `host`.
    ///
    /// # Arguments
    ///
    /// * `config` - Nickname and command prefix
    /// * `host` - Outbound side: server commands, console, live configstrings
    /// * `permissions` - Where player permission levels are stored
    pub fn new(config: AgentConfig, host: Arc<dyn Host>, permissions: Arc<dyn PermissionStore>) -> Self {
        let store = Arc::new(ConfigstringStore::new(Arc::clone(&host)));
        let permissions = Permissions::new(&config.nickname, permissions);
        let router = CommandRouter::new(&config.command_prefix, permissions);

        info!(
            "🤖 Agent created for '{}' (command prefix '{}')",
            config.nickname, config.command_prefix
        );

        Self {
            inner: Arc::new(AgentInner {
                parser: ProtocolParser::new(Arc::clone(&store)),
                store,
                host,
                config,
                bus: EventBus::new(),
                router,
                connected: AtomicBool::new(false),
                status: Mutex::new(ConnectionStatus::Closed),
                ingest: Mutex::new(()),
                plugins: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.inner.config
    }

    pub fn nickname(&self) -> &str {
        &self.inner.config.nickname
    }

    pub fn host(&self) -> &Arc<dyn Host> {
        &self.inner.host
    }

    pub fn store(&self) -> &Arc<ConfigstringStore> {
        &self.inner.store
    }

    pub fn parser(&self) -> &ProtocolParser {
        &self.inner.parser
    }

    pub fn bus(&self) -> &EventBus<Agent> {
        &self.inner.bus
    }

    pub fn router(&self) -> &CommandRouter<Agent> {
        &self.inner.router
    }

    pub fn permissions(&self) -> &Permissions {
        self.inner.router.permissions()
    }

    pub(crate) fn plugin_table(&self) -> &Mutex<Vec<Box<dyn Plugin>>> {
        &self.inner.plugins
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> ConnectionStatus {
        *lock(&self.inner.status)
    }

    // ------------------------------------------------------------------
    // Inbound
    // ------------------------------------------------------------------

    /// Handles one server line.
    ///
    /// # Returns
    ///
    /// The events that were dispatched, in order.
    pub fn on_message(&self, line: &str) -> Vec<Event> {
        let events = {
            let _guard = lock(&self.inner.ingest);
            self.inner.parser.ingest(line)
        };
        for event in &events {
            self.dispatch(event);
        }
        events
    }

    /// Handles one configstring of the initial game state.
    pub fn on_gamestate_field(&self, index: u16, value: &str) -> Vec<Event> {
        let value = value.replace('\n', "");
        self.inner.store.set(index, value.clone());

        let mut events = vec![Event::Gamestate {
            index,
            value: value.clone(),
        }];
        if index == CS_MAP {
            events.push(Event::Map { name: value });
        }
        for event in &events {
            self.dispatch(event);
        }
        events
    }

    /// Handles a connection status change.
    ///
    /// Dropping below "receiving gamestate" while connected forgets every
    /// cached configstring and partial state.
    pub fn on_connection_status(&self, code: i32) -> Vec<Event> {
        let status = ConnectionStatus::from_code(code);
        *lock(&self.inner.status) = status;

        if code < 6 && self.inner.connected.swap(false, Ordering::SeqCst) {
            debug!("Connection lost (status {}), dropping cached state", code);
            self.inner.store.clear();
            self.inner.parser.clear();
        }

        let event = match status {
            ConnectionStatus::Disconnected => Some(Event::BotDisconnect),
            ConnectionStatus::AwaitingSnapshot => {
                self.inner.store.clear();
                None
            }
            ConnectionStatus::Connected => {
                if self.inner.connected.swap(true, Ordering::SeqCst) {
                    None
                } else {
                    info!("✅ Connected to server");
                    Some(Event::BotConnect)
                }
            }
            ConnectionStatus::Unknown(code) => {
                debug!("Unknown connection status: {}", code);
                None
            }
            _ => None,
        };

        let events: Vec<Event> = event.into_iter().collect();
        for event in &events {
            self.dispatch(event);
        }
        events
    }

    /// Handles text printed on the local console.
    pub fn on_console_line(&self, text: &str) -> Event {
        let event = Event::Console {
            text: text.trim_end_matches('\n').to_string(),
        };
        self.dispatch(&event);
        event
    }

    /// Runs a command typed on the local console. No prefix is needed and the
    /// caller is the bot itself.
    ///
    /// # Returns
    ///
    /// How many commands were invoked.
    pub fn on_console_command(&self, text: &str) -> usize {
        let player = Player::console(self.nickname());
        self.inner.router.handle_input(
            self,
            &player,
            text,
            &Channel::Console,
            false,
            &|channel: &Channel, message: &str| channel.reply(self.inner.host.as_ref(), message),
        )
    }

    /// The host is going away: unloads every plugin.
    pub fn on_unload(&self) {
        info!("🛑 Unloading all plugins");
        self.unload_all_plugins();
    }

    /// Delivers an event to its stream, then, for chat, to the command router.
    ///
    /// Commands run even if a chat hook stopped the dispatch.
    pub fn dispatch(&self, event: &Event) -> DispatchReport {
        let report = self.inner.bus.trigger(self, event);

        if let Event::Chat {
            player: Some(player),
            message,
            channel,
        } = event
        {
            self.inner.router.handle_input(
                self,
                player,
                message,
                channel,
                true,
                &|channel: &Channel, message: &str| channel.reply(self.inner.host.as_ref(), message),
            );
        }
        report
    }

    // ------------------------------------------------------------------
    // Players and game
    // ------------------------------------------------------------------

    /// Every connected player, in client id order.
    pub fn players(&self) -> Vec<Player> {
        (0..MAX_CLIENTS as u8)
            .filter_map(|cid| Player::new(Arc::clone(&self.inner.store), cid).ok())
            .collect()
    }

    pub fn player(&self, cid: u8) -> Result<Player, EntityError> {
        Player::new(Arc::clone(&self.inner.store), cid)
    }

    /// Looks a player up by name, ignoring colors, clan tag and case.
    ///
    /// While disconnected, the bot's own name resolves to the console
    /// pseudo-player.
    pub fn player_by_name(&self, name: &str) -> Option<Player> {
        let players = self.players();
        if players.is_empty() && name.eq_ignore_ascii_case(self.nickname()) {
            return Some(Player::console(self.nickname()));
        }

        let wanted = clean_name(name, false).to_lowercase();
        players.into_iter().find(|p| p.is_named(&wanted))
    }

    pub fn client_id(&self, name: &str) -> Option<u8> {
        self.player_by_name(name).and_then(|p| p.client_id())
    }

    /// Finds a player by exact name first, then by name prefix.
    pub fn find_player(&self, begins: &str) -> Option<Player> {
        let players = self.players();
        let wanted = clean_name(begins, false).to_lowercase();
        if let Some(exact) = players.iter().find(|p| p.is_named(&wanted)) {
            return Some(exact.clone());
        }
        players
            .into_iter()
            .find(|p| clean_name(p.captured_name(), false).to_lowercase().starts_with(&wanted))
    }

    /// Players grouped by team. Every team is present, possibly empty.
    pub fn teams(&self) -> HashMap<Team, Vec<Player>> {
        let mut teams: HashMap<Team, Vec<Player>> =
            Team::ALL.iter().map(|team| (*team, Vec::new())).collect();
        for player in self.players() {
            if let Ok(team) = player.team() {
                teams.entry(team).or_default().push(player);
            }
        }
        teams
    }

    /// The current game, if the server has sent one.
    pub fn game(&self) -> Option<Game> {
        Game::new(Arc::clone(&self.inner.store)).ok()
    }

    // ------------------------------------------------------------------
    // Messaging
    // ------------------------------------------------------------------

    pub fn send_command(&self, command: &str) {
        debug!("➡️ {}", command);
        self.inner.host.send_command(command);
    }

    /// Sends a message on `channel`, split to fit the chat limit.
    pub fn msg(&self, message: &str, channel: &Channel) {
        channel.reply(self.inner.host.as_ref(), message);
    }

    /// Sends a private message. Returns `false` for players without a client id.
    pub fn tell(&self, message: &str, player: &Player) -> bool {
        match Channel::tell(player) {
            Some(channel) => {
                channel.reply(self.inner.host.as_ref(), message);
                true
            }
            None => false,
        }
    }

    /// Prints on the local console.
    pub fn console(&self, text: &str) {
        self.inner.host.console_print(text);
    }

    // ------------------------------------------------------------------
    // Votes
    // ------------------------------------------------------------------

    pub fn is_vote_active(&self) -> bool {
        self.inner
            .store
            .get(CS_VOTE_STRING, false)
            .is_some_and(|vote| !vote.is_empty())
    }

    /// (yes, no) tallies of the current vote.
    pub fn current_vote_count(&self) -> Option<(i64, i64)> {
        let yes = self.inner.store.get(CS_VOTE_YES, false)?;
        let no = self.inner.store.get(CS_VOTE_NO, false)?;
        Some((yes.trim().parse().ok()?, no.trim().parse().ok()?))
    }

    pub fn callvote(&self, vote: &str) {
        self.send_command(&format!("callvote {vote}"));
    }

    pub fn vote_yes(&self) {
        self.send_command("vote yes");
    }

    pub fn vote_no(&self) {
        self.send_command("vote no");
    }

    /// Calls a vote and votes yes, unless a vote is already running.
    fn call_and_vote(&self, vote: &str) -> bool {
        if self.is_vote_active() {
            return false;
        }
        self.callvote(vote);
        self.vote_yes();
        true
    }

    pub fn kick(&self, player: &Player) -> bool {
        let name = player
            .clean_name()
            .unwrap_or_else(|_| player.captured_name().to_string());
        self.call_and_vote(&format!("kick {name}"))
    }

    pub fn shuffle(&self) -> bool {
        self.call_and_vote("shuffle")
    }

    pub fn cointoss(&self) -> bool {
        self.call_and_vote("cointoss")
    }

    pub fn change_map(&self, map: &str) -> bool {
        self.call_and_vote(&format!("map {map}"))
    }

    pub fn teamsize(&self, size: u32) -> bool {
        self.call_and_vote(&format!("teamsize {size}"))
    }

    // ------------------------------------------------------------------
    // Operator commands
    // ------------------------------------------------------------------

    fn player_command(&self, command: &str, player: &Player) -> bool {
        match player.client_id() {
            Some(cid) => {
                self.send_command(&format!("{command} {cid}"));
                true
            }
            None => false,
        }
    }

    pub fn put(&self, player: &Player, team: Team) -> bool {
        match player.client_id() {
            Some(cid) => {
                self.send_command(&format!("put {cid} {team}"));
                true
            }
            None => false,
        }
    }

    pub fn mute(&self, player: &Player) -> bool {
        self.player_command("mute", player)
    }

    pub fn unmute(&self, player: &Player) -> bool {
        self.player_command("unmute", player)
    }

    pub fn op(&self, player: &Player) -> bool {
        self.player_command("op", player)
    }

    pub fn deop(&self, player: &Player) -> bool {
        self.player_command("deop", player)
    }

    pub fn kickban(&self, player: &Player) -> bool {
        self.player_command("kickban", player)
    }

    pub fn follow(&self, player: &Player) -> bool {
        self.player_command("follow", player)
    }

    pub fn opsay(&self, message: &str) {
        self.send_command(&format!("opsay \"{message}\""));
    }

    pub fn abort(&self) {
        self.send_command("abort");
    }

    pub fn allready(&self) {
        self.send_command("allready");
    }

    pub fn pause(&self) {
        self.send_command("pause");
    }

    pub fn unpause(&self) {
        self.send_command("unpause");
    }

    /// Locks one team, or both.
    pub fn lock(&self, team: Option<Team>) {
        match team {
            Some(team) => self.send_command(&format!("lock {team}")),
            None => self.send_command("lock"),
        }
    }

    pub fn unlock(&self, team: Option<Team>) {
        match team {
            Some(team) => self.send_command(&format!("unlock {team}")),
            None => self.send_command("unlock"),
        }
    }

    // ------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------

    /// Runs `callback` after `interval`.
    ///
    /// Uses the tokio runtime when called from one, a plain thread otherwise.
    pub fn delay<F>(&self, interval: Duration, callback: F)
    where
        F: FnOnce(&Agent) + Send + 'static,
    {
        let agent = self.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(interval).await;
                    callback(&agent);
                });
            }
            Err(_) => {
                std::thread::spawn(move || {
                    std::thread::sleep(interval);
                    callback(&agent);
                });
            }
        }
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("nickname", &self.inner.config.nickname)
            .field("status", &self.status())
            .field("bus", &self.inner.bus)
            .field("router", &self.inner.router)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{Flow, Priority};
    use crate::commands::Command;
    use crate::events::EventKind;
    use crate::permissions::MemoryPermissions;
    use crate::testing::RecordingHost;

    fn agent() -> (Arc<RecordingHost>, Agent) {
        let host = Arc::new(RecordingHost::new());
        let permissions: MemoryPermissions = [("mino", 3)].into_iter().collect();
        let agent = Agent::new(AgentConfig::default(), host.clone(), Arc::new(permissions));
        (host, agent)
    }

    #[test]
    fn test_connection_status_lifecycle() {
        let (_host, agent) = agent();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for kind in [EventKind::BotConnect, EventKind::BotDisconnect] {
            let seen = Arc::clone(&seen);
            agent
                .bus()
                .add_hook(kind, "test", "status", Priority::Normal, move |_: &Agent, e: &Event| {
                    seen.lock().unwrap().push(e.kind());
                    Ok(Flow::Continue)
                })
                .unwrap();
        }

        agent.store().set(3, "campgrounds");
        agent.on_connection_status(8);
        agent.on_connection_status(8);
        assert!(agent.is_connected());

        agent.on_connection_status(1);
        assert!(!agent.is_connected());
        assert!(agent.store().is_empty());
        assert_eq!(agent.status(), ConnectionStatus::Disconnected);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![EventKind::BotConnect, EventKind::BotDisconnect]
        );
    }

    #[test]
    fn test_reconnect_drops_partial_reassembly() {
        let (_host, agent) = agent();
        agent.on_connection_status(8);

        agent.on_message("bcs0 7 \"AB\"");
        let row = [3, 1, 0, 42, 50, 10, 5, 3, 40, 7, 55, 1200, 0, 0, 0, 0, 1]
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        let header = agent.on_message(&format!("scores_ca 1 0 0 {row}"));
        assert_eq!(header[0].kind(), EventKind::Scores);

        agent.on_connection_status(1);
        agent.on_connection_status(8);

        let fragment = agent.on_message("bcs2 7 \"EF\"");
        assert_eq!(fragment.iter().map(Event::kind).collect::<Vec<_>>(), vec![EventKind::Raw]);

        let stats: Vec<String> = (0..33).map(|f| f.to_string()).collect();
        let detail = agent.on_message(&format!("castats {}", stats.join(" ")));
        assert_eq!(detail.iter().map(Event::kind).collect::<Vec<_>>(), vec![EventKind::Raw]);
        assert_eq!(agent.store().cached(7), None);
    }

    #[test]
    fn test_gamestate_field_emits_map() {
        let (_host, agent) = agent();
        let events = agent.on_gamestate_field(3, "campgrounds\n");
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[1], Event::Map { name } if name == "campgrounds"));
        assert_eq!(agent.store().cached(3).as_deref(), Some("campgrounds"));
    }

    #[test]
    fn test_chat_reaches_commands_even_after_stop() {
        let (host, agent) = agent();
        host.set_live(531, r"\n\Mino\t\1");

        agent
            .bus()
            .add_hook(EventKind::Chat, "test", "stopper", Priority::Highest, |_: &Agent, _: &Event| {
                Ok(Flow::Stop)
            })
            .unwrap();
        agent
            .router()
            .add_command(
                Command::new("test", &["ping"], "ping", |agent: &Agent, call| {
                    agent.msg("pong", &call.channel);
                    Ok(Flow::Continue)
                }),
                Priority::Normal,
            )
            .unwrap();

        agent.on_message("chat \"12 Mino^7\x19: ^2!ping\"");
        assert_eq!(host.commands(), vec!["say \"pong\"".to_string()]);
    }

    #[test]
    fn test_console_command_runs_as_bot() {
        let (host, agent) = agent();
        agent
            .router()
            .add_command(
                Command::new("test", &["secret"], "secret", |agent: &Agent, call| {
                    agent.msg(&format!("hi {}", call.player.captured_name()), &call.channel);
                    Ok(Flow::Continue)
                })
                .permission(5),
                Priority::Normal,
            )
            .unwrap();

        assert_eq!(agent.on_console_command("secret"), 1);
        assert_eq!(host.console_output(), vec!["hi QLBot\n".to_string()]);
    }

    #[test]
    fn test_vote_helpers_respect_active_vote() {
        let (host, agent) = agent();
        assert!(agent.shuffle());
        assert_eq!(host.take_commands(), vec!["callvote shuffle", "vote yes"]);

        agent.store().set(9, "shuffle");
        assert!(!agent.change_map("campgrounds"));
        assert!(host.commands().is_empty());

        agent.store().set(10, "2");
        agent.store().set(11, "1");
        assert_eq!(agent.current_vote_count(), Some((2, 1)));
    }

    #[test]
    fn test_player_lookup_and_operator_commands() {
        let (host, agent) = agent();
        host.set_live(529, r"\n\^1Mino\t\1\cn\QL");
        host.set_live(530, r"\n\Minotaur\t\2");

        assert_eq!(agent.players().len(), 2);
        assert_eq!(agent.player_by_name("QL mino").unwrap().client_id(), Some(0));
        assert_eq!(agent.find_player("minot").unwrap().client_id(), Some(1));
        assert_eq!(agent.client_id("nobody"), None);

        let teams = agent.teams();
        assert_eq!(teams[&Team::Red].len(), 1);
        assert_eq!(teams[&Team::Blue].len(), 1);
        assert!(teams[&Team::Spectator].is_empty());

        let mino = agent.player(0).unwrap();
        assert!(agent.put(&mino, Team::Spectator));
        assert!(agent.mute(&mino));
        assert!(!agent.op(&Player::console("QLBot")));
        agent.lock(Some(Team::Blue));
        agent.opsay("hello");
        assert_eq!(
            host.take_commands(),
            vec!["put 0 spectator", "mute 0", "lock blue", "opsay \"hello\""]
        );
    }

    #[test]
    fn test_bot_name_resolves_while_disconnected() {
        let (_host, agent) = agent();
        let me = agent.player_by_name("qlbot").unwrap();
        assert_eq!(me.client_id(), None);
        assert_eq!(agent.permissions().level_of(&me), crate::permissions::BOT_PERMISSION_LEVEL);
    }

    #[tokio::test]
    async fn test_delay_runs_on_runtime() {
        let (host, agent) = agent();
        let (tx, rx) = tokio::sync::oneshot::channel();
        agent.delay(Duration::from_millis(10), move |agent| {
            agent.send_command("say \"later\"");
            let _ = tx.send(());
        });
        rx.await.unwrap();
        assert_eq!(host.commands(), vec!["say \"later\"".to_string()]);
    }
}
