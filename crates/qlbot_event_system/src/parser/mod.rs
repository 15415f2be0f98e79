//! # Protocol Parser
//!
//! Turns raw server lines into typed [`Event`]s.
//!
//! Each line is handled in three steps:
//!
//! 1. A `cs <index> "<value>"` update is written to the configstring cache and
//!    reported as [`Event::ConfigstringChanged`].
//! 2. The line is matched against the known notification shapes, first match
//!    wins, and turned into zero or more events. Split configstrings, score
//!    blocks and votes are stitched together across lines here.
//! 3. [`Event::Raw`] is appended, whatever happened before.
//!
//! Old values are always read from the host (see [`crate::host`]): while a
//! line is being parsed the host still holds the previous configstring, which
//! is what the connect / disconnect / team switch and game state diffs need.
//!
//! Malformed lines are logged and produce nothing but the raw event.

mod patterns;
#[cfg(test)]
mod tests;

use crate::configstrings::{client_id_of, ConfigstringStore, CS_SCORE_BLUE, CS_SCORE_RED, CS_SERVERINFO, MAX_CLIENTS};
use crate::channel::Channel;
use crate::entities::{CaScores, Game, GameState, Player, Team, CA_SCORES_FIELDS};
use crate::error::ProtocolError;
use crate::events::{DisconnectReason, Event};
use crate::reassembly::{BigConfigstrings, FragmentMode, StatsCollector};
use crate::utils::lock;
use crate::variables::{self, VariableMap};
use crate::votes::VoteTracker;
use patterns::*;
use regex::Captures;
use std::cmp::Ordering;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

type ParseResult = Result<(), ProtocolError>;

#[derive(Debug, Clone, Copy)]
enum ChatKind {
    Public,
    Team,
    Tell,
}

/// Stateful line parser. One instance per server connection.
#[derive(Debug)]
pub struct ProtocolParser {
    store: Arc<ConfigstringStore>,
    big_configstrings: Mutex<BigConfigstrings>,
    stats: Mutex<StatsCollector>,
    votes: VoteTracker,
    disconnect_reason: Mutex<Option<DisconnectReason>>,
}

impl ProtocolParser {
    pub fn new(store: Arc<ConfigstringStore>) -> Self {
        Self {
            votes: VoteTracker::new(Arc::clone(&store)),
            store,
            big_configstrings: Mutex::new(BigConfigstrings::new()),
            stats: Mutex::new(StatsCollector::new()),
            disconnect_reason: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &Arc<ConfigstringStore> {
        &self.store
    }

    pub fn votes(&self) -> &VoteTracker {
        &self.votes
    }

    /// Parses one inbound server line.
    ///
    /// # Arguments
    ///
    /// * `line` - Raw server command, newlines are stripped
    ///
    /// # Returns
    ///
    /// The events the line produced, in dispatch order. The last one is
    /// always [`Event::Raw`].
    pub fn ingest(&self, line: &str) -> Vec<Event> {
        let line = line.replace('\n', "");
        let mut events = Vec::new();
        self.process(&line, &mut events);
        events.push(Event::Raw { line });
        events
    }

    /// Cancels the vote in flight, if the host still shows one.
    pub fn cancel_vote(&self) -> Option<Event> {
        self.votes.cancel()
    }

    /// Drops every partial state: split configstrings, pending statistics,
    /// the vote in flight and any pending disconnect reason.
    pub fn clear(&self) {
        lock(&self.big_configstrings).clear();
        lock(&self.stats).clear();
        self.votes.reset();
        *lock(&self.disconnect_reason) = None;
    }

    /// Finds a connected player by name, ignoring case and color tags.
    pub fn find_player(&self, name: &str) -> Option<Player> {
        (0..MAX_CLIENTS as u8)
            .filter_map(|cid| Player::new(Arc::clone(&self.store), cid).ok())
            .find(|player| player.is_named(name))
    }

    fn process(&self, line: &str, events: &mut Vec<Event>) {
        if let Some(caps) = CONFIGSTRING.captures(line) {
            match caps["index"].parse::<u16>() {
                Ok(index) => {
                    let value = caps["value"].to_string();
                    self.store.set(index, value.clone());
                    events.push(Event::ConfigstringChanged { index, value });
                }
                Err(_) => {
                    warn!("⚠️ Ignoring configstring with bad index: {}", line);
                    return;
                }
            }
        }

        if let Err(e) = self.classify(line, events) {
            warn!("⚠️ Dropping malformed server line '{}': {}", line, e);
        }
    }

    fn classify(&self, line: &str, events: &mut Vec<Event>) -> ParseResult {
        if let Some(caps) = CHAT.captures(line) {
            return self.on_chat(&caps, ChatKind::Public, events);
        }
        if let Some(caps) = TELL.captures(line) {
            return self.on_chat(&caps, ChatKind::Tell, events);
        }
        if let Some(caps) = TEAM_CHAT.captures(line) {
            return self.on_chat(&caps, ChatKind::Team, events);
        }
        if let Some(caps) = BIG_CONFIGSTRING.captures(line) {
            return self.on_big_configstring(&caps, events);
        }
        if CONNECTED.is_match(line) {
            // Connects are reported from the player's configstring instead.
            return Ok(());
        }
        if DISCONNECTED.is_match(line) {
            return self.set_disconnect_reason(DisconnectReason::Disconnect);
        }
        if let Some(caps) = ROUND.captures(line) {
            return self.on_round(&caps, events);
        }
        if let Some(caps) = ROUND_END.captures(line) {
            return self.on_round_end(&caps, events);
        }
        if let Some(caps) = GAME_CHANGE.captures(line) {
            return self.on_game_change(&caps, events);
        }
        if let Some(caps) = GAME_END.captures(line) {
            return self.on_game_end(&caps, events);
        }
        if KICKED.is_match(line) {
            return self.set_disconnect_reason(DisconnectReason::Kick);
        }
        if RAGEQUIT.is_match(line) {
            return self.set_disconnect_reason(DisconnectReason::Ragequit);
        }
        if TIMED_OUT.is_match(line) {
            return self.set_disconnect_reason(DisconnectReason::Timeout);
        }
        if let Some(caps) = VOTE_CALLED.captures(line) {
            return self.on_vote_called(&caps);
        }
        if let Some(caps) = VOTE_SUBJECT.captures(line) {
            events.extend(self.votes.populated(&caps["subject"]));
            return Ok(());
        }
        if let Some(caps) = VOTE_ENDED.captures(line) {
            events.extend(self.votes.ended(&caps["result"] == "passed"));
            return Ok(());
        }
        if let Some(caps) = PLAYER_CHANGE.captures(line) {
            return self.on_player_change(&caps, events);
        }
        if let Some(caps) = SCORES_CA.captures(line) {
            return self.on_scores(&caps, events);
        }
        if let Some(caps) = CASTATS.captures(line) {
            return self.on_stats(&caps, events);
        }
        Ok(())
    }

    fn on_chat(&self, caps: &Captures, kind: ChatKind, events: &mut Vec<Event>) -> ParseResult {
        // The client id in chat lines is unreliable, players are matched by name.
        let name = &caps["name"];
        let player = self.find_player(name);
        let channel = match kind {
            ChatKind::Public => Channel::Chat,
            ChatKind::Team => Channel::TeamChat,
            ChatKind::Tell => match player.as_ref().and_then(Channel::tell) {
                Some(channel) => channel,
                None => {
                    debug!("Tell from unknown player '{}' ignored", name);
                    return Ok(());
                }
            },
        };

        events.push(Event::Chat {
            player,
            message: caps["msg"].to_string(),
            channel,
        });
        Ok(())
    }

    fn on_big_configstring(&self, caps: &Captures, events: &mut Vec<Event>) -> ParseResult {
        let mode = FragmentMode::parse(&caps["mode"])?;
        let index = parse_index("bcs", &caps["index"])?;
        let complete = lock(&self.big_configstrings).feed(mode, index, &caps["value"])?;

        if let Some(value) = complete {
            self.process(&format!("cs {index} \"{value}\""), events);
        }
        Ok(())
    }

    fn set_disconnect_reason(&self, reason: DisconnectReason) -> ParseResult {
        *lock(&self.disconnect_reason) = Some(reason);
        Ok(())
    }

    fn on_round(&self, caps: &Captures, events: &mut Vec<Event>) -> ParseResult {
        let vars = variables::decode(&caps["vars"]).vars;
        let Some(round) = vars.get("round") else {
            return Err(malformed("round", "missing round number"));
        };
        let round = parse_int("round", round)?;
        if round == 0 {
            return Ok(());
        }

        if vars.contains_key("time") {
            events.push(Event::RoundCountdown { round });
        } else {
            events.push(Event::RoundStart { round });
        }
        Ok(())
    }

    fn on_round_end(&self, caps: &Captures, events: &mut Vec<Event>) -> ParseResult {
        let score = parse_int("round end", &caps["score"])?;
        if score == 0 {
            return Ok(());
        }

        let (winner, score) = if &caps["team"] == "6" {
            (Team::Red, (score, self.live_int("round end", CS_SCORE_BLUE)?))
        } else {
            (Team::Blue, (self.live_int("round end", CS_SCORE_RED)?, score))
        };

        // A forfeit first reports -999, then the real score.
        if score.0 == -999 || score.1 == -999 {
            debug!("Skipping forfeit round end {:?}", score);
            return Ok(());
        }

        events.push(Event::RoundEnd { score, winner });
        Ok(())
    }

    fn on_game_change(&self, caps: &Captures, events: &mut Vec<Event>) -> ParseResult {
        let new_raw = &caps["vars"];
        let old_raw = self.store.live(CS_SERVERINFO).unwrap_or_default();
        if new_raw.is_empty() || old_raw.is_empty() {
            return Ok(());
        }

        let old_state = game_state(&old_raw)?;
        let new_state = game_state(new_raw)?;
        if old_state == new_state {
            return Ok(());
        }

        match (&old_state, &new_state) {
            (GameState::Warmup, GameState::InProgress) | (GameState::Countdown, GameState::InProgress) => {
                let game = self.game("game change")?;
                events.extend(self.cancel_vote());
                events.push(Event::GameStart { game });
            }
            (GameState::Warmup, GameState::Countdown) => {
                events.extend(self.cancel_vote());
                events.push(Event::GameCountdown);
            }
            (GameState::InProgress, GameState::Warmup) => {}
            _ => debug!(
                "Unknown game state transition: {} -> {}",
                old_state.as_str(),
                new_state.as_str()
            ),
        }
        Ok(())
    }

    fn on_game_end(&self, caps: &Captures, events: &mut Vec<Event>) -> ParseResult {
        if parse_int("game end", &caps["value"])? != 1 {
            return Ok(());
        }

        let red = self.live_int("game end", CS_SCORE_RED)?;
        let blue = self.live_int("game end", CS_SCORE_BLUE)?;
        let winner = match red.cmp(&blue) {
            Ordering::Greater => Team::Red,
            Ordering::Less => Team::Blue,
            Ordering::Equal => {
                debug!("Game ended on a tie ({}-{}), no winner", red, blue);
                return Ok(());
            }
        };

        let game = self.game("game end")?;
        events.extend(self.cancel_vote());
        events.push(Event::GameEnd {
            game,
            score: (red, blue),
            winner,
        });
        Ok(())
    }

    fn on_vote_called(&self, caps: &Captures) -> ParseResult {
        let name = &caps["name"];
        // Drop the clan tag if the server printed one.
        let mut tokens = name.split_whitespace();
        let name = match (tokens.next(), tokens.next()) {
            (Some(_), Some(second)) => second,
            _ => name,
        };

        self.votes.called(self.find_player(name));
        Ok(())
    }

    fn on_player_change(&self, caps: &Captures, events: &mut Vec<Event>) -> ParseResult {
        let index = parse_index("player change", &caps["index"])?;
        let Some(cid) = client_id_of(index) else {
            return Ok(());
        };

        let new_raw = &caps["vars"];
        let old_raw = self.store.live(index).unwrap_or_default();

        match (old_raw.is_empty(), new_raw.is_empty()) {
            (false, false) => {
                let old_team = team_of(&old_raw)?;
                let new_team = team_of(new_raw)?;
                if old_team != new_team {
                    events.push(Event::TeamSwitch {
                        player: self.player("team switch", cid)?,
                        old_team,
                        new_team,
                    });
                }
            }
            (true, false) => {
                events.push(Event::PlayerConnect {
                    player: self.player("player connect", cid)?,
                });
            }
            (false, true) => {
                let reason = lock(&self.disconnect_reason).take().unwrap_or_default();
                events.push(Event::PlayerDisconnect {
                    player: Player::detached(cid, VariableMap::parse(&old_raw)),
                    reason,
                });
            }
            (true, true) => {}
        }
        Ok(())
    }

    fn on_scores(&self, caps: &Captures, events: &mut Vec<Event>) -> ParseResult {
        let total = parse_int("scores_ca", &caps["total"])?;
        let total = usize::try_from(total)
            .map_err(|_| malformed("scores_ca", format!("bad player count {total}")))?;
        let fields = parse_ints("scores_ca", &caps["scores"])?;
        if fields.len() / CA_SCORES_FIELDS < total {
            return Err(malformed(
                "scores_ca",
                format!("{total} players announced, {} fields received", fields.len()),
            ));
        }

        let rows = fields
            .chunks_exact(CA_SCORES_FIELDS)
            .take(total)
            .map(CaScores::from_fields)
            .collect::<Result<Vec<_>, _>>()?;

        lock(&self.stats).begin(rows.iter().map(|row| row.cid));
        events.push(Event::Scores { rows });
        Ok(())
    }

    fn on_stats(&self, caps: &Captures, events: &mut Vec<Event>) -> ParseResult {
        let fields = parse_ints("castats", &caps["scores"])?;
        let batch = lock(&self.stats).feed(&fields)?;
        if let Some(rows) = batch {
            events.push(Event::Stats { rows });
        }
        Ok(())
    }

    fn live_int(&self, shape: &'static str, index: u16) -> Result<i64, ProtocolError> {
        let raw = self.store.live(index).unwrap_or_default();
        parse_int(shape, &raw)
    }

    fn game(&self, shape: &'static str) -> Result<Game, ProtocolError> {
        Game::new(Arc::clone(&self.store)).map_err(|e| malformed(shape, e.to_string()))
    }

    fn player(&self, shape: &'static str, cid: u8) -> Result<Player, ProtocolError> {
        Player::new(Arc::clone(&self.store), cid).map_err(|e| malformed(shape, e.to_string()))
    }
}

fn malformed(shape: &'static str, detail: impl Into<String>) -> ProtocolError {
    ProtocolError::Malformed {
        shape,
        detail: detail.into(),
    }
}

fn parse_int(shape: &'static str, value: &str) -> Result<i64, ProtocolError> {
    value
        .trim()
        .parse()
        .map_err(|_| malformed(shape, format!("'{value}' is not an integer")))
}

fn parse_ints(shape: &'static str, value: &str) -> Result<Vec<i64>, ProtocolError> {
    value
        .split_whitespace()
        .map(|field| parse_int(shape, field))
        .collect()
}

fn parse_index(shape: &'static str, value: &str) -> Result<u16, ProtocolError> {
    value
        .trim()
        .parse()
        .map_err(|_| malformed(shape, format!("'{value}' is not a configstring index")))
}

fn game_state(raw: &str) -> Result<GameState, ProtocolError> {
    VariableMap::parse(raw)
        .get("g_gameState")
        .map(|state| GameState::from_field(state))
        .ok_or_else(|| malformed("game change", "missing g_gameState"))
}

fn team_of(raw: &str) -> Result<Team, ProtocolError> {
    let vars = VariableMap::parse(raw);
    let team = vars
        .get("t")
        .ok_or_else(|| malformed("player change", "missing team"))?;
    Team::parse_field(team).map_err(|e| malformed("player change", e.to_string()))
}
