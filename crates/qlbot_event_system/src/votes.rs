//! # Vote Lifecycle
//!
//! A vote shows up as three unrelated notifications:
//!
//! 1. `print "<name> called a vote."` names the caller,
//! 2. `cs 9 "<kind> <args>"` carries what is being voted on,
//! 3. `print "Vote passed."` / `print "Vote failed."` ends it.
//!
//! [`VoteTracker`] stitches them into one `VoteCalled` / `VoteEnded` pair.
//! Game state changes can also cancel the vote in flight.

use crate::configstrings::{ConfigstringStore, CS_VOTE_NO, CS_VOTE_STRING, CS_VOTE_YES};
use crate::entities::Player;
use crate::events::{Event, VoteOutcome};
use crate::utils::lock;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Where the tracker is in the vote lifecycle.
#[derive(Debug, Clone, Default)]
pub enum VoteState {
    #[default]
    Idle,
    /// A caller was announced, the subject has not arrived yet.
    Called { caller: Option<Player> },
    /// The subject arrived and `VoteCalled` was emitted.
    Active { kind: String, args: String },
}

/// Tracks the single vote that can be in flight.
pub struct VoteTracker {
    store: Arc<ConfigstringStore>,
    state: Mutex<VoteState>,
}

impl VoteTracker {
    pub fn new(store: Arc<ConfigstringStore>) -> Self {
        Self {
            store,
            state: Mutex::new(VoteState::Idle),
        }
    }

    /// Records who called the vote, replacing any stale caller.
    pub fn called(&self, caller: Option<Player>) {
        let mut state = lock(&self.state);
        if matches!(*state, VoteState::Called { .. }) {
            debug!("Replacing caller of a vote that never got a subject");
        }
        *state = VoteState::Called { caller };
    }

    /// Handles the vote subject (`cs 9`).
    ///
    /// # Returns
    ///
    /// `VoteCalled` with the stored caller (or none) and lower-cased kind and
    /// args. `None` when the subject is empty, which is how the server clears
    /// the vote.
    pub fn populated(&self, subject: &str) -> Option<Event> {
        let (kind, args) = split_subject(subject)?;
        let kind = kind.to_lowercase();
        let args = args.unwrap_or_default().to_lowercase();

        let mut state = lock(&self.state);
        let caller = match std::mem::take(&mut *state) {
            VoteState::Called { caller } => caller,
            _ => None,
        };
        *state = VoteState::Active {
            kind: kind.clone(),
            args: args.clone(),
        };

        Some(Event::VoteCalled { caller, kind, args })
    }

    /// Handles `Vote passed.` / `Vote failed.`.
    ///
    /// The subject is read from the cached configstring 9 and the tallies from
    /// 10 and 11.
    pub fn ended(&self, passed: bool) -> Option<Event> {
        let outcome = if passed { VoteOutcome::Passed } else { VoteOutcome::Failed };
        let subject = self.store.cached(CS_VOTE_STRING).unwrap_or_default();
        self.finish(&subject, outcome)
    }

    /// Cancels the vote in flight, if the host still shows one.
    ///
    /// Configstring 9 is re-read live: the cached value may already describe
    /// a vote the server has dropped.
    pub fn cancel(&self) -> Option<Event> {
        let subject = self.store.live(CS_VOTE_STRING).unwrap_or_default();
        if subject.trim().is_empty() {
            return None;
        }
        self.finish(&subject, VoteOutcome::Cancelled)
    }

    fn finish(&self, subject: &str, outcome: VoteOutcome) -> Option<Event> {
        let Some((kind, args)) = split_subject(subject) else {
            debug!("Vote ended ({:?}) but no vote subject is known", outcome);
            return None;
        };

        let votes = (self.tally(CS_VOTE_YES), self.tally(CS_VOTE_NO));
        *lock(&self.state) = VoteState::Idle;

        Some(Event::VoteEnded {
            kind: kind.to_string(),
            args: args.map(str::to_string),
            votes,
            outcome,
        })
    }

    fn tally(&self, index: u16) -> i64 {
        let raw = self.store.cached(index).unwrap_or_default();
        match raw.trim().parse() {
            Ok(count) => count,
            Err(_) => {
                if !raw.is_empty() {
                    warn!("⚠️ Unreadable vote tally in configstring {}: '{}'", index, raw);
                }
                0
            }
        }
    }

    pub fn state(&self) -> VoteState {
        lock(&self.state).clone()
    }

    /// Whether the host shows a vote in progress.
    pub fn is_active(&self) -> bool {
        self.store
            .live(CS_VOTE_STRING)
            .is_some_and(|subject| !subject.trim().is_empty())
    }

    /// Forgets any vote in flight.
    pub fn reset(&self) {
        *lock(&self.state) = VoteState::Idle;
    }
}

impl std::fmt::Debug for VoteTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoteTracker")
            .field("state", &self.state())
            .finish()
    }
}

/// Splits `map "campgrounds"` into `("map", Some("campgrounds"))`.
fn split_subject(subject: &str) -> Option<(&str, Option<&str>)> {
    let subject = subject.trim();
    if subject.is_empty() {
        return None;
    }
    match subject.split_once(char::is_whitespace) {
        Some((kind, rest)) => {
            let args = rest.trim().trim_matches('"').trim();
            Some((kind, (!args.is_empty()).then_some(args)))
        }
        None => Some((subject, None)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingHost;
    use crate::variables::VariableMap;

    fn setup() -> (Arc<RecordingHost>, Arc<ConfigstringStore>, VoteTracker) {
        let host = Arc::new(RecordingHost::new());
        let store = Arc::new(ConfigstringStore::new(host.clone()));
        let votes = VoteTracker::new(store.clone());
        (host, store, votes)
    }

    fn caller() -> Player {
        Player::detached(2, VariableMap::parse(r"\n\Mino\t\1"))
    }

    #[test]
    fn test_split_subject() {
        assert_eq!(split_subject("map campgrounds"), Some(("map", Some("campgrounds"))));
        assert_eq!(split_subject("kick \"Mino\""), Some(("kick", Some("Mino"))));
        assert_eq!(split_subject("shuffle"), Some(("shuffle", None)));
        assert_eq!(split_subject("  "), None);
    }

    #[test]
    fn test_full_vote_sequence() {
        let (_host, store, votes) = setup();
        votes.called(Some(caller()));

        store.set(9, "map q3dm6");
        let called = votes.populated("map q3dm6").unwrap();
        match called {
            Event::VoteCalled { caller, kind, args } => {
                assert_eq!(caller.unwrap().captured_name(), "Mino");
                assert_eq!(kind, "map");
                assert_eq!(args, "q3dm6");
            }
            other => panic!("unexpected event {other:?}"),
        }

        store.set(10, "5");
        store.set(11, "2");
        match votes.ended(true).unwrap() {
            Event::VoteEnded { kind, args, votes: tally, outcome } => {
                assert_eq!(kind, "map");
                assert_eq!(args.as_deref(), Some("q3dm6"));
                assert_eq!(tally, (5, 2));
                assert_eq!(outcome, VoteOutcome::Passed);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(matches!(votes.state(), VoteState::Idle));
    }

    #[test]
    fn test_populated_lowercases_and_discards_caller() {
        let (_host, _store, votes) = setup();
        votes.called(Some(caller()));
        let first = votes.populated("MAP Campgrounds").unwrap();
        assert!(matches!(first, Event::VoteCalled { caller: Some(_), ref kind, ref args } if kind == "map" && args == "campgrounds"));

        let second = votes.populated("kick someone").unwrap();
        assert!(matches!(second, Event::VoteCalled { caller: None, .. }));
    }

    #[test]
    fn test_populated_without_subject() {
        let (_host, _store, votes) = setup();
        votes.called(Some(caller()));
        assert!(votes.populated("").is_none());
        assert!(matches!(votes.state(), VoteState::Called { .. }));
    }

    #[test]
    fn test_cancel_with_empty_live_subject_is_noop() {
        let (host, store, votes) = setup();
        votes.called(Some(caller()));
        store.set(9, "map q3dm6");
        host.set_live(9, "");
        assert!(votes.cancel().is_none());
        assert!(matches!(votes.state(), VoteState::Called { .. }));
    }

    #[test]
    fn test_cancel_uses_live_subject() {
        let (host, store, votes) = setup();
        store.set(9, "");
        host.set_live(9, "shuffle");
        store.set(10, "1");
        store.set(11, "0");

        match votes.cancel().unwrap() {
            Event::VoteEnded { kind, args, votes: tally, outcome } => {
                assert_eq!(kind, "shuffle");
                assert_eq!(args, None);
                assert_eq!(tally, (1, 0));
                assert_eq!(outcome, VoteOutcome::Cancelled);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(votes.is_active());
    }

    #[test]
    fn test_ended_without_subject() {
        let (_host, _store, votes) = setup();
        assert!(votes.ended(false).is_none());
    }

    #[test]
    fn test_unreadable_tallies_default_to_zero() {
        let (_host, store, votes) = setup();
        store.set(9, "map x");
        store.set(10, "abc");
        match votes.ended(false).unwrap() {
            Event::VoteEnded { votes: tally, outcome, .. } => {
                assert_eq!(tally, (0, 0));
                assert_eq!(outcome, VoteOutcome::Failed);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
