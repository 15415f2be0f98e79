#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::events::{EventKind, VoteOutcome};
    use crate::testing::RecordingHost;

    struct Harness {
        host: Arc<RecordingHost>,
        store: Arc<ConfigstringStore>,
        parser: ProtocolParser,
    }

    impl Harness {
        fn new() -> Self {
            let host = Arc::new(RecordingHost::new());
            let store = Arc::new(ConfigstringStore::new(host.clone()));
            let parser = ProtocolParser::new(Arc::clone(&store));
            Self { host, store, parser }
        }

        /// Feeds a line, then applies it to the host the way the game does:
        /// only after the agent is done with it.
        fn feed(&self, line: &str) -> Vec<Event> {
            let events = self.parser.ingest(line);
            if let Some(caps) = CONFIGSTRING.captures(line.trim_end()) {
                if let Ok(index) = caps["index"].parse::<u16>() {
                    self.host.set_live(index, &caps["value"]);
                }
            }
            events
        }

        fn seat(&self, cid: u8, vars: &str) {
            self.host.set_live(529 + u16::from(cid), vars);
        }
    }

    fn kinds(events: &[Event]) -> Vec<EventKind> {
        events.iter().map(Event::kind).collect()
    }

    fn score_row(cid: i64) -> Vec<String> {
        [cid, 1, 0, 42, 50, 10, 5, 3, 40, 7, 55, 1200, 0, 0, 0, 0, 1]
            .iter()
            .map(|f| f.to_string())
            .collect()
    }

    fn stats_line() -> String {
        let fields: Vec<String> = (0..33).map(|f| f.to_string()).collect();
        format!("castats {}", fields.join(" "))
    }

    #[test]
    fn test_raw_is_always_last() {
        let h = Harness::new();
        let events = h.feed("print \"hello world\"\n");
        assert_eq!(kinds(&events), vec![EventKind::Raw]);
        match &events[0] {
            Event::Raw { line } => assert_eq!(line, "print \"hello world\""),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_configstring_is_cached_and_reported() {
        let h = Harness::new();
        let events = h.feed("cs 3 \"campgrounds\"");
        assert_eq!(kinds(&events), vec![EventKind::Configstring, EventKind::Raw]);
        assert_eq!(h.store.cached(3).as_deref(), Some("campgrounds"));
    }

    #[test]
    fn test_split_configstring_reassembly() {
        let h = Harness::new();
        let mut events = Vec::new();
        events.extend(h.feed("bcs0 7 \"AB\""));
        events.extend(h.feed("bcs1 7 \"CD\""));
        events.extend(h.feed("bcs2 7 \"EF\""));

        let changed: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                Event::ConfigstringChanged { index, value } => Some((*index, value.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(changed, vec![(7, "ABCDEF".to_string())]);
        assert_eq!(h.store.cached(7).as_deref(), Some("ABCDEF"));
        assert_eq!(events.iter().filter(|e| e.kind() == EventKind::Raw).count(), 3);
    }

    #[test]
    fn test_orphan_fragments_are_dropped() {
        let h = Harness::new();
        let mut events = h.feed("bcs1 7 \"CD\"");
        events.extend(h.feed("bcs2 7 \"EF\""));
        assert!(events.iter().all(|e| e.kind() == EventKind::Raw));
        assert_eq!(h.store.cached(7), None);
    }

    #[test]
    fn test_clear_drops_partial_configstrings() {
        let h = Harness::new();
        h.feed("bcs0 7 \"AB\"");
        h.parser.clear();
        let events = h.feed("bcs2 7 \"EF\"");
        assert_eq!(kinds(&events), vec![EventKind::Raw]);
    }

    #[test]
    fn test_stats_batching() {
        let h = Harness::new();
        let mut fields = score_row(3);
        fields.extend(score_row(5));
        let scores = h.feed(&format!("scores_ca 2 5 3 {}", fields.join(" ")));
        match &scores[0] {
            Event::Scores { rows } => {
                assert_eq!(rows.iter().map(|r| r.cid).collect::<Vec<_>>(), vec![3, 5]);
                assert_eq!(rows[0].team, Team::Red);
            }
            other => panic!("unexpected event {other:?}"),
        }

        assert_eq!(kinds(&h.feed(&stats_line())), vec![EventKind::Raw]);
        let batch = h.feed(&stats_line());
        match &batch[0] {
            Event::Stats { rows } => {
                assert_eq!(rows.iter().map(|r| r.cid).collect::<Vec<_>>(), vec![3, 5]);
            }
            other => panic!("unexpected event {other:?}"),
        }

        // Nothing left to pair the stray line with.
        assert_eq!(kinds(&h.feed(&stats_line())), vec![EventKind::Raw]);
    }

    #[test]
    fn test_round_countdown_and_start() {
        let h = Harness::new();
        let countdown = h.feed(r#"cs 661 "\round\1\time\12345""#);
        assert!(matches!(countdown[1], Event::RoundCountdown { round: 1 }));

        let start = h.feed(r#"cs 661 "\round\2""#);
        assert!(matches!(start[1], Event::RoundStart { round: 2 }));

        let none = h.feed(r#"cs 661 "\round\0""#);
        assert_eq!(kinds(&none), vec![EventKind::Configstring, EventKind::Raw]);
    }

    #[test]
    fn test_round_end_zero_and_forfeit() {
        let h = Harness::new();
        h.host.set_live(7, "2");

        assert!(!kinds(&h.feed("cs 6 \"0\"")).contains(&EventKind::RoundEnd));
        assert!(!kinds(&h.feed("cs 6 \"-999\"")).contains(&EventKind::RoundEnd));

        let events = h.feed("cs 6 \"3\"");
        match &events[1] {
            Event::RoundEnd { score, winner } => {
                assert_eq!(*score, (3, 2));
                assert_eq!(*winner, Team::Red);
            }
            other => panic!("unexpected event {other:?}"),
        }

        let events = h.feed("cs 7 \"4\"");
        assert!(matches!(events[1], Event::RoundEnd { score: (3, 4), winner: Team::Blue }));
    }

    #[test]
    fn test_vote_sequence() {
        let h = Harness::new();
        h.seat(2, r"\n\Mino\t\1");

        assert_eq!(kinds(&h.feed("print \"^1QL Mino called a vote.\n\"")), vec![EventKind::Raw]);

        let called = h.feed("cs 9 \"map q3dm6\"");
        match &called[1] {
            Event::VoteCalled { caller, kind, args } => {
                assert_eq!(caller.as_ref().map(|p| p.captured_name()), Some("Mino"));
                assert_eq!(kind, "map");
                assert_eq!(args, "q3dm6");
            }
            other => panic!("unexpected event {other:?}"),
        }

        h.feed("cs 10 \"3\"");
        h.feed("cs 11 \"1\"");
        let ended = h.feed("print \"Vote passed.\n\"");
        match &ended[0] {
            Event::VoteEnded { kind, args, votes, outcome } => {
                assert_eq!(kind, "map");
                assert_eq!(args.as_deref(), Some("q3dm6"));
                assert_eq!(*votes, (3, 1));
                assert_eq!(*outcome, VoteOutcome::Passed);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_countdown_without_vote_subject_does_not_cancel() {
        let h = Harness::new();
        h.seat(2, r"\n\Mino\t\1");
        h.host.set_live(0, r"\g_gameState\PRE_GAME");
        h.feed("print \"Mino called a vote.\"");

        let events = h.feed(r#"cs 0 "\g_gameState\COUNT_DOWN""#);
        assert_eq!(
            kinds(&events),
            vec![EventKind::Configstring, EventKind::GameCountdown, EventKind::Raw]
        );
    }

    #[test]
    fn test_game_start_cancels_vote_first() {
        let h = Harness::new();
        h.host.set_live(0, r"\g_gameState\PRE_GAME\g_gametype\4");
        h.host.set_live(9, "kick someone");

        let events = h.feed(r#"cs 0 "\g_gameState\IN_PROGRESS\g_gametype\4""#);
        assert_eq!(
            kinds(&events),
            vec![
                EventKind::Configstring,
                EventKind::VoteEnded,
                EventKind::GameStart,
                EventKind::Raw
            ]
        );
        assert!(matches!(
            &events[1],
            Event::VoteEnded { outcome: VoteOutcome::Cancelled, kind, .. } if kind == "kick"
        ));
    }

    #[test]
    fn test_back_to_warmup_is_silent() {
        let h = Harness::new();
        h.host.set_live(0, r"\g_gameState\IN_PROGRESS");
        let events = h.feed(r#"cs 0 "\g_gameState\PRE_GAME""#);
        assert_eq!(kinds(&events), vec![EventKind::Configstring, EventKind::Raw]);
    }

    #[test]
    fn test_game_end() {
        let h = Harness::new();
        h.feed(r#"cs 0 "\g_gameState\IN_PROGRESS\g_gametype\4""#);
        h.host.set_live(6, "7");
        h.host.set_live(7, "3");

        let events = h.feed("cs 14 \"1\"");
        match &events[1] {
            Event::GameEnd { score, winner, .. } => {
                assert_eq!(*score, (7, 3));
                assert_eq!(*winner, Team::Red);
            }
            other => panic!("unexpected event {other:?}"),
        }

        h.host.set_live(7, "7");
        assert!(!kinds(&h.feed("cs 14 \"1\"")).contains(&EventKind::GameEnd));
        assert!(!kinds(&h.feed("cs 14 \"0\"")).contains(&EventKind::GameEnd));
    }

    #[test]
    fn test_player_lifecycle() {
        let h = Harness::new();

        let connect = h.feed(r#"cs 531 "\n\Mino\t\1""#);
        match &connect[1] {
            Event::PlayerConnect { player } => {
                assert_eq!(player.client_id(), Some(2));
                assert_eq!(player.captured_name(), "Mino");
            }
            other => panic!("unexpected event {other:?}"),
        }

        let switch = h.feed(r#"cs 531 "\n\Mino\t\2""#);
        assert!(matches!(
            switch[1],
            Event::TeamSwitch { old_team: Team::Red, new_team: Team::Blue, .. }
        ));

        let same_team = h.feed(r#"cs 531 "\n\Mino^7\t\2""#);
        assert_eq!(kinds(&same_team), vec![EventKind::Configstring, EventKind::Raw]);

        h.feed("print \"Mino was kicked.\"");
        let disconnect = h.feed("cs 531 \"\"");
        match &disconnect[1] {
            Event::PlayerDisconnect { player, reason } => {
                assert!(player.is_detached());
                assert_eq!(player.captured_name(), "Mino");
                assert_eq!(player.team().unwrap(), Team::Blue);
                assert_eq!(*reason, DisconnectReason::Kick);
            }
            other => panic!("unexpected event {other:?}"),
        }

        h.feed(r#"cs 531 "\n\Mino\t\1""#);
        let disconnect = h.feed("cs 531 \"\"");
        assert!(matches!(
            disconnect[1],
            Event::PlayerDisconnect { reason: DisconnectReason::Unknown, .. }
        ));
    }

    #[test]
    fn test_ragequit_reason() {
        let h = Harness::new();
        h.feed(r#"cs 540 "\n\Bob\t\3""#);
        h.feed("print \"Bob ^1rage^7quits\"");
        let events = h.feed("cs 540 \"\"");
        assert!(matches!(
            events[1],
            Event::PlayerDisconnect { reason: DisconnectReason::Ragequit, .. }
        ));
    }

    #[test]
    fn test_slots_outside_player_range_are_ignored() {
        let h = Harness::new();
        let events = h.feed(r#"cs 561 "\n\Ghost\t\1""#);
        assert_eq!(kinds(&events), vec![EventKind::Configstring, EventKind::Raw]);
    }

    #[test]
    fn test_chat_channels() {
        let h = Harness::new();
        h.seat(2, r"\n\Mino\t\1");

        let chat = h.feed("chat \"12 Mino^7\x19: ^2hello there\"");
        match &chat[0] {
            Event::Chat { player, message, channel } => {
                assert_eq!(player.as_ref().map(|p| p.captured_name()), Some("Mino"));
                assert_eq!(message, "hello there");
                assert_eq!(*channel, Channel::Chat);
            }
            other => panic!("unexpected event {other:?}"),
        }

        let team = h.feed("tchat \"12 \x19(Mino^7\x19)\x19: ^5go go\"");
        assert!(matches!(&team[0], Event::Chat { channel: Channel::TeamChat, message, .. } if message == "go go"));

        let tell = h.feed("chat \"12 \x19[Mino^7\x19]\x19: ^6psst\"");
        assert!(matches!(&tell[0], Event::Chat { channel: Channel::Tell { cid: 2, .. }, message, .. } if message == "psst"));

        let stranger = h.feed("chat \"12 Nobody^7\x19: ^2hi\"");
        assert!(matches!(&stranger[0], Event::Chat { player: None, .. }));
    }

    #[test]
    fn test_malformed_lines_only_produce_raw() {
        let h = Harness::new();
        let events = h.feed("cs 14 \"abc\"");
        assert_eq!(kinds(&events), vec![EventKind::Configstring, EventKind::Raw]);

        let events = h.feed("scores_ca 2 0 0 1 2 3");
        assert_eq!(kinds(&events), vec![EventKind::Raw]);

        let events = h.feed("bcs9 7 \"x\"");
        assert_eq!(kinds(&events), vec![EventKind::Raw]);
    }

    #[test]
    fn test_huge_player_count_is_malformed() {
        let h = Harness::new();
        let events = h.feed("scores_ca 1085102592571150096 0 0 1 2 3");
        assert_eq!(kinds(&events), vec![EventKind::Raw]);

        // The bogus header must not have started a stats batch.
        assert_eq!(kinds(&h.feed(&stats_line())), vec![EventKind::Raw]);
    }

    #[test]
    fn test_find_player_ignores_colors_and_case() {
        let h = Harness::new();
        h.seat(4, r"\n\^1Mi^7no\t\2");
        let player = h.parser.find_player("mino").unwrap();
        assert_eq!(player.client_id(), Some(4));
        assert!(h.parser.find_player("someone").is_none());
    }
}
