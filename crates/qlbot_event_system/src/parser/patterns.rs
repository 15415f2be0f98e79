//! Shapes of the server notifications the parser understands.
//!
//! Every pattern is anchored at the start of the line. `\x19` is the
//! separator the server puts around names in chat lines.

use once_cell::sync::Lazy;
use regex::Regex;

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("valid regex")
}

/// Any configstring update: `cs <index> "<value>"`.
pub(crate) static CONFIGSTRING: Lazy<Regex> =
    Lazy::new(|| compile(r#"^cs (?P<index>\S+) "(?P<value>.*)"$"#));

pub(crate) static CHAT: Lazy<Regex> = Lazy::new(|| {
    compile(r#"^chat "(?P<id>..) (?:(?P<clan>[^ \x19]+?) )?(?P<name>[^\x19]+?)..\x19: ..(?P<msg>.+)""#)
});

pub(crate) static TEAM_CHAT: Lazy<Regex> = Lazy::new(|| {
    compile(r#"^tchat "(?P<id>..) \x19\((?:(?P<clan>[^ ]+?) )?(?P<name>.+?)..\x19\)(?: \(.+?\))?\x19: ..(?P<msg>.+)""#)
});

pub(crate) static TELL: Lazy<Regex> = Lazy::new(|| {
    compile(r#"^chat "(?P<id>..) \x19\[(?:(?P<clan>[^ ]+?) )?(?P<name>.+?)\^7\x19\](?: \(.+?\))?\x19: ..(?P<msg>.+)""#)
});

/// Split configstring fragment: `bcs<mode> <index> "<fragment>"`.
pub(crate) static BIG_CONFIGSTRING: Lazy<Regex> =
    Lazy::new(|| compile(r#"^bcs(?P<mode>.) (?P<index>\S+) "(?P<value>.*)"$"#));

pub(crate) static CONNECTED: Lazy<Regex> = Lazy::new(|| compile(r#"^print "(?P<name>.+) connected"#));
pub(crate) static DISCONNECTED: Lazy<Regex> =
    Lazy::new(|| compile(r#"^print "(?P<name>.+) disconnected"#));
pub(crate) static KICKED: Lazy<Regex> = Lazy::new(|| compile(r#"^print "(?P<name>.+) was kicked"#));
pub(crate) static RAGEQUIT: Lazy<Regex> =
    Lazy::new(|| compile(r#"^print "(?P<name>.+) \^1rage\^7quits"#));
pub(crate) static TIMED_OUT: Lazy<Regex> = Lazy::new(|| compile(r#"^print "(?P<name>.+) timed out"#));

pub(crate) static ROUND: Lazy<Regex> = Lazy::new(|| compile(r#"^cs 661 "(?P<vars>.+)""#));
pub(crate) static ROUND_END: Lazy<Regex> = Lazy::new(|| compile(r#"^cs (?P<team>6|7) "(?P<score>.+)""#));
pub(crate) static GAME_CHANGE: Lazy<Regex> = Lazy::new(|| compile(r#"^cs 0 "(?P<vars>.*)""#));
pub(crate) static GAME_END: Lazy<Regex> = Lazy::new(|| compile(r#"^cs 14 "(?P<value>.+)""#));

pub(crate) static VOTE_CALLED: Lazy<Regex> =
    Lazy::new(|| compile(r#"^print "(?P<name>.+) called a vote\."#));
pub(crate) static VOTE_SUBJECT: Lazy<Regex> = Lazy::new(|| compile(r#"^cs 9 "(?P<subject>.*)"$"#));
pub(crate) static VOTE_ENDED: Lazy<Regex> =
    Lazy::new(|| compile(r#"^print "Vote (?P<result>passed|failed)\."#));

/// Player slots, `cs 529` to `cs 560`.
pub(crate) static PLAYER_CHANGE: Lazy<Regex> =
    Lazy::new(|| compile(r#"^cs (?P<index>5[2-6][0-9]) "(?P<vars>.*)"$"#));

pub(crate) static SCORES_CA: Lazy<Regex> = Lazy::new(|| {
    compile(r"^scores_ca (?P<total>\S+) (?P<red>\S+) (?P<blue>\S+) (?P<scores>.+)")
});
pub(crate) static CASTATS: Lazy<Regex> = Lazy::new(|| compile(r"^castats (?P<scores>.+)"));
