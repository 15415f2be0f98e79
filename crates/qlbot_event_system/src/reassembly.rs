//! # Chunk Reassembly
//!
//! Two kinds of server output arrive in pieces:
//!
//! * **Split configstrings** (`bcs0`/`bcs1`/`bcs2`): a configstring too large
//!   for one command. Mode 0 starts a buffer, 1 appends, 2 appends and
//!   completes it. Several indices can be in flight at once.
//! * **Statistics blocks**: a `scores_ca` header lists the players in order,
//!   then one `castats` line follows per player. The batch is complete when
//!   every listed player has been matched.
//!
//! Both buffers are dropped on (re)connect.

use crate::entities::CaEndStats;
use crate::error::ProtocolError;
use std::collections::{HashMap, VecDeque};
use tracing::debug;

/// Stage of a split configstring fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentMode {
    /// `bcs0`: first fragment, replaces any stale buffer
    Start,
    /// `bcs1`: middle fragment
    Continue,
    /// `bcs2`: last fragment
    End,
}

impl FragmentMode {
    pub fn parse(mode: &str) -> Result<Self, ProtocolError> {
        match mode {
            "0" => Ok(FragmentMode::Start),
            "1" => Ok(FragmentMode::Continue),
            "2" => Ok(FragmentMode::End),
            other => Err(ProtocolError::UnknownFragmentMode(other.to_string())),
        }
    }
}

/// Buffers for split configstrings, keyed by index.
#[derive(Debug, Default)]
pub struct BigConfigstrings {
    buffers: HashMap<u16, String>,
}

impl BigConfigstrings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one fragment.
    ///
    /// # Returns
    ///
    /// `Ok(Some(value))` with the complete configstring once the final fragment
    /// arrives, `Ok(None)` while more fragments are expected, or an error for a
    /// continuation with no start fragment.
    pub fn feed(
        &mut self,
        mode: FragmentMode,
        index: u16,
        fragment: &str,
    ) -> Result<Option<String>, ProtocolError> {
        match mode {
            FragmentMode::Start => {
                self.buffers.insert(index, fragment.to_string());
                Ok(None)
            }
            FragmentMode::Continue => {
                let buffer = self
                    .buffers
                    .get_mut(&index)
                    .ok_or(ProtocolError::OrphanFragment { index })?;
                buffer.push_str(fragment);
                Ok(None)
            }
            FragmentMode::End => {
                let mut value = self
                    .buffers
                    .remove(&index)
                    .ok_or(ProtocolError::OrphanFragment { index })?;
                value.push_str(fragment);
                debug!("Reassembled configstring {} ({} bytes)", index, value.len());
                Ok(Some(value))
            }
        }
    }

    pub fn pending(&self) -> usize {
        self.buffers.len()
    }

    pub fn clear(&mut self) {
        self.buffers.clear();
    }
}

/// Pairs `castats` lines with the client ids announced by `scores_ca`.
#[derive(Debug, Default)]
pub struct StatsCollector {
    order: VecDeque<u8>,
    buffer: Vec<CaEndStats>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new batch, discarding whatever the previous one left behind.
    pub fn begin(&mut self, ids: impl IntoIterator<Item = u8>) {
        self.order = ids.into_iter().collect();
        self.buffer.clear();
    }

    /// Feeds the integers of one `castats` line.
    ///
    /// # Returns
    ///
    /// The complete batch once the last announced player has been matched,
    /// `None` before that. A line with no pending player is an error and
    /// leaves the collector untouched.
    pub fn feed(&mut self, fields: &[i64]) -> Result<Option<Vec<CaEndStats>>, ProtocolError> {
        let cid = *self.order.front().ok_or(ProtocolError::UnexpectedStats)?;
        let stats = CaEndStats::from_fields(cid, fields)?;
        self.order.pop_front();
        self.buffer.push(stats);

        if self.order.is_empty() {
            Ok(Some(std::mem::take(&mut self.buffer)))
        } else {
            Ok(None)
        }
    }

    pub fn pending(&self) -> usize {
        self.order.len()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::CA_STATS_MIN_FIELDS;

    fn stats_line(seed: i64) -> Vec<i64> {
        let mut fields = vec![0; CA_STATS_MIN_FIELDS];
        fields[1] = seed;
        fields
    }

    #[test]
    fn test_three_fragments_reassemble() {
        let mut big = BigConfigstrings::new();
        assert_eq!(big.feed(FragmentMode::Start, 7, "AB"), Ok(None));
        assert_eq!(big.feed(FragmentMode::Continue, 7, "CD"), Ok(None));
        assert_eq!(big.feed(FragmentMode::End, 7, "EF"), Ok(Some("ABCDEF".to_string())));
        assert_eq!(big.pending(), 0);
    }

    #[test]
    fn test_start_and_end_only() {
        let mut big = BigConfigstrings::new();
        big.feed(FragmentMode::Start, 0, "x").unwrap();
        assert_eq!(big.feed(FragmentMode::End, 0, "y"), Ok(Some("xy".to_string())));
    }

    #[test]
    fn test_orphan_fragments_are_rejected() {
        let mut big = BigConfigstrings::new();
        assert_eq!(
            big.feed(FragmentMode::Continue, 7, "CD"),
            Err(ProtocolError::OrphanFragment { index: 7 })
        );
        assert_eq!(
            big.feed(FragmentMode::End, 7, "EF"),
            Err(ProtocolError::OrphanFragment { index: 7 })
        );
    }

    #[test]
    fn test_interleaved_indices() {
        let mut big = BigConfigstrings::new();
        big.feed(FragmentMode::Start, 1, "a").unwrap();
        big.feed(FragmentMode::Start, 2, "b").unwrap();
        big.feed(FragmentMode::Continue, 1, "c").unwrap();
        assert_eq!(big.feed(FragmentMode::End, 2, "d"), Ok(Some("bd".to_string())));
        assert_eq!(big.feed(FragmentMode::End, 1, "e"), Ok(Some("ace".to_string())));
    }

    #[test]
    fn test_restart_replaces_stale_buffer() {
        let mut big = BigConfigstrings::new();
        big.feed(FragmentMode::Start, 5, "old").unwrap();
        big.feed(FragmentMode::Start, 5, "new").unwrap();
        assert_eq!(big.feed(FragmentMode::End, 5, "!"), Ok(Some("new!".to_string())));
    }

    #[test]
    fn test_fragment_mode_parse() {
        assert_eq!(FragmentMode::parse("2"), Ok(FragmentMode::End));
        assert_eq!(
            FragmentMode::parse("9"),
            Err(ProtocolError::UnknownFragmentMode("9".to_string()))
        );
    }

    #[test]
    fn test_stats_batch_in_header_order() {
        let mut stats = StatsCollector::new();
        stats.begin([3, 5]);
        assert_eq!(stats.feed(&stats_line(100)), Ok(None));
        let batch = stats.feed(&stats_line(200)).unwrap().unwrap();
        assert_eq!(batch.iter().map(|s| s.cid).collect::<Vec<_>>(), vec![3, 5]);
        assert_eq!(batch[0].damage_done, 100);
        assert_eq!(batch[1].damage_done, 200);

        // A stray line has nothing to pair with.
        assert_eq!(stats.feed(&stats_line(300)), Err(ProtocolError::UnexpectedStats));
    }

    #[test]
    fn test_malformed_stats_keep_order() {
        let mut stats = StatsCollector::new();
        stats.begin([1]);
        assert!(stats.feed(&[1, 2, 3]).is_err());
        assert_eq!(stats.pending(), 1);
        assert!(stats.feed(&stats_line(1)).unwrap().is_some());
    }

    #[test]
    fn test_new_header_resets_batch() {
        let mut stats = StatsCollector::new();
        stats.begin([1, 2]);
        stats.feed(&stats_line(1)).unwrap();
        stats.begin([4]);
        let batch = stats.feed(&stats_line(2)).unwrap().unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].cid, 4);
    }
}
