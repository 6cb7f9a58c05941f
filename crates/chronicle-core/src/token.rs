//! Gap-aware tracking token.
//!
//! An auto-increment global index is not a sufficient cursor for the
//! global event stream: a transaction that obtained an index but has not
//! yet committed leaves a hole that becomes visible only later. The token
//! therefore carries the highest observed index together with the set of
//! lower indices that were absent when passed, so a reader can pick those
//! events up once they commit.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::EventStoreError;

/// Resumable position in the global event stream.
///
/// `index` is the highest global index the reader has observed. `gaps`
/// holds indices below `index` that have not been seen yet; each is
/// either delivered later (a slow transaction committed) or abandoned
/// (too old or too far behind). Tokens are immutable values; every
/// advancement produces a new token.
///
/// The wire format is `{ "index": i64, "gaps": [i64, ...] }`, validated
/// on deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TokenWire")]
pub struct GapAwareTrackingToken {
    index: i64,
    gaps: BTreeSet<i64>,
}

/// Unvalidated token shape as it appears on the wire.
#[derive(Debug, Deserialize)]
struct TokenWire {
    index: i64,
    gaps: Vec<i64>,
}

impl TryFrom<TokenWire> for GapAwareTrackingToken {
    type Error = EventStoreError;

    fn try_from(wire: TokenWire) -> Result<Self, Self::Error> {
        Self::new(wire.index, wire.gaps)
    }
}

impl GapAwareTrackingToken {
    /// Creates a token at `index` with the given gap indices.
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError::InvalidToken`] if any gap is at or
    /// beyond `index`.
    pub fn new(
        index: i64,
        gaps: impl IntoIterator<Item = i64>,
    ) -> Result<Self, EventStoreError> {
        let gaps: BTreeSet<i64> = gaps.into_iter().collect();
        if let Some(&highest) = gaps.iter().next_back() {
            if highest >= index {
                return Err(EventStoreError::InvalidToken(format!(
                    "gap {highest} is not below the token index {index}"
                )));
            }
        }
        Ok(Self { index, gaps })
    }

    /// The highest global index this token has observed.
    #[must_use]
    pub fn index(&self) -> i64 {
        self.index
    }

    /// The global indices below [`Self::index`] that have not been seen.
    #[must_use]
    pub fn gaps(&self) -> &BTreeSet<i64> {
        &self.gaps
    }

    /// Produces the token that results from observing `next_index`.
    ///
    /// An observation beyond the current index records every skipped
    /// index as a gap when `allow_gaps` is set; an observation at or
    /// below the current index fills that gap if it was tracked.
    /// Afterwards, gaps that fell further than `max_gap_offset` below
    /// the index are dropped as abandoned. When `allow_gaps` is false
    /// every gap at or below `next_index` is dropped as well: the event
    /// at `next_index` is old enough that its uncommitted predecessors
    /// must be considered lost.
    #[must_use]
    pub fn advance_to(&self, next_index: i64, max_gap_offset: i64, allow_gaps: bool) -> Self {
        let mut gaps = self.gaps.clone();
        let index = if gaps.remove(&next_index) {
            self.index
        } else if next_index > self.index {
            if allow_gaps {
                gaps.extend(self.index + 1..next_index);
            }
            next_index
        } else {
            self.index
        };

        let smallest_allowed = if allow_gaps {
            index - max_gap_offset
        } else {
            (index - max_gap_offset).max(next_index + 1)
        };
        gaps = gaps.split_off(&smallest_allowed);

        Self { index, gaps }
    }

    /// Whether the event at `global_index` has been observed under this
    /// token: at or below the index and not an open gap.
    #[must_use]
    pub fn covers(&self, global_index: i64) -> bool {
        global_index <= self.index && !self.gaps.contains(&global_index)
    }

    /// The position that both this reader and `other` have safely
    /// reached: the lower index, with the open gaps of both readers
    /// below it. Resuming from the merged token re-delivers anything
    /// either reader has not yet seen.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        let index = self.index.min(other.index);
        let gaps = self
            .gaps
            .iter()
            .chain(other.gaps.iter())
            .copied()
            .filter(|&gap| gap < index)
            .collect();
        Self { index, gaps }
    }

    /// The global indices this token covers that `other` does not.
    #[must_use]
    pub fn diff(&self, other: &Self) -> BTreeSet<i64> {
        let beyond = (other.index + 1..=self.index).filter(|&idx| self.covers(idx));
        let filled = other
            .gaps
            .iter()
            .copied()
            .filter(|&gap| self.covers(gap));
        beyond.chain(filled).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(index: i64, gaps: impl IntoIterator<Item = i64>) -> GapAwareTrackingToken {
        GapAwareTrackingToken::new(index, gaps).unwrap()
    }

    #[test]
    fn test_new_rejects_gap_at_or_beyond_index() {
        assert!(matches!(
            GapAwareTrackingToken::new(5, [5]),
            Err(EventStoreError::InvalidToken(_))
        ));
        assert!(matches!(
            GapAwareTrackingToken::new(5, [2, 9]),
            Err(EventStoreError::InvalidToken(_))
        ));
        assert!(GapAwareTrackingToken::new(5, [0, 4]).is_ok());
    }

    #[test]
    fn test_advance_beyond_index_records_skipped_indices_as_gaps() {
        let advanced = token(4, []).advance_to(8, 100, true);
        assert_eq!(advanced.index(), 8);
        assert_eq!(
            advanced.gaps().iter().copied().collect::<Vec<_>>(),
            vec![5, 6, 7]
        );
    }

    #[test]
    fn test_advance_beyond_index_without_gap_tracking_records_nothing() {
        let advanced = token(4, []).advance_to(8, 100, false);
        assert_eq!(advanced.index(), 8);
        assert!(advanced.gaps().is_empty());
    }

    #[test]
    fn test_advance_to_adjacent_index_creates_no_gap() {
        let advanced = token(4, []).advance_to(5, 100, true);
        assert_eq!(advanced.index(), 5);
        assert!(advanced.gaps().is_empty());
    }

    #[test]
    fn test_advance_to_tracked_gap_fills_it_and_keeps_index() {
        let advanced = token(6, [5]).advance_to(5, 100, true);
        assert_eq!(advanced.index(), 6);
        assert!(advanced.gaps().is_empty());
    }

    #[test]
    fn test_advance_to_untracked_lower_index_is_a_no_op() {
        let start = token(6, [4]);
        let advanced = start.advance_to(3, 100, true);
        assert_eq!(advanced, start);
    }

    #[test]
    fn test_advance_to_current_index_is_a_no_op() {
        let start = token(6, [4]);
        let advanced = start.advance_to(6, 100, true);
        assert_eq!(advanced, start);
    }

    #[test]
    fn test_advance_drops_gaps_beyond_max_offset() {
        // Gaps at 5..8 then an observation far ahead: only gaps within
        // the offset window survive.
        let start = token(4, []).advance_to(8, 100, true);
        let advanced = start.advance_to(12, 6, true);
        assert_eq!(advanced.index(), 12);
        assert_eq!(
            advanced.gaps().iter().copied().collect::<Vec<_>>(),
            vec![6, 7, 9, 10, 11]
        );
    }

    #[test]
    fn test_advance_without_gap_tracking_abandons_gap_prefix() {
        // Filling gap 6 with allow_gaps = false declares everything at or
        // below 6 abandoned, which the cleanup sweep relies on.
        let start = token(10, [3, 5, 6, 8]);
        let advanced = start.advance_to(6, 100, false);
        assert_eq!(advanced.index(), 10);
        assert_eq!(advanced.gaps().iter().copied().collect::<Vec<_>>(), vec![8]);
    }

    #[test]
    fn test_index_is_monotonic_across_advancements() {
        let mut current = token(0, []);
        for next in [5, 3, 9, 9, 2, 40] {
            let advanced = current.advance_to(next, 10, true);
            assert!(advanced.index() >= current.index());
            current = advanced;
        }
    }

    #[test]
    fn test_gap_bound_holds_after_every_advancement() {
        let mut current = token(0, []);
        for next in [10, 30, 25, 60, 55, 200] {
            current = current.advance_to(next, 20, true);
            if let Some(&lowest) = current.gaps().iter().next() {
                assert!(lowest >= current.index() - 20);
            }
        }
    }

    #[test]
    fn test_covers_observed_indices_only() {
        let t = token(8, [5, 6]);
        assert!(t.covers(4));
        assert!(t.covers(8));
        assert!(!t.covers(5));
        assert!(!t.covers(6));
        assert!(!t.covers(9));
    }

    #[test]
    fn test_merge_keeps_what_both_readers_have_seen() {
        let ahead = token(8, [5]);
        let behind = token(6, [3]);
        let merged = ahead.merge(&behind);
        assert_eq!(merged.index(), 6);
        assert_eq!(merged.gaps().iter().copied().collect::<Vec<_>>(), vec![3, 5]);
        assert_eq!(merged, behind.merge(&ahead));
    }

    #[test]
    fn test_merge_drops_gaps_at_or_above_the_merged_index() {
        let merged = token(10, [7, 9]).merge(&token(7, []));
        assert_eq!(merged.index(), 7);
        assert!(merged.gaps().is_empty());
    }

    #[test]
    fn test_diff_lists_coverage_the_other_reader_is_missing() {
        let ahead = token(8, [5]);
        let behind = token(6, [3]);
        assert_eq!(
            ahead.diff(&behind).iter().copied().collect::<Vec<_>>(),
            vec![3, 7, 8]
        );
        // The reader that is behind still covers the slot the other one
        // skipped over.
        assert_eq!(
            behind.diff(&ahead).iter().copied().collect::<Vec<_>>(),
            vec![5]
        );
        assert!(ahead.diff(&ahead).is_empty());
    }

    #[test]
    fn test_wire_format_round_trip() {
        let t = token(9, [4, 7]);
        let json = serde_json::to_string(&t).unwrap();
        assert_eq!(json, r#"{"index":9,"gaps":[4,7]}"#);
        let parsed: GapAwareTrackingToken = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, t);
    }

    #[test]
    fn test_wire_format_rejects_gap_beyond_index() {
        let result: Result<GapAwareTrackingToken, _> =
            serde_json::from_str(r#"{"index":3,"gaps":[3]}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_tokens_compare_by_value() {
        assert_eq!(token(7, [2, 3]), token(7, [3, 2]));
        assert_ne!(token(7, [2]), token(7, [3]));
        assert_ne!(token(7, []), token(8, []));
    }
}
