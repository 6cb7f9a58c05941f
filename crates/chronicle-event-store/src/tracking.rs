//! Per-row token advancement for the global stream.

use chrono::{DateTime, Duration, Utc};
use chronicle_core::error::EventStoreError;
use chronicle_core::token::GapAwareTrackingToken;

/// Parameters of a single token advancement.
pub(crate) struct Advancement {
    /// The global index of the row being consumed.
    pub global_index: i64,
    /// The row's stored timestamp.
    pub timestamp: DateTime<Utc>,
    /// The clock reading taken before walking the result set.
    pub now: DateTime<Utc>,
    /// Current gap timeout.
    pub gap_timeout: Duration,
    /// Maximum distance between a gap and the token index.
    pub max_gap_offset: i64,
    /// First expected global index in an empty store.
    pub lowest_global_sequence: i64,
}

/// Computes the token observed immediately after consuming a row.
///
/// A row is "recent" when its timestamp lies within the gap timeout;
/// only then may earlier-numbered rows still be committing, so only
/// then are skipped indices recorded as gaps. The first row ever read
/// seeds the token, treating every index from the store's lowest
/// expected sequence up to the row as a potential gap.
pub(crate) fn advance_token(
    previous: Option<&GapAwareTrackingToken>,
    advancement: &Advancement,
) -> Result<GapAwareTrackingToken, EventStoreError> {
    let allow_gaps = advancement.timestamp > advancement.now - advancement.gap_timeout;
    match previous {
        Some(token) => Ok(token.advance_to(
            advancement.global_index,
            advancement.max_gap_offset,
            allow_gaps,
        )),
        None => {
            let gaps = if allow_gaps {
                advancement
                    .lowest_global_sequence
                    .min(advancement.global_index)..advancement.global_index
            } else {
                0..0
            };
            GapAwareTrackingToken::new(advancement.global_index, gaps)
        }
    }
}
