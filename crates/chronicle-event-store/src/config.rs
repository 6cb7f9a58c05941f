//! Storage engine configuration.

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

use chrono::Duration;
use chronicle_core::serialization::PayloadDataKind;

const DEFAULT_BATCH_SIZE: usize = 100;
const DEFAULT_MAX_GAP_OFFSET: i64 = 10_000;
const DEFAULT_LOWEST_GLOBAL_SEQUENCE: i64 = 1;
const DEFAULT_GAP_TIMEOUT_MS: i64 = 60_000;
const DEFAULT_GAP_CLEANING_THRESHOLD: usize = 250;

/// Tuning knobs of the storage engine.
///
/// `gap_timeout` and `gap_cleaning_threshold` may be adjusted while the
/// engine is in use; a change takes effect on the next call. The
/// remaining fields are fixed at construction.
#[derive(Debug)]
pub struct EventStoreConfig {
    batch_size: usize,
    max_gap_offset: i64,
    lowest_global_sequence: i64,
    gap_timeout_ms: AtomicI64,
    gap_cleaning_threshold: AtomicUsize,
    payload_data_kind: PayloadDataKind,
}

impl Default for EventStoreConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_gap_offset: DEFAULT_MAX_GAP_OFFSET,
            lowest_global_sequence: DEFAULT_LOWEST_GLOBAL_SEQUENCE,
            gap_timeout_ms: AtomicI64::new(DEFAULT_GAP_TIMEOUT_MS),
            gap_cleaning_threshold: AtomicUsize::new(DEFAULT_GAP_CLEANING_THRESHOLD),
            payload_data_kind: PayloadDataKind::default(),
        }
    }
}

impl EventStoreConfig {
    /// Rows fetched per read. At least 1.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Gaps further than this below the token index are abandoned.
    #[must_use]
    pub fn with_max_gap_offset(mut self, max_gap_offset: i64) -> Self {
        self.max_gap_offset = max_gap_offset;
        self
    }

    /// The first global index the database will assign in an empty
    /// store.
    #[must_use]
    pub fn with_lowest_global_sequence(mut self, lowest_global_sequence: i64) -> Self {
        self.lowest_global_sequence = lowest_global_sequence;
        self
    }

    /// Age after which a gap may be declared abandoned.
    #[must_use]
    pub fn with_gap_timeout(self, gap_timeout: Duration) -> Self {
        self.set_gap_timeout(gap_timeout);
        self
    }

    /// Gap count that triggers a cleanup sweep before a tracked read.
    #[must_use]
    pub fn with_gap_cleaning_threshold(self, threshold: usize) -> Self {
        self.set_gap_cleaning_threshold(threshold);
        self
    }

    /// Column representation of payload and metadata blobs.
    #[must_use]
    pub fn with_payload_data_kind(mut self, kind: PayloadDataKind) -> Self {
        self.payload_data_kind = kind;
        self
    }

    /// Rows fetched per read.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Maximum distance between a gap and the token index.
    #[must_use]
    pub fn max_gap_offset(&self) -> i64 {
        self.max_gap_offset
    }

    /// First expected global index in an empty store.
    #[must_use]
    pub fn lowest_global_sequence(&self) -> i64 {
        self.lowest_global_sequence
    }

    /// Current gap timeout.
    #[must_use]
    pub fn gap_timeout(&self) -> Duration {
        Duration::milliseconds(self.gap_timeout_ms.load(Ordering::Relaxed))
    }

    /// Adjusts the gap timeout; visible on the next call.
    pub fn set_gap_timeout(&self, gap_timeout: Duration) {
        self.gap_timeout_ms
            .store(gap_timeout.num_milliseconds(), Ordering::Relaxed);
    }

    /// Current gap cleaning threshold.
    #[must_use]
    pub fn gap_cleaning_threshold(&self) -> usize {
        self.gap_cleaning_threshold.load(Ordering::Relaxed)
    }

    /// Adjusts the gap cleaning threshold; visible on the next call.
    pub fn set_gap_cleaning_threshold(&self, threshold: usize) {
        self.gap_cleaning_threshold.store(threshold, Ordering::Relaxed);
    }

    /// Column representation of payload and metadata blobs.
    #[must_use]
    pub fn payload_data_kind(&self) -> PayloadDataKind {
        self.payload_data_kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EventStoreConfig::default();
        assert_eq!(config.batch_size(), 100);
        assert_eq!(config.max_gap_offset(), 10_000);
        assert_eq!(config.lowest_global_sequence(), 1);
        assert_eq!(config.gap_timeout(), Duration::milliseconds(60_000));
        assert_eq!(config.gap_cleaning_threshold(), 250);
        assert_eq!(config.payload_data_kind(), PayloadDataKind::Bytes);
    }

    #[test]
    fn test_live_knobs_update_in_place() {
        let config = EventStoreConfig::default();
        config.set_gap_timeout(Duration::seconds(5));
        config.set_gap_cleaning_threshold(10);
        assert_eq!(config.gap_timeout(), Duration::seconds(5));
        assert_eq!(config.gap_cleaning_threshold(), 10);
    }

    #[test]
    fn test_batch_size_never_zero() {
        assert_eq!(EventStoreConfig::default().with_batch_size(0).batch_size(), 1);
    }
}
