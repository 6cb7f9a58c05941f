//! Event store abstraction.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::EventStoreError;
use crate::message::EventMessage;
use crate::record::TrackedEvent;
use crate::token::GapAwareTrackingToken;

/// Persistent store of domain events and aggregate snapshots.
///
/// Events of one aggregate form a contiguous sequence keyed by
/// `sequence_number`; all events additionally carry a database-assigned
/// global index that orders the full history for tracked readers.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends a batch of events for a single aggregate.
    ///
    /// The batch must carry strictly increasing sequence numbers. All
    /// rows become visible atomically; an empty batch is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError::Concurrency`] when another writer
    /// already claimed one of the batch's sequence numbers, and
    /// [`EventStoreError::Storage`] for any other driver failure.
    async fn append_events(&self, events: &[EventMessage]) -> Result<(), EventStoreError>;

    /// Stores an aggregate snapshot, pruning older snapshots of the
    /// same aggregate. Storing a snapshot that already exists is a
    /// no-op; snapshots are advisory.
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError::Storage`] for driver failures.
    async fn store_snapshot(&self, snapshot: &EventMessage) -> Result<(), EventStoreError>;

    /// Reads the events of one aggregate from `first_sequence_number`
    /// on, in ascending sequence order.
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError::Storage`] for driver failures and
    /// [`EventStoreError::Serialization`] when a stored payload cannot
    /// be decoded.
    async fn read_events(
        &self,
        aggregate_id: Uuid,
        first_sequence_number: i64,
    ) -> Result<Vec<EventMessage>, EventStoreError>;

    /// Reads the snapshot with the highest sequence number for the
    /// aggregate, if one exists.
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError::Storage`] for driver failures and
    /// [`EventStoreError::Serialization`] when the stored payload
    /// cannot be decoded.
    async fn read_snapshot(
        &self,
        aggregate_id: Uuid,
    ) -> Result<Option<EventMessage>, EventStoreError>;

    /// Reads the next batch of the global event stream after
    /// `last_token`, revisiting the token's gaps, and pairs every event
    /// with the token observed after consuming it.
    ///
    /// Pass `None` to read from the start of the stream.
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError::Storage`] for driver failures and
    /// [`EventStoreError::Serialization`] when a stored payload cannot
    /// be decoded.
    async fn read_tracked_events(
        &self,
        last_token: Option<GapAwareTrackingToken>,
        batch_size: usize,
    ) -> Result<Vec<TrackedEvent>, EventStoreError>;
}
