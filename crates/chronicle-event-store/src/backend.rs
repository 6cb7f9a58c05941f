//! Storage hooks behind the batching layer.

use async_trait::async_trait;
use chronicle_core::error::EventStoreError;
use chronicle_core::message::EventMessage;
use chronicle_core::record::{DomainEventRecord, TrackedEventRecord};
use chronicle_core::serialization::EventSerializer;
use chronicle_core::token::GapAwareTrackingToken;
use uuid::Uuid;

/// The storage operations a [`crate::engine::BatchingEventStore`]
/// drives. One implementation per database product.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Inserts a batch of events for one aggregate in a single
    /// transaction. An empty batch is a no-op.
    async fn append_events(
        &self,
        events: &[EventMessage],
        serializer: &dyn EventSerializer,
    ) -> Result<(), EventStoreError>;

    /// Inserts a snapshot and prunes older snapshots of the same
    /// aggregate in a single transaction. A duplicate snapshot is
    /// silently accepted.
    async fn store_snapshot(
        &self,
        snapshot: &EventMessage,
        serializer: &dyn EventSerializer,
    ) -> Result<(), EventStoreError>;

    /// Reads up to `batch_size` rows of one aggregate starting at
    /// `first_sequence_number`, ascending.
    async fn fetch_domain_events(
        &self,
        aggregate_id: Uuid,
        first_sequence_number: i64,
        batch_size: usize,
    ) -> Result<Vec<DomainEventRecord>, EventStoreError>;

    /// Reads the snapshot with the highest sequence number for the
    /// aggregate, if any.
    async fn fetch_snapshot(
        &self,
        aggregate_id: Uuid,
    ) -> Result<Option<DomainEventRecord>, EventStoreError>;

    /// Reads the next batch of the global stream after `last_token`,
    /// revisiting its gaps, pairing every row with the token observed
    /// after consuming it.
    async fn fetch_tracked_events(
        &self,
        last_token: Option<GapAwareTrackingToken>,
        batch_size: usize,
    ) -> Result<Vec<TrackedEventRecord>, EventStoreError>;
}
