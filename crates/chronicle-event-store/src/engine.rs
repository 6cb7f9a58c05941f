//! Batching layer over a storage backend.

use std::sync::Arc;

use async_trait::async_trait;
use chronicle_core::error::EventStoreError;
use chronicle_core::message::EventMessage;
use chronicle_core::record::{DomainEventRecord, TrackedEvent};
use chronicle_core::serialization::{EventSerializer, SerializedPayload, Upcaster};
use chronicle_core::store::EventStore;
use chronicle_core::token::GapAwareTrackingToken;
use uuid::Uuid;

use crate::backend::StorageBackend;

/// Event store that drives a [`StorageBackend`] in batches and carries
/// the serialization policy: batch size, serializer, and the upcaster
/// chain applied to stored payloads on read.
pub struct BatchingEventStore<B> {
    backend: B,
    batch_size: usize,
    serializer: Arc<dyn EventSerializer>,
    upcasters: Vec<Arc<dyn Upcaster>>,
}

impl<B: StorageBackend> BatchingEventStore<B> {
    /// Assembles a store from a backend and its serialization policy.
    #[must_use]
    pub fn new(
        backend: B,
        batch_size: usize,
        serializer: Arc<dyn EventSerializer>,
        upcasters: Vec<Arc<dyn Upcaster>>,
    ) -> Self {
        Self {
            backend,
            batch_size: batch_size.max(1),
            serializer,
            upcasters,
        }
    }

    /// The underlying storage backend.
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn decode(&self, record: DomainEventRecord) -> Result<EventMessage, EventStoreError> {
        let payload = SerializedPayload {
            type_name: record.payload_type,
            revision: record.payload_revision,
            data: record.payload,
        };
        let payload = self
            .upcasters
            .iter()
            .fold(payload, |payload, upcaster| upcaster.upcast(payload));
        let payload_value = self.serializer.deserialize(&payload)?;

        let metadata = SerializedPayload {
            type_name: payload.type_name.clone(),
            revision: payload.revision.clone(),
            data: record.metadata,
        };
        let metadata_value = self.serializer.deserialize(&metadata)?;

        Ok(EventMessage {
            event_id: record.event_id,
            aggregate_id: record.aggregate_id,
            aggregate_type: record.aggregate_type,
            sequence_number: record.sequence_number,
            payload_type: payload.type_name,
            payload: payload_value,
            metadata: metadata_value,
            timestamp: record.timestamp,
        })
    }
}

#[async_trait]
impl<B: StorageBackend> EventStore for BatchingEventStore<B> {
    async fn append_events(&self, events: &[EventMessage]) -> Result<(), EventStoreError> {
        self.backend
            .append_events(events, self.serializer.as_ref())
            .await
    }

    async fn store_snapshot(&self, snapshot: &EventMessage) -> Result<(), EventStoreError> {
        self.backend
            .store_snapshot(snapshot, self.serializer.as_ref())
            .await
    }

    async fn read_events(
        &self,
        aggregate_id: Uuid,
        first_sequence_number: i64,
    ) -> Result<Vec<EventMessage>, EventStoreError> {
        let mut events = Vec::new();
        let mut next = first_sequence_number;
        loop {
            let records = self
                .backend
                .fetch_domain_events(aggregate_id, next, self.batch_size)
                .await?;
            let fetched = records.len();
            for record in records {
                let event = self.decode(record)?;
                next = event.sequence_number + 1;
                events.push(event);
            }
            if fetched < self.batch_size {
                break;
            }
        }
        Ok(events)
    }

    async fn read_snapshot(
        &self,
        aggregate_id: Uuid,
    ) -> Result<Option<EventMessage>, EventStoreError> {
        self.backend
            .fetch_snapshot(aggregate_id)
            .await?
            .map(|record| self.decode(record))
            .transpose()
    }

    async fn read_tracked_events(
        &self,
        last_token: Option<GapAwareTrackingToken>,
        batch_size: usize,
    ) -> Result<Vec<TrackedEvent>, EventStoreError> {
        let records = self
            .backend
            .fetch_tracked_events(last_token, batch_size)
            .await?;
        records
            .into_iter()
            .map(|tracked| {
                Ok(TrackedEvent {
                    token: tracked.token,
                    event: self.decode(tracked.record)?,
                })
            })
            .collect()
    }
}
