//! Stored event record shapes.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::message::EventMessage;
use crate::serialization::PayloadData;
use crate::token::GapAwareTrackingToken;

/// A domain event row as read from the store, payload still serialized.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainEventRecord {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Aggregate this event belongs to.
    pub aggregate_id: Uuid,
    /// Aggregate type name.
    pub aggregate_type: String,
    /// Position within the aggregate stream.
    pub sequence_number: i64,
    /// Timestamp of event creation.
    pub timestamp: DateTime<Utc>,
    /// Payload type name.
    pub payload_type: String,
    /// Schema revision of the serialized payload, if any.
    pub payload_revision: Option<String>,
    /// The serialized payload.
    pub payload: PayloadData,
    /// The serialized metadata.
    pub metadata: PayloadData,
}

/// A raw record from the global stream paired with the token observed
/// immediately after consuming it.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedEventRecord {
    /// Position after this record.
    pub token: GapAwareTrackingToken,
    /// The record itself.
    pub record: DomainEventRecord,
}

/// A deserialized event from the global stream paired with the token
/// observed immediately after consuming it. Persisting `token` and
/// resuming from it re-reads nothing up to and including this event.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedEvent {
    /// Position after this event.
    pub token: GapAwareTrackingToken,
    /// The event itself.
    pub event: EventMessage,
}
