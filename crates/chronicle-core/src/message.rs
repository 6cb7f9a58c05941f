//! Domain event messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A domain event as handed to and returned by the event store, with
/// its payload still in memory form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Aggregate this event belongs to.
    pub aggregate_id: Uuid,
    /// Aggregate type name.
    pub aggregate_type: String,
    /// Position within the aggregate stream; contiguous from 0.
    pub sequence_number: i64,
    /// Payload type name for deserialization routing.
    pub payload_type: String,
    /// The domain payload.
    pub payload: serde_json::Value,
    /// Caller-supplied metadata (correlation ids and the like).
    pub metadata: serde_json::Value,
    /// Timestamp of event creation.
    pub timestamp: DateTime<Utc>,
}
