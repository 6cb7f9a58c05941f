//! Event store error types.

use thiserror::Error;
use uuid::Uuid;

/// Boxed driver error carried as the cause of a storage failure.
pub type BoxedCause = Box<dyn std::error::Error + Send + Sync>;

/// Top-level error type for all event store operations.
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// An append collided with a concurrent writer on the same aggregate.
    #[error("concurrent modification of aggregate {aggregate_id} at sequence {sequence_number}")]
    Concurrency {
        /// The aggregate that had the conflict.
        aggregate_id: Uuid,
        /// The sequence number of the first event in the rejected batch.
        sequence_number: i64,
    },

    /// A driver or SQL failure, with the original cause attached.
    #[error("event storage failure: {context}")]
    Storage {
        /// Description of the operation that failed.
        context: String,
        /// The underlying driver error.
        #[source]
        source: BoxedCause,
    },

    /// A tracking token whose shape violates the token invariants.
    #[error("invalid tracking token: {0}")]
    InvalidToken(String),

    /// Payload or metadata could not be serialized or deserialized.
    #[error("serialization failure")]
    Serialization(#[from] serde_json::Error),
}

impl EventStoreError {
    /// Wraps a driver error as a storage failure with context.
    pub fn storage(context: impl Into<String>, source: impl Into<BoxedCause>) -> Self {
        Self::Storage {
            context: context.into(),
            source: source.into(),
        }
    }
}
