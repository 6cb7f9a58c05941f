//! Serialization bridge between domain payloads and stored blobs.
//!
//! The engine never interprets payloads; it moves them between the
//! in-memory `serde_json::Value` form and the stored representation
//! through the [`EventSerializer`] seam. Upcasters rewrite stored
//! payloads of older revisions before deserialization.

use serde::{Deserialize, Serialize};

use crate::error::EventStoreError;

/// Stored representation of a payload or metadata blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PayloadData {
    /// Serialized bytes, stored in a binary column.
    Bytes(Vec<u8>),
    /// A database-native JSON object.
    Json(serde_json::Value),
}

/// The column representation payloads are stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayloadDataKind {
    /// Binary column (the default).
    #[default]
    Bytes,
    /// Native JSON column.
    Json,
}

/// A serialized payload together with its type name and revision.
#[derive(Debug, Clone, PartialEq)]
pub struct SerializedPayload {
    /// Payload type name.
    pub type_name: String,
    /// Schema revision of the serialized form, if any.
    pub revision: Option<String>,
    /// The serialized data.
    pub data: PayloadData,
}

/// Converts domain payloads to and from their stored form.
pub trait EventSerializer: Send + Sync {
    /// Serializes `payload` into the requested stored representation.
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError::Serialization`] if the payload cannot
    /// be encoded.
    fn serialize(
        &self,
        type_name: &str,
        payload: &serde_json::Value,
        kind: PayloadDataKind,
    ) -> Result<SerializedPayload, EventStoreError>;

    /// Deserializes a stored payload back into memory form.
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError::Serialization`] if the data cannot be
    /// decoded.
    fn deserialize(&self, payload: &SerializedPayload) -> Result<serde_json::Value, EventStoreError>;
}

/// Default serializer: payloads are stored as canonical JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl EventSerializer for JsonSerializer {
    fn serialize(
        &self,
        type_name: &str,
        payload: &serde_json::Value,
        kind: PayloadDataKind,
    ) -> Result<SerializedPayload, EventStoreError> {
        let data = match kind {
            PayloadDataKind::Bytes => PayloadData::Bytes(serde_json::to_vec(payload)?),
            PayloadDataKind::Json => PayloadData::Json(payload.clone()),
        };
        Ok(SerializedPayload {
            type_name: type_name.to_owned(),
            revision: None,
            data,
        })
    }

    fn deserialize(&self, payload: &SerializedPayload) -> Result<serde_json::Value, EventStoreError> {
        match &payload.data {
            PayloadData::Bytes(bytes) => Ok(serde_json::from_slice(bytes)?),
            PayloadData::Json(value) => Ok(value.clone()),
        }
    }
}

/// Rewrites a stored payload of an older revision into a newer one.
///
/// Upcasters run in chain order on read, before deserialization. The
/// policy deciding which revisions to rewrite lives with the caller.
pub trait Upcaster: Send + Sync {
    /// Returns the upcast payload, or the input unchanged when this
    /// upcaster does not apply.
    fn upcast(&self, payload: SerializedPayload) -> SerializedPayload;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_serializer_bytes_round_trip() {
        let payload = serde_json::json!({"name": "opened", "count": 3});
        let serialized = JsonSerializer
            .serialize("inventory.opened", &payload, PayloadDataKind::Bytes)
            .unwrap();
        assert_eq!(serialized.type_name, "inventory.opened");
        assert_eq!(serialized.revision, None);
        assert!(matches!(serialized.data, PayloadData::Bytes(_)));

        let restored = JsonSerializer.deserialize(&serialized).unwrap();
        assert_eq!(restored, payload);
    }

    #[test]
    fn test_json_serializer_native_json_round_trip() {
        let payload = serde_json::json!([1, null, "x"]);
        let serialized = JsonSerializer
            .serialize("batch", &payload, PayloadDataKind::Json)
            .unwrap();
        assert_eq!(serialized.data, PayloadData::Json(payload.clone()));
        assert_eq!(JsonSerializer.deserialize(&serialized).unwrap(), payload);
    }

    #[test]
    fn test_deserialize_rejects_malformed_bytes() {
        let serialized = SerializedPayload {
            type_name: "broken".to_owned(),
            revision: None,
            data: PayloadData::Bytes(b"{not json".to_vec()),
        };
        assert!(matches!(
            JsonSerializer.deserialize(&serialized),
            Err(EventStoreError::Serialization(_))
        ));
    }
}
