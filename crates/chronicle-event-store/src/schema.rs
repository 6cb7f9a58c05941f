//! Event store database schema descriptor.

use chronicle_core::serialization::PayloadDataKind;

/// Table and column names used by the storage engine.
///
/// Every query is built from this descriptor, so deployments with
/// existing naming conventions can point the engine at their tables.
#[derive(Debug, Clone)]
pub struct EventSchema {
    domain_event_table: String,
    snapshot_table: String,
    global_index_column: String,
    event_id_column: String,
    aggregate_id_column: String,
    sequence_number_column: String,
    aggregate_type_column: String,
    timestamp_column: String,
    payload_type_column: String,
    payload_revision_column: String,
    payload_column: String,
    metadata_column: String,
}

impl Default for EventSchema {
    fn default() -> Self {
        Self {
            domain_event_table: "domain_event_entry".to_owned(),
            snapshot_table: "snapshot_event_entry".to_owned(),
            global_index_column: "global_index".to_owned(),
            event_id_column: "event_id".to_owned(),
            aggregate_id_column: "aggregate_id".to_owned(),
            sequence_number_column: "sequence_number".to_owned(),
            aggregate_type_column: "type".to_owned(),
            timestamp_column: "timestamp".to_owned(),
            payload_type_column: "payload_type".to_owned(),
            payload_revision_column: "payload_revision".to_owned(),
            payload_column: "payload".to_owned(),
            metadata_column: "metadata".to_owned(),
        }
    }
}

impl EventSchema {
    /// The domain event table name.
    #[must_use]
    pub fn domain_event_table(&self) -> &str {
        &self.domain_event_table
    }

    /// The snapshot table name.
    #[must_use]
    pub fn snapshot_table(&self) -> &str {
        &self.snapshot_table
    }

    /// The global index column name.
    #[must_use]
    pub fn global_index_column(&self) -> &str {
        &self.global_index_column
    }

    /// The event identifier column name.
    #[must_use]
    pub fn event_id_column(&self) -> &str {
        &self.event_id_column
    }

    /// The aggregate identifier column name.
    #[must_use]
    pub fn aggregate_id_column(&self) -> &str {
        &self.aggregate_id_column
    }

    /// The sequence number column name.
    #[must_use]
    pub fn sequence_number_column(&self) -> &str {
        &self.sequence_number_column
    }

    /// The aggregate type column name.
    #[must_use]
    pub fn aggregate_type_column(&self) -> &str {
        &self.aggregate_type_column
    }

    /// The timestamp column name.
    #[must_use]
    pub fn timestamp_column(&self) -> &str {
        &self.timestamp_column
    }

    /// The payload type column name.
    #[must_use]
    pub fn payload_type_column(&self) -> &str {
        &self.payload_type_column
    }

    /// The payload revision column name.
    #[must_use]
    pub fn payload_revision_column(&self) -> &str {
        &self.payload_revision_column
    }

    /// The payload column name.
    #[must_use]
    pub fn payload_column(&self) -> &str {
        &self.payload_column
    }

    /// The metadata column name.
    #[must_use]
    pub fn metadata_column(&self) -> &str {
        &self.metadata_column
    }

    /// Replaces the table names, keeping default column names.
    #[must_use]
    pub fn with_tables(
        mut self,
        domain_event_table: impl Into<String>,
        snapshot_table: impl Into<String>,
    ) -> Self {
        self.domain_event_table = domain_event_table.into();
        self.snapshot_table = snapshot_table.into();
        self
    }

    /// The comma-separated columns of a domain event row, without the
    /// global index.
    pub(crate) fn domain_event_fields(&self) -> String {
        [
            &self.event_id_column,
            &self.aggregate_id_column,
            &self.sequence_number_column,
            &self.aggregate_type_column,
            &self.timestamp_column,
            &self.payload_type_column,
            &self.payload_revision_column,
            &self.payload_column,
            &self.metadata_column,
        ]
        .map(String::as_str)
        .join(", ")
    }

    /// The comma-separated columns of a tracked event row: the global
    /// index followed by the domain event columns.
    pub(crate) fn tracked_event_fields(&self) -> String {
        format!("{}, {}", self.global_index_column, self.domain_event_fields())
    }

    /// DDL creating the domain event table.
    #[must_use]
    pub fn create_domain_event_table_sql(&self, payload_kind: PayloadDataKind) -> String {
        let blob = payload_column_type(payload_kind);
        format!(
            "CREATE TABLE IF NOT EXISTS {table} (\n    \
             {global_index}     BIGSERIAL PRIMARY KEY,\n    \
             {event_id}         UUID NOT NULL UNIQUE,\n    \
             {aggregate_id}     UUID NOT NULL,\n    \
             {sequence_number}  BIGINT NOT NULL,\n    \
             {aggregate_type}   VARCHAR(255) NOT NULL,\n    \
             {timestamp}        TEXT NOT NULL,\n    \
             {payload_type}     VARCHAR(255) NOT NULL,\n    \
             {payload_revision} VARCHAR(255),\n    \
             {payload}          {blob} NOT NULL,\n    \
             {metadata}         {blob} NOT NULL,\n    \
             UNIQUE ({aggregate_id}, {sequence_number})\n)",
            table = self.domain_event_table,
            global_index = self.global_index_column,
            event_id = self.event_id_column,
            aggregate_id = self.aggregate_id_column,
            sequence_number = self.sequence_number_column,
            aggregate_type = self.aggregate_type_column,
            timestamp = self.timestamp_column,
            payload_type = self.payload_type_column,
            payload_revision = self.payload_revision_column,
            payload = self.payload_column,
            metadata = self.metadata_column,
        )
    }

    /// DDL creating the snapshot table.
    #[must_use]
    pub fn create_snapshot_table_sql(&self, payload_kind: PayloadDataKind) -> String {
        let blob = payload_column_type(payload_kind);
        format!(
            "CREATE TABLE IF NOT EXISTS {table} (\n    \
             {global_index}     BIGSERIAL,\n    \
             {event_id}         UUID NOT NULL UNIQUE,\n    \
             {aggregate_id}     UUID NOT NULL,\n    \
             {sequence_number}  BIGINT NOT NULL,\n    \
             {aggregate_type}   VARCHAR(255) NOT NULL,\n    \
             {timestamp}        TEXT NOT NULL,\n    \
             {payload_type}     VARCHAR(255) NOT NULL,\n    \
             {payload_revision} VARCHAR(255),\n    \
             {payload}          {blob} NOT NULL,\n    \
             {metadata}         {blob} NOT NULL,\n    \
             PRIMARY KEY ({aggregate_id}, {sequence_number})\n)",
            table = self.snapshot_table,
            global_index = self.global_index_column,
            event_id = self.event_id_column,
            aggregate_id = self.aggregate_id_column,
            sequence_number = self.sequence_number_column,
            aggregate_type = self.aggregate_type_column,
            timestamp = self.timestamp_column,
            payload_type = self.payload_type_column,
            payload_revision = self.payload_revision_column,
            payload = self.payload_column,
            metadata = self.metadata_column,
        )
    }
}

fn payload_column_type(kind: PayloadDataKind) -> &'static str {
    match kind {
        PayloadDataKind::Bytes => "BYTEA",
        PayloadDataKind::Json => "JSONB",
    }
}
