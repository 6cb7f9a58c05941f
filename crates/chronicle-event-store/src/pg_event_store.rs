//! PostgreSQL storage backend.

use std::sync::Arc;

use async_trait::async_trait;
use chronicle_core::clock::{Clock, SystemClock};
use chronicle_core::error::EventStoreError;
use chronicle_core::message::EventMessage;
use chronicle_core::record::{DomainEventRecord, TrackedEventRecord};
use chronicle_core::serialization::{
    EventSerializer, JsonSerializer, PayloadData, PayloadDataKind, SerializedPayload, Upcaster,
};
use chronicle_core::token::GapAwareTrackingToken;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

use crate::backend::StorageBackend;
use crate::config::EventStoreConfig;
use crate::engine::BatchingEventStore;
use crate::resolver::{PersistenceErrorResolver, UniqueViolationResolver};
use crate::schema::EventSchema;
use crate::timestamp::{format_timestamp, parse_timestamp};
use crate::tracking::{Advancement, advance_token};

/// The fully assembled PostgreSQL event store.
pub type PostgresEventStore = BatchingEventStore<PostgresBackend>;

impl BatchingEventStore<PostgresBackend> {
    /// Starts building a PostgreSQL event store on `pool` with default
    /// schema, configuration, JSON serialization, system clock, and
    /// unique-violation error classification.
    #[must_use]
    pub fn builder(pool: PgPool) -> PostgresEventStoreBuilder {
        PostgresEventStoreBuilder::new(pool)
    }

    /// Creates the event and snapshot tables if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError::Storage`] when a DDL statement fails.
    pub async fn create_schema(&self) -> Result<(), EventStoreError> {
        self.backend().create_schema().await
    }

    /// The engine configuration, including the live-tunable gap knobs.
    #[must_use]
    pub fn config(&self) -> &EventStoreConfig {
        self.backend().config()
    }
}

/// Builder for [`PostgresEventStore`].
pub struct PostgresEventStoreBuilder {
    pool: PgPool,
    schema: EventSchema,
    config: EventStoreConfig,
    serializer: Arc<dyn EventSerializer>,
    upcasters: Vec<Arc<dyn Upcaster>>,
    clock: Arc<dyn Clock>,
    resolver: Arc<dyn PersistenceErrorResolver>,
}

impl PostgresEventStoreBuilder {
    fn new(pool: PgPool) -> Self {
        Self {
            pool,
            schema: EventSchema::default(),
            config: EventStoreConfig::default(),
            serializer: Arc::new(JsonSerializer),
            upcasters: Vec::new(),
            clock: Arc::new(SystemClock),
            resolver: Arc::new(UniqueViolationResolver),
        }
    }

    /// Replaces the table and column names.
    #[must_use]
    pub fn schema(mut self, schema: EventSchema) -> Self {
        self.schema = schema;
        self
    }

    /// Replaces the engine configuration.
    #[must_use]
    pub fn config(mut self, config: EventStoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the serialization bridge.
    #[must_use]
    pub fn serializer(mut self, serializer: Arc<dyn EventSerializer>) -> Self {
        self.serializer = serializer;
        self
    }

    /// Appends an upcaster to the chain applied on read.
    #[must_use]
    pub fn upcaster(mut self, upcaster: Arc<dyn Upcaster>) -> Self {
        self.upcasters.push(upcaster);
        self
    }

    /// Replaces the clock consulted by the tracked reader.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the duplicate-key classifier.
    #[must_use]
    pub fn resolver(mut self, resolver: Arc<dyn PersistenceErrorResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Assembles the store.
    #[must_use]
    pub fn build(self) -> PostgresEventStore {
        let config = Arc::new(self.config);
        let batch_size = config.batch_size();
        let backend = PostgresBackend {
            pool: self.pool,
            schema: self.schema,
            config,
            clock: self.clock,
            resolver: self.resolver,
        };
        BatchingEventStore::new(backend, batch_size, self.serializer, self.upcasters)
    }
}

/// PostgreSQL implementation of the storage hooks.
pub struct PostgresBackend {
    pool: PgPool,
    schema: EventSchema,
    config: Arc<EventStoreConfig>,
    clock: Arc<dyn Clock>,
    resolver: Arc<dyn PersistenceErrorResolver>,
}

impl PostgresBackend {
    /// The engine configuration.
    #[must_use]
    pub fn config(&self) -> &EventStoreConfig {
        &self.config
    }

    /// Creates the event and snapshot tables if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError::Storage`] when a DDL statement fails.
    pub async fn create_schema(&self) -> Result<(), EventStoreError> {
        let kind = self.config.payload_data_kind();
        sqlx::query(&self.schema.create_domain_event_table_sql(kind))
            .execute(&self.pool)
            .await
            .map_err(|e| EventStoreError::storage("failed to create domain event table", e))?;
        sqlx::query(&self.schema.create_snapshot_table_sql(kind))
            .execute(&self.pool)
            .await
            .map_err(|e| EventStoreError::storage("failed to create snapshot table", e))?;
        Ok(())
    }

    /// Rewrites gaps of an oversized token before a tracked read.
    ///
    /// Walks the rows between the lowest and highest gap. Every stored
    /// row older than the gap timeout proves that the gaps immediately
    /// below it will never fill; those are dropped. The walk stops at
    /// the first row that fills a gap (the main read should deliver it)
    /// or is recent enough that its predecessors may still commit.
    async fn clean_gaps(
        &self,
        token: GapAwareTrackingToken,
    ) -> Result<GapAwareTrackingToken, EventStoreError> {
        let gaps = token.gaps().clone();
        let (Some(&lowest), Some(&highest)) = (gaps.iter().next(), gaps.iter().next_back())
        else {
            return Ok(token);
        };

        let sql = format!(
            "SELECT {global_index}, {timestamp} FROM {table} \
             WHERE {global_index} BETWEEN $1 AND $2 ORDER BY {global_index} ASC",
            global_index = self.schema.global_index_column(),
            timestamp = self.schema.timestamp_column(),
            table = self.schema.domain_event_table(),
        );
        let mut tx = self.begin().await?;
        let rows = sqlx::query(&sql)
            .bind(lowest)
            .bind(highest.saturating_add(1))
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| EventStoreError::storage("failed to scan gaps for cleanup", e))?;
        self.commit(tx).await?;

        let now = self.clock.now();
        let gap_timeout = self.config.gap_timeout();
        let mut cleaned = token;
        for row in &rows {
            let global_index: i64 = column(row, self.schema.global_index_column())?;
            let timestamp_text: String = column(row, self.schema.timestamp_column())?;
            let Ok(timestamp) = parse_timestamp(&timestamp_text) else {
                tracing::info!(
                    global_index,
                    "unparseable event timestamp, aborting gap cleanup; the token keeps its gaps"
                );
                break;
            };
            if gaps.contains(&global_index) || timestamp > now - gap_timeout {
                // A filled gap belongs to the main read; a recent row
                // may still have committing predecessors.
                break;
            }
            if gaps.contains(&(global_index - 1)) {
                cleaned = cleaned.advance_to(global_index - 1, self.config.max_gap_offset(), false);
            }
        }
        Ok(cleaned)
    }

    async fn begin(&self) -> Result<sqlx::Transaction<'_, Postgres>, EventStoreError> {
        self.pool
            .begin()
            .await
            .map_err(|e| EventStoreError::storage("failed to begin transaction", e))
    }

    async fn commit(&self, tx: sqlx::Transaction<'_, Postgres>) -> Result<(), EventStoreError> {
        tx.commit()
            .await
            .map_err(|e| EventStoreError::storage("failed to commit transaction", e))
    }

    fn decode_domain_event(&self, row: &PgRow) -> Result<DomainEventRecord, EventStoreError> {
        let timestamp_text: String = column(row, self.schema.timestamp_column())?;
        let timestamp = parse_timestamp(&timestamp_text).map_err(|e| {
            EventStoreError::storage(
                format!("failed to parse stored timestamp '{timestamp_text}'"),
                e,
            )
        })?;
        Ok(DomainEventRecord {
            event_id: column(row, self.schema.event_id_column())?,
            aggregate_id: column(row, self.schema.aggregate_id_column())?,
            aggregate_type: column(row, self.schema.aggregate_type_column())?,
            sequence_number: column(row, self.schema.sequence_number_column())?,
            timestamp,
            payload_type: column(row, self.schema.payload_type_column())?,
            payload_revision: column(row, self.schema.payload_revision_column())?,
            payload: self.read_payload(row, self.schema.payload_column())?,
            metadata: self.read_payload(row, self.schema.metadata_column())?,
        })
    }

    fn read_payload(&self, row: &PgRow, name: &str) -> Result<PayloadData, EventStoreError> {
        match self.config.payload_data_kind() {
            PayloadDataKind::Bytes => column::<Vec<u8>>(row, name).map(PayloadData::Bytes),
            PayloadDataKind::Json => {
                column::<serde_json::Value>(row, name).map(PayloadData::Json)
            }
        }
    }

    fn serialize_blobs(
        &self,
        event: &EventMessage,
        serializer: &dyn EventSerializer,
    ) -> Result<(SerializedPayload, SerializedPayload), EventStoreError> {
        let kind = self.config.payload_data_kind();
        let payload = serializer.serialize(&event.payload_type, &event.payload, kind)?;
        let metadata = serializer.serialize(&event.payload_type, &event.metadata, kind)?;
        Ok((payload, metadata))
    }
}

#[async_trait]
impl StorageBackend for PostgresBackend {
    async fn append_events(
        &self,
        events: &[EventMessage],
        serializer: &dyn EventSerializer,
    ) -> Result<(), EventStoreError> {
        let Some(first) = events.first() else {
            return Ok(());
        };

        let mut rows = Vec::with_capacity(events.len());
        for event in events {
            let (payload, metadata) = self.serialize_blobs(event, serializer)?;
            rows.push((event, payload, metadata));
        }

        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "INSERT INTO {} ({}, {}, {}, {}, {}, {}, {}, {}, {}) ",
            self.schema.domain_event_table(),
            self.schema.event_id_column(),
            self.schema.aggregate_id_column(),
            self.schema.sequence_number_column(),
            self.schema.aggregate_type_column(),
            self.schema.timestamp_column(),
            self.schema.payload_type_column(),
            self.schema.payload_revision_column(),
            self.schema.payload_column(),
            self.schema.metadata_column(),
        ));
        builder.push_values(rows, |mut b, (event, payload, metadata)| {
            b.push_bind(event.event_id)
                .push_bind(event.aggregate_id)
                .push_bind(event.sequence_number)
                .push_bind(event.aggregate_type.clone())
                .push_bind(format_timestamp(event.timestamp))
                .push_bind(payload.type_name)
                .push_bind(payload.revision);
            push_payload(&mut b, payload.data);
            push_payload(&mut b, metadata.data);
        });

        let mut tx = self.begin().await?;
        if let Err(error) = builder.build().execute(&mut *tx).await {
            // Dropping the transaction rolls the batch back.
            if self.resolver.is_duplicate_key(&error) {
                return Err(EventStoreError::Concurrency {
                    aggregate_id: first.aggregate_id,
                    sequence_number: first.sequence_number,
                });
            }
            return Err(EventStoreError::storage("failed to append events", error));
        }
        self.commit(tx).await
    }

    async fn store_snapshot(
        &self,
        snapshot: &EventMessage,
        serializer: &dyn EventSerializer,
    ) -> Result<(), EventStoreError> {
        let (payload, metadata) = self.serialize_blobs(snapshot, serializer)?;

        let insert_sql = format!(
            "INSERT INTO {} ({}, {}, {}, {}, {}, {}, {}, {}, {}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            self.schema.snapshot_table(),
            self.schema.event_id_column(),
            self.schema.aggregate_id_column(),
            self.schema.sequence_number_column(),
            self.schema.aggregate_type_column(),
            self.schema.timestamp_column(),
            self.schema.payload_type_column(),
            self.schema.payload_revision_column(),
            self.schema.payload_column(),
            self.schema.metadata_column(),
        );

        let mut tx = self.begin().await?;
        let insert = sqlx::query(&insert_sql)
            .bind(snapshot.event_id)
            .bind(snapshot.aggregate_id)
            .bind(snapshot.sequence_number)
            .bind(&snapshot.aggregate_type)
            .bind(format_timestamp(snapshot.timestamp))
            .bind(payload.type_name)
            .bind(payload.revision);
        let insert = bind_payload(bind_payload(insert, payload.data), metadata.data);
        match insert.execute(&mut *tx).await {
            Ok(_) => {}
            Err(error) if self.resolver.is_duplicate_key(&error) => {
                // A concurrent writer stored an equal snapshot already;
                // snapshots are advisory, so accept silently.
                return Ok(());
            }
            Err(error) => {
                return Err(EventStoreError::storage("failed to store snapshot", error));
            }
        }

        // Prune after the insert so a concurrent reader never observes
        // the aggregate without any snapshot at all.
        let delete_sql = format!(
            "DELETE FROM {} WHERE {} = $1 AND {} < $2",
            self.schema.snapshot_table(),
            self.schema.aggregate_id_column(),
            self.schema.sequence_number_column(),
        );
        sqlx::query(&delete_sql)
            .bind(snapshot.aggregate_id)
            .bind(snapshot.sequence_number)
            .execute(&mut *tx)
            .await
            .map_err(|e| EventStoreError::storage("failed to prune older snapshots", e))?;
        self.commit(tx).await
    }

    async fn fetch_domain_events(
        &self,
        aggregate_id: Uuid,
        first_sequence_number: i64,
        batch_size: usize,
    ) -> Result<Vec<DomainEventRecord>, EventStoreError> {
        let sql = format!(
            "SELECT {fields} FROM {table} \
             WHERE {aggregate} = $1 AND {sequence} >= $2 AND {sequence} < $3 \
             ORDER BY {sequence} ASC",
            fields = self.schema.domain_event_fields(),
            table = self.schema.domain_event_table(),
            aggregate = self.schema.aggregate_id_column(),
            sequence = self.schema.sequence_number_column(),
        );

        let mut tx = self.begin().await?;
        let rows = sqlx::query(&sql)
            .bind(aggregate_id)
            .bind(first_sequence_number)
            .bind(first_sequence_number.saturating_add(to_i64(batch_size)))
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| {
                EventStoreError::storage(
                    format!("failed to read events for aggregate {aggregate_id}"),
                    e,
                )
            })?;
        self.commit(tx).await?;

        rows.iter().map(|row| self.decode_domain_event(row)).collect()
    }

    async fn fetch_snapshot(
        &self,
        aggregate_id: Uuid,
    ) -> Result<Option<DomainEventRecord>, EventStoreError> {
        let sql = format!(
            "SELECT {fields} FROM {table} WHERE {aggregate} = $1 \
             ORDER BY {sequence} DESC LIMIT 1",
            fields = self.schema.domain_event_fields(),
            table = self.schema.snapshot_table(),
            aggregate = self.schema.aggregate_id_column(),
            sequence = self.schema.sequence_number_column(),
        );

        let mut tx = self.begin().await?;
        let row = sqlx::query(&sql)
            .bind(aggregate_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| {
                EventStoreError::storage(
                    format!("failed to read snapshot for aggregate {aggregate_id}"),
                    e,
                )
            })?;
        self.commit(tx).await?;

        row.as_ref().map(|r| self.decode_domain_event(r)).transpose()
    }

    async fn fetch_tracked_events(
        &self,
        last_token: Option<GapAwareTrackingToken>,
        batch_size: usize,
    ) -> Result<Vec<TrackedEventRecord>, EventStoreError> {
        // A token dragging many gaps makes the read query expensive;
        // try to shed abandoned ones first.
        let token = match last_token {
            Some(token) if token.gaps().len() > self.config.gap_cleaning_threshold() => {
                Some(self.clean_gaps(token).await?)
            }
            other => other,
        };

        let gaps: Vec<i64> = token
            .as_ref()
            .map(|t| t.gaps().iter().copied().collect())
            .unwrap_or_default();
        let index = token.as_ref().map_or(-1, GapAwareTrackingToken::index);

        let mut sql = format!(
            "SELECT {fields} FROM {table} \
             WHERE ({global_index} > $1 AND {global_index} <= $2)",
            fields = self.schema.tracked_event_fields(),
            table = self.schema.domain_event_table(),
            global_index = self.schema.global_index_column(),
        );
        if !gaps.is_empty() {
            sql.push_str(&format!(
                " OR {global_index} = ANY($3)",
                global_index = self.schema.global_index_column(),
            ));
        }
        sql.push_str(&format!(
            " ORDER BY {global_index} ASC",
            global_index = self.schema.global_index_column(),
        ));

        let mut query = sqlx::query(&sql)
            .bind(index)
            .bind(index.saturating_add(to_i64(batch_size)));
        if !gaps.is_empty() {
            query = query.bind(gaps);
        }

        let mut tx = self.begin().await?;
        let rows = query.fetch_all(&mut *tx).await.map_err(|e| {
            EventStoreError::storage(format!("failed to read events after index {index}"), e)
        })?;
        self.commit(tx).await?;

        let now = self.clock.now();
        let gap_timeout = self.config.gap_timeout();
        let mut previous = token;
        let mut tracked = Vec::with_capacity(rows.len());
        for row in &rows {
            let global_index: i64 = column(row, self.schema.global_index_column())?;
            let record = self.decode_domain_event(row)?;
            let next = advance_token(
                previous.as_ref(),
                &Advancement {
                    global_index,
                    timestamp: record.timestamp,
                    now,
                    gap_timeout,
                    max_gap_offset: self.config.max_gap_offset(),
                    lowest_global_sequence: self.config.lowest_global_sequence(),
                },
            )?;
            tracked.push(TrackedEventRecord {
                token: next.clone(),
                record,
            });
            previous = Some(next);
        }
        Ok(tracked)
    }
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T, EventStoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name)
        .map_err(|e| EventStoreError::storage(format!("failed to decode column '{name}'"), e))
}

fn push_payload(
    separated: &mut sqlx::query_builder::Separated<'_, '_, Postgres, &'static str>,
    data: PayloadData,
) {
    match data {
        PayloadData::Bytes(bytes) => separated.push_bind(bytes),
        PayloadData::Json(value) => separated.push_bind(value),
    };
}

fn bind_payload<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    data: PayloadData,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match data {
        PayloadData::Bytes(bytes) => query.bind(bytes),
        PayloadData::Json(value) => query.bind(value),
    }
}

fn to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
