//! Chronicle Event Store — PostgreSQL-backed event storage engine.
//!
//! Persists immutable domain events and aggregate snapshots and serves
//! two read paths: per-aggregate streams for reconstruction, and the
//! gap-aware global stream for projectors. The engine is assembled from
//! a batching layer over a storage backend; see
//! [`engine::BatchingEventStore`] and [`pg_event_store::PostgresBackend`].

pub mod backend;
pub mod config;
pub mod engine;
pub mod pg_event_store;
pub mod resolver;
pub mod schema;
mod timestamp;
mod tracking;
