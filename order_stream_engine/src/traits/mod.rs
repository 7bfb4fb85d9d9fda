//! Storage capability contract.
//!
//! This module defines the behaviour an event storage backend needs to expose in order to back the
//! engine. Everything the service ever asks of storage fits into the single [`EventDatabase`]
//! trait: point lookups for idempotence and predecessor checks, the append, ordered per-order
//! history, status dictionary resolution, and the filtered search behind the orders query.
//!
//! Two implementations ship with the engine: `PostgresDatabase` for production and
//! `MemoryDatabase` for tests.
mod event_database;

pub use event_database::{EventDatabase, EventDatabaseError};
