//! Order Stream Engine
//!
//! The engine holds everything below the HTTP layer of the order event stream service: the event
//! log, the order status dictionary, and the admission rules that decide whether an incoming
//! webhook event may join an order's history.
//!
//! The library is divided into two main sections:
//! 1. Storage. Backends implement the [`traits::EventDatabase`] capability contract. A Postgres
//!    implementation is provided for production use, and an in-memory implementation backs the
//!    test suites. You should never need to touch a backend directly; go through the public APIs.
//!    The exception is the data types shared with the database. These live in [`db_types`] and are
//!    public.
//! 2. Event flow. [`EventFlowApi`] performs admission (idempotence, predecessor lookup, the
//!    finality gate) and serves per-order history; [`OrderQueryApi`] answers filtered event
//!    queries.
mod api;
pub mod db_types;
pub mod memory;
pub mod traits;

#[cfg(feature = "postgres")]
mod postgres;

pub use api::{EventFlowApi, EventFlowError, OrderQueryApi};
pub use memory::MemoryDatabase;
pub use traits::{EventDatabase, EventDatabaseError};

#[cfg(feature = "postgres")]
pub use postgres::PostgresDatabase;
