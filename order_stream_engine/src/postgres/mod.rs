//! Postgres storage backend, built on an `sqlx` connection pool.
mod db;
mod postgres_impl;

pub use postgres_impl::PostgresDatabase;
