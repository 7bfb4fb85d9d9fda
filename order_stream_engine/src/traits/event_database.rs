use thiserror::Error;
use uuid::Uuid;

use crate::db_types::{EventDetail, EventQueryFilter, OrderEvent, OrderStatus};

#[derive(Debug, Error)]
pub enum EventDatabaseError {
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for EventDatabaseError {
    fn from(e: sqlx::Error) -> Self {
        Self::DatabaseError(e.to_string())
    }
}

/// The capability contract for event storage backends.
///
/// The engine owns all decision making; a backend only stores, joins against the status
/// dictionary, and retrieves. Backends must be cheaply cloneable (a pool handle or an `Arc`).
#[allow(async_fn_in_trait)]
pub trait EventDatabase: Clone {
    /// Fetches the event with the given event id, if it has been stored.
    async fn fetch_event_by_id(&self, event_id: &Uuid) -> Result<Option<OrderEvent>, EventDatabaseError>;

    /// Fetches the most recent event for the order, by maximum `updated_at`.
    async fn fetch_last_event_for_order(&self, order_id: &Uuid) -> Result<Option<EventDetail>, EventDatabaseError>;

    /// Appends an event to the log. The event id must be unique across the store.
    async fn insert_event(&self, event: &OrderEvent) -> Result<(), EventDatabaseError>;

    /// Fetches the complete event history for the order, ascending by `updated_at`.
    async fn fetch_events_for_order(&self, order_id: &Uuid) -> Result<Vec<EventDetail>, EventDatabaseError>;

    /// Resolves a status name against the dictionary.
    async fn fetch_status_by_name(&self, name: &str) -> Result<Option<OrderStatus>, EventDatabaseError>;

    /// Fetches events matching the given filter, sorted and paginated as it specifies.
    async fn search_events(&self, filter: &EventQueryFilter) -> Result<Vec<EventDetail>, EventDatabaseError>;
}
