use thiserror::Error;
use uuid::Uuid;

use crate::traits::EventDatabaseError;

#[derive(Debug, Error)]
pub enum EventFlowError {
    #[error("Event {0} has already been processed")]
    DuplicateEvent(Uuid),
    #[error("Order {0} is already in a final status")]
    OrderAlreadyFinal(Uuid),
    #[error("Unknown order status: {0}")]
    UnknownStatus(String),
    #[error("Database error: {0}")]
    DatabaseError(#[from] EventDatabaseError),
}
