pub mod events;
pub mod schema;
pub mod statuses;
