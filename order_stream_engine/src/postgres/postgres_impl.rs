use log::*;
use sqlx::{postgres::PgPoolOptions, PgPool};
use uuid::Uuid;

use crate::{
    db_types::{EventDetail, EventQueryFilter, OrderEvent, OrderStatus},
    postgres::db,
    traits::{EventDatabase, EventDatabaseError},
};

#[derive(Clone)]
pub struct PostgresDatabase {
    url: String,
    pool: PgPool,
}

impl PostgresDatabase {
    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, EventDatabaseError> {
        let pool = PgPoolOptions::new().max_connections(max_connections).connect(url).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the schema if it does not exist yet and seeds the status dictionary. Idempotent;
    /// runs at every startup.
    pub async fn create_schema(&self) -> Result<(), EventDatabaseError> {
        db::schema::create_schema(&self.pool).await?;
        info!("🗃️ Database schema is up to date");
        Ok(())
    }
}

impl EventDatabase for PostgresDatabase {
    async fn fetch_event_by_id(&self, event_id: &Uuid) -> Result<Option<OrderEvent>, EventDatabaseError> {
        Ok(db::events::fetch_event_by_id(event_id, &self.pool).await?)
    }

    async fn fetch_last_event_for_order(&self, order_id: &Uuid) -> Result<Option<EventDetail>, EventDatabaseError> {
        Ok(db::events::fetch_last_event_for_order(order_id, &self.pool).await?)
    }

    async fn insert_event(&self, event: &OrderEvent) -> Result<(), EventDatabaseError> {
        db::events::insert_event(event, &self.pool).await?;
        trace!("🗃️ Event {} stored", event.event_id);
        Ok(())
    }

    async fn fetch_events_for_order(&self, order_id: &Uuid) -> Result<Vec<EventDetail>, EventDatabaseError> {
        Ok(db::events::fetch_events_for_order(order_id, &self.pool).await?)
    }

    async fn fetch_status_by_name(&self, name: &str) -> Result<Option<OrderStatus>, EventDatabaseError> {
        Ok(db::statuses::fetch_status_by_name(name, &self.pool).await?)
    }

    async fn search_events(&self, filter: &EventQueryFilter) -> Result<Vec<EventDetail>, EventDatabaseError> {
        Ok(db::events::search_events(filter, &self.pool).await?)
    }
}
