use std::fmt::Debug;

use log::*;

use crate::{
    api::EventFlowError,
    db_types::{EventPayload, EventQueryFilter},
    traits::EventDatabase,
};

/// Read-side API for the orders query endpoint. A thin pass-through over the store's filtered
/// search, returning results in wire form.
#[derive(Clone)]
pub struct OrderQueryApi<B> {
    db: B,
}

impl<B> Debug for OrderQueryApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderQueryApi")
    }
}

impl<B> OrderQueryApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> OrderQueryApi<B>
where B: EventDatabase
{
    pub async fn search_orders(&self, filter: &EventQueryFilter) -> Result<Vec<EventPayload>, EventFlowError> {
        let events = self.db.search_events(filter).await?;
        trace!("🔍️ Order search returned {} events", events.len());
        Ok(events.iter().map(EventPayload::from).collect())
    }
}
