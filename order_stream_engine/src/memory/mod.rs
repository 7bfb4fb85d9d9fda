//! In-memory storage backend.
//!
//! Backs the unit and endpoint test suites. Events live in a `Vec` behind a mutex; the status
//! dictionary is the static [`OrderStatusType`] table, so no seeding is required.
use std::sync::{Arc, Mutex, MutexGuard};

use uuid::Uuid;

use crate::{
    db_types::{EventDetail, EventQueryFilter, OrderEvent, OrderStatus, OrderStatusType, SortDirection, SortField},
    traits::{EventDatabase, EventDatabaseError},
};

#[derive(Clone, Default)]
pub struct MemoryDatabase {
    events: Arc<Mutex<Vec<OrderEvent>>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<OrderEvent>>, EventDatabaseError> {
        self.events.lock().map_err(|e| EventDatabaseError::DatabaseError(format!("poisoned lock: {e}")))
    }

    fn detail(event: &OrderEvent) -> Result<EventDetail, EventDatabaseError> {
        let status = OrderStatusType::from_id(event.order_status_id).ok_or_else(|| {
            EventDatabaseError::DatabaseError(format!("no dictionary entry for status id {}", event.order_status_id))
        })?;
        Ok(EventDetail {
            event_id: event.event_id,
            order_id: event.order_id,
            user_id: event.user_id,
            order_status_id: event.order_status_id,
            created_at: event.created_at,
            updated_at: event.updated_at,
            order_status_name: status.as_str().to_string(),
            is_final: status.is_final(),
        })
    }
}

impl EventDatabase for MemoryDatabase {
    async fn fetch_event_by_id(&self, event_id: &Uuid) -> Result<Option<OrderEvent>, EventDatabaseError> {
        let events = self.lock()?;
        Ok(events.iter().find(|e| e.event_id == *event_id).cloned())
    }

    async fn fetch_last_event_for_order(&self, order_id: &Uuid) -> Result<Option<EventDetail>, EventDatabaseError> {
        let events = self.lock()?;
        events
            .iter()
            .filter(|e| e.order_id == *order_id)
            .max_by_key(|e| e.updated_at)
            .map(Self::detail)
            .transpose()
    }

    async fn insert_event(&self, event: &OrderEvent) -> Result<(), EventDatabaseError> {
        let mut events = self.lock()?;
        if events.iter().any(|e| e.event_id == event.event_id) {
            return Err(EventDatabaseError::DatabaseError(format!(
                "duplicate key: event {} already stored",
                event.event_id
            )));
        }
        events.push(event.clone());
        Ok(())
    }

    async fn fetch_events_for_order(&self, order_id: &Uuid) -> Result<Vec<EventDetail>, EventDatabaseError> {
        let events = self.lock()?;
        let mut history = events
            .iter()
            .filter(|e| e.order_id == *order_id)
            .map(Self::detail)
            .collect::<Result<Vec<_>, _>>()?;
        history.sort_by_key(|e| e.updated_at);
        Ok(history)
    }

    async fn fetch_status_by_name(&self, name: &str) -> Result<Option<OrderStatus>, EventDatabaseError> {
        Ok(name.parse::<OrderStatusType>().ok().map(|s| s.as_order_status()))
    }

    async fn search_events(&self, filter: &EventQueryFilter) -> Result<Vec<EventDetail>, EventDatabaseError> {
        let events = self.lock()?;
        let mut matches = events
            .iter()
            .map(Self::detail)
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .filter(|e| filter.statuses.is_empty() || filter.statuses.contains(&e.order_status_name))
            .filter(|e| filter.is_final.map_or(true, |f| e.is_final == f))
            .filter(|e| filter.user_id.map_or(true, |u| e.user_id == u))
            .collect::<Vec<_>>();
        matches.sort_by(|a, b| {
            let ordering = match filter.sort_by {
                SortField::CreatedAt => a.created_at.cmp(&b.created_at),
                SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            };
            match filter.sort_order {
                SortDirection::Ascending => ordering,
                SortDirection::Descending => ordering.reverse(),
            }
        });
        let offset = usize::try_from(filter.offset).unwrap_or(0);
        let limit = usize::try_from(filter.limit).unwrap_or(0);
        Ok(matches.into_iter().skip(offset).take(limit).collect())
    }
}
