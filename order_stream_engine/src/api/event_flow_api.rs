use std::fmt::Debug;

use chrono::Duration;
use log::*;
use uuid::Uuid;

use crate::{
    api::EventFlowError,
    db_types::{EventDetail, EventPayload, IncomingEvent, OrderEvent, OrderStatus, OrderStatusType},
    traits::EventDatabase,
};

/// A `give_my_money_back` event may retract a `chinazes` for this long after the fact. Outside the
/// window the order is closed.
pub const REFUND_RETRACTION_WINDOW_SECS: i64 = 30;

/// `EventFlowApi` is the primary API for the webhook flow: admitting incoming order events into
/// the log and serving an order's history for stream replay.
#[derive(Clone)]
pub struct EventFlowApi<B> {
    db: B,
}

impl<B> Debug for EventFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EventFlowApi")
    }
}

impl<B> EventFlowApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> EventFlowApi<B>
where B: EventDatabase
{
    /// Admits a validated incoming event into the event log.
    ///
    /// Admission applies, in order: the idempotence check (duplicate event ids are rejected), the
    /// predecessor lookup, status resolution against the dictionary, and the per-order finality
    /// gate. The one legal transition out of a final status is the refund retraction:
    /// `chinazes → give_my_money_back` within [`REFUND_RETRACTION_WINDOW_SECS`] of the `chinazes`
    /// event.
    ///
    /// On success the persisted event, with its status id resolved, is returned.
    pub async fn add_event(&self, event: IncomingEvent, status_name: &str) -> Result<OrderEvent, EventFlowError> {
        if self.db.fetch_event_by_id(&event.event_id).await?.is_some() {
            return Err(EventFlowError::DuplicateEvent(event.event_id));
        }
        let predecessor = self.db.fetch_last_event_for_order(&event.order_id).await?;
        let status = self
            .db
            .fetch_status_by_name(status_name)
            .await?
            .ok_or_else(|| EventFlowError::UnknownStatus(status_name.to_string()))?;
        if let Some(last) = &predecessor {
            check_order_transition(&event, &status, last)?;
        }
        let record = event.with_status(status.id);
        self.db.insert_event(&record).await?;
        debug!(
            "🌊️ Event {} admitted for order {} with status '{}'",
            record.event_id, record.order_id, status.name
        );
        Ok(record)
    }

    /// The complete history for an order, ascending by `updated_at`, in wire form.
    pub async fn event_history(&self, order_id: &Uuid) -> Result<Vec<EventPayload>, EventFlowError> {
        let events = self.db.fetch_events_for_order(order_id).await?;
        trace!("🌊️ Fetched {} events for order {order_id}", events.len());
        Ok(events.iter().map(EventPayload::from).collect())
    }
}

/// The per-order admission gate, applied only when the order already has events.
fn check_order_transition(
    event: &IncomingEvent,
    status: &OrderStatus,
    last: &EventDetail,
) -> Result<(), EventFlowError> {
    if !status.is_final && !last.is_final {
        return Ok(());
    }
    let within_window = event.updated_at.signed_duration_since(last.updated_at)
        <= Duration::seconds(REFUND_RETRACTION_WINDOW_SECS);
    if status.id == OrderStatusType::GiveMyMoneyBack.id()
        && last.order_status_id == OrderStatusType::Chinazes.id()
        && within_window
    {
        return Ok(());
    }
    if last.is_final {
        return Err(EventFlowError::OrderAlreadyFinal(event.order_id));
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::MemoryDatabase;

    fn incoming(order_id: Uuid, offset_secs: i64) -> IncomingEvent {
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        IncomingEvent {
            event_id: Uuid::new_v4(),
            order_id,
            user_id: Uuid::new_v4(),
            created_at: base,
            updated_at: base + Duration::seconds(offset_secs),
        }
    }

    #[tokio::test]
    async fn first_event_is_admitted() {
        let _ = env_logger::try_init().ok();
        let api = EventFlowApi::new(MemoryDatabase::default());
        let order_id = Uuid::new_v4();
        let record = api.add_event(incoming(order_id, 0), "cool_order_created").await.unwrap();
        assert_eq!(record.order_status_id, OrderStatusType::CoolOrderCreated.id());
        let history = api.event_history(&order_id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].order_status, "cool_order_created");
    }

    #[tokio::test]
    async fn duplicate_event_id_is_rejected() {
        let _ = env_logger::try_init().ok();
        let api = EventFlowApi::new(MemoryDatabase::default());
        let order_id = Uuid::new_v4();
        let event = incoming(order_id, 0);
        api.add_event(event.clone(), "cool_order_created").await.unwrap();
        let err = api.add_event(event, "sbu_varification_pending").await.unwrap_err();
        assert!(matches!(err, EventFlowError::DuplicateEvent(_)));
        assert_eq!(api.event_history(&order_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_status_is_rejected() {
        let _ = env_logger::try_init().ok();
        let api = EventFlowApi::new(MemoryDatabase::default());
        let err = api.add_event(incoming(Uuid::new_v4(), 0), "on_hold").await.unwrap_err();
        assert!(matches!(err, EventFlowError::UnknownStatus(name) if name == "on_hold"));
    }

    #[tokio::test]
    async fn progression_between_non_final_statuses_is_admitted() {
        let _ = env_logger::try_init().ok();
        let api = EventFlowApi::new(MemoryDatabase::default());
        let order_id = Uuid::new_v4();
        api.add_event(incoming(order_id, 0), "cool_order_created").await.unwrap();
        api.add_event(incoming(order_id, 1), "sbu_varification_pending").await.unwrap();
        api.add_event(incoming(order_id, 2), "confirmed_by_mayor").await.unwrap();
        api.add_event(incoming(order_id, 3), "chinazes").await.unwrap();
        assert_eq!(api.event_history(&order_id).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn cancellation_from_any_progress_is_admitted() {
        let _ = env_logger::try_init().ok();
        let api = EventFlowApi::new(MemoryDatabase::default());
        let order_id = Uuid::new_v4();
        api.add_event(incoming(order_id, 0), "cool_order_created").await.unwrap();
        api.add_event(incoming(order_id, 1), "failed").await.unwrap();
    }

    #[tokio::test]
    async fn refund_within_grace_window_is_admitted() {
        let _ = env_logger::try_init().ok();
        let api = EventFlowApi::new(MemoryDatabase::default());
        let order_id = Uuid::new_v4();
        api.add_event(incoming(order_id, 0), "cool_order_created").await.unwrap();
        api.add_event(incoming(order_id, 3), "chinazes").await.unwrap();
        // 30 s on the dot is still inside the window
        api.add_event(incoming(order_id, 33), "give_my_money_back").await.unwrap();
    }

    #[tokio::test]
    async fn refund_past_grace_window_is_rejected() {
        let _ = env_logger::try_init().ok();
        let api = EventFlowApi::new(MemoryDatabase::default());
        let order_id = Uuid::new_v4();
        api.add_event(incoming(order_id, 0), "cool_order_created").await.unwrap();
        api.add_event(incoming(order_id, 3), "chinazes").await.unwrap();
        let err = api.add_event(incoming(order_id, 40), "give_my_money_back").await.unwrap_err();
        assert!(matches!(err, EventFlowError::OrderAlreadyFinal(id) if id == order_id));
    }

    #[tokio::test]
    async fn events_after_final_status_are_rejected() {
        let _ = env_logger::try_init().ok();
        let api = EventFlowApi::new(MemoryDatabase::default());
        let order_id = Uuid::new_v4();
        api.add_event(incoming(order_id, 0), "cool_order_created").await.unwrap();
        api.add_event(incoming(order_id, 1), "changed_my_mind").await.unwrap();
        let err = api.add_event(incoming(order_id, 2), "sbu_varification_pending").await.unwrap_err();
        assert!(matches!(err, EventFlowError::OrderAlreadyFinal(_)));
        // refund retraction only applies after chinazes
        let err = api.add_event(incoming(order_id, 3), "give_my_money_back").await.unwrap_err();
        assert!(matches!(err, EventFlowError::OrderAlreadyFinal(_)));
    }

    #[tokio::test]
    async fn history_is_ascending_by_updated_at() {
        let _ = env_logger::try_init().ok();
        let api = EventFlowApi::new(MemoryDatabase::default());
        let order_id = Uuid::new_v4();
        // admitted out of wall-clock order; the gate only cares about finality
        api.add_event(incoming(order_id, 5), "cool_order_created").await.unwrap();
        api.add_event(incoming(order_id, 1), "sbu_varification_pending").await.unwrap();
        api.add_event(incoming(order_id, 3), "confirmed_by_mayor").await.unwrap();
        let history = api.event_history(&order_id).await.unwrap();
        let times: Vec<&str> = history.iter().map(|e| e.updated_at.as_str()).collect();
        let mut sorted = times.clone();
        sorted.sort();
        assert_eq!(times, sorted);
    }
}
