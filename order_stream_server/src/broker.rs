//! The fan-out broker.
//!
//! A single actor owns the subscriber registry, so subscribe, unsubscribe and publish are
//! serialized through its mailbox and the registry needs no locking. Publishing never blocks: the
//! broker pushes into each session's bounded mailbox with `try_send` and drops the payload for any
//! session that cannot keep up. A dropped payload is not a lost event; the session recovers it via
//! history replay on its next connect.
use std::collections::HashMap;

use actix::{Actor, Context, Handler, Message, Running};
use actix_web::web::Bytes;
use log::*;
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

/// A session's entry in the registry: its id and the sending half of its mailbox.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub id: u64,
    pub mailbox: mpsc::Sender<Bytes>,
}

#[derive(Default)]
pub struct EventBroker {
    subscribers: HashMap<Uuid, Vec<SessionHandle>>,
}

impl Actor for EventBroker {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        debug!("📡️ Event broker started");
    }

    fn stopping(&mut self, _ctx: &mut Self::Context) -> Running {
        debug!("📡️ Event broker stopping");
        Running::Stop
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        debug!("📡️ Event broker stopped");
    }
}

// -----------------------------------------    Messages      ---------------------------------------------------------

#[derive(Message, Debug)]
#[rtype(result = "()")]
pub struct Subscribe {
    pub order_id: Uuid,
    pub handle: SessionHandle,
}

#[derive(Message, Debug)]
#[rtype(result = "()")]
pub struct Unsubscribe {
    pub order_id: Uuid,
    pub session_id: u64,
}

#[derive(Message, Debug, Clone)]
#[rtype(result = "()")]
pub struct PublishEvent {
    pub payload: Bytes,
}

/// Drops every registered mailbox so sessions observe end-of-stream and wind down.
#[derive(Message, Debug)]
#[rtype(result = "()")]
pub struct Shutdown;

/// The only field the broker needs out of a payload to route it.
#[derive(Deserialize)]
struct OrderKey {
    order_id: Uuid,
}

impl Handler<Subscribe> for EventBroker {
    type Result = ();

    fn handle(&mut self, msg: Subscribe, _ctx: &mut Self::Context) -> Self::Result {
        let sessions = self.subscribers.entry(msg.order_id).or_default();
        let session_id = msg.handle.id;
        sessions.push(msg.handle);
        debug!(
            "📡️ Session {session_id} subscribed to order {} ({} sessions on this order)",
            msg.order_id,
            sessions.len()
        );
    }
}

impl Handler<Unsubscribe> for EventBroker {
    type Result = ();

    fn handle(&mut self, msg: Unsubscribe, _ctx: &mut Self::Context) -> Self::Result {
        if let Some(sessions) = self.subscribers.get_mut(&msg.order_id) {
            sessions.retain(|s| s.id != msg.session_id);
            debug!(
                "📡️ Session {} unsubscribed from order {} ({} sessions left on this order)",
                msg.session_id,
                msg.order_id,
                sessions.len()
            );
            if sessions.is_empty() {
                self.subscribers.remove(&msg.order_id);
            }
        }
    }
}

impl Handler<PublishEvent> for EventBroker {
    type Result = ();

    fn handle(&mut self, msg: PublishEvent, _ctx: &mut Self::Context) -> Self::Result {
        let order_id = match serde_json::from_slice::<OrderKey>(&msg.payload) {
            Ok(key) => key.order_id,
            Err(e) => {
                warn!("📡️ Dropping payload without a parseable order id: {e}");
                return;
            },
        };
        let Some(sessions) = self.subscribers.get_mut(&order_id) else {
            trace!("📡️ No subscribers for order {order_id}");
            return;
        };
        trace!("📡️ Broadcasting to {} sessions on order {order_id}", sessions.len());
        sessions.retain(|session| match session.mailbox.try_send(msg.payload.clone()) {
            Ok(()) => {
                trace!("📡️ Event dispatched to session {}", session.id);
                true
            },
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("📡️ Mailbox of session {} is full. Dropping event.", session.id);
                true
            },
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("📡️ Mailbox of session {} has closed. Removing it from the registry.", session.id);
                false
            },
        });
        if sessions.is_empty() {
            self.subscribers.remove(&order_id);
        }
    }
}

impl Handler<Shutdown> for EventBroker {
    type Result = ();

    fn handle(&mut self, _msg: Shutdown, _ctx: &mut Self::Context) -> Self::Result {
        let count = self.subscribers.values().map(Vec::len).sum::<usize>();
        self.subscribers.clear();
        debug!("📡️ Broker shut down. {count} sessions were closed.");
    }
}

#[cfg(test)]
mod test {
    use actix::Actor;
    use serde_json::json;

    use super::*;

    fn payload(order_id: Uuid, status: &str, updated_at: &str) -> Bytes {
        let body = json!({
            "event_id": Uuid::new_v4().to_string(),
            "order_id": order_id.to_string(),
            "user_id": Uuid::new_v4().to_string(),
            "order_status": status,
            "created_at": "2024-05-01T12:00:00Z",
            "updated_at": updated_at,
        });
        Bytes::from(serde_json::to_vec(&body).unwrap())
    }

    #[actix_web::test]
    async fn publish_fans_out_to_all_subscribers_of_the_order() {
        let _ = env_logger::try_init().ok();
        let broker = EventBroker::default().start();
        let order_id = Uuid::new_v4();
        let other_order = Uuid::new_v4();
        let (tx_a, mut rx_a) = mpsc::channel(5);
        let (tx_b, mut rx_b) = mpsc::channel(5);
        let (tx_c, mut rx_c) = mpsc::channel(5);
        broker.send(Subscribe { order_id, handle: SessionHandle { id: 1, mailbox: tx_a } }).await.unwrap();
        broker.send(Subscribe { order_id, handle: SessionHandle { id: 2, mailbox: tx_b } }).await.unwrap();
        broker.send(Subscribe { order_id: other_order, handle: SessionHandle { id: 3, mailbox: tx_c } }).await.unwrap();

        broker.send(PublishEvent { payload: payload(order_id, "cool_order_created", "2024-05-01T12:00:00Z") })
            .await
            .unwrap();

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
        assert!(rx_c.try_recv().is_err());
    }

    #[actix_web::test]
    async fn publishes_preserve_order_per_session() {
        let _ = env_logger::try_init().ok();
        let broker = EventBroker::default().start();
        let order_id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel(5);
        broker.send(Subscribe { order_id, handle: SessionHandle { id: 1, mailbox: tx } }).await.unwrap();
        for i in 0..3 {
            let at = format!("2024-05-01T12:00:0{i}Z");
            broker.send(PublishEvent { payload: payload(order_id, "cool_order_created", &at) }).await.unwrap();
        }
        for i in 0..3 {
            let raw = rx.try_recv().unwrap();
            let text = String::from_utf8(raw.to_vec()).unwrap();
            assert!(text.contains(&format!("12:00:0{i}Z")));
        }
    }

    #[actix_web::test]
    async fn full_mailbox_drops_the_overflow_and_keeps_the_prefix() {
        let _ = env_logger::try_init().ok();
        let broker = EventBroker::default().start();
        let order_id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel(5);
        broker.send(Subscribe { order_id, handle: SessionHandle { id: 1, mailbox: tx } }).await.unwrap();
        for i in 0..10 {
            let at = format!("2024-05-01T12:00:{i:02}Z");
            broker.send(PublishEvent { payload: payload(order_id, "cool_order_created", &at) }).await.unwrap();
        }
        // the first five publishes survive, in publish order; the rest were dropped
        for i in 0..5 {
            let raw = rx.try_recv().unwrap();
            let text = String::from_utf8(raw.to_vec()).unwrap();
            assert!(text.contains(&format!("12:00:{i:02}Z")));
        }
        assert!(rx.try_recv().is_err());
    }

    #[actix_web::test]
    async fn unsubscribe_is_idempotent_and_stops_delivery() {
        let _ = env_logger::try_init().ok();
        let broker = EventBroker::default().start();
        let order_id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel(5);
        broker.send(Subscribe { order_id, handle: SessionHandle { id: 7, mailbox: tx } }).await.unwrap();
        broker.send(Unsubscribe { order_id, session_id: 7 }).await.unwrap();
        broker.send(Unsubscribe { order_id, session_id: 7 }).await.unwrap();
        broker.send(PublishEvent { payload: payload(order_id, "cool_order_created", "2024-05-01T12:00:00Z") })
            .await
            .unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[actix_web::test]
    async fn unparseable_payloads_are_dropped_at_the_boundary() {
        let _ = env_logger::try_init().ok();
        let broker = EventBroker::default().start();
        let order_id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel(5);
        broker.send(Subscribe { order_id, handle: SessionHandle { id: 1, mailbox: tx } }).await.unwrap();
        broker.send(PublishEvent { payload: Bytes::from_static(b"not json") }).await.unwrap();
        broker.send(PublishEvent { payload: Bytes::from_static(br#"{"order_id":"nope"}"#) }).await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[actix_web::test]
    async fn shutdown_closes_all_mailboxes() {
        let _ = env_logger::try_init().ok();
        let broker = EventBroker::default().start();
        let order_id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel(5);
        broker.send(Subscribe { order_id, handle: SessionHandle { id: 1, mailbox: tx } }).await.unwrap();
        broker.send(Shutdown).await.unwrap();
        assert!(matches!(rx.try_recv(), Err(mpsc::error::TryRecvError::Disconnected)));
    }
}
