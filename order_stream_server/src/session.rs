//! Subscriber sessions.
//!
//! One session exists per live SSE connection. The broker only shuttles bytes; everything
//! order-specific to the client lives here: the last-delivered status, the pending buffer of
//! events that arrived ahead of their predecessor, and the inactivity deadline. Events reach the
//! session from two sources, the stored history on connect and the broker mailbox afterwards, and
//! both go through the same [`DeliveryGate`].
use std::{
    pin::Pin,
    sync::atomic::{AtomicU64, Ordering},
    task::{Context, Poll},
    time::Duration,
};

use actix::Addr;
use actix_web::web::Bytes;
use chrono::{DateTime, Utc};
use futures_util::Stream;
use log::*;
use order_stream_engine::{
    db_types::{parse_event_timestamp, EventPayload, OrderStatusType},
    EventDatabase, EventFlowApi,
};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{
    broker::{EventBroker, SessionHandle, Subscribe, Unsubscribe},
    errors::ServerError,
};

/// Capacity of a session's inbound mailbox. The broker drops events for a session whose mailbox
/// is full; reconnecting replays the history and recovers them.
pub const SESSION_MAILBOX_SIZE: usize = 5;

pub const DEFAULT_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(60);

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy)]
pub struct StreamSettings {
    pub inactivity_timeout: Duration,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self { inactivity_timeout: DEFAULT_INACTIVITY_TIMEOUT }
    }
}

//--------------------------------------    DeliveryGate    -----------------------------------------------------------

/// An event staged for delivery: the fields the gate decides on, plus the serialized payload that
/// goes onto the wire untouched.
#[derive(Debug, Clone)]
pub struct GatedEvent {
    pub status: OrderStatusType,
    pub updated_at: DateTime<Utc>,
    pub payload: Bytes,
}

impl GatedEvent {
    pub fn from_raw(raw: Bytes) -> Option<Self> {
        let payload = match serde_json::from_slice::<EventPayload>(&raw) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("🛜️ Discarding undecodable event payload: {e}");
                return None;
            },
        };
        Self::from_parts(&payload, raw)
    }

    pub fn from_parts(payload: &EventPayload, raw: Bytes) -> Option<Self> {
        let status = match payload.order_status.parse::<OrderStatusType>() {
            Ok(status) => status,
            Err(e) => {
                warn!("🛜️ Discarding event {} with unknown status: {e}", payload.event_id);
                return None;
            },
        };
        let updated_at = match parse_event_timestamp(&payload.updated_at) {
            Ok(at) => at,
            Err(e) => {
                warn!("🛜️ Discarding event {} with unreadable updated_at: {e}", payload.event_id);
                return None;
            },
        };
        Some(Self { status, updated_at, payload: raw })
    }
}

/// The per-client transition gate.
///
/// Tracks the last status delivered to this client and holds back events until they form a legal
/// successor. Held-back events sit in `pending`, sorted by `updated_at` with the newest first, so
/// the oldest candidate is always a cheap pop off the tail.
#[derive(Debug, Default)]
pub struct DeliveryGate {
    last_delivered: Option<OrderStatusType>,
    pending: Vec<GatedEvent>,
}

impl DeliveryGate {
    /// Runs one event through the gate. Returns every event that is now deliverable, in delivery
    /// order: the offered event first if it was admitted, followed by any buffered events the
    /// advancing status unblocked. An inadmissible event is buffered and the result is empty.
    pub fn offer(&mut self, event: GatedEvent) -> Vec<GatedEvent> {
        if !self.permits(event.status) {
            trace!("🛜️ Buffering {} event; last delivered was {:?}", event.status, self.last_delivered);
            self.buffer(event);
            return Vec::new();
        }
        self.last_delivered = Some(event.status);
        let mut ready = vec![event];
        while self.pending.last().is_some_and(|tail| self.permits(tail.status)) {
            if let Some(next) = self.pending.pop() {
                self.last_delivered = Some(next.status);
                ready.push(next);
            }
        }
        ready
    }

    pub fn last_delivered(&self) -> Option<OrderStatusType> {
        self.last_delivered
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    fn permits(&self, next: OrderStatusType) -> bool {
        use OrderStatusType::*;
        match (self.last_delivered, next) {
            (None, CoolOrderCreated) => true,
            // cancellations are terminal and unordered with respect to progress
            (Some(_), Failed) | (Some(_), ChangedMyMind) => true,
            (Some(CoolOrderCreated), SbuVarificationPending) => true,
            (Some(SbuVarificationPending), ConfirmedByMayor) => true,
            (Some(ConfirmedByMayor), Chinazes) => true,
            (Some(Chinazes), GiveMyMoneyBack) => true,
            _ => false,
        }
    }

    fn buffer(&mut self, event: GatedEvent) {
        let at = self.pending.partition_point(|e| e.updated_at > event.updated_at);
        self.pending.insert(at, event);
    }
}

//--------------------------------------  SubscriberSession  ----------------------------------------------------------

/// The body stream handed to actix. Frames arrive from the session task; the stream ends when the
/// session winds down and drops its sender.
pub struct SseStream {
    frames: mpsc::Receiver<Result<Bytes, ServerError>>,
}

impl Stream for SseStream {
    type Item = Result<Bytes, ServerError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.frames.poll_recv(cx)
    }
}

/// Formats a payload as a canonical SSE data frame.
pub fn sse_frame(payload: &[u8]) -> Bytes {
    let mut frame = Vec::with_capacity(payload.len() + 8);
    frame.extend_from_slice(b"data: ");
    frame.extend_from_slice(payload);
    frame.extend_from_slice(b"\n\n");
    Bytes::from(frame)
}

pub struct SubscriberSession<B: EventDatabase> {
    id: u64,
    order_id: Uuid,
    broker: Addr<EventBroker>,
    api: EventFlowApi<B>,
    mailbox: mpsc::Receiver<Bytes>,
    out: mpsc::Sender<Result<Bytes, ServerError>>,
    gate: DeliveryGate,
    inactivity_timeout: Duration,
}

impl<B> SubscriberSession<B>
where B: EventDatabase + 'static
{
    /// Creates a session, registers it with the broker, and spawns its task onto the current
    /// arbiter. The returned stream is the SSE response body.
    pub fn spawn(
        order_id: Uuid,
        broker: Addr<EventBroker>,
        api: EventFlowApi<B>,
        settings: StreamSettings,
    ) -> SseStream {
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        let (mail_tx, mail_rx) = mpsc::channel(SESSION_MAILBOX_SIZE);
        let (out_tx, out_rx) = mpsc::channel(SESSION_MAILBOX_SIZE);
        broker.do_send(Subscribe { order_id, handle: SessionHandle { id, mailbox: mail_tx } });
        let session = Self {
            id,
            order_id,
            broker,
            api,
            mailbox: mail_rx,
            out: out_tx,
            gate: DeliveryGate::default(),
            inactivity_timeout: settings.inactivity_timeout,
        };
        actix_web::rt::spawn(session.run());
        SseStream { frames: out_rx }
    }

    async fn run(mut self) {
        debug!("🛜️ Session {} opened for order {}", self.id, self.order_id);
        match self.replay_history().await {
            Ok(()) => self.live_loop().await,
            Err(ServerError::MailboxClosed) => {
                debug!("🛜️ Session {}: client disconnected during history replay", self.id);
            },
            Err(e) => {
                error!("🛜️ Session {}: history replay failed. {e}", self.id);
                let _ = self.out.send(Err(e)).await;
            },
        }
        self.broker.do_send(Unsubscribe { order_id: self.order_id, session_id: self.id });
        debug!("🛜️ Session {} closed", self.id);
    }

    /// Pushes the stored history through the gate before any live event is looked at. Events that
    /// fail the gate here stay buffered and may be unblocked by live successors.
    async fn replay_history(&mut self) -> Result<(), ServerError> {
        let history = self.api.event_history(&self.order_id).await.map_err(ServerError::from)?;
        trace!("🛜️ Session {}: replaying {} stored events", self.id, history.len());
        for payload in &history {
            let raw = serde_json::to_vec(payload).map_err(|e| ServerError::BackendError(e.to_string()))?;
            let Some(event) = GatedEvent::from_parts(payload, Bytes::from(raw)) else {
                continue;
            };
            let batch = self.gate.offer(event);
            self.deliver(batch).await?;
        }
        Ok(())
    }

    async fn live_loop(&mut self) {
        let deadline = tokio::time::sleep(self.inactivity_timeout);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                received = self.mailbox.recv() => {
                    let Some(raw) = received else {
                        debug!("🛜️ Session {}: mailbox closed by the broker", self.id);
                        break;
                    };
                    deadline.as_mut().reset(tokio::time::Instant::now() + self.inactivity_timeout);
                    let Some(event) = GatedEvent::from_raw(raw) else {
                        continue;
                    };
                    let batch = self.gate.offer(event);
                    if self.deliver(batch).await.is_err() {
                        debug!("🛜️ Session {}: client went away mid-write", self.id);
                        break;
                    }
                }
                _ = &mut deadline => {
                    debug!(
                        "🛜️ Session {} timed out after {:?} of inactivity",
                        self.id, self.inactivity_timeout
                    );
                    break;
                }
                _ = self.out.closed() => {
                    debug!("🛜️ Session {}: client disconnected", self.id);
                    break;
                }
            }
        }
    }

    async fn deliver(&mut self, batch: Vec<GatedEvent>) -> Result<(), ServerError> {
        for event in batch {
            trace!("🛜️ Session {}: delivering {} event", self.id, event.status);
            self.out.send(Ok(sse_frame(&event.payload))).await.map_err(|_| ServerError::MailboxClosed)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use actix::Actor;
    use chrono::TimeZone;
    use futures_util::StreamExt;
    use order_stream_engine::{db_types::IncomingEvent, MemoryDatabase};
    use serde_json::json;

    use super::*;
    use crate::broker::PublishEvent;

    fn gated(status: OrderStatusType, offset_secs: i64) -> GatedEvent {
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        GatedEvent {
            status,
            updated_at: base + chrono::Duration::seconds(offset_secs),
            payload: Bytes::from(status.as_str()),
        }
    }

    fn statuses(batch: &[GatedEvent]) -> Vec<OrderStatusType> {
        batch.iter().map(|e| e.status).collect()
    }

    #[test]
    fn happy_path_passes_straight_through() {
        use OrderStatusType::*;
        let mut gate = DeliveryGate::default();
        for (i, status) in [CoolOrderCreated, SbuVarificationPending, ConfirmedByMayor, Chinazes, GiveMyMoneyBack]
            .into_iter()
            .enumerate()
        {
            let batch = gate.offer(gated(status, i as i64));
            assert_eq!(statuses(&batch), vec![status]);
        }
        assert_eq!(gate.pending_count(), 0);
    }

    #[test]
    fn first_event_must_be_order_creation() {
        use OrderStatusType::*;
        let mut gate = DeliveryGate::default();
        assert!(gate.offer(gated(SbuVarificationPending, 1)).is_empty());
        assert!(gate.offer(gated(Failed, 2)).is_empty());
        assert_eq!(gate.pending_count(), 2);
        assert_eq!(gate.last_delivered(), None);
    }

    #[test]
    fn out_of_order_event_is_buffered_then_flushed() {
        use OrderStatusType::*;
        let mut gate = DeliveryGate::default();
        assert_eq!(statuses(&gate.offer(gated(CoolOrderCreated, 0))), vec![CoolOrderCreated]);
        // confirmed_by_mayor arrives before its predecessor
        assert!(gate.offer(gated(ConfirmedByMayor, 2)).is_empty());
        let batch = gate.offer(gated(SbuVarificationPending, 1));
        assert_eq!(statuses(&batch), vec![SbuVarificationPending, ConfirmedByMayor]);
        assert_eq!(gate.pending_count(), 0);
    }

    #[test]
    fn buffered_prefix_flushes_in_chronological_order() {
        use OrderStatusType::*;
        let mut gate = DeliveryGate::default();
        // everything shows up before the order-created event, in scrambled order
        assert!(gate.offer(gated(Chinazes, 3)).is_empty());
        assert!(gate.offer(gated(SbuVarificationPending, 1)).is_empty());
        assert!(gate.offer(gated(ConfirmedByMayor, 2)).is_empty());
        let batch = gate.offer(gated(CoolOrderCreated, 0));
        assert_eq!(statuses(&batch), vec![CoolOrderCreated, SbuVarificationPending, ConfirmedByMayor, Chinazes]);
    }

    #[test]
    fn cancellations_are_accepted_from_any_progress() {
        use OrderStatusType::*;
        let mut gate = DeliveryGate::default();
        gate.offer(gated(CoolOrderCreated, 0));
        assert_eq!(statuses(&gate.offer(gated(Failed, 1))), vec![Failed]);

        let mut gate = DeliveryGate::default();
        gate.offer(gated(CoolOrderCreated, 0));
        gate.offer(gated(SbuVarificationPending, 1));
        assert_eq!(statuses(&gate.offer(gated(ChangedMyMind, 2))), vec![ChangedMyMind]);
    }

    #[test]
    fn progress_after_a_final_status_stays_buffered() {
        use OrderStatusType::*;
        let mut gate = DeliveryGate::default();
        gate.offer(gated(CoolOrderCreated, 0));
        gate.offer(gated(Failed, 1));
        assert!(gate.offer(gated(SbuVarificationPending, 2)).is_empty());
        assert!(gate.offer(gated(GiveMyMoneyBack, 3)).is_empty());
        assert_eq!(gate.pending_count(), 2);
    }

    #[test]
    fn refund_only_follows_chinazes() {
        use OrderStatusType::*;
        let mut gate = DeliveryGate::default();
        gate.offer(gated(CoolOrderCreated, 0));
        assert!(gate.offer(gated(GiveMyMoneyBack, 1)).is_empty());

        let mut gate = DeliveryGate::default();
        for (i, status) in [CoolOrderCreated, SbuVarificationPending, ConfirmedByMayor, Chinazes].into_iter().enumerate()
        {
            gate.offer(gated(status, i as i64));
        }
        assert_eq!(statuses(&gate.offer(gated(GiveMyMoneyBack, 10))), vec![GiveMyMoneyBack]);
    }

    //----------------------------------  session integration  --------------------------------------------------------

    fn wire_payload(order_id: Uuid, status: &str, offset_secs: i64) -> Bytes {
        let body = json!({
            "event_id": Uuid::new_v4().to_string(),
            "order_id": order_id.to_string(),
            "user_id": Uuid::new_v4().to_string(),
            "order_status": status,
            "created_at": "2024-05-01T12:00:00Z",
            "updated_at": format!("2024-05-01T12:00:{offset_secs:02}Z"),
        });
        Bytes::from(serde_json::to_vec(&body).unwrap())
    }

    fn incoming(order_id: Uuid, offset_secs: i64) -> IncomingEvent {
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        IncomingEvent {
            event_id: Uuid::new_v4(),
            order_id,
            user_id: Uuid::new_v4(),
            created_at: base,
            updated_at: base + chrono::Duration::seconds(offset_secs),
        }
    }

    fn frame_status(frame: &Bytes) -> String {
        let text = std::str::from_utf8(frame).unwrap();
        let body = text.strip_prefix("data: ").unwrap().trim_end();
        let payload: EventPayload = serde_json::from_str(body).unwrap();
        payload.order_status
    }

    async fn collect_stream(mut stream: SseStream) -> Vec<String> {
        let mut seen = Vec::new();
        while let Ok(Some(frame)) = tokio::time::timeout(Duration::from_secs(2), stream.next()).await {
            seen.push(frame_status(&frame.unwrap()));
        }
        seen
    }

    #[actix_web::test]
    async fn session_replays_history_then_streams_live_events() {
        let _ = env_logger::try_init().ok();
        let db = MemoryDatabase::new();
        let api = EventFlowApi::new(db.clone());
        let broker = EventBroker::default().start();
        let order_id = Uuid::new_v4();
        // stored history: creation plus an event whose predecessor has not been seen
        api.add_event(incoming(order_id, 0), "cool_order_created").await.unwrap();
        api.add_event(incoming(order_id, 2), "confirmed_by_mayor").await.unwrap();

        let settings = StreamSettings { inactivity_timeout: Duration::from_millis(300) };
        let stream = SubscriberSession::spawn(order_id, broker.clone(), api.clone(), settings);
        tokio::time::sleep(Duration::from_millis(50)).await;

        // the missing link arrives live and unblocks the buffered replay event
        broker.send(PublishEvent { payload: wire_payload(order_id, "sbu_varification_pending", 1) }).await.unwrap();

        let seen = collect_stream(stream).await;
        assert_eq!(seen, vec!["cool_order_created", "sbu_varification_pending", "confirmed_by_mayor"]);
    }

    #[actix_web::test]
    async fn idle_session_closes_after_the_inactivity_timeout() {
        let _ = env_logger::try_init().ok();
        let db = MemoryDatabase::new();
        let api = EventFlowApi::new(db);
        let broker = EventBroker::default().start();
        let settings = StreamSettings { inactivity_timeout: Duration::from_millis(100) };
        let mut stream = SubscriberSession::spawn(Uuid::new_v4(), broker, api, settings);
        let next = tokio::time::timeout(Duration::from_secs(2), stream.next()).await;
        assert!(matches!(next, Ok(None)));
    }

    #[actix_web::test]
    async fn dropping_the_stream_unsubscribes_the_session() {
        let _ = env_logger::try_init().ok();
        let db = MemoryDatabase::new();
        let api = EventFlowApi::new(db);
        let broker = EventBroker::default().start();
        let order_id = Uuid::new_v4();
        let settings = StreamSettings { inactivity_timeout: Duration::from_secs(60) };
        let stream = SubscriberSession::spawn(order_id, broker.clone(), api, settings);
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(stream);
        tokio::time::sleep(Duration::from_millis(50)).await;
        // publishing afterwards must not panic or deliver anywhere
        broker.send(PublishEvent { payload: wire_payload(order_id, "cool_order_created", 0) }).await.unwrap();
    }
}
