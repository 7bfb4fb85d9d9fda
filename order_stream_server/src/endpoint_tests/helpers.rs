use std::time::Duration;

use actix::{Actor, Addr};
use actix_web::{http::StatusCode, test, test::TestRequest, web, App};
use chrono::{TimeZone, Utc};
use order_stream_engine::{db_types::format_event_timestamp, EventFlowApi, MemoryDatabase, OrderQueryApi};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    broker::EventBroker,
    routes::{GetOrdersRoute, IngestEventRoute, StreamEventsRoute},
    session::StreamSettings,
};

/// Shared state behind the per-request service instances: the store and the broker outlive any
/// single request, exactly as they do in the real server.
pub struct TestContext {
    pub db: MemoryDatabase,
    pub broker: Addr<EventBroker>,
    pub settings: StreamSettings,
}

impl TestContext {
    pub fn new(inactivity_timeout: Duration) -> Self {
        let _ = env_logger::try_init().ok();
        Self {
            db: MemoryDatabase::new(),
            broker: EventBroker::default().start(),
            settings: StreamSettings { inactivity_timeout },
        }
    }
}

fn configure(ctx: &TestContext) -> impl FnOnce(&mut web::ServiceConfig) {
    let db = ctx.db.clone();
    let broker = ctx.broker.clone();
    let settings = ctx.settings;
    move |cfg: &mut web::ServiceConfig| {
        cfg.app_data(web::Data::new(EventFlowApi::new(db.clone())))
            .app_data(web::Data::new(OrderQueryApi::new(db)))
            .app_data(web::Data::new(broker))
            .app_data(web::Data::new(settings))
            .service(IngestEventRoute::<MemoryDatabase>::new())
            .service(StreamEventsRoute::<MemoryDatabase>::new())
            .service(GetOrdersRoute::<MemoryDatabase>::new());
    }
}

pub async fn post_event(ctx: &TestContext, body: &Value) -> (StatusCode, String) {
    let app = test::init_service(App::new().configure(configure(ctx))).await;
    let req = TestRequest::post().uri("/webhooks/payments/orders").set_json(body).to_request();
    let resp = test::call_service(&app, req).await;
    let status = resp.status();
    let body = test::read_body(resp).await;
    (status, String::from_utf8_lossy(&body).into_owned())
}

pub async fn get_path(ctx: &TestContext, path: &str) -> (StatusCode, String) {
    let app = test::init_service(App::new().configure(configure(ctx))).await;
    let req = TestRequest::get().uri(path).to_request();
    let resp = test::call_service(&app, req).await;
    let status = resp.status();
    let body = test::read_body(resp).await;
    (status, String::from_utf8_lossy(&body).into_owned())
}

/// GETs an SSE stream and drains it to the end. Returns the status, the content type, and the
/// collected body.
pub async fn get_stream(ctx: &TestContext, path: &str) -> (StatusCode, String, String) {
    let app = test::init_service(App::new().configure(configure(ctx))).await;
    let req = TestRequest::get().uri(path).to_request();
    let resp = test::call_service(&app, req).await;
    let status = resp.status();
    let content_type = resp
        .headers()
        .get("content-type")
        .map(|v| v.to_str().unwrap_or_default().to_string())
        .unwrap_or_default();
    let body = test::read_body(resp).await;
    (status, content_type, String::from_utf8_lossy(&body).into_owned())
}

pub fn event_body(order_id: &Uuid, status: &str, offset_secs: i64) -> Value {
    event_body_for_user(order_id, &Uuid::new_v4(), status, offset_secs)
}

pub fn event_body_for_user(order_id: &Uuid, user_id: &Uuid, status: &str, offset_secs: i64) -> Value {
    let base = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let at = base + chrono::Duration::seconds(offset_secs);
    json!({
        "event_id": Uuid::new_v4().to_string(),
        "order_id": order_id.to_string(),
        "user_id": user_id.to_string(),
        "order_status": status,
        "created_at": format_event_timestamp(&base),
        "updated_at": format_event_timestamp(&at),
    })
}

/// The `order_status` of every `data:` frame in an SSE body, in arrival order.
pub fn frame_statuses(body: &str) -> Vec<String> {
    body.split("\n\n")
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| {
            let json = chunk.strip_prefix("data: ").expect("frame is missing its data prefix");
            let value: Value = serde_json::from_str(json).expect("frame payload is not JSON");
            value["order_status"].as_str().expect("frame payload has no order_status").to_string()
        })
        .collect()
}
