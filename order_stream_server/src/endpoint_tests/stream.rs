use std::time::Duration;

use actix_web::http::StatusCode;
use uuid::Uuid;

use super::helpers::{event_body, frame_statuses, get_path, get_stream, post_event, TestContext};
use crate::broker::PublishEvent;

#[actix_web::test]
async fn malformed_order_id_is_rejected() {
    let ctx = TestContext::new(Duration::from_secs(60));
    let (status, _) = get_path(&ctx, "/orders/not-a-uuid/events").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn stream_carries_sse_headers() {
    let ctx = TestContext::new(Duration::from_millis(100));
    let order_id = Uuid::new_v4();
    let (status, content_type, _) = get_stream(&ctx, &format!("/orders/{order_id}/events")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type, "text/event-stream");
}

#[actix_web::test]
async fn history_is_replayed_through_the_gate() {
    let ctx = TestContext::new(Duration::from_millis(200));
    let order_id = Uuid::new_v4();
    for (status, offset) in
        [("cool_order_created", 0), ("sbu_varification_pending", 1), ("confirmed_by_mayor", 2), ("chinazes", 3)]
    {
        let (code, _) = post_event(&ctx, &event_body(&order_id, status, offset)).await;
        assert_eq!(code, StatusCode::OK);
    }
    let (status, _, body) = get_stream(&ctx, &format!("/orders/{order_id}/events")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        frame_statuses(&body),
        vec!["cool_order_created", "sbu_varification_pending", "confirmed_by_mayor", "chinazes"]
    );
}

#[actix_web::test]
async fn live_events_are_delivered_after_the_replay() {
    let ctx = TestContext::new(Duration::from_millis(300));
    let order_id = Uuid::new_v4();
    let (code, _) = post_event(&ctx, &event_body(&order_id, "cool_order_created", 0)).await;
    assert_eq!(code, StatusCode::OK);

    // publish a successor mid-stream, straight through the shared broker
    let broker = ctx.broker.clone();
    let live = serde_json::to_vec(&event_body(&order_id, "sbu_varification_pending", 1)).unwrap();
    actix_web::rt::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        broker.do_send(PublishEvent { payload: actix_web::web::Bytes::from(live) });
    });

    let (_, _, body) = get_stream(&ctx, &format!("/orders/{order_id}/events")).await;
    assert_eq!(frame_statuses(&body), vec!["cool_order_created", "sbu_varification_pending"]);
}

#[actix_web::test]
async fn an_event_held_in_replay_is_released_by_a_live_successor() {
    let ctx = TestContext::new(Duration::from_millis(300));
    let order_id = Uuid::new_v4();
    // the stored history is missing sbu_varification_pending, so replay stops after the creation
    post_event(&ctx, &event_body(&order_id, "cool_order_created", 0)).await;
    post_event(&ctx, &event_body(&order_id, "confirmed_by_mayor", 2)).await;

    let broker = ctx.broker.clone();
    let missing = serde_json::to_vec(&event_body(&order_id, "sbu_varification_pending", 1)).unwrap();
    actix_web::rt::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        broker.do_send(PublishEvent { payload: actix_web::web::Bytes::from(missing) });
    });

    let (_, _, body) = get_stream(&ctx, &format!("/orders/{order_id}/events")).await;
    assert_eq!(
        frame_statuses(&body),
        vec!["cool_order_created", "sbu_varification_pending", "confirmed_by_mayor"]
    );
}

#[actix_web::test]
async fn idle_stream_is_closed_by_the_inactivity_timeout() {
    let ctx = TestContext::new(Duration::from_millis(100));
    let order_id = Uuid::new_v4();
    let started = std::time::Instant::now();
    let (status, _, body) = get_stream(&ctx, &format!("/orders/{order_id}/events")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_empty());
    assert!(started.elapsed() >= Duration::from_millis(100));
}
