use std::time::Duration;

use actix_web::http::StatusCode;
use uuid::Uuid;

use super::helpers::{event_body, post_event, TestContext};

fn ctx() -> TestContext {
    TestContext::new(Duration::from_secs(60))
}

#[actix_web::test]
async fn valid_event_is_accepted_with_an_empty_200() {
    let ctx = ctx();
    let order_id = Uuid::new_v4();
    let (status, body) = post_event(&ctx, &event_body(&order_id, "cool_order_created", 0)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_empty());
}

#[actix_web::test]
async fn malformed_identifiers_are_rejected() {
    let ctx = ctx();
    let mut body = event_body(&Uuid::new_v4(), "cool_order_created", 0);
    body["order_id"] = "not-a-uuid".into();
    let (status, _) = post_event(&ctx, &body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn malformed_timestamps_are_rejected() {
    let ctx = ctx();
    let mut body = event_body(&Uuid::new_v4(), "cool_order_created", 0);
    body["updated_at"] = "2024-05-01 12:00:00".into();
    let (status, _) = post_event(&ctx, &body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn empty_and_unknown_statuses_are_rejected() {
    let ctx = ctx();
    let mut body = event_body(&Uuid::new_v4(), "cool_order_created", 0);
    body["order_status"] = "".into();
    let (status, _) = post_event(&ctx, &body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let body = event_body(&Uuid::new_v4(), "on_hold", 0);
    let (status, _) = post_event(&ctx, &body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn duplicate_event_id_returns_409() {
    let ctx = ctx();
    let body = event_body(&Uuid::new_v4(), "cool_order_created", 0);
    let (status, _) = post_event(&ctx, &body).await;
    assert_eq!(status, StatusCode::OK);
    let (status, resp) = post_event(&ctx, &body).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(resp.is_empty());
}

#[actix_web::test]
async fn event_after_a_final_status_returns_410() {
    let ctx = ctx();
    let order_id = Uuid::new_v4();
    post_event(&ctx, &event_body(&order_id, "cool_order_created", 0)).await;
    post_event(&ctx, &event_body(&order_id, "changed_my_mind", 1)).await;
    let (status, resp) = post_event(&ctx, &event_body(&order_id, "sbu_varification_pending", 2)).await;
    assert_eq!(status, StatusCode::GONE);
    assert!(resp.is_empty());
}

#[actix_web::test]
async fn refund_retraction_is_accepted_only_inside_the_grace_window() {
    let ctx = ctx();
    let order_id = Uuid::new_v4();
    post_event(&ctx, &event_body(&order_id, "cool_order_created", 0)).await;
    post_event(&ctx, &event_body(&order_id, "sbu_varification_pending", 1)).await;
    post_event(&ctx, &event_body(&order_id, "confirmed_by_mayor", 2)).await;
    post_event(&ctx, &event_body(&order_id, "chinazes", 3)).await;
    let (status, _) = post_event(&ctx, &event_body(&order_id, "give_my_money_back", 13)).await;
    assert_eq!(status, StatusCode::OK);

    let order_id = Uuid::new_v4();
    post_event(&ctx, &event_body(&order_id, "cool_order_created", 0)).await;
    post_event(&ctx, &event_body(&order_id, "chinazes", 3)).await;
    let (status, _) = post_event(&ctx, &event_body(&order_id, "give_my_money_back", 43)).await;
    assert_eq!(status, StatusCode::GONE);
}

#[actix_web::test]
async fn unreadable_json_is_rejected() {
    let ctx = ctx();
    let (status, _) = post_event(&ctx, &serde_json::json!({ "event_id": 42 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
