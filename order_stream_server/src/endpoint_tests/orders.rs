use std::time::Duration;

use actix_web::http::StatusCode;
use serde_json::Value;
use uuid::Uuid;

use super::helpers::{event_body, event_body_for_user, get_path, post_event, TestContext};

fn ctx() -> TestContext {
    TestContext::new(Duration::from_secs(60))
}

fn statuses_of(body: &str) -> Vec<String> {
    let events: Vec<Value> = serde_json::from_str(body).expect("response is not a JSON array");
    events.iter().map(|e| e["order_status"].as_str().unwrap().to_string()).collect()
}

#[actix_web::test]
async fn exactly_one_of_status_and_is_final_is_required() {
    let ctx = ctx();
    let (status, _) = get_path(&ctx, "/orders").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = get_path(&ctx, "/orders?status=failed&is_final=true").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn filters_by_status_names() {
    let ctx = ctx();
    let order_a = Uuid::new_v4();
    let order_b = Uuid::new_v4();
    post_event(&ctx, &event_body(&order_a, "cool_order_created", 0)).await;
    post_event(&ctx, &event_body(&order_a, "failed", 1)).await;
    post_event(&ctx, &event_body(&order_b, "cool_order_created", 2)).await;

    let (status, body) = get_path(&ctx, "/orders?status=failed").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(statuses_of(&body), vec!["failed"]);

    let (status, body) = get_path(&ctx, "/orders?status=failed,cool_order_created&sort_order=ASC").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(statuses_of(&body).len(), 3);
}

#[actix_web::test]
async fn filters_by_finality_with_descending_default_sort() {
    let ctx = ctx();
    let order_id = Uuid::new_v4();
    post_event(&ctx, &event_body(&order_id, "cool_order_created", 0)).await;
    post_event(&ctx, &event_body(&order_id, "sbu_varification_pending", 1)).await;
    post_event(&ctx, &event_body(&order_id, "confirmed_by_mayor", 2)).await;

    let (status, body) = get_path(&ctx, "/orders?is_final=false&sort_by=updated_at").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(statuses_of(&body), vec!["confirmed_by_mayor", "sbu_varification_pending", "cool_order_created"]);

    let (status, body) = get_path(&ctx, "/orders?is_final=true").await;
    assert_eq!(status, StatusCode::OK);
    assert!(statuses_of(&body).is_empty());
}

#[actix_web::test]
async fn filters_by_user_and_paginates() {
    let ctx = ctx();
    let user = Uuid::new_v4();
    let order_id = Uuid::new_v4();
    post_event(&ctx, &event_body_for_user(&order_id, &user, "cool_order_created", 0)).await;
    post_event(&ctx, &event_body_for_user(&order_id, &user, "sbu_varification_pending", 1)).await;
    post_event(&ctx, &event_body(&Uuid::new_v4(), "cool_order_created", 2)).await;

    let path = format!("/orders?is_final=false&user_id={user}&sort_by=updated_at&sort_order=ASC&limit=1&offset=1");
    let (status, body) = get_path(&ctx, &path).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(statuses_of(&body), vec!["sbu_varification_pending"]);
}

#[actix_web::test]
async fn invalid_parameters_are_rejected() {
    let ctx = ctx();
    let (status, _) = get_path(&ctx, "/orders?is_final=true&sort_by=price").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = get_path(&ctx, "/orders?is_final=true&sort_order=sideways").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = get_path(&ctx, "/orders?is_final=true&user_id=not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = get_path(&ctx, "/orders?is_final=perhaps").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
