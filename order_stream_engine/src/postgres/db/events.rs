use sqlx::{PgPool, QueryBuilder};
use uuid::Uuid;

use crate::db_types::{EventDetail, EventQueryFilter, OrderEvent};

const DETAIL_COLUMNS: &str = "e.event_id, e.order_id, e.user_id, e.order_status_id, e.created_at, e.updated_at, \
                              os.name AS order_status_name, os.is_final";

pub async fn fetch_event_by_id(event_id: &Uuid, pool: &PgPool) -> Result<Option<OrderEvent>, sqlx::Error> {
    sqlx::query_as(
        "SELECT event_id, order_id, user_id, order_status_id, created_at, updated_at \
         FROM events WHERE event_id = $1",
    )
    .bind(event_id)
    .fetch_optional(pool)
    .await
}

/// The most recent event for the order, by maximum `updated_at`.
pub async fn fetch_last_event_for_order(order_id: &Uuid, pool: &PgPool) -> Result<Option<EventDetail>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT {DETAIL_COLUMNS} FROM events e \
         JOIN order_statuses os ON e.order_status_id = os.id \
         WHERE e.order_id = $1 \
         ORDER BY e.updated_at DESC LIMIT 1"
    ))
    .bind(order_id)
    .fetch_optional(pool)
    .await
}

pub async fn insert_event(event: &OrderEvent, pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO events (event_id, order_id, user_id, order_status_id, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(event.event_id)
    .bind(event.order_id)
    .bind(event.user_id)
    .bind(event.order_status_id)
    .bind(event.created_at)
    .bind(event.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn fetch_events_for_order(order_id: &Uuid, pool: &PgPool) -> Result<Vec<EventDetail>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT {DETAIL_COLUMNS} FROM events e \
         JOIN order_statuses os ON e.order_status_id = os.id \
         WHERE e.order_id = $1 \
         ORDER BY e.updated_at ASC"
    ))
    .bind(order_id)
    .fetch_all(pool)
    .await
}

/// Fetches events according to the criteria in the filter.
///
/// The sort column and direction come from closed enums, so pushing them into the query text
/// directly is safe; everything user-supplied is bound.
pub async fn search_events(filter: &EventQueryFilter, pool: &PgPool) -> Result<Vec<EventDetail>, sqlx::Error> {
    let mut builder = QueryBuilder::new(format!(
        "SELECT {DETAIL_COLUMNS} FROM events e \
         JOIN order_statuses os ON e.order_status_id = os.id \
         WHERE 1=1"
    ));
    if !filter.statuses.is_empty() {
        builder.push(" AND os.name IN (");
        let mut names = builder.separated(", ");
        for name in &filter.statuses {
            names.push_bind(name);
        }
        builder.push(")");
    }
    if let Some(is_final) = filter.is_final {
        builder.push(" AND os.is_final = ");
        builder.push_bind(is_final);
    }
    if let Some(user_id) = filter.user_id {
        builder.push(" AND e.user_id = ");
        builder.push_bind(user_id);
    }
    builder.push(format!(" ORDER BY e.{} {}", filter.sort_by.as_sql(), filter.sort_order.as_sql()));
    builder.push(" LIMIT ");
    builder.push_bind(filter.limit);
    builder.push(" OFFSET ");
    builder.push_bind(filter.offset);
    builder.build_query_as::<EventDetail>().fetch_all(pool).await
}
