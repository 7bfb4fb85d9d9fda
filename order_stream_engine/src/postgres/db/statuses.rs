use sqlx::PgPool;

use crate::db_types::OrderStatus;

pub async fn fetch_status_by_name(name: &str, pool: &PgPool) -> Result<Option<OrderStatus>, sqlx::Error> {
    sqlx::query_as("SELECT id, name, is_final FROM order_statuses WHERE name = $1")
        .bind(name)
        .fetch_optional(pool)
        .await
}
