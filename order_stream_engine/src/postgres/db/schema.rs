use sqlx::PgPool;

use crate::db_types::OrderStatusType;

const CREATE_ORDER_STATUSES: &str = r#"
    CREATE TABLE IF NOT EXISTS order_statuses (
        id       INTEGER PRIMARY KEY,
        name     TEXT    NOT NULL UNIQUE,
        is_final BOOLEAN NOT NULL
    )
"#;

const CREATE_EVENTS: &str = r#"
    CREATE TABLE IF NOT EXISTS events (
        event_id        UUID        PRIMARY KEY,
        order_id        UUID        NOT NULL,
        user_id         UUID        NOT NULL,
        order_status_id INTEGER     NOT NULL REFERENCES order_statuses (id),
        created_at      TIMESTAMPTZ NOT NULL,
        updated_at      TIMESTAMPTZ NOT NULL
    )
"#;

const CREATE_EVENTS_ORDER_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS events_order_updated_idx ON events (order_id, updated_at)";

pub async fn create_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(CREATE_ORDER_STATUSES).execute(pool).await?;
    sqlx::query(CREATE_EVENTS).execute(pool).await?;
    sqlx::query(CREATE_EVENTS_ORDER_INDEX).execute(pool).await?;
    for status in OrderStatusType::ALL {
        sqlx::query("INSERT INTO order_statuses (id, name, is_final) VALUES ($1, $2, $3) ON CONFLICT (id) DO NOTHING")
            .bind(status.id())
            .bind(status.as_str())
            .bind(status.is_final())
            .execute(pool)
            .await?;
    }
    Ok(())
}
