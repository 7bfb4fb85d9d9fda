use std::time::Duration;

use actix::{Actor, Addr};
use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use log::*;
use order_stream_engine::{EventDatabase, EventFlowApi, OrderQueryApi, PostgresDatabase};

use crate::{
    broker::{EventBroker, Shutdown},
    config::AppConfig,
    errors::ServerError,
    routes::{health, GetOrdersRoute, IngestEventRoute, StreamEventsRoute},
    session::StreamSettings,
};

const MAX_DB_CONNECTIONS: u32 = 25;

/// How long in-flight responses get to finish once shutdown starts.
const SHUTDOWN_GRACE_SECS: u64 = 5;

pub async fn run_server(config: AppConfig) -> Result<(), ServerError> {
    let url = config.postgres.connection_url();
    let db = PostgresDatabase::new_with_url(&url, MAX_DB_CONNECTIONS)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.create_schema().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let broker = EventBroker::default().start();
    let srv = create_server_instance(&config, db, broker.clone())?;
    let result = srv.await.map_err(|e| ServerError::Unspecified(e.to_string()));
    // Drain the broker so lingering sessions observe end-of-stream
    if broker.send(Shutdown).await.is_err() {
        warn!("🚀️ The broker was already gone at shutdown");
    }
    result
}

pub fn create_server_instance<B>(
    config: &AppConfig,
    db: B,
    broker: Addr<EventBroker>,
) -> Result<Server, ServerError>
where
    B: EventDatabase + Send + 'static,
{
    let port = config.http_server.port;
    let srv = HttpServer::new(move || {
        let event_api = EventFlowApi::new(db.clone());
        let query_api = OrderQueryApi::new(db.clone());
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("order_stream"))
            .app_data(web::Data::new(event_api))
            .app_data(web::Data::new(query_api))
            .app_data(web::Data::new(broker.clone()))
            .app_data(web::Data::new(StreamSettings::default()))
            .service(health)
            .service(IngestEventRoute::<B>::new())
            .service(StreamEventsRoute::<B>::new())
            .service(GetOrdersRoute::<B>::new())
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .shutdown_timeout(SHUTDOWN_GRACE_SECS)
    .bind(("0.0.0.0", port))?
    .run();
    Ok(srv)
}
