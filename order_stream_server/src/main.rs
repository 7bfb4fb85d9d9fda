use dotenvy::dotenv;
use log::*;
use order_stream_server::{config::AppConfig, server::run_server};

#[actix_web::main]
async fn main() {
    dotenv().ok();
    env_logger::init();
    let config = AppConfig::load();
    info!("🚀️ Starting order event stream server on port {}", config.http_server.port);
    match run_server(config).await {
        Ok(_) => println!("Bye!"),
        Err(e) => eprintln!("{e}"),
    }
}
