use std::net::SocketAddr;

use clap::Parser;
use tracing::info;

use crate::config::{Config, StartArgs};
use crate::state::AppState;

pub mod collection;
pub mod config;
pub mod error;
pub mod files;
pub mod forward;
pub mod images;
pub mod order;
pub mod reqlog;
pub mod router;
pub mod rules;
pub mod state;
pub mod upload;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    let StartArgs {
        config_path,
        address,
        port,
        log_level,
    } = StartArgs::parse();

    tracing_subscriber::fmt().with_max_level(log_level).init();

    let config = Config::load(&config_path);
    let state = AppState::new(config).expect("error while initializing state");

    let addr = format!("{address}:{port}");

    info!("Now listening on {addr}");
    info!("Upload directory: {}", state.config.upload_dir.display());

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("error while starting TCP listener");

    let router = router::router(state);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("error while starting server");
}
