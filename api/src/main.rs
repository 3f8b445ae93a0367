mod config;
mod domains;
mod error;
mod handler;
mod http;
mod server;

use std::{process, time::Duration};

use crate::config::Config;
use crate::server::Server;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(%err, "failed to load configuration");
            process::exit(1);
        }
    };

    let server_address = config.server_address.clone();
    let timeout = Duration::from_secs(config.timeout);
    tracing::info!(env = %config.env, "starting movies api");

    let state = AppState { config };
    let server = Server::new(state, handler::route_request).with_timeout(timeout);

    if let Err(err) = server.bind(server_address).await {
        tracing::error!(%err, "server failed");
        process::exit(1);
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
}
