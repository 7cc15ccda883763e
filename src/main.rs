//! Trading session client entry point
//!
//! Loads configuration, opens the live channel for the configured
//! participant and runs the event loop until ctrl-c.

use std::path::Path;
use std::sync::Arc;

use tokio::signal;
use tracing::{error, info};

use trading_client::config::{self, init_logging};
use trading_client::connection::{ConnectionManager, StaticCredentials};
use trading_client::ClientRuntime;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_logging();

    let config = match config::load_config(Path::new("config.yaml")) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("configuration failed: {}", e);
            std::process::exit(1);
        }
    };

    let participant_id =
        std::env::var("TRADING_PARTICIPANT_ID").unwrap_or_else(|_| "local-dev".to_string());
    let token = std::env::var("TRADING_AUTH_TOKEN").ok();

    info!(
        participant_id,
        ws_url = %config.ws_url,
        "starting trading session client"
    );

    let connection = ConnectionManager::new(
        config.ws_url.clone(),
        config.reconnect.clone(),
        Arc::new(StaticCredentials(token)),
    );
    let (mut runtime, handle) = ClientRuntime::new(config, participant_id, connection);

    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, shutting down");
            handle.shutdown();
        }
    });

    runtime.run().await?;
    info!("client stopped");
    Ok(())
}
