//! Portals Game Server
//!
//! Reads configuration from the environment, builds the board and starts
//! the WebSocket server. `RUST_LOG` controls log output (default `info`).

use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use portals::{GameConfig, GameHub, GameServer, ServerConfig, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Portals Server v{}", VERSION);

    let game_config = GameConfig::from_env().context("invalid game configuration")?;
    let server_config = ServerConfig::from_env().context("invalid server configuration")?;

    info!(
        "Board {}x{}, up to {} portals, dice {}..={}",
        game_config.board_dim,
        game_config.board_dim,
        game_config.max_portals,
        game_config.dice_min,
        game_config.dice_max,
    );

    let hub = Arc::new(GameHub::from_config(&game_config).context("failed to build game")?);
    let server = Arc::new(GameServer::new(server_config, hub));

    let signal_server = server.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_server.shutdown();
        }
    });

    server.run().await?;
    info!("Server stopped");
    Ok(())
}
