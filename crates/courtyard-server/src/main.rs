use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;

mod auth;
mod config;
mod server;
mod store;
mod telemetry;

pub use config::ServerConfig;

/// Courtyard community portal chat server.
#[derive(Debug, Parser)]
#[command(name = "courtyard-server", version, about)]
struct Args {
    /// Override the bind address from COURTYARD_BIND_ADDR.
    #[arg(long)]
    bind: Option<std::net::SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init()?;

    let args = Args::parse();

    info!("Courtyard Server starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("License: AGPL-3.0");

    let mut server_config = ServerConfig::from_env();
    if let Some(bind) = args.bind {
        server_config.bind_addr = bind;
    }
    server_config.log_config();

    // With the dev secret there is no session layer minting tokens, so
    // print one for connecting a local client.
    if server_config.is_dev_secret() {
        let token = auth::issue_token(
            &server_config.token_secret,
            "dev@localhost",
            "Dev",
            None,
            24 * 3600,
        )?;
        info!("Development WebSocket token (valid 24h): {}", token);
    }

    let listener = tokio::net::TcpListener::bind(server_config.bind_addr).await?;
    info!(addr = %server_config.bind_addr, "Bound HTTP listener");

    let state = Arc::new(server::AppState::new(server_config));
    server::start(state, listener).await?;

    Ok(())
}
