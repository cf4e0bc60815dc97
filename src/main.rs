//! `stranger-relay` binary: runs the chat relay until Ctrl+C.

use std::net::IpAddr;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use stranger_relay::{RelayServer, Result, ServerConfig};

#[derive(Parser)]
#[command(name = "stranger-relay")]
#[command(about = "Pairs anonymous WebSocket clients into 1:1 chats")]
struct Cli {
    /// Address to bind to
    #[arg(short = 'b', long, default_value = "0.0.0.0")]
    host: IpAddr,

    /// Port to listen on [default: $PORT, then 3001]
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_directive = if cli.debug {
        "stranger_relay=debug,info"
    } else {
        "stranger_relay=info,warn"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    let mut config = ServerConfig::from_env()?.with_ip(cli.host);
    if let Some(port) = cli.port {
        config = config.with_port(port);
    }
    let server = RelayServer::bind(config).await?;
    info!(url = %server.ws_url(), "Server is running");

    tokio::signal::ctrl_c().await?;
    server.shutdown().await;

    Ok(())
}
