//! Sideband Server Binary
//!
//! Usage: sideband-server [OPTIONS]
//!
//! Options:
//!   -c, --config <FILE>  Path to configuration file (default: config_server.json)
//!   -h, --help           Print help information

use std::env;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use sideband::chat::{spawn_event_feed, ChatClient};
use sideband::config::{ServerConfig, DEFAULT_SERVER_CONFIG};
use sideband::server::TunnelServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing — respects RUST_LOG env var (e.g. RUST_LOG=debug)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args: Vec<String> = env::args().collect();
    let config_path = match args.get(1).map(String::as_str) {
        None => DEFAULT_SERVER_CONFIG.to_owned(),
        Some("-h") | Some("--help") => {
            print_usage();
            return Ok(());
        }
        Some("-c") | Some("--config") => match args.get(2) {
            Some(path) => path.clone(),
            None => {
                eprintln!("Error: --config requires a file path");
                return Ok(());
            }
        },
        Some(other) => {
            eprintln!("Unknown option: {other}");
            print_usage();
            return Ok(());
        }
    };

    let mut config = ServerConfig::load(&config_path)?;
    let keys = config.ensure_keys(&config_path)?;
    tracing::info!(public_key = %keys.public(), "server identity loaded");

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
            shutdown.cancel();
        }
    });

    let chat = Arc::new(ChatClient::new(
        config.chat.api_base_url.clone(),
        config.chat.token.clone(),
    )?);
    let feed = spawn_event_feed(
        chat.clone(),
        chat.initial_fetch_url()?,
        None,
        cancel.child_token(),
    );

    TunnelServer::new(chat, &keys, cancel).run(feed).await?;
    Ok(())
}

fn print_usage() {
    println!(
        r#"Sideband Server - SOCKS5 endpoint behind a chat-service tunnel

USAGE:
    sideband-server [OPTIONS]

OPTIONS:
    -c, --config <FILE>  Path to configuration file (default: {DEFAULT_SERVER_CONFIG})
    -h, --help           Print help information

CONFIGURATION FILE FORMAT (JSON):
    {{
        "private_key": "<base64, generated on first run>",
        "chat": {{
            "token": "<provider session token>"
        }}
    }}

The server's public key is logged on startup; put it in each client's
"server_public_key" field."#
    );
}
