//! Sideband Client Binary
//!
//! Usage: sideband-client [OPTIONS]
//!
//! Options:
//!   -c, --config <FILE>  Path to configuration file (default: config.json)
//!   -h, --help           Print help information

use std::env;

use tokio_util::sync::CancellationToken;

use sideband::client;
use sideband::config::{ClientConfig, DEFAULT_CLIENT_CONFIG};

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
        None => DEFAULT_CLIENT_CONFIG.to_owned(),
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

    let mut config = ClientConfig::load(&config_path)?;
    let keys = config.ensure_keys(&config_path)?;
    tracing::info!(public_key = %keys.public(), "client identity loaded");

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
            shutdown.cancel();
        }
    });

    client::run(config, keys, cancel).await?;
    Ok(())
}

fn print_usage() {
    println!(
        r#"Sideband Client - SOCKS5 proxy over a chat-service tunnel

USAGE:
    sideband-client [OPTIONS]

OPTIONS:
    -c, --config <FILE>  Path to configuration file (default: {DEFAULT_CLIENT_CONFIG})
    -h, --help           Print help information

CONFIGURATION FILE FORMAT (JSON):
    {{
        "proxy_listen_addr": "127.0.0.1:9090",
        "private_key": "<base64, generated on first run>",
        "server_public_key": "<base64>",
        "chat": {{
            "token": "<provider session token>",
            "room_id": "<room shared with the server account>"
        }}
    }}"#
    );
}
