//! Client-side tunnel wiring.
//!
//! One chat room carries one multiplexed connection to the server. Each
//! local TCP connection accepted on the proxy address becomes one logical
//! stream; the server terminates SOCKS5 on the far end.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::compat::{FuturesAsyncReadCompatExt, TokioAsyncReadCompatExt};
use tokio_util::sync::CancellationToken;

use crate::chat::{spawn_event_feed, ChatClient};
use crate::codec::Codec;
use crate::config::ClientConfig;
use crate::crypto::{KeyPair, PublicKey};
use crate::error::Result;
use crate::transport::{mux, MessageStream};

/// Run the client tunnel until cancellation.
///
/// Sends the handshake frame before any proxy traffic so the server can
/// establish the session from the first message it sees.
pub async fn run(config: ClientConfig, keys: KeyPair, cancel: CancellationToken) -> Result<()> {
    let chat = Arc::new(ChatClient::new(
        config.chat.api_base_url.clone(),
        config.chat.token.clone(),
    )?);
    let server_key = PublicKey::from_base64(&config.server_public_key)?;

    let mut codec = Codec::new(&keys);
    codec.set_peer_public_key(server_key.as_bytes())?;

    let feed = spawn_event_feed(
        chat.clone(),
        chat.initial_fetch_url()?,
        Some(config.chat.room_id.clone()),
        cancel.child_token(),
    );
    let stream = MessageStream::new(
        config.chat.room_id.clone(),
        chat,
        codec,
        feed,
        cancel.child_token(),
    );

    stream.send_handshake().await?;
    tracing::info!(room = %config.chat.room_id, "handshake sent, tunnel carrier up");

    let mux = mux::connect(stream.into_io().compat(), cancel.child_token());

    let listener = TcpListener::bind(&config.proxy_listen_addr).await?;
    tracing::info!(addr = %config.proxy_listen_addr, "socks5 proxy listening");

    loop {
        let (tcp, peer) = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            accepted = listener.accept() => accepted?,
        };
        let mux = mux.clone();
        tokio::spawn(async move {
            let logical = match mux.open_stream().await {
                Ok(logical) => logical,
                Err(e) => {
                    tracing::warn!(%peer, "cannot open logical stream: {e}");
                    return;
                }
            };
            let mut tcp = tcp;
            let mut logical = logical.compat();
            match tokio::io::copy_bidirectional(&mut tcp, &mut logical).await {
                Ok((up, down)) => tracing::debug!(%peer, up, down, "proxy connection closed"),
                Err(e) => tracing::debug!(%peer, "proxy connection ended: {e}"),
            }
        });
    }
}
