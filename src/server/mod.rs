//! The server side: one shared event feed, one session per chat room.
//!
//! A single task owns the room table and routes every inbound event; no
//! other task touches the table, so it needs no lock. Each session gets its
//! own capacity-1 queue, stream adapter, multiplexer endpoint and SOCKS5
//! engine; one misbehaving room can never disturb another.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use fast_socks5::server::DenyAuthentication;
use tokio::sync::mpsc;
use tokio_util::compat::{FuturesAsyncReadCompatExt, TokioAsyncReadCompatExt};
use tokio_util::sync::CancellationToken;

use crate::chat::{ChatEvent, EventReceiver, EventSender, MessageSender};
use crate::codec::{Codec, MessageType};
use crate::crypto::KeyPair;
use crate::error::Result;
use crate::transport::{mux, MessageStream};

/// Ceiling on waiting for a stalled session to take an event. Backpressure
/// is the point of the capacity-1 queue; this only guards a consumer that
/// stopped reading entirely.
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(600);

/// Routes inbound chat events to per-room sessions.
///
/// The first frame from an unknown room must be a key-exchange frame; it is
/// consumed here (header-only decode, no decryption) and yields a new
/// [`MessageStream`] for the caller to attach. Anything else from an unknown
/// room is discarded without allocating state, so strangers cannot fill the
/// table.
pub struct SessionDemux<S: MessageSender> {
    sender: Arc<S>,
    template: Codec,
    rooms: HashMap<String, EventSender>,
    cancel: CancellationToken,
}

impl<S: MessageSender + 'static> SessionDemux<S> {
    /// Build a demultiplexer around the server identity and message sender.
    pub fn new(sender: Arc<S>, keys: &KeyPair, cancel: CancellationToken) -> Self {
        Self {
            sender,
            template: Codec::new(keys),
            rooms: HashMap::new(),
            cancel,
        }
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.rooms.len()
    }

    /// Route one event. Returns a new session's stream when the event was a
    /// valid first contact; `None` otherwise.
    pub async fn dispatch(&mut self, event: ChatEvent) -> Option<(String, MessageStream<S>)> {
        if let Some(queue) = self.rooms.get(&event.room_id) {
            let room_id = event.room_id.clone();
            match tokio::time::timeout(DELIVERY_TIMEOUT, queue.send(Ok(event))).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => {
                    tracing::info!(room = %room_id, "session consumer gone, removing");
                    self.rooms.remove(&room_id);
                }
                Err(_) => {
                    tracing::warn!(room = %room_id, "session stalled, dropping event");
                }
            }
            return None;
        }

        // First contact. Classify without any key material.
        let (ty, body) = match Codec::peek(&event.text) {
            Ok(peeked) => peeked,
            Err(e) => {
                tracing::debug!(room = %event.room_id, "undecodable first frame: {e}");
                return None;
            }
        };
        if ty != MessageType::PublicKeyExchange {
            tracing::warn!(room = %event.room_id, "first frame is not a key exchange, ignoring room");
            return None;
        }
        let codec = match self.template.for_peer(&body) {
            Ok(codec) => codec,
            Err(e) => {
                tracing::warn!(room = %event.room_id, "bad handshake key: {e}");
                return None;
            }
        };

        let (tx, rx) = mpsc::channel(1);
        let stream = MessageStream::new(
            event.room_id.clone(),
            self.sender.clone(),
            codec,
            rx,
            self.cancel.child_token(),
        );
        self.rooms.insert(event.room_id.clone(), tx);
        Some((event.room_id, stream))
    }
}

/// The long-running server: feed in, SOCKS5 sessions out.
pub struct TunnelServer<S: MessageSender + 'static> {
    demux: SessionDemux<S>,
    cancel: CancellationToken,
}

impl<S: MessageSender + 'static> TunnelServer<S> {
    pub fn new(sender: Arc<S>, keys: &KeyPair, cancel: CancellationToken) -> Self {
        let demux = SessionDemux::new(sender, keys, cancel.clone());
        Self { demux, cancel }
    }

    /// Consume the shared event feed until it ends or cancellation fires.
    ///
    /// The shared feed is the server's only input; its terminal error is
    /// fatal and propagated. Per-session failures are logged and contained.
    pub async fn run(mut self, mut feed: EventReceiver) -> Result<()> {
        loop {
            let event = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                event = feed.recv() => event,
            };
            match event {
                None => return Ok(()),
                Some(Err(e)) => {
                    tracing::error!("shared event feed failed: {e}");
                    return Err(e);
                }
                Some(Ok(event)) => {
                    if let Some((room, stream)) = self.demux.dispatch(event).await {
                        tracing::info!(room = %room, sessions = self.demux.session_count(),
                            "tunnel session established");
                        spawn_session(room, stream);
                    }
                }
            }
        }
    }
}

/// Attach the multiplexer and SOCKS5 engine to a fresh session stream.
fn spawn_session<S: MessageSender + 'static>(room: String, stream: MessageStream<S>) {
    // The stream's own token ends the whole session when either pump dies.
    let io = stream.into_io();
    let session_cancel = CancellationToken::new();
    let mut accepted = mux::accept_streams(io.compat(), session_cancel.clone());

    tokio::spawn(async move {
        let config = Arc::new(fast_socks5::server::Config::<DenyAuthentication>::default());
        while let Some(logical) = accepted.recv().await {
            let config = config.clone();
            let room = room.clone();
            tokio::spawn(async move {
                let socket = fast_socks5::server::Socks5Socket::new(logical.compat(), config);
                match socket.upgrade_to_socks5().await {
                    Ok(_) => tracing::debug!(room = %room, "proxy connection finished"),
                    Err(e) => tracing::debug!(room = %room, "proxy connection failed: {e}"),
                }
            });
        }
        session_cancel.cancel();
    });
}
