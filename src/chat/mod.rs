//! Chat-provider transport: the only way bytes leave or enter the tunnel.
//!
//! The provider offers a discrete message API, not a socket: one text blob
//! per send, and a long-poll fetch returning batches of room events. The
//! stream layers above depend on the two narrow capabilities defined here,
//! never on the concrete HTTP client, so tests can substitute an in-memory
//! transport.

pub mod api;
mod client;
mod poll;

pub use client::{ChatClient, DEFAULT_API_BASE_URL};
pub use poll::{spawn_event_feed, FetchCursor, MAX_FETCH_RETRIES};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

/// One inbound text message, attributed to its chat room.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatEvent {
    /// Provider identifier of the room the message arrived in.
    pub room_id: String,
    /// Raw message text (an encoded envelope, as far as this layer knows).
    pub text: String,
}

/// Receiving end of an event feed. A `None` from the channel means the feed
/// terminated; an `Err` item is the feed's single terminal error.
pub type EventReceiver = mpsc::Receiver<Result<ChatEvent>>;

/// Sending end of a per-room event queue.
pub type EventSender = mpsc::Sender<Result<ChatEvent>>;

/// Capability to deliver one text message to one room.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send_message(&self, room_id: &str, text: &str) -> Result<()>;
}

/// Capability to execute one long-poll fetch against a cursor URL.
#[async_trait]
pub trait EventFetcher: Send + Sync {
    async fn fetch_events(&self, url: &str) -> Result<api::FetchResponse>;
}
