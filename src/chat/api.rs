//! Wire types for the chat provider's HTTP API.
//!
//! Only the fields the tunnel actually consumes are modeled; the provider
//! sends plenty more. Deserialization is lenient (`default`) so schema
//! drift on unused fields cannot break the poll loop.

use rand::Rng;
use serde::Deserialize;

/// Event kind whose payload carries room messages.
pub const MESSAGE_EVENT_KIND: &str = "histDlgState";

/// Top-level envelope of a fetch response.
#[derive(Debug, Default, Deserialize)]
pub struct FetchResponse {
    pub response: FetchResponseBody,
}

#[derive(Debug, Default, Deserialize)]
pub struct FetchResponseBody {
    #[serde(rename = "statusCode", default)]
    pub status_code: u16,
    #[serde(default)]
    pub data: FetchData,
}

#[derive(Debug, Default, Deserialize)]
pub struct FetchData {
    /// Continuation URL for the next long-poll request.
    #[serde(rename = "fetchBaseURL", default)]
    pub fetch_base_url: String,
    #[serde(default)]
    pub events: Vec<FetchEvent>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FetchEvent {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(rename = "eventData", default)]
    pub data: EventData,
}

#[derive(Debug, Default, Deserialize)]
pub struct EventData {
    /// Room id the event belongs to.
    #[serde(default)]
    pub sn: String,
    #[serde(default)]
    pub messages: Vec<RoomMessage>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RoomMessage {
    /// True for messages this account sent itself.
    #[serde(default)]
    pub outgoing: bool,
    #[serde(default, alias = "Text")]
    pub text: String,
}

impl FetchResponse {
    /// The continuation URL the provider wants the next fetch to use.
    pub fn next_fetch_url(&self) -> &str {
        &self.response.data.fetch_base_url
    }

    /// All inbound (not self-originated, non-empty) messages in arrival
    /// order, as `(room_id, text)` pairs.
    pub fn inbound_messages(&self) -> impl Iterator<Item = (&str, &str)> {
        self.response
            .data
            .events
            .iter()
            .filter(|event| event.kind == MESSAGE_EVENT_KIND)
            .flat_map(|event| {
                event
                    .data
                    .messages
                    .iter()
                    .filter(|msg| !msg.outgoing && !msg.text.is_empty())
                    .map(move |msg| (event.data.sn.as_str(), msg.text.as_str()))
            })
    }
}

/// Request-id flavors the provider expects.
#[derive(Clone, Copy, Debug)]
pub enum RequestIdKind {
    /// Used by send and other POST endpoints.
    Shared,
    /// Used by the fetch long-poll.
    Fetch,
}

/// Generate a request id in the provider's two formats.
pub fn request_id(kind: RequestIdKind) -> String {
    let mut rng = rand::thread_rng();
    match kind {
        RequestIdKind::Fetch => format!(
            "{}.{}",
            rng.gen_range(0..10_000_000_000u64),
            rng.gen_range(0..100_000u64)
        ),
        RequestIdKind::Shared => format!(
            "{}-{}",
            rng.gen_range(0..100_000u64),
            rng.gen_range(0..10_000_000_000u64)
        ),
    }
}
