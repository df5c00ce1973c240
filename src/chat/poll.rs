//! The polling message source.
//!
//! A background task owns a [`FetchCursor`] and turns repeated long-poll
//! fetches into an ordered event feed. Transient failures are retried up to
//! a fixed ceiling; the cursor deliberately resets to its initial URL on
//! every failure (the provider's replay semantics from the initial URL are
//! unknown, so this behavior is preserved rather than second-guessed).
//! After the ceiling the feed emits one terminal error and closes for good;
//! resuming requires a fresh feed with a fresh cursor.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::chat::{ChatEvent, EventFetcher, EventReceiver};
use crate::error::{Error, Result};

/// Consecutive fetch failures tolerated before the feed gives up.
pub const MAX_FETCH_RETRIES: u32 = 3;

/// Pause between failed attempts; successful long-polls pace themselves.
const RETRY_DELAY: Duration = Duration::from_secs(2);

/// Continuation state of the long-poll loop.
#[derive(Debug)]
pub struct FetchCursor {
    initial_url: String,
    url: String,
    retries: u32,
}

impl FetchCursor {
    /// Start a cursor at the given initial fetch URL.
    pub fn new(initial_url: String) -> Self {
        Self {
            url: initial_url.clone(),
            initial_url,
            retries: 0,
        }
    }

    /// URL the next fetch should hit.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Record a successful fetch: follow the continuation, forget failures.
    pub fn advance(&mut self, next_url: String) {
        self.url = next_url;
        self.retries = 0;
    }

    /// Record a failed fetch: back to the initial URL, count the failure.
    pub fn fail(&mut self) {
        self.url = self.initial_url.clone();
        self.retries += 1;
    }

    /// True once the retry ceiling is reached.
    pub fn exhausted(&self) -> bool {
        self.retries >= MAX_FETCH_RETRIES
    }
}

/// Spawn the polling task for one feed.
///
/// With `room_filter` set, only events for that room are emitted (client
/// side); without it, the feed carries every room (the server's shared
/// feed). The returned channel has capacity 1: a slow consumer stalls the
/// poll loop instead of buffering unbounded ciphertext.
pub fn spawn_event_feed<F>(
    fetcher: Arc<F>,
    initial_url: String,
    room_filter: Option<String>,
    cancel: CancellationToken,
) -> EventReceiver
where
    F: EventFetcher + 'static,
{
    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(run_feed(
        fetcher,
        FetchCursor::new(initial_url),
        room_filter,
        cancel,
        tx,
    ));
    rx
}

async fn run_feed<F>(
    fetcher: Arc<F>,
    mut cursor: FetchCursor,
    room_filter: Option<String>,
    cancel: CancellationToken,
    tx: mpsc::Sender<Result<ChatEvent>>,
) where
    F: EventFetcher + 'static,
{
    loop {
        if cancel.is_cancelled() {
            return;
        }
        if cursor.exhausted() {
            tracing::error!("event feed giving up after {MAX_FETCH_RETRIES} failed fetches");
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tx.send(Err(Error::RetriesExhausted)) => {}
            }
            return;
        }

        let fetched = tokio::select! {
            _ = cancel.cancelled() => return,
            result = fetcher.fetch_events(cursor.url()) => result,
        };

        let response = match fetched {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(attempt = cursor.retries + 1, "event fetch failed: {e}");
                cursor.fail();
                if !cursor.exhausted() {
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(RETRY_DELAY) => {}
                    }
                }
                continue;
            }
        };

        cursor.advance(response.next_fetch_url().to_owned());

        for (room_id, text) in response.inbound_messages() {
            if let Some(wanted) = room_filter.as_deref() {
                if wanted != room_id {
                    continue;
                }
            }
            let event = ChatEvent {
                room_id: room_id.to_owned(),
                text: text.to_owned(),
            };
            let delivered = tokio::select! {
                _ = cancel.cancelled() => return,
                sent = tx.send(Ok(event)) => sent.is_ok(),
            };
            if !delivered {
                // Consumer dropped the feed.
                return;
            }
        }
    }
}
