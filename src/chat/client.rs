//! HTTP client for the chat provider.
//!
//! Outbound messages go through a form-encoded POST; inbound messages come
//! from a long-poll GET that the provider holds open for up to 30 seconds.
//! Timeouts are sized for long-poll semantics, not interactive requests.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ORIGIN, REFERER, USER_AGENT};
use reqwest::Url;

use crate::chat::api::{self, FetchResponse, RequestIdKind};
use crate::chat::{EventFetcher, MessageSender};
use crate::error::{Error, Result};

/// Default API base of the chat provider.
pub const DEFAULT_API_BASE_URL: &str = "https://u.icq.net/api/v78";

const SEND_PATH: &str = "wim/im/sendIM";
const FETCH_PATH: &str = "bos/bos-k035b/aim/fetchEvents";

/// Server-side hold time requested for each long-poll, in milliseconds.
const FETCH_TIMEOUT_MS: u64 = 30_000;

/// Whole-request ceiling; must comfortably exceed the long-poll hold time.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Browser-like identity; the provider rejects obviously non-browser
/// clients on some endpoints.
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/101.0.4951.67 Safari/537.36";

/// Authenticated client for one chat account.
pub struct ChatClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl ChatClient {
    /// Build a client for the given API base and auth token.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        headers.insert(ORIGIN, HeaderValue::from_static("https://web.icq.com"));
        headers.insert(REFERER, HeaderValue::from_static("https://web.icq.com/"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            token: token.into(),
        })
    }

    /// The URL a fresh fetch cursor starts from (and resets to on failure).
    pub fn initial_fetch_url(&self) -> Result<String> {
        let mut url = Url::parse(&format!("{}/{}", self.base_url, FETCH_PATH))
            .map_err(|e| Error::parse(format!("invalid api base url: {e}")))?;
        url.query_pairs_mut()
            .append_pair("timeout", &FETCH_TIMEOUT_MS.to_string())
            .append_pair("aimsid", &self.token)
            .append_pair("rnd", &api::request_id(RequestIdKind::Fetch));
        Ok(url.into())
    }
}

#[async_trait]
impl MessageSender for ChatClient {
    async fn send_message(&self, room_id: &str, text: &str) -> Result<()> {
        let url = format!("{}/{}", self.base_url, SEND_PATH);
        let form = [
            ("t", room_id),
            ("r", &api::request_id(RequestIdKind::Shared)),
            ("mentions", ""),
            ("message", text),
            ("f", "json"),
            ("aimsid", &self.token),
        ];

        let response = self.http.post(url).form(&form).send().await?;
        if !response.status().is_success() {
            return Err(Error::Api(response.status().as_u16()));
        }
        Ok(())
    }
}

#[async_trait]
impl EventFetcher for ChatClient {
    async fn fetch_events(&self, url: &str) -> Result<FetchResponse> {
        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            return Err(Error::Api(response.status().as_u16()));
        }
        Ok(response.json::<FetchResponse>().await?)
    }
}
