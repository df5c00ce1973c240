//! # sideband
//!
//! A covert SOCKS5 tunnel carried by a third-party chat service. The chat
//! provider only offers a discrete message API (send one text blob, long-poll
//! for batches), so the crate builds an ordered byte stream on top of that
//! primitive and multiplexes proxy connections through it.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  SOCKS5 engine (server) / local TCP listener (client)   │
//! ├─────────────────────────────────────────────────────────┤
//! │  Stream multiplexer (yamux over one byte stream)        │
//! ├─────────────────────────────────────────────────────────┤
//! │  Stream adapter (ordered bytes over discrete messages)  │
//! ├─────────────────────────────────────────────────────────┤
//! │  Message codec (sealed-box AEAD, text-safe envelopes)   │
//! ├─────────────────────────────────────────────────────────┤
//! │  Chat provider HTTP API (send + long-poll fetch)        │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! The server watches every room its chat account can see and demultiplexes
//! them into independent sessions; a room's first message must announce the
//! client's public key.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

pub mod chat;
pub mod client;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod error;
pub mod server;
pub mod transport;

pub use error::{Error, Result};

/// Maximum plaintext bytes carried by one chat message.
pub const MAX_CHUNK_LEN: usize = 3000;

/// Ceiling on the encoded size of one message; anything the codec produces
/// must stay under the provider's text-length limit.
pub const MAX_ENCODED_MESSAGE_LEN: usize = 4096;
