//! Cryptographic primitives for the sideband transport.
//!
//! This module provides:
//! - X25519 identities with stable, re-parseable string forms
//! - A sealed-box construction (ephemeral X25519 + HKDF-SHA256 +
//!   ChaCha20-Poly1305) used by the message codec
//!
//! All secret material is zeroized on drop to prevent memory leakage.

mod keys;
mod sealed;

pub use keys::{EphemeralSecret, KeyPair, PublicKey, StaticSecret};
pub use sealed::{open, seal, SEALED_OVERHEAD};

/// Size of symmetric keys in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// Size of AEAD nonce in bytes (96 bits for ChaCha20-Poly1305)
pub const NONCE_SIZE: usize = 12;

/// Size of AEAD authentication tag in bytes (128 bits)
pub const TAG_SIZE: usize = 16;

/// Size of X25519 public keys in bytes
pub const PUBLIC_KEY_SIZE: usize = 32;
