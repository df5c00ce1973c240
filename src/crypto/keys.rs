//! X25519 identity keys.
//!
//! Provides type-safe wrappers around X25519 operations with automatic
//! zeroization of secret material on drop. Public and secret keys carry
//! stable base64 (URL-safe, unpadded) string forms suitable for config
//! files; secret material is never printed by `Debug` or logs.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use x25519_dalek::{
    EphemeralSecret as DalekEphemeral, PublicKey as DalekPublic, StaticSecret as DalekStatic,
};
use zeroize::ZeroizeOnDrop;

use crate::crypto::PUBLIC_KEY_SIZE;
use crate::error::{Error, Result};

/// An ephemeral (single-use) X25519 secret key.
///
/// Generated fresh for every sealed message; consumed by the key agreement.
pub struct EphemeralSecret(DalekEphemeral);

impl EphemeralSecret {
    /// Generate a new random ephemeral secret.
    pub fn random() -> Self {
        Self(DalekEphemeral::random_from_rng(OsRng))
    }

    /// Perform X25519 Diffie-Hellman key agreement.
    pub fn diffie_hellman(self, their_public: &PublicKey) -> [u8; 32] {
        self.0.diffie_hellman(&their_public.0).to_bytes()
    }
}

impl From<&EphemeralSecret> for PublicKey {
    fn from(secret: &EphemeralSecret) -> Self {
        PublicKey(DalekPublic::from(&secret.0))
    }
}

/// A static (long-term) X25519 secret key.
///
/// The persistent identity of one tunnel endpoint. Automatically zeroized
/// when dropped.
#[derive(Clone, ZeroizeOnDrop)]
pub struct StaticSecret(DalekStatic);

impl StaticSecret {
    /// Generate a new random static secret.
    pub fn random() -> Self {
        Self(DalekStatic::random_from_rng(OsRng))
    }

    /// Create from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(DalekStatic::from(bytes))
    }

    /// Parse from the base64 string form used in config files.
    pub fn from_base64(s: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(s.trim())
            .map_err(|e| Error::parse(format!("invalid secret key encoding: {e}")))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| Error::parse("secret key must be 32 bytes"))?;
        Ok(Self::from_bytes(arr))
    }

    /// Serialize to the base64 string form. Handle with care.
    pub fn to_base64(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0.to_bytes())
    }

    /// Perform X25519 Diffie-Hellman key agreement.
    pub fn diffie_hellman(&self, their_public: &PublicKey) -> [u8; 32] {
        self.0.diffie_hellman(&their_public.0).to_bytes()
    }
}

impl std::fmt::Debug for StaticSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticSecret(..)")
    }
}

impl From<&StaticSecret> for PublicKey {
    fn from(secret: &StaticSecret) -> Self {
        PublicKey(DalekPublic::from(&secret.0))
    }
}

/// An X25519 public key.
///
/// Safe to share publicly; identifies a tunnel endpoint to its peers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PublicKey(DalekPublic);

impl PublicKey {
    /// Create from raw bytes.
    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self(DalekPublic::from(bytes))
    }

    /// Create from an arbitrary-length slice, validating the length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; PUBLIC_KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| Error::parse(format!("public key must be {PUBLIC_KEY_SIZE} bytes")))?;
        Ok(Self::from_bytes(arr))
    }

    /// Parse from the base64 string form.
    pub fn from_base64(s: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(s.trim())
            .map_err(|e| Error::parse(format!("invalid public key encoding: {e}")))?;
        Self::from_slice(&bytes)
    }

    /// Serialize to the base64 string form.
    pub fn to_base64(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0.as_bytes())
    }

    /// Get the raw bytes of this public key.
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        self.0.as_bytes()
    }
}

impl AsRef<[u8]> for PublicKey {
    fn as_ref(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl std::fmt::Display for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_base64())
    }
}

/// A long-term identity: static secret plus its public half.
#[derive(Clone)]
pub struct KeyPair {
    secret: StaticSecret,
}

impl KeyPair {
    /// Generate a fresh identity.
    pub fn generate() -> Self {
        Self {
            secret: StaticSecret::random(),
        }
    }

    /// Restore an identity from its serialized secret key.
    pub fn from_secret_base64(s: &str) -> Result<Self> {
        Ok(Self {
            secret: StaticSecret::from_base64(s)?,
        })
    }

    /// The secret half.
    pub fn secret(&self) -> &StaticSecret {
        &self.secret
    }

    /// The public half.
    pub fn public(&self) -> PublicKey {
        PublicKey::from(&self.secret)
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public().to_base64())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_agreement() {
        let alice = StaticSecret::random();
        let alice_public = PublicKey::from(&alice);

        let bob = StaticSecret::random();
        let bob_public = PublicKey::from(&bob);

        let alice_shared = alice.diffie_hellman(&bob_public);
        let bob_shared = bob.diffie_hellman(&alice_public);

        assert_eq!(alice_shared, bob_shared);
    }

    #[test]
    fn test_ephemeral_key_agreement() {
        let server = StaticSecret::random();
        let server_public = PublicKey::from(&server);

        let eph = EphemeralSecret::random();
        let eph_public = PublicKey::from(&eph);

        let client_shared = eph.diffie_hellman(&server_public);
        let server_shared = server.diffie_hellman(&eph_public);

        assert_eq!(client_shared, server_shared);
    }

    #[test]
    fn test_public_key_string_round_trip() {
        let pair = KeyPair::generate();
        let public = pair.public();

        let encoded = public.to_base64();
        let restored = PublicKey::from_base64(&encoded).unwrap();

        assert_eq!(public, restored);
    }

    #[test]
    fn test_secret_key_string_round_trip() {
        let secret = StaticSecret::random();
        let restored = StaticSecret::from_base64(&secret.to_base64()).unwrap();

        assert_eq!(PublicKey::from(&secret), PublicKey::from(&restored));
    }

    #[test]
    fn test_bad_key_strings_rejected() {
        assert!(PublicKey::from_base64("not!!base64").is_err());
        // Valid base64 but wrong length.
        assert!(PublicKey::from_base64("AAEC").is_err());
        assert!(StaticSecret::from_base64("AAEC").is_err());
    }

    #[test]
    fn test_secret_never_in_debug_output() {
        let pair = KeyPair::generate();
        let debug = format!("{:?} {:?}", pair, pair.secret());
        assert!(!debug.contains(&pair.secret().to_base64()));
    }
}
