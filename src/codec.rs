//! The encrypted message codec.
//!
//! Every chat message exchanged by the tunnel is one envelope:
//!
//! ```text
//! base64url( type tag (8 bytes, big-endian) || body )
//! ```
//!
//! For [`MessageType::Data`] the body is a sealed box addressed to the peer
//! (see [`crate::crypto::seal`]), with the header authenticated as AAD. For
//! [`MessageType::PublicKeyExchange`] the body is the sender's raw public
//! key: the server classifies first-contact messages with a header-only
//! decode, before any peer identity exists, so the handshake body travels
//! unencrypted inside the envelope.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use crate::crypto::{self, KeyPair, PublicKey, StaticSecret};
use crate::error::{Error, Result};

/// Length of the envelope type-tag header.
pub const HEADER_LEN: usize = 8;

/// The envelope type tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u64)]
pub enum MessageType {
    /// Handshake: the body is the sender's raw public key.
    PublicKeyExchange = 0,
    /// Tunnel payload: the body is a sealed box.
    Data = 1,
}

impl MessageType {
    fn from_tag(tag: u64) -> Result<Self> {
        match tag {
            0 => Ok(MessageType::PublicKeyExchange),
            1 => Ok(MessageType::Data),
            other => Err(Error::protocol(format!("unknown message type tag {other}"))),
        }
    }

    fn header(self) -> [u8; HEADER_LEN] {
        (self as u64).to_be_bytes()
    }
}

/// Packs and unpacks envelopes for one local identity and (at most) one peer.
///
/// A codec is bound to exactly one local keypair. Until the peer key is set,
/// only handshake frames can be packed; the server derives one codec per peer
/// from a shared template via [`Codec::for_peer`] instead of mutating the
/// template.
#[derive(Clone)]
pub struct Codec {
    secret: StaticSecret,
    public: PublicKey,
    peer: Option<PublicKey>,
}

impl Codec {
    /// Create a codec bound to the given local identity, with no peer yet.
    pub fn new(keys: &KeyPair) -> Self {
        Self {
            secret: keys.secret().clone(),
            public: keys.public(),
            peer: None,
        }
    }

    /// The local public key (the handshake payload).
    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    /// The peer's public key, if the handshake has completed.
    pub fn peer_key(&self) -> Option<PublicKey> {
        self.peer
    }

    /// Install the peer's public key from its raw byte form.
    pub fn set_peer_public_key(&mut self, bytes: &[u8]) -> Result<()> {
        self.peer = Some(PublicKey::from_slice(bytes)?);
        Ok(())
    }

    /// Derive an independent codec for a newly-seen peer. The template (and
    /// its local identity) is shared; the peer key is not.
    pub fn for_peer(&self, peer_key_bytes: &[u8]) -> Result<Codec> {
        let mut codec = self.clone();
        codec.set_peer_public_key(peer_key_bytes)?;
        Ok(codec)
    }

    /// Encrypt and encode one outbound envelope.
    pub fn pack(&self, ty: MessageType, plaintext: &[u8]) -> Result<String> {
        let header = ty.header();
        let mut frame = Vec::with_capacity(HEADER_LEN + plaintext.len() + crypto::SEALED_OVERHEAD);
        frame.extend_from_slice(&header);

        match ty {
            MessageType::PublicKeyExchange => frame.extend_from_slice(plaintext),
            MessageType::Data => {
                let peer = self
                    .peer
                    .ok_or_else(|| Error::Encryption("no peer public key set".into()))?;
                frame.extend_from_slice(&crypto::seal(&peer, plaintext, &header)?);
            }
        }

        Ok(URL_SAFE_NO_PAD.encode(frame))
    }

    /// Build the handshake frame announcing the local public key.
    pub fn handshake_frame(&self) -> String {
        let mut frame = MessageType::PublicKeyExchange.header().to_vec();
        frame.extend_from_slice(self.public.as_bytes());
        URL_SAFE_NO_PAD.encode(frame)
    }

    /// Decode and decrypt one inbound envelope.
    pub fn unpack(&self, encoded: &str) -> Result<(Vec<u8>, MessageType)> {
        let (ty, body, header) = decode_envelope(encoded)?;
        match ty {
            MessageType::PublicKeyExchange => Ok((body, ty)),
            MessageType::Data => {
                let plaintext = crypto::open(&self.secret, &body, &header)?;
                Ok((plaintext, ty))
            }
        }
    }

    /// Header-only decode: classify an envelope and expose its raw body
    /// without touching any key material. Used by the server to vet
    /// first-contact messages.
    pub fn peek(encoded: &str) -> Result<(MessageType, Vec<u8>)> {
        let (ty, body, _) = decode_envelope(encoded)?;
        Ok((ty, body))
    }
}

impl std::fmt::Debug for Codec {
    // Identifies the endpoint without exposing secret material.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Codec")
            .field("public", &self.public.to_base64())
            .field("peer", &self.peer.map(|k| k.to_base64()))
            .finish()
    }
}

fn decode_envelope(encoded: &str) -> Result<(MessageType, Vec<u8>, [u8; HEADER_LEN])> {
    let raw = URL_SAFE_NO_PAD
        .decode(encoded.trim())
        .map_err(|e| Error::format(format!("transport decoding failed: {e}")))?;
    if raw.len() < HEADER_LEN {
        return Err(Error::format(format!(
            "envelope shorter than header: {} < {HEADER_LEN}",
            raw.len()
        )));
    }

    let mut header = [0u8; HEADER_LEN];
    header.copy_from_slice(&raw[..HEADER_LEN]);
    let ty = MessageType::from_tag(u64::from_be_bytes(header))?;

    Ok((ty, raw[HEADER_LEN..].to_vec(), header))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linked_codecs() -> (Codec, Codec) {
        let client_keys = KeyPair::generate();
        let server_keys = KeyPair::generate();

        let mut client = Codec::new(&client_keys);
        client
            .set_peer_public_key(server_keys.public().as_bytes())
            .unwrap();

        let server = Codec::new(&server_keys)
            .for_peer(client_keys.public().as_bytes())
            .unwrap();

        (client, server)
    }

    #[test]
    fn test_data_round_trip() {
        let (client, server) = linked_codecs();

        let encoded = client.pack(MessageType::Data, b"tunnel bytes").unwrap();
        let (plain, ty) = server.unpack(&encoded).unwrap();

        assert_eq!(ty, MessageType::Data);
        assert_eq!(plain, b"tunnel bytes");
    }

    #[test]
    fn test_encoded_form_is_urlsafe_text() {
        let (client, _) = linked_codecs();
        let encoded = client.pack(MessageType::Data, &[0xffu8; 64]).unwrap();

        assert!(encoded
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_pack_without_peer_key_fails() {
        let keys = KeyPair::generate();
        let codec = Codec::new(&keys);

        assert!(matches!(
            codec.pack(MessageType::Data, b"x"),
            Err(Error::Encryption(_))
        ));
    }

    #[test]
    fn test_tamper_rejection_every_ciphertext_byte() {
        let (client, server) = linked_codecs();

        let encoded = client.pack(MessageType::Data, b"integrity matters").unwrap();
        let raw = URL_SAFE_NO_PAD.decode(&encoded).unwrap();

        for i in 0..raw.len() {
            let mut corrupted = raw.clone();
            corrupted[i] ^= 0x01;
            let reencoded = URL_SAFE_NO_PAD.encode(&corrupted);

            // Either the tag becomes unknown (header bytes) or authentication
            // fails; plaintext is never silently altered.
            match server.unpack(&reencoded) {
                Err(Error::Decryption) | Err(Error::Protocol(_)) => {}
                Ok((body, MessageType::PublicKeyExchange)) => {
                    // The one reachable non-error: the tag bit flipped to the
                    // handshake tag. The sealed body is not a plausible key,
                    // so installing it still fails.
                    assert!(PublicKey::from_slice(&body).is_err());
                }
                other => panic!("byte {i}: tampering not rejected: {other:?}"),
            }
        }
    }

    #[test]
    fn test_unpack_not_addressed_to_us_fails() {
        let (client, _) = linked_codecs();
        let stranger = Codec::new(&KeyPair::generate());

        let encoded = client.pack(MessageType::Data, b"not for you").unwrap();
        assert!(matches!(stranger.unpack(&encoded), Err(Error::Decryption)));
    }

    #[test]
    fn test_short_body_is_format_error() {
        let (_, server) = linked_codecs();

        let short = URL_SAFE_NO_PAD.encode([0u8; HEADER_LEN - 1]);
        assert!(matches!(server.unpack(&short), Err(Error::Format(_))));

        assert!(matches!(
            server.unpack("%%not-base64%%"),
            Err(Error::Format(_))
        ));
    }

    #[test]
    fn test_unknown_tag_is_protocol_error() {
        let (_, server) = linked_codecs();

        let mut frame = 7u64.to_be_bytes().to_vec();
        frame.extend_from_slice(b"whatever");
        let encoded = URL_SAFE_NO_PAD.encode(frame);

        assert!(matches!(server.unpack(&encoded), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_handshake_frame_peekable_without_keys() {
        let keys = KeyPair::generate();
        let codec = Codec::new(&keys);

        let frame = codec.handshake_frame();
        let (ty, body) = Codec::peek(&frame).unwrap();

        assert_eq!(ty, MessageType::PublicKeyExchange);
        assert_eq!(body, keys.public().as_bytes());
    }

    #[test]
    fn test_handshake_unpack_installs_nothing_by_itself() {
        let sender = Codec::new(&KeyPair::generate());
        let receiver = Codec::new(&KeyPair::generate());

        let frame = sender.handshake_frame();
        let (body, ty) = receiver.unpack(&frame).unwrap();

        assert_eq!(ty, MessageType::PublicKeyExchange);
        assert_eq!(body, sender.public_key().as_bytes());
        // Installing the key is the stream adapter's decision.
        assert!(receiver.peer_key().is_none());
    }

    #[test]
    fn test_for_peer_leaves_template_untouched() {
        let template = Codec::new(&KeyPair::generate());
        let peer_keys = KeyPair::generate();

        let derived = template.for_peer(peer_keys.public().as_bytes()).unwrap();

        assert!(template.peer_key().is_none());
        assert_eq!(derived.peer_key(), Some(peer_keys.public()));
        assert_eq!(derived.public_key(), template.public_key());
    }

    #[test]
    fn test_bad_peer_key_rejected() {
        let mut codec = Codec::new(&KeyPair::generate());
        assert!(matches!(
            codec.set_peer_public_key(&[1, 2, 3]),
            Err(Error::Parse(_))
        ));
    }
}
