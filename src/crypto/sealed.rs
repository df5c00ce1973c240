//! Sealed-box asymmetric authenticated encryption.
//!
//! Each message is encrypted to the recipient's static X25519 key with a
//! fresh ephemeral keypair: the symmetric key is HKDF-SHA256 over the DH
//! shared secret, and the payload is sealed with ChaCha20-Poly1305. Because
//! every message gets its own key, the AEAD nonce is a constant zero.
//!
//! Output layout: `ephemeral_public (32) || ciphertext || tag (16)`.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::crypto::{EphemeralSecret, PublicKey, StaticSecret, KEY_SIZE, PUBLIC_KEY_SIZE, TAG_SIZE};
use crate::error::{Error, Result};

/// Bytes added on top of the plaintext by [`seal`].
pub const SEALED_OVERHEAD: usize = PUBLIC_KEY_SIZE + TAG_SIZE;

const SEAL_INFO: &[u8] = b"sideband-seal-v1";

/// Encrypt `plaintext` so that only the holder of `recipient`'s secret key
/// can read it. `aad` is authenticated but not encrypted.
pub fn seal(recipient: &PublicKey, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    let ephemeral = EphemeralSecret::random();
    let ephemeral_public = PublicKey::from(&ephemeral);

    let mut shared = ephemeral.diffie_hellman(recipient);
    let mut key = derive_key(&shared, &ephemeral_public, recipient)?;
    shared.zeroize();

    let cipher = ChaCha20Poly1305::new((&key).into());
    let ciphertext = cipher
        .encrypt(
            &Nonce::default(),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| Error::Encryption("aead sealing failed".into()))?;
    key.zeroize();

    let mut out = Vec::with_capacity(PUBLIC_KEY_SIZE + ciphertext.len());
    out.extend_from_slice(ephemeral_public.as_bytes());
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt a sealed message with the recipient's static secret key.
///
/// Fails with [`Error::Format`] if the input is shorter than the sealed-box
/// overhead, and [`Error::Decryption`] on any authentication failure.
pub fn open(secret: &StaticSecret, sealed: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < SEALED_OVERHEAD {
        return Err(Error::format(format!(
            "sealed body too short: {} < {SEALED_OVERHEAD}",
            sealed.len()
        )));
    }

    let ephemeral_public = PublicKey::from_slice(&sealed[..PUBLIC_KEY_SIZE])?;
    let recipient = PublicKey::from(secret);

    let mut shared = secret.diffie_hellman(&ephemeral_public);
    let mut key = derive_key(&shared, &ephemeral_public, &recipient)?;
    shared.zeroize();

    let cipher = ChaCha20Poly1305::new((&key).into());
    let plaintext = cipher
        .decrypt(
            &Nonce::default(),
            Payload {
                msg: &sealed[PUBLIC_KEY_SIZE..],
                aad,
            },
        )
        .map_err(|_| Error::Decryption);
    key.zeroize();

    plaintext
}

/// Derive the per-message AEAD key. The salt binds both public keys so a
/// ciphertext cannot be re-targeted at another recipient.
fn derive_key(
    shared: &[u8; 32],
    ephemeral_public: &PublicKey,
    recipient: &PublicKey,
) -> Result<[u8; KEY_SIZE]> {
    let mut salt = [0u8; PUBLIC_KEY_SIZE * 2];
    salt[..PUBLIC_KEY_SIZE].copy_from_slice(ephemeral_public.as_bytes());
    salt[PUBLIC_KEY_SIZE..].copy_from_slice(recipient.as_bytes());

    let hkdf = Hkdf::<Sha256>::new(Some(&salt), shared);
    let mut key = [0u8; KEY_SIZE];
    hkdf.expand(SEAL_INFO, &mut key)
        .map_err(|_| Error::Encryption("hkdf expansion failed".into()))?;
    Ok(key)
}
