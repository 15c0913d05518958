//! XChaCha20-Poly1305 frame codec
//!
//! Every frame is self-contained:
//!
//! ```text
//! [ nonce (24) | ciphertext (n) | tag (16) ]
//! ```
//!
//! The nonce is drawn from the OS RNG per frame. With a 192-bit nonce, random
//! generation is safe for the lifetime of a pre-shared key, so no counter state
//! is kept and the codec can be cloned and shared across tasks.

use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit},
};
use rand::{RngCore, rngs::OsRng};

use super::keys::PresharedKey;
use crate::core::{AEAD_NONCE_SIZE, CodecError, MIN_FRAME_SIZE};

/// One encrypted wire-level message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedFrame(Vec<u8>);

impl EncryptedFrame {
    /// Get the frame bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume the frame, returning its bytes.
    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }

    /// Frame length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the frame is empty (never true for codec output).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for EncryptedFrame {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for EncryptedFrame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Symmetric text codec bound to one pre-shared key.
#[derive(Debug, Clone)]
pub struct Codec {
    key: PresharedKey,
}

impl Codec {
    /// Create a codec for the given key.
    pub fn new(key: PresharedKey) -> Self {
        Self { key }
    }

    /// Encrypt a UTF-8 payload into a fresh frame.
    pub fn encrypt(&self, plaintext: &str) -> Result<EncryptedFrame, CodecError> {
        let cipher = XChaCha20Poly1305::new(self.key.as_bytes().into());

        let mut nonce = [0u8; AEAD_NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = cipher
            .encrypt(XNonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|_| CodecError::EncryptionFailed)?;

        let mut frame = Vec::with_capacity(AEAD_NONCE_SIZE + ciphertext.len());
        frame.extend_from_slice(&nonce);
        frame.extend_from_slice(&ciphertext);
        Ok(EncryptedFrame(frame))
    }

    /// Authenticate and decrypt a frame.
    ///
    /// Anything that was not produced by [`Codec::encrypt`] under the same key
    /// fails with [`CodecError::AuthenticationFailed`].
    pub fn decrypt(&self, frame: &[u8]) -> Result<String, CodecError> {
        if frame.len() < MIN_FRAME_SIZE {
            return Err(CodecError::AuthenticationFailed);
        }

        let (nonce, ciphertext) = frame.split_at(AEAD_NONCE_SIZE);
        let cipher = XChaCha20Poly1305::new(self.key.as_bytes().into());

        let plaintext = cipher
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|_| CodecError::AuthenticationFailed)?;

        String::from_utf8(plaintext).map_err(|_| CodecError::InvalidUtf8)
    }
}
