//! Pre-shared key management
//!
//! Keys travel as URL-safe base64 strings (44 characters with padding), the
//! same shape as the key strings already deployed with older relay builds.

use std::fmt;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use rand::{RngCore, rngs::OsRng};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::core::{CodecError, KEY_SIZE, RelayError};

/// The symmetric key shared by client and server.
///
/// Zeroized on drop. `Debug` never prints key material.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PresharedKey {
    key: [u8; KEY_SIZE],
}

impl PresharedKey {
    /// Generate a new random key.
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut key);
        Self { key }
    }

    /// Create a key from raw bytes.
    pub fn from_bytes(key: [u8; KEY_SIZE]) -> Self {
        Self { key }
    }

    /// Decode a URL-safe base64 key string. Surrounding whitespace is ignored.
    pub fn from_base64(encoded: &str) -> Result<Self, CodecError> {
        let mut decoded = URL_SAFE
            .decode(encoded.trim())
            .map_err(|e| CodecError::InvalidKey(e.to_string()))?;

        if decoded.len() != KEY_SIZE {
            let len = decoded.len();
            decoded.zeroize();
            return Err(CodecError::InvalidKey(format!(
                "expected {KEY_SIZE} bytes, got {len}"
            )));
        }

        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&decoded);
        decoded.zeroize();
        Ok(Self { key })
    }

    /// Read a base64 key from a file (first non-empty line).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RelayError> {
        let path = path.as_ref();
        let mut contents = std::fs::read_to_string(path)?;
        let result = contents
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .ok_or_else(|| RelayError::Config(format!("key file {} is empty", path.display())))
            .and_then(|line| Self::from_base64(line).map_err(RelayError::from));
        contents.zeroize();
        result
    }

    /// Encode the key as URL-safe base64.
    pub fn to_base64(&self) -> String {
        URL_SAFE.encode(self.key)
    }

    /// Get the raw key bytes.
    ///
    /// # Security
    /// Handle with care - this exposes sensitive key material.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }
}

impl fmt::Debug for PresharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PresharedKey([redacted])")
    }
}
