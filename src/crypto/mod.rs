//! Security layer
//!
//! A single pre-shared key drives an XChaCha20-Poly1305 codec. There is no
//! handshake and no key rotation: the key is loaded once at startup and the
//! [`Codec`] is shared by every task that needs it.

mod codec;
mod keys;

pub use codec::{Codec, EncryptedFrame};
pub use keys::PresharedKey;
