//! Cryptographic primitives for the journal.
//!
//! Provides the entry key, passphrase derivation, and the authenticated
//! cipher that seals entry text.

pub mod aead;
pub mod kdf;
pub mod key;

pub use aead::Cipher;
pub use kdf::{KdfParams, derive_key_from_passphrase, derive_key_with_params};
pub use key::Key;

use crate::error::{JournalError, Result};

/// Length of the nonce (24 bytes for XChaCha20-Poly1305).
pub const NONCE_LEN: usize = 24;
/// Length of the Poly1305 authentication tag.
pub const TAG_LEN: usize = 16;
/// Length of the encryption key (32 bytes / 256 bits).
pub const KEY_LEN: usize = 32;
/// Salt for passphrase derivation. Fixed so the passphrase alone reproduces the key.
pub const PASSPHRASE_SALT: &[u8] = b"diarium.passphrase-key.v1";

/// Fill buffer with cryptographically secure random bytes
pub(crate) fn secure_random(buf: &mut [u8]) -> Result<()> {
    getrandom::fill(buf).map_err(|_| JournalError::RandomUnavailable)
}
