//! Token format for sealed entry text.
//!
//! Provides version-aware parsing and serialization of the ciphertext tokens
//! stored in the `entry` column.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use tracing::debug;

use crate::error::{JournalError, Result};

pub mod v1;

/// Magic bytes identifying a sealed journal token ("DJ").
pub const MAGIC: &[u8; MAGIC_LEN] = b"DJ";
/// Length of magic bytes.
pub const MAGIC_LEN: usize = 2;
/// Length of version field.
pub const VER_LEN: usize = 1;
/// Latest format version
pub const CURRENT_VERSION: u8 = v1::VERSION_V1;

/// A parsed sealed token: version, nonce and authenticated ciphertext.
pub(crate) struct SealedToken {
    version: u8,
    nonce: Vec<u8>,
    ciphertext: Vec<u8>,
}

impl SealedToken {
    /// Creates a token at the current format version.
    pub fn new(nonce: Vec<u8>, ciphertext: Vec<u8>) -> Self {
        Self {
            version: CURRENT_VERSION,
            nonce,
            ciphertext,
        }
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn nonce(&self) -> &[u8] {
        &self.nonce
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }
}

/// Header bytes authenticated alongside the ciphertext.
pub(crate) fn associated_data(version: u8) -> [u8; MAGIC_LEN + VER_LEN] {
    [MAGIC[0], MAGIC[1], version]
}

/// Rejects a token. Every parse failure is a decryption failure to the caller.
pub(crate) fn reject<T>(reason: &str) -> Result<T> {
    debug!(reason, "sealed token rejected");
    Err(JournalError::Decryption)
}

/// Parses raw token bytes, dispatching on the version byte.
pub(crate) fn parse(data: &[u8]) -> Result<SealedToken> {
    if data.len() < MAGIC_LEN + VER_LEN {
        return reject("token too short");
    }

    if &data[..MAGIC_LEN] != MAGIC {
        return reject("invalid magic");
    }

    match data[MAGIC_LEN] {
        v1::VERSION_V1 => v1::parse(data),
        _ => reject("unsupported version"),
    }
}

pub(crate) fn serialize(token: &SealedToken) -> Result<Vec<u8>> {
    match token.version() {
        v1::VERSION_V1 => v1::serialize(token),
        _ => Err(JournalError::Encryption),
    }
}

/// Serializes and base64-encodes a token for the text column.
pub(crate) fn encode(token: &SealedToken) -> Result<String> {
    Ok(URL_SAFE_NO_PAD.encode(serialize(token)?))
}

pub(crate) fn decode(text: &str) -> Result<SealedToken> {
    match URL_SAFE_NO_PAD.decode(text.trim()) {
        Ok(data) => parse(&data),
        Err(_) => reject("token is not base64"),
    }
}
