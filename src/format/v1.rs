//! Token format v1.
//!
//! ```text
//! MAGIC (2) | VERSION (1) | NONCE (24) | CIPHERTEXT + TAG
//! ```
//!
//! MAGIC and VERSION are also the AEAD associated data.

use super::{MAGIC, MAGIC_LEN, SealedToken, VER_LEN, reject};
use crate::crypto::{NONCE_LEN, TAG_LEN};
use crate::error::{JournalError, Result};

pub const VERSION_V1: u8 = 1;

const HEADER_LEN: usize = MAGIC_LEN + VER_LEN + NONCE_LEN;

pub(crate) fn parse(data: &[u8]) -> Result<SealedToken> {
    if data.len() < HEADER_LEN + TAG_LEN {
        return reject("token too short for v1");
    }

    let offset = MAGIC_LEN + VER_LEN;
    let nonce = data[offset..offset + NONCE_LEN].to_vec();
    let ciphertext = data[HEADER_LEN..].to_vec();

    Ok(SealedToken::new(nonce, ciphertext))
}

pub(crate) fn serialize(token: &SealedToken) -> Result<Vec<u8>> {
    if token.version() != VERSION_V1 || token.nonce().len() != NONCE_LEN {
        return Err(JournalError::Encryption);
    }

    let mut buf = Vec::with_capacity(HEADER_LEN + token.ciphertext().len());

    buf.extend_from_slice(MAGIC);
    buf.push(VERSION_V1);
    buf.extend_from_slice(token.nonce());
    buf.extend_from_slice(token.ciphertext());

    Ok(buf)
}
