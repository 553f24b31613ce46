use chacha20poly1305::{
    Key as AeadKey, XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit, Payload},
};
use zeroize::Zeroizing;

use super::{Key, NONCE_LEN, secure_random};
use crate::error::{JournalError, Result};
use crate::format::{self, SealedToken};

/// Authenticated cipher for entry text, bound to one key.
///
/// Every `seal` draws a fresh nonce, so equal plaintexts never produce equal
/// tokens. `open` fails closed on a wrong key or any tampering.
pub struct Cipher {
    key: Key,
}

impl Cipher {
    pub fn new(key: Key) -> Self {
        Self { key }
    }

    fn aead(&self) -> XChaCha20Poly1305 {
        XChaCha20Poly1305::new(AeadKey::from_slice(self.key.as_bytes()))
    }

    /// Encrypt plaintext into a self-describing text token
    pub fn seal(&self, plaintext: &[u8]) -> Result<String> {
        let mut nonce = [0u8; NONCE_LEN];
        secure_random(&mut nonce)?;

        let aad = format::associated_data(format::CURRENT_VERSION);
        let ciphertext = self
            .aead()
            .encrypt(
                XNonce::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad: &aad,
                },
            )
            .map_err(|_| JournalError::Encryption)?;

        format::encode(&SealedToken::new(nonce.to_vec(), ciphertext))
    }

    /// Decrypt a token produced by [`Cipher::seal`]
    pub fn open(&self, token: &str) -> Result<Zeroizing<Vec<u8>>> {
        let token = format::decode(token)?;

        let aad = format::associated_data(token.version());
        let plaintext = self
            .aead()
            .decrypt(
                XNonce::from_slice(token.nonce()),
                Payload {
                    msg: token.ciphertext(),
                    aad: &aad,
                },
            )
            .map_err(|_| JournalError::Decryption)?;

        Ok(Zeroizing::new(plaintext))
    }

    pub fn seal_text(&self, text: &str) -> Result<String> {
        self.seal(text.as_bytes())
    }

    pub fn open_text(&self, token: &str) -> Result<Zeroizing<String>> {
        let bytes = self.open(token)?;
        let text = std::str::from_utf8(&bytes).map_err(|_| JournalError::Decryption)?;
        Ok(Zeroizing::new(text.to_owned()))
    }
}
