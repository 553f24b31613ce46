use std::fmt;

use base64::{
    Engine as _,
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
};
use zeroize::Zeroizing;

use super::{KEY_LEN, secure_random};
use crate::error::{JournalError, Result};

/// Url-safe base64, padded on output, padding optional on input.
const KEY_TEXT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Symmetric key sealing every entry in a journal.
///
/// The bytes are wiped when the key is dropped. The textual form is
/// url-safe base64 of the 32 key bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct Key(Zeroizing<[u8; KEY_LEN]>);

impl Key {
    pub(crate) fn from_zeroizing(bytes: Zeroizing<[u8; KEY_LEN]>) -> Self {
        Self(bytes)
    }

    /// Generates a fresh random key.
    pub fn generate() -> Result<Self> {
        let mut bytes = Zeroizing::new([0u8; KEY_LEN]);
        secure_random(&mut *bytes)?;
        Ok(Self(bytes))
    }

    /// Builds a key from exactly [`KEY_LEN`] raw bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KEY_LEN {
            return Err(JournalError::InvalidKey(format!(
                "expected {KEY_LEN} key bytes, got {}",
                bytes.len()
            )));
        }
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        key.copy_from_slice(bytes);
        Ok(Self(key))
    }

    /// Parses the textual (base64) form. Surrounding whitespace is ignored.
    pub fn from_text(text: &str) -> Result<Self> {
        let decoded = KEY_TEXT
            .decode(text.trim())
            .map(Zeroizing::new)
            .map_err(|_| JournalError::InvalidKey("key text is not url-safe base64".into()))?;
        Self::from_slice(&decoded)
    }

    /// Parses key file contents: either raw key bytes or the textual form.
    pub fn from_file_bytes(data: &[u8]) -> Result<Self> {
        if data.len() == KEY_LEN {
            return Self::from_slice(data);
        }

        let text = std::str::from_utf8(data).map_err(|_| {
            JournalError::InvalidKey("key file holds neither raw key bytes nor key text".into())
        })?;
        Self::from_text(text)
    }

    pub fn to_text(&self) -> Zeroizing<String> {
        Zeroizing::new(KEY_TEXT.encode(self.0.as_slice()))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Key(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_differ() {
        let a = Key::generate().unwrap();
        let b = Key::generate().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn text_form_is_padded_base64() {
        let key = Key::from_slice(&[7u8; KEY_LEN]).unwrap();
        let text = key.to_text();

        assert_eq!(text.len(), 44);
        assert!(text.ends_with('='));
        assert_eq!(Key::from_text(&text).unwrap(), key);
    }

    #[test]
    fn text_without_padding_or_with_newline_parses() {
        let key = Key::generate().unwrap();
        let text = key.to_text();

        let unpadded = text.trim_end_matches('=');
        assert_eq!(Key::from_text(unpadded).unwrap(), key);
        assert_eq!(Key::from_text(&format!("{}\n", *text)).unwrap(), key);
    }

    #[test]
    fn raw_key_bytes_are_accepted() {
        let raw = [3u8; KEY_LEN];
        let key = Key::from_file_bytes(&raw).unwrap();
        assert_eq!(key.as_bytes(), &raw);
    }

    #[test]
    fn malformed_key_material_is_rejected() {
        assert!(matches!(
            Key::from_text("not a key!"),
            Err(JournalError::InvalidKey(_))
        ));
        assert!(matches!(
            Key::from_text("c2hvcnQ="),
            Err(JournalError::InvalidKey(_))
        ));
        assert!(Key::from_file_bytes(&[0xff; 40]).is_err());
    }

    #[test]
    fn debug_does_not_leak_bytes() {
        let key = Key::from_slice(&[0xab; KEY_LEN]).unwrap();
        assert_eq!(format!("{key:?}"), "Key(<redacted>)");
    }
}
