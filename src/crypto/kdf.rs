use argon2::{Algorithm, Argon2, Params, Version};
use zeroize::Zeroizing;

use super::{KEY_LEN, Key, PASSPHRASE_SALT};
use crate::error::{JournalError, Result};

/// Argon2id cost parameters for passphrase derivation.
///
/// The same passphrase only reproduces the same key under the same
/// parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    mem_cost_kib: u32,
    time_cost: u32,
    parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            mem_cost_kib: 64 * 1024, // 64 MiB
            time_cost: 3,
            parallelism: 1,
        }
    }
}

impl KdfParams {
    pub fn new(mem_cost_kib: u32, time_cost: u32, parallelism: u32) -> Result<Self> {
        let params = Self {
            mem_cost_kib,
            time_cost,
            parallelism,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn mem_cost_kib(&self) -> u32 {
        self.mem_cost_kib
    }

    pub fn time_cost(&self) -> u32 {
        self.time_cost
    }

    pub fn parallelism(&self) -> u32 {
        self.parallelism
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(JournalError::InvalidKey(msg.to_string()));

        if self.mem_cost_kib < 8 {
            return invalid("argon2 memory cost too low");
        }
        if self.time_cost < 1 {
            return invalid("argon2 time cost must be >= 1");
        }
        if self.parallelism < 1 {
            return invalid("argon2 parallelism must be >= 1");
        }
        if self.mem_cost_kib < 8 * self.parallelism {
            return invalid("argon2 memory cost must be at least 8 * parallelism");
        }
        Ok(())
    }
}

/// Derives the journal key from a memorable passphrase with default costs.
///
/// Pure and deterministic: no randomness and no file access.
pub fn derive_key_from_passphrase(passphrase: &str) -> Result<Key> {
    derive_key_with_params(passphrase, KdfParams::default())
}

/// Derives a key under explicit Argon2id costs.
///
/// Every passphrase, the empty one included, yields a key; only invalid
/// `kdf` costs are reported as errors.
pub fn derive_key_with_params(passphrase: &str, kdf: KdfParams) -> Result<Key> {
    kdf.validate()?;

    let params = Params::new(
        kdf.mem_cost_kib,
        kdf.time_cost,
        kdf.parallelism,
        Some(KEY_LEN),
    )
    .map_err(|e| JournalError::InvalidKey(format!("failed to construct Argon2 params: {e}")))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    argon2
        .hash_password_into(passphrase.as_bytes(), PASSPHRASE_SALT, &mut *key)
        .map_err(|e| JournalError::InvalidKey(format!("argon2 key derivation failed: {e}")))?;

    Ok(Key::from_zeroizing(key))
}
