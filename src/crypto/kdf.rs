/// Argon2id key derivation for passphrase-protected key exports.
///
/// The parameters used for an export are written into the envelope, so a
/// blob produced with one cost setting can still be opened after the
/// defaults change.
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;

use crate::crypto::sensitive::SensitiveBytes32;
use crate::error::{Result, VaultError};

pub const SALT_LEN: usize = 32;

/// Upper bounds accepted when reading parameters back from a blob.
const MAX_MEMORY_KIB: u32 = 1024 * 1024; // 1 GiB
const MAX_TIME_COST: u32 = 16;
const MAX_PARALLELISM: u32 = 16;

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    pub memory_kib: u32,
    pub time_cost: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 65_536, // 64 MiB
            time_cost: 3,
            parallelism: 4,
        }
    }
}

impl KdfParams {
    /// Cheap parameters for tests. Never use for real exports.
    pub const fn insecure_fast() -> Self {
        Self {
            memory_kib: 1024,
            time_cost: 1,
            parallelism: 1,
        }
    }

    /// Reject parameters a hostile blob could use to exhaust memory or CPU,
    /// and any combination Argon2id itself refuses.
    pub fn check_bounds(&self) -> Result<()> {
        self.to_argon2().map(|_| ())
    }

    fn to_argon2(&self) -> Result<Params> {
        if self.memory_kib > MAX_MEMORY_KIB
            || self.time_cost == 0
            || self.time_cost > MAX_TIME_COST
            || self.parallelism == 0
            || self.parallelism > MAX_PARALLELISM
        {
            return Err(VaultError::KeyDerivation(format!(
                "parameters out of range: m={} t={} p={}",
                self.memory_kib, self.time_cost, self.parallelism
            )));
        }

        Params::new(self.memory_kib, self.time_cost, self.parallelism, Some(32))
            .map_err(|e| VaultError::KeyDerivation(e.to_string()))
    }
}

/// Generate a random 32-byte salt.
pub fn generate_salt() -> Result<[u8; SALT_LEN]> {
    let mut salt = [0u8; SALT_LEN];
    rand::rngs::OsRng
        .try_fill_bytes(&mut salt)
        .map_err(|e| VaultError::KeyDerivation(e.to_string()))?;
    Ok(salt)
}

/// Derive a 32-byte key from a passphrase using Argon2id.
pub fn derive_key(passphrase: &[u8], salt: &[u8], params: &KdfParams) -> Result<SensitiveBytes32> {
    let params = params.to_argon2()?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut output = [0u8; 32];
    argon2
        .hash_password_into(passphrase, salt, &mut output)
        .map_err(|e| VaultError::KeyDerivation(e.to_string()))?;

    let key = SensitiveBytes32::new(output);
    zeroize::Zeroize::zeroize(&mut output);
    Ok(key)
}
