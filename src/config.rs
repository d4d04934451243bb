use std::path::PathBuf;

use tracing::warn;
use zeroize::Zeroizing;

use crate::credential::CredentialDefinitionId;
use crate::crypto::kdf::KdfParams;
use crate::error::{Result, VaultError};
use crate::shielding::{EncodeOptions, PassphrasePolicy};

pub const DEFAULT_STORE_PATH: &str = "./data/vc-shield.json";

/// Vault configuration
#[derive(Clone)]
pub struct VaultConfig {
    /// Location of the file store
    pub store_path: PathBuf,

    /// Session passphrase protecting the shielding key export
    pub passphrase: Option<Zeroizing<String>>,

    /// Argon2id costs used for new exports
    pub kdf: KdfParams,

    /// What to do when asked to export under an empty passphrase
    pub empty_passphrase: PassphrasePolicy,

    /// Credential definitions hidden from listings and refused on store
    pub blacklisted_credentials: Vec<CredentialDefinitionId>,
}

// Custom Debug implementation to keep the passphrase out of logs
impl std::fmt::Debug for VaultConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultConfig")
            .field("store_path", &self.store_path)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "[REDACTED]"))
            .field("kdf", &self.kdf)
            .field("empty_passphrase", &self.empty_passphrase)
            .field("blacklisted_credentials", &self.blacklisted_credentials)
            .finish()
    }
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
            passphrase: None,
            kdf: KdfParams::default(),
            empty_passphrase: PassphrasePolicy::default(),
            blacklisted_credentials: Vec::new(),
        }
    }
}

impl VaultConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = KdfParams::default();

        let store_path = lookup("VC_SHIELD_STORE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_PATH));

        let passphrase = lookup("VC_SHIELD_PASSPHRASE").map(Zeroizing::new);

        let kdf = KdfParams {
            memory_kib: parse_u32(&lookup, "VC_SHIELD_KDF_MEMORY_KIB", defaults.memory_kib)?,
            time_cost: parse_u32(&lookup, "VC_SHIELD_KDF_TIME_COST", defaults.time_cost)?,
            parallelism: parse_u32(&lookup, "VC_SHIELD_KDF_PARALLELISM", defaults.parallelism)?,
        };
        kdf.check_bounds()
            .map_err(|e| VaultError::Config(e.to_string()))?;

        let empty_passphrase = match lookup("VC_SHIELD_EMPTY_PASSPHRASE") {
            Some(v) => v.parse()?,
            None => PassphrasePolicy::default(),
        };

        let blacklisted_credentials = lookup("NX_BLACKLISTED_CREDENTIALS")
            .map(|raw| parse_blacklist(&raw))
            .unwrap_or_default();

        Ok(Self {
            store_path,
            passphrase,
            kdf,
            empty_passphrase,
            blacklisted_credentials,
        })
    }

    pub fn encode_options(&self) -> EncodeOptions {
        EncodeOptions {
            kdf: self.kdf,
            empty_passphrase: self.empty_passphrase,
        }
    }

    pub fn is_blacklisted(&self, id: &CredentialDefinitionId) -> bool {
        self.blacklisted_credentials.contains(id)
    }
}

fn parse_u32(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: u32) -> Result<u32> {
    match lookup(name) {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|e| VaultError::Config(format!("{name}: {e}"))),
        None => Ok(default),
    }
}

fn parse_blacklist(raw: &str) -> Vec<CredentialDefinitionId> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match CredentialDefinitionId::new(s) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(error = %e, "ignoring blacklisted credential entry");
                None
            }
        })
        .collect()
}
