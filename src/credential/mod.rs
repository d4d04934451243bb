/// Credential cache codec.
///
/// Encrypts Verifiable Credential payloads received from the Enclave with
/// the session's shielding key before they are cached, and decrypts them on
/// read. Every record carries its own random nonce.
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::crypto::{aead, encoding};
use crate::error::{Result, VaultError};
use crate::shielding::{self, ShieldingKey};

const MAX_ID_LEN: usize = 128;

/// Identifier of a credential definition, e.g. `evm-address-holder`.
///
/// Validated when it enters the crate: non-empty, at most 128 characters of
/// ASCII alphanumerics, `-`, `_` or `.`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CredentialDefinitionId(String);

impl CredentialDefinitionId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let valid = !id.is_empty()
            && id.len() <= MAX_ID_LEN
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(VaultError::InvalidCredentialId(id));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CredentialDefinitionId {
    type Error = VaultError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<CredentialDefinitionId> for String {
    fn from(id: CredentialDefinitionId) -> Self {
        id.0
    }
}

impl std::str::FromStr for CredentialDefinitionId {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl fmt::Display for CredentialDefinitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One encrypted credential payload.
///
/// Serialized as `{"ciphertext":"0x…","nonce":"0x…","aad":"0x"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedCredentialRecord {
    /// AES-GCM ciphertext with the 16-byte tag appended.
    #[serde(with = "encoding::serde_bytes")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "encoding::serde_array")]
    pub nonce: [u8; aead::NONCE_LEN],
    /// Always empty for records written by this crate.
    #[serde(with = "encoding::serde_bytes", default)]
    pub aad: Vec<u8>,
}

impl EncryptedCredentialRecord {
    /// Hex form of the ciphertext, as kept in the credential map.
    pub fn ciphertext_hex(&self) -> String {
        encoding::to_hex(&self.ciphertext)
    }
}

/// Encrypt a credential payload under `key` with a freshly drawn nonce.
pub async fn encrypt_credential(
    cleartext: &[u8],
    key: &ShieldingKey,
) -> Result<EncryptedCredentialRecord> {
    let nonce = shielding::generate_nonce()?;
    let ciphertext = aead::encrypt(key.secret(), &nonce, cleartext, &[])?;

    Ok(EncryptedCredentialRecord {
        ciphertext,
        nonce,
        aad: Vec::new(),
    })
}

/// Decrypt and authenticate a credential record.
///
/// A wrong key and a tampered record are indistinguishable: both are
/// [`VaultError::Decrypt`].
pub async fn decrypt_credential(
    record: &EncryptedCredentialRecord,
    key: &ShieldingKey,
) -> Result<Vec<u8>> {
    aead::decrypt(key.secret(), &record.nonce, &record.ciphertext, &record.aad).map_err(|e| {
        debug!("credential record failed authentication");
        e
    })
}
