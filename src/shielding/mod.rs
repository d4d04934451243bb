/// Shielding key management.
///
/// A shielding key is the single AES-256-GCM key that protects every cached
/// credential for the current user. It only exists in memory as a
/// [`ShieldingKey`]; at rest it is always a passphrase-protected
/// [`EncryptedJson`] produced by [`encode`].
///
/// Lifecycle: `Absent -> Loaded` through [`generate`] or [`decode`]. The key
/// bytes are zeroized when the last `ShieldingKey` holding them is dropped.
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::crypto::envelope::{self, EncryptedJson};
use crate::crypto::kdf::KdfParams;
use crate::crypto::sensitive::{SensitiveBytes32, SensitiveVec};
use crate::crypto::{aead, encoding};
use crate::error::{Result, VaultError};

/// Content tag written into the export envelope.
pub const CONTENT_TAG: &str = "spki";

/// What `encode` does with an empty passphrase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PassphrasePolicy {
    /// Refuse with [`VaultError::EmptyPassphrase`].
    #[default]
    Reject,
    /// Export anyway and log a warning.
    Warn,
}

impl std::str::FromStr for PassphrasePolicy {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "warn" => Ok(Self::Warn),
            other => Err(VaultError::Config(format!(
                "unknown empty-passphrase policy `{other}` (expected `reject` or `warn`)"
            ))),
        }
    }
}

/// Options for [`encode_with`].
#[derive(Debug, Clone, Copy, Default)]
pub struct EncodeOptions {
    pub kdf: KdfParams,
    pub empty_passphrase: PassphrasePolicy,
}

/// An in-memory shielding key with optional on-chain provenance.
#[derive(Clone)]
pub struct ShieldingKey {
    key: SensitiveBytes32,
    created_by_tx: Option<String>,
    created_at_height: Option<u64>,
}

impl ShieldingKey {
    fn from_parts(
        key: SensitiveBytes32,
        created_by_tx: Option<String>,
        created_at_height: Option<u64>,
    ) -> Self {
        Self {
            key,
            created_by_tx,
            created_at_height,
        }
    }

    /// Attach the transaction and block height that issued this key.
    ///
    /// `tx` must be `0x`-prefixed hex.
    pub fn with_provenance(mut self, tx: impl Into<String>, height: u64) -> Result<Self> {
        let tx = tx.into();
        if !encoding::is_hex(&tx) {
            return Err(VaultError::Serialization(format!(
                "transaction reference is not 0x-hex: {tx}"
            )));
        }
        self.created_by_tx = Some(tx);
        self.created_at_height = Some(height);
        Ok(self)
    }

    pub fn created_by_tx(&self) -> Option<&str> {
        self.created_by_tx.as_deref()
    }

    pub fn created_at_height(&self) -> Option<u64> {
        self.created_at_height
    }

    /// Raw key material. Handle with care; the returned value zeroizes on drop.
    pub fn export_raw(&self) -> SensitiveBytes32 {
        self.key.clone()
    }

    pub(crate) fn secret(&self) -> &SensitiveBytes32 {
        &self.key
    }
}

impl fmt::Debug for ShieldingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShieldingKey")
            .field("key", &"[REDACTED]")
            .field("created_by_tx", &self.created_by_tx)
            .field("created_at_height", &self.created_at_height)
            .finish()
    }
}

/// Plaintext form of a shielding key, only ever serialized inside an
/// encrypted envelope.
#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct ShieldingKeyData {
    /// Raw key bytes as `0x` hex.
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by_tx: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at_height: Option<u64>,
}

impl ShieldingKeyData {
    fn from_key(key: &ShieldingKey) -> Self {
        Self {
            key: encoding::to_hex(key.key.as_bytes()),
            created_by_tx: key.created_by_tx.clone(),
            created_at_height: key.created_at_height,
        }
    }

    fn into_key(self) -> Result<ShieldingKey> {
        let raw = Zeroizing::new(
            encoding::from_hex(&self.key).map_err(|e| VaultError::Serialization(e.to_string()))?,
        );
        let key = SensitiveBytes32::from_slice(&raw).ok_or_else(|| {
            VaultError::Serialization(format!("key must be {} bytes, got {}", aead::KEY_LEN, raw.len()))
        })?;

        if let Some(tx) = &self.created_by_tx {
            if !encoding::is_hex(tx) {
                return Err(VaultError::Serialization("createdByTx is not 0x-hex".into()));
            }
        }

        Ok(ShieldingKey::from_parts(
            key,
            self.created_by_tx.clone(),
            self.created_at_height,
        ))
    }
}

/// Generate a fresh AES-256-GCM shielding key with no provenance.
///
/// Failure means the OS random source is unavailable and is not retried.
pub async fn generate() -> Result<ShieldingKey> {
    let key = aead::generate_key()?;
    debug!("generated shielding key");
    Ok(ShieldingKey::from_parts(key, None, None))
}

/// Generate a random 12-byte AES-GCM nonce.
///
/// A nonce must never be used twice with the same shielding key.
pub fn generate_nonce() -> Result<[u8; aead::NONCE_LEN]> {
    aead::generate_nonce()
}

/// Export `key` under `passphrase` with the default KDF parameters and an
/// empty-passphrase policy of [`PassphrasePolicy::Reject`].
pub async fn encode(passphrase: &str, key: &ShieldingKey) -> Result<EncryptedJson> {
    encode_with(passphrase, key, EncodeOptions::default()).await
}

/// Export `key` as a passphrase-protected envelope.
///
/// Argon2id runs on the blocking pool.
pub async fn encode_with(
    passphrase: &str,
    key: &ShieldingKey,
    options: EncodeOptions,
) -> Result<EncryptedJson> {
    if passphrase.is_empty() {
        match options.empty_passphrase {
            PassphrasePolicy::Reject => return Err(VaultError::EmptyPassphrase),
            PassphrasePolicy::Warn => {
                warn!("exporting shielding key with an empty passphrase; the export is trivially reversible")
            }
        }
    }

    let data = ShieldingKeyData::from_key(key);
    let serialized = SensitiveVec::new(serde_json::to_vec(&data)?);
    let passphrase = Zeroizing::new(passphrase.to_owned());

    tokio::task::spawn_blocking(move || {
        envelope::seal(serialized.as_bytes(), &[CONTENT_TAG], &passphrase, &options.kdf)
    })
    .await
    .map_err(|e| VaultError::Encryption(e.to_string()))?
}

/// Recover a shielding key from an envelope produced by [`encode`].
///
/// A wrong passphrase and a corrupted blob both yield [`VaultError::Decode`].
pub async fn decode(encrypted: &EncryptedJson, passphrase: &str) -> Result<ShieldingKey> {
    let encrypted = encrypted.clone();
    let passphrase = Zeroizing::new(passphrase.to_owned());

    let plaintext = tokio::task::spawn_blocking(move || envelope::open(&encrypted, &passphrase))
        .await
        .map_err(|e| {
            debug!(error = %e, "decode task failed");
            VaultError::Decode
        })??;

    let data: ShieldingKeyData = serde_json::from_slice(plaintext.as_bytes()).map_err(|e| {
        debug!(error = %e, "shielding key data is malformed");
        VaultError::Decode
    })?;

    data.into_key().map_err(|e| {
        debug!(error = %e, "shielding key data is invalid");
        VaultError::Decode
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAST: EncodeOptions = EncodeOptions {
        kdf: KdfParams::insecure_fast(),
        empty_passphrase: PassphrasePolicy::Reject,
    };

    #[tokio::test]
    async fn test_encode_decode_roundtrip() {
        let key = generate().await.unwrap();
        let blob = encode_with("pw1", &key, FAST).await.unwrap();
        assert_eq!(blob.encoding.content, vec![CONTENT_TAG.to_string()]);

        let decoded = decode(&blob, "pw1").await.unwrap();
        assert_eq!(decoded.export_raw().as_bytes(), key.export_raw().as_bytes());
        assert!(decoded.created_by_tx().is_none());
        assert!(decoded.created_at_height().is_none());
    }

    #[tokio::test]
    async fn test_decode_wrong_passphrase() {
        let key = generate().await.unwrap();
        let blob = encode_with("pw1", &key, FAST).await.unwrap();

        let err = decode(&blob, "wrong").await.unwrap_err();
        assert!(matches!(err, VaultError::Decode));
        assert_eq!(err.to_string(), "failed to decode key");
    }

    #[tokio::test]
    async fn test_provenance_survives_export() {
        let key = generate()
            .await
            .unwrap()
            .with_provenance("0xabcdef", 1_234)
            .unwrap();
        let blob = encode_with("pw1", &key, FAST).await.unwrap();
        let decoded = decode(&blob, "pw1").await.unwrap();

        assert_eq!(decoded.created_by_tx(), Some("0xabcdef"));
        assert_eq!(decoded.created_at_height(), Some(1_234));
    }

    #[tokio::test]
    async fn test_provenance_requires_hex() {
        let key = generate().await.unwrap();
        assert!(key.with_provenance("not-hex", 1).is_err());
    }

    #[tokio::test]
    async fn test_empty_passphrase_policy() {
        let key = generate().await.unwrap();
        assert!(matches!(
            encode_with("", &key, FAST).await,
            Err(VaultError::EmptyPassphrase)
        ));

        let lenient = EncodeOptions {
            empty_passphrase: PassphrasePolicy::Warn,
            ..FAST
        };
        let blob = encode_with("", &key, lenient).await.unwrap();
        let decoded = decode(&blob, "").await.unwrap();
        assert_eq!(decoded.export_raw().as_bytes(), key.export_raw().as_bytes());
    }

    #[tokio::test]
    async fn test_malformed_key_data_is_decode_error() {
        let bogus = serde_json::to_vec(&serde_json::json!({ "key": "0x0102" })).unwrap();
        let blob = envelope::seal(&bogus, &[CONTENT_TAG], "pw1", &KdfParams::insecure_fast()).unwrap();
        assert!(matches!(decode(&blob, "pw1").await, Err(VaultError::Decode)));
    }

    #[test]
    fn test_key_data_json_shape() {
        let data = ShieldingKeyData {
            key: "0x00".into(),
            created_by_tx: None,
            created_at_height: Some(7),
        };
        let json = serde_json::to_string(&data).unwrap();
        assert_eq!(json, r#"{"key":"0x00","createdAtHeight":7}"#);
    }

    #[test]
    fn test_debug_redacts_key() {
        let key = ShieldingKey::from_parts(SensitiveBytes32::new([0x11; 32]), None, None);
        assert!(format!("{key:?}").contains("[REDACTED]"));
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("WARN".parse::<PassphrasePolicy>().unwrap(), PassphrasePolicy::Warn);
        assert!("maybe".parse::<PassphrasePolicy>().is_err());
    }
}
