/// Credential vault: the load-or-create flow around the shielding key and
/// the per-definition credential cache.
///
/// Flow for an incoming credential:
/// 1. `open` loads the shielding key envelope from the store and decodes it
///    with the session passphrase, or generates and persists a new key
/// 2. `store_credential` encrypts the payload with a fresh nonce
/// 3. The record is written under `vc:<definition id>`
///
/// Reads reverse steps 3 and 2. Writes are serialized through one lock so
/// concurrent stores against the same backend cannot lose updates, and the
/// key is persisted with `put_if_absent` so concurrent opens on an empty
/// store all end up holding the same key.
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::VaultConfig;
use crate::credential::{self, CredentialDefinitionId, EncryptedCredentialRecord};
use crate::crypto::envelope::EncryptedJson;
use crate::error::{Result, VaultError};
use crate::shielding::{self, ShieldingKey};
use crate::store::KeyValueStore;

/// Store entry holding the encoded shielding key.
pub const SHIELDING_KEY_ENTRY: &str = "shielding-key";
/// Prefix of credential entries.
pub const CREDENTIAL_PREFIX: &str = "vc:";

/// A credential record as persisted in the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedCredential {
    pub record: EncryptedCredentialRecord,
    pub stored_at: DateTime<Utc>,
}

/// Snapshot of vault state for status reporting.
#[derive(Debug, Clone)]
pub struct VaultStatus {
    pub store: String,
    pub key_created: bool,
    pub created_by_tx: Option<String>,
    pub created_at_height: Option<u64>,
    pub credentials: usize,
}

pub struct CredentialVault {
    store: Arc<dyn KeyValueStore>,
    key: ShieldingKey,
    config: VaultConfig,
    key_created: bool,
    write_lock: Mutex<()>,
}

fn entry_key(id: &CredentialDefinitionId) -> String {
    format!("{CREDENTIAL_PREFIX}{id}")
}

impl CredentialVault {
    /// Load the shielding key from `store`, creating and persisting a new
    /// one if none exists yet.
    ///
    /// A stored key that cannot be decoded with `passphrase` is an error;
    /// it is never silently replaced.
    pub async fn open(
        store: Arc<dyn KeyValueStore>,
        passphrase: &str,
        config: VaultConfig,
    ) -> Result<Self> {
        let (key, key_created) = match store.get(SHIELDING_KEY_ENTRY).await? {
            Some(raw) => (Self::load_key(&raw, passphrase).await?, false),
            None => {
                let key = shielding::generate().await?;
                let envelope = shielding::encode_with(passphrase, &key, config.encode_options()).await?;
                let written = store
                    .put_if_absent(SHIELDING_KEY_ENTRY, serde_json::to_string(&envelope)?)
                    .await?;
                match written {
                    None => (key, true),
                    // Another opener created the key first; use theirs.
                    Some(raw) => {
                        debug!("shielding key created concurrently, loading stored key");
                        (Self::load_key(&raw, passphrase).await?, false)
                    }
                }
            }
        };

        if key_created {
            info!(store = store.name(), "created shielding key");
        } else {
            info!(store = store.name(), "loaded shielding key");
        }

        Ok(Self {
            store,
            key,
            config,
            key_created,
            write_lock: Mutex::new(()),
        })
    }

    async fn load_key(raw: &str, passphrase: &str) -> Result<ShieldingKey> {
        let envelope: EncryptedJson = serde_json::from_str(raw).map_err(|e| {
            debug!(error = %e, "stored shielding key is not a valid envelope");
            VaultError::Decode
        })?;
        shielding::decode(&envelope, passphrase).await
    }

    /// Whether `open` generated the key rather than loading it.
    pub fn key_created(&self) -> bool {
        self.key_created
    }

    pub fn shielding_key(&self) -> &ShieldingKey {
        &self.key
    }

    /// Encrypt and cache a credential payload under its definition id,
    /// replacing any previous entry.
    pub async fn store_credential(
        &self,
        id: &CredentialDefinitionId,
        cleartext: &[u8],
    ) -> Result<EncryptedCredentialRecord> {
        if self.config.is_blacklisted(id) {
            return Err(VaultError::Blacklisted(id.to_string()));
        }

        let record = credential::encrypt_credential(cleartext, &self.key).await?;
        let cached = CachedCredential {
            record: record.clone(),
            stored_at: Utc::now(),
        };

        let _guard = self.write_lock.lock().await;
        self.store
            .put(&entry_key(id), serde_json::to_string(&cached)?)
            .await?;

        info!(definition_id = %id, bytes = cleartext.len(), "credential cached");
        Ok(record)
    }

    /// Fetch the cached record for `id` without decrypting it.
    pub async fn cached_credential(&self, id: &CredentialDefinitionId) -> Result<CachedCredential> {
        let raw = self
            .store
            .get(&entry_key(id))
            .await?
            .ok_or_else(|| VaultError::NotFound(id.to_string()))?;

        serde_json::from_str(&raw).map_err(|e| {
            debug!(definition_id = %id, error = %e, "cached credential is malformed");
            VaultError::Decrypt
        })
    }

    /// Decrypt the cached credential for `id`.
    pub async fn load_credential(&self, id: &CredentialDefinitionId) -> Result<Vec<u8>> {
        let cached = self.cached_credential(id).await?;
        credential::decrypt_credential(&cached.record, &self.key).await
    }

    /// Drop the cached credential for `id`. Returns whether it existed.
    pub async fn remove_credential(&self, id: &CredentialDefinitionId) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let existed = self.store.remove(&entry_key(id)).await?;
        if existed {
            info!(definition_id = %id, "credential removed");
        }
        Ok(existed)
    }

    /// Ids of all cached credentials, sorted, blacklisted ones omitted.
    pub async fn list_credentials(&self) -> Result<Vec<CredentialDefinitionId>> {
        let mut ids = Vec::new();
        for key in self.store.keys(CREDENTIAL_PREFIX).await? {
            let raw = &key[CREDENTIAL_PREFIX.len()..];
            match CredentialDefinitionId::new(raw) {
                Ok(id) if self.config.is_blacklisted(&id) => {}
                Ok(id) => ids.push(id),
                Err(_) => warn!(entry = %key, "skipping store entry with invalid definition id"),
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Re-export the current shielding key under `new_passphrase`. Cached
    /// credentials stay valid since the key itself does not change.
    pub async fn change_passphrase(&self, new_passphrase: &str) -> Result<()> {
        let envelope =
            shielding::encode_with(new_passphrase, &self.key, self.config.encode_options()).await?;

        let _guard = self.write_lock.lock().await;
        self.store
            .put(SHIELDING_KEY_ENTRY, serde_json::to_string(&envelope)?)
            .await?;

        info!("shielding key re-encoded under new passphrase");
        Ok(())
    }

    pub async fn status(&self) -> Result<VaultStatus> {
        Ok(VaultStatus {
            store: self.store.name().to_string(),
            key_created: self.key_created,
            created_by_tx: self.key.created_by_tx().map(str::to_string),
            created_at_height: self.key.created_at_height(),
            credentials: self.list_credentials().await?.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::kdf::KdfParams;
    use crate::store::MemoryStore;

    fn test_config() -> VaultConfig {
        VaultConfig {
            kdf: KdfParams::insecure_fast(),
            ..VaultConfig::default()
        }
    }

    fn id(s: &str) -> CredentialDefinitionId {
        CredentialDefinitionId::new(s).unwrap()
    }

    #[tokio::test]
    async fn test_open_creates_then_loads() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());

        let first = CredentialVault::open(store.clone(), "pw1", test_config()).await.unwrap();
        assert!(first.key_created());
        assert!(store.get(SHIELDING_KEY_ENTRY).await.unwrap().is_some());

        let second = CredentialVault::open(store.clone(), "pw1", test_config()).await.unwrap();
        assert!(!second.key_created());
        assert_eq!(
            first.shielding_key().export_raw().as_bytes(),
            second.shielding_key().export_raw().as_bytes()
        );
    }

    #[tokio::test]
    async fn test_concurrent_opens_share_one_key() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());

        let (a, b) = tokio::join!(
            CredentialVault::open(store.clone(), "pw1", test_config()),
            CredentialVault::open(store.clone(), "pw1", test_config())
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert!(a.key_created() != b.key_created());
        assert_eq!(
            a.shielding_key().export_raw().as_bytes(),
            b.shielding_key().export_raw().as_bytes()
        );

        a.store_credential(&id("vc-a"), b"payload-a").await.unwrap();
        b.store_credential(&id("vc-b"), b"payload-b").await.unwrap();

        let reopened = CredentialVault::open(store, "pw1", test_config()).await.unwrap();
        assert_eq!(reopened.load_credential(&id("vc-a")).await.unwrap(), b"payload-a");
        assert_eq!(reopened.load_credential(&id("vc-b")).await.unwrap(), b"payload-b");
    }

    #[tokio::test]
    async fn test_open_wrong_passphrase_keeps_key() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        CredentialVault::open(store.clone(), "pw1", test_config()).await.unwrap();
        let before = store.get(SHIELDING_KEY_ENTRY).await.unwrap();

        let err = CredentialVault::open(store.clone(), "wrong", test_config())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, VaultError::Decode));
        assert_eq!(store.get(SHIELDING_KEY_ENTRY).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_store_load_remove() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let vault = CredentialVault::open(store, "pw1", test_config()).await.unwrap();

        vault.store_credential(&id("vc-a"), b"payload-a").await.unwrap();
        assert_eq!(vault.load_credential(&id("vc-a")).await.unwrap(), b"payload-a");

        assert!(vault.remove_credential(&id("vc-a")).await.unwrap());
        assert!(matches!(
            vault.load_credential(&id("vc-a")).await,
            Err(VaultError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_blacklist() {
        let config = VaultConfig {
            blacklisted_credentials: vec![id("hidden")],
            ..test_config()
        };
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let vault = CredentialVault::open(store.clone(), "pw1", config).await.unwrap();

        assert!(matches!(
            vault.store_credential(&id("hidden"), b"x").await,
            Err(VaultError::Blacklisted(_))
        ));

        // Entries written before the id was blacklisted are hidden too.
        store.put("vc:hidden", "{}".into()).await.unwrap();
        vault.store_credential(&id("shown"), b"x").await.unwrap();
        assert_eq!(vault.list_credentials().await.unwrap(), vec![id("shown")]);
    }

    #[tokio::test]
    async fn test_change_passphrase() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let vault = CredentialVault::open(store.clone(), "pw1", test_config()).await.unwrap();
        vault.store_credential(&id("vc-a"), b"payload").await.unwrap();
        vault.change_passphrase("pw2").await.unwrap();

        assert!(CredentialVault::open(store.clone(), "pw1", test_config()).await.is_err());
        let reopened = CredentialVault::open(store, "pw2", test_config()).await.unwrap();
        assert_eq!(reopened.load_credential(&id("vc-a")).await.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_corrupt_record_is_decrypt_error() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let vault = CredentialVault::open(store.clone(), "pw1", test_config()).await.unwrap();
        store.put("vc:broken", "not json".into()).await.unwrap();

        assert!(matches!(
            vault.load_credential(&id("broken")).await,
            Err(VaultError::Decrypt)
        ));
    }
}
