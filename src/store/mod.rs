/// Pluggable persistence for the encrypted key envelope and cached
/// credentials.
///
/// A store is a flat string-to-string map, the same shape as browser local
/// storage. Everything written to it is already encrypted; stores never
/// see key material or credential plaintext.
pub mod file;
pub mod memory;

use async_trait::async_trait;

use crate::error::Result;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Trait for key-value stores backing a `CredentialVault`.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Human-readable name of this store (e.g. "memory", "file").
    fn name(&self) -> &str;

    /// Fetch a value. `Ok(None)` if the key is absent.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Insert or overwrite a value.
    async fn put(&self, key: &str, value: String) -> Result<()>;

    /// Insert `value` only if `key` is absent, atomically with respect to
    /// other calls on this store. Returns the existing value when the key
    /// was already present, in which case nothing is written.
    async fn put_if_absent(&self, key: &str, value: String) -> Result<Option<String>>;

    /// Remove a value. Returns whether it existed.
    async fn remove(&self, key: &str) -> Result<bool>;

    /// List keys starting with `prefix`, in sorted order.
    async fn keys(&self, prefix: &str) -> Result<Vec<String>>;
}
