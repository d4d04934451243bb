pub mod config;
pub mod credential;
pub mod crypto;
pub mod error;
pub mod shielding;
pub mod store;
pub mod vault;

pub use credential::{CredentialDefinitionId, EncryptedCredentialRecord};
pub use error::{Result, VaultError};
pub use shielding::ShieldingKey;
pub use vault::CredentialVault;
