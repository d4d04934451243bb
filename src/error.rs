use thiserror::Error;

/// Errors produced by the shielding key manager, the credential codec and
/// the vault around them.
///
/// `Decode` and `Decrypt` deliberately carry no cause: a wrong passphrase
/// and a corrupted blob (or a wrong key and a tampered record) look the same
/// to the caller.
#[derive(Error, Debug)]
pub enum VaultError {
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("failed to decode key")]
    Decode,

    #[error("Failed to decrypt data")]
    Decrypt,

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Passphrase must not be empty")]
    EmptyPassphrase,

    #[error("Invalid credential definition id: {0}")]
    InvalidCredentialId(String),

    #[error("Credential definition is blacklisted: {0}")]
    Blacklisted(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for VaultError {
    fn from(e: serde_json::Error) -> Self {
        VaultError::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, VaultError>;
