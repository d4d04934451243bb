/// Cryptographic building blocks.
///
/// - `aead`: AES-256-GCM for credential payloads
/// - `kdf`: Argon2id passphrase key derivation
/// - `envelope`: passphrase-protected JSON export format
/// - `sensitive`: zeroize-on-drop secret containers
/// - `encoding`: `0x` hex helpers
pub mod aead;
pub mod encoding;
pub mod envelope;
pub mod kdf;
pub mod sensitive;
