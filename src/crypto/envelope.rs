/// Passphrase-protected JSON envelope for exported key material.
///
/// Serialized form:
/// ```json
/// { "encoded": "<base64>",
///   "encoding": { "content": ["spki"], "type": ["argon2id", "xchacha20-poly1305"], "version": "1" } }
/// ```
///
/// `encoded` layout:
/// [salt(32B) | m_cost(4B LE) | t_cost(4B LE) | p_cost(4B LE) | nonce(24B) | ciphertext+tag]
///
/// The salt and cost header is authenticated as AAD.
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::crypto::kdf::{self, KdfParams, SALT_LEN};
use crate::crypto::sensitive::SensitiveVec;
use crate::error::{Result, VaultError};

pub const ENVELOPE_VERSION: &str = "1";
pub const KDF_TAG: &str = "argon2id";
pub const CIPHER_TAG: &str = "xchacha20-poly1305";
pub const NONCE_LEN: usize = 24;
pub const TAG_LEN: usize = 16;
pub const HEADER_LEN: usize = SALT_LEN + 12;

/// Describes how `encoded` was produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeEncoding {
    /// Format tags of the protected content, e.g. `["spki"]`.
    pub content: Vec<String>,
    /// KDF and cipher tags, in that order.
    #[serde(rename = "type")]
    pub kind: Vec<String>,
    pub version: String,
}

impl EnvelopeEncoding {
    fn current(content: &[&str]) -> Self {
        Self {
            content: content.iter().map(|c| (*c).to_string()).collect(),
            kind: vec![KDF_TAG.to_string(), CIPHER_TAG.to_string()],
            version: ENVELOPE_VERSION.to_string(),
        }
    }

    fn is_supported(&self) -> bool {
        self.version == ENVELOPE_VERSION && self.kind == [KDF_TAG, CIPHER_TAG]
    }
}

/// An encrypted blob safe to keep in any textual store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedJson {
    pub encoded: String,
    pub encoding: EnvelopeEncoding,
}

fn header(salt: &[u8; SALT_LEN], params: &KdfParams) -> [u8; HEADER_LEN] {
    let mut out = [0u8; HEADER_LEN];
    out[..SALT_LEN].copy_from_slice(salt);
    out[SALT_LEN..SALT_LEN + 4].copy_from_slice(&params.memory_kib.to_le_bytes());
    out[SALT_LEN + 4..SALT_LEN + 8].copy_from_slice(&params.time_cost.to_le_bytes());
    out[SALT_LEN + 8..].copy_from_slice(&params.parallelism.to_le_bytes());
    out
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(word)
}

/// Encrypt `plaintext` under a key derived from `passphrase`.
pub fn seal(
    plaintext: &[u8],
    content: &[&str],
    passphrase: &str,
    params: &KdfParams,
) -> Result<EncryptedJson> {
    let salt = kdf::generate_salt()?;
    let key = kdf::derive_key(passphrase.as_bytes(), &salt, params)?;

    let mut nonce = [0u8; NONCE_LEN];
    rand::rngs::OsRng
        .try_fill_bytes(&mut nonce)
        .map_err(|e| VaultError::Encryption(e.to_string()))?;

    let header = header(&salt, params);
    let cipher = XChaCha20Poly1305::new_from_slice(key.as_bytes())
        .map_err(|e| VaultError::Encryption(e.to_string()))?;
    let ciphertext = cipher
        .encrypt(
            XNonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad: &header,
            },
        )
        .map_err(|e| VaultError::Encryption(e.to_string()))?;

    let mut raw = Vec::with_capacity(HEADER_LEN + NONCE_LEN + ciphertext.len());
    raw.extend_from_slice(&header);
    raw.extend_from_slice(&nonce);
    raw.extend_from_slice(&ciphertext);

    Ok(EncryptedJson {
        encoded: BASE64.encode(raw),
        encoding: EnvelopeEncoding::current(content),
    })
}

/// Decrypt an envelope with `passphrase`.
///
/// Any failure (unknown format, truncated data, out-of-range KDF
/// parameters, wrong passphrase, tampering) is [`VaultError::Decode`].
pub fn open(envelope: &EncryptedJson, passphrase: &str) -> Result<SensitiveVec> {
    open_inner(envelope, passphrase).map_err(|e| {
        debug!(error = %e, "envelope open failed");
        VaultError::Decode
    })
}

fn open_inner(envelope: &EncryptedJson, passphrase: &str) -> Result<SensitiveVec> {
    if !envelope.encoding.is_supported() {
        return Err(VaultError::Serialization(format!(
            "unsupported envelope {:?} v{}",
            envelope.encoding.kind, envelope.encoding.version
        )));
    }

    let raw = BASE64
        .decode(envelope.encoded.as_bytes())
        .map_err(|e| VaultError::Serialization(e.to_string()))?;

    if raw.len() < HEADER_LEN + NONCE_LEN + TAG_LEN {
        return Err(VaultError::Serialization(format!(
            "envelope too short: {} bytes",
            raw.len()
        )));
    }

    let (header, rest) = raw.split_at(HEADER_LEN);
    let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

    let params = KdfParams {
        memory_kib: read_u32(header, SALT_LEN),
        time_cost: read_u32(header, SALT_LEN + 4),
        parallelism: read_u32(header, SALT_LEN + 8),
    };
    let key = kdf::derive_key(passphrase.as_bytes(), &header[..SALT_LEN], &params)?;

    let cipher = XChaCha20Poly1305::new_from_slice(key.as_bytes())
        .map_err(|e| VaultError::KeyDerivation(e.to_string()))?;
    let plaintext = cipher
        .decrypt(
            XNonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad: header,
            },
        )
        .map_err(|_| VaultError::Decode)?;

    Ok(SensitiveVec::new(plaintext))
}
