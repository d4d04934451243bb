/// AES-256-GCM authenticated encryption for cached credentials.
///
/// One shielding key protects every credential in a session, so each
/// encryption must use a fresh 12-byte nonce. Callers draw it from
/// [`generate_nonce`] and store it beside the ciphertext.
use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Key, Nonce,
};
use rand::RngCore;

use crate::crypto::sensitive::SensitiveBytes32;
use crate::error::{Result, VaultError};

pub const NONCE_LEN: usize = 12;
pub const KEY_LEN: usize = 32;
pub const TAG_LEN: usize = 16;

/// Generate a random 256-bit AES-GCM key from the OS random source.
pub fn generate_key() -> Result<SensitiveBytes32> {
    let mut key = [0u8; KEY_LEN];
    rand::rngs::OsRng
        .try_fill_bytes(&mut key)
        .map_err(|e| VaultError::KeyGeneration(e.to_string()))?;
    Ok(SensitiveBytes32::new(key))
}

/// Generate a random 12-byte nonce, the size AES-GCM (and the Enclave) uses.
pub fn generate_nonce() -> Result<[u8; NONCE_LEN]> {
    nonce_from(&mut rand::rngs::OsRng)
}

fn nonce_from<R: RngCore>(rng: &mut R) -> Result<[u8; NONCE_LEN]> {
    let mut nonce = [0u8; NONCE_LEN];
    rng.try_fill_bytes(&mut nonce)
        .map_err(|e| VaultError::Encryption(format!("nonce generation failed: {e}")))?;
    Ok(nonce)
}

fn cipher(key: &SensitiveBytes32) -> Aes256Gcm {
    Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()))
}

/// Encrypt `plaintext` under `key` with a caller-supplied nonce.
///
/// Returns ciphertext with the 16-byte tag appended. The nonce must never
/// have been used with this key before.
pub fn encrypt(
    key: &SensitiveBytes32,
    nonce: &[u8; NONCE_LEN],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>> {
    let payload = Payload {
        msg: plaintext,
        aad,
    };

    cipher(key)
        .encrypt(Nonce::from_slice(nonce), payload)
        .map_err(|e| VaultError::Encryption(e.to_string()))
}

/// Decrypt and authenticate `ciphertext`.
///
/// Every failure, whatever the cause, is reported as [`VaultError::Decrypt`].
pub fn decrypt(
    key: &SensitiveBytes32,
    nonce: &[u8; NONCE_LEN],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>> {
    let payload = Payload {
        msg: ciphertext,
        aad,
    };

    cipher(key)
        .decrypt(Nonce::from_slice(nonce), payload)
        .map_err(|_| VaultError::Decrypt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = generate_key().unwrap();
        let nonce = generate_nonce().unwrap();
        let plaintext = b"{\"type\":\"VerifiableCredential\"}";

        let ciphertext = encrypt(&key, &nonce, plaintext, b"").unwrap();
        assert_eq!(ciphertext.len(), plaintext.len() + TAG_LEN);

        let decrypted = decrypt(&key, &nonce, &ciphertext, b"").unwrap();
        assert_eq!(&decrypted, plaintext);
    }

    #[test]
    fn test_wrong_key_fails() {
        let key1 = generate_key().unwrap();
        let key2 = generate_key().unwrap();
        let nonce = generate_nonce().unwrap();

        let ciphertext = encrypt(&key1, &nonce, b"secret", b"").unwrap();
        let result = decrypt(&key2, &nonce, &ciphertext, b"");

        assert!(matches!(result, Err(VaultError::Decrypt)));
    }

    #[test]
    fn test_wrong_nonce_fails() {
        let key = generate_key().unwrap();
        let nonce = generate_nonce().unwrap();
        let mut other = nonce;
        other[11] ^= 0x01;

        let ciphertext = encrypt(&key, &nonce, b"secret", b"").unwrap();
        assert!(matches!(
            decrypt(&key, &other, &ciphertext, b""),
            Err(VaultError::Decrypt)
        ));
    }

    #[test]
    fn test_wrong_aad_fails() {
        let key = generate_key().unwrap();
        let nonce = generate_nonce().unwrap();

        let ciphertext = encrypt(&key, &nonce, b"secret", b"vc:a").unwrap();
        assert!(decrypt(&key, &nonce, &ciphertext, b"vc:b").is_err());
    }

    #[test]
    fn test_truncated_ciphertext_fails() {
        let key = generate_key().unwrap();
        let nonce = generate_nonce().unwrap();

        let ciphertext = encrypt(&key, &nonce, b"secret", b"").unwrap();
        let result = decrypt(&key, &nonce, &ciphertext[..TAG_LEN - 1], b"");
        assert!(matches!(result, Err(VaultError::Decrypt)));
    }

    #[test]
    fn test_empty_plaintext() {
        let key = generate_key().unwrap();
        let nonce = generate_nonce().unwrap();
        let ciphertext = encrypt(&key, &nonce, b"", b"").unwrap();
        assert_eq!(ciphertext.len(), TAG_LEN);
        assert!(decrypt(&key, &nonce, &ciphertext, b"").unwrap().is_empty());
    }

    struct FailingRng;

    impl RngCore for FailingRng {
        fn next_u32(&mut self) -> u32 {
            0
        }

        fn next_u64(&mut self) -> u64 {
            0
        }

        fn fill_bytes(&mut self, _dest: &mut [u8]) {}

        fn try_fill_bytes(&mut self, _dest: &mut [u8]) -> std::result::Result<(), rand::Error> {
            Err(rand::Error::new(std::io::Error::new(
                std::io::ErrorKind::Other,
                "entropy source unavailable",
            )))
        }
    }

    #[test]
    fn test_nonce_rng_failure_is_encryption_error() {
        assert!(matches!(
            nonce_from(&mut FailingRng),
            Err(VaultError::Encryption(_))
        ));
    }

    #[test]
    fn test_generate_nonce_unique() {
        assert_ne!(generate_nonce().unwrap(), generate_nonce().unwrap());
    }
}
