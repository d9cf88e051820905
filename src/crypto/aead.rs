/// XChaCha20-Poly1305 AEAD used for envelope bodies.
///
/// Every envelope is sealed under a fresh ephemeral key, and the 24-byte
/// XChaCha20 nonce is large enough to be drawn at random.
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;

use crate::crypto::sensitive::SensitiveBytes32;
use crate::error::{LogsealError, Result};

pub const NONCE_LEN: usize = 24;
pub const TAG_LEN: usize = 16;

/// Generate a random 24-byte nonce for XChaCha20-Poly1305.
pub fn generate_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Encrypt with a caller-chosen nonce. Returns ciphertext with the tag appended.
pub fn encrypt_with_nonce(
    key: &SensitiveBytes32,
    nonce: &[u8; NONCE_LEN],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new_from_slice(key.as_bytes())
        .map_err(|e| LogsealError::Encryption(e.to_string()))?;

    let xnonce = XNonce::from_slice(nonce);

    let payload = Payload {
        msg: plaintext,
        aad,
    };

    cipher
        .encrypt(xnonce, payload)
        .map_err(|e| LogsealError::Encryption(e.to_string()))
}

/// Decrypt ciphertext with XChaCha20-Poly1305.
///
/// Only the test harness holds private keys, so only it can get here.
#[cfg(test)]
pub fn decrypt(
    key: &SensitiveBytes32,
    nonce: &[u8; NONCE_LEN],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new_from_slice(key.as_bytes())
        .map_err(|e| LogsealError::Encryption(e.to_string()))?;

    let payload = Payload {
        msg: ciphertext,
        aad,
    };

    cipher
        .decrypt(XNonce::from_slice(nonce), payload)
        .map_err(|e| LogsealError::Encryption(format!("decryption failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> SensitiveBytes32 {
        SensitiveBytes32::new([byte; 32])
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let nonce = generate_nonce();
        let ct = encrypt_with_nonce(&key(1), &nonce, b"kernel: eth0 link up", b"hdr").unwrap();
        assert_eq!(ct.len(), 20 + TAG_LEN);

        let pt = decrypt(&key(1), &nonce, &ct, b"hdr").unwrap();
        assert_eq!(pt, b"kernel: eth0 link up");
    }

    #[test]
    fn test_wrong_key_fails() {
        let nonce = generate_nonce();
        let ct = encrypt_with_nonce(&key(1), &nonce, b"secret", b"").unwrap();
        assert!(decrypt(&key(2), &nonce, &ct, b"").is_err());
    }

    #[test]
    fn test_wrong_aad_fails() {
        let nonce = generate_nonce();
        let ct = encrypt_with_nonce(&key(1), &nonce, b"secret", b"correct aad").unwrap();
        assert!(decrypt(&key(1), &nonce, &ct, b"wrong aad").is_err());
    }

    #[test]
    fn test_empty_plaintext() {
        let nonce = generate_nonce();
        let ct = encrypt_with_nonce(&key(3), &nonce, b"", b"").unwrap();
        assert_eq!(ct.len(), TAG_LEN);
        assert!(decrypt(&key(3), &nonce, &ct, b"").unwrap().is_empty());
    }

    #[test]
    fn test_nonces_are_random() {
        assert_ne!(generate_nonce(), generate_nonce());
    }
}
