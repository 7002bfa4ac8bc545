//! AEAD sealing primitives, certificate composition, and block hashing.
//!
//! The on-disk and certificate encryption both use a small versioned token
//! format: one version byte, a random 24-byte nonce, then the ciphertext
//! (with an appended authentication tag). This plays the same role the
//! original system's Fernet tokens did, built on a modern AEAD primitive
//! instead.

use argon2::Argon2;
use crypto_secretbox::aead::{Aead, KeyInit};
use crypto_secretbox::{Key, Nonce, XSalsa20Poly1305};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::CoreError;

const TOKEN_VERSION: u8 = 1;
const NONCE_LEN: usize = 24;
const SALT_LEN: usize = 16;

/// A symmetric key derived from a passphrase-equivalent secret, ready to
/// seal/open versioned tokens.
#[derive(Clone)]
pub struct SealingKey {
    key: Key,
}

impl SealingKey {
    /// Derive a key from raw secret bytes (e.g. the `AUTH_KEY` material) and
    /// a salt. When `salt` is `None`, a fresh random salt is generated and
    /// returned alongside the key — used the first time a store is sealed.
    pub fn derive(secret: &[u8], salt: Option<[u8; SALT_LEN]>) -> ([u8; SALT_LEN], Self) {
        let salt = salt.unwrap_or_else(|| {
            let mut s = [0u8; SALT_LEN];
            rand::thread_rng().fill_bytes(&mut s);
            s
        });
        let mut derived = [0u8; 32];
        Argon2::default()
            .hash_password_into(secret, &salt, &mut derived)
            .expect("argon2 output length is fixed and always valid");
        (salt, SealingKey { key: *Key::from_slice(&derived) })
    }

    pub fn seal(&self, plaintext: &[u8]) -> Vec<u8> {
        let cipher = XSalsa20Poly1305::new(&self.key);
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .expect("encryption over an in-memory buffer cannot fail");

        let mut token = Vec::with_capacity(1 + NONCE_LEN + ciphertext.len());
        token.push(TOKEN_VERSION);
        token.extend_from_slice(&nonce_bytes);
        token.extend_from_slice(&ciphertext);
        token
    }

    pub fn open(&self, token: &[u8]) -> Result<Vec<u8>, CoreError> {
        if token.len() < 1 + NONCE_LEN {
            return Err(CoreError::Integrity("token too short".into()));
        }
        if token[0] != TOKEN_VERSION {
            return Err(CoreError::Integrity("unsupported token version".into()));
        }
        let nonce = Nonce::from_slice(&token[1..1 + NONCE_LEN]);
        let ciphertext = &token[1 + NONCE_LEN..];
        let cipher = XSalsa20Poly1305::new(&self.key);
        cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CoreError::Integrity("invalid token: decryption failed".into()))
    }
}

/// SHA-256 hex digest of arbitrary bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex::encode(digest)
}

/// True if `hash` begins with `difficulty` zero hex digits.
pub fn meets_difficulty(hash: &str, difficulty: usize) -> bool {
    hash.as_bytes().iter().take(difficulty).all(|&b| b == b'0') && hash.len() >= difficulty
}

/// Composes the association-certificate plaintext exactly as specified:
/// fixed slices of the secret key interleaved with the handshake's
/// credentials and the issuance instant.
pub fn compose_certificate_plaintext(
    secret_key: &[u8],
    session: &str,
    source_address: &str,
    acceptance_code: &str,
    issued_at: chrono::DateTime<chrono::Utc>,
) -> Result<String, CoreError> {
    if secret_key.len() < 64 {
        return Err(CoreError::Configuration("secret key shorter than 64 bytes".into()));
    }
    let mut out = String::new();
    out.push_str(&hex::encode(&secret_key[0..16]));
    out.push_str(session);
    out.push_str(&hex::encode(&secret_key[32..48]));
    out.push_str(source_address);
    out.push_str(&hex::encode(&secret_key[48..64]));
    out.push_str(acceptance_code);
    out.push_str(&hex::encode(&secret_key[16..32]));
    out.push_str(&issued_at.to_rfc3339());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_then_open_round_trips() {
        let (salt, key) = SealingKey::derive(b"a shared secret", None);
        let token = key.seal(b"hello world");
        let (_, reopened_key) = SealingKey::derive(b"a shared secret", Some(salt));
        let plaintext = reopened_key.open(&token).unwrap();
        assert_eq!(plaintext, b"hello world");
    }

    #[test]
    fn tampered_token_fails_to_open() {
        let (_, key) = SealingKey::derive(b"a shared secret", None);
        let mut token = key.seal(b"hello world");
        let last = token.len() - 1;
        token[last] ^= 0xFF;
        assert!(key.open(&token).is_err());
    }

    #[test]
    fn difficulty_prefix_check() {
        assert!(meets_difficulty("0000abc", 4));
        assert!(!meets_difficulty("0001abc", 4));
    }
}
