//! Field-level encryption for personal data, plus a blind index for equality search.
//!
//! Both keys are derived from one raw secret with distinct HMAC labels, so the
//! index key can never be used to decrypt and vice versa.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, Secret};
use sha2::Sha256;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

const ENCRYPTION_LABEL: &[u8] = b"field-encryption";
const BLIND_INDEX_LABEL: &[u8] = b"blind-index";
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CipherError {
    #[error("malformed ciphertext")]
    Malformed,
    #[error("decryption failed")]
    DecryptionFailed,
    #[error("encryption failed")]
    EncryptionFailed,
    #[error("invalid key material")]
    InvalidKey,
}

/// A PII column value and its search column, written together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedField {
    pub ciphertext: String,
    pub blind_index: String,
}

#[derive(Clone)]
pub struct FieldCipher {
    cipher: Aes256Gcm,
    index_key: [u8; 32],
}

impl fmt::Debug for FieldCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FieldCipher(***)")
    }
}

fn derive_key(raw: &[u8], label: &[u8]) -> Result<[u8; 32], CipherError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(raw).map_err(|_| CipherError::InvalidKey)?;
    mac.update(label);
    Ok(mac.finalize().into_bytes().into())
}

impl FieldCipher {
    pub fn new(raw_key: &Secret<String>) -> Result<Self, CipherError> {
        let raw = raw_key.expose_secret().as_bytes();
        if raw.is_empty() {
            return Err(CipherError::InvalidKey);
        }

        let encryption_key = derive_key(raw, ENCRYPTION_LABEL)?;
        let index_key = derive_key(raw, BLIND_INDEX_LABEL)?;

        Ok(Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&encryption_key)),
            index_key,
        })
    }

    /// Encrypt to base64(nonce || ciphertext || tag). A fresh random nonce per call.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| CipherError::EncryptionFailed)?;

        let mut envelope = Vec::with_capacity(NONCE_LEN + sealed.len());
        envelope.extend_from_slice(&nonce);
        envelope.extend_from_slice(&sealed);
        Ok(STANDARD.encode(envelope))
    }

    pub fn decrypt(&self, envelope: &str) -> Result<String, CipherError> {
        if envelope.is_empty() {
            return Ok(String::new());
        }

        let bytes = STANDARD
            .decode(envelope)
            .map_err(|_| CipherError::Malformed)?;
        if bytes.len() < NONCE_LEN + TAG_LEN {
            return Err(CipherError::Malformed);
        }

        let (nonce, sealed) = bytes.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| CipherError::DecryptionFailed)?;

        String::from_utf8(plaintext).map_err(|_| CipherError::Malformed)
    }

    /// Lowercase hex HMAC-SHA-256 of the plaintext under the index key.
    pub fn blind_index(&self, plaintext: &str) -> Result<String, CipherError> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        let mut mac =
            <HmacSha256 as Mac>::new_from_slice(&self.index_key).map_err(|_| CipherError::InvalidKey)?;
        mac.update(plaintext.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    pub fn seal(&self, plaintext: &str) -> Result<SealedField, CipherError> {
        Ok(SealedField {
            ciphertext: self.encrypt(plaintext)?,
            blind_index: self.blind_index(plaintext)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn cipher(raw: &str) -> FieldCipher {
        FieldCipher::new(&Secret::new(raw.to_string())).unwrap()
    }

    #[test]
    fn test_round_trip() {
        let c = cipher("field-key");
        let envelope = c.encrypt("+66 81 234 5678").unwrap();
        assert_ne!(envelope, "+66 81 234 5678");
        assert_eq!(c.decrypt(&envelope).unwrap(), "+66 81 234 5678");
    }

    #[test]
    fn test_fresh_nonce_per_encryption() {
        let c = cipher("field-key");
        let a = c.encrypt("1234567890123").unwrap();
        let b = c.encrypt("1234567890123").unwrap();
        assert_ne!(a, b);
        assert_eq!(c.decrypt(&a).unwrap(), c.decrypt(&b).unwrap());
    }

    #[test]
    fn test_single_bit_tamper_fails_closed() {
        let c = cipher("field-key");
        let envelope = c.encrypt("bank-account-001").unwrap();
        let bytes = STANDARD.decode(&envelope).unwrap();

        for position in [0, NONCE_LEN, bytes.len() - 1] {
            let mut tampered = bytes.clone();
            tampered[position] ^= 0x01;
            assert_eq!(
                c.decrypt(&STANDARD.encode(&tampered)),
                Err(CipherError::DecryptionFailed)
            );
        }
    }

    #[test]
    fn test_malformed_envelopes() {
        let c = cipher("field-key");
        assert_eq!(c.decrypt("%%% not base64"), Err(CipherError::Malformed));
        assert_eq!(
            c.decrypt(&STANDARD.encode([0u8; NONCE_LEN + TAG_LEN - 1])),
            Err(CipherError::Malformed)
        );
    }

    #[test]
    fn test_wrong_key_cannot_decrypt() {
        let envelope = cipher("key-a").encrypt("secret").unwrap();
        assert_eq!(
            cipher("key-b").decrypt(&envelope),
            Err(CipherError::DecryptionFailed)
        );
    }

    #[test]
    fn test_empty_in_empty_out() {
        let c = cipher("field-key");
        assert_eq!(c.encrypt("").unwrap(), "");
        assert_eq!(c.decrypt("").unwrap(), "");
        assert_eq!(c.blind_index("").unwrap(), "");
    }

    #[test]
    fn test_blind_index_deterministic_and_distinct() {
        let c = cipher("field-key");
        assert_eq!(c.blind_index("0812345678").unwrap(), c.blind_index("0812345678").unwrap());

        let indexes: HashSet<String> = (0..200)
            .map(|i| c.blind_index(&format!("08{:08}", i)).unwrap())
            .collect();
        assert_eq!(indexes.len(), 200);

        let index = c.blind_index("0812345678").unwrap();
        assert_eq!(index.len(), 64);
        assert!(index.chars().all(|ch| ch.is_ascii_hexdigit() && !ch.is_ascii_uppercase()));
    }

    #[test]
    fn test_blind_index_depends_on_key() {
        assert_ne!(
            cipher("key-a").blind_index("value").unwrap(),
            cipher("key-b").blind_index("value").unwrap()
        );
    }

    #[test]
    fn test_keys_are_domain_separated() {
        let raw = b"field-key";
        assert_ne!(
            derive_key(raw, ENCRYPTION_LABEL).unwrap(),
            derive_key(raw, BLIND_INDEX_LABEL).unwrap()
        );
    }

    #[test]
    fn test_seal() {
        let c = cipher("field-key");
        let sealed = c.seal("0812345678").unwrap();
        assert_eq!(c.decrypt(&sealed.ciphertext).unwrap(), "0812345678");
        assert_eq!(sealed.blind_index, c.blind_index("0812345678").unwrap());
    }

    #[test]
    fn test_empty_key_rejected() {
        assert_eq!(
            FieldCipher::new(&Secret::new(String::new())).unwrap_err(),
            CipherError::InvalidKey
        );
    }
}
