// AES-256-CBC payload protection with PKCS#7 padding.
// Ciphertext travels as standard base64 text inside the envelope.

use aes::Aes256;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use thiserror::Error;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Symmetric key length in bytes.
pub const KEY_LEN: usize = 32;

/// Initialization vector length in bytes.
pub const IV_LEN: usize = 16;

/// Errors returned by the symmetric cipher helpers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CipherError {
    /// Key material was not valid base64.
    #[error("invalid base64 key material: {0}")]
    Base64(#[from] base64::DecodeError),
    /// Decoded key had the wrong length.
    #[error("invalid key length: expected {KEY_LEN}, got {0}")]
    KeyLength(usize),
    /// Decoded IV had the wrong length.
    #[error("invalid iv length: expected {IV_LEN}, got {0}")]
    IvLength(usize),
    /// Ciphertext failed to decrypt or unpad.
    #[error("decryption failed")]
    Decrypt,
}

/// Symmetric key and IV pair used to protect one or more envelopes.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    /// AES-256 key bytes.
    pub key: [u8; KEY_LEN],
    /// CBC initialization vector.
    pub iv: [u8; IV_LEN],
}

impl KeyMaterial {
    /// Creates key material from raw bytes.
    #[must_use]
    pub const fn new(key: [u8; KEY_LEN], iv: [u8; IV_LEN]) -> Self {
        Self { key, iv }
    }

    /// Generates fresh random key material for bootstrap-mode calls.
    #[must_use]
    pub fn random() -> Self {
        let mut key = [0u8; KEY_LEN];
        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut key);
        rand::thread_rng().fill_bytes(&mut iv);
        Self { key, iv }
    }

    /// Parses base64-encoded key and IV as delivered by the key grant.
    pub fn from_base64(key_b64: &str, iv_b64: &str) -> Result<Self, CipherError> {
        let key_bytes = BASE64.decode(key_b64)?;
        let iv_bytes = BASE64.decode(iv_b64)?;
        let key: [u8; KEY_LEN] = key_bytes
            .try_into()
            .map_err(|bytes: Vec<u8>| CipherError::KeyLength(bytes.len()))?;
        let iv: [u8; IV_LEN] = iv_bytes
            .try_into()
            .map_err(|bytes: Vec<u8>| CipherError::IvLength(bytes.len()))?;
        Ok(Self { key, iv })
    }

    /// Returns the key as base64 text.
    #[must_use]
    pub fn key_base64(&self) -> String {
        BASE64.encode(self.key)
    }

    /// Returns the IV as base64 text.
    #[must_use]
    pub fn iv_base64(&self) -> String {
        BASE64.encode(self.iv)
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("KeyMaterial(..)")
    }
}

/// Encrypts `plaintext`, returning the base64 ciphertext carried on the wire.
#[must_use]
pub fn seal(material: &KeyMaterial, plaintext: &[u8]) -> String {
    let ciphertext = Aes256CbcEnc::new(&material.key.into(), &material.iv.into())
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext);
    BASE64.encode(ciphertext)
}

/// Decrypts base64 ciphertext produced by [`seal`].
pub fn open(material: &KeyMaterial, ciphertext_b64: &str) -> Result<Vec<u8>, CipherError> {
    let ciphertext = BASE64.decode(ciphertext_b64)?;
    Aes256CbcDec::new(&material.key.into(), &material.iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map_err(|_| CipherError::Decrypt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;
    use proptest::prelude::*;

    #[test]
    fn round_trip() {
        let material = KeyMaterial::random();
        let plaintext = br#"{"page":1,"pageSize":20}"#;
        let ciphertext = seal(&material, plaintext);
        let recovered = open(&material, &ciphertext).expect("open");
        assert_eq!(recovered, plaintext);
    }

    #[test]
    fn base64_material_round_trip() {
        let material = KeyMaterial::random();
        let parsed = KeyMaterial::from_base64(&material.key_base64(), &material.iv_base64())
            .expect("parse");
        assert_eq!(parsed, material);
    }

    #[test]
    fn rejects_short_key() {
        let key = BASE64.encode([1u8; 16]);
        let iv = BASE64.encode([2u8; IV_LEN]);
        assert_eq!(
            KeyMaterial::from_base64(&key, &iv),
            Err(CipherError::KeyLength(16))
        );
    }

    #[test]
    fn rejects_wrong_key() {
        let material = KeyMaterial::random();
        let ciphertext = seal(&material, b"payload");
        let other = KeyMaterial::random();
        // A wrong key either fails the padding check or yields garbage.
        assert_ne!(open(&other, &ciphertext).ok(), Some(b"payload".to_vec()));
    }

    proptest! {
        #[test]
        fn arbitrary_payload_round_trips(payload in prop::collection::vec(any::<u8>(), 0..2048)) {
            let material = KeyMaterial::random();
            let ciphertext = seal(&material, &payload);
            let recovered = open(&material, &ciphertext).expect("open");
            prop_assert_eq!(recovered, payload);
        }
    }
}
