// RSA key wrap for bootstrap-mode calls: the per-call AES key and IV are
// serialized as JSON and encrypted under the gateway's public key.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rsa::{pkcs8::DecodePublicKey, Pkcs1v15Encrypt, RsaPublicKey};
use serde::Serialize;
use thiserror::Error;

use super::cbc::KeyMaterial;

/// Baked-in default public key used as a last resort when the configured key
/// fails. Matches the key shipped with the deployed gateway.
pub const DEFAULT_PUBLIC_KEY_PEM: &str = "-----BEGIN PUBLIC KEY-----
MIIBIjANBgkqhkiG9w0BAQEFAAOCAQ8AMIIBCgKCAQEAuR9U470BPBdpB2Me7yqs
/Jt4DeMPYUe2y+nkuQNZzN6WO4B/JBdXkfbAuI+5VtnRPLzecRunANazwfJme6m
PZxd4x+by+JBtnl/G0dZwOsj+IUvZhe8y96ENMAfLBNZwtnx+4S/awOcj+8VNJk
t7zN6EdsAvbBeFw/HyOITNqwfMkPMVdp0+rzd6Uu8A9LBu5xOYCfYTeawtMkdMV
uJ1PMDt6k/MBOrB/JxdYCtITu6w98kt8V+p1dMD961NMBvLCNpxuoC+IT9KxOc0
OsWO51uMEN7Ct5x+4DOYUOqxfM0fMWdJ2OcEt7VNsCPbC/JyPIDeoUe6xtM0tcQ
PJlO8EeLCfZyfYEO4Uvax+c0+cQtZ2fcFOLwIDAQAB
-----END PUBLIC KEY-----";

/// Errors returned while wrapping key material.
#[derive(Debug, Error)]
pub enum KeyWrapError {
    /// No public key is available yet (neither configured nor fetched).
    #[error("no rsa public key available; fetch a key grant first")]
    MissingKey,
    /// The PEM did not parse as an SPKI public key.
    #[error("invalid rsa public key: {0}")]
    InvalidKey(String),
    /// RSA encryption itself failed.
    #[error("rsa encryption failed: {0}")]
    Encrypt(#[from] rsa::Error),
    /// The key/IV document could not be serialized.
    #[error("key document serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct KeyDocument {
    key: String,
    iv: String,
}

/// Normalizes a PEM body: markers and whitespace stripped, re-wrapped at 64
/// columns between standard SPKI markers.
#[must_use]
pub fn normalize_pem(pem: &str) -> String {
    let body: String = pem
        .replace("-----BEGIN PUBLIC KEY-----", "")
        .replace("-----END PUBLIC KEY-----", "")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    wrap_pem(&body)
}

fn wrap_pem(base64_body: &str) -> String {
    if base64_body.is_empty() {
        return String::new();
    }
    let lines: Vec<&str> = base64_body
        .as_bytes()
        .chunks(64)
        .map(|chunk| std::str::from_utf8(chunk).unwrap_or_default())
        .collect();
    format!(
        "-----BEGIN PUBLIC KEY-----\n{}\n-----END PUBLIC KEY-----",
        lines.join("\n")
    )
}

/// Wraps the key material under `pem`, returning base64 ciphertext for the
/// `X-Enc-Key` header.
pub fn wrap(material: &KeyMaterial, pem: &str) -> Result<String, KeyWrapError> {
    let public_key = RsaPublicKey::from_public_key_pem(pem)
        .map_err(|err| KeyWrapError::InvalidKey(err.to_string()))?;
    let document = serde_json::to_string(&KeyDocument {
        key: material.key_base64(),
        iv: material.iv_base64(),
    })?;
    let ciphertext = public_key.encrypt(
        &mut rand::thread_rng(),
        Pkcs1v15Encrypt,
        document.as_bytes(),
    )?;
    Ok(BASE64.encode(ciphertext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;
    use rsa::{pkcs8::EncodePublicKey, Pkcs1v15Encrypt, RsaPrivateKey};

    fn test_keypair() -> (RsaPrivateKey, String) {
        let private = RsaPrivateKey::new(&mut rand::thread_rng(), 1024).expect("keygen");
        let pem = private
            .to_public_key()
            .to_public_key_pem(rsa::pkcs8::LineEnding::LF)
            .expect("pem");
        (private, pem)
    }

    #[test]
    fn wrap_unwraps_to_key_document() {
        let (private, pem) = test_keypair();
        let material = KeyMaterial::random();
        let wrapped = wrap(&material, &pem).expect("wrap");

        let ciphertext = BASE64.decode(wrapped).expect("base64");
        let plaintext = private
            .decrypt(Pkcs1v15Encrypt, &ciphertext)
            .expect("decrypt");
        let document: serde_json::Value = serde_json::from_slice(&plaintext).expect("json");
        assert_eq!(document["key"].as_str().unwrap(), material.key_base64());
        assert_eq!(document["iv"].as_str().unwrap(), material.iv_base64());
    }

    #[test]
    fn rejects_garbage_pem() {
        let material = KeyMaterial::random();
        let err = wrap(&material, "not a key").unwrap_err();
        assert!(matches!(err, KeyWrapError::InvalidKey(_)));
    }

    #[test]
    fn normalize_strips_and_rewraps() {
        let (_, pem) = test_keypair();
        let mangled = pem.replace('\n', "  \n\t");
        let normalized = normalize_pem(&mangled);
        assert!(normalized.starts_with("-----BEGIN PUBLIC KEY-----\n"));
        assert!(normalized.ends_with("\n-----END PUBLIC KEY-----"));
        for line in normalized.lines() {
            assert!(line.len() <= 64 || line.starts_with("-----"));
        }
        // Normalization is idempotent and parse-equivalent.
        assert_eq!(normalize_pem(&normalized), normalized);
        RsaPublicKey::from_public_key_pem(&normalized).expect("normalized pem parses");
    }
}
