// Envelope signatures based on HMAC-SHA256, carried as lowercase hex.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Errors returned by signature verification.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    /// Computed signature did not match the provided one.
    #[error("signature verification failed")]
    VerificationFailed,
}

/// Computes the hex signature for `message` under the shared secret.
#[must_use]
pub fn compute(secret: &str, message: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac key length should be valid");
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a hex signature against the message.
///
/// Comparison is constant-time; an ordinary string equality would leak the
/// matching prefix length through timing.
pub fn verify(secret: &str, message: &str, signature: &str) -> Result<(), SignatureError> {
    let expected = compute(secret, message);
    if expected.as_bytes().ct_eq(signature.as_bytes()).into() {
        Ok(())
    } else {
        Err(SignatureError::VerificationFailed)
    }
}

/// Builds the request string-to-sign from its envelope fields.
#[must_use]
pub fn request_signing_string(
    timestamp: u64,
    nonce: &str,
    method_id: &str,
    ciphertext: &str,
) -> String {
    format!("{timestamp}\n{nonce}\n{method_id}\n{ciphertext}")
}

/// Builds the response string-to-sign from its envelope fields.
#[must_use]
pub fn response_signing_string(timestamp: u64, ciphertext: &str) -> String {
    format!("{timestamp}\n{ciphertext}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn computes_and_verifies() {
        let signature = compute("secret", "1700000000\nnonce\nu3a4b5\nY2lwaGVy");
        assert_eq!(signature.len(), 64);
        assert!(verify("secret", "1700000000\nnonce\nu3a4b5\nY2lwaGVy", &signature).is_ok());
    }

    #[test]
    fn rejects_modified_message() {
        let signature = compute("secret", "message");
        assert_eq!(
            verify("secret", "message2", &signature),
            Err(SignatureError::VerificationFailed)
        );
    }

    #[test]
    fn rejects_wrong_secret() {
        let signature = compute("secret", "message");
        assert_eq!(
            verify("other", "message", &signature),
            Err(SignatureError::VerificationFailed)
        );
    }

    #[test]
    fn rejects_truncated_signature() {
        let signature = compute("secret", "message");
        assert_eq!(
            verify("secret", "message", &signature[..32]),
            Err(SignatureError::VerificationFailed)
        );
    }

    #[test]
    fn signing_strings_join_with_newlines() {
        assert_eq!(
            request_signing_string(12, "n", "m1", "ct"),
            "12\nn\nm1\nct"
        );
        assert_eq!(response_signing_string(12, "ct"), "12\nct");
    }
}
