// Response verification and decoding: integrity check, decryption, and
// business-code classification.

use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    context::CredentialContext,
    crypto::{
        cbc::{self, CipherError, KeyMaterial},
        sign,
    },
    envelope::{BusinessEnvelope, ResponseEnvelope, CODE_OK, CODE_SESSION_EXPIRED, CODE_UNAUTHORIZED},
};

/// Tolerated distance between the response timestamp and the local clock
/// before the response is flagged as a possible replay. Detection only; the
/// response is still processed.
pub const MAX_RESPONSE_SKEW_SECS: u64 = 300;

const SESSION_EXPIRED_MARKER: &str = "session key expired";

/// Errors returned while decoding a response.
///
/// The first four variants are transport-level failures (bad key, corrupted
/// payload, protocol break); the last two carry a clean business code and
/// must never be conflated with them.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Response signature did not match the recomputed one.
    #[error("response integrity check failed")]
    Integrity,
    /// Ciphertext failed to decrypt.
    #[error(transparent)]
    Cipher(#[from] CipherError),
    /// Decrypted plaintext was not a valid business envelope.
    #[error("response parse failed: {0}")]
    Parse(#[from] serde_json::Error),
    /// Envelope shape violated the protocol.
    #[error("malformed response envelope: {0}")]
    Malformed(&'static str),
    /// The session key expired; the orchestrator may retry once.
    #[error("session key expired: {msg}")]
    SessionExpired {
        /// Server-provided message.
        msg: String,
    },
    /// Clean non-zero business code, surfaced to the caller without retry.
    #[error("business error {code}: {msg}")]
    Business {
        /// Result code from the gateway.
        code: i64,
        /// Server-provided message.
        msg: String,
    },
}

/// Verifies, decrypts, and classifies a response envelope.
pub fn decode(
    envelope: &ResponseEnvelope,
    material: &KeyMaterial,
    context: &CredentialContext,
) -> Result<Value, DecodeError> {
    if !envelope.encrypted {
        return classify(envelope.code, &envelope.msg, envelope.data.clone(), context);
    }

    let ciphertext = envelope
        .data
        .as_str()
        .ok_or(DecodeError::Malformed("encrypted data is not a string"))?;

    match (envelope.signature.as_deref(), envelope.timestamp) {
        (Some(signature), Some(timestamp)) => {
            let message = sign::response_signing_string(timestamp, ciphertext);
            sign::verify(&context.user_secret(), &message, signature)
                .map_err(|_| DecodeError::Integrity)?;

            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs();
            if now.abs_diff(timestamp) > MAX_RESPONSE_SKEW_SECS {
                warn!(
                    timestamp,
                    now, "response timestamp outside tolerance, possible replay"
                );
            }
        }
        _ => debug!("response carries no integrity fields"),
    }

    let plaintext = cbc::open(material, ciphertext)?;
    let inner: BusinessEnvelope = serde_json::from_slice(&plaintext)?;
    classify(inner.code, &inner.msg, inner.data, context)
}

fn classify(
    code: i64,
    msg: &str,
    data: Value,
    context: &CredentialContext,
) -> Result<Value, DecodeError> {
    if code == CODE_OK {
        return Ok(data);
    }
    if code == CODE_SESSION_EXPIRED || msg.contains(SESSION_EXPIRED_MARKER) {
        return Err(DecodeError::SessionExpired {
            msg: msg.to_string(),
        });
    }
    if code == CODE_UNAUTHORIZED {
        // Login is no longer valid; drop local credentials so the next
        // cycle re-authenticates.
        context.clear_credentials();
    }
    Err(DecodeError::Business {
        code,
        msg: msg.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
    use serde_json::json;

    use crate::context::{MemoryCredentialStore, StoredCredentials};

    fn context_with_secret(secret: &str) -> CredentialContext {
        CredentialContext::open(
            MemoryCredentialStore::with_credentials(StoredCredentials {
                device_id: "device".into(),
                token: Some("tok".into()),
                user_secret: Some(secret.into()),
            }),
            None,
        )
        .expect("context")
    }

    fn encrypted_envelope(
        inner: Value,
        material: &KeyMaterial,
        secret: Option<&str>,
    ) -> ResponseEnvelope {
        let ciphertext = cbc::seal(material, inner.to_string().as_bytes());
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        let signature = secret.map(|secret| {
            sign::compute(secret, &sign::response_signing_string(timestamp, &ciphertext))
        });
        ResponseEnvelope {
            code: 0,
            msg: String::new(),
            data: Value::String(ciphertext),
            encrypted: true,
            timestamp: signature.as_ref().map(|_| timestamp),
            signature,
        }
    }

    #[test]
    fn plaintext_success_returns_data() {
        let context = context_with_secret("s");
        let envelope: ResponseEnvelope =
            serde_json::from_value(json!({"code": 0, "msg": "", "data": {"uuid": "abc"}}))
                .unwrap();
        let data = decode(&envelope, &KeyMaterial::random(), &context).expect("decode");
        assert_eq!(data, json!({"uuid": "abc"}));
    }

    #[test]
    fn plaintext_unauthorized_clears_credentials() {
        let context = context_with_secret("s");
        let envelope: ResponseEnvelope =
            serde_json::from_value(json!({"code": 401, "msg": "login invalid"})).unwrap();
        let err = decode(&envelope, &KeyMaterial::random(), &context).unwrap_err();
        assert!(matches!(err, DecodeError::Business { code: 401, .. }));
        assert_eq!(context.bearer_token(), None);
        assert_eq!(context.user_secret(), "");
    }

    #[test]
    fn plaintext_session_expired_is_classified() {
        let context = context_with_secret("s");
        let envelope: ResponseEnvelope =
            serde_json::from_value(json!({"code": 4011, "msg": "key expired"})).unwrap();
        let err = decode(&envelope, &KeyMaterial::random(), &context).unwrap_err();
        assert!(matches!(err, DecodeError::SessionExpired { .. }));
    }

    #[test]
    fn expiry_message_marker_is_classified_without_code() {
        let context = context_with_secret("s");
        let envelope: ResponseEnvelope = serde_json::from_value(
            json!({"code": 500, "msg": "session key expired, refresh required"}),
        )
        .unwrap();
        let err = decode(&envelope, &KeyMaterial::random(), &context).unwrap_err();
        assert!(matches!(err, DecodeError::SessionExpired { .. }));
    }

    #[test]
    fn encrypted_success_verifies_and_decrypts() {
        let context = context_with_secret("shared");
        let material = KeyMaterial::random();
        let envelope = encrypted_envelope(
            json!({"code": 0, "msg": "", "data": {"items": [1, 2]}}),
            &material,
            Some("shared"),
        );
        let data = decode(&envelope, &material, &context).expect("decode");
        assert_eq!(data, json!({"items": [1, 2]}));
    }

    #[test]
    fn tampered_ciphertext_is_an_integrity_error() {
        let context = context_with_secret("shared");
        let material = KeyMaterial::random();
        let mut envelope = encrypted_envelope(
            json!({"code": 0, "msg": "", "data": {}}),
            &material,
            Some("shared"),
        );

        // Flip one byte of the ciphertext and re-encode.
        let mut bytes = BASE64
            .decode(envelope.data.as_str().unwrap())
            .expect("base64");
        bytes[0] ^= 0x01;
        envelope.data = Value::String(BASE64.encode(bytes));

        let err = decode(&envelope, &material, &context).unwrap_err();
        assert!(matches!(err, DecodeError::Integrity));
    }

    #[test]
    fn unsigned_encrypted_response_still_decrypts() {
        let context = context_with_secret("shared");
        let material = KeyMaterial::random();
        let envelope = encrypted_envelope(
            json!({"code": 0, "msg": "", "data": {"ok": true}}),
            &material,
            None,
        );
        let data = decode(&envelope, &material, &context).expect("decode");
        assert_eq!(data, json!({"ok": true}));
    }

    #[test]
    fn wrong_key_is_a_cipher_error_not_business() {
        let context = context_with_secret("shared");
        let material = KeyMaterial::random();
        let envelope = encrypted_envelope(json!({"code": 0, "data": {}}), &material, None);
        let err = decode(&envelope, &KeyMaterial::random(), &context).unwrap_err();
        // Accidentally valid padding still yields unparseable garbage.
        assert!(matches!(err, DecodeError::Cipher(_) | DecodeError::Parse(_)));
    }

    #[test]
    fn inner_business_error_survives_decryption() {
        let context = context_with_secret("shared");
        let material = KeyMaterial::random();
        let envelope = encrypted_envelope(
            json!({"code": 1001, "msg": "insufficient coins", "data": null}),
            &material,
            Some("shared"),
        );
        let err = decode(&envelope, &material, &context).unwrap_err();
        match err {
            DecodeError::Business { code, msg } => {
                assert_eq!(code, 1001);
                assert_eq!(msg, "insufficient coins");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn encrypted_unauthorized_clears_credentials() {
        let context = context_with_secret("shared");
        let material = KeyMaterial::random();
        let envelope = encrypted_envelope(
            json!({"code": 401, "msg": "login invalid", "data": null}),
            &material,
            Some("shared"),
        );
        let err = decode(&envelope, &material, &context).unwrap_err();
        assert!(matches!(err, DecodeError::Business { code: 401, .. }));
        assert_eq!(context.bearer_token(), None);
    }

    #[test]
    fn stale_timestamp_is_tolerated_when_signature_matches() {
        let context = context_with_secret("shared");
        let material = KeyMaterial::random();
        let inner = json!({"code": 0, "msg": "", "data": 42});
        let ciphertext = cbc::seal(&material, inner.to_string().as_bytes());
        let stale = 1_000_000u64;
        let signature =
            sign::compute("shared", &sign::response_signing_string(stale, &ciphertext));
        let envelope = ResponseEnvelope {
            code: 0,
            msg: String::new(),
            data: Value::String(ciphertext),
            encrypted: true,
            timestamp: Some(stale),
            signature: Some(signature),
        };
        // Skew is logged, not enforced.
        let data = decode(&envelope, &material, &context).expect("decode");
        assert_eq!(data, json!(42));
    }
}
