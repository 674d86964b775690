// Wire-level envelope types and header names for the gateway protocol.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Header carrying the Unix timestamp of the request.
pub const HDR_TIMESTAMP: &str = "X-Timestamp";
/// Header carrying the per-request nonce.
pub const HDR_NONCE: &str = "X-Nonce";
/// Header carrying the HMAC signature of the envelope.
pub const HDR_SIGNATURE: &str = "X-Signature";
/// Header carrying the device fingerprint.
pub const HDR_DEVICE_ID: &str = "X-Device-Id";
/// Header carrying the session key id (session mode).
pub const HDR_KEY_ID: &str = "X-Key-Id";
/// Header carrying the RSA-wrapped symmetric key (bootstrap mode).
pub const HDR_ENC_KEY: &str = "X-Enc-Key";

/// Path of the single gateway call endpoint.
pub const CALL_PATH: &str = "/x";
/// Path of the key bootstrap endpoint.
pub const KEY_PATH: &str = "/key";

/// Result code meaning success.
pub const CODE_OK: i64 = 0;
/// Result code meaning the caller must re-authenticate.
pub const CODE_UNAUTHORIZED: i64 = 401;
/// Result code meaning the session key has expired.
pub const CODE_SESSION_EXPIRED: i64 = 4011;

/// Request body posted to the gateway: opaque method id plus ciphertext.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestEnvelope {
    /// Opaque method id.
    pub m: String,
    /// Base64 ciphertext of the JSON-serialized parameters.
    pub d: String,
}

/// Response body returned by the gateway.
///
/// When `encrypted` is set, `data` is base64 ciphertext whose plaintext is
/// itself a [`BusinessEnvelope`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub encrypted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// Inner business result carried inside an encrypted response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessEnvelope {
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub data: Value,
}

/// Key reference attached to a request, depending on the key mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyRef {
    /// Session mode: the negotiated key id for `X-Key-Id`.
    SessionKeyId(String),
    /// Bootstrap mode: RSA-wrapped key material for `X-Enc-Key`.
    WrappedKey(String),
}

/// Headers accompanying an envelope POST.
#[derive(Debug, Clone)]
pub struct EnvelopeHeaders {
    /// Unix timestamp in seconds.
    pub timestamp: u64,
    /// Per-request nonce.
    pub nonce: String,
    /// Lowercase-hex HMAC signature.
    pub signature: String,
    /// Device fingerprint.
    pub device_id: String,
    /// Session key id or wrapped key, by mode.
    pub key_ref: KeyRef,
    /// `authorization` header value, only when a token exists.
    pub bearer: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_envelope_uses_short_field_names() {
        let envelope = RequestEnvelope {
            m: "u3a4b5".into(),
            d: "Y2lwaGVydGV4dA==".into(),
        };
        let encoded = serde_json::to_value(&envelope).unwrap();
        assert_eq!(encoded, json!({"m": "u3a4b5", "d": "Y2lwaGVydGV4dA=="}));
    }

    #[test]
    fn response_envelope_defaults_optional_fields() {
        let envelope: ResponseEnvelope =
            serde_json::from_value(json!({"code": 0, "msg": "ok", "data": {"uuid": "abc"}}))
                .unwrap();
        assert_eq!(envelope.code, CODE_OK);
        assert!(!envelope.encrypted);
        assert_eq!(envelope.timestamp, None);
        assert_eq!(envelope.signature, None);
    }

    #[test]
    fn encrypted_response_round_trips_integrity_fields() {
        let envelope: ResponseEnvelope = serde_json::from_value(json!({
            "code": 0,
            "msg": "",
            "data": "Y2lwaGVy",
            "encrypted": true,
            "timestamp": 1_700_000_000u64,
            "signature": "ab12"
        }))
        .unwrap();
        assert!(envelope.encrypted);
        assert_eq!(envelope.timestamp, Some(1_700_000_000));
        assert_eq!(envelope.signature.as_deref(), Some("ab12"));
    }
}
