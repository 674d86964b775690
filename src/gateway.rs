// Gateway transport seam: key bootstrap GET and envelope POST. The trait
// exists so the orchestrator and session manager can be driven by scripted
// fakes in tests; production uses the reqwest-backed implementation.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::{
    config::ClientConfig,
    envelope::{
        EnvelopeHeaders, KeyRef, RequestEnvelope, ResponseEnvelope, CALL_PATH, HDR_DEVICE_ID,
        HDR_ENC_KEY, HDR_KEY_ID, HDR_NONCE, HDR_SIGNATURE, HDR_TIMESTAMP, KEY_PATH,
    },
};

/// Errors returned by gateway transports.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Gateway answered with a non-success HTTP status.
    #[error("gateway returned http status {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },
    /// Gateway answered with something other than JSON.
    #[error("gateway returned non-json content type '{content_type}'")]
    ContentType {
        /// Content type observed on the response.
        content_type: String,
    },
    /// Network-level or body-decode failure from the HTTP client.
    #[error("gateway transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Identity data attached to a key bootstrap request.
#[derive(Debug, Clone)]
pub struct KeyRequest {
    /// Device fingerprint for `X-Device-Id`.
    pub device_id: String,
    /// `authorization` header value, when a token exists.
    pub bearer: Option<String>,
}

/// Body of the key bootstrap response.
#[derive(Debug, Clone, Deserialize)]
pub struct KeyEnvelope {
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub data: Option<KeyGrant>,
}

/// Key material granted by the gateway, with optional piggybacked updates.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyGrant {
    /// Opaque key id echoed back as `X-Key-Id`.
    pub kid: String,
    /// Base64 AES key.
    pub key: String,
    /// Base64 initialization vector.
    pub iv: String,
    /// Key lifetime in seconds.
    pub ttl: u64,
    /// Server clock at issuance, Unix seconds.
    #[serde(default)]
    pub server_time: u64,
    /// Replacement RSA public key, when the gateway rotated it.
    #[serde(default)]
    pub public_key: Option<String>,
    /// Replacement shared signing secret.
    #[serde(default)]
    pub user_secret: Option<String>,
}

/// Transport operations the protocol rides on.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Fetches a session key grant from `GET {base}/key`.
    async fn fetch_key(&self, request: &KeyRequest) -> Result<KeyEnvelope, GatewayError>;

    /// Posts an encrypted envelope to `POST {base}/x`.
    async fn exchange(
        &self,
        envelope: &RequestEnvelope,
        headers: &EnvelopeHeaders,
    ) -> Result<ResponseEnvelope, GatewayError>;
}

/// Production gateway on top of reqwest with rustls and a request timeout.
pub struct HttpGateway {
    base_url: String,
    http: reqwest::Client,
}

impl HttpGateway {
    /// Builds the HTTP client from configuration.
    pub fn new(config: &ClientConfig) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
        })
    }
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn fetch_key(&self, request: &KeyRequest) -> Result<KeyEnvelope, GatewayError> {
        let mut builder = self
            .http
            .get(format!("{}{}", self.base_url, KEY_PATH))
            .header(HDR_DEVICE_ID, &request.device_id)
            .header(reqwest::header::ACCEPT, "application/json")
            .header(reqwest::header::CACHE_CONTROL, "no-cache");
        if let Some(bearer) = &request.bearer {
            builder = builder.header(reqwest::header::AUTHORIZATION, bearer);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Status {
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.contains("application/json") {
            return Err(GatewayError::ContentType { content_type });
        }

        Ok(response.json().await?)
    }

    async fn exchange(
        &self,
        envelope: &RequestEnvelope,
        headers: &EnvelopeHeaders,
    ) -> Result<ResponseEnvelope, GatewayError> {
        let mut builder = self
            .http
            .post(format!("{}{}", self.base_url, CALL_PATH))
            .header(HDR_TIMESTAMP, headers.timestamp.to_string())
            .header(HDR_NONCE, &headers.nonce)
            .header(HDR_SIGNATURE, &headers.signature)
            .header(HDR_DEVICE_ID, &headers.device_id)
            .json(envelope);

        builder = match &headers.key_ref {
            KeyRef::SessionKeyId(kid) => builder.header(HDR_KEY_ID, kid),
            KeyRef::WrappedKey(wrapped) => builder.header(HDR_ENC_KEY, wrapped),
        };
        if let Some(bearer) = &headers.bearer {
            builder = builder.header(reqwest::header::AUTHORIZATION, bearer);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Status {
                status: status.as_u16(),
            });
        }

        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_grant_parses_camel_case_fields() {
        let envelope: KeyEnvelope = serde_json::from_value(json!({
            "code": 0,
            "msg": "",
            "data": {
                "kid": "k-1",
                "key": "a2V5",
                "iv": "aXY=",
                "ttl": 600,
                "serverTime": 1_700_000_000u64,
                "publicKey": "-----BEGIN PUBLIC KEY-----",
                "userSecret": "s3cret"
            }
        }))
        .unwrap();
        let grant = envelope.data.expect("grant");
        assert_eq!(grant.kid, "k-1");
        assert_eq!(grant.ttl, 600);
        assert_eq!(grant.server_time, 1_700_000_000);
        assert_eq!(grant.user_secret.as_deref(), Some("s3cret"));
    }

    #[test]
    fn key_grant_piggyback_fields_are_optional() {
        let envelope: KeyEnvelope = serde_json::from_value(json!({
            "code": 0,
            "data": {"kid": "k-2", "key": "a2V5", "iv": "aXY=", "ttl": 60}
        }))
        .unwrap();
        let grant = envelope.data.expect("grant");
        assert_eq!(grant.public_key, None);
        assert_eq!(grant.user_secret, None);
        assert_eq!(grant.server_time, 0);
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let config = ClientConfig::new("https://gw.example.com/");
        let gateway = HttpGateway::new(&config).expect("build");
        assert_eq!(gateway.base_url, "https://gw.example.com");
    }
}
