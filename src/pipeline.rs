// Request pipeline: resolve the wire id, obtain key material for the active
// key mode, encrypt the parameters, and sign the envelope.

use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    config::KeyMode,
    context::CredentialContext,
    crypto::{
        cbc::{self, KeyMaterial},
        keywrap::{self, KeyWrapError},
        nonce, sign,
    },
    envelope::{EnvelopeHeaders, KeyRef, RequestEnvelope},
    gateway::Gateway,
    methods::{MethodMap, MethodMapError},
    session::{SessionError, SessionKeyManager},
};

/// Errors returned while building a request.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The method name has no wire id.
    #[error(transparent)]
    Method(#[from] MethodMapError),
    /// Session key acquisition failed.
    #[error(transparent)]
    Session(#[from] SessionError),
    /// Bootstrap-mode key wrap failed.
    #[error(transparent)]
    KeyWrap(#[from] KeyWrapError),
    /// Parameters could not be serialized.
    #[error("parameter serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A fully built request: envelope, headers, and the key material needed to
/// decrypt the matching response.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    /// Body for `POST /x`.
    pub envelope: RequestEnvelope,
    /// Headers accompanying the envelope.
    pub headers: EnvelopeHeaders,
    /// Material the response decoder decrypts with.
    pub material: KeyMaterial,
}

/// Builds signed, encrypted envelopes for the orchestrator.
pub struct RequestPipeline<G> {
    methods: Arc<MethodMap>,
    context: Arc<CredentialContext>,
    sessions: Arc<SessionKeyManager<G>>,
    mode: KeyMode,
    fallback_public_key_pem: String,
}

impl<G: Gateway> RequestPipeline<G> {
    pub fn new(
        methods: Arc<MethodMap>,
        context: Arc<CredentialContext>,
        sessions: Arc<SessionKeyManager<G>>,
        mode: KeyMode,
        fallback_public_key_pem: Option<String>,
    ) -> Self {
        Self {
            methods,
            context,
            sessions,
            mode,
            fallback_public_key_pem: fallback_public_key_pem
                .unwrap_or_else(|| keywrap::DEFAULT_PUBLIC_KEY_PEM.to_string()),
        }
    }

    /// Resolves, encrypts, and signs one call.
    pub async fn prepare(
        &self,
        method: &str,
        params: &Value,
    ) -> Result<PreparedRequest, PipelineError> {
        let method_id = self.methods.resolve(method)?.to_string();

        let (material, key_ref) = match self.mode {
            KeyMode::Session => {
                let key = self.sessions.acquire().await?;
                (key.material.clone(), KeyRef::SessionKeyId(key.kid))
            }
            KeyMode::Bootstrap => {
                let material = KeyMaterial::random();
                let wrapped = self.wrap_material(&material)?;
                (material, KeyRef::WrappedKey(wrapped))
            }
        };

        let plaintext = serde_json::to_string(params)?;
        let ciphertext = cbc::seal(&material, plaintext.as_bytes());

        let now = SystemTime::now();
        let timestamp = now
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let nonce = nonce::generate(now);
        let signature = sign::compute(
            &self.context.user_secret(),
            &sign::request_signing_string(timestamp, &nonce, &method_id, &ciphertext),
        );

        debug!(method, %method_id, mode = %self.mode, "prepared envelope");

        Ok(PreparedRequest {
            envelope: RequestEnvelope {
                m: method_id,
                d: ciphertext,
            },
            headers: EnvelopeHeaders {
                timestamp,
                nonce,
                signature,
                device_id: self.context.device_id(),
                key_ref,
                bearer: self.context.bearer_token(),
            },
            material,
        })
    }

    /// Wraps bootstrap key material under the current public key, falling
    /// back to the configured default and remembering whichever key worked.
    fn wrap_material(&self, material: &KeyMaterial) -> Result<String, KeyWrapError> {
        let pem = self
            .context
            .public_key_pem()
            .ok_or(KeyWrapError::MissingKey)?;
        match keywrap::wrap(material, &pem) {
            Ok(wrapped) => Ok(wrapped),
            Err(err) => {
                warn!(%err, "key wrap failed under configured public key, trying fallback");
                let fallback = keywrap::normalize_pem(&self.fallback_public_key_pem);
                let wrapped = keywrap::wrap(material, &fallback)?;
                self.context.set_public_key(&fallback);
                Ok(wrapped)
            }
        }
    }
}
