// Call orchestrator: prepare, exchange, decode, with a bounded replay when
// the gateway reports session key expiry.

use std::{fmt, sync::Arc};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    config::{ClientConfig, ConfigError},
    context::{CredentialContext, CredentialStore, FileCredentialStore, StoreError},
    decode::{self, DecodeError},
    gateway::{Gateway, GatewayError, HttpGateway},
    methods::MethodMap,
    metrics::{Metrics, MetricsError},
    pipeline::{PipelineError, RequestPipeline},
    session::SessionKeyManager,
};

/// Maximum attempts for a single logical call: the original send plus one
/// replay after a key renegotiation.
pub const MAX_ATTEMPTS: u32 = 2;

/// Errors surfaced while constructing a client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Metrics(#[from] MetricsError),
}

/// Errors surfaced by a gateway call.
#[derive(Debug, Error)]
pub enum CallError {
    /// Request construction failed.
    #[error(transparent)]
    Prepare(#[from] PipelineError),
    /// Network round trip failed.
    #[error(transparent)]
    Transport(#[from] GatewayError),
    /// Response verification, decryption, or the business result failed.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// Every attempt ended with a session key rejection.
    #[error("gateway rejected the session key {attempts} times")]
    RetriesExhausted {
        /// Attempts made before giving up.
        attempts: u32,
    },
}

/// Logical HTTP verb of the caller's intent. Recorded for diagnostics; on
/// the wire every call is a `POST /x`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
    Post,
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verb::Get => f.write_str("GET"),
            Verb::Post => f.write_str("POST"),
        }
    }
}

/// High-level encrypted gateway client.
pub struct GatewayClient<G> {
    config: ClientConfig,
    context: Arc<CredentialContext>,
    sessions: Arc<SessionKeyManager<G>>,
    pipeline: RequestPipeline<G>,
    gateway: Arc<G>,
    metrics: Arc<Metrics>,
}

impl GatewayClient<HttpGateway> {
    /// Builds a production client: reqwest transport and a file-backed
    /// credential store at the configured path.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let gateway = Arc::new(HttpGateway::new(&config)?);
        let store = FileCredentialStore::new(config.credentials_path());
        Self::with_gateway(config, gateway, store, MethodMap::default())
    }
}

impl<G: Gateway> GatewayClient<G> {
    /// Builds a client over an arbitrary transport and credential store.
    pub fn with_gateway(
        config: ClientConfig,
        gateway: Arc<G>,
        store: impl CredentialStore + 'static,
        methods: MethodMap,
    ) -> Result<Self, ClientError> {
        let metrics = Arc::new(Metrics::new()?);
        let context = Arc::new(CredentialContext::open(
            store,
            config.public_key_pem.as_deref(),
        )?);
        let sessions = Arc::new(
            SessionKeyManager::new(Arc::clone(&gateway), Arc::clone(&context))
                .with_metrics(Arc::clone(&metrics)),
        );
        let pipeline = RequestPipeline::new(
            Arc::new(methods),
            Arc::clone(&context),
            Arc::clone(&sessions),
            config.mode,
            config.fallback_public_key_pem.clone(),
        );
        Ok(Self {
            config,
            context,
            sessions,
            pipeline,
            gateway,
            metrics,
        })
    }

    /// Issues a call with GET intent.
    pub async fn get(&self, method: &str, params: &Value) -> Result<Value, CallError> {
        self.call(Verb::Get, method, params).await
    }

    /// Issues a call with POST intent.
    pub async fn post(&self, method: &str, params: &Value) -> Result<Value, CallError> {
        self.call(Verb::Post, method, params).await
    }

    /// Issues one logical call: encrypt, sign, exchange, verify, decrypt.
    ///
    /// A session key rejection invalidates the cached key and replays the
    /// call once with fresh material; a second rejection is terminal. Every
    /// other error passes straight through.
    pub async fn call(&self, verb: Verb, method: &str, params: &Value) -> Result<Value, CallError> {
        self.metrics.calls_total.inc();
        let timer = self.metrics.call_duration_seconds.start_timer();
        let result = self.call_once_or_replay(verb, method, params).await;
        timer.observe_duration();
        if result.is_err() {
            self.metrics.call_failures.inc();
        }
        result
    }

    async fn call_once_or_replay(
        &self,
        verb: Verb,
        method: &str,
        params: &Value,
    ) -> Result<Value, CallError> {
        for attempt in 1..=MAX_ATTEMPTS {
            let prepared = self.pipeline.prepare(method, params).await?;
            if self.config.debug {
                debug!(%verb, method, attempt, id = %prepared.envelope.m, "dispatching call");
            }
            let response = self
                .gateway
                .exchange(&prepared.envelope, &prepared.headers)
                .await?;
            match decode::decode(&response, &prepared.material, &self.context) {
                Ok(data) => return Ok(data),
                Err(DecodeError::SessionExpired { msg }) => {
                    warn!(method, attempt, %msg, "session key rejected, renegotiating");
                    self.metrics.session_retries.inc();
                    self.sessions.invalidate().await;
                }
                Err(err) => {
                    match &err {
                        DecodeError::Integrity => self.metrics.integrity_failures.inc(),
                        DecodeError::Business { code, .. } => {
                            self.metrics.business_errors.inc();
                            if *code == crate::envelope::CODE_UNAUTHORIZED {
                                self.metrics.credential_resets.inc();
                            }
                        }
                        _ => {}
                    }
                    return Err(err.into());
                }
            }
        }
        Err(CallError::RetriesExhausted {
            attempts: MAX_ATTEMPTS,
        })
    }

    /// Stores a bearer token for subsequent calls.
    pub fn set_token(&self, token: impl Into<String>) {
        self.context.set_token(token);
    }

    /// Credential and key state shared with the pipeline.
    pub fn context(&self) -> &Arc<CredentialContext> {
        &self.context
    }

    /// Prometheus metrics for this client.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}
