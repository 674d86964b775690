// Session key lifecycle: fetch, cache, expiry, and single-flight refresh.

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{
    context::CredentialContext,
    crypto::cbc::{CipherError, KeyMaterial},
    gateway::{Gateway, GatewayError, KeyGrant, KeyRequest},
    metrics::Metrics,
};

/// Safety margin subtracted from the advertised ttl so a key is never used
/// while it could expire mid-flight.
pub const EXPIRY_SAFETY_MARGIN: Duration = Duration::from_secs(30);

/// Errors returned while acquiring a session key.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Transport failure reaching the key endpoint.
    #[error("key fetch failed: {0}")]
    Gateway(#[from] GatewayError),
    /// Gateway answered with a non-zero result code.
    #[error("key fetch rejected: code {code}: {msg}")]
    Rejected {
        /// Result code from the gateway.
        code: i64,
        /// Server-provided message.
        msg: String,
    },
    /// Gateway answered code 0 but without key material.
    #[error("key fetch returned no grant")]
    MissingGrant,
    /// Granted key material failed to decode.
    #[error("invalid granted key material: {0}")]
    Material(#[from] CipherError),
}

/// Negotiated ephemeral key. Immutable once constructed; refresh replaces it
/// wholesale.
#[derive(Debug, Clone)]
pub struct SessionKey {
    /// Opaque key id echoed in `X-Key-Id`.
    pub kid: String,
    /// Symmetric key and IV decoded from the grant.
    pub material: KeyMaterial,
    /// Advertised lifetime in seconds.
    pub ttl: u64,
    /// Server clock at issuance, Unix seconds.
    pub server_time: u64,
    expires_at: SystemTime,
}

impl SessionKey {
    /// Builds a key from a grant, computing the local absolute expiry.
    pub fn from_grant(grant: &KeyGrant, issued_at: SystemTime) -> Result<Self, SessionError> {
        let material = KeyMaterial::from_base64(&grant.key, &grant.iv)?;
        let lifetime = Duration::from_secs(grant.ttl).saturating_sub(EXPIRY_SAFETY_MARGIN);
        Ok(Self {
            kid: grant.kid.clone(),
            material,
            ttl: grant.ttl,
            server_time: grant.server_time,
            expires_at: issued_at + lifetime,
        })
    }

    /// A key is usable strictly before its absolute expiry.
    #[must_use]
    pub fn is_usable_at(&self, now: SystemTime) -> bool {
        now < self.expires_at
    }

    /// Local absolute expiry (issuance + ttl − safety margin).
    #[must_use]
    pub fn expires_at(&self) -> SystemTime {
        self.expires_at
    }
}

/// Owns the cached session key and guarantees at most one in-flight fetch.
///
/// The cache mutex is held across the fetch, so N concurrent `acquire` calls
/// that miss the cache resolve through a single network round trip; the lock
/// is released on success and failure alike, letting a later call retry.
pub struct SessionKeyManager<G> {
    gateway: Arc<G>,
    context: Arc<CredentialContext>,
    cached: Mutex<Option<SessionKey>>,
    metrics: Option<Arc<Metrics>>,
}

impl<G: Gateway> SessionKeyManager<G> {
    pub fn new(gateway: Arc<G>, context: Arc<CredentialContext>) -> Self {
        Self {
            gateway,
            context,
            cached: Mutex::new(None),
            metrics: None,
        }
    }

    /// Attaches a metrics handle that counts key fetches.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Returns a usable session key, fetching one if necessary.
    pub async fn acquire(&self) -> Result<SessionKey, SessionError> {
        let mut slot = self.cached.lock().await;
        if let Some(key) = slot.as_ref() {
            if key.is_usable_at(SystemTime::now()) {
                return Ok(key.clone());
            }
        }

        let fresh = self.fetch_fresh().await?;
        *slot = Some(fresh.clone());
        Ok(fresh)
    }

    /// Drops the cached key, forcing the next `acquire` to re-fetch. Called
    /// after the gateway reports key expiry.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }

    async fn fetch_fresh(&self) -> Result<SessionKey, SessionError> {
        if let Some(metrics) = &self.metrics {
            metrics.key_fetches.inc();
        }
        let result = self.fetch_grant().await;
        if result.is_err() {
            if let Some(metrics) = &self.metrics {
                metrics.key_fetch_failures.inc();
            }
        }
        result
    }

    async fn fetch_grant(&self) -> Result<SessionKey, SessionError> {
        let request = KeyRequest {
            device_id: self.context.device_id(),
            bearer: self.context.bearer_token(),
        };
        let envelope = self.gateway.fetch_key(&request).await?;
        if envelope.code != 0 {
            return Err(SessionError::Rejected {
                code: envelope.code,
                msg: envelope.msg,
            });
        }
        let grant = envelope.data.ok_or(SessionError::MissingGrant)?;

        // Grants may piggyback rotated ambient state.
        if let Some(public_key) = &grant.public_key {
            self.context.set_public_key(public_key);
        }
        if let Some(user_secret) = &grant.user_secret {
            self.context.set_user_secret(user_secret);
        }

        let key = SessionKey::from_grant(&grant, SystemTime::now())?;
        debug!(kid = %key.kid, ttl = key.ttl, "session key obtained");
        Ok(key)
    }
}
