// Device and credential context: per-installation device id, bearer token,
// shared user secret, and the current RSA public key. Persistent fields go
// through a pluggable store so tests can run against isolated state.

use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::{Mutex, RwLock},
};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

use crate::crypto::keywrap;

const DEVICE_ID_SEED_LEN: usize = 24;

/// Errors returned by credential stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying filesystem failure.
    #[error("credential store io error: {0}")]
    Io(#[from] io::Error),
    /// Stored contents were not valid JSON.
    #[error("credential store parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Credentials held in persistent local storage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredentials {
    /// Stable per-installation device identifier.
    pub device_id: String,
    /// Bearer token, present after login.
    #[serde(default)]
    pub token: Option<String>,
    /// Shared secret used to sign envelopes.
    #[serde(default)]
    pub user_secret: Option<String>,
}

/// Persistence seam for credentials.
pub trait CredentialStore: Send + Sync {
    /// Loads stored credentials, `None` when nothing has been written yet.
    fn load(&self) -> Result<Option<StoredCredentials>, StoreError>;

    /// Persists the credentials wholesale.
    fn save(&self, credentials: &StoredCredentials) -> Result<(), StoreError>;
}

/// JSON-file-backed store used by production clients.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<StoredCredentials>, StoreError> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StoreError::Io(err)),
        }
    }

    fn save(&self, credentials: &StoredCredentials) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_vec_pretty(credentials)?)?;
        Ok(())
    }
}

/// In-memory store for tests and ephemeral clients.
#[derive(Default)]
pub struct MemoryCredentialStore {
    inner: Mutex<Option<StoredCredentials>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the store with existing credentials.
    pub fn with_credentials(credentials: StoredCredentials) -> Self {
        Self {
            inner: Mutex::new(Some(credentials)),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<StoredCredentials>, StoreError> {
        Ok(self.inner.lock().expect("store lock").clone())
    }

    fn save(&self, credentials: &StoredCredentials) -> Result<(), StoreError> {
        *self.inner.lock().expect("store lock") = Some(credentials.clone());
        Ok(())
    }
}

struct ContextState {
    credentials: StoredCredentials,
    public_key_pem: Option<String>,
}

/// Ambient identity state shared by the session manager and request pipeline.
///
/// Mutations happen only on key-grant piggyback updates (new public key or
/// user secret) and on a 401 response (credentials cleared); everything else
/// is read-only for the life of the process.
pub struct CredentialContext {
    store: Box<dyn CredentialStore>,
    state: RwLock<ContextState>,
}

impl CredentialContext {
    /// Opens the context, creating and persisting a device id on first use.
    pub fn open(
        store: impl CredentialStore + 'static,
        initial_public_key: Option<&str>,
    ) -> Result<Self, StoreError> {
        let mut credentials = store.load()?.unwrap_or_default();
        if credentials.device_id.is_empty() {
            credentials.device_id = generate_device_id();
            store.save(&credentials)?;
        }

        let public_key_pem = initial_public_key.map(|pem| {
            let normalized = keywrap::normalize_pem(pem.trim());
            debug!(fingerprint = %pem_fingerprint(&normalized), "initial rsa public key");
            normalized
        });

        Ok(Self {
            store: Box::new(store),
            state: RwLock::new(ContextState {
                credentials,
                public_key_pem,
            }),
        })
    }

    /// Returns the stable device identifier.
    pub fn device_id(&self) -> String {
        self.state
            .read()
            .expect("context lock")
            .credentials
            .device_id
            .clone()
    }

    /// Returns the `authorization` header value when a token is present.
    pub fn bearer_token(&self) -> Option<String> {
        self.state
            .read()
            .expect("context lock")
            .credentials
            .token
            .as_ref()
            .map(|token| format!("Bearer {token}"))
    }

    /// Returns the shared signing secret, empty when none is stored.
    pub fn user_secret(&self) -> String {
        self.state
            .read()
            .expect("context lock")
            .credentials
            .user_secret
            .clone()
            .unwrap_or_default()
    }

    /// Returns the current RSA public key PEM, if any.
    pub fn public_key_pem(&self) -> Option<String> {
        self.state
            .read()
            .expect("context lock")
            .public_key_pem
            .clone()
    }

    /// Stores the bearer token (login flow).
    pub fn set_token(&self, token: impl Into<String>) {
        let mut state = self.state.write().expect("context lock");
        state.credentials.token = Some(token.into());
        self.persist(&state.credentials);
    }

    /// Replaces the shared signing secret delivered by a key grant.
    pub fn set_user_secret(&self, secret: impl Into<String>) {
        let mut state = self.state.write().expect("context lock");
        state.credentials.user_secret = Some(secret.into());
        self.persist(&state.credentials);
        debug!("user secret updated from server");
    }

    /// Replaces the RSA public key, normalizing the PEM body.
    pub fn set_public_key(&self, pem: &str) {
        let normalized = keywrap::normalize_pem(pem.trim());
        debug!(fingerprint = %pem_fingerprint(&normalized), "rsa public key updated");
        self.state.write().expect("context lock").public_key_pem = Some(normalized);
    }

    /// Drops token and user secret, forcing re-authentication. Called on a
    /// 401 business code.
    pub fn clear_credentials(&self) {
        let mut state = self.state.write().expect("context lock");
        state.credentials.token = None;
        state.credentials.user_secret = None;
        self.persist(&state.credentials);
    }

    fn persist(&self, credentials: &StoredCredentials) {
        if let Err(err) = self.store.save(credentials) {
            warn!(%err, "failed to persist credentials");
        }
    }
}

fn generate_device_id() -> String {
    let mut seed = [0u8; DEVICE_ID_SEED_LEN];
    rand::thread_rng().fill_bytes(&mut seed);
    BASE64.encode(seed)
}

/// First 8 hex characters of the SHA-256 of a PEM, for log correlation.
fn pem_fingerprint(pem: &str) -> String {
    let digest = Sha256::digest(pem.as_bytes());
    hex::encode(&digest[..4])
}
