// Veilgate encrypted gateway client public library surface.

pub mod config;

pub mod context;

pub mod crypto;

pub mod envelope;

pub mod methods;

pub mod gateway;

pub mod session;

pub mod pipeline;

pub mod decode;

pub mod client;

pub mod metrics;

pub use config::{ClientConfig, ConfigError, KeyMode};

pub use context::{
    CredentialContext, CredentialStore, FileCredentialStore, MemoryCredentialStore, StoreError,
    StoredCredentials,
};

pub use crypto::{
    cbc::{open as cbc_open, seal as cbc_seal, CipherError, KeyMaterial, IV_LEN, KEY_LEN},
    keywrap::{wrap as wrap_key, KeyWrapError, DEFAULT_PUBLIC_KEY_PEM},
    nonce::generate as generate_nonce,
    sign::{compute as compute_signature, verify as verify_signature, SignatureError},
};

pub use envelope::{
    BusinessEnvelope, EnvelopeHeaders, KeyRef, RequestEnvelope, ResponseEnvelope, CALL_PATH,
    CODE_OK, CODE_SESSION_EXPIRED, CODE_UNAUTHORIZED, KEY_PATH,
};

pub use methods::{MethodMap, MethodMapError};

pub use gateway::{Gateway, GatewayError, HttpGateway, KeyEnvelope, KeyGrant, KeyRequest};

pub use session::{SessionError, SessionKey, SessionKeyManager, EXPIRY_SAFETY_MARGIN};

pub use pipeline::{PipelineError, PreparedRequest, RequestPipeline};

pub use decode::{decode, DecodeError, MAX_RESPONSE_SKEW_SECS};

pub use client::{CallError, ClientError, GatewayClient, Verb, MAX_ATTEMPTS};

pub use metrics::{Metrics, MetricsError};
