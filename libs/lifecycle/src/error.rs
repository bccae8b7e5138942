//! The lifecycle engine's error taxonomy. Every failure a caller can see
//! classifies into exactly one of these variants so the HTTP adapter can
//! map them onto status codes without re-deriving intent from a string.

use opensandbox_core::ValidationError;
use opensandbox_providers::ProviderError;

#[derive(thiserror::Error, Debug)]
pub enum LifecycleError {
    /// The request itself was malformed; retrying it unchanged will never
    /// succeed.
    #[error("invalid input: {0}")]
    Input(#[from] ValidationError),

    /// The request conflicts with existing state (duplicate id).
    #[error("conflict: {0}")]
    Conflict(String),

    /// No sandbox exists with the given id.
    #[error("sandbox not found: {0}")]
    NotFound(String),

    /// The backend failed in a way that may succeed on retry.
    #[error("backend temporarily unavailable: {0}")]
    BackendTransient(String),

    /// The backend rejected the request in a way retries won't fix.
    #[error("backend rejected request: {0}")]
    BackendPermanent(String),

    /// A bug, or a backend response that violates its own contract.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ProviderError> for LifecycleError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::NotFound(msg) => LifecycleError::NotFound(msg),
            ProviderError::Backend(msg) => LifecycleError::BackendTransient(msg),
            ProviderError::UnexpectedResponse(msg) => LifecycleError::Internal(msg),
            ProviderError::UnsupportedVolumeBackend(msg) => LifecycleError::BackendPermanent(msg),
            ProviderError::HostPathNotFound(msg) => LifecycleError::BackendPermanent(msg),
        }
    }
}

pub type LifecycleResult<T> = std::result::Result<T, LifecycleError>;
