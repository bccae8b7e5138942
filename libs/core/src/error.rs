use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable error codes surfaced to API consumers. The HTTP adapter maps these
/// onto status codes; the core only ever produces the code plus a message.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidEntrypoint,
    InvalidMetadataLabel,
    InvalidExpiration,
    InvalidPort,
    InvalidVolumeName,
    InvalidMountPath,
    InvalidSubPath,
    InvalidHostPath,
    InvalidPvcName,
    InvalidVolumeBackend,
    DuplicateVolumeName,
    HostPathNotAllowed,
    HostPathNotFound,
    UnsupportedVolumeBackend,
    InvalidParameter,
    UnexpectedResponse,
    SandboxNotFound,
    SandboxIdCollision,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = serde_plain_name(*self);
        write!(f, "{value}")
    }
}

fn serde_plain_name(code: ErrorCode) -> &'static str {
    match code {
        ErrorCode::InvalidEntrypoint => "INVALID_ENTRYPOINT",
        ErrorCode::InvalidMetadataLabel => "INVALID_METADATA_LABEL",
        ErrorCode::InvalidExpiration => "INVALID_EXPIRATION",
        ErrorCode::InvalidPort => "INVALID_PORT",
        ErrorCode::InvalidVolumeName => "INVALID_VOLUME_NAME",
        ErrorCode::InvalidMountPath => "INVALID_MOUNT_PATH",
        ErrorCode::InvalidSubPath => "INVALID_SUB_PATH",
        ErrorCode::InvalidHostPath => "INVALID_HOST_PATH",
        ErrorCode::InvalidPvcName => "INVALID_PVC_NAME",
        ErrorCode::InvalidVolumeBackend => "INVALID_VOLUME_BACKEND",
        ErrorCode::DuplicateVolumeName => "DUPLICATE_VOLUME_NAME",
        ErrorCode::HostPathNotAllowed => "HOST_PATH_NOT_ALLOWED",
        ErrorCode::HostPathNotFound => "HOST_PATH_NOT_FOUND",
        ErrorCode::UnsupportedVolumeBackend => "UNSUPPORTED_VOLUME_BACKEND",
        ErrorCode::InvalidParameter => "INVALID_PARAMETER",
        ErrorCode::UnexpectedResponse => "UNEXPECTED_RESPONSE",
        ErrorCode::SandboxNotFound => "SANDBOX_NOT_FOUND",
        ErrorCode::SandboxIdCollision => "SANDBOX_ID_COLLISION",
    }
}

/// A structured, caller-facing validation failure. Carries no side effects:
/// validators are pure functions and fail before anything is materialized.
#[derive(thiserror::Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct ValidationError {
    pub code: ErrorCode,
    pub message: String,
}

impl ValidationError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

pub type ValidationResult<T> = std::result::Result<T, ValidationError>;
