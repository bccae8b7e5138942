//! Request/response data model and validators shared by every sandbox
//! workload provider and the lifecycle engine.

pub mod error;
pub mod model;
pub mod validators;

pub use error::{ErrorCode, ValidationError, ValidationResult};
pub use model::{
    AccessMode, Extensions, HostVolumeBackend, ImageSpec, NetworkAction, NetworkPolicy,
    NetworkRule, PvcVolumeBackend, RegistryCredentials, ResourceLimits, SandboxId, SandboxInfo,
    SandboxListFilter, SandboxRequest, SandboxState, SandboxStatus, Volume, VolumeBackend,
};
