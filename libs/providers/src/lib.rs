//! Workload provider abstraction and its three backends.

pub mod provider;

pub use provider::batch_sandbox::{BatchSandboxProvider, BatchSandboxTemplate};
pub use provider::cluster_sandbox::ClusterSandboxProvider;
pub use provider::direct_daemon::{DirectDaemonConfig, DirectDaemonProvider};
pub use provider::{
    legacy_resource_name, CreateWorkloadParams, ProviderError, ProviderResult, WorkloadHandle,
    WorkloadPhase, WorkloadProvider, WorkloadStatus,
};
