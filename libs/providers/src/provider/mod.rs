//! The workload-provider abstraction: every backend (direct Docker daemon,
//! BatchSandbox CR, Sandbox CR) implements the same contract so the
//! lifecycle engine never branches on backend kind.

pub mod batch_sandbox;
pub mod cluster_sandbox;
pub mod direct_daemon;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use opensandbox_core::{ImageSpec, NetworkPolicy, ResourceLimits, SandboxId, Volume};

/// Opaque handle a provider hands back after creating a workload. Providers
/// are free to interpret it however their backend needs to (a container id,
/// a CR name/uid pair); the lifecycle engine only ever passes it back to
/// the same provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkloadHandle {
    pub name: String,
    pub uid: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkloadPhase {
    Pending,
    Running,
    Terminated,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkloadStatus {
    pub phase: WorkloadPhase,
    pub reason: Option<String>,
    pub message: Option<String>,
    pub last_transition_at: Option<DateTime<Utc>>,
}

/// Everything a provider needs to materialize a workload. Built by the
/// lifecycle engine from a validated `SandboxRequest`.
pub struct CreateWorkloadParams<'a> {
    pub sandbox_id: &'a SandboxId,
    pub namespace: &'a str,
    pub image: &'a ImageSpec,
    pub entrypoint: &'a [String],
    pub env: &'a BTreeMap<String, String>,
    pub resource_limits: Option<&'a ResourceLimits>,
    pub labels: &'a BTreeMap<String, String>,
    pub expires_at: DateTime<Utc>,
    pub execd_image: &'a str,
    pub extensions: Option<&'a BTreeMap<String, String>>,
    pub network_policy: Option<&'a NetworkPolicy>,
    pub egress_image: Option<&'a str>,
    pub volumes: Option<&'a [Volume]>,
}

#[derive(thiserror::Error, Debug)]
pub enum ProviderError {
    #[error("workload not found: {0}")]
    NotFound(String),
    #[error("backend request failed: {0}")]
    Backend(String),
    #[error("backend returned an unexpected response: {0}")]
    UnexpectedResponse(String),
    #[error("unsupported volume backend: {0}")]
    UnsupportedVolumeBackend(String),
    #[error("host path not found: {0}")]
    HostPathNotFound(String),
}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Common contract every workload backend implements. Mirrors the shape of
/// a control-plane-facing SPI: create/get/delete/list plus the narrow
/// status/expiration/endpoint accessors the lifecycle engine polls.
#[async_trait]
pub trait WorkloadProvider: Send + Sync {
    async fn create_workload(
        &self,
        params: CreateWorkloadParams<'_>,
    ) -> ProviderResult<WorkloadHandle>;

    async fn get_workload(
        &self,
        sandbox_id: &SandboxId,
        namespace: &str,
    ) -> ProviderResult<Option<serde_json::Value>>;

    async fn delete_workload(&self, sandbox_id: &SandboxId, namespace: &str) -> ProviderResult<()>;

    async fn list_workloads(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> ProviderResult<Vec<serde_json::Value>>;

    async fn update_expiration(
        &self,
        sandbox_id: &SandboxId,
        namespace: &str,
        expires_at: DateTime<Utc>,
    ) -> ProviderResult<()>;

    fn get_expiration(&self, workload: &serde_json::Value) -> Option<DateTime<Utc>>;

    fn get_status(&self, workload: &serde_json::Value) -> WorkloadStatus;

    async fn get_endpoint_info(
        &self,
        workload: &serde_json::Value,
        port: u16,
    ) -> ProviderResult<Option<String>>;

    /// Removes any backend resource left behind by a workload that never
    /// completed cleanup (e.g. an egress sidecar container whose main
    /// workload is gone). Most backends have nothing of the sort; the
    /// default is a no-op. Returns the number of orphans removed.
    async fn reap_orphaned_sidecars(&self, _namespace: &str) -> ProviderResult<usize> {
        Ok(0)
    }
}

/// `"sandbox-" + id`, applied once. Both cluster providers fall back to
/// this name when a lookup by the bare sandbox id 404s, to stay compatible
/// with resources created before ids became valid resource names outright.
pub fn legacy_resource_name(sandbox_id: &SandboxId) -> String {
    const PREFIX: &str = "sandbox-";
    let raw = sandbox_id.as_str();
    if raw.starts_with(PREFIX) {
        raw.to_string()
    } else {
        format!("{PREFIX}{raw}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_name_prefixes_once() {
        let id = SandboxId::new("abc123");
        assert_eq!(legacy_resource_name(&id), "sandbox-abc123");
        let already = SandboxId::new("sandbox-abc123");
        assert_eq!(legacy_resource_name(&already), "sandbox-abc123");
    }
}
