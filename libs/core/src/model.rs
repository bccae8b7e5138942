use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque stable identifier for a sandbox. Generated at creation, never
/// mutated, unique across the active plus recently-expired set.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
#[serde(transparent)]
pub struct SandboxId(pub String);

impl SandboxId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SandboxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SandboxId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Container image reference plus optional registry credentials.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct ImageSpec {
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry_credentials: Option<RegistryCredentials>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct RegistryCredentials {
    pub username: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
}

/// CPU and memory limits, both optional independently.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct ResourceLimits {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
#[serde(rename_all = "lowercase")]
pub enum NetworkAction {
    Allow,
    #[default]
    Deny,
}

/// A single egress rule. Rules are evaluated in order; first match wins.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct NetworkRule {
    pub action: NetworkAction,
    /// FQDN or a wildcard subdomain (e.g. "*.pypi.org").
    pub target: String,
}

/// Egress policy for a sandbox. Absent `default_action` means "deny" at the
/// backend; this is intentionally not defaulted here so that serialization
/// of an explicit policy round-trips exactly (see egress composer).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct NetworkPolicy {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub default_action: Option<NetworkAction>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub egress: Vec<NetworkRule>,
}

impl NetworkPolicy {
    /// Effective default action, applying the backend fallback of "deny".
    pub fn effective_default_action(&self) -> NetworkAction {
        self.default_action.unwrap_or(NetworkAction::Deny)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
#[serde(rename_all = "UPPERCASE")]
pub enum AccessMode {
    Rw,
    Ro,
}

/// Exactly one of the two backends must be populated; enforced by the
/// validators, not by this type (so malformed input is reported rather than
/// silently coerced).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct VolumeBackend {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<HostVolumeBackend>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pvc: Option<PvcVolumeBackend>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct HostVolumeBackend {
    pub path: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct PvcVolumeBackend {
    pub claim_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    pub name: String,
    pub mount_path: String,
    pub access_mode: AccessMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_path: Option<String>,
    #[serde(flatten)]
    pub backend: VolumeBackend,
}

/// Opaque per-request extension bag, e.g. `{"poolRef": "perf-pool"}` to
/// request pool-based creation from a cluster provider.
pub type Extensions = BTreeMap<String, String>;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct SandboxRequest {
    pub image: ImageSpec,
    pub entrypoint: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceLimits>,
    /// Positive duration, in seconds, until the sandbox expires.
    pub timeout_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_policy: Option<NetworkPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volumes: Option<Vec<Volume>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Extensions>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
#[serde(rename_all = "PascalCase")]
pub enum SandboxState {
    Pending,
    Running,
    Paused,
    Terminated,
    Failed,
}

impl fmt::Display for SandboxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SandboxState::Pending => "Pending",
            SandboxState::Running => "Running",
            SandboxState::Paused => "Paused",
            SandboxState::Terminated => "Terminated",
            SandboxState::Failed => "Failed",
        };
        write!(f, "{s}")
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct SandboxStatus {
    pub state: SandboxState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_at: Option<DateTime<Utc>>,
}

impl SandboxStatus {
    pub fn new(state: SandboxState) -> Self {
        Self {
            state,
            reason: None,
            message: None,
            last_transition_at: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_transition_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_transition_at = Some(at);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct SandboxInfo {
    pub id: SandboxId,
    pub image: String,
    pub status: SandboxStatus,
    pub entrypoint: Vec<String>,
    pub metadata: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub endpoints: BTreeMap<String, String>,
}

/// Filter applied by `list`. `states` is OR-combined, `metadata` is
/// AND-combined (spec.md §4.5 List, §8 Testable properties).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SandboxListFilter {
    pub states: Vec<SandboxState>,
    pub metadata: BTreeMap<String, String>,
    pub page: usize,
    pub page_size: usize,
}

impl SandboxListFilter {
    pub const MIN_PAGE_SIZE: usize = 1;
    pub const MAX_PAGE_SIZE: usize = 200;

    pub fn clamped_page_size(&self) -> usize {
        self.page_size
            .clamp(Self::MIN_PAGE_SIZE, Self::MAX_PAGE_SIZE)
    }

    pub fn matches_state(&self, state: SandboxState) -> bool {
        self.states.is_empty() || self.states.contains(&state)
    }

    pub fn matches_metadata(&self, metadata: &BTreeMap<String, String>) -> bool {
        self.metadata
            .iter()
            .all(|(k, v)| metadata.get(k) == Some(v))
    }
}
