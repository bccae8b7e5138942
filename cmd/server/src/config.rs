//! TOML configuration loading. Defaults and validation mirror the original
//! `AppConfig`/`RouterConfig`/`ServerConfig`/`RuntimeConfig` split: one
//! runtime backend (`docker` or `kubernetes`) is active at a time, and the
//! router picks exactly one of a shared domain or a wildcard subdomain.

use std::path::{Path, PathBuf};

use serde::Deserialize;

pub const CONFIG_ENV_VAR: &str = "SANDBOX_CONFIG_PATH";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "INFO".to_string()
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RouterConfig {
    pub domain: Option<String>,
    pub wildcard_domain: Option<String>,
}

impl RouterConfig {
    fn validate_domain_choice(&self) -> Result<(), ConfigError> {
        match (&self.domain, &self.wildcard_domain) {
            (Some(_), Some(_)) => Err(ConfigError::Invalid(
                "router config must set exactly one of domain or wildcard_domain, not both"
                    .to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Translates the validated config into the engine's router mode.
    /// `validate_domain_choice` already rules out both being set.
    pub fn mode(&self) -> opensandbox_lifecycle::RouterMode {
        match (&self.domain, &self.wildcard_domain) {
            (Some(domain), _) => opensandbox_lifecycle::RouterMode::Domain(domain.clone()),
            (_, Some(wildcard)) => opensandbox_lifecycle::RouterMode::WildcardDomain(wildcard.clone()),
            (None, None) => opensandbox_lifecycle::RouterMode::Direct,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    pub api_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            api_key: None,
        }
    }
}

impl ServerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::Invalid(
                "server.port must be between 1 and 65535".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct KubernetesRuntimeConfig {
    pub kubeconfig_path: Option<String>,
    pub namespace: Option<String>,
    pub service_account: Option<String>,
    pub workload_provider: Option<String>,
    pub batchsandbox_template_file: Option<String>,
    /// Image running the egress sidecar; the egress composer is a no-op
    /// when this is unset, even if a sandbox requests a `NetworkPolicy`.
    pub egress_image: Option<String>,
}

fn default_network_mode() -> String {
    "host".to_string()
}

fn default_drop_capabilities() -> Vec<String> {
    opensandbox_providers::DirectDaemonConfig::default().drop_capabilities
}

fn default_no_new_privileges() -> bool {
    true
}

fn default_pids_limit() -> i64 {
    opensandbox_providers::DirectDaemonConfig::default().pids_limit
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DockerConfig {
    #[serde(default = "default_network_mode")]
    pub network_mode: String,
    #[serde(default = "default_drop_capabilities")]
    pub drop_capabilities: Vec<String>,
    pub apparmor_profile: Option<String>,
    #[serde(default = "default_no_new_privileges")]
    pub no_new_privileges: bool,
    pub seccomp_profile: Option<String>,
    #[serde(default = "default_pids_limit")]
    pub pids_limit: i64,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            network_mode: default_network_mode(),
            drop_capabilities: default_drop_capabilities(),
            apparmor_profile: None,
            no_new_privileges: default_no_new_privileges(),
            seccomp_profile: None,
            pids_limit: default_pids_limit(),
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeKind {
    Docker,
    Kubernetes,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RuntimeConfig {
    #[serde(rename = "type")]
    pub kind: RuntimeKind,
    pub execd_image: String,
    #[serde(default)]
    pub docker: Option<DockerConfig>,
    pub kubernetes: Option<KubernetesRuntimeConfig>,
    /// Host path prefixes the validator accepts for host-backed volumes;
    /// a sandbox requesting a path outside all of these is rejected.
    #[serde(default)]
    pub allowed_host_path_prefixes: Vec<String>,
}

impl RuntimeConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.execd_image.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "runtime.execd_image must be non-empty".to_string(),
            ));
        }
        match self.kind {
            RuntimeKind::Docker if self.kubernetes.is_some() => Err(ConfigError::Invalid(
                "runtime.kubernetes must not be set when runtime.type is docker".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Applies the "kubernetes defaults to an empty block if unset" rule.
    fn normalize(mut self) -> Self {
        if self.kind == RuntimeKind::Kubernetes && self.kubernetes.is_none() {
            self.kubernetes = Some(KubernetesRuntimeConfig::default());
        }
        self
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AppConfig {
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub server: ServerConfig,
    pub runtime: RuntimeConfig,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            domain: None,
            wildcard_domain: None,
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let raw: AppConfig = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        raw.validated()
    }

    fn validated(self) -> Result<Self, ConfigError> {
        self.router.validate_domain_choice()?;
        self.server.validate()?;
        self.runtime.validate()?;
        Ok(Self {
            runtime: self.runtime.normalize(),
            ..self
        })
    }

    pub fn default_path() -> PathBuf {
        dirs_home().join(".sandbox.toml")
    }

    pub fn resolve_path(cli_override: Option<PathBuf>) -> PathBuf {
        cli_override
            .or_else(|| std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from))
            .unwrap_or_else(Self::default_path)
    }
}

fn dirs_home() -> PathBuf {
    std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn router_rejects_both_domain_kinds() {
        let router = RouterConfig {
            domain: Some("a.com".into()),
            wildcard_domain: Some("b.com".into()),
        };
        assert!(router.validate_domain_choice().is_err());
    }

    #[test]
    fn docker_runtime_rejects_kubernetes_block() {
        let runtime = RuntimeConfig {
            kind: RuntimeKind::Docker,
            execd_image: "execd:latest".into(),
            docker: None,
            kubernetes: Some(KubernetesRuntimeConfig::default()),
            allowed_host_path_prefixes: Vec::new(),
        };
        assert!(runtime.validate().is_err());
    }

    #[test]
    fn kubernetes_runtime_defaults_block_when_absent() {
        let runtime = RuntimeConfig {
            kind: RuntimeKind::Kubernetes,
            execd_image: "execd:latest".into(),
            docker: None,
            kubernetes: None,
            allowed_host_path_prefixes: Vec::new(),
        }
        .normalize();
        assert!(runtime.kubernetes.is_some());
    }

    #[test]
    fn empty_execd_image_is_rejected() {
        let runtime = RuntimeConfig {
            kind: RuntimeKind::Docker,
            execd_image: "".into(),
            docker: None,
            kubernetes: None,
            allowed_host_path_prefixes: Vec::new(),
        };
        assert!(runtime.validate().is_err());
    }
}
