//! Workload provider that talks straight to a Docker daemon over its Unix
//! socket/TCP API via `bollard`, with no cluster orchestrator involved.
//! Used for single-node deployments where Kubernetes is unavailable.
//!
//! Unlike the cluster providers, which rely on an init container and a pod
//! network namespace already shared between containers, this provider has
//! to build both of those things itself: the execd/bootstrap payload is
//! installed into a named Docker volume by a short-lived installer
//! container before the main container ever starts, and an egress sidecar
//! (when a network policy is present) is a second container the main one
//! joins via `container:<id>` network mode rather than a pod-level share.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions,
    RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::models::{HostConfig, PortBinding};
use bollard::volume::CreateVolumeOptions;
use bollard::Docker;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use opensandbox_core::{AccessMode, SandboxId, Volume};
use tracing::warn;

use super::{
    CreateWorkloadParams, ProviderError, ProviderResult, WorkloadHandle, WorkloadPhase,
    WorkloadProvider, WorkloadStatus,
};

/// Default capability drop list for sandboxed containers, matching the
/// runtime's Docker configuration baseline. `NET_ADMIN` is dropped
/// unconditionally, so no extra handling is needed to keep it off the main
/// container when an egress sidecar is present.
pub const DEFAULT_DROP_CAPABILITIES: &[&str] = &[
    "AUDIT_WRITE",
    "MKNOD",
    "NET_ADMIN",
    "NET_RAW",
    "SYS_ADMIN",
    "SYS_MODULE",
    "SYS_PTRACE",
    "SYS_TIME",
    "SYS_TTY_CONFIG",
];

pub const DEFAULT_PIDS_LIMIT: i64 = 512;

const EXPIRES_AT_LABEL: &str = "io.opensandbox.expires-at";
const SANDBOX_ID_LABEL: &str = "opensandbox.io/id";
const EGRESS_SIDECAR_FOR_LABEL: &str = "opensandbox.io/egress-sidecar-for";
const EMBEDDING_PROXY_PORT_LABEL: &str = "opensandbox.io/embedding-proxy-port";
const HTTP_PORT_LABEL: &str = "opensandbox.io/http-port";

const EXECD_MOUNT_PATH: &str = "/opt/opensandbox/bin";
const EXECD_PORT: u16 = 44772;
const AGENT_HTTP_PORT: u16 = 8080;

pub struct DirectDaemonConfig {
    pub network_mode: String,
    pub drop_capabilities: Vec<String>,
    pub apparmor_profile: Option<String>,
    pub no_new_privileges: bool,
    pub seccomp_profile: Option<String>,
    pub pids_limit: i64,
}

impl Default for DirectDaemonConfig {
    fn default() -> Self {
        Self {
            network_mode: "host".to_string(),
            drop_capabilities: DEFAULT_DROP_CAPABILITIES.iter().map(|s| s.to_string()).collect(),
            apparmor_profile: None,
            no_new_privileges: true,
            seccomp_profile: None,
            pids_limit: DEFAULT_PIDS_LIMIT,
        }
    }
}

pub struct DirectDaemonProvider {
    docker: Docker,
    config: DirectDaemonConfig,
}

impl DirectDaemonProvider {
    pub fn new(docker: Docker, config: DirectDaemonConfig) -> Self {
        Self { docker, config }
    }

    fn container_name(sandbox_id: &SandboxId) -> String {
        format!("opensandbox-{}", sandbox_id.as_str())
    }

    fn sidecar_container_name(sandbox_id: &SandboxId) -> String {
        format!("opensandbox-{}-egress", sandbox_id.as_str())
    }

    fn installer_container_name(sandbox_id: &SandboxId) -> String {
        format!("opensandbox-{}-install", sandbox_id.as_str())
    }

    fn bin_volume_name(sandbox_id: &SandboxId) -> String {
        format!("opensandbox-{}-bin", sandbox_id.as_str())
    }

    fn security_opts(&self) -> Vec<String> {
        let mut opts = Vec::new();
        if self.config.no_new_privileges {
            opts.push("no-new-privileges:true".to_string());
        }
        if let Some(apparmor) = &self.config.apparmor_profile {
            opts.push(format!("apparmor={apparmor}"));
        }
        if let Some(seccomp) = &self.config.seccomp_profile {
            opts.push(format!("seccomp={seccomp}"));
        }
        opts
    }

    fn host_config(&self) -> HostConfig {
        HostConfig {
            network_mode: Some(self.config.network_mode.clone()),
            cap_drop: Some(self.config.drop_capabilities.clone()),
            security_opt: Some(self.security_opts()),
            pids_limit: Some(self.config.pids_limit),
            ..Default::default()
        }
    }

    async fn inspect_by_name(&self, name: &str) -> ProviderResult<Option<serde_json::Value>> {
        match self
            .docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await
        {
            Ok(info) => Ok(Some(
                serde_json::to_value(info).map_err(|e| ProviderError::UnexpectedResponse(e.to_string()))?,
            )),
            Err(bollard::errors::Error::DockerResponseServerError { status_code: 404, .. }) => {
                Ok(None)
            }
            Err(e) => Err(ProviderError::Backend(e.to_string())),
        }
    }

    /// Copies the execd binary and `bootstrap.sh` out of `execd_image` into
    /// a fresh named volume via a short-lived installer container, mirroring
    /// the init-container step the cluster providers run in-pod. Returns the
    /// volume name to bind-mount into the main container.
    async fn install_execd(&self, sandbox_id: &SandboxId, execd_image: &str) -> ProviderResult<String> {
        let volume_name = Self::bin_volume_name(sandbox_id);
        self.docker
            .create_volume(CreateVolumeOptions::<String> {
                name: volume_name.clone(),
                ..Default::default()
            })
            .await
            .map_err(|e| ProviderError::Backend(e.to_string()))?;

        let installer_name = Self::installer_container_name(sandbox_id);
        let install_script = format!(
            "cp ./execd {path}/execd && cp ./bootstrap.sh {path}/bootstrap.sh && chmod +x {path}/execd {path}/bootstrap.sh",
            path = EXECD_MOUNT_PATH
        );
        let config = Config {
            image: Some(execd_image.to_string()),
            cmd: Some(vec!["/bin/sh".to_string(), "-c".to_string(), install_script]),
            host_config: Some(HostConfig {
                binds: Some(vec![format!("{volume_name}:{EXECD_MOUNT_PATH}")]),
                ..Default::default()
            }),
            ..Default::default()
        };
        let options = CreateContainerOptions {
            name: installer_name.clone(),
            platform: None,
        };
        self.docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| ProviderError::Backend(e.to_string()))?;
        self.docker
            .start_container(&installer_name, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| ProviderError::Backend(e.to_string()))?;

        let mut waits = self
            .docker
            .wait_container(&installer_name, None::<WaitContainerOptions<String>>);
        while let Some(result) = waits.next().await {
            result.map_err(|e| ProviderError::Backend(e.to_string()))?;
        }

        let remove_options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        self.docker
            .remove_container(&installer_name, Some(remove_options))
            .await
            .map_err(|e| ProviderError::Backend(e.to_string()))?;

        Ok(volume_name)
    }

    /// Turns `volumes` into Docker bind-mount strings. Host-path format and
    /// the allowed-prefix allowlist are already enforced at request
    /// validation time; this only rejects backends Docker can't satisfy
    /// directly and checks that the host path actually exists on this node.
    fn build_volume_binds(volumes: Option<&[Volume]>) -> ProviderResult<Vec<String>> {
        let Some(volumes) = volumes else {
            return Ok(Vec::new());
        };
        let mut binds = Vec::with_capacity(volumes.len());
        for volume in volumes {
            let Some(host) = &volume.backend.host else {
                return Err(ProviderError::UnsupportedVolumeBackend(format!(
                    "volume {} uses a PVC backend, which the direct-daemon provider cannot satisfy",
                    volume.name
                )));
            };
            let resolved_path = match &volume.sub_path {
                Some(sub_path) => format!("{}/{sub_path}", host.path.trim_end_matches('/')),
                None => host.path.clone(),
            };
            if !Path::new(&resolved_path).try_exists().unwrap_or(false) {
                return Err(ProviderError::HostPathNotFound(resolved_path));
            }
            let mode = match volume.access_mode {
                AccessMode::Rw => "rw",
                AccessMode::Ro => "ro",
            };
            binds.push(format!("{resolved_path}:{}:{mode}", volume.mount_path));
        }
        Ok(binds)
    }

    /// Creates and starts the egress sidecar, publishing its two ports on
    /// ephemeral host ports, then inspects it to read back whatever the
    /// daemon actually assigned. Returns the sidecar's container id and the
    /// resolved (execd port, http port) pair.
    async fn create_egress_sidecar(
        &self,
        sandbox_id: &SandboxId,
        egress_image: &str,
    ) -> ProviderResult<(String, u16, u16)> {
        let name = Self::sidecar_container_name(sandbox_id);
        let mut labels = HashMap::new();
        labels.insert(SANDBOX_ID_LABEL.to_string(), sandbox_id.to_string());
        labels.insert(EGRESS_SIDECAR_FOR_LABEL.to_string(), sandbox_id.to_string());

        let host_config = HostConfig {
            network_mode: Some(self.config.network_mode.clone()),
            cap_add: Some(vec!["NET_ADMIN".to_string()]),
            port_bindings: Some(sidecar_port_bindings(&[EXECD_PORT, AGENT_HTTP_PORT])),
            ..Default::default()
        };
        let config = Config {
            image: Some(egress_image.to_string()),
            labels: Some(labels),
            host_config: Some(host_config),
            exposed_ports: Some(
                [EXECD_PORT, AGENT_HTTP_PORT]
                    .iter()
                    .map(|p| (format!("{p}/tcp"), HashMap::new()))
                    .collect(),
            ),
            ..Default::default()
        };
        let options = CreateContainerOptions {
            name: name.clone(),
            platform: None,
        };
        let created = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| ProviderError::Backend(e.to_string()))?;
        self.docker
            .start_container(&name, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| ProviderError::Backend(e.to_string()))?;

        let inspected = self
            .inspect_by_name(&name)
            .await?
            .ok_or_else(|| ProviderError::UnexpectedResponse(format!("sidecar {name} vanished after start")))?;
        let execd_port = published_host_port(&inspected, EXECD_PORT).unwrap_or(EXECD_PORT);
        let http_port = published_host_port(&inspected, AGENT_HTTP_PORT).unwrap_or(AGENT_HTTP_PORT);

        Ok((created.id, execd_port, http_port))
    }

    async fn cleanup_egress_sidecar(&self, sandbox_id: &SandboxId) {
        let name = Self::sidecar_container_name(sandbox_id);
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        if let Err(e) = self.docker.remove_container(&name, Some(options)).await {
            if !matches!(e, bollard::errors::Error::DockerResponseServerError { status_code: 404, .. }) {
                warn!(sandbox_id = %sandbox_id, error = %e, "failed to remove egress sidecar container");
            }
        }
    }

    async fn cleanup_bin_volume(&self, sandbox_id: &SandboxId) {
        let name = Self::bin_volume_name(sandbox_id);
        if let Err(e) = self.docker.remove_volume(&name, None).await {
            if !matches!(e, bollard::errors::Error::DockerResponseServerError { status_code: 404, .. }) {
                warn!(sandbox_id = %sandbox_id, error = %e, "failed to remove execd bin volume");
            }
        }
    }
}

#[async_trait]
impl WorkloadProvider for DirectDaemonProvider {
    async fn create_workload(
        &self,
        params: CreateWorkloadParams<'_>,
    ) -> ProviderResult<WorkloadHandle> {
        let name = Self::container_name(params.sandbox_id);

        let bin_volume = self.install_execd(params.sandbox_id, params.execd_image).await?;

        let mut env: Vec<String> = params
            .env
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        env.push("EXECD=/opt/opensandbox/bin/execd".to_string());

        let mut labels: HashMap<String, String> = params
            .labels
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        labels.insert(SANDBOX_ID_LABEL.to_string(), params.sandbox_id.to_string());
        labels.insert(EXPIRES_AT_LABEL.to_string(), params.expires_at.to_rfc3339());

        let mut binds = vec![format!("{bin_volume}:{EXECD_MOUNT_PATH}")];
        binds.extend(Self::build_volume_binds(params.volumes)?);

        let mut host_config = self.host_config();
        host_config.binds = Some(binds);
        if let Some(limits) = params.resource_limits {
            if let Some(memory) = &limits.memory {
                host_config.memory = parse_memory_bytes(memory);
            }
            if let Some(cpu) = &limits.cpu {
                if let Some(nano_cpus) = parse_cpu_nanos(cpu) {
                    host_config.nano_cpus = Some(nano_cpus);
                }
            }
        }

        if let (Some(_policy), Some(egress_image)) = (params.network_policy, params.egress_image) {
            if !egress_image.is_empty() {
                let (sidecar_id, execd_port, http_port) = self
                    .create_egress_sidecar(params.sandbox_id, egress_image)
                    .await?;
                host_config.network_mode = Some(format!("container:{sidecar_id}"));
                host_config.port_bindings = None;
                labels.insert(EMBEDDING_PROXY_PORT_LABEL.to_string(), execd_port.to_string());
                labels.insert(HTTP_PORT_LABEL.to_string(), http_port.to_string());
            }
        }

        let mut cmd = vec![format!("{EXECD_MOUNT_PATH}/bootstrap.sh")];
        cmd.extend(params.entrypoint.iter().cloned());

        let config = Config {
            image: Some(params.image.image.clone()),
            cmd: Some(cmd),
            env: Some(env),
            labels: Some(labels),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: name.clone(),
            platform: None,
        };

        let created = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| ProviderError::Backend(e.to_string()))?;

        self.docker
            .start_container(&name, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| ProviderError::Backend(e.to_string()))?;

        Ok(WorkloadHandle {
            name,
            uid: Some(created.id),
        })
    }

    async fn get_workload(
        &self,
        sandbox_id: &SandboxId,
        _namespace: &str,
    ) -> ProviderResult<Option<serde_json::Value>> {
        self.inspect_by_name(&Self::container_name(sandbox_id)).await
    }

    async fn delete_workload(&self, sandbox_id: &SandboxId, _namespace: &str) -> ProviderResult<()> {
        let name = Self::container_name(sandbox_id);
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        match self.docker.remove_container(&name, Some(options)).await {
            Ok(()) => {}
            Err(bollard::errors::Error::DockerResponseServerError { status_code: 404, .. }) => {}
            Err(e) => return Err(ProviderError::Backend(e.to_string())),
        }
        self.cleanup_egress_sidecar(sandbox_id).await;
        self.cleanup_bin_volume(sandbox_id).await;
        Ok(())
    }

    async fn list_workloads(
        &self,
        _namespace: &str,
        label_selector: &str,
    ) -> ProviderResult<Vec<serde_json::Value>> {
        let mut filters: HashMap<String, Vec<String>> = HashMap::new();
        if !label_selector.is_empty() {
            filters.insert("label".to_string(), vec![label_selector.to_string()]);
        }
        let options = ListContainersOptions {
            all: true,
            filters,
            ..Default::default()
        };
        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| ProviderError::Backend(e.to_string()))?;
        containers
            .into_iter()
            .map(|c| serde_json::to_value(c).map_err(|e| ProviderError::UnexpectedResponse(e.to_string())))
            .collect()
    }

    async fn update_expiration(
        &self,
        _sandbox_id: &SandboxId,
        _namespace: &str,
        _expires_at: DateTime<Utc>,
    ) -> ProviderResult<()> {
        // Docker containers carry no mutable label API; expiration lives
        // only in the lifecycle engine's own expiration index for this
        // backend, so there's nothing to push down to the daemon.
        Ok(())
    }

    fn get_expiration(&self, workload: &serde_json::Value) -> Option<DateTime<Utc>> {
        let raw = workload
            .get("Config")?
            .get("Labels")?
            .get(EXPIRES_AT_LABEL)?
            .as_str()?;
        DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.with_timezone(&Utc))
    }

    fn get_status(&self, workload: &serde_json::Value) -> WorkloadStatus {
        let state = workload.get("State");
        let running = state.and_then(|s| s.get("Running")).and_then(|v| v.as_bool()).unwrap_or(false);
        let exit_code = state.and_then(|s| s.get("ExitCode")).and_then(|v| v.as_i64());
        let started_at = state
            .and_then(|s| s.get("StartedAt"))
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        let phase = if running {
            WorkloadPhase::Running
        } else if exit_code == Some(0) {
            WorkloadPhase::Terminated
        } else if exit_code.is_some() {
            WorkloadPhase::Failed
        } else {
            WorkloadPhase::Pending
        };

        WorkloadStatus {
            phase,
            reason: None,
            message: None,
            last_transition_at: started_at,
        }
    }

    async fn get_endpoint_info(
        &self,
        workload: &serde_json::Value,
        port: u16,
    ) -> ProviderResult<Option<String>> {
        if self.config.network_mode == "host" {
            return Ok(Some(format!("127.0.0.1:{port}")));
        }
        let ip = workload
            .get("NetworkSettings")
            .and_then(|n| n.get("IPAddress"))
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty());
        Ok(ip.map(|ip| format!("{ip}:{port}")))
    }

    /// Lists every container labeled as someone's egress sidecar and checks
    /// whether the main container it belongs to still exists; removes the
    /// ones that don't, which happens when the main container was deleted
    /// out from under us (host reboot, manual `docker rm`) and the normal
    /// paired-delete path in `delete_workload` never ran.
    async fn reap_orphaned_sidecars(&self, _namespace: &str) -> ProviderResult<usize> {
        let mut filters: HashMap<String, Vec<String>> = HashMap::new();
        filters.insert("label".to_string(), vec![EGRESS_SIDECAR_FOR_LABEL.to_string()]);
        let options = ListContainersOptions {
            all: true,
            filters,
            ..Default::default()
        };
        let sidecars = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| ProviderError::Backend(e.to_string()))?;

        let mut reaped = 0usize;
        for sidecar in sidecars {
            let Some(main_id) = sidecar
                .labels
                .as_ref()
                .and_then(|labels| labels.get(EGRESS_SIDECAR_FOR_LABEL))
            else {
                continue;
            };
            let main_name = Self::container_name(&SandboxId::new(main_id.clone()));
            if self.inspect_by_name(&main_name).await?.is_some() {
                continue;
            }
            let Some(sidecar_id) = sidecar.id else {
                continue;
            };
            let remove_options = RemoveContainerOptions {
                force: true,
                ..Default::default()
            };
            self.docker
                .remove_container(&sidecar_id, Some(remove_options))
                .await
                .map_err(|e| ProviderError::Backend(e.to_string()))?;
            reaped += 1;
        }
        Ok(reaped)
    }
}

fn parse_memory_bytes(value: &str) -> Option<i64> {
    let (digits, suffix) = value
        .find(|c: char| !c.is_ascii_digit())
        .map(|idx| value.split_at(idx))
        .unwrap_or((value, ""));
    let base: i64 = digits.parse().ok()?;
    let multiplier = match suffix.to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "ki" => 1024,
        "m" | "mi" => 1024 * 1024,
        "g" | "gi" => 1024 * 1024 * 1024,
        _ => return None,
    };
    Some(base * multiplier)
}

fn parse_cpu_nanos(value: &str) -> Option<i64> {
    let cores: f64 = value.parse().ok()?;
    Some((cores * 1_000_000_000.0) as i64)
}

/// Builds the `PortBinding` map bollard expects for publishing a set of
/// container ports on ephemeral host ports. Used for the egress sidecar,
/// which is the only container that ever publishes ports directly; the
/// main container either shares the sidecar's network namespace or runs in
/// `host` mode.
fn sidecar_port_bindings(container_ports: &[u16]) -> HashMap<String, Option<Vec<PortBinding>>> {
    container_ports
        .iter()
        .map(|port| {
            (
                format!("{port}/tcp"),
                Some(vec![PortBinding {
                    host_ip: None,
                    host_port: None,
                }]),
            )
        })
        .collect()
}

/// Reads back the host port the daemon assigned to `container_port` from an
/// inspected container's `NetworkSettings.Ports`.
fn published_host_port(inspected: &serde_json::Value, container_port: u16) -> Option<u16> {
    let key = format!("{container_port}/tcp");
    inspected
        .get("NetworkSettings")?
        .get("Ports")?
        .get(&key)?
        .as_array()?
        .first()?
        .get("HostPort")?
        .as_str()?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_parsing_handles_suffixes() {
        assert_eq!(parse_memory_bytes("512"), Some(512));
        assert_eq!(parse_memory_bytes("1Gi"), Some(1024 * 1024 * 1024));
        assert_eq!(parse_memory_bytes("2G"), Some(2 * 1024 * 1024 * 1024));
        assert_eq!(parse_memory_bytes("bogus"), None);
    }

    #[test]
    fn cpu_parsing_converts_cores_to_nanocpus() {
        assert_eq!(parse_cpu_nanos("1"), Some(1_000_000_000));
        assert_eq!(parse_cpu_nanos("0.5"), Some(500_000_000));
    }

    #[test]
    fn container_name_is_namespaced() {
        let id = SandboxId::new("abc");
        assert_eq!(DirectDaemonProvider::container_name(&id), "opensandbox-abc");
    }

    #[test]
    fn sidecar_and_bin_volume_names_are_derived_from_sandbox_id() {
        let id = SandboxId::new("abc");
        assert_eq!(DirectDaemonProvider::sidecar_container_name(&id), "opensandbox-abc-egress");
        assert_eq!(DirectDaemonProvider::bin_volume_name(&id), "opensandbox-abc-bin");
    }

    #[test]
    fn published_host_port_reads_resolved_port() {
        let inspected = serde_json::json!({
            "NetworkSettings": {
                "Ports": {
                    "44772/tcp": [{"HostIp": "0.0.0.0", "HostPort": "32768"}]
                }
            }
        });
        assert_eq!(published_host_port(&inspected, 44772), Some(32768));
        assert_eq!(published_host_port(&inspected, 8080), None);
    }

    #[test]
    fn build_volume_binds_rejects_pvc_backend() {
        use opensandbox_core::{PvcVolumeBackend, VolumeBackend};

        let volume = Volume {
            name: "data".to_string(),
            mount_path: "/data".to_string(),
            access_mode: AccessMode::Ro,
            sub_path: None,
            backend: VolumeBackend {
                host: None,
                pvc: Some(PvcVolumeBackend {
                    claim_name: "claim".to_string(),
                }),
            },
        };
        let err = DirectDaemonProvider::build_volume_binds(Some(&[volume])).unwrap_err();
        assert!(matches!(err, ProviderError::UnsupportedVolumeBackend(_)));
    }

    #[test]
    fn build_volume_binds_rejects_missing_host_path() {
        use opensandbox_core::{HostVolumeBackend, VolumeBackend};

        let volume = Volume {
            name: "data".to_string(),
            mount_path: "/data".to_string(),
            access_mode: AccessMode::Rw,
            sub_path: None,
            backend: VolumeBackend {
                host: Some(HostVolumeBackend {
                    path: "/nonexistent/opensandbox-test-path".to_string(),
                }),
                pvc: None,
            },
        };
        let err = DirectDaemonProvider::build_volume_binds(Some(&[volume])).unwrap_err();
        assert!(matches!(err, ProviderError::HostPathNotFound(_)));
    }
}
