//! Workload provider backed by the `BatchSandbox` custom resource
//! (`sandbox.opensandbox.io/v1alpha1`), which in turn drives a Pod through
//! an in-cluster batch-scheduling controller.
//!
//! Supports both template-based creation (the default: build a pod spec
//! from the request and deep-merge it onto an operator-supplied template)
//! and pool-based creation (`extensions.poolRef` set: skip templating
//! entirely and reference a pre-warmed pool, customizing only the
//! entrypoint and env via a shell-quoted task template).

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::{Client, CustomResource};
use opensandbox_core::SandboxId;
use opensandbox_k8s_util::{apply_egress_to_spec, merge_pod_spec};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{
    legacy_resource_name, CreateWorkloadParams, ProviderError, ProviderResult, WorkloadHandle,
    WorkloadPhase, WorkloadProvider, WorkloadStatus,
};

const MAIN_CONTAINER_NAME: &str = "sandbox";
const EXECD_VOLUME_NAME: &str = "opensandbox-bin";
const EXECD_MOUNT_PATH: &str = "/opt/opensandbox/bin";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema, CustomResource)]
#[kube(
    group = "sandbox.opensandbox.io",
    version = "v1alpha1",
    kind = "BatchSandbox",
    namespaced,
    status = "BatchSandboxStatus",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct BatchSandboxSpec {
    pub replicas: i32,
    pub expire_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_template: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchSandboxStatus {
    #[serde(default)]
    pub ready: i32,
    #[serde(default)]
    pub allocated: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoints: Option<String>,
}

/// Operator-supplied base pod spec a template-mode sandbox is deep-merged
/// onto. Loaded once at startup from the configured template file (or a
/// minimal empty template if none is configured).
#[derive(Clone, Debug, Default)]
pub struct BatchSandboxTemplate {
    pub pod_spec: Value,
}

impl BatchSandboxTemplate {
    pub fn empty() -> Self {
        Self {
            pod_spec: json!({}),
        }
    }

    pub fn from_yaml(contents: &str) -> Result<Self, serde_yaml::Error> {
        let pod_spec: Value = serde_yaml::from_str(contents)?;
        Ok(Self { pod_spec })
    }
}

pub struct BatchSandboxProvider {
    client: Client,
    template: BatchSandboxTemplate,
}

impl BatchSandboxProvider {
    pub fn new(client: Client, template: BatchSandboxTemplate) -> Self {
        Self { client, template }
    }

    fn api(&self, namespace: &str) -> Api<BatchSandbox> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn build_execd_init_container(execd_image: &str) -> Value {
        let script = "cp ./execd /opt/opensandbox/bin/execd && \
             cp ./bootstrap.sh /opt/opensandbox/bin/bootstrap.sh && \
             chmod +x /opt/opensandbox/bin/execd && \
             chmod +x /opt/opensandbox/bin/bootstrap.sh";
        json!({
            "name": "execd-installer",
            "image": execd_image,
            "command": ["/bin/sh", "-c"],
            "args": [script],
            "volumeMounts": [
                {"name": EXECD_VOLUME_NAME, "mountPath": EXECD_MOUNT_PATH}
            ],
        })
    }

    fn build_main_container(params: &CreateWorkloadParams<'_>) -> Value {
        let mut env_vars: Vec<Value> = params
            .env
            .iter()
            .map(|(k, v)| json!({"name": k, "value": v}))
            .collect();
        env_vars.push(json!({"name": "EXECD", "value": format!("{EXECD_MOUNT_PATH}/execd")}));

        let mut wrapped_command = vec![format!("{EXECD_MOUNT_PATH}/bootstrap.sh")];
        wrapped_command.extend(params.entrypoint.iter().cloned());

        let mut container = json!({
            "name": MAIN_CONTAINER_NAME,
            "image": params.image.image,
            "command": wrapped_command,
            "env": env_vars,
            "volumeMounts": [
                {"name": EXECD_VOLUME_NAME, "mountPath": EXECD_MOUNT_PATH}
            ],
        });

        if let Some(limits) = params.resource_limits {
            let mut resource_map = serde_json::Map::new();
            if let Some(cpu) = &limits.cpu {
                resource_map.insert("cpu".to_string(), json!(cpu));
            }
            if let Some(memory) = &limits.memory {
                resource_map.insert("memory".to_string(), json!(memory));
            }
            if !resource_map.is_empty() {
                container["resources"] = json!({
                    "limits": resource_map,
                    "requests": resource_map,
                });
            }
        }

        container
    }

    fn build_pod_spec(params: &CreateWorkloadParams<'_>) -> Value {
        let init_container = Self::build_execd_init_container(params.execd_image);
        let main_container = Self::build_main_container(params);

        let mut pod_spec = json!({
            "initContainers": [init_container],
            "containers": [main_container],
            "volumes": [
                {"name": EXECD_VOLUME_NAME, "emptyDir": {}}
            ],
        });

        apply_egress_to_spec(
            &mut pod_spec,
            params.network_policy,
            params.egress_image,
            MAIN_CONTAINER_NAME,
        );

        pod_spec
    }

    fn build_task_template(entrypoint: &[String], env: &BTreeMap<String, String>) -> Value {
        let command = opensandbox_k8s_util::build_pool_command(entrypoint);
        json!({
            "spec": {
                "process": {
                    "command": ["/bin/sh", "-c", command],
                    "env": env.iter().map(|(k, v)| json!({"name": k, "value": v})).collect::<Vec<_>>(),
                }
            }
        })
    }

    fn labels_as_map(labels: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        labels.clone()
    }

    async fn get_by_name(
        &self,
        namespace: &str,
        name: &str,
    ) -> ProviderResult<Option<BatchSandbox>> {
        match self.api(namespace).get(name).await {
            Ok(obj) => Ok(Some(obj)),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(None),
            Err(e) => Err(ProviderError::Backend(e.to_string())),
        }
    }

    async fn resolve(&self, sandbox_id: &SandboxId, namespace: &str) -> ProviderResult<Option<BatchSandbox>> {
        if let Some(found) = self.get_by_name(namespace, sandbox_id.as_str()).await? {
            return Ok(Some(found));
        }
        let legacy = legacy_resource_name(sandbox_id);
        if legacy != sandbox_id.as_str() {
            return self.get_by_name(namespace, &legacy).await;
        }
        Ok(None)
    }
}

#[async_trait]
impl WorkloadProvider for BatchSandboxProvider {
    async fn create_workload(
        &self,
        params: CreateWorkloadParams<'_>,
    ) -> ProviderResult<WorkloadHandle> {
        let labels = Self::labels_as_map(params.labels);
        let pool_ref = params
            .extensions
            .and_then(|ext| ext.get("poolRef"))
            .filter(|s| !s.is_empty());

        let spec = if let Some(pool_ref) = pool_ref {
            BatchSandboxSpec {
                replicas: 1,
                expire_time: params.expires_at.to_rfc3339(),
                pool_ref: Some(pool_ref.clone()),
                task_template: Some(Self::build_task_template(params.entrypoint, params.env)),
                template: None,
            }
        } else {
            let pod_spec = Self::build_pod_spec(&params);
            let merged_pod_spec = merge_pod_spec(&self.template.pod_spec, &pod_spec);
            BatchSandboxSpec {
                replicas: 1,
                expire_time: params.expires_at.to_rfc3339(),
                pool_ref: None,
                task_template: None,
                template: Some(json!({"spec": merged_pod_spec})),
            }
        };

        let mut object = BatchSandbox::new(params.sandbox_id.as_str(), spec);
        object.metadata.namespace = Some(params.namespace.to_string());
        object.metadata.labels = Some(labels.into_iter().collect());

        let created = self
            .api(params.namespace)
            .create(&PostParams::default(), &object)
            .await
            .map_err(|e| ProviderError::Backend(e.to_string()))?;

        Ok(WorkloadHandle {
            name: created.metadata.name.unwrap_or_default(),
            uid: created.metadata.uid,
        })
    }

    async fn get_workload(
        &self,
        sandbox_id: &SandboxId,
        namespace: &str,
    ) -> ProviderResult<Option<Value>> {
        let found = self.resolve(sandbox_id, namespace).await?;
        Ok(found.map(|obj| serde_json::to_value(obj).unwrap_or(Value::Null)))
    }

    async fn delete_workload(&self, sandbox_id: &SandboxId, namespace: &str) -> ProviderResult<()> {
        let found = self
            .resolve(sandbox_id, namespace)
            .await?
            .ok_or_else(|| ProviderError::NotFound(sandbox_id.to_string()))?;
        let name = found.metadata.name.ok_or_else(|| {
            ProviderError::UnexpectedResponse("BatchSandbox missing metadata.name".to_string())
        })?;
        self.api(namespace)
            .delete(&name, &Default::default())
            .await
            .map_err(|e| ProviderError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn list_workloads(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> ProviderResult<Vec<Value>> {
        let params = kube::api::ListParams::default().labels(label_selector);
        match self.api(namespace).list(&params).await {
            Ok(list) => Ok(list
                .items
                .into_iter()
                .map(|item| serde_json::to_value(item).unwrap_or(Value::Null))
                .collect()),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(Vec::new()),
            Err(e) => Err(ProviderError::Backend(e.to_string())),
        }
    }

    async fn update_expiration(
        &self,
        sandbox_id: &SandboxId,
        namespace: &str,
        expires_at: DateTime<Utc>,
    ) -> ProviderResult<()> {
        let found = self
            .resolve(sandbox_id, namespace)
            .await?
            .ok_or_else(|| ProviderError::NotFound(sandbox_id.to_string()))?;
        let name = found.metadata.name.ok_or_else(|| {
            ProviderError::UnexpectedResponse("BatchSandbox missing metadata.name".to_string())
        })?;
        let patch = json!({"spec": {"expireTime": expires_at.to_rfc3339()}});
        self.api(namespace)
            .patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| ProviderError::Backend(e.to_string()))?;
        Ok(())
    }

    fn get_expiration(&self, workload: &Value) -> Option<DateTime<Utc>> {
        let raw = workload.get("spec")?.get("expireTime")?.as_str()?;
        DateTime::parse_from_rfc3339(&raw.replace('Z', "+00:00"))
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    fn get_status(&self, workload: &Value) -> WorkloadStatus {
        derive_status(workload)
    }

    async fn get_endpoint_info(&self, workload: &Value, port: u16) -> ProviderResult<Option<String>> {
        let endpoints_raw = workload
            .get("metadata")
            .and_then(|m| m.get("annotations"))
            .and_then(|a| a.get("sandbox.opensandbox.io/endpoints"))
            .and_then(Value::as_str);

        let Some(endpoints_raw) = endpoints_raw else {
            return Ok(None);
        };
        let ips: Vec<String> = serde_json::from_str(endpoints_raw)
            .map_err(|e| ProviderError::UnexpectedResponse(e.to_string()))?;
        Ok(ips.first().map(|ip| format!("{ip}:{port}")))
    }
}

/// BatchSandbox ready/allocated counters don't carry a phase field; the
/// provider derives one from the combination of replica counters and
/// whether an endpoint has been published.
fn derive_status(workload: &Value) -> WorkloadStatus {
    let status = workload.get("status").cloned().unwrap_or(Value::Null);
    let ready = status.get("ready").and_then(Value::as_i64).unwrap_or(0);
    let allocated = status.get("allocated").and_then(Value::as_i64).unwrap_or(0);
    let has_endpoints = status
        .get("endpoints")
        .and_then(Value::as_str)
        .map(|s| !s.is_empty())
        .unwrap_or(false);
    let last_transition_at = workload
        .get("metadata")
        .and_then(|m| m.get("creationTimestamp"))
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc));

    let (phase, reason, message) = if ready == 1 && has_endpoints {
        (
            WorkloadPhase::Running,
            "READY_WITH_IP",
            "BatchSandbox is ready with an assigned endpoint",
        )
    } else if ready > 0 {
        (
            WorkloadPhase::Pending,
            "POD_READY_NO_IP",
            "Pod is ready but waiting for an endpoint",
        )
    } else if allocated > 0 {
        (
            WorkloadPhase::Pending,
            "POD_SCHEDULED",
            "Pod has been scheduled",
        )
    } else {
        (
            WorkloadPhase::Pending,
            "BATCHSANDBOX_PENDING",
            "BatchSandbox is pending scheduling",
        )
    };

    WorkloadStatus {
        phase,
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
        last_transition_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opensandbox_core::ImageSpec;

    fn sample_params<'a>(
        sandbox_id: &'a SandboxId,
        entrypoint: &'a [String],
        env: &'a BTreeMap<String, String>,
        labels: &'a BTreeMap<String, String>,
        image: &'a ImageSpec,
    ) -> CreateWorkloadParams<'a> {
        CreateWorkloadParams {
            sandbox_id,
            namespace: "default",
            image,
            entrypoint,
            env,
            resource_limits: None,
            labels,
            expires_at: Utc::now(),
            execd_image: "execd:latest",
            extensions: None,
            network_policy: None,
            egress_image: None,
            volumes: None,
        }
    }

    #[test]
    fn build_pod_spec_wraps_entrypoint_with_bootstrap() {
        let sandbox_id = SandboxId::new("abc");
        let entrypoint = vec!["python".to_string(), "app.py".to_string()];
        let env = BTreeMap::new();
        let labels = BTreeMap::new();
        let image = ImageSpec {
            image: "myimage:1".to_string(),
            registry_credentials: None,
        };
        let params = sample_params(&sandbox_id, &entrypoint, &env, &labels, &image);
        let pod_spec = BatchSandboxProvider::build_pod_spec(&params);
        let containers = pod_spec["containers"].as_array().unwrap();
        let command = containers[0]["command"].as_array().unwrap();
        assert_eq!(command[0], "/opt/opensandbox/bin/bootstrap.sh");
        assert_eq!(command[1], "python");
    }

    #[test]
    fn status_derivation_prefers_ready_with_endpoints() {
        let workload = json!({"status": {"ready": 1, "allocated": 1, "endpoints": "[\"10.0.0.1\"]"}});
        let status = derive_status(&workload);
        assert_eq!(status.phase, WorkloadPhase::Running);
        assert_eq!(status.reason.as_deref(), Some("READY_WITH_IP"));
    }

    #[test]
    fn status_derivation_falls_back_through_pending_reasons() {
        assert_eq!(
            derive_status(&json!({"status": {"ready": 1, "allocated": 1}})).reason.as_deref(),
            Some("POD_READY_NO_IP")
        );
        assert_eq!(
            derive_status(&json!({"status": {"allocated": 1}})).reason.as_deref(),
            Some("POD_SCHEDULED")
        );
        assert_eq!(
            derive_status(&json!({"status": {}})).reason.as_deref(),
            Some("BATCHSANDBOX_PENDING")
        );
    }
}
