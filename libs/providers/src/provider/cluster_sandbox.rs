//! Workload provider backed by the upstream `agents.x-k8s.io/v1alpha1
//! Sandbox` custom resource, which owns a single-replica pod directly
//! (no intermediate batch-scheduling layer).

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, CustomResource};
use opensandbox_core::SandboxId;
use opensandbox_k8s_util::apply_egress_to_spec;
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
    group = "agents.x-k8s.io",
    version = "v1alpha1",
    kind = "Sandbox",
    namespaced,
    status = "ClusterSandboxStatus",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSandboxSpec {
    pub replicas: i32,
    pub shutdown_time: String,
    pub shutdown_policy: String,
    pub pod_template: Value,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSandboxStatus {
    #[serde(default)]
    pub conditions: Vec<ClusterSandboxCondition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_fqdn: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSandboxCondition {
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

pub struct ClusterSandboxProvider {
    client: Client,
    shutdown_policy: String,
    service_account: Option<String>,
}

impl ClusterSandboxProvider {
    pub fn new(client: Client, shutdown_policy: String, service_account: Option<String>) -> Self {
        Self {
            client,
            shutdown_policy,
            service_account,
        }
    }

    fn api(&self, namespace: &str) -> Api<Sandbox> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn pods_api(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn build_pod_spec(&self, params: &CreateWorkloadParams<'_>) -> Value {
        let script = "cp ./execd /opt/opensandbox/bin/execd && \
             cp ./bootstrap.sh /opt/opensandbox/bin/bootstrap.sh && \
             chmod +x /opt/opensandbox/bin/execd && \
             chmod +x /opt/opensandbox/bin/bootstrap.sh";
        let init_container = json!({
            "name": "execd-installer",
            "image": params.execd_image,
            "command": ["/bin/sh", "-c"],
            "args": [script],
            "volumeMounts": [{"name": EXECD_VOLUME_NAME, "mountPath": EXECD_MOUNT_PATH}],
        });

        let mut env_vars: Vec<Value> = params
            .env
            .iter()
            .map(|(k, v)| json!({"name": k, "value": v}))
            .collect();
        env_vars.push(json!({"name": "EXECD", "value": format!("{EXECD_MOUNT_PATH}/execd")}));

        let mut wrapped_command = vec![format!("{EXECD_MOUNT_PATH}/bootstrap.sh")];
        wrapped_command.extend(params.entrypoint.iter().cloned());

        let main_container = json!({
            "name": MAIN_CONTAINER_NAME,
            "image": params.image.image,
            "command": wrapped_command,
            "env": env_vars,
            "volumeMounts": [{"name": EXECD_VOLUME_NAME, "mountPath": EXECD_MOUNT_PATH}],
        });

        let mut pod_spec = json!({
            "initContainers": [init_container],
            "containers": [main_container],
            "volumes": [{"name": EXECD_VOLUME_NAME, "emptyDir": {}}],
        });

        if let Some(service_account) = &self.service_account {
            pod_spec["serviceAccountName"] = json!(service_account);
        }

        apply_egress_to_spec(
            &mut pod_spec,
            params.network_policy,
            params.egress_image,
            MAIN_CONTAINER_NAME,
        );

        pod_spec
    }

    async fn get_by_name(&self, namespace: &str, name: &str) -> ProviderResult<Option<Sandbox>> {
        match self.api(namespace).get(name).await {
            Ok(obj) => Ok(Some(obj)),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(None),
            Err(e) => Err(ProviderError::Backend(e.to_string())),
        }
    }

    async fn resolve(&self, sandbox_id: &SandboxId, namespace: &str) -> ProviderResult<Option<Sandbox>> {
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
impl WorkloadProvider for ClusterSandboxProvider {
    async fn create_workload(
        &self,
        params: CreateWorkloadParams<'_>,
    ) -> ProviderResult<WorkloadHandle> {
        let pod_spec = self.build_pod_spec(&params);
        let labels: BTreeMap<String, String> = params.labels.clone();

        let spec = ClusterSandboxSpec {
            replicas: 1,
            shutdown_time: params.expires_at.to_rfc3339(),
            shutdown_policy: self.shutdown_policy.clone(),
            pod_template: json!({
                "metadata": {"labels": labels},
                "spec": pod_spec,
            }),
        };

        let mut object = Sandbox::new(params.sandbox_id.as_str(), spec);
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
            ProviderError::UnexpectedResponse("Sandbox missing metadata.name".to_string())
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
        let params = ListParams::default().labels(label_selector);
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
            ProviderError::UnexpectedResponse("Sandbox missing metadata.name".to_string())
        })?;
        let patch = json!({"spec": {"shutdownTime": expires_at.to_rfc3339()}});
        self.api(namespace)
            .patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| ProviderError::Backend(e.to_string()))?;
        Ok(())
    }

    fn get_expiration(&self, workload: &Value) -> Option<DateTime<Utc>> {
        let raw = workload.get("spec")?.get("shutdownTime")?.as_str()?;
        DateTime::parse_from_rfc3339(&raw.replace('Z', "+00:00"))
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    fn get_status(&self, workload: &Value) -> WorkloadStatus {
        let status = workload.get("status").cloned().unwrap_or(Value::Null);
        let conditions = status
            .get("conditions")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let ready_condition = conditions
            .iter()
            .find(|c| c.get("type").and_then(Value::as_str) == Some("Ready"));
        let creation_timestamp = workload
            .get("metadata")
            .and_then(|m| m.get("creationTimestamp"))
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        let Some(ready_condition) = ready_condition else {
            return WorkloadStatus {
                phase: WorkloadPhase::Pending,
                reason: Some("SANDBOX_PENDING".to_string()),
                message: Some("Sandbox is pending scheduling".to_string()),
                last_transition_at: creation_timestamp,
            };
        };

        let cond_status = ready_condition.get("status").and_then(Value::as_str);
        let reason = ready_condition
            .get("reason")
            .and_then(Value::as_str)
            .map(str::to_string);
        let message = ready_condition
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string);
        let last_transition_at = ready_condition
            .get("lastTransitionTime")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .or(creation_timestamp);

        let phase = if cond_status == Some("True") {
            WorkloadPhase::Running
        } else if reason.as_deref() == Some("SandboxExpired") {
            WorkloadPhase::Terminated
        } else {
            WorkloadPhase::Pending
        };

        WorkloadStatus {
            phase,
            reason,
            message,
            last_transition_at,
        }
    }

    async fn get_endpoint_info(&self, workload: &Value, port: u16) -> ProviderResult<Option<String>> {
        let status = workload.get("status").cloned().unwrap_or(Value::Null);
        let selector = status.get("selector").and_then(Value::as_str);
        let namespace = workload
            .get("metadata")
            .and_then(|m| m.get("namespace"))
            .and_then(Value::as_str);

        if let (Some(selector), Some(namespace)) = (selector, namespace) {
            if let Ok(pods) = self
                .pods_api(namespace)
                .list(&ListParams::default().labels(selector))
                .await
            {
                for pod in &pods.items {
                    let phase = pod.status.as_ref().and_then(|s| s.phase.as_deref());
                    let pod_ip = pod.status.as_ref().and_then(|s| s.pod_ip.as_deref());
                    if phase == Some("Running") {
                        if let Some(pod_ip) = pod_ip {
                            return Ok(Some(format!("{pod_ip}:{port}")));
                        }
                    }
                }
            }
        }

        if let Some(service_fqdn) = status.get("serviceFQDN").and_then(Value::as_str) {
            return Ok(Some(format!("{service_fqdn}:{port}")));
        }

        Ok(None)
    }
}
