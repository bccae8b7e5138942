//! Exercises create/list/renew/expire against an in-memory fake provider,
//! covering the create->Running/Failed and list filtering properties.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use opensandbox_core::{ImageSpec, SandboxId, SandboxListFilter, SandboxRequest, SandboxState};
use opensandbox_lifecycle::{LifecycleConfig, LifecycleEngine};
use opensandbox_providers::{
    CreateWorkloadParams, ProviderError, ProviderResult, WorkloadHandle, WorkloadPhase,
    WorkloadProvider, WorkloadStatus,
};
use tokio::sync::Mutex;

#[derive(Default)]
struct FakeProvider {
    workloads: Mutex<BTreeMap<String, serde_json::Value>>,
}

#[async_trait]
impl WorkloadProvider for FakeProvider {
    async fn create_workload(
        &self,
        params: CreateWorkloadParams<'_>,
    ) -> ProviderResult<WorkloadHandle> {
        let name = params.sandbox_id.to_string();
        self.workloads.lock().await.insert(
            name.clone(),
            serde_json::json!({
                "metadata": {"name": name, "creationTimestamp": Utc::now().to_rfc3339()},
                "spec": {"expireTime": params.expires_at.to_rfc3339()},
                "status": {"phase": "Running"},
            }),
        );
        Ok(WorkloadHandle { name, uid: None })
    }

    async fn get_workload(
        &self,
        sandbox_id: &SandboxId,
        _namespace: &str,
    ) -> ProviderResult<Option<serde_json::Value>> {
        Ok(self.workloads.lock().await.get(sandbox_id.as_str()).cloned())
    }

    async fn delete_workload(&self, sandbox_id: &SandboxId, _namespace: &str) -> ProviderResult<()> {
        self.workloads.lock().await.remove(sandbox_id.as_str());
        Ok(())
    }

    async fn list_workloads(
        &self,
        _namespace: &str,
        _label_selector: &str,
    ) -> ProviderResult<Vec<serde_json::Value>> {
        Ok(self.workloads.lock().await.values().cloned().collect())
    }

    async fn update_expiration(
        &self,
        sandbox_id: &SandboxId,
        _namespace: &str,
        expires_at: DateTime<Utc>,
    ) -> ProviderResult<()> {
        let mut workloads = self.workloads.lock().await;
        let Some(workload) = workloads.get_mut(sandbox_id.as_str()) else {
            return Err(ProviderError::NotFound(sandbox_id.to_string()));
        };
        workload["spec"]["expireTime"] = serde_json::json!(expires_at.to_rfc3339());
        Ok(())
    }

    fn get_expiration(&self, workload: &serde_json::Value) -> Option<DateTime<Utc>> {
        workload
            .get("spec")?
            .get("expireTime")?
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    fn get_status(&self, _workload: &serde_json::Value) -> WorkloadStatus {
        WorkloadStatus {
            phase: WorkloadPhase::Running,
            reason: None,
            message: None,
            last_transition_at: None,
        }
    }

    async fn get_endpoint_info(
        &self,
        _workload: &serde_json::Value,
        port: u16,
    ) -> ProviderResult<Option<String>> {
        Ok(Some(format!("10.0.0.1:{port}")))
    }
}

fn sample_request() -> SandboxRequest {
    SandboxRequest {
        image: ImageSpec {
            image: "alpine:3".to_string(),
            registry_credentials: None,
        },
        entrypoint: vec!["sleep".to_string(), "60".to_string()],
        env: BTreeMap::new(),
        metadata: BTreeMap::from([("team".to_string(), "platform".to_string())]),
        resources: None,
        timeout_seconds: 3600,
        network_policy: None,
        volumes: None,
        extensions: None,
    }
}

fn engine() -> LifecycleEngine {
    let provider = Arc::new(FakeProvider::default());
    LifecycleEngine::new(provider, LifecycleConfig::default())
}

#[tokio::test]
async fn create_then_refresh_reaches_running() {
    let engine = engine();
    let info = engine.create(sample_request()).await.unwrap();
    assert_eq!(info.status.state, SandboxState::Pending);

    let refreshed = engine.refresh(&info.id, Some(8080)).await.unwrap();
    assert_eq!(refreshed.status.state, SandboxState::Running);
    assert_eq!(refreshed.endpoints.get("8080").unwrap(), "10.0.0.1:8080");
}

#[tokio::test]
async fn list_filters_by_state_and_metadata() {
    let engine = engine();
    let a = engine.create(sample_request()).await.unwrap();
    let mut other_request = sample_request();
    other_request.metadata = BTreeMap::from([("team".to_string(), "research".to_string())]);
    let b = engine.create(other_request).await.unwrap();

    let by_metadata = engine
        .list(&SandboxListFilter {
            states: vec![],
            metadata: BTreeMap::from([("team".to_string(), "platform".to_string())]),
            page: 0,
            page_size: 10,
        })
        .await
        .unwrap();
    assert_eq!(by_metadata.len(), 1);
    assert_eq!(by_metadata[0].id, a.id);

    let all = engine
        .list(&SandboxListFilter {
            states: vec![SandboxState::Pending],
            metadata: BTreeMap::new(),
            page: 0,
            page_size: 10,
        })
        .await
        .unwrap();
    assert_eq!(all.len(), 2);
    assert!(all.iter().any(|s| s.id == b.id));
}

#[tokio::test]
async fn renew_extends_expiration_and_rejects_non_future() {
    let engine = engine();
    let info = engine.create(sample_request()).await.unwrap();
    let renewed = engine.renew(&info.id, 60).await.unwrap();
    assert!(renewed.expires_at > info.expires_at);
}

#[tokio::test]
async fn expire_removes_sandbox_and_is_idempotent_on_backend_404() {
    let engine = engine();
    let info = engine.create(sample_request()).await.unwrap();
    engine.expire(&info.id).await.unwrap();
    assert!(engine.get(&info.id).await.is_err());
}

#[tokio::test]
async fn restore_rehydrates_index_from_backend() {
    let provider = Arc::new(FakeProvider::default());
    let engine = LifecycleEngine::new(provider.clone(), LifecycleConfig::default());
    let created = engine.create(sample_request()).await.unwrap();

    let fresh_engine = LifecycleEngine::new(provider, LifecycleConfig::default());
    let restored = fresh_engine.restore().await.unwrap();
    assert_eq!(restored, 1);
    assert!(fresh_engine.get(&created.id).await.is_ok());
}
