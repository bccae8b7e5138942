//! The lifecycle engine: the single place that owns sandbox state and
//! drives a [`WorkloadProvider`] through create/list/renew/expire/restore.
//!
//! Concurrency model: the sandbox index is a reader-preferring
//! `tokio::sync::RwLock` (reads dominate — `list`/`get` vastly outnumber
//! mutations), and each sandbox id gets its own `tokio::sync::Mutex` so
//! concurrent operations against the *same* sandbox serialize without
//! blocking operations against others.

use std::collections::BTreeMap;
use std::sync::Arc;

use backon::{ExponentialBuilder, Retryable};
use chrono::{Duration, Utc};
use opensandbox_core::{
    validators, SandboxId, SandboxInfo, SandboxListFilter, SandboxRequest, SandboxState,
    SandboxStatus,
};
use opensandbox_providers::{CreateWorkloadParams, ProviderError, WorkloadPhase, WorkloadProvider};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{LifecycleError, LifecycleResult};

/// Default bound on retry attempts for idempotent provider calls
/// (get/list/delete/update-expiration). Create is never retried blindly
/// since the backend might have partially applied it; the caller gets a
/// `BackendTransient` error and decides whether to resubmit.
const DEFAULT_RETRY_ATTEMPTS: usize = 3;

pub struct LifecycleConfig {
    pub namespace: String,
    pub execd_image: String,
    pub egress_image: Option<String>,
    pub allowed_host_path_prefixes: Vec<String>,
    pub label_selector_key: String,
    pub retry_attempts: usize,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            execd_image: String::new(),
            egress_image: None,
            allowed_host_path_prefixes: Vec::new(),
            label_selector_key: "opensandbox.io/id".to_string(),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        }
    }
}

pub struct LifecycleEngine {
    provider: Arc<dyn WorkloadProvider>,
    config: LifecycleConfig,
    index: RwLock<BTreeMap<SandboxId, SandboxInfo>>,
    locks: Mutex<BTreeMap<SandboxId, Arc<Mutex<()>>>>,
}

impl LifecycleEngine {
    pub fn new(provider: Arc<dyn WorkloadProvider>, config: LifecycleConfig) -> Self {
        Self {
            provider,
            config,
            index: RwLock::new(BTreeMap::new()),
            locks: Mutex::new(BTreeMap::new()),
        }
    }

    fn retry_policy(&self) -> ExponentialBuilder {
        ExponentialBuilder::default().with_max_times(self.config.retry_attempts)
    }

    async fn lock_for(&self, id: &SandboxId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drops the per-id lock entry once a sandbox is gone for good, so the
    /// lock map doesn't grow without bound across a long-lived process.
    async fn forget_lock(&self, id: &SandboxId) {
        self.locks.lock().await.remove(id);
    }

    pub async fn create(&self, request: SandboxRequest) -> LifecycleResult<SandboxInfo> {
        validators::validate_request(&request, &self.config.allowed_host_path_prefixes)?;
        let now = Utc::now();
        let expires_at = now + Duration::seconds(request.timeout_seconds as i64);
        validators::ensure_future_expiration(expires_at, now)?;

        let sandbox_id = SandboxId::new(Uuid::new_v4().to_string());
        {
            let index = self.index.read().await;
            if index.contains_key(&sandbox_id) {
                return Err(LifecycleError::Conflict(format!(
                    "sandbox id collision: {sandbox_id}"
                )));
            }
        }

        let lock = self.lock_for(&sandbox_id).await;
        let _guard = lock.lock().await;

        let mut labels = request.metadata.clone();
        labels.insert(self.config.label_selector_key.clone(), sandbox_id.to_string());

        let params = CreateWorkloadParams {
            sandbox_id: &sandbox_id,
            namespace: &self.config.namespace,
            image: &request.image,
            entrypoint: &request.entrypoint,
            env: &request.env,
            resource_limits: request.resources.as_ref(),
            labels: &labels,
            expires_at,
            execd_image: &self.config.execd_image,
            extensions: request.extensions.as_ref(),
            network_policy: request.network_policy.as_ref(),
            egress_image: self.config.egress_image.as_deref(),
            volumes: request.volumes.as_deref(),
        };

        let handle = self
            .provider
            .create_workload(params)
            .await
            .map_err(LifecycleError::from)?;
        debug!(sandbox_id = %sandbox_id, handle = ?handle.name, "workload created");

        let info = SandboxInfo {
            id: sandbox_id.clone(),
            image: request.image.image.clone(),
            status: SandboxStatus::new(SandboxState::Pending).with_transition_at(now),
            entrypoint: request.entrypoint.clone(),
            metadata: request.metadata.clone(),
            created_at: now,
            expires_at,
            endpoints: BTreeMap::new(),
        };

        self.index
            .write()
            .await
            .insert(sandbox_id.clone(), info.clone());
        info!(sandbox_id = %sandbox_id, "sandbox created");
        let _ = handle;
        Ok(info)
    }

    pub async fn get(&self, id: &SandboxId) -> LifecycleResult<SandboxInfo> {
        self.index
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| LifecycleError::NotFound(id.to_string()))
    }

    /// Refreshes a sandbox's status and endpoint(s) from the backend and
    /// updates the index. Safe to call repeatedly from a background poller
    /// or lazily on `get`.
    pub async fn refresh(&self, id: &SandboxId, port: Option<u16>) -> LifecycleResult<SandboxInfo> {
        let lock = self.lock_for(id).await;
        let _guard = lock.lock().await;

        let provider = self.provider.clone();
        let id_owned = id.clone();
        let namespace = self.config.namespace.clone();
        let workload = (|| {
            let provider = provider.clone();
            let id_owned = id_owned.clone();
            let namespace = namespace.clone();
            async move { provider.get_workload(&id_owned, &namespace).await }
        })
        .retry(self.retry_policy())
        .await
        .map_err(LifecycleError::from)?
        .ok_or_else(|| LifecycleError::NotFound(id.to_string()))?;

        let workload_status = self.provider.get_status(&workload);
        let state = match workload_status.phase {
            WorkloadPhase::Pending => SandboxState::Pending,
            WorkloadPhase::Running => SandboxState::Running,
            WorkloadPhase::Terminated => SandboxState::Terminated,
            WorkloadPhase::Failed => SandboxState::Failed,
        };

        let mut endpoints = BTreeMap::new();
        if let Some(port) = port {
            if let Some(addr) = self
                .provider
                .get_endpoint_info(&workload, port)
                .await
                .map_err(LifecycleError::from)?
            {
                endpoints.insert(port.to_string(), addr);
            }
        }

        let mut index = self.index.write().await;
        let Some(info) = index.get_mut(id) else {
            return Err(LifecycleError::NotFound(id.to_string()));
        };
        info.status = SandboxStatus {
            state,
            reason: workload_status.reason,
            message: workload_status.message,
            last_transition_at: workload_status.last_transition_at,
        };
        if !endpoints.is_empty() {
            info.endpoints = endpoints;
        }
        Ok(info.clone())
    }

    /// Derives a [`SandboxInfo`] from a raw backend workload object, the
    /// same shape `restore` rehydrates the index with. Returns `None` if the
    /// workload carries no parsable expiration or name, since neither
    /// `list` nor `restore` can do anything useful with such an entry.
    fn info_from_workload(&self, workload: &serde_json::Value) -> Option<SandboxInfo> {
        let expires_at = self.provider.get_expiration(workload)?;
        let name = workload
            .get("metadata")
            .and_then(|m| m.get("name"))
            .and_then(|v| v.as_str())?;
        let status = self.provider.get_status(workload);
        let state = match status.phase {
            WorkloadPhase::Pending => SandboxState::Pending,
            WorkloadPhase::Running => SandboxState::Running,
            WorkloadPhase::Terminated => SandboxState::Terminated,
            WorkloadPhase::Failed => SandboxState::Failed,
        };
        let metadata: BTreeMap<String, String> = workload
            .get("metadata")
            .and_then(|m| m.get("labels"))
            .and_then(|l| l.as_object())
            .map(|obj| {
                obj.iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default();
        let created_at = workload
            .get("metadata")
            .and_then(|m| m.get("creationTimestamp"))
            .and_then(|v| v.as_str())
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        Some(SandboxInfo {
            id: SandboxId::new(name.to_string()),
            image: String::new(),
            status: SandboxStatus {
                state,
                reason: status.reason,
                message: status.message,
                last_transition_at: status.last_transition_at,
            },
            entrypoint: Vec::new(),
            metadata,
            created_at,
            expires_at,
            endpoints: BTreeMap::new(),
        })
    }

    /// Asks the backend for every labeled workload, merges in the in-memory
    /// pending records (a backend entry wins over its pending counterpart
    /// with the same id, since it reflects reality more closely), then
    /// filters, sorts by `createdAt` descending (then by id), and paginates.
    pub async fn list(&self, filter: &SandboxListFilter) -> LifecycleResult<Vec<SandboxInfo>> {
        let backend_workloads = self
            .provider
            .list_workloads(&self.config.namespace, &self.config.label_selector_key)
            .await
            .map_err(LifecycleError::from)?;

        let mut merged: BTreeMap<SandboxId, SandboxInfo> = BTreeMap::new();
        for workload in &backend_workloads {
            if let Some(info) = self.info_from_workload(workload) {
                merged.insert(info.id.clone(), info);
            }
        }

        {
            let pending = self.index.read().await;
            for (id, info) in pending.iter() {
                merged.entry(id.clone()).or_insert_with(|| info.clone());
            }
        }

        let mut matched: Vec<SandboxInfo> = merged
            .into_values()
            .filter(|info| {
                filter.matches_state(info.status.state) && filter.matches_metadata(&info.metadata)
            })
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));

        let page_size = filter.clamped_page_size();
        let start = filter.page.saturating_mul(page_size);
        Ok(matched.into_iter().skip(start).take(page_size).collect())
    }

    pub async fn renew(
        &self,
        id: &SandboxId,
        additional_seconds: u64,
    ) -> LifecycleResult<SandboxInfo> {
        let lock = self.lock_for(id).await;
        let _guard = lock.lock().await;

        let now = Utc::now();
        let current = self.get(id).await?;
        let base = current.expires_at.max(now);
        let new_expiry = base + Duration::seconds(additional_seconds as i64);
        validators::ensure_future_expiration(new_expiry, now)?;

        let provider = self.provider.clone();
        let id_owned = id.clone();
        let namespace = self.config.namespace.clone();
        (|| {
            let provider = provider.clone();
            let id_owned = id_owned.clone();
            let namespace = namespace.clone();
            async move {
                provider
                    .update_expiration(&id_owned, &namespace, new_expiry)
                    .await
            }
        })
        .retry(self.retry_policy())
        .await
        .map_err(LifecycleError::from)?;

        let mut index = self.index.write().await;
        let Some(info) = index.get_mut(id) else {
            return Err(LifecycleError::NotFound(id.to_string()));
        };
        info.expires_at = new_expiry;
        Ok(info.clone())
    }

    pub async fn expire(&self, id: &SandboxId) -> LifecycleResult<()> {
        let lock = self.lock_for(id).await;
        let _guard = lock.lock().await;

        let namespace = self.config.namespace.clone();
        let provider = self.provider.clone();
        let id_owned = id.clone();
        let deleted = (|| {
            let provider = provider.clone();
            let id_owned = id_owned.clone();
            let namespace = namespace.clone();
            async move { provider.delete_workload(&id_owned, &namespace).await }
        })
        .retry(self.retry_policy())
        .await;

        match deleted {
            Ok(()) => {}
            Err(ProviderError::NotFound(_)) => {
                // Already gone at the backend; deleting is idempotent.
            }
            Err(e) => return Err(LifecycleError::from(e)),
        }

        self.index.write().await.remove(id);
        drop(_guard);
        self.forget_lock(id).await;
        info!(sandbox_id = %id, "sandbox expired");
        Ok(())
    }

    /// Rehydrates the in-memory index from the backend after a process
    /// restart. Sandboxes the backend has already expired are skipped
    /// rather than re-added, since re-adding them would immediately need
    /// another expire pass.
    pub async fn restore(&self) -> LifecycleResult<usize> {
        let workloads = self
            .provider
            .list_workloads(&self.config.namespace, &self.config.label_selector_key)
            .await
            .map_err(LifecycleError::from)?;

        let now = Utc::now();
        let mut restored = 0usize;
        let mut index = self.index.write().await;
        for workload in &workloads {
            let Some(info) = self.info_from_workload(workload) else {
                warn!("skipping workload with unparsable expiration during restore");
                continue;
            };
            if info.expires_at <= now {
                continue;
            }
            index.insert(info.id.clone(), info);
            restored += 1;
        }
        drop(index);
        info!(restored, "restored sandboxes from backend");

        match self
            .provider
            .reap_orphaned_sidecars(&self.config.namespace)
            .await
        {
            Ok(reaped) if reaped > 0 => info!(reaped, "reaped orphaned egress sidecars on restore"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "failed to reap orphaned egress sidecars"),
        }

        Ok(restored)
    }

    /// Sweeps the index for sandboxes past their expiration and expires
    /// each one. Intended to be driven by a periodic `tokio::time::interval`
    /// in the binary's main loop.
    pub async fn sweep_expired(&self) -> Vec<SandboxId> {
        let now = Utc::now();
        let due: Vec<SandboxId> = {
            let index = self.index.read().await;
            index
                .values()
                .filter(|info| info.expires_at <= now)
                .map(|info| info.id.clone())
                .collect()
        };
        let mut expired = Vec::new();
        for id in due {
            match self.expire(&id).await {
                Ok(()) => expired.push(id),
                Err(e) => warn!(sandbox_id = %id, error = %e, "failed to expire sandbox"),
            }
        }
        expired
    }
}
