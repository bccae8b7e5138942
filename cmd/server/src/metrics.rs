//! Provisioning counters exposed over `/metrics` in OpenMetrics text
//! format.

use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::registry::Registry;

pub struct Metrics {
    pub sandboxes_created_total: Counter,
    pub sandboxes_expired_total: Counter,
    pub sandboxes_failed_total: Counter,
    registry: Registry,
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();
        let sandboxes_created_total = Counter::default();
        let sandboxes_expired_total = Counter::default();
        let sandboxes_failed_total = Counter::default();

        registry.register(
            "opensandbox_sandboxes_created",
            "Total sandboxes created",
            sandboxes_created_total.clone(),
        );
        registry.register(
            "opensandbox_sandboxes_expired",
            "Total sandboxes expired",
            sandboxes_expired_total.clone(),
        );
        registry.register(
            "opensandbox_sandboxes_failed",
            "Total sandboxes that reached the Failed state",
            sandboxes_failed_total.clone(),
        );

        Self {
            sandboxes_created_total,
            sandboxes_expired_total,
            sandboxes_failed_total,
            registry,
        }
    }

    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        encode(&mut buffer, &self.registry).unwrap_or_default();
        buffer
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
