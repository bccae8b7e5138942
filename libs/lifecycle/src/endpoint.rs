//! Turns a provider's raw `ip:port` endpoint into the externally reachable
//! address callers are given back, applying the configured routing scheme.

use opensandbox_core::SandboxId;

/// Exactly one of these is configured at a time (enforced by the config
/// loader's XOR validation, mirroring the original router config).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RouterMode {
    /// Requests are routed by a path segment under a single shared domain:
    /// `https://{domain}/sandboxes/{id}`.
    Domain(String),
    /// Each sandbox gets its own subdomain: `https://{id}.{wildcard_domain}`.
    WildcardDomain(String),
    /// No router configured; callers connect to the backend-reported
    /// address directly.
    Direct,
}

/// An externally reachable address plus the header the gateway needs to
/// thread the request back to the right backend host:port (domain mode
/// only; wildcard and direct modes don't need one).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormattedEndpoint {
    pub url: String,
    pub header: Option<(&'static str, String)>,
}

const ENDPOINT_HEADER: &str = "X-Sandbox-Endpoint";

/// Produces the address a caller should use to reach a sandbox's exposed
/// port. `raw_endpoint` is the provider's `host:port` (or empty if the
/// workload isn't reachable yet).
pub fn format_endpoint(
    mode: &RouterMode,
    sandbox_id: &SandboxId,
    raw_endpoint: &str,
) -> FormattedEndpoint {
    match mode {
        RouterMode::Domain(domain) => FormattedEndpoint {
            url: format!(
                "https://{domain}/sandboxes/{sandbox_id}/port/{}",
                port_of(raw_endpoint)
            ),
            header: Some((ENDPOINT_HEADER, raw_endpoint.to_string())),
        },
        RouterMode::WildcardDomain(base) => FormattedEndpoint {
            url: format!("https://{sandbox_id}-{}.{base}", port_of(raw_endpoint)),
            header: None,
        },
        RouterMode::Direct => FormattedEndpoint {
            url: raw_endpoint.to_string(),
            header: None,
        },
    }
}

fn port_of(raw_endpoint: &str) -> &str {
    raw_endpoint.rsplit(':').next().unwrap_or(raw_endpoint)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_mode_uses_path_and_port_routing_with_header() {
        let id = SandboxId::new("abc");
        let formatted = format_endpoint(
            &RouterMode::Domain("sandboxes.example.com".into()),
            &id,
            "10.0.0.1:8080",
        );
        assert_eq!(
            formatted.url,
            "https://sandboxes.example.com/sandboxes/abc/port/8080"
        );
        assert_eq!(
            formatted.header,
            Some((ENDPOINT_HEADER, "10.0.0.1:8080".to_string()))
        );
    }

    #[test]
    fn wildcard_mode_uses_subdomain_and_port_routing() {
        let id = SandboxId::new("abc");
        let formatted = format_endpoint(
            &RouterMode::WildcardDomain("sandbox.example.com".into()),
            &id,
            "10.0.0.1:8080",
        );
        assert_eq!(formatted.url, "https://abc-8080.sandbox.example.com");
        assert!(formatted.header.is_none());
    }

    #[test]
    fn direct_mode_passes_through_raw_endpoint() {
        let id = SandboxId::new("abc");
        let formatted = format_endpoint(&RouterMode::Direct, &id, "10.0.0.1:8080");
        assert_eq!(formatted.url, "10.0.0.1:8080");
        assert!(formatted.header.is_none());
    }
}
