//! Egress sidecar composition: turns a [`NetworkPolicy`] into the sidecar
//! container and security-context patches applied to a pod template.
//!
//! Grounded on the original egress helper: the policy is shipped to the
//! sidecar verbatim as JSON in an environment variable, the sidecar gets
//! `NET_ADMIN` so it can program iptables/nft rules, and the main container
//! has `NET_ADMIN` dropped once a policy is in force so it cannot undo the
//! sidecar's rules itself.

use opensandbox_core::NetworkPolicy;
use serde_json::{json, Value};

/// Name of the environment variable the sidecar reads its policy from.
pub const EGRESS_RULES_ENV: &str = "OPENSANDBOX_EGRESS_RULES";

const EGRESS_CONTAINER_NAME: &str = "egress";

/// Builds the sidecar container manifest fragment for `policy`, using
/// `egress_image` as its image reference.
pub fn build_egress_sidecar_container(policy: &NetworkPolicy, egress_image: &str) -> Value {
    let policy_json = serde_json::to_string(policy).unwrap_or_default();
    json!({
        "name": EGRESS_CONTAINER_NAME,
        "image": egress_image,
        "env": [
            {"name": EGRESS_RULES_ENV, "value": policy_json}
        ],
        "securityContext": build_security_context_for_egress(),
    })
}

fn build_security_context_for_egress() -> Value {
    json!({
        "capabilities": {
            "add": ["NET_ADMIN"]
        }
    })
}

/// Security context patch for the sandbox's main container. `NET_ADMIN` is
/// only dropped when a network policy is actually in force; sandboxes
/// without one are unaffected.
pub fn build_security_context_for_sandbox_container(has_network_policy: bool) -> Value {
    if has_network_policy {
        json!({
            "capabilities": {
                "drop": ["NET_ADMIN"]
            }
        })
    } else {
        json!({})
    }
}

/// The three sysctls that disable IPv6 entirely on a pod, used so the
/// egress sidecar only has one address family to police.
pub fn build_ipv6_disable_sysctls() -> Vec<Value> {
    ["all", "default", "lo"]
        .iter()
        .map(|scope| {
            json!({
                "name": format!("net.ipv6.conf.{scope}.disable_ipv6"),
                "value": "1"
            })
        })
        .collect()
}

/// Merges `new_sysctls` into `existing`, last-write-wins by sysctl `name`,
/// preserving any existing sysctls the new set doesn't mention.
pub fn merge_sysctls(existing: &[Value], new_sysctls: &[Value]) -> Vec<Value> {
    let mut order: Vec<String> = Vec::new();
    let mut by_name: std::collections::BTreeMap<String, Value> = std::collections::BTreeMap::new();

    for sysctl in existing {
        if let Some(name) = sysctl.get("name").and_then(Value::as_str) {
            order.push(name.to_string());
            by_name.insert(name.to_string(), sysctl.clone());
        }
    }
    for sysctl in new_sysctls {
        if let Some(name) = sysctl.get("name").and_then(Value::as_str) {
            if !by_name.contains_key(name) {
                order.push(name.to_string());
            }
            by_name.insert(name.to_string(), sysctl.clone());
        }
    }

    order
        .into_iter()
        .filter_map(|name| by_name.remove(&name))
        .collect()
}

/// Applies a network policy to a pod spec fragment: adds the egress
/// sidecar container, its IPv6-disabling sysctls, and drops `NET_ADMIN`
/// from the named main container. A no-op if either `policy` or
/// `egress_image` is absent, matching the "network policy without an
/// egress image does nothing" contract enforced upstream by the
/// validators.
pub fn apply_egress_to_spec(
    pod_spec: &mut Value,
    policy: Option<&NetworkPolicy>,
    egress_image: Option<&str>,
    main_container_name: &str,
) {
    let (Some(policy), Some(egress_image)) = (policy, egress_image) else {
        return;
    };
    if egress_image.is_empty() {
        return;
    }

    let sidecar = build_egress_sidecar_container(policy, egress_image);
    let containers = pod_spec
        .get_mut("containers")
        .and_then(Value::as_array_mut)
        .expect("pod spec must have a containers array before applying egress");
    containers.push(sidecar);

    if let Some(main) = containers
        .iter_mut()
        .find(|c| c.get("name").and_then(Value::as_str) == Some(main_container_name))
    {
        let sc = main
            .as_object_mut()
            .unwrap()
            .entry("securityContext")
            .or_insert_with(|| json!({}));
        let mut patch = sc.clone();
        json_patch::merge(
            &mut patch,
            &build_security_context_for_sandbox_container(true),
        );
        *sc = patch;
    }

    let existing_sysctls: Vec<Value> = pod_spec
        .get("securityContext")
        .and_then(|sc| sc.get("sysctls"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let merged_sysctls = merge_sysctls(&existing_sysctls, &build_ipv6_disable_sysctls());

    let pod_security_context = pod_spec
        .as_object_mut()
        .unwrap()
        .entry("securityContext")
        .or_insert_with(|| json!({}));
    pod_security_context["sysctls"] = Value::Array(merged_sysctls);
}

#[cfg(test)]
mod tests {
    use super::*;
    use opensandbox_core::{NetworkAction, NetworkRule};

    fn sample_policy() -> NetworkPolicy {
        NetworkPolicy {
            default_action: Some(NetworkAction::Deny),
            egress: vec![NetworkRule {
                action: NetworkAction::Allow,
                target: "*.pypi.org".to_string(),
            }],
        }
    }

    #[test]
    fn no_op_without_image() {
        let mut spec = json!({"containers": [{"name": "main"}]});
        apply_egress_to_spec(&mut spec, Some(&sample_policy()), None, "main");
        assert_eq!(spec["containers"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn adds_sidecar_and_drops_capability() {
        let mut spec = json!({"containers": [{"name": "main"}]});
        apply_egress_to_spec(&mut spec, Some(&sample_policy()), Some("egress:1"), "main");
        let containers = spec["containers"].as_array().unwrap();
        assert_eq!(containers.len(), 2);
        assert!(containers.iter().any(|c| c["name"] == "egress"));
        let main = containers.iter().find(|c| c["name"] == "main").unwrap();
        assert_eq!(
            main["securityContext"]["capabilities"]["drop"][0],
            "NET_ADMIN"
        );
        let sysctls = spec["securityContext"]["sysctls"].as_array().unwrap();
        assert_eq!(sysctls.len(), 3);
    }

    #[test]
    fn sysctl_merge_is_last_write_wins_by_name() {
        let existing = vec![json!({"name": "net.core.somaxconn", "value": "1024"})];
        let incoming = vec![json!({"name": "net.ipv6.conf.all.disable_ipv6", "value": "1"})];
        let merged = merge_sysctls(&existing, &incoming);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0]["name"], "net.core.somaxconn");
    }
}
