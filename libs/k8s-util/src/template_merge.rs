//! Deep-merge semantics for BatchSandbox/Sandbox pod templates: a base
//! template (operator- or pool-supplied) overlaid with per-sandbox values
//! built from the request.
//!
//! [`json_patch::merge`] gives RFC 7396 JSON Merge Patch semantics: objects
//! recurse key-by-key, arrays are replaced wholesale, and a `null` value
//! *removes* the key. The removal behavior is wrong for this template
//! manager: a template merge's `null` must leave the base value alone
//! rather than deleting it. Every overlay is passed through [`strip_nulls`]
//! before it reaches `json_patch::merge`, so a `null` in the overlay is
//! simply absent from the patch and the base key survives untouched.
//!
//! That's right everywhere except pod `volumes` and container
//! `volumeMounts`, where replacing the array would silently drop whatever
//! the base template declared. Before delegating to `json_patch::merge`,
//! those two arrays are pre-resolved to a union-by-`name` array (overlay
//! entries win on conflict, base entries that aren't shadowed are kept);
//! the merge patch then replaces the array wholesale with that precomputed
//! result.

use serde_json::Value;

const NAME_KEYED_ARRAYS: &[&str] = &["volumes", "volumeMounts"];

/// Recursively drops object keys whose value is `null`, so a subsequent
/// `json_patch::merge` can't use them to delete a base key.
fn strip_nulls(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), strip_nulls(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(strip_nulls).collect()),
        other => other.clone(),
    }
}

/// Deep-merges `overlay` onto `base`, using union-by-name semantics for
/// `volumes` and `volumeMounts` arrays found anywhere in the document.
/// A `null` anywhere in `overlay` never overrides the corresponding base
/// value.
pub fn merge_pod_spec(base: &Value, overlay: &Value) -> Value {
    let mut merged = base.clone();
    let overlay = strip_nulls(overlay);
    let resolved_overlay = resolve_name_keyed_arrays(&merged, &overlay);
    json_patch::merge(&mut merged, &resolved_overlay);
    merged
}

/// Walks `overlay` in lockstep with `base`, replacing any `volumes` /
/// `volumeMounts` array with its union-by-name result so the subsequent
/// merge-patch array replacement is a no-op for those keys.
fn resolve_name_keyed_arrays(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            let mut resolved = serde_json::Map::new();
            for (key, overlay_value) in overlay_map {
                if NAME_KEYED_ARRAYS.contains(&key.as_str()) {
                    let merged_array = match base_map.get(key) {
                        Some(base_value) => union_by_name(base_value, overlay_value),
                        None => overlay_value.clone(),
                    };
                    resolved.insert(key.clone(), merged_array);
                    continue;
                }
                let nested_base = base_map.get(key).unwrap_or(&Value::Null);
                resolved.insert(key.clone(), resolve_name_keyed_arrays(nested_base, overlay_value));
            }
            Value::Object(resolved)
        }
        _ => overlay.clone(),
    }
}

/// Merges two JSON arrays of objects keyed by their `name` field. Overlay
/// entries win on conflict and are deep-merged onto the base entry, not
/// simply replacing it, so e.g. an overlay volume that only sets
/// `emptyDir` onto a base entry that also has `name` keeps both fields.
fn union_by_name(base: &Value, overlay: &Value) -> Value {
    let (Some(base_items), Some(overlay_items)) = (base.as_array(), overlay.as_array()) else {
        return overlay.clone();
    };

    let mut order: Vec<String> = Vec::new();
    let mut by_name: std::collections::BTreeMap<String, Value> = std::collections::BTreeMap::new();

    for item in base_items {
        if let Some(name) = item.get("name").and_then(Value::as_str) {
            order.push(name.to_string());
            by_name.insert(name.to_string(), item.clone());
        }
    }
    for item in overlay_items {
        let item = strip_nulls(item);
        if let Some(name) = item.get("name").and_then(Value::as_str) {
            match by_name.get_mut(name) {
                Some(existing) => {
                    let mut merged = existing.clone();
                    json_patch::merge(&mut merged, &item);
                    *existing = merged;
                }
                None => {
                    order.push(name.to_string());
                    by_name.insert(name.to_string(), item);
                }
            }
        }
    }

    Value::Array(
        order
            .into_iter()
            .filter_map(|name| by_name.remove(&name))
            .collect(),
    )
}

/// Merges `overlay_containers` onto `base_containers` by `name`. Mirrors the
/// operator-template merge used when building a BatchSandbox manifest in
/// template mode.
pub fn merge_containers(base_containers: &Value, overlay_containers: &Value) -> Value {
    union_by_name(base_containers, overlay_containers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalar_overlay_replaces() {
        let base = json!({"replicas": 1, "name": "a"});
        let overlay = json!({"replicas": 2});
        assert_eq!(
            merge_pod_spec(&base, &overlay),
            json!({"replicas": 2, "name": "a"})
        );
    }

    #[test]
    fn null_never_overrides_base() {
        let base = json!({"a": 1, "b": 2});
        let overlay = json!({"b": null});
        assert_eq!(merge_pod_spec(&base, &overlay), json!({"a": 1, "b": 2}));
    }

    #[test]
    fn volumes_union_by_name_keeps_base_entries() {
        let base = json!({
            "volumes": [
                {"name": "bin", "emptyDir": {}},
                {"name": "data", "hostPath": {"path": "/data"}}
            ]
        });
        let overlay = json!({
            "volumes": [
                {"name": "data", "hostPath": {"path": "/overridden"}},
                {"name": "extra", "emptyDir": {}}
            ]
        });
        let merged = merge_pod_spec(&base, &overlay);
        let volumes = merged["volumes"].as_array().unwrap();
        assert_eq!(volumes.len(), 3);
        let data = volumes.iter().find(|v| v["name"] == "data").unwrap();
        assert_eq!(data["hostPath"]["path"], "/overridden");
        assert!(volumes.iter().any(|v| v["name"] == "bin"));
        assert!(volumes.iter().any(|v| v["name"] == "extra"));
    }

    #[test]
    fn nested_objects_recurse() {
        let base = json!({"resources": {"limits": {"cpu": "1", "memory": "1Gi"}}});
        let overlay = json!({"resources": {"limits": {"cpu": "2"}}});
        let merged = merge_pod_spec(&base, &overlay);
        assert_eq!(merged["resources"]["limits"]["cpu"], "2");
        assert_eq!(merged["resources"]["limits"]["memory"], "1Gi");
    }

    #[test]
    fn container_merge_by_name() {
        let base = json!([{"name": "main", "image": "old", "env": [{"name": "A", "value": "1"}]}]);
        let overlay = json!([{"name": "main", "image": "new"}]);
        let merged = merge_containers(&base, &overlay);
        assert_eq!(merged[0]["image"], "new");
        assert_eq!(merged[0]["env"][0]["name"], "A");
    }
}
