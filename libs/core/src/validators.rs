//! Pure validation functions for inbound sandbox requests. None of these
//! touch I/O; they either return the validated value or a `ValidationError`.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::error::{ErrorCode, ValidationError, ValidationResult};
use crate::model::{SandboxRequest, Volume, VolumeBackend};

static DNS_LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").unwrap());

static LABEL_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]([-A-Za-z0-9_.]*[A-Za-z0-9])?$").unwrap());

static LABEL_VALUE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]([-A-Za-z0-9_.]*[A-Za-z0-9])?$").unwrap());

const LABEL_KEY_PREFIX_MAX: usize = 253;
const LABEL_NAME_MAX: usize = 63;
const VOLUME_NAME_MAX: usize = 63;
const PVC_NAME_MAX: usize = 253;

pub fn ensure_entrypoint(entrypoint: &[String]) -> ValidationResult<()> {
    if entrypoint.is_empty() {
        return Err(ValidationError::new(
            ErrorCode::InvalidEntrypoint,
            "entrypoint must contain at least one element",
        ));
    }
    if entrypoint.iter().any(|arg| arg.is_empty()) {
        return Err(ValidationError::new(
            ErrorCode::InvalidEntrypoint,
            "entrypoint elements must be non-empty strings",
        ));
    }
    Ok(())
}

fn is_valid_label_key(key: &str) -> bool {
    let (prefix, name) = match key.split_once('/') {
        Some((prefix, name)) => (Some(prefix), name),
        None => (None, key),
    };
    if let Some(prefix) = prefix {
        if prefix.is_empty() || prefix.len() > LABEL_KEY_PREFIX_MAX {
            return false;
        }
        if !prefix
            .split('.')
            .all(|seg| !seg.is_empty() && DNS_LABEL_RE.is_match(seg))
        {
            return false;
        }
    }
    !name.is_empty() && name.len() <= LABEL_NAME_MAX && LABEL_NAME_RE.is_match(name)
}

fn is_valid_label_value(value: &str) -> bool {
    value.is_empty() || (value.len() <= LABEL_NAME_MAX && LABEL_VALUE_RE.is_match(value))
}

pub fn ensure_metadata_labels(
    metadata: &std::collections::BTreeMap<String, String>,
) -> ValidationResult<()> {
    for (key, value) in metadata {
        if !is_valid_label_key(key) {
            return Err(ValidationError::new(
                ErrorCode::InvalidMetadataLabel,
                format!("invalid metadata label key: {key}"),
            ));
        }
        if !is_valid_label_value(value) {
            return Err(ValidationError::new(
                ErrorCode::InvalidMetadataLabel,
                format!("invalid metadata label value for key {key}: {value}"),
            ));
        }
    }
    Ok(())
}

/// Rejects expirations at or before `now`, and normalizes naive timestamps
/// by assuming UTC (the wire format is always UTC already, this only guards
/// inputs that lost their offset in transit).
pub fn ensure_future_expiration(
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> ValidationResult<DateTime<Utc>> {
    if expires_at <= now {
        return Err(ValidationError::new(
            ErrorCode::InvalidExpiration,
            format!("expiration {expires_at} must be in the future (now: {now})"),
        ));
    }
    Ok(expires_at)
}

pub fn ensure_valid_port(port: u32) -> ValidationResult<u16> {
    if port == 0 || port > 65535 {
        return Err(ValidationError::new(
            ErrorCode::InvalidPort,
            format!("port {port} must be between 1 and 65535"),
        ));
    }
    Ok(port as u16)
}

pub fn ensure_valid_volume_name(name: &str) -> ValidationResult<()> {
    if name.is_empty() || name.len() > VOLUME_NAME_MAX || !DNS_LABEL_RE.is_match(name) {
        return Err(ValidationError::new(
            ErrorCode::InvalidVolumeName,
            format!("invalid volume name: {name}"),
        ));
    }
    Ok(())
}

pub fn ensure_valid_mount_path(path: &str) -> ValidationResult<()> {
    if !path.starts_with('/') {
        return Err(ValidationError::new(
            ErrorCode::InvalidMountPath,
            format!("mount path must be absolute: {path}"),
        ));
    }
    Ok(())
}

pub fn ensure_valid_sub_path(sub_path: &str) -> ValidationResult<()> {
    if sub_path.starts_with('/') || sub_path.split('/').any(|seg| seg == "..") {
        return Err(ValidationError::new(
            ErrorCode::InvalidSubPath,
            format!("invalid sub path: {sub_path}"),
        ));
    }
    Ok(())
}

/// `allowed_prefixes` is the allowlist from the Docker runtime config; an
/// empty allowlist means every absolute path is accepted.
pub fn ensure_valid_host_path(path: &str, allowed_prefixes: &[String]) -> ValidationResult<()> {
    if !path.starts_with('/') || path.contains("/..") || path.contains("//") {
        return Err(ValidationError::new(
            ErrorCode::InvalidHostPath,
            format!("invalid host path: {path}"),
        ));
    }
    if path.len() > 1 && path.ends_with('/') {
        return Err(ValidationError::new(
            ErrorCode::InvalidHostPath,
            format!("host path must not have a trailing slash: {path}"),
        ));
    }
    if !allowed_prefixes.is_empty()
        && !allowed_prefixes
            .iter()
            .any(|prefix| path == prefix || path.starts_with(&format!("{prefix}/")))
    {
        return Err(ValidationError::new(
            ErrorCode::HostPathNotAllowed,
            format!("host path {path} is not under an allowed prefix"),
        ));
    }
    Ok(())
}

pub fn ensure_valid_pvc_name(name: &str) -> ValidationResult<()> {
    if name.is_empty() || name.len() > PVC_NAME_MAX || !DNS_LABEL_RE.is_match(name) {
        return Err(ValidationError::new(
            ErrorCode::InvalidPvcName,
            format!("invalid PVC claim name: {name}"),
        ));
    }
    Ok(())
}

fn ensure_exactly_one_backend(backend: &VolumeBackend) -> ValidationResult<()> {
    match (&backend.host, &backend.pvc) {
        (Some(_), None) | (None, Some(_)) => Ok(()),
        _ => Err(ValidationError::new(
            ErrorCode::InvalidVolumeBackend,
            "volume must specify exactly one of host or pvc",
        )),
    }
}

pub fn ensure_volumes_valid(
    volumes: &[Volume],
    allowed_host_prefixes: &[String],
) -> ValidationResult<()> {
    let mut seen = std::collections::HashSet::new();
    for volume in volumes {
        if !seen.insert(volume.name.as_str()) {
            return Err(ValidationError::new(
                ErrorCode::DuplicateVolumeName,
                format!("duplicate volume name: {}", volume.name),
            ));
        }
        ensure_valid_volume_name(&volume.name)?;
        ensure_valid_mount_path(&volume.mount_path)?;
        if let Some(sub_path) = &volume.sub_path {
            ensure_valid_sub_path(sub_path)?;
        }
        ensure_exactly_one_backend(&volume.backend)?;
        if let Some(host) = &volume.backend.host {
            ensure_valid_host_path(&host.path, allowed_host_prefixes)?;
        }
        if let Some(pvc) = &volume.backend.pvc {
            ensure_valid_pvc_name(&pvc.claim_name)?;
        }
    }
    Ok(())
}

/// A network policy requires an egress sidecar image to actually enforce
/// anything; a policy with no image configured anywhere is rejected rather
/// than silently ignored.
pub fn ensure_egress_configured(
    has_network_policy: bool,
    egress_image: Option<&str>,
) -> ValidationResult<()> {
    if has_network_policy && egress_image.unwrap_or("").is_empty() {
        return Err(ValidationError::new(
            ErrorCode::InvalidParameter,
            "network policy requires an egress sidecar image to be configured",
        ));
    }
    Ok(())
}

/// Runs the full set of structural validators over a request. Does not
/// check expiration (the caller supplies `now` and a policy-derived
/// timeout) or egress image availability (the caller knows the runtime
/// configuration); those are validated separately at the call site.
pub fn validate_request(
    request: &SandboxRequest,
    allowed_host_prefixes: &[String],
) -> ValidationResult<()> {
    ensure_entrypoint(&request.entrypoint)?;
    ensure_metadata_labels(&request.metadata)?;
    if request.timeout_seconds == 0 {
        return Err(ValidationError::new(
            ErrorCode::InvalidExpiration,
            "timeout_seconds must be greater than zero",
        ));
    }
    if let Some(volumes) = &request.volumes {
        ensure_volumes_valid(volumes, allowed_host_prefixes)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn entrypoint_rejects_empty() {
        assert!(ensure_entrypoint(&[]).is_err());
        assert!(ensure_entrypoint(&["".to_string()]).is_err());
        assert!(ensure_entrypoint(&["echo".to_string()]).is_ok());
    }

    #[test]
    fn label_key_accepts_prefixed_and_bare() {
        let mut m = std::collections::BTreeMap::new();
        m.insert("opensandbox.io/owner".to_string(), "alice".to_string());
        m.insert("team".to_string(), "platform".to_string());
        assert!(ensure_metadata_labels(&m).is_ok());
    }

    #[test]
    fn label_key_rejects_bad_prefix() {
        let mut m = std::collections::BTreeMap::new();
        m.insert("/owner".to_string(), "alice".to_string());
        assert!(ensure_metadata_labels(&m).is_err());
    }

    #[test]
    fn expiration_must_be_future() {
        let now = Utc::now();
        assert!(ensure_future_expiration(now - Duration::seconds(1), now).is_err());
        assert!(ensure_future_expiration(now, now).is_err());
        assert!(ensure_future_expiration(now + Duration::seconds(1), now).is_ok());
    }

    #[test]
    fn port_range() {
        assert!(ensure_valid_port(0).is_err());
        assert!(ensure_valid_port(65536).is_err());
        assert!(ensure_valid_port(1).is_ok());
        assert!(ensure_valid_port(65535).is_ok());
    }

    #[test]
    fn sub_path_rejects_traversal_and_absolute() {
        assert!(ensure_valid_sub_path("../etc").is_err());
        assert!(ensure_valid_sub_path("a/../b").is_err());
        assert!(ensure_valid_sub_path("/etc").is_err());
        assert!(ensure_valid_sub_path("data/sub").is_ok());
    }

    #[test]
    fn host_path_rules() {
        assert!(ensure_valid_host_path("relative", &[]).is_err());
        assert!(ensure_valid_host_path("/a/..", &[]).is_err());
        assert!(ensure_valid_host_path("/a//b", &[]).is_err());
        assert!(ensure_valid_host_path("/a/", &[]).is_err());
        assert!(ensure_valid_host_path("/", &[]).is_ok());
        assert!(ensure_valid_host_path("/data", &["/var".to_string()]).is_err());
        assert!(ensure_valid_host_path("/var/data", &["/var".to_string()]).is_ok());
    }

    #[test]
    fn volumes_reject_duplicates_and_dual_backend() {
        use crate::model::{AccessMode, HostVolumeBackend, PvcVolumeBackend};

        let dup = vec![
            Volume {
                name: "a".into(),
                mount_path: "/a".into(),
                access_mode: AccessMode::Rw,
                sub_path: None,
                backend: VolumeBackend {
                    host: Some(HostVolumeBackend { path: "/a".into() }),
                    pvc: None,
                },
            },
            Volume {
                name: "a".into(),
                mount_path: "/b".into(),
                access_mode: AccessMode::Rw,
                sub_path: None,
                backend: VolumeBackend {
                    host: Some(HostVolumeBackend { path: "/b".into() }),
                    pvc: None,
                },
            },
        ];
        assert_eq!(
            ensure_volumes_valid(&dup, &[]).unwrap_err().code,
            ErrorCode::DuplicateVolumeName
        );

        let dual = vec![Volume {
            name: "a".into(),
            mount_path: "/a".into(),
            access_mode: AccessMode::Rw,
            sub_path: None,
            backend: VolumeBackend {
                host: Some(HostVolumeBackend { path: "/a".into() }),
                pvc: Some(PvcVolumeBackend {
                    claim_name: "claim".into(),
                }),
            },
        }];
        assert_eq!(
            ensure_volumes_valid(&dual, &[]).unwrap_err().code,
            ErrorCode::InvalidVolumeBackend
        );
    }

    #[test]
    fn egress_requires_image() {
        assert!(ensure_egress_configured(true, None).is_err());
        assert!(ensure_egress_configured(true, Some("")).is_err());
        assert!(ensure_egress_configured(true, Some("egress:latest")).is_ok());
        assert!(ensure_egress_configured(false, None).is_ok());
    }
}
