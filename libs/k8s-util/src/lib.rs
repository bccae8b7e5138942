//! Helpers shared by the cluster workload providers: pod template merging,
//! egress sidecar composition, and shell-quoting for pool-mode tasks.

pub mod egress;
pub mod quoting;
pub mod template_merge;

pub use egress::{
    apply_egress_to_spec, build_egress_sidecar_container, build_ipv6_disable_sysctls,
    build_security_context_for_sandbox_container, merge_sysctls, EGRESS_RULES_ENV,
};
pub use quoting::{build_pool_command, quote_entrypoint};
pub use template_merge::{merge_containers, merge_pod_spec};
