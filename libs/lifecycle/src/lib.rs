//! The sandbox lifecycle engine: create/list/renew/expire/restore over a
//! pluggable workload provider, plus the endpoint formatter used to turn
//! backend-reported addresses into externally reachable ones.

pub mod endpoint;
pub mod engine;
pub mod error;

pub use endpoint::{format_endpoint, FormattedEndpoint, RouterMode};
pub use engine::{LifecycleConfig, LifecycleEngine};
pub use error::{LifecycleError, LifecycleResult};
