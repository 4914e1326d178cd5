//! Network-membership verification harness for a Docker daemon
//!
//! The harness provisions uniquely named networks and a container, attaches the
//! container to every network (the first at creation time, the rest afterwards),
//! then checks that the daemon reports exactly one member per network. Every
//! created resource is labeled and released again in reverse creation order.

mod config;
mod daemon;
pub mod docker;
mod membership;
mod naming;
mod provision;
mod scenario;
mod sweep;
mod teardown;

pub use config::{VerifierConfig, DEFAULT_IMAGE, DEFAULT_LABEL_KEY};
pub use daemon::{ContainerDaemon, EndpointConfig, LabeledContainer, Labels, NetworkSnapshot};
pub use docker::DockerDaemon;
pub use membership::{
    assert_single_membership, lookup_networks_by_name, select_networks_by_name,
    MembershipMismatch,
};
pub use naming::{unique_id, unique_name, CleanupLabel};
pub use provision::Provisioner;
pub use scenario::{
    run_plan, run_scenario, ProvisionedNetwork, ScenarioPlan, ScenarioReport,
};
pub use sweep::sweep_labeled;
pub use teardown::{Resource, Teardown};

use std::time::Duration;

/// Result type used throughout this crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while provisioning or verifying
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Docker call '{operation}' failed: {source}")]
    Docker {
        operation: &'static str,
        #[source]
        source: bollard::errors::Error,
    },

    #[error("Daemon call '{operation}' timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Error searching for network {0}: network not found")]
    NetworkNotFound(String),

    #[error("Membership verification failed for {} network(s)", .0.len())]
    Membership(Vec<MembershipMismatch>),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Whether this error is a verification failure rather than a setup failure
    pub fn is_verification_failure(&self) -> bool {
        matches!(self, Error::Membership(_))
    }
}
