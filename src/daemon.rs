//! Boundary to the container-runtime daemon

use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

/// Labels applied to created networks and containers
pub type Labels = HashMap<String, String>;

/// How a container attaches to one network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    pub network_id: String,
    /// Names the container answers to inside the network
    pub aliases: Vec<String>,
}

impl EndpointConfig {
    pub fn new(network_id: impl Into<String>, aliases: Vec<String>) -> Self {
        Self {
            network_id: network_id.into(),
            aliases,
        }
    }
}

/// Point-in-time view of a network as reported by the daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkSnapshot {
    pub id: String,
    pub name: String,
    /// IDs of the containers connected to the network
    pub containers: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
}

/// A container found by label, as reported by the daemon's list endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledContainer {
    pub id: String,
    pub name: String,
    pub created: Option<DateTime<Utc>>,
}

/// Management API of a container-runtime daemon.
///
/// Calls are plain request/response round trips; deadlines are applied by the
/// caller through [`with_deadline`].
#[async_trait]
pub trait ContainerDaemon: Send + Sync {
    /// Create a network and return its daemon-assigned ID
    async fn create_network(&self, name: &str, labels: &Labels) -> Result<String>;

    async fn remove_network(&self, network_id: &str) -> Result<()>;

    /// Whether the image is available locally
    async fn image_exists(&self, image: &str) -> Result<bool>;

    async fn pull_image(&self, image: &str) -> Result<()>;

    /// Create a container attached to a single network endpoint
    async fn create_container(
        &self,
        image: &str,
        labels: &Labels,
        endpoint: &EndpointConfig,
        name: &str,
    ) -> Result<String>;

    async fn start_container(&self, container_id: &str) -> Result<()>;

    async fn remove_container(&self, container_id: &str, force: bool) -> Result<()>;

    /// Connect an existing container to one more network
    async fn connect_network(
        &self,
        network_id: &str,
        container_id: &str,
        endpoint: &EndpointConfig,
    ) -> Result<()>;

    /// List networks, optionally only those carrying the given label key.
    ///
    /// Membership in the returned snapshots may be empty; use
    /// [`ContainerDaemon::inspect_network`] for an up-to-date member list.
    async fn list_networks(&self, label_key: Option<&str>) -> Result<Vec<NetworkSnapshot>>;

    async fn inspect_network(&self, network_id: &str) -> Result<NetworkSnapshot>;

    /// All containers (running or not) carrying the given label key
    async fn list_containers(&self, label_key: &str) -> Result<Vec<LabeledContainer>>;
}

/// Run a daemon call with a deadline, turning expiry into [`Error::Timeout`]
pub(crate) async fn with_deadline<T, F>(
    operation: &'static str,
    after: Duration,
    call: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(after, call).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout { operation, after }),
    }
}
