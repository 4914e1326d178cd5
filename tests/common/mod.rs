//! In-memory daemon that records every call and mimics the Engine's rules

#![allow(dead_code)]

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use netmember_verify::{
    ContainerDaemon, EndpointConfig, Error, LabeledContainer, Labels, NetworkSnapshot, Result,
    VerifierConfig,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const TEST_IMAGE: &str = "registry.test/probe:1";

pub fn test_config() -> VerifierConfig {
    VerifierConfig {
        image: TEST_IMAGE.to_string(),
        call_timeout: Duration::from_secs(5),
        name_prefix: "test".to_string(),
        ..VerifierConfig::base()
    }
}

struct FakeNetwork {
    id: String,
    name: String,
    labels: Labels,
    /// (container id, aliases)
    members: Vec<(String, Vec<String>)>,
    created: DateTime<Utc>,
}

struct FakeContainer {
    id: String,
    name: String,
    labels: Labels,
    running: bool,
    created: DateTime<Utc>,
}

#[derive(Default)]
struct State {
    next_id: usize,
    networks: Vec<FakeNetwork>,
    containers: Vec<FakeContainer>,
    images: HashSet<String>,
    operations: Vec<String>,
    failing: HashSet<String>,
    stalled: HashSet<String>,
    ignore_connects: bool,
}

impl State {
    fn allocate_id(&mut self, kind: &str) -> String {
        self.next_id += 1;
        format!("{}-{:04}", kind, self.next_id)
    }

    fn network_mut(&mut self, id: &str) -> Option<&mut FakeNetwork> {
        self.networks.iter_mut().find(|n| n.id == id)
    }
}

#[derive(Clone, Default)]
pub struct RecordingDaemon {
    inner: Arc<Mutex<State>>,
}

impl RecordingDaemon {
    /// Daemon that already has [`TEST_IMAGE`]
    pub fn new() -> Self {
        let daemon = Self::default();
        daemon.inner.lock().unwrap().images.insert(TEST_IMAGE.to_string());
        daemon
    }

    /// Daemon without any local images
    pub fn without_images() -> Self {
        Self::default()
    }

    /// Make every call named `operation` fail
    pub fn fail_on(&self, operation: &str) {
        self.inner.lock().unwrap().failing.insert(operation.to_string());
    }

    /// Make every call named `operation` hang
    pub fn stall_on(&self, operation: &str) {
        self.inner.lock().unwrap().stalled.insert(operation.to_string());
    }

    /// Accept connect calls without recording the membership
    pub fn ignore_connects(&self) {
        self.inner.lock().unwrap().ignore_connects = true;
    }

    pub fn operations(&self) -> Vec<String> {
        self.inner.lock().unwrap().operations.clone()
    }

    /// Operations whose name starts with `prefix`
    pub fn operations_matching(&self, prefix: &str) -> Vec<String> {
        self.operations()
            .into_iter()
            .filter(|op| op.starts_with(prefix))
            .collect()
    }

    pub fn network_count(&self) -> usize {
        self.inner.lock().unwrap().networks.len()
    }

    pub fn container_count(&self) -> usize {
        self.inner.lock().unwrap().containers.len()
    }

    pub fn has_image(&self, image: &str) -> bool {
        self.inner.lock().unwrap().images.contains(image)
    }

    pub fn network_labels(&self, name: &str) -> Option<Labels> {
        let state = self.inner.lock().unwrap();
        state
            .networks
            .iter()
            .find(|n| n.name == name)
            .map(|n| n.labels.clone())
    }

    pub fn container_labels(&self, name: &str) -> Option<Labels> {
        let state = self.inner.lock().unwrap();
        state
            .containers
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.labels.clone())
    }

    pub fn is_running(&self, container_id: &str) -> bool {
        let state = self.inner.lock().unwrap();
        state
            .containers
            .iter()
            .any(|c| c.id == container_id && c.running)
    }

    /// Aliases `container_id` answers to on network `network_id`
    pub fn aliases(&self, network_id: &str, container_id: &str) -> Option<Vec<String>> {
        let state = self.inner.lock().unwrap();
        state
            .networks
            .iter()
            .find(|n| n.id == network_id)?
            .members
            .iter()
            .find(|(member, _)| member == container_id)
            .map(|(_, aliases)| aliases.clone())
    }

    /// Network created behind the harness's back, as another tool would
    pub fn add_foreign_network(&self, name: &str) -> String {
        let mut state = self.inner.lock().unwrap();
        let id = state.allocate_id("foreign");
        state.networks.push(FakeNetwork {
            id: id.clone(),
            name: name.to_string(),
            labels: Labels::new(),
            members: Vec::new(),
            created: Utc::now(),
        });
        id
    }

    /// Pretend the network or container called `name` was created `age` ago
    pub fn backdate(&self, name: &str, age: Duration) {
        let created = Utc::now() - chrono::Duration::from_std(age).unwrap();
        let mut state = self.inner.lock().unwrap();
        for network in state.networks.iter_mut().filter(|n| n.name == name) {
            network.created = created;
        }
        for container in state.containers.iter_mut().filter(|c| c.name == name) {
            container.created = created;
        }
    }

    /// Remove a container without going through the harness
    pub fn remove_container_out_of_band(&self, container_id: &str) {
        let mut state = self.inner.lock().unwrap();
        state.containers.retain(|c| c.id != container_id);
        for network in &mut state.networks {
            network.members.retain(|(member, _)| member != container_id);
        }
    }

    /// Record the call and decide whether it should fail or hang
    async fn begin(&self, operation: &str, detail: &str) -> Result<()> {
        let stall = {
            let mut state = self.inner.lock().unwrap();
            if detail.is_empty() {
                state.operations.push(operation.to_string());
            } else {
                state.operations.push(format!("{}:{}", operation, detail));
            }
            if state.failing.contains(operation) {
                return Err(Error::Other(anyhow!("injected failure in {}", operation)));
            }
            state.stalled.contains(operation)
        };

        if stall {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        Ok(())
    }
}

fn daemon_error(message: String) -> Error {
    Error::Other(anyhow!(message))
}

#[async_trait]
impl ContainerDaemon for RecordingDaemon {
    async fn create_network(&self, name: &str, labels: &Labels) -> Result<String> {
        self.begin("create_network", name).await?;
        let mut state = self.inner.lock().unwrap();
        if state.networks.iter().any(|n| n.name == name) {
            return Err(daemon_error(format!(
                "network with name {} already exists",
                name
            )));
        }
        let id = state.allocate_id("net");
        state.networks.push(FakeNetwork {
            id: id.clone(),
            name: name.to_string(),
            labels: labels.clone(),
            members: Vec::new(),
            created: Utc::now(),
        });
        Ok(id)
    }

    async fn remove_network(&self, network_id: &str) -> Result<()> {
        self.begin("remove_network", network_id).await?;
        let mut state = self.inner.lock().unwrap();
        let network = state
            .networks
            .iter()
            .find(|n| n.id == network_id)
            .ok_or_else(|| daemon_error(format!("network {} not found", network_id)))?;
        if !network.members.is_empty() {
            return Err(daemon_error(format!(
                "network {} has active endpoints",
                network_id
            )));
        }
        state.networks.retain(|n| n.id != network_id);
        Ok(())
    }

    async fn image_exists(&self, image: &str) -> Result<bool> {
        self.begin("image_exists", image).await?;
        Ok(self.inner.lock().unwrap().images.contains(image))
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        self.begin("pull_image", image).await?;
        self.inner.lock().unwrap().images.insert(image.to_string());
        Ok(())
    }

    async fn create_container(
        &self,
        image: &str,
        labels: &Labels,
        endpoint: &EndpointConfig,
        name: &str,
    ) -> Result<String> {
        self.begin("create_container", name).await?;
        let mut state = self.inner.lock().unwrap();
        if !state.images.contains(image) {
            return Err(daemon_error(format!("No such image: {}", image)));
        }
        if state.containers.iter().any(|c| c.name == name) {
            return Err(daemon_error(format!(
                "container name {} is already in use",
                name
            )));
        }
        if !state.networks.iter().any(|n| n.id == endpoint.network_id) {
            return Err(daemon_error(format!(
                "network {} not found",
                endpoint.network_id
            )));
        }

        let id = state.allocate_id("ctr");
        state.containers.push(FakeContainer {
            id: id.clone(),
            name: name.to_string(),
            labels: labels.clone(),
            running: false,
            created: Utc::now(),
        });
        if let Some(network) = state.network_mut(&endpoint.network_id) {
            network.members.push((id.clone(), endpoint.aliases.clone()));
        }
        Ok(id)
    }

    async fn start_container(&self, container_id: &str) -> Result<()> {
        self.begin("start_container", container_id).await?;
        let mut state = self.inner.lock().unwrap();
        let container = state
            .containers
            .iter_mut()
            .find(|c| c.id == container_id)
            .ok_or_else(|| daemon_error(format!("No such container: {}", container_id)))?;
        container.running = true;
        Ok(())
    }

    async fn remove_container(&self, container_id: &str, force: bool) -> Result<()> {
        self.begin("remove_container", container_id).await?;
        let mut state = self.inner.lock().unwrap();
        let container = state
            .containers
            .iter()
            .find(|c| c.id == container_id)
            .ok_or_else(|| daemon_error(format!("No such container: {}", container_id)))?;
        if container.running && !force {
            return Err(daemon_error(format!(
                "cannot remove running container {}",
                container_id
            )));
        }
        state.containers.retain(|c| c.id != container_id);
        for network in &mut state.networks {
            network.members.retain(|(member, _)| member != container_id);
        }
        Ok(())
    }

    async fn connect_network(
        &self,
        network_id: &str,
        container_id: &str,
        endpoint: &EndpointConfig,
    ) -> Result<()> {
        self.begin("connect_network", &format!("{}:{}", network_id, container_id))
            .await?;
        let mut state = self.inner.lock().unwrap();
        if !state.containers.iter().any(|c| c.id == container_id) {
            return Err(daemon_error(format!("No such container: {}", container_id)));
        }
        let ignore = state.ignore_connects;
        let network = state
            .network_mut(network_id)
            .ok_or_else(|| daemon_error(format!("network {} not found", network_id)))?;
        if network.members.iter().any(|(member, _)| member == container_id) {
            return Err(daemon_error(format!(
                "endpoint with name {} already exists in network {}",
                container_id, network_id
            )));
        }
        if !ignore {
            network
                .members
                .push((container_id.to_string(), endpoint.aliases.clone()));
        }
        Ok(())
    }

    async fn list_networks(&self, label_key: Option<&str>) -> Result<Vec<NetworkSnapshot>> {
        self.begin("list_networks", label_key.unwrap_or_default())
            .await?;
        let state = self.inner.lock().unwrap();
        // Like the Engine's list endpoint, member lists are left empty
        Ok(state
            .networks
            .iter()
            .filter(|n| label_key.map_or(true, |key| n.labels.contains_key(key)))
            .map(|n| NetworkSnapshot {
                id: n.id.clone(),
                name: n.name.clone(),
                containers: Vec::new(),
                created: Some(n.created),
            })
            .collect())
    }

    async fn inspect_network(&self, network_id: &str) -> Result<NetworkSnapshot> {
        self.begin("inspect_network", network_id).await?;
        let state = self.inner.lock().unwrap();
        let network = state
            .networks
            .iter()
            .find(|n| n.id == network_id)
            .ok_or_else(|| daemon_error(format!("network {} not found", network_id)))?;
        let mut containers: Vec<String> =
            network.members.iter().map(|(id, _)| id.clone()).collect();
        containers.sort();
        Ok(NetworkSnapshot {
            id: network.id.clone(),
            name: network.name.clone(),
            containers,
            created: Some(network.created),
        })
    }

    async fn list_containers(&self, label_key: &str) -> Result<Vec<LabeledContainer>> {
        self.begin("list_containers", label_key).await?;
        let state = self.inner.lock().unwrap();
        Ok(state
            .containers
            .iter()
            .filter(|c| c.labels.contains_key(label_key))
            .map(|c| LabeledContainer {
                id: c.id.clone(),
                name: c.name.clone(),
                created: Some(c.created),
            })
            .collect())
    }
}
