//! Creation of the networks and the probe container

use crate::{
    config::VerifierConfig,
    daemon::{with_deadline, ContainerDaemon, EndpointConfig},
    naming::CleanupLabel,
    teardown::{Resource, Teardown},
    Result,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Creates daemon resources for one run and registers each for teardown as
/// soon as it exists.
///
/// Every daemon failure is returned to the caller unchanged; nothing is retried.
pub struct Provisioner {
    daemon: Arc<dyn ContainerDaemon>,
    call_timeout: Duration,
    pull_timeout: Duration,
    label: CleanupLabel,
    /// Network name -> daemon-assigned ID
    network_ids: HashMap<String, String>,
    teardown: Teardown,
}

impl Provisioner {
    pub fn new(
        daemon: Arc<dyn ContainerDaemon>,
        config: &VerifierConfig,
        label: CleanupLabel,
    ) -> Self {
        let teardown = Teardown::new(Arc::clone(&daemon), config.call_timeout)
            .with_cleanup_on_drop(!config.keep_resources);

        Self {
            daemon,
            call_timeout: config.call_timeout,
            pull_timeout: config.pull_timeout,
            label,
            network_ids: HashMap::new(),
            teardown,
        }
    }

    pub fn label(&self) -> &CleanupLabel {
        &self.label
    }

    /// Create a labeled network and remember its ID under `name`
    pub async fn create_network(&mut self, name: &str) -> Result<String> {
        let labels = self.label.to_labels();
        let network_id = with_deadline(
            "create network",
            self.call_timeout,
            self.daemon.create_network(name, &labels),
        )
        .await?;

        self.teardown.register(Resource::Network {
            id: network_id.clone(),
            name: name.to_string(),
        });
        self.network_ids.insert(name.to_string(), network_id.clone());

        tracing::info!("Created network {} ({})", name, network_id);
        Ok(network_id)
    }

    /// ID of a network created by this provisioner
    pub fn network_id(&self, name: &str) -> Option<&str> {
        self.network_ids.get(name).map(String::as_str)
    }

    /// Pull `image` unless the daemon already has it
    pub async fn ensure_image(&self, image: &str) -> Result<()> {
        let present = with_deadline(
            "inspect image",
            self.call_timeout,
            self.daemon.image_exists(image),
        )
        .await?;

        if present {
            tracing::debug!("Image {} already present", image);
            return Ok(());
        }

        tracing::info!("Pulling image {}...", image);
        with_deadline("pull image", self.pull_timeout, self.daemon.pull_image(image)).await?;
        tracing::info!("Pulled image {}", image);
        Ok(())
    }

    /// Create a labeled container attached to exactly one network endpoint
    pub async fn create_container(
        &mut self,
        image: &str,
        endpoint: &EndpointConfig,
        name: &str,
    ) -> Result<String> {
        let labels = self.label.to_labels();
        let container_id = with_deadline(
            "create container",
            self.call_timeout,
            self.daemon.create_container(image, &labels, endpoint, name),
        )
        .await?;

        self.teardown.register(Resource::Container {
            id: container_id.clone(),
            name: name.to_string(),
        });

        tracing::info!(
            "Created container {} ({}) on network {} as {:?}",
            name,
            container_id,
            endpoint.network_id,
            endpoint.aliases
        );
        Ok(container_id)
    }

    pub async fn start_container(&self, container_id: &str) -> Result<()> {
        with_deadline(
            "start container",
            self.call_timeout,
            self.daemon.start_container(container_id),
        )
        .await?;
        tracing::info!("Started container {}", container_id);
        Ok(())
    }

    /// Connect one more network to an existing container
    pub async fn attach_network(
        &self,
        network_id: &str,
        container_id: &str,
        endpoint: &EndpointConfig,
    ) -> Result<()> {
        with_deadline(
            "connect network",
            self.call_timeout,
            self.daemon.connect_network(network_id, container_id, endpoint),
        )
        .await?;

        tracing::info!(
            "Attached network {} to container {} as {:?}",
            network_id,
            container_id,
            endpoint.aliases
        );
        Ok(())
    }

    pub fn teardown(&mut self) -> &mut Teardown {
        &mut self.teardown
    }
}
