//! Docker Engine backend for the harness.
//!
//! Wraps a [`bollard::Docker`] client and translates between the harness's plain
//! data types and the Engine API models.

use crate::{
    daemon::{
        with_deadline, ContainerDaemon, EndpointConfig, LabeledContainer, Labels, NetworkSnapshot,
    },
    Error, Result,
};
use async_trait::async_trait;
use bollard::{
    container::{
        Config, CreateContainerOptions, ListContainersOptions, NetworkingConfig,
        RemoveContainerOptions, StartContainerOptions,
    },
    errors::Error as DockerError,
    image::CreateImageOptions,
    models::{ContainerSummary, EndpointSettings, Network},
    network::{
        ConnectNetworkOptions, CreateNetworkOptions, InspectNetworkOptions, ListNetworksOptions,
    },
    Docker,
};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::{collections::HashMap, time::Duration};

/// [`ContainerDaemon`] backed by the local Docker Engine
#[derive(Clone)]
pub struct DockerDaemon {
    docker: Docker,
}

impl DockerDaemon {
    /// Connect using `DOCKER_HOST` or the platform's default socket and verify
    /// the daemon answers within `timeout`
    pub async fn connect(timeout: Duration) -> Result<Self> {
        let docker = Docker::connect_with_local_defaults().map_err(docker_err("connect"))?;

        with_deadline("ping", timeout, async {
            docker.ping().await.map_err(docker_err("ping"))
        })
        .await?;

        Ok(Self { docker })
    }
}

fn docker_err(operation: &'static str) -> impl FnOnce(DockerError) -> Error {
    move |source| Error::Docker { operation, source }
}

fn label_filter(label_key: &str) -> HashMap<String, Vec<String>> {
    HashMap::from([("label".to_string(), vec![label_key.to_string()])])
}

fn endpoint_settings(endpoint: &EndpointConfig) -> EndpointSettings {
    EndpointSettings {
        aliases: Some(endpoint.aliases.clone()),
        network_id: Some(endpoint.network_id.clone()),
        ..Default::default()
    }
}

fn snapshot_from(network: Network) -> NetworkSnapshot {
    let mut containers: Vec<String> = network
        .containers
        .map(|members| members.into_keys().collect())
        .unwrap_or_default();
    containers.sort();

    // The Engine reports network creation as an RFC 3339 string
    let created = network
        .created
        .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
        .map(|created| created.with_timezone(&Utc));

    NetworkSnapshot {
        id: network.id.unwrap_or_default(),
        name: network.name.unwrap_or_default(),
        containers,
        created,
    }
}

fn labeled_container_from(summary: ContainerSummary) -> Option<LabeledContainer> {
    let name = summary
        .names
        .and_then(|names| names.into_iter().next())
        .map(|name| name.trim_start_matches('/').to_string())
        .unwrap_or_default();

    Some(LabeledContainer {
        id: summary.id?,
        name,
        created: summary
            .created
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0)),
    })
}

/// Split an image reference into the `fromImage` and `tag` pull parameters.
///
/// An empty tag makes the Engine pull every tag of the repository, so a missing
/// tag becomes `latest`.
pub(crate) fn split_image_reference(image: &str) -> (String, String) {
    if let Some((repository, digest)) = image.split_once('@') {
        return (repository.to_string(), digest.to_string());
    }

    // A ':' before the last '/' belongs to a registry port, not a tag
    let name_start = image.rfind('/').map(|i| i + 1).unwrap_or(0);
    match image[name_start..].rfind(':') {
        Some(i) => {
            let split = name_start + i;
            (image[..split].to_string(), image[split + 1..].to_string())
        }
        None => (image.to_string(), "latest".to_string()),
    }
}

#[async_trait]
impl ContainerDaemon for DockerDaemon {
    async fn create_network(&self, name: &str, labels: &Labels) -> Result<String> {
        let options = CreateNetworkOptions {
            name: name.to_string(),
            driver: "bridge".to_string(),
            labels: labels.clone(),
            ..Default::default()
        };

        let response = self
            .docker
            .create_network(options)
            .await
            .map_err(docker_err("create network"))?;

        Ok(response.id)
    }

    async fn remove_network(&self, network_id: &str) -> Result<()> {
        self.docker
            .remove_network(network_id)
            .await
            .map_err(docker_err("remove network"))
    }

    async fn image_exists(&self, image: &str) -> Result<bool> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(DockerError::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(docker_err("inspect image")(e)),
        }
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        let (from_image, tag) = split_image_reference(image);
        let options = CreateImageOptions {
            from_image,
            tag,
            ..Default::default()
        };

        let mut progress = self.docker.create_image(Some(options), None, None);
        while let Some(update) = progress.next().await {
            let info = update.map_err(docker_err("pull image"))?;
            if let Some(status) = info.status {
                tracing::debug!("Pull {}: {}", image, status);
            }
        }

        Ok(())
    }

    async fn create_container(
        &self,
        image: &str,
        labels: &Labels,
        endpoint: &EndpointConfig,
        name: &str,
    ) -> Result<String> {
        // The Engine accepts exactly one endpoint at creation time
        let config = Config {
            image: Some(image.to_string()),
            labels: Some(labels.clone()),
            networking_config: Some(NetworkingConfig {
                endpoints_config: HashMap::from([(
                    endpoint.network_id.clone(),
                    endpoint_settings(endpoint),
                )]),
            }),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: name.to_string(),
                    ..Default::default()
                }),
                config,
            )
            .await
            .map_err(docker_err("create container"))?;

        for warning in &response.warnings {
            tracing::warn!("Docker warning creating container {}: {}", name, warning);
        }

        Ok(response.id)
    }

    async fn start_container(&self, container_id: &str) -> Result<()> {
        self.docker
            .start_container(container_id, None::<StartContainerOptions<String>>)
            .await
            .map_err(docker_err("start container"))
    }

    async fn remove_container(&self, container_id: &str, force: bool) -> Result<()> {
        self.docker
            .remove_container(
                container_id,
                Some(RemoveContainerOptions {
                    force,
                    ..Default::default()
                }),
            )
            .await
            .map_err(docker_err("remove container"))
    }

    async fn connect_network(
        &self,
        network_id: &str,
        container_id: &str,
        endpoint: &EndpointConfig,
    ) -> Result<()> {
        self.docker
            .connect_network(
                network_id,
                ConnectNetworkOptions {
                    container: container_id.to_string(),
                    endpoint_config: endpoint_settings(endpoint),
                },
            )
            .await
            .map_err(docker_err("connect network"))
    }

    async fn list_networks(&self, label_key: Option<&str>) -> Result<Vec<NetworkSnapshot>> {
        let options = ListNetworksOptions {
            filters: label_key.map(label_filter).unwrap_or_default(),
        };

        let networks = self
            .docker
            .list_networks(Some(options))
            .await
            .map_err(docker_err("list networks"))?;

        Ok(networks.into_iter().map(snapshot_from).collect())
    }

    async fn inspect_network(&self, network_id: &str) -> Result<NetworkSnapshot> {
        let network = self
            .docker
            .inspect_network(network_id, None::<InspectNetworkOptions<String>>)
            .await
            .map_err(docker_err("inspect network"))?;

        Ok(snapshot_from(network))
    }

    async fn list_containers(&self, label_key: &str) -> Result<Vec<LabeledContainer>> {
        let options = ListContainersOptions {
            all: true,
            filters: label_filter(label_key),
            ..Default::default()
        };

        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(docker_err("list containers"))?;

        Ok(containers
            .into_iter()
            .filter_map(labeled_container_from)
            .collect())
    }
}
