//! End-to-end membership scenario

use crate::{
    config::VerifierConfig,
    daemon::{ContainerDaemon, EndpointConfig, NetworkSnapshot},
    membership::{assert_single_membership, lookup_networks_by_name},
    naming::{unique_id, unique_name, CleanupLabel},
    provision::Provisioner,
    Error, Result,
};
use serde::Serialize;
use std::sync::Arc;

/// Names chosen for one run before anything is created
#[derive(Debug, Clone)]
pub struct ScenarioPlan {
    /// `(network name, aliases)`; the container joins the first at creation time
    pub networks: Vec<(String, Vec<String>)>,
    pub container_name: String,
}

impl ScenarioPlan {
    /// Fresh unique names for `config.network_count` networks and one container
    pub fn generate(config: &VerifierConfig) -> Self {
        let network_prefix = format!("{}-net", config.name_prefix);
        let networks = (0..config.network_count)
            .map(|_| (unique_name(&network_prefix), vec![unique_id()]))
            .collect();

        Self {
            networks,
            container_name: unique_name(&format!("{}-ctr", config.name_prefix)),
        }
    }
}

/// A network created during the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisionedNetwork {
    pub name: String,
    pub id: String,
    pub aliases: Vec<String>,
}

/// Outcome of a successful run
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub label_key: String,
    pub label_value: String,
    pub container_name: String,
    pub container_id: String,
    pub networks: Vec<ProvisionedNetwork>,
    /// Membership as reported by the daemon after all attachments
    pub snapshots: Vec<NetworkSnapshot>,
}

/// Run the scenario with freshly generated names
pub async fn run_scenario(
    daemon: Arc<dyn ContainerDaemon>,
    config: &VerifierConfig,
) -> Result<ScenarioReport> {
    run_plan(daemon, config, ScenarioPlan::generate(config)).await
}

/// Run the scenario with the given names.
///
/// Resources are released in reverse creation order whether the run succeeds,
/// fails during setup or fails verification. With `keep_resources` set they
/// are left in place for inspection.
pub async fn run_plan(
    daemon: Arc<dyn ContainerDaemon>,
    config: &VerifierConfig,
    plan: ScenarioPlan,
) -> Result<ScenarioReport> {
    config.validate()?;

    let label = CleanupLabel::generate(config.label_key.clone());
    let mut provisioner = Provisioner::new(Arc::clone(&daemon), config, label);

    let outcome = provision_and_verify(daemon.as_ref(), config, &plan, &mut provisioner).await;
    if let Err(e) = &outcome {
        tracing::error!("Scenario failed: {}", e);
    }

    if !config.keep_resources {
        provisioner.teardown().run().await;
    }
    outcome
}

async fn provision_and_verify(
    daemon: &dyn ContainerDaemon,
    config: &VerifierConfig,
    plan: &ScenarioPlan,
    provisioner: &mut Provisioner,
) -> Result<ScenarioReport> {
    let mut networks = Vec::with_capacity(plan.networks.len());
    for (name, aliases) in &plan.networks {
        let id = provisioner.create_network(name).await?;
        networks.push(ProvisionedNetwork {
            name: name.clone(),
            id,
            aliases: aliases.clone(),
        });
    }

    provisioner.ensure_image(&config.image).await?;

    let Some((first, rest)) = networks.split_first() else {
        return Err(Error::InvalidConfig("the plan names no networks".into()));
    };

    let container_id = provisioner
        .create_container(
            &config.image,
            &EndpointConfig::new(first.id.clone(), first.aliases.clone()),
            &plan.container_name,
        )
        .await?;

    if config.start_container {
        provisioner.start_container(&container_id).await?;
    }

    for network in rest {
        provisioner
            .attach_network(
                &network.id,
                &container_id,
                &EndpointConfig::new(network.id.clone(), network.aliases.clone()),
            )
            .await?;
    }

    let names: Vec<&str> = networks.iter().map(|n| n.name.as_str()).collect();
    let snapshots = lookup_networks_by_name(daemon, &names, config.call_timeout).await?;
    assert_single_membership(&snapshots, &container_id)?;

    let label = provisioner.label();
    Ok(ScenarioReport {
        label_key: label.key.clone(),
        label_value: label.value.clone(),
        container_name: plan.container_name.clone(),
        container_id,
        networks,
        snapshots,
    })
}
