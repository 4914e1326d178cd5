//! Verification of container-to-network membership

use crate::{
    daemon::{with_deadline, ContainerDaemon, NetworkSnapshot},
    Error, Result,
};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// A network whose member list is not exactly the expected container
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MembershipMismatch {
    pub network_id: String,
    pub network_name: String,
    pub expected_container: String,
    pub connected: Vec<String>,
}

impl fmt::Display for MembershipMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Network {} ({}) should hold only container {}, found {} member(s): {:?}",
            self.network_name,
            self.network_id,
            self.expected_container,
            self.connected.len(),
            self.connected
        )
    }
}

/// Pick, for every requested name in order, the first listed network with
/// exactly that name.
///
/// All-or-nothing: if any name is unmatched the first such name is reported
/// and no snapshots are returned.
pub fn select_networks_by_name<S: AsRef<str>>(
    listed: &[NetworkSnapshot],
    names: &[S],
) -> Result<Vec<NetworkSnapshot>> {
    let mut selected = Vec::with_capacity(names.len());
    let mut missing = None;

    for name in names {
        let name = name.as_ref();
        match listed.iter().find(|network| network.name == name) {
            Some(network) => selected.push(network.clone()),
            None => {
                missing.get_or_insert_with(|| name.to_string());
            }
        }
    }

    match missing {
        Some(name) => Err(Error::NetworkNotFound(name)),
        None => Ok(selected),
    }
}

/// Fetch current snapshots of the named networks, in the requested order.
///
/// The network list is fetched once to resolve names. The Engine's list
/// endpoint leaves member lists empty, so each match is re-read by ID to get
/// its current members.
pub async fn lookup_networks_by_name<S: AsRef<str>>(
    daemon: &dyn ContainerDaemon,
    names: &[S],
    call_timeout: Duration,
) -> Result<Vec<NetworkSnapshot>> {
    let listed = with_deadline("list networks", call_timeout, daemon.list_networks(None)).await?;
    let selected = select_networks_by_name(&listed, names)?;

    let mut snapshots = Vec::with_capacity(selected.len());
    for network in selected {
        let current = with_deadline(
            "inspect network",
            call_timeout,
            daemon.inspect_network(&network.id),
        )
        .await?;
        snapshots.push(current);
    }

    Ok(snapshots)
}

/// Require every snapshot to list `container_id` as its one and only member.
///
/// Each mismatch is logged; all of them are returned together in
/// [`Error::Membership`].
pub fn assert_single_membership(
    snapshots: &[NetworkSnapshot],
    container_id: &str,
) -> Result<()> {
    let mismatches: Vec<MembershipMismatch> = snapshots
        .iter()
        .filter(|snapshot| snapshot.containers != [container_id])
        .map(|snapshot| MembershipMismatch {
            network_id: snapshot.id.clone(),
            network_name: snapshot.name.clone(),
            expected_container: container_id.to_string(),
            connected: snapshot.containers.clone(),
        })
        .collect();

    if mismatches.is_empty() {
        tracing::info!(
            "Container {} is the single member of all {} network(s)",
            container_id,
            snapshots.len()
        );
        return Ok(());
    }

    for mismatch in &mismatches {
        tracing::warn!("{}", mismatch);
    }
    Err(Error::Membership(mismatches))
}
