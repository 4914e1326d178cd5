//! Removal of resources left behind by earlier, interrupted runs

use crate::daemon::{with_deadline, ContainerDaemon};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Remove every container, then every network, carrying `label_key` that was
/// created more than `max_age` ago.
///
/// Younger resources may belong to a run still in progress and are kept, as
/// are resources whose creation time the daemon does not report. Pass
/// `Duration::ZERO` to remove every labeled resource regardless of age.
///
/// Best effort: failures are logged and skipped. Returns how many containers
/// and networks were removed.
pub async fn sweep_labeled(
    daemon: &dyn ContainerDaemon,
    label_key: &str,
    max_age: Duration,
    call_timeout: Duration,
) -> (usize, usize) {
    let cutoff = stale_cutoff(max_age);
    if max_age.is_zero() {
        tracing::debug!("Sweeping all resources labeled {}", label_key);
    } else {
        tracing::debug!(
            "Sweeping resources labeled {} older than {} seconds",
            label_key,
            max_age.as_secs()
        );
    }

    // Containers first: the daemon refuses to remove networks that still have members
    let mut removed_containers = 0;
    match with_deadline(
        "list containers",
        call_timeout,
        daemon.list_containers(label_key),
    )
    .await
    {
        Ok(containers) => {
            for container in containers {
                if !is_stale(container.created, cutoff) {
                    tracing::debug!("Keeping recent container {}", container.name);
                    continue;
                }

                match with_deadline(
                    "remove container",
                    call_timeout,
                    daemon.remove_container(&container.id, true),
                )
                .await
                {
                    Ok(()) => {
                        tracing::info!(
                            "Removed stale container: {} ({})",
                            container.name,
                            container.id
                        );
                        removed_containers += 1;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to remove stale container {}: {}", container.id, e)
                    }
                }
            }
        }
        Err(e) => tracing::warn!("Failed to list containers for cleanup: {}", e),
    }

    let mut removed_networks = 0;
    match with_deadline(
        "list networks",
        call_timeout,
        daemon.list_networks(Some(label_key)),
    )
    .await
    {
        Ok(networks) => {
            for network in networks {
                if !is_stale(network.created, cutoff) {
                    tracing::debug!("Keeping recent network {}", network.name);
                    continue;
                }

                match with_deadline(
                    "remove network",
                    call_timeout,
                    daemon.remove_network(&network.id),
                )
                .await
                {
                    Ok(()) => {
                        tracing::info!("Removed stale network: {} ({})", network.name, network.id);
                        removed_networks += 1;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to remove stale network {}: {}", network.name, e)
                    }
                }
            }
        }
        Err(e) => tracing::warn!("Failed to list networks for cleanup: {}", e),
    }

    if removed_containers > 0 || removed_networks > 0 {
        tracing::info!(
            "Removed {} stale container(s) and {} stale network(s)",
            removed_containers,
            removed_networks
        );
    }

    (removed_containers, removed_networks)
}

/// Resources created before the returned instant are stale
fn stale_cutoff(max_age: Duration) -> DateTime<Utc> {
    if max_age.is_zero() {
        return DateTime::<Utc>::MAX_UTC;
    }

    chrono::Duration::from_std(max_age)
        .ok()
        .and_then(|age| Utc::now().checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn is_stale(created: Option<DateTime<Utc>>, cutoff: DateTime<Utc>) -> bool {
    created.is_some_and(|created| created < cutoff)
}
