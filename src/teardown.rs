//! Guaranteed release of provisioned resources

use crate::daemon::{with_deadline, ContainerDaemon};
use std::sync::Arc;
use std::time::Duration;

/// A daemon resource owned by the current run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    Network { id: String, name: String },
    Container { id: String, name: String },
}

/// Ledger of acquired resources, released in reverse acquisition order.
///
/// Register each resource right after the daemon confirms its creation. Call
/// [`Teardown::run`] on every exit path; if the ledger is dropped with
/// resources still registered (panic, cancelled future) the release happens
/// in `Drop` instead.
pub struct Teardown {
    daemon: Arc<dyn ContainerDaemon>,
    call_timeout: Duration,
    resources: Vec<Resource>,
    cleanup_on_drop: bool,
}

impl Teardown {
    pub fn new(daemon: Arc<dyn ContainerDaemon>, call_timeout: Duration) -> Self {
        Self {
            daemon,
            call_timeout,
            resources: Vec::new(),
            cleanup_on_drop: true,
        }
    }

    /// Keep resources alive when the ledger is dropped without [`Teardown::run`]
    pub fn with_cleanup_on_drop(mut self, enabled: bool) -> Self {
        self.cleanup_on_drop = enabled;
        self
    }

    pub fn register(&mut self, resource: Resource) {
        tracing::debug!("Registered {:?} for teardown", resource);
        self.resources.push(resource);
    }

    /// Resources still pending release, in acquisition order
    pub fn pending(&self) -> &[Resource] {
        &self.resources
    }

    /// Release every registered resource, newest first.
    ///
    /// Never fails: errors (resource already gone, daemon unreachable, deadline
    /// exceeded) are logged and skipped.
    pub async fn run(&mut self) {
        let resources = std::mem::take(&mut self.resources);
        if resources.is_empty() {
            return;
        }

        tracing::info!("Tearing down {} resource(s)...", resources.len());
        release_all(self.daemon.as_ref(), self.call_timeout, resources).await;
        tracing::info!("Teardown complete");
    }
}

async fn release_all(
    daemon: &dyn ContainerDaemon,
    call_timeout: Duration,
    resources: Vec<Resource>,
) {
    for resource in resources.into_iter().rev() {
        let outcome = match &resource {
            Resource::Container { id, .. } => {
                with_deadline(
                    "remove container",
                    call_timeout,
                    daemon.remove_container(id, true),
                )
                .await
            }
            Resource::Network { id, .. } => {
                with_deadline("remove network", call_timeout, daemon.remove_network(id)).await
            }
        };

        match outcome {
            Ok(()) => tracing::info!("Removed {:?}", resource),
            Err(e) => tracing::debug!("Failed to remove {:?}: {}", resource, e),
        }
    }
}

impl Drop for Teardown {
    fn drop(&mut self) {
        if self.resources.is_empty() {
            return;
        }
        if !self.cleanup_on_drop {
            tracing::info!(
                "Leaving {} resource(s) in place: {:?}",
                self.resources.len(),
                self.resources
            );
            return;
        }

        tracing::info!("Cleaning up resources left by an interrupted run...");

        let daemon = Arc::clone(&self.daemon);
        let call_timeout = self.call_timeout;
        let resources = std::mem::take(&mut self.resources);
        let cleanup = async move { release_all(daemon.as_ref(), call_timeout, resources).await };

        // Block until cleanup completes so resources are freed even on panic.
        // block_in_place is only allowed on the multi-threaded runtime.
        match tokio::runtime::Handle::try_current() {
            Ok(handle)
                if handle.runtime_flavor() == tokio::runtime::RuntimeFlavor::MultiThread =>
            {
                tokio::task::block_in_place(|| handle.block_on(cleanup));
            }
            Ok(_) => {
                let worker = std::thread::spawn(move || match tokio::runtime::Runtime::new() {
                    Ok(rt) => rt.block_on(cleanup),
                    Err(e) => tracing::error!("Failed to create runtime for cleanup: {}", e),
                });
                if worker.join().is_err() {
                    tracing::error!("Cleanup thread panicked");
                }
            }
            Err(_) => match tokio::runtime::Runtime::new() {
                Ok(rt) => rt.block_on(cleanup),
                Err(e) => tracing::error!("Failed to create runtime for cleanup: {}", e),
            },
        }
    }
}
