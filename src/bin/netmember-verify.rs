//! Run the network-membership scenario once against the local Docker daemon.
//!
//! Exit status: 0 on success, 1 when membership verification fails, 2 when the
//! run could not be set up.
//!
//! Run with: cargo run --bin netmember-verify

use netmember_verify::{run_scenario, sweep_labeled, DockerDaemon, VerifierConfig};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let verification_failed = e
                .downcast_ref::<netmember_verify::Error>()
                .is_some_and(|e| e.is_verification_failure());
            eprintln!("Error: {:#}", e);
            if verification_failed {
                ExitCode::from(1)
            } else {
                ExitCode::from(2)
            }
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let config = VerifierConfig::from_env()?;
    let daemon = Arc::new(DockerDaemon::connect(config.call_timeout).await?);

    if std::env::var("NETMEMBER_SWEEP_STALE").is_ok() {
        sweep_labeled(
            &*daemon,
            &config.label_key,
            config.stale_after,
            config.call_timeout,
        )
        .await;
    }

    let report = run_scenario(daemon, &config).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    println!(
        "✓ Container {} is the single member of {} network(s)",
        report.container_name,
        report.networks.len()
    );

    Ok(())
}
