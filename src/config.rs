//! Run configuration

use crate::{Error, Result};
use std::time::Duration;

/// Image used for the probe container unless overridden
pub const DEFAULT_IMAGE: &str = "docker.io/library/nginx:latest";

/// Label key shared by every resource this harness creates
pub const DEFAULT_LABEL_KEY: &str = "netmember-verify.cleanup";

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_PULL_TIMEOUT: Duration = Duration::from_secs(300);
const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(3600);

/// Configuration for one verification run
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// Image reference for the probe container
    pub image: String,
    /// Deadline applied to every individual daemon call
    pub call_timeout: Duration,
    /// Deadline for pulling the image, which may take much longer than other calls
    pub pull_timeout: Duration,
    /// Prefix for generated network and container names
    pub name_prefix: String,
    /// Key of the cleanup label
    pub label_key: String,
    /// Start the container before attaching further networks
    pub start_container: bool,
    /// Skip teardown, both at the end of the run and on drop, and leave the
    /// resources in place for inspection
    pub keep_resources: bool,
    /// Minimum age of a labeled resource before the stale sweep removes it
    pub stale_after: Duration,
    /// Number of networks to create; the first is attached at creation time
    pub network_count: usize,
}

impl VerifierConfig {
    /// Built-in defaults without any environment overrides
    pub fn base() -> Self {
        // Timestamped prefix makes stale resources easy to spot in `docker network ls`
        let timestamp = chrono::Utc::now().format("%Y%m%d-%H%M%S").to_string();

        Self {
            image: DEFAULT_IMAGE.to_string(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            pull_timeout: DEFAULT_PULL_TIMEOUT,
            name_prefix: format!("netmember-{}", timestamp),
            label_key: DEFAULT_LABEL_KEY.to_string(),
            start_container: true,
            keep_resources: false,
            stale_after: DEFAULT_STALE_AFTER,
            network_count: 2,
        }
    }

    /// Defaults with overrides from `NETMEMBER_*` environment variables.
    ///
    /// Fails on malformed values instead of silently ignoring them.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::base();

        if let Some(image) = lookup("NETMEMBER_IMAGE") {
            if image.trim().is_empty() {
                return Err(Error::InvalidConfig("NETMEMBER_IMAGE is empty".into()));
            }
            config.image = image.trim().to_string();
        }

        if let Some(timeout) = seconds_var(&lookup, "NETMEMBER_CALL_TIMEOUT_SECS")? {
            config.call_timeout = timeout;
        }

        if let Some(timeout) = seconds_var(&lookup, "NETMEMBER_PULL_TIMEOUT_SECS")? {
            config.pull_timeout = timeout;
        }

        if let Some(age) = seconds_var(&lookup, "NETMEMBER_STALE_AFTER_SECS")? {
            config.stale_after = age;
        }

        if let Some(prefix) = lookup("NETMEMBER_NAME_PREFIX") {
            let valid = prefix.chars().next().is_some_and(|c| c.is_ascii_alphanumeric())
                && prefix
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-');
            if !valid {
                return Err(Error::InvalidConfig(format!(
                    "NETMEMBER_NAME_PREFIX '{}' is not a valid Docker name prefix",
                    prefix
                )));
            }
            config.name_prefix = prefix;
        }

        if lookup("NETMEMBER_KEEP_RESOURCES").is_some() {
            config.keep_resources = true;
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.network_count == 0 {
            return Err(Error::InvalidConfig(
                "at least one network is required".into(),
            ));
        }
        if self.call_timeout.is_zero() || self.pull_timeout.is_zero() {
            return Err(Error::InvalidConfig("timeouts must be non-zero".into()));
        }
        Ok(())
    }
}

/// Parse a positive number of seconds from the variable `key`, if set
fn seconds_var<F>(lookup: &F, key: &str) -> Result<Option<Duration>>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };

    match raw.trim().parse::<u64>() {
        Ok(0) => Err(Error::InvalidConfig(format!(
            "{} must be greater than zero",
            key
        ))),
        Ok(secs) => Ok(Some(Duration::from_secs(secs))),
        Err(_) => Err(Error::InvalidConfig(format!(
            "{} must be a whole number of seconds, got '{}'",
            key, raw
        ))),
    }
}

impl VerifierConfig {
    /// Like [`VerifierConfig::from_lookup`], but a malformed value only costs
    /// its overrides
    fn from_lookup_or_base<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        match Self::from_lookup(lookup) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{}, falling back to built-in defaults", e);
                Self::base()
            }
        }
    }
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self::from_lookup_or_base(|key| std::env::var(key).ok())
    }
}
