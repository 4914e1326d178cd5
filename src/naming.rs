//! Unique names and the cleanup label

use crate::daemon::Labels;
use rand::Rng;

/// A random 128-bit identifier rendered as 32 lowercase hex digits
pub fn unique_id() -> String {
    format!("{:032x}", rand::thread_rng().gen::<u128>())
}

/// `<prefix>-<unique id>`, valid as a Docker network or container name
pub fn unique_name(prefix: &str) -> String {
    format!("{}-{}", prefix, unique_id())
}

/// Key/value pair attached to every resource created by one run.
///
/// The key is shared across runs so left-over resources can be found again;
/// the value identifies the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupLabel {
    pub key: String,
    pub value: String,
}

impl CleanupLabel {
    /// Fresh label for a new run
    pub fn generate(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: unique_id(),
        }
    }

    pub fn to_labels(&self) -> Labels {
        Labels::from([(self.key.clone(), self.value.clone())])
    }
}
