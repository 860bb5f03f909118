use crate::types::FailurePolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Runtime settings for the orchestrator, loaded from the `[orchestrator]`
/// table of the service config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Applied to plans that do not set their own.
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// Pending approvals older than this are denied. `0` disables expiry.
    #[serde(default)]
    pub approval_ttl_secs: u64,
    /// Entries kept in the in-memory activity buffer.
    #[serde(default = "default_activity_capacity")]
    pub activity_capacity: usize,
}

fn default_activity_capacity() -> usize {
    500
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::default(),
            approval_ttl_secs: 0,
            activity_capacity: default_activity_capacity(),
        }
    }
}

impl OrchestratorConfig {
    pub fn approval_ttl(&self) -> Option<Duration> {
        (self.approval_ttl_secs > 0).then(|| Duration::from_secs(self.approval_ttl_secs))
    }
}
