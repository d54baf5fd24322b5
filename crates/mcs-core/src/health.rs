//! Health report returned by the communication orchestrator.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Overall health of the tag layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Real hardware on every transport, every service running.
    Healthy,
    /// Running, but a component is down or a transport is simulated.
    Degraded,
    /// Not running.
    Error,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub components: BTreeMap<String, bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthReport {
    pub fn component(&self, name: &str) -> Option<bool> {
        self.components.get(name).copied()
    }
}
