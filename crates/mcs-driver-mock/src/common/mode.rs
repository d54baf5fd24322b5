//! Operational modes for simulated clients.
//!
//! - **Instant**: Zero delays, deterministic behavior for unit tests
//! - **Realistic**: Link-like latency on connect, disconnect and every exchange

use serde::Deserialize;

/// Operational modes for simulated clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MockMode {
    /// Zero delays - for unit tests
    #[default]
    Instant,
    /// Hardware-like timing - for lab runs without the controller attached
    Realistic,
}
