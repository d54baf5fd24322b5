//! Latency configuration for realistic mode.

use super::MockMode;
use std::time::Duration;

/// Simulated link latency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingConfig {
    /// Session setup/teardown time in milliseconds
    pub connect_ms: u64,
    /// Round trip of a single read or write in milliseconds
    pub exchange_ms: u64,
}

impl TimingConfig {
    /// Controller on the plant network
    pub fn plc() -> Self {
        Self {
            connect_ms: 100,
            exchange_ms: 5,
        }
    }

    /// Remote feeder controller session
    pub fn feeder() -> Self {
        Self {
            connect_ms: 100,
            exchange_ms: 20,
        }
    }

    /// Sleep for `ms` when running in realistic mode.
    pub(crate) async fn wait(mode: MockMode, ms: u64) {
        if mode == MockMode::Realistic && ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            connect_ms: 0,
            exchange_ms: 0,
        }
    }
}
