//! The hardware client contract shared by real and simulated transports.
//!
//! Every transport family (the register-based controller and the
//! variable-based feeder link) is reached through [`HardwareClient`]. Real and
//! simulated implementations are selected once, at construction time, and
//! handed around as `Arc<dyn HardwareClient>`; call sites never look at the
//! concrete type.
//!
//! ```text
//! TagCacheService ──► TagMappingService (path → native address)
//!        │
//!        └──► Arc<dyn HardwareClient> ──► PlcClient | SimulatedRegisterClient
//!                                     └─► FeederClient | SimulatedVariableClient
//! ```

use crate::error::HardwareError;
use crate::value::TagValue;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Transport family a native address belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    /// Industrial controller addressed by register names.
    Register,
    /// Remote feeder controller addressed by named variables.
    Variable,
}

impl Transport {
    /// Component key used in health reports.
    pub fn component_name(&self) -> &'static str {
        match self {
            Transport::Register => "register_transport",
            Transport::Variable => "variable_transport",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Register => write!(f, "register"),
            Transport::Variable => write!(f, "variable"),
        }
    }
}

/// Connection state of one transport as seen by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    ConnectedReal,
    ConnectedSimulated,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        !matches!(self, ConnectionState::Disconnected)
    }
}

/// Raw connect/read/write against one transport.
///
/// Implementations use interior mutability so a single client can be shared
/// between the cache and the orchestrator.
#[async_trait]
pub trait HardwareClient: Send + Sync {
    /// Transport family this client talks to.
    fn transport(&self) -> Transport;

    /// True for in-process stand-ins.
    fn is_simulated(&self) -> bool {
        false
    }

    async fn connect(&self) -> Result<(), HardwareError>;

    async fn disconnect(&self) -> Result<(), HardwareError>;

    async fn read_address(&self, address: &str) -> Result<TagValue, HardwareError>;

    async fn write_address(&self, address: &str, value: &TagValue) -> Result<(), HardwareError>;

    fn is_connected(&self) -> bool;

    /// Health probe. Errors mean the probe itself could not complete.
    async fn check_connection(&self) -> Result<bool, HardwareError> {
        Ok(self.is_connected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_names() {
        assert_eq!(Transport::Register.component_name(), "register_transport");
        assert_eq!(Transport::Variable.component_name(), "variable_transport");
    }

    #[test]
    fn simulated_counts_as_connected() {
        assert!(ConnectionState::ConnectedSimulated.is_connected());
        assert!(!ConnectionState::Disconnected.is_connected());
    }
}
