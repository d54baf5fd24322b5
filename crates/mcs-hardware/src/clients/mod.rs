//! Hardware clients and the factory that picks real or simulated ones.
//!
//! Call sites only ever see `Arc<dyn HardwareClient>`; whether a transport
//! runs on hardware or on its simulated stand-in is decided here, once.

pub mod feeder;
pub mod modbus;
pub mod plc;

pub use feeder::FeederClient;
pub use plc::PlcClient;

use crate::config::{FeederLinkConfig, PlcConfig, RegisterKind};
use mcs_core::{HardwareClient, TagValue};
use mcs_driver_mock::{
    MockMode, RegisterProfile, SimulatedRegisterClient, SimulatedVariableClient,
};
use std::sync::Arc;

/// Register client for `config`, or its simulated counterpart when
/// `use_simulated` is set or no controller is configured.
pub fn create_register_client(
    config: Option<&PlcConfig>,
    use_simulated: bool,
    mode: MockMode,
) -> Arc<dyn HardwareClient> {
    match config {
        Some(config) if !use_simulated => Arc::new(PlcClient::new(config.clone())),
        _ => simulated_register_client(config, mode),
    }
}

/// Variable client for `config`, or its simulated counterpart.
pub fn create_variable_client(
    config: Option<&FeederLinkConfig>,
    use_simulated: bool,
    mode: MockMode,
) -> Arc<dyn HardwareClient> {
    match config {
        Some(config) if !use_simulated => Arc::new(FeederClient::new(config.clone())),
        _ => simulated_variable_client(mode),
    }
}

/// Simulated register client with the default image plus every register of
/// the configured table.
pub fn simulated_register_client(
    config: Option<&PlcConfig>,
    mode: MockMode,
) -> Arc<dyn HardwareClient> {
    let mut client = SimulatedRegisterClient::new().with_mode(mode);
    if let Some(config) = config {
        for (name, def) in &config.registers {
            let (profile, initial) = match def.kind {
                RegisterKind::Coil | RegisterKind::DiscreteInput => {
                    (RegisterProfile::Switch, TagValue::Bool(false))
                }
                RegisterKind::Holding | RegisterKind::Input => (
                    RegisterProfile::Clamped {
                        min: 0,
                        max: i64::from(u16::MAX),
                    },
                    TagValue::Int(0),
                ),
                RegisterKind::HoldingFloat => (RegisterProfile::Float, TagValue::Float(0.0)),
            };
            client = client.with_register(name.clone(), profile, initial);
        }
    }
    Arc::new(client)
}

pub fn simulated_variable_client(mode: MockMode) -> Arc<dyn HardwareClient> {
    Arc::new(SimulatedVariableClient::new().with_mode(mode))
}
