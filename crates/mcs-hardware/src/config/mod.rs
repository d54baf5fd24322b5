//! Hardware connection configuration.
//!
//! The hardware document is TOML, loaded through `figment` so individual
//! values can be overridden from `MCS_`-prefixed environment variables.
//!
//! # Example Configuration
//!
//! ```toml
//! force_simulated = false
//! simulation = "instant"
//!
//! [plc]
//! host = "192.168.1.10"
//! port = 502
//! unit_id = 1
//! timeout_ms = 2000
//!
//! [plc.registers]
//! MainSwitch = { kind = "coil", address = 0 }
//! MainGasPressure = { kind = "input", address = 0 }
//! GAS_FLOW_SP = { kind = "holding_float", address = 100 }
//!
//! [feeder]
//! host = "192.168.1.20"
//! port = 2323
//! ```
//!
//! A missing `[plc]` or `[feeder]` section means that transport runs on its
//! simulated client. The tag document (YAML) is loaded separately with
//! [`loader::load_tag_document`].

pub mod loader;
pub mod schema;

pub use loader::{
    load_hardware_config, load_hardware_config_from_str, load_tag_document, parse_tag_document,
    ConfigLoadError,
};
pub use schema::{
    CommunicationConfig, FeederLinkConfig, HardwareConfig, PlcConfig, RegisterDef, RegisterKind,
};
