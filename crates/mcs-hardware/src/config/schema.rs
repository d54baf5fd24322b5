//! Hardware configuration schema.

use mcs_driver_mock::MockMode;
use serde::Deserialize;
use serde_valid::Validate;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Everything the orchestrator needs to come up: transports plus the tag
/// document.
#[derive(Debug, Clone)]
pub struct CommunicationConfig {
    pub hardware: HardwareConfig,
    /// Parsed tag document (nested tag groups).
    pub tags: serde_yaml::Value,
}

impl CommunicationConfig {
    pub fn new(hardware: HardwareConfig, tags: serde_yaml::Value) -> Self {
        Self { hardware, tags }
    }
}

/// Top-level hardware document.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct HardwareConfig {
    /// Register controller link. Absent means simulated.
    #[serde(default)]
    #[validate]
    pub plc: Option<PlcConfig>,

    /// Feeder controller link. Absent means simulated.
    #[serde(default, alias = "ssh")]
    #[validate]
    pub feeder: Option<FeederLinkConfig>,

    /// Use simulated clients on both transports without trying to connect.
    #[serde(default, alias = "use_mock")]
    pub force_simulated: bool,

    /// Timing behaviour of simulated clients.
    #[serde(default)]
    pub simulation: MockMode,
}

impl HardwareConfig {
    /// Fully simulated configuration.
    pub fn simulated() -> Self {
        Self {
            force_simulated: true,
            ..Self::default()
        }
    }

    /// True when neither transport is described and nothing forces
    /// simulation, i.e. the document carried no hardware section at all.
    pub fn is_empty(&self) -> bool {
        self.plc.is_none() && self.feeder.is_none() && !self.force_simulated
    }

    /// Cross-field checks serde_valid cannot express.
    pub fn check_registers(&self) -> Result<(), Vec<String>> {
        let Some(plc) = &self.plc else {
            return Ok(());
        };

        let mut errors = Vec::new();
        let mut taken: HashMap<(&'static str, u16), &str> = HashMap::new();
        for (name, def) in &plc.registers {
            if name.trim().is_empty() {
                errors.push("register names must not be empty".to_string());
                continue;
            }
            let span = def.kind.width();
            for offset in 0..span {
                let Some(address) = def.address.checked_add(offset) else {
                    errors.push(format!("register {} runs past address 65535", name));
                    break;
                };
                if let Some(other) = taken.insert((def.kind.table(), address), name) {
                    errors.push(format!(
                        "registers {} and {} overlap at {} address {}",
                        other,
                        name,
                        def.kind.table(),
                        address
                    ));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn default_modbus_port() -> u16 {
    502
}

fn default_unit_id() -> u8 {
    1
}

fn default_feeder_port() -> u16 {
    2323
}

fn default_timeout_ms() -> u64 {
    2000
}

/// Register controller (Modbus/TCP) link.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PlcConfig {
    #[validate(min_length = 1)]
    pub host: String,

    #[serde(default = "default_modbus_port")]
    #[validate(minimum = 1)]
    pub port: u16,

    #[serde(default = "default_unit_id")]
    pub unit_id: u8,

    #[serde(default = "default_timeout_ms")]
    #[validate(minimum = 1)]
    #[validate(maximum = 60000)]
    pub timeout_ms: u64,

    /// Register name -> location in the controller's data model.
    #[serde(default)]
    pub registers: BTreeMap<String, RegisterDef>,
}

impl PlcConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            unit_id: default_unit_id(),
            timeout_ms: default_timeout_ms(),
            registers: BTreeMap::new(),
        }
    }

    pub fn with_register(mut self, name: impl Into<String>, kind: RegisterKind, address: u16) -> Self {
        self.registers.insert(name.into(), RegisterDef { kind, address });
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RegisterDef {
    pub kind: RegisterKind,
    pub address: u16,
}

/// Modbus data-model table a register lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegisterKind {
    /// Read/write bit.
    Coil,
    /// Read-only bit.
    DiscreteInput,
    /// Read/write 16-bit word.
    Holding,
    /// Read-only 16-bit word.
    Input,
    /// IEEE-754 f32 across two holding registers, high word first.
    HoldingFloat,
}

impl RegisterKind {
    /// Number of consecutive addresses occupied.
    pub fn width(&self) -> u16 {
        match self {
            RegisterKind::HoldingFloat => 2,
            _ => 1,
        }
    }

    fn table(&self) -> &'static str {
        match self {
            RegisterKind::Coil => "coil",
            RegisterKind::DiscreteInput => "discrete input",
            RegisterKind::Holding | RegisterKind::HoldingFloat => "holding",
            RegisterKind::Input => "input",
        }
    }
}

/// Feeder controller command link.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct FeederLinkConfig {
    #[validate(min_length = 1)]
    pub host: String,

    #[serde(default = "default_feeder_port")]
    #[validate(minimum = 1)]
    pub port: u16,

    #[serde(default = "default_timeout_ms")]
    #[validate(minimum = 1)]
    #[validate(maximum = 60000)]
    pub timeout_ms: u64,
}

impl FeederLinkConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout_ms: default_timeout_ms(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
