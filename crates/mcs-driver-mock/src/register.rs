//! Simulated register-family controller.
//!
//! Holds an in-process register image seeded with values a freshly powered
//! controller reports: switches off, axes homed, 12-bit analog inputs at
//! their idle readings and flow setpoints at mid-scale. Writes behave like
//! the raw I/O card: analog values are clamped into the converter range,
//! switch registers coerce numbers to booleans. Range checks against the tag
//! contract happen upstream in the cache, never here.

use async_trait::async_trait;
use mcs_core::{HardwareClient, HardwareError, HardwareErrorKind, TagValue, Transport};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use crate::common::{MockMode, TimingConfig};

/// Full scale of the controller's 12-bit analog channels.
pub const ANALOG_FULL_SCALE: i64 = 4095;

/// How a simulated register reacts to writes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RegisterProfile {
    /// Digital output; numbers coerce to `value != 0`.
    Switch,
    /// Integer register clamped into `[min, max]`.
    Clamped { min: i64, max: i64 },
    /// Floating point register stored as written.
    Float,
}

impl RegisterProfile {
    pub fn analog_12bit() -> Self {
        RegisterProfile::Clamped {
            min: 0,
            max: ANALOG_FULL_SCALE,
        }
    }

    fn coerce(&self, address: &str, value: &TagValue) -> Result<TagValue, HardwareError> {
        let protocol = |expected: &str| {
            HardwareError::new(
                Transport::Register,
                HardwareErrorKind::Protocol,
                format!(
                    "register {} expects {}, got {}",
                    address,
                    expected,
                    value.type_name()
                ),
            )
        };

        match self {
            RegisterProfile::Switch => match value {
                TagValue::Bool(b) => Ok(TagValue::Bool(*b)),
                TagValue::Int(v) => Ok(TagValue::Bool(*v != 0)),
                TagValue::Float(v) => Ok(TagValue::Bool(*v != 0.0)),
                TagValue::String(_) => Err(protocol("a switch state")),
            },
            RegisterProfile::Clamped { min, max } => {
                let raw = match value {
                    TagValue::Int(v) => *v,
                    TagValue::Float(v) if v.is_finite() => v.round() as i64,
                    TagValue::Bool(b) => i64::from(*b),
                    _ => return Err(protocol("an integer")),
                };
                Ok(TagValue::Int(raw.clamp(*min, *max)))
            }
            RegisterProfile::Float => value
                .as_f64()
                .map(TagValue::Float)
                .ok_or_else(|| protocol("a number")),
        }
    }
}

#[derive(Debug, Clone)]
struct SimRegister {
    profile: RegisterProfile,
    value: TagValue,
}

fn default_registers() -> HashMap<String, SimRegister> {
    let mut registers = HashMap::new();
    let mut seed = |name: &str, profile: RegisterProfile, value: TagValue| {
        registers.insert(name.to_string(), SimRegister { profile, value });
    };

    for switch in [
        "MainSwitch",
        "FeederSwitch",
        "VentSwitch",
        "NozzleSelect",
        "Partial",
        "Open",
        "Shutter",
        "XAxis.InProgress",
        "XAxis.Complete",
        "YAxis.InProgress",
        "YAxis.Complete",
    ] {
        seed(switch, RegisterProfile::Switch, TagValue::Bool(false));
    }

    seed("AMC.Ax1Position", RegisterProfile::Float, TagValue::Float(0.0));
    seed("AMC.Ax2Position", RegisterProfile::Float, TagValue::Float(0.0));
    seed("AMC.Ax3Position", RegisterProfile::Float, TagValue::Float(0.0));

    // 100 psi, 80 psi, 0.2 torr
    seed("MainGasPressure", RegisterProfile::analog_12bit(), TagValue::Int(4095));
    seed("RegulatorPressure", RegisterProfile::analog_12bit(), TagValue::Int(3276));
    seed("FeederPressure", RegisterProfile::analog_12bit(), TagValue::Int(819));

    seed("MainFlowRate", RegisterProfile::analog_12bit(), TagValue::Int(2048));
    seed("FeederFlowRate", RegisterProfile::analog_12bit(), TagValue::Int(2048));
    seed("AOS32-0.1.2.1", RegisterProfile::analog_12bit(), TagValue::Int(2048));

    registers
}

/// In-process stand-in for the register controller.
pub struct SimulatedRegisterClient {
    registers: RwLock<HashMap<String, SimRegister>>,
    connected: AtomicBool,
    mode: MockMode,
    timing: TimingConfig,
}

impl Default for SimulatedRegisterClient {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedRegisterClient {
    /// Create a disconnected client with the default register image.
    pub fn new() -> Self {
        Self {
            registers: RwLock::new(default_registers()),
            connected: AtomicBool::new(false),
            mode: MockMode::Instant,
            timing: TimingConfig::plc(),
        }
    }

    pub fn with_mode(mut self, mode: MockMode) -> Self {
        self.mode = mode;
        self
    }

    /// Add (or re-profile) a register. An existing default value is kept when
    /// the profile accepts it.
    pub fn with_register(
        mut self,
        name: impl Into<String>,
        profile: RegisterProfile,
        initial: TagValue,
    ) -> Self {
        let name = name.into();
        {
            let registers = self.registers.get_mut();
            let value = registers
                .get(&name)
                .and_then(|existing| profile.coerce(&name, &existing.value).ok())
                .unwrap_or(initial);
            registers.insert(name, SimRegister { profile, value });
        }
        self
    }

    /// Current register image value, without simulated latency.
    pub async fn peek(&self, address: &str) -> Option<TagValue> {
        self.registers
            .read()
            .await
            .get(address)
            .map(|r| r.value.clone())
    }

    fn ensure_connected(&self) -> Result<(), HardwareError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(HardwareError::not_connected(Transport::Register))
        }
    }
}

#[async_trait]
impl HardwareClient for SimulatedRegisterClient {
    fn transport(&self) -> Transport {
        Transport::Register
    }

    fn is_simulated(&self) -> bool {
        true
    }

    async fn connect(&self) -> Result<(), HardwareError> {
        TimingConfig::wait(self.mode, self.timing.connect_ms).await;
        self.connected.store(true, Ordering::SeqCst);
        tracing::info!("Simulated register client connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), HardwareError> {
        TimingConfig::wait(self.mode, self.timing.connect_ms).await;
        self.connected.store(false, Ordering::SeqCst);
        tracing::info!("Simulated register client disconnected");
        Ok(())
    }

    async fn read_address(&self, address: &str) -> Result<TagValue, HardwareError> {
        self.ensure_connected()?;
        TimingConfig::wait(self.mode, self.timing.exchange_ms).await;
        Ok(self
            .registers
            .read()
            .await
            .get(address)
            .map(|r| r.value.clone())
            .unwrap_or(TagValue::Int(0)))
    }

    async fn write_address(&self, address: &str, value: &TagValue) -> Result<(), HardwareError> {
        self.ensure_connected()?;
        TimingConfig::wait(self.mode, self.timing.exchange_ms).await;

        let mut registers = self.registers.write().await;
        match registers.get_mut(address) {
            Some(register) => {
                register.value = register.profile.coerce(address, value)?;
                tracing::debug!("Simulated register {} = {}", address, register.value);
            }
            None => {
                tracing::warn!("Simulated register write to unknown register {}", address);
                registers.insert(
                    address.to_string(),
                    SimRegister {
                        profile: RegisterProfile::Float,
                        value: value.clone(),
                    },
                );
            }
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
