//! Simulated variable-family feeder controller.
//!
//! Each powder feeder is driven by three P variables: frequency, start/stop
//! and run time. Feeder 1 uses `P6`/`P10`/`P12`, feeder 2 the same numbers
//! offset by 100. The controller accepts any write and folds it into the
//! range the drive firmware supports.

use async_trait::async_trait;
use mcs_core::{HardwareClient, HardwareError, HardwareErrorKind, TagValue, Transport};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use crate::common::{MockMode, TimingConfig};

/// Start command value of the start/stop variable.
pub const FEEDER_START: i64 = 1;
/// Stop command value of the start/stop variable.
pub const FEEDER_STOP: i64 = 4;

/// How a simulated variable reacts to writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableProfile {
    /// Integer folded into `[min, max]`.
    Clamped { min: i64, max: i64 },
    /// Only `FEEDER_START` and `FEEDER_STOP` exist; anything else starts.
    StartStop,
    /// Stored as written.
    Free,
}

impl VariableProfile {
    pub fn frequency() -> Self {
        VariableProfile::Clamped { min: 200, max: 1200 }
    }

    pub fn run_time() -> Self {
        VariableProfile::Clamped {
            min: 0,
            max: i64::MAX,
        }
    }

    fn coerce(&self, name: &str, value: &TagValue) -> Result<TagValue, HardwareError> {
        if matches!(self, VariableProfile::Free) {
            return Ok(value.clone());
        }
        let raw = match value {
            TagValue::Int(v) => *v,
            TagValue::Float(v) if v.is_finite() => v.round() as i64,
            TagValue::Bool(b) => i64::from(*b),
            _ => {
                return Err(HardwareError::new(
                    Transport::Variable,
                    HardwareErrorKind::Protocol,
                    format!("variable {} expects a number, got {}", name, value.type_name()),
                ))
            }
        };
        let folded = match self {
            VariableProfile::Clamped { min, max } => raw.clamp(*min, *max),
            VariableProfile::StartStop if raw == FEEDER_STOP => FEEDER_STOP,
            VariableProfile::StartStop => FEEDER_START,
            VariableProfile::Free => raw,
        };
        Ok(TagValue::Int(folded))
    }
}

#[derive(Debug, Clone)]
struct SimVariable {
    profile: VariableProfile,
    value: TagValue,
}

fn default_variables() -> HashMap<String, SimVariable> {
    let mut variables = HashMap::new();
    for offset in [0, 100] {
        let mut seed = |number: i64, profile: VariableProfile, value: i64| {
            variables.insert(
                format!("P{}", number + offset),
                SimVariable {
                    profile,
                    value: TagValue::Int(value),
                },
            );
        };
        seed(6, VariableProfile::frequency(), 200);
        seed(10, VariableProfile::StartStop, FEEDER_STOP);
        seed(12, VariableProfile::run_time(), 999);
    }
    variables
}

/// In-process stand-in for the feeder controller session.
pub struct SimulatedVariableClient {
    variables: RwLock<HashMap<String, SimVariable>>,
    connected: AtomicBool,
    mode: MockMode,
    timing: TimingConfig,
}

impl Default for SimulatedVariableClient {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedVariableClient {
    pub fn new() -> Self {
        Self {
            variables: RwLock::new(default_variables()),
            connected: AtomicBool::new(false),
            mode: MockMode::Instant,
            timing: TimingConfig::feeder(),
        }
    }

    pub fn with_mode(mut self, mode: MockMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_variable(
        mut self,
        name: impl Into<String>,
        profile: VariableProfile,
        initial: TagValue,
    ) -> Self {
        self.variables.get_mut().insert(
            name.into(),
            SimVariable {
                profile,
                value: initial,
            },
        );
        self
    }

    pub async fn peek(&self, name: &str) -> Option<TagValue> {
        self.variables
            .read()
            .await
            .get(name)
            .map(|v| v.value.clone())
    }

    fn ensure_connected(&self) -> Result<(), HardwareError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(HardwareError::not_connected(Transport::Variable))
        }
    }
}

#[async_trait]
impl HardwareClient for SimulatedVariableClient {
    fn transport(&self) -> Transport {
        Transport::Variable
    }

    fn is_simulated(&self) -> bool {
        true
    }

    async fn connect(&self) -> Result<(), HardwareError> {
        TimingConfig::wait(self.mode, self.timing.connect_ms).await;
        self.connected.store(true, Ordering::SeqCst);
        tracing::info!("Simulated feeder controller connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), HardwareError> {
        TimingConfig::wait(self.mode, self.timing.connect_ms).await;
        self.connected.store(false, Ordering::SeqCst);
        tracing::info!("Simulated feeder controller disconnected");
        Ok(())
    }

    async fn read_address(&self, address: &str) -> Result<TagValue, HardwareError> {
        self.ensure_connected()?;
        TimingConfig::wait(self.mode, self.timing.exchange_ms).await;
        Ok(self
            .variables
            .read()
            .await
            .get(address)
            .map(|v| v.value.clone())
            .unwrap_or(TagValue::Int(0)))
    }

    async fn write_address(&self, address: &str, value: &TagValue) -> Result<(), HardwareError> {
        self.ensure_connected()?;
        TimingConfig::wait(self.mode, self.timing.exchange_ms).await;

        let mut variables = self.variables.write().await;
        match variables.get_mut(address) {
            Some(variable) => {
                variable.value = variable.profile.coerce(address, value)?;
                tracing::debug!("Simulated feeder {}={}", address, variable.value);
            }
            None => {
                tracing::warn!("Simulated feeder write to unknown variable {}", address);
                variables.insert(
                    address.to_string(),
                    SimVariable {
                        profile: VariableProfile::Free,
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

#[cfg(test)]
mod tests {
    use super::*;

    async fn connected() -> SimulatedVariableClient {
        let client = SimulatedVariableClient::new();
        client.connect().await.unwrap();
        client
    }

    async fn write_then_read(client: &SimulatedVariableClient, name: &str, value: i64) -> TagValue {
        client.write_address(name, &TagValue::Int(value)).await.unwrap();
        client.read_address(name).await.unwrap()
    }

    #[tokio::test]
    async fn test_default_values() {
        let client = connected().await;
        for (name, value) in [("P6", 200), ("P10", 4), ("P12", 999), ("P106", 200), ("P110", 4), ("P112", 999)] {
            assert_eq!(client.read_address(name).await.unwrap(), TagValue::Int(value), "{name}");
        }
    }

    #[tokio::test]
    async fn test_frequency_clamps() {
        let client = connected().await;
        assert_eq!(write_then_read(&client, "P6", 500).await, TagValue::Int(500));
        assert_eq!(write_then_read(&client, "P6", 100).await, TagValue::Int(200));
        assert_eq!(write_then_read(&client, "P106", 1500).await, TagValue::Int(1200));
    }

    #[tokio::test]
    async fn test_start_stop_folds_invalid_values_to_start() {
        let client = connected().await;
        assert_eq!(write_then_read(&client, "P10", 1).await, TagValue::Int(1));
        assert_eq!(write_then_read(&client, "P110", 4).await, TagValue::Int(4));
        assert_eq!(write_then_read(&client, "P10", 2).await, TagValue::Int(1));
        assert_eq!(write_then_read(&client, "P110", 0).await, TagValue::Int(1));
    }

    #[tokio::test]
    async fn test_run_time_never_negative() {
        let client = connected().await;
        assert_eq!(write_then_read(&client, "P12", 500).await, TagValue::Int(500));
        assert_eq!(write_then_read(&client, "P12", -100).await, TagValue::Int(0));
    }

    #[tokio::test]
    async fn test_text_is_rejected() {
        let client = connected().await;
        let err = client
            .write_address("P6", &TagValue::String("fast".into()))
            .await
            .unwrap_err();
        assert_eq!(err.kind, HardwareErrorKind::Protocol);
        assert_eq!(client.peek("P6").await, Some(TagValue::Int(200)));
    }

    #[tokio::test]
    async fn test_unknown_variable() {
        let client = connected().await;
        assert_eq!(client.read_address("P999").await.unwrap(), TagValue::Int(0));
        client.write_address("P999", &TagValue::Int(100)).await.unwrap();
        assert_eq!(client.peek("P999").await, Some(TagValue::Int(100)));
    }
}
