//! Gas, vacuum, valve, nozzle and shutter control.

use super::{DeviceContext, DeviceService, ServiceState};
use async_trait::async_trait;
use mcs_core::{McsResult, TagValue};
use std::fmt;

pub const MAIN_FLOW_SETPOINT: &str = "gas_control.main_flow.setpoint";
pub const FEEDER_FLOW_SETPOINT: &str = "gas_control.feeder_flow.setpoint";
pub const PUMP_ENABLE: &str = "vacuum_control.pump.enable";
pub const FEEDER_ENABLE: &str = "feeder_control.enable";
pub const DEAGGLOMERATOR_ENABLE: &str = "deagglomerator_control.enable";
pub const NOZZLE_ENABLE: &str = "nozzle_control.enable";
pub const SHUTTER_POSITION: &str = "shutter_control.position";

/// Process gas line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GasLine {
    Main,
    Feeder,
}

impl GasLine {
    pub fn setpoint_tag(&self) -> &'static str {
        match self {
            GasLine::Main => MAIN_FLOW_SETPOINT,
            GasLine::Feeder => FEEDER_FLOW_SETPOINT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutterPosition {
    Open,
    Partial,
    Closed,
}

impl fmt::Display for ShutterPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutterPosition::Open => write!(f, "open"),
            ShutterPosition::Partial => write!(f, "partial"),
            ShutterPosition::Closed => write!(f, "closed"),
        }
    }
}

pub struct EquipmentService {
    ctx: DeviceContext,
    state: ServiceState,
}

impl EquipmentService {
    pub fn new(ctx: DeviceContext) -> Self {
        Self {
            ctx,
            state: ServiceState::new("equipment"),
        }
    }

    async fn write(&self, path: &str, value: impl Into<TagValue>) -> McsResult<()> {
        self.state.ensure_running()?;
        self.ctx.cache.write(path, value).await
    }

    pub async fn set_gas_flow(&self, line: GasLine, flow: f64) -> McsResult<()> {
        self.write(line.setpoint_tag(), flow).await?;
        tracing::info!("{:?} gas flow setpoint {}", line, flow);
        Ok(())
    }

    /// `valve_control.<name>_gas`
    pub async fn set_gas_valve(&self, name: &str, open: bool) -> McsResult<()> {
        self.write(&format!("valve_control.{}_gas", name), open).await
    }

    /// `valve_control.<name>_vacuum`
    pub async fn set_vacuum_valve(&self, name: &str, open: bool) -> McsResult<()> {
        self.write(&format!("valve_control.{}_vacuum", name), open).await
    }

    pub async fn set_pump(&self, on: bool) -> McsResult<()> {
        self.write(PUMP_ENABLE, on).await
    }

    pub async fn set_feeder_enable(&self, on: bool) -> McsResult<()> {
        self.write(FEEDER_ENABLE, on).await
    }

    pub async fn set_deagglomerator(&self, on: bool) -> McsResult<()> {
        self.write(DEAGGLOMERATOR_ENABLE, on).await
    }

    pub async fn set_nozzle(&self, on: bool) -> McsResult<()> {
        self.write(NOZZLE_ENABLE, on).await
    }

    pub async fn set_shutter(&self, position: ShutterPosition) -> McsResult<()> {
        self.write(SHUTTER_POSITION, position.to_string()).await
    }

    pub async fn read_tag(&self, path: &str) -> McsResult<TagValue> {
        self.state.ensure_running()?;
        self.ctx.cache.read(path).await
    }
}

#[async_trait]
impl DeviceService for EquipmentService {
    fn name(&self) -> &'static str {
        "equipment"
    }

    async fn start(&self) -> McsResult<()> {
        self.state.start(
            &self.ctx,
            &[
                MAIN_FLOW_SETPOINT,
                FEEDER_FLOW_SETPOINT,
                PUMP_ENABLE,
                NOZZLE_ENABLE,
                SHUTTER_POSITION,
            ],
        )
    }

    async fn stop(&self) -> McsResult<()> {
        self.state.stop();
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.state.is_running()
    }
}
