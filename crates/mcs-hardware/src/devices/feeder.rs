//! Powder feeder control.
//!
//! The feeder controller takes explicit start and stop codes on its
//! start/stop variable rather than a boolean.

use super::{DeviceContext, DeviceService, ServiceState};
use async_trait::async_trait;
use mcs_core::McsResult;
use mcs_driver_mock::{FEEDER_START, FEEDER_STOP};

pub const SPEED_SETPOINT: &str = "feeder.speed.setpoint";
pub const CONTROL_START: &str = "feeder.control.start";

pub struct FeederService {
    ctx: DeviceContext,
    state: ServiceState,
}

impl FeederService {
    pub fn new(ctx: DeviceContext) -> Self {
        Self {
            ctx,
            state: ServiceState::new("feeder"),
        }
    }

    pub async fn set_frequency(&self, frequency: f64) -> McsResult<()> {
        self.state.ensure_running()?;
        self.ctx.cache.write(SPEED_SETPOINT, frequency).await
    }

    pub async fn start_feeding(&self) -> McsResult<()> {
        self.state.ensure_running()?;
        self.ctx.cache.write(CONTROL_START, FEEDER_START).await?;
        tracing::info!("Powder feeding started");
        Ok(())
    }

    pub async fn stop_feeding(&self) -> McsResult<()> {
        self.state.ensure_running()?;
        self.ctx.cache.write(CONTROL_START, FEEDER_STOP).await?;
        tracing::info!("Powder feeding stopped");
        Ok(())
    }

    /// Native variables backing a feeder tag, in declaration order. Writes
    /// by tag path land on the last one.
    pub fn native_targets(&self, path: &str) -> McsResult<Vec<String>> {
        self.state.ensure_running()?;
        self.ctx.mapping.variables_for(path)
    }
}

#[async_trait]
impl DeviceService for FeederService {
    fn name(&self) -> &'static str {
        "feeder"
    }

    async fn start(&self) -> McsResult<()> {
        self.state.start(&self.ctx, &[SPEED_SETPOINT, CONTROL_START])
    }

    async fn stop(&self) -> McsResult<()> {
        self.state.stop();
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.state.is_running()
    }
}
