//! Coordinated XY motion.

use super::{DeviceContext, DeviceService, ServiceState};
use async_trait::async_trait;
use mcs_core::{McsError, McsResult};

pub const XY_X_POSITION: &str = "motion_control.coordinated_move.xy_move.parameters.x_position";
pub const XY_Y_POSITION: &str = "motion_control.coordinated_move.xy_move.parameters.y_position";
pub const XY_VELOCITY: &str = "motion_control.coordinated_move.xy_move.parameters.velocity";
pub const XY_TRIGGER: &str = "motion_control.coordinated_move.xy_move.trigger";
pub const XY_IN_PROGRESS: &str = "motion_control.coordinated_move.xy_move.in_progress";

pub struct MotionService {
    ctx: DeviceContext,
    state: ServiceState,
}

impl MotionService {
    pub fn new(ctx: DeviceContext) -> Self {
        Self {
            ctx,
            state: ServiceState::new("motion"),
        }
    }

    /// Stage the move parameters, then fire the trigger. All three
    /// parameters are validated before anything is written.
    pub async fn move_xy(&self, x: f64, y: f64, velocity: f64) -> McsResult<()> {
        self.state.ensure_running()?;
        let cache = &self.ctx.cache;
        let parameters = [(XY_X_POSITION, x), (XY_Y_POSITION, y), (XY_VELOCITY, velocity)];
        for (path, value) in parameters {
            cache.validate(path, &value.into())?;
        }
        for (path, value) in parameters {
            cache.write(path, value).await?;
        }
        cache.write(XY_TRIGGER, true).await?;
        tracing::info!("XY move to ({}, {}) at {}", x, y, velocity);
        Ok(())
    }

    pub async fn is_moving(&self) -> McsResult<bool> {
        self.state.ensure_running()?;
        let value = self.ctx.cache.read(XY_IN_PROGRESS).await?;
        value.as_bool().ok_or_else(|| {
            McsError::Service(format!("{} reported non-boolean {}", XY_IN_PROGRESS, value))
        })
    }
}

#[async_trait]
impl DeviceService for MotionService {
    fn name(&self) -> &'static str {
        "motion"
    }

    async fn start(&self) -> McsResult<()> {
        self.state.start(
            &self.ctx,
            &[XY_X_POSITION, XY_Y_POSITION, XY_VELOCITY, XY_TRIGGER, XY_IN_PROGRESS],
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
