//! Device-facing services.
//!
//! Thin consumers of the tag cache's read/write contract. Each one names the
//! tag paths it drives and never touches native addresses or clients.

pub mod equipment;
pub mod feeder;
pub mod motion;

pub use equipment::{EquipmentService, GasLine, ShutterPosition};
pub use feeder::FeederService;
pub use motion::MotionService;

use crate::tags::{TagCacheService, TagMappingService};
use async_trait::async_trait;
use mcs_core::{McsError, McsResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Lifecycle shared by every device service. The orchestrator starts them in
/// dependency order and stops them in reverse.
#[async_trait]
pub trait DeviceService: Send + Sync {
    /// Component key in health reports.
    fn name(&self) -> &'static str;

    async fn start(&self) -> McsResult<()>;

    async fn stop(&self) -> McsResult<()>;

    fn is_running(&self) -> bool;
}

/// Collaborators handed to every device service.
#[derive(Clone)]
pub struct DeviceContext {
    pub cache: Arc<TagCacheService>,
    pub mapping: Arc<TagMappingService>,
}

impl DeviceContext {
    pub fn new(cache: Arc<TagCacheService>, mapping: Arc<TagMappingService>) -> Self {
        Self { cache, mapping }
    }
}

/// Running flag plus the start/stop bookkeeping every service repeats.
pub(crate) struct ServiceState {
    name: &'static str,
    running: AtomicBool,
}

impl ServiceState {
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            name,
            running: AtomicBool::new(false),
        }
    }

    /// Mark running. Requires a running cache; tags the service drives but
    /// the document does not declare are logged, not fatal.
    pub(crate) fn start(&self, ctx: &DeviceContext, tags: &[&str]) -> McsResult<()> {
        if !ctx.cache.is_running() {
            return Err(McsError::Service(format!(
                "{} cannot start before the tag cache",
                self.name
            )));
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(McsError::Service(format!("{} already running", self.name)));
        }

        let missing: Vec<&str> = tags
            .iter()
            .copied()
            .filter(|tag| ctx.cache.get(tag).is_err())
            .collect();
        if missing.is_empty() {
            tracing::info!("{} service started", self.name);
        } else {
            tracing::warn!(
                "{} service started without tags: {}",
                self.name,
                missing.join(", ")
            );
        }
        Ok(())
    }

    pub(crate) fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            tracing::info!("{} service stopped", self.name);
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) fn ensure_running(&self) -> McsResult<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(McsError::Service(format!("{} service not running", self.name)))
        }
    }
}
