//! The communication service: cold start to ready, fallback and health.
//!
//! ```text
//! start(config)
//!   ├─ create clients (real, or simulated when forced / unconfigured)
//!   ├─ connect both concurrently ── failure ─► simulated stand-in
//!   ├─ TagMappingService::start, TagCacheService::start, attach clients
//!   └─ equipment → feeder → motion
//! stop()
//!   └─ motion → feeder → equipment, disconnect clients, stop cache, stop mapping
//! ```
//!
//! A hardware connection failure at start is the only failure that is
//! recovered from. Everything else aborts `start` and unwinds what was
//! already brought up.

use crate::clients::{
    create_register_client, create_variable_client, simulated_register_client,
    simulated_variable_client,
};
use crate::config::CommunicationConfig;
use crate::devices::{
    DeviceContext, DeviceService, EquipmentService, FeederService, MotionService,
};
use crate::tags::{TagCacheService, TagMappingService, TransportClients};
use mcs_core::{
    ConnectionState, HardwareClient, HealthReport, HealthStatus, McsError, McsResult, Transport,
    ValidationError,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Everything `start` brought up, owned until `stop`.
struct Stack {
    clients: TransportClients,
    register_state: ConnectionState,
    variable_state: ConnectionState,
    mapping: Arc<TagMappingService>,
    cache: Arc<TagCacheService>,
    equipment: Arc<EquipmentService>,
    feeder: Arc<FeederService>,
    motion: Arc<MotionService>,
}

impl Stack {
    /// Device services in start order.
    fn services(&self) -> [Arc<dyn DeviceService>; 3] {
        [
            self.equipment.clone(),
            self.feeder.clone(),
            self.motion.clone(),
        ]
    }
}

#[derive(Default)]
pub struct CommunicationService {
    stack: RwLock<Option<Stack>>,
    running: AtomicBool,
}

impl CommunicationService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub async fn start(&self, config: &CommunicationConfig) -> McsResult<()> {
        let mut slot = self.stack.write().await;
        if slot.is_some() {
            return Err(McsError::Service(
                "communication service already running".to_string(),
            ));
        }

        let hardware = &config.hardware;
        if hardware.is_empty() {
            return Err(ValidationError::EmptyConfig("hardware".to_string()).into());
        }
        if let Err(errors) = hardware.check_registers() {
            return Err(McsError::Config(errors.join("; ")));
        }

        let mode = hardware.simulation;
        if hardware.force_simulated {
            info!("Simulation forced; hardware connections skipped");
        } else {
            if hardware.plc.is_none() {
                warn!("No register controller configured; using simulated register client");
            }
            if hardware.feeder.is_none() {
                warn!("No feeder controller configured; using simulated variable client");
            }
        }

        let register =
            create_register_client(hardware.plc.as_ref(), hardware.force_simulated, mode);
        let variable =
            create_variable_client(hardware.feeder.as_ref(), hardware.force_simulated, mode);

        let (clients, register_state, variable_state) = connect_both(
            register,
            variable,
            || simulated_register_client(hardware.plc.as_ref(), mode),
            || simulated_variable_client(mode),
        )
        .await?;

        let stack = match build_stack(config, clients.clone(), register_state, variable_state).await {
            Ok(stack) => stack,
            Err(e) => {
                error!("Communication service failed to start: {}", e);
                disconnect_all(&clients).await;
                return Err(e);
            }
        };

        *slot = Some(stack);
        self.running.store(true, Ordering::SeqCst);
        info!(
            "Communication service running (register: {:?}, variable: {:?})",
            register_state, variable_state
        );
        Ok(())
    }

    /// Best-effort teardown. Safe to call when not running.
    pub async fn stop(&self) -> McsResult<()> {
        let Some(stack) = self.stack.write().await.take() else {
            debug!("Communication service already stopped");
            return Ok(());
        };
        self.running.store(false, Ordering::SeqCst);

        let mut services = stack.services();
        services.reverse();
        for service in services {
            if let Err(e) = service.stop().await {
                error!("Failed to stop {} service: {}", service.name(), e);
            }
        }
        disconnect_all(&stack.clients).await;
        stack.cache.stop();
        stack.mapping.stop();

        info!("Communication service stopped");
        Ok(())
    }

    pub async fn check_health(&self) -> McsResult<HealthReport> {
        let slot = self.stack.read().await;
        let Some(stack) = slot.as_ref() else {
            return Ok(HealthReport {
                status: HealthStatus::Error,
                components: BTreeMap::new(),
                error: Some("communication service not running".to_string()),
            });
        };

        let mut components = BTreeMap::new();
        let mut simulated = Vec::new();
        for transport in [Transport::Register, Transport::Variable] {
            let client = stack.clients.get(transport);
            let connected = client.check_connection().await.map_err(|e| {
                McsError::Service(format!("{} health probe failed: {}", transport, e))
            })?;
            if client.is_simulated() {
                simulated.push(transport);
            }
            components.insert(transport.component_name().to_string(), connected);
        }
        components.insert("tag_mapping".to_string(), stack.mapping.is_running());
        components.insert("tag_cache".to_string(), stack.cache.is_running());
        for service in stack.services() {
            components.insert(service.name().to_string(), service.is_running());
        }

        let mut problems: Vec<String> = components
            .iter()
            .filter(|(_, up)| !**up)
            .map(|(name, _)| format!("{} down", name))
            .collect();
        problems.extend(
            simulated
                .iter()
                .map(|t| format!("{} transport simulated", t)),
        );

        let status = if problems.is_empty() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };
        Ok(HealthReport {
            status,
            components,
            error: (!problems.is_empty()).then(|| problems.join(", ")),
        })
    }

    async fn with_stack<T>(&self, f: impl FnOnce(&Stack) -> T) -> McsResult<T> {
        self.stack
            .read()
            .await
            .as_ref()
            .map(f)
            .ok_or_else(|| McsError::Service("communication service not running".to_string()))
    }

    pub async fn tag_cache(&self) -> McsResult<Arc<TagCacheService>> {
        self.with_stack(|s| s.cache.clone()).await
    }

    pub async fn tag_mapping(&self) -> McsResult<Arc<TagMappingService>> {
        self.with_stack(|s| s.mapping.clone()).await
    }

    pub async fn equipment(&self) -> McsResult<Arc<EquipmentService>> {
        self.with_stack(|s| s.equipment.clone()).await
    }

    pub async fn feeder(&self) -> McsResult<Arc<FeederService>> {
        self.with_stack(|s| s.feeder.clone()).await
    }

    pub async fn motion(&self) -> McsResult<Arc<MotionService>> {
        self.with_stack(|s| s.motion.clone()).await
    }

    pub async fn connection_state(&self, transport: Transport) -> ConnectionState {
        self.with_stack(|s| match transport {
            Transport::Register => s.register_state,
            Transport::Variable => s.variable_state,
        })
        .await
        .unwrap_or(ConnectionState::Disconnected)
    }
}

/// Connect both transports concurrently, falling back per transport. If a
/// fallback cannot connect either, the other transport is disconnected again
/// before the error is returned.
async fn connect_both(
    register: Arc<dyn HardwareClient>,
    variable: Arc<dyn HardwareClient>,
    register_fallback: impl FnOnce() -> Arc<dyn HardwareClient>,
    variable_fallback: impl FnOnce() -> Arc<dyn HardwareClient>,
) -> McsResult<(TransportClients, ConnectionState, ConnectionState)> {
    let (register_result, variable_result) =
        futures::future::join(register.connect(), variable.connect()).await;
    let variable_connected = variable_result.is_ok();

    let (register, register_state) =
        match connect_or_fallback(register, register_result, register_fallback).await {
            Ok(connected) => connected,
            Err(e) => {
                if variable_connected {
                    disconnect_client(&variable).await;
                }
                return Err(e);
            }
        };
    let (variable, variable_state) =
        match connect_or_fallback(variable, variable_result, variable_fallback).await {
            Ok(connected) => connected,
            Err(e) => {
                disconnect_client(&register).await;
                return Err(e);
            }
        };

    Ok((
        TransportClients::new(register, variable),
        register_state,
        variable_state,
    ))
}

/// Keep a connected client, or swap in a connected simulated one.
async fn connect_or_fallback(
    client: Arc<dyn HardwareClient>,
    result: Result<(), mcs_core::HardwareError>,
    fallback: impl FnOnce() -> Arc<dyn HardwareClient>,
) -> McsResult<(Arc<dyn HardwareClient>, ConnectionState)> {
    let client = match result {
        Ok(()) => client,
        Err(e) => {
            warn!(
                "{} transport unreachable ({}); falling back to simulated client",
                client.transport(),
                e
            );
            let simulated = fallback();
            simulated.connect().await?;
            simulated
        }
    };
    let state = if client.is_simulated() {
        ConnectionState::ConnectedSimulated
    } else {
        ConnectionState::ConnectedReal
    };
    Ok((client, state))
}

async fn build_stack(
    config: &CommunicationConfig,
    clients: TransportClients,
    register_state: ConnectionState,
    variable_state: ConnectionState,
) -> McsResult<Stack> {
    let mapping = Arc::new(TagMappingService::new());
    mapping.start(&config.tags)?;

    let cache = Arc::new(TagCacheService::new(mapping.clone()));
    if let Err(e) = cache.start(&config.tags) {
        mapping.stop();
        return Err(e);
    }
    cache.attach_clients(clients.clone());

    let ctx = DeviceContext::new(cache.clone(), mapping.clone());
    let stack = Stack {
        clients,
        register_state,
        variable_state,
        mapping,
        cache,
        equipment: Arc::new(EquipmentService::new(ctx.clone())),
        feeder: Arc::new(FeederService::new(ctx.clone())),
        motion: Arc::new(MotionService::new(ctx)),
    };

    let services = stack.services();
    for (started, service) in services.iter().enumerate() {
        if let Err(e) = service.start().await {
            for service in services[..started].iter().rev() {
                if let Err(stop_err) = service.stop().await {
                    error!("Failed to stop {} service: {}", service.name(), stop_err);
                }
            }
            stack.cache.stop();
            stack.mapping.stop();
            return Err(e);
        }
    }
    Ok(stack)
}

async fn disconnect_client(client: &Arc<dyn HardwareClient>) {
    if let Err(e) = client.disconnect().await {
        error!("Failed to disconnect {} client: {}", client.transport(), e);
    }
}

async fn disconnect_all(clients: &TransportClients) {
    for transport in [Transport::Register, Transport::Variable] {
        disconnect_client(clients.get(transport)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mcs_core::{HardwareError, HardwareErrorKind, TagValue};
    use std::sync::atomic::AtomicUsize;

    /// Client whose `connect` succeeds or fails as told.
    struct ScriptedClient {
        transport: Transport,
        simulated: bool,
        accept: bool,
        connected: AtomicBool,
        disconnects: AtomicUsize,
    }

    impl ScriptedClient {
        fn new(transport: Transport, simulated: bool, accept: bool) -> Arc<Self> {
            Arc::new(Self {
                transport,
                simulated,
                accept,
                connected: AtomicBool::new(false),
                disconnects: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl HardwareClient for ScriptedClient {
        fn transport(&self) -> Transport {
            self.transport
        }

        fn is_simulated(&self) -> bool {
            self.simulated
        }

        async fn connect(&self) -> Result<(), HardwareError> {
            if !self.accept {
                return Err(HardwareError::new(
                    self.transport,
                    HardwareErrorKind::Connection,
                    "refused",
                ));
            }
            self.connected.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), HardwareError> {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
            self.connected.store(false, Ordering::SeqCst);
            Ok(())
        }

        async fn read_address(&self, _address: &str) -> Result<TagValue, HardwareError> {
            Ok(TagValue::Int(0))
        }

        async fn write_address(&self, _address: &str, _value: &TagValue) -> Result<(), HardwareError> {
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }
    }

    #[tokio::test]
    async fn fallback_replaces_unreachable_transport() {
        let register = ScriptedClient::new(Transport::Register, false, true);
        let variable = ScriptedClient::new(Transport::Variable, false, false);
        let stand_in = ScriptedClient::new(Transport::Variable, true, true);

        let fallback = stand_in.clone();
        let (clients, register_state, variable_state) = connect_both(
            register.clone(),
            variable,
            || unreachable!("register transport connected"),
            move || fallback as Arc<dyn HardwareClient>,
        )
        .await
        .unwrap();

        assert_eq!(register_state, ConnectionState::ConnectedReal);
        assert_eq!(variable_state, ConnectionState::ConnectedSimulated);
        assert!(clients.variable.is_simulated());
        assert!(stand_in.is_connected());
        assert!(register.is_connected());
    }

    #[tokio::test]
    async fn failed_variable_fallback_disconnects_register() {
        let register = ScriptedClient::new(Transport::Register, false, true);
        let variable = ScriptedClient::new(Transport::Variable, false, false);
        let stand_in = ScriptedClient::new(Transport::Variable, true, false);

        let result = connect_both(
            register.clone(),
            variable,
            || unreachable!("register transport connected"),
            move || stand_in as Arc<dyn HardwareClient>,
        )
        .await;

        assert!(matches!(result, Err(McsError::Hardware(_))));
        assert!(!register.is_connected());
        assert_eq!(register.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_register_fallback_disconnects_variable() {
        let register = ScriptedClient::new(Transport::Register, false, false);
        let stand_in = ScriptedClient::new(Transport::Register, true, false);
        let variable = ScriptedClient::new(Transport::Variable, false, true);

        let result = connect_both(
            register,
            variable.clone(),
            move || stand_in as Arc<dyn HardwareClient>,
            || unreachable!("register fallback failed first"),
        )
        .await;

        assert!(matches!(result, Err(McsError::Hardware(_))));
        assert!(!variable.is_connected());
        assert_eq!(variable.disconnects.load(Ordering::SeqCst), 1);
    }
}
