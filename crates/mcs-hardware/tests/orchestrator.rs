//! Communication service: start, fallback, health, devices and teardown.

mod common;

use common::{closed_port, FakeFeeder, FakePlc};
use mcs_core::{
    ConnectionState, HealthStatus, McsError, TagValue, Transport, ValidationError,
};
use mcs_hardware::config::{FeederLinkConfig, PlcConfig, RegisterKind};
use mcs_hardware::devices::{GasLine, ShutterPosition};
use mcs_hardware::{CommunicationConfig, CommunicationService, HardwareConfig};

fn plc_config(port: u16) -> PlcConfig {
    PlcConfig::new("127.0.0.1", port)
        .with_register("MainSwitch", RegisterKind::Coil, 0)
        .with_register("FeederSwitch", RegisterKind::Coil, 1)
        .with_register("VentSwitch", RegisterKind::Coil, 2)
        .with_register("NozzleSelect", RegisterKind::Coil, 3)
        .with_register("XYMove.Trigger", RegisterKind::Coil, 10)
        .with_register("XAxis.InProgress", RegisterKind::DiscreteInput, 0)
        .with_register("MainFlowRate", RegisterKind::Input, 0)
        .with_register("GAS_FLOW_SP", RegisterKind::HoldingFloat, 100)
        .with_register("FEEDER_FLOW_SP", RegisterKind::HoldingFloat, 102)
        .with_register("AMC.Ax1Position", RegisterKind::HoldingFloat, 200)
        .with_register("AMC.Ax2Position", RegisterKind::HoldingFloat, 202)
}

fn feeder_config(port: u16) -> FeederLinkConfig {
    let mut config = FeederLinkConfig::new("127.0.0.1", port);
    config.timeout_ms = 500;
    config
}

fn config(hardware: HardwareConfig) -> CommunicationConfig {
    CommunicationConfig::new(hardware, common::tags())
}

#[tokio::test]
async fn unreachable_variable_transport_falls_back_to_simulation() {
    let plc = FakePlc::spawn().await;
    let hardware = HardwareConfig {
        plc: Some(plc_config(plc.addr.port())),
        feeder: Some(feeder_config(closed_port().await)),
        ..HardwareConfig::default()
    };

    let service = CommunicationService::new();
    service.start(&config(hardware)).await.unwrap();
    assert!(service.is_running());
    assert_eq!(
        service.connection_state(Transport::Register).await,
        ConnectionState::ConnectedReal
    );
    assert_eq!(
        service.connection_state(Transport::Variable).await,
        ConnectionState::ConnectedSimulated
    );

    let health = service.check_health().await.unwrap();
    assert_eq!(health.component("register_transport"), Some(true));
    assert_eq!(health.component("variable_transport"), Some(true));
    assert_eq!(health.status, HealthStatus::Degraded);
    assert!(health.error.unwrap().contains("variable transport simulated"));

    // Variable-family writes are served by the simulated controller.
    let cache = service.tag_cache().await.unwrap();
    cache.write("feeder.speed.setpoint", 450).await.unwrap();
    assert_eq!(cache.read("feeder.speed.setpoint").await.unwrap(), TagValue::Int(450));

    // Register-family writes reach the real controller.
    cache.write("gas_control.main_flow.setpoint", 42.0).await.unwrap();
    assert_eq!(plc.holding(100), Some(0x4228));

    service.stop().await.unwrap();
}

#[tokio::test]
async fn real_transports_report_healthy() {
    let plc = FakePlc::spawn().await;
    let feeder = FakeFeeder::spawn().await;
    let hardware = HardwareConfig {
        plc: Some(plc_config(plc.addr.port())),
        feeder: Some(feeder_config(feeder.addr.port())),
        ..HardwareConfig::default()
    };

    let service = CommunicationService::new();
    service.start(&config(hardware)).await.unwrap();

    let health = service.check_health().await.unwrap();
    assert_eq!(health.status, HealthStatus::Healthy);
    assert!(health.error.is_none());
    for component in [
        "register_transport",
        "variable_transport",
        "tag_mapping",
        "tag_cache",
        "equipment",
        "feeder",
        "motion",
    ] {
        assert_eq!(health.component(component), Some(true), "{component}");
    }

    let feeder_service = service.feeder().await.unwrap();
    feeder_service.start_feeding().await.unwrap();
    assert_eq!(feeder.get("P10").as_deref(), Some("1"));
    feeder_service.set_frequency(800.0).await.unwrap();
    assert_eq!(feeder.get("P6").as_deref(), Some("800"));

    service.stop().await.unwrap();
}

#[tokio::test]
async fn forced_simulation_runs_everything_in_process() {
    let service = CommunicationService::new();
    service.start(&config(HardwareConfig::simulated())).await.unwrap();

    let health = service.check_health().await.unwrap();
    assert_eq!(health.status, HealthStatus::Degraded);
    let error = health.error.unwrap();
    assert!(error.contains("register transport simulated"));
    assert!(error.contains("variable transport simulated"));

    let equipment = service.equipment().await.unwrap();
    equipment.set_gas_flow(GasLine::Feeder, 5.0).await.unwrap();
    equipment.set_gas_valve("main", true).await.unwrap();
    equipment.set_vacuum_valve("vent", true).await.unwrap();
    equipment.set_pump(true).await.unwrap();
    equipment.set_nozzle(true).await.unwrap();
    equipment.set_shutter(ShutterPosition::Partial).await.unwrap();
    assert_eq!(
        equipment.read_tag("valve_control.main_gas").await.unwrap(),
        TagValue::Bool(true)
    );
    assert!(equipment.set_gas_flow(GasLine::Feeder, 50.0).await.unwrap_err().is_validation());

    let cache = service.tag_cache().await.unwrap();
    assert_eq!(
        cache.get("shutter_control.position").unwrap(),
        TagValue::String("partial".into())
    );
    assert_eq!(
        cache.get("gas_control.feeder_flow.setpoint").unwrap(),
        TagValue::Float(5.0)
    );

    let feeder = service.feeder().await.unwrap();
    feeder.start_feeding().await.unwrap();
    assert_eq!(cache.read("feeder.control.start").await.unwrap(), TagValue::Int(1));
    feeder.stop_feeding().await.unwrap();
    assert_eq!(cache.read("feeder.control.start").await.unwrap(), TagValue::Int(4));
    assert_eq!(
        feeder.native_targets("feeder.hopper").unwrap(),
        vec!["P106", "P110", "P112"]
    );

    let motion = service.motion().await.unwrap();
    motion.move_xy(120.0, 80.0, 25.0).await.unwrap();
    assert_eq!(
        cache.get("motion_control.coordinated_move.xy_move.trigger").unwrap(),
        TagValue::Bool(true)
    );
    assert!(!motion.is_moving().await.unwrap());

    // An invalid parameter stops the move before anything is written.
    let err = motion.move_xy(600.0, 10.0, 25.0).await.unwrap_err();
    assert!(err.is_validation());
    assert_eq!(
        cache
            .get("motion_control.coordinated_move.xy_move.parameters.y_position")
            .unwrap(),
        TagValue::Float(80.0)
    );

    service.stop().await.unwrap();
}

#[tokio::test]
async fn missing_transport_section_is_simulated() {
    let plc = FakePlc::spawn().await;
    let hardware = HardwareConfig {
        plc: Some(plc_config(plc.addr.port())),
        ..HardwareConfig::default()
    };
    let service = CommunicationService::new();
    service.start(&config(hardware)).await.unwrap();
    assert_eq!(
        service.connection_state(Transport::Variable).await,
        ConnectionState::ConnectedSimulated
    );
    assert_eq!(
        service.check_health().await.unwrap().status,
        HealthStatus::Degraded
    );
    service.stop().await.unwrap();
}

#[tokio::test]
async fn empty_hardware_config_is_rejected() {
    let service = CommunicationService::new();
    let err = service
        .start(&config(HardwareConfig::default()))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        McsError::Validation(ValidationError::EmptyConfig("hardware".into()))
    );
    assert!(!service.is_running());
}

#[tokio::test]
async fn malformed_tags_abort_start_and_leave_service_restartable() {
    let service = CommunicationService::new();
    let broken = CommunicationConfig::new(
        HardwareConfig::simulated(),
        serde_yaml::from_str("a: { type: float, mapped: true }\n").unwrap(),
    );
    let err = service.start(&broken).await.unwrap_err();
    assert!(matches!(err, McsError::Config(_)));
    assert!(!service.is_running());
    assert!(service.tag_cache().await.is_err());

    service.start(&config(HardwareConfig::simulated())).await.unwrap();
    assert!(service.is_running());
    service.stop().await.unwrap();
}

#[tokio::test]
async fn start_twice_is_a_service_error() {
    let service = CommunicationService::new();
    service.start(&config(HardwareConfig::simulated())).await.unwrap();
    let err = service
        .start(&config(HardwareConfig::simulated()))
        .await
        .unwrap_err();
    assert!(matches!(err, McsError::Service(_)));
    assert!(service.is_running());
    service.stop().await.unwrap();
}

#[tokio::test]
async fn stop_tears_everything_down_and_is_idempotent() {
    let service = CommunicationService::new();
    service.start(&config(HardwareConfig::simulated())).await.unwrap();

    let cache = service.tag_cache().await.unwrap();
    let mapping = service.tag_mapping().await.unwrap();
    let equipment = service.equipment().await.unwrap();

    service.stop().await.unwrap();
    service.stop().await.unwrap();

    assert!(!service.is_running());
    assert!(cache.is_empty());
    assert!(!cache.is_running());
    assert!(mapping.is_empty());
    assert!(matches!(
        equipment.set_pump(true).await,
        Err(McsError::Service(_))
    ));
    assert_eq!(
        service.connection_state(Transport::Register).await,
        ConnectionState::Disconnected
    );

    let health = service.check_health().await.unwrap();
    assert_eq!(health.status, HealthStatus::Error);
    assert!(health.components.is_empty());
}

#[tokio::test]
async fn health_serializes_to_the_documented_shape() {
    let service = CommunicationService::new();
    service.start(&config(HardwareConfig::simulated())).await.unwrap();
    let health = service.check_health().await.unwrap();
    let json = serde_yaml::to_value(&health).unwrap();
    assert_eq!(json["status"].as_str(), Some("degraded"));
    assert_eq!(json["components"]["tag_cache"].as_bool(), Some(true));
    service.stop().await.unwrap();
}
