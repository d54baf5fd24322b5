//! `mcs-hardware`
//!
//! The hardware tag abstraction layer: upper layers address the process
//! equipment by symbolic tag paths and this crate resolves them to
//! transport-native addresses, validates every value against its tag
//! contract and keeps the stack up on simulated clients when hardware is
//! unreachable.
//!
//! # Layout
//!
//! - [`config`]: hardware (TOML) and tag (YAML) documents
//! - [`clients`]: Modbus/TCP register client, feeder command client, factory
//! - [`tags`]: document walker, [`TagMappingService`], [`TagCacheService`]
//! - [`devices`]: equipment, feeder and motion services built on the cache
//! - [`communication`]: [`CommunicationService`], the orchestrator
//!
//! # Example
//!
//! ```rust,ignore
//! use mcs_hardware::{CommunicationConfig, CommunicationService, HardwareConfig};
//!
//! let tags = mcs_hardware::config::parse_tag_document(TAGS_YAML)?;
//! let service = CommunicationService::new();
//! service.start(&CommunicationConfig::new(HardwareConfig::simulated(), tags)).await?;
//!
//! let cache = service.tag_cache().await?;
//! cache.write("gas_control.main_flow.setpoint", 42.0).await?;
//! println!("{:?}", service.check_health().await?);
//! service.stop().await?;
//! ```

pub mod clients;
pub mod communication;
pub mod config;
pub mod devices;
pub mod tags;

pub use communication::CommunicationService;
pub use config::{CommunicationConfig, HardwareConfig};
pub use devices::{DeviceService, EquipmentService, FeederService, MotionService};
pub use tags::{TagCacheService, TagFilter, TagMappingService, TransportClients};
