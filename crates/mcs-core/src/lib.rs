//! `mcs-core`
//!
//! Core types for the hardware tag abstraction layer.
//!
//! Upper layers address hardware through symbolic tag paths such as
//! `gas_control.main_flow.setpoint`. This crate holds the vocabulary every
//! other crate shares:
//!
//! - [`TagValue`], [`TagType`], [`AccessMode`]: what a tag holds and who may write it
//! - [`TagMetadata`] / [`TagEntry`]: the data contract and cached state of a tag
//! - [`HardwareClient`]: the async transport contract implemented by the real
//!   and simulated clients
//! - [`McsError`]: the error type returned across the layer
//! - [`HealthReport`]: aggregated health of the running stack

pub mod client;
pub mod error;
pub mod health;
pub mod metadata;
pub mod value;

pub use client::{ConnectionState, HardwareClient, Transport};
pub use error::{HardwareError, HardwareErrorKind, McsError, McsResult, ValidationError};
pub use health::{HealthReport, HealthStatus};
pub use metadata::{TagEntry, TagMetadata, TagRange};
pub use value::{AccessMode, TagType, TagValue};
