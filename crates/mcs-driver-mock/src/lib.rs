//! Simulated Hardware Clients
//!
//! In-process stand-ins for the two hardware transports, used when the real
//! controller or feeder link is unreachable and in tests. All simulated
//! clients use async-safe delays (tokio::time::sleep) in realistic mode.
//!
//! # Available Simulated Clients
//!
//! - [`SimulatedRegisterClient`] - register controller image with 12-bit analog clamping
//! - [`SimulatedVariableClient`] - feeder controller P variables with firmware folding
//!
//! Both implement [`mcs_core::HardwareClient`] with the same contract as the
//! real clients. `connect`/`disconnect` never fail; reads and writes require
//! a connected client.

pub mod common;
mod register;
mod variable;

pub use common::{MockMode, TimingConfig};
pub use register::{RegisterProfile, SimulatedRegisterClient, ANALOG_FULL_SCALE};
pub use variable::{SimulatedVariableClient, VariableProfile, FEEDER_START, FEEDER_STOP};
