//! Common infrastructure for simulated clients.
//!
//! - **mode**: Operational modes (Instant, Realistic)
//! - **timing**: Link-like latency for realistic mode

pub mod mode;
pub mod timing;

pub use mode::MockMode;
pub use timing::TimingConfig;
