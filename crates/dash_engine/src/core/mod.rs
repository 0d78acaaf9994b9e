//! # Core Module
//!
//! Shared configuration types used by every subsystem of the dashboard core.

pub mod config;

pub use config::{
    CameraConfig,
    DashboardConfig,
    DisplayConfig,
    GeometryConfig,
    ParamsConfig,
    TimingConfig,
    MAX_FRAME_SLOTS,
};
pub use crate::config::{Config, ConfigError};
