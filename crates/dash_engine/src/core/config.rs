//! # Dashboard Configuration
//!
//! All tunables of the fusion core in one serializable structure. Every
//! section has working defaults so an embedder can start from
//! `DashboardConfig::default()` and override only what differs on its device.
//!
//! ## Sections
//!
//! - **Display**: physical framebuffer size and sidebar/border layout
//! - **Timing**: loop rate, lateness threshold, blink periods, staleness timeouts
//! - **Camera**: road camera intrinsics, per-viewport zoom, frame slot count
//! - **Geometry**: overlay ribbon widths
//! - **Params**: location of the persistent parameter store

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{Config, ConfigError};
use crate::foundation::math::CameraIntrinsics;

/// Largest frame ring the vision manager accepts
pub const MAX_FRAME_SLOTS: usize = 8;

/// Physical display layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Framebuffer width in pixels
    pub width: i32,
    /// Framebuffer height in pixels
    pub height: i32,
    /// Width of the expanded sidebar
    pub sidebar_width: i32,
    /// Border around the visualization area
    pub border: i32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            sidebar_width: 300,
            border: 10,
        }
    }
}

/// Loop cadence and staleness timeouts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Target tick rate
    pub ui_freq_hz: u32,
    /// Wall-clock gap between ticks that counts as the scheduler falling behind
    pub late_tick_threshold_ms: u64,
    /// Ticks between alert visibility toggles while blinking
    pub alert_blink_period_ticks: u32,
    /// Ticks of one full blinker on/off cycle
    pub blinker_period_ticks: u32,
    /// Seconds after session start before missing controls raise an alert
    pub controls_start_timeout_s: u32,
    /// Seconds without controls-state before controls count as unresponsive
    pub controls_lag_timeout_s: u32,
    /// Seconds without health before the hardware type is reset
    pub health_timeout_s: u32,
    /// Seconds the display stays awake after the last activity
    pub display_timeout_s: u32,
    /// Period of the units parameter refresh
    pub metric_param_period_s: u32,
    /// Period of the remote-link ping parameter refresh
    pub athena_param_period_s: u32,
    /// Age after which the last remote-link ping counts as an error
    pub athena_ping_timeout_s: u32,
    /// Interval at which an unchanged layout is announced again
    pub layout_refresh_s: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            ui_freq_hz: 20,
            late_tick_threshold_ms: 66,
            alert_blink_period_ticks: 10,
            blinker_period_ticks: 20,
            controls_start_timeout_s: 10,
            controls_lag_timeout_s: 5,
            health_timeout_s: 5,
            display_timeout_s: 30,
            metric_param_period_s: 5,
            athena_param_period_s: 6,
            athena_ping_timeout_s: 70,
            layout_refresh_s: 2,
        }
    }
}

impl TimingConfig {
    /// Nominal tick period
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs(1) / self.ui_freq_hz.max(1)
    }

    /// Convert seconds to a tick count at the configured rate
    pub fn ticks(&self, seconds: u32) -> u64 {
        u64::from(seconds) * u64::from(self.ui_freq_hz)
    }

    /// Lateness threshold as a duration
    pub fn late_tick_threshold(&self) -> Duration {
        Duration::from_millis(self.late_tick_threshold_ms)
    }
}

/// Road camera and frame ring settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Full frame width in pixels
    pub frame_width: u32,
    /// Full frame height in pixels
    pub frame_height: u32,
    /// Focal length in pixels
    pub focal_length: f32,
    /// Zoom applied when mapping the road camera frame into the viewport
    pub rear_zoom: f32,
    /// Zoom applied when mapping the driver camera frame into the viewport
    pub front_zoom: f32,
    /// Number of frame slots in the texture ring
    pub slot_count: usize,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            frame_width: 1164,
            frame_height: 874,
            focal_length: 910.0,
            rear_zoom: 1.0,
            front_zoom: 1.0,
            slot_count: 4,
        }
    }
}

impl CameraConfig {
    /// Intrinsics used to project car-space geometry
    pub fn intrinsics(&self) -> CameraIntrinsics {
        CameraIntrinsics {
            focal_length: self.focal_length,
            frame_width: self.frame_width as f32,
            frame_height: self.frame_height as f32,
        }
    }
}

/// Overlay ribbon widths in screen pixels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryConfig {
    /// Half width of lane line ribbons at the near end
    pub lane_half_width_px: f32,
    /// Half width of the path ribbon at the near end
    pub path_half_width_px: f32,
    /// Lateral offset of the track markers from the path
    pub track_half_width_px: f32,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            lane_half_width_px: 3.0,
            path_half_width_px: 10.0,
            track_half_width_px: 14.0,
        }
    }
}

/// Persistent parameter store location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParamsConfig {
    /// Root directory of the file-backed store
    pub root: PathBuf,
}

impl Default for ParamsConfig {
    fn default() -> Self {
        Self { root: PathBuf::from("params") }
    }
}

/// # Dashboard Configuration
///
/// Top-level configuration of the fusion core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Display layout
    pub display: DisplayConfig,
    /// Loop timing
    pub timing: TimingConfig,
    /// Camera and frame ring
    pub camera: CameraConfig,
    /// Overlay geometry
    pub geometry: GeometryConfig,
    /// Parameter store
    pub params: ParamsConfig,
    /// Default log filter when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            display: DisplayConfig::default(),
            timing: TimingConfig::default(),
            camera: CameraConfig::default(),
            geometry: GeometryConfig::default(),
            params: ParamsConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl Config for DashboardConfig {}

impl DashboardConfig {
    /// Set the display size
    pub fn with_display_size(mut self, width: i32, height: i32) -> Self {
        self.display.width = width;
        self.display.height = height;
        self
    }

    /// Set the parameter store root
    pub fn with_params_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.params.root = root.into();
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.timing.ui_freq_hz == 0 {
            return invalid("ui_freq_hz must be at least 1".to_string());
        }

        if self.camera.slot_count == 0 || self.camera.slot_count > MAX_FRAME_SLOTS {
            return invalid(format!(
                "slot_count must be in 1..={}, got {}",
                MAX_FRAME_SLOTS, self.camera.slot_count
            ));
        }

        let d = &self.display;
        if d.border < 0 || d.sidebar_width < 0 {
            return invalid("border and sidebar_width must not be negative".to_string());
        }
        if d.width < 2 * d.border + d.sidebar_width + 1 || d.height < 2 * d.border + 1 {
            return invalid(format!(
                "display {}x{} too small for border {} and sidebar {}",
                d.width, d.height, d.border, d.sidebar_width
            ));
        }

        let c = &self.camera;
        if c.focal_length <= 0.0 || c.rear_zoom <= 0.0 || c.front_zoom <= 0.0 {
            return invalid("focal_length and zoom factors must be positive".to_string());
        }
        if c.frame_width == 0 || c.frame_height == 0 {
            return invalid("camera frame size must be non-zero".to_string());
        }

        Ok(())
    }
}
