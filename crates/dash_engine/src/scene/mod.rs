//! Scene module
//!
//! The aggregated, renderer-readable snapshot of telemetry-derived state
//! and the screen layout rules that act on it.

pub mod layout;
pub mod model;

pub use layout::{apply_touch, classify_touch, viz_rect, TouchAction, HOME_BUTTON, SETTINGS_BUTTON};
pub use model::{
    ActiveApp, Alert, AlertSize, AlertStatus, Connectivity, DriverView, HwType, LayoutState,
    LeadMeasurement, LeadTrack, NetStatus, PathGeometry, Polyline, Scene, SteeringState,
    LEAD_TRACK_COUNT, PATH_POINT_CAPACITY,
};
