//! Scene data model
//!
//! The latest-known display state derived from telemetry. Plain data: the
//! synchronizer and the update loop write it, renderers only read it.

use serde::{Deserialize, Serialize};

use crate::foundation::collections::BoundedVec;
use crate::foundation::math::{default_extrinsic, Mat4, Rect, Vec2};

/// Maximum points in one projected lane/path polyline.
///
/// A ribbon built from one polyline has two vertices per point, which keeps it
/// within [`crate::render::geometry::MAX_POLYGON_VERTICES`].
pub const PATH_POINT_CAPACITY: usize = 49;

/// Number of independently tracked leads
pub const LEAD_TRACK_COUNT: usize = 2;

/// Projected polyline in full-frame camera pixels, nearest point first
pub type Polyline = BoundedVec<Vec2, PATH_POINT_CAPACITY>;

/// Lane and path polylines after projection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathGeometry {
    /// Left lane line
    pub left_lane: Polyline,
    /// Predicted path centerline
    pub path: Polyline,
    /// Right lane line
    pub right_lane: Polyline,
}

impl PathGeometry {
    /// Drop all points
    pub fn clear(&mut self) {
        self.left_lane.clear();
        self.path.clear();
        self.right_lane.clear();
    }
}

/// Relative position and speed of a tracked lead vehicle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeadMeasurement {
    /// Longitudinal distance in meters
    pub d_rel: f32,
    /// Lateral offset in meters, positive to the left
    pub y_rel: f32,
    /// Relative velocity in m/s
    pub v_rel: f32,
}

impl LeadMeasurement {
    /// All components are finite and the lead is ahead
    pub fn is_plausible(&self) -> bool {
        self.d_rel.is_finite() && self.y_rel.is_finite() && self.v_rel.is_finite() && self.d_rel >= 0.0
    }
}

/// One lead track. Measurements exist only while the lead is tracked.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum LeadTrack {
    /// No lead
    #[default]
    NotTracked,
    /// Lead present with its latest measurement
    Tracked(LeadMeasurement),
}

impl LeadTrack {
    /// Build from a radar status flag and raw values
    pub fn from_radar(status: bool, d_rel: f32, y_rel: f32, v_rel: f32) -> Self {
        if status {
            Self::Tracked(LeadMeasurement { d_rel, y_rel, v_rel })
        } else {
            Self::NotTracked
        }
    }

    /// Whether a lead is tracked
    pub fn is_tracked(&self) -> bool {
        matches!(self, Self::Tracked(_))
    }

    /// The measurement, if tracked
    pub fn measurement(&self) -> Option<&LeadMeasurement> {
        match self {
            Self::Tracked(m) => Some(m),
            Self::NotTracked => None,
        }
    }

    /// Longitudinal distance, if tracked
    pub fn d_rel(&self) -> Option<f32> {
        self.measurement().map(|m| m.d_rel)
    }

    /// Lateral offset, if tracked
    pub fn y_rel(&self) -> Option<f32> {
        self.measurement().map(|m| m.y_rel)
    }

    /// Relative velocity, if tracked
    pub fn v_rel(&self) -> Option<f32> {
        self.measurement().map(|m| m.v_rel)
    }
}

/// Steering, blinker and body telemetry
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SteeringState {
    /// Current steering wheel angle in degrees
    pub angle_steers: f32,
    /// Desired steering wheel angle in degrees
    pub angle_steers_des: f32,
    /// Steering ratio
    pub steer_ratio: f32,
    /// Driver is overriding the steering
    pub steer_override: bool,
    /// Left blinker on
    pub left_blinker: bool,
    /// Right blinker on
    pub right_blinker: bool,
    /// Tick counter cycling while a blinker is on
    pub blinker_blink_counter: u32,
    /// Brake lights on
    pub brake_lights: bool,
    /// Vehicle in the left blind spot
    pub left_blindspot: bool,
    /// Vehicle in the right blind spot
    pub right_blindspot: bool,
    /// Ego speed in m/s
    pub v_ego: f32,
}

/// How much of the display an alert occupies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AlertSize {
    /// No alert
    #[default]
    None,
    /// Single line banner
    Small,
    /// Two line banner
    Mid,
    /// Full screen
    Full,
}

/// Severity of the active alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AlertStatus {
    /// Informational
    #[default]
    Normal,
    /// Driver attention requested
    UserPrompt,
    /// Driver must take over
    Critical,
}

/// The single alert slot of the scene
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Alert {
    /// First line of text
    pub text1: String,
    /// Second line of text
    pub text2: String,
    /// Category tag, e.g. `"steerSaturated/warning"`
    pub alert_type: String,
    /// Display size
    pub size: AlertSize,
    /// Severity
    pub status: AlertStatus,
    /// Blink rate requested by the producer; zero means steady
    pub blinking_rate: f32,
}

impl Alert {
    /// Whether the alert occupies any display area
    pub fn is_active(&self) -> bool {
        self.size != AlertSize::None
    }

    /// Whether the alert text should blink
    pub fn is_blinking(&self) -> bool {
        self.is_active() && self.blinking_rate > 0.0
    }
}

/// Vehicle interface hardware variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HwType {
    /// Unknown or not reporting
    #[default]
    Unknown,
    /// White panda
    WhitePanda,
    /// Grey panda
    GreyPanda,
    /// Black panda
    BlackPanda,
    /// Pedal interceptor
    Pedal,
    /// Uno
    Uno,
    /// Dos
    Dos,
}

/// Remote link status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetStatus {
    /// Recent ping
    Connected,
    /// No ping recorded
    #[default]
    Disconnected,
    /// Ping too old
    Error,
}

/// Connectivity and device health
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Connectivity {
    /// Hardware type
    pub hw_type: HwType,
    /// GNSS satellites in view
    pub satellite_count: u32,
    /// Remote link status
    pub athena_status: NetStatus,
    /// Hottest CPU core in degrees Celsius
    pub max_cpu_temp: f32,
    /// Battery charge percentage
    pub battery_percent: i32,
    /// Battery charging
    pub battery_charging: bool,
    /// Battery status text
    pub battery_status: String,
}

/// Driver monitoring view state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DriverView {
    /// Right-hand drive vehicle
    pub is_rhd: bool,
    /// Driver camera preview active
    pub frontview: bool,
    /// Driver face detected
    pub face_detected: bool,
}

/// Application shown next to the visualization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ActiveApp {
    /// Home screen
    #[default]
    Home,
    /// Music
    Music,
    /// Navigation
    Nav,
    /// Settings
    Settings,
    /// Nothing, full visualization
    None,
}

/// Layout state of the screen
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayoutState {
    /// Sidebar collapsed
    pub sidebar_collapsed: bool,
    /// Active application
    pub active_app: ActiveApp,
    /// Visualization region, always inside the display bounds
    pub viz_rect: Rect,
}

/// Per-tick aggregated display state
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    /// Projected lane and path polylines
    pub path: PathGeometry,
    /// Lead tracks, primary first
    pub leads: [LeadTrack; LEAD_TRACK_COUNT],
    /// Full-frame pixel position of each tracked lead
    pub lead_screen: [Option<Vec2>; LEAD_TRACK_COUNT],
    /// Controls engaged
    pub engaged: bool,
    /// Steering and body telemetry
    pub steering: SteeringState,
    /// The active alert
    pub alert: Alert,
    /// Connectivity and hardware
    pub connectivity: Connectivity,
    /// Driver monitoring
    pub driver: DriverView,
    /// Layout
    pub layout: LayoutState,
    /// Car-space to camera-frame transform; last row is `[0, 0, 0, 1]`
    pub extrinsic: Mat4,
    /// Whether 3D overlays may be drawn
    pub world_objects_visible: bool,
}

impl Default for Scene {
    fn default() -> Self {
        Self {
            path: PathGeometry::default(),
            leads: [LeadTrack::NotTracked; LEAD_TRACK_COUNT],
            lead_screen: [None; LEAD_TRACK_COUNT],
            engaged: false,
            steering: SteeringState::default(),
            alert: Alert::default(),
            connectivity: Connectivity::default(),
            driver: DriverView::default(),
            layout: LayoutState::default(),
            extrinsic: default_extrinsic(),
            world_objects_visible: false,
        }
    }
}

impl Scene {
    /// Forget everything that only makes sense while driving
    pub fn clear_onroad_state(&mut self) {
        self.leads = [LeadTrack::NotTracked; LEAD_TRACK_COUNT];
        self.lead_screen = [None; LEAD_TRACK_COUNT];
        self.alert = Alert::default();
    }

    /// Set the alert, replacing whatever was shown
    pub fn set_alert(&mut self, text1: &str, text2: &str, size: AlertSize, status: AlertStatus) {
        self.alert.text1 = text1.to_string();
        self.alert.text2 = text2.to_string();
        self.alert.size = size;
        self.alert.status = status;
        self.alert.blinking_rate = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lead_untracked_has_no_values() {
        let lead = LeadTrack::from_radar(false, 30.0, 1.0, -2.0);
        assert!(!lead.is_tracked());
        assert_eq!(lead.d_rel(), None);
        assert_eq!(lead.y_rel(), None);
        assert_eq!(lead.v_rel(), None);
    }

    #[test]
    fn test_lead_tracked_exposes_values() {
        let lead = LeadTrack::from_radar(true, 30.0, 1.0, -2.0);
        assert_eq!(lead.d_rel(), Some(30.0));
        assert_eq!(lead.v_rel(), Some(-2.0));
    }

    #[test]
    fn test_clear_onroad_state_drops_leads_and_alert() {
        let mut scene = Scene::default();
        scene.leads[0] = LeadTrack::from_radar(true, 10.0, 0.0, 0.0);
        scene.set_alert("TAKE CONTROL", "", AlertSize::Full, AlertStatus::Critical);
        scene.clear_onroad_state();
        assert!(!scene.leads[0].is_tracked());
        assert!(!scene.alert.is_active());
        assert!(scene.alert.text1.is_empty());
    }

    #[test]
    fn test_alert_blinking_requires_active_alert() {
        let mut alert = Alert { blinking_rate: 1.0, ..Alert::default() };
        assert!(!alert.is_blinking());
        alert.size = AlertSize::Small;
        assert!(alert.is_blinking());
    }
}
