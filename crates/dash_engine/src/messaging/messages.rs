//! Typed telemetry messages
//!
//! Only the fields the dashboard reads are carried. Each message type is bound
//! to exactly one [`Topic`].

use serde::{Deserialize, Serialize};

use super::Topic;
use crate::scene::{ActiveApp, AlertSize, AlertStatus, HwType};

/// A payload that travels on a single topic
pub trait Message: Serialize + for<'de> Deserialize<'de> {
    /// The topic this message is published on
    const TOPIC: Topic;
}

/// Controls daemon state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlsState {
    /// Controls engaged
    pub enabled: bool,
    /// First alert line
    pub alert_text1: String,
    /// Second alert line
    pub alert_text2: String,
    /// Alert category tag
    pub alert_type: String,
    /// Alert size
    pub alert_size: AlertSize,
    /// Alert severity
    pub alert_status: AlertStatus,
    /// Requested blink rate, zero for steady text
    pub alert_blinking_rate: f32,
    /// Steering wheel angle in degrees
    pub angle_steers: f32,
    /// Desired steering wheel angle in degrees
    pub angle_steers_des: f32,
    /// Driver steering override
    pub steer_override: bool,
    /// Ego speed in m/s
    pub v_ego: f32,
}

impl Message for ControlsState {
    const TOPIC: Topic = Topic::ControlsState;
}

/// One radar lead
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RadarLead {
    /// Lead present
    pub status: bool,
    /// Longitudinal distance in meters
    pub d_rel: f32,
    /// Lateral offset in meters
    pub y_rel: f32,
    /// Relative velocity in m/s
    pub v_rel: f32,
}

/// Radar fusion output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RadarState {
    /// Primary lead
    pub lead_one: RadarLead,
    /// Secondary lead
    pub lead_two: RadarLead,
}

impl Message for RadarState {
    const TOPIC: Topic = Topic::RadarState;
}

/// Driver monitoring output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DriverMonitoringState {
    /// Right-hand drive
    pub is_rhd: bool,
    /// Driver camera preview requested
    pub is_preview: bool,
    /// Face detected
    pub face_detected: bool,
}

impl Message for DriverMonitoringState {
    const TOPIC: Topic = Topic::DriverMonitoringState;
}

/// Device thermal and power state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThermalData {
    /// Per-core CPU temperatures in degrees Celsius
    pub cpu_temps: Vec<f32>,
    /// Battery charge percentage
    pub battery_percent: i32,
    /// Battery charging
    pub battery_charging: bool,
    /// Battery status text
    pub battery_status: String,
    /// Drive session started
    pub started: bool,
}

impl ThermalData {
    /// Hottest core, zero when no cores are reported
    pub fn max_cpu_temp(&self) -> f32 {
        self.cpu_temps.iter().copied().fold(0.0, f32::max)
    }
}

impl Message for ThermalData {
    const TOPIC: Topic = Topic::ThermalData;
}

/// One predicted line in car space
///
/// `points[i]` is the lateral offset in meters at `i` meters ahead.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathData {
    /// Lateral offsets, one per meter ahead
    pub points: Vec<f32>,
    /// Confidence in `[0, 1]`
    pub prob: f32,
    /// Standard deviation of the offsets
    pub std: f32,
}

/// Driving model output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelOutput {
    /// Left lane line
    pub left_lane: PathData,
    /// Planned path
    pub path: PathData,
    /// Right lane line
    pub right_lane: PathData,
}

impl Message for ModelOutput {
    const TOPIC: Topic = Topic::ModelOutput;
}

/// Layout requests from the UI shell
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UiLayoutState {
    /// Application to show
    pub active_app: ActiveApp,
    /// Sidebar collapsed
    pub sidebar_collapsed: bool,
}

impl Message for UiLayoutState {
    const TOPIC: Topic = Topic::UiLayoutState;
}

/// Vehicle interface health
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthData {
    /// Interface hardware
    pub hw_type: HwType,
    /// Ignition sensed on the ignition line
    pub ignition_line: bool,
    /// Ignition sensed on the CAN bus
    pub ignition_can: bool,
}

impl HealthData {
    /// Ignition from either source
    pub fn ignition(&self) -> bool {
        self.ignition_line || self.ignition_can
    }
}

impl Message for HealthData {
    const TOPIC: Topic = Topic::HealthData;
}

/// Body and signal state of the car
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CarState {
    /// Left blinker
    pub left_blinker: bool,
    /// Right blinker
    pub right_blinker: bool,
    /// Brake lights
    pub brake_lights: bool,
    /// Vehicle in left blind spot
    pub left_blindspot: bool,
    /// Vehicle in right blind spot
    pub right_blindspot: bool,
    /// Steering ratio
    pub steer_ratio: f32,
}

impl Message for CarState {
    const TOPIC: Topic = Topic::CarState;
}

/// Static car capabilities
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CarParams {
    /// Longitudinal control is available
    pub openpilot_longitudinal_control: bool,
}

impl Message for CarParams {
    const TOPIC: Topic = Topic::CarParams;
}

/// Road camera calibration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveCalibration {
    /// Extrinsic matrix, 3 rows of 4 in row-major order
    pub extrinsic_matrix: Vec<f32>,
}

impl Message for LiveCalibration {
    const TOPIC: Topic = Topic::LiveCalibration;
}

/// Satellite fix summary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GnssMeasurements {
    /// Satellites in view
    pub satellite_count: u32,
}

impl Message for GnssMeasurements {
    const TOPIC: Topic = Topic::Gnss;
}

/// Ambient sensor readings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorEvents {
    /// Ambient light, raw sensor units
    pub light: f32,
}

impl Message for SensorEvents {
    const TOPIC: Topic = Topic::Sensors;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_cpu_temp() {
        let thermal = ThermalData { cpu_temps: vec![41.0, 57.5, 49.0], ..ThermalData::default() };
        assert_eq!(thermal.max_cpu_temp(), 57.5);
        assert_eq!(ThermalData::default().max_cpu_temp(), 0.0);
    }

    #[test]
    fn test_ignition_from_either_source() {
        let health = HealthData { ignition_can: true, ..HealthData::default() };
        assert!(health.ignition());
        assert!(!HealthData::default().ignition());
    }
}
