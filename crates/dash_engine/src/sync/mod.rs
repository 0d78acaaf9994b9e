//! # State Synchronizer
//!
//! Drains every subscribed topic once per tick and applies each message to the
//! scene fields that topic owns. Topics without new messages keep their last
//! values. A payload that fails to decode or validate is logged, counted and
//! skipped without touching any field.

pub mod groups;

pub use groups::UpdatedGroups;

use crate::foundation::collections::fill_clipped;
use crate::foundation::math::{extrinsic_from_rows, CameraIntrinsics, Mat4, Vec3};
use crate::messaging::{
    decode, CarParams, CarState, ControlsState, DecodeError, DriverMonitoringState, GnssMeasurements,
    HealthData, LiveCalibration, MessageBus, ModelOutput, PathData, RadarState, SensorEvents,
    ThermalData, Topic, UiLayoutState,
};
use crate::scene::{LeadTrack, Polyline, Scene};

/// Upper bound on payloads taken from one topic in one pass; the rest wait for the next tick
pub const MAX_DRAIN_PER_TOPIC: usize = 64;

/// Session-level signals written by telemetry and read by the update loop
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSignals {
    /// Ignition reported by the vehicle interface
    pub ignition: bool,
    /// Drive session started, reported by the thermal daemon
    pub started: bool,
    /// Longitudinal control available on this car
    pub longitudinal_control: bool,
    /// Latest ambient light reading
    pub light_level: f32,
}

/// Applies bus traffic to the scene
#[derive(Debug, Clone)]
pub struct StateSynchronizer {
    intrinsics: CameraIntrinsics,
    last_received: [Option<u64>; Topic::COUNT],
    decode_failures: [u64; Topic::COUNT],
}

impl StateSynchronizer {
    /// Create a synchronizer projecting model output with `intrinsics`
    pub fn new(intrinsics: CameraIntrinsics) -> Self {
        Self {
            intrinsics,
            last_received: [None; Topic::COUNT],
            decode_failures: [0; Topic::COUNT],
        }
    }

    /// Drain all topics and apply what arrived.
    ///
    /// Messages on one topic are applied in arrival order, so the newest wins.
    /// Returns the groups that received at least one valid message.
    pub fn sync(
        &mut self,
        bus: &mut dyn MessageBus,
        scene: &mut Scene,
        signals: &mut SessionSignals,
        frame: u64,
    ) -> UpdatedGroups {
        let mut updated = UpdatedGroups::empty();

        for topic in Topic::ALL {
            for _ in 0..MAX_DRAIN_PER_TOPIC {
                let Some(payload) = bus.try_receive(topic) else {
                    break;
                };
                match self.apply(topic, &payload, scene, signals) {
                    Ok(()) => {
                        updated |= UpdatedGroups::for_topic(topic);
                        self.last_received[topic.index()] = Some(frame);
                    }
                    Err(err) => {
                        self.decode_failures[topic.index()] += 1;
                        log::warn!("{} (failure #{} on this topic)", err, self.decode_failures[topic.index()]);
                    }
                }
            }
        }

        updated
    }

    /// Frame of the last valid message on `topic`
    pub fn last_received(&self, topic: Topic) -> Option<u64> {
        self.last_received[topic.index()]
    }

    /// Ticks since the last valid message on `topic`, `None` if never received
    pub fn age(&self, topic: Topic, frame: u64) -> Option<u64> {
        self.last_received(topic).map(|at| frame.saturating_sub(at))
    }

    /// Number of payloads rejected on `topic`
    pub fn decode_failures(&self, topic: Topic) -> u64 {
        self.decode_failures[topic.index()]
    }

    fn apply(
        &self,
        topic: Topic,
        payload: &[u8],
        scene: &mut Scene,
        signals: &mut SessionSignals,
    ) -> Result<(), DecodeError> {
        match topic {
            Topic::ControlsState => apply_controls(decode(payload)?, scene),
            Topic::RadarState => apply_radar(&decode(payload)?, scene),
            Topic::DriverMonitoringState => {
                let msg: DriverMonitoringState = decode(payload)?;
                scene.driver.is_rhd = msg.is_rhd;
                scene.driver.frontview = msg.is_preview;
                scene.driver.face_detected = msg.face_detected;
            }
            Topic::ThermalData => {
                let msg: ThermalData = decode(payload)?;
                let connectivity = &mut scene.connectivity;
                connectivity.max_cpu_temp = msg.max_cpu_temp();
                connectivity.battery_percent = msg.battery_percent;
                connectivity.battery_charging = msg.battery_charging;
                connectivity.battery_status = msg.battery_status;
                signals.started = msg.started;
            }
            Topic::ModelOutput => self.apply_model(&decode(payload)?, scene),
            Topic::UiLayoutState => {
                let msg: UiLayoutState = decode(payload)?;
                scene.layout.active_app = msg.active_app;
                scene.layout.sidebar_collapsed = msg.sidebar_collapsed;
            }
            Topic::HealthData => {
                let msg: HealthData = decode(payload)?;
                scene.connectivity.hw_type = msg.hw_type;
                signals.ignition = msg.ignition();
            }
            Topic::CarState => {
                let msg: CarState = decode(payload)?;
                let steering = &mut scene.steering;
                steering.left_blinker = msg.left_blinker;
                steering.right_blinker = msg.right_blinker;
                steering.brake_lights = msg.brake_lights;
                steering.left_blindspot = msg.left_blindspot;
                steering.right_blindspot = msg.right_blindspot;
                steering.steer_ratio = msg.steer_ratio;
            }
            Topic::CarParams => {
                let msg: CarParams = decode(payload)?;
                signals.longitudinal_control = msg.openpilot_longitudinal_control;
            }
            Topic::LiveCalibration => {
                let msg: LiveCalibration = decode(payload)?;
                scene.extrinsic = calibration_matrix(&msg)?;
                scene.world_objects_visible = true;
            }
            Topic::Gnss => {
                let msg: GnssMeasurements = decode(payload)?;
                scene.connectivity.satellite_count = msg.satellite_count;
            }
            Topic::Sensors => {
                let msg: SensorEvents = decode(payload)?;
                if !msg.light.is_finite() {
                    return Err(DecodeError::Malformed {
                        topic,
                        reason: format!("light level {} is not finite", msg.light),
                    });
                }
                signals.light_level = msg.light;
            }
        }
        Ok(())
    }

    fn apply_model(&self, msg: &ModelOutput, scene: &mut Scene) {
        let extrinsic = scene.extrinsic;
        let path = &mut scene.path;
        let dropped = self.project_line(&msg.left_lane, &extrinsic, &mut path.left_lane)
            + self.project_line(&msg.path, &extrinsic, &mut path.path)
            + self.project_line(&msg.right_lane, &extrinsic, &mut path.right_lane);
        if dropped > 0 {
            log::trace!("Clipped {} model points beyond polyline capacity", dropped);
        }
    }

    /// Project one car-space line, dropping points that are not visible
    fn project_line(&self, line: &PathData, extrinsic: &Mat4, out: &mut Polyline) -> usize {
        let projected = line
            .points
            .iter()
            .enumerate()
            .filter_map(|(i, &y)| self.intrinsics.project(extrinsic, Vec3::new(i as f32, y, 0.0)));
        fill_clipped(out, projected)
    }
}

fn apply_controls(msg: ControlsState, scene: &mut Scene) {
    scene.engaged = msg.enabled;

    let alert = &mut scene.alert;
    alert.text1 = msg.alert_text1;
    alert.text2 = msg.alert_text2;
    alert.alert_type = msg.alert_type;
    alert.size = msg.alert_size;
    alert.status = msg.alert_status;
    alert.blinking_rate = msg.alert_blinking_rate;

    let steering = &mut scene.steering;
    steering.angle_steers = msg.angle_steers;
    steering.angle_steers_des = msg.angle_steers_des;
    steering.steer_override = msg.steer_override;
    steering.v_ego = msg.v_ego;
}

fn apply_radar(msg: &RadarState, scene: &mut Scene) {
    for (track, lead) in scene.leads.iter_mut().zip([&msg.lead_one, &msg.lead_two]) {
        *track = LeadTrack::from_radar(lead.status, lead.d_rel, lead.y_rel, lead.v_rel);
    }
}

fn calibration_matrix(msg: &LiveCalibration) -> Result<Mat4, DecodeError> {
    let malformed = |reason: String| DecodeError::Malformed { topic: Topic::LiveCalibration, reason };

    let rows: &[f32; 12] = msg
        .extrinsic_matrix
        .as_slice()
        .try_into()
        .map_err(|_| malformed(format!("expected 12 extrinsic values, got {}", msg.extrinsic_matrix.len())))?;
    if rows.iter().any(|v| !v.is_finite()) {
        return Err(malformed("extrinsic contains non-finite values".to_string()));
    }
    Ok(extrinsic_from_rows(rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::default_extrinsic;
    use crate::messaging::{encode, Message, RadarLead};
    use crate::scene::{AlertSize, AlertStatus, HwType, PATH_POINT_CAPACITY};
    use std::collections::{HashMap, VecDeque};

    #[derive(Default)]
    struct MockBus {
        queues: HashMap<Topic, VecDeque<Vec<u8>>>,
    }

    impl MockBus {
        fn push<M: Message>(&mut self, msg: &M) {
            self.push_raw(M::TOPIC, encode(msg).unwrap());
        }

        fn push_raw(&mut self, topic: Topic, payload: Vec<u8>) {
            self.queues.entry(topic).or_default().push_back(payload);
        }
    }

    impl MessageBus for MockBus {
        fn try_receive(&mut self, topic: Topic) -> Option<Vec<u8>> {
            self.queues.get_mut(&topic)?.pop_front()
        }
    }

    fn synchronizer() -> StateSynchronizer {
        StateSynchronizer::new(CameraIntrinsics { focal_length: 910.0, frame_width: 1164.0, frame_height: 874.0 })
    }

    #[test]
    fn test_last_write_wins_within_a_pass() {
        let mut bus = MockBus::default();
        bus.push(&GnssMeasurements { satellite_count: 4 });
        bus.push(&GnssMeasurements { satellite_count: 11 });

        let mut scene = Scene::default();
        let mut signals = SessionSignals::default();
        let updated = synchronizer().sync(&mut bus, &mut scene, &mut signals, 1);

        assert_eq!(updated, UpdatedGroups::GNSS);
        assert_eq!(scene.connectivity.satellite_count, 11);
    }

    #[test]
    fn test_quiet_topic_keeps_stale_values() {
        let mut sync = synchronizer();
        let mut bus = MockBus::default();
        let mut scene = Scene::default();
        let mut signals = SessionSignals::default();

        bus.push(&ThermalData { battery_percent: 80, started: true, ..ThermalData::default() });
        sync.sync(&mut bus, &mut scene, &mut signals, 1);
        let updated = sync.sync(&mut bus, &mut scene, &mut signals, 2);

        assert!(updated.is_empty());
        assert_eq!(scene.connectivity.battery_percent, 80);
        assert!(signals.started);
        assert_eq!(sync.last_received(Topic::ThermalData), Some(1));
        assert_eq!(sync.age(Topic::ThermalData, 5), Some(4));
    }

    #[test]
    fn test_decode_failure_is_isolated_to_its_topic() {
        let mut sync = synchronizer();
        let mut scene = Scene::default();
        let mut signals = SessionSignals::default();
        let mut bus = MockBus::default();
        bus.push(&HealthData { hw_type: HwType::BlackPanda, ..HealthData::default() });
        bus.push(&ControlsState { enabled: true, ..ControlsState::default() });
        sync.sync(&mut bus, &mut scene, &mut signals, 1);

        bus.push_raw(Topic::ControlsState, vec![0xde, 0xad]);
        bus.push(&HealthData { hw_type: HwType::Uno, ignition_line: true, ..HealthData::default() });
        let updated = sync.sync(&mut bus, &mut scene, &mut signals, 2);

        assert_eq!(updated, UpdatedGroups::HEALTH);
        assert!(scene.engaged);
        assert_eq!(scene.connectivity.hw_type, HwType::Uno);
        assert!(signals.ignition);
        assert_eq!(sync.decode_failures(Topic::ControlsState), 1);
        assert_eq!(sync.last_received(Topic::ControlsState), Some(1));
    }

    #[test]
    fn test_controls_state_fills_alert_slot() {
        let mut bus = MockBus::default();
        bus.push(&ControlsState {
            enabled: true,
            alert_text1: "TAKE CONTROL".to_string(),
            alert_size: AlertSize::Full,
            alert_status: AlertStatus::Critical,
            alert_blinking_rate: 1.0,
            ..ControlsState::default()
        });
        let mut scene = Scene::default();
        synchronizer().sync(&mut bus, &mut scene, &mut SessionSignals::default(), 1);

        assert!(scene.alert.is_blinking());
        assert_eq!(scene.alert.status, AlertStatus::Critical);
    }

    #[test]
    fn test_radar_untracked_lead_has_no_values() {
        let mut sync = synchronizer();
        let mut scene = Scene::default();
        let mut signals = SessionSignals::default();
        let mut bus = MockBus::default();

        let tracked = RadarLead { status: true, d_rel: 25.0, y_rel: 0.5, v_rel: -1.0 };
        bus.push(&RadarState { lead_one: tracked, lead_two: tracked });
        sync.sync(&mut bus, &mut scene, &mut signals, 1);
        assert_eq!(scene.leads[0].d_rel(), Some(25.0));

        bus.push(&RadarState { lead_one: RadarLead { status: false, ..tracked }, lead_two: tracked });
        sync.sync(&mut bus, &mut scene, &mut signals, 2);
        assert_eq!(scene.leads[0].d_rel(), None);
        assert_eq!(scene.leads[0].y_rel(), None);
        assert_eq!(scene.leads[1].v_rel(), Some(-1.0));
    }

    #[test]
    fn test_calibration_with_wrong_length_is_rejected() {
        let mut sync = synchronizer();
        let mut bus = MockBus::default();
        bus.push(&LiveCalibration { extrinsic_matrix: vec![1.0; 9] });

        let mut scene = Scene::default();
        let updated = sync.sync(&mut bus, &mut scene, &mut SessionSignals::default(), 1);

        assert!(updated.is_empty());
        assert_eq!(scene.extrinsic, default_extrinsic());
        assert!(!scene.world_objects_visible);
        assert_eq!(sync.decode_failures(Topic::LiveCalibration), 1);
    }

    #[test]
    fn test_calibration_makes_world_objects_visible() {
        let mut bus = MockBus::default();
        let rows = [0.0, -1.0, 0.0, 0.0, 0.0, 0.0, -1.0, 1.3, 1.0, 0.0, 0.0, 0.0];
        bus.push(&LiveCalibration { extrinsic_matrix: rows.to_vec() });

        let mut scene = Scene::default();
        synchronizer().sync(&mut bus, &mut scene, &mut SessionSignals::default(), 1);

        assert!(scene.world_objects_visible);
        assert_eq!(scene.extrinsic[(1, 3)], 1.3);
        assert_eq!(scene.extrinsic[(3, 3)], 1.0);
    }

    #[test]
    fn test_model_points_are_projected_and_clipped() {
        let mut bus = MockBus::default();
        let line = PathData { points: vec![0.0; 80], prob: 1.0, std: 0.1 };
        bus.push(&ModelOutput { left_lane: line.clone(), path: line.clone(), right_lane: PathData::default() });

        let mut scene = Scene::default();
        synchronizer().sync(&mut bus, &mut scene, &mut SessionSignals::default(), 1);

        assert_eq!(scene.path.path.len(), PATH_POINT_CAPACITY);
        assert_eq!(scene.path.left_lane.len(), PATH_POINT_CAPACITY);
        assert!(scene.path.right_lane.is_empty());
        // nearest visible point is lowest on screen
        let ys: Vec<f32> = scene.path.path.iter().map(|p| p.y).collect();
        assert!(ys.windows(2).all(|w| w[0] > w[1]));
    }

    #[test]
    fn test_drain_is_bounded_per_pass() {
        let mut bus = MockBus::default();
        for i in 0..(MAX_DRAIN_PER_TOPIC as u32 + 5) {
            bus.push(&GnssMeasurements { satellite_count: i });
        }
        let mut scene = Scene::default();
        let mut sync = synchronizer();
        sync.sync(&mut bus, &mut scene, &mut SessionSignals::default(), 1);
        assert_eq!(scene.connectivity.satellite_count, MAX_DRAIN_PER_TOPIC as u32 - 1);
        sync.sync(&mut bus, &mut scene, &mut SessionSignals::default(), 2);
        assert_eq!(scene.connectivity.satellite_count, MAX_DRAIN_PER_TOPIC as u32 + 4);
    }
}
