//! Field groups reported by a synchronization pass

use bitflags::bitflags;

use crate::messaging::Topic;

bitflags! {
    /// Scene field groups, one per topic that owns them
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct UpdatedGroups: u16 {
        /// Engagement, alert, steering angles
        const CONTROLS = 1 << 0;
        /// Lead tracks
        const RADAR = 1 << 1;
        /// Driver view
        const DRIVER_MONITORING = 1 << 2;
        /// Temperatures, battery, started flag
        const THERMAL = 1 << 3;
        /// Lane and path polylines
        const MODEL = 1 << 4;
        /// Active app and sidebar
        const LAYOUT = 1 << 5;
        /// Hardware type and ignition
        const HEALTH = 1 << 6;
        /// Blinkers, brake lights, blind spots
        const CAR_STATE = 1 << 7;
        /// Longitudinal control availability
        const CAR_PARAMS = 1 << 8;
        /// Extrinsic calibration
        const CALIBRATION = 1 << 9;
        /// Satellite count
        const GNSS = 1 << 10;
        /// Ambient light
        const SENSORS = 1 << 11;
    }
}

impl UpdatedGroups {
    /// The group owned by `topic`
    pub const fn for_topic(topic: Topic) -> Self {
        match topic {
            Topic::ControlsState => Self::CONTROLS,
            Topic::RadarState => Self::RADAR,
            Topic::DriverMonitoringState => Self::DRIVER_MONITORING,
            Topic::ThermalData => Self::THERMAL,
            Topic::ModelOutput => Self::MODEL,
            Topic::UiLayoutState => Self::LAYOUT,
            Topic::HealthData => Self::HEALTH,
            Topic::CarState => Self::CAR_STATE,
            Topic::CarParams => Self::CAR_PARAMS,
            Topic::LiveCalibration => Self::CALIBRATION,
            Topic::Gnss => Self::GNSS,
            Topic::Sensors => Self::SENSORS,
        }
    }
}
