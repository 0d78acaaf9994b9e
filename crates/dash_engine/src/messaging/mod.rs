//! # Messaging
//!
//! The publish/subscribe boundary between telemetry producers and the
//! dashboard. Producers publish typed [`Message`]s; the synchronizer drains
//! raw payloads per [`Topic`] through the non-blocking [`MessageBus`] trait
//! and decodes them itself, so a malformed payload only affects its topic.

pub mod local;
pub mod messages;

pub use local::{BusPublisher, LocalBus, PublishError};
pub use messages::{
    CarParams, CarState, ControlsState, DriverMonitoringState, GnssMeasurements, HealthData,
    LiveCalibration, Message, ModelOutput, PathData, RadarLead, RadarState, SensorEvents,
    ThermalData, UiLayoutState,
};

use std::fmt;

/// Named bus channel carrying one message type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Controls daemon state
    ControlsState,
    /// Radar fusion output
    RadarState,
    /// Driver monitoring
    DriverMonitoringState,
    /// Thermal and power
    ThermalData,
    /// Driving model output
    ModelOutput,
    /// UI layout requests
    UiLayoutState,
    /// Vehicle interface health
    HealthData,
    /// Car body state
    CarState,
    /// Car capabilities
    CarParams,
    /// Camera calibration
    LiveCalibration,
    /// Satellite fix
    Gnss,
    /// Ambient sensors
    Sensors,
}

impl Topic {
    /// Number of topics
    pub const COUNT: usize = 12;

    /// Every topic, in drain order
    pub const ALL: [Topic; Topic::COUNT] = [
        Topic::ControlsState,
        Topic::RadarState,
        Topic::DriverMonitoringState,
        Topic::ThermalData,
        Topic::ModelOutput,
        Topic::UiLayoutState,
        Topic::HealthData,
        Topic::CarState,
        Topic::CarParams,
        Topic::LiveCalibration,
        Topic::Gnss,
        Topic::Sensors,
    ];

    /// Dense index in `0..COUNT`
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Channel name
    pub const fn name(self) -> &'static str {
        match self {
            Topic::ControlsState => "controlsState",
            Topic::RadarState => "radarState",
            Topic::DriverMonitoringState => "driverMonitoringState",
            Topic::ThermalData => "thermal",
            Topic::ModelOutput => "model",
            Topic::UiLayoutState => "uiLayoutState",
            Topic::HealthData => "health",
            Topic::CarState => "carState",
            Topic::CarParams => "carParams",
            Topic::LiveCalibration => "liveCalibration",
            Topic::Gnss => "gpsLocation",
            Topic::Sensors => "sensorEvents",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A payload could not be turned into its topic's message
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// Bytes or values did not form a valid message
    #[error("malformed {topic} message: {reason}")]
    Malformed {
        /// Topic the payload arrived on
        topic: Topic,
        /// What was wrong
        reason: String,
    },
}

/// Subscriber side of the message bus
pub trait MessageBus {
    /// Take the oldest pending payload on `topic`, if any. Never blocks.
    fn try_receive(&mut self, topic: Topic) -> Option<Vec<u8>>;
}

/// Publisher side of the message bus, used for what the dashboard announces
pub trait MessageSink {
    /// Queue `payload` on `topic`. Never blocks.
    fn send(&mut self, topic: Topic, payload: Vec<u8>) -> Result<(), PublishError>;
}

/// Encode `message` and hand it to `sink` on its topic
pub fn send_message<M: Message>(sink: &mut dyn MessageSink, message: &M) -> Result<(), PublishError> {
    let payload = encode(message).map_err(|source| PublishError::Encode { topic: M::TOPIC, source })?;
    sink.send(M::TOPIC, payload)
}

/// Encode a message into its wire payload
pub fn encode<M: Message>(message: &M) -> Result<Vec<u8>, postcard::Error> {
    postcard::to_allocvec(message)
}

/// Decode a payload received on `M::TOPIC`
pub fn decode<M: Message>(payload: &[u8]) -> Result<M, DecodeError> {
    postcard::from_bytes(payload).map_err(|e| DecodeError::Malformed {
        topic: M::TOPIC,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_indices_are_dense() {
        for (i, topic) in Topic::ALL.iter().enumerate() {
            assert_eq!(topic.index(), i);
        }
    }

    #[test]
    fn test_decode_garbage_reports_topic() {
        let err = decode::<RadarState>(&[0xff, 0xff, 0xff]).unwrap_err();
        let DecodeError::Malformed { topic, .. } = err;
        assert_eq!(topic, Topic::RadarState);
    }

    #[test]
    fn test_decode_truncated_payload_fails() {
        let payload = encode(&ControlsState {
            alert_text1: "Steer Assist".to_string(),
            ..ControlsState::default()
        })
        .unwrap();
        assert!(decode::<ControlsState>(&payload[..payload.len() / 2]).is_err());
    }
}
