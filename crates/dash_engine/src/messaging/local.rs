//! In-process message bus
//!
//! One unbounded channel per topic. Any number of [`BusPublisher`] clones may
//! publish from other threads; the single [`LocalBus`] subscriber drains them
//! from the UI thread with `try_recv`, which never blocks.

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};

use super::{encode, Message, MessageBus, MessageSink, Topic};

/// Publishing failed
#[derive(thiserror::Error, Debug)]
pub enum PublishError {
    /// The message could not be serialized
    #[error("failed to encode {topic} message: {source}")]
    Encode {
        /// Target topic
        topic: Topic,
        /// Serializer error
        source: postcard::Error,
    },
    /// The subscriber side was dropped
    #[error("no subscriber for {0}")]
    Disconnected(Topic),
}

/// Subscriber half, owned by the dashboard
pub struct LocalBus {
    receivers: Vec<Receiver<Vec<u8>>>,
    disconnected: [bool; Topic::COUNT],
}

/// Producer half, cheap to clone and `Send`
#[derive(Clone)]
pub struct BusPublisher {
    senders: Vec<Sender<Vec<u8>>>,
}

impl LocalBus {
    /// Create a bus and its first publisher
    pub fn new() -> (Self, BusPublisher) {
        let (senders, receivers): (Vec<_>, Vec<_>) = Topic::ALL.iter().map(|_| mpsc::channel()).unzip();
        (
            Self { receivers, disconnected: [false; Topic::COUNT] },
            BusPublisher { senders },
        )
    }
}

impl MessageBus for LocalBus {
    fn try_receive(&mut self, topic: Topic) -> Option<Vec<u8>> {
        let receiver = self.receivers.get(topic.index())?;
        match receiver.try_recv() {
            Ok(payload) => Some(payload),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                if !self.disconnected[topic.index()] {
                    self.disconnected[topic.index()] = true;
                    log::debug!("All publishers of {} are gone", topic);
                }
                None
            }
        }
    }
}

impl BusPublisher {
    /// Encode and publish a typed message on its topic
    pub fn publish<M: Message>(&self, message: &M) -> Result<(), PublishError> {
        let payload = encode(message).map_err(|source| PublishError::Encode { topic: M::TOPIC, source })?;
        self.publish_raw(M::TOPIC, payload)
    }

    /// Publish an already encoded payload
    pub fn publish_raw(&self, topic: Topic, payload: Vec<u8>) -> Result<(), PublishError> {
        self.senders
            .get(topic.index())
            .ok_or(PublishError::Disconnected(topic))?
            .send(payload)
            .map_err(|_| PublishError::Disconnected(topic))
    }
}

impl MessageSink for BusPublisher {
    fn send(&mut self, topic: Topic, payload: Vec<u8>) -> Result<(), PublishError> {
        self.publish_raw(topic, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::{decode, send_message, CarParams, GnssMeasurements, UiLayoutState};
    use crate::scene::ActiveApp;

    #[test]
    fn test_empty_topic_returns_none() {
        let (mut bus, _publisher) = LocalBus::new();
        assert!(bus.try_receive(Topic::Gnss).is_none());
    }

    #[test]
    fn test_messages_arrive_in_order_per_topic() {
        let (mut bus, publisher) = LocalBus::new();
        publisher.publish(&GnssMeasurements { satellite_count: 3 }).unwrap();
        publisher.publish(&GnssMeasurements { satellite_count: 7 }).unwrap();
        publisher.publish(&CarParams { openpilot_longitudinal_control: true }).unwrap();

        let first: GnssMeasurements = decode(&bus.try_receive(Topic::Gnss).unwrap()).unwrap();
        let second: GnssMeasurements = decode(&bus.try_receive(Topic::Gnss).unwrap()).unwrap();
        assert_eq!((first.satellite_count, second.satellite_count), (3, 7));
        assert!(bus.try_receive(Topic::Gnss).is_none());
        assert!(bus.try_receive(Topic::CarParams).is_some());
    }

    #[test]
    fn test_publisher_works_from_another_thread() {
        let (mut bus, publisher) = LocalBus::new();
        std::thread::spawn(move || publisher.publish(&GnssMeasurements { satellite_count: 9 }).unwrap())
            .join()
            .unwrap();
        assert!(bus.try_receive(Topic::Gnss).is_some());
        // publisher dropped: still non-blocking
        assert!(bus.try_receive(Topic::Gnss).is_none());
    }

    #[test]
    fn test_publisher_as_sink() {
        let (mut bus, mut publisher) = LocalBus::new();
        let layout = UiLayoutState { active_app: ActiveApp::Settings, sidebar_collapsed: false };
        send_message(&mut publisher, &layout).unwrap();

        let received: UiLayoutState = decode(&bus.try_receive(Topic::UiLayoutState).unwrap()).unwrap();
        assert_eq!(received, layout);
    }

    #[test]
    fn test_publish_after_bus_dropped_fails() {
        let (bus, publisher) = LocalBus::new();
        drop(bus);
        assert!(matches!(
            publisher.publish(&GnssMeasurements::default()),
            Err(PublishError::Disconnected(Topic::Gnss))
        ));
    }
}
