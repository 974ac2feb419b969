use chrono::DateTime;
use chrono::Local;
use crossbeam::channel::Receiver;
use rumqttc::v5::mqttbytes::QoS;
use serde::Deserialize;
use serde::Serialize;

use crate::error::PlateError;
use crate::error::Result;
use crate::metrics;
use crate::plate_detection::PlateText;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A plate that made it through the debounce gate, waiting to be published.
#[derive(Clone, Debug)]
pub struct PlateEvent {
    pub plate: PlateText,
    pub detected_at: DateTime<Local>,
}

/// Wire shape of the message, `{"plate": "...", "timestamp": "..."}`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublishEvent {
    pub plate: String,
    pub timestamp: String,
}

impl PublishEvent {
    pub fn new(plate: &PlateText, timestamp: DateTime<Local>) -> Self {
        Self {
            plate: plate.as_str().to_string(),
            timestamp: timestamp.format(TIMESTAMP_FORMAT).to_string(),
        }
    }

    pub fn to_payload(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| PlateError::Transport(e.to_string()))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PublishTally {
    pub published: usize,
    pub failed: usize,
}

/// Fire-and-forget message sink.
pub trait Transport {
    fn publish(&self, topic: &str, payload: Vec<u8>, qos: QoS) -> Result<()>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn publish(&self, topic: &str, payload: Vec<u8>, qos: QoS) -> Result<()> {
        (**self).publish(topic, payload, qos)
    }
}

pub struct Publisher<T: Transport> {
    transport: T,
    topic: String,
}

impl<T: Transport> Publisher<T> {
    pub fn new(transport: T, topic: impl Into<String>) -> Self {
        Self {
            transport,
            topic: topic.into(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Sends one plate at QoS 1. The outcome is logged; nothing is retried.
    pub fn publish(&self, plate: &PlateText, timestamp: DateTime<Local>) -> Result<()> {
        let event = PublishEvent::new(plate, timestamp);
        let result = event
            .to_payload()
            .and_then(|payload| self.transport.publish(&self.topic, payload, QoS::AtLeastOnce));

        match &result {
            Ok(()) => {
                metrics::PUBLISHED_TOTAL.inc();
                log::info!("published to {}: {}", self.topic, plate);
            }
            Err(e) => {
                metrics::PUBLISH_FAILURES.inc();
                log::warn!("failed to publish {} to {}: {}", plate, self.topic, e);
            }
        }
        result
    }

    /// Publishes every event waiting on the channel.
    pub fn publish_pending(&self, events: &Receiver<PlateEvent>) -> PublishTally {
        let mut tally = PublishTally::default();
        for event in events.try_iter() {
            match self.publish(&event.plate, event.detected_at) {
                Ok(()) => tally.published += 1,
                Err(_) => tally.failed += 1,
            }
        }
        tally
    }
}
