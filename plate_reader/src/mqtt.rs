//! rumqttc (MQTT v5) backed transport. The connection is driven on its own
//! thread; publishing only enqueues a request and never waits for an ack.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::Client;
use rumqttc::v5::Connection;
use rumqttc::v5::Event;
use rumqttc::v5::Incoming;
use rumqttc::v5::MqttOptions;
use rumqttc::Outgoing;

use crate::config::MqttSettings;
use crate::error::PlateError;
use crate::error::Result;
use crate::publisher::Transport;

const REQUEST_QUEUE: usize = 10;
const RECONNECT_PAUSE: Duration = Duration::from_secs(1);

pub struct MqttTransport {
    client: Client,
    connected: Arc<AtomicBool>,
    closing: Arc<AtomicBool>,
    connection_handle: Option<JoinHandle<()>>,
}

impl MqttTransport {
    pub fn connect(settings: &MqttSettings) -> Self {
        let mut options = MqttOptions::new(&settings.client_id, &settings.host, settings.port);
        options.set_keep_alive(Duration::from_secs(settings.keep_alive_secs));
        options.set_clean_start(true);

        let (client, connection) = Client::new(options, REQUEST_QUEUE);
        let connected = Arc::new(AtomicBool::new(false));
        let closing = Arc::new(AtomicBool::new(false));
        let handle = spawn_connection(
            connection,
            format!("{}:{}", settings.host, settings.port),
            connected.clone(),
            closing.clone(),
        );

        log::info!(
            "connecting to MQTT broker at {}:{} as {}",
            settings.host,
            settings.port,
            settings.client_id
        );
        Self {
            client,
            connected,
            closing,
            connection_handle: Some(handle),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn disconnect(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let Some(handle) = self.connection_handle.take() else {
            return;
        };
        self.closing.store(true, Ordering::SeqCst);
        if let Err(e) = self.client.disconnect() {
            log::debug!("disconnect request not queued: {}", e);
        }
        if handle.join().is_err() {
            log::warn!("MQTT connection thread panicked");
        }
        self.connected.store(false, Ordering::SeqCst);
        log::info!("disconnected from MQTT broker");
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Transport for MqttTransport {
    fn publish(&self, topic: &str, payload: Vec<u8>, qos: QoS) -> Result<()> {
        if !self.is_connected() {
            return Err(PlateError::Transport("not connected to broker".to_string()));
        }
        self.client
            .try_publish(topic, qos, false, payload)
            .map_err(|e| PlateError::Transport(e.to_string()))
    }
}

fn spawn_connection(
    mut connection: Connection,
    broker: String,
    connected: Arc<AtomicBool>,
    closing: Arc<AtomicBool>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        for event in connection.iter() {
            match event {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    connected.store(true, Ordering::SeqCst);
                    log::info!("connected to MQTT broker at {}", broker);
                }
                Ok(Event::Incoming(Incoming::Disconnect(_))) => {
                    connected.store(false, Ordering::SeqCst);
                    log::warn!("broker {} closed the session", broker);
                }
                Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    connected.store(false, Ordering::SeqCst);
                }
                Ok(_) => {}
                Err(e) => {
                    connected.store(false, Ordering::SeqCst);
                    if closing.load(Ordering::SeqCst) {
                        break;
                    }
                    // rumqttc reconnects on the next poll.
                    log::warn!("MQTT connection error: {}", e);
                    std::thread::sleep(RECONNECT_PAUSE);
                }
            }
            if closing.load(Ordering::SeqCst) && !connected.load(Ordering::SeqCst) {
                break;
            }
        }
    })
}
