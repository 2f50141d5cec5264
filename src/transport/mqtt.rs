use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::time::Duration;
use uuid::Uuid;

use crate::settings::MqttSettings;

use super::{Transport, TransportError};

/// Subscribes to one topic and yields each publish payload as text.
///
/// The event loop reconnects on the next poll after an error, and the
/// subscription is renewed on every `ConnAck`.
pub struct MqttTransport {
    client: AsyncClient,
    eventloop: EventLoop,
    topic: String,
}

impl MqttTransport {
    pub fn new(settings: &MqttSettings) -> Self {
        let client_id = format!("{}-{}", settings.client_prefix, Uuid::new_v4().simple());
        let mut options = MqttOptions::new(client_id, settings.host.clone(), settings.port);
        options.set_keep_alive(Duration::from_secs(settings.keep_alive_secs.max(5)));
        options.set_clean_session(true);
        if let Some(username) = &settings.username {
            options.set_credentials(
                username.clone(),
                settings.password.clone().unwrap_or_default(),
            );
        }

        let (client, eventloop) = AsyncClient::new(options, 10);
        Self {
            client,
            eventloop,
            topic: settings.topic.clone(),
        }
    }
}

#[async_trait]
impl Transport for MqttTransport {
    fn name(&self) -> &'static str {
        "mqtt"
    }

    async fn next_payload(&mut self) -> Result<String, TransportError> {
        loop {
            let event = self
                .eventloop
                .poll()
                .await
                .map_err(|err| TransportError::Disconnected(err.to_string()))?;

            match event {
                Event::Incoming(Packet::ConnAck(_)) => {
                    log::info!("mqtt connected, subscribing to {}", self.topic);
                    self.client
                        .subscribe(self.topic.clone(), QoS::AtMostOnce)
                        .await
                        .map_err(|err| TransportError::Disconnected(err.to_string()))?;
                }
                Event::Incoming(Packet::Publish(publish)) => {
                    return Ok(String::from_utf8_lossy(&publish.payload).into_owned());
                }
                _ => {}
            }
        }
    }
}
