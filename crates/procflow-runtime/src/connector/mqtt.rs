//! MQTT source using rumqttc.
//!
//! Every publish on `base/process/case/activity` becomes one [`Event`]. The
//! payload, when it is a JSON object, supplies the event attributes and may
//! carry a `timestamp`; otherwise the arrival time is used.

use chrono::Utc;
use procflow_core::{AttributeValue, Event, MiningError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MqttConfig {
    pub broker: String,
    pub port: u16,
    pub base_topic: String,
    pub client_id: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub qos: u8,
}

impl MqttConfig {
    pub fn new(broker: &str, base_topic: &str) -> Self {
        Self {
            broker: broker.to_string(),
            port: 1883,
            base_topic: base_topic.trim_end_matches('/').to_string(),
            client_id: None,
            username: None,
            password: None,
            qos: 0,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_client_id(mut self, client_id: &str) -> Self {
        self.client_id = Some(client_id.to_string());
        self
    }

    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.username = Some(username.to_string());
        self.password = Some(password.to_string());
        self
    }

    pub fn with_qos(mut self, qos: u8) -> Self {
        self.qos = qos.min(2);
        self
    }

    /// Wildcard subscription covering every process under the base topic.
    pub fn subscription(&self) -> String {
        format!("{}/+/+/+", self.base_topic)
    }
}

/// The three levels below the base topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicParts<'a> {
    pub process: &'a str,
    pub case_id: &'a str,
    pub activity: &'a str,
}

impl<'a> TopicParts<'a> {
    pub fn parse(base_topic: &str, topic: &'a str) -> Option<Self> {
        let rest = topic.strip_prefix(base_topic)?.strip_prefix('/')?;
        let mut levels = rest.split('/');
        match (levels.next(), levels.next(), levels.next(), levels.next()) {
            (Some(process), Some(case_id), Some(activity), None)
                if !process.is_empty() && !case_id.is_empty() && !activity.is_empty() =>
            {
                Some(Self {
                    process,
                    case_id,
                    activity,
                })
            }
            _ => None,
        }
    }
}

/// Map one publish to an event.
pub fn event_from_publish(base_topic: &str, topic: &str, payload: &[u8]) -> Result<Event> {
    let parts = TopicParts::parse(base_topic, topic).ok_or_else(|| {
        MiningError::input(format!(
            "topic '{}' does not match '{}/process/case/activity'",
            topic, base_topic
        ))
    })?;

    let mut event = Event::at(parts.case_id, parts.activity, Utc::now())
        .with_attribute("process", parts.process);

    if let Ok(serde_json::Value::Object(fields)) = serde_json::from_slice(payload) {
        for (key, value) in &fields {
            match (key.as_str(), AttributeValue::from_json(value)) {
                ("timestamp", AttributeValue::Date(ts)) => event.timestamp = ts,
                (_, value) => {
                    event.attributes.insert(key.clone(), value);
                }
            }
        }
    }
    Ok(event)
}

#[cfg(feature = "mqtt")]
mod mqtt_impl {
    use super::*;
    use crate::stream::{Source, StreamSender};
    use async_trait::async_trait;
    use rumqttc::{AsyncClient, Event as MqttEvent, MqttOptions, Packet, QoS};
    use std::time::Duration;
    use tracing::{debug, error, info, warn};

    const MAX_CONSECUTIVE_ERRORS: u32 = 10;
    const MAX_BACKOFF_SECS: u64 = 30;

    fn qos_from_u8(qos: u8) -> QoS {
        match qos {
            0 => QoS::AtMostOnce,
            1 => QoS::AtLeastOnce,
            _ => QoS::ExactlyOnce,
        }
    }

    /// Live source subscribed to `base/+/+/+`. Runs until the consumer
    /// closes or the broker keeps failing.
    pub struct MqttSource {
        name: String,
        config: MqttConfig,
    }

    impl MqttSource {
        pub fn new(name: &str, config: MqttConfig) -> Self {
            Self {
                name: name.to_string(),
                config,
            }
        }
    }

    #[async_trait]
    impl Source<Event> for MqttSource {
        fn name(&self) -> &str {
            &self.name
        }

        async fn run(&mut self, sender: &StreamSender<Event>) -> Result<()> {
            let client_id = self
                .config
                .client_id
                .clone()
                .unwrap_or_else(|| format!("procflow-src-{}", std::process::id()));

            let mut options = MqttOptions::new(client_id, &self.config.broker, self.config.port);
            options.set_keep_alive(Duration::from_secs(60));
            if let (Some(user), Some(pass)) = (&self.config.username, &self.config.password) {
                options.set_credentials(user, pass);
            }

            let (client, mut eventloop) = AsyncClient::new(options, 10_000);
            let subscription = self.config.subscription();
            client
                .subscribe(&subscription, qos_from_u8(self.config.qos))
                .await
                .map_err(|e| MiningError::io(format!("MQTT subscribe failed: {}", e)))?;
            info!(
                source = %self.name,
                broker = %self.config.broker,
                port = self.config.port,
                topic = %subscription,
                "MQTT source subscribed"
            );

            let mut consecutive_errors: u32 = 0;
            loop {
                match eventloop.poll().await {
                    Ok(MqttEvent::Incoming(Packet::Publish(publish))) => {
                        consecutive_errors = 0;
                        let event = match event_from_publish(
                            &self.config.base_topic,
                            &publish.topic,
                            &publish.payload,
                        ) {
                            Ok(event) => event,
                            Err(e) => {
                                warn!(source = %self.name, error = %e, "Publish skipped");
                                continue;
                            }
                        };
                        if sender.send(event).await.is_err() {
                            debug!(source = %self.name, "Consumer closed, disconnecting");
                            let _ = client.disconnect().await;
                            return Ok(());
                        }
                    }
                    Ok(_) => consecutive_errors = 0,
                    Err(e) => {
                        consecutive_errors += 1;
                        if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                            error!(
                                source = %self.name,
                                errors = consecutive_errors,
                                "MQTT source giving up"
                            );
                            return Err(MiningError::io(format!("MQTT connection lost: {}", e)));
                        }
                        let backoff = (1u64 << (consecutive_errors - 1).min(5)).min(MAX_BACKOFF_SECS);
                        warn!(
                            source = %self.name,
                            error = %e,
                            backoff_secs = backoff,
                            "MQTT poll failed, retrying"
                        );
                        tokio::time::sleep(Duration::from_secs(backoff)).await;
                    }
                }
                if sender.is_closed() {
                    let _ = client.disconnect().await;
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(feature = "mqtt")]
pub use mqtt_impl::MqttSource;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mqtt_config() {
        let config = MqttConfig::new("broker.local", "factory/")
            .with_port(8883)
            .with_qos(5)
            .with_credentials("user", "secret");
        assert_eq!(config.base_topic, "factory");
        assert_eq!(config.qos, 2);
        assert_eq!(config.subscription(), "factory/+/+/+");
    }

    #[test]
    fn test_topic_parts() {
        let parts = TopicParts::parse("factory", "factory/orders/o-17/Pack").unwrap();
        assert_eq!(parts.process, "orders");
        assert_eq!(parts.case_id, "o-17");
        assert_eq!(parts.activity, "Pack");

        assert!(TopicParts::parse("factory", "factory/orders/o-17").is_none());
        assert!(TopicParts::parse("factory", "factory/orders/o-17/Pack/x").is_none());
        assert!(TopicParts::parse("factory", "factoryx/orders/o-17/Pack").is_none());
        assert!(TopicParts::parse("factory", "factory/orders//Pack").is_none());
    }

    #[test]
    fn test_event_from_json_payload() {
        let payload = br#"{"timestamp": "2024-05-01T08:00:00Z", "operator": "kim", "weight": 2}"#;
        let event = event_from_publish("factory", "factory/orders/o-1/Weigh", payload).unwrap();

        assert_eq!(&*event.case_id, "o-1");
        assert_eq!(&*event.activity, "Weigh");
        assert_eq!(event.timestamp.to_rfc3339(), "2024-05-01T08:00:00+00:00");
        assert_eq!(event.get("process"), Some(&AttributeValue::from("orders")));
        assert_eq!(event.get("weight"), Some(&AttributeValue::Int(2)));
        assert!(event.get("timestamp").is_none());
    }

    #[test]
    fn test_event_from_opaque_payload() {
        let event = event_from_publish("f", "f/p/c/A", b"not json").unwrap();
        assert_eq!(event.attributes.len(), 1);
        assert!(event_from_publish("f", "g/p/c/A", b"").is_err());
    }
}
