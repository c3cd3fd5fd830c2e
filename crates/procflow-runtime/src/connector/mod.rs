//! Live event connectors.
//!
//! | Source | Feature | Description |
//! |--------|---------|-------------|
//! | `MqttSource` | `mqtt` | Events published on `base/process/case/activity` |
//!
//! The topic mapping and [`MqttConfig`] are always available, so payload
//! handling is testable without a broker.

mod mqtt;

pub use mqtt::{event_from_publish, MqttConfig, TopicParts};
#[cfg(feature = "mqtt")]
pub use mqtt::MqttSource;
