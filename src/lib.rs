//! sensorctl - MQTT connectivity and OTA tooling for ESP32 sensor nodes
//!
//! Encodes MQTT 3.1.1 CONNECT packets carrying device credentials (a MAC
//! derived username and a JWT password), interprets the broker's CONNACK,
//! and wraps that in the tooling used around a device fleet: connection
//! probes, firmware hashing, OTA update notifications and a firmware
//! download server.

pub mod codec;
pub mod config;
pub mod ota;
pub mod protocol;
pub mod server;
pub mod session;
pub mod token;

pub use codec::{decode_connack, encode_connect};
pub use config::Config;
pub use ota::{UpdateMessage, VersionManifest};
pub use protocol::{ConnAckResult, ConnectRequest, ConnectReturnCode, DecodeError, EncodeError};
pub use server::FirmwareServer;
pub use session::{probe, publish_once, Session, SessionError};
