//! MQTT Protocol definitions and types
//!
//! Only the pieces needed to authenticate against a v3.1.1 broker and push a
//! single QoS 0 message: CONNECT, CONNACK, PUBLISH and DISCONNECT.

mod error;
mod packet;
mod reason;

pub use error::{DecodeError, EncodeError};
pub use packet::*;
pub use reason::ConnectReturnCode;

/// Protocol name carried in the CONNECT variable header
pub const PROTOCOL_NAME: &str = "MQTT";

/// Protocol level for MQTT v3.1.1
pub const PROTOCOL_LEVEL_V311: u8 = 4;

/// MQTT packet types the client sends or expects.
///
/// Any other type in a reply is reported as its raw header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    Connect = 1,
    ConnAck = 2,
    Publish = 3,
    Disconnect = 14,
}

impl PacketType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(PacketType::Connect),
            2 => Some(PacketType::ConnAck),
            3 => Some(PacketType::Publish),
            14 => Some(PacketType::Disconnect),
            _ => None,
        }
    }

    /// Packet type from the first byte of a fixed header
    pub fn from_header(byte: u8) -> Option<Self> {
        Self::from_u8(byte >> 4)
    }

    /// Fixed header byte with zero flags
    pub fn header_byte(self) -> u8 {
        (self as u8) << 4
    }
}
