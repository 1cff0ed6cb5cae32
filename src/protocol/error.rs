//! Protocol error types

use std::fmt;

/// Errors that can occur while encoding a packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// A length-prefixed field exceeds 65,535 bytes
    LengthOverflow { field: &'static str, len: usize },
    /// A UTF-8 field holds a character MQTT strings may not carry
    EncodingError { field: &'static str },
    /// Remaining length exceeds the varint maximum
    PacketTooLarge,
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LengthOverflow { field, len } => {
                write!(f, "{} is {} bytes, limit is 65535", field, len)
            }
            Self::EncodingError { field } => {
                write!(f, "{} cannot be encoded as an MQTT string", field)
            }
            Self::PacketTooLarge => write!(f, "packet too large"),
        }
    }
}

impl std::error::Error for EncodeError {}

/// Errors that can occur while decoding a broker reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Not enough data in buffer yet
    Incomplete,
    /// First byte is not the expected packet type
    UnexpectedPacketType(u8),
    /// Invalid remaining length encoding
    MalformedRemainingLength,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Incomplete => write!(f, "incomplete packet"),
            Self::UnexpectedPacketType(b) => write!(f, "unexpected packet type: 0x{:02x}", b),
            Self::MalformedRemainingLength => write!(f, "invalid remaining length encoding"),
        }
    }
}

impl std::error::Error for DecodeError {}
