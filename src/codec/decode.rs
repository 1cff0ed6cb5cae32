//! MQTT Packet Decoder
//!
//! Only CONNACK is decoded; it is the one reply the client waits for.

use super::read_variable_int;
use crate::protocol::{ConnAckResult, DecodeError, PacketType};

/// Length of a v3.1.1 CONNACK on the wire
pub const CONNACK_LEN: usize = 4;

/// CONNACK remaining length: acknowledge flags and return code
const CONNACK_REMAINING: u32 = 2;

/// Decode a CONNACK from the start of `buf`.
///
/// Returns `Incomplete` until four bytes are available. A remaining length
/// other than 2 is `MalformedRemainingLength`. Bytes past the first packet
/// are left alone; framing further packets is the caller's job.
pub fn decode_connack(buf: &[u8]) -> Result<ConnAckResult, DecodeError> {
    if buf.len() < CONNACK_LEN {
        return Err(DecodeError::Incomplete);
    }

    let first_byte = buf[0];
    if PacketType::from_header(first_byte) != Some(PacketType::ConnAck) {
        return Err(DecodeError::UnexpectedPacketType(first_byte));
    }

    match read_variable_int(&buf[1..]) {
        Ok((CONNACK_REMAINING, 1)) => {}
        _ => return Err(DecodeError::MalformedRemainingLength),
    }

    Ok(ConnAckResult {
        session_present: (buf[2] & 0x01) != 0,
        return_code: buf[3],
    })
}
