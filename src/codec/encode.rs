//! MQTT Packet Encoder
//!
//! Client-side packets for v3.1.1. Each packet body is assembled first and
//! then framed, so the caller's buffer is untouched when encoding fails.

use bytes::{BufMut, Bytes, BytesMut};

use super::{frame, write_binary, write_string};
use crate::protocol::{
    ConnectRequest, EncodeError, PacketType, PROTOCOL_LEVEL_V311, PROTOCOL_NAME,
};

/// Encode a CONNECT packet into `buf`
pub fn encode_connect(packet: &ConnectRequest, buf: &mut BytesMut) -> Result<(), EncodeError> {
    let mut body = BytesMut::with_capacity(
        10 + 2
            + packet.client_id.len()
            + packet.username.as_ref().map_or(0, |u| 2 + u.len())
            + packet.password.as_ref().map_or(0, |p| 2 + p.len()),
    );

    // Variable header
    write_string(&mut body, "protocol name", PROTOCOL_NAME)?;
    body.put_u8(PROTOCOL_LEVEL_V311);
    body.put_u8(packet.connect_flags());
    body.put_u16(packet.keep_alive);

    // Payload, in the order the flags announce it
    write_string(&mut body, "client_id", &packet.client_id)?;
    if let Some(ref username) = packet.username {
        write_string(&mut body, "username", username)?;
    }
    if let Some(ref password) = packet.password {
        write_binary(&mut body, "password", password)?;
    }

    frame(PacketType::Connect.header_byte(), &body, buf)
}

/// Encode a QoS 0 PUBLISH packet into `buf`
pub fn encode_publish(
    topic: &str,
    payload: &[u8],
    retain: bool,
    buf: &mut BytesMut,
) -> Result<(), EncodeError> {
    let mut body = BytesMut::with_capacity(2 + topic.len() + payload.len());
    write_string(&mut body, "topic", topic)?;
    // QoS 0 carries no packet identifier
    body.put_slice(payload);

    let mut first_byte = PacketType::Publish.header_byte();
    if retain {
        first_byte |= 0x01;
    }
    frame(first_byte, &body, buf)
}

/// Encode a DISCONNECT packet into `buf`
pub fn encode_disconnect(buf: &mut BytesMut) {
    buf.put_u8(PacketType::Disconnect.header_byte());
    buf.put_u8(0x00);
}

impl ConnectRequest {
    /// Encode this request as a complete CONNECT packet
    pub fn encode(&self) -> Result<Bytes, EncodeError> {
        let mut buf = BytesMut::new();
        encode_connect(self, &mut buf)?;
        Ok(buf.freeze())
    }
}
