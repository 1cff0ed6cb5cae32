//! MQTT Packet Codec
//!
//! Pure byte-level encoding and decoding for the client side of an MQTT
//! v3.1.1 connection. Nothing here touches a socket; see `session` for I/O.

mod decode;
mod encode;


pub use decode::{decode_connack, CONNACK_LEN};
pub use encode::{encode_connect, encode_disconnect, encode_publish};

use crate::protocol::{DecodeError, EncodeError};
use bytes::{BufMut, BytesMut};

/// Maximum remaining length (268,435,455 bytes = ~256 MB)
pub const MAX_REMAINING_LENGTH: usize = 268_435_455;

/// Maximum length of a length-prefixed field
pub const MAX_FIELD_LENGTH: usize = 65_535;

/// Read a Variable Byte Integer from buffer
/// Returns (value, bytes_consumed) or error
#[inline]
pub fn read_variable_int(buf: &[u8]) -> Result<(u32, usize), DecodeError> {
    let mut multiplier: u32 = 1;
    let mut value: u32 = 0;
    let mut pos = 0;

    loop {
        if pos >= 4 {
            return Err(DecodeError::MalformedRemainingLength);
        }
        if pos >= buf.len() {
            return Err(DecodeError::Incomplete);
        }

        let byte = buf[pos];
        value += ((byte & 0x7F) as u32) * multiplier;
        pos += 1;

        if (byte & 0x80) == 0 {
            break;
        }

        multiplier *= 128;
    }

    Ok((value, pos))
}

/// Write a Variable Byte Integer to buffer
/// Returns bytes written
#[inline]
pub fn write_variable_int(buf: &mut BytesMut, mut value: u32) -> Result<usize, EncodeError> {
    if value > MAX_REMAINING_LENGTH as u32 {
        return Err(EncodeError::PacketTooLarge);
    }

    let mut count = 0;
    loop {
        let mut byte = (value % 128) as u8;
        value /= 128;
        if value > 0 {
            byte |= 0x80;
        }
        buf.put_u8(byte);
        count += 1;
        if value == 0 {
            break;
        }
    }
    Ok(count)
}

/// Calculate the number of bytes needed to encode a Variable Byte Integer
#[inline]
pub fn variable_int_len(value: u32) -> usize {
    if value < 128 {
        1
    } else if value < 16_384 {
        2
    } else if value < 2_097_152 {
        3
    } else {
        4
    }
}

/// Write a UTF-8 encoded string with its two byte length prefix.
///
/// `field` names the value in the error if it cannot be written.
#[inline]
pub fn write_string(buf: &mut BytesMut, field: &'static str, s: &str) -> Result<(), EncodeError> {
    // MQTT-1.5.3-2: no U+0000 in UTF-8 strings
    if s.contains('\0') {
        return Err(EncodeError::EncodingError { field });
    }
    write_binary(buf, field, s.as_bytes())
}

/// Write binary data with its two byte length prefix
#[inline]
pub fn write_binary(buf: &mut BytesMut, field: &'static str, data: &[u8]) -> Result<(), EncodeError> {
    let len = data.len();
    if len > MAX_FIELD_LENGTH {
        return Err(EncodeError::LengthOverflow { field, len });
    }
    buf.put_u16(len as u16);
    buf.put_slice(data);
    Ok(())
}

/// Prefix an assembled body with its fixed header byte and remaining length.
///
/// The remaining length is taken from the body as built, so it always matches
/// the bytes that follow it.
fn frame(header: u8, body: &[u8], buf: &mut BytesMut) -> Result<(), EncodeError> {
    if body.len() > MAX_REMAINING_LENGTH {
        return Err(EncodeError::PacketTooLarge);
    }
    buf.reserve(1 + variable_int_len(body.len() as u32) + body.len());
    buf.put_u8(header);
    write_variable_int(buf, body.len() as u32)?;
    buf.put_slice(body);
    Ok(())
}
