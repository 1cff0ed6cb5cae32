//! Session tests against an in-memory stream

use std::collections::VecDeque;
use std::io::{self, Read, Write};

use pretty_assertions::assert_eq;

use super::{Session, SessionError};
use crate::protocol::{ConnectRequest, ConnectReturnCode, DecodeError, EncodeError};

/// Stream that replays scripted reads and records writes
#[derive(Default)]
struct ScriptedStream {
    reads: VecDeque<io::Result<Vec<u8>>>,
    written: Vec<u8>,
}

impl ScriptedStream {
    fn replying(chunks: &[&[u8]]) -> Self {
        Self {
            reads: chunks.iter().map(|c| Ok(c.to_vec())).collect(),
            written: Vec::new(),
        }
    }

    fn failing(kind: io::ErrorKind) -> Self {
        let mut reads = VecDeque::new();
        reads.push_back(Err(io::Error::from(kind)));
        Self {
            reads,
            written: Vec::new(),
        }
    }
}

impl Read for ScriptedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.reads.pop_front() {
            Some(Ok(chunk)) => {
                buf[..chunk.len()].copy_from_slice(&chunk);
                Ok(chunk.len())
            }
            Some(Err(e)) => Err(e),
            None => Ok(0),
        }
    }
}

impl Write for ScriptedStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn request() -> ConnectRequest {
    ConnectRequest::new("test_client", "8CBFEA8EA40C", "token")
}

#[test]
fn test_handshake_accepted() {
    let mut session = Session::new(ScriptedStream::replying(&[&[0x20, 0x02, 0x00, 0x00]]));
    let connack = session.handshake(&request()).unwrap();
    assert!(connack.is_accepted());

    let stream = session.into_inner();
    assert_eq!(stream.written, request().encode().unwrap().to_vec());
}

#[test]
fn test_handshake_reply_split_across_reads() {
    let stream = ScriptedStream::replying(&[&[0x20], &[0x02, 0x01], &[0x04]]);
    let mut session = Session::new(stream);
    let connack = session.handshake(&request()).unwrap();
    assert!(connack.session_present);
    assert_eq!(connack.code(), Some(ConnectReturnCode::BadUsernameOrPassword));
}

#[test]
fn test_handshake_timeout() {
    let mut session = Session::new(ScriptedStream::failing(io::ErrorKind::WouldBlock));
    assert!(matches!(
        session.handshake(&request()),
        Err(SessionError::Timeout)
    ));

    let mut session = Session::new(ScriptedStream::failing(io::ErrorKind::TimedOut));
    assert!(matches!(
        session.handshake(&request()),
        Err(SessionError::Timeout)
    ));
}

#[test]
fn test_handshake_connection_closed() {
    let mut session = Session::new(ScriptedStream::replying(&[&[0x20, 0x02]]));
    assert!(matches!(
        session.handshake(&request()),
        Err(SessionError::ConnectionClosed)
    ));
}

#[test]
fn test_handshake_unexpected_packet() {
    let mut session = Session::new(ScriptedStream::replying(&[&[0x30, 0x02, 0x00, 0x00]]));
    assert!(matches!(
        session.handshake(&request()),
        Err(SessionError::Decode(DecodeError::UnexpectedPacketType(0x30)))
    ));
}

#[test]
fn test_handshake_encode_error_sends_nothing() {
    let mut session = Session::new(ScriptedStream::replying(&[&[0x20, 0x02, 0x00, 0x00]]));
    let bad = ConnectRequest::new("bad\0id", "u", "p");
    assert!(matches!(
        session.handshake(&bad),
        Err(SessionError::Encode(EncodeError::EncodingError { field: "client_id" }))
    ));
    assert!(session.into_inner().written.is_empty());
}

#[test]
fn test_publish_and_disconnect_bytes() {
    let mut session = Session::new(ScriptedStream::default());
    session.publish("t/u", b"hi", false).unwrap();
    session.disconnect().unwrap();

    let written = session.into_inner().written;
    assert_eq!(
        written,
        vec![0x30, 0x07, 0x00, 0x03, b't', b'/', b'u', b'h', b'i', 0xE0, 0x00]
    );
}

#[test]
fn test_rejected_error_message() {
    let err = SessionError::Rejected(crate::protocol::ConnAckResult {
        return_code: 5,
        session_present: false,
    });
    assert_eq!(err.to_string(), "connection refused: 0x05 (not authorized)");
}
