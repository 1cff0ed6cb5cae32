//! Blocking Broker Session
//!
//! A thin, synchronous I/O layer around the codec: write a CONNECT, wait for
//! the CONNACK, optionally push one QoS 0 PUBLISH and disconnect. The stream
//! is supplied by the caller and its read timeout bounds every wait.

mod error;

#[cfg(test)]
mod tests;

pub use error::SessionError;

use std::io::{self, ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use bytes::BytesMut;
use tracing::{debug, info, warn};

use crate::codec::{decode_connack, encode_connect, encode_disconnect, encode_publish, CONNACK_LEN};
use crate::protocol::{ConnAckResult, ConnectRequest, DecodeError};

/// Open a TCP connection with connect, read and write timeouts applied
pub fn connect_tcp(addr: &str, timeout: Duration) -> Result<TcpStream, SessionError> {
    let mut last_err = None;

    for socket_addr in addr.to_socket_addrs()? {
        match TcpStream::connect_timeout(&socket_addr, timeout) {
            Ok(stream) => {
                stream.set_read_timeout(Some(timeout))?;
                stream.set_write_timeout(Some(timeout))?;
                stream.set_nodelay(true)?;
                debug!("TCP connected to {}", socket_addr);
                return Ok(stream);
            }
            Err(e) => {
                debug!("TCP connect to {} failed: {}", socket_addr, e);
                last_err = Some(e);
            }
        }
    }

    Err(match last_err {
        Some(e) => SessionError::from(e),
        None => SessionError::Io(io::Error::new(
            ErrorKind::InvalidInput,
            format!("{} did not resolve to any address", addr),
        )),
    })
}

/// One client connection over a blocking byte stream
pub struct Session<S> {
    stream: S,
    buf: BytesMut,
}

impl<S: Read + Write> Session<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buf: BytesMut::with_capacity(256),
        }
    }

    /// Send CONNECT and wait for the broker's CONNACK
    pub fn handshake(&mut self, request: &ConnectRequest) -> Result<ConnAckResult, SessionError> {
        self.buf.clear();
        encode_connect(request, &mut self.buf)?;
        debug!(
            "Sending CONNECT for '{}' ({} bytes)",
            request.client_id,
            self.buf.len()
        );
        self.send()?;

        let mut reply = [0u8; 64];
        let mut received = Vec::with_capacity(CONNACK_LEN);
        loop {
            match decode_connack(&received) {
                Ok(connack) => {
                    debug!(
                        "CONNACK received: {} session_present={}",
                        connack.describe(),
                        connack.session_present
                    );
                    return Ok(connack);
                }
                Err(DecodeError::Incomplete) => {}
                Err(e) => return Err(e.into()),
            }

            let n = self.stream.read(&mut reply)?;
            if n == 0 {
                return Err(SessionError::ConnectionClosed);
            }
            received.extend_from_slice(&reply[..n]);
        }
    }

    /// Publish a QoS 0 message
    pub fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), SessionError> {
        self.buf.clear();
        encode_publish(topic, payload, retain, &mut self.buf)?;
        debug!("Publishing {} bytes to '{}'", payload.len(), topic);
        self.send()
    }

    /// Send DISCONNECT
    pub fn disconnect(&mut self) -> Result<(), SessionError> {
        self.buf.clear();
        encode_disconnect(&mut self.buf);
        self.send()
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    fn send(&mut self) -> Result<(), SessionError> {
        self.stream.write_all(&self.buf)?;
        self.stream.flush()?;
        Ok(())
    }
}

/// Connect to `addr`, send CONNECT and report the broker's answer.
///
/// A rejection is a successful probe: the CONNACK is returned either way.
pub fn probe(
    addr: &str,
    request: &ConnectRequest,
    timeout: Duration,
) -> Result<ConnAckResult, SessionError> {
    // Reject oversize fields before opening a socket
    request.encode()?;

    let stream = connect_tcp(addr, timeout)?;
    info!("TCP connection to {} established", addr);

    let mut session = Session::new(stream);
    let connack = session.handshake(request)?;

    if connack.is_accepted() {
        info!("Broker accepted connection for '{}'", request.client_id);
        if let Err(e) = session.disconnect() {
            warn!("DISCONNECT failed: {}", e);
        }
    } else {
        warn!("Broker rejected connection: {}", connack.describe());
    }

    Ok(connack)
}

/// Connect, require acceptance, publish one QoS 0 message and disconnect
pub fn publish_once(
    addr: &str,
    request: &ConnectRequest,
    topic: &str,
    payload: &[u8],
    timeout: Duration,
) -> Result<(), SessionError> {
    request.encode()?;

    let stream = connect_tcp(addr, timeout)?;
    let mut session = Session::new(stream);
    let connack = session.handshake(request)?;
    if !connack.is_accepted() {
        return Err(SessionError::Rejected(connack));
    }
    info!("Connected to {}", addr);

    session.publish(topic, payload, false)?;
    info!("Published {} bytes to '{}'", payload.len(), topic);
    session.disconnect()?;
    Ok(())
}
