//! Packet-level data model

use bytes::Bytes;

use super::ConnectReturnCode;

/// Connect flag: clean session
pub const FLAG_CLEAN_SESSION: u8 = 0x02;
/// Connect flag: password present
pub const FLAG_PASSWORD: u8 = 0x40;
/// Connect flag: username present
pub const FLAG_USERNAME: u8 = 0x80;

/// Default keep alive in seconds
pub const DEFAULT_KEEP_ALIVE: u16 = 60;

/// CONNECT request (client -> server)
///
/// The password is carried as opaque bytes. In practice it is a JWT, but no
/// structure is assumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    /// Client identifier
    pub client_id: String,
    /// Username (sets connect flag bit 7)
    pub username: Option<String>,
    /// Password (sets connect flag bit 6)
    pub password: Option<Bytes>,
    /// Keep alive interval in seconds
    pub keep_alive: u16,
    /// Ask the broker to discard prior session state
    pub clean_session: bool,
}

impl ConnectRequest {
    /// Username + password + clean session, 60 second keep alive
    pub fn new(
        client_id: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<Bytes>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            username: Some(username.into()),
            password: Some(password.into()),
            keep_alive: DEFAULT_KEEP_ALIVE,
            clean_session: true,
        }
    }

    /// Anonymous request carrying only a client identifier
    pub fn anonymous(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            username: None,
            password: None,
            keep_alive: DEFAULT_KEEP_ALIVE,
            clean_session: true,
        }
    }

    pub fn with_keep_alive(mut self, keep_alive: u16) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn with_clean_session(mut self, clean_session: bool) -> Self {
        self.clean_session = clean_session;
        self
    }

    /// Connect flags byte for this request
    pub fn connect_flags(&self) -> u8 {
        let mut flags = 0;
        if self.username.is_some() {
            flags |= FLAG_USERNAME;
        }
        if self.password.is_some() {
            flags |= FLAG_PASSWORD;
        }
        if self.clean_session {
            flags |= FLAG_CLEAN_SESSION;
        }
        flags
    }
}

/// Parsed CONNACK (server -> client)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnAckResult {
    /// Raw return code; 0 is accepted, 1-5 are rejections
    pub return_code: u8,
    /// Broker kept session state for this client
    pub session_present: bool,
}

impl ConnAckResult {
    pub fn is_accepted(&self) -> bool {
        self.return_code == ConnectReturnCode::Accepted as u8
    }

    /// Typed return code, `None` for values outside the v3.1.1 table
    pub fn code(&self) -> Option<ConnectReturnCode> {
        ConnectReturnCode::from_u8(self.return_code)
    }

    pub fn describe(&self) -> String {
        match self.code() {
            Some(code) => format!("0x{:02x} ({})", self.return_code, code),
            None => format!("0x{:02x} (reserved)", self.return_code),
        }
    }
}
