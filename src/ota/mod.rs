//! OTA Update Tooling
//!
//! Firmware digests, the update notification a device listens for on
//! `<hostname>/firmware/update`, and the version manifest served next to the
//! firmware images.

mod manifest;

#[cfg(test)]
mod tests;

pub use manifest::{ensure_manifest, Compatibility, VersionManifest, MANIFEST_FILE};

use std::fmt;
use std::fmt::Write as _;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::protocol::ConnectRequest;
use crate::session::{self, SessionError};

/// Chunk size used when hashing firmware images
const HASH_CHUNK: usize = 4096;

/// OTA error types
#[derive(Debug)]
pub enum OtaError {
    /// IO error reading firmware or manifest
    Io(io::Error),
    /// JSON encoding error
    Json(serde_json::Error),
    /// No firmware signature was supplied or computed
    MissingSignature,
    /// Broker exchange failed
    Session(SessionError),
}

impl fmt::Display for OtaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OtaError::Io(e) => write!(f, "IO error: {}", e),
            OtaError::Json(e) => write!(f, "JSON error: {}", e),
            OtaError::MissingSignature => write!(f, "firmware signature is required"),
            OtaError::Session(e) => write!(f, "MQTT error: {}", e),
        }
    }
}

impl std::error::Error for OtaError {}

impl From<io::Error> for OtaError {
    fn from(e: io::Error) -> Self {
        OtaError::Io(e)
    }
}

impl From<serde_json::Error> for OtaError {
    fn from(e: serde_json::Error) -> Self {
        OtaError::Json(e)
    }
}

impl From<SessionError> for OtaError {
    fn from(e: SessionError) -> Self {
        OtaError::Session(e)
    }
}

/// SHA-256 of a file as lowercase hex, read in 4 KiB chunks
pub fn firmware_sha256<P: AsRef<Path>>(path: P) -> io::Result<String> {
    let mut file = File::open(path.as_ref())?;
    let mut hasher = Sha256::new();
    let mut chunk = [0u8; HASH_CHUNK];

    loop {
        let n = file.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        hasher.update(&chunk[..n]);
    }

    Ok(to_hex(&hasher.finalize()))
}

fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{:02x}", b);
    }
    out
}

/// Write `hash` to `<firmware>.sha256` and return that path
pub fn write_hash_file<P: AsRef<Path>>(firmware: P, hash: &str) -> io::Result<PathBuf> {
    let mut name = firmware.as_ref().as_os_str().to_owned();
    name.push(".sha256");
    let path = PathBuf::from(name);
    std::fs::write(&path, hash)?;
    Ok(path)
}

/// Topic a device subscribes to for update notifications
pub fn update_topic(hostname: &str) -> String {
    format!("{}/firmware/update", hostname)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Update notification published to a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateMessage {
    pub version: String,
    pub firmware_url: String,
    /// SHA-256 of the firmware image, lowercase hex
    pub signature: String,
    pub force_update: bool,
    pub timestamp: u64,
    pub description: String,
    pub release_notes: String,
}

impl UpdateMessage {
    pub fn new(
        version: impl Into<String>,
        firmware_url: impl Into<String>,
        signature: impl Into<String>,
    ) -> Result<Self, OtaError> {
        let version = version.into();
        let signature = signature.into();
        if signature.trim().is_empty() {
            return Err(OtaError::MissingSignature);
        }

        Ok(Self {
            description: format!("Firmware update to version {}", version),
            version,
            firmware_url: firmware_url.into(),
            signature,
            force_update: false,
            timestamp: unix_now(),
            release_notes: "See changelog for details".to_string(),
        })
    }

    pub fn with_force_update(mut self, force: bool) -> Self {
        self.force_update = force;
        self
    }

    pub fn to_json(&self) -> Result<String, OtaError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Publish `message` to the device's update topic
pub fn send_update(
    addr: &str,
    request: &ConnectRequest,
    hostname: &str,
    message: &UpdateMessage,
    timeout: std::time::Duration,
) -> Result<(), OtaError> {
    let topic = update_topic(hostname);
    let payload = message.to_json()?;
    debug!("Update payload: {}", payload);

    session::publish_once(addr, request, &topic, payload.as_bytes(), timeout)?;
    info!("Update to {} announced on '{}'", message.version, topic);
    Ok(())
}
