//! Firmware version manifest (`current_version.json`)

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use super::OtaError;

/// File name of the manifest inside the firmware directory
pub const MANIFEST_FILE: &str = "current_version.json";

/// Metadata describing the firmware currently offered to devices
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionManifest {
    pub current_version: String,
    pub release_date: String,
    pub description: String,
    pub firmware_url: String,
    pub signature: String,
    pub size_bytes: u64,
    #[serde(default)]
    pub release_notes: Vec<String>,
    pub compatibility: Compatibility,
}

/// Which devices may take the update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Compatibility {
    pub min_version: String,
    pub board: String,
}

impl VersionManifest {
    /// Placeholder manifest pointing at `base_url`
    pub fn sample(base_url: &str) -> Self {
        let version = "1.3.0";
        Self {
            current_version: version.to_string(),
            release_date: "2025-10-18".to_string(),
            description: "OTA update capability added".to_string(),
            firmware_url: format!(
                "{}/firmware/esp32s3_firmware_v{}.bin",
                base_url.trim_end_matches('/'),
                version
            ),
            signature: "placeholder_hash_will_be_calculated".to_string(),
            size_bytes: 0,
            release_notes: vec![
                "Added Over-The-Air update functionality".to_string(),
                "Enhanced firmware versioning system".to_string(),
                "Improved MQTT connection stability".to_string(),
                "Added cryptographic signature validation".to_string(),
            ],
            compatibility: Compatibility {
                min_version: "1.0.0".to_string(),
                board: "esp32-s3-devkitc-1".to_string(),
            },
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, OtaError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, OtaError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Create `dir` and a sample manifest in it unless one already exists.
///
/// Returns the manifest path.
pub fn ensure_manifest<P: AsRef<Path>>(dir: P, base_url: &str) -> Result<PathBuf, OtaError> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;

    let path = dir.join(MANIFEST_FILE);
    if !path.exists() {
        std::fs::write(&path, VersionManifest::sample(base_url).to_json_pretty()?)?;
        info!("Created sample firmware manifest at {}", path.display());
    }
    Ok(path)
}
