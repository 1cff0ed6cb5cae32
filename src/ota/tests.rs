//! OTA module tests

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use super::*;

#[test]
fn test_firmware_sha256_known_vector() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("fw.bin");
    std::fs::write(&path, b"abc").unwrap();

    assert_eq!(
        firmware_sha256(&path).unwrap(),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}

#[test]
fn test_firmware_sha256_spans_chunks() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("fw.bin");
    let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
    std::fs::write(&path, &data).unwrap();

    let expected = to_hex(&Sha256::digest(&data));
    assert_eq!(firmware_sha256(&path).unwrap(), expected);
}

#[test]
fn test_firmware_sha256_missing_file() {
    let dir = TempDir::new().unwrap();
    let err = firmware_sha256(dir.path().join("absent.bin")).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
}

#[test]
fn test_write_hash_file_appends_extension() {
    let dir = TempDir::new().unwrap();
    let firmware = dir.path().join("esp32_v1.3.0.bin");

    let path = write_hash_file(&firmware, "deadbeef").unwrap();
    assert_eq!(path, dir.path().join("esp32_v1.3.0.bin.sha256"));
    assert_eq!(std::fs::read_to_string(path).unwrap(), "deadbeef");
}

#[test]
fn test_update_topic() {
    assert_eq!(update_topic("sensor_8EA40C"), "sensor_8EA40C/firmware/update");
}

#[test]
fn test_update_message_fields() {
    let msg = UpdateMessage::new("1.3.0", "http://host:8080/firmware/fw.bin", "abc123")
        .unwrap()
        .with_force_update(true);

    assert_eq!(msg.description, "Firmware update to version 1.3.0");
    assert_eq!(msg.release_notes, "See changelog for details");
    assert!(msg.force_update);
    assert!(msg.timestamp > 0);

    let json: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
    assert_eq!(json["version"], "1.3.0");
    assert_eq!(json["firmware_url"], "http://host:8080/firmware/fw.bin");
    assert_eq!(json["signature"], "abc123");
    assert_eq!(json["force_update"], true);
}

#[test]
fn test_update_message_requires_signature() {
    assert!(matches!(
        UpdateMessage::new("1.3.0", "http://x/fw.bin", "  "),
        Err(OtaError::MissingSignature)
    ));
}

#[test]
fn test_sample_manifest_url() {
    let manifest = VersionManifest::sample("http://localhost:8080/");
    assert_eq!(
        manifest.firmware_url,
        "http://localhost:8080/firmware/esp32s3_firmware_v1.3.0.bin"
    );
    assert_eq!(manifest.compatibility.board, "esp32-s3-devkitc-1");
}

#[test]
fn test_ensure_manifest_creates_then_keeps() {
    let dir = TempDir::new().unwrap();
    let fw_dir = dir.path().join("firmware");

    let path = ensure_manifest(&fw_dir, "http://localhost:8080").unwrap();
    assert_eq!(path, fw_dir.join(MANIFEST_FILE));
    let created = VersionManifest::load(&path).unwrap();
    assert_eq!(created, VersionManifest::sample("http://localhost:8080"));

    // Existing manifests are never overwritten
    let mut edited = created.clone();
    edited.current_version = "2.0.0".to_string();
    std::fs::write(&path, edited.to_json_pretty().unwrap()).unwrap();

    ensure_manifest(&fw_dir, "http://localhost:8080").unwrap();
    assert_eq!(VersionManifest::load(&path).unwrap().current_version, "2.0.0");
}
