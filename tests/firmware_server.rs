//! Integration tests for the firmware HTTP server over a real socket

use std::net::SocketAddr;

use pretty_assertions::assert_eq;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use sensorctl::ota::{ensure_manifest, VersionManifest};
use sensorctl::server::FirmwareServer;

async fn start(dir: &TempDir) -> SocketAddr {
    let server = FirmwareServer::bind("127.0.0.1:0".parse().unwrap(), dir.path())
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    addr
}

/// Send a raw HTTP/1.1 request and split the reply into head and body
async fn request(addr: SocketAddr, method: &str, path: &str) -> (String, Vec<u8>) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let req = format!(
        "{} {} HTTP/1.1\r\nHost: {}\r\nUser-Agent: ESP32-OTA\r\nConnection: close\r\n\r\n",
        method, path, addr
    );
    stream.write_all(req.as_bytes()).await.unwrap();

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();

    let split = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("response has a header terminator");
    let head = String::from_utf8(raw[..split].to_vec()).unwrap();
    (head, raw[split + 4..].to_vec())
}

#[tokio::test]
async fn test_version_endpoint_serves_manifest() {
    let dir = TempDir::new().unwrap();
    ensure_manifest(dir.path(), "http://192.168.1.10:8080").unwrap();
    let addr = start(&dir).await;

    let (head, body) = request(addr, "GET", "/api/version").await;
    assert!(head.starts_with("HTTP/1.1 200"), "{}", head);
    assert!(head.to_lowercase().contains("content-type: application/json"));

    let manifest: VersionManifest = serde_json::from_slice(&body).unwrap();
    assert_eq!(manifest, VersionManifest::sample("http://192.168.1.10:8080"));
}

#[tokio::test]
async fn test_firmware_download() {
    let dir = TempDir::new().unwrap();
    let image: Vec<u8> = (0..=255u8).cycle().take(5000).collect();
    std::fs::write(dir.path().join("esp32s3_firmware_v1.3.0.bin"), &image).unwrap();
    let addr = start(&dir).await;

    let (head, body) = request(addr, "GET", "/firmware/esp32s3_firmware_v1.3.0.bin").await;
    let head = head.to_lowercase();
    assert!(head.starts_with("http/1.1 200"), "{}", head);
    assert!(head.contains("content-type: application/octet-stream"));
    assert!(head.contains("attachment; filename=\"esp32s3_firmware_v1.3.0.bin\""));
    assert!(head.contains("content-length: 5000"));
    assert_eq!(body, image);
}

#[tokio::test]
async fn test_missing_firmware_is_404() {
    let dir = TempDir::new().unwrap();
    let addr = start(&dir).await;

    let (head, _) = request(addr, "GET", "/firmware/absent.bin").await;
    assert!(head.starts_with("HTTP/1.1 404"), "{}", head);
}

#[tokio::test]
async fn test_traversal_is_rejected() {
    let outer = TempDir::new().unwrap();
    std::fs::write(outer.path().join("secret.txt"), "nope").unwrap();
    let dir = TempDir::new_in(outer.path()).unwrap();
    let addr = start(&dir).await;

    let (head, body) = request(addr, "GET", "/../secret.txt").await;
    assert!(head.starts_with("HTTP/1.1 400"), "{}", head);
    assert!(!String::from_utf8_lossy(&body).contains("nope"));
}

#[tokio::test]
async fn test_post_not_allowed() {
    let dir = TempDir::new().unwrap();
    let addr = start(&dir).await;

    let (head, _) = request(addr, "POST", "/api/version").await;
    assert!(head.starts_with("HTTP/1.1 405"), "{}", head);
}
