//! Firmware HTTP Server
//!
//! Serves firmware images and the version manifest to devices performing an
//! OTA update:
//!
//! - `GET /api/version` returns the manifest JSON
//! - `GET /firmware/<name>.bin` downloads an image as an attachment
//! - `GET /` lists the firmware directory
//! - any other path is served as a file from the firmware directory

use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{self, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::ota::MANIFEST_FILE;

/// HTTP server for firmware downloads
pub struct FirmwareServer {
    listener: TcpListener,
    root: Arc<PathBuf>,
}

impl FirmwareServer {
    pub async fn bind(addr: SocketAddr, root: impl Into<PathBuf>) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            root: Arc::new(root.into()),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!(
            "Firmware server listening on http://{} (serving {})",
            self.local_addr()?,
            self.root.display()
        );

        loop {
            let (stream, peer) = self.listener.accept().await?;
            let io = TokioIo::new(stream);
            let root = self.root.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let root = root.clone();
                    async move { handle_request(req, root, peer).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    error!("Error serving firmware connection: {:?}", err);
                }
            });
        }
    }
}

pub(crate) async fn handle_request<B>(
    req: Request<B>,
    root: Arc<PathBuf>,
    peer: SocketAddr,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let head_only = req.method() == Method::HEAD;
    if req.method() != Method::GET && !head_only {
        let mut resp = text(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
        resp.headers_mut()
            .insert(header::ALLOW, HeaderValue::from_static("GET, HEAD"));
        return Ok(resp);
    }

    let path = req.uri().path();
    debug!("{} {} from {}", req.method(), path, peer);

    let mut response = match path {
        "/api/version" => version(&root).await,
        "/" => listing(&root).await,
        _ => match resolve(&root, path) {
            None => text(StatusCode::BAD_REQUEST, "Bad Request"),
            Some((file, true)) => {
                let agent = req
                    .headers()
                    .get(header::USER_AGENT)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("Unknown");
                info!("Firmware download requested: {} by {} ({})", path, peer, agent);
                firmware(&file).await
            }
            Some((file, false)) => static_file(&file).await,
        },
    };

    if head_only {
        *response.body_mut() = Full::new(Bytes::new());
    }
    Ok(response)
}

/// Map a request path onto the firmware directory.
///
/// Returns the file and whether it is a firmware image download, or `None`
/// when the path tries to leave the directory.
fn resolve(root: &Path, path: &str) -> Option<(PathBuf, bool)> {
    let (rest, firmware_route) = match path.strip_prefix("/firmware/") {
        Some(rest) => (rest, true),
        None => (path.trim_start_matches('/'), false),
    };

    let mut file = root.to_path_buf();
    for segment in rest.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." || segment.contains('\\') {
            return None;
        }
        file.push(segment);
    }

    let image = firmware_route && rest.ends_with(".bin");
    Some((file, image))
}

async fn version(root: &Path) -> Response<Full<Bytes>> {
    let path = root.join(MANIFEST_FILE);
    let content = match tokio::fs::read(&path).await {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return text(StatusCode::NOT_FOUND, "Version info not found");
        }
        Err(e) => {
            error!("Failed to read {}: {}", path.display(), e);
            return text(StatusCode::INTERNAL_SERVER_ERROR, "Server error");
        }
    };

    // Re-serialize so clients always receive well-formed JSON
    match serde_json::from_slice::<serde_json::Value>(&content)
        .and_then(|v| serde_json::to_vec_pretty(&v))
    {
        Ok(body) => build(
            StatusCode::OK,
            &[
                (header::CONTENT_TYPE, "application/json".to_string()),
                (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*".to_string()),
            ],
            Bytes::from(body),
        ),
        Err(e) => {
            error!("Invalid manifest {}: {}", path.display(), e);
            text(StatusCode::INTERNAL_SERVER_ERROR, "Server error")
        }
    }
}

async fn firmware(file: &Path) -> Response<Full<Bytes>> {
    let data = match tokio::fs::read(file).await {
        Ok(data) => data,
        Err(e) => {
            warn!("Firmware {} unavailable: {}", file.display(), e);
            return text(StatusCode::NOT_FOUND, "Firmware file not found");
        }
    };
    info!("Serving firmware: {} ({} bytes)", file.display(), data.len());

    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    build(
        StatusCode::OK,
        &[
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", name),
            ),
            (header::CACHE_CONTROL, "no-cache".to_string()),
            (header::CONTENT_LENGTH, data.len().to_string()),
        ],
        Bytes::from(data),
    )
}

async fn static_file(file: &Path) -> Response<Full<Bytes>> {
    match tokio::fs::read(file).await {
        Ok(data) => build(
            StatusCode::OK,
            &[
                (header::CONTENT_TYPE, content_type(file).to_string()),
                (header::CONTENT_LENGTH, data.len().to_string()),
            ],
            Bytes::from(data),
        ),
        Err(_) => text(StatusCode::NOT_FOUND, "Not Found"),
    }
}

async fn listing(root: &Path) -> Response<Full<Bytes>> {
    let mut entries = match tokio::fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(e) => {
            error!("Failed to list {}: {}", root.display(), e);
            return text(StatusCode::NOT_FOUND, "Not Found");
        }
    };

    let mut names = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();

    let mut body = names.join("\n");
    body.push('\n');
    text(StatusCode::OK, body)
}

fn content_type(file: &Path) -> &'static str {
    match file.extension().and_then(|e| e.to_str()) {
        Some("json") => "application/json",
        Some("txt") | Some("sha256") => "text/plain; charset=utf-8",
        Some("html") => "text/html; charset=utf-8",
        _ => "application/octet-stream",
    }
}

fn text(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    build(
        status,
        &[(header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string())],
        body.into(),
    )
}

fn build(
    status: StatusCode,
    headers: &[(header::HeaderName, String)],
    body: Bytes,
) -> Response<Full<Bytes>> {
    let mut builder = Response::builder().status(status);
    for (name, value) in headers {
        builder = builder.header(name, value.as_str());
    }
    builder.body(Full::new(body)).unwrap_or_else(|e| {
        error!("Failed to build response: {}", e);
        let mut resp = Response::new(Full::new(Bytes::from_static(b"Server error")));
        *resp.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        resp
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn peer() -> SocketAddr {
        "127.0.0.1:50000".parse().unwrap()
    }

    async fn get(root: &TempDir, method: Method, uri: &str) -> (StatusCode, hyper::HeaderMap, Bytes) {
        let req = Request::builder().method(method).uri(uri).body(()).unwrap();
        let resp = handle_request(req, Arc::new(root.path().to_path_buf()), peer())
            .await
            .unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        (status, headers, body)
    }

    #[test]
    fn test_resolve_paths() {
        let root = Path::new("/srv/fw");
        assert_eq!(
            resolve(root, "/firmware/esp32.bin"),
            Some((PathBuf::from("/srv/fw/esp32.bin"), true))
        );
        assert_eq!(
            resolve(root, "/firmware/notes.txt"),
            Some((PathBuf::from("/srv/fw/notes.txt"), false))
        );
        assert_eq!(
            resolve(root, "/current_version.json"),
            Some((PathBuf::from("/srv/fw/current_version.json"), false))
        );
        assert_eq!(resolve(root, "/firmware/../secret.bin"), None);
        assert_eq!(resolve(root, "/a//b"), None);
        assert_eq!(resolve(root, "/a\\b"), None);
    }

    #[tokio::test]
    async fn test_version_endpoint() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), r#"{"current_version":"1.3.0"}"#).unwrap();

        let (status, headers, body) = get(&dir, Method::GET, "/api/version").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["current_version"], "1.3.0");
    }

    #[tokio::test]
    async fn test_version_missing_and_invalid() {
        let dir = TempDir::new().unwrap();
        let (status, _, _) = get(&dir, Method::GET, "/api/version").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        std::fs::write(dir.path().join(MANIFEST_FILE), "{not json").unwrap();
        let (status, _, _) = get(&dir, Method::GET, "/api/version").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_firmware_download_headers() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("fw_v1.bin"), [1u8, 2, 3, 4]).unwrap();

        let (status, headers, body) = get(&dir, Method::GET, "/firmware/fw_v1.bin").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "application/octet-stream");
        assert_eq!(
            headers[header::CONTENT_DISPOSITION],
            "attachment; filename=\"fw_v1.bin\""
        );
        assert_eq!(headers[header::CACHE_CONTROL], "no-cache");
        assert_eq!(headers[header::CONTENT_LENGTH], "4");
        assert_eq!(&body[..], &[1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_firmware_missing() {
        let dir = TempDir::new().unwrap();
        let (status, _, _) = get(&dir, Method::GET, "/firmware/none.bin").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_head_has_headers_without_body() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("fw.bin"), [0u8; 16]).unwrap();

        let (status, headers, body) = get(&dir, Method::HEAD, "/firmware/fw.bin").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_LENGTH], "16");
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_traversal_and_method_rejected() {
        let dir = TempDir::new().unwrap();
        let (status, _, _) = get(&dir, Method::GET, "/firmware/../../etc/passwd").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, headers, _) = get(&dir, Method::POST, "/api/version").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(headers[header::ALLOW], "GET, HEAD");
    }

    #[tokio::test]
    async fn test_listing_and_static_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.bin"), b"x").unwrap();
        std::fs::write(dir.path().join("a.bin.sha256"), b"abc").unwrap();

        let (status, _, body) = get(&dir, Method::GET, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"a.bin.sha256\nb.bin\n");

        let (status, headers, body) = get(&dir, Method::GET, "/a.bin.sha256").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "text/plain; charset=utf-8");
        assert_eq!(&body[..], b"abc");
    }
}
