use anyhow::Result;
use image::{Rgb, RgbImage};
use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

use dentscan::api::{ApiConfig, ApiHandle, ApiServer};
use dentscan::{
    Annotator, BoundingBox, CameraConfig, ClassLabelTable, Detection, Processor, StubBackend,
};

const BOUNDARY: &str = "----dentscan-test-boundary";

struct TestApi {
    dir: tempfile::TempDir,
    api_handle: Option<ApiHandle>,
}

impl TestApi {
    fn new(configure: impl FnOnce(&mut ApiConfig)) -> Result<Self> {
        let dir = tempdir()?;
        let mut api_config = ApiConfig {
            addr: "127.0.0.1:0".to_string(),
            uploads_dir: dir.path().join("static").join("uploads"),
            camera: CameraConfig {
                device: "stub://camera".to_string(),
                target_fps: 30,
                width: 64,
                height: 48,
                max_frames: Some(3),
            },
            ..ApiConfig::default()
        };
        configure(&mut api_config);

        let detections = vec![Detection::new(BoundingBox::new(8, 20, 56, 44), 6, 0.87)];
        let processor = Processor::new(
            Arc::new(StubBackend::with_detections(detections)),
            Annotator::new(Arc::new(ClassLabelTable::car_damage())),
        );
        let api_handle = ApiServer::new(api_config, Arc::new(processor)).spawn()?;

        Ok(Self {
            dir,
            api_handle: Some(api_handle),
        })
    }

    fn handle(&self) -> &ApiHandle {
        self.api_handle
            .as_ref()
            .expect("test API handle should be initialized")
    }

    fn uploads_dir(&self) -> std::path::PathBuf {
        self.dir.path().join("static").join("uploads")
    }

    fn send(&self, request: &[u8]) -> Result<(String, Vec<u8>)> {
        let mut stream = TcpStream::connect(self.handle().addr)?;
        stream.write_all(request)?;
        read_response(&mut stream)
    }

    fn get(&self, path: &str) -> Result<(String, Vec<u8>)> {
        let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        self.send(request.as_bytes())
    }

    fn upload(&self, field: &str, filename: &str, data: &[u8]) -> Result<(String, Vec<u8>)> {
        let body = multipart_body(field, filename, data);
        let mut request = format!(
            "POST /upload HTTP/1.1\r\nHost: localhost\r\nContent-Type: multipart/form-data; boundary={BOUNDARY}\r\nContent-Length: {}\r\n\r\n",
            body.len()
        )
        .into_bytes();
        request.extend_from_slice(&body);
        self.send(&request)
    }
}

impl Drop for TestApi {
    fn drop(&mut self) {
        if let Some(handle) = self.api_handle.take() {
            handle.stop().expect("failed to stop API server");
        }
    }
}

fn read_response(stream: &mut TcpStream) -> Result<(String, Vec<u8>)> {
    let mut response = Vec::new();
    stream.read_to_end(&mut response)?;
    let split = response
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .unwrap_or(response.len());
    let headers = String::from_utf8_lossy(&response[..split]).into_owned();
    let body = response.get(split + 4..).unwrap_or_default().to_vec();
    Ok((headers, body))
}

fn multipart_body(field: &str, filename: &str, data: &[u8]) -> Vec<u8> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn jpeg_bytes() -> Result<Vec<u8>> {
    let frame = RgbImage::from_pixel(64, 48, Rgb([90, 90, 90]));
    let mut out = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, 90).encode_image(&frame)?;
    Ok(out)
}

fn count_occurrences(haystack: &[u8], needle: &[u8]) -> usize {
    haystack.windows(needle.len()).filter(|w| *w == needle).count()
}

#[test]
fn index_serves_upload_form() -> Result<()> {
    let api = TestApi::new(|_| {})?;
    let (headers, body) = api.get("/")?;
    assert!(headers.contains("200 OK"));
    assert!(headers.contains("text/html"));
    let body = String::from_utf8(body)?;
    assert!(body.contains(r#"enctype="multipart/form-data""#));
    assert!(body.contains(r#"name="file""#));
    assert!(body.contains("/live_feed"));
    Ok(())
}

#[test]
fn health_reports_backend() -> Result<()> {
    let api = TestApi::new(|_| {})?;
    let (headers, body) = api.get("/health")?;
    assert!(headers.contains("200 OK"));
    let value: serde_json::Value = serde_json::from_slice(&body)?;
    assert_eq!(value["status"], "ok");
    assert_eq!(value["backend"], "stub");
    Ok(())
}

#[test]
fn uppercase_jpg_upload_is_processed_and_served() -> Result<()> {
    let api = TestApi::new(|_| {})?;
    let input = jpeg_bytes()?;
    let (headers, body) = api.upload("file", "car.JPG", &input)?;
    assert!(headers.contains("200 OK"), "unexpected response: {headers}");
    let page = String::from_utf8(body)?;
    assert!(page.contains(r#"<img src="/static/uploads/output_car.JPG""#));

    assert_eq!(std::fs::read(api.uploads_dir().join("car.JPG"))?, input);
    let output_path = api.uploads_dir().join("output_car.JPG");
    assert!(output_path.exists());

    let (headers, served) = api.get("/static/uploads/output_car.JPG")?;
    assert!(headers.contains("200 OK"));
    assert!(headers.contains("image/jpeg"));
    assert_eq!(served, std::fs::read(&output_path)?);
    let decoded = image::load_from_memory(&served)?;
    assert_eq!((decoded.width(), decoded.height()), (64, 48));
    Ok(())
}

#[test]
fn disallowed_extension_redirects_without_storing() -> Result<()> {
    let api = TestApi::new(|_| {})?;
    let (headers, _) = api.upload("file", "photo.GIF", b"GIF89a")?;
    assert!(headers.contains("303 See Other"));
    assert!(headers.contains("Location: /"));
    assert!(!api.uploads_dir().join("photo.GIF").exists());
    Ok(())
}

#[test]
fn missing_file_field_or_empty_name_redirects() -> Result<()> {
    let api = TestApi::new(|_| {})?;
    let (headers, _) = api.upload("document", "car.jpg", b"data")?;
    assert!(headers.contains("303 See Other"));

    let (headers, _) = api.upload("file", "", b"")?;
    assert!(headers.contains("303 See Other"));

    let request = "POST /upload HTTP/1.1\r\nHost: localhost\r\nContent-Length: 0\r\n\r\n";
    let (headers, _) = api.send(request.as_bytes())?;
    assert!(headers.contains("303 See Other"));
    Ok(())
}

#[test]
fn allowed_but_unprocessable_type_returns_plain_text() -> Result<()> {
    let api = TestApi::new(|cfg| cfg.allowed_extensions.push("gif".to_string()))?;
    let (headers, body) = api.upload("file", "photo.gif", b"GIF89a")?;
    assert!(headers.contains("text/plain"));
    assert_eq!(body, b"Unsupported file type.");
    Ok(())
}

#[test]
fn oversized_upload_is_refused() -> Result<()> {
    let api = TestApi::new(|cfg| cfg.max_upload_bytes = 1024)?;
    let request = format!(
        "POST /upload HTTP/1.1\r\nHost: localhost\r\nContent-Type: multipart/form-data; boundary={BOUNDARY}\r\nContent-Length: 4096\r\n\r\n"
    );
    let (headers, _) = api.send(request.as_bytes())?;
    assert!(headers.contains("413"));
    Ok(())
}

#[test]
fn static_route_rejects_traversal_and_unknown_files() -> Result<()> {
    let api = TestApi::new(|_| {})?;
    let (headers, _) = api.get("/static/uploads/../secret.txt")?;
    assert!(headers.contains("404 Not Found"));
    let (headers, _) = api.get("/static/uploads/missing.png")?;
    assert!(headers.contains("404 Not Found"));
    let (headers, _) = api.get("/nope")?;
    assert!(headers.contains("404 Not Found"));
    Ok(())
}

#[test]
fn upload_route_only_accepts_post() -> Result<()> {
    let api = TestApi::new(|_| {})?;
    let (headers, _) = api.get("/upload")?;
    assert!(headers.contains("405 Method Not Allowed"));
    Ok(())
}

#[test]
fn live_feed_streams_until_camera_ends() -> Result<()> {
    let api = TestApi::new(|_| {})?;
    let (headers, body) = api.get("/live_feed")?;
    assert!(headers.contains("200 OK"));
    assert!(headers.contains("multipart/x-mixed-replace; boundary=frame"));
    assert_eq!(count_occurrences(&body, b"--frame\r\nContent-Type: image/jpeg\r\n\r\n"), 3);
    Ok(())
}

#[test]
fn live_feed_reports_unavailable_camera() -> Result<()> {
    let missing = Path::new("/nonexistent/dentscan-camera");
    let api = TestApi::new(|cfg| cfg.camera.device = missing.display().to_string())?;
    let (headers, body) = api.get("/live_feed")?;
    assert!(headers.contains("500 Internal Server Error"));
    assert_eq!(body, b"Camera unavailable.");
    Ok(())
}
