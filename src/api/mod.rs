//! Upload UI and live feed over a single-threaded HTTP server.
//!
//! Routes:
//! - `GET /` upload form
//! - `POST /upload` multipart upload, processed synchronously
//! - `GET /live_feed` annotated camera stream (`multipart/x-mixed-replace`)
//! - `GET /static/uploads/<name>` uploaded and processed files
//! - `GET /health` liveness probe
//!
//! One connection is handled at a time. The live feed holds the server until
//! the client disconnects, the camera stops, or the server shuts down.

mod http;
mod multipart;
mod pages;

use anyhow::{anyhow, Context, Result};
use std::io::Write;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::config::DentscanConfig;
use crate::ingest::{CameraConfig, CameraSource};
use crate::process::{MediaJob, Processor, LIVE_BOUNDARY};
use crate::upload::{allowed_file, secure_filename};
use http::{
    read_request, write_html, write_json, write_redirect, write_response, write_stream_head,
    write_text, HttpRequest, RequestError,
};
use multipart::{boundary_from_content_type, parse_form_data};

const STATIC_UPLOADS_PREFIX: &str = "/static/uploads/";
const UPLOAD_FIELD: &str = "file";
const UNSUPPORTED_FILE_TYPE: &str = "Unsupported file type.";

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
    pub uploads_dir: PathBuf,
    pub allowed_extensions: Vec<String>,
    pub max_upload_bytes: usize,
    pub camera: CameraConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self::from_config(&DentscanConfig::default())
    }
}

impl ApiConfig {
    pub fn from_config(cfg: &DentscanConfig) -> Self {
        Self {
            addr: cfg.server.addr.clone(),
            uploads_dir: cfg.uploads_dir.clone(),
            allowed_extensions: cfg.allowed_extensions.clone(),
            max_upload_bytes: cfg.server.max_upload_bytes,
            camera: CameraConfig::from(&cfg.camera),
        }
    }
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct ApiServer {
    cfg: ApiConfig,
    processor: Arc<Processor>,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, processor: Arc<Processor>) -> Self {
        Self { cfg, processor }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        std::fs::create_dir_all(&self.cfg.uploads_dir).with_context(|| {
            format!(
                "create uploads directory {}",
                self.cfg.uploads_dir.display()
            )
        })?;

        let configured_addr: SocketAddr = self
            .cfg
            .addr
            .parse()
            .with_context(|| format!("invalid listen address '{}'", self.cfg.addr))?;
        let listener = TcpListener::bind(configured_addr)
            .with_context(|| format!("bind {}", configured_addr))?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let cfg = self.cfg;
        let processor = self.processor;
        let join = std::thread::spawn(move || {
            if let Err(err) = run_api(listener, &cfg, &processor, &shutdown_thread) {
                log::error!("http server stopped: {}", err);
            }
        });

        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_api(
    listener: TcpListener,
    cfg: &ApiConfig,
    processor: &Processor,
    shutdown: &AtomicBool,
) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                if let Err(err) = handle_connection(stream, cfg, processor, shutdown) {
                    log::warn!("request from {} failed: {:#}", peer, err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn handle_connection(
    mut stream: TcpStream,
    cfg: &ApiConfig,
    processor: &Processor,
    shutdown: &AtomicBool,
) -> Result<()> {
    stream.set_nonblocking(false)?;
    let request = match read_request(&mut stream, cfg.max_upload_bytes) {
        Ok(request) => request,
        Err(RequestError::TooLarge(len)) => {
            write_text(&mut stream, 413, "Upload too large.")?;
            return Err(anyhow!(
                "request body of {} bytes exceeds limit of {}",
                len,
                cfg.max_upload_bytes
            ));
        }
        Err(RequestError::Malformed(err)) => {
            // Best effort; the peer may already be gone.
            let _ = write_text(&mut stream, 400, "Bad Request");
            return Err(err);
        }
    };
    log::debug!("{} {}", request.method, request.path);

    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/") => write_html(&mut stream, 200, &pages::index_page()),
        ("POST", "/upload") => handle_upload(&mut stream, &request, cfg, processor),
        ("GET", "/live_feed") => handle_live_feed(&mut stream, cfg, processor, shutdown),
        ("GET", "/health") => write_json(
            &mut stream,
            200,
            &serde_json::json!({ "status": "ok", "backend": processor.detector_name() }),
        ),
        ("GET", path) if path.starts_with(STATIC_UPLOADS_PREFIX) => {
            serve_upload(&mut stream, &cfg.uploads_dir, &path[STATIC_UPLOADS_PREFIX.len()..])
        }
        (_, "/" | "/upload" | "/live_feed" | "/health") => {
            write_text(&mut stream, 405, "Method Not Allowed")
        }
        _ => write_text(&mut stream, 404, "Not Found"),
    }
}

/// Outcome of validating an upload form.
enum UploadCheck {
    Accepted { filename: String, data: Vec<u8> },
    Rejected(&'static str),
}

fn check_upload(request: &HttpRequest, allowed: &[String]) -> Result<UploadCheck> {
    let Some(boundary) = request
        .header("content-type")
        .and_then(boundary_from_content_type)
    else {
        return Ok(UploadCheck::Rejected("not a multipart form"));
    };
    let parts = parse_form_data(&request.body, &boundary)?;
    let Some(part) = parts.into_iter().find(|part| part.name == UPLOAD_FIELD) else {
        return Ok(UploadCheck::Rejected("missing file field"));
    };
    let Some(original) = part.filename.filter(|name| !name.is_empty()) else {
        return Ok(UploadCheck::Rejected("empty filename"));
    };
    if !allowed_file(&original, allowed) {
        log::warn!("rejected upload '{}': extension not allowed", original);
        return Ok(UploadCheck::Rejected("extension not allowed"));
    }
    let Some(filename) = secure_filename(&original) else {
        return Ok(UploadCheck::Rejected("filename empty after sanitizing"));
    };
    log::debug!(
        "upload '{}' stored as '{}' ({})",
        original,
        filename,
        part.content_type.as_deref().unwrap_or("no content type")
    );
    Ok(UploadCheck::Accepted {
        filename,
        data: part.data,
    })
}

fn handle_upload(
    stream: &mut TcpStream,
    request: &HttpRequest,
    cfg: &ApiConfig,
    processor: &Processor,
) -> Result<()> {
    let (filename, data) = match check_upload(request, &cfg.allowed_extensions) {
        Ok(UploadCheck::Accepted { filename, data }) => (filename, data),
        Ok(UploadCheck::Rejected(reason)) => {
            log::info!("upload rejected: {}", reason);
            return write_redirect(stream, "/");
        }
        Err(err) => {
            log::warn!("upload rejected: {:#}", err);
            return write_redirect(stream, "/");
        }
    };

    let input_path = cfg.uploads_dir.join(&filename);
    if let Err(err) = std::fs::create_dir_all(&cfg.uploads_dir)
        .and_then(|_| std::fs::write(&input_path, &data))
    {
        write_text(stream, 500, "Failed to store upload.")?;
        return Err(anyhow::Error::new(err)
            .context(format!("store upload {}", input_path.display())));
    }
    log::info!("stored upload {} ({} bytes)", input_path.display(), data.len());

    let Some(job) = MediaJob::for_upload(&cfg.uploads_dir, &filename) else {
        return write_text(stream, 415, UNSUPPORTED_FILE_TYPE);
    };
    let summary = match processor.process(&job) {
        Ok(summary) => summary,
        Err(err) => {
            write_text(stream, 500, "Processing failed.")?;
            return Err(err.context(format!("process upload {}", filename)));
        }
    };

    let output_name = summary
        .output_path
        .file_name()
        .and_then(|name| name.to_str())
        .context("output path has no file name")?;
    let output_url = format!("{STATIC_UPLOADS_PREFIX}{output_name}");
    write_html(stream, 200, &pages::result_page(&output_url, job.kind))
}

fn handle_live_feed(
    stream: &mut TcpStream,
    cfg: &ApiConfig,
    processor: &Processor,
    shutdown: &AtomicBool,
) -> Result<()> {
    let feed = CameraSource::new(cfg.camera.clone())
        .and_then(|camera| processor.live_feed(Box::new(camera)));
    let feed = match feed {
        Ok(feed) => feed,
        Err(err) => {
            write_text(stream, 500, "Camera unavailable.")?;
            return Err(err);
        }
    };

    write_stream_head(
        stream,
        &format!("multipart/x-mixed-replace; boundary={LIVE_BOUNDARY}"),
    )?;
    log::info!("live feed started from {}", cfg.camera.device);
    let mut sent = 0u64;
    for part in feed {
        if shutdown.load(Ordering::SeqCst) {
            log::info!("live feed stopped for shutdown");
            break;
        }
        if let Err(err) = stream.write_all(&part).and_then(|_| stream.flush()) {
            log::info!("live feed client disconnected: {}", err);
            break;
        }
        sent += 1;
    }
    log::info!("live feed closed after {} frame(s)", sent);
    Ok(())
}

fn serve_upload(stream: &mut TcpStream, uploads_dir: &Path, name: &str) -> Result<()> {
    if secure_filename(name).as_deref() != Some(name) {
        return write_text(stream, 404, "Not Found");
    }
    let path = uploads_dir.join(name);
    match std::fs::read(&path) {
        Ok(bytes) => write_response(stream, 200, content_type_for(name), &bytes),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            write_text(stream, 404, "Not Found")
        }
        Err(err) => {
            write_text(stream, 500, "Failed to read file.")?;
            Err(anyhow::Error::new(err).context(format!("read {}", path.display())))
        }
    }
}

fn content_type_for(name: &str) -> &'static str {
    let ext = crate::upload::extension_of(name)
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "mp4" => "video/mp4",
        "gif" => "image/gif",
        _ => "application/octet-stream",
    }
}
