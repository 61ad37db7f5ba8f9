use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::detect::Detection;
use crate::labels::ClassLabelTable;

const DEFAULT_UPLOADS_DIR: &str = "static/uploads";
const DEFAULT_ALLOWED_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "mp4"];
const DEFAULT_ADDR: &str = "127.0.0.1:5000";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;
const DEFAULT_BACKEND: &str = "tract";
const DEFAULT_MODEL_PATH: &str = "Weights/best.onnx";
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_MIN_SCORE: f32 = 0.25;
const DEFAULT_IOU_THRESHOLD: f32 = 0.7;
const DEFAULT_CAMERA_DEVICE: &str = "/dev/video0";
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_CAMERA_FPS: u32 = 30;

const KNOWN_BACKENDS: [&str; 2] = ["tract", "stub"];

#[derive(Debug, Deserialize, Default)]
struct DentscanConfigFile {
    uploads_dir: Option<PathBuf>,
    allowed_extensions: Option<Vec<String>>,
    labels: Option<Vec<String>>,
    server: Option<ServerConfigFile>,
    detector: Option<DetectorConfigFile>,
    annotate: Option<AnnotateConfigFile>,
    camera: Option<CameraConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ServerConfigFile {
    addr: Option<String>,
    max_upload_bytes: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    input_size: Option<u32>,
    min_score: Option<f32>,
    iou_threshold: Option<f32>,
    stub_detections: Option<Vec<Detection>>,
}

#[derive(Debug, Deserialize, Default)]
struct AnnotateConfigFile {
    font_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
    max_frames: Option<u64>,
}

/// Fully resolved service configuration.
#[derive(Debug, Clone)]
pub struct DentscanConfig {
    pub uploads_dir: PathBuf,
    pub allowed_extensions: Vec<String>,
    pub labels: ClassLabelTable,
    pub server: ServerSettings,
    pub detector: DetectorSettings,
    pub font_path: Option<PathBuf>,
    pub camera: CameraSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: String,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub backend: String,
    pub model_path: PathBuf,
    pub input_size: u32,
    pub min_score: f32,
    pub iou_threshold: f32,
    pub stub_detections: Vec<Detection>,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
    /// Stop the synthetic camera after this many frames (`stub://` only).
    pub max_frames: Option<u64>,
}

impl Default for DentscanConfig {
    fn default() -> Self {
        Self::from_parts(DentscanConfigFile::default(), ClassLabelTable::car_damage())
    }
}

impl DentscanConfig {
    /// Load from `DENTSCAN_CONFIG` (if set), apply env overrides, validate.
    pub fn load() -> Result<Self> {
        let config_path = non_empty_env("DENTSCAN_CONFIG").map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    /// Load from an explicit config file (if any), apply env overrides,
    /// validate.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => DentscanConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg)?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(mut file: DentscanConfigFile) -> Result<Self> {
        let labels = match file.labels.take() {
            Some(labels) => ClassLabelTable::new(labels)?,
            None => ClassLabelTable::car_damage(),
        };
        Ok(Self::from_parts(file, labels))
    }

    fn from_parts(file: DentscanConfigFile, labels: ClassLabelTable) -> Self {
        let server = file.server.unwrap_or_default();
        let detector = file.detector.unwrap_or_default();
        let camera = file.camera.unwrap_or_default();

        Self {
            uploads_dir: file
                .uploads_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_UPLOADS_DIR)),
            allowed_extensions: file.allowed_extensions.unwrap_or_else(|| {
                DEFAULT_ALLOWED_EXTENSIONS
                    .iter()
                    .map(|ext| ext.to_string())
                    .collect()
            }),
            labels,
            server: ServerSettings {
                addr: server.addr.unwrap_or_else(|| DEFAULT_ADDR.to_string()),
                max_upload_bytes: server.max_upload_bytes.unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            },
            detector: DetectorSettings {
                backend: detector
                    .backend
                    .unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
                model_path: detector
                    .model_path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
                input_size: detector.input_size.unwrap_or(DEFAULT_INPUT_SIZE),
                min_score: detector.min_score.unwrap_or(DEFAULT_MIN_SCORE),
                iou_threshold: detector.iou_threshold.unwrap_or(DEFAULT_IOU_THRESHOLD),
                stub_detections: detector.stub_detections.unwrap_or_default(),
            },
            font_path: file.annotate.and_then(|annotate| annotate.font_path),
            camera: CameraSettings {
                device: camera
                    .device
                    .unwrap_or_else(|| DEFAULT_CAMERA_DEVICE.to_string()),
                width: camera.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
                height: camera.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
                target_fps: camera.target_fps.unwrap_or(DEFAULT_CAMERA_FPS),
                max_frames: camera.max_frames,
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(dir) = non_empty_env("DENTSCAN_UPLOADS_DIR") {
            self.uploads_dir = PathBuf::from(dir);
        }
        if let Some(exts) = non_empty_env("DENTSCAN_ALLOWED_EXTENSIONS") {
            let parsed = split_csv(&exts);
            if !parsed.is_empty() {
                self.allowed_extensions = parsed;
            }
        }
        if let Some(addr) = non_empty_env("DENTSCAN_ADDR") {
            self.server.addr = addr;
        }
        if let Some(limit) = non_empty_env("DENTSCAN_MAX_UPLOAD_BYTES") {
            self.server.max_upload_bytes = limit.parse().map_err(|_| {
                anyhow!("DENTSCAN_MAX_UPLOAD_BYTES must be an integer number of bytes")
            })?;
        }
        if let Some(backend) = non_empty_env("DENTSCAN_BACKEND") {
            self.detector.backend = backend;
        }
        if let Some(path) = non_empty_env("DENTSCAN_MODEL_PATH") {
            self.detector.model_path = PathBuf::from(path);
        }
        if let Some(path) = non_empty_env("DENTSCAN_FONT_PATH") {
            self.font_path = Some(PathBuf::from(path));
        }
        if let Some(device) = non_empty_env("DENTSCAN_CAMERA_DEVICE") {
            self.camera.device = device;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        self.allowed_extensions = self
            .allowed_extensions
            .iter()
            .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        if self.allowed_extensions.is_empty() {
            return Err(anyhow!("allowed_extensions must not be empty"));
        }

        self.detector.backend = self.detector.backend.trim().to_ascii_lowercase();
        if !KNOWN_BACKENDS.contains(&self.detector.backend.as_str()) {
            return Err(anyhow!(
                "unknown detector backend '{}'; expected one of {}",
                self.detector.backend,
                KNOWN_BACKENDS.join(", ")
            ));
        }
        if self.server.max_upload_bytes == 0 {
            return Err(anyhow!("max_upload_bytes must be greater than zero"));
        }
        if self.detector.input_size == 0 {
            return Err(anyhow!("detector input_size must be greater than zero"));
        }
        for (name, value) in [
            ("min_score", self.detector.min_score),
            ("iou_threshold", self.detector.iou_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("detector {} must be within [0, 1]", name));
            }
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera width and height must be greater than zero"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<DentscanConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
