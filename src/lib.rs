//! dentscan: car damage detection for uploaded photos, videos and a live
//! camera feed.
//!
//! # Pipeline
//!
//! Every input goes through the same steps: decode frames, run the detector,
//! draw qualifying detections, encode the result. Only the source and sink
//! change between modes:
//!
//! - stills: `image` decode, annotated copy written as `output_<name>`
//! - videos: FFmpeg decode, MP4 re-encode at a fixed 30 fps
//! - live: camera capture, JPEG parts of a `multipart/x-mixed-replace` stream
//!
//! # Module Structure
//!
//! - `detect`: detector backends (tract ONNX, stub) and YOLO decoding
//! - `annotate`: box, corner and label drawing above the admission threshold
//! - `ingest`: frame sources (video files, cameras, synthetic `stub://`)
//! - `encode`: frame sinks (MP4), JPEG and still encoding
//! - `process`: the per-job pipelines and the live feed iterator
//! - `api`: upload UI and live feed HTTP server
//! - `config`: file + environment configuration

pub mod annotate;
pub mod api;
pub mod config;
pub mod detect;
pub mod encode;
pub mod ingest;
pub mod labels;
pub mod process;
pub mod ui;
pub mod upload;

pub use annotate::{Annotator, ADMISSION_THRESHOLD};
pub use api::{ApiConfig, ApiHandle, ApiServer};
pub use config::DentscanConfig;
pub use detect::{load_backend, BoundingBox, Detection, DetectorBackend, StubBackend};
pub use encode::{FrameSink, VideoWriter};
pub use ingest::{CameraConfig, CameraSource, FileSource, FrameSource};
pub use labels::ClassLabelTable;
pub use process::{JobSummary, MediaJob, MediaKind, Processor};

use anyhow::Result;
use std::sync::Arc;

/// Build the shared processor described by `cfg`: detector, label table and
/// font.
pub fn build_processor(cfg: &DentscanConfig) -> Result<Processor> {
    let detector = load_backend(&cfg.detector, &cfg.labels)?;
    let font = annotate::load_font(cfg.font_path.as_deref());
    let annotator = Annotator::new(Arc::new(cfg.labels.clone())).with_font(font);
    Ok(Processor::new(detector, annotator))
}
