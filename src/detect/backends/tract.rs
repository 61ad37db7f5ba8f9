#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::detect::yolo::{decode_predictions, DecodeParams};

/// Tract-based backend for YOLOv8 ONNX exports.
///
/// Loads a local model file once and runs inference on RGB frames. The
/// runnable plan is immutable after load, so `detect` only needs `&self`.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    input_size: u32,
    num_classes: usize,
    min_score: f32,
    iou_threshold: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32, num_classes: usize) -> Result<Self> {
        let model_path = model_path.as_ref();
        if input_size == 0 {
            return Err(anyhow!("model input size must be positive"));
        }
        let side = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            input_size,
            num_classes,
            min_score: 0.25,
            iou_threshold: 0.7,
        })
    }

    /// Override the candidate score floor applied before NMS.
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    /// Override the NMS IoU threshold.
    pub fn with_iou_threshold(mut self, iou_threshold: f32) -> Self {
        self.iou_threshold = iou_threshold;
        self
    }

    fn build_input(&self, frame: &RgbImage) -> Tensor {
        let side = self.input_size;
        let resized = image::imageops::resize(frame, side, side, FilterType::Triangle);
        let side = side as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| {
            resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        });
        input.into_tensor()
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&self, frame: &RgbImage) -> Result<Vec<Detection>> {
        let (frame_width, frame_height) = frame.dimensions();
        if frame_width == 0 || frame_height == 0 {
            return Err(anyhow!("cannot run inference on an empty frame"));
        }
        let input = self.build_input(frame);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape().to_vec();
        if shape.len() != 3 || shape[0] != 1 {
            return Err(anyhow!("unexpected model output shape {:?}", shape));
        }
        let values: Vec<f32> = view.iter().copied().collect();

        decode_predictions(
            &values,
            shape[1],
            shape[2],
            &DecodeParams {
                num_classes: self.num_classes,
                min_score: self.min_score,
                iou_threshold: self.iou_threshold,
                input_size: self.input_size,
                frame_width,
                frame_height,
            },
        )
    }

    fn warm_up(&self) -> Result<()> {
        let blank = RgbImage::new(self.input_size, self.input_size);
        self.detect(&blank).map(|_| ())
    }
}
