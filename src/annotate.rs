//! Detection overlay rendering.
//!
//! Draws a box with corner accents and a `"{label} {confidence}"` tag for every
//! detection scoring strictly above the admission threshold. Frames are
//! mutated in place; detections at or below the threshold leave the frame
//! untouched.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use crate::detect::Detection;
use crate::labels::ClassLabelTable;

/// Minimum confidence (exclusive) for a detection to be drawn.
pub const ADMISSION_THRESHOLD: f64 = 0.3;

/// Fonts tried when no font path is configured.
const FONT_SEARCH_PATHS: [&str; 4] = [
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/Library/Fonts/Arial.ttf",
];

#[derive(Clone, Debug)]
pub struct AnnotationStyle {
    pub box_color: Rgb<u8>,
    pub corner_color: Rgb<u8>,
    pub label_background: Rgb<u8>,
    pub label_text: Rgb<u8>,
    pub corner_length: i32,
    pub corner_thickness: i32,
    /// Gap between the label baseline and the top edge of the box.
    pub label_offset: i32,
    pub label_padding: i32,
    pub font_size: f32,
}

impl Default for AnnotationStyle {
    fn default() -> Self {
        Self {
            box_color: Rgb([255, 0, 255]),
            corner_color: Rgb([0, 255, 0]),
            label_background: Rgb([0, 0, 255]),
            label_text: Rgb([255, 255, 255]),
            corner_length: 30,
            corner_thickness: 2,
            label_offset: 10,
            label_padding: 5,
            font_size: 18.0,
        }
    }
}

/// Draws qualifying detections onto frames.
#[derive(Clone)]
pub struct Annotator {
    labels: Arc<ClassLabelTable>,
    threshold: f64,
    font: Option<FontArc>,
    style: AnnotationStyle,
}

impl Annotator {
    pub fn new(labels: Arc<ClassLabelTable>) -> Self {
        Self {
            labels,
            threshold: ADMISSION_THRESHOLD,
            font: None,
            style: AnnotationStyle::default(),
        }
    }

    pub fn with_font(mut self, font: Option<FontArc>) -> Self {
        self.font = font;
        self
    }

    /// Label text for a detection, or `None` if its class index is unknown.
    pub fn label_text(&self, detection: &Detection) -> Option<String> {
        self.labels.get(detection.class_index).map(|label| {
            format!(
                "{} {:.2}",
                label,
                round_up_confidence(detection.confidence)
            )
        })
    }

    /// Draw every detection above the threshold. Returns how many were drawn.
    ///
    /// Detections whose class index falls outside the label table are skipped
    /// and logged rather than drawn with a made-up label.
    pub fn annotate(&self, frame: &mut RgbImage, detections: &[Detection]) -> usize {
        let mut drawn = 0;
        for detection in detections {
            if !(detection.confidence > self.threshold) {
                continue;
            }
            let Some(text) = self.label_text(detection) else {
                log::warn!(
                    "skipping detection with class index {} outside label table ({} labels)",
                    detection.class_index,
                    self.labels.len()
                );
                continue;
            };
            self.draw_box(frame, detection);
            self.draw_label(frame, detection, &text);
            drawn += 1;
        }
        drawn
    }

    fn draw_box(&self, frame: &mut RgbImage, detection: &Detection) {
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            return;
        }
        let bbox = detection.bbox.clamped(width, height);
        // Corner coordinates are inclusive.
        let w = bbox.width().max(0) + 1;
        let h = bbox.height().max(0) + 1;
        draw_hollow_rect_mut(
            frame,
            Rect::at(bbox.x1, bbox.y1).of_size(w as u32, h as u32),
            self.style.box_color,
        );

        let len = self.style.corner_length.min(w / 2).min(h / 2);
        let t = self.style.corner_thickness;
        if len <= 0 || t <= 0 {
            return;
        }
        let (x1, y1, x2, y2) = (bbox.x1, bbox.y1, bbox.x2, bbox.y2);
        let corners = [
            (x1, y1, len, t),
            (x1, y1, t, len),
            (x2 - len + 1, y1, len, t),
            (x2 - t + 1, y1, t, len),
            (x1, y2 - t + 1, len, t),
            (x1, y2 - len + 1, t, len),
            (x2 - len + 1, y2 - t + 1, len, t),
            (x2 - t + 1, y2 - len + 1, t, len),
        ];
        for (x, y, cw, ch) in corners {
            draw_filled_rect_mut(
                frame,
                Rect::at(x, y).of_size(cw as u32, ch as u32),
                self.style.corner_color,
            );
        }
    }

    fn draw_label(&self, frame: &mut RgbImage, detection: &Detection, text: &str) {
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            return;
        }
        let scale = PxScale::from(self.style.font_size);
        let (text_w, text_h) = match &self.font {
            Some(font) => text_size(scale, font, text),
            None => estimate_text_size(text, self.style.font_size),
        };
        let pad = self.style.label_padding;
        let bg_w = text_w as i32 + 2 * pad;
        let bg_h = text_h as i32 + 2 * pad;

        let bbox = detection.bbox.clamped(width, height);
        let baseline = bbox.y1 - self.style.label_offset;
        let mut bg_x = bbox.x1 - pad;
        let mut bg_y = baseline - text_h as i32 - pad;
        bg_x = bg_x.clamp(0, (width as i32 - bg_w).max(0));
        bg_y = bg_y.clamp(0, (height as i32 - bg_h).max(0));

        draw_filled_rect_mut(
            frame,
            Rect::at(bg_x, bg_y).of_size(bg_w.max(1) as u32, bg_h.max(1) as u32),
            self.style.label_background,
        );
        if let Some(font) = &self.font {
            draw_text_mut(
                frame,
                self.style.label_text,
                bg_x + pad,
                bg_y + pad,
                scale,
                font,
                text,
            );
        }
    }
}

/// Round a confidence up to two decimal places (`0.301` -> `0.31`).
///
/// The scaled value is snapped to six decimals before `ceil`, so `0.56`
/// stays `0.56` even though `0.56 * 100.0` is `56.00000000000001`.
pub fn round_up_confidence(confidence: f64) -> f64 {
    let scaled = (confidence * 100.0 * 1e6).round() / 1e6;
    scaled.ceil() / 100.0
}

fn estimate_text_size(text: &str, font_size: f32) -> (u32, u32) {
    let glyph_w = (font_size * 0.55).ceil() as u32;
    (glyph_w * text.chars().count() as u32, font_size.ceil() as u32)
}

/// Load the label font from `configured`, falling back to common system fonts.
pub fn load_font(configured: Option<&Path>) -> Option<FontArc> {
    let candidates: Vec<PathBuf> = match configured {
        Some(path) => vec![path.to_path_buf()],
        None => FONT_SEARCH_PATHS.iter().map(PathBuf::from).collect(),
    };
    for path in &candidates {
        let Ok(bytes) = std::fs::read(path) else {
            continue;
        };
        match FontArc::try_from_vec(bytes) {
            Ok(font) => {
                log::info!("label font loaded from {}", path.display());
                return Some(font);
            }
            Err(err) => log::warn!("invalid font file {}: {}", path.display(), err),
        }
    }
    log::warn!("no label font available; labels will render without text");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;

    fn annotator() -> Annotator {
        Annotator::new(Arc::new(ClassLabelTable::car_damage()))
    }

    fn detection(class_index: usize, confidence: f64) -> Detection {
        Detection::new(BoundingBox::new(20, 40, 80, 90), class_index, confidence)
    }

    #[test]
    fn threshold_is_exclusive() {
        let annotator = annotator();

        let mut frame = RgbImage::new(120, 120);
        assert_eq!(annotator.annotate(&mut frame, &[detection(0, 0.3)]), 0);
        assert!(frame.pixels().all(|p| p.0 == [0, 0, 0]));

        let mut frame = RgbImage::new(120, 120);
        assert_eq!(annotator.annotate(&mut frame, &[detection(0, 0.30000001)]), 1);
        assert!(frame.pixels().any(|p| p.0 != [0, 0, 0]));
    }

    #[test]
    fn low_confidence_and_nan_are_dropped() {
        let annotator = annotator();
        let mut frame = RgbImage::new(64, 64);
        let drawn = annotator.annotate(&mut frame, &[detection(1, 0.1), detection(1, f64::NAN)]);
        assert_eq!(drawn, 0);
    }

    #[test]
    fn label_text_uses_table_and_rounds_up() {
        let annotator = annotator();
        assert_eq!(
            annotator.label_text(&detection(0, 0.123)).as_deref(),
            Some("Bodypanel-Dent 0.13")
        );
        assert_eq!(
            annotator.label_text(&detection(16, 0.5)).as_deref(),
            Some("roof-dent 0.50")
        );
        assert_eq!(annotator.label_text(&detection(17, 0.9)), None);
    }

    #[test]
    fn out_of_range_class_is_skipped() {
        let annotator = annotator();
        let mut frame = RgbImage::new(120, 120);
        let drawn = annotator.annotate(&mut frame, &[detection(17, 0.9), detection(3, 0.9)]);
        assert_eq!(drawn, 1);
    }

    #[test]
    fn draws_box_outline_on_frame() {
        let annotator = annotator();
        let mut frame = RgbImage::new(120, 120);
        annotator.annotate(&mut frame, &[detection(2, 0.8)]);
        // Left edge of the box below the corner accent.
        assert_eq!(frame.get_pixel(20, 65).0, [255, 0, 255]);
        // Interior stays untouched.
        assert_eq!(frame.get_pixel(50, 65).0, [0, 0, 0]);
        // Corner accent.
        assert_eq!(frame.get_pixel(21, 41).0, [0, 255, 0]);
    }

    #[test]
    fn label_stays_inside_frame_for_boxes_at_top_edge() {
        let annotator = annotator();
        let mut frame = RgbImage::new(200, 60);
        let det = Detection::new(BoundingBox::new(0, 0, 50, 50), 4, 0.9);
        assert_eq!(annotator.annotate(&mut frame, &[det]), 1);
        assert_eq!(frame.get_pixel(0, 0).0, [0, 0, 255]);
    }

    #[test]
    fn rounds_confidence_up() {
        assert_eq!(round_up_confidence(0.5), 0.5);
        assert_eq!(round_up_confidence(0.301), 0.31);
        assert_eq!(round_up_confidence(0.30000001), 0.31);
    }

    #[test]
    fn exact_two_decimal_confidences_are_not_bumped() {
        assert_eq!(round_up_confidence(0.56), 0.56);
        assert_eq!(round_up_confidence(0.29), 0.29);
        assert_eq!(round_up_confidence(f64::from(0.56f32)), 0.56);
        assert_eq!(
            annotator().label_text(&detection(0, 0.56)).as_deref(),
            Some("Bodypanel-Dent 0.56")
        );
        assert_eq!(
            annotator().label_text(&detection(9, f64::from(0.57f32))).as_deref(),
            Some("boot-dent 0.57")
        );
    }
}
