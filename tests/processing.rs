use anyhow::Result;
use image::{Rgb, RgbImage};
use std::path::Path;

use dentscan::config::DentscanConfig;
use dentscan::ingest::{FileSource, FrameSource};
use dentscan::{build_processor, BoundingBox, Detection, FrameSink, MediaJob, MediaKind};

fn stub_config(detections: Vec<Detection>) -> DentscanConfig {
    let mut cfg = DentscanConfig::default();
    cfg.detector.backend = "stub".to_string();
    cfg.detector.stub_detections = detections;
    cfg
}

fn gradient(width: u32, height: u32) -> RgbImage {
    let mut frame = RgbImage::new(width, height);
    for (x, y, pixel) in frame.enumerate_pixels_mut() {
        *pixel = Rgb([(x * 2) as u8, (y * 3) as u8, 40]);
    }
    frame
}

fn process_png(dir: &Path, detections: Vec<Detection>) -> Result<(RgbImage, RgbImage)> {
    let input = gradient(96, 72);
    let input_path = dir.join("car.png");
    input.save(&input_path)?;

    let processor = build_processor(&stub_config(detections))?;
    let job = MediaJob::with_output_dir(&input_path, dir).expect("png job");
    assert_eq!(job.kind, MediaKind::Image);
    processor.process(&job)?;

    let output = image::open(dir.join("output_car.png"))?.into_rgb8();
    Ok((input, output))
}

#[test]
fn detection_at_threshold_is_not_drawn() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let at_threshold = Detection::new(BoundingBox::new(10, 30, 60, 60), 2, 0.3);
    let (input, output) = process_png(dir.path(), vec![at_threshold])?;
    assert_eq!(input, output);
    Ok(())
}

#[test]
fn detection_just_above_threshold_is_drawn() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let above = Detection::new(BoundingBox::new(10, 30, 60, 60), 2, 0.300_000_01);
    let (input, output) = process_png(dir.path(), vec![above])?;
    assert_ne!(input, output);
    assert_eq!(output.get_pixel(10, 45).0, [255, 0, 255]);
    Ok(())
}

#[test]
fn out_of_range_class_is_skipped() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let unknown = Detection::new(BoundingBox::new(10, 30, 60, 60), 17, 0.95);
    let (input, output) = process_png(dir.path(), vec![unknown])?;
    assert_eq!(input, output);
    Ok(())
}

struct CountingSink {
    frames: u64,
    dimensions: Option<(u32, u32)>,
}

impl FrameSink for CountingSink {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        self.frames += 1;
        self.dimensions = Some(frame.dimensions());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

#[test]
fn video_loop_keeps_frame_count_and_size() -> Result<()> {
    let detections = vec![Detection::new(BoundingBox::new(2, 20, 40, 46), 9, 0.66)];
    let processor = build_processor(&stub_config(detections))?;

    let mut source = FileSource::new("stub://clip.mp4")?;
    source.connect()?;
    let (width, height) = source.dimensions();
    let mut sink = CountingSink {
        frames: 0,
        dimensions: None,
    };
    let stats = processor.process_frames(&mut source, &mut sink)?;

    assert_eq!(stats.frames, source.frames_captured());
    assert_eq!(sink.frames, 30);
    assert_eq!(sink.dimensions, Some((width, height)));
    assert_eq!(stats.detections_drawn, 30);
    Ok(())
}

#[cfg(feature = "video-ffmpeg")]
fn decode_all(path: &Path) -> Result<(u64, (u32, u32))> {
    let mut source = FileSource::new(path.to_str().expect("utf-8 temp path"))?;
    source.connect()?;
    let dimensions = source.dimensions();
    let mut frames = 0;
    while let Some(frame) = source.next_frame()? {
        assert_eq!(frame.dimensions(), dimensions);
        frames += 1;
    }
    Ok((frames, dimensions))
}

#[cfg(feature = "video-ffmpeg")]
#[test]
fn mp4_upload_is_annotated_frame_for_frame() -> Result<()> {
    use dentscan::VideoWriter;

    let dir = tempfile::tempdir()?;
    let input_path = dir.path().join("clip.mp4");
    let mut writer = VideoWriter::create(&input_path, 64, 48, 30)?;
    for _ in 0..12 {
        writer.write_frame(&gradient(64, 48))?;
    }
    writer.finish()?;
    assert_eq!(decode_all(&input_path)?, (12, (64, 48)));

    let detections = vec![Detection::new(BoundingBox::new(2, 20, 40, 46), 9, 0.66)];
    let processor = build_processor(&stub_config(detections))?;
    let job = MediaJob::with_output_dir(&input_path, dir.path()).expect("mp4 job");
    assert_eq!(job.kind, MediaKind::Video);
    let summary = processor.process(&job)?;

    assert_eq!(summary.frames, 12);
    assert_eq!(summary.detections_drawn, 12);
    assert_eq!((summary.width, summary.height), (64, 48));
    assert_eq!(decode_all(&dir.path().join("output_clip.mp4"))?, (12, (64, 48)));
    Ok(())
}
