//! Media processor: detect and annotate stills, videos and the live feed.
//!
//! Each job is a linear pipeline: open the input, loop over frames running
//! detection and annotation, write the result, close. A source read failure
//! ends the frame loop like a normal end of stream; detector and writer
//! failures fail the job.

use anyhow::{anyhow, Context, Result};
use image::{ImageReader, RgbImage};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::annotate::Annotator;
use crate::detect::DetectorBackend;
use crate::encode::{encode_jpeg, save_image, FrameSink, VideoWriter, LIVE_JPEG_QUALITY};
use crate::ingest::{FileSource, FrameSource};

/// Frame rate of every written video, regardless of the input's rate.
pub const OUTPUT_FPS: u32 = 30;

/// Prefix applied to processed output filenames.
pub const OUTPUT_PREFIX: &str = "output_";

/// Part boundary of the live MJPEG stream.
pub const LIVE_BOUNDARY: &str = "frame";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Classify by extension. `None` when the processor cannot handle it.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "png" | "jpg" | "jpeg" => Some(Self::Image),
            "mp4" => Some(Self::Video),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

/// One input file and where its annotated output goes.
#[derive(Clone, Debug)]
pub struct MediaJob {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub kind: MediaKind,
}

impl MediaJob {
    /// Job for a file stored in the uploads directory; the output lands next
    /// to it.
    pub fn for_upload(uploads_dir: &Path, filename: &str) -> Option<Self> {
        Self::with_output_dir(&uploads_dir.join(filename), uploads_dir)
    }

    /// Job writing `output_<basename>` into `out_dir`.
    pub fn with_output_dir(input_path: &Path, out_dir: &Path) -> Option<Self> {
        let kind = MediaKind::from_path(input_path)?;
        let basename = input_path.file_name()?.to_str()?;
        Some(Self {
            input_path: input_path.to_path_buf(),
            output_path: out_dir.join(output_name(basename)),
            kind,
        })
    }

    /// File name of the output, for building its public URL.
    pub fn output_name(&self) -> Option<&str> {
        self.output_path.file_name()?.to_str()
    }
}

pub fn output_name(basename: &str) -> String {
    format!("{OUTPUT_PREFIX}{basename}")
}

/// What a finished job produced.
#[derive(Clone, Debug)]
pub struct JobSummary {
    pub kind: MediaKind,
    pub frames: u64,
    pub detections_drawn: usize,
    pub width: u32,
    pub height: u32,
    pub output_path: PathBuf,
}

impl JobSummary {
    fn log(&self) {
        log::info!(
            "processed {} {}x{}: {} frame(s), {} detection(s) drawn -> {}",
            self.kind.as_str(),
            self.width,
            self.height,
            self.frames,
            self.detections_drawn,
            self.output_path.display()
        );
    }
}

/// Totals from one frame loop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frames: u64,
    pub detections_drawn: usize,
}

/// Runs detection and annotation over media. Shared read-only between
/// requests.
pub struct Processor {
    detector: Arc<dyn DetectorBackend>,
    annotator: Annotator,
}

impl Processor {
    pub fn new(detector: Arc<dyn DetectorBackend>, annotator: Annotator) -> Self {
        Self {
            detector,
            annotator,
        }
    }

    pub fn detector_name(&self) -> &'static str {
        self.detector.name()
    }

    /// Detect on `frame` and draw qualifying detections in place.
    pub fn annotate_frame(&self, frame: &mut RgbImage) -> Result<usize> {
        let detections = self.detector.detect(frame).context("run detector")?;
        log::debug!("detector returned {} candidate(s)", detections.len());
        Ok(self.annotator.annotate(frame, &detections))
    }

    pub fn process(&self, job: &MediaJob) -> Result<JobSummary> {
        let summary = match job.kind {
            MediaKind::Image => self.process_image(&job.input_path, &job.output_path)?,
            MediaKind::Video => self.process_video(&job.input_path, &job.output_path)?,
        };
        summary.log();
        Ok(summary)
    }

    /// Annotate a still and write it in the format of `output`'s extension.
    ///
    /// The input decoder is picked from the file contents, so a PNG saved as
    /// `car.jpg` still decodes.
    pub fn process_image(&self, input: &Path, output: &Path) -> Result<JobSummary> {
        let mut frame = ImageReader::open(input)
            .with_context(|| format!("open image {}", input.display()))?
            .with_guessed_format()
            .with_context(|| format!("read image {}", input.display()))?
            .decode()
            .with_context(|| format!("decode image {}", input.display()))?
            .into_rgb8();
        let detections_drawn = self.annotate_frame(&mut frame)?;
        save_image(&frame, output)?;
        Ok(JobSummary {
            kind: MediaKind::Image,
            frames: 1,
            detections_drawn,
            width: frame.width(),
            height: frame.height(),
            output_path: output.to_path_buf(),
        })
    }

    /// Annotate every frame of `input` into an MP4 at [`OUTPUT_FPS`].
    ///
    /// A partially written output is removed when the job fails.
    pub fn process_video(&self, input: &Path, output: &Path) -> Result<JobSummary> {
        let input_str = input
            .to_str()
            .ok_or_else(|| anyhow!("video path is not valid UTF-8: {}", input.display()))?;
        let mut source = FileSource::new(input_str)?;
        source.connect()?;
        let (width, height) = source.dimensions();

        let result = VideoWriter::create(output, width, height, OUTPUT_FPS).and_then(|mut writer| {
            let stats = self.process_frames(&mut source, &mut writer)?;
            writer.finish()?;
            Ok(stats)
        });

        match result {
            Ok(stats) => Ok(JobSummary {
                kind: MediaKind::Video,
                frames: stats.frames,
                detections_drawn: stats.detections_drawn,
                width,
                height,
                output_path: output.to_path_buf(),
            }),
            Err(err) => {
                if output.exists() {
                    if let Err(remove_err) = std::fs::remove_file(output) {
                        log::warn!(
                            "failed to remove partial output {}: {}",
                            output.display(),
                            remove_err
                        );
                    }
                }
                Err(err.context(format!("process video {}", input.display())))
            }
        }
    }

    /// Pull frames from `source` until it ends, annotate each and push it to
    /// `sink`. The sink is not finished here.
    pub fn process_frames(
        &self,
        source: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
    ) -> Result<FrameStats> {
        let mut stats = FrameStats::default();
        loop {
            let mut frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(err) => {
                    log::debug!("frame read failed, ending stream: {:#}", err);
                    break;
                }
            };
            stats.detections_drawn += self.annotate_frame(&mut frame)?;
            sink.write_frame(&frame)?;
            stats.frames += 1;
        }
        Ok(stats)
    }

    /// Connect `source` and stream annotated JPEG parts from it.
    pub fn live_feed<'a>(&'a self, mut source: Box<dyn FrameSource + 'a>) -> Result<LiveFeed<'a>> {
        source.connect().context("open live camera")?;
        Ok(LiveFeed {
            processor: self,
            source,
            done: false,
        })
    }
}

/// Lazy stream of `multipart/x-mixed-replace` parts, one annotated camera
/// frame per pull. Ends for good once the camera stops producing frames.
pub struct LiveFeed<'a> {
    processor: &'a Processor,
    source: Box<dyn FrameSource + 'a>,
    done: bool,
}

impl LiveFeed<'_> {
    fn next_part(&mut self) -> Result<Option<Vec<u8>>> {
        let Some(mut frame) = self.source.next_frame()? else {
            return Ok(None);
        };
        self.processor.annotate_frame(&mut frame)?;
        let jpeg = encode_jpeg(&frame, LIVE_JPEG_QUALITY)?;
        Ok(Some(multipart_part(&jpeg)))
    }

    pub fn frames_captured(&self) -> u64 {
        self.source.frames_captured()
    }
}

impl Iterator for LiveFeed<'_> {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Vec<u8>> {
        if self.done {
            return None;
        }
        match self.next_part() {
            Ok(Some(part)) => Some(part),
            Ok(None) => {
                log::info!(
                    "live feed ended after {} frame(s)",
                    self.source.frames_captured()
                );
                self.done = true;
                None
            }
            Err(err) => {
                log::warn!("live feed stopped: {:#}", err);
                self.done = true;
                None
            }
        }
    }
}

impl std::iter::FusedIterator for LiveFeed<'_> {}

/// Wrap one JPEG as a part of the `frame`-delimited multipart stream.
pub fn multipart_part(jpeg: &[u8]) -> Vec<u8> {
    let header = format!("--{LIVE_BOUNDARY}\r\nContent-Type: image/jpeg\r\n\r\n");
    let mut part = Vec::with_capacity(header.len() + jpeg.len() + 2);
    part.extend_from_slice(header.as_bytes());
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    part
}
