//! Stage reporting for the command-line tool.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

use crate::process::JobSummary;

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
    disable_pretty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool, disable_pretty: bool) -> Self {
        Self {
            mode,
            is_tty,
            disable_pretty,
        }
    }

    fn use_pretty(&self) -> bool {
        self.is_tty
            && match self.mode {
                UiMode::Pretty => true,
                UiMode::Auto => !self.disable_pretty,
                UiMode::Plain => false,
            }
    }

    /// Announce a stage; completion and elapsed time print when the guard
    /// drops.
    pub fn stage(&self, name: &str) -> StageGuard {
        if self.use_pretty() {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            let style = ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            spinner.set_message(format!("{name}…"));
            StageGuard::new(name.to_string(), Some(spinner))
        } else {
            eprintln!("==> {}", name);
            StageGuard::new(name.to_string(), None)
        }
    }

    /// One-line result of a processed file.
    pub fn summary_line(summary: &JobSummary) -> String {
        format!(
            "{} {}x{}, {} frame(s), {} damage region(s) -> {}",
            summary.kind.as_str(),
            summary.width,
            summary.height,
            summary.frames,
            summary.detections_drawn,
            summary.output_path.display()
        )
    }
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
}

impl StageGuard {
    fn new(name: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
        }
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let message = format!("✔ {} ({})", self.name, format_duration(elapsed));
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else {
            eprintln!("{message}");
        }
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::MediaKind;
    use std::path::PathBuf;

    #[test]
    fn pretty_output_needs_a_terminal() {
        assert!(!Ui::new(UiMode::Pretty, false, false).use_pretty());
        assert!(Ui::new(UiMode::Pretty, true, true).use_pretty());
        assert!(!Ui::new(UiMode::Auto, true, true).use_pretty());
        assert!(!Ui::new(UiMode::Plain, true, false).use_pretty());
    }

    #[test]
    fn durations_switch_units_at_one_second() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
    }

    #[test]
    fn summary_line_names_output() {
        let summary = JobSummary {
            kind: MediaKind::Video,
            frames: 12,
            detections_drawn: 3,
            width: 640,
            height: 480,
            output_path: PathBuf::from("out/output_clip.mp4"),
        };
        assert_eq!(
            Ui::summary_line(&summary),
            "video 640x480, 12 frame(s), 3 damage region(s) -> out/output_clip.mp4"
        );
    }
}
