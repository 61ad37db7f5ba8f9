//! dentscan - annotate car damage in a single photo or video
//!
//! Runs the same processor as the web service on one local file and writes
//! `output_<name>` next to it (or into `--out-dir`).

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

use dentscan::ui::{Ui, UiMode};
use dentscan::{build_processor, upload, DentscanConfig, MediaJob};

#[derive(Parser, Debug)]
#[command(name = "dentscan", about = "Annotate car damage in a photo or video")]
struct Args {
    /// Image (png, jpg, jpeg) or video (mp4) to process
    #[arg(value_name = "PATH")]
    input: PathBuf,

    /// Directory for the annotated output (defaults to the input's directory)
    #[arg(long, value_name = "DIR")]
    out_dir: Option<PathBuf>,

    /// Config file (TOML or JSON)
    #[arg(long, env = "DENTSCAN_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// UI mode for stderr progress
    #[arg(long, value_enum, default_value = "auto", value_name = "MODE")]
    ui: UiMode,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = Ui::new(args.ui, is_tty, !stdout_is_tty);

    let config = DentscanConfig::load_from(args.config.as_deref())?;

    let name = args
        .input
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| anyhow!("input path has no file name: {}", args.input.display()))?;
    if !upload::allowed_file(name, &config.allowed_extensions) {
        return Err(anyhow!(
            "{} is not an allowed file type (allowed: {})",
            name,
            config.allowed_extensions.join(", ")
        ));
    }
    let out_dir = match &args.out_dir {
        Some(dir) => dir.clone(),
        None => args
            .input
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    let job = MediaJob::with_output_dir(&args.input, &out_dir)
        .ok_or_else(|| anyhow!("Unsupported file type."))?;

    let processor = {
        let _stage = ui.stage("Load detector");
        build_processor(&config)?
    };
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("create output directory {}", out_dir.display()))?;
    let summary = {
        let _stage = ui.stage(&format!("Process {}", name));
        processor.process(&job)?
    };

    println!("{}", Ui::summary_line(&summary));
    Ok(())
}
