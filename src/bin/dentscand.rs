//! dentscand - car damage detection web service
//!
//! This daemon:
//! 1. Loads configuration (config file, then DENTSCAN_* env overrides)
//! 2. Loads the detector once and shares it read-only
//! 3. Serves the upload UI, processed files and the live camera feed
//! 4. Stops on Ctrl-C

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::{mpsc, Arc};

use dentscan::{build_processor, ApiConfig, ApiServer, DentscanConfig};

#[derive(Parser, Debug)]
#[command(name = "dentscand", about = "Car damage detection web service")]
struct Args {
    /// Config file (TOML or JSON)
    #[arg(long, env = "DENTSCAN_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Listen address, overriding the config
    #[arg(long, value_name = "ADDR")]
    addr: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = DentscanConfig::load_from(args.config.as_deref())?;
    if let Some(addr) = args.addr {
        config.server.addr = addr;
    }
    log::info!(
        "detector backend '{}', model {}",
        config.detector.backend,
        config.detector.model_path.display()
    );

    let processor = Arc::new(build_processor(&config)?);
    let api_handle = ApiServer::new(ApiConfig::from_config(&config), processor).spawn()?;
    log::info!("dentscand listening on http://{}", api_handle.addr);
    log::info!("uploads stored in {}", config.uploads_dir.display());

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .expect("error setting Ctrl-C handler");

    log::info!("dentscand waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping server...");
    api_handle.stop()?;

    Ok(())
}
