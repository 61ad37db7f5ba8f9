mod backend;
mod backends;
mod result;
pub mod yolo;

use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::config::DetectorSettings;
use crate::labels::ClassLabelTable;

pub use backend::DetectorBackend;
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use result::{BoundingBox, Detection};

/// Build the configured backend once at startup and warm it up.
///
/// Errors here are fatal for the process: a service without a model has
/// nothing to serve.
pub fn load_backend(
    settings: &DetectorSettings,
    labels: &ClassLabelTable,
) -> Result<Arc<dyn DetectorBackend>> {
    let backend: Arc<dyn DetectorBackend> = match settings.backend.as_str() {
        "stub" => Arc::new(StubBackend::with_detections(
            settings.stub_detections.clone(),
        )),
        #[cfg(feature = "backend-tract")]
        "tract" => Arc::new(
            TractBackend::new(&settings.model_path, settings.input_size, labels.len())?
                .with_min_score(settings.min_score)
                .with_iou_threshold(settings.iou_threshold),
        ),
        #[cfg(not(feature = "backend-tract"))]
        "tract" => {
            let _ = labels;
            return Err(anyhow!(
                "detector backend 'tract' requires the backend-tract feature"
            ));
        }
        other => return Err(anyhow!("unknown detector backend '{}'", other)),
    };
    backend.warm_up()?;
    log::info!("detector backend '{}' ready", backend.name());
    Ok(backend)
}
