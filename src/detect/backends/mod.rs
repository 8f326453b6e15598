pub mod stub;

#[cfg(feature = "backend-tract")]
pub mod tract;

use anyhow::{anyhow, Result};

use crate::config::{DetectionSettings, DetectorKind};
use crate::detect::backend::Detector;

pub use stub::StubBackend;

#[cfg(feature = "backend-tract")]
pub use tract::TractBackend;

/// Build the configured detector. A missing model artifact is a startup failure.
pub fn build_detector(settings: &DetectionSettings) -> Result<Box<dyn Detector>> {
    match settings.backend {
        DetectorKind::Stub => {
            log::warn!("using the stub detector: no objects will be detected");
            Ok(Box::new(StubBackend::new()))
        }
        DetectorKind::Tract => {
            if !settings.model_path.is_file() {
                return Err(anyhow!(
                    "model not found at {}",
                    settings.model_path.display()
                ));
            }
            build_tract(settings)
        }
    }
}

#[cfg(feature = "backend-tract")]
fn build_tract(settings: &DetectionSettings) -> Result<Box<dyn Detector>> {
    Ok(Box::new(TractBackend::new(
        &settings.model_path,
        settings.model_input_size,
    )?))
}

#[cfg(not(feature = "backend-tract"))]
fn build_tract(_settings: &DetectionSettings) -> Result<Box<dyn Detector>> {
    Err(anyhow!(
        "DETECTOR_BACKEND=tract requires building with the backend-tract feature"
    ))
}
