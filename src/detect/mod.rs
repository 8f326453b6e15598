//! Object detection: the `Detector` boundary, detection types and model backends.
//!
//! Detectors are pure sensors. They report every candidate with the model's own
//! confidence and leave thresholding to `filter`.

mod backend;
mod backends;
mod result;
pub mod yolo;

pub use backend::Detector;
pub use backends::{build_detector, StubBackend};
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use result::{BoundingBox, BoxOrigin, Detection, ObjectClass};
