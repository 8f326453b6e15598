#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use tract_onnx::prelude::*;

use crate::detect::backend::Detector;
use crate::detect::result::Detection;
use crate::detect::yolo::{decode_output, YoloDecode};
use crate::frame::Frame;

/// Tract-based backend running a YOLOv8 ONNX export on-device.
///
/// Frames are stretched to the square model input, so decoded boxes are already
/// normalized to the original frame.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    decode: YoloDecode,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
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
            decode: YoloDecode {
                input_size,
                ..YoloDecode::default()
            },
        })
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        let side = self.decode.input_size;
        let image = image::RgbImage::from_raw(frame.width, frame.height, frame.pixels().to_vec())
            .ok_or_else(|| anyhow!("frame buffer does not match {}x{}", frame.width, frame.height))?;
        let resized = image::imageops::resize(&image, side, side, FilterType::Triangle);

        let side = side as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, channel, y, x)| {
            resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0
        });
        Ok(input.into_tensor())
    }
}

impl Detector for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let input = self.build_input(frame)?;
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
        let values: Vec<f32> = view.iter().copied().collect();
        decode_output(&values, &shape, &self.decode)
    }

    fn warm_up(&mut self) -> Result<()> {
        let side = self.decode.input_size;
        self.detect(&Frame::blank(side, side))
            .map(|_| ())
            .context("model warm-up inference failed")
    }
}
