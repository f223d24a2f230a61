//! Inference Engine Boundary
//!
//! The classifier only sees `InferenceEngine::predict(path) -> Vec<f32>`.
//! `OnnxEngine` is the production implementation: one ONNX Runtime session
//! per instance, expensive to build and cheap to reuse, so instances are
//! created once at startup and parked in the engine pool.

use anyhow::{Context, Result};
use image::imageops::FilterType;
use ndarray::Array4;
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use std::path::Path;
use tracing::{debug, info};

/// A stateful model instance. Never called concurrently on the same instance.
pub trait InferenceEngine: Send + 'static {
    /// Score the image at `image_path`, one value per label
    fn predict(&mut self, image_path: &Path) -> Result<Vec<f32>>;
}

/// Image preprocessing parameters the model was trained with
#[derive(Debug, Clone, PartialEq)]
pub struct ImageSettings {
    pub width: u32,
    pub height: u32,
    /// Subtracted from every channel value before scaling
    pub mean: f32,
    pub scale: f32,
    /// NHWC when true, NCHW otherwise
    pub channels_last: bool,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            width: 224,
            height: 224,
            mean: 117.0,
            scale: 1.0,
            channels_last: true,
        }
    }
}

/// Decode, resize and normalise an image file into a batch-of-one tensor
pub fn load_image_tensor(image_path: &Path, settings: &ImageSettings) -> Result<Array4<f32>> {
    let img = image::open(image_path)
        .with_context(|| format!("failed to decode image {}", image_path.display()))?;
    let rgb = img
        .resize_exact(settings.width, settings.height, FilterType::Triangle)
        .to_rgb8();

    let (w, h) = (settings.width as usize, settings.height as usize);
    let shape = if settings.channels_last {
        (1, h, w, 3)
    } else {
        (1, 3, h, w)
    };
    let mut tensor = Array4::<f32>::zeros(shape);

    for (x, y, pixel) in rgb.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        for c in 0..3 {
            let value = (pixel[c] as f32 - settings.mean) * settings.scale;
            if settings.channels_last {
                tensor[[0, y, x, c]] = value;
            } else {
                tensor[[0, c, y, x]] = value;
            }
        }
    }

    Ok(tensor)
}

/// ONNX Runtime backed classifier
pub struct OnnxEngine {
    session: Session,
    settings: ImageSettings,
}

impl OnnxEngine {
    pub fn load(model_path: &Path, settings: ImageSettings, intra_threads: usize) -> Result<Self> {
        // Initialize ORT environment (idempotent)
        let _ = ort::init().commit();

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(intra_threads)?
            .commit_from_file(model_path)
            .with_context(|| format!("failed to load model {}", model_path.display()))?;

        info!(model = %model_path.display(), "ONNX model loaded");
        Ok(Self { session, settings })
    }
}

impl InferenceEngine for OnnxEngine {
    fn predict(&mut self, image_path: &Path) -> Result<Vec<f32>> {
        let input = load_image_tensor(image_path, &self.settings)?;

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let scores = outputs[0].try_extract_array::<f32>()?;

        debug!(shape = ?scores.shape(), "Model output extracted");
        Ok(scores.iter().copied().collect())
    }
}
