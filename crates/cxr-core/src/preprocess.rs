//! Image preprocessing for the classification models.
//!
//! Turns an on-disk radiograph of any size into the fixed `[1, 3, S, S]`
//! NCHW tensor the models expect, using a contain fit (pad, never crop or
//! distort) and ImageNet channel statistics.

use std::path::Path;

use image::{DynamicImage, GenericImageView, RgbImage, imageops};
use ndarray::Array4;
use tracing::debug;

use crate::error::{CxrError, Result};

/// Per-channel normalization mean (ImageNet).
const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// Per-channel normalization standard deviation (ImageNet).
const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Preprocessor producing normalized model input tensors.
#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    /// Side of the square model input.
    input_size: u32,
}

impl ImagePreprocessor {
    /// Create a preprocessor for the given model input size.
    pub fn new(input_size: u32) -> Self {
        Self { input_size }
    }

    /// Decode and preprocess the image at `path`.
    ///
    /// Returns the `[1, 3, S, S]` tensor and the original (width, height),
    /// which heatmap synthesis needs later.
    pub fn preprocess(&self, path: &Path) -> Result<(Array4<f32>, (u32, u32))> {
        if !path.exists() {
            return Err(CxrError::ImageNotFound(path.to_path_buf()));
        }

        let image = image::open(path).map_err(|e| CxrError::ImageDecode(e.to_string()))?;
        let (orig_width, orig_height) = image.dimensions();
        debug!("Original image: {}x{}", orig_width, orig_height);

        let canvas = self.contain_fit(&image);
        debug!(
            "Preprocessed to {}x{} with contain fit",
            canvas.width(),
            canvas.height()
        );

        let channels = canvas.sample_layout().channels;
        if channels != 3 {
            return Err(CxrError::ChannelCount { channels });
        }

        let size = self.input_size as usize;
        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

        // HWC -> CHW re-layout and normalization in one pass, writing
        // straight into the tensor allocation.
        for (y, row) in canvas.rows().enumerate() {
            for (x, pixel) in row.enumerate() {
                for c in 0..3 {
                    let value = pixel.0[c] as f32 / 255.0;
                    tensor[[0, c, y, x]] = (value - MEAN[c]) / STD[c];
                }
            }
        }

        Ok((tensor, (orig_width, orig_height)))
    }

    /// Resize into an `S x S` square preserving aspect ratio, centered on
    /// solid black padding. Alpha is dropped.
    fn contain_fit(&self, image: &DynamicImage) -> RgbImage {
        let size = self.input_size;

        // `resize` scales to fit within the bounds without distortion.
        let resized = image
            .resize(size, size, imageops::FilterType::Lanczos3)
            .to_rgb8();

        let mut canvas = RgbImage::new(size, size);
        let dx = (size - resized.width()) / 2;
        let dy = (size - resized.height()) / 2;
        imageops::replace(&mut canvas, &resized, i64::from(dx), i64::from(dy));

        canvas
    }
}
