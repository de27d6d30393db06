//! Synthetic attention heatmap generation.
//!
//! The overlay is a deterministic, confidence-driven approximation of where
//! a chest model attends, not a gradient-based saliency map: anomalous
//! predictions light up the lung fields (plus the mediastinum at high
//! confidence), benign ones get a broad diffuse glow. The approximation's
//! geometry and thresholds are part of the observable contract.
//!
//! Synthesis never fails a request: any internal error is logged and
//! reported as a missing heatmap.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::codecs::png::{CompressionType, FilterType as PngFilterType, PngEncoder};
use image::{DynamicImage, ExtendedColorType, ImageEncoder, Rgba, RgbaImage, imageops};
use tracing::{debug, warn};

use crate::error::{CxrError, Result};
use crate::executor::PredictionResult;

/// A Gaussian attention spot in model-input coordinate space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttentionRegion {
    pub x: f32,
    pub y: f32,
    pub sigma: f32,
    pub intensity: f32,
}

/// One row of the attention policy: offsets and spread as fractions of the
/// grid size, intensity as a multiple of the prediction confidence.
#[derive(Debug, Clone, Copy)]
struct RegionSpec {
    dx: f32,
    dy: f32,
    sigma: f32,
    gain: f32,
}

/// Focal spots over the left and right lung fields.
const LUNG_FIELDS: [RegionSpec; 2] = [
    RegionSpec { dx: -0.15, dy: -0.10, sigma: 0.15, gain: 1.0 },
    RegionSpec { dx: 0.15, dy: -0.10, sigma: 0.15, gain: 1.0 },
];

/// Central mediastinal spot, added only at high confidence.
const MEDIASTINUM: RegionSpec = RegionSpec { dx: 0.0, dy: 0.0, sigma: 0.10, gain: 0.7 };

/// Broad central glow for benign or uncertain predictions.
const DIFFUSE: RegionSpec = RegionSpec { dx: 0.0, dy: 0.0, sigma: 0.30, gain: 0.3 };

/// Confidence above which an anomaly gets focal lung regions.
const FOCAL_THRESHOLD: f32 = 0.3;
/// Confidence above which the mediastinal region is added.
const MEDIASTINAL_THRESHOLD: f32 = 0.6;
/// Intensity floor for the diffuse glow.
const DIFFUSE_FLOOR: f32 = 0.1;

/// Derive the attention regions for a prediction on a `size`-pixel grid.
pub fn attention_regions(size: u32, prediction: &PredictionResult) -> Vec<AttentionRegion> {
    let size = size as f32;
    let (cx, cy) = (size / 2.0, size / 2.0);
    let confidence = prediction.confidence;
    let is_normal = prediction.predicted_class_en == "Normal";

    let place = |spec: &RegionSpec, intensity: f32| AttentionRegion {
        x: cx + size * spec.dx,
        y: cy + size * spec.dy,
        sigma: size * spec.sigma,
        intensity,
    };

    if !is_normal && confidence > FOCAL_THRESHOLD {
        let mut regions: Vec<AttentionRegion> = LUNG_FIELDS
            .iter()
            .map(|spec| place(spec, confidence * spec.gain))
            .collect();
        if confidence > MEDIASTINAL_THRESHOLD {
            regions.push(place(&MEDIASTINUM, confidence * MEDIASTINUM.gain));
        }
        regions
    } else {
        let intensity = (confidence * DIFFUSE.gain).max(DIFFUSE_FLOOR);
        vec![place(&DIFFUSE, intensity)]
    }
}

/// Fill a `size x size` grid with the maximum Gaussian falloff of all
/// regions, scaled to 8-bit intensities.
fn intensity_grid(size: u32, regions: &[AttentionRegion], confidence: f32) -> Vec<u8> {
    let size = size as usize;
    let mut grid = vec![0u8; size * size];

    for y in 0..size {
        for x in 0..size {
            let mut max_intensity = 0.0f32;
            for region in regions {
                let dx = x as f32 - region.x;
                let dy = y as f32 - region.y;
                let falloff = (-(dx * dx + dy * dy) / (2.0 * region.sigma * region.sigma)).exp();
                max_intensity = max_intensity.max(region.intensity * confidence * falloff);
            }
            grid[y * size + x] = (max_intensity * 255.0).clamp(0.0, 255.0) as u8;
        }
    }

    grid
}

/// Four-band piecewise-linear colormap: blue, cyan, green, yellow, red.
fn jet_color(value: u8) -> [u8; 3] {
    let n = value as f32 / 255.0;

    let r = if n < 0.25 {
        0.0
    } else if n < 0.5 {
        255.0 * 4.0 * (n - 0.25)
    } else if n < 0.75 {
        255.0
    } else {
        255.0 * (1.0 - 4.0 * (n - 0.75))
    };

    let g = if n < 0.25 {
        255.0 * 4.0 * n
    } else if n < 0.75 {
        255.0
    } else {
        255.0 * (1.0 - 4.0 * (n - 0.75))
    };

    let b = if n < 0.5 { 255.0 * (1.0 - 4.0 * n) } else { 0.0 };

    [
        r.clamp(0.0, 255.0) as u8,
        g.clamp(0.0, 255.0) as u8,
        b.clamp(0.0, 255.0) as u8,
    ]
}

/// Colormapped overlay pixel with the attention-scaled alpha: low-attention
/// areas fade toward transparent, saturating at intensity 128.
fn overlay_pixel(intensity: u8) -> Rgba<u8> {
    let [r, g, b] = jet_color(intensity);
    let a = (2 * intensity as u16).min(255) as u8;
    Rgba([r, g, b, a])
}

/// Encoded heatmap overlay ready for storage or transport.
#[derive(Debug, Clone)]
pub struct HeatmapAsset {
    /// Lossless PNG bytes.
    pub png_bytes: Vec<u8>,
    /// PNG bytes, base64-encoded for transport.
    pub base64: String,
    pub width: u32,
    pub height: u32,
}

/// Renders attention overlays for predictions.
#[derive(Debug, Clone)]
pub struct HeatmapSynthesizer {
    /// Grid size the attention math runs at (the model input size).
    input_size: u32,
    /// Cap on the longer side of the encoded overlay.
    max_size: u32,
}

impl HeatmapSynthesizer {
    pub fn new(input_size: u32, max_size: u32) -> Self {
        Self { input_size, max_size }
    }

    /// Synthesize the overlay for a prediction.
    ///
    /// The heatmap is cosmetic; every internal failure is absorbed here and
    /// surfaces as `None` with a logged warning.
    pub fn synthesize(
        &self,
        original_width: u32,
        original_height: u32,
        prediction: &PredictionResult,
    ) -> Option<HeatmapAsset> {
        match self.render(original_width, original_height, prediction) {
            Ok(asset) => {
                debug!(
                    "Heatmap generated: {} bytes ({}x{})",
                    asset.png_bytes.len(),
                    asset.width,
                    asset.height
                );
                Some(asset)
            }
            Err(e) => {
                warn!("Heatmap synthesis failed, continuing without it: {}", e);
                None
            }
        }
    }

    fn render(
        &self,
        original_width: u32,
        original_height: u32,
        prediction: &PredictionResult,
    ) -> Result<HeatmapAsset> {
        if original_width == 0 || original_height == 0 {
            return Err(CxrError::Heatmap(format!(
                "degenerate source dimensions {}x{}",
                original_width, original_height
            )));
        }

        let size = self.input_size;
        let regions = attention_regions(size, prediction);
        let grid = intensity_grid(size, &regions, prediction.confidence);

        let mut overlay = RgbaImage::new(size, size);
        for (i, &intensity) in grid.iter().enumerate() {
            let x = (i as u32) % size;
            let y = (i as u32) / size;
            overlay.put_pixel(x, y, overlay_pixel(intensity));
        }

        let (target_width, target_height) =
            bounded_dimensions(original_width, original_height, self.max_size);

        // Contain fit onto a transparent canvas of the target aspect ratio.
        let resized = DynamicImage::ImageRgba8(overlay)
            .resize(target_width, target_height, imageops::FilterType::Lanczos3)
            .to_rgba8();
        let mut canvas = RgbaImage::new(target_width, target_height);
        let dx = (target_width - resized.width()) / 2;
        let dy = (target_height - resized.height()) / 2;
        imageops::overlay(&mut canvas, &resized, i64::from(dx), i64::from(dy));

        let mut png_bytes = Vec::new();
        PngEncoder::new_with_quality(&mut png_bytes, CompressionType::Best, PngFilterType::Adaptive)
            .write_image(
                canvas.as_raw(),
                target_width,
                target_height,
                ExtendedColorType::Rgba8,
            )
            .map_err(|e| CxrError::Heatmap(e.to_string()))?;

        let base64 = BASE64.encode(&png_bytes);

        Ok(HeatmapAsset {
            png_bytes,
            base64,
            width: target_width,
            height: target_height,
        })
    }
}

/// Scale (width, height) down so the longer side is at most `max_size`.
/// Sources already within the cap keep their dimensions; nothing upscales.
fn bounded_dimensions(width: u32, height: u32, max_size: u32) -> (u32, u32) {
    if width <= max_size && height <= max_size {
        return (width, height);
    }

    let ratio = (max_size as f32 / width as f32).min(max_size as f32 / height as f32);
    let bounded_width = ((width as f32 * ratio) as u32).max(1);
    let bounded_height = ((height as f32 * ratio) as u32).max(1);
    (bounded_width, bounded_height)
}
