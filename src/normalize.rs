//! Image normalisation for captured asset photos.
//!
//! Steps, in order:
//!
//! 1. Apply the EXIF orientation, if any.
//! 2. Rotate portrait images a quarter turn towards landscape.
//! 3. Ask the [`ObjectDetector`] for objects and crop to the most confident
//!    one above the threshold, padded (more padding for narrow boxes).
//! 4. Without a usable detection, crop to the bounding box of the image's
//!    edges (grayscale → blur → edge filter → threshold).
//! 5. Rotate again if the crop came out portrait.
//! 6. Re-encode as an RGB JPEG.
//!
//! [`ImageNormalizer::normalize`] never fails: on any error it hands back
//! the original bytes.

use std::cmp::Ordering;
use std::io::Cursor;
use std::sync::Arc;

use image::codecs::jpeg::JpegEncoder;
use image::metadata::Orientation;
use image::{imageops, DynamicImage, GenericImageView, ImageDecoder, ImageReader};
use serde::{Deserialize, Serialize};

use crate::error::NormalizeError;

/// Edge-detection kernel (the classic 3x3 Laplacian-style "find edges").
const FIND_EDGES: [f32; 9] = [-1.0, -1.0, -1.0, -1.0, 8.0, -1.0, -1.0, -1.0, -1.0];

// ---------------------------------------------------------------------------
// Detector capability
// ---------------------------------------------------------------------------

/// Axis-aligned box in pixel coordinates (`x1`/`y1` exclusive).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BoundingBox {
    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub class_id: u32,
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// An object-detection model. Loaded once by the host and shared read-only;
/// implementations must make concurrent `detect` calls safe.
pub trait ObjectDetector: Send + Sync {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<Detection>, NormalizeError>;
}

/// Detector for deployments without a model: never finds anything, so the
/// edge-based crop is always used.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDetector;

impl ObjectDetector for NullDetector {
    fn detect(&self, _image: &DynamicImage) -> Result<Vec<Detection>, NormalizeError> {
        Ok(Vec::new())
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tunables of the normalisation pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    /// Detections at or below this confidence are ignored.
    pub confidence_threshold: f32,
    /// Padding added around a detection, as a fraction of the image size.
    pub padding: f32,
    /// A box narrower than this fraction of the image width is "narrow".
    pub narrow_box_ratio: f32,
    /// Padding multiplier for narrow boxes.
    pub narrow_padding_multiplier: f32,
    /// Padding around the edge-detection bounding box.
    pub edge_padding: f32,
    /// Edge strength (0-255) that counts as part of the object.
    pub edge_threshold: u8,
    pub blur_sigma: f32,
    pub jpeg_quality: u8,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.3,
            padding: 0.15,
            narrow_box_ratio: 0.4,
            narrow_padding_multiplier: 2.5,
            edge_padding: 0.05,
            edge_threshold: 50,
            blur_sigma: 2.0,
            jpeg_quality: 85,
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CropRect {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

impl CropRect {
    /// From float edges, rounded and clamped to a `w`×`h` image. `None` if
    /// the result is empty.
    fn clamped(left: f32, top: f32, right: f32, bottom: f32, w: u32, h: u32) -> Option<Self> {
        let clamp = |v: f32, max: u32| v.round().clamp(0.0, max as f32) as u32;
        let (x0, y0) = (clamp(left, w), clamp(top, h));
        let (x1, y1) = (clamp(right, w), clamp(bottom, h));
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(Self {
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
        })
    }
}

/// Photo normaliser with an injected detector.
#[derive(Clone)]
pub struct ImageNormalizer {
    detector: Arc<dyn ObjectDetector>,
    config: NormalizeConfig,
}

impl Default for ImageNormalizer {
    fn default() -> Self {
        Self::new(Arc::new(NullDetector), NormalizeConfig::default())
    }
}

impl ImageNormalizer {
    pub fn new(detector: Arc<dyn ObjectDetector>, config: NormalizeConfig) -> Self {
        Self { detector, config }
    }

    pub fn config(&self) -> &NormalizeConfig {
        &self.config
    }

    /// Normalise `bytes`, returning them unchanged if anything fails.
    pub fn normalize(&self, bytes: &[u8]) -> Vec<u8> {
        match self.try_normalize(bytes) {
            Ok(out) => out,
            Err(e) => {
                log::warn!("Image normalisation failed, keeping original bytes: {e}");
                bytes.to_vec()
            }
        }
    }

    /// Same pipeline, with errors surfaced.
    pub fn try_normalize(&self, bytes: &[u8]) -> Result<Vec<u8>, NormalizeError> {
        let mut img = decode_oriented(bytes)?;
        log::debug!("Normalising {}x{} image", img.width(), img.height());

        if img.height() > img.width() {
            img = img.rotate270();
        }

        let crop = self
            .detection_crop(&img)
            .or_else(|| self.edge_crop(&img));
        let mut out = match crop {
            Some(r) => img.crop_imm(r.x, r.y, r.width, r.height),
            None => img,
        };

        if out.height() > out.width() {
            log::debug!("Crop is portrait, rotating to landscape");
            out = out.rotate270();
        }

        let rgb = out.to_rgb8();
        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, self.config.jpeg_quality)
            .encode_image(&rgb)
            .map_err(|e| NormalizeError::Encode(e.to_string()))?;
        Ok(jpeg)
    }

    fn detection_crop(&self, img: &DynamicImage) -> Option<CropRect> {
        let detections = match self.detector.detect(img) {
            Ok(d) => d,
            Err(e) => {
                log::warn!("Object detection failed, falling back to edge crop: {e}");
                return None;
            }
        };
        let best = detections
            .iter()
            .filter(|d| d.confidence > self.config.confidence_threshold)
            .max_by(|a, b| a.confidence.partial_cmp(&b.confidence).unwrap_or(Ordering::Equal))?;

        let (w, h) = img.dimensions();
        let mut padding = self.config.padding;
        if best.bbox.width() < w as f32 * self.config.narrow_box_ratio {
            padding *= self.config.narrow_padding_multiplier;
        }
        let pad_w = w as f32 * padding;
        let pad_h = h as f32 * padding;
        log::debug!(
            "Detected '{}' ({:.2}), padding {:.3}",
            best.label,
            best.confidence,
            padding
        );

        let b = best.bbox;
        CropRect::clamped(
            b.x0.max(0.0) - pad_w,
            b.y0.max(0.0) - pad_h,
            b.x1.min(w as f32) + pad_w,
            b.y1.min(h as f32) + pad_h,
            w,
            h,
        )
    }

    fn edge_crop(&self, img: &DynamicImage) -> Option<CropRect> {
        let gray = img.to_luma8();
        let blurred = imageops::blur(&gray, self.config.blur_sigma);
        let edges = imageops::filter3x3(&blurred, &FIND_EDGES);

        let mut bounds: Option<(u32, u32, u32, u32)> = None;
        for (x, y, px) in edges.enumerate_pixels() {
            if px.0[0] < self.config.edge_threshold {
                continue;
            }
            bounds = Some(match bounds {
                None => (x, y, x + 1, y + 1),
                Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x + 1), y1.max(y + 1)),
            });
        }
        let (x0, y0, x1, y1) = bounds?;

        let (w, h) = img.dimensions();
        let pad_w = (w as f32 * self.config.edge_padding).floor();
        let pad_h = (h as f32 * self.config.edge_padding).floor();
        CropRect::clamped(
            x0 as f32 - pad_w,
            y0 as f32 - pad_h,
            x1 as f32 + pad_w,
            y1 as f32 + pad_h,
            w,
            h,
        )
    }
}

fn decode_oriented(bytes: &[u8]) -> Result<DynamicImage, NormalizeError> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| NormalizeError::Decode(e.to_string()))?;
    let mut decoder = reader.into_decoder()?;
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
    let mut img = DynamicImage::from_decoder(decoder)?;
    img.apply_orientation(orientation);
    Ok(img)
}
