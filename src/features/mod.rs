//! Feature extraction: one fixed-schema vector of scalar visual measurements
//! per image.
//!
//! Every field of [`FeatureVector`] always exists; [`FeatureVector::default`]
//! supplies the documented neutral value for each one, chosen inside the dead
//! zone of the default threshold profile so that a default vector fires no
//! rule. Extraction never fails: when pixel data is unavailable the extractor
//! degrades to coarse proxies derived from stored scalar metadata, and fields
//! without a meaningful proxy keep their neutral defaults.

pub mod statistics;
pub mod structure;

use crate::image::PixelBuffer;
use serde::{Deserialize, Serialize};

/// Previously computed scalar summaries of an image, used when the raw pixels
/// are no longer available.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub avg_red: f64,
    pub avg_green: f64,
    pub avg_blue: f64,
    pub size_kb: f64,
    pub width: u32,
    pub height: u32,
    pub contrast: f64,
    pub edges_detected: bool,
}

/// The fixed vocabulary of feature names the rule DSL can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKey {
    MeanBrightness,
    EdgeDensity,
    AreaRatio,
    ContrastIqr,
    HueStd,
    TextureEntropy,
    ColorComplexity,
    BrightnessVariance,
    SpatialFrequency,
    FillRatioAdvanced,
    SaturationMean,
    CornerVariance,
    VerticalFillRatio,
    IrregularShapes,
    Symmetry,
    BackgroundUniformity,
    CenterEmptiness,
    PerspectiveStrength,
    EdgeCoherence,
    FileSizeMb,
    AvgRed,
    AvgGreen,
    AvgBlue,
    RedBlueRatio,
}

/// Scalar visual measurements describing one image. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Mean of all channel samples, 0..=255.
    pub mean_brightness: f64,
    /// Mean Laplacian response normalized to [0, 1].
    pub edge_density: f64,
    /// Normalized spatial color variability, [0, 1].
    pub area_ratio: f64,
    /// Interquartile range of grayscale intensity, 0..=255.
    pub contrast_iqr: f64,
    /// Standard deviation of the hue channel, degrees.
    pub hue_std: f64,
    /// Shannon entropy (bits) of a coarsened grayscale histogram.
    pub texture_entropy: f64,
    /// Fraction of distinct quantized colors after downsampling, [0, 1].
    pub color_complexity: f64,
    /// Variance of per-pixel brightness.
    pub brightness_variance: f64,
    /// RMS of horizontal and vertical first-difference gradients.
    pub spatial_frequency: f64,
    /// Fraction of high-variance local windows, [0, 1].
    pub fill_ratio_advanced: f64,
    /// Mean HSV saturation, [0, 1].
    pub saturation_mean: f64,
    /// Normalized variance of the four corner patches, [0, 1].
    pub corner_variance: f64,
    /// Top-half share of grayscale variance, [0, 1].
    pub vertical_fill_ratio: f64,
    /// Gradient-orientation dispersion, [0, 1].
    pub irregular_shapes: f64,
    /// Mirror-symmetry similarity, [0, 1].
    pub symmetry: f64,
    /// Fraction of low-gradient "flat" pixels, [0, 1].
    pub background_uniformity: f64,
    /// Inverted central-region variability, [0, 1].
    pub center_emptiness: f64,
    /// Fraction of strong edges near horizontal/vertical orientation, [0, 1].
    pub perspective_strength: f64,
    /// Dominant-orientation share of gradient energy, [0, 1].
    pub edge_coherence: f64,
    /// File size in megabytes.
    pub file_size_mb: f64,
    /// Raw channel averages, 0..=255.
    pub avg_red: f64,
    pub avg_green: f64,
    pub avg_blue: f64,
    /// avg_red / (avg_blue + epsilon), derived once at extraction.
    pub red_blue_ratio: f64,
}

impl Default for FeatureVector {
    /// Neutral values: under the default threshold profile, no rule in the
    /// default catalog fires on this vector.
    fn default() -> Self {
        Self {
            mean_brightness: 110.0,
            edge_density: 0.065,
            area_ratio: 0.6,
            contrast_iqr: 85.0,
            hue_std: 65.0,
            texture_entropy: 6.0,
            color_complexity: 0.1,
            brightness_variance: 1000.0,
            spatial_frequency: 20.0,
            fill_ratio_advanced: 0.5,
            saturation_mean: 0.3,
            corner_variance: 0.3,
            vertical_fill_ratio: 0.6,
            irregular_shapes: 0.4,
            symmetry: 0.5,
            background_uniformity: 0.4,
            center_emptiness: 0.4,
            perspective_strength: 0.3,
            edge_coherence: 0.5,
            file_size_mb: 0.3,
            avg_red: 128.0,
            avg_green: 128.0,
            avg_blue: 128.0,
            red_blue_ratio: 1.0,
        }
    }
}

impl FeatureVector {
    pub fn get(&self, key: FeatureKey) -> f64 {
        match key {
            FeatureKey::MeanBrightness => self.mean_brightness,
            FeatureKey::EdgeDensity => self.edge_density,
            FeatureKey::AreaRatio => self.area_ratio,
            FeatureKey::ContrastIqr => self.contrast_iqr,
            FeatureKey::HueStd => self.hue_std,
            FeatureKey::TextureEntropy => self.texture_entropy,
            FeatureKey::ColorComplexity => self.color_complexity,
            FeatureKey::BrightnessVariance => self.brightness_variance,
            FeatureKey::SpatialFrequency => self.spatial_frequency,
            FeatureKey::FillRatioAdvanced => self.fill_ratio_advanced,
            FeatureKey::SaturationMean => self.saturation_mean,
            FeatureKey::CornerVariance => self.corner_variance,
            FeatureKey::VerticalFillRatio => self.vertical_fill_ratio,
            FeatureKey::IrregularShapes => self.irregular_shapes,
            FeatureKey::Symmetry => self.symmetry,
            FeatureKey::BackgroundUniformity => self.background_uniformity,
            FeatureKey::CenterEmptiness => self.center_emptiness,
            FeatureKey::PerspectiveStrength => self.perspective_strength,
            FeatureKey::EdgeCoherence => self.edge_coherence,
            FeatureKey::FileSizeMb => self.file_size_mb,
            FeatureKey::AvgRed => self.avg_red,
            FeatureKey::AvgGreen => self.avg_green,
            FeatureKey::AvgBlue => self.avg_blue,
            FeatureKey::RedBlueRatio => self.red_blue_ratio,
        }
    }
}

/// Computes a complete [`FeatureVector`] from pixels or from stored metadata.
pub struct FeatureExtractor;

impl FeatureExtractor {
    /// Full extraction from a decoded RGB8 buffer. Pure; the heavy formulas
    /// run on subsampled planes for robustness and tractability.
    pub fn from_pixels(buf: &PixelBuffer) -> FeatureVector {
        let gray = buf.grayscale();
        let (width, height) = (buf.width(), buf.height());

        // Channel statistics over the full-resolution buffer.
        let mut channel_sums = [0.0f64; 3];
        for px in buf.data().chunks_exact(3) {
            channel_sums[0] += px[0] as f64;
            channel_sums[1] += px[1] as f64;
            channel_sums[2] += px[2] as f64;
        }
        let pixel_count = (width * height) as f64;
        let avg_red = channel_sums[0] / pixel_count;
        let avg_green = channel_sums[1] / pixel_count;
        let avg_blue = channel_sums[2] / pixel_count;
        let mean_brightness = (avg_red + avg_green + avg_blue) / 3.0;

        // Hue/saturation on a subsampled plane; per-pixel noise washes out the
        // hue statistic at full resolution anyway.
        let small = buf.subsampled(128);
        let mut hues = Vec::with_capacity(small.width() * small.height());
        let mut sats = Vec::with_capacity(small.width() * small.height());
        for px in small.data().chunks_exact(3) {
            let (h, s, _) = statistics::rgb_to_hsv(px[0], px[1], px[2]);
            hues.push(h);
            sats.push(s);
        }
        let small_gray = small.grayscale();

        // One gradient pass on a mid-resolution plane feeds the four
        // orientation-based features.
        let mid = buf.subsampled(256);
        let mid_gray = mid.grayscale();
        let grads = structure::Gradients::compute(&mid_gray, mid.width(), mid.height());

        FeatureVector {
            mean_brightness,
            edge_density: structure::edge_density(&gray, width, height),
            area_ratio: structure::area_ratio(&gray),
            contrast_iqr: statistics::iqr(&gray),
            hue_std: statistics::std_dev(&hues),
            texture_entropy: statistics::histogram_entropy(&small_gray, 64),
            color_complexity: structure::color_complexity(buf),
            brightness_variance: statistics::variance(&gray),
            spatial_frequency: structure::spatial_frequency(&gray, width, height),
            fill_ratio_advanced: structure::fill_ratio_advanced(buf),
            saturation_mean: statistics::mean(&sats),
            corner_variance: structure::corner_variance(&mid_gray, mid.width(), mid.height()),
            vertical_fill_ratio: structure::vertical_fill_ratio(
                &mid_gray,
                mid.width(),
                mid.height(),
            ),
            irregular_shapes: grads.irregularity(),
            symmetry: structure::symmetry(&mid_gray, mid.width(), mid.height()),
            background_uniformity: grads.flat_fraction(),
            center_emptiness: structure::center_emptiness(&mid_gray, mid.width(), mid.height()),
            perspective_strength: grads.axis_alignment(15.0),
            edge_coherence: grads.coherence(),
            file_size_mb: buf.size_kb() / 1024.0,
            avg_red,
            avg_green,
            avg_blue,
            red_blue_ratio: avg_red / (avg_blue + 1e-5),
        }
    }

    /// Degraded extraction from stored scalar metadata. Fields with no
    /// meaningful proxy keep their neutral defaults.
    pub fn from_metadata(meta: &ImageMetadata) -> FeatureVector {
        log::debug!(
            "extracting proxy features from metadata ({}x{}, {:.1} KB)",
            meta.width,
            meta.height,
            meta.size_kb
        );
        let channels = [meta.avg_red, meta.avg_green, meta.avg_blue];
        let area_ratio = (meta.contrast / 255.0).clamp(0.0, 1.0);
        FeatureVector {
            mean_brightness: statistics::mean(&channels),
            edge_density: if meta.edges_detected { 0.08 } else { 0.03 },
            area_ratio,
            contrast_iqr: meta.contrast,
            hue_std: statistics::std_dev(&channels),
            brightness_variance: meta.contrast * meta.contrast,
            fill_ratio_advanced: area_ratio,
            file_size_mb: meta.size_kb / 1024.0,
            avg_red: meta.avg_red,
            avg_green: meta.avg_green,
            avg_blue: meta.avg_blue,
            red_blue_ratio: meta.avg_red / (meta.avg_blue + 1e-5),
            ..FeatureVector::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: usize, height: usize, rgb: [u8; 3]) -> PixelBuffer {
        let data: Vec<u8> = rgb.iter().copied().cycle().take(width * height * 3).collect();
        PixelBuffer::new(width, height, 100.0, data).unwrap()
    }

    fn sample_metadata() -> ImageMetadata {
        ImageMetadata {
            avg_red: 120.0,
            avg_green: 110.0,
            avg_blue: 100.0,
            size_kb: 512.0,
            width: 640,
            height: 480,
            contrast: 40.0,
            edges_detected: true,
        }
    }

    #[test]
    fn uniform_image_has_degenerate_statistics() {
        let buf = solid(64, 64, [80, 80, 80]);
        let features = FeatureExtractor::from_pixels(&buf);
        assert!((features.mean_brightness - 80.0).abs() < 1e-9);
        assert_eq!(features.brightness_variance, 0.0);
        assert_eq!(features.contrast_iqr, 0.0);
        assert_eq!(features.edge_density, 0.0);
        assert_eq!(features.texture_entropy, 0.0);
        assert_eq!(features.spatial_frequency, 0.0);
        assert_eq!(features.symmetry, 1.0);
        assert_eq!(features.background_uniformity, 1.0);
        assert!(features.center_emptiness > 0.99);
    }

    #[test]
    fn noisy_image_scores_busier_than_flat() {
        let mut data = Vec::with_capacity(64 * 64 * 3);
        let mut state = 0x2545_f491u32;
        for _ in 0..64 * 64 * 3 {
            // xorshift keeps this deterministic without a rand dependency
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            data.push((state >> 24) as u8);
        }
        let noisy = PixelBuffer::new(64, 64, 100.0, data).unwrap();
        let flat = solid(64, 64, [128, 128, 128]);
        let f_noisy = FeatureExtractor::from_pixels(&noisy);
        let f_flat = FeatureExtractor::from_pixels(&flat);
        assert!(f_noisy.texture_entropy > f_flat.texture_entropy);
        assert!(f_noisy.color_complexity > f_flat.color_complexity);
        assert!(f_noisy.spatial_frequency > f_flat.spatial_frequency);
        assert!(f_noisy.background_uniformity < f_flat.background_uniformity);
    }

    #[test]
    fn metadata_fallback_formulas() {
        let meta = sample_metadata();
        let features = FeatureExtractor::from_metadata(&meta);
        assert!((features.mean_brightness - 110.0).abs() < 1e-9);
        assert!((features.contrast_iqr - 40.0).abs() < 1e-9);
        assert!((features.brightness_variance - 1600.0).abs() < 1e-9);
        assert!((features.area_ratio - 40.0 / 255.0).abs() < 1e-9);
        assert_eq!(features.fill_ratio_advanced, features.area_ratio);
        assert!((features.file_size_mb - 0.5).abs() < 1e-9);
        assert!((features.edge_density - 0.08).abs() < 1e-9);
        // No proxy exists for the geometric summaries: neutral defaults.
        let neutral = FeatureVector::default();
        assert_eq!(features.symmetry, neutral.symmetry);
        assert_eq!(features.center_emptiness, neutral.center_emptiness);
        assert_eq!(features.perspective_strength, neutral.perspective_strength);
    }

    #[test]
    fn metadata_without_edges_uses_low_edge_constant() {
        let meta = ImageMetadata {
            edges_detected: false,
            ..sample_metadata()
        };
        let features = FeatureExtractor::from_metadata(&meta);
        assert!((features.edge_density - 0.03).abs() < 1e-9);
    }

    #[test]
    fn feature_key_round_trips_through_serde() {
        let json = serde_json::to_string(&FeatureKey::FillRatioAdvanced).unwrap();
        assert_eq!(json, "\"fill_ratio_advanced\"");
        let key: FeatureKey = serde_json::from_str(&json).unwrap();
        assert_eq!(key, FeatureKey::FillRatioAdvanced);
    }

    #[test]
    fn get_matches_struct_fields() {
        let features = FeatureVector {
            hue_std: 42.0,
            ..FeatureVector::default()
        };
        assert_eq!(features.get(FeatureKey::HueStd), 42.0);
        assert_eq!(features.get(FeatureKey::AvgRed), 128.0);
    }
}
