//! Spatial and geometric image summaries.
//!
//! Everything here operates on either the raw `PixelBuffer` or a precomputed
//! grayscale plane, and returns a bounded scalar. Gradient-based measures share
//! one central-difference pass via [`Gradients`].

use crate::features::statistics;
use crate::image::PixelBuffer;

/// Gradient magnitude below which a pixel counts as "flat".
const FLAT_GRADIENT_CUTOFF: f64 = 8.0;

/// First-difference gradient field of a grayscale plane.
pub struct Gradients {
    /// (magnitude, orientation in degrees folded to 0..180) per interior pixel.
    samples: Vec<(f64, f64)>,
}

impl Gradients {
    pub fn compute(gray: &[f64], width: usize, height: usize) -> Self {
        let mut samples = Vec::new();
        if width < 3 || height < 3 {
            return Self { samples };
        }
        for y in 1..height - 1 {
            for x in 1..width - 1 {
                let dx = (gray[y * width + x + 1] - gray[y * width + x - 1]) / 2.0;
                let dy = (gray[(y + 1) * width + x] - gray[(y - 1) * width + x]) / 2.0;
                let magnitude = (dx * dx + dy * dy).sqrt();
                let orientation = dy.atan2(dx).to_degrees().rem_euclid(180.0);
                samples.push((magnitude, orientation));
            }
        }
        Self { samples }
    }

    fn strong(&self) -> impl Iterator<Item = &(f64, f64)> {
        self.samples
            .iter()
            .filter(|(mag, _)| *mag >= FLAT_GRADIENT_CUTOFF)
    }

    /// Magnitude-weighted orientation histogram over `bins` equal slices of
    /// 0..180 degrees, restricted to strong gradients.
    fn orientation_histogram(&self, bins: usize) -> Vec<f64> {
        let mut hist = vec![0.0; bins];
        for (mag, orientation) in self.strong() {
            let bin = ((orientation / 180.0 * bins as f64) as usize).min(bins - 1);
            hist[bin] += mag;
        }
        hist
    }

    /// Share of gradient energy concentrated in the dominant orientation bin.
    /// 0.5 when the image has no strong edges at all.
    pub fn coherence(&self) -> f64 {
        let hist = self.orientation_histogram(8);
        let total: f64 = hist.iter().sum();
        if total <= 0.0 {
            return 0.5;
        }
        hist.iter().cloned().fold(0.0, f64::max) / total
    }

    /// Orientation dispersion: normalized entropy of the orientation histogram.
    /// 1.0 means gradient directions are maximally scattered (irregular
    /// shapes), 0.0 means a single dominant direction.
    pub fn irregularity(&self) -> f64 {
        let hist = self.orientation_histogram(8);
        let total: f64 = hist.iter().sum();
        if total <= 0.0 {
            return 0.0;
        }
        let entropy: f64 = hist
            .iter()
            .filter(|&&v| v > 0.0)
            .map(|&v| {
                let p = v / total;
                -p * p.log2()
            })
            .sum();
        entropy / (hist.len() as f64).log2()
    }

    /// Fraction of strong edges aligned within `tolerance` degrees of the
    /// horizontal or vertical axis. Straight bin walls and rim lines show up
    /// here; clutter does not.
    pub fn axis_alignment(&self, tolerance: f64) -> f64 {
        let mut strong = 0usize;
        let mut aligned = 0usize;
        for (_, orientation) in self.strong() {
            strong += 1;
            let folded = orientation.rem_euclid(90.0);
            if folded <= tolerance || folded >= 90.0 - tolerance {
                aligned += 1;
            }
        }
        if strong == 0 {
            return 0.0;
        }
        aligned as f64 / strong as f64
    }

    /// Fraction of pixels whose gradient magnitude stays below the flat
    /// cutoff, i.e. how much of the frame is smooth background.
    pub fn flat_fraction(&self) -> f64 {
        if self.samples.is_empty() {
            return 1.0;
        }
        let flat = self
            .samples
            .iter()
            .filter(|(mag, _)| *mag < FLAT_GRADIENT_CUTOFF)
            .count();
        flat as f64 / self.samples.len() as f64
    }
}

/// Mean absolute Laplacian response normalized by the maximum channel value.
pub fn edge_density(gray: &[f64], width: usize, height: usize) -> f64 {
    if width < 3 || height < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    let mut count = 0usize;
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let center = gray[y * width + x];
            let response = 4.0 * center
                - gray[y * width + x - 1]
                - gray[y * width + x + 1]
                - gray[(y - 1) * width + x]
                - gray[(y + 1) * width + x];
            sum += response.abs();
            count += 1;
        }
    }
    (sum / count as f64 / 255.0).clamp(0.0, 1.0)
}

/// RMS of horizontal and vertical first differences of grayscale intensity.
pub fn spatial_frequency(gray: &[f64], width: usize, height: usize) -> f64 {
    if width < 2 || height < 2 {
        return 0.0;
    }
    let mut row_sq = 0.0;
    let mut row_n = 0usize;
    for y in 0..height {
        for x in 1..width {
            let d = gray[y * width + x] - gray[y * width + x - 1];
            row_sq += d * d;
            row_n += 1;
        }
    }
    let mut col_sq = 0.0;
    let mut col_n = 0usize;
    for y in 1..height {
        for x in 0..width {
            let d = gray[y * width + x] - gray[(y - 1) * width + x];
            col_sq += d * d;
            col_n += 1;
        }
    }
    ((row_sq / row_n as f64) + (col_sq / col_n as f64)).sqrt()
}

/// Normalized spatial color variability: std-dev of the per-pixel channel
/// mean, scaled into [0, 1].
pub fn area_ratio(gray: &[f64]) -> f64 {
    (statistics::std_dev(gray) / 128.0).clamp(0.0, 1.0)
}

/// Fraction of distinct quantized colors after heavy spatial and color
/// downsampling. Each channel is reduced to 8 levels on a coarse grid, so a
/// uniform background collapses to a handful of codes while mixed refuse
/// produces many.
pub fn color_complexity(buf: &PixelBuffer) -> f64 {
    let small = buf.subsampled(64);
    let mut seen = std::collections::HashSet::new();
    let mut samples = 0usize;
    for px in small.data().chunks_exact(3) {
        let code = ((px[0] >> 5) as u16) << 6 | ((px[1] >> 5) as u16) << 3 | (px[2] >> 5) as u16;
        seen.insert(code);
        samples += 1;
    }
    if samples == 0 {
        return 0.0;
    }
    seen.len() as f64 / samples as f64
}

/// Coarse occupancy estimator: fraction of sampled local windows (HSV value
/// channel, subsampled image) whose variance exceeds the 60th percentile of
/// all sampled window variances.
pub fn fill_ratio_advanced(buf: &PixelBuffer) -> f64 {
    const WINDOW: usize = 8;
    let small = buf.subsampled(128);
    let (w, h) = (small.width(), small.height());
    if w < WINDOW || h < WINDOW {
        return 0.0;
    }
    let values: Vec<f64> = small
        .data()
        .chunks_exact(3)
        .map(|px| {
            let (_, _, v) = statistics::rgb_to_hsv(px[0], px[1], px[2]);
            v * 255.0
        })
        .collect();

    let mut window_vars = Vec::new();
    for wy in (0..h - WINDOW + 1).step_by(WINDOW) {
        for wx in (0..w - WINDOW + 1).step_by(WINDOW) {
            let mut patch = Vec::with_capacity(WINDOW * WINDOW);
            for y in wy..wy + WINDOW {
                for x in wx..wx + WINDOW {
                    patch.push(values[y * w + x]);
                }
            }
            window_vars.push(statistics::variance(&patch));
        }
    }
    if window_vars.is_empty() {
        return 0.0;
    }
    let mut scratch = window_vars.clone();
    let cutoff = statistics::percentile(&mut scratch, 60.0);
    let busy = window_vars.iter().filter(|&&v| v > cutoff).count();
    busy as f64 / window_vars.len() as f64
}

/// Mean grayscale variance of the four corner patches, normalized into [0, 1].
pub fn corner_variance(gray: &[f64], width: usize, height: usize) -> f64 {
    let pw = (width / 4).max(1);
    let ph = (height / 4).max(1);
    let corners = [
        (0, 0),
        (width - pw, 0),
        (0, height - ph),
        (width - pw, height - ph),
    ];
    let mut total = 0.0;
    for (cx, cy) in corners {
        let mut patch = Vec::with_capacity(pw * ph);
        for y in cy..cy + ph {
            for x in cx..cx + pw {
                patch.push(gray[y * width + x]);
            }
        }
        total += statistics::variance(&patch);
    }
    // 127.5^2 is the variance of the most extreme two-valued patch.
    (total / 4.0 / (127.5 * 127.5)).clamp(0.0, 1.0)
}

/// Share of the image's color variance sitting in the top half. A bin loaded
/// to the rim puts texture up high; an empty one keeps the top half bland.
pub fn vertical_fill_ratio(gray: &[f64], width: usize, height: usize) -> f64 {
    if height < 2 {
        return 0.0;
    }
    let split = height / 2 * width;
    let top_var = statistics::variance(&gray[..split]);
    let bottom_var = statistics::variance(&gray[split..]);
    let total = top_var + bottom_var;
    if total <= 0.0 {
        return 0.0;
    }
    top_var / total
}

/// Mirror-symmetry similarity between the left half and the reflected right
/// half, in [0, 1].
pub fn symmetry(gray: &[f64], width: usize, height: usize) -> f64 {
    if width < 2 {
        return 1.0;
    }
    let half = width / 2;
    let mut diff = 0.0;
    let mut count = 0usize;
    for y in 0..height {
        for x in 0..half {
            let left = gray[y * width + x];
            let right = gray[y * width + (width - 1 - x)];
            diff += (left - right).abs();
            count += 1;
        }
    }
    (1.0 - diff / count as f64 / 255.0).clamp(0.0, 1.0)
}

/// Central-region emptiness: the middle third of the frame, with its grayscale
/// variability inverted so a flat, featureless center scores high.
pub fn center_emptiness(gray: &[f64], width: usize, height: usize) -> f64 {
    let x0 = width / 3;
    let x1 = (2 * width / 3).max(x0 + 1).min(width);
    let y0 = height / 3;
    let y1 = (2 * height / 3).max(y0 + 1).min(height);
    let mut region = Vec::with_capacity((x1 - x0) * (y1 - y0));
    for y in y0..y1 {
        for x in x0..x1 {
            region.push(gray[y * width + x]);
        }
    }
    (1.0 - statistics::std_dev(&region) / 128.0).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkerboard(width: usize, height: usize) -> Vec<f64> {
        (0..width * height)
            .map(|i| {
                let (x, y) = (i % width, i / width);
                if (x + y) % 2 == 0 {
                    255.0
                } else {
                    0.0
                }
            })
            .collect()
    }

    #[test]
    fn edge_density_flat_vs_busy() {
        let flat = vec![128.0; 16 * 16];
        let busy = checkerboard(16, 16);
        assert_eq!(edge_density(&flat, 16, 16), 0.0);
        assert!(edge_density(&busy, 16, 16) > 0.5);
    }

    #[test]
    fn spatial_frequency_flat_is_zero() {
        let flat = vec![77.0; 12 * 12];
        assert_eq!(spatial_frequency(&flat, 12, 12), 0.0);
    }

    #[test]
    fn symmetry_of_mirrored_plane_is_one() {
        let flat = vec![40.0; 10 * 10];
        assert_eq!(symmetry(&flat, 10, 10), 1.0);
    }

    #[test]
    fn symmetry_penalizes_lopsided_content() {
        let mut gray = vec![0.0; 10 * 10];
        for y in 0..10 {
            for x in 0..5 {
                gray[y * 10 + x] = 255.0;
            }
        }
        assert!(symmetry(&gray, 10, 10) < 0.1);
    }

    #[test]
    fn center_emptiness_high_for_flat_center() {
        let flat = vec![90.0; 30 * 30];
        assert!(center_emptiness(&flat, 30, 30) > 0.99);
        let noisy = checkerboard(30, 30);
        assert!(center_emptiness(&noisy, 30, 30) < center_emptiness(&flat, 30, 30));
    }

    #[test]
    fn vertical_fill_tracks_where_the_texture_is() {
        let mut gray = vec![100.0; 20 * 20];
        // Texture only in the top half.
        for y in 0..10 {
            for x in 0..20 {
                gray[y * 20 + x] = if (x + y) % 2 == 0 { 255.0 } else { 0.0 };
            }
        }
        assert!(vertical_fill_ratio(&gray, 20, 20) > 0.9);
    }

    #[test]
    fn flat_image_has_no_strong_gradients() {
        let flat = vec![128.0; 16 * 16];
        let grads = Gradients::compute(&flat, 16, 16);
        assert_eq!(grads.flat_fraction(), 1.0);
        assert_eq!(grads.coherence(), 0.5);
        assert_eq!(grads.irregularity(), 0.0);
        assert_eq!(grads.axis_alignment(15.0), 0.0);
    }

    #[test]
    fn vertical_stripes_are_coherent_and_axis_aligned() {
        let mut gray = vec![0.0; 24 * 24];
        for y in 0..24 {
            for x in 0..24 {
                gray[y * 24 + x] = if (x / 4) % 2 == 0 { 255.0 } else { 0.0 };
            }
        }
        let grads = Gradients::compute(&gray, 24, 24);
        assert!(grads.coherence() > 0.9);
        assert!(grads.axis_alignment(15.0) > 0.9);
        assert!(grads.irregularity() < 0.3);
    }
}
