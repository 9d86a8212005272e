//! Scalar statistics shared by the feature formulas.

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64
}

pub fn std_dev(values: &[f64]) -> f64 {
    variance(values).sqrt()
}

/// Percentile by partial sort, `p` in 0..=100. Mutates `values` in place to
/// avoid a copy on the hot path.
pub fn percentile(values: &mut [f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let idx = ((values.len() as f64 - 1.0) * p / 100.0).round() as usize;
    let idx = idx.min(values.len() - 1);
    values.select_nth_unstable_by(idx, |a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    values[idx]
}

/// Interquartile range (75th minus 25th percentile).
pub fn iqr(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut scratch = values.to_vec();
    let q3 = percentile(&mut scratch, 75.0);
    let q1 = percentile(&mut scratch, 25.0);
    (q3 - q1).max(0.0)
}

/// Shannon entropy (bits) of a histogram over `values` bucketed into `bins`
/// equal-width bins spanning 0..=255.
pub fn histogram_entropy(values: &[f64], bins: usize) -> f64 {
    if values.is_empty() || bins == 0 {
        return 0.0;
    }
    let mut counts = vec![0usize; bins];
    let scale = bins as f64 / 256.0;
    for &v in values {
        let bin = ((v.clamp(0.0, 255.0) * scale) as usize).min(bins - 1);
        counts[bin] += 1;
    }
    let total = values.len() as f64;
    counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / total;
            -p * p.log2()
        })
        .sum()
}

/// RGB (0..=255) to HSV: hue in degrees 0..360, saturation and value in 0..=1.
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (f64, f64, f64) {
    let r = r as f64 / 255.0;
    let g = g as f64 / 255.0;
    let b = b as f64 / 255.0;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let hue = if delta.abs() < f64::EPSILON {
        0.0
    } else if (max - r).abs() < f64::EPSILON {
        60.0 * (((g - b) / delta).rem_euclid(6.0))
    } else if (max - g).abs() < f64::EPSILON {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    let saturation = if max <= 0.0 { 0.0 } else { delta / max };
    (hue, saturation, max)
}
