use anyhow::{bail, Context, Result};
use std::path::Path;

/// Decoded 8-bit RGB image plus the on-disk size of the file it came from.
///
/// The buffer layout is row-major, three interleaved channels per pixel.
/// Constructing a `PixelBuffer` is the single place where input shape is
/// validated; everything downstream can assume `data.len() == w * h * 3`.
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    width: usize,
    height: usize,
    size_kb: f64,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Wrap a raw RGB8 buffer. This is the one hard input-validation failure
    /// in the crate: a buffer whose length does not match width x height x 3
    /// has no meaningful interpretation and is rejected outright.
    pub fn new(width: usize, height: usize, size_kb: f64, data: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            bail!("image dimensions must be non-zero (got {width}x{height})");
        }
        let expected = width * height * 3;
        if data.len() != expected {
            bail!(
                "malformed pixel buffer: {width}x{height} RGB requires {expected} bytes, got {}",
                data.len()
            );
        }
        Ok(Self {
            width,
            height,
            size_kb,
            data,
        })
    }

    /// Decode an image file into an RGB8 buffer, recording its file size.
    pub fn from_file(path: &Path) -> Result<Self> {
        let file_len = std::fs::metadata(path)
            .with_context(|| format!("failed to stat image file: {}", path.display()))?
            .len();
        let decoded = image::open(path)
            .with_context(|| format!("failed to decode image: {}", path.display()))?
            .to_rgb8();
        let (width, height) = decoded.dimensions();
        let size_kb = file_len as f64 / 1024.0;
        Self::new(width as usize, height as usize, size_kb, decoded.into_raw())
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn size_kb(&self) -> f64 {
        self.size_kb
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// RGB channels of the pixel at (x, y).
    pub fn pixel(&self, x: usize, y: usize) -> [u8; 3] {
        let i = (y * self.width + x) * 3;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    /// Per-pixel brightness as (r + g + b) / 3, in 0..=255 scale.
    pub fn grayscale(&self) -> Vec<f64> {
        self.data
            .chunks_exact(3)
            .map(|px| (px[0] as f64 + px[1] as f64 + px[2] as f64) / 3.0)
            .collect()
    }

    /// Nearest-neighbor subsample so the longest side is at most `max_side`.
    /// Returns self-equivalent data unchanged when already small enough.
    pub fn subsampled(&self, max_side: usize) -> PixelBuffer {
        let longest = self.width.max(self.height);
        if longest <= max_side {
            return self.clone();
        }
        let step = longest.div_ceil(max_side);
        let new_w = self.width.div_ceil(step);
        let new_h = self.height.div_ceil(step);
        let mut data = Vec::with_capacity(new_w * new_h * 3);
        for y in (0..self.height).step_by(step) {
            for x in (0..self.width).step_by(step) {
                data.extend_from_slice(&self.pixel(x, y));
            }
        }
        PixelBuffer {
            width: new_w,
            height: new_h,
            size_kb: self.size_kb,
            data,
        }
    }
}
