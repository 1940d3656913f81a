use image::GrayImage;
use ndarray::ArrayView2;
use rayon::prelude::*;

/// Relative epsilon keeping contrast spans strictly positive.
pub const MIN_SPAN_FACTOR: f32 = 1e-6;

/// Linear intensity window mapped onto the displayable 8-bit range.
///
/// Invariant: `max - min` is at least `MIN_SPAN_FACTOR * max(1, |hi - lo|)`
/// of the extent it was clamped against, so the normalization division is
/// always well defined.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ContrastRange {
    pub min: f32,
    pub max: f32,
}

impl ContrastRange {
    /// Repair an arbitrary user-supplied pair against the observed sample
    /// extent `[lo, hi]`. Inverted or degenerate input is clamped rather
    /// than rejected; contrast is advisory, not structural.
    pub fn clamped(min: f32, max: f32, lo: f32, hi: f32) -> Self {
        let eps = MIN_SPAN_FACTOR * f32::max(1.0, (hi - lo).abs());
        let min = min.max(lo).min(hi - eps);
        let mut max = max.max(lo + eps).min(hi);
        if max - min < eps {
            // min + eps can round back onto min near large magnitudes.
            max = (min + eps).max(min.next_up());
        }
        Self { min, max }
    }

    /// Default window derived from volume statistics: two thirds of the
    /// half-span, centered on the mean. Falls back to the raw extent when
    /// the statistics carry no spread.
    pub fn from_stats(stats: &crate::stats::VolumeStats) -> Self {
        let span = (stats.max - stats.min) / 2.0;
        if span <= 0.0 {
            return Self::clamped(stats.min, stats.max, stats.min, stats.max);
        }
        let rng = span / 1.5;
        Self::clamped(stats.mean - rng, stats.mean + rng, stats.min, stats.max)
    }

    pub fn span(&self) -> f32 {
        self.max - self.min
    }
}

/// Map a sample to 8-bit intensity: `clamp((v-min)/(max-min), 0, 1) * 255`,
/// rounded to nearest. Monotonic in `value`; `min` maps to 0, `max` to 255.
#[inline]
pub fn normalize(value: f32, range: ContrastRange) -> u8 {
    let t = ((value - range.min) / (range.max - range.min)).clamp(0.0, 1.0);
    (t * 255.0).round() as u8
}

/// Bake a float slice into a contrast-windowed grayscale raster.
pub fn bake(slice: &ArrayView2<'_, f32>, range: ContrastRange) -> Option<GrayImage> {
    let (height, width) = slice.dim();
    let pixel_data: Vec<u8> = slice
        .into_par_iter()
        .map(|&v| normalize(v, range))
        .collect();
    GrayImage::from_raw(width as u32, height as u32, pixel_data)
}
