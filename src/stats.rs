use crate::volume::Volume;
use crate::volume_loader::HeaderStats;
use log::debug;

pub const DEFAULT_BINS: usize = 256;
pub const DEFAULT_MAX_VOXELS: usize = 2_000_000;

/// Summary statistics used to seed the default contrast window.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VolumeStats {
    pub min: f32,
    pub max: f32,
    pub mean: f32,
}

/// Fixed-bin intensity histogram over a bounded subsample of the volume.
#[derive(Clone, Debug)]
pub struct Histogram {
    pub counts: Vec<u64>,
    /// `counts.len() + 1` strictly increasing bin boundaries.
    pub edges: Vec<f32>,
}

impl Histogram {
    /// Observed sample extent, `(edges[0], edges[last])`.
    pub fn extent(&self) -> (f32, f32) {
        (self.edges[0], self.edges[self.edges.len() - 1])
    }
}

/// Stride over the flattened volume that keeps the visited voxel count at or
/// below `max_voxels`. Deterministic, so repeated runs sample identically.
pub fn sample_stride(total: usize, max_voxels: usize) -> usize {
    if total <= max_voxels {
        1
    } else {
        total.div_ceil(max_voxels)
    }
}

/// Equal-width histogram over a strided subsample of the volume.
///
/// Volumes at or under `max_voxels` are consumed in full; larger volumes are
/// visited at stride `ceil(total / max_voxels)` in flat Z-major order.
pub fn sample_histogram(volume: &Volume, bins: usize, max_voxels: usize) -> Histogram {
    let total = volume.total_voxels();
    let stride = sample_stride(total, max_voxels);

    let mut lo = f32::INFINITY;
    let mut hi = f32::NEG_INFINITY;
    let mut values = Vec::with_capacity(total.div_ceil(stride));
    let mut i = 0;
    while i < total {
        let v = volume.voxel_flat(i);
        lo = lo.min(v);
        hi = hi.max(v);
        values.push(v);
        i += stride;
    }

    // Constant volumes get a unit-wide bin range, matching numpy's histogram.
    if !(hi > lo) {
        lo -= 0.5;
        hi += 0.5;
    }

    let width = (hi - lo) / bins as f32;
    let mut counts = vec![0u64; bins];
    for &v in &values {
        let bin = (((v - lo) / width) as usize).min(bins - 1);
        counts[bin] += 1;
    }

    let edges = (0..=bins)
        .map(|k| lo + width * k as f32)
        .collect();

    Histogram { counts, edges }
}

/// Two-tier stats policy: trust an embedded header hint when it is present,
/// finite and spans a positive range; otherwise fall back to the same
/// bounded strided subsample as the histogram.
pub fn estimate_stats(
    volume: &Volume,
    hint: Option<HeaderStats>,
    max_voxels: usize,
) -> VolumeStats {
    if let Some(h) = hint {
        if h.min.is_finite() && h.max.is_finite() && h.max > h.min {
            let mean = if h.mean.is_finite() {
                h.mean
            } else {
                0.5 * (h.min + h.max)
            };
            return VolumeStats {
                min: h.min,
                max: h.max,
                mean,
            };
        }
        debug!("header stats invalid, falling back to subsampled estimate");
    }

    let total = volume.total_voxels();
    let stride = sample_stride(total, max_voxels);
    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    let mut sum = 0.0f64;
    let mut count = 0u64;
    let mut i = 0;
    while i < total {
        let v = volume.voxel_flat(i);
        min = min.min(v);
        max = max.max(v);
        sum += v as f64;
        count += 1;
        i += stride;
    }

    VolumeStats {
        min,
        max,
        mean: (sum / count.max(1) as f64) as f32,
    }
}
