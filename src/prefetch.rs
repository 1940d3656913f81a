use crate::cache::SliceKey;
use crate::contrast;
use crate::contrast::ContrastRange;
use crate::stats;
use crate::stats::Histogram;
use crate::stats::VolumeStats;
use crate::volume::Volume;
use crate::volume_loader::HeaderStats;

use image::GrayImage;
use log::warn;
use parking_lot::Condvar;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::sync::mpsc::Sender;
use std::sync::mpsc::channel;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PrefetchError {
    #[error("failed to build prefetch worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Stats and histogram for one file of the session, computed once.
#[derive(Clone)]
pub struct FileMetadata {
    pub stats: VolumeStats,
    pub histogram: Histogram,
}

/// A neighbor-file raster produced off the interactive thread. The session
/// installs it into the owning volume's cache, or drops it when the file has
/// left the ±1 window.
pub struct PrefetchedSlice {
    pub file: usize,
    pub key: SliceKey,
    pub raster: GrayImage,
}

struct MetadataMap {
    entries: Mutex<HashMap<usize, FileMetadata>>,
    ready: Condvar,
}

/// Background scheduler for metadata computation and neighbor-slice
/// prefetching.
///
/// Workers only compute; they publish metadata through one small critical
/// section and rasters through an mpsc channel that the interactive thread
/// drains. Cache and contrast mutation stays on the interactive thread.
pub struct MetadataPrefetcher {
    pool: rayon::ThreadPool,
    shared: Arc<MetadataMap>,
    slice_tx: Sender<PrefetchedSlice>,
    slice_rx: Receiver<PrefetchedSlice>,
    bins: usize,
    max_voxels: usize,
}

impl MetadataPrefetcher {
    pub fn new(workers: usize, bins: usize, max_voxels: usize) -> Result<Self, PrefetchError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|i| format!("tomo-prefetch-{i}"))
            .build()?;
        let (slice_tx, slice_rx) = channel();
        Ok(Self {
            pool,
            shared: Arc::new(MetadataMap {
                entries: Mutex::new(HashMap::new()),
                ready: Condvar::new(),
            }),
            slice_tx,
            slice_rx,
            bins,
            max_voxels,
        })
    }

    /// Insert metadata into the shared map and wake every blocked join.
    fn publish(&self, file: usize, metadata: FileMetadata) {
        let mut entries = self.shared.entries.lock();
        entries.insert(file, metadata);
        drop(entries);
        self.shared.ready.notify_all();
    }

    fn compute(volume: &Volume, hint: HeaderStats, bins: usize, max_voxels: usize) -> FileMetadata {
        FileMetadata {
            stats: stats::estimate_stats(volume, Some(hint), max_voxels),
            histogram: stats::sample_histogram(volume, bins, max_voxels),
        }
    }

    /// Compute metadata on the calling thread and publish it immediately.
    /// Used for the active file at session open.
    pub fn compute_now(&self, file: usize, volume: &Volume, hint: HeaderStats) -> FileMetadata {
        let metadata = Self::compute(volume, hint, self.bins, self.max_voxels);
        self.publish(file, metadata.clone());
        metadata
    }

    /// Queue metadata computation for a non-active file.
    pub fn submit_metadata(&self, file: usize, volume: Arc<Volume>, hint: HeaderStats) {
        let shared = Arc::clone(&self.shared);
        let bins = self.bins;
        let max_voxels = self.max_voxels;
        self.pool.spawn(move || {
            let metadata = Self::compute(&volume, hint, bins, max_voxels);
            let mut entries = shared.entries.lock();
            entries.insert(file, metadata);
            drop(entries);
            shared.ready.notify_all();
        });
    }

    /// Metadata for `file`, blocking until a submitted computation finishes.
    ///
    /// Every file must have gone through [`compute_now`] or
    /// [`submit_metadata`] first; the session submits all files at open.
    ///
    /// [`compute_now`]: Self::compute_now
    /// [`submit_metadata`]: Self::submit_metadata
    pub fn ensure_metadata(&self, file: usize) -> FileMetadata {
        let mut entries = self.shared.entries.lock();
        loop {
            if let Some(metadata) = entries.get(&file) {
                return metadata.clone();
            }
            self.shared.ready.wait(&mut entries);
        }
    }

    pub fn metadata_if_ready(&self, file: usize) -> Option<FileMetadata> {
        self.shared.entries.lock().get(&file).cloned()
    }

    /// Queue the two center slices (one XY, one XZ) of a neighbor file,
    /// baked with the contrast range snapshotted at submission. A stale
    /// snapshot is fine; real navigation overwrites the raster.
    pub fn submit_center_slices(&self, file: usize, volume: Arc<Volume>, range: ContrastRange) {
        let tx = self.slice_tx.clone();
        self.pool.spawn(move || {
            let (nz, ny, _) = volume.dim();
            let jobs = [
                (SliceKey::Xy(nz / 2), volume.read_xy(nz / 2)),
                (SliceKey::Xz(ny / 2), volume.read_xz(ny / 2)),
            ];
            for (key, slice) in jobs {
                let raster = slice.and_then(|s| contrast::bake(&s.view(), range));
                match raster {
                    Some(raster) => {
                        // Receiver gone means the session is shutting down.
                        let _ = tx.send(PrefetchedSlice { file, key, raster });
                    }
                    None => warn!("neighbor slice prefetch failed for file {file} ({key:?})"),
                }
            }
        });
    }

    /// Non-blocking drain of finished slice prefetches.
    pub fn drain_slices(&self) -> Vec<PrefetchedSlice> {
        self.slice_rx.try_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::graded_volume;
    use std::time::Duration;
    use std::time::Instant;

    fn invalid_hint() -> HeaderStats {
        HeaderStats {
            min: 0.0,
            max: -1.0,
            mean: f32::NAN,
        }
    }

    #[test]
    fn compute_now_publishes_immediately() {
        let prefetcher = MetadataPrefetcher::new(1, 256, 2_000_000).unwrap();
        let vol = graded_volume();
        let metadata = prefetcher.compute_now(0, &vol, invalid_hint());
        assert_eq!(metadata.stats.max, 999.0);
        assert!(prefetcher.metadata_if_ready(0).is_some());
        // The join path must see the published entry without blocking.
        let joined = prefetcher.ensure_metadata(0);
        assert_eq!(joined.stats.max, 999.0);
        assert_eq!(joined.histogram.counts.iter().sum::<u64>(), 1000);
    }

    #[test]
    fn ensure_metadata_joins_a_background_computation() {
        let prefetcher = MetadataPrefetcher::new(2, 256, 2_000_000).unwrap();
        let vol = Arc::new(graded_volume());
        prefetcher.submit_metadata(3, Arc::clone(&vol), invalid_hint());
        let metadata = prefetcher.ensure_metadata(3);
        assert_eq!(metadata.stats.min, 0.0);
        assert_eq!(metadata.histogram.counts.iter().sum::<u64>(), 1000);
    }

    #[test]
    fn center_slices_arrive_over_the_channel() {
        let prefetcher = MetadataPrefetcher::new(1, 256, 2_000_000).unwrap();
        let vol = Arc::new(graded_volume());
        let range = ContrastRange {
            min: 0.0,
            max: 999.0,
        };
        prefetcher.submit_center_slices(1, Arc::clone(&vol), range);

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut slices = Vec::new();
        while slices.len() < 2 && Instant::now() < deadline {
            slices.extend(prefetcher.drain_slices());
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(slices.len(), 2);
        assert!(slices.iter().all(|s| s.file == 1));
        assert!(slices.iter().any(|s| s.key == SliceKey::Xy(5)));
        assert!(slices.iter().any(|s| s.key == SliceKey::Xz(5)));
    }
}
