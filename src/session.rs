use crate::accel::ScrollAccelerator;
use crate::cache;
use crate::cache::SliceCache;
use crate::cache::SliceKey;
use crate::contrast;
use crate::contrast::ContrastRange;
use crate::debounce::Debouncer;
use crate::plane;
use crate::plane::PlaneError;
use crate::plane::PlaneFrame;
use crate::prefetch::FileMetadata;
use crate::prefetch::MetadataPrefetcher;
use crate::prefetch::PrefetchError;
use crate::stats;
use crate::stats::Histogram;
use crate::stats::VolumeStats;
use crate::volume::Volume;
use crate::volume_loader::VolumeLoader;
use crate::volume_loader::VolumeLoaderError;

use glam::Vec3;
use image::GrayImage;
use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no MRC files found at {0}")]
    NoVolumes(PathBuf),

    #[error(transparent)]
    Loader(#[from] VolumeLoaderError),

    #[error(transparent)]
    Prefetch(#[from] PrefetchError),
}

/// Tuning knobs for an interactive session.
#[derive(Clone, Copy, Debug)]
pub struct SessionOptions {
    pub cache_capacity: usize,
    pub histogram_bins: usize,
    pub max_sample_voxels: usize,
    pub prefetch_workers: usize,
    /// Quiet period coalescing wheel bursts into one primary render.
    pub scroll_debounce: Duration,
    /// Longer deferral for the orthogonal (XZ) view during scrubbing.
    pub orthogonal_debounce: Duration,
    pub plane_half_width: usize,
    pub scroll_base: i32,
    pub scroll_threshold: Duration,
    pub scroll_mult: f32,
    pub scroll_max_streak: u32,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            cache_capacity: cache::DEFAULT_CAPACITY,
            histogram_bins: stats::DEFAULT_BINS,
            max_sample_voxels: stats::DEFAULT_MAX_VOXELS,
            prefetch_workers: 2,
            scroll_debounce: Duration::from_millis(10),
            orthogonal_debounce: Duration::from_millis(250),
            plane_half_width: plane::DEFAULT_HALF_WIDTH,
            scroll_base: 4,
            scroll_threshold: Duration::from_secs(2),
            scroll_mult: 0.01,
            scroll_max_streak: 4,
        }
    }
}

/// What a [`poll`](Session::poll) call decided, so the embedding layer knows
/// which views to repaint.
#[derive(Clone, Copy, Debug, Default)]
pub struct PollOutcome {
    pub primary_rendered: bool,
    pub orthogonal_rendered: bool,
    pub prefetches_installed: usize,
}

/// One interactive viewing session over a directory of tomograms.
///
/// The session owns all mutable viewing state: the file ring, per-volume
/// slice caches, the persistent contrast range and the active oblique plane.
/// All mutation happens on the thread calling these methods; background
/// workers only compute.
pub struct Session {
    files: Vec<PathBuf>,
    volumes: Vec<Arc<Volume>>,
    caches: HashMap<usize, SliceCache>,
    active: usize,
    /// Cursor in volume coordinates, (x, y, z).
    cursor: (usize, usize, usize),
    /// Persisted across file switches.
    contrast: ContrastRange,
    /// Sample extent of the active file, bounds for contrast clamping.
    extent: (f32, f32),
    frame: Option<PlaneFrame>,
    frame_version: u64,
    prefetcher: MetadataPrefetcher,
    scroll_debounce: Debouncer,
    xz_debounce: Debouncer,
    accel: ScrollAccelerator,
    opts: SessionOptions,
}

impl Session {
    /// Open a session over `path` (an MRC file or a directory of them).
    ///
    /// Every sibling file is memory-mapped up front. Metadata for the active
    /// file is computed synchronously; the rest is handed to the worker pool.
    ///
    /// # Errors
    ///
    /// Fails when no MRC files are found, a file cannot be opened, or the
    /// worker pool cannot be built.
    pub fn open(path: impl AsRef<Path>, opts: SessionOptions) -> Result<Self, SessionError> {
        let path = path.as_ref();
        let files = VolumeLoader::list_mrcs(path);
        if files.is_empty() {
            return Err(SessionError::NoVolumes(path.to_path_buf()));
        }
        let active = files.iter().position(|f| f == path).unwrap_or(0);

        let mut volumes = Vec::with_capacity(files.len());
        let mut hints = Vec::with_capacity(files.len());
        for file in &files {
            let opened = VolumeLoader::open(file)?;
            volumes.push(Arc::new(opened.volume));
            hints.push(opened.header_stats);
        }

        let prefetcher = MetadataPrefetcher::new(
            opts.prefetch_workers,
            opts.histogram_bins,
            opts.max_sample_voxels,
        )?;
        let metadata = prefetcher.compute_now(active, &volumes[active], hints[active]);
        for (file, volume) in volumes.iter().enumerate() {
            if file != active {
                prefetcher.submit_metadata(file, Arc::clone(volume), hints[file]);
            }
        }

        let extent = metadata.histogram.extent();
        let default = ContrastRange::from_stats(&metadata.stats);
        let contrast = ContrastRange::clamped(default.min, default.max, extent.0, extent.1);

        let (nz, ny, nx) = volumes[active].dim();
        let mut session = Self {
            files,
            volumes,
            caches: HashMap::new(),
            active,
            cursor: (nx / 2, ny / 2, nz / 2),
            contrast,
            extent,
            frame: None,
            frame_version: 0,
            prefetcher,
            scroll_debounce: Debouncer::new(opts.scroll_debounce),
            xz_debounce: Debouncer::new(opts.orthogonal_debounce),
            accel: ScrollAccelerator::new(
                opts.scroll_base,
                opts.scroll_threshold,
                opts.scroll_mult,
                opts.scroll_max_streak,
            ),
            opts,
        };
        session.prefetch_neighbors();
        Ok(session)
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn active_volume(&self) -> &Volume {
        &self.volumes[self.active]
    }

    pub fn cursor(&self) -> (usize, usize, usize) {
        self.cursor
    }

    pub fn contrast(&self) -> ContrastRange {
        self.contrast
    }

    pub fn frame(&self) -> Option<&PlaneFrame> {
        self.frame.as_ref()
    }

    /// Stats and histogram of the active file, joining the background
    /// computation if it has not finished yet.
    pub fn metadata(&self) -> FileMetadata {
        self.prefetcher.ensure_metadata(self.active)
    }

    pub fn stats(&self) -> VolumeStats {
        self.metadata().stats
    }

    pub fn histogram(&self) -> Histogram {
        self.metadata().histogram
    }

    /// Apply a contrast adjustment, clamped into the active file's sample
    /// extent. Every cache is invalidated because rasters bake contrast in.
    pub fn set_contrast(&mut self, min: f32, max: f32) {
        self.contrast = ContrastRange::clamped(min, max, self.extent.0, self.extent.1);
        for cache in self.caches.values_mut() {
            cache.clear();
        }
    }

    /// Move the cursor, clamped into the volume. Defers the orthogonal view.
    pub fn set_cursor(&mut self, x: usize, y: usize, z: usize, now: Instant) {
        let (nz, ny, nx) = self.volumes[self.active].dim();
        self.cursor = (x.min(nx - 1), y.min(ny - 1), z.min(nz - 1));
        self.xz_debounce.trigger(now);
    }

    /// Step the Z cursor and re-arm both debounce deadlines.
    pub fn step_z(&mut self, step: i32, now: Instant) {
        let (nz, _, _) = self.volumes[self.active].dim();
        let z = (self.cursor.2 as i64 + step as i64).clamp(0, nz as i64 - 1);
        self.cursor.2 = z as usize;
        self.scroll_debounce.trigger(now);
        self.xz_debounce.trigger(now);
    }

    /// Feed a raw wheel delta through the accelerator and step accordingly.
    /// Returns the applied step.
    pub fn wheel(&mut self, delta_y: i32, now: Instant) -> i32 {
        let step = self.accel.step(delta_y, now);
        if step != 0 {
            self.step_z(step, now);
        }
        step
    }

    /// Drive deferred work: install finished prefetches, then fire whichever
    /// debounce deadlines are due, warming the corresponding caches.
    pub fn poll(&mut self, now: Instant) -> PollOutcome {
        let prefetches_installed = self.install_prefetched();
        let primary_rendered = self.scroll_debounce.fire(now);
        if primary_rendered {
            let _ = self.render_xy();
            self.prefetch_neighbors();
        }
        let orthogonal_rendered = self.xz_debounce.fire(now);
        if orthogonal_rendered {
            let _ = self.render_xz();
        }
        PollOutcome {
            primary_rendered,
            orthogonal_rendered,
            prefetches_installed,
        }
    }

    /// XY slice at the cursor depth, cached.
    pub fn render_xy(&mut self) -> Option<&GrayImage> {
        self.render_axis(SliceKey::Xy(self.cursor.2))
    }

    /// XZ slice at the cursor row, cached.
    pub fn render_xz(&mut self) -> Option<&GrayImage> {
        self.render_axis(SliceKey::Xz(self.cursor.1))
    }

    fn render_axis(&mut self, key: SliceKey) -> Option<&GrayImage> {
        let active = self.active;
        if !self.caches.get(&active).is_some_and(|c| c.contains(&key)) {
            let slice = match key {
                SliceKey::Xy(z) => self.volumes[active].read_xy(z)?,
                SliceKey::Xz(y) => self.volumes[active].read_xz(y)?,
                SliceKey::Plane(_) => return None,
            };
            let raster = contrast::bake(&slice.view(), self.contrast)?;
            self.cache_mut(active).put(key, raster);
        }
        self.caches.get_mut(&active)?.get(&key)
    }

    /// Define an oblique plane from two picked points. A degenerate pick is
    /// reported and leaves any prior plane untouched.
    pub fn build_plane(&mut self, p1: Vec3, p2: Vec3) -> Result<(), PlaneError> {
        let frame = PlaneFrame::from_points_with_width(p1, p2, self.opts.plane_half_width)?;
        self.frame = Some(frame);
        self.frame_version += 1;
        Ok(())
    }

    /// Translate the active plane so its origin sits at `new_z`, then mark
    /// it for re-resampling.
    pub fn translate_plane_z(&mut self, new_z: f32) -> Result<(), PlaneError> {
        let frame = self.frame.ok_or(PlaneError::NoActivePlane)?;
        self.frame = Some(frame.translated_z(new_z)?);
        self.frame_version += 1;
        Ok(())
    }

    pub fn clear_plane(&mut self) {
        self.frame = None;
    }

    /// Resample the active oblique plane, cached under its frame version.
    pub fn render_plane(&mut self) -> Option<&GrayImage> {
        let frame = self.frame?;
        let key = SliceKey::Plane(self.frame_version);
        let active = self.active;
        if !self.caches.get(&active).is_some_and(|c| c.contains(&key)) {
            let raster = plane::resample(&self.volumes[active], &frame, self.contrast)?;
            self.cache_mut(active).put(key, raster);
        }
        self.caches.get_mut(&active)?.get(&key)
    }

    /// Map view-local coordinates into volume space: through the active
    /// plane frame when one exists, otherwise the identity on (x, y) with
    /// the cursor depth.
    pub fn view_to_volume(&self, px: f32, py: f32) -> Vec3 {
        match &self.frame {
            Some(frame) => plane::plane_to_volume(px, py, frame),
            None => Vec3::new(px, py, self.cursor.2 as f32),
        }
    }

    pub fn volume_to_view(&self, p: Vec3) -> (f32, f32) {
        match &self.frame {
            Some(frame) => plane::volume_to_plane(p, frame),
            None => (p.x, p.y),
        }
    }

    /// Switch the active file. Joins its metadata computation if still in
    /// flight, recenters the cursor, drops caches outside the ±1 window and
    /// keeps the contrast range as-is.
    pub fn set_active(&mut self, idx: usize) {
        if idx >= self.volumes.len() || idx == self.active {
            return;
        }
        self.active = idx;
        self.scroll_debounce.cancel();
        self.xz_debounce.cancel();
        self.frame = None;

        let (nz, ny, nx) = self.volumes[idx].dim();
        self.cursor = (nx / 2, ny / 2, nz / 2);
        self.caches.retain(|&file, _| file.abs_diff(idx) <= 1);

        let metadata = self.prefetcher.ensure_metadata(idx);
        self.extent = metadata.histogram.extent();
        self.prefetch_neighbors();
    }

    pub fn next_file(&mut self) {
        if self.active + 1 < self.volumes.len() {
            self.set_active(self.active + 1);
        }
    }

    pub fn prev_file(&mut self) {
        if let Some(idx) = self.active.checked_sub(1) {
            self.set_active(idx);
        }
    }

    fn cache_mut(&mut self, file: usize) -> &mut SliceCache {
        let capacity = self.opts.cache_capacity;
        self.caches
            .entry(file)
            .or_insert_with(|| SliceCache::new(capacity))
    }

    /// Queue center-slice prefetches for the immediate neighbor files, with
    /// the current contrast snapshotted at submission.
    fn prefetch_neighbors(&mut self) {
        let active = self.active;
        for file in [active.checked_sub(1), Some(active + 1)]
            .into_iter()
            .flatten()
        {
            if file < self.volumes.len() {
                self.prefetcher
                    .submit_center_slices(file, Arc::clone(&self.volumes[file]), self.contrast);
            }
        }
    }

    /// Drain finished prefetches into their volumes' caches. Results for
    /// files outside the ±1 window are dropped, and a raster the interactive
    /// thread already rendered is never clobbered by a possibly stale one.
    fn install_prefetched(&mut self) -> usize {
        let active = self.active;
        let mut installed = 0;
        for slice in self.prefetcher.drain_slices() {
            if slice.file.abs_diff(active) <= 1 {
                let cache = self.cache_mut(slice.file);
                if !cache.contains(&slice.key) {
                    cache.put(slice.key, slice.raster);
                    installed += 1;
                }
            }
        }
        installed
    }

    #[cfg(test)]
    pub(crate) fn cached_files(&self) -> Vec<usize> {
        let mut files: Vec<usize> = self.caches.keys().copied().collect();
        files.sort_unstable();
        files
    }

    #[cfg(test)]
    pub(crate) fn cache_contains(&self, file: usize, key: &SliceKey) -> bool {
        self.caches.get(&file).is_some_and(|c| c.contains(key))
    }
}
