//! End-to-end scenarios exercising the public API over real MRC files.

use glam::Vec3;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use std::time::Instant;

use tomo_volume::cache::SliceKey;
use tomo_volume::contrast;
use tomo_volume::contrast::ContrastRange;
use tomo_volume::plane;
use tomo_volume::plane::PlaneFrame;
use tomo_volume::stats;
use tomo_volume::volume::Volume;
use tomo_volume::volume_loader::VolumeLoader;
use tomo_volume::Session;
use tomo_volume::SessionOptions;
use tomo_volume::SliceCache;

/// Minimal mode-2 (f32) MRC writer for fixtures.
fn write_mrc(
    path: &Path,
    dim: (usize, usize, usize),
    stats: (f32, f32, f32),
    values: impl Fn(usize, usize, usize) -> f32,
) {
    let (nz, ny, nx) = dim;
    let mut header = vec![0u8; 1024];
    header[0..4].copy_from_slice(&(nx as i32).to_le_bytes());
    header[4..8].copy_from_slice(&(ny as i32).to_le_bytes());
    header[8..12].copy_from_slice(&(nz as i32).to_le_bytes());
    header[12..16].copy_from_slice(&2i32.to_le_bytes());
    header[76..80].copy_from_slice(&stats.0.to_le_bytes());
    header[80..84].copy_from_slice(&stats.1.to_le_bytes());
    header[84..88].copy_from_slice(&stats.2.to_le_bytes());
    header[208..212].copy_from_slice(b"MAP ");

    let mut file = std::fs::File::create(path).unwrap();
    file.write_all(&header).unwrap();
    for z in 0..nz {
        for y in 0..ny {
            for x in 0..nx {
                file.write_all(&values(x, y, z).to_le_bytes()).unwrap();
            }
        }
    }
}

fn graded_dir(count: usize) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..count {
        write_mrc(
            &dir.path().join(format!("ts_{i:03}.mrc")),
            (10, 10, 10),
            (0.0, 999.0, 499.5),
            |x, y, z| (x + 10 * y + 100 * z) as f32,
        );
    }
    dir
}

#[test]
fn graded_volume_slice_matches_the_contrast_window() {
    let dir = graded_dir(1);
    let mut session = Session::open(dir.path(), SessionOptions::default()).unwrap();
    session.set_contrast(0.0, 999.0);
    let range = session.contrast();

    let img = session.render_xy().unwrap();
    // Cursor opens at the volume center, z = 5; value at (3, 4) is 543.
    let expected = contrast::normalize(3.0 + 10.0 * 4.0 + 100.0 * 5.0, range);
    assert_eq!(img.get_pixel(3, 4).0[0], expected);
}

#[test]
fn vertical_plane_maps_its_center_column_onto_the_pick_axis() {
    let frame = PlaneFrame::from_points(Vec3::ZERO, Vec3::new(0.0, 0.0, 10.0)).unwrap();
    assert_eq!(frame.tangent, Vec3::Z);
    assert_eq!(frame.height, 10);
    assert_eq!(frame.half_width, 20);

    let p = plane::plane_to_volume(20.0, 5.0, &frame);
    assert!((p - Vec3::new(0.0, 0.0, 5.0)).length() < 1e-5);
}

#[test]
fn equal_contrast_bounds_are_repaired_into_a_valid_range() {
    let range = ContrastRange::clamped(10.0, 10.0, 10.0, 10.0);
    assert!(range.max > range.min);
}

#[test]
fn lru_eviction_respects_recent_access() {
    let mut cache = SliceCache::new(2);
    let raster = |tag: u8| image::GrayImage::from_raw(1, 1, vec![tag]).unwrap();
    cache.put(SliceKey::Xy(0), raster(0)); // A
    cache.put(SliceKey::Xy(1), raster(1)); // B
    assert!(cache.get(&SliceKey::Xy(0)).is_some());
    cache.put(SliceKey::Xy(2), raster(2)); // C evicts B
    assert!(cache.contains(&SliceKey::Xy(0)));
    assert!(!cache.contains(&SliceKey::Xy(1)));
}

#[test]
fn histogram_stride_honors_the_voxel_budget() {
    assert_eq!(stats::sample_stride(5_000_000, 2_000_000), 3);
}

#[test]
fn histograms_are_reproducible_across_runs() {
    let dir = graded_dir(1);
    let opened = VolumeLoader::open(&dir.path().join("ts_000.mrc")).unwrap();
    let a = stats::sample_histogram(&opened.volume, 256, 300);
    let b = stats::sample_histogram(&opened.volume, 256, 300);
    assert_eq!(a.counts, b.counts);
    assert_eq!(a.edges, b.edges);
}

#[test]
fn trilinear_sampling_reproduces_lattice_values_through_a_session() {
    let dir = graded_dir(1);
    let session = Session::open(dir.path(), SessionOptions::default()).unwrap();
    let volume: &Volume = session.active_volume();
    for &(x, y, z) in &[(0, 0, 0), (3, 4, 5), (9, 9, 9)] {
        let p = Vec3::new(x as f32, y as f32, z as f32);
        assert_eq!(
            volume.sample_trilinear(p),
            (x + 10 * y + 100 * z) as f32
        );
    }
}

#[test]
fn browsing_a_multi_file_session_keeps_contrast_and_prefetches_neighbors() {
    let dir = graded_dir(3);
    let mut session = Session::open(dir.path(), SessionOptions::default()).unwrap();
    session.set_contrast(100.0, 900.0);

    // Scrub, let the debounce settle, then hop to the next file.
    let now = Instant::now();
    session.wheel(120, now);
    session.poll(now + Duration::from_millis(300));
    session.next_file();
    assert_eq!(session.active_index(), 1);
    assert_eq!(
        session.contrast(),
        ContrastRange {
            min: 100.0,
            max: 900.0
        }
    );
    assert!(session.render_xy().is_some());
    assert!(session.render_xz().is_some());

    // Neighbor center slices eventually land in their own caches.
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut installed = 0;
    while installed < 2 && Instant::now() < deadline {
        installed += session.poll(Instant::now()).prefetches_installed;
        std::thread::sleep(Duration::from_millis(5));
    }
    assert!(installed >= 2);
}

#[test]
fn oblique_plane_renders_through_the_session_and_round_trips_coordinates() {
    let dir = graded_dir(1);
    let mut session = Session::open(dir.path(), SessionOptions::default()).unwrap();
    session
        .build_plane(Vec3::new(1.0, 2.0, 1.0), Vec3::new(8.0, 6.0, 7.0))
        .unwrap();
    let dims = session.render_plane().unwrap().dimensions();
    let frame = *session.frame().unwrap();
    assert_eq!(dims, (40, frame.height as u32));

    for &(px, py) in &[(20.0f32, 0.0f32), (5.5, 3.25), (33.0, 8.0)] {
        let p = plane::plane_to_volume(px, py, &frame);
        let (rx, ry) = plane::volume_to_plane(p, &frame);
        assert!((rx - px).abs() < 1e-4);
        assert!((ry - py).abs() < 1e-4);
    }
}
