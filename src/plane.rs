use crate::contrast;
use crate::contrast::ContrastRange;
use crate::volume::Volume;

use glam::Vec3;
use image::GrayImage;
use rayon::prelude::*;
use thiserror::Error;

/// Lateral half-extent of the resampled patch, in pixels. The width is fixed
/// so raster dimensions do not depend on voxel size.
pub const DEFAULT_HALF_WIDTH: usize = 20;

/// Picked points closer than this define no usable tangent direction.
pub const MIN_SEPARATION: f32 = 1e-6;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlaneError {
    #[error("degenerate plane: picked points coincide")]
    DegeneratePlane,

    #[error("no active plane to translate")]
    NoActivePlane,
}

/// Orthonormal sampling frame of an oblique cutting plane.
///
/// Built from two picked points: `tangent` is the unit vector from the first
/// to the second, `lateral` and `normal` complete a right-handed basis. The
/// raster spans `2 * half_width` pixels along `lateral` and `height` pixels
/// along `tangent`, starting at `origin`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlaneFrame {
    pub origin: Vec3,
    pub tangent: Vec3,
    pub lateral: Vec3,
    pub normal: Vec3,
    pub half_width: usize,
    pub height: usize,
    /// Second defining point, kept so Z translation can rebuild the frame.
    end: Vec3,
}

impl PlaneFrame {
    pub fn from_points(p1: Vec3, p2: Vec3) -> Result<Self, PlaneError> {
        Self::from_points_with_width(p1, p2, DEFAULT_HALF_WIDTH)
    }

    pub fn from_points_with_width(
        p1: Vec3,
        p2: Vec3,
        half_width: usize,
    ) -> Result<Self, PlaneError> {
        let span = p2 - p1;
        let length = span.length();
        if length < MIN_SEPARATION {
            return Err(PlaneError::DegeneratePlane);
        }
        let tangent = span / length;

        // Provisional up axis, swapped when nearly parallel to the tangent.
        let up = if tangent.dot(Vec3::Z).abs() > 0.9 {
            Vec3::Y
        } else {
            Vec3::Z
        };

        let cross = tangent.cross(up);
        let lateral = if cross.length() < 1e-6 {
            Vec3::X
        } else {
            cross.normalize()
        };
        let normal = tangent.cross(lateral).normalize();

        Ok(Self {
            origin: p1,
            tangent,
            lateral,
            normal,
            half_width: half_width.max(1),
            height: (length.round() as usize).max(1),
            end: p2,
        })
    }

    pub fn width(&self) -> usize {
        2 * self.half_width
    }

    /// Rebuild the frame with both defining points shifted so the first one
    /// lands on `new_z`. The basis is reconstructed from scratch rather than
    /// incrementally updated, which stays correct for large jumps.
    pub fn translated_z(&self, new_z: f32) -> Result<Self, PlaneError> {
        let dz = Vec3::new(0.0, 0.0, new_z - self.origin.z);
        Self::from_points_with_width(self.origin + dz, self.end + dz, self.half_width)
    }
}

/// Map a volume-space point into plane-local raster coordinates.
pub fn volume_to_plane(p: Vec3, frame: &PlaneFrame) -> (f32, f32) {
    let d = p - frame.origin;
    (
        d.dot(frame.lateral) + frame.half_width as f32,
        d.dot(frame.tangent),
    )
}

/// Map plane-local raster coordinates back into volume space. Exact inverse
/// of [`volume_to_plane`] for points on the plane, up to f32 rounding.
pub fn plane_to_volume(px: f32, py: f32, frame: &PlaneFrame) -> Vec3 {
    frame.origin + (px - frame.half_width as f32) * frame.lateral + py * frame.tangent
}

/// Trilinearly resample the plane's rectangular patch into a
/// contrast-windowed raster of `frame.height` x `frame.width()` pixels.
pub fn resample(volume: &Volume, frame: &PlaneFrame, range: ContrastRange) -> Option<GrayImage> {
    let width = frame.width();
    let half_width = frame.half_width as f32;

    let pixel_data: Vec<u8> = (0..frame.height)
        .into_par_iter()
        .flat_map(|j| {
            let row_base = frame.origin + j as f32 * frame.tangent;
            (0..width)
                .map(|i| {
                    let p = row_base + (i as f32 - half_width) * frame.lateral;
                    contrast::normalize(volume.sample_trilinear(p), range)
                })
                .collect::<Vec<u8>>()
        })
        .collect();

    GrayImage::from_raw(width as u32, frame.height as u32, pixel_data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::graded_volume;

    fn assert_close(a: Vec3, b: Vec3, tol: f32) {
        assert!((a - b).length() < tol, "{a:?} != {b:?}");
    }

    #[test]
    fn vertical_pick_builds_the_expected_frame() {
        let frame = PlaneFrame::from_points(Vec3::ZERO, Vec3::new(0.0, 0.0, 10.0)).unwrap();
        assert_close(frame.tangent, Vec3::Z, 1e-6);
        assert_eq!(frame.height, 10);
        assert_eq!(frame.half_width, 20);
        // Plane-local center column at py=5 maps straight down the pick axis.
        let p = plane_to_volume(20.0, 5.0, &frame);
        assert_close(p, Vec3::new(0.0, 0.0, 5.0), 1e-5);
    }

    #[test]
    fn basis_is_right_handed_and_orthonormal() {
        let frame =
            PlaneFrame::from_points(Vec3::new(1.0, 2.0, 3.0), Vec3::new(7.0, 5.0, 4.0)).unwrap();
        assert!((frame.tangent.length() - 1.0).abs() < 1e-6);
        assert!((frame.lateral.length() - 1.0).abs() < 1e-6);
        assert!((frame.normal.length() - 1.0).abs() < 1e-6);
        assert!(frame.tangent.dot(frame.lateral).abs() < 1e-6);
        assert!(frame.tangent.dot(frame.normal).abs() < 1e-6);
        assert!(frame.lateral.dot(frame.normal).abs() < 1e-6);
        assert_close(frame.tangent.cross(frame.lateral), frame.normal, 1e-5);
    }

    #[test]
    fn degenerate_points_are_rejected() {
        let p = Vec3::new(3.0, 3.0, 3.0);
        assert_eq!(
            PlaneFrame::from_points(p, p + Vec3::splat(1e-8)),
            Err(PlaneError::DegeneratePlane)
        );
    }

    #[test]
    fn coordinate_mapping_round_trips() {
        let frame =
            PlaneFrame::from_points(Vec3::new(2.0, 1.0, 0.5), Vec3::new(8.0, 9.0, 6.0)).unwrap();
        for &(px, py) in &[(0.0f32, 0.0f32), (20.0, 5.0), (37.5, 2.25), (3.0, 9.9)] {
            let p = plane_to_volume(px, py, &frame);
            let (rx, ry) = volume_to_plane(p, &frame);
            assert!((rx - px).abs() < 1e-4);
            assert!((ry - py).abs() < 1e-4);
            assert_close(plane_to_volume(rx, ry, &frame), p, 1e-4);
        }
    }

    #[test]
    fn translation_rebuilds_at_the_new_depth() {
        let frame =
            PlaneFrame::from_points(Vec3::new(1.0, 1.0, 2.0), Vec3::new(5.0, 4.0, 2.0)).unwrap();
        let moved = frame.translated_z(7.0).unwrap();
        assert_eq!(moved.origin.z, 7.0);
        assert_eq!(moved.height, frame.height);
        assert_close(moved.tangent, frame.tangent, 1e-6);
    }

    #[test]
    fn resample_dimensions_match_the_frame() {
        let vol = graded_volume();
        let frame = PlaneFrame::from_points(Vec3::ZERO, Vec3::new(0.0, 0.0, 8.0)).unwrap();
        let range = ContrastRange { min: 0.0, max: 999.0 };
        let img = resample(&vol, &frame, range).unwrap();
        assert_eq!(img.dimensions(), (40, 8));
    }

    #[test]
    fn resample_center_column_tracks_the_pick_axis() {
        let vol = graded_volume();
        let frame =
            PlaneFrame::from_points(Vec3::new(4.0, 4.0, 0.0), Vec3::new(4.0, 4.0, 8.0)).unwrap();
        let range = ContrastRange { min: 0.0, max: 999.0 };
        let img = resample(&vol, &frame, range).unwrap();
        for j in 0..8u32 {
            let expected = contrast::normalize(vol.sample(4, 4, j as isize), range);
            assert_eq!(img.get_pixel(frame.half_width as u32, j).0[0], expected);
        }
    }
}
