use glam::Vec3;
use memmap2::Mmap;
use ndarray::Array2;
use ndarray::Array3;

/// Scalar element encodings supported by the MRC container.
///
/// Every mode is normalized to `f32` on read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoxelMode {
    I8,
    I16,
    F32,
    U16,
}

impl VoxelMode {
    pub fn byte_len(self) -> usize {
        match self {
            VoxelMode::I8 => 1,
            VoxelMode::I16 | VoxelMode::U16 => 2,
            VoxelMode::F32 => 4,
        }
    }
}

enum VoxelData {
    /// Memory-mapped file contents; voxels start at `offset` bytes.
    Mapped {
        map: Mmap,
        offset: usize,
        mode: VoxelMode,
    },
    /// Owned array, used for synthetic volumes and tests.
    Owned(Array3<f32>),
}

/// Read-only view over a 3D scalar array in (Z, Y, X) order.
///
/// Gigabyte-scale volumes stay on disk behind a memory map; voxels are
/// decoded to `f32` on access. All sampling entry points clamp their
/// coordinates into the volume, so geometry produced by the oblique
/// resampler may safely fall slightly outside the bounds.
pub struct Volume {
    data: VoxelData,
    dim: (usize, usize, usize),
}

impl Volume {
    pub(crate) fn from_mapped(
        map: Mmap,
        offset: usize,
        mode: VoxelMode,
        dim: (usize, usize, usize),
    ) -> Self {
        Self {
            data: VoxelData::Mapped { map, offset, mode },
            dim,
        }
    }

    pub fn from_array(data: Array3<f32>) -> Self {
        let dim = data.dim();
        Self {
            data: VoxelData::Owned(data),
            dim,
        }
    }

    /// Dimensions as (depth, height, width), i.e. (Z, Y, X).
    pub fn dim(&self) -> (usize, usize, usize) {
        self.dim
    }

    pub fn total_voxels(&self) -> usize {
        self.dim.0 * self.dim.1 * self.dim.2
    }

    /// Voxel at a flat index into Z-major order. In-bounds indices only.
    #[inline]
    pub(crate) fn voxel_flat(&self, i: usize) -> f32 {
        match &self.data {
            VoxelData::Mapped { map, offset, mode } => {
                let o = offset + i * mode.byte_len();
                match mode {
                    VoxelMode::I8 => map[o] as i8 as f32,
                    VoxelMode::I16 => {
                        bytemuck::pod_read_unaligned::<i16>(&map[o..o + 2]) as f32
                    }
                    VoxelMode::U16 => {
                        bytemuck::pod_read_unaligned::<u16>(&map[o..o + 2]) as f32
                    }
                    VoxelMode::F32 => bytemuck::pod_read_unaligned::<f32>(&map[o..o + 4]),
                }
            }
            VoxelData::Owned(arr) => {
                let (_, ny, nx) = self.dim;
                let z = i / (ny * nx);
                let rem = i % (ny * nx);
                arr[[z, rem / nx, rem % nx]]
            }
        }
    }

    #[inline]
    fn voxel(&self, x: usize, y: usize, z: usize) -> f32 {
        match &self.data {
            VoxelData::Owned(arr) => arr[[z, y, x]],
            VoxelData::Mapped { .. } => {
                let (_, ny, nx) = self.dim;
                self.voxel_flat((z * ny + y) * nx + x)
            }
        }
    }

    /// Voxel lookup with each coordinate clamped into `[0, dim-1]`.
    pub fn sample(&self, x: isize, y: isize, z: isize) -> f32 {
        let (nz, ny, nx) = self.dim;
        let x = x.clamp(0, nx as isize - 1) as usize;
        let y = y.clamp(0, ny as isize - 1) as usize;
        let z = z.clamp(0, nz as isize - 1) as usize;
        self.voxel(x, y, z)
    }

    /// Trilinear interpolation at a fractional coordinate, clamped per axis.
    ///
    /// Exact at integer lattice points. Runs once per output pixel of the
    /// oblique resampler, so it performs no heap allocation.
    #[inline]
    pub fn sample_trilinear(&self, p: Vec3) -> f32 {
        let (nz, ny, nx) = self.dim;
        let x = p.x.clamp(0.0, (nx - 1) as f32);
        let y = p.y.clamp(0.0, (ny - 1) as f32);
        let z = p.z.clamp(0.0, (nz - 1) as f32);

        let x0 = x.floor() as usize;
        let y0 = y.floor() as usize;
        let z0 = z.floor() as usize;
        let x1 = (x0 + 1).min(nx - 1);
        let y1 = (y0 + 1).min(ny - 1);
        let z1 = (z0 + 1).min(nz - 1);

        let xd = x - x0 as f32;
        let yd = y - y0 as f32;
        let zd = z - z0 as f32;

        let c000 = self.voxel(x0, y0, z0);
        let c100 = self.voxel(x1, y0, z0);
        let c010 = self.voxel(x0, y1, z0);
        let c110 = self.voxel(x1, y1, z0);
        let c001 = self.voxel(x0, y0, z1);
        let c101 = self.voxel(x1, y0, z1);
        let c011 = self.voxel(x0, y1, z1);
        let c111 = self.voxel(x1, y1, z1);

        // Blend along x, then y, then z.
        let one_minus_xd = 1.0 - xd;
        let c00 = c000.mul_add(one_minus_xd, c100 * xd);
        let c01 = c001.mul_add(one_minus_xd, c101 * xd);
        let c10 = c010.mul_add(one_minus_xd, c110 * xd);
        let c11 = c011.mul_add(one_minus_xd, c111 * xd);

        let one_minus_yd = 1.0 - yd;
        let c0 = c00.mul_add(one_minus_yd, c10 * yd);
        let c1 = c01.mul_add(one_minus_yd, c11 * yd);

        c0.mul_add(1.0 - zd, c1 * zd)
    }

    /// XY cross-section at depth `z`, shape (Y, X).
    pub fn read_xy(&self, z: usize) -> Option<Array2<f32>> {
        let (nz, ny, nx) = self.dim;
        if z >= nz {
            return None;
        }
        match &self.data {
            VoxelData::Owned(arr) => Some(arr.index_axis(ndarray::Axis(0), z).to_owned()),
            VoxelData::Mapped { .. } => {
                let base = z * ny * nx;
                let values: Vec<f32> = (0..ny * nx).map(|i| self.voxel_flat(base + i)).collect();
                Array2::from_shape_vec((ny, nx), values).ok()
            }
        }
    }

    /// XZ cross-section at row `y`, shape (Z, X). Logically a transpose of
    /// the storage order, so rows are gathered with a stride of Y*X voxels.
    pub fn read_xz(&self, y: usize) -> Option<Array2<f32>> {
        let (nz, ny, nx) = self.dim;
        if y >= ny {
            return None;
        }
        match &self.data {
            VoxelData::Owned(arr) => Some(arr.index_axis(ndarray::Axis(1), y).to_owned()),
            VoxelData::Mapped { .. } => {
                let mut values = Vec::with_capacity(nz * nx);
                for z in 0..nz {
                    let base = (z * ny + y) * nx;
                    values.extend((0..nx).map(|x| self.voxel_flat(base + x)));
                }
                Array2::from_shape_vec((nz, nx), values).ok()
            }
        }
    }
}

/// 10x10x10 volume with value = x + 10y + 100z, shared across test modules.
#[cfg(test)]
pub(crate) fn graded_volume() -> Volume {
    let arr =
        Array3::from_shape_fn((10, 10, 10), |(z, y, x)| (x + 10 * y + 100 * z) as f32);
    Volume::from_array(arr)
}
