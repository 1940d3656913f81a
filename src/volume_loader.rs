use crate::volume::Volume;
use crate::volume::VoxelMode;

use memmap2::Mmap;
use std::fs;
use std::fs::File;
use std::path::Path;
use std::path::PathBuf;
use thiserror::Error;

/// Fixed portion of the MRC2014 header, in bytes. Voxel data follows it
/// after the extended header.
const HEADER_LEN: usize = 1024;

#[derive(Debug, Error)]
pub enum VolumeLoaderError {
    #[error("truncated MRC header (need {HEADER_LEN} bytes)")]
    TruncatedHeader,

    #[error("invalid MRC dimensions {0}x{1}x{2}")]
    InvalidDimensions(i32, i32, i32),

    #[error("unsupported MRC mode {0}")]
    UnsupportedMode(i32),

    #[error("truncated voxel data (expected {expected} bytes, file holds {actual})")]
    TruncatedData { expected: usize, actual: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Raw summary statistics from the MRC header. May be absent or nonsense in
/// the wild; `stats::estimate_stats` decides whether to trust them.
#[derive(Clone, Copy, Debug)]
pub struct HeaderStats {
    pub min: f32,
    pub max: f32,
    pub mean: f32,
}

/// A freshly opened volume together with its header hint.
pub struct OpenVolume {
    pub volume: Volume,
    pub header_stats: HeaderStats,
}

pub struct VolumeLoader;

impl VolumeLoader {
    /// Memory-map an MRC/REC/MRCS file and expose it as a [`Volume`].
    ///
    /// Supported voxel modes: 0 (i8), 1 (i16), 2 (f32), 6 (u16), assumed
    /// little-endian. This is the only fallible boundary of the engine;
    /// every read after a successful open is infallible.
    ///
    /// # Errors
    ///
    /// Returns an error for I/O failures, truncated files, non-positive
    /// dimensions, or an unsupported voxel mode.
    pub fn open(path: impl AsRef<Path>) -> Result<OpenVolume, VolumeLoaderError> {
        let file = File::open(path.as_ref())?;
        // Safety: the map is read-only and the file is never written through
        // this handle while mapped.
        let map = unsafe { Mmap::map(&file)? };

        if map.len() < HEADER_LEN {
            return Err(VolumeLoaderError::TruncatedHeader);
        }

        let nx = read_i32(&map, 0);
        let ny = read_i32(&map, 4);
        let nz = read_i32(&map, 8);
        if nx <= 0 || ny <= 0 || nz <= 0 {
            return Err(VolumeLoaderError::InvalidDimensions(nx, ny, nz));
        }

        let mode = match read_i32(&map, 12) {
            0 => VoxelMode::I8,
            1 => VoxelMode::I16,
            2 => VoxelMode::F32,
            6 => VoxelMode::U16,
            other => return Err(VolumeLoaderError::UnsupportedMode(other)),
        };

        let header_stats = HeaderStats {
            min: read_f32(&map, 76),
            max: read_f32(&map, 80),
            mean: read_f32(&map, 84),
        };

        let ext_len = read_i32(&map, 92).max(0) as usize;
        let offset = HEADER_LEN + ext_len;
        let dim = (nz as usize, ny as usize, nx as usize);
        // Corrupt headers can claim sizes past usize; treat overflow as an
        // invalid header rather than letting the size check wrap.
        let expected = dim
            .0
            .checked_mul(dim.1)
            .and_then(|n| n.checked_mul(dim.2))
            .and_then(|n| n.checked_mul(mode.byte_len()))
            .and_then(|n| n.checked_add(offset))
            .ok_or(VolumeLoaderError::InvalidDimensions(nx, ny, nz))?;
        if map.len() < expected {
            return Err(VolumeLoaderError::TruncatedData {
                expected,
                actual: map.len(),
            });
        }

        Ok(OpenVolume {
            volume: Volume::from_mapped(map, offset, mode, dim),
            header_stats,
        })
    }

    /// Sorted MRC-like siblings of `path`.
    ///
    /// A directory yields every `.mrc`/`.rec`/`.mrcs` file it contains
    /// (case-insensitive). A file path yields its directory's matches, with
    /// the file itself included even when its extension does not match. A
    /// missing directory yields an empty list.
    pub fn list_mrcs(path: impl AsRef<Path>) -> Vec<PathBuf> {
        let path = path.as_ref();
        let dir = if path.is_dir() {
            path
        } else {
            path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."))
        };

        let mut files: Vec<PathBuf> = match fs::read_dir(dir) {
            Ok(entries) => entries
                .filter_map(Result::ok)
                .map(|entry| entry.path())
                .filter(|p| p.is_file() && has_mrc_extension(p))
                .collect(),
            Err(_) => Vec::new(),
        };

        if !path.is_dir() && path.exists() && !files.iter().any(|f| f == path) {
            files.push(path.to_path_buf());
        }
        files.sort();
        files
    }
}

fn has_mrc_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| {
            ext.eq_ignore_ascii_case("mrc")
                || ext.eq_ignore_ascii_case("rec")
                || ext.eq_ignore_ascii_case("mrcs")
        })
}

fn read_i32(bytes: &[u8], offset: usize) -> i32 {
    bytemuck::pod_read_unaligned(&bytes[offset..offset + 4])
}

fn read_f32(bytes: &[u8], offset: usize) -> f32 {
    bytemuck::pod_read_unaligned(&bytes[offset..offset + 4])
}
