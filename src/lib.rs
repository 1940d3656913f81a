//! # tomo-volume
//!
//! Navigation and resampling engine for interactively browsing large
//! tomographic volumes (MRC/REC/MRCS) as 2D slices.
//!
//! Volumes are memory-mapped and decoded to `f32` on access, so gigabyte
//! reconstructions open instantly. The engine extracts axis-aligned XY and
//! XZ slices, windows them through an adjustable contrast range into 8-bit
//! rasters, and keeps recent rasters in a per-volume LRU cache. Two picked
//! 3D points define an oblique cutting plane that is trilinearly resampled
//! into a raster of its own, and the accompanying coordinate transforms map
//! picked view points back into volume space and vice versa.
//!
//! A [`Session`] ties it together for a directory of tomograms: it owns the
//! persistent contrast range, debounces rapid slice scrubbing, and computes
//! stats, histograms and neighbor-file center slices on a small background
//! worker pool so the interactive thread never waits for them unless it
//! must.
//!
//! No widget toolkit is involved; the embedding layer decides when to call
//! `render_*` and what to do with the rasters.
//!
//! # Examples
//!
//! ## Rendering the center slice of a tomogram
//!
//! ```no_run
//! # use tomo_volume::{Session, SessionOptions};
//! let mut session = Session::open("tomograms/ts_001.mrc", SessionOptions::default())
//!     .expect("should have opened the tomogram");
//! let image = session
//!     .render_xy()
//!     .expect("should have rendered the center slice");
//! image.save("slice.png").expect("should have written the raster");
//! ```
//!
//! ## Cutting an oblique plane through two picked points
//!
//! ```no_run
//! # use tomo_volume::{Session, SessionOptions};
//! # use glam::Vec3;
//! # let mut session = Session::open("tomograms", SessionOptions::default()).unwrap();
//! session
//!     .build_plane(Vec3::new(120.0, 88.0, 30.0), Vec3::new(180.0, 95.0, 64.0))
//!     .expect("picked points should not coincide");
//! let patch = session.render_plane().expect("plane should resample");
//! ```

pub mod accel;
pub mod cache;
pub mod contrast;
pub mod debounce;
pub mod plane;
pub mod prefetch;
pub mod session;
pub mod stats;
pub mod volume;
pub mod volume_loader;

pub use accel::ScrollAccelerator;
pub use cache::SliceCache;
pub use cache::SliceKey;
pub use contrast::ContrastRange;
pub use debounce::Debouncer;
pub use plane::PlaneError;
pub use plane::PlaneFrame;
pub use prefetch::MetadataPrefetcher;
pub use session::Session;
pub use session::SessionError;
pub use session::SessionOptions;
pub use stats::Histogram;
pub use stats::VolumeStats;
pub use volume::Volume;
pub use volume_loader::VolumeLoader;
