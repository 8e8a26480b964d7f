//! Batch isosurface extraction from 3-D scalar volumes.
//!
//! This crate turns directories of volumetric label masks (NIfTI-1) into
//! polygonal surface meshes (OBJ). It provides the full batch pipeline:
//!
//! - **Discovery**: glob-match inputs under a root, derive one output path
//!   per input ([`pair_jobs()`])
//! - **Preprocessing**: optional external Gaussian smoothing with a scoped
//!   temporary volume ([`smooth()`])
//! - **Extraction**: isosurface extraction with surface nets or marching
//!   tetrahedra ([`extract()`])
//! - **Coordinate mapping**: voxel-index to world space via the volume's
//!   affine ([`to_world()`])
//! - **Output**: atomic OBJ writes ([`save_surface()`])
//! - **Scheduling**: a bounded worker pool running all jobs to completion
//!   with fail-visible aggregation ([`run_all()`])
//!
//! # Quick Start
//!
//! ```no_run
//! use volsurf::{pair_jobs, run_all, ExtractionParams};
//! use std::path::Path;
//!
//! let params = ExtractionParams::default();
//! params.validate()?;
//!
//! let jobs = pair_jobs(
//!     Path::new("/incoming"),
//!     Path::new("/outgoing"),
//!     "**/*.nii.gz",
//!     ".obj",
//! )?;
//! let summary = run_all(&jobs, &params, None)?;
//! println!("wrote {} meshes", summary.written.len());
//! # Ok::<(), volsurf::SurfError>(())
//! ```
//!
//! # Concurrency Model
//!
//! Jobs are independent: the only shared state is the read-only
//! [`ExtractionParams`] and the logging sink. One job failing never cancels
//! its siblings; the scheduler collects every outcome and fails the aggregate
//! run visibly if any job failed.
//!
//! # Logging
//!
//! Operations emit `tracing` events. Set `RUST_LOG` to control output:
//! - `RUST_LOG=volsurf=info` — per-job completion lines
//! - `RUST_LOG=volsurf=debug` — extraction details and pairing decisions
//! - `RUST_LOG=volsurf::timing=debug` — per-operation timing
//!
//! # Error Handling
//!
//! Operations return [`SurfResult<T>`], which is `Result<T, SurfError>`.
//! Every error carries a machine-readable `SURF-XXXX` code and a recovery
//! suggestion; see [`SurfError`] for the taxonomy.

mod error;
mod types;

pub mod extract;
pub mod io;
pub mod pairing;
pub mod runner;
pub mod scheduler;
pub mod smooth;
pub mod tracing_ext;
pub mod transform;
pub mod volume;

// Re-export core types at crate root
pub use error::{SurfError, SurfErrorCode, SurfResult};
pub use types::{ExtractionParams, Geometry, Job, Method, SurfaceMesh, Volume};

// Re-export the pipeline operations
pub use extract::extract;
pub use io::save_surface;
pub use pairing::pair_jobs;
pub use runner::{run_job, JobOutcome};
pub use scheduler::{run_all, RunSummary};
pub use smooth::{smooth, SmoothedVolume};
pub use transform::to_world;
pub use volume::{load_volume, save_volume};

// Convenience methods on the core types
impl Volume {
    /// Load a volume from a NIfTI-1 file (`.nii` or `.nii.gz`).
    pub fn load(path: impl AsRef<std::path::Path>) -> SurfResult<Self> {
        volume::load_volume(path.as_ref())
    }

    /// Save the volume as single-file NIfTI-1 (float32).
    pub fn save(&self, path: impl AsRef<std::path::Path>) -> SurfResult<()> {
        volume::save_volume(self, path.as_ref())
    }
}

impl SurfaceMesh {
    /// Save the mesh as OBJ, creating parent directories as needed.
    pub fn save(&self, path: impl AsRef<std::path::Path>) -> SurfResult<()> {
        io::save_surface(self, path.as_ref())
    }
}
