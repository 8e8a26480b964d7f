//! Core data types for the extraction pipeline.

use std::path::PathBuf;

use nalgebra::{Matrix4, Point3, Vector3};

use crate::error::{SurfError, SurfResult};

/// A 3-D scalar volume with an embedded voxel-index to world-space affine.
///
/// Values are stored x-fastest (NIfTI column-major order): the linear index of
/// voxel `(x, y, z)` is `x + y * dims[0] + z * dims[0] * dims[1]`.
#[derive(Debug, Clone)]
pub struct Volume {
    /// Grid dimensions [x, y, z].
    pub dims: [usize; 3],
    /// Scalar values, one per voxel.
    pub data: Vec<f32>,
    /// 4x4 affine mapping homogeneous voxel indices to world coordinates.
    pub affine: Matrix4<f64>,
}

impl Volume {
    /// Create a volume from raw parts.
    ///
    /// The data length must equal the product of the dimensions.
    pub fn new(dims: [usize; 3], data: Vec<f32>, affine: Matrix4<f64>) -> SurfResult<Self> {
        let expected = dims[0] * dims[1] * dims[2];
        if data.len() != expected {
            return Err(SurfError::invalid_params(format!(
                "volume data length {} does not match dims {:?} ({} voxels)",
                data.len(),
                dims,
                expected
            )));
        }
        Ok(Self { dims, data, affine })
    }

    /// Total number of voxels.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the volume has no voxels.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Scalar value at grid coordinates.
    #[inline]
    pub fn value(&self, x: usize, y: usize, z: usize) -> f32 {
        self.data[x + y * self.dims[0] + z * self.dims[0] * self.dims[1]]
    }

    /// Minimum and maximum scalar values, or None for an empty volume.
    pub fn min_max(&self) -> Option<(f32, f32)> {
        let mut iter = self.data.iter().copied().filter(|v| !v.is_nan());
        let first = iter.next()?;
        let (mut min, mut max) = (first, first);
        for v in iter {
            min = min.min(v);
            max = max.max(v);
        }
        Some((min, max))
    }
}

/// Isosurface algorithm variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Naive surface nets: one vertex per sign-changing cell, quad-based.
    SurfaceNets,
    /// Marching tetrahedra: six tetrahedra per cell, triangle-based.
    MarchingTetrahedra,
}

impl Method {
    /// Short name used in logs and the CLI.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::SurfaceNets => "surface-nets",
            Method::MarchingTetrahedra => "marching-tetrahedra",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parameters for one extraction run, shared read-only across all jobs.
#[derive(Debug, Clone)]
pub struct ExtractionParams {
    /// Isosurface threshold. None selects the midpoint of the volume's
    /// min/max values per job.
    pub level: Option<f32>,
    /// Physical voxel spacing along each array axis; extracted vertex
    /// coordinates are scaled by these before the affine is applied.
    pub spacing: [f64; 3],
    /// Sampling stride in voxels. Larger steps are faster but coarser.
    pub step_size: usize,
    /// Which isosurface algorithm to run.
    pub method: Method,
    /// Gaussian smoothing amount (FWHM); 0 disables preprocessing.
    pub fwhm: f64,
    /// External smoothing command, invoked as `<cmd> <fwhm> <input> <output>`.
    pub smooth_cmd: String,
}

impl Default for ExtractionParams {
    fn default() -> Self {
        Self {
            level: None,
            spacing: [1.0, 1.0, 1.0],
            step_size: 1,
            method: Method::SurfaceNets,
            fwhm: 0.0,
            smooth_cmd: "volsmooth".to_string(),
        }
    }
}

impl ExtractionParams {
    /// Validate the parameter set once at startup.
    pub fn validate(&self) -> SurfResult<()> {
        if self.step_size < 1 {
            return Err(SurfError::invalid_params("step size must be >= 1"));
        }
        if self.spacing.iter().any(|&s| !(s > 0.0) || !s.is_finite()) {
            return Err(SurfError::invalid_params(format!(
                "spacing must be positive and finite, got {:?}",
                self.spacing
            )));
        }
        if !(self.fwhm >= 0.0) || !self.fwhm.is_finite() {
            return Err(SurfError::invalid_params(format!(
                "fwhm must be non-negative, got {}",
                self.fwhm
            )));
        }
        if let Some(level) = self.level {
            if level.is_nan() {
                return Err(SurfError::invalid_params("level must not be NaN"));
            }
        }
        if self.fwhm > 0.0 && self.smooth_cmd.is_empty() {
            return Err(SurfError::invalid_params(
                "smoothing requested but no smoothing command configured",
            ));
        }
        Ok(())
    }
}

/// One unit of batch work: an input volume and its output mesh path.
///
/// Jobs are independent; they share no mutable state with each other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// Path of the volume to extract from.
    pub input: PathBuf,
    /// Path the resulting mesh will be written to.
    pub output: PathBuf,
}

/// Raw extraction output in (spacing-scaled) voxel-index space.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    /// Vertex positions.
    pub vertices: Vec<Point3<f64>>,
    /// Triangle faces as indices into the vertex array.
    pub faces: Vec<[u32; 3]>,
    /// Outward unit normals, one per vertex, from the scalar field gradient.
    pub normals: Vec<Vector3<f64>>,
}

impl Geometry {
    /// Number of vertices.
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Number of triangle faces.
    #[inline]
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Check if the geometry has no vertices or faces.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.faces.is_empty()
    }
}

/// A surface mesh with world-space vertex coordinates.
///
/// Produced by applying a volume's affine to a [`Geometry`]. Normals are
/// carried over from index space unchanged (see [`crate::transform::to_world`]).
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceMesh {
    /// World-space vertex positions.
    pub vertices: Vec<Point3<f64>>,
    /// Triangle faces as indices into the vertex array.
    pub faces: Vec<[u32; 3]>,
    /// Per-vertex normals.
    pub normals: Vec<Vector3<f64>>,
}

impl SurfaceMesh {
    /// Number of vertices.
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Number of triangle faces.
    #[inline]
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_len_check() {
        let affine = Matrix4::identity();
        assert!(Volume::new([2, 2, 2], vec![0.0; 8], affine).is_ok());
        assert!(Volume::new([2, 2, 2], vec![0.0; 7], affine).is_err());
    }

    #[test]
    fn test_volume_indexing_is_x_fastest() {
        let mut data = vec![0.0; 24];
        // voxel (1, 2, 0) in a [2, 3, 4] grid
        data[1 + 2 * 2] = 7.0;
        let vol = Volume::new([2, 3, 4], data, Matrix4::identity()).unwrap();
        assert_eq!(vol.value(1, 2, 0), 7.0);
        assert_eq!(vol.value(0, 0, 0), 0.0);
    }

    #[test]
    fn test_min_max_ignores_nan() {
        let vol = Volume::new(
            [2, 2, 1],
            vec![1.0, f32::NAN, -3.0, 2.0],
            Matrix4::identity(),
        )
        .unwrap();
        assert_eq!(vol.min_max(), Some((-3.0, 2.0)));
    }

    #[test]
    fn test_params_validation() {
        let mut params = ExtractionParams::default();
        assert!(params.validate().is_ok());

        params.step_size = 0;
        assert!(params.validate().is_err());
        params.step_size = 2;

        params.spacing = [1.0, -1.0, 1.0];
        assert!(params.validate().is_err());
        params.spacing = [0.5, 0.5, 2.0];

        params.fwhm = -0.1;
        assert!(params.validate().is_err());
        params.fwhm = 3.0;
        assert!(params.validate().is_ok());
    }
}
