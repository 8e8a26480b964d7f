//! Voxel-index to world-space coordinate mapping.

use nalgebra::Matrix4;

use crate::types::{Geometry, SurfaceMesh};

/// Apply a volume's 4x4 affine to extracted geometry, producing a mesh with
/// world-space vertex coordinates.
///
/// Normals are carried over unchanged: they remain the index-space gradient
/// normals produced by extraction. Under a rigid or uniformly scaled affine
/// this is exact up to scale; under shear or anisotropic scaling an
/// implementation targeting geometric fidelity would instead transform
/// normals by the inverse transpose of the affine's linear part. This
/// simplification matches the behavior of the extraction output consumers
/// this crate targets.
pub fn to_world(geometry: Geometry, affine: &Matrix4<f64>) -> SurfaceMesh {
    let vertices = geometry
        .vertices
        .into_iter()
        .map(|v| affine.transform_point(&v))
        .collect();

    SurfaceMesh {
        vertices,
        faces: geometry.faces,
        normals: geometry.normals,
    }
}
