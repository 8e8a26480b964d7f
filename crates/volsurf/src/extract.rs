//! Isosurface extraction from scalar volumes.
//!
//! Two algorithm families are available (see [`Method`]): surface nets via
//! the `fast-surface-nets` crate, and an in-crate marching-tetrahedra
//! implementation. Both honor the same contract:
//!
//! - The level defaults to the midpoint of the volume's min/max values.
//! - Levels at or outside the value range are rejected as degenerate instead
//!   of silently yielding an empty mesh.
//! - `step_size` subsamples the grid before extraction; output coordinates
//!   are rescaled so they stay in full-resolution voxel-index units.
//! - Vertex coordinates are scaled by `spacing`; the affine is applied later
//!   by [`crate::transform::to_world`].
//!
//! The grid is padded with one layer of outside-valued voxels so masks that
//! touch the volume boundary still extract as closed surfaces.

use fast_surface_nets::{ndshape::RuntimeShape, surface_nets, SurfaceNetsBuffer};
use hashbrown::HashMap;
use nalgebra::{Point3, Vector3};
use tracing::debug;

use crate::error::{SurfError, SurfResult};
use crate::types::{ExtractionParams, Geometry, Method, Volume};

/// Extract an isosurface from a volume.
///
/// Returns geometry in spacing-scaled voxel-index space with outward
/// gradient-based normals.
pub fn extract(volume: &Volume, params: &ExtractionParams) -> SurfResult<Geometry> {
    let (min, max) = volume.min_max().ok_or(SurfError::EmptyIsosurface)?;
    let level = params.level.unwrap_or((min + max) / 2.0);
    if !(min < level && level < max) {
        return Err(SurfError::DegenerateIsosurface { level, min, max });
    }

    let grid = SampleGrid::from_volume(volume, params.step_size, min);
    debug!(
        dims = ?grid.dims,
        level,
        step = params.step_size,
        method = %params.method,
        "Extracting isosurface"
    );

    let geometry = match params.method {
        Method::SurfaceNets => extract_surface_nets(&grid, level, params),
        Method::MarchingTetrahedra => extract_marching_tetrahedra(&grid, level, params),
    };

    if geometry.is_empty() {
        return Err(SurfError::EmptyIsosurface);
    }

    debug!(
        vertices = geometry.vertex_count(),
        faces = geometry.face_count(),
        "Isosurface extracted"
    );
    Ok(geometry)
}

/// Subsampled copy of a volume with a one-voxel border of outside values.
struct SampleGrid {
    /// Padded grid dimensions [x, y, z].
    dims: [usize; 3],
    /// Padded scalar values, x-fastest.
    values: Vec<f32>,
}

impl SampleGrid {
    fn from_volume(volume: &Volume, step: usize, fill: f32) -> Self {
        let sampled = [
            (volume.dims[0] - 1) / step + 1,
            (volume.dims[1] - 1) / step + 1,
            (volume.dims[2] - 1) / step + 1,
        ];
        let dims = [sampled[0] + 2, sampled[1] + 2, sampled[2] + 2];

        let mut values = vec![fill; dims[0] * dims[1] * dims[2]];
        for z in 0..sampled[2] {
            for y in 0..sampled[1] {
                for x in 0..sampled[0] {
                    let dst = (x + 1) + (y + 1) * dims[0] + (z + 1) * dims[0] * dims[1];
                    values[dst] = volume.value(x * step, y * step, z * step);
                }
            }
        }

        Self { dims, values }
    }

    #[inline]
    fn index(&self, x: usize, y: usize, z: usize) -> usize {
        x + y * self.dims[0] + z * self.dims[0] * self.dims[1]
    }

    #[inline]
    fn value(&self, x: usize, y: usize, z: usize) -> f32 {
        self.values[self.index(x, y, z)]
    }

    /// Central-difference gradient of the scalar field at a grid point,
    /// clamped at the borders.
    fn gradient(&self, x: usize, y: usize, z: usize) -> Vector3<f64> {
        let axis = |lo: f32, hi: f32, span: f64| (hi - lo) as f64 / span;

        let (xm, xp) = (x.saturating_sub(1), (x + 1).min(self.dims[0] - 1));
        let (ym, yp) = (y.saturating_sub(1), (y + 1).min(self.dims[1] - 1));
        let (zm, zp) = (z.saturating_sub(1), (z + 1).min(self.dims[2] - 1));

        Vector3::new(
            axis(self.value(xm, y, z), self.value(xp, y, z), (xp - xm) as f64),
            axis(self.value(x, ym, z), self.value(x, yp, z), (yp - ym) as f64),
            axis(self.value(x, y, zm), self.value(x, y, zp), (zp - zm) as f64),
        )
    }
}

/// Map a padded-grid coordinate back to spacing-scaled full-resolution space.
#[inline]
fn grid_to_index_space(p: [f64; 3], params: &ExtractionParams) -> Point3<f64> {
    let step = params.step_size as f64;
    Point3::new(
        (p[0] - 1.0) * step * params.spacing[0],
        (p[1] - 1.0) * step * params.spacing[1],
        (p[2] - 1.0) * step * params.spacing[2],
    )
}

fn normalize_or_default(v: Vector3<f64>) -> Vector3<f64> {
    let norm = v.norm();
    if norm > 1e-12 {
        v / norm
    } else {
        Vector3::new(0.0, 0.0, 1.0)
    }
}

fn extract_surface_nets(grid: &SampleGrid, level: f32, params: &ExtractionParams) -> Geometry {
    // Signed distance proxy: negative inside (value above level).
    let sdf: Vec<f32> = grid.values.iter().map(|&v| level - v).collect();

    let shape = RuntimeShape::<u32, 3>::new([
        grid.dims[0] as u32,
        grid.dims[1] as u32,
        grid.dims[2] as u32,
    ]);

    let mut buffer = SurfaceNetsBuffer::default();
    surface_nets(
        &sdf,
        &shape,
        [0, 0, 0],
        [
            grid.dims[0] as u32 - 1,
            grid.dims[1] as u32 - 1,
            grid.dims[2] as u32 - 1,
        ],
        &mut buffer,
    );

    let vertices = buffer
        .positions
        .iter()
        .map(|p| grid_to_index_space([p[0] as f64, p[1] as f64, p[2] as f64], params))
        .collect();

    // The buffer normals are SDF gradients, already pointing outward.
    let normals = buffer
        .normals
        .iter()
        .map(|n| normalize_or_default(Vector3::new(n[0] as f64, n[1] as f64, n[2] as f64)))
        .collect();

    let faces = buffer
        .indices
        .chunks_exact(3)
        .map(|c| [c[0], c[1], c[2]])
        .collect();

    Geometry {
        vertices,
        faces,
        normals,
    }
}

/// Cube corner offsets, standard marching-cubes numbering.
const CORNER_OFFSETS: [[usize; 3]; 8] = [
    [0, 0, 0],
    [1, 0, 0],
    [1, 1, 0],
    [0, 1, 0],
    [0, 0, 1],
    [1, 0, 1],
    [1, 1, 1],
    [0, 1, 1],
];

/// Decomposition of a cube into six tetrahedra around the 0-6 diagonal.
/// Adjacent cells agree on face diagonals, so the output mesh is watertight.
const CUBE_TETRA: [[usize; 4]; 6] = [
    [0, 5, 1, 6],
    [0, 1, 2, 6],
    [0, 2, 3, 6],
    [0, 3, 7, 6],
    [0, 7, 4, 6],
    [0, 4, 5, 6],
];

fn extract_marching_tetrahedra(
    grid: &SampleGrid,
    level: f32,
    params: &ExtractionParams,
) -> Geometry {
    let mut builder = TetMeshBuilder {
        grid,
        level,
        edge_vertices: HashMap::new(),
        positions: Vec::new(),
        normals: Vec::new(),
        faces: Vec::new(),
    };

    for z in 0..grid.dims[2] - 1 {
        for y in 0..grid.dims[1] - 1 {
            for x in 0..grid.dims[0] - 1 {
                builder.process_cell(x, y, z);
            }
        }
    }

    let vertices = builder
        .positions
        .iter()
        .map(|&p| grid_to_index_space(p, params))
        .collect();

    Geometry {
        vertices,
        faces: builder.faces,
        normals: builder.normals,
    }
}

struct TetMeshBuilder<'a> {
    grid: &'a SampleGrid,
    level: f32,
    /// Welds crossing vertices by the grid-point pair of their edge, so
    /// neighboring cells share vertices and the surface closes.
    edge_vertices: HashMap<(u32, u32), u32>,
    /// Vertex positions in padded-grid coordinates.
    positions: Vec<[f64; 3]>,
    normals: Vec<Vector3<f64>>,
    faces: Vec<[u32; 3]>,
}

impl TetMeshBuilder<'_> {
    fn process_cell(&mut self, x: usize, y: usize, z: usize) {
        let corners: [[usize; 3]; 8] =
            CORNER_OFFSETS.map(|[dx, dy, dz]| [x + dx, y + dy, z + dz]);
        let values: [f32; 8] = corners.map(|[cx, cy, cz]| self.grid.value(cx, cy, cz));

        // Cheap reject for cells the surface cannot cross.
        let all_inside = values.iter().all(|&v| v > self.level);
        let all_outside = values.iter().all(|&v| v <= self.level);
        if all_inside || all_outside {
            return;
        }

        for tet in &CUBE_TETRA {
            let idx: [usize; 4] = [tet[0], tet[1], tet[2], tet[3]];
            let inside: Vec<usize> = idx
                .iter()
                .copied()
                .filter(|&i| values[i] > self.level)
                .collect();
            let outside: Vec<usize> = idx
                .iter()
                .copied()
                .filter(|&i| values[i] <= self.level)
                .collect();

            match inside.len() {
                1 => {
                    let a = inside[0];
                    let tri = [
                        self.edge_vertex(corners[a], corners[outside[0]], values[a], values[outside[0]]),
                        self.edge_vertex(corners[a], corners[outside[1]], values[a], values[outside[1]]),
                        self.edge_vertex(corners[a], corners[outside[2]], values[a], values[outside[2]]),
                    ];
                    self.push_triangle(tri);
                }
                3 => {
                    let a = outside[0];
                    let tri = [
                        self.edge_vertex(corners[inside[0]], corners[a], values[inside[0]], values[a]),
                        self.edge_vertex(corners[inside[1]], corners[a], values[inside[1]], values[a]),
                        self.edge_vertex(corners[inside[2]], corners[a], values[inside[2]], values[a]),
                    ];
                    self.push_triangle(tri);
                }
                2 => {
                    let (i0, i1) = (inside[0], inside[1]);
                    let (o0, o1) = (outside[0], outside[1]);
                    let v00 = self.edge_vertex(corners[i0], corners[o0], values[i0], values[o0]);
                    let v01 = self.edge_vertex(corners[i0], corners[o1], values[i0], values[o1]);
                    let v10 = self.edge_vertex(corners[i1], corners[o0], values[i1], values[o0]);
                    let v11 = self.edge_vertex(corners[i1], corners[o1], values[i1], values[o1]);
                    self.push_triangle([v00, v01, v11]);
                    self.push_triangle([v00, v11, v10]);
                }
                _ => {}
            }
        }
    }

    /// Vertex on the crossing edge between two grid points, welded globally.
    fn edge_vertex(&mut self, p0: [usize; 3], p1: [usize; 3], v0: f32, v1: f32) -> u32 {
        let i0 = self.grid.index(p0[0], p0[1], p0[2]) as u32;
        let i1 = self.grid.index(p1[0], p1[1], p1[2]) as u32;
        let key = if i0 < i1 { (i0, i1) } else { (i1, i0) };

        if let Some(&existing) = self.edge_vertices.get(&key) {
            return existing;
        }

        let t = ((self.level - v0) / (v1 - v0)).clamp(0.0, 1.0) as f64;
        let position = [
            p0[0] as f64 + t * (p1[0] as f64 - p0[0] as f64),
            p0[1] as f64 + t * (p1[1] as f64 - p0[1] as f64),
            p0[2] as f64 + t * (p1[2] as f64 - p0[2] as f64),
        ];

        // Outward normal: the field decreases outward, so negate the gradient.
        let g0 = self.grid.gradient(p0[0], p0[1], p0[2]);
        let g1 = self.grid.gradient(p1[0], p1[1], p1[2]);
        let normal = normalize_or_default(-(g0 + (g1 - g0) * t));

        let index = self.positions.len() as u32;
        self.positions.push(position);
        self.normals.push(normal);
        self.edge_vertices.insert(key, index);
        index
    }

    /// Append a triangle, winding it so its face normal agrees with the
    /// vertex normals (counter-clockwise seen from outside).
    fn push_triangle(&mut self, [a, b, c]: [u32; 3]) {
        let pa = Vector3::from(self.positions[a as usize]);
        let pb = Vector3::from(self.positions[b as usize]);
        let pc = Vector3::from(self.positions[c as usize]);
        let face_normal = (pb - pa).cross(&(pc - pa));
        let outward =
            self.normals[a as usize] + self.normals[b as usize] + self.normals[c as usize];

        if face_normal.dot(&outward) < 0.0 {
            self.faces.push([a, c, b]);
        } else {
            self.faces.push([a, b, c]);
        }
    }
}
