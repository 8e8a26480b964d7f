//! Surface mesh output.
//!
//! Meshes are written as Wavefront OBJ with vertex normals. Writes go through
//! a temporary file in the destination directory followed by an atomic rename,
//! so a failing job never leaves a truncated mesh behind.

use std::io::{BufWriter, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{SurfError, SurfResult};
use crate::types::SurfaceMesh;

/// Save a mesh to `path` as OBJ, creating parent directories as needed.
pub fn save_surface(mesh: &SurfaceMesh, path: &Path) -> SurfResult<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent).map_err(|e| SurfError::io_write(path, e))?;

    let tmp = NamedTempFile::new_in(parent).map_err(|e| SurfError::io_write(path, e))?;
    {
        let mut writer = BufWriter::new(tmp.as_file());
        write_obj(mesh, &mut writer).map_err(|e| SurfError::io_write(path, e))?;
        writer.flush().map_err(|e| SurfError::io_write(path, e))?;
    }
    tmp.persist(path)
        .map_err(|e| SurfError::io_write(path, e.error))?;

    info!(
        vertices = mesh.vertex_count(),
        faces = mesh.face_count(),
        "Saved surface to {:?}",
        path
    );
    Ok(())
}

fn write_obj(mesh: &SurfaceMesh, writer: &mut impl Write) -> std::io::Result<()> {
    writeln!(writer, "# OBJ surface exported by volsurf")?;
    writeln!(writer, "# Vertices: {}", mesh.vertex_count())?;
    writeln!(writer, "# Faces: {}", mesh.face_count())?;
    writeln!(writer)?;

    for v in &mesh.vertices {
        writeln!(writer, "v {:.6} {:.6} {:.6}", v.x, v.y, v.z)?;
    }

    writeln!(writer)?;
    for n in &mesh.normals {
        writeln!(writer, "vn {:.6} {:.6} {:.6}", n.x, n.y, n.z)?;
    }

    writeln!(writer)?;
    let mut skipped = 0usize;
    for &[a, b, c] in &mesh.faces {
        // Skip degenerate faces rather than emitting invalid geometry.
        if a == b || b == c || a == c {
            skipped += 1;
            continue;
        }
        writeln!(
            writer,
            "f {}//{} {}//{} {}//{}",
            a + 1,
            a + 1,
            b + 1,
            b + 1,
            c + 1,
            c + 1
        )?;
    }
    if skipped > 0 {
        debug!(skipped, "Dropped degenerate faces during OBJ export");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Point3, Vector3};
    use tempfile::TempDir;

    fn tetrahedron() -> SurfaceMesh {
        SurfaceMesh {
            vertices: vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
                Point3::new(0.0, 0.0, 1.0),
            ],
            faces: vec![[0, 2, 1], [0, 1, 3], [1, 2, 3], [0, 3, 2]],
            normals: vec![Vector3::new(0.0, 0.0, 1.0); 4],
        }
    }

    #[test]
    fn test_writes_obj_with_normals() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mesh.obj");
        save_surface(&tetrahedron(), &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().filter(|l| l.starts_with("v ")).count(), 4);
        assert_eq!(content.lines().filter(|l| l.starts_with("vn ")).count(), 4);
        assert_eq!(content.lines().filter(|l| l.starts_with("f ")).count(), 4);
        assert!(content.contains("f 1//1 3//3 2//2"));
    }

    #[test]
    fn test_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a").join("b").join("mesh.obj");
        save_surface(&tetrahedron(), &path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_degenerate_faces_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mesh.obj");
        let mut mesh = tetrahedron();
        mesh.faces.push([1, 1, 2]);
        save_surface(&mesh, &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().filter(|l| l.starts_with("f ")).count(), 4);
    }

    #[test]
    fn test_unwritable_destination_fails_cleanly() {
        let dir = TempDir::new().unwrap();
        // A path whose parent is a regular file cannot be created.
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"file").unwrap();
        let path = blocker.join("mesh.obj");

        let err = save_surface(&tetrahedron(), &path).unwrap_err();
        assert!(matches!(err, SurfError::IoWrite { .. }));
        assert!(!path.exists());
    }
}
