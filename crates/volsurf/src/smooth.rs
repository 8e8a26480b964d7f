//! Optional volume smoothing via an external tool.
//!
//! Smoothing runs before extraction when `fwhm > 0`. The external command is
//! invoked as `<cmd> <fwhm> <input> <output>` and must exit zero after
//! writing the smoothed volume to `<output>`; wrapper scripts adapt real
//! tools (`mincblur`, `fslmaths`) to this shape.
//!
//! The smoothed volume lives in a temporary file whose lifetime is scoped to
//! the returned handle: dropping the handle deletes the file, on success,
//! failure, and unwind alike. With `fwhm == 0` no temporary is created and
//! the original volume path is used directly.

use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempPath;
use tracing::{debug, info};

use crate::error::{SurfError, SurfResult};
use crate::types::ExtractionParams;

/// A volume path whose backing file may be a scoped temporary.
#[derive(Debug)]
pub enum SmoothedVolume {
    /// The original input, untouched (fwhm == 0).
    Original(PathBuf),
    /// A smoothed copy; the file is deleted when this value drops.
    Smoothed(TempPath),
}

impl SmoothedVolume {
    /// Path of the volume to extract from.
    pub fn path(&self) -> &Path {
        match self {
            SmoothedVolume::Original(path) => path,
            SmoothedVolume::Smoothed(temp) => temp,
        }
    }
}

/// Smooth `input` according to `params`, yielding the volume to extract from.
pub fn smooth(input: &Path, params: &ExtractionParams) -> SurfResult<SmoothedVolume> {
    if params.fwhm == 0.0 {
        debug!("Smoothing disabled; using {:?} directly", input);
        return Ok(SmoothedVolume::Original(input.to_path_buf()));
    }

    // Keep the suffix so the smoother and the loader agree on compression.
    let suffix = if input
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("gz"))
    {
        ".nii.gz"
    } else {
        ".nii"
    };
    let temp = tempfile::Builder::new()
        .prefix("volsurf-smooth-")
        .suffix(suffix)
        .tempfile()
        .map_err(|e| SurfError::io_write("temporary smoothed volume", e))?
        .into_temp_path();

    info!(fwhm = params.fwhm, "Smoothing {:?}", input);
    let output = Command::new(&params.smooth_cmd)
        .arg(params.fwhm.to_string())
        .arg(input)
        .arg(&*temp)
        .output()
        .map_err(|e| SurfError::SmoothingLaunch {
            command: params.smooth_cmd.clone(),
            source: e,
        })?;

    if !output.status.success() {
        // `temp` drops here, so the half-written file never outlives the error.
        return Err(SurfError::SmoothingFailed {
            command: params.smooth_cmd.clone(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    Ok(SmoothedVolume::Smoothed(temp))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[cfg(unix)]
    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn params_with(fwhm: f64, cmd: &Path) -> ExtractionParams {
        ExtractionParams {
            fwhm,
            smooth_cmd: cmd.to_string_lossy().into_owned(),
            ..ExtractionParams::default()
        }
    }

    #[test]
    fn test_zero_fwhm_uses_original() {
        let params = ExtractionParams::default();
        let input = Path::new("/data/mask.nii.gz");
        let smoothed = smooth(input, &params).unwrap();
        assert!(matches!(smoothed, SmoothedVolume::Original(_)));
        assert_eq!(smoothed.path(), input);
    }

    #[test]
    #[cfg(unix)]
    fn test_smoothing_copies_through_temp() {
        let dir = TempDir::new().unwrap();
        let cmd = write_script(dir.path(), "smoother", r#"cp "$2" "$3""#);
        let input = dir.path().join("mask.nii");
        fs::write(&input, b"fake volume bytes").unwrap();

        let smoothed = smooth(&input, &params_with(3.0, &cmd)).unwrap();
        let temp_path = smoothed.path().to_path_buf();
        assert_ne!(temp_path, input);
        assert_eq!(fs::read(&temp_path).unwrap(), b"fake volume bytes");

        drop(smoothed);
        assert!(!temp_path.exists(), "temp volume must be deleted on drop");
    }

    #[test]
    #[cfg(unix)]
    fn test_failing_smoother_surfaces_error_and_cleans_up() {
        let dir = TempDir::new().unwrap();
        let sidecar = dir.path().join("attempted-output");
        let cmd = write_script(
            dir.path(),
            "smoother",
            &format!(r#"echo "$3" > {}; echo boom >&2; exit 3"#, sidecar.display()),
        );
        let input = dir.path().join("mask.nii");
        fs::write(&input, b"x").unwrap();

        let err = smooth(&input, &params_with(2.0, &cmd)).unwrap_err();
        match err {
            SurfError::SmoothingFailed { stderr, .. } => assert!(stderr.contains("boom")),
            other => panic!("unexpected error: {:?}", other),
        }

        let attempted = fs::read_to_string(&sidecar).unwrap();
        assert!(!Path::new(attempted.trim()).exists());
    }

    #[test]
    fn test_missing_smoother_is_launch_error() {
        let params = ExtractionParams {
            fwhm: 1.0,
            smooth_cmd: "/nonexistent/volsmooth".to_string(),
            ..ExtractionParams::default()
        };
        let err = smooth(Path::new("/data/mask.nii"), &params).unwrap_err();
        assert!(matches!(err, SurfError::SmoothingLaunch { .. }));
    }
}
