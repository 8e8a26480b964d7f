//! Per-job pipeline: smooth, load, extract, map to world space, write.

use std::path::PathBuf;

use tracing::{error, info};

use crate::error::SurfError;
use crate::extract::extract;
use crate::io::save_surface;
use crate::smooth::smooth;
use crate::tracing_ext::OperationTimer;
use crate::transform::to_world;
use crate::types::{ExtractionParams, Job};
use crate::volume::load_volume;

/// Terminal state of one job: the written output path, or the job identity
/// with the error that stopped it.
#[derive(Debug)]
pub struct JobOutcome {
    /// The job this outcome belongs to.
    pub job: Job,
    /// Written output path on success, pipeline error on failure.
    pub result: Result<PathBuf, SurfError>,
}

impl JobOutcome {
    /// Whether the job wrote its mesh.
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Run the full pipeline for one job.
///
/// Every failure is captured in the returned outcome; nothing escapes to
/// sibling jobs. The smoothed temporary volume (if any) is dropped — and its
/// file deleted — before this function returns, whether extraction succeeded
/// or not.
pub fn run_job(job: &Job, params: &ExtractionParams) -> JobOutcome {
    let _timer = OperationTimer::new("job");
    let result = execute(job, params);

    match &result {
        Ok(output) => info!("Completed: {} => {}", job.input.display(), output.display()),
        Err(err) => error!(
            code = %err.code(),
            "Job failed for {}: {}",
            job.input.display(),
            err
        ),
    }

    JobOutcome {
        job: job.clone(),
        result,
    }
}

fn execute(job: &Job, params: &ExtractionParams) -> Result<PathBuf, SurfError> {
    let smoothed = smooth(&job.input, params)?;
    let volume = load_volume(smoothed.path())?;
    let geometry = extract(&volume, params)?;
    drop(smoothed);

    let mesh = to_world(geometry, &volume.affine);
    save_surface(&mesh, &job.output)?;
    Ok(job.output.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Matrix4;
    use tempfile::TempDir;

    use crate::types::Method;
    use crate::volume::save_volume;
    use crate::Volume;

    fn sphere_volume(size: usize, radius: f64) -> Volume {
        let center = (size as f64 - 1.0) / 2.0;
        let mut data = vec![0.0f32; size * size * size];
        for z in 0..size {
            for y in 0..size {
                for x in 0..size {
                    let dx = x as f64 - center;
                    let dy = y as f64 - center;
                    let dz = z as f64 - center;
                    if dx * dx + dy * dy + dz * dz <= radius * radius {
                        data[x + y * size + z * size * size] = 1.0;
                    }
                }
            }
        }
        Volume::new([size, size, size], data, Matrix4::identity()).unwrap()
    }

    fn params() -> ExtractionParams {
        ExtractionParams {
            level: Some(0.5),
            method: Method::MarchingTetrahedra,
            ..ExtractionParams::default()
        }
    }

    #[test]
    fn test_successful_job_writes_mesh() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("sphere.nii.gz");
        save_volume(&sphere_volume(20, 6.0), &input).unwrap();

        let job = Job {
            input,
            output: dir.path().join("out/sphere.obj"),
        };
        let outcome = run_job(&job, &params());
        assert!(outcome.is_success(), "{:?}", outcome.result);
        assert!(job.output.exists());
    }

    #[test]
    fn test_corrupt_input_becomes_failure_outcome() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("corrupt.nii");
        std::fs::write(&input, b"not a volume at all").unwrap();

        let job = Job {
            input: input.clone(),
            output: dir.path().join("corrupt.obj"),
        };
        let outcome = run_job(&job, &params());
        assert!(!outcome.is_success());
        assert_eq!(outcome.job.input, input);
        assert!(!job.output.exists());
    }

    #[test]
    #[cfg(unix)]
    fn test_failed_extraction_removes_smoothed_temp() {
        use std::fs;
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        // Uniform volume: smoothing succeeds, extraction is degenerate.
        let input = dir.path().join("flat.nii");
        save_volume(
            &Volume::new([6, 6, 6], vec![1.0; 216], Matrix4::identity()).unwrap(),
            &input,
        )
        .unwrap();

        let sidecar = dir.path().join("temp-path");
        let script = dir.path().join("smoother");
        fs::write(
            &script,
            format!("#!/bin/sh\necho \"$3\" > {}\ncp \"$2\" \"$3\"\n", sidecar.display()),
        )
        .unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let mut p = params();
        p.fwhm = 2.0;
        p.smooth_cmd = script.to_string_lossy().into_owned();

        let job = Job {
            input,
            output: dir.path().join("flat.obj"),
        };
        let outcome = run_job(&job, &p);
        assert!(!outcome.is_success());

        let temp_path = fs::read_to_string(&sidecar).unwrap();
        assert!(
            !std::path::Path::new(temp_path.trim()).exists(),
            "smoothed temp must not outlive the job"
        );
    }
}
