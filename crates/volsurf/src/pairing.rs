//! Job discovery: pair input volumes with their output mesh paths.
//!
//! Walks the input root, matches files against a glob pattern, and derives
//! one output path per match by re-rooting the relative path under the output
//! root and swapping the extension for the configured suffix. Two inputs
//! mapping to the same output is a configuration error, caught here before
//! any job runs.

use std::path::{Path, PathBuf};

use globset::Glob;
use hashbrown::HashMap;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{SurfError, SurfResult};
use crate::types::Job;

/// Discover all inputs under `input_root` matching `pattern` and pair each
/// with an output path under `output_root` carrying `suffix` (e.g. `".obj"`).
///
/// The glob is matched against the path relative to the input root, so
/// `**/*.nii.gz` behaves like a recursive shell glob rooted at `input_root`.
pub fn pair_jobs(
    input_root: &Path,
    output_root: &Path,
    pattern: &str,
    suffix: &str,
) -> SurfResult<Vec<Job>> {
    if !input_root.is_dir() {
        return Err(SurfError::InputRootUnreadable {
            path: input_root.to_path_buf(),
            details: "not a directory".to_string(),
        });
    }

    let matcher = Glob::new(pattern)
        .map_err(|e| SurfError::invalid_params(format!("invalid glob pattern {:?}: {}", pattern, e)))?
        .compile_matcher();

    let mut jobs = Vec::new();
    let mut seen: HashMap<PathBuf, PathBuf> = HashMap::new();

    for entry in WalkDir::new(input_root).sort_by_file_name() {
        let entry = entry.map_err(|e| SurfError::InputRootUnreadable {
            path: input_root.to_path_buf(),
            details: e.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(input_root)
            .expect("walked entries live under the input root");
        if !matcher.is_match(relative) {
            continue;
        }

        let output = output_root.join(swap_suffix(relative, suffix));
        if let Some(first) = seen.insert(output.clone(), entry.path().to_path_buf()) {
            return Err(SurfError::OutputCollision {
                output,
                first,
                second: entry.into_path(),
            });
        }

        debug!(input = ?entry.path(), output = ?output, "Paired job");
        jobs.push(Job {
            input: entry.into_path(),
            output,
        });
    }

    info!(
        count = jobs.len(),
        pattern, "Discovered inputs under {:?}", input_root
    );
    Ok(jobs)
}

/// Replace everything from the first dot of the file name with `suffix`,
/// so `mask.nii.gz` becomes `mask.obj` rather than `mask.nii.obj`.
fn swap_suffix(relative: &Path, suffix: &str) -> PathBuf {
    let name = relative
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let stem = name.split('.').next().unwrap_or(name);
    relative.with_file_name(format!("{}{}", stem, suffix))
}
