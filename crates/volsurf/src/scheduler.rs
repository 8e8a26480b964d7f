//! Concurrent execution of independent extraction jobs.
//!
//! Jobs run on a fixed-size rayon pool built once per run and sized to the
//! logical CPUs available to the process (overridable). Every submitted job
//! runs to a terminal outcome: one job failing never cancels or blocks its
//! siblings. After all outcomes are collected the aggregate result is decided
//! from the set of outcomes alone — any failure makes the whole run fail,
//! carrying a representative error so partial success is never silent.

use rayon::prelude::*;
use std::path::PathBuf;

use tracing::{info, warn};

use crate::error::{SurfError, SurfResult};
use crate::runner::{run_job, JobOutcome};
use crate::types::{ExtractionParams, Job};

/// Aggregate result of a fully successful run.
#[derive(Debug)]
pub struct RunSummary {
    /// Number of jobs submitted.
    pub total: usize,
    /// Output paths written, one per job.
    pub written: Vec<PathBuf>,
}

/// Run every job to completion and aggregate the outcomes.
///
/// `threads` overrides the pool size; `None` uses the logical CPU count.
/// Returns [`SurfError::JobsFailed`] if any job failed, after all jobs have
/// reached a terminal state.
pub fn run_all(
    jobs: &[Job],
    params: &ExtractionParams,
    threads: Option<usize>,
) -> SurfResult<RunSummary> {
    params.validate()?;

    if jobs.is_empty() {
        warn!("No jobs to run; nothing matched the input pattern");
        return Ok(RunSummary {
            total: 0,
            written: Vec::new(),
        });
    }

    let threads = threads.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    });
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| SurfError::PoolBuild {
            details: e.to_string(),
        })?;

    info!(jobs = jobs.len(), threads, "Starting extraction run");

    let outcomes: Vec<JobOutcome> =
        pool.install(|| jobs.par_iter().map(|job| run_job(job, params)).collect());

    summarize(outcomes)
}

/// Decide the aggregate result from the full set of outcomes.
///
/// Order-independent: only the multiset of outcomes matters. Failures were
/// already logged as they happened inside [`run_job`].
fn summarize(outcomes: Vec<JobOutcome>) -> SurfResult<RunSummary> {
    let total = outcomes.len();
    let mut written = Vec::with_capacity(total);
    let mut failures = Vec::new();

    for outcome in outcomes {
        match outcome.result {
            Ok(output) => written.push(output),
            Err(err) => failures.push((outcome.job.input, err)),
        }
    }

    info!(
        total,
        succeeded = written.len(),
        failed = failures.len(),
        "Extraction run finished"
    );

    let failed = failures.len();
    match failures.into_iter().next() {
        Some((input, source)) => Err(SurfError::JobsFailed {
            failed,
            total,
            input,
            source: Box::new(source),
        }),
        None => Ok(RunSummary { total, written }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SurfErrorCode;

    fn outcome(input: &str, result: Result<PathBuf, SurfError>) -> JobOutcome {
        JobOutcome {
            job: Job {
                input: PathBuf::from(input),
                output: PathBuf::from(format!("{}.obj", input)),
            },
            result,
        }
    }

    #[test]
    fn test_all_success() {
        let outcomes = vec![
            outcome("a.nii", Ok(PathBuf::from("a.obj"))),
            outcome("b.nii", Ok(PathBuf::from("b.obj"))),
        ];
        let summary = summarize(outcomes).unwrap();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.written.len(), 2);
    }

    #[test]
    fn test_single_failure_fails_the_run() {
        let outcomes = vec![
            outcome("a.nii", Ok(PathBuf::from("a.obj"))),
            outcome("b.nii", Err(SurfError::EmptyIsosurface)),
            outcome("c.nii", Ok(PathBuf::from("c.obj"))),
        ];
        let err = summarize(outcomes).unwrap_err();
        match err {
            SurfError::JobsFailed {
                failed,
                total,
                input,
                ..
            } => {
                assert_eq!(failed, 1);
                assert_eq!(total, 3);
                assert_eq!(input, PathBuf::from("b.nii"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_failure_decision_is_order_independent() {
        let make = |flip: bool| {
            let mut outcomes = vec![
                outcome("a.nii", Ok(PathBuf::from("a.obj"))),
                outcome("b.nii", Err(SurfError::EmptyIsosurface)),
            ];
            if flip {
                outcomes.reverse();
            }
            outcomes
        };
        for flip in [false, true] {
            let err = summarize(make(flip)).unwrap_err();
            assert_eq!(err.code(), SurfErrorCode::JobsFailed);
        }
    }

    #[test]
    fn test_empty_job_list_is_trivial_success() {
        let params = ExtractionParams::default();
        let summary = run_all(&[], &params, Some(2)).unwrap();
        assert_eq!(summary.total, 0);
        assert!(summary.written.is_empty());
    }

    #[test]
    fn test_invalid_params_rejected_before_running() {
        let params = ExtractionParams {
            step_size: 0,
            ..ExtractionParams::default()
        };
        let err = run_all(&[], &params, None).unwrap_err();
        assert_eq!(err.code(), SurfErrorCode::InvalidParams);
    }
}
