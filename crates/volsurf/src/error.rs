//! Error types for surface extraction with rich diagnostics.
//!
//! This module provides comprehensive error handling with:
//! - Machine-readable error codes for programmatic handling
//! - Rich context (which input, which parameter, what went wrong)
//! - Recovery suggestions for common issues
//! - Terminal display via miette
//!
//! # Error Codes
//!
//! Each error has a unique code in the format `SURF-XXXX`:
//! - `SURF-1xxx`: Configuration errors (parameters, job pairing)
//! - `SURF-2xxx`: Preprocessing errors (external smoothing)
//! - `SURF-3xxx`: Extraction errors (degenerate or empty isosurfaces)
//! - `SURF-4xxx`: I/O errors (volume decoding, mesh writing)
//! - `SURF-5xxx`: Scheduling errors (aggregate run failures)

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias for surface extraction operations.
pub type SurfResult<T> = Result<T, SurfError>;

/// Machine-readable error codes for surface extraction operations.
///
/// Codes follow the pattern `SURF-XXXX` where:
/// - 1xxx = Configuration errors
/// - 2xxx = Preprocessing errors
/// - 3xxx = Extraction errors
/// - 4xxx = I/O errors
/// - 5xxx = Scheduling errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfErrorCode {
    /// SURF-1001: Invalid extraction parameters
    InvalidParams = 1001,
    /// SURF-1002: Input root missing or unreadable
    InputRootUnreadable = 1002,
    /// SURF-1003: Two inputs map to the same output path
    OutputCollision = 1003,

    /// SURF-2001: External smoothing tool reported failure
    SmoothingFailed = 2001,
    /// SURF-2002: External smoothing tool could not be launched
    SmoothingLaunch = 2002,

    /// SURF-3001: Isosurface level outside the volume's value range
    DegenerateIsosurface = 3001,
    /// SURF-3002: Extraction produced an empty surface
    EmptyIsosurface = 3002,

    /// SURF-4001: Failed to read volume file
    VolumeRead = 4001,
    /// SURF-4002: Failed to parse volume file
    VolumeParse = 4002,
    /// SURF-4003: Volume stores an unsupported scalar type
    UnsupportedDataType = 4003,
    /// SURF-4004: Failed to write output file
    IoWrite = 4004,

    /// SURF-5001: One or more jobs failed
    JobsFailed = 5001,
    /// SURF-5002: Worker pool construction failed
    PoolBuild = 5002,
}

impl SurfErrorCode {
    /// Returns the error code as a string in the format `SURF-XXXX`.
    pub fn as_str(&self) -> &'static str {
        match self {
            SurfErrorCode::InvalidParams => "SURF-1001",
            SurfErrorCode::InputRootUnreadable => "SURF-1002",
            SurfErrorCode::OutputCollision => "SURF-1003",
            SurfErrorCode::SmoothingFailed => "SURF-2001",
            SurfErrorCode::SmoothingLaunch => "SURF-2002",
            SurfErrorCode::DegenerateIsosurface => "SURF-3001",
            SurfErrorCode::EmptyIsosurface => "SURF-3002",
            SurfErrorCode::VolumeRead => "SURF-4001",
            SurfErrorCode::VolumeParse => "SURF-4002",
            SurfErrorCode::UnsupportedDataType => "SURF-4003",
            SurfErrorCode::IoWrite => "SURF-4004",
            SurfErrorCode::JobsFailed => "SURF-5001",
            SurfErrorCode::PoolBuild => "SURF-5002",
        }
    }
}

impl std::fmt::Display for SurfErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors that can occur during batch surface extraction.
///
/// Each error variant includes:
/// - A human-readable message
/// - A machine-readable error code
/// - A recovery suggestion when available
#[derive(Debug, Error, Diagnostic)]
pub enum SurfError {
    /// Invalid extraction parameters.
    #[error("invalid extraction parameters: {details}")]
    #[diagnostic(
        code(surf::params::invalid),
        help("Check parameter values: spacing > 0, step size >= 1, fwhm >= 0.")
    )]
    InvalidParams { details: String },

    /// Input root missing or unreadable.
    #[error("cannot read input root {path}: {details}")]
    #[diagnostic(
        code(surf::pairing::input_root),
        help("Check that the input directory exists and is readable.")
    )]
    InputRootUnreadable { path: PathBuf, details: String },

    /// Two distinct inputs map to the same output path.
    #[error("inputs {first} and {second} both map to output {output}")]
    #[diagnostic(
        code(surf::pairing::collision),
        help(
            "Distinct input files must produce distinct outputs. Use a more specific glob pattern or rename the conflicting inputs."
        )
    )]
    OutputCollision {
        output: PathBuf,
        first: PathBuf,
        second: PathBuf,
    },

    /// External smoothing tool exited with a failure status.
    #[error("preprocessing failed: {command} exited with {status}")]
    #[diagnostic(
        code(surf::smooth::failed),
        help("Inspect the smoother's stderr output and verify the input volume is valid.")
    )]
    SmoothingFailed {
        command: String,
        status: String,
        stderr: String,
    },

    /// External smoothing tool could not be launched.
    #[error("failed to launch smoothing command {command:?}")]
    #[diagnostic(
        code(surf::smooth::launch),
        help("Check that the smoothing tool is installed and on PATH, or pass --smooth-cmd.")
    )]
    SmoothingLaunch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Requested isosurface level lies outside the volume's value range.
    #[error(
        "degenerate isosurface: level {level} outside volume range [{min}, {max}]"
    )]
    #[diagnostic(
        code(surf::extract::degenerate),
        help(
            "The level must lie strictly between the volume's minimum and maximum. For binary masks a level of 0.5 is typical."
        )
    )]
    DegenerateIsosurface { level: f32, min: f32, max: f32 },

    /// Extraction produced no surface.
    #[error("isosurface extraction produced an empty surface")]
    #[diagnostic(
        code(surf::extract::empty),
        help(
            "The volume may contain no region crossing the requested level, or the step size may be too coarse for the structure."
        )
    )]
    EmptyIsosurface,

    /// Error reading a volume file.
    #[error("failed to read volume from {path}")]
    #[diagnostic(
        code(surf::volume::read),
        help("Check that the file exists and is readable.")
    )]
    VolumeRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error parsing a volume file.
    #[error("failed to parse volume from {path}: {details}")]
    #[diagnostic(
        code(surf::volume::parse),
        help("The file may be corrupted or not a NIfTI-1 volume.")
    )]
    VolumeParse { path: PathBuf, details: String },

    /// Volume stores a scalar type this pipeline does not decode.
    #[error("volume {path} uses unsupported data type code {code}")]
    #[diagnostic(
        code(surf::volume::datatype),
        help("Supported types: uint8, int8, int16, uint16, int32, uint32, float32, float64.")
    )]
    UnsupportedDataType { path: PathBuf, code: i16 },

    /// Error writing an output file.
    #[error("failed to write {path}")]
    #[diagnostic(
        code(surf::io::write),
        help("Check that the output directory exists and is writable.")
    )]
    IoWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// One or more jobs in a batch run failed.
    #[error("{failed} of {total} jobs failed; first failure: {input}")]
    #[diagnostic(
        code(surf::run::jobs_failed),
        help("Each failing job was logged individually; see the log output above.")
    )]
    JobsFailed {
        failed: usize,
        total: usize,
        input: PathBuf,
        #[source]
        source: Box<SurfError>,
    },

    /// Worker pool could not be constructed.
    #[error("failed to build worker pool: {details}")]
    #[diagnostic(code(surf::run::pool))]
    PoolBuild { details: String },
}

impl SurfError {
    /// Returns the machine-readable error code.
    pub fn code(&self) -> SurfErrorCode {
        match self {
            SurfError::InvalidParams { .. } => SurfErrorCode::InvalidParams,
            SurfError::InputRootUnreadable { .. } => SurfErrorCode::InputRootUnreadable,
            SurfError::OutputCollision { .. } => SurfErrorCode::OutputCollision,
            SurfError::SmoothingFailed { .. } => SurfErrorCode::SmoothingFailed,
            SurfError::SmoothingLaunch { .. } => SurfErrorCode::SmoothingLaunch,
            SurfError::DegenerateIsosurface { .. } => SurfErrorCode::DegenerateIsosurface,
            SurfError::EmptyIsosurface => SurfErrorCode::EmptyIsosurface,
            SurfError::VolumeRead { .. } => SurfErrorCode::VolumeRead,
            SurfError::VolumeParse { .. } => SurfErrorCode::VolumeParse,
            SurfError::UnsupportedDataType { .. } => SurfErrorCode::UnsupportedDataType,
            SurfError::IoWrite { .. } => SurfErrorCode::IoWrite,
            SurfError::JobsFailed { .. } => SurfErrorCode::JobsFailed,
            SurfError::PoolBuild { .. } => SurfErrorCode::PoolBuild,
        }
    }

    /// Returns a recovery suggestion for this error.
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            SurfError::InvalidParams { .. } => {
                "Adjust the offending parameter; run with --help for valid ranges"
            }
            SurfError::InputRootUnreadable { .. } => {
                "Verify the input directory path and its permissions"
            }
            SurfError::OutputCollision { .. } => {
                "Narrow the glob pattern or rename inputs so outputs are distinct"
            }
            SurfError::SmoothingFailed { .. } => {
                "Run the smoothing command by hand on the failing volume to see its full output"
            }
            SurfError::SmoothingLaunch { .. } => {
                "Install the smoothing tool or point --smooth-cmd at an existing one"
            }
            SurfError::DegenerateIsosurface { .. } => {
                "Pick a level strictly inside the volume's value range, or omit --level for the midpoint default"
            }
            SurfError::EmptyIsosurface => {
                "Lower the step size or check that the mask is non-empty"
            }
            SurfError::VolumeRead { .. } => "Check the file path and permissions",
            SurfError::VolumeParse { .. } => {
                "Verify the file is a NIfTI-1 volume; re-export it if it was converted"
            }
            SurfError::UnsupportedDataType { .. } => {
                "Convert the volume to a supported scalar type (e.g. uint8 or float32)"
            }
            SurfError::IoWrite { .. } => "Check free space and write permissions on the output directory",
            SurfError::JobsFailed { .. } => "Re-run after fixing the failing inputs; successes are kept",
            SurfError::PoolBuild { .. } => "Try an explicit --threads value",
        }
    }

    // Constructor helpers for common error patterns

    /// Create an InvalidParams error.
    pub fn invalid_params(details: impl Into<String>) -> Self {
        SurfError::InvalidParams {
            details: details.into(),
        }
    }

    /// Create a VolumeRead error.
    pub fn volume_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SurfError::VolumeRead {
            path: path.into(),
            source,
        }
    }

    /// Create a VolumeParse error.
    pub fn volume_parse(path: impl Into<PathBuf>, details: impl Into<String>) -> Self {
        SurfError::VolumeParse {
            path: path.into(),
            details: details.into(),
        }
    }

    /// Create an IoWrite error.
    pub fn io_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SurfError::IoWrite {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = SurfError::invalid_params("step size must be >= 1");
        assert_eq!(err.code(), SurfErrorCode::InvalidParams);
        assert_eq!(err.code().as_str(), "SURF-1001");

        let err = SurfError::DegenerateIsosurface {
            level: 2.0,
            min: 0.0,
            max: 1.0,
        };
        assert_eq!(err.code().as_str(), "SURF-3001");
    }

    #[test]
    fn test_error_display() {
        let err = SurfError::DegenerateIsosurface {
            level: 2.0,
            min: 0.0,
            max: 1.0,
        };
        let display = format!("{}", err);
        assert!(display.contains("level 2"));
        assert!(display.contains("[0, 1]"));
    }

    #[test]
    fn test_jobs_failed_carries_representative() {
        let inner = SurfError::EmptyIsosurface;
        let err = SurfError::JobsFailed {
            failed: 1,
            total: 4,
            input: PathBuf::from("sub-01/mask.nii.gz"),
            source: Box::new(inner),
        };
        assert_eq!(err.code(), SurfErrorCode::JobsFailed);
        assert!(format!("{}", err).contains("1 of 4"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_recovery_suggestions_nonempty() {
        let err = SurfError::EmptyIsosurface;
        assert!(!err.recovery_suggestion().is_empty());
    }
}
