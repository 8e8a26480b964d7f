//! volsurf: batch surface extraction for directories of 3-D volumes.
//!
//! Discovers volumes under an input directory, extracts an isosurface from
//! each, maps vertices into world space through the volume's affine, and
//! writes one OBJ mesh per input under the output directory.
//!
//! # Logging
//!
//! Set the `RUST_LOG` environment variable to control log output:
//! - `RUST_LOG=volsurf=info` - Per-job completion logging
//! - `RUST_LOG=volsurf=debug` - Detailed extraction logging
//! - `RUST_LOG=volsurf::timing=debug` - Performance timing
//!
//! # Example
//!
//! ```bash
//! # Extract every mask under /incoming with default settings
//! volsurf /incoming /outgoing
//!
//! # Coarser, smoothed extraction with explicit threshold
//! volsurf /incoming /outgoing -s 2 -f 3.0 -l 0.5 -m marching-tetrahedra
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use colored::Colorize;
use serde::Serialize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use volsurf::{pair_jobs, run_all, ExtractionParams, Method, RunSummary, SurfError};

/// volsurf - batch isosurface extraction.
///
/// Convert directories of 3-D label volumes (NIfTI-1) into OBJ surface
/// meshes, one per matched input.
#[derive(Parser)]
#[command(name = "volsurf")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory containing the input volumes
    input_dir: PathBuf,

    /// Directory the output meshes are written under
    output_dir: PathBuf,

    /// Voxel spacing in spatial dimensions corresponding to array indexing
    /// dimensions (M,N,P)
    #[arg(long, default_value = "1,1,1", value_parser = parse_spacing)]
    spacing: Spacing,

    /// Step size in voxels. Larger steps yield faster but coarser results
    #[arg(short = 's', long, default_value_t = 1)]
    step_size: usize,

    /// Isosurface extraction algorithm
    #[arg(short = 'm', long, default_value = "surface-nets")]
    method: MethodArg,

    /// Glob pattern for input file discovery, relative to the input directory
    #[arg(short = 'p', long, default_value = "**/*.nii.gz")]
    pattern: String,

    /// Isosurface threshold; defaults to the midpoint of each volume's
    /// min/max values
    #[arg(short = 'l', long)]
    level: Option<f32>,

    /// Gaussian smoothing FWHM applied before extraction; 0 disables
    #[arg(short = 'f', long, default_value_t = 3.0)]
    fwhm: f64,

    /// External smoothing command, invoked as `<cmd> <fwhm> <input> <output>`
    #[arg(long, default_value = "volsmooth")]
    smooth_cmd: String,

    /// File suffix for output meshes
    #[arg(long, default_value = ".obj")]
    suffix: String,

    /// Worker thread count; defaults to the number of logical CPUs
    #[arg(long)]
    threads: Option<usize>,

    /// Output format for the run summary
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Suppress all non-error output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Increase output verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for scripting
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum MethodArg {
    /// Surface nets (fast, quad-derived triangles)
    SurfaceNets,
    /// Marching tetrahedra (denser, strictly tetrahedral cases)
    MarchingTetrahedra,
}

impl From<MethodArg> for Method {
    fn from(arg: MethodArg) -> Self {
        match arg {
            MethodArg::SurfaceNets => Method::SurfaceNets,
            MethodArg::MarchingTetrahedra => Method::MarchingTetrahedra,
        }
    }
}

#[derive(Clone)]
struct Spacing([f64; 3]);

fn parse_spacing(raw: &str) -> Result<Spacing, String> {
    let parts: Vec<&str> = raw.split(',').collect();
    if parts.len() != 3 {
        return Err(format!("expected three comma-separated values, got {:?}", raw));
    }
    let mut spacing = [0.0f64; 3];
    for (slot, part) in spacing.iter_mut().zip(&parts) {
        *slot = part
            .trim()
            .parse()
            .map_err(|e| format!("invalid spacing component {:?}: {}", part, e))?;
    }
    Ok(Spacing(spacing))
}

#[derive(Serialize)]
struct RunReport {
    total: usize,
    written: Vec<String>,
}

/// Initialize the tracing subscriber based on verbosity level.
fn init_tracing(verbose: u8, quiet: bool) {
    if quiet {
        return;
    }

    // RUST_LOG wins over the -v flags when set.
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match verbose {
            0 => "volsurf=warn",
            1 => "volsurf=info",
            2 => "volsurf=debug",
            _ => "trace",
        };
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .with(filter)
        .init();
}

fn run(cli: &Cli) -> Result<RunSummary> {
    let params = ExtractionParams {
        level: cli.level,
        spacing: cli.spacing.0,
        step_size: cli.step_size,
        method: cli.method.into(),
        fwhm: cli.fwhm,
        smooth_cmd: cli.smooth_cmd.clone(),
    };
    params.validate().context("invalid command-line parameters")?;

    let jobs = pair_jobs(&cli.input_dir, &cli.output_dir, &cli.pattern, &cli.suffix)
        .context("failed to discover input volumes")?;

    run_all(&jobs, &params, cli.threads).map_err(Into::into)
}

fn main() -> Result<()> {
    // Install miette's panic hook for better error display in development
    #[cfg(debug_assertions)]
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match run(&cli) {
        Ok(summary) => {
            let report = RunReport {
                total: summary.total,
                written: summary
                    .written
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect(),
            };
            match cli.format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                }
                OutputFormat::Text => {
                    if !cli.quiet {
                        println!(
                            "{} {} of {} meshes written to {}",
                            "Done:".green().bold(),
                            report.written.len(),
                            report.total,
                            cli.output_dir.display()
                        );
                    }
                }
            }
            Ok(())
        }
        Err(e) => {
            if !cli.quiet {
                if let Some(surf_err) = e.downcast_ref::<SurfError>() {
                    eprintln!("{}: {}", "Error".red().bold(), surf_err);
                    eprintln!("  {}: {}", "Code".cyan(), surf_err.code());
                    eprintln!(
                        "  {}: {}",
                        "Suggestion".green(),
                        surf_err.recovery_suggestion()
                    );
                } else {
                    eprintln!("{}: {}", "Error".red().bold(), e);
                    for cause in e.chain().skip(1) {
                        eprintln!("  {}: {}", "Caused by".yellow(), cause);
                    }
                }
            }
            std::process::exit(1);
        }
    }
}
