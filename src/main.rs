use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};

use binding_kinetics::config::{Calibration, INFO_FILE_NAME};
use binding_kinetics::pipeline::{ExperimentError, ExperimentInput, KineticsPipeline, PipelineSettings};
use binding_kinetics::report::{text_report, ExperimentReport, JSON_REPORT_NAME, TEXT_REPORT_NAME};
use binding_kinetics::trace_selection::trace_loader::{find_experiment_dirs, load_traces, TRACES_FILE_NAME};

/// Binding kinetics from single-molecule intensity traces
#[derive(Parser, Debug)]
#[command(name = "binding-kinetics")]
#[command(about = "Dwell and wait time constants from two-state intensity traces")]
struct Args {
    /// Root directory searched for experiments (directories holding traces.csv)
    root: PathBuf,

    /// Re-analyse experiments that already have a result file
    #[arg(long)]
    force: bool,

    /// Treat every trace as a selected spot and skip spot preselection
    #[arg(long)]
    preselected: bool,

    /// Maximum Baum-Welch iterations per trace
    #[arg(long, default_value = "100")]
    max_iterations: u32,
}

fn load_experiment(dir: &Path, preselected: bool) -> Result<ExperimentInput, ExperimentError> {
    let calibration = Calibration::load(&dir.join(INFO_FILE_NAME)).map_err(|error| ExperimentError::Calibration { error })?;
    let traces = load_traces(&dir.join(TRACES_FILE_NAME)).map_err(|error| ExperimentError::Loading { error })?;
    let name = dir.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| dir.display().to_string());

    Ok(ExperimentInput { name, traces, calibration, preselected })
}

fn write_reports(dir: &Path, report: &ExperimentReport) -> Result<()> {
    let text = text_report(report, &dir.display().to_string()).context("formatting text report")?;
    fs::write(dir.join(TEXT_REPORT_NAME), text)
        .with_context(|| format!("writing {} in {}", TEXT_REPORT_NAME, dir.display()))?;

    let json = report.to_json().context("serializing report")?;
    fs::write(dir.join(JSON_REPORT_NAME), json)
        .with_context(|| format!("writing {} in {}", JSON_REPORT_NAME, dir.display()))?;

    Ok(())
}

// Writes every successful report and returns how many experiments failed
fn save_results(experiment_dirs: &[PathBuf], results: Vec<Result<ExperimentReport, ExperimentError>>) -> usize {
    let mut failures = 0;

    for (dir, result) in experiment_dirs.iter().zip(results) {
        match result {
            Ok(report) => match write_reports(dir, &report) {
                Ok(()) => info!("{}: {} spots analysed", dir.display(), report.num_spots),
                Err(write_error) => {
                    failures += 1;
                    error!("{}: {:#}", dir.display(), write_error);
                }
            },
            Err(ExperimentError::Calibration { error: calibration_error }) => {
                failures += 1;
                error!("{}: invalid calibration, {}", dir.display(), calibration_error);
            }
            Err(other) => {
                failures += 1;
                error!("{}: {}", dir.display(), other);
            }
        }
    }

    failures
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let experiment_dirs: Vec<PathBuf> = find_experiment_dirs(&args.root)
        .with_context(|| format!("searching {}", args.root.display()))?
        .into_iter()
        .filter(|dir| args.force || !dir.join(TEXT_REPORT_NAME).exists())
        .collect();
    info!("Found {} experiments to analyse under {}", experiment_dirs.len(), args.root.display());

    let mut settings = PipelineSettings::default();
    settings.segment.max_iterations = args.max_iterations;
    let pipeline = KineticsPipeline::new(settings);

    let results = pipeline.run_batch(&experiment_dirs, |dir| load_experiment(dir, args.preselected))
        .into_iter()
        .map(|result| result.map(|outcome| ExperimentReport::from_outcome(&outcome)))
        .collect();
    let failures = save_results(&experiment_dirs, results);

    info!("Finished: {} succeeded, {} failed", experiment_dirs.len() - failures, failures);

    Ok(())
}
