use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Command, FromArgMatches as _};
use log::info;

use crate::error::EpiError;
use crate::execution_stats::{
    log_execution_statistics, print_execution_statistics, ExecutionProfilingCollector,
};
use crate::model::Model;
use crate::parallel::{run_trajectories, ExecutionMode, RunOptions, RunResults, SeedSchedule};
use crate::report::{write_reports, ReportOptions};

/// Command line arguments of the `compartmental` runner.
#[derive(Args, Debug)]
pub struct BaseArgs {
    /// Path of the JSON model description
    #[arg(short, long)]
    pub config: PathBuf,

    /// Base random seed
    #[arg(short, long, default_value = "0")]
    pub random_seed: u64,

    /// Number of trajectories to simulate
    #[arg(short, long, default_value = "1")]
    pub trajectories: usize,

    /// Number of worker threads; 1 runs sequentially
    #[arg(short, long, default_value = "1")]
    pub workers: usize,

    /// Seeds each trajectory may try before giving up on an acceptable one
    #[arg(long, default_value = "1")]
    pub seed_budget: u64,

    /// Number of best calibration results to report
    #[arg(long, default_value = "10")]
    pub fittest: usize,

    /// Directory for report output; reports are skipped without it
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Prefix for report file names
    #[arg(long, default_value = "")]
    pub file_prefix: String,

    /// Replace report files that already exist
    #[arg(long)]
    pub force_overwrite: bool,

    /// Log level, either global (`info`) or per module (`warn,compartmental::parallel=debug`)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Do not print the execution summary
    #[arg(long)]
    pub no_stats: bool,
}

fn create_cli() -> Command {
    let cli = Command::new("compartmental")
        .about("Simulate and calibrate stochastic compartmental epidemic models");
    BaseArgs::augment_args(cli)
}

/// Parses the process arguments and runs the model they name.
///
/// # Errors
///
/// Returns an error if argument parsing fails or the run does, see `run_with_args`.
pub fn run() -> Result<RunResults, Box<dyn std::error::Error>> {
    let matches = create_cli().get_matches();
    let args = BaseArgs::from_arg_matches(&matches)?;
    Ok(run_with_args(&args)?)
}

/// Loads the model, simulates every trajectory and writes the reports.
///
/// # Errors
///
/// `EpiError::EpiError` for an invalid log level, `EpiError::ConfigError` for an invalid model
/// or seed schedule, and any error of `Model::load`, `run_trajectories` or `write_reports`.
pub fn run_with_args(args: &BaseArgs) -> Result<RunResults, EpiError> {
    if let Some(spec) = &args.log_level {
        crate::log::configure_from_spec(spec)?;
    }
    let mut profiler = ExecutionProfilingCollector::new();

    info!("loading model from {}", args.config.display());
    let model = Arc::new(Model::load(&args.config)?);
    let options = RunOptions {
        trajectories: args.trajectories,
        schedule: SeedSchedule::Stride {
            base_seed: args.random_seed,
            budget: args.seed_budget,
        },
        mode: if args.workers > 1 {
            ExecutionMode::Parallel {
                workers: args.workers,
            }
        } else {
            ExecutionMode::Sequential
        },
    };
    let results = run_trajectories(Arc::clone(&model), &options)?;
    profiler.refresh();

    if let Some(output_dir) = &args.output_dir {
        let mut report_options = ReportOptions::new();
        report_options
            .directory(output_dir.clone())
            .file_prefix(args.file_prefix.as_str())
            .overwrite(args.force_overwrite);
        write_reports(&report_options, &model, &results, args.fittest)?;
    }

    let simulated = results.aggregator.len() as u64 + results.aggregator.discarded();
    let stats = profiler.compute_final_statistics(simulated);
    log_execution_statistics(&stats);
    if !args.no_stats {
        print_execution_statistics(&stats);
    }
    Ok(results)
}
