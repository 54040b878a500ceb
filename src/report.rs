//! CSV reports of a finished run.
//!
//! Every report goes to `<output_dir>/<file_prefix><report>.csv`. Existing files are only
//! replaced when the options allow it.
use std::fs::{create_dir_all, File};
use std::path::PathBuf;

use csv::Writer;
use log::info;
use serde::Serialize;

use crate::calibration::Calibration;
use crate::error::EpiError;
use crate::model::Model;
use crate::parallel::RunResults;
use crate::statistics::OutcomeAggregator;
use crate::trajectory::TrajectoryHistory;

pub const CLASS_COUNTS: &str = "class_counts";
pub const TRAJECTORY_OUTCOMES: &str = "trajectory_outcomes";
pub const OUTCOME_SUMMARY: &str = "outcome_summary";
pub const CALIBRATION_FITTEST: &str = "calibration_fittest";
pub const CALIBRATION_OBSERVATIONS: &str = "calibration_observations";

#[derive(Clone, Debug)]
pub struct ReportOptions {
    pub output_dir: PathBuf,
    pub file_prefix: String,
    pub overwrite: bool,
}

impl Default for ReportOptions {
    fn default() -> Self {
        ReportOptions {
            output_dir: PathBuf::from("."),
            file_prefix: String::new(),
            overwrite: false,
        }
    }
}

impl ReportOptions {
    #[must_use]
    pub fn new() -> Self {
        ReportOptions::default()
    }

    pub fn directory(&mut self, output_dir: impl Into<PathBuf>) -> &mut Self {
        self.output_dir = output_dir.into();
        self
    }

    pub fn file_prefix(&mut self, file_prefix: impl Into<String>) -> &mut Self {
        self.file_prefix = file_prefix.into();
        self
    }

    pub fn overwrite(&mut self, overwrite: bool) -> &mut Self {
        self.overwrite = overwrite;
        self
    }

    #[must_use]
    pub fn path(&self, report: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}{report}.csv", self.file_prefix))
    }
}

// Creates the output directory if needed and opens the report file, refusing to clobber an
// existing one unless overwriting is allowed.
fn generate_validate_filepath(
    options: &ReportOptions,
    report: &str,
) -> Result<(File, PathBuf), EpiError> {
    let path = options.path(report);
    create_dir_all(&options.output_dir)?;
    if path.exists() && !options.overwrite {
        return Err(EpiError::ReportError(format!(
            "{} already exists; allow overwriting to replace it",
            path.display()
        )));
    }
    let file = File::create(&path)?;
    Ok((file, path))
}

fn open(options: &ReportOptions, report: &str) -> Result<(Writer<File>, PathBuf), EpiError> {
    let (file, path) = generate_validate_filepath(options, report)?;
    Ok((Writer::from_writer(file), path))
}

/// One row per recorded snapshot: trajectory id, step, epidemic time (empty before it starts),
/// then one column per class.
///
/// # Errors
///
/// `EpiError::ReportError` if the file exists and may not be replaced; I/O and CSV errors
/// otherwise.
pub fn write_class_counts(
    options: &ReportOptions,
    class_names: &[&str],
    histories: &[(usize, TrajectoryHistory)],
) -> Result<PathBuf, EpiError> {
    let (mut writer, path) = open(options, CLASS_COUNTS)?;
    let mut header = vec!["trajectory", "step", "epidemic_time"];
    header.extend_from_slice(class_names);
    writer.write_record(&header)?;
    for (id, history) in histories {
        for snapshot in history.snapshots() {
            let mut record = vec![
                id.to_string(),
                snapshot.step.to_string(),
                snapshot
                    .epidemic_time
                    .map(|t| t.to_string())
                    .unwrap_or_default(),
            ];
            record.extend(snapshot.counts.iter().map(u64::to_string));
            writer.write_record(&record)?;
        }
    }
    writer.flush()?;
    Ok(path)
}

/// One row per accepted trajectory, ordered by id.
///
/// # Errors
///
/// See `write_class_counts`.
pub fn write_trajectory_outcomes(
    options: &ReportOptions,
    class_names: &[&str],
    aggregator: &OutcomeAggregator,
) -> Result<PathBuf, EpiError> {
    let (mut writer, path) = open(options, TRAJECTORY_OUTCOMES)?;
    let mut header: Vec<String> = [
        "trajectory",
        "seed",
        "steps",
        "epidemic_time",
        "eradicated",
        "total_cost",
        "total_health",
    ]
    .iter()
    .map(ToString::to_string)
    .collect();
    header.extend(class_names.iter().map(|c| format!("cumulative_incidence:{c}")));
    header.extend(class_names.iter().map(|c| format!("final_count:{c}")));
    writer.write_record(&header)?;

    for outcome in aggregator.outcomes() {
        let mut record = vec![
            outcome.id.to_string(),
            outcome.seed.to_string(),
            outcome.steps.to_string(),
            outcome.epidemic_time.to_string(),
            outcome.eradicated.to_string(),
            outcome.total_cost.to_string(),
            outcome.total_health.to_string(),
        ];
        record.extend(outcome.cumulative_incidence.iter().map(u64::to_string));
        record.extend(outcome.final_counts.iter().map(u64::to_string));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(path)
}

#[derive(Serialize)]
struct SummaryRow<'a> {
    measure: &'a str,
    count: usize,
    mean: f64,
    st_dev: f64,
    min: f64,
    max: f64,
    lower: f64,
    upper: f64,
}

/// Mean, standard deviation, range and percentile interval of every outcome measure.
///
/// # Errors
///
/// See `write_class_counts`.
pub fn write_outcome_summary(
    options: &ReportOptions,
    class_names: &[&str],
    aggregator: &OutcomeAggregator,
) -> Result<PathBuf, EpiError> {
    let (mut writer, path) = open(options, OUTCOME_SUMMARY)?;
    for (measure, summary) in &aggregator.summaries(class_names) {
        writer.serialize(SummaryRow {
            measure,
            count: summary.count,
            mean: summary.mean,
            st_dev: summary.st_dev,
            min: summary.min,
            max: summary.max,
            lower: summary.lower,
            upper: summary.upper,
        })?;
    }
    writer.flush()?;
    Ok(path)
}

/// The `k` best scored results: rank, trajectory id, seed, fit, then the calibrated parameters.
///
/// # Errors
///
/// See `write_class_counts`.
pub fn write_calibration_fittest(
    options: &ReportOptions,
    parameter_names: &[&str],
    calibration: &Calibration,
    k: usize,
) -> Result<PathBuf, EpiError> {
    let (mut writer, path) = open(options, CALIBRATION_FITTEST)?;
    let mut header = vec!["rank", "trajectory", "seed", "fit"];
    header.extend_from_slice(parameter_names);
    writer.write_record(&header)?;
    for (rank, result) in calibration.select_fittest(k).iter().enumerate() {
        let mut record = vec![
            (rank + 1).to_string(),
            result.id.to_string(),
            result.seed.to_string(),
            result.fit.to_string(),
        ];
        record.extend(result.parameter_draw.iter().map(f64::to_string));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(path)
}

/// Observations of the `k` best results, one row per observation period, one column per target
/// with positive weight.
///
/// # Errors
///
/// See `write_class_counts`.
pub fn write_calibration_observations(
    options: &ReportOptions,
    calibration: &Calibration,
    k: usize,
) -> Result<PathBuf, EpiError> {
    let (mut writer, path) = open(options, CALIBRATION_OBSERVATIONS)?;
    let mut header = vec!["trajectory", "period"];
    header.extend(calibration.active_channel_names());
    writer.write_record(&header)?;
    let channels: Vec<usize> = calibration
        .targets()
        .iter()
        .filter(|t| t.is_active())
        .map(|t| t.channel)
        .collect();
    for result in calibration.select_fittest(k) {
        for (period, row) in result.observations.iter().enumerate() {
            let mut record = vec![result.id.to_string(), period.to_string()];
            record.extend(channels.iter().map(|&c| {
                row.get(c).map(f64::to_string).unwrap_or_default()
            }));
            writer.write_record(&record)?;
        }
    }
    writer.flush()?;
    Ok(path)
}

/// Writes every report that `results` has data for and returns the paths written.
///
/// # Errors
///
/// The first error of any report.
pub fn write_reports(
    options: &ReportOptions,
    model: &Model,
    results: &RunResults,
    fittest: usize,
) -> Result<Vec<PathBuf>, EpiError> {
    let class_names = model.class_names();
    let mut written = vec![
        write_trajectory_outcomes(options, &class_names, &results.aggregator)?,
        write_outcome_summary(options, &class_names, &results.aggregator)?,
    ];
    if model.settings().record_history {
        written.push(write_class_counts(options, &class_names, &results.histories)?);
    }
    if let Some(calibration) = &results.calibration {
        let parameter_names = model.parameters().calibration_names();
        written.push(write_calibration_fittest(
            options,
            &parameter_names,
            calibration,
            fittest,
        )?);
        written.push(write_calibration_observations(options, calibration, fittest)?);
    }
    for path in &written {
        info!("wrote {}", path.display());
    }
    Ok(written)
}
