//! Running many trajectories of one model, one after another or on a pool of worker threads.
//!
//! Every worker owns its `Epidemic` and its random streams; the only shared state is the
//! `ResultsBuffer`, and every append to it holds its lock. Seeds come from a `SeedSchedule`, so
//! the set of results does not depend on how trajectories were spread over workers.
use std::sync::{Arc, Mutex};
use std::thread;

use log::{debug, info, warn};

use crate::calibration::Calibration;
use crate::epidemic::Epidemic;
use crate::error::{config_error, EpiError};
use crate::model::{IntendedUse, Model};
use crate::statistics::OutcomeAggregator;
use crate::trajectory::TrajectoryHistory;

/// How the seed range of each trajectory is chosen.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SeedSchedule {
    /// Trajectory `i` tries the seeds `base_seed + i·budget ..= base_seed + (i+1)·budget − 1`.
    Stride { base_seed: u64, budget: u64 },
    /// Trajectory `i` tries exactly one seed, the `i`-th of the list.
    Prespecified(Vec<u64>),
}

impl SeedSchedule {
    /// Inclusive seed range of trajectory `id`.
    ///
    /// # Errors
    ///
    /// `EpiError::ConfigError` if the stride budget is zero, the range overflows, or the
    /// prespecified list has no seed for `id`.
    pub fn seed_range(&self, id: usize) -> Result<(u64, u64), EpiError> {
        match self {
            SeedSchedule::Stride { base_seed, budget } => {
                if *budget == 0 {
                    return Err(config_error!("seed budget must be at least one"));
                }
                let low = u64::try_from(id)
                    .ok()
                    .and_then(|id| id.checked_mul(*budget))
                    .and_then(|offset| base_seed.checked_add(offset));
                let high = low.and_then(|low| low.checked_add(budget - 1));
                match (low, high) {
                    (Some(low), Some(high)) => Ok((low, high)),
                    _ => Err(config_error!("seed range of trajectory {id} overflows")),
                }
            }
            SeedSchedule::Prespecified(seeds) => seeds
                .get(id)
                .map(|&seed| (seed, seed))
                .ok_or_else(|| {
                    config_error!("{} prespecified seeds for trajectory {id}", seeds.len())
                }),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    #[default]
    Sequential,
    Parallel {
        workers: usize,
    },
}

impl ExecutionMode {
    fn workers(self, trajectories: usize) -> usize {
        match self {
            ExecutionMode::Sequential => 1,
            ExecutionMode::Parallel { workers } => workers.clamp(1, trajectories.max(1)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RunOptions {
    pub trajectories: usize,
    pub schedule: SeedSchedule,
    pub mode: ExecutionMode,
}

/// Everything workers append to.
#[derive(Default)]
struct ResultsBuffer {
    aggregator: OutcomeAggregator,
    calibration: Option<Calibration>,
    histories: Vec<(usize, TrajectoryHistory)>,
}

/// Results of `run_trajectories`, in trajectory-id order where order matters.
#[derive(Debug)]
pub struct RunResults {
    pub aggregator: OutcomeAggregator,
    /// Scored results, present when the model is meant for calibration.
    pub calibration: Option<Calibration>,
    /// Recorded class counts per trajectory, present when the model records history.
    pub histories: Vec<(usize, TrajectoryHistory)>,
}

fn run_worker(
    model: &Arc<Model>,
    options: &RunOptions,
    worker: usize,
    workers: usize,
    buffer: &Mutex<ResultsBuffer>,
) -> Result<(), EpiError> {
    let record_history = model.settings().record_history;
    for id in (worker..options.trajectories).step_by(workers) {
        let (low, high) = options.schedule.seed_range(id)?;
        let mut epidemic = Epidemic::new(id, Arc::clone(model));
        let search = epidemic.simulate_until_acceptable(low, high);

        let mut results = buffer
            .lock()
            .map_err(|_| EpiError::from("results buffer lock poisoned"))?;
        results.aggregator.add_discarded(search.discarded);
        let Some(seed) = search.seed else {
            warn!("trajectory {id} found no acceptable seed in {low}..={high}");
            results.aggregator.add_exhausted(id);
            continue;
        };
        results.aggregator.add(epidemic.outcome());
        if let Some(calibration) = results.calibration.as_mut() {
            calibration.add_result(
                id,
                seed,
                epidemic.calibration_draw(),
                epidemic.observations().to_vec(),
            );
        }
        if record_history {
            results.histories.push((id, epidemic.history().clone()));
        }
    }
    debug!("worker {worker} finished");
    Ok(())
}

/// Simulates `options.trajectories` trajectories of `model`. In calibrate mode every accepted
/// trajectory is scored before returning.
///
/// # Errors
///
/// `EpiError::ConfigError` if the seed schedule cannot cover every trajectory, or
/// `EpiError::EpiError` if a worker thread panicked.
pub fn run_trajectories(model: Arc<Model>, options: &RunOptions) -> Result<RunResults, EpiError> {
    // Fail before any work is done.
    if options.trajectories > 0 {
        options.schedule.seed_range(options.trajectories - 1)?;
    }
    let calibrate = model.settings().intended_use == IntendedUse::Calibrate;
    let buffer = Mutex::new(ResultsBuffer {
        calibration: calibrate.then(|| Calibration::from_model(&model)),
        ..ResultsBuffer::default()
    });
    let workers = options.mode.workers(options.trajectories);
    info!(
        "running {} trajectories of `{}` on {workers} worker(s)",
        options.trajectories,
        model.name()
    );

    if workers == 1 {
        run_worker(&model, options, 0, 1, &buffer)?;
    } else {
        thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|worker| {
                    let model = &model;
                    let buffer = &buffer;
                    scope.spawn(move || run_worker(model, options, worker, workers, buffer))
                })
                .collect();
            handles.into_iter().try_for_each(|handle| {
                handle
                    .join()
                    .map_err(|_| EpiError::from("worker thread panicked"))?
            })
        })?;
    }

    let ResultsBuffer {
        aggregator,
        mut calibration,
        mut histories,
    } = buffer
        .into_inner()
        .map_err(|_| EpiError::from("results buffer lock poisoned"))?;
    if let Some(calibration) = calibration.as_mut() {
        calibration.compute_fit();
    }
    histories.sort_by_key(|(id, _)| *id);
    info!(
        "{} trajectories accepted, {} discarded, {} without an acceptable seed",
        aggregator.len(),
        aggregator.discarded(),
        aggregator.exhausted().len()
    );
    Ok(RunResults {
        aggregator,
        calibration,
        histories,
    })
}
