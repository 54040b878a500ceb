//! Scoring completed trajectories against observed data.
//!
//! Completed trajectories are buffered with `Calibration::add_result`. `compute_fit` scores
//! everything buffered against every target and moves it to the scored results, and
//! `select_fittest` ranks the scored results. Scores never depend on the order results arrive
//! in: each result is scored on its own and ranking ties are broken by trajectory id.
mod fourier;
mod target;

use log::{debug, warn};
use serde::Serialize;

pub use fourier::{FourierSignature, FourierWeights};
pub use target::{CalibrationTarget, GoodnessOfFit};

use crate::model::Model;

/// One completed trajectory and its scores.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SimulationResult {
    pub id: usize,
    pub seed: u64,
    pub parameter_draw: Vec<f64>,
    /// One row per observation period, one column per observation channel.
    pub observations: Vec<Vec<f64>>,
    /// Fit per target, in target order. Inactive targets score zero.
    pub target_fits: Vec<f64>,
    /// Weighted mean of the active targets' fits.
    pub fit: f64,
}

impl SimulationResult {
    fn rank_key(&self) -> f64 {
        if self.fit.is_nan() {
            f64::INFINITY
        } else {
            self.fit
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Calibration {
    targets: Vec<CalibrationTarget>,
    pending: Vec<SimulationResult>,
    scored: Vec<SimulationResult>,
}

impl Calibration {
    #[must_use]
    pub fn new(targets: Vec<CalibrationTarget>) -> Calibration {
        if !targets.iter().any(CalibrationTarget::is_active) {
            warn!("calibration has no target with positive weight; every fit will be zero");
        }
        Calibration {
            targets,
            pending: Vec::new(),
            scored: Vec::new(),
        }
    }

    #[must_use]
    pub fn from_model(model: &Model) -> Calibration {
        Calibration::new(model.calibration_targets().to_vec())
    }

    #[must_use]
    pub fn targets(&self) -> &[CalibrationTarget] {
        &self.targets
    }

    /// Names of the observation channels read by targets with positive weight.
    #[must_use]
    pub fn active_channel_names(&self) -> Vec<&str> {
        self.targets
            .iter()
            .filter(|t| t.is_active())
            .map(|t| t.name.as_str())
            .collect()
    }

    /// Buffers a completed trajectory until the next `compute_fit`.
    pub fn add_result(
        &mut self,
        id: usize,
        seed: u64,
        parameter_draw: Vec<f64>,
        observations: Vec<Vec<f64>>,
    ) {
        self.pending.push(SimulationResult {
            id,
            seed,
            parameter_draw,
            observations,
            target_fits: Vec::new(),
            fit: f64::NAN,
        });
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Scores every buffered result and returns how many were scored.
    pub fn compute_fit(&mut self) -> usize {
        let mut pending = std::mem::take(&mut self.pending);
        for result in &mut pending {
            result.target_fits = self
                .targets
                .iter()
                .map(|target| {
                    if !target.is_active() {
                        return 0.0;
                    }
                    let series: Vec<f64> = result
                        .observations
                        .iter()
                        .filter_map(|row| row.get(target.channel).copied())
                        .collect();
                    target.fit(&series)
                })
                .collect();
            result.fit = self.aggregate(&result.target_fits);
        }
        let count = pending.len();
        debug!("scored {count} calibration results");
        self.scored.append(&mut pending);
        count
    }

    /// `Σ w·fit / Σ w` over the targets with positive weight, zero if there are none.
    fn aggregate(&self, fits: &[f64]) -> f64 {
        let (weighted, total_weight) = self
            .targets
            .iter()
            .zip(fits)
            .filter(|(target, _)| target.is_active())
            .fold((0.0, 0.0), |(sum, weights), (target, fit)| {
                (sum + target.weight * fit, weights + target.weight)
            });
        if total_weight > 0.0 {
            weighted / total_weight
        } else {
            0.0
        }
    }

    /// Scored results, in the order they were scored.
    #[must_use]
    pub fn results(&self) -> &[SimulationResult] {
        &self.scored
    }

    /// The `k` scored results with the lowest fit, best first. Ties are broken by trajectory id.
    #[must_use]
    pub fn select_fittest(&self, k: usize) -> Vec<&SimulationResult> {
        let mut ranked: Vec<&SimulationResult> = self.scored.iter().collect();
        ranked.sort_by(|a, b| {
            a.rank_key()
                .total_cmp(&b.rank_key())
                .then_with(|| a.id.cmp(&b.id))
        });
        ranked.truncate(k);
        ranked
    }

    /// The best scored result, if any.
    #[must_use]
    pub fn best(&self) -> Option<&SimulationResult> {
        self.select_fittest(1).first().copied()
    }
}
