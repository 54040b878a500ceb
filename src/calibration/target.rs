use serde::{Deserialize, Serialize};

use crate::calibration::fourier::{FourierSignature, FourierWeights};
use crate::error::{config_error, EpiError};
use crate::numeric;

/// How a simulated series is compared with what was observed. Lower is better.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GoodnessOfFit {
    /// `Σ_t w_t (observed_t − simulated_t)²` over periods with positive weight. Periods the
    /// simulation did not reach count as zero. Weights default to one.
    SumSquaredErrorTimeSeries {
        observed: Vec<f64>,
        #[serde(default)]
        period_weights: Vec<f64>,
    },
    /// Squared error between `observed` and the mean of the simulated series.
    SumSquaredErrorAverage { observed: f64 },
    /// Weighted comparison of Fourier signatures, see `FourierSignature::fit`.
    Fourier {
        observed: Vec<f64>,
        #[serde(default)]
        weights: FourierWeights,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct CalibrationTarget {
    pub name: String,
    /// Targets with non-positive weight are not scored.
    pub weight: f64,
    /// Column of the observation matrix this target reads.
    pub channel: usize,
    pub goodness_of_fit: GoodnessOfFit,
    observed_signature: Option<FourierSignature>,
}

impl CalibrationTarget {
    /// # Errors
    ///
    /// `EpiError::ConfigError` if a weight is not finite, the period weights do not match the
    /// observed series, or a Fourier target observes a degenerate series.
    pub fn new(
        name: impl Into<String>,
        weight: f64,
        channel: usize,
        goodness_of_fit: GoodnessOfFit,
    ) -> Result<CalibrationTarget, EpiError> {
        let name = name.into();
        if !weight.is_finite() {
            return Err(config_error!("calibration target `{name}` has weight {weight}"));
        }
        let observed_signature = match &goodness_of_fit {
            GoodnessOfFit::SumSquaredErrorTimeSeries {
                observed,
                period_weights,
            } => {
                if !period_weights.is_empty() && period_weights.len() != observed.len() {
                    return Err(config_error!(
                        "calibration target `{name}` has {} observations but {} period weights",
                        observed.len(),
                        period_weights.len()
                    ));
                }
                None
            }
            GoodnessOfFit::SumSquaredErrorAverage { .. } => None,
            GoodnessOfFit::Fourier { observed, weights } => {
                if !weights.is_finite() {
                    return Err(config_error!(
                        "calibration target `{name}` has non-finite Fourier weights"
                    ));
                }
                let signature = FourierSignature::of(observed);
                if signature.is_none() && weight > 0.0 {
                    return Err(config_error!(
                        "calibration target `{name}` observes a series without a Fourier signature"
                    ));
                }
                signature
            }
        };
        Ok(CalibrationTarget {
            name,
            weight,
            channel,
            goodness_of_fit,
            observed_signature,
        })
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.weight > 0.0
    }

    /// Scores a simulated series against this target.
    #[must_use]
    pub fn fit(&self, simulated: &[f64]) -> f64 {
        match &self.goodness_of_fit {
            GoodnessOfFit::SumSquaredErrorTimeSeries {
                observed,
                period_weights,
            } => observed
                .iter()
                .enumerate()
                .map(|(t, o)| (period_weights.get(t).copied().unwrap_or(1.0), o, t))
                .filter(|&(w, _, _)| w > 0.0)
                .map(|(w, o, t)| {
                    let s = simulated.get(t).copied().unwrap_or(0.0);
                    w * (o - s).powi(2)
                })
                .sum(),
            GoodnessOfFit::SumSquaredErrorAverage { observed } => {
                numeric::mean(simulated).map_or(f64::INFINITY, |mean| (observed - mean).powi(2))
            }
            GoodnessOfFit::Fourier { weights, .. } => self
                .observed_signature
                .as_ref()
                .map_or(f64::INFINITY, |signature| signature.fit(simulated, weights)),
        }
    }
}
