//! Fourier signatures of observed and simulated series.
//!
//! A signature holds the amplitudes of the discrete Fourier transform at frequencies
//! `1..=n/2` (the constant term is left out, the mean is compared separately), their L2 norm, and
//! the mean, standard deviation, minimum and maximum of the series. A series whose amplitudes are
//! all zero (a constant series, or one with fewer than two values) has no usable signature.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::numeric;

/// Weights of the six components of the Fourier goodness of fit.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FourierWeights {
    /// One minus the cosine similarity of the amplitude vectors.
    pub cosine: f64,
    /// Squared difference of the amplitude norms.
    pub norm: f64,
    pub mean: f64,
    pub st_dev: f64,
    pub min: f64,
    pub max: f64,
}

impl FourierWeights {
    /// Whether every weight is a finite number.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        [
            self.cosine,
            self.norm,
            self.mean,
            self.st_dev,
            self.min,
            self.max,
        ]
        .iter()
        .all(|w| w.is_finite())
    }
}

impl Default for FourierWeights {
    fn default() -> Self {
        FourierWeights {
            cosine: 1.0,
            norm: 1.0,
            mean: 1.0,
            st_dev: 1.0,
            min: 1.0,
            max: 1.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FourierSignature {
    pub len: usize,
    pub amplitudes: Vec<f64>,
    pub norm: f64,
    pub mean: f64,
    pub st_dev: f64,
    pub min: f64,
    pub max: f64,
}

/// Amplitudes `|X_k| / n` for `k = 1..=n/2`.
fn amplitudes(series: &[f64]) -> Vec<f64> {
    let n = series.len();
    #[allow(clippy::cast_precision_loss)]
    let length = n as f64;
    (1..=n / 2)
        .map(|k| {
            let (re, im) = series
                .iter()
                .enumerate()
                .fold((0.0, 0.0), |(re, im), (t, x)| {
                    #[allow(clippy::cast_precision_loss)]
                    let angle = 2.0 * PI * (k * t) as f64 / length;
                    (re + x * angle.cos(), im - x * angle.sin())
                });
            re.hypot(im) / length
        })
        .collect()
}

impl FourierSignature {
    /// The signature of `series`, or `None` if it is degenerate.
    #[must_use]
    pub fn of(series: &[f64]) -> Option<FourierSignature> {
        let amplitudes = amplitudes(series);
        let norm = amplitudes.iter().map(|a| a * a).sum::<f64>().sqrt();
        if !norm.is_finite() || norm <= f64::EPSILON {
            return None;
        }
        Some(FourierSignature {
            len: series.len(),
            amplitudes,
            norm,
            mean: numeric::mean(series)?,
            st_dev: numeric::population_st_dev(series)?,
            min: numeric::min(series)?,
            max: numeric::max(series)?,
        })
    }

    /// Goodness of fit of `simulated` against this (observed) signature. The simulated series is
    /// truncated or padded with zeros to the observed length. Components whose weight is not
    /// positive are left out. Lower is better; a degenerate simulated series scores
    /// `f64::INFINITY`.
    #[must_use]
    pub fn fit(&self, simulated: &[f64], weights: &FourierWeights) -> f64 {
        let mut series = simulated.to_vec();
        series.resize(self.len, 0.0);
        let Some(other) = FourierSignature::of(&series) else {
            return f64::INFINITY;
        };
        let dot: f64 = self
            .amplitudes
            .iter()
            .zip(&other.amplitudes)
            .map(|(a, b)| a * b)
            .sum();
        let cosine = dot / (self.norm * other.norm);
        [
            (weights.cosine, 1.0 - cosine),
            (weights.norm, (self.norm - other.norm).powi(2)),
            (weights.mean, (self.mean - other.mean).powi(2)),
            (weights.st_dev, (self.st_dev - other.st_dev).powi(2)),
            (weights.min, (self.min - other.min).powi(2)),
            (weights.max, (self.max - other.max).powi(2)),
        ]
        .into_iter()
        .filter(|&(weight, _)| weight > 0.0)
        .map(|(weight, term)| weight * term)
        .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_almost_eq;

    #[test]
    fn amplitudes_of_a_pure_cosine() {
        // cos(2πt/4) sampled at t = 0..8 has all its energy at frequency k = 2.
        let series = [1.0, 0.0, -1.0, 0.0, 1.0, 0.0, -1.0, 0.0];
        let signature = FourierSignature::of(&series).unwrap();
        assert_eq!(signature.amplitudes.len(), 4);
        assert_almost_eq!(signature.amplitudes[0], 0.0, 1e-12);
        assert_almost_eq!(signature.amplitudes[1], 0.5, 1e-12);
        assert_almost_eq!(signature.norm, 0.5, 1e-12);
        assert_almost_eq!(signature.mean, 0.0, 1e-12);
        assert_almost_eq!(signature.min, -1.0, 1e-12);
    }

    #[test]
    fn constant_and_short_series_are_degenerate() {
        assert!(FourierSignature::of(&[3.0; 10]).is_none());
        assert!(FourierSignature::of(&[3.0]).is_none());
        assert!(FourierSignature::of(&[]).is_none());
    }

    #[test]
    fn identical_series_fit_perfectly() {
        let series = [1.0, 4.0, 9.0, 4.0, 1.0, 0.0];
        let signature = FourierSignature::of(&series).unwrap();
        assert_almost_eq!(signature.fit(&series, &FourierWeights::default()), 0.0, 1e-12);
    }

    #[test]
    fn component_weights_select_what_is_compared() {
        let observed = [0.0, 5.0, 10.0, 5.0, 0.0, 5.0, 10.0, 5.0];
        let shifted: Vec<f64> = observed.iter().map(|x| x + 50.0).collect();
        let signature = FourierSignature::of(&observed).unwrap();

        // A shift moves the mean, min and max but leaves the amplitudes alone.
        let shape_only = FourierWeights {
            cosine: 1.0,
            norm: 1.0,
            mean: 0.0,
            st_dev: 1.0,
            min: 0.0,
            max: 0.0,
        };
        assert_almost_eq!(signature.fit(&shifted, &shape_only), 0.0, 1e-9);
        let level_only = FourierWeights {
            cosine: 0.0,
            norm: 0.0,
            mean: 2.0,
            st_dev: 0.0,
            min: 0.0,
            max: 0.0,
        };
        assert_almost_eq!(signature.fit(&shifted, &level_only), 2.0 * 2500.0, 1e-6);
    }

    #[test]
    fn negative_weights_never_reward_a_worse_series() {
        let observed = [0.0, 5.0, 10.0, 5.0, 0.0, 5.0, 10.0, 5.0];
        let shifted: Vec<f64> = observed.iter().map(|x| x + 50.0).collect();
        let signature = FourierSignature::of(&observed).unwrap();
        let weights = FourierWeights {
            cosine: 1.0,
            norm: 1.0,
            mean: -1.0,
            st_dev: 1.0,
            min: 0.0,
            max: 0.0,
        };
        // Only the mean differs, and its weight is skipped.
        assert_almost_eq!(signature.fit(&observed, &weights), 0.0, 1e-9);
        assert_almost_eq!(signature.fit(&shifted, &weights), 0.0, 1e-9);
    }

    #[test]
    fn weights_must_be_finite() {
        assert!(FourierWeights::default().is_finite());
        let weights = FourierWeights {
            norm: f64::NAN,
            ..FourierWeights::default()
        };
        assert!(!weights.is_finite());
    }

    #[test]
    fn degenerate_simulation_is_worst() {
        let signature = FourierSignature::of(&[1.0, 4.0, 9.0, 4.0]).unwrap();
        let weights = FourierWeights::default();
        assert_eq!(signature.fit(&[5.0; 4], &weights), f64::INFINITY);
        assert_eq!(signature.fit(&[], &weights), f64::INFINITY);
        assert!(signature.fit(&[1.0, 4.0, 8.0, 4.0, 100.0], &weights).is_finite());
    }
}
