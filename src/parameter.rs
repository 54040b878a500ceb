//! Model parameters: independent random draws, values derived from other parameters, and
//! functions of simulation time.
//!
//! Parameters live in an arena (`ParameterSet`) indexed by `ParameterId`. A derived parameter may
//! only refer to parameters with a lower id, so evaluating the arena in id order always sees its
//! inputs already computed. The current values of one trajectory are a plain `Vec<f64>` owned by
//! the `Epidemic`; the set itself is immutable once built.

use std::f64::consts::PI;

use rand::distr::{Bernoulli, Uniform};
use rand::Rng;
use rand_distr::{Beta, Distribution, Exp, Gamma, LogNormal, Normal, Triangular};
use serde::{Deserialize, Serialize};

use crate::error::{config_error, EpiError};

pub type ParameterId = usize;

fn one() -> f64 {
    1.0
}

/// How a parameter gets its value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParameterKind {
    Constant {
        value: f64,
    },
    Uniform {
        min: f64,
        max: f64,
    },
    Triangular {
        min: f64,
        mode: f64,
        max: f64,
    },
    Normal {
        mean: f64,
        st_dev: f64,
    },
    LogNormal {
        mu: f64,
        sigma: f64,
    },
    Gamma {
        shape: f64,
        scale: f64,
    },
    /// A beta draw rescaled to `[min, max]`.
    Beta {
        alpha: f64,
        beta: f64,
        #[serde(default)]
        min: f64,
        #[serde(default = "one")]
        max: f64,
    },
    Exponential {
        mean: f64,
    },
    Bernoulli {
        p: f64,
    },
    /// `constant + Σ coefficient · value[id]`
    LinearCombination {
        terms: Vec<(ParameterId, f64)>,
        #[serde(default)]
        constant: f64,
    },
    /// `Π value[factor] / Π value[divisor]`
    Product {
        factors: Vec<ParameterId>,
        #[serde(default)]
        divisors: Vec<ParameterId>,
    },
    /// `intercept + slope · value[base]`
    Correlated {
        base: ParameterId,
        slope: f64,
        #[serde(default)]
        intercept: f64,
    },
    TimeDependent {
        function: TimeFunction,
    },
}

/// Functions of simulation time. Arguments named by `ParameterId` are read from the current
/// parameter values, so they may themselves be random draws.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum TimeFunction {
    /// `intercept + slope · t`
    Linear {
        intercept: ParameterId,
        slope: ParameterId,
    },
    /// `initial · exp(rate · t)`
    Exponential {
        initial: ParameterId,
        rate: ParameterId,
    },
    /// `base · (1 + amplitude · cos(2π (t − phase) / period))`
    Oscillating {
        base: ParameterId,
        amplitude: ParameterId,
        period: f64,
        #[serde(default)]
        phase: f64,
    },
    /// Logistic curve from `min` to `max`, centered at `midpoint`.
    Sigmoid {
        min: ParameterId,
        max: ParameterId,
        midpoint: f64,
        steepness: ParameterId,
    },
    /// Step function: `values[i]` applies from `times[i]` on. Before `times[0]`, `values[0]`.
    Piecewise {
        times: Vec<f64>,
        values: Vec<ParameterId>,
    },
}

impl TimeFunction {
    fn dependencies(&self) -> Vec<ParameterId> {
        match self {
            TimeFunction::Linear { intercept, slope } => vec![*intercept, *slope],
            TimeFunction::Exponential { initial, rate } => vec![*initial, *rate],
            TimeFunction::Oscillating {
                base, amplitude, ..
            } => vec![*base, *amplitude],
            TimeFunction::Sigmoid {
                min,
                max,
                steepness,
                ..
            } => vec![*min, *max, *steepness],
            TimeFunction::Piecewise { values, .. } => values.clone(),
        }
    }

    fn evaluate(&self, values: &[f64], t: f64) -> f64 {
        match self {
            TimeFunction::Linear { intercept, slope } => values[*intercept] + values[*slope] * t,
            TimeFunction::Exponential { initial, rate } => {
                values[*initial] * (values[*rate] * t).exp()
            }
            TimeFunction::Oscillating {
                base,
                amplitude,
                period,
                phase,
            } => values[*base] * (1.0 + values[*amplitude] * (2.0 * PI * (t - phase) / period).cos()),
            TimeFunction::Sigmoid {
                min,
                max,
                midpoint,
                steepness,
            } => {
                let (low, high) = (values[*min], values[*max]);
                low + (high - low) / (1.0 + (-values[*steepness] * (t - midpoint)).exp())
            }
            TimeFunction::Piecewise { times, values: ids } => {
                let index = times.iter().take_while(|&&start| start <= t).count();
                values[ids[index.saturating_sub(1)]]
            }
        }
    }

    fn validate(&self, name: &str) -> Result<(), EpiError> {
        match self {
            TimeFunction::Oscillating { period, .. } if !(period.is_finite() && *period > 0.0) => {
                Err(config_error!(
                    "parameter `{name}`: oscillation period must be positive"
                ))
            }
            TimeFunction::Piecewise { times, values } => {
                if times.is_empty() || times.len() != values.len() {
                    return Err(config_error!(
                        "parameter `{name}`: piecewise function needs one value per breakpoint"
                    ));
                }
                if times.iter().any(|t| !t.is_finite())
                    || times.windows(2).any(|w| w[0] >= w[1])
                {
                    return Err(config_error!(
                        "parameter `{name}`: piecewise breakpoints must be finite and increasing"
                    ));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// A ready-to-use distribution, validated when the parameter is built.
#[derive(Clone, Debug)]
enum Sampler {
    Constant(f64),
    Uniform(Uniform<f64>),
    Triangular(Triangular<f64>),
    Normal(Normal<f64>),
    LogNormal(LogNormal<f64>),
    Gamma(Gamma<f64>),
    Beta { beta: Beta<f64>, min: f64, max: f64 },
    Exponential(Exp<f64>),
    Bernoulli(Bernoulli),
}

impl Sampler {
    fn from_kind(name: &str, kind: &ParameterKind) -> Result<Option<Sampler>, EpiError> {
        let invalid = |e: &dyn std::fmt::Debug| config_error!("parameter `{name}`: {e:?}");
        let sampler = match *kind {
            ParameterKind::Constant { value } => Sampler::Constant(value),
            ParameterKind::Uniform { min, max } if min == max => Sampler::Constant(min),
            ParameterKind::Uniform { min, max } => {
                Sampler::Uniform(Uniform::new(min, max).map_err(|e| invalid(&e))?)
            }
            ParameterKind::Triangular { min, mode, max } => {
                Sampler::Triangular(Triangular::new(min, max, mode).map_err(|e| invalid(&e))?)
            }
            ParameterKind::Normal { mean, st_dev } => {
                Sampler::Normal(Normal::new(mean, st_dev).map_err(|e| invalid(&e))?)
            }
            ParameterKind::LogNormal { mu, sigma } => {
                Sampler::LogNormal(LogNormal::new(mu, sigma).map_err(|e| invalid(&e))?)
            }
            ParameterKind::Gamma { shape, scale } => {
                Sampler::Gamma(Gamma::new(shape, scale).map_err(|e| invalid(&e))?)
            }
            ParameterKind::Beta {
                alpha,
                beta,
                min,
                max,
            } => {
                if max < min {
                    return Err(config_error!("parameter `{name}`: beta range is inverted"));
                }
                Sampler::Beta {
                    beta: Beta::new(alpha, beta).map_err(|e| invalid(&e))?,
                    min,
                    max,
                }
            }
            ParameterKind::Exponential { mean } => {
                if mean <= 0.0 {
                    return Err(config_error!(
                        "parameter `{name}`: exponential mean must be positive"
                    ));
                }
                Sampler::Exponential(Exp::new(1.0 / mean).map_err(|e| invalid(&e))?)
            }
            ParameterKind::Bernoulli { p } => {
                Sampler::Bernoulli(Bernoulli::new(p).map_err(|e| invalid(&e))?)
            }
            ParameterKind::LinearCombination { .. }
            | ParameterKind::Product { .. }
            | ParameterKind::Correlated { .. }
            | ParameterKind::TimeDependent { .. } => return Ok(None),
        };
        Ok(Some(sampler))
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match self {
            Sampler::Constant(value) => *value,
            Sampler::Uniform(d) => d.sample(rng),
            Sampler::Triangular(d) => d.sample(rng),
            Sampler::Normal(d) => d.sample(rng),
            Sampler::LogNormal(d) => d.sample(rng),
            Sampler::Gamma(d) => d.sample(rng),
            Sampler::Beta { beta, min, max } => min + (max - min) * beta.sample(rng),
            Sampler::Exponential(d) => d.sample(rng),
            Sampler::Bernoulli(d) => {
                if d.sample(rng) {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct Parameter {
    pub id: ParameterId,
    pub name: String,
    pub kind: ParameterKind,
    /// Re-evaluated at every step: time-dependent parameters and anything derived from one.
    pub updated_each_step: bool,
    /// Reported as part of the parameter draw of a calibration result.
    pub include_in_calibration: bool,
    sampler: Option<Sampler>,
}

impl Parameter {
    /// Builds a parameter, validating its distribution arguments and that every parameter it
    /// refers to has a lower id.
    ///
    /// # Errors
    ///
    /// `EpiError::ConfigError` if a distribution cannot be constructed or a dependency does not
    /// precede this parameter.
    pub fn new(
        id: ParameterId,
        name: impl Into<String>,
        kind: ParameterKind,
        include_in_calibration: bool,
    ) -> Result<Parameter, EpiError> {
        let name = name.into();
        let sampler = Sampler::from_kind(&name, &kind)?;
        if let ParameterKind::TimeDependent { function } = &kind {
            function.validate(&name)?;
        }
        let parameter = Parameter {
            id,
            name,
            updated_each_step: matches!(kind, ParameterKind::TimeDependent { .. }),
            kind,
            include_in_calibration,
            sampler,
        };
        if let Some(dependency) = parameter.dependencies().into_iter().find(|&d| d >= id) {
            return Err(config_error!(
                "parameter `{}` (id {}) depends on parameter {} which is not defined before it",
                parameter.name,
                id,
                dependency
            ));
        }
        Ok(parameter)
    }

    /// Ids of the parameters this parameter's value is computed from.
    #[must_use]
    pub fn dependencies(&self) -> Vec<ParameterId> {
        match &self.kind {
            ParameterKind::LinearCombination { terms, .. } => {
                terms.iter().map(|(id, _)| *id).collect()
            }
            ParameterKind::Product { factors, divisors } => {
                factors.iter().chain(divisors).copied().collect()
            }
            ParameterKind::Correlated { base, .. } => vec![*base],
            ParameterKind::TimeDependent { function } => function.dependencies(),
            _ => Vec::new(),
        }
    }

    /// Computes a derived parameter from the values of the parameters before it.
    fn derive(&self, values: &[f64], time: f64) -> f64 {
        match &self.kind {
            ParameterKind::LinearCombination { terms, constant } => {
                constant
                    + terms
                        .iter()
                        .map(|(id, coefficient)| coefficient * values[*id])
                        .sum::<f64>()
            }
            ParameterKind::Product { factors, divisors } => {
                let numerator: f64 = factors.iter().map(|id| values[*id]).product();
                let denominator: f64 = divisors.iter().map(|id| values[*id]).product();
                numerator / denominator
            }
            ParameterKind::Correlated {
                base,
                slope,
                intercept,
            } => intercept + slope * values[*base],
            ParameterKind::TimeDependent { function } => function.evaluate(values, time),
            // Independent parameters keep their sampled value.
            _ => values[self.id],
        }
    }
}

/// The immutable arena of all parameters of a model.
#[derive(Clone, Debug, Default)]
pub struct ParameterSet {
    parameters: Vec<Parameter>,
}

impl ParameterSet {
    /// Builds the arena. Ids must equal positions. Parameters that depend (directly or through
    /// other parameters) on a time-dependent parameter are flagged `updated_each_step`.
    ///
    /// # Errors
    ///
    /// `EpiError::ConfigError` if an id does not match its position.
    pub fn new(mut parameters: Vec<Parameter>) -> Result<ParameterSet, EpiError> {
        for index in 0..parameters.len() {
            if parameters[index].id != index {
                return Err(config_error!(
                    "parameter `{}` has id {} but is stored at position {}",
                    parameters[index].name,
                    parameters[index].id,
                    index
                ));
            }
            // Dependencies precede `index`, so their flags are final.
            let inherits = parameters[index]
                .dependencies()
                .iter()
                .any(|&d| parameters[d].updated_each_step);
            parameters[index].updated_each_step |= inherits;
        }
        Ok(ParameterSet { parameters })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: ParameterId) -> Option<&Parameter> {
        self.parameters.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter()
    }

    /// Whether any parameter changes during a trajectory.
    #[must_use]
    pub fn has_time_dependent(&self) -> bool {
        self.parameters.iter().any(|p| p.updated_each_step)
    }

    /// Draws a fresh value for every parameter, in id order, evaluating time functions at `time`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R, time: f64) -> Vec<f64> {
        let mut values = Vec::with_capacity(self.parameters.len());
        for parameter in &self.parameters {
            let value = match &parameter.sampler {
                Some(sampler) => sampler.sample(rng),
                None => parameter.derive(&values, time),
            };
            values.push(value);
        }
        values
    }

    /// Re-evaluates the parameters flagged `updated_each_step` at `time`, in id order.
    pub fn update_time_dependent(&self, values: &mut [f64], time: f64) {
        for parameter in self.parameters.iter().filter(|p| p.updated_each_step) {
            values[parameter.id] = parameter.derive(values, time);
        }
    }

    /// The values of the parameters included in calibration, in id order.
    #[must_use]
    pub fn calibration_draw(&self, values: &[f64]) -> Vec<f64> {
        self.parameters
            .iter()
            .filter(|p| p.include_in_calibration)
            .map(|p| values[p.id])
            .collect()
    }

    /// Names matching `calibration_draw`.
    #[must_use]
    pub fn calibration_names(&self) -> Vec<&str> {
        self.parameters
            .iter()
            .filter(|p| p.include_in_calibration)
            .map(|p| p.name.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_almost_eq;
    use crate::rand::rngs::SmallRng;
    use crate::rand::SeedableRng;

    fn constant(id: ParameterId, value: f64) -> Parameter {
        Parameter::new(id, format!("p{id}"), ParameterKind::Constant { value }, false).unwrap()
    }

    #[test]
    fn derived_parameters_follow_their_inputs() {
        let set = ParameterSet::new(vec![
            constant(0, 2.0),
            constant(1, 5.0),
            Parameter::new(
                2,
                "sum",
                ParameterKind::LinearCombination {
                    terms: vec![(0, 3.0), (1, -1.0)],
                    constant: 0.5,
                },
                false,
            )
            .unwrap(),
            Parameter::new(
                3,
                "ratio",
                ParameterKind::Product {
                    factors: vec![0, 2],
                    divisors: vec![1],
                },
                false,
            )
            .unwrap(),
            Parameter::new(
                4,
                "correlated",
                ParameterKind::Correlated {
                    base: 3,
                    slope: 2.0,
                    intercept: 1.0,
                },
                true,
            )
            .unwrap(),
        ])
        .unwrap();

        let mut rng = SmallRng::seed_from_u64(0);
        let values = set.sample(&mut rng, 0.0);
        assert_almost_eq!(values[2], 1.5, 1e-12);
        assert_almost_eq!(values[3], 0.6, 1e-12);
        assert_almost_eq!(values[4], 2.2, 1e-12);
        assert_eq!(set.calibration_draw(&values), vec![values[4]]);
        assert_eq!(set.calibration_names(), vec!["correlated"]);
    }

    #[test]
    fn forward_references_are_rejected() {
        let result = Parameter::new(
            0,
            "bad",
            ParameterKind::Correlated {
                base: 1,
                slope: 1.0,
                intercept: 0.0,
            },
            false,
        );
        assert!(matches!(result, Err(EpiError::ConfigError(_))));
    }

    #[test]
    fn invalid_distributions_are_rejected() {
        let result = Parameter::new(
            0,
            "bad_normal",
            ParameterKind::Normal {
                mean: 0.0,
                st_dev: -1.0,
            },
            false,
        );
        assert!(matches!(result, Err(EpiError::ConfigError(_))));

        let result = Parameter::new(0, "bad_p", ParameterKind::Bernoulli { p: 1.5 }, false);
        assert!(matches!(result, Err(EpiError::ConfigError(_))));

        let seasonal = |period: f64| {
            Parameter::new(
                2,
                "seasonal",
                ParameterKind::TimeDependent {
                    function: TimeFunction::Oscillating {
                        base: 0,
                        amplitude: 1,
                        period,
                        phase: 0.0,
                    },
                },
                false,
            )
        };
        assert!(seasonal(365.0).is_ok());
        for period in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let result = seasonal(period);
            assert!(matches!(result, Err(EpiError::ConfigError(_))), "period {period}");
        }
    }

    #[test]
    fn draws_stay_in_their_support() {
        let set = ParameterSet::new(vec![
            Parameter::new(0, "u", ParameterKind::Uniform { min: 1.0, max: 2.0 }, false).unwrap(),
            Parameter::new(
                1,
                "b",
                ParameterKind::Beta {
                    alpha: 2.0,
                    beta: 3.0,
                    min: 10.0,
                    max: 20.0,
                },
                false,
            )
            .unwrap(),
            Parameter::new(2, "e", ParameterKind::Exponential { mean: 3.0 }, false).unwrap(),
        ])
        .unwrap();
        let mut rng = SmallRng::seed_from_u64(11);
        for _ in 0..200 {
            let values = set.sample(&mut rng, 0.0);
            assert!((1.0..2.0).contains(&values[0]));
            assert!((10.0..=20.0).contains(&values[1]));
            assert!(values[2] >= 0.0);
        }
    }

    #[test]
    fn time_dependence_propagates_to_derived_parameters() {
        let set = ParameterSet::new(vec![
            constant(0, 1.0),
            constant(1, 0.5),
            Parameter::new(
                2,
                "linear",
                ParameterKind::TimeDependent {
                    function: TimeFunction::Linear {
                        intercept: 0,
                        slope: 1,
                    },
                },
                false,
            )
            .unwrap(),
            Parameter::new(
                3,
                "doubled",
                ParameterKind::LinearCombination {
                    terms: vec![(2, 2.0)],
                    constant: 0.0,
                },
                false,
            )
            .unwrap(),
        ])
        .unwrap();
        assert!(!set.get(1).unwrap().updated_each_step);
        assert!(set.get(2).unwrap().updated_each_step);
        assert!(set.get(3).unwrap().updated_each_step);
        assert!(set.has_time_dependent());
        let fixed = ParameterSet::new(vec![constant(0, 1.0), constant(1, 0.5)]).unwrap();
        assert!(!fixed.has_time_dependent());

        let mut rng = SmallRng::seed_from_u64(0);
        let mut values = set.sample(&mut rng, 0.0);
        assert_almost_eq!(values[3], 2.0, 1e-12);
        set.update_time_dependent(&mut values, 4.0);
        assert_almost_eq!(values[2], 3.0, 1e-12);
        assert_almost_eq!(values[3], 6.0, 1e-12);
    }

    #[test]
    fn time_functions() {
        let values = [2.0, 0.5, 0.0, 10.0, 1.0];
        let oscillating = TimeFunction::Oscillating {
            base: 0,
            amplitude: 1,
            period: 4.0,
            phase: 0.0,
        };
        assert_almost_eq!(oscillating.evaluate(&values, 0.0), 3.0, 1e-12);
        assert_almost_eq!(oscillating.evaluate(&values, 2.0), 1.0, 1e-12);

        let sigmoid = TimeFunction::Sigmoid {
            min: 2,
            max: 3,
            midpoint: 5.0,
            steepness: 4,
        };
        assert_almost_eq!(sigmoid.evaluate(&values, 5.0), 5.0, 1e-12);

        let piecewise = TimeFunction::Piecewise {
            times: vec![1.0, 3.0],
            values: vec![0, 3],
        };
        assert_almost_eq!(piecewise.evaluate(&values, 0.0), 2.0, 1e-12);
        assert_almost_eq!(piecewise.evaluate(&values, 2.0), 2.0, 1e-12);
        assert_almost_eq!(piecewise.evaluate(&values, 3.0), 10.0, 1e-12);
    }

    #[test]
    fn deserializes_from_json() {
        let kind: ParameterKind = serde_json::from_str(
            r#"{"type": "time_dependent", "function": {"shape": "exponential", "initial": 0, "rate": 1}}"#,
        )
        .unwrap();
        assert_eq!(
            kind,
            ParameterKind::TimeDependent {
                function: TimeFunction::Exponential { initial: 0, rate: 1 }
            }
        );
    }
}
