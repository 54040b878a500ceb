//! Features and conditions for condition-based decision rules.
//!
//! A `Feature` is a scalar read off the running epidemic (prevalence of some classes, the current
//! epidemic time, ...). A `Condition` is a boolean expression over features. Both are stored in
//! arenas indexed by id; a composite condition may only refer to conditions with a lower id.

use serde::{Deserialize, Serialize};

use crate::class::ClassId;
use crate::error::{config_error, EpiError};
use crate::intervention::InterventionId;
use crate::parameter::ParameterId;

pub type FeatureId = usize;
pub type ConditionId = usize;

/// Read access to the state of a running epidemic, as needed by features.
pub trait FeatureSource {
    fn prevalence(&self, class: ClassId) -> f64;
    /// New members since the previous decision epoch.
    fn incidence(&self, class: ClassId) -> f64;
    fn cumulative_incidence(&self, class: ClassId) -> f64;
    fn epidemic_time(&self) -> f64;
    fn intervention_in_effect(&self, intervention: InterventionId) -> bool;
    fn parameter(&self, parameter: ParameterId) -> f64;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Feature {
    Prevalence { classes: Vec<ClassId> },
    Incidence { classes: Vec<ClassId> },
    CumulativeIncidence { classes: Vec<ClassId> },
    EpidemicTime,
    InterventionInEffect { intervention: InterventionId },
    Parameter { parameter: ParameterId },
}

impl Feature {
    pub fn evaluate(&self, source: &dyn FeatureSource) -> f64 {
        match self {
            Feature::Prevalence { classes } => classes.iter().map(|&c| source.prevalence(c)).sum(),
            Feature::Incidence { classes } => classes.iter().map(|&c| source.incidence(c)).sum(),
            Feature::CumulativeIncidence { classes } => classes
                .iter()
                .map(|&c| source.cumulative_incidence(c))
                .sum(),
            Feature::EpidemicTime => source.epidemic_time(),
            Feature::InterventionInEffect { intervention } => {
                if source.intervention_in_effect(*intervention) {
                    1.0
                } else {
                    0.0
                }
            }
            Feature::Parameter { parameter } => source.parameter(*parameter),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    LessThan,
    LessOrEqual,
    GreaterThan,
    GreaterOrEqual,
    Equal,
}

impl Comparison {
    #[must_use]
    pub fn holds(self, value: f64, threshold: f64) -> bool {
        match self {
            Comparison::LessThan => value < threshold,
            Comparison::LessOrEqual => value <= threshold,
            Comparison::GreaterThan => value > threshold,
            Comparison::GreaterOrEqual => value >= threshold,
            Comparison::Equal => value == threshold,
        }
    }
}

/// Either a literal (`"threshold": 50.0`) or a parameter (`"threshold": {"parameter": 3}`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Threshold {
    Value(f64),
    Parameter { parameter: ParameterId },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    Threshold {
        feature: FeatureId,
        comparison: Comparison,
        threshold: Threshold,
    },
    All {
        conditions: Vec<ConditionId>,
    },
    Any {
        conditions: Vec<ConditionId>,
    },
    Not {
        condition: ConditionId,
    },
}

/// Features and conditions of a model.
#[derive(Clone, Debug, Default)]
pub struct ConditionSet {
    features: Vec<Feature>,
    conditions: Vec<Condition>,
}

impl ConditionSet {
    /// # Errors
    ///
    /// `EpiError::ConfigError` if a condition refers to a missing feature or to a condition that
    /// is not defined before it.
    pub fn new(features: Vec<Feature>, conditions: Vec<Condition>) -> Result<Self, EpiError> {
        for (id, condition) in conditions.iter().enumerate() {
            match condition {
                Condition::Threshold { feature, .. } if *feature >= features.len() => {
                    return Err(config_error!(
                        "condition {id} refers to undefined feature {feature}"
                    ));
                }
                Condition::All { conditions: parts } | Condition::Any { conditions: parts } => {
                    if let Some(part) = parts.iter().find(|&&part| part >= id) {
                        return Err(config_error!(
                            "condition {id} refers to condition {part} which is not defined before it"
                        ));
                    }
                }
                Condition::Not { condition: part } if *part >= id => {
                    return Err(config_error!(
                        "condition {id} refers to condition {part} which is not defined before it"
                    ));
                }
                _ => {}
            }
        }
        Ok(ConditionSet {
            features,
            conditions,
        })
    }

    /// Checks the class, intervention and parameter ids that features and thresholds refer to.
    ///
    /// # Errors
    ///
    /// `EpiError::ConfigError` naming the first dangling reference.
    pub fn validate_references(
        &self,
        n_classes: usize,
        n_interventions: usize,
        n_parameters: usize,
    ) -> Result<(), EpiError> {
        for (id, feature) in self.features.iter().enumerate() {
            match feature {
                Feature::Prevalence { classes }
                | Feature::Incidence { classes }
                | Feature::CumulativeIncidence { classes } => {
                    if let Some(class) = classes.iter().find(|&&c| c >= n_classes) {
                        return Err(config_error!("feature {id} refers to undefined class {class}"));
                    }
                }
                Feature::InterventionInEffect { intervention } if *intervention >= n_interventions => {
                    return Err(config_error!(
                        "feature {id} refers to undefined intervention {intervention}"
                    ));
                }
                Feature::Parameter { parameter } if *parameter >= n_parameters => {
                    return Err(config_error!(
                        "feature {id} refers to undefined parameter {parameter}"
                    ));
                }
                _ => {}
            }
        }
        for (id, condition) in self.conditions.iter().enumerate() {
            if let Condition::Threshold {
                threshold: Threshold::Parameter { parameter },
                ..
            } = condition
            {
                if *parameter >= n_parameters {
                    return Err(config_error!(
                        "condition {id} refers to undefined parameter {parameter}"
                    ));
                }
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    #[must_use]
    pub fn feature(&self, id: FeatureId) -> Option<&Feature> {
        self.features.get(id)
    }

    /// Evaluates condition `id`. Unknown ids evaluate to false.
    pub fn evaluate(&self, id: ConditionId, source: &dyn FeatureSource) -> bool {
        let Some(condition) = self.conditions.get(id) else {
            return false;
        };
        match condition {
            Condition::Threshold {
                feature,
                comparison,
                threshold,
            } => {
                let value = self.features[*feature].evaluate(source);
                let threshold = match threshold {
                    Threshold::Value(value) => *value,
                    Threshold::Parameter { parameter } => source.parameter(*parameter),
                };
                comparison.holds(value, threshold)
            }
            Condition::All { conditions } => conditions.iter().all(|&c| self.evaluate(c, source)),
            Condition::Any { conditions } => conditions.iter().any(|&c| self.evaluate(c, source)),
            Condition::Not { condition } => !self.evaluate(*condition, source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSource {
        prevalence: Vec<f64>,
        time: f64,
    }

    impl FeatureSource for FixedSource {
        fn prevalence(&self, class: ClassId) -> f64 {
            self.prevalence[class]
        }
        fn incidence(&self, _class: ClassId) -> f64 {
            0.0
        }
        fn cumulative_incidence(&self, class: ClassId) -> f64 {
            self.prevalence[class] * 2.0
        }
        fn epidemic_time(&self) -> f64 {
            self.time
        }
        fn intervention_in_effect(&self, intervention: InterventionId) -> bool {
            intervention == 1
        }
        fn parameter(&self, _parameter: ParameterId) -> f64 {
            25.0
        }
    }

    fn conditions() -> ConditionSet {
        ConditionSet::new(
            vec![
                Feature::Prevalence {
                    classes: vec![0, 1],
                },
                Feature::EpidemicTime,
                Feature::InterventionInEffect { intervention: 1 },
            ],
            vec![
                Condition::Threshold {
                    feature: 0,
                    comparison: Comparison::GreaterOrEqual,
                    threshold: Threshold::Parameter { parameter: 0 },
                },
                Condition::Threshold {
                    feature: 1,
                    comparison: Comparison::LessThan,
                    threshold: Threshold::Value(10.0),
                },
                Condition::All {
                    conditions: vec![0, 1],
                },
                Condition::Not { condition: 2 },
                Condition::Threshold {
                    feature: 2,
                    comparison: Comparison::Equal,
                    threshold: Threshold::Value(1.0),
                },
            ],
        )
        .unwrap()
    }

    #[test]
    fn evaluates_composite_conditions() {
        let set = conditions();
        let source = FixedSource {
            prevalence: vec![20.0, 10.0],
            time: 3.0,
        };
        assert!(set.evaluate(0, &source));
        assert!(set.evaluate(1, &source));
        assert!(set.evaluate(2, &source));
        assert!(!set.evaluate(3, &source));
        assert!(set.evaluate(4, &source));

        let later = FixedSource {
            prevalence: vec![20.0, 10.0],
            time: 12.0,
        };
        assert!(!set.evaluate(2, &later));
        assert!(set.evaluate(3, &later));
    }

    #[test]
    fn unknown_condition_is_false() {
        let set = conditions();
        let source = FixedSource {
            prevalence: vec![0.0, 0.0],
            time: 0.0,
        };
        assert!(!set.evaluate(99, &source));
    }

    #[test]
    fn forward_references_are_rejected() {
        let result = ConditionSet::new(
            vec![Feature::EpidemicTime],
            vec![Condition::Not { condition: 0 }],
        );
        assert!(matches!(result, Err(EpiError::ConfigError(_))));

        let result = ConditionSet::new(
            vec![],
            vec![Condition::Threshold {
                feature: 0,
                comparison: Comparison::Equal,
                threshold: Threshold::Value(0.0),
            }],
        );
        assert!(matches!(result, Err(EpiError::ConfigError(_))));
    }

    #[test]
    fn dangling_references_are_rejected() {
        let set = conditions();
        assert!(set.validate_references(2, 2, 1).is_ok());
        assert!(set.validate_references(1, 2, 1).is_err());
        assert!(set.validate_references(2, 1, 1).is_err());
        assert!(set.validate_references(2, 2, 0).is_err());
    }

    #[test]
    fn thresholds_deserialize_from_value_or_parameter() {
        let literal: Threshold = serde_json::from_str("50.0").unwrap();
        assert_eq!(literal, Threshold::Value(50.0));
        let parameter: Threshold = serde_json::from_str(r#"{"parameter": 3}"#).unwrap();
        assert_eq!(parameter, Threshold::Parameter { parameter: 3 });
    }
}
