//! Interventions and the monitor that decides which of them are in effect.
//!
//! Decisions are taken at decision epochs, every `decision_interval_steps` steps. A decision to
//! switch on takes effect `delay_steps` later; switching off is immediate. An intervention is
//! never in effect outside its availability window. The default intervention is always in effect
//! and stands for the baseline contact pattern.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::condition::{ConditionId, ConditionSet, FeatureSource};
use crate::error::EpiError;
use crate::parameter::ParameterId;

pub type InterventionId = usize;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionType {
    Default,
    #[default]
    Other,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DecisionRule {
    /// Fixed status, unless a per-epoch sequence is supplied with
    /// `InterventionMonitor::set_predetermined_sequence`.
    Predetermined { in_effect: bool },
    /// Switch on when `switch_on` holds. Switch off when `switch_off` holds or, if there is none,
    /// when `switch_on` no longer holds.
    ConditionBased {
        switch_on: ConditionId,
        #[serde(default)]
        switch_off: Option<ConditionId>,
    },
    /// On for `on_duration` out of every `period` time units, starting at `first_on`.
    Periodic {
        first_on: f64,
        on_duration: f64,
        period: f64,
    },
    /// On during `[start, start + duration)`.
    IntervalBased { start: f64, duration: f64 },
    /// Status supplied by the caller through `InterventionMonitor::set_dynamic_decision`.
    Dynamic,
}

fn always_on() -> DecisionRule {
    DecisionRule::Predetermined { in_effect: true }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Intervention {
    #[serde(skip)]
    pub id: InterventionId,
    pub name: String,
    #[serde(default)]
    pub intervention_type: InterventionType,
    #[serde(default = "always_on")]
    pub rule: DecisionRule,
    /// Epidemic time from which the intervention may be in effect.
    #[serde(default)]
    pub available_from: f64,
    /// Epidemic time from which the intervention is no longer available.
    #[serde(default)]
    pub available_until: Option<f64>,
    #[serde(default)]
    pub delay_steps: u64,
    /// Charged once, when the effect begins.
    #[serde(default)]
    pub switch_on_cost: Option<ParameterId>,
    /// Charged per unit of time in effect.
    #[serde(default)]
    pub cost_per_unit_time: Option<ParameterId>,
    /// Charged once, when switched off after having been in effect.
    #[serde(default)]
    pub switch_off_penalty: Option<ParameterId>,
}

impl Intervention {
    #[must_use]
    pub fn new(id: InterventionId, name: impl Into<String>, rule: DecisionRule) -> Intervention {
        Intervention {
            id,
            name: name.into(),
            intervention_type: InterventionType::Other,
            rule,
            available_from: 0.0,
            available_until: None,
            delay_steps: 0,
            switch_on_cost: None,
            cost_per_unit_time: None,
            switch_off_penalty: None,
        }
    }

    #[must_use]
    pub fn is_default(&self) -> bool {
        self.intervention_type == InterventionType::Default
    }

    #[must_use]
    pub fn is_available(&self, epidemic_time: f64) -> bool {
        epidemic_time >= self.available_from
            && self
                .available_until
                .is_none_or(|until| epidemic_time < until)
    }

    fn parameter(id: Option<ParameterId>, parameters: &[f64]) -> f64 {
        id.map_or(0.0, |id| parameters[id])
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
struct Status {
    /// Outcome of the latest decision.
    decided: bool,
    /// Step from which a decision to switch on takes effect.
    effect_from: Option<u64>,
}

/// Tracks, for one trajectory, which interventions are in effect.
#[derive(Clone, Debug)]
pub struct InterventionMonitor {
    interventions: Vec<Intervention>,
    decision_interval_steps: u64,
    status: Vec<Status>,
    in_effect: Vec<bool>,
    sequences: Vec<Option<Vec<bool>>>,
    dynamic_decisions: Vec<bool>,
}

impl InterventionMonitor {
    #[must_use]
    pub fn new(interventions: Vec<Intervention>, decision_interval_steps: u64) -> Self {
        let n = interventions.len();
        let mut monitor = InterventionMonitor {
            interventions,
            decision_interval_steps: decision_interval_steps.max(1),
            status: vec![Status::default(); n],
            in_effect: vec![false; n],
            sequences: vec![None; n],
            dynamic_decisions: vec![false; n],
        };
        monitor.reset();
        monitor
    }

    /// Switches everything off except default interventions, which are scheduled to take effect
    /// at step 0. Supplied sequences and dynamic decisions are kept.
    pub fn reset(&mut self) {
        for (intervention, status) in self.interventions.iter().zip(self.status.iter_mut()) {
            *status = if intervention.is_default() {
                Status {
                    decided: true,
                    effect_from: Some(0),
                }
            } else {
                Status::default()
            };
        }
        self.in_effect.fill(false);
    }

    #[must_use]
    pub fn interventions(&self) -> &[Intervention] {
        &self.interventions
    }

    #[must_use]
    pub fn in_effect(&self) -> &[bool] {
        &self.in_effect
    }

    #[must_use]
    pub fn is_in_effect(&self, id: InterventionId) -> bool {
        self.in_effect.get(id).copied().unwrap_or(false)
    }

    #[must_use]
    pub fn is_decision_epoch(&self, step: u64) -> bool {
        step % self.decision_interval_steps == 0
    }

    /// Supplies the status of a predetermined intervention per decision epoch. Past the end of
    /// the sequence its last value persists.
    ///
    /// # Errors
    ///
    /// `EpiError::EpiError` if `id` is unknown or the intervention is not predetermined.
    pub fn set_predetermined_sequence(
        &mut self,
        id: InterventionId,
        sequence: Vec<bool>,
    ) -> Result<(), EpiError> {
        match self.interventions.get(id).map(|i| &i.rule) {
            Some(DecisionRule::Predetermined { .. }) => {
                self.sequences[id] = Some(sequence);
                Ok(())
            }
            Some(_) => Err(format!("intervention {id} does not use a predetermined rule").into()),
            None => Err(format!("no intervention with id {id}").into()),
        }
    }

    /// Sets the status a dynamic intervention takes at the next decision epochs.
    ///
    /// # Errors
    ///
    /// `EpiError::EpiError` if `id` is unknown or the intervention is not dynamic.
    pub fn set_dynamic_decision(&mut self, id: InterventionId, on: bool) -> Result<(), EpiError> {
        match self.interventions.get(id).map(|i| &i.rule) {
            Some(DecisionRule::Dynamic) => {
                self.dynamic_decisions[id] = on;
                Ok(())
            }
            Some(_) => Err(format!("intervention {id} does not use a dynamic rule").into()),
            None => Err(format!("no intervention with id {id}").into()),
        }
    }

    fn decide(
        &self,
        id: InterventionId,
        step: u64,
        epidemic_time: f64,
        conditions: &ConditionSet,
        source: &dyn FeatureSource,
    ) -> bool {
        let current = self.status[id].decided;
        match &self.interventions[id].rule {
            DecisionRule::Predetermined { in_effect } => {
                let epoch = usize::try_from(step / self.decision_interval_steps).unwrap_or(usize::MAX);
                self.sequences[id]
                    .as_ref()
                    .and_then(|sequence| sequence.get(epoch).or(sequence.last()))
                    .copied()
                    .unwrap_or(*in_effect)
            }
            DecisionRule::ConditionBased {
                switch_on,
                switch_off,
            } => match (current, switch_off) {
                (false, _) | (true, None) => conditions.evaluate(*switch_on, source),
                (true, Some(switch_off)) => !conditions.evaluate(*switch_off, source),
            },
            DecisionRule::Periodic {
                first_on,
                on_duration,
                period,
            } => {
                epidemic_time >= *first_on
                    && *period > 0.0
                    && (epidemic_time - first_on).rem_euclid(*period) < *on_duration
            }
            DecisionRule::IntervalBased { start, duration } => {
                epidemic_time >= *start && epidemic_time < start + duration
            }
            DecisionRule::Dynamic => self.dynamic_decisions[id],
        }
    }

    /// Refreshes which interventions are in effect at `step` and returns the undiscounted cost
    /// incurred by interventions during the step.
    pub fn update(
        &mut self,
        step: u64,
        epidemic_time: f64,
        delta_t: f64,
        conditions: &ConditionSet,
        source: &dyn FeatureSource,
        parameters: &[f64],
    ) -> f64 {
        let epoch = self.is_decision_epoch(step);
        let mut cost = 0.0;
        for id in 0..self.interventions.len() {
            let intervention = &self.interventions[id];
            if !intervention.is_default() {
                let available = intervention.is_available(epidemic_time);
                if epoch || !available {
                    let decision =
                        available && self.decide(id, step, epidemic_time, conditions, source);
                    let delay = self.interventions[id].delay_steps;
                    let status = &mut self.status[id];
                    if decision && !status.decided {
                        debug!("step {step}: decided to switch on intervention {id}");
                        *status = Status {
                            decided: true,
                            effect_from: Some(step + delay),
                        };
                    } else if !decision && status.decided {
                        debug!("step {step}: decided to switch off intervention {id}");
                        *status = Status::default();
                    }
                }
            }

            let intervention = &self.interventions[id];
            let status = self.status[id];
            let was_in_effect = self.in_effect[id];
            let now_in_effect = status.decided && status.effect_from.is_some_and(|s| step >= s);
            if now_in_effect && !was_in_effect {
                cost += Intervention::parameter(intervention.switch_on_cost, parameters);
            } else if was_in_effect && !now_in_effect {
                cost += Intervention::parameter(intervention.switch_off_penalty, parameters);
            }
            if now_in_effect {
                cost += Intervention::parameter(intervention.cost_per_unit_time, parameters) * delta_t;
            }
            self.in_effect[id] = now_in_effect;
        }
        cost
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::ClassId;
    use crate::condition::{Comparison, Condition, Feature, Threshold};

    struct Prevalence(f64);

    impl FeatureSource for Prevalence {
        fn prevalence(&self, _class: ClassId) -> f64 {
            self.0
        }
        fn incidence(&self, _class: ClassId) -> f64 {
            0.0
        }
        fn cumulative_incidence(&self, _class: ClassId) -> f64 {
            0.0
        }
        fn epidemic_time(&self) -> f64 {
            0.0
        }
        fn intervention_in_effect(&self, _intervention: InterventionId) -> bool {
            false
        }
        fn parameter(&self, _parameter: ParameterId) -> f64 {
            0.0
        }
    }

    fn no_conditions() -> ConditionSet {
        ConditionSet::default()
    }

    #[test]
    fn default_intervention_is_always_on() {
        let mut default = Intervention::new(0, "status quo", always_on());
        default.intervention_type = InterventionType::Default;
        default.cost_per_unit_time = Some(0);
        let mut monitor = InterventionMonitor::new(vec![default], 5);
        let cost = monitor.update(0, 0.0, 0.5, &no_conditions(), &Prevalence(0.0), &[4.0]);
        assert!(monitor.is_in_effect(0));
        assert!((cost - 2.0).abs() < 1e-12);
        monitor.update(3, 0.0, 0.5, &no_conditions(), &Prevalence(0.0), &[4.0]);
        assert!(monitor.is_in_effect(0));
    }

    #[test]
    fn delay_postpones_the_effect() {
        let mut lockdown = Intervention::new(0, "lockdown", always_on());
        lockdown.delay_steps = 2;
        lockdown.switch_on_cost = Some(0);
        let mut monitor = InterventionMonitor::new(vec![lockdown], 1);
        let parameters = [100.0];
        let source = Prevalence(0.0);
        let conditions = no_conditions();
        assert_eq!(monitor.update(0, 0.0, 1.0, &conditions, &source, &parameters), 0.0);
        assert!(!monitor.is_in_effect(0));
        monitor.update(1, 1.0, 1.0, &conditions, &source, &parameters);
        assert!(!monitor.is_in_effect(0));
        let cost = monitor.update(2, 2.0, 1.0, &conditions, &source, &parameters);
        assert!(monitor.is_in_effect(0));
        assert_eq!(cost, 100.0);
        assert_eq!(monitor.update(3, 3.0, 1.0, &conditions, &source, &parameters), 0.0);
    }

    #[test]
    fn condition_based_switches_with_penalty() {
        let conditions = ConditionSet::new(
            vec![Feature::Prevalence { classes: vec![0] }],
            vec![Condition::Threshold {
                feature: 0,
                comparison: Comparison::GreaterThan,
                threshold: Threshold::Value(10.0),
            }],
        )
        .unwrap();
        let mut school_closure = Intervention::new(
            0,
            "school closure",
            DecisionRule::ConditionBased {
                switch_on: 0,
                switch_off: None,
            },
        );
        school_closure.switch_off_penalty = Some(0);
        let mut monitor = InterventionMonitor::new(vec![school_closure], 2);
        let parameters = [7.0];

        monitor.update(0, 0.0, 1.0, &conditions, &Prevalence(50.0), &parameters);
        assert!(monitor.is_in_effect(0));
        // Not a decision epoch: the status holds.
        monitor.update(1, 1.0, 1.0, &conditions, &Prevalence(0.0), &parameters);
        assert!(monitor.is_in_effect(0));
        let cost = monitor.update(2, 2.0, 1.0, &conditions, &Prevalence(0.0), &parameters);
        assert!(!monitor.is_in_effect(0));
        assert_eq!(cost, 7.0);
    }

    #[test]
    fn explicit_switch_off_condition_keeps_the_intervention_on_in_between() {
        let conditions = ConditionSet::new(
            vec![Feature::Prevalence { classes: vec![0] }],
            vec![
                Condition::Threshold {
                    feature: 0,
                    comparison: Comparison::GreaterThan,
                    threshold: Threshold::Value(10.0),
                },
                Condition::Threshold {
                    feature: 0,
                    comparison: Comparison::LessThan,
                    threshold: Threshold::Value(3.0),
                },
            ],
        )
        .unwrap();
        let mut isolation = Intervention::new(
            0,
            "isolation",
            DecisionRule::ConditionBased {
                switch_on: 0,
                switch_off: Some(1),
            },
        );
        isolation.switch_on_cost = Some(0);
        isolation.switch_off_penalty = Some(1);
        let mut monitor = InterventionMonitor::new(vec![isolation], 1);
        let parameters = [10.0, 7.0];

        let expected = [
            (50.0, true, 10.0),
            // Below the switch-on threshold but above the switch-off one.
            (5.0, true, 0.0),
            (2.0, false, 7.0),
            (5.0, false, 0.0),
            (20.0, true, 10.0),
        ];
        for (step, &(prevalence, on, cost)) in expected.iter().enumerate() {
            let step = step as u64;
            let incurred = monitor.update(
                step,
                0.0,
                1.0,
                &conditions,
                &Prevalence(prevalence),
                &parameters,
            );
            assert_eq!(monitor.is_in_effect(0), on, "step {step}");
            assert_eq!(incurred, cost, "step {step}");
        }
    }

    #[test]
    fn periodic_and_interval_rules_follow_time() {
        let periodic = Intervention::new(
            0,
            "periodic",
            DecisionRule::Periodic {
                first_on: 1.0,
                on_duration: 2.0,
                period: 4.0,
            },
        );
        let interval = Intervention::new(
            1,
            "interval",
            DecisionRule::IntervalBased {
                start: 2.0,
                duration: 3.0,
            },
        );
        let mut monitor = InterventionMonitor::new(vec![periodic, interval], 1);
        let expected = [
            (false, false),
            (true, false),
            (true, true),
            (false, true),
            (false, true),
            (true, false),
        ];
        for (step, &(periodic_on, interval_on)) in expected.iter().enumerate() {
            let step = step as u64;
            #[allow(clippy::cast_precision_loss)]
            let time = step as f64;
            monitor.update(step, time, 1.0, &no_conditions(), &Prevalence(0.0), &[]);
            assert_eq!(monitor.in_effect(), &[periodic_on, interval_on], "step {step}");
        }
    }

    #[test]
    fn availability_window_forces_off() {
        let mut vaccination = Intervention::new(0, "vaccination", always_on());
        vaccination.available_from = 1.0;
        vaccination.available_until = Some(3.0);
        let mut monitor = InterventionMonitor::new(vec![vaccination], 10);
        monitor.update(0, 0.0, 1.0, &no_conditions(), &Prevalence(0.0), &[]);
        assert!(!monitor.is_in_effect(0));
        // Availability ends between epochs and still switches the intervention off.
        monitor.update(10, 2.0, 1.0, &no_conditions(), &Prevalence(0.0), &[]);
        assert!(monitor.is_in_effect(0));
        monitor.update(11, 3.0, 1.0, &no_conditions(), &Prevalence(0.0), &[]);
        assert!(!monitor.is_in_effect(0));
    }

    #[test]
    fn external_sequences_and_dynamic_decisions() {
        let predetermined = Intervention::new(
            0,
            "masks",
            DecisionRule::Predetermined { in_effect: false },
        );
        let dynamic = Intervention::new(1, "travel ban", DecisionRule::Dynamic);
        let mut monitor = InterventionMonitor::new(vec![predetermined, dynamic], 1);
        monitor
            .set_predetermined_sequence(0, vec![true, false])
            .unwrap();
        assert!(monitor.set_predetermined_sequence(1, vec![true]).is_err());
        assert!(monitor.set_dynamic_decision(0, true).is_err());
        assert!(monitor.set_dynamic_decision(7, true).is_err());

        let mut statuses = Vec::new();
        for step in 0..3 {
            if step == 1 {
                monitor.set_dynamic_decision(1, true).unwrap();
            }
            monitor.update(step, 0.0, 1.0, &no_conditions(), &Prevalence(0.0), &[]);
            statuses.push(monitor.in_effect().to_vec());
        }
        assert_eq!(
            statuses,
            vec![vec![true, false], vec![false, true], vec![false, true]]
        );
    }
}
