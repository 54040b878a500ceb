//! What a trajectory leaves behind: class-count snapshots, calibration observations and the
//! summary outcome.

use serde::{Deserialize, Serialize};

use crate::class::{Class, ClassId};

fn unbounded_below() -> f64 {
    f64::NEG_INFINITY
}

fn unbounded_above() -> f64 {
    f64::INFINITY
}

/// How an observation channel summarizes its classes over one observation period.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Statistic {
    /// New members during the period.
    Incidence,
    /// Members at the end of the period.
    Prevalence,
    /// New members since the start of the trajectory, at the end of the period.
    CumulativeIncidence,
}

/// Values outside `[min, max]` make a calibration trajectory infeasible.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeasibleRange {
    #[serde(default = "unbounded_below")]
    pub min: f64,
    #[serde(default = "unbounded_above")]
    pub max: f64,
}

impl FeasibleRange {
    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObservationChannel {
    pub name: String,
    pub classes: Vec<ClassId>,
    pub statistic: Statistic,
    pub feasible_range: Option<FeasibleRange>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub step: u64,
    /// `None` until epidemic time has started.
    pub epidemic_time: Option<f64>,
    pub counts: Vec<u64>,
}

/// Class counts at every step of a trajectory, taken before the step's transfers, plus one
/// final snapshot after the last step.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrajectoryHistory {
    snapshots: Vec<Snapshot>,
}

impl TrajectoryHistory {
    pub fn record(&mut self, step: u64, epidemic_time: Option<f64>, classes: &[Class]) {
        self.snapshots.push(Snapshot {
            step,
            epidemic_time,
            counts: classes.iter().map(Class::members).collect(),
        });
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
    }

    #[must_use]
    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

#[allow(clippy::cast_precision_loss)]
fn class_sum(classes: &[Class], ids: &[ClassId], value: fn(&Class) -> u64) -> f64 {
    ids.iter().map(|&id| value(&classes[id]) as f64).sum()
}

/// Collects one row of observations per completed observation period, one value per channel.
#[derive(Clone, Debug, Default)]
pub struct ObservationCollector {
    period_steps: u64,
    period_incidence: Vec<f64>,
    rows: Vec<Vec<f64>>,
    infeasible: bool,
}

impl ObservationCollector {
    #[must_use]
    pub fn new(channels: usize, period_steps: u64) -> Self {
        ObservationCollector {
            period_steps: period_steps.max(1),
            period_incidence: vec![0.0; channels],
            rows: Vec::new(),
            infeasible: false,
        }
    }

    pub fn reset(&mut self) {
        self.period_incidence.fill(0.0);
        self.rows.clear();
        self.infeasible = false;
    }

    /// Accounts for one step of epidemic time; `epidemic_steps` counts it. Closes a period when
    /// `epidemic_steps` is a multiple of the period length.
    pub fn record_step(
        &mut self,
        channels: &[ObservationChannel],
        classes: &[Class],
        epidemic_steps: u64,
    ) {
        for (channel, incidence) in channels.iter().zip(self.period_incidence.iter_mut()) {
            if channel.statistic == Statistic::Incidence {
                *incidence += class_sum(classes, &channel.classes, Class::step_incidence);
            }
        }
        if epidemic_steps % self.period_steps == 0 {
            self.close_period(channels, classes);
        }
    }

    /// Closes the periods a trajectory stopped at `epidemic_steps` would have completed had it
    /// run `remaining_steps` more steps without change: incidence is zero from the stop on,
    /// prevalence and cumulative incidence keep their final values.
    pub fn complete_periods(
        &mut self,
        channels: &[ObservationChannel],
        classes: &[Class],
        epidemic_steps: u64,
        remaining_steps: u64,
    ) {
        let closed = epidemic_steps / self.period_steps;
        let reachable = epidemic_steps.saturating_add(remaining_steps) / self.period_steps;
        for _ in closed..reachable {
            self.close_period(channels, classes);
        }
    }

    fn close_period(&mut self, channels: &[ObservationChannel], classes: &[Class]) {
        let row: Vec<f64> = channels
            .iter()
            .zip(self.period_incidence.iter_mut())
            .map(|(channel, incidence)| match channel.statistic {
                Statistic::Incidence => std::mem::take(incidence),
                Statistic::Prevalence => class_sum(classes, &channel.classes, Class::members),
                Statistic::CumulativeIncidence => {
                    class_sum(classes, &channel.classes, Class::cumulative_incidence)
                }
            })
            .collect();
        let outside = channels.iter().zip(&row).any(|(channel, value)| {
            channel
                .feasible_range
                .is_some_and(|range| !range.contains(*value))
        });
        self.infeasible |= outside;
        self.rows.push(row);
    }

    #[must_use]
    pub fn is_infeasible(&self) -> bool {
        self.infeasible
    }

    /// Observation matrix: one row per observation period, one column per channel.
    #[must_use]
    pub fn observations(&self) -> &[Vec<f64>] {
        &self.rows
    }

    /// The series observed by one channel.
    #[must_use]
    pub fn channel_series(&self, channel: usize) -> Vec<f64> {
        self.rows.iter().map(|row| row[channel]).collect()
    }
}

/// The summary of one completed trajectory.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrajectoryOutcome {
    pub id: usize,
    pub seed: u64,
    pub steps: u64,
    pub epidemic_time: f64,
    pub eradicated: bool,
    /// Discounted cost of classes and interventions.
    pub total_cost: f64,
    /// Discounted health outcome of classes.
    pub total_health: f64,
    pub cumulative_incidence: Vec<u64>,
    pub final_counts: Vec<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::ClassKind;

    fn classes() -> Vec<Class> {
        let mut classes: Vec<Class> = (0..2)
            .map(|id| Class::new(id, format!("c{id}"), ClassKind::Death))
            .collect();
        for class in &mut classes {
            class.reset(&[]);
        }
        classes
    }

    fn channel(statistic: Statistic, feasible_range: Option<FeasibleRange>) -> ObservationChannel {
        ObservationChannel {
            name: format!("{statistic:?}"),
            classes: vec![0, 1],
            statistic,
            feasible_range,
        }
    }

    #[test]
    fn periods_aggregate_incidence_and_sample_prevalence() {
        let channels = vec![
            channel(Statistic::Incidence, None),
            channel(Statistic::Prevalence, None),
            channel(Statistic::CumulativeIncidence, None),
        ];
        let mut classes = classes();
        let mut collector = ObservationCollector::new(channels.len(), 2);

        for step in 1..=4u64 {
            for class in &mut classes {
                class.reset_staging();
                class.add_new_members(step);
            }
            collector.record_step(&channels, &classes, step);
        }
        assert_eq!(
            collector.observations(),
            &[vec![6.0, 6.0, 6.0], vec![14.0, 20.0, 20.0]]
        );
        assert_eq!(collector.channel_series(0), vec![6.0, 14.0]);
        assert!(!collector.is_infeasible());
    }

    #[test]
    fn stopped_trajectories_complete_their_periods() {
        let channels = vec![
            channel(Statistic::Incidence, None),
            channel(Statistic::Prevalence, None),
            channel(Statistic::CumulativeIncidence, None),
        ];
        let mut classes = classes();
        let mut collector = ObservationCollector::new(channels.len(), 2);
        for step in 1..=3u64 {
            for class in &mut classes {
                class.reset_staging();
                class.add_new_members(step);
            }
            collector.record_step(&channels, &classes, step);
        }
        collector.complete_periods(&channels, &classes, 3, 4);
        assert_eq!(
            collector.observations(),
            &[
                vec![6.0, 6.0, 6.0],
                vec![6.0, 12.0, 12.0],
                vec![0.0, 12.0, 12.0]
            ]
        );

        // Nothing left to complete at the horizon.
        collector.complete_periods(&channels, &classes, 8, 0);
        assert_eq!(collector.observations().len(), 3);
    }

    #[test]
    fn values_outside_the_feasible_range_are_flagged() {
        let channels = vec![channel(
            Statistic::Prevalence,
            Some(FeasibleRange {
                min: 0.0,
                max: 5.0,
            }),
        )];
        let mut classes = classes();
        let mut collector = ObservationCollector::new(1, 1);
        classes[0].add_new_members(5);
        collector.record_step(&channels, &classes, 1);
        assert!(!collector.is_infeasible());
        classes[1].add_new_members(1);
        collector.record_step(&channels, &classes, 2);
        assert!(collector.is_infeasible());

        collector.reset();
        assert!(!collector.is_infeasible());
        assert!(collector.observations().is_empty());
    }

    #[test]
    fn history_records_counts() {
        let mut classes = classes();
        let mut history = TrajectoryHistory::default();
        history.record(0, None, &classes);
        classes[1].add_new_members(3);
        history.record(1, Some(0.5), &classes);
        assert_eq!(history.len(), 2);
        assert_eq!(history.snapshots()[1].counts, vec![0, 3]);
        assert_eq!(history.snapshots()[1].epidemic_time, Some(0.5));
    }
}
