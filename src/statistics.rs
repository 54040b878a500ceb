//! Summaries of outcomes across trajectories.

use serde::Serialize;

use crate::numeric;
use crate::trajectory::TrajectoryOutcome;

/// Coverage of the percentile interval reported by `SummaryStatistics`.
pub const DEFAULT_INTERVAL: f64 = 0.95;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SummaryStatistics {
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation.
    pub st_dev: f64,
    pub min: f64,
    pub max: f64,
    /// Lower end of the central percentile interval.
    pub lower: f64,
    /// Upper end of the central percentile interval.
    pub upper: f64,
}

/// Linear interpolation between closest ranks, `q` in `[0, 1]`.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let position = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let below = position.floor() as usize;
    let above = (below + 1).min(sorted.len() - 1);
    #[allow(clippy::cast_precision_loss)]
    let fraction = position - below as f64;
    sorted[below] + fraction * (sorted[above] - sorted[below])
}

impl SummaryStatistics {
    /// Summarizes `values` with a central percentile interval of the given coverage. `None` for
    /// an empty slice.
    #[must_use]
    pub fn from_values(values: &[f64], interval: f64) -> Option<SummaryStatistics> {
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        let tail = (1.0 - interval.clamp(0.0, 1.0)) / 2.0;
        Some(SummaryStatistics {
            count: values.len(),
            mean: numeric::mean(values)?,
            st_dev: numeric::sample_st_dev(values)?,
            min: numeric::min(values)?,
            max: numeric::max(values)?,
            lower: percentile(&sorted, tail),
            upper: percentile(&sorted, 1.0 - tail),
        })
    }
}

/// Collects trajectory outcomes from any number of workers and summarizes them.
#[derive(Clone, Debug, Default)]
pub struct OutcomeAggregator {
    outcomes: Vec<TrajectoryOutcome>,
    discarded: u64,
    exhausted: Vec<usize>,
}

impl OutcomeAggregator {
    #[must_use]
    pub fn new() -> Self {
        OutcomeAggregator::default()
    }

    pub fn add(&mut self, outcome: TrajectoryOutcome) {
        self.outcomes.push(outcome);
    }

    /// Counts trajectories simulated and thrown away while searching for acceptable seeds.
    pub fn add_discarded(&mut self, discarded: u64) {
        self.discarded += discarded;
    }

    /// Records a trajectory whose whole seed range was discarded.
    pub fn add_exhausted(&mut self, id: usize) {
        self.exhausted.push(id);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    #[must_use]
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Ids of the trajectories that found no acceptable seed, ascending.
    #[must_use]
    pub fn exhausted(&self) -> Vec<usize> {
        let mut ids = self.exhausted.clone();
        ids.sort_unstable();
        ids
    }

    /// Outcomes ordered by trajectory id, whatever order they arrived in.
    #[must_use]
    pub fn outcomes(&self) -> Vec<&TrajectoryOutcome> {
        let mut outcomes: Vec<&TrajectoryOutcome> = self.outcomes.iter().collect();
        outcomes.sort_by_key(|o| o.id);
        outcomes
    }

    /// One named summary per outcome measure: totals, epidemic time, then cumulative incidence
    /// and final count of every class. Empty when no outcome has been added.
    #[must_use]
    pub fn summaries(&self, class_names: &[&str]) -> Vec<(String, SummaryStatistics)> {
        let outcomes = self.outcomes();
        if outcomes.is_empty() {
            return Vec::new();
        }
        let column = |value: &dyn Fn(&TrajectoryOutcome) -> f64| -> Vec<f64> {
            outcomes.iter().map(|o| value(*o)).collect()
        };

        #[allow(clippy::cast_precision_loss)]
        let mut measures: Vec<(String, Vec<f64>)> = vec![
            ("total_cost".to_string(), column(&|o| o.total_cost)),
            ("total_health".to_string(), column(&|o| o.total_health)),
            ("epidemic_time".to_string(), column(&|o| o.epidemic_time)),
            ("steps".to_string(), column(&|o| o.steps as f64)),
        ];
        for (class, name) in class_names.iter().enumerate() {
            #[allow(clippy::cast_precision_loss)]
            let incidence = column(&|o| o.cumulative_incidence.get(class).copied().unwrap_or(0) as f64);
            #[allow(clippy::cast_precision_loss)]
            let counts = column(&|o| o.final_counts.get(class).copied().unwrap_or(0) as f64);
            measures.push((format!("cumulative_incidence:{name}"), incidence));
            measures.push((format!("final_count:{name}"), counts));
        }

        measures
            .into_iter()
            .filter_map(|(name, values)| {
                SummaryStatistics::from_values(&values, DEFAULT_INTERVAL).map(|s| (name, s))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_almost_eq;

    fn outcome(id: usize, total_cost: f64, incidence: u64) -> TrajectoryOutcome {
        TrajectoryOutcome {
            id,
            seed: id as u64,
            steps: 10,
            epidemic_time: 10.0,
            eradicated: false,
            total_cost,
            total_health: 0.0,
            cumulative_incidence: vec![0, incidence],
            final_counts: vec![5, 5],
        }
    }

    #[test]
    fn summary_statistics() {
        let summary = SummaryStatistics::from_values(&[4.0, 1.0, 3.0, 2.0, 5.0], 0.5).unwrap();
        assert_eq!(summary.count, 5);
        assert_almost_eq!(summary.mean, 3.0, 1e-12);
        assert_almost_eq!(summary.st_dev, 2.5f64.sqrt(), 1e-12);
        assert_eq!((summary.min, summary.max), (1.0, 5.0));
        assert_almost_eq!(summary.lower, 2.0, 1e-12);
        assert_almost_eq!(summary.upper, 4.0, 1e-12);
        assert!(SummaryStatistics::from_values(&[], 0.95).is_none());
    }

    #[test]
    fn single_value_has_degenerate_interval() {
        let summary = SummaryStatistics::from_values(&[7.0], 0.95).unwrap();
        assert_eq!(summary.st_dev, 0.0);
        assert_eq!((summary.lower, summary.upper), (7.0, 7.0));
    }

    #[test]
    fn summaries_do_not_depend_on_arrival_order() {
        let mut forward = OutcomeAggregator::new();
        let mut backward = OutcomeAggregator::new();
        let outcomes: Vec<_> = (0..5)
            .map(|id| outcome(id, 0.1 * id as f64, 3 * id as u64))
            .collect();
        for outcome in &outcomes {
            forward.add(outcome.clone());
        }
        for outcome in outcomes.iter().rev() {
            backward.add(outcome.clone());
        }
        let names = ["S", "I"];
        assert_eq!(forward.summaries(&names), backward.summaries(&names));
        assert_eq!(forward.outcomes(), backward.outcomes());

        let summaries = forward.summaries(&names);
        assert_eq!(summaries.len(), 8);
        assert_eq!(summaries[6].0, "cumulative_incidence:I");
        assert_almost_eq!(summaries[6].1.mean, 6.0, 1e-12);
    }

    #[test]
    fn discarded_and_exhausted_are_tallied() {
        let mut aggregator = OutcomeAggregator::new();
        aggregator.add_discarded(3);
        aggregator.add_discarded(2);
        aggregator.add_exhausted(9);
        aggregator.add_exhausted(4);
        assert_eq!(aggregator.discarded(), 5);
        assert_eq!(aggregator.exhausted(), vec![4, 9]);
        assert!(aggregator.summaries(&["S"]).is_empty());
    }
}
