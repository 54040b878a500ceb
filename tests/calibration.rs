use std::fs;
use std::path::Path;
use std::sync::Arc;

use compartmental::model::ModelConfig;
use compartmental::prelude::*;
use compartmental::trajectory::FeasibleRange;

fn config() -> ModelConfig {
    let text = fs::read_to_string(Path::new("tests/data/sir_calibration.json")).unwrap();
    serde_json::from_str(&text).unwrap()
}

fn run(config: ModelConfig, trajectories: usize, budget: u64) -> RunResults {
    let model = Arc::new(Model::from_config(config).unwrap());
    run_trajectories(
        model,
        &RunOptions {
            trajectories,
            schedule: SeedSchedule::Stride {
                base_seed: 7,
                budget,
            },
            mode: ExecutionMode::Parallel { workers: 4 },
        },
    )
    .unwrap()
}

#[test]
fn fittest_results_are_ranked() {
    let results = run(config(), 24, 1);
    let calibration = results.calibration.unwrap();
    assert_eq!(calibration.results().len(), 24);
    assert_eq!(
        calibration.active_channel_names(),
        vec!["weekly cases", "prevalence"]
    );

    let fittest = calibration.select_fittest(5);
    assert_eq!(fittest.len(), 5);
    for pair in fittest.windows(2) {
        assert!(pair[0].fit <= pair[1].fit);
    }
    for result in &fittest {
        assert_eq!(result.parameter_draw.len(), 2);
        assert_eq!(result.target_fits.len(), 2);
        assert!(result.observations.len() <= 10);
        assert!(result.observations.iter().all(|row| row.len() == 2));
    }
    let best = calibration.best().unwrap();
    assert!(calibration.results().iter().all(|r| best.fit <= r.fit || r.fit.is_nan()));
}

#[test]
fn seeds_are_those_of_the_schedule() {
    let results = run(config(), 6, 1);
    let calibration = results.calibration.unwrap();
    let mut seeds: Vec<(usize, u64)> = calibration
        .results()
        .iter()
        .map(|r| (r.id, r.seed))
        .collect();
    seeds.sort_unstable();
    assert_eq!(seeds, (0..6).map(|id| (id, 7 + id as u64)).collect::<Vec<_>>());
}

#[test]
fn infeasible_trajectories_exhaust_their_seed_budget() {
    let mut config = config();
    config.calibration_targets[0].feasible_range = Some(FeasibleRange { min: 0.0, max: 0.0 });
    let results = run(config, 4, 3);

    assert!(results.aggregator.is_empty());
    assert_eq!(results.aggregator.exhausted(), vec![0, 1, 2, 3]);
    assert_eq!(results.aggregator.discarded(), 12);
    assert!(results.calibration.unwrap().results().is_empty());
}

#[test]
fn zero_weight_targets_are_not_scored() {
    let mut config = config();
    config.calibration_targets[1].weight = 0.0;
    let results = run(config, 5, 1);
    let calibration = results.calibration.unwrap();
    assert_eq!(calibration.active_channel_names(), vec!["weekly cases"]);
    for result in calibration.results() {
        assert_eq!(result.target_fits[1], 0.0);
        assert_almost_eq!(result.fit, result.target_fits[0], 1e-9);
    }
}
