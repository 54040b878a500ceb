//! One trajectory of a model.
//!
//! An `Epidemic` owns all the mutable state of a trajectory: sampled parameter values, class
//! counts, resources, intervention status, transmission rates, history and observations. The
//! model itself is shared and never mutated, so any number of epidemics can run the same model
//! side by side.
//!
//! Each step runs, in order:
//! 1. intervention decisions (at decision epochs) and intervention costs,
//! 2. time-dependent parameter updates,
//! 3. a history snapshot,
//! 4. an early stop if a calibration trajectory has become infeasible,
//! 5. transmission rates from the current counts,
//! 6. member transfers, repeated until no class has pending work,
//! 7. costs, health outcomes, epidemic start and eradication,
//! 8. the step and epidemic-time counters, closing observation periods.
//!
//! A trajectory stopped by eradication still closes every observation period up to the horizon,
//! with the counts it stopped at.

use std::sync::Arc;

use log::{debug, trace};

use crate::class::{Class, ClassId, ClassKind, Resource, TransferContext};
use crate::condition::FeatureSource;
use crate::error::EpiError;
use crate::force_of_infection::ForceOfInfection;
use crate::intervention::{InterventionId, InterventionMonitor};
use crate::model::{EpidemicStart, IntendedUse, Model};
use crate::parameter::ParameterId;
use crate::random::{define_rng, RandomStreams};
use crate::trajectory::{ObservationCollector, TrajectoryHistory, TrajectoryOutcome};

define_rng!(ParameterRng);
define_rng!(TransferRng);

/// Why a trajectory stopped.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StopReason {
    Horizon,
    Eradicated,
    /// A calibration trajectory left a target's feasible range.
    Infeasible,
}

/// How a trajectory ended, from the point of view of the caller.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TrajectoryStatus {
    Accepted,
    Infeasible,
    /// Epidemic time never reached the model's minimum condition time.
    ConditionTimeNotReached,
}

/// Result of `Epidemic::simulate_until_acceptable`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SeedSearch {
    /// Trajectories simulated and discarded before the accepted one (or before giving up).
    pub discarded: u64,
    /// The first accepted seed, `None` if every seed in the range was discarded.
    pub seed: Option<u64>,
}

/// What happened during one step.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct StepSummary {
    pub births: u64,
    /// Members that entered a death class.
    pub deaths: u64,
    pub stop: Option<StopReason>,
}

struct FeatureView<'a> {
    classes: &'a [Class],
    parameters: &'a [f64],
    in_effect: Vec<bool>,
    epidemic_time: f64,
}

impl FeatureSource for FeatureView<'_> {
    #[allow(clippy::cast_precision_loss)]
    fn prevalence(&self, class: ClassId) -> f64 {
        self.classes[class].members() as f64
    }

    #[allow(clippy::cast_precision_loss)]
    fn incidence(&self, class: ClassId) -> f64 {
        self.classes[class].epoch_incidence() as f64
    }

    #[allow(clippy::cast_precision_loss)]
    fn cumulative_incidence(&self, class: ClassId) -> f64 {
        self.classes[class].cumulative_incidence() as f64
    }

    fn epidemic_time(&self) -> f64 {
        self.epidemic_time
    }

    fn intervention_in_effect(&self, intervention: InterventionId) -> bool {
        self.in_effect.get(intervention).copied().unwrap_or(false)
    }

    fn parameter(&self, parameter: ParameterId) -> f64 {
        self.parameters[parameter]
    }
}

pub struct Epidemic {
    id: usize,
    model: Arc<Model>,
    streams: RandomStreams,
    seed: u64,
    realized_seed: Option<u64>,
    parameter_values: Vec<f64>,
    classes: Vec<Class>,
    resources: Vec<Resource>,
    monitor: InterventionMonitor,
    force_of_infection: ForceOfInfection,
    event_rates: Vec<f64>,
    history: TrajectoryHistory,
    collector: ObservationCollector,
    step: u64,
    /// `None` until epidemic time starts.
    epidemic_steps: Option<u64>,
    total_cost: f64,
    total_health: f64,
    eradicated: bool,
}

impl Epidemic {
    #[must_use]
    pub fn new(id: usize, model: Arc<Model>) -> Epidemic {
        let settings = model.settings();
        let mut epidemic = Epidemic {
            id,
            streams: RandomStreams::new(0),
            seed: 0,
            realized_seed: None,
            parameter_values: Vec::new(),
            classes: model.classes().to_vec(),
            resources: model.resources().to_vec(),
            monitor: InterventionMonitor::new(
                model.interventions().to_vec(),
                settings.decision_interval_steps,
            ),
            force_of_infection: model.force_of_infection().clone(),
            event_rates: vec![0.0; model.events().len()],
            history: TrajectoryHistory::default(),
            collector: ObservationCollector::new(
                model.observation_channels().len(),
                settings.observation_period_steps,
            ),
            step: 0,
            epidemic_steps: None,
            total_cost: 0.0,
            total_health: 0.0,
            eradicated: false,
            model,
        };
        epidemic.reset(0);
        epidemic
    }

    /// Restores the start of a trajectory seeded with `seed`: parameters are redrawn, classes
    /// refilled and every counter cleared.
    pub fn reset(&mut self, seed: u64) {
        trace!("epidemic {}: reset with seed {seed}", self.id);
        self.seed = seed;
        self.streams.init_random(seed);
        let model = Arc::clone(&self.model);

        let rng = self.streams.get_rng(ParameterRng);
        self.parameter_values = model.parameters().sample(rng, 0.0);
        for class in &mut self.classes {
            class.reset(&self.parameter_values);
        }
        for resource in &mut self.resources {
            resource.replenish(&self.parameter_values);
        }
        self.monitor.reset();
        self.force_of_infection
            .calculate_contact_matrices(&self.parameter_values);
        self.event_rates.fill(0.0);
        self.history.clear();
        self.collector.reset();
        self.step = 0;
        self.epidemic_steps = match model.settings().epidemic_start {
            EpidemicStart::StepZero => Some(0),
            EpidemicStart::FirstIncidence { .. } => None,
        };
        self.total_cost = 0.0;
        self.total_health = 0.0;
        self.eradicated = false;
    }

    /// Runs one step. The caller is expected to stop once the summary carries a stop reason.
    pub fn step(&mut self) -> StepSummary {
        let model = Arc::clone(&self.model);
        let settings = model.settings();
        let delta_t = settings.delta_t;
        #[allow(clippy::cast_precision_loss)]
        let time = self.step as f64 * delta_t;
        let discount = (1.0 + settings.discount_rate).powf(-time);
        let mut summary = StepSummary::default();

        // 1. Interventions
        let epoch = self.monitor.is_decision_epoch(self.step);
        let view = FeatureView {
            classes: &self.classes,
            parameters: &self.parameter_values,
            in_effect: self.monitor.in_effect().to_vec(),
            epidemic_time: self.epidemic_time(),
        };
        let intervention_cost = self.monitor.update(
            self.step,
            view.epidemic_time,
            delta_t,
            model.conditions(),
            &view,
            &self.parameter_values,
        );
        self.total_cost += intervention_cost * discount;
        if epoch {
            for class in &mut self.classes {
                class.reset_epoch_incidence();
            }
            for resource in self
                .resources
                .iter_mut()
                .filter(|r| r.replenish_at_decision_epochs)
            {
                resource.replenish(&self.parameter_values);
            }
        }

        // 2. Time-dependent parameters
        if model.parameters().has_time_dependent() {
            model
                .parameters()
                .update_time_dependent(&mut self.parameter_values, time);
        }

        // 3. History
        if settings.record_history {
            self.history
                .record(self.step, self.started_epidemic_time(), &self.classes);
        }

        // 4. Infeasible calibration trajectories stop here.
        if settings.intended_use == IntendedUse::Calibrate && self.collector.is_infeasible() {
            summary.stop = Some(StopReason::Infeasible);
            return summary;
        }

        // 5. Transmission rates
        let in_effect = self.monitor.in_effect();
        self.force_of_infection.update_transmission_rates(
            &self.classes,
            &self.parameter_values,
            in_effect,
        );
        for (rate, event) in self.event_rates.iter_mut().zip(model.events()) {
            *rate = if event.is_active(in_effect) {
                event.rate(
                    &self.parameter_values,
                    self.force_of_infection.transmission_rates(event.source),
                )
            } else {
                0.0
            };
        }

        // 6. Transfers
        self.transfer_members(&model, &mut summary);

        // 7. Statistics, epidemic start, eradication
        for class in &self.classes {
            let (cost, health) = class.step_cost_and_health(&self.parameter_values, delta_t);
            self.total_cost += cost * discount;
            self.total_health += health * discount;
        }
        if self.epidemic_steps.is_none() {
            if let EpidemicStart::FirstIncidence { class } = settings.epidemic_start {
                if self.classes[class].step_incidence() > 0 {
                    debug!("epidemic {}: epidemic time starts at step {}", self.id, self.step);
                    self.epidemic_steps = Some(0);
                }
            }
        }
        let mut flagged = self.classes.iter().filter(|c| c.empty_to_eradicate).peekable();
        self.eradicated = flagged.peek().is_some() && flagged.all(|c| c.members() == 0);

        // 8. Counters and observations
        self.step += 1;
        if let Some(epidemic_steps) = self.epidemic_steps.as_mut() {
            *epidemic_steps += 1;
            self.collector
                .record_step(model.observation_channels(), &self.classes, *epidemic_steps);
        }

        if self.eradicated {
            summary.stop = Some(StopReason::Eradicated);
            if let Some(epidemic_steps) = self.epidemic_steps {
                self.collector.complete_periods(
                    model.observation_channels(),
                    &self.classes,
                    epidemic_steps,
                    settings.horizon_steps.saturating_sub(self.step),
                );
            }
        } else if self.step >= settings.horizon_steps {
            summary.stop = Some(StopReason::Horizon);
        }
        trace!(
            "epidemic {}: step {} births {} deaths {}",
            self.id,
            self.step,
            summary.births,
            summary.deaths
        );
        summary
    }

    fn transfer_members(&mut self, model: &Model, summary: &mut StepSummary) {
        for class in &mut self.classes {
            class.reset_staging();
        }
        let mut context = TransferContext {
            delta_t: model.settings().delta_t,
            parameters: &self.parameter_values,
            events: model.events(),
            event_rates: &self.event_rates,
            resources: &mut self.resources,
            rng: self.streams.get_rng(TransferRng),
        };
        loop {
            let mut transfers = Vec::new();
            for class in self.classes.iter_mut().filter(|c| c.has_pending_outflow()) {
                transfers.extend(class.send_out_members(&mut context));
            }
            for transfer in &transfers {
                let destination = &mut self.classes[transfer.to];
                if transfer.birth {
                    summary.births += transfer.count;
                }
                if matches!(destination.kind, ClassKind::Death) {
                    summary.deaths += transfer.count;
                }
                destination.stage_inflow(transfer.count);
            }
            for class in self.classes.iter_mut().filter(|c| c.has_staged_inflow()) {
                class.receive_staged();
            }
            if !self.classes.iter().any(Class::has_pending_outflow) {
                break;
            }
        }
    }

    /// Simulates a whole trajectory from `seed`.
    pub fn simulate(&mut self, seed: u64) -> TrajectoryStatus {
        self.reset(seed);
        let reason = loop {
            if let Some(reason) = self.step().stop {
                break reason;
            }
        };
        if self.model.settings().record_history {
            self.history
                .record(self.step, self.started_epidemic_time(), &self.classes);
        }

        let settings = self.model.settings();
        let status = if reason == StopReason::Infeasible
            || (settings.intended_use == IntendedUse::Calibrate && self.collector.is_infeasible())
        {
            TrajectoryStatus::Infeasible
        } else if self.epidemic_time() < settings.min_condition_time {
            TrajectoryStatus::ConditionTimeNotReached
        } else {
            TrajectoryStatus::Accepted
        };
        debug!(
            "epidemic {}: seed {} stopped ({:?}) after {} steps: {:?}",
            self.id, seed, reason, self.step, status
        );
        status
    }

    /// Simulates with seeds `seed_low, seed_low + 1, ...` until a trajectory is accepted or
    /// `seed_high` has been tried.
    pub fn simulate_until_acceptable(&mut self, seed_low: u64, seed_high: u64) -> SeedSearch {
        let mut discarded = 0;
        for seed in seed_low..=seed_high {
            if self.simulate(seed) == TrajectoryStatus::Accepted {
                self.realized_seed = Some(seed);
                return SeedSearch {
                    discarded,
                    seed: Some(seed),
                };
            }
            discarded += 1;
        }
        debug!(
            "epidemic {}: no acceptable trajectory with seeds {seed_low}..={seed_high}",
            self.id
        );
        self.realized_seed = None;
        SeedSearch {
            discarded,
            seed: None,
        }
    }

    /// # Errors
    ///
    /// See `InterventionMonitor::set_predetermined_sequence`.
    pub fn set_predetermined_sequence(
        &mut self,
        intervention: InterventionId,
        sequence: Vec<bool>,
    ) -> Result<(), EpiError> {
        self.monitor.set_predetermined_sequence(intervention, sequence)
    }

    /// # Errors
    ///
    /// See `InterventionMonitor::set_dynamic_decision`.
    pub fn set_dynamic_decision(
        &mut self,
        intervention: InterventionId,
        on: bool,
    ) -> Result<(), EpiError> {
        self.monitor.set_dynamic_decision(intervention, on)
    }

    #[must_use]
    pub fn id(&self) -> usize {
        self.id
    }

    #[must_use]
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Seed of the trajectory currently held.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Seed accepted by the last `simulate_until_acceptable`.
    #[must_use]
    pub fn realized_seed(&self) -> Option<u64> {
        self.realized_seed
    }

    #[must_use]
    pub fn current_step(&self) -> u64 {
        self.step
    }

    /// Epidemic time, zero until it starts.
    #[must_use]
    pub fn epidemic_time(&self) -> f64 {
        self.started_epidemic_time().unwrap_or(0.0)
    }

    #[allow(clippy::cast_precision_loss)]
    fn started_epidemic_time(&self) -> Option<f64> {
        self.epidemic_steps
            .map(|steps| steps as f64 * self.model.settings().delta_t)
    }

    #[must_use]
    pub fn classes(&self) -> &[Class] {
        &self.classes
    }

    #[must_use]
    pub fn class_counts(&self) -> Vec<u64> {
        self.classes.iter().map(Class::members).collect()
    }

    #[must_use]
    pub fn parameter_values(&self) -> &[f64] {
        &self.parameter_values
    }

    /// Values of the parameters included in calibration.
    #[must_use]
    pub fn calibration_draw(&self) -> Vec<f64> {
        self.model
            .parameters()
            .calibration_draw(&self.parameter_values)
    }

    #[must_use]
    pub fn interventions_in_effect(&self) -> &[bool] {
        self.monitor.in_effect()
    }

    #[must_use]
    pub fn is_eradicated(&self) -> bool {
        self.eradicated
    }

    #[must_use]
    pub fn total_cost(&self) -> f64 {
        self.total_cost
    }

    #[must_use]
    pub fn total_health(&self) -> f64 {
        self.total_health
    }

    #[must_use]
    pub fn history(&self) -> &TrajectoryHistory {
        &self.history
    }

    /// Observation matrix of the current trajectory: rows are observation periods, columns are
    /// the model's observation channels.
    #[must_use]
    pub fn observations(&self) -> &[Vec<f64>] {
        self.collector.observations()
    }

    #[must_use]
    pub fn outcome(&self) -> TrajectoryOutcome {
        TrajectoryOutcome {
            id: self.id,
            seed: self.seed,
            steps: self.step,
            epidemic_time: self.epidemic_time(),
            eradicated: self.eradicated,
            total_cost: self.total_cost,
            total_health: self.total_health,
            cumulative_incidence: self.classes.iter().map(Class::cumulative_incidence).collect(),
            final_counts: self.class_counts(),
        }
    }
}
