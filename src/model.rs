//! Model description and validation.
//!
//! A model is described by a JSON document deserialized into `ModelConfig`. Every entity lives in
//! an array and is referred to by its position. `Model::from_config` checks every reference and
//! freezes the result into an immutable `Model`, which is shared (behind an `Arc`) by all the
//! epidemics simulating it.

use std::fs;
use std::path::Path;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::calibration::{CalibrationTarget, GoodnessOfFit};
use crate::class::{Class, ClassId, ClassKind, Resource};
use crate::condition::{Condition, ConditionSet, Feature};
use crate::error::{config_error, EpiError};
use crate::event::{Event, EventKind};
use crate::force_of_infection::{ContactConfig, ForceOfInfection};
use crate::intervention::{DecisionRule, Intervention};
use crate::parameter::{Parameter, ParameterKind, ParameterSet};
use crate::trajectory::{FeasibleRange, ObservationChannel, Statistic};

fn one_step() -> u64 {
    1
}

fn unit() -> f64 {
    1.0
}

/// When epidemic time starts counting.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EpidemicStart {
    #[default]
    StepZero,
    /// At the first step in which `class` receives new members.
    FirstIncidence { class: ClassId },
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntendedUse {
    #[default]
    Simulate,
    /// Trajectories leaving a target's feasible range are stopped and discarded.
    Calibrate,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "unit")]
    pub delta_t: f64,
    pub horizon_steps: u64,
    #[serde(default = "one_step")]
    pub decision_interval_steps: u64,
    #[serde(default = "one_step")]
    pub observation_period_steps: u64,
    /// Epidemic time a trajectory must reach to be accepted.
    #[serde(default)]
    pub min_condition_time: f64,
    #[serde(default)]
    pub epidemic_start: EpidemicStart,
    #[serde(default)]
    pub intended_use: IntendedUse,
    /// Costs and health outcomes at time `t` are weighted by `(1 + discount_rate)^-t`.
    #[serde(default)]
    pub discount_rate: f64,
    /// Keep a snapshot of every class count at every step.
    #[serde(default)]
    pub record_history: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            delta_t: 1.0,
            horizon_steps: 100,
            decision_interval_steps: 1,
            observation_period_steps: 1,
            min_condition_time: 0.0,
            epidemic_start: EpidemicStart::StepZero,
            intended_use: IntendedUse::Simulate,
            discount_rate: 0.0,
            record_history: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterConfig {
    pub name: String,
    #[serde(flatten)]
    pub kind: ParameterKind,
    #[serde(default)]
    pub include_in_calibration: bool,
}

/// A calibration target and the observation channel it reads.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    pub name: String,
    #[serde(default = "unit")]
    pub weight: f64,
    pub classes: Vec<ClassId>,
    pub statistic: Statistic,
    #[serde(default)]
    pub feasible_range: Option<FeasibleRange>,
    pub goodness_of_fit: GoodnessOfFit,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub parameters: Vec<ParameterConfig>,
    pub classes: Vec<Class>,
    #[serde(default)]
    pub events: Vec<Event>,
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub interventions: Vec<Intervention>,
    #[serde(default)]
    pub features: Vec<Feature>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub contacts: ContactConfig,
    #[serde(default)]
    pub calibration_targets: Vec<TargetConfig>,
}

/// A validated, immutable model.
#[derive(Clone, Debug)]
pub struct Model {
    name: String,
    settings: Settings,
    parameters: ParameterSet,
    classes: Vec<Class>,
    events: Vec<Event>,
    resources: Vec<Resource>,
    interventions: Vec<Intervention>,
    conditions: ConditionSet,
    force_of_infection: ForceOfInfection,
    channels: Vec<ObservationChannel>,
    targets: Vec<CalibrationTarget>,
}

/// Checks ids against the sizes of the arenas they index.
struct References {
    parameters: usize,
    classes: usize,
    resources: usize,
    interventions: usize,
    conditions: usize,
    pathogens: usize,
}

impl References {
    fn parameter(&self, id: usize, owner: &str) -> Result<(), EpiError> {
        if id >= self.parameters {
            return Err(config_error!("{owner} refers to undefined parameter {id}"));
        }
        Ok(())
    }

    fn optional_parameter(&self, id: Option<usize>, owner: &str) -> Result<(), EpiError> {
        id.map_or(Ok(()), |id| self.parameter(id, owner))
    }

    fn class(&self, id: usize, owner: &str) -> Result<(), EpiError> {
        if id >= self.classes {
            return Err(config_error!("{owner} refers to undefined class {id}"));
        }
        Ok(())
    }

    fn intervention(&self, id: usize, owner: &str) -> Result<(), EpiError> {
        if id >= self.interventions {
            return Err(config_error!("{owner} refers to undefined intervention {id}"));
        }
        Ok(())
    }

    fn condition(&self, id: usize, owner: &str) -> Result<(), EpiError> {
        if id >= self.conditions {
            return Err(config_error!("{owner} refers to undefined condition {id}"));
        }
        Ok(())
    }
}

fn validate_settings(settings: &Settings, classes: usize) -> Result<(), EpiError> {
    if !(settings.delta_t.is_finite() && settings.delta_t > 0.0) {
        return Err(config_error!("delta_t must be positive, got {}", settings.delta_t));
    }
    if settings.horizon_steps == 0 {
        return Err(config_error!("horizon_steps must be at least 1"));
    }
    if settings.decision_interval_steps == 0 || settings.observation_period_steps == 0 {
        return Err(config_error!(
            "decision_interval_steps and observation_period_steps must be at least 1"
        ));
    }
    if !(settings.discount_rate > -1.0) {
        return Err(config_error!("discount_rate must be greater than -1"));
    }
    if let EpidemicStart::FirstIncidence { class } = settings.epidemic_start {
        if class >= classes {
            return Err(config_error!("epidemic_start refers to undefined class {class}"));
        }
    }
    Ok(())
}

fn validate_class(class: &Class, refs: &References, groups: usize) -> Result<(), EpiError> {
    let owner = format!("class `{}`", class.name);
    refs.optional_parameter(class.initial_size, &owner)?;
    for cost in [
        class.cost_per_unit_time,
        class.health_per_unit_time,
        class.cost_per_new_member,
        class.health_per_new_member,
    ] {
        refs.optional_parameter(cost, &owner)?;
    }
    match &class.kind {
        ClassKind::Normal {
            susceptibility,
            infectivity,
            contact_group,
            ..
        } => {
            if *contact_group >= groups {
                return Err(config_error!(
                    "{owner} mixes in undefined contact group {contact_group}"
                ));
            }
            for list in [susceptibility, infectivity] {
                if list.len() > refs.pathogens {
                    return Err(config_error!(
                        "{owner} lists more pathogens than the {} defined",
                        refs.pathogens
                    ));
                }
                for id in list.iter().flatten() {
                    refs.parameter(*id, &owner)?;
                }
            }
        }
        ClassKind::Death => {}
        ClassKind::Splitting {
            probability,
            success,
            failure,
        } => {
            refs.parameter(*probability, &owner)?;
            refs.class(*success, &owner)?;
            refs.class(*failure, &owner)?;
        }
        ClassKind::ResourceMonitor {
            resource,
            success,
            failure,
        } => {
            if *resource >= refs.resources {
                return Err(config_error!("{owner} refers to undefined resource {resource}"));
            }
            refs.class(*success, &owner)?;
            refs.class(*failure, &owner)?;
        }
    }
    Ok(())
}

/// Instantaneous classes route members within the step they arrive, so a cycle among them
/// would never settle.
fn check_instantaneous_cycles(classes: &[Class]) -> Result<(), EpiError> {
    fn successors(class: &Class) -> Vec<ClassId> {
        match class.kind {
            ClassKind::Splitting {
                success, failure, ..
            }
            | ClassKind::ResourceMonitor {
                success, failure, ..
            } => vec![success, failure],
            _ => Vec::new(),
        }
    }

    // 0 = unvisited, 1 = on the current path, 2 = done
    let mut state = vec![0u8; classes.len()];
    for start in 0..classes.len() {
        if state[start] != 0 || !classes[start].kind.is_instantaneous() {
            continue;
        }
        let mut stack = vec![(start, successors(&classes[start]))];
        state[start] = 1;
        while let Some((node, next)) = stack.last_mut() {
            let node = *node;
            match next.pop() {
                Some(child) if classes[child].kind.is_instantaneous() => match state[child] {
                    1 => {
                        return Err(config_error!(
                            "classes `{}` and `{}` route members to each other within one step",
                            classes[node].name,
                            classes[child].name
                        ));
                    }
                    0 => {
                        state[child] = 1;
                        stack.push((child, successors(&classes[child])));
                    }
                    _ => {}
                },
                Some(_) => {}
                None => {
                    state[node] = 2;
                    stack.pop();
                }
            }
        }
    }
    Ok(())
}

fn validate_event(event: &Event, classes: &[Class], refs: &References) -> Result<(), EpiError> {
    let owner = format!("event `{}`", event.name);
    refs.class(event.source, &owner)?;
    refs.class(event.destination, &owner)?;
    if !matches!(classes[event.source].kind, ClassKind::Normal { .. }) {
        return Err(config_error!(
            "{owner} leaves class `{}`, which cannot own events",
            classes[event.source].name
        ));
    }
    match event.kind {
        EventKind::Birth { rate } | EventKind::EpidemicIndependent { rate } => {
            refs.parameter(rate, &owner)?;
        }
        EventKind::EpidemicDependent { pathogen } => {
            if pathogen >= refs.pathogens {
                return Err(config_error!("{owner} refers to undefined pathogen {pathogen}"));
            }
        }
    }
    if let Some(intervention) = event.activating_intervention {
        refs.intervention(intervention, &owner)?;
    }
    Ok(())
}

fn validate_intervention(intervention: &Intervention, refs: &References) -> Result<(), EpiError> {
    let owner = format!("intervention `{}`", intervention.name);
    for cost in [
        intervention.switch_on_cost,
        intervention.cost_per_unit_time,
        intervention.switch_off_penalty,
    ] {
        refs.optional_parameter(cost, &owner)?;
    }
    match &intervention.rule {
        DecisionRule::ConditionBased {
            switch_on,
            switch_off,
        } => {
            refs.condition(*switch_on, &owner)?;
            if let Some(switch_off) = switch_off {
                refs.condition(*switch_off, &owner)?;
            }
        }
        DecisionRule::Periodic {
            on_duration,
            period,
            ..
        } if !(period.is_finite() && *period > 0.0) || !(*on_duration >= 0.0) => {
            return Err(config_error!(
                "{owner} needs a positive period and a non-negative duration"
            ));
        }
        _ => {}
    }
    Ok(())
}

impl Model {
    /// Validates `config` and freezes it into a model.
    ///
    /// # Errors
    ///
    /// `EpiError::ConfigError` describing the first inconsistency found.
    pub fn from_config(config: ModelConfig) -> Result<Model, EpiError> {
        let ModelConfig {
            name,
            settings,
            parameters,
            mut classes,
            events,
            mut resources,
            mut interventions,
            features,
            conditions,
            contacts,
            calibration_targets,
        } = config;

        validate_settings(&settings, classes.len())?;

        let parameters = ParameterSet::new(
            parameters
                .into_iter()
                .enumerate()
                .map(|(id, p)| Parameter::new(id, p.name, p.kind, p.include_in_calibration))
                .collect::<Result<Vec<_>, _>>()?,
        )?;
        let force_of_infection = ForceOfInfection::new(contacts)?;
        let conditions = ConditionSet::new(features, conditions)?;

        let refs = References {
            parameters: parameters.len(),
            classes: classes.len(),
            resources: resources.len(),
            interventions: interventions.len(),
            conditions: conditions.len(),
            pathogens: force_of_infection.pathogens(),
        };

        for (id, class) in classes.iter_mut().enumerate() {
            class.id = id;
            if let ClassKind::Normal { events, .. } = &mut class.kind {
                events.clear();
            }
            validate_class(class, &refs, force_of_infection.groups())?;
        }
        check_instantaneous_cycles(&classes)?;

        for (id, event) in events.iter().enumerate() {
            validate_event(event, &classes, &refs)?;
            if let ClassKind::Normal { events, .. } = &mut classes[event.source].kind {
                events.push(id);
            }
        }

        for resource in &mut resources {
            let owner = format!("resource `{}`", resource.name);
            refs.parameter(resource.capacity, &owner)?;
            refs.optional_parameter(resource.units_per_member, &owner)?;
        }

        for (id, intervention) in interventions.iter_mut().enumerate() {
            intervention.id = id;
            validate_intervention(intervention, &refs)?;
        }

        conditions.validate_references(classes.len(), interventions.len(), parameters.len())?;
        force_of_infection.validate_references(interventions.len(), parameters.len())?;

        let mut channels = Vec::with_capacity(calibration_targets.len());
        let mut targets = Vec::with_capacity(calibration_targets.len());
        for (channel, target) in calibration_targets.into_iter().enumerate() {
            for class in &target.classes {
                refs.class(*class, &format!("calibration target `{}`", target.name))?;
            }
            channels.push(ObservationChannel {
                name: target.name.clone(),
                classes: target.classes,
                statistic: target.statistic,
                feasible_range: target.feasible_range,
            });
            targets.push(CalibrationTarget::new(
                target.name,
                target.weight,
                channel,
                target.goodness_of_fit,
            )?);
        }

        debug!(
            "validated model `{}`: {} parameters, {} classes, {} events, {} interventions",
            name,
            parameters.len(),
            classes.len(),
            events.len(),
            interventions.len()
        );

        Ok(Model {
            name,
            settings,
            parameters,
            classes,
            events,
            resources,
            interventions,
            conditions,
            force_of_infection,
            channels,
            targets,
        })
    }

    /// Reads a JSON model description from `path`.
    ///
    /// # Errors
    ///
    /// `EpiError::IoError` if the file cannot be read, `EpiError::JsonError` if it is not a valid
    /// model description, `EpiError::ConfigError` if it fails validation.
    pub fn load(path: &Path) -> Result<Model, EpiError> {
        info!("Loading model from {}", path.display());
        let text = fs::read_to_string(path)?;
        let config: ModelConfig = serde_json::from_str(&text)?;
        Model::from_config(config)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[must_use]
    pub fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    #[must_use]
    pub fn classes(&self) -> &[Class] {
        &self.classes
    }

    #[must_use]
    pub fn class_names(&self) -> Vec<&str> {
        self.classes.iter().map(|c| c.name.as_str()).collect()
    }

    #[must_use]
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    #[must_use]
    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    #[must_use]
    pub fn interventions(&self) -> &[Intervention] {
        &self.interventions
    }

    #[must_use]
    pub fn conditions(&self) -> &ConditionSet {
        &self.conditions
    }

    #[must_use]
    pub fn force_of_infection(&self) -> &ForceOfInfection {
        &self.force_of_infection
    }

    #[must_use]
    pub fn observation_channels(&self) -> &[ObservationChannel] {
        &self.channels
    }

    #[must_use]
    pub fn calibration_targets(&self) -> &[CalibrationTarget] {
        &self.targets
    }
}
