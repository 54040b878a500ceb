//! Classes (compartments) and the resources some of them consume.
//!
//! A class is a pool of members. Every step each class with pending work sends members out
//! through `send_out_members`, and every class with staged arrivals takes them in through
//! `add_new_members`. The `Epidemic` repeats the two phases until no class has pending work, so a
//! cohort can pass through any number of instantaneous classes (splitting, resource monitors) in
//! the step it arrives.
//!
//! Departures from a normal class follow competing exponential risks. With per-member rates
//! `r_i` of the active removal events and `λ = Σ r_i`, a member leaves during a step of length
//! `Δt` with probability `1 − exp(−λΔt)`, and leaves through event `i` with probability
//! `(1 − exp(−λΔt)) · r_i / λ`. One multinomial draw over the events (plus "stays") splits the
//! pre-transfer count, realized as conditional binomial draws in event order.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::event::{Event, EventId};
use crate::parameter::ParameterId;
use crate::random::{sample_binomial, sample_poisson};

pub type ClassId = usize;
pub type ResourceId = usize;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClassKind {
    Normal {
        /// Susceptibility parameter per pathogen; `None` (or a missing entry) means immune.
        #[serde(default)]
        susceptibility: Vec<Option<ParameterId>>,
        /// Infectivity parameter per pathogen; `None` (or a missing entry) means not infectious.
        #[serde(default)]
        infectivity: Vec<Option<ParameterId>>,
        /// Row/column of the contact matrices this class mixes in.
        #[serde(default)]
        contact_group: usize,
        /// Outbound events in id order, filled in when the model is built.
        #[serde(skip)]
        events: Vec<EventId>,
    },
    /// Accumulates members and never lets them go.
    Death,
    /// Routes each arriving member to `success` with probability `probability`, otherwise to
    /// `failure`, in the step it arrives.
    Splitting {
        probability: ParameterId,
        success: ClassId,
        failure: ClassId,
    },
    /// Routes arriving members to `success` while `resource` has capacity for them, and the
    /// remainder to `failure`.
    ResourceMonitor {
        resource: ResourceId,
        success: ClassId,
        failure: ClassId,
    },
}

impl ClassKind {
    /// True for classes that pass members on in the step they arrive.
    #[must_use]
    pub fn is_instantaneous(&self) -> bool {
        matches!(
            self,
            ClassKind::Splitting { .. } | ClassKind::ResourceMonitor { .. }
        )
    }
}

/// A limited supply consumed by members passing a resource monitor class.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    pub capacity: ParameterId,
    /// Units one member consumes. Defaults to one.
    #[serde(default)]
    pub units_per_member: Option<ParameterId>,
    /// Restore full capacity at every decision epoch instead of once per trajectory.
    #[serde(default)]
    pub replenish_at_decision_epochs: bool,
    #[serde(skip)]
    available: f64,
}

impl Resource {
    #[must_use]
    pub fn new(name: impl Into<String>, capacity: ParameterId) -> Resource {
        Resource {
            name: name.into(),
            capacity,
            units_per_member: None,
            replenish_at_decision_epochs: false,
            available: 0.0,
        }
    }

    pub fn replenish(&mut self, parameters: &[f64]) {
        self.available = parameters[self.capacity].max(0.0);
    }

    #[must_use]
    pub fn available(&self) -> f64 {
        self.available
    }

    /// Serves as many of `requested` members as the remaining capacity allows and returns how many
    /// were served.
    fn serve(&mut self, requested: u64, parameters: &[f64]) -> u64 {
        let units = self.units_per_member.map_or(1.0, |p| parameters[p]);
        if units <= 0.0 {
            return requested;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let affordable = (self.available / units).floor() as u64;
        let served = requested.min(affordable);
        #[allow(clippy::cast_precision_loss)]
        let consumed = served as f64 * units;
        self.available = (self.available - consumed).max(0.0);
        served
    }
}

/// A batch of members moving between two classes within one step.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Transfer {
    pub from: ClassId,
    pub to: ClassId,
    pub count: u64,
    /// Births add members to `to` without removing any from `from`.
    pub birth: bool,
}

/// What a class needs from the epidemic to send its members out.
pub struct TransferContext<'a, R: Rng + ?Sized> {
    pub delta_t: f64,
    pub parameters: &'a [f64],
    pub events: &'a [Event],
    /// Current per-member rate of every event, zero for inactive events.
    pub event_rates: &'a [f64],
    pub resources: &'a mut [Resource],
    pub rng: &'a mut R,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Class {
    #[serde(skip)]
    pub id: ClassId,
    pub name: String,
    #[serde(flatten)]
    pub kind: ClassKind,
    /// Members at the start of a trajectory (rounded, negative values count as zero).
    #[serde(default)]
    pub initial_size: Option<ParameterId>,
    /// The epidemic is eradicated once every class carrying this flag is empty.
    #[serde(default)]
    pub empty_to_eradicate: bool,
    #[serde(default)]
    pub cost_per_unit_time: Option<ParameterId>,
    #[serde(default)]
    pub health_per_unit_time: Option<ParameterId>,
    #[serde(default)]
    pub cost_per_new_member: Option<ParameterId>,
    #[serde(default)]
    pub health_per_new_member: Option<ParameterId>,

    #[serde(skip)]
    members: u64,
    #[serde(skip)]
    cumulative_incidence: u64,
    #[serde(skip)]
    step_incidence: u64,
    #[serde(skip)]
    epoch_incidence: u64,
    /// Arrivals staged for delivery this step.
    #[serde(skip)]
    staged_inflow: u64,
    /// Members waiting to be routed by an instantaneous class.
    #[serde(skip)]
    cohort: u64,
    /// A normal class sends out once per step, before it receives anything.
    #[serde(skip)]
    outflow_pending: bool,
}

impl Class {
    #[must_use]
    pub fn new(id: ClassId, name: impl Into<String>, kind: ClassKind) -> Class {
        Class {
            id,
            name: name.into(),
            kind,
            initial_size: None,
            empty_to_eradicate: false,
            cost_per_unit_time: None,
            health_per_unit_time: None,
            cost_per_new_member: None,
            health_per_new_member: None,
            members: 0,
            cumulative_incidence: 0,
            step_incidence: 0,
            epoch_incidence: 0,
            staged_inflow: 0,
            cohort: 0,
            outflow_pending: false,
        }
    }

    /// Restores the state at the start of a trajectory.
    pub fn reset(&mut self, parameters: &[f64]) {
        self.members = match (&self.kind, self.initial_size) {
            (ClassKind::Normal { .. } | ClassKind::Death, Some(size)) => {
                let size = parameters[size];
                if size.is_finite() && size > 0.0 {
                    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                    let size = size.round() as u64;
                    size
                } else {
                    0
                }
            }
            _ => 0,
        };
        self.cumulative_incidence = 0;
        self.step_incidence = 0;
        self.epoch_incidence = 0;
        self.reset_staging();
    }

    /// Clears staged transfers and marks a normal class as ready to send out this step.
    pub fn reset_staging(&mut self) {
        self.staged_inflow = 0;
        self.cohort = 0;
        self.step_incidence = 0;
        self.outflow_pending = matches!(&self.kind, ClassKind::Normal { events, .. } if !events.is_empty());
    }

    pub fn reset_epoch_incidence(&mut self) {
        self.epoch_incidence = 0;
    }

    #[must_use]
    pub fn members(&self) -> u64 {
        self.members
    }

    #[must_use]
    pub fn cumulative_incidence(&self) -> u64 {
        self.cumulative_incidence
    }

    /// New members received during the current step.
    #[must_use]
    pub fn step_incidence(&self) -> u64 {
        self.step_incidence
    }

    /// New members received since the last decision epoch.
    #[must_use]
    pub fn epoch_incidence(&self) -> u64 {
        self.epoch_incidence
    }

    #[must_use]
    pub fn has_pending_outflow(&self) -> bool {
        self.outflow_pending || self.cohort > 0
    }

    #[must_use]
    pub fn has_staged_inflow(&self) -> bool {
        self.staged_inflow > 0
    }

    pub fn stage_inflow(&mut self, count: u64) {
        self.staged_inflow += count;
    }

    /// Takes in the staged arrivals. Instantaneous classes hold them as a cohort to route next.
    pub fn receive_staged(&mut self) {
        let count = std::mem::take(&mut self.staged_inflow);
        self.add_new_members(count);
    }

    pub fn add_new_members(&mut self, count: u64) {
        self.cumulative_incidence += count;
        self.step_incidence += count;
        self.epoch_incidence += count;
        if self.kind.is_instantaneous() {
            self.cohort += count;
        } else {
            self.members += count;
        }
    }

    /// Draws this step's departures and returns them as transfers. The members leave the class
    /// immediately; the caller stages them at their destinations.
    pub fn send_out_members<R: Rng + ?Sized>(
        &mut self,
        context: &mut TransferContext<'_, R>,
    ) -> Vec<Transfer> {
        match &self.kind {
            ClassKind::Normal { events, .. } => {
                self.outflow_pending = false;
                let events = events.clone();
                self.send_out_normal(&events, context)
            }
            ClassKind::Death => Vec::new(),
            &ClassKind::Splitting {
                probability,
                success,
                failure,
            } => {
                let cohort = std::mem::take(&mut self.cohort);
                let p = context.parameters[probability];
                let succeeded = sample_binomial(&mut *context.rng, cohort, p);
                self.route(cohort, succeeded, success, failure)
            }
            &ClassKind::ResourceMonitor {
                resource,
                success,
                failure,
            } => {
                let cohort = std::mem::take(&mut self.cohort);
                let served = context.resources[resource].serve(cohort, context.parameters);
                self.route(cohort, served, success, failure)
            }
        }
    }

    fn route(&self, cohort: u64, succeeded: u64, success: ClassId, failure: ClassId) -> Vec<Transfer> {
        [(success, succeeded), (failure, cohort - succeeded)]
            .into_iter()
            .filter(|&(_, count)| count > 0)
            .map(|(to, count)| Transfer {
                from: self.id,
                to,
                count,
                birth: false,
            })
            .collect()
    }

    fn send_out_normal<R: Rng + ?Sized>(
        &mut self,
        events: &[EventId],
        context: &mut TransferContext<'_, R>,
    ) -> Vec<Transfer> {
        let n = self.members;
        let mut transfers = Vec::new();
        if n == 0 {
            return transfers;
        }
        #[allow(clippy::cast_precision_loss)]
        let population = n as f64;

        let removals: Vec<(EventId, f64)> = events
            .iter()
            .map(|&id| (id, context.event_rates[id]))
            .filter(|&(id, rate)| rate > 0.0 && context.events[id].removes_members())
            .collect();
        let total_rate: f64 = removals.iter().map(|(_, rate)| rate).sum();
        if total_rate > 0.0 {
            let leave = -(-total_rate * context.delta_t).exp_m1();
            let mut remaining = n;
            let mut remaining_mass = 1.0;
            for &(id, rate) in &removals {
                if remaining == 0 {
                    break;
                }
                let p = leave * rate / total_rate;
                let conditional = if remaining_mass > 0.0 {
                    (p / remaining_mass).min(1.0)
                } else {
                    0.0
                };
                let count = sample_binomial(&mut *context.rng, remaining, conditional);
                remaining -= count;
                remaining_mass -= p;
                if count > 0 {
                    transfers.push(Transfer {
                        from: self.id,
                        to: context.events[id].destination,
                        count,
                        birth: false,
                    });
                }
            }
            self.members = remaining;
        }

        for &id in events {
            let rate = context.event_rates[id];
            if context.events[id].removes_members() || rate <= 0.0 {
                continue;
            }
            let count = sample_poisson(&mut *context.rng, rate * population * context.delta_t);
            if count > 0 {
                transfers.push(Transfer {
                    from: self.id,
                    to: context.events[id].destination,
                    count,
                    birth: true,
                });
            }
        }
        transfers
    }

    /// Undiscounted cost and health accrued by this class during a step of length `delta_t`,
    /// from its current members and the members it received this step.
    #[must_use]
    pub fn step_cost_and_health(&self, parameters: &[f64], delta_t: f64) -> (f64, f64) {
        #[allow(clippy::cast_precision_loss)]
        let (members, new_members) = (self.members as f64, self.step_incidence as f64);
        let value = |p: Option<ParameterId>| p.map_or(0.0, |p| parameters[p]);
        let cost = value(self.cost_per_unit_time) * members * delta_t
            + value(self.cost_per_new_member) * new_members;
        let health = value(self.health_per_unit_time) * members * delta_t
            + value(self.health_per_new_member) * new_members;
        (cost, health)
    }
}
