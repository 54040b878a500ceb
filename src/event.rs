//! Events: typed transition rules moving members out of a class.

use serde::{Deserialize, Serialize};

use crate::class::ClassId;
use crate::force_of_infection::PathogenId;
use crate::intervention::InterventionId;
use crate::parameter::ParameterId;

pub type EventId = usize;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// New members are born into `destination` at `rate` per source member per unit time. The
    /// source keeps its members.
    Birth { rate: ParameterId },
    /// Members leave at a fixed per-member rate (recovery, ageing, death, ...).
    EpidemicIndependent { rate: ParameterId },
    /// Infection: members leave at the source class's current transmission rate for `pathogen`.
    EpidemicDependent { pathogen: PathogenId },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub kind: EventKind,
    pub source: ClassId,
    pub destination: ClassId,
    /// Active only while this intervention is in effect. `None` means always active.
    #[serde(default)]
    pub activating_intervention: Option<InterventionId>,
}

impl Event {
    #[must_use]
    pub fn is_active(&self, in_effect: &[bool]) -> bool {
        self.activating_intervention
            .is_none_or(|intervention| in_effect.get(intervention).copied().unwrap_or(false))
    }

    #[must_use]
    pub fn removes_members(&self) -> bool {
        !matches!(self.kind, EventKind::Birth { .. })
    }

    /// The per-member rate of this event right now. `transmission_rates` are the source class's
    /// rates, one per pathogen.
    #[must_use]
    pub fn rate(&self, parameters: &[f64], transmission_rates: &[f64]) -> f64 {
        let rate = match self.kind {
            EventKind::Birth { rate } | EventKind::EpidemicIndependent { rate } => parameters[rate],
            EventKind::EpidemicDependent { pathogen } => {
                transmission_rates.get(pathogen).copied().unwrap_or(0.0)
            }
        };
        if rate.is_finite() {
            rate.max(0.0)
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activation_follows_intervention() {
        let mut event = Event {
            name: "vaccinate".to_string(),
            kind: EventKind::EpidemicIndependent { rate: 0 },
            source: 0,
            destination: 1,
            activating_intervention: None,
        };
        assert!(event.is_active(&[]));
        event.activating_intervention = Some(1);
        assert!(!event.is_active(&[true, false]));
        assert!(event.is_active(&[false, true]));
        assert!(!event.is_active(&[true]));
    }

    #[test]
    fn rates_come_from_parameters_or_transmission() {
        let recovery = Event {
            name: String::new(),
            kind: EventKind::EpidemicIndependent { rate: 1 },
            source: 1,
            destination: 2,
            activating_intervention: None,
        };
        assert_eq!(recovery.rate(&[0.0, 0.25], &[]), 0.25);
        assert!(recovery.removes_members());

        let infection = Event {
            name: String::new(),
            kind: EventKind::EpidemicDependent { pathogen: 1 },
            source: 0,
            destination: 1,
            activating_intervention: None,
        };
        assert_eq!(infection.rate(&[], &[0.1, 0.3]), 0.3);
        assert_eq!(infection.rate(&[], &[0.1]), 0.0);

        let birth = Event {
            name: String::new(),
            kind: EventKind::Birth { rate: 0 },
            source: 0,
            destination: 0,
            activating_intervention: None,
        };
        assert!(!birth.removes_members());
        assert_eq!(birth.rate(&[-1.0], &[]), 0.0);
    }

    #[test]
    fn deserializes_flattened_kind() {
        let event: Event = serde_json::from_str(
            r#"{"name": "infection", "type": "epidemic_dependent", "pathogen": 0, "source": 0, "destination": 1}"#,
        )
        .unwrap();
        assert_eq!(event.kind, EventKind::EpidemicDependent { pathogen: 0 });
        assert_eq!(event.activating_intervention, None);
    }
}
