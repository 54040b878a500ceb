//! Contact matrices and per-class transmission rates.
//!
//! Every pathogen has a base contact matrix over the mixing groups. Interventions may carry
//! deltas that are added to the base matrix while they are in effect. Since at most
//! `MAX_DELTA_INTERVENTIONS` interventions carry deltas, the effective matrices for every on/off
//! combination of those interventions are computed once per trajectory and looked up by a bitmask
//! afterwards.
//!
//! The transmission rate of class `i` for pathogen `p` is
//!
//! ```text
//! rate[i][p] = susceptibility[i][p] · Σ_j C[p][group(i)][group(j)] · infectivity[j][p] · n_j / N_group(j)
//! ```
//!
//! summed over the infectious classes `j`, where `N_g` is the number of members of normal classes
//! mixing in group `g`.

use serde::{Deserialize, Serialize};

use crate::class::{Class, ClassKind};
use crate::error::{config_error, EpiError};
use crate::intervention::InterventionId;
use crate::parameter::ParameterId;

pub type PathogenId = usize;
pub type ContactMatrix = Vec<Vec<f64>>;

pub const MAX_DELTA_INTERVENTIONS: usize = 16;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContactDelta {
    pub intervention: InterventionId,
    pub pathogen: PathogenId,
    pub matrix: ContactMatrix,
    /// Multiplies the delta. Defaults to one.
    #[serde(default)]
    pub scale: Option<ParameterId>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactConfig {
    /// Mixing group names; their order defines matrix rows and columns.
    pub groups: Vec<String>,
    /// One base matrix per pathogen.
    pub base: Vec<ContactMatrix>,
    #[serde(default)]
    pub deltas: Vec<ContactDelta>,
}

fn check_dimensions(matrix: &ContactMatrix, groups: usize, what: &str) -> Result<(), EpiError> {
    if matrix.len() != groups || matrix.iter().any(|row| row.len() != groups) {
        return Err(config_error!(
            "{what} must be a {groups}x{groups} matrix"
        ));
    }
    Ok(())
}

fn value_for(list: &[Option<ParameterId>], pathogen: PathogenId, parameters: &[f64]) -> f64 {
    list.get(pathogen)
        .copied()
        .flatten()
        .map_or(0.0, |id| parameters[id])
}

#[derive(Clone, Debug)]
pub struct ForceOfInfection {
    groups: usize,
    base: Vec<ContactMatrix>,
    deltas: Vec<ContactDelta>,
    /// Interventions carrying deltas, sorted; bit `k` of a combination key stands for the `k`-th.
    delta_interventions: Vec<InterventionId>,
    /// `[combination][pathogen]`
    contact_matrices: Vec<Vec<ContactMatrix>>,
    /// `[class][pathogen]`
    transmission_rates: Vec<Vec<f64>>,
}

impl ForceOfInfection {
    /// # Errors
    ///
    /// `EpiError::ConfigError` if a matrix has the wrong shape, a delta names an unknown pathogen,
    /// or more than `MAX_DELTA_INTERVENTIONS` interventions carry deltas.
    pub fn new(config: ContactConfig) -> Result<Self, EpiError> {
        let groups = config.groups.len().max(1);
        for (pathogen, matrix) in config.base.iter().enumerate() {
            check_dimensions(matrix, groups, &format!("base contact matrix of pathogen {pathogen}"))?;
        }
        for delta in &config.deltas {
            if delta.pathogen >= config.base.len() {
                return Err(config_error!(
                    "contact delta of intervention {} refers to undefined pathogen {}",
                    delta.intervention,
                    delta.pathogen
                ));
            }
            check_dimensions(
                &delta.matrix,
                groups,
                &format!("contact delta of intervention {}", delta.intervention),
            )?;
        }
        let mut delta_interventions: Vec<InterventionId> =
            config.deltas.iter().map(|d| d.intervention).collect();
        delta_interventions.sort_unstable();
        delta_interventions.dedup();
        if delta_interventions.len() > MAX_DELTA_INTERVENTIONS {
            return Err(config_error!(
                "{} interventions carry contact deltas, at most {} are supported",
                delta_interventions.len(),
                MAX_DELTA_INTERVENTIONS
            ));
        }
        Ok(ForceOfInfection {
            groups,
            base: config.base,
            deltas: config.deltas,
            delta_interventions,
            contact_matrices: Vec::new(),
            transmission_rates: Vec::new(),
        })
    }

    #[must_use]
    pub fn pathogens(&self) -> usize {
        self.base.len()
    }

    #[must_use]
    pub fn groups(&self) -> usize {
        self.groups
    }

    /// Checks the intervention and parameter ids the deltas refer to.
    ///
    /// # Errors
    ///
    /// `EpiError::ConfigError` naming the first dangling reference.
    pub fn validate_references(
        &self,
        n_interventions: usize,
        n_parameters: usize,
    ) -> Result<(), EpiError> {
        for delta in &self.deltas {
            if delta.intervention >= n_interventions {
                return Err(config_error!(
                    "contact delta refers to undefined intervention {}",
                    delta.intervention
                ));
            }
            if let Some(scale) = delta.scale.filter(|&s| s >= n_parameters) {
                return Err(config_error!(
                    "contact delta refers to undefined parameter {scale}"
                ));
            }
        }
        Ok(())
    }

    /// Builds the effective contact matrices for every combination of delta-carrying
    /// interventions. Called once per trajectory, after parameters are sampled.
    pub fn calculate_contact_matrices(&mut self, parameters: &[f64]) {
        let combinations = 1usize << self.delta_interventions.len();
        self.contact_matrices = (0..combinations)
            .map(|key| {
                (0..self.base.len())
                    .map(|pathogen| self.combine(key, pathogen, parameters))
                    .collect()
            })
            .collect();
    }

    fn combine(&self, key: usize, pathogen: PathogenId, parameters: &[f64]) -> ContactMatrix {
        let mut matrix = self.base[pathogen].clone();
        for delta in self.deltas.iter().filter(|d| d.pathogen == pathogen) {
            let bit = self
                .delta_interventions
                .binary_search(&delta.intervention)
                .unwrap_or_default();
            if key & (1 << bit) == 0 {
                continue;
            }
            let scale = delta.scale.map_or(1.0, |id| parameters[id]);
            for (row, delta_row) in matrix.iter_mut().zip(&delta.matrix) {
                for (cell, change) in row.iter_mut().zip(delta_row) {
                    *cell += scale * change;
                }
            }
        }
        for cell in matrix.iter_mut().flatten() {
            *cell = cell.max(0.0);
        }
        matrix
    }

    /// The bitmask selecting the effective matrices for the interventions currently in effect.
    #[must_use]
    pub fn combination_key(&self, in_effect: &[bool]) -> usize {
        self.delta_interventions
            .iter()
            .enumerate()
            .filter(|&(_, &id)| in_effect.get(id).copied().unwrap_or(false))
            .fold(0, |key, (bit, _)| key | (1 << bit))
    }

    /// The effective contact matrix for `pathogen` under combination `key`, if computed.
    #[must_use]
    pub fn contact_matrix(&self, key: usize, pathogen: PathogenId) -> Option<&ContactMatrix> {
        self.contact_matrices.get(key)?.get(pathogen)
    }

    /// Recomputes every class's transmission rates from the current class counts.
    pub fn update_transmission_rates(
        &mut self,
        classes: &[Class],
        parameters: &[f64],
        in_effect: &[bool],
    ) {
        let pathogens = self.base.len();
        let key = self.combination_key(in_effect);

        let mut population = vec![0.0; self.groups];
        for class in classes {
            if let ClassKind::Normal { contact_group, .. } = &class.kind {
                #[allow(clippy::cast_precision_loss)]
                let members = class.members() as f64;
                population[*contact_group] += members;
            }
        }

        // pressure[p][g]: infectivity-weighted share of group g that is infectious with p.
        let mut pressure = vec![vec![0.0; self.groups]; pathogens];
        for class in classes {
            let ClassKind::Normal {
                infectivity,
                contact_group,
                ..
            } = &class.kind
            else {
                continue;
            };
            if population[*contact_group] <= 0.0 {
                continue;
            }
            for (pathogen, pressure) in pressure.iter_mut().enumerate() {
                let infectivity = value_for(infectivity, pathogen, parameters);
                if infectivity > 0.0 {
                    #[allow(clippy::cast_precision_loss)]
                    let members = class.members() as f64;
                    pressure[*contact_group] +=
                        infectivity * members / population[*contact_group];
                }
            }
        }

        self.transmission_rates.resize(classes.len(), Vec::new());
        for (class, rates) in classes.iter().zip(self.transmission_rates.iter_mut()) {
            rates.clear();
            rates.resize(pathogens, 0.0);
            let ClassKind::Normal {
                susceptibility,
                contact_group,
                ..
            } = &class.kind
            else {
                continue;
            };
            for (pathogen, rate) in rates.iter_mut().enumerate() {
                let susceptibility = value_for(susceptibility, pathogen, parameters);
                if susceptibility <= 0.0 {
                    continue;
                }
                let Some(matrix) = self.contact_matrices.get(key).map(|m| &m[pathogen]) else {
                    continue;
                };
                let contacts: f64 = matrix[*contact_group]
                    .iter()
                    .zip(&pressure[pathogen])
                    .map(|(c, p)| c * p)
                    .sum();
                *rate = susceptibility * contacts;
            }
        }
    }

    /// Rates of `class` per pathogen, as of the last update.
    #[must_use]
    pub fn transmission_rates(&self, class: usize) -> &[f64] {
        self.transmission_rates.get(class).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn transmission_rate(&self, class: usize, pathogen: PathogenId) -> f64 {
        self.transmission_rates(class)
            .get(pathogen)
            .copied()
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_almost_eq;

    fn two_group_config() -> ContactConfig {
        ContactConfig {
            groups: vec!["children".to_string(), "adults".to_string()],
            base: vec![vec![vec![4.0, 1.0], vec![1.0, 2.0]]],
            deltas: vec![
                ContactDelta {
                    intervention: 3,
                    pathogen: 0,
                    matrix: vec![vec![-3.0, 0.0], vec![0.0, 0.0]],
                    scale: None,
                },
                ContactDelta {
                    intervention: 1,
                    pathogen: 0,
                    matrix: vec![vec![-2.0, -2.0], vec![-1.0, -1.0]],
                    scale: Some(0),
                },
            ],
        }
    }

    fn normal(id: usize, group: usize, susceptible: bool, infectious: bool, size: usize) -> Class {
        let mut class = Class::new(
            id,
            format!("class{id}"),
            ClassKind::Normal {
                susceptibility: vec![susceptible.then_some(1)],
                infectivity: vec![infectious.then_some(2)],
                contact_group: group,
                events: vec![],
            },
        );
        class.initial_size = Some(size);
        class
    }

    #[test]
    fn combinations_add_scaled_deltas_and_clamp() {
        let mut foi = ForceOfInfection::new(two_group_config()).unwrap();
        foi.calculate_contact_matrices(&[0.5]);

        assert_eq!(foi.combination_key(&[false, false, false, false]), 0);
        // Intervention 1 is bit 0, intervention 3 is bit 1.
        assert_eq!(foi.combination_key(&[false, true, false, false]), 1);
        assert_eq!(foi.combination_key(&[true, true, true, true]), 3);

        assert_eq!(foi.contact_matrix(0, 0).unwrap(), &vec![vec![4.0, 1.0], vec![1.0, 2.0]]);
        assert_eq!(foi.contact_matrix(1, 0).unwrap(), &vec![vec![3.0, 0.0], vec![0.5, 1.5]]);
        assert_eq!(foi.contact_matrix(3, 0).unwrap(), &vec![vec![0.0, 0.0], vec![0.5, 1.5]]);
        assert!(foi.contact_matrix(4, 0).is_none());
    }

    #[test]
    fn transmission_rates_follow_the_formula() {
        let mut foi = ForceOfInfection::new(two_group_config()).unwrap();
        // parameters: scale, susceptibility, infectivity, sizes
        let parameters = [0.5, 0.1, 2.0, 90.0, 10.0, 50.0, 50.0];
        foi.calculate_contact_matrices(&parameters);
        let mut classes = vec![
            normal(0, 0, true, false, 3),
            normal(1, 0, false, true, 4),
            normal(2, 1, true, false, 5),
            normal(3, 1, false, true, 6),
        ];
        for class in &mut classes {
            class.reset(&parameters);
        }
        foi.update_transmission_rates(&classes, &parameters, &[false, false, false, false]);

        // pressure: children 2 * 10 / 100 = 0.2, adults 2 * 50 / 100 = 1.0
        assert_almost_eq!(foi.transmission_rate(0, 0), 0.1 * (4.0 * 0.2 + 1.0 * 1.0), 1e-12);
        assert_almost_eq!(foi.transmission_rate(2, 0), 0.1 * (1.0 * 0.2 + 2.0 * 1.0), 1e-12);
        assert_eq!(foi.transmission_rate(1, 0), 0.0);

        foi.update_transmission_rates(&classes, &parameters, &[false, true, false, true]);
        assert_almost_eq!(foi.transmission_rate(0, 0), 0.0, 1e-12);
        assert_almost_eq!(foi.transmission_rate(2, 0), 0.1 * (0.5 * 0.2 + 1.5 * 1.0), 1e-12);
    }

    #[test]
    fn empty_groups_exert_no_pressure() {
        let mut foi = ForceOfInfection::new(two_group_config()).unwrap();
        let parameters = [0.5, 0.1, 2.0, 0.0];
        foi.calculate_contact_matrices(&parameters);
        let mut classes = vec![normal(0, 0, true, true, 3)];
        classes[0].reset(&parameters);
        foi.update_transmission_rates(&classes, &parameters, &[]);
        assert_eq!(foi.transmission_rate(0, 0), 0.0);
    }

    #[test]
    fn rejects_malformed_matrices() {
        let mut config = two_group_config();
        config.deltas[0].matrix = vec![vec![0.0]];
        assert!(matches!(
            ForceOfInfection::new(config),
            Err(EpiError::ConfigError(_))
        ));

        let mut config = two_group_config();
        config.deltas = (0..=MAX_DELTA_INTERVENTIONS)
            .map(|intervention| ContactDelta {
                intervention,
                pathogen: 0,
                matrix: vec![vec![0.0; 2]; 2],
                scale: None,
            })
            .collect();
        assert!(ForceOfInfection::new(config).is_err());
    }
}
