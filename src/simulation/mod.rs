//! Stochastic simulation of a built model.
//!
//! A [`SimulationSystem`] holds the runtime compartments, compiled rules and
//! the model state. A [`Solver`] takes ownership of one system and advances
//! it one event (or one leap) at a time; [`run`] drives a solver until a time
//! or iteration limit and records a [`Trajectory`].

pub mod config;
pub mod dependency;
pub mod rule;
pub mod run;
pub mod solver;
pub mod state;
pub mod trajectory;

use chrono::NaiveDateTime;
use tracing::{info, warn};

use crate::class::{ClassRestriction, BUILTIN_PREFIX};
use crate::compartment::Compartment;
use crate::error::RbmResult;
use crate::persist::ModelDocuments;

pub use config::{Algorithm, NegativeDrawPolicy, NoRulePolicy, SolverConfig};
pub use dependency::{DependencyGraph, RuleKey};
pub use rule::{PropensityBinding, Rule};
pub use run::{run, RunOptions, RunSummary, Termination};
pub use solver::{Solver, StepRecord};
pub use state::{ModelState, TimeUnit};
pub use trajectory::{RunId, Trajectory};

/// Compartments, rules and global state of one simulation.
#[derive(Debug, Clone)]
pub struct SimulationSystem {
    /// Runtime compartments, by index.
    pub compartments: Vec<Compartment>,
    /// Compiled concrete rules, by rule number.
    pub rules: Vec<Rule>,
    /// Clock and built-in classes.
    pub state: ModelState,
}

impl SimulationSystem {
    /// Validate `docs` and compile them into a runnable system.
    pub fn load(
        docs: &ModelDocuments,
        start: NaiveDateTime,
        time_unit: TimeUnit,
    ) -> RbmResult<Self> {
        docs.validate()?;
        let classes = docs.class_registry()?;
        let state = ModelState::new(classes.builtins().to_vec(), start, time_unit);
        let restricted = docs.classes.iter().filter(|(name, def)| {
            !name.starts_with(BUILTIN_PREFIX) && def.restriction != ClassRestriction::None
        });
        for (name, def) in restricted {
            warn!(class = %name, restriction = ?def.restriction, "restriction not enforced");
        }

        let compartments = docs
            .compartments
            .iter()
            .enumerate()
            .map(|(index, doc)| Compartment::from_doc(index, doc))
            .collect::<Result<Vec<_>, _>>()?;

        let rules = docs
            .matched_rules
            .iter()
            .map(|doc| Rule::load(doc, &compartments, state.names()))
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            model = %docs.name,
            compartments = compartments.len(),
            rules = rules.len(),
            index_sets = rules.iter().map(|r| r.index_sets().len()).sum::<usize>(),
            "simulation system loaded"
        );
        Ok(Self {
            compartments,
            rules,
            state,
        })
    }

    /// Restore initial class values and the start of the clock.
    pub fn reset(&mut self) {
        for compartment in &mut self.compartments {
            compartment.reset();
        }
        self.state.reset();
    }

    /// Propensity of one (rule, index set) from the current state.
    #[must_use]
    pub fn propensity(&self, key: RuleKey) -> f64 {
        self.rules[key.rule].propensity(key.index_set, &self.compartments, self.state.values())
    }

    /// Every propensity evaluated from scratch, by rule then index set.
    #[must_use]
    pub fn fresh_propensities(&self) -> Vec<Vec<f64>> {
        self.rules
            .iter()
            .enumerate()
            .map(|(r, rule)| {
                (0..rule.index_sets().len())
                    .map(|i| self.propensity(RuleKey::new(r, i)))
                    .collect()
            })
            .collect()
    }

    /// Every (rule, index set), rule-major.
    pub fn rule_keys(&self) -> impl Iterator<Item = RuleKey> + '_ {
        dependency::all_keys(&self.rules)
    }

    /// Compartment by name.
    #[must_use]
    pub fn compartment(&self, name: &str) -> Option<&Compartment> {
        self.compartments.iter().find(|c| c.name() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::ClassRegistry;
    use crate::error::{PersistenceError, RbmError};
    use crate::persist::{CompartmentDoc, MatchedRuleDoc};
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn documents(matching_indices: Vec<Vec<usize>>) -> ModelDocuments {
        let mut classes = ClassRegistry::new();
        classes.add_class("A", "head").unwrap();
        ModelDocuments {
            name: "single".to_string(),
            classes: classes.to_document(),
            compartments: vec![CompartmentDoc {
                compartment_name: "pen".to_string(),
                lat: 0.0,
                long: 0.0,
                comp_type: "pen".to_string(),
                label_mapping: [("0".to_string(), "A".to_string())].into_iter().collect(),
                initial_values: vec![4.0],
                compartment_constants: BTreeMap::new(),
            }],
            meta_rules: Vec::new(),
            matched_rules: vec![MatchedRuleDoc {
                rule_num: 0,
                rule_name: "decay".to_string(),
                rule_compartment_types: vec!["pen".to_string()],
                stoichiometry: vec![vec![-1.0]],
                propensity: vec!["A".to_string()],
                matching_indices,
            }],
        }
    }

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn loads_consistent_documents() {
        let system = SimulationSystem::load(&documents(vec![vec![0]]), start(), TimeUnit::Days)
            .unwrap();
        assert_eq!(system.rules.len(), 1);
        assert_eq!(system.propensity(RuleKey::new(0, 0)), 4.0);
        assert_eq!(system.compartment("pen").map(Compartment::index), Some(0));
    }

    #[test]
    fn out_of_range_index_sets_are_an_error() {
        let err = SimulationSystem::load(&documents(vec![vec![3]]), start(), TimeUnit::Days)
            .unwrap_err();
        assert!(matches!(
            err,
            RbmError::Persistence(PersistenceError::Malformed { .. })
        ));
    }

    #[test]
    fn short_index_sets_are_an_error() {
        let err = SimulationSystem::load(&documents(vec![vec![]]), start(), TimeUnit::Days)
            .unwrap_err();
        assert!(err.is_persistence());
    }
}
