//! Event selection and application.
//!
//! The solver caches one propensity per (rule, index set). With caching
//! enabled, a step only re-evaluates the entries the dependency graph links
//! to the previous firings and to built-ins whose value changed; the first
//! step after a reset evaluates everything.

mod direct;
mod first_reaction;
mod next_reaction;
mod table;
mod tau_leap;
mod two_level;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::error::{RbmResult, SimulationError};

use super::config::{Algorithm, NoRulePolicy, SolverConfig};
use super::dependency::{all_keys, DependencyGraph, RuleKey};
use super::SimulationSystem;

pub use next_reaction::NextReactionQueue;
pub use table::{PropensityChange, PropensityTable};

/// Outcome of an exact selection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Selection {
    /// Fire `key` at absolute time `time`.
    Fire { key: RuleKey, time: f64 },
    /// Nothing can fire.
    NoRule,
}

/// Diagnostics for one step, recorded in debug mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Name of the fired rule, if a single rule fired.
    pub rule_triggered: Option<String>,
    /// Index set of the fired rule.
    pub rule_index_set: Option<usize>,
    /// Total propensity at selection time.
    pub total_propensity: f64,
    /// Firing counts applied by a leap.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub leap_counts: Vec<(RuleKey, u64)>,
}

/// Stochastic solver owning one [`SimulationSystem`].
#[derive(Debug)]
pub struct Solver {
    config: SolverConfig,
    rng: ChaCha8Rng,
    system: Option<SimulationSystem>,
    graph: DependencyGraph,
    table: PropensityTable,
    queue: NextReactionQueue,
    changes: Vec<PropensityChange>,
    last_fired: Vec<RuleKey>,
    primed: bool,
    stats: Vec<StepRecord>,
}

impl Solver {
    /// Create an uninitialized solver.
    pub fn new(config: SolverConfig) -> Result<Self, SimulationError> {
        config.validate()?;
        let rng = config
            .seed
            .map_or_else(ChaCha8Rng::from_entropy, ChaCha8Rng::seed_from_u64);
        Ok(Self {
            config,
            rng,
            system: None,
            graph: DependencyGraph::default(),
            table: PropensityTable::default(),
            queue: NextReactionQueue::default(),
            changes: Vec::new(),
            last_fired: Vec::new(),
            primed: false,
            stats: Vec::new(),
        })
    }

    /// Take ownership of `system`, build the dependency graph and reset.
    pub fn initialize(&mut self, system: SimulationSystem) {
        self.graph = DependencyGraph::build(&system.rules, system.state.names());
        self.table = PropensityTable::shaped(&system.rules);
        info!(
            algorithm = ?self.config.algorithm,
            rules = system.rules.len(),
            cached = self.config.use_cached_propensities,
            "solver initialized"
        );
        self.system = Some(system);
        self.reset();
    }

    /// Whether [`initialize`](Self::initialize) has been called.
    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.system.is_some()
    }

    /// Forget cached propensities, pending times and the last firing.
    ///
    /// The random source is left as is; see [`reseed`](Self::reseed).
    pub fn reset(&mut self) {
        self.table.clear();
        self.queue.clear();
        self.changes.clear();
        self.last_fired.clear();
        self.primed = false;
        self.stats.clear();
    }

    /// Restart the random source from `seed`.
    pub fn reseed(&mut self, seed: u64) {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// The owned system, once initialized.
    #[must_use]
    pub const fn system(&self) -> Option<&SimulationSystem> {
        self.system.as_ref()
    }

    /// Mutable access to the owned system.
    ///
    /// Changing class values behind the solver's back requires a
    /// [`reset`](Self::reset) before the next step.
    pub fn system_mut(&mut self) -> Option<&mut SimulationSystem> {
        self.system.as_mut()
    }

    /// Per-step diagnostics recorded since the last reset.
    #[must_use]
    pub fn stats(&self) -> &[StepRecord] {
        &self.stats
    }

    /// Cached total propensity.
    #[must_use]
    pub const fn cached_total(&self) -> f64 {
        self.table.total()
    }

    /// Cached propensities, by rule then index set.
    #[must_use]
    pub fn propensity_snapshot(&self) -> &[Vec<f64>] {
        self.table.values()
    }

    /// Total propensity evaluated from scratch.
    pub fn recomputed_total(&self) -> Result<f64, SimulationError> {
        let system = self.system.as_ref().ok_or(SimulationError::SolverNotInitialized)?;
        Ok(system.fresh_propensities().iter().flatten().sum())
    }

    /// Bring the cache up to date without taking a step.
    pub fn sync_propensities(&mut self) -> Result<(), SimulationError> {
        self.refresh()
    }

    /// Select and apply the next event.
    ///
    /// Returns the time of the next event, or `None` when the run should end.
    /// The clock itself is moved by [`advance`](Self::advance).
    pub fn simulate_one_step(&mut self, current_time: f64) -> RbmResult<Option<f64>> {
        self.refresh()?;
        let total = self.table.total();
        if !(total > 0.0 && total.is_finite()) {
            self.changes.clear();
            self.queue.clear();
            return Ok(self.no_rule(current_time, total));
        }

        if let Algorithm::TauLeap {
            step,
            negative_draws,
        } = self.config.algorithm
        {
            self.changes.clear();
            let system = self.system.as_mut().ok_or(SimulationError::SolverNotInitialized)?;
            let counts = tau_leap::leap(
                system,
                &self.table,
                &mut self.rng,
                step,
                negative_draws,
                self.config.negativity_tolerance,
            );
            trace!(fired = counts.len(), time = current_time + step, "leap applied");
            self.last_fired.extend(counts.iter().map(|(key, _)| *key));
            if self.config.debug {
                self.stats.push(StepRecord {
                    rule_triggered: None,
                    rule_index_set: None,
                    total_propensity: total,
                    leap_counts: counts,
                });
            }
            return Ok(Some(current_time + step));
        }

        let selection = match self.config.algorithm {
            Algorithm::Direct => direct::select(&self.table, &mut self.rng, current_time),
            Algorithm::FirstReaction => {
                first_reaction::select(&self.table, &mut self.rng, current_time)
            }
            Algorithm::TwoLevel => two_level::select(&self.table, &mut self.rng, current_time),
            Algorithm::NextReaction | Algorithm::TauLeap { .. } => {
                self.queue
                    .select(&self.table, &self.changes, &mut self.rng, current_time)
            }
        };
        self.changes.clear();

        match selection {
            Selection::Fire { key, time } if time.is_finite() => {
                self.fire(key)?;
                trace!(rule = key.rule, index_set = key.index_set, time, "rule fired");
                if self.config.debug {
                    let name = self.system.as_ref().map(|s| s.rules[key.rule].name().to_string());
                    self.stats.push(StepRecord {
                        rule_triggered: name,
                        rule_index_set: Some(key.index_set),
                        total_propensity: total,
                        leap_counts: Vec::new(),
                    });
                }
                Ok(Some(time))
            }
            _ => Ok(self.no_rule(current_time, total)),
        }
    }

    /// Move the clock to `next`, or register termination with `None`.
    pub fn advance(&mut self, next: Option<f64>) -> Result<(), SimulationError> {
        let system = self.system.as_mut().ok_or(SimulationError::SolverNotInitialized)?;
        system.state.process_update(next)
    }

    fn refresh(&mut self) -> Result<(), SimulationError> {
        let system = self.system.as_ref().ok_or(SimulationError::SolverNotInitialized)?;
        let globals = system.state.values();
        let update = |key: RuleKey, table: &mut PropensityTable| {
            let a = system.rules[key.rule].propensity(key.index_set, &system.compartments, globals);
            table.set(key, a)
        };

        if !self.primed || !self.config.use_cached_propensities {
            for key in all_keys(&system.rules) {
                self.changes.extend(update(key, &mut self.table));
            }
            if !self.config.use_cached_propensities {
                self.table.resum();
            }
            self.primed = true;
        } else {
            let affected = self
                .graph
                .affected(&self.last_fired, system.state.changed_vars());
            for key in affected {
                self.changes.extend(update(key, &mut self.table));
            }
        }
        self.last_fired.clear();
        Ok(())
    }

    fn fire(&mut self, key: RuleKey) -> Result<(), SimulationError> {
        let system = self.system.as_mut().ok_or(SimulationError::SolverNotInitialized)?;
        let rule = &system.rules[key.rule];
        if let Err(excursion) = rule.check_change(
            key.index_set,
            &system.compartments,
            1.0,
            self.config.negativity_tolerance,
        ) {
            let compartment = &system.compartments[excursion.compartment];
            return Err(SimulationError::NegativeState {
                rule: rule.name().to_string(),
                index_set: key.index_set,
                compartment: compartment.name().to_string(),
                class: compartment.labels()[excursion.class].clone(),
                value: excursion.value,
            });
        }
        rule.apply_change(key.index_set, &mut system.compartments, 1.0);
        self.last_fired.push(key);
        Ok(())
    }

    fn no_rule(&mut self, current_time: f64, total: f64) -> Option<f64> {
        if self.config.debug {
            self.stats.push(StepRecord {
                rule_triggered: None,
                rule_index_set: None,
                total_propensity: total,
                leap_counts: Vec::new(),
            });
        }
        match self.config.no_rule_policy {
            NoRulePolicy::End => {
                debug!(time = current_time, total, "no rule can fire, ending");
                None
            }
            NoRulePolicy::Step => {
                let next = current_time + self.config.default_step;
                debug!(time = current_time, next, total, "no rule can fire, stepping");
                Some(next)
            }
        }
    }
}
