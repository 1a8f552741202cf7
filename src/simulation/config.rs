//! Solver configuration.

use serde::{Deserialize, Serialize};

use crate::error::{PersistenceError, SimulationError};

/// What to do when no rule can fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoRulePolicy {
    /// Stop the run.
    #[serde(alias = "exit")]
    End,
    /// Advance the clock by the default step without changing any class.
    #[default]
    Step,
}

/// What tau-leaping does with a Poisson draw that would drive a class negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NegativeDrawPolicy {
    /// Draw again, up to `max_attempts` times, then skip the firing.
    Redraw {
        /// Draws per (rule, index set) and step, including the first.
        max_attempts: u32,
    },
    /// Apply the draw regardless.
    Ignore,
}

impl Default for NegativeDrawPolicy {
    fn default() -> Self {
        Self::Redraw { max_attempts: 100 }
    }
}

/// Event selection algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Algorithm {
    /// Gillespie direct method.
    #[default]
    Direct,
    /// Gillespie first reaction method.
    FirstReaction,
    /// Gibson and Bruck next reaction method.
    NextReaction,
    /// Rule first, then index set.
    TwoLevel,
    /// Fixed-step tau-leaping.
    TauLeap {
        /// Leap length in time units.
        step: f64,
        /// Handling of draws that would go negative.
        #[serde(default)]
        negative_draws: NegativeDrawPolicy,
    },
}

impl Algorithm {
    /// Whether the algorithm fires one event per step.
    #[must_use]
    pub const fn is_exact(&self) -> bool {
        !matches!(self, Self::TauLeap { .. })
    }
}

/// Configuration of a [`Solver`](super::Solver).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Event selection algorithm.
    pub algorithm: Algorithm,
    /// Recompute only the propensities affected by the previous step.
    pub use_cached_propensities: bool,
    /// Behaviour when the total propensity is zero.
    pub no_rule_policy: NoRulePolicy,
    /// Clock advance used by [`NoRulePolicy::Step`].
    pub default_step: f64,
    /// Record a [`StepRecord`](super::StepRecord) for every step.
    pub debug: bool,
    /// Seed of the random source. `None` seeds from entropy.
    pub seed: Option<u64>,
    /// Classes may go down to `-negativity_tolerance`.
    pub negativity_tolerance: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Direct,
            use_cached_propensities: true,
            no_rule_policy: NoRulePolicy::Step,
            default_step: 1.0,
            debug: false,
            seed: None,
            negativity_tolerance: 0.0,
        }
    }
}

impl SolverConfig {
    /// Configuration using `algorithm` with default settings.
    #[must_use]
    pub fn with_algorithm(algorithm: Algorithm) -> Self {
        Self {
            algorithm,
            ..Self::default()
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), SimulationError> {
        let invalid = |reason: &str| SimulationError::InvalidConfig {
            reason: reason.to_string(),
        };
        if !(self.default_step.is_finite() && self.default_step > 0.0) {
            return Err(invalid("default_step must be finite and > 0"));
        }
        if !(self.negativity_tolerance.is_finite() && self.negativity_tolerance >= 0.0) {
            return Err(invalid("negativity_tolerance must be finite and >= 0"));
        }
        if let Algorithm::TauLeap {
            step,
            negative_draws,
        } = self.algorithm
        {
            if !(step.is_finite() && step > 0.0) {
                return Err(invalid("tau-leap step must be finite and > 0"));
            }
            if negative_draws == (NegativeDrawPolicy::Redraw { max_attempts: 0 }) {
                return Err(invalid("redraw max_attempts must be > 0"));
            }
        }
        Ok(())
    }

    /// Parse and validate from JSON.
    pub fn from_json(s: &str) -> crate::error::RbmResult<Self> {
        let config: Self = serde_json::from_str(s).map_err(|source| PersistenceError::Json {
            document: "solver config".to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty JSON.
    pub fn to_json_pretty(&self) -> crate::error::RbmResult<String> {
        serde_json::to_string_pretty(self).map_err(|source| {
            PersistenceError::Json {
                document: "solver config".to_string(),
                source,
            }
            .into()
        })
    }
}
