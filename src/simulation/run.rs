//! Driving loop with time and iteration limits.

use std::time::Instant;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{RbmResult, SimulationError};

use super::solver::Solver;
use super::state::TimeUnit;
use super::trajectory::Trajectory;

/// Limits and clock settings of one run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunOptions {
    /// Calendar datetime at time 0, applied when the system is reset.
    pub start: NaiveDateTime,
    /// Unit of the simulation clock.
    #[serde(default)]
    pub time_unit: TimeUnit,
    /// Stop once elapsed time reaches this value.
    pub time_limit: f64,
    /// Stop after this many time advances.
    pub max_iterations: u64,
    /// Reseed the solver before the run.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            start: NaiveDate::from_ymd_opt(2000, 1, 1)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .unwrap_or_default(),
            time_unit: TimeUnit::Days,
            time_limit: 100.0,
            max_iterations: 1_000_000,
            seed: None,
        }
    }
}

impl RunOptions {
    /// Options running until `time_limit` with the remaining defaults.
    #[must_use]
    pub fn until(time_limit: f64) -> Self {
        Self {
            time_limit,
            ..Self::default()
        }
    }

    /// Validate options.
    pub fn validate(&self) -> Result<(), SimulationError> {
        if !(self.time_limit.is_finite() && self.time_limit >= 0.0) {
            return Err(SimulationError::InvalidRunOptions {
                reason: "time_limit must be finite and >= 0".to_string(),
            });
        }
        Ok(())
    }
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Elapsed time reached the limit.
    TimeLimit,
    /// Iteration count reached the limit.
    IterationLimit,
    /// No rule could fire under the `end` policy.
    NoRule,
}

/// Outcome of [`run`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Elapsed simulated time at the end.
    pub elapsed_time: f64,
    /// Completed time advances.
    pub iterations: u64,
    /// Wall-clock duration of the loop.
    pub compute_seconds: f64,
    /// Stop reason.
    pub termination: Termination,
}

/// Step `solver` until a limit is hit or no rule can fire, appending every
/// compartment to `trajectory` after each advance.
///
/// The solver's system is used as is, including its start datetime; callers
/// reset it first when needed. Open `trajectory` at the system's current
/// elapsed time so its first entry matches the state the run continues from.
pub fn run(
    solver: &mut Solver,
    options: &RunOptions,
    trajectory: &mut Trajectory,
) -> RbmResult<RunSummary> {
    options.validate()?;
    if let Some(seed) = options.seed {
        solver.reseed(seed);
    }
    let started = Instant::now();

    let termination = loop {
        let state = &solver
            .system()
            .ok_or(SimulationError::SolverNotInitialized)?
            .state;
        let (now, iterations) = (state.elapsed_time(), state.iterations());
        if now >= options.time_limit {
            break Termination::TimeLimit;
        }
        if iterations >= options.max_iterations {
            break Termination::IterationLimit;
        }

        let next = solver.simulate_one_step(now)?;
        solver.advance(next)?;
        let Some(next) = next else {
            break Termination::NoRule;
        };
        if let Some(system) = solver.system() {
            trajectory.record(next, &system.compartments);
        }
    };

    let state = &solver
        .system()
        .ok_or(SimulationError::SolverNotInitialized)?
        .state;
    let summary = RunSummary {
        elapsed_time: state.elapsed_time(),
        iterations: state.iterations(),
        compute_seconds: started.elapsed().as_secs_f64(),
        termination,
    };
    info!(
        run = %trajectory.run_id(),
        elapsed = summary.elapsed_time,
        iterations = summary.iterations,
        compute_seconds = summary.compute_seconds,
        termination = ?summary.termination,
        "run finished"
    );
    Ok(summary)
}
