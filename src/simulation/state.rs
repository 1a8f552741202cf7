//! Model state: elapsed time, iterations and calendar-derived classes.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::class::BuiltinClass;
use crate::error::SimulationError;

/// Unit of the simulation clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    /// One time unit is a day.
    #[default]
    Days,
    /// One time unit is an hour.
    Hours,
    /// One time unit is a minute.
    Minutes,
}

impl TimeUnit {
    /// Microseconds in one unit.
    #[must_use]
    pub const fn micros(self) -> i64 {
        match self {
            Self::Days => 86_400_000_000,
            Self::Hours => 3_600_000_000,
            Self::Minutes => 60_000_000,
        }
    }
}

/// Global state shared by every rule during a run.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelState {
    builtins: Vec<BuiltinClass>,
    names: Vec<String>,
    values: Vec<f64>,
    start: NaiveDateTime,
    current: NaiveDateTime,
    time_unit: TimeUnit,
    elapsed_time: f64,
    iterations: u64,
    changed: Vec<String>,
}

impl ModelState {
    /// Create a state tracking `builtins` (sorted by name) from `start`.
    #[must_use]
    pub fn new(mut builtins: Vec<BuiltinClass>, start: NaiveDateTime, time_unit: TimeUnit) -> Self {
        builtins.sort_by_key(|b| b.name());
        builtins.dedup();
        let names = builtins.iter().map(|b| b.name()).collect();
        let mut state = Self {
            values: vec![0.0; builtins.len()],
            builtins,
            names,
            start,
            current: start,
            time_unit,
            elapsed_time: 0.0,
            iterations: 0,
            changed: Vec::new(),
        };
        state.reset();
        state
    }

    /// Restore the start datetime and mark every built-in as changed.
    pub fn reset(&mut self) {
        self.elapsed_time = 0.0;
        self.iterations = 0;
        self.current = self.start;
        for (value, builtin) in self.values.iter_mut().zip(&self.builtins) {
            *value = builtin.value_at(&self.start);
        }
        self.changed.clone_from(&self.names);
    }

    /// Move the start datetime and reset.
    pub fn restart_at(&mut self, start: NaiveDateTime, time_unit: TimeUnit) {
        self.start = start;
        self.time_unit = time_unit;
        self.reset();
    }

    /// Advance to `new_time`, or signal termination with `None`.
    ///
    /// The changed set is cleared first; afterwards it holds exactly the
    /// built-ins whose value differs from before the advance.
    pub fn process_update(&mut self, new_time: Option<f64>) -> Result<(), SimulationError> {
        self.changed.clear();
        let Some(new_time) = new_time else {
            return Ok(());
        };
        if !(new_time >= self.elapsed_time) {
            return Err(SimulationError::NonMonotonicTime {
                current: self.elapsed_time,
                next: new_time,
            });
        }

        self.current = self.datetime_at(new_time)?;
        self.elapsed_time = new_time;
        self.iterations += 1;

        for ((value, builtin), name) in self
            .values
            .iter_mut()
            .zip(&self.builtins)
            .zip(&self.names)
        {
            let updated = builtin.value_at(&self.current);
            if updated != *value {
                *value = updated;
                self.changed.push(name.clone());
            }
        }
        Ok(())
    }

    // Computed from the start rather than by accumulation, so long runs do
    // not drift.
    fn datetime_at(&self, elapsed: f64) -> Result<NaiveDateTime, SimulationError> {
        let overflow = SimulationError::CalendarOverflow { elapsed };
        #[allow(clippy::cast_precision_loss)]
        let micros = elapsed * self.time_unit.micros() as f64;
        if !micros.is_finite() || micros >= i64::MAX as f64 {
            return Err(overflow);
        }
        #[allow(clippy::cast_possible_truncation)]
        let offset = Duration::microseconds(micros.round() as i64);
        self.start.checked_add_signed(offset).ok_or(overflow)
    }

    /// Built-in names in vector order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Built-in values in vector order.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Value of a built-in by name.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<f64> {
        self.names.iter().position(|n| n == name).map(|i| self.values[i])
    }

    /// Built-ins changed by the most recent update.
    #[must_use]
    pub fn changed_vars(&self) -> &[String] {
        &self.changed
    }

    /// Elapsed simulated time.
    #[must_use]
    pub const fn elapsed_time(&self) -> f64 {
        self.elapsed_time
    }

    /// Completed time advances.
    #[must_use]
    pub const fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Current calendar datetime.
    #[must_use]
    pub const fn current_datetime(&self) -> NaiveDateTime {
        self.current
    }

    /// Start datetime.
    #[must_use]
    pub const fn start_datetime(&self) -> NaiveDateTime {
        self.start
    }

    /// Clock unit.
    #[must_use]
    pub const fn time_unit(&self) -> TimeUnit {
        self.time_unit
    }
}
