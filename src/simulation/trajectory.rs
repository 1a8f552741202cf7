//! Recorded class values over time.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::compartment::Compartment;

/// Stable identifier of one simulation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    /// Create a new random run ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Append-only per-compartment time series.
///
/// Every compartment starts with one entry holding its values at the time the
/// trajectory was opened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    run_id: RunId,
    names: Vec<String>,
    labels: Vec<Vec<String>>,
    timestamps: Vec<Vec<f64>>,
    values: Vec<Vec<Vec<f64>>>,
}

impl Trajectory {
    /// Start a trajectory for `compartments`, seeded with their current
    /// values at time `start`.
    #[must_use]
    pub fn new(compartments: &[Compartment], start: f64) -> Self {
        Self {
            run_id: RunId::new(),
            names: compartments.iter().map(|c| c.name().to_string()).collect(),
            labels: compartments.iter().map(|c| c.labels().to_vec()).collect(),
            timestamps: vec![vec![start]; compartments.len()],
            values: compartments
                .iter()
                .map(|c| vec![c.class_values().to_vec()])
                .collect(),
        }
    }

    /// Identifier of the run that produced this trajectory.
    #[must_use]
    pub const fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Append `values` for `compartment` at `time`.
    ///
    /// Unknown compartment indices are ignored.
    pub fn add_entry(&mut self, time: f64, values: &[f64], compartment: usize) {
        if let (Some(times), Some(rows)) = (
            self.timestamps.get_mut(compartment),
            self.values.get_mut(compartment),
        ) {
            times.push(time);
            rows.push(values.to_vec());
        }
    }

    /// Record the current values of every compartment at `time`.
    pub fn record(&mut self, time: f64, compartments: &[Compartment]) {
        for compartment in compartments {
            self.add_entry(time, compartment.class_values(), compartment.index());
        }
    }

    /// Number of compartments.
    #[must_use]
    pub fn compartment_count(&self) -> usize {
        self.names.len()
    }

    /// Number of entries recorded for `compartment`, including the initial one.
    #[must_use]
    pub fn len(&self, compartment: usize) -> usize {
        self.timestamps.get(compartment).map_or(0, Vec::len)
    }

    /// Whether no compartment is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Position of a compartment by name.
    #[must_use]
    pub fn compartment_index(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Timestamps and value rows of `compartment`.
    #[must_use]
    pub fn series(&self, compartment: usize) -> Option<(&[f64], &[Vec<f64>])> {
        Some((
            self.timestamps.get(compartment)?.as_slice(),
            self.values.get(compartment)?.as_slice(),
        ))
    }

    /// `(time, value)` pairs of one class of one compartment.
    #[must_use]
    pub fn class_series(&self, compartment: usize, class: &str) -> Option<Vec<(f64, f64)>> {
        let position = self.labels.get(compartment)?.iter().position(|l| l == class)?;
        let (times, rows) = self.series(compartment)?;
        Some(
            times
                .iter()
                .zip(rows)
                .map(|(&t, row)| (t, row[position]))
                .collect(),
        )
    }

    /// Most recent values of `compartment`.
    #[must_use]
    pub fn last_values(&self, compartment: usize) -> Option<&[f64]> {
        self.values.get(compartment)?.last().map(Vec::as_slice)
    }

    /// Most recent timestamp across compartments.
    #[must_use]
    pub fn last_time(&self) -> f64 {
        self.timestamps
            .iter()
            .filter_map(|t| t.last().copied())
            .fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::CompartmentDoc;
    use std::collections::BTreeMap;

    fn compartment(index: usize, name: &str) -> Compartment {
        let doc = CompartmentDoc {
            compartment_name: name.to_string(),
            lat: 0.0,
            long: 0.0,
            comp_type: "farm".to_string(),
            label_mapping: [
                ("0".to_string(), "S".to_string()),
                ("1".to_string(), "I".to_string()),
            ]
            .into_iter()
            .collect(),
            initial_values: vec![10.0, 1.0],
            compartment_constants: BTreeMap::new(),
        };
        Compartment::from_doc(index, &doc).unwrap()
    }

    #[test]
    fn starts_with_current_values() {
        let t = Trajectory::new(&[compartment(0, "a"), compartment(1, "b")], 0.0);
        assert_eq!(t.compartment_count(), 2);
        assert_eq!(t.len(0), 1);
        assert_eq!(t.last_values(1), Some(&[10.0, 1.0][..]));
        assert_eq!(t.last_time(), 0.0);
    }

    #[test]
    fn class_series_follows_entries() {
        let mut t = Trajectory::new(&[compartment(0, "a")], 0.0);
        t.add_entry(0.5, &[9.0, 2.0], 0);
        t.add_entry(1.5, &[8.0, 3.0], 0);
        t.add_entry(2.0, &[0.0, 0.0], 5);
        assert_eq!(
            t.class_series(0, "I").unwrap(),
            vec![(0.0, 1.0), (0.5, 2.0), (1.5, 3.0)]
        );
        assert!(t.class_series(0, "R").is_none());
        assert_eq!(t.compartment_index("a"), Some(0));
        assert_eq!(t.last_time(), 1.5);
    }

    #[test]
    fn opening_mid_run_records_the_changed_state() {
        let mut farm = compartment(0, "a");
        farm.apply_delta(&[-3.0, 3.0], 1.0);
        let t = Trajectory::new(&[farm], 2.5);
        assert_eq!(t.series(0).unwrap().0, &[2.5]);
        assert_eq!(t.last_values(0), Some(&[7.0, 4.0][..]));
        assert_eq!(t.last_time(), 2.5);
    }

    #[test]
    fn run_ids_are_unique() {
        assert_ne!(RunId::new(), RunId::new());
    }
}
