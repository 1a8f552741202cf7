//! Cached propensities with running totals.

use crate::simulation::dependency::RuleKey;
use crate::simulation::rule::Rule;

/// A propensity that changed during a refresh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PropensityChange {
    /// Affected (rule, index set).
    pub key: RuleKey,
    /// Value before the refresh.
    pub old: f64,
    /// Value after the refresh.
    pub new: f64,
}

/// Propensity per (rule, index set), with per-rule and overall totals kept
/// up to date by differences.
///
/// Totals snap to exactly zero once no entry is positive, so accumulated
/// rounding never leaves a phantom total behind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropensityTable {
    values: Vec<Vec<f64>>,
    rule_totals: Vec<f64>,
    rule_positive: Vec<usize>,
    total: f64,
    positive: usize,
}

impl PropensityTable {
    /// Zeroed table shaped after `rules`.
    #[must_use]
    pub fn shaped(rules: &[Rule]) -> Self {
        let sizes: Vec<usize> = rules.iter().map(|r| r.index_sets().len()).collect();
        Self::from_sizes(&sizes)
    }

    /// Zeroed table with `sizes[r]` index sets for rule `r`.
    #[must_use]
    pub fn from_sizes(sizes: &[usize]) -> Self {
        Self {
            values: sizes.iter().map(|&n| vec![0.0; n]).collect(),
            rule_totals: vec![0.0; sizes.len()],
            rule_positive: vec![0; sizes.len()],
            total: 0.0,
            positive: 0,
        }
    }

    /// Table holding exactly `entries`, zero elsewhere.
    #[cfg(test)]
    pub(crate) fn from_entries(entries: &[(RuleKey, f64)]) -> Self {
        let mut sizes = Vec::new();
        for (key, _) in entries {
            if sizes.len() <= key.rule {
                sizes.resize(key.rule + 1, 0);
            }
            sizes[key.rule] = sizes[key.rule].max(key.index_set + 1);
        }
        let mut table = Self::from_sizes(&sizes);
        for &(key, value) in entries {
            table.set(key, value);
        }
        table
    }

    /// Zero every entry.
    pub fn clear(&mut self) {
        for row in &mut self.values {
            row.fill(0.0);
        }
        self.rule_totals.fill(0.0);
        self.rule_positive.fill(0);
        self.total = 0.0;
        self.positive = 0;
    }

    /// Store `value` for `key`, returning the change if the value differs.
    pub fn set(&mut self, key: RuleKey, value: f64) -> Option<PropensityChange> {
        let slot = &mut self.values[key.rule][key.index_set];
        let old = *slot;
        if old == value {
            return None;
        }
        *slot = value;

        match (old > 0.0, value > 0.0) {
            (false, true) => {
                self.rule_positive[key.rule] += 1;
                self.positive += 1;
            }
            (true, false) => {
                self.rule_positive[key.rule] -= 1;
                self.positive -= 1;
            }
            _ => {}
        }

        if self.rule_positive[key.rule] == 0 {
            self.rule_totals[key.rule] = 0.0;
        } else {
            self.rule_totals[key.rule] += value - old;
        }
        if self.positive == 0 {
            self.total = 0.0;
        } else {
            self.total += value - old;
        }

        Some(PropensityChange {
            key,
            old,
            new: value,
        })
    }

    /// Recompute the totals by summation.
    pub fn resum(&mut self) {
        for (total, row) in self.rule_totals.iter_mut().zip(&self.values) {
            *total = row.iter().sum();
        }
        self.total = self.rule_totals.iter().sum();
    }

    /// Cached propensity of `key`.
    #[must_use]
    pub fn get(&self, key: RuleKey) -> f64 {
        self.values[key.rule][key.index_set]
    }

    /// Overall total.
    #[must_use]
    pub const fn total(&self) -> f64 {
        self.total
    }

    /// Per-rule totals.
    #[must_use]
    pub fn rule_totals(&self) -> &[f64] {
        &self.rule_totals
    }

    /// Propensities of one rule, by index set.
    #[must_use]
    pub fn rule_values(&self, rule: usize) -> &[f64] {
        &self.values[rule]
    }

    /// All propensities, by rule then index set.
    #[must_use]
    pub fn values(&self) -> &[Vec<f64>] {
        &self.values
    }

    /// Keys with a positive propensity, rule-major.
    pub fn positive_entries(&self) -> impl Iterator<Item = (RuleKey, f64)> + '_ {
        self.values.iter().enumerate().flat_map(|(r, row)| {
            row.iter()
                .enumerate()
                .filter(|(_, a)| **a > 0.0)
                .map(move |(i, &a)| (RuleKey::new(r, i), a))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> PropensityTable {
        PropensityTable::from_sizes(&[2, 1])
    }

    #[test]
    fn totals_follow_updates() {
        let mut t = table();
        t.set(RuleKey::new(0, 0), 0.1);
        t.set(RuleKey::new(0, 1), 0.2);
        t.set(RuleKey::new(1, 0), 3.0);
        assert!((t.total() - 3.3).abs() < 1e-12);
        assert!((t.rule_totals()[0] - 0.3).abs() < 1e-12);

        assert!(t.set(RuleKey::new(1, 0), 3.0).is_none());
        let change = t.set(RuleKey::new(1, 0), 1.0).unwrap();
        assert_eq!((change.old, change.new), (3.0, 1.0));
        assert!((t.total() - 1.3).abs() < 1e-12);
    }

    #[test]
    fn totals_snap_to_zero() {
        let mut t = table();
        t.set(RuleKey::new(0, 0), 0.1);
        t.set(RuleKey::new(0, 1), 0.2);
        t.set(RuleKey::new(0, 0), 0.0);
        t.set(RuleKey::new(0, 1), 0.0);
        assert_eq!(t.total(), 0.0);
        assert_eq!(t.rule_totals()[0], 0.0);
        assert_eq!(t.positive_entries().count(), 0);
    }

    #[test]
    fn resum_matches_accumulation() {
        let mut t = table();
        for i in 0..1000 {
            t.set(RuleKey::new(0, i % 2), f64::from(u32::try_from(i).unwrap()) * 0.001);
        }
        let accumulated = t.total();
        t.resum();
        assert!((accumulated - t.total()).abs() <= 1e-9 * t.total());
    }
}
