//! Gibson and Bruck next reaction method.
//!
//! Every (rule, index set) with a positive propensity holds an absolute
//! firing time in a priority queue. When a propensity changes, its pending
//! time is rescaled instead of redrawn; only the entry that just fired and
//! entries without a pending time receive a fresh exponential draw.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};

use rand::Rng;
use rand_distr::Exp1;

use crate::simulation::dependency::RuleKey;

use super::table::{PropensityChange, PropensityTable};
use super::Selection;

#[derive(Debug, Clone, Copy)]
struct Scheduled {
    time: f64,
    key: RuleKey,
    version: u64,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .total_cmp(&other.time)
            .then_with(|| self.key.cmp(&other.key))
            .then_with(|| self.version.cmp(&other.version))
    }
}

/// Pending firing times, with stale heap entries skipped lazily.
#[derive(Debug, Clone, Default)]
pub struct NextReactionQueue {
    heap: BinaryHeap<Reverse<Scheduled>>,
    pending: HashMap<RuleKey, (f64, u64)>,
    next_version: u64,
    fired: Option<RuleKey>,
}

impl NextReactionQueue {
    /// Drop every pending time.
    pub fn clear(&mut self) {
        self.heap.clear();
        self.pending.clear();
        self.fired = None;
    }

    /// Number of scheduled entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is scheduled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn schedule(&mut self, key: RuleKey, time: f64) {
        self.next_version += 1;
        let version = self.next_version;
        self.pending.insert(key, (time, version));
        self.heap.push(Reverse(Scheduled { time, key, version }));
    }

    fn draw<R: Rng>(&mut self, key: RuleKey, a: f64, rng: &mut R, now: f64) {
        let e: f64 = rng.sample(Exp1);
        let time = now + e / a;
        if time.is_finite() {
            self.schedule(key, time);
        } else {
            self.pending.remove(&key);
        }
    }

    /// Bring pending times in line with `changes`, then pick the earliest.
    pub(super) fn select<R: Rng>(
        &mut self,
        table: &PropensityTable,
        changes: &[PropensityChange],
        rng: &mut R,
        now: f64,
    ) -> Selection {
        let fired = self.fired.take();

        for change in changes {
            if Some(change.key) == fired {
                continue;
            }
            if change.new <= 0.0 {
                self.pending.remove(&change.key);
                continue;
            }
            match self.pending.get(&change.key).copied() {
                Some((time, _)) if change.old > 0.0 => {
                    let rescaled = now + (change.old / change.new) * (time - now);
                    self.schedule(change.key, rescaled.max(now));
                }
                _ => self.draw(change.key, change.new, rng, now),
            }
        }

        if let Some(key) = fired {
            let a = table.get(key);
            if a > 0.0 {
                self.draw(key, a, rng, now);
            } else {
                self.pending.remove(&key);
            }
        }

        while let Some(Reverse(top)) = self.heap.peek().copied() {
            match self.pending.get(&top.key) {
                Some(&(_, version)) if version == top.version => {
                    self.heap.pop();
                    self.pending.remove(&top.key);
                    self.fired = Some(top.key);
                    return Selection::Fire {
                        key: top.key,
                        time: top.time,
                    };
                }
                _ => {
                    self.heap.pop();
                }
            }
        }
        Selection::NoRule
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn changes_for(table: &PropensityTable) -> Vec<PropensityChange> {
        table
            .positive_entries()
            .map(|(key, a)| PropensityChange { key, old: 0.0, new: a })
            .collect()
    }

    #[test]
    fn schedules_then_fires_in_time_order() {
        let table = PropensityTable::from_entries(&[
            (RuleKey::new(0, 0), 1.0),
            (RuleKey::new(0, 1), 2.0),
        ]);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut queue = NextReactionQueue::default();

        let changes = changes_for(&table);
        let Selection::Fire { time, .. } = queue.select(&table, &changes, &mut rng, 0.0) else {
            panic!("expected a firing");
        };
        assert!(time > 0.0);
        // One entry is pending; the fired one is drawn again on the next call.
        assert_eq!(queue.len(), 1);

        let Selection::Fire { time: second, .. } = queue.select(&table, &[], &mut rng, time) else {
            panic!("expected a firing");
        };
        assert!(second >= time);
    }

    #[test]
    fn zeroed_entries_are_unscheduled() {
        let mut table = PropensityTable::from_entries(&[(RuleKey::new(0, 0), 1.0)]);
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let mut queue = NextReactionQueue::default();
        let first = queue.select(&table, &changes_for(&table), &mut rng, 0.0);
        let Selection::Fire { time, .. } = first else {
            panic!("expected a firing");
        };

        let change = table.set(RuleKey::new(0, 0), 0.0).unwrap();
        assert!(matches!(
            queue.select(&table, &[change], &mut rng, time),
            Selection::NoRule
        ));
        assert!(queue.is_empty());
    }

    #[test]
    fn rescaling_keeps_pending_entry_alive() {
        let mut table = PropensityTable::from_entries(&[
            (RuleKey::new(0, 0), 1.0),
            (RuleKey::new(1, 0), 1e-9),
        ]);
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let mut queue = NextReactionQueue::default();
        let changes = changes_for(&table);
        let Selection::Fire { key, time } = queue.select(&table, &changes, &mut rng, 0.0) else {
            panic!("expected a firing");
        };
        assert_eq!(key, RuleKey::new(0, 0));

        // Speeding the slow entry up by 1e12 pulls its time in proportionally.
        let (before, _) = queue.pending[&RuleKey::new(1, 0)];
        let change = table.set(RuleKey::new(1, 0), 1e3).unwrap();
        table.set(RuleKey::new(0, 0), 0.0);
        let zeroed = PropensityChange {
            key: RuleKey::new(0, 0),
            old: 1.0,
            new: 0.0,
        };
        let selection = queue.select(&table, &[change, zeroed], &mut rng, time);
        let Selection::Fire { key, time: next } = selection else {
            panic!("expected a firing");
        };
        assert_eq!(key, RuleKey::new(1, 0));
        let expected = time + 1e-12 * (before - time);
        assert!((next - expected).abs() <= 1e-9 * expected.abs().max(1.0));
    }
}
