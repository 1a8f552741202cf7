//! Two-level selection: a rule by its total, then one of its index sets.

use rand::distributions::Open01;
use rand::Rng;
use tracing::warn;

use crate::simulation::dependency::RuleKey;

use super::table::PropensityTable;
use super::Selection;

pub(super) fn select<R: Rng>(table: &PropensityTable, rng: &mut R, now: f64) -> Selection {
    let total = table.total();
    let u1: f64 = rng.sample(Open01);
    let u2: f64 = rng.sample(Open01);
    let u3: f64 = rng.sample(Open01);
    let time = now - u1.ln() / total;

    let Some(rule) = pick(table.rule_totals(), u2 * total) else {
        warn!(total, "two-level selection found no rule");
        return Selection::NoRule;
    };
    let rule_total = table.rule_totals()[rule];
    match pick(table.rule_values(rule), u3 * rule_total) {
        Some(index_set) => Selection::Fire {
            key: RuleKey::new(rule, index_set),
            time,
        },
        None => {
            warn!(rule, rule_total, "two-level selection found no index set");
            Selection::NoRule
        }
    }
}

/// First positive weight whose running sum reaches `target`.
fn pick(weights: &[f64], target: f64) -> Option<usize> {
    let mut cumulative = 0.0;
    for (i, &w) in weights.iter().enumerate() {
        if w <= 0.0 {
            continue;
        }
        cumulative += w;
        if cumulative >= target {
            return Some(i);
        }
    }
    None
}
