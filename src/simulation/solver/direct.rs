//! Gillespie direct method.

use rand::distributions::Open01;
use rand::Rng;
use tracing::warn;

use crate::simulation::dependency::RuleKey;

use super::table::PropensityTable;
use super::Selection;

/// One uniform for the waiting time, one for the roulette wheel.
pub(super) fn select<R: Rng>(table: &PropensityTable, rng: &mut R, now: f64) -> Selection {
    let total = table.total();
    let u1: f64 = rng.sample(Open01);
    let u2: f64 = rng.sample(Open01);
    let time = now - u1.ln() / total;
    let target = u2 * total;

    match roulette(table, target) {
        Some(key) => Selection::Fire { key, time },
        None => {
            warn!(total, target, "direct method overshot the propensity total");
            Selection::NoRule
        }
    }
}

/// First positive entry whose running sum reaches `target`.
fn roulette(table: &PropensityTable, target: f64) -> Option<RuleKey> {
    let mut cumulative = 0.0;
    for (key, a) in table.positive_entries() {
        cumulative += a;
        if cumulative >= target {
            return Some(key);
        }
    }
    None
}
