//! Fixed-step tau-leaping.

use rand::Rng;
use rand_distr::{Distribution, Poisson};
use tracing::{debug, warn};

use crate::simulation::config::NegativeDrawPolicy;
use crate::simulation::dependency::RuleKey;
use crate::simulation::SimulationSystem;

use super::table::PropensityTable;

/// Draw a Poisson firing count for every positive (rule, index set) and
/// apply them in rule-major order. Returns the applied counts.
///
/// Counts are checked against the state as left by earlier applications in
/// the same leap.
pub(super) fn leap<R: Rng>(
    system: &mut SimulationSystem,
    table: &PropensityTable,
    rng: &mut R,
    step: f64,
    policy: NegativeDrawPolicy,
    tolerance: f64,
) -> Vec<(RuleKey, u64)> {
    let mut applied = Vec::new();
    for (key, a) in table.positive_entries() {
        let Ok(poisson) = Poisson::new(a * step) else {
            warn!(
                rule = key.rule,
                index_set = key.index_set,
                mean = a * step,
                "invalid Poisson mean"
            );
            continue;
        };
        let rule = &system.rules[key.rule];

        let count = match policy {
            NegativeDrawPolicy::Ignore => Some::<f64>(poisson.sample(rng)),
            NegativeDrawPolicy::Redraw { max_attempts } => {
                let mut accepted = None;
                for attempt in 1..=max_attempts {
                    let k: f64 = poisson.sample(rng);
                    let fits = rule
                        .check_change(key.index_set, &system.compartments, k, tolerance)
                        .is_ok();
                    if k == 0.0 || fits {
                        accepted = Some(k);
                        break;
                    }
                    debug!(
                        rule = rule.name(),
                        index_set = key.index_set,
                        count = k,
                        attempt,
                        "redrawing leap count"
                    );
                }
                if accepted.is_none() {
                    debug!(
                        rule = rule.name(),
                        index_set = key.index_set,
                        max_attempts,
                        "leap skipped after redraws"
                    );
                }
                accepted
            }
        };

        let Some(k) = count.filter(|&k| k > 0.0) else {
            continue;
        };
        rule.apply_change(key.index_set, &mut system.compartments, k);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let count = k as u64;
        applied.push((key, count));
    }
    applied
}
