//! Gillespie first reaction method.

use rand::Rng;
use rand_distr::Exp1;

use super::table::PropensityTable;
use super::Selection;

/// One exponential draw per positive entry; the earliest wins, and ties go to
/// the entry seen first.
pub(super) fn select<R: Rng>(table: &PropensityTable, rng: &mut R, now: f64) -> Selection {
    let mut best = None;
    for (key, a) in table.positive_entries() {
        let e: f64 = rng.sample(Exp1);
        let time = now + e / a;
        if !time.is_finite() {
            continue;
        }
        match best {
            Some((_, t)) if t <= time => {}
            _ => best = Some((key, time)),
        }
    }
    best.map_or(Selection::NoRule, |(key, time)| Selection::Fire { key, time })
}
