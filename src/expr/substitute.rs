//! Textual substitution applied before an expression is parsed.
//!
//! Slot placeholders (`{slotN}`) are replaced first, compartment constants
//! second. Replacement only ever matches whole identifiers.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use regex::{NoExpand, Regex};

use crate::class::CONSTANT_PREFIX;

fn slot_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{slot(\d+)\}").unwrap_or_else(|_| unreachable!()))
}

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").unwrap_or_else(|_| unreachable!())
    })
}

/// Replace every whole-identifier occurrence of `name` with `replacement`.
#[must_use]
pub fn replace_identifier(source: &str, name: &str, replacement: &str) -> String {
    identifier_pattern()
        .replace_all(source, |caps: &regex::Captures<'_>| {
            if &caps[0] == name {
                replacement.to_string()
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}

/// Identifiers appearing in `source`, ignoring numeric exponents.
#[must_use]
pub fn identifiers(source: &str) -> BTreeSet<String> {
    let bytes = source.as_bytes();
    identifier_pattern()
        .find_iter(source)
        .filter(|m| {
            // `1e5` scans as a number, not as identifier `e5`.
            let before = m.start().checked_sub(1).map(|i| bytes[i]);
            !matches!(before, Some(b) if b.is_ascii_digit() || b == b'.')
        })
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Compartment constants referenced by `source`.
#[must_use]
pub fn referenced_constants(source: &str) -> BTreeSet<String> {
    identifiers(source)
        .into_iter()
        .filter(|name| name.starts_with(CONSTANT_PREFIX))
        .collect()
}

/// Positional aliases (`x0`, `x1`, ...) referenced by `source`.
#[must_use]
pub fn positional_aliases(source: &str) -> BTreeSet<String> {
    identifiers(source)
        .into_iter()
        .filter(|name| {
            name.strip_prefix('x').is_some_and(|digits| {
                !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
            })
        })
        .collect()
}

/// Whether `source` contains slot placeholders.
#[must_use]
pub fn has_slot_placeholders(source: &str) -> bool {
    slot_pattern().is_match(source)
}

/// Replace `{slotN}` with the N-th entry of `names`.
///
/// Placeholders referring to slots past the end of `names` are left intact,
/// so the subsequent parse reports them.
#[must_use]
pub fn substitute_slots(source: &str, names: &[String]) -> String {
    slot_pattern()
        .replace_all(source, |caps: &regex::Captures<'_>| {
            caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|slot| names.get(slot))
                .map_or_else(|| caps[0].to_string(), Clone::clone)
        })
        .into_owned()
}

/// Replace each referenced constant with its literal value.
#[must_use]
pub fn substitute_constants(source: &str, constants: &BTreeMap<String, f64>) -> String {
    let mut out = source.to_string();
    for name in referenced_constants(source) {
        if let Some(value) = constants.get(&name) {
            out = replace_identifier(&out, &name, &format!("({value:?})"));
        }
    }
    out
}

/// Replace slot placeholders with a fixed token, so an expression can be
/// checked before any compartment is matched.
#[must_use]
pub fn neutralize_slots(source: &str) -> String {
    slot_pattern()
        .replace_all(source, NoExpand("slot"))
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replacement_matches_whole_identifiers_only() {
        let out = replace_identifier("S*Susceptible + comp_S + S", "S", "x0");
        assert_eq!(out, "x0*Susceptible + comp_S + x0");
    }

    #[test]
    fn identifiers_skip_exponents() {
        let ids = identifiers("1e5*S + 2.5E-3*comp_rate");
        let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
        assert_eq!(ids, vec!["S", "comp_rate"]);
    }

    #[test]
    fn positional_aliases_need_digits() {
        let aliases = positional_aliases("x0*x12 + x + xy + max(x3, 1e5)");
        assert_eq!(
            aliases.into_iter().collect::<Vec<_>>(),
            vec!["x0".to_string(), "x12".to_string(), "x3".to_string()]
        );
    }

    #[test]
    fn constants_are_substituted_with_literals() {
        let mut constants = BTreeMap::new();
        constants.insert("comp_beta".to_string(), 0.3);
        constants.insert("comp_shift".to_string(), -2.0);
        let out = substitute_constants("comp_beta*S + comp_shift + comp_beta_2", &constants);
        assert_eq!(out, "(0.3)*S + (-2.0) + comp_beta_2");
    }

    #[test]
    fn slots_are_replaced_by_compartment_names() {
        assert!(has_slot_placeholders("comp_distance_{slot1}*S"));
        let names = vec!["Farm_A".to_string(), "Farm_B".to_string()];
        assert_eq!(
            substitute_slots("comp_distance_{slot1}*S", &names),
            "comp_distance_Farm_B*S"
        );
        assert_eq!(substitute_slots("{slot7}", &names), "{slot7}");
    }

    #[test]
    fn neutralized_slots_form_identifiers() {
        assert_eq!(neutralize_slots("comp_distance_{slot1}"), "comp_distance_slot");
    }
}
