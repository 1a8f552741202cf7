//! Dependency graph between concrete rule firings.
//!
//! Firing a (rule, index set) writes a set of (class, compartment) pairs; any
//! (rule, index set) whose propensity reads one of them must be re-evaluated.
//! Built-in classes are tracked separately, keyed by name, since they change
//! with the clock rather than with rule firings.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::expr::VarRef;

use super::rule::Rule;

/// Identifies one (rule, index set) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RuleKey {
    /// Rule position in the model.
    pub rule: usize,
    /// Index set position within the rule.
    pub index_set: usize,
}

impl RuleKey {
    /// Create a key.
    #[must_use]
    pub const fn new(rule: usize, index_set: usize) -> Self {
        Self { rule, index_set }
    }
}

/// Every key of `rules`, in rule-major order.
pub fn all_keys(rules: &[Rule]) -> impl Iterator<Item = RuleKey> + '_ {
    rules.iter().enumerate().flat_map(|(r, rule)| {
        (0..rule.index_sets().len()).map(move |i| RuleKey::new(r, i))
    })
}

/// A class of a specific compartment: `(class position, compartment)`.
type ClassCell = (usize, usize);

/// Read-only dependency map built once per model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    by_rule: HashMap<RuleKey, Vec<RuleKey>>,
    by_builtin: BTreeMap<String, Vec<RuleKey>>,
}

impl DependencyGraph {
    /// Build the graph. `globals` are the built-in names in vector order.
    #[must_use]
    pub fn build(rules: &[Rule], globals: &[String]) -> Self {
        let mut readers: HashMap<ClassCell, BTreeSet<RuleKey>> = HashMap::new();
        let mut by_builtin: BTreeMap<String, BTreeSet<RuleKey>> = BTreeMap::new();

        for key in all_keys(rules) {
            let rule = &rules[key.rule];
            for (slot, &compartment) in rule.index_sets()[key.index_set].iter().enumerate() {
                for var in rule.slot_function(slot, key.index_set).reads() {
                    match *var {
                        VarRef::Local(class) => {
                            readers.entry((class, compartment)).or_default().insert(key);
                        }
                        VarRef::Global(j) => {
                            if let Some(name) = globals.get(j) {
                                by_builtin.entry(name.clone()).or_default().insert(key);
                            }
                        }
                    }
                }
            }
        }

        let mut by_rule = HashMap::new();
        for key in all_keys(rules) {
            let rule = &rules[key.rule];
            let mut affected = BTreeSet::new();
            for (slot, &compartment) in rule.index_sets()[key.index_set].iter().enumerate() {
                for (class, &delta) in rule.stoichiometry(slot).iter().enumerate() {
                    if delta == 0.0 {
                        continue;
                    }
                    if let Some(keys) = readers.get(&(class, compartment)) {
                        affected.extend(keys.iter().copied());
                    }
                }
            }
            by_rule.insert(key, affected.into_iter().collect());
        }

        Self {
            by_rule,
            by_builtin: by_builtin
                .into_iter()
                .map(|(name, keys)| (name, keys.into_iter().collect()))
                .collect(),
        }
    }

    /// Keys whose propensity may change when `key` fires, sorted.
    #[must_use]
    pub fn affected_by(&self, key: RuleKey) -> &[RuleKey] {
        self.by_rule.get(&key).map_or(&[][..], Vec::as_slice)
    }

    /// Keys reading built-in `name`, sorted.
    #[must_use]
    pub fn readers_of_builtin(&self, name: &str) -> &[RuleKey] {
        self.by_builtin.get(name).map_or(&[][..], Vec::as_slice)
    }

    /// Union of the keys affected by `fired` and by the `changed` built-ins.
    #[must_use]
    pub fn affected(&self, fired: &[RuleKey], changed: &[String]) -> BTreeSet<RuleKey> {
        let mut out = BTreeSet::new();
        for key in fired {
            out.extend(self.affected_by(*key).iter().copied());
        }
        for name in changed {
            out.extend(self.readers_of_builtin(name).iter().copied());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compartment::Compartment;
    use crate::persist::{CompartmentDoc, MatchedRuleDoc};

    fn compartments(n: usize) -> Vec<Compartment> {
        (0..n)
            .map(|i| {
                let doc = CompartmentDoc {
                    compartment_name: format!("c{i}"),
                    lat: 0.0,
                    long: 0.0,
                    comp_type: "t".to_string(),
                    label_mapping: [
                        ("0".to_string(), "A".to_string()),
                        ("1".to_string(), "B".to_string()),
                    ]
                    .into_iter()
                    .collect(),
                    initial_values: vec![1.0, 1.0],
                    compartment_constants: BTreeMap::new(),
                };
                Compartment::from_doc(i, &doc).unwrap()
            })
            .collect()
    }

    fn rule(
        name: &str,
        stoich: Vec<Vec<f64>>,
        propensity: &[&str],
        sets: Vec<Vec<usize>>,
    ) -> MatchedRuleDoc {
        MatchedRuleDoc {
            rule_num: 0,
            rule_name: name.to_string(),
            rule_compartment_types: vec!["t".to_string(); stoich.len()],
            stoichiometry: stoich,
            propensity: propensity.iter().map(ToString::to_string).collect(),
            matching_indices: sets,
        }
    }

    #[test]
    fn writes_reach_readers_in_the_same_compartment_only() {
        let c = compartments(2);
        let globals = vec!["model_day".to_string()];
        // r0: A -> B, reads A.   r1: reads B and model_day, writes nothing.
        let convert = rule("convert", vec![vec![-1.0, 1.0]], &["A"], vec![vec![0], vec![1]]);
        let watch = rule("watch", vec![vec![0.0, 0.0]], &["B*model_day"], vec![vec![0], vec![1]]);
        let rules = vec![
            Rule::load(&convert, &c, &globals).unwrap(),
            Rule::load(&watch, &c, &globals).unwrap(),
        ];
        let graph = DependencyGraph::build(&rules, &globals);

        assert_eq!(
            graph.affected_by(RuleKey::new(0, 0)),
            &[RuleKey::new(0, 0), RuleKey::new(1, 0)]
        );
        assert_eq!(
            graph.affected_by(RuleKey::new(0, 1)),
            &[RuleKey::new(0, 1), RuleKey::new(1, 1)]
        );
        assert!(graph.affected_by(RuleKey::new(1, 0)).is_empty());
        assert_eq!(
            graph.readers_of_builtin("model_day"),
            &[RuleKey::new(1, 0), RuleKey::new(1, 1)]
        );
        assert!(graph.readers_of_builtin("model_hour").is_empty());
    }

    #[test]
    fn multi_slot_writes_cover_every_slot() {
        let c = compartments(2);
        let moves = rule(
            "move",
            vec![vec![-1.0, 0.0], vec![1.0, 0.0]],
            &["A", "1"],
            vec![vec![0, 1], vec![1, 0]],
        );
        let rules = vec![Rule::load(&moves, &c, &[]).unwrap()];
        let graph = DependencyGraph::build(&rules, &[]);
        // Firing 0->1 changes A at both compartments; both directions read A.
        assert_eq!(
            graph.affected_by(RuleKey::new(0, 0)),
            &[RuleKey::new(0, 0), RuleKey::new(0, 1)]
        );
        let union = graph.affected(&[RuleKey::new(0, 0)], &["model_day".to_string()]);
        assert_eq!(union.len(), 2);
    }

    #[test]
    fn keys_are_rule_major() {
        let c = compartments(3);
        let rules = vec![
            Rule::load(
                &rule("a", vec![vec![0.0, 0.0]], &["1"], vec![vec![0], vec![1], vec![2]]),
                &c,
                &[],
            )
            .unwrap(),
            Rule::load(&rule("b", vec![vec![0.0, 0.0]], &["1"], vec![vec![2]]), &c, &[]).unwrap(),
        ];
        let keys: Vec<RuleKey> = all_keys(&rules).collect();
        assert_eq!(
            keys,
            vec![RuleKey::new(0, 0), RuleKey::new(0, 1), RuleKey::new(0, 2), RuleKey::new(1, 0)]
        );
    }
}
