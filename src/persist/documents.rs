//! Typed records persisted to disk.
//!
//! Field names match the on-disk JSON layout, including the historical
//! `stoichiomety` spelling and the `location_*` aliases of older files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::PersistenceError;
use crate::matching::TypeRequirement;

/// One compartment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompartmentDoc {
    /// Compartment name.
    #[serde(alias = "location_name")]
    pub compartment_name: String,
    /// Latitude in degrees.
    #[serde(default)]
    pub lat: f64,
    /// Longitude in degrees.
    #[serde(default)]
    pub long: f64,
    /// Type tag.
    #[serde(rename = "type")]
    pub comp_type: String,
    /// Dense index (as a string) to class name.
    pub label_mapping: BTreeMap<String, String>,
    /// Initial values in layout order.
    pub initial_values: Vec<f64>,
    /// Constants, keyed by prefixed name.
    #[serde(default, alias = "location_constants")]
    pub compartment_constants: BTreeMap<String, f64>,
}

/// A validated meta-rule, with class lists merged and sorted per slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaRuleDoc {
    /// Rule name.
    pub rule_name: String,
    /// Per-slot type requirements.
    pub target_types: Vec<TypeRequirement>,
    /// Per-slot sorted class lists.
    pub required_classes: Vec<Vec<String>>,
    /// Per-slot stoichiometry indexed by `required_classes`.
    pub stoichiometry: Vec<Vec<f64>>,
    /// Per-slot propensity expressions.
    pub propensity: Vec<String>,
}

/// A concrete rule: one type-signature bucket of a meta-rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedRuleDoc {
    /// Index of the meta-rule this rule was compiled from.
    pub rule_num: usize,
    /// Name of the meta-rule.
    pub rule_name: String,
    /// Type signature of the bucket.
    #[serde(default)]
    pub rule_compartment_types: Vec<String>,
    /// Per-slot stoichiometry in the representative compartment's layout.
    #[serde(rename = "stoichiomety", alias = "stoichiometry")]
    pub stoichiometry: Vec<Vec<f64>>,
    /// Per-slot propensity expressions, constants still symbolic.
    pub propensity: Vec<String>,
    /// Index sets of the bucket.
    pub matching_indices: Vec<Vec<usize>>,
}

/// Convert a map keyed by dense string indices into a vector.
///
/// Keys must be exactly `"0"..="n-1"`.
pub fn dense<T: Clone>(
    map: &BTreeMap<String, T>,
    document: &str,
) -> Result<Vec<T>, PersistenceError> {
    let mut indexed: Vec<(usize, &T)> = Vec::with_capacity(map.len());
    for (key, value) in map {
        let index = key.parse::<usize>().map_err(|_| PersistenceError::Malformed {
            document: document.to_string(),
            reason: format!("key '{key}' is not an index"),
        })?;
        indexed.push((index, value));
    }
    indexed.sort_by_key(|(i, _)| *i);
    for (expected, (index, _)) in indexed.iter().enumerate() {
        if *index != expected {
            return Err(PersistenceError::Malformed {
                document: document.to_string(),
                reason: format!("indices are not dense: expected {expected}, found {index}"),
            });
        }
    }
    Ok(indexed.into_iter().map(|(_, v)| v.clone()).collect())
}

/// Inverse of [`dense`].
#[must_use]
pub fn keyed<T: Clone>(items: &[T]) -> BTreeMap<String, T> {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| (i.to_string(), item.clone()))
        .collect()
}
