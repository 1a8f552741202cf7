//! Type matching of rule slots against compartments.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DefinitionError;

/// Type constraint on a single rule slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TypeRequirement {
    /// Matches every compartment.
    Any,
    /// Matches compartments of exactly this type.
    Exact(String),
}

impl TypeRequirement {
    /// Wildcard spelling used in documents.
    pub const ANY: &'static str = "any";
}

impl From<String> for TypeRequirement {
    fn from(s: String) -> Self {
        if s.eq_ignore_ascii_case(Self::ANY) {
            Self::Any
        } else {
            Self::Exact(s)
        }
    }
}

impl From<&str> for TypeRequirement {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<TypeRequirement> for String {
    fn from(req: TypeRequirement) -> Self {
        match req {
            TypeRequirement::Any => TypeRequirement::ANY.to_string(),
            TypeRequirement::Exact(t) => t,
        }
    }
}

impl fmt::Display for TypeRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "{}", Self::ANY),
            Self::Exact(t) => write!(f, "{t}"),
        }
    }
}

/// Whether a compartment of type `actual` satisfies `required`.
///
/// Subtyping is plain equality for now; a type hierarchy would hook in here.
#[must_use]
pub fn is_subtype_of(actual: &str, required: &TypeRequirement) -> bool {
    match required {
        TypeRequirement::Any => true,
        TypeRequirement::Exact(t) => t == actual,
    }
}

/// Index sets sharing one type signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeBucket {
    /// Compartment type filling each slot.
    pub signature: Vec<String>,
    /// Index sets, each with one compartment index per slot.
    pub index_sets: Vec<Vec<usize>>,
}

impl TypeBucket {
    /// Signature joined by `_`, as used in rule naming.
    #[must_use]
    pub fn key(&self) -> String {
        self.signature.join("_")
    }
}

/// Enumerate the index sets satisfying `targets`, bucketed by signature.
///
/// `types[i]` is the type of compartment `i`. Within a bucket, index sets are
/// in lexicographic order; buckets are ordered by signature.
pub fn match_rule(
    rule: &str,
    targets: &[TypeRequirement],
    types: &[&str],
) -> Result<Vec<TypeBucket>, DefinitionError> {
    // Partial index sets grouped by the types used so far.
    let mut groups: BTreeMap<Vec<String>, Vec<Vec<usize>>> = BTreeMap::new();
    groups.insert(Vec::new(), vec![Vec::new()]);

    for (slot, required) in targets.iter().enumerate() {
        let candidates: Vec<usize> = types
            .iter()
            .enumerate()
            .filter(|(_, actual)| is_subtype_of(actual, required))
            .map(|(i, _)| i)
            .collect();

        let mut next: BTreeMap<Vec<String>, Vec<Vec<usize>>> = BTreeMap::new();
        for (signature, partials) in &groups {
            for partial in partials {
                for &candidate in &candidates {
                    if partial.contains(&candidate) {
                        continue;
                    }
                    let mut key = signature.clone();
                    key.push(types[candidate].to_string());
                    let mut extended = partial.clone();
                    extended.push(candidate);
                    next.entry(key).or_default().push(extended);
                }
            }
        }

        if next.is_empty() {
            return Err(DefinitionError::UnsatisfiableSlot {
                rule: rule.to_string(),
                slot,
                required: required.to_string(),
            });
        }
        groups = next;
    }

    Ok(groups
        .into_iter()
        .map(|(signature, mut index_sets)| {
            index_sets.sort();
            TypeBucket {
                signature,
                index_sets,
            }
        })
        .collect())
}
