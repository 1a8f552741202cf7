//! Compilation of a type bucket into a concrete rule document.

use crate::error::DefinitionError;
use crate::persist::{dense, CompartmentDoc, MatchedRuleDoc, MetaRuleDoc};

use super::types::TypeBucket;

/// Expand `meta` over one bucket.
///
/// The first index set supplies the representative compartments; each slot's
/// stoichiometry is re-indexed from the rule's sorted class list onto the
/// representative's layout, zero padded.
pub fn compile_bucket(
    rule_num: usize,
    meta: &MetaRuleDoc,
    bucket: &TypeBucket,
    compartments: &[CompartmentDoc],
) -> Result<MatchedRuleDoc, DefinitionError> {
    let representative = bucket.index_sets.first().ok_or_else(|| {
        DefinitionError::UnsatisfiableSlot {
            rule: meta.rule_name.clone(),
            slot: 0,
            required: bucket.key(),
        }
    })?;

    let mut stoichiometry = Vec::with_capacity(representative.len());
    for (slot, &index) in representative.iter().enumerate() {
        let compartment = &compartments[index];
        let labels = dense(&compartment.label_mapping, &compartment.compartment_name)
            .unwrap_or_default();
        let mut expanded = vec![0.0; labels.len()];
        for (class, &change) in meta.required_classes[slot]
            .iter()
            .zip(&meta.stoichiometry[slot])
        {
            let position = labels.iter().position(|l| l == class).ok_or_else(|| {
                DefinitionError::MissingCompartmentClass {
                    rule: meta.rule_name.clone(),
                    slot,
                    compartment: compartment.compartment_name.clone(),
                    class: class.clone(),
                }
            })?;
            expanded[position] = change;
        }
        stoichiometry.push(expanded);
    }

    Ok(MatchedRuleDoc {
        rule_num,
        rule_name: meta.rule_name.clone(),
        rule_compartment_types: bucket.signature.clone(),
        stoichiometry,
        propensity: meta.propensity.clone(),
        matching_indices: bucket.index_sets.clone(),
    })
}
