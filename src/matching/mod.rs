//! Rule matching: expands meta-rules over the compartments of a model.
//!
//! Each meta-rule is matched slot by slot against compartment types
//! ([`types`]); every resulting type-signature bucket becomes one concrete
//! rule ([`concrete`]).

pub mod concrete;
pub mod types;

use tracing::debug;

use crate::error::DefinitionError;
use crate::persist::{CompartmentDoc, MatchedRuleDoc, MetaRuleDoc};

pub use concrete::compile_bucket;
pub use types::{is_subtype_of, match_rule, TypeBucket, TypeRequirement};

/// Match every meta-rule and compile its buckets, in rule order.
pub fn match_rules(
    meta_rules: &[MetaRuleDoc],
    compartments: &[CompartmentDoc],
) -> Result<Vec<MatchedRuleDoc>, DefinitionError> {
    let types: Vec<&str> = compartments.iter().map(|c| c.comp_type.as_str()).collect();
    let mut matched = Vec::new();
    for (rule_num, meta) in meta_rules.iter().enumerate() {
        let buckets = match_rule(&meta.rule_name, &meta.target_types, &types)?;
        for bucket in &buckets {
            matched.push(compile_bucket(rule_num, meta, bucket, compartments)?);
        }
        debug!(
            rule = %meta.rule_name,
            buckets = buckets.len(),
            index_sets = buckets.iter().map(|b| b.index_sets.len()).sum::<usize>(),
            "rule matched"
        );
    }
    Ok(matched)
}
