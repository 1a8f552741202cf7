//! Rule definitions.
//!
//! Users describe dynamics as [`MetaRule`]s, either directly or through the
//! builders in [`templates`], and collect them in a [`MetaRuleSet`].

pub mod meta;
pub mod templates;

use tracing::warn;

use crate::class::ClassRegistry;
use crate::error::DefinitionError;
use crate::matching::TypeRequirement;
use crate::persist::MetaRuleDoc;

pub use meta::MetaRule;

/// Ordered collection of meta-rules. Order determines rule numbering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetaRuleSet {
    rules: Vec<MetaRule>,
}

impl MetaRuleSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule.
    pub fn add_rule(&mut self, rule: MetaRule) -> &mut Self {
        self.rules.push(rule);
        self
    }

    /// Append several rules.
    pub fn add_rules(&mut self, rules: impl IntoIterator<Item = MetaRule>) -> &mut Self {
        self.rules.extend(rules);
        self
    }

    /// Rules in definition order.
    #[must_use]
    pub fn rules(&self) -> &[MetaRule] {
        &self.rules
    }

    /// Number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Drop type requirements, for models with a single implicit compartment.
    ///
    /// Every rule must have exactly one slot, which becomes `any`.
    pub fn remove_type_requirement(&mut self) -> Result<(), DefinitionError> {
        for rule in &mut self.rules {
            if rule.slot_count() != 1 {
                return Err(DefinitionError::CompartmentlessArity {
                    rule: rule.name().to_string(),
                    slots: rule.slot_count(),
                });
            }
            if rule.targets()[0] != TypeRequirement::Any {
                warn!(
                    rule = rule.name(),
                    target = %rule.targets()[0],
                    "type requirement ignored in compartmentless model"
                );
            }
            rule.set_targets(vec![TypeRequirement::Any]);
        }
        Ok(())
    }

    /// Validate every rule and produce their documents.
    pub fn finalize(&self, classes: &ClassRegistry) -> Result<Vec<MetaRuleDoc>, DefinitionError> {
        self.rules.iter().map(|rule| rule.finalize(classes)).collect()
    }
}
