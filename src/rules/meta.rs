//! Meta-rules: reaction templates parameterised over compartment types.

use std::collections::BTreeSet;

use crate::class::{parse_var_name, ClassRegistry};
use crate::error::{DefinitionError, SlotPart};
use crate::expr::substitute::{neutralize_slots, positional_aliases, referenced_constants};
use crate::expr::{CompiledExpr, SymbolTable};
use crate::matching::TypeRequirement;
use crate::persist::MetaRuleDoc;

/// Value every symbol takes during definition probing.
pub const PROBE_VALUE: f64 = 1.0;

#[derive(Debug, Clone, Default, PartialEq)]
struct SlotDefinition {
    stoichiometry: Option<(Vec<f64>, Vec<String>)>,
    propensity: Option<(String, Vec<String>)>,
}

/// A reaction template with one slot per target compartment.
///
/// Every slot needs a linear stoichiometry (the change applied to the
/// compartment filling it) and a propensity factor. The propensity of a
/// concrete event is the product of its slot factors.
#[derive(Debug, Clone, PartialEq)]
pub struct MetaRule {
    name: String,
    targets: Vec<TypeRequirement>,
    slots: Vec<SlotDefinition>,
}

impl MetaRule {
    /// Create a rule with the given per-slot type requirements.
    #[must_use]
    pub fn new<I, T>(name: &str, targets: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TypeRequirement>,
    {
        let targets: Vec<TypeRequirement> = targets.into_iter().map(Into::into).collect();
        let slots = vec![SlotDefinition::default(); targets.len()];
        Self {
            name: name.to_string(),
            targets,
            slots,
        }
    }

    /// Rule name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Per-slot type requirements.
    #[must_use]
    pub fn targets(&self) -> &[TypeRequirement] {
        &self.targets
    }

    /// Number of slots.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.targets.len()
    }

    pub(crate) fn set_targets(&mut self, targets: Vec<TypeRequirement>) {
        self.targets = targets;
    }

    fn slot_mut(&mut self, slot: usize) -> Result<&mut SlotDefinition, DefinitionError> {
        let slots = self.slots.len();
        self.slots
            .get_mut(slot)
            .ok_or_else(|| DefinitionError::SlotOutOfRange {
                rule: self.name.clone(),
                slot,
                slots,
            })
    }

    /// Set the linear stoichiometry of a slot: `values[i]` is added to
    /// `classes[i]` each time the rule fires.
    pub fn with_stoichiometry<S: AsRef<str>>(
        mut self,
        slot: usize,
        values: &[f64],
        classes: &[S],
    ) -> Result<Self, DefinitionError> {
        let name = self.name.clone();
        if values.len() != classes.len() {
            return Err(DefinitionError::StoichiometryShape {
                rule: name,
                slot,
                values: values.len(),
                classes: classes.len(),
            });
        }
        let definition = self.slot_mut(slot)?;
        if definition.stoichiometry.is_some() {
            return Err(DefinitionError::DuplicateSlotDefinition {
                rule: name,
                slot,
                part: SlotPart::Stoichiometry,
            });
        }
        definition.stoichiometry = Some((
            values.to_vec(),
            classes.iter().map(|c| parse_var_name(c.as_ref())).collect(),
        ));
        Ok(self)
    }

    /// Set the propensity factor of a slot. `classes` lists the compartment
    /// classes the expression reads.
    pub fn with_propensity<S: AsRef<str>>(
        mut self,
        slot: usize,
        expression: &str,
        classes: &[S],
    ) -> Result<Self, DefinitionError> {
        let name = self.name.clone();
        let definition = self.slot_mut(slot)?;
        if definition.propensity.is_some() {
            return Err(DefinitionError::DuplicateSlotDefinition {
                rule: name,
                slot,
                part: SlotPart::Propensity,
            });
        }
        definition.propensity = Some((
            expression.to_string(),
            classes.iter().map(|c| parse_var_name(c.as_ref())).collect(),
        ));
        Ok(self)
    }

    /// Validate against `classes` and produce the merged document form.
    pub fn finalize(&self, classes: &ClassRegistry) -> Result<MetaRuleDoc, DefinitionError> {
        let mut required_classes = Vec::with_capacity(self.slots.len());
        let mut stoichiometry = Vec::with_capacity(self.slots.len());
        let mut propensity = Vec::with_capacity(self.slots.len());

        for (slot, definition) in self.slots.iter().enumerate() {
            let missing = |part| DefinitionError::MissingSlotDefinition {
                rule: self.name.clone(),
                slot,
                part,
            };
            let (values, stoich_classes) = definition
                .stoichiometry
                .as_ref()
                .ok_or_else(|| missing(SlotPart::Stoichiometry))?;
            let (expression, prop_classes) = definition
                .propensity
                .as_ref()
                .ok_or_else(|| missing(SlotPart::Propensity))?;

            for class in stoich_classes.iter().chain(prop_classes) {
                if !classes.contains(class) {
                    return Err(DefinitionError::UndefinedRuleClass {
                        rule: self.name.clone(),
                        class: class.clone(),
                    });
                }
            }

            self.probe(slot, expression, prop_classes, classes)?;

            let merged: Vec<String> = stoich_classes
                .iter()
                .chain(prop_classes)
                .cloned()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            let mut reindexed = vec![0.0; merged.len()];
            for (class, value) in stoich_classes.iter().zip(values) {
                if let Some(i) = merged.iter().position(|m| m == class) {
                    reindexed[i] += value;
                }
            }

            required_classes.push(merged);
            stoichiometry.push(reindexed);
            propensity.push(expression.clone());
        }

        Ok(MetaRuleDoc {
            rule_name: self.name.clone(),
            target_types: self.targets.clone(),
            required_classes,
            stoichiometry,
            propensity,
        })
    }

    fn probe(
        &self,
        slot: usize,
        expression: &str,
        prop_classes: &[String],
        classes: &ClassRegistry,
    ) -> Result<(), DefinitionError> {
        let neutral = neutralize_slots(expression);
        let mut globals = classes.builtin_names();
        globals.extend(referenced_constants(&neutral));
        // `x{i}` indexes the compartment layout, which only exists after
        // matching; the alias is checked when the concrete rule is compiled.
        globals.extend(
            positional_aliases(&neutral)
                .into_iter()
                .filter(|alias| !prop_classes.contains(alias)),
        );
        let symbols = SymbolTable::new(prop_classes.to_vec(), globals);
        CompiledExpr::compile(&neutral, &symbols)
            .and_then(|compiled| compiled.probe(PROBE_VALUE, &symbols))
            .map(|_| ())
            .map_err(|source| DefinitionError::InvalidPropensity {
                rule: self.name.clone(),
                slot,
                expression: expression.to_string(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExpressionError;

    fn registry() -> ClassRegistry {
        let mut classes = ClassRegistry::new();
        for name in ["S", "I", "R"] {
            classes.add_class(name, "people").unwrap();
        }
        classes
    }

    #[test]
    fn finalize_merges_and_sorts_classes() {
        let rule = MetaRule::new("infection", ["town"])
            .with_stoichiometry(0, &[-1.0, 1.0], &["S", "I"])
            .unwrap()
            .with_propensity(0, "comp_beta*S*I/(S+I+R)", &["S", "I", "R"])
            .unwrap();
        let doc = rule.finalize(&registry()).unwrap();
        assert_eq!(doc.required_classes, vec![vec!["I", "R", "S"]]);
        assert_eq!(doc.stoichiometry, vec![vec![1.0, 0.0, -1.0]]);
        assert_eq!(doc.target_types, vec![TypeRequirement::Exact("town".into())]);
    }

    #[test]
    fn duplicate_definitions_are_rejected() {
        let rule = MetaRule::new("r", ["any"])
            .with_propensity(0, "S", &["S"])
            .unwrap();
        assert!(matches!(
            rule.with_propensity(0, "I", &["I"]),
            Err(DefinitionError::DuplicateSlotDefinition {
                part: SlotPart::Propensity,
                ..
            })
        ));
    }

    #[test]
    fn out_of_range_slot_is_rejected() {
        assert!(matches!(
            MetaRule::new("r", ["any"]).with_stoichiometry(1, &[1.0], &["S"]),
            Err(DefinitionError::SlotOutOfRange { slot: 1, slots: 1, .. })
        ));
    }

    #[test]
    fn missing_propensity_is_rejected() {
        let rule = MetaRule::new("r", ["any"])
            .with_stoichiometry(0, &[1.0], &["S"])
            .unwrap();
        assert!(matches!(
            rule.finalize(&registry()),
            Err(DefinitionError::MissingSlotDefinition {
                part: SlotPart::Propensity,
                ..
            })
        ));
    }

    #[test]
    fn undefined_class_names_the_rule() {
        let rule = MetaRule::new("birth", ["any"])
            .with_stoichiometry(0, &[1.0], &["E"])
            .unwrap()
            .with_propensity(0, "1", &[] as &[&str])
            .unwrap();
        assert_eq!(
            rule.finalize(&registry()).unwrap_err(),
            DefinitionError::UndefinedRuleClass {
                rule: "birth".to_string(),
                class: "E".to_string(),
            }
        );
    }

    #[test]
    fn non_numeric_propensity_is_rejected() {
        let rule = MetaRule::new("r", ["any"])
            .with_stoichiometry(0, &[1.0], &["S"])
            .unwrap()
            .with_propensity(0, "S/(S-I)", &["S", "I"])
            .unwrap();
        assert!(matches!(
            rule.finalize(&registry()),
            Err(DefinitionError::InvalidPropensity {
                source: ExpressionError::InvalidProbe { .. },
                ..
            })
        ));

        let unknown = MetaRule::new("r", ["any"])
            .with_stoichiometry(0, &[1.0], &["S"])
            .unwrap()
            .with_propensity(0, "gamma*S", &["S"])
            .unwrap();
        assert!(matches!(
            unknown.finalize(&registry()),
            Err(DefinitionError::InvalidPropensity {
                source: ExpressionError::UnknownSymbol { .. },
                ..
            })
        ));
    }

    #[test]
    fn positional_aliases_are_not_resolved_against_slot_classes() {
        // Against the slot classes alone, `x40` would fall past the built-ins.
        let rule = MetaRule::new("r", ["any"])
            .with_stoichiometry(0, &[-1.0], &["S"])
            .unwrap()
            .with_propensity(0, "x40*S", &["S"])
            .unwrap();
        assert!(rule.finalize(&registry()).is_ok());
    }

    #[test]
    fn builtins_and_slot_placeholders_validate_cleanly() {
        let rule = MetaRule::new("move", ["farm", "farm"])
            .with_stoichiometry(0, &[-1.0], &["S"])
            .unwrap()
            .with_stoichiometry(1, &[1.0], &["S"])
            .unwrap()
            .with_propensity(0, "S*model_month_jan/comp_distance_{slot1}", &["S"])
            .unwrap()
            .with_propensity(1, "1", &[] as &[&str])
            .unwrap();
        assert!(rule.finalize(&registry()).is_ok());
    }
}
