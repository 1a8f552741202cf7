//! Runtime concrete rules with compiled propensity functions.

use std::collections::BTreeMap;

use crate::compartment::Compartment;
use crate::error::DefinitionError;
use crate::expr::substitute::{
    has_slot_placeholders, referenced_constants, substitute_constants, substitute_slots,
};
use crate::expr::{CompiledExpr, SymbolTable};
use crate::persist::MatchedRuleDoc;
use crate::rules::meta::PROBE_VALUE;

/// How the functions of one slot are shared across index sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropensityBinding {
    /// One function for every index set.
    Shared,
    /// One function per distinct compartment, with its constants inlined.
    PerCompartment,
    /// One function per index set, with slot names and constants inlined.
    PerIndexSet,
}

#[derive(Debug, Clone)]
struct SlotPropensity {
    binding: PropensityBinding,
    functions: Vec<CompiledExpr>,
    // index set -> position in `functions`
    by_index_set: Vec<usize>,
}

/// A value below the negativity floor that applying a rule would produce.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NegativeExcursion {
    /// Compartment index.
    pub compartment: usize,
    /// Class position in the compartment layout.
    pub class: usize,
    /// Value the class would take.
    pub value: f64,
}

/// A concrete rule ready for simulation.
#[derive(Debug, Clone)]
pub struct Rule {
    name: String,
    rule_num: usize,
    compartment_types: Vec<String>,
    stoichiometry: Vec<Vec<f64>>,
    index_sets: Vec<Vec<usize>>,
    slots: Vec<SlotPropensity>,
}

impl Rule {
    /// Compile a matched rule against loaded compartments.
    ///
    /// `globals` are the built-in class names in vector order.
    pub fn load(
        doc: &MatchedRuleDoc,
        compartments: &[Compartment],
        globals: &[String],
    ) -> Result<Self, DefinitionError> {
        let representative = doc.matching_indices.first().ok_or_else(|| {
            DefinitionError::UnsatisfiableSlot {
                rule: doc.rule_name.clone(),
                slot: 0,
                required: doc.rule_compartment_types.join("_"),
            }
        })?;

        // Every compartment of a bucket must share the representative layout,
        // as the stoichiometry was expanded from it.
        for set in &doc.matching_indices {
            for (slot, (&index, &rep)) in set.iter().zip(representative).enumerate() {
                if compartments[index].labels() != compartments[rep].labels() {
                    return Err(DefinitionError::LayoutMismatch {
                        rule: doc.rule_name.clone(),
                        slot,
                        compartment: compartments[index].name().to_string(),
                        representative: compartments[rep].name().to_string(),
                    });
                }
            }
        }

        let slots = doc
            .propensity
            .iter()
            .enumerate()
            .map(|(slot, source)| compile_slot(doc, slot, source, compartments, globals))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: doc.rule_name.clone(),
            rule_num: doc.rule_num,
            compartment_types: doc.rule_compartment_types.clone(),
            stoichiometry: doc.stoichiometry.clone(),
            index_sets: doc.matching_indices.clone(),
            slots,
        })
    }

    /// Rule name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Index of the meta-rule this rule came from.
    #[must_use]
    pub const fn rule_num(&self) -> usize {
        self.rule_num
    }

    /// Type signature of the rule.
    #[must_use]
    pub fn compartment_types(&self) -> &[String] {
        &self.compartment_types
    }

    /// Number of slots.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.stoichiometry.len()
    }

    /// All index sets.
    #[must_use]
    pub fn index_sets(&self) -> &[Vec<usize>] {
        &self.index_sets
    }

    /// Stoichiometry of a slot in compartment layout order.
    #[must_use]
    pub fn stoichiometry(&self, slot: usize) -> &[f64] {
        &self.stoichiometry[slot]
    }

    /// How functions of a slot are shared.
    #[must_use]
    pub fn binding(&self, slot: usize) -> PropensityBinding {
        self.slots[slot].binding
    }

    /// Compiled function of `slot` for index set `index_set`.
    #[must_use]
    pub fn slot_function(&self, slot: usize, index_set: usize) -> &CompiledExpr {
        let slot = &self.slots[slot];
        &slot.functions[slot.by_index_set[index_set]]
    }

    /// Propensity of index set `index_set`: the product of the slot factors,
    /// each clamped at zero.
    #[must_use]
    pub fn propensity(
        &self,
        index_set: usize,
        compartments: &[Compartment],
        globals: &[f64],
    ) -> f64 {
        let mut product = 1.0;
        for (slot, &compartment) in self.index_sets[index_set].iter().enumerate() {
            let raw = self
                .slot_function(slot, index_set)
                .evaluate(compartments[compartment].class_values(), globals);
            // `max` maps NaN to zero as well.
            product *= raw.max(0.0);
            if product == 0.0 {
                return 0.0;
            }
        }
        product
    }

    /// Check that firing `times` times keeps every class at or above
    /// `-tolerance`.
    pub fn check_change(
        &self,
        index_set: usize,
        compartments: &[Compartment],
        times: f64,
        tolerance: f64,
    ) -> Result<(), NegativeExcursion> {
        for (slot, &compartment) in self.index_sets[index_set].iter().enumerate() {
            let values = compartments[compartment].class_values();
            let deltas = &self.stoichiometry[slot];
            for (class, (value, delta)) in values.iter().zip(deltas).enumerate() {
                let next = value + times * delta;
                if next < -tolerance {
                    return Err(NegativeExcursion {
                        compartment,
                        class,
                        value: next,
                    });
                }
            }
        }
        Ok(())
    }

    /// Apply the stoichiometry `times` times to every slot.
    pub fn apply_change(&self, index_set: usize, compartments: &mut [Compartment], times: f64) {
        for (slot, &compartment) in self.index_sets[index_set].iter().enumerate() {
            compartments[compartment].apply_delta(&self.stoichiometry[slot], times);
        }
    }
}

fn compile_slot(
    doc: &MatchedRuleDoc,
    slot: usize,
    source: &str,
    compartments: &[Compartment],
    globals: &[String],
) -> Result<SlotPropensity, DefinitionError> {
    let compile = |text: &str, compartment: &Compartment| {
        compile_checked(doc, slot, source, text, compartment, globals)
    };

    if has_slot_placeholders(source) {
        let functions = doc
            .matching_indices
            .iter()
            .map(|set| {
                let names: Vec<String> = set
                    .iter()
                    .map(|&i| compartments[i].name().to_string())
                    .collect();
                let compartment = &compartments[set[slot]];
                let text = substitute_slots(source, &names);
                compile(&substitute_constants(&text, compartment.constants()), compartment)
            })
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(SlotPropensity {
            binding: PropensityBinding::PerIndexSet,
            by_index_set: (0..functions.len()).collect(),
            functions,
        });
    }

    if referenced_constants(source).is_empty() {
        let representative = &compartments[doc.matching_indices[0][slot]];
        let function = compile(source, representative)?;
        return Ok(SlotPropensity {
            binding: PropensityBinding::Shared,
            functions: vec![function],
            by_index_set: vec![0; doc.matching_indices.len()],
        });
    }

    let mut positions: BTreeMap<usize, usize> = BTreeMap::new();
    let mut functions = Vec::new();
    let mut by_index_set = Vec::with_capacity(doc.matching_indices.len());
    for set in &doc.matching_indices {
        let index = set[slot];
        let position = match positions.get(&index) {
            Some(&p) => p,
            None => {
                let compartment = &compartments[index];
                functions.push(compile(
                    &substitute_constants(source, compartment.constants()),
                    compartment,
                )?);
                positions.insert(index, functions.len() - 1);
                functions.len() - 1
            }
        };
        by_index_set.push(position);
    }
    Ok(SlotPropensity {
        binding: PropensityBinding::PerCompartment,
        functions,
        by_index_set,
    })
}

fn compile_checked(
    doc: &MatchedRuleDoc,
    slot: usize,
    original: &str,
    text: &str,
    compartment: &Compartment,
    globals: &[String],
) -> Result<CompiledExpr, DefinitionError> {
    if let Some(constant) = referenced_constants(text).into_iter().next() {
        return Err(DefinitionError::MissingRuleConstant {
            rule: doc.rule_name.clone(),
            slot,
            compartment: compartment.name().to_string(),
            constant,
        });
    }
    let symbols = SymbolTable::new(compartment.labels().to_vec(), globals.to_vec());
    CompiledExpr::compile(text, &symbols)
        .and_then(|compiled| compiled.probe(PROBE_VALUE, &symbols).map(|_| compiled))
        .map_err(|source| DefinitionError::InvalidPropensity {
            rule: doc.rule_name.clone(),
            slot,
            expression: original.to_string(),
            source,
        })
}
