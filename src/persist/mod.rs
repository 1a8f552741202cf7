//! Persistence of built models.
//!
//! A built model is fully described by [`ModelDocuments`]: classes,
//! compartments, validated meta-rules and matched concrete rules. Documents
//! are validated once here, at the boundary, so the simulation layer can
//! index into them without further checks.

mod documents;
mod store;

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::class::{ClassDef, ClassRegistry};
use crate::error::{PersistenceError, RbmError, RbmResult};

pub use documents::{dense, keyed, CompartmentDoc, MatchedRuleDoc, MetaRuleDoc};
pub use store::{
    DocumentReader, DocumentWriter, Manifest, CLASSES_FILE, COMPARTMENTS_FILE, FORMAT_VERSION,
    MANIFEST_FILE, MATCHED_RULES_FILE, META_RULES_FILE,
};

/// Everything needed to rebuild a model for simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDocuments {
    /// Model name.
    pub name: String,
    /// All classes, including enabled built-ins.
    pub classes: BTreeMap<String, ClassDef>,
    /// Compartments in index order.
    pub compartments: Vec<CompartmentDoc>,
    /// Validated meta-rules in definition order.
    pub meta_rules: Vec<MetaRuleDoc>,
    /// Concrete rules in compilation order.
    pub matched_rules: Vec<MatchedRuleDoc>,
}

impl ModelDocuments {
    /// Class registry described by the class document.
    pub fn class_registry(&self) -> RbmResult<ClassRegistry> {
        Ok(ClassRegistry::from_document(&self.classes)?)
    }

    /// Check structural consistency between documents.
    pub fn validate(&self) -> Result<(), PersistenceError> {
        let malformed = |document: &str, reason: String| PersistenceError::Malformed {
            document: document.to_string(),
            reason,
        };

        let mut label_counts = Vec::with_capacity(self.compartments.len());
        for doc in &self.compartments {
            let labels = dense(&doc.label_mapping, COMPARTMENTS_FILE)?;
            if labels.len() != doc.initial_values.len() {
                return Err(malformed(
                    COMPARTMENTS_FILE,
                    format!(
                        "compartment '{}' has {} labels but {} initial values",
                        doc.compartment_name,
                        labels.len(),
                        doc.initial_values.len()
                    ),
                ));
            }
            label_counts.push(labels.len());
        }

        for rule in &self.matched_rules {
            let slots = rule.stoichiometry.len();
            if rule.propensity.len() != slots {
                return Err(malformed(
                    MATCHED_RULES_FILE,
                    format!(
                        "rule '{}' has {slots} stoichiometries but {} propensities",
                        rule.rule_name,
                        rule.propensity.len()
                    ),
                ));
            }
            if rule.matching_indices.is_empty() {
                return Err(malformed(
                    MATCHED_RULES_FILE,
                    format!("rule '{}' has no index sets", rule.rule_name),
                ));
            }
            for set in &rule.matching_indices {
                if set.len() != slots {
                    return Err(malformed(
                        MATCHED_RULES_FILE,
                        format!(
                            "rule '{}' index set {set:?} does not have {slots} slots",
                            rule.rule_name
                        ),
                    ));
                }
                for (slot, &index) in set.iter().enumerate() {
                    let Some(&labels) = label_counts.get(index) else {
                        return Err(malformed(
                            MATCHED_RULES_FILE,
                            format!(
                                "rule '{}' refers to compartment {index}, but only {} exist",
                                rule.rule_name,
                                label_counts.len()
                            ),
                        ));
                    };
                    if rule.stoichiometry[slot].len() != labels {
                        return Err(malformed(
                            MATCHED_RULES_FILE,
                            format!(
                                "rule '{}' slot {slot} stoichiometry has {} entries, compartment {index} has {labels} classes",
                                rule.rule_name,
                                rule.stoichiometry[slot].len()
                            ),
                        ));
                    }
                }
                let mut seen = set.clone();
                seen.sort_unstable();
                seen.dedup();
                if seen.len() != set.len() {
                    return Err(malformed(
                        MATCHED_RULES_FILE,
                        format!(
                            "rule '{}' index set {set:?} repeats a compartment",
                            rule.rule_name
                        ),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Save into `dir`, returning the written manifest.
    pub fn save(&self, dir: &Path) -> RbmResult<Manifest> {
        let mut writer = DocumentWriter::create(dir)?;
        writer.write(CLASSES_FILE, &self.classes)?;
        writer.write(COMPARTMENTS_FILE, &keyed(&self.compartments))?;
        writer.write(META_RULES_FILE, &keyed(&self.meta_rules))?;
        writer.write(MATCHED_RULES_FILE, &keyed(&self.matched_rules))?;
        let manifest = writer.finish(&self.name)?;
        info!(
            model = %self.name,
            dir = %dir.display(),
            compartments = self.compartments.len(),
            rules = self.matched_rules.len(),
            "model saved"
        );
        Ok(manifest)
    }

    /// Load from `dir` and validate.
    ///
    /// `MetaRules.json` is optional; a directory holding only matched rules
    /// can still be simulated.
    pub fn load(dir: &Path) -> RbmResult<Self> {
        let reader = DocumentReader::open(dir)?;
        let name = reader
            .manifest()
            .map(|m| m.model_name.clone())
            .or_else(|| {
                dir.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
            })
            .unwrap_or_default();

        let classes: BTreeMap<String, ClassDef> = reader.read(CLASSES_FILE)?;
        let compartments: BTreeMap<String, CompartmentDoc> = reader.read(COMPARTMENTS_FILE)?;
        let meta_rules: BTreeMap<String, MetaRuleDoc> = if reader.contains(META_RULES_FILE) {
            reader.read(META_RULES_FILE)?
        } else {
            BTreeMap::new()
        };
        let matched_rules: BTreeMap<String, MatchedRuleDoc> = reader.read(MATCHED_RULES_FILE)?;

        let docs = Self {
            name,
            classes,
            compartments: dense(&compartments, COMPARTMENTS_FILE)?,
            meta_rules: dense(&meta_rules, META_RULES_FILE)?,
            matched_rules: dense(&matched_rules, MATCHED_RULES_FILE)?,
        };
        docs.validate()?;
        ClassRegistry::from_document(&docs.classes).map_err(RbmError::from)?;
        info!(model = %docs.name, dir = %dir.display(), "model loaded");
        Ok(docs)
    }

    /// Serialize all documents into one pretty JSON string.
    pub fn to_json_pretty(&self) -> RbmResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| RbmError::internal(format!("serialize model documents: {e}")))
    }

    /// Deserialize and validate from a JSON string.
    pub fn from_json(s: &str) -> RbmResult<Self> {
        let docs = serde_json::from_str::<Self>(s)
            .map_err(|e| RbmError::internal(format!("deserialize model documents: {e}")))?;
        docs.validate()?;
        Ok(docs)
    }
}
