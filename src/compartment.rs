//! Compartments: typed locations holding a subset of the model's classes.
//!
//! [`CompartmentDef`] is the build-side description a user fills in.
//! [`Compartment`] is the runtime container the solver mutates; its class
//! values are laid out in the sorted label order fixed at build time.

use std::collections::{BTreeMap, BTreeSet};

use crate::class::{is_identifier, parse_var_name, ClassRegistry, CONSTANT_PREFIX};
use crate::error::{DefinitionError, PersistenceError};
use crate::persist::CompartmentDoc;

fn constant_name(name: &str) -> String {
    let name = parse_var_name(name);
    if name.starts_with(CONSTANT_PREFIX) {
        name
    } else {
        format!("{CONSTANT_PREFIX}{name}")
    }
}

/// Build-side compartment description.
#[derive(Debug, Clone, PartialEq)]
pub struct CompartmentDef {
    name: String,
    comp_type: String,
    lat: f64,
    long: f64,
    classes: BTreeSet<String>,
    initial_conditions: BTreeMap<String, f64>,
    constants: BTreeMap<String, Option<f64>>,
}

impl CompartmentDef {
    /// Create a compartment of the given type.
    #[must_use]
    pub fn new(name: &str, comp_type: &str) -> Self {
        Self {
            name: parse_var_name(name),
            comp_type: comp_type.to_string(),
            lat: 0.0,
            long: 0.0,
            classes: BTreeSet::new(),
            initial_conditions: BTreeMap::new(),
            constants: BTreeMap::new(),
        }
    }

    /// Set the coordinates used for distance computations.
    #[must_use]
    pub fn at(mut self, lat: f64, long: f64) -> Self {
        self.lat = lat;
        self.long = long;
        self
    }

    /// Declare the classes this compartment holds.
    #[must_use]
    pub fn with_classes<I, S>(mut self, classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.classes
            .extend(classes.into_iter().map(|c| parse_var_name(c.as_ref())));
        self
    }

    /// Declare constants without values; each must be set before build.
    #[must_use]
    pub fn declare_constants<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            self.constants.entry(constant_name(name.as_ref())).or_insert(None);
        }
        self
    }

    /// Declare and set a constant in one step.
    #[must_use]
    pub fn with_constant(mut self, name: &str, value: f64) -> Self {
        self.constants.insert(constant_name(name), Some(value));
        self
    }

    /// Set previously declared constants.
    pub fn set_constants<'a, I>(&mut self, values: I) -> Result<(), DefinitionError>
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        for (name, value) in values {
            let key = constant_name(name);
            match self.constants.get_mut(&key) {
                Some(slot) => *slot = Some(value),
                None => {
                    return Err(DefinitionError::UndeclaredConstant {
                        compartment: self.name.clone(),
                        constant: key,
                    })
                }
            }
        }
        Ok(())
    }

    /// Set initial values; classes not listed start at zero.
    pub fn set_initial_conditions<'a, I>(&mut self, values: I) -> Result<(), DefinitionError>
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        for (class, value) in values {
            let class = parse_var_name(class);
            if !self.classes.contains(&class) {
                return Err(DefinitionError::UnknownInitialClass {
                    compartment: self.name.clone(),
                    class,
                });
            }
            self.initial_conditions.insert(class, value);
        }
        Ok(())
    }

    /// Builder form of [`Self::set_initial_conditions`].
    pub fn with_initial<'a, I>(mut self, values: I) -> Result<Self, DefinitionError>
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        self.set_initial_conditions(values)?;
        Ok(self)
    }

    /// Compartment name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Compartment type tag.
    #[must_use]
    pub fn comp_type(&self) -> &str {
        &self.comp_type
    }

    /// Coordinates as `(lat, long)`.
    #[must_use]
    pub fn coordinates(&self) -> (f64, f64) {
        (self.lat, self.long)
    }

    /// Check the definition against the registry and produce its document.
    pub fn describe(&self, classes: &ClassRegistry) -> Result<CompartmentDoc, DefinitionError> {
        // Names become `comp_distance_<name>` constants.
        if !is_identifier(&self.name) {
            return Err(DefinitionError::InvalidName {
                kind: "compartment",
                name: self.name.clone(),
            });
        }
        for class in &self.classes {
            if !classes.contains(class) {
                return Err(DefinitionError::UndefinedCompartmentClass {
                    compartment: self.name.clone(),
                    class: class.clone(),
                });
            }
        }

        let mut constants = BTreeMap::new();
        for (name, value) in &self.constants {
            let value = value.ok_or_else(|| DefinitionError::UnsetConstant {
                compartment: self.name.clone(),
                constant: name.clone(),
            })?;
            constants.insert(name.clone(), value);
        }

        let labels: Vec<&String> = self.classes.iter().collect();
        Ok(CompartmentDoc {
            compartment_name: self.name.clone(),
            lat: self.lat,
            long: self.long,
            comp_type: self.comp_type.clone(),
            label_mapping: labels
                .iter()
                .enumerate()
                .map(|(i, label)| (i.to_string(), (*label).clone()))
                .collect(),
            initial_values: labels
                .iter()
                .map(|label| self.initial_conditions.get(*label).copied().unwrap_or(0.0))
                .collect(),
            compartment_constants: constants,
        })
    }
}

/// Runtime compartment.
#[derive(Debug, Clone, PartialEq)]
pub struct Compartment {
    index: usize,
    name: String,
    comp_type: String,
    lat: f64,
    long: f64,
    labels: Vec<String>,
    initial_values: Vec<f64>,
    values: Vec<f64>,
    constants: BTreeMap<String, f64>,
}

impl Compartment {
    /// Rebuild a runtime compartment from its document.
    pub fn from_doc(index: usize, doc: &CompartmentDoc) -> Result<Self, PersistenceError> {
        let labels = crate::persist::dense(&doc.label_mapping, "label_mapping")?;
        if labels.len() != doc.initial_values.len() {
            return Err(PersistenceError::Malformed {
                document: format!("compartment '{}'", doc.compartment_name),
                reason: format!(
                    "{} labels but {} initial values",
                    labels.len(),
                    doc.initial_values.len()
                ),
            });
        }
        Ok(Self {
            index,
            name: doc.compartment_name.clone(),
            comp_type: doc.comp_type.clone(),
            lat: doc.lat,
            long: doc.long,
            labels,
            initial_values: doc.initial_values.clone(),
            values: doc.initial_values.clone(),
            constants: doc.compartment_constants.clone(),
        })
    }

    /// Dense index within the model.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Compartment name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Compartment type tag.
    #[must_use]
    pub fn comp_type(&self) -> &str {
        &self.comp_type
    }

    /// Coordinates as `(lat, long)`.
    #[must_use]
    pub const fn coordinates(&self) -> (f64, f64) {
        (self.lat, self.long)
    }

    /// Class names in layout order.
    #[must_use]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Position of a class in the layout.
    #[must_use]
    pub fn class_index(&self, class: &str) -> Option<usize> {
        self.labels.iter().position(|label| label == class)
    }

    /// Current class values in layout order.
    #[must_use]
    pub fn class_values(&self) -> &[f64] {
        &self.values
    }

    /// Current value of a class.
    #[must_use]
    pub fn value(&self, class: &str) -> Option<f64> {
        self.class_index(class).map(|i| self.values[i])
    }

    /// Initial class values in layout order.
    #[must_use]
    pub fn initial_values(&self) -> &[f64] {
        &self.initial_values
    }

    /// Compartment constants, keyed by prefixed name.
    #[must_use]
    pub const fn constants(&self) -> &BTreeMap<String, f64> {
        &self.constants
    }

    /// Add `times * delta` to the class values.
    pub(crate) fn apply_delta(&mut self, delta: &[f64], times: f64) {
        for (value, d) in self.values.iter_mut().zip(delta) {
            *value += times * d;
        }
    }

    /// Restore initial values.
    pub fn reset(&mut self) {
        self.values.clone_from(&self.initial_values);
    }

    /// Document form carrying the initial values.
    #[must_use]
    pub fn to_doc(&self) -> CompartmentDoc {
        CompartmentDoc {
            compartment_name: self.name.clone(),
            lat: self.lat,
            long: self.long,
            comp_type: self.comp_type.clone(),
            label_mapping: self
                .labels
                .iter()
                .enumerate()
                .map(|(i, label)| (i.to_string(), label.clone()))
                .collect(),
            initial_values: self.initial_values.clone(),
            compartment_constants: self.constants.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ClassRegistry {
        let mut classes = ClassRegistry::new();
        classes.add_class("S", "people").unwrap();
        classes.add_class("I", "people").unwrap();
        classes.add_class("R", "people").unwrap();
        classes
    }

    #[test]
    fn describe_sorts_labels_and_fills_zeros() {
        let def = CompartmentDef::new("Town A", "town")
            .with_classes(["S", "R", "I"])
            .with_constant("beta", 0.3)
            .with_initial([("S", 99.0), ("I", 1.0)])
            .unwrap();
        let doc = def.describe(&registry()).unwrap();
        assert_eq!(doc.compartment_name, "Town_A");
        assert_eq!(doc.label_mapping["0"], "I");
        assert_eq!(doc.label_mapping["1"], "R");
        assert_eq!(doc.label_mapping["2"], "S");
        assert_eq!(doc.initial_values, vec![1.0, 0.0, 99.0]);
        assert_eq!(doc.compartment_constants["comp_beta"], 0.3);
    }

    #[test]
    fn compartment_names_must_be_identifiers() {
        let def = CompartmentDef::new("farm-1", "farm").with_classes(["S"]);
        assert!(matches!(
            def.describe(&registry()),
            Err(DefinitionError::InvalidName { kind: "compartment", .. })
        ));
        let def = CompartmentDef::new(" farm 1 ", "farm").with_classes(["S"]);
        assert_eq!(def.describe(&registry()).unwrap().compartment_name, "farm_1");
    }

    #[test]
    fn unset_constant_fails_describe() {
        let def = CompartmentDef::new("A", "town")
            .with_classes(["S"])
            .declare_constants(["beta"]);
        assert!(matches!(
            def.describe(&registry()),
            Err(DefinitionError::UnsetConstant { constant, .. }) if constant == "comp_beta"
        ));
    }

    #[test]
    fn undeclared_constant_cannot_be_set() {
        let mut def = CompartmentDef::new("A", "town").declare_constants(["beta"]);
        assert!(def.set_constants([("beta", 1.0)]).is_ok());
        assert!(matches!(
            def.set_constants([("gamma", 1.0)]),
            Err(DefinitionError::UndeclaredConstant { .. })
        ));
    }

    #[test]
    fn undefined_class_fails_describe() {
        let def = CompartmentDef::new("A", "town").with_classes(["E"]);
        assert!(matches!(
            def.describe(&registry()),
            Err(DefinitionError::UndefinedCompartmentClass { .. })
        ));
    }

    #[test]
    fn initial_condition_for_missing_class_is_rejected() {
        let result = CompartmentDef::new("A", "town")
            .with_classes(["S"])
            .with_initial([("I", 1.0)]);
        assert!(result.is_err());
    }

    #[test]
    fn runtime_reset_restores_initial_values() {
        let doc = CompartmentDef::new("A", "town")
            .with_classes(["S", "I"])
            .with_initial([("S", 10.0)])
            .unwrap()
            .describe(&registry())
            .unwrap();
        let mut compartment = Compartment::from_doc(0, &doc).unwrap();
        compartment.apply_delta(&[1.0, -1.0], 3.0);
        assert_eq!(compartment.value("S"), Some(7.0));
        assert_eq!(compartment.value("I"), Some(3.0));
        compartment.reset();
        assert_eq!(compartment.class_values(), &[0.0, 10.0]);
        assert_eq!(compartment.to_doc(), doc);
    }
}
