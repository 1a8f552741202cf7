//! Builders for common rule shapes.

use crate::error::DefinitionError;
use crate::matching::TypeRequirement;

use super::meta::MetaRule;

/// A rule acting on a single compartment.
pub fn single_compartment(
    name: &str,
    target: impl Into<TypeRequirement>,
    propensity: &str,
    propensity_classes: &[&str],
    stoichiometry: &[f64],
    stoichiometry_classes: &[&str],
) -> Result<MetaRule, DefinitionError> {
    MetaRule::new(name, [target.into()])
        .with_stoichiometry(0, stoichiometry, stoichiometry_classes)?
        .with_propensity(0, propensity, propensity_classes)
}

/// A single-compartment rule consuming reactants and yielding products.
///
/// Each pair is `(class, amount)`; reactant amounts are subtracted.
pub fn production(
    name: &str,
    target: impl Into<TypeRequirement>,
    reactants: &[(&str, f64)],
    products: &[(&str, f64)],
    propensity: &str,
    propensity_classes: &[&str],
) -> Result<MetaRule, DefinitionError> {
    let (values, classes): (Vec<f64>, Vec<&str>) = reactants
        .iter()
        .map(|&(class, amount)| (-amount, class))
        .chain(products.iter().map(|&(class, amount)| (amount, class)))
        .unzip();
    single_compartment(name, target, propensity, propensity_classes, &values, &classes)
}

/// Moves `amount` of `class` from a source compartment to a target.
///
/// `propensities` holds the source then target factor; the event propensity
/// is their product.
pub fn transport(
    name: &str,
    source: impl Into<TypeRequirement>,
    target: impl Into<TypeRequirement>,
    class: &str,
    amount: f64,
    propensities: [&str; 2],
    propensity_classes: [&[&str]; 2],
) -> Result<MetaRule, DefinitionError> {
    MetaRule::new(name, [source.into(), target.into()])
        .with_stoichiometry(0, &[-amount], &[class])?
        .with_stoichiometry(1, &[amount], &[class])?
        .with_propensity(0, propensities[0], propensity_classes[0])?
        .with_propensity(1, propensities[1], propensity_classes[1])
}

/// Adds (positive `amount`) or removes (negative) `class` at one compartment.
pub fn exit_entrance(
    name: &str,
    target: impl Into<TypeRequirement>,
    class: &str,
    amount: f64,
    propensity: &str,
    propensity_classes: &[&str],
) -> Result<MetaRule, DefinitionError> {
    single_compartment(name, target, propensity, propensity_classes, &[amount], &[class])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::ClassRegistry;

    fn registry() -> ClassRegistry {
        let mut classes = ClassRegistry::new();
        for name in ["Grass", "Cows", "Milk"] {
            classes.add_class(name, "units").unwrap();
        }
        classes
    }

    #[test]
    fn production_negates_reactants() {
        let rule = production(
            "milking",
            "farm",
            &[("Grass", 2.0)],
            &[("Milk", 1.0)],
            "0.1*Cows*Grass",
            &["Cows", "Grass"],
        )
        .unwrap();
        let doc = rule.finalize(&registry()).unwrap();
        assert_eq!(doc.required_classes[0], vec!["Cows", "Grass", "Milk"]);
        assert_eq!(doc.stoichiometry[0], vec![0.0, -2.0, 1.0]);
    }

    #[test]
    fn transport_has_two_slots() {
        let rule = transport(
            "cow movement",
            "farm",
            "farm",
            "Cows",
            1.0,
            ["0.01*Cows", "1"],
            [&["Cows"], &[]],
        )
        .unwrap();
        assert_eq!(rule.slot_count(), 2);
        let doc = rule.finalize(&registry()).unwrap();
        assert_eq!(doc.stoichiometry, vec![vec![-1.0], vec![1.0]]);
    }

    #[test]
    fn exit_entrance_uses_signed_amount() {
        let rule = exit_entrance("sale", "any", "Cows", -1.0, "Cows", &["Cows"]).unwrap();
        let doc = rule.finalize(&registry()).unwrap();
        assert_eq!(doc.stoichiometry, vec![vec![-1.0]]);
        assert_eq!(doc.target_types, vec![TypeRequirement::Any]);
    }
}
