//! Save/load round trips through the directory store.

use std::fs;

use rbmsim::persist::MATCHED_RULES_FILE;
use rbmsim::{
    templates, ClassRegistry, CompartmentDef, MetaRule, MetaRuleSet, Model, PersistenceError,
    RbmError, RunOptions, SolverConfig,
};

fn build_model() -> Model {
    let mut classes = ClassRegistry::new();
    classes.add_class("S", "head").unwrap();
    classes.add_class("I", "head").unwrap();

    let farm = |name: &str, lat: f64, s: f64| {
        CompartmentDef::new(name, "farm")
            .at(lat, 4.0)
            .with_classes(["S", "I"])
            .with_constant("beta", 0.02)
            .with_initial([("S", s), ("I", 2.0)])
            .unwrap()
    };

    let mut rules = MetaRuleSet::new();
    rules.add_rule(
        MetaRule::new("infection", ["farm"])
            .with_stoichiometry(0, &[-1.0, 1.0], &["S", "I"])
            .unwrap()
            .with_propensity(0, "S*I*comp_beta", &["S", "I"])
            .unwrap(),
    );
    rules.add_rule(
        templates::transport("trade", "farm", "farm", "S", 1.0, ["S*0.05", "1"], [&["S"], &[]])
            .unwrap(),
    );

    let mut model = Model::new("two_farms").with_distances();
    model
        .build(&classes, &[farm("north", 52.0, 40.0), farm("south", 51.0, 60.0)], &rules)
        .unwrap();
    model
}

fn seeded_run(model: &mut Model) -> Vec<(f64, f64)> {
    model
        .initialize_solver(SolverConfig {
            seed: Some(99),
            ..SolverConfig::default()
        })
        .unwrap();
    model.simulate(&RunOptions::until(5.0)).unwrap();
    model.trajectory().unwrap().class_series(1, "I").unwrap()
}

#[test]
fn saved_model_loads_identical_documents() {
    let model = build_model();
    let dir = tempfile::tempdir().unwrap();
    let manifest = model.save(dir.path()).unwrap();
    assert_eq!(manifest.model_name, "two_farms");
    assert_eq!(manifest.digests.len(), 4);

    let loaded = Model::load(dir.path()).unwrap();
    assert_eq!(loaded.name(), "two_farms");
    assert_eq!(loaded.documents().unwrap(), model.documents().unwrap());
}

#[test]
fn loaded_model_reproduces_seeded_runs() {
    let mut model = build_model();
    let dir = tempfile::tempdir().unwrap();
    model.save(dir.path()).unwrap();
    let mut loaded = Model::load(dir.path()).unwrap();

    let original = seeded_run(&mut model);
    let reloaded = seeded_run(&mut loaded);
    assert!(original.len() > 1);
    assert_eq!(original, reloaded);
}

#[test]
fn tampered_document_is_rejected() {
    let model = build_model();
    let dir = tempfile::tempdir().unwrap();
    model.save(dir.path()).unwrap();

    let path = dir.path().join(MATCHED_RULES_FILE);
    let text = fs::read_to_string(&path).unwrap();
    fs::write(&path, text.replace("0.05", "0.5")).unwrap();

    let err = Model::load(dir.path()).unwrap_err();
    assert!(err.is_persistence());
    assert!(matches!(
        err,
        RbmError::Persistence(PersistenceError::ChecksumMismatch { .. })
    ));
}

#[test]
fn missing_directory_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Model::load(&dir.path().join("absent")).unwrap_err();
    assert!(err.is_persistence());
}
