//! End-to-end scenarios driven through the public model API.

use chrono::NaiveDate;

use rbmsim::{
    Algorithm, ClassRegistry, CompartmentDef, MetaRule, MetaRuleSet, Model, NegativeDrawPolicy,
    NoRulePolicy, RunOptions, SolverConfig, Termination, TimeUnit, Trajectory,
};
use rbmsim::simulation::{run, PropensityBinding};

fn registry(names: &[&str]) -> ClassRegistry {
    let mut classes = ClassRegistry::new();
    for name in names {
        classes.add_class(name, "head").unwrap();
    }
    classes
}

fn one_slot_rule(
    name: &str,
    classes: &[&str],
    delta: &[f64],
    propensity: &str,
    reads: &[&str],
) -> MetaRuleSet {
    let mut rules = MetaRuleSet::new();
    rules.add_rule(
        MetaRule::new(name, ["farm"])
            .with_stoichiometry(0, delta, classes)
            .unwrap()
            .with_propensity(0, propensity, reads)
            .unwrap(),
    );
    rules
}

fn seeded(algorithm: Algorithm) -> SolverConfig {
    SolverConfig {
        algorithm,
        seed: Some(2024),
        debug: true,
        ..SolverConfig::default()
    }
}

#[test]
fn sir_transfer_fires_once() {
    let mut model = Model::new("sir");
    let farm = CompartmentDef::new("farm_1", "farm")
        .with_classes(["S", "I"])
        .with_initial([("S", 99.0), ("I", 1.0)])
        .unwrap();
    model
        .build(
            &registry(&["S", "I"]),
            &[farm],
            &one_slot_rule("infection", &["S", "I"], &[-1.0, 1.0], "S*I*0.01", &["S", "I"]),
        )
        .unwrap();
    model.initialize_solver(seeded(Algorithm::Direct)).unwrap();

    let solver = model.solver_mut().unwrap();
    let next = solver.simulate_one_step(0.0).unwrap().unwrap();
    assert!(next > 0.0 && next.is_finite());

    let farm = solver.system().unwrap().compartment("farm_1").unwrap();
    assert_eq!(farm.value("S"), Some(98.0));
    assert_eq!(farm.value("I"), Some(2.0));
}

#[test]
fn continued_run_starts_from_the_current_state() {
    let mut model = Model::new("sir");
    let farm = CompartmentDef::new("farm_1", "farm")
        .with_classes(["S", "I"])
        .with_initial([("S", 99.0), ("I", 1.0)])
        .unwrap();
    model
        .build(
            &registry(&["S", "I"]),
            &[farm],
            &one_slot_rule("infection", &["S", "I"], &[-1.0, 1.0], "S*I*0.5", &["S", "I"]),
        )
        .unwrap();
    model.initialize_solver(seeded(Algorithm::Direct)).unwrap();
    model.simulate(&RunOptions::until(0.5)).unwrap();

    let solver = model.solver_mut().unwrap();
    let system = solver.system().unwrap();
    let now = system.state.elapsed_time();
    let values = system.compartments[0].class_values().to_vec();
    assert!(now >= 0.5);
    assert_ne!(values, system.compartments[0].initial_values());

    let mut trajectory = Trajectory::new(&system.compartments, now);
    let summary = run(solver, &RunOptions::until(1.0), &mut trajectory).unwrap();
    assert!(summary.elapsed_time >= 1.0);

    let (times, rows) = trajectory.series(0).unwrap();
    assert_eq!(times[0], now);
    assert_eq!(rows[0], values);
    assert!(times.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn zero_propensity_with_end_policy_stops_immediately() {
    let mut model = Model::new("idle");
    let farm = CompartmentDef::new("farm_1", "farm")
        .with_classes(["S"])
        .with_initial([("S", 5.0)])
        .unwrap();
    model
        .build(&registry(&["S"]), &[farm], &one_slot_rule("never", &["S"], &[-1.0], "0", &[]))
        .unwrap();
    model
        .initialize_solver(SolverConfig {
            no_rule_policy: NoRulePolicy::End,
            ..seeded(Algorithm::Direct)
        })
        .unwrap();

    assert_eq!(model.solver_mut().unwrap().simulate_one_step(0.0).unwrap(), None);

    let summary = model.simulate(&RunOptions::until(10.0)).unwrap();
    assert_eq!(summary.iterations, 0);
    assert_eq!(summary.termination, Termination::NoRule);
    assert_eq!(model.trajectory().unwrap().len(0), 1);
}

#[test]
fn zero_propensity_with_step_policy_advances_the_clock() {
    let mut model = Model::new("idle");
    let farm = CompartmentDef::new("farm_1", "farm")
        .with_classes(["S"])
        .with_initial([("S", 5.0)])
        .unwrap();
    model
        .build(&registry(&["S"]), &[farm], &one_slot_rule("never", &["S"], &[-1.0], "0", &[]))
        .unwrap();
    model
        .initialize_solver(SolverConfig {
            no_rule_policy: NoRulePolicy::Step,
            default_step: 1.0,
            ..seeded(Algorithm::Direct)
        })
        .unwrap();

    let solver = model.solver_mut().unwrap();
    assert_eq!(solver.simulate_one_step(0.0).unwrap(), Some(1.0));
    assert_eq!(solver.system().unwrap().compartments[0].value("S"), Some(5.0));

    let summary = model.simulate(&RunOptions::until(3.0)).unwrap();
    assert_eq!(summary.iterations, 3);
    assert_eq!(summary.elapsed_time, 3.0);
    assert_eq!(
        model.trajectory().unwrap().class_series(0, "S").unwrap(),
        vec![(0.0, 5.0), (1.0, 5.0), (2.0, 5.0), (3.0, 5.0)]
    );
}

#[test]
fn compartment_constants_bind_per_compartment() {
    let farm = |name: &str, rate: f64| {
        CompartmentDef::new(name, "farm")
            .with_classes(["S"])
            .with_constant("rate", rate)
            .with_initial([("S", 10.0)])
            .unwrap()
    };
    let mut model = Model::new("rates");
    model
        .build(
            &registry(&["S"]),
            &[farm("a", 0.5), farm("b", 2.0)],
            &one_slot_rule("cull", &["S"], &[-1.0], "S*comp_rate", &["S"]),
        )
        .unwrap();

    let docs = model.documents().unwrap();
    assert_eq!(docs.matched_rules.len(), 1);
    assert_eq!(docs.matched_rules[0].matching_indices, vec![vec![0], vec![1]]);
    // The persisted expression keeps the symbolic constant.
    assert_eq!(docs.matched_rules[0].propensity, vec!["S*comp_rate".to_string()]);

    model.initialize_solver(seeded(Algorithm::Direct)).unwrap();
    let solver = model.solver_mut().unwrap();
    let rule = &solver.system().unwrap().rules[0];
    assert_eq!(rule.binding(0), PropensityBinding::PerCompartment);
    assert_ne!(rule.slot_function(0, 0).source(), rule.slot_function(0, 1).source());

    solver.sync_propensities().unwrap();
    assert_eq!(solver.propensity_snapshot(), &[vec![5.0, 20.0]]);

    let next = solver.simulate_one_step(0.0).unwrap().unwrap();
    solver.advance(Some(next)).unwrap();
    solver.sync_propensities().unwrap();

    let fired = solver.stats()[0].rule_index_set.unwrap();
    let snapshot = solver.propensity_snapshot()[0].clone();
    if fired == 0 {
        assert_eq!(snapshot, vec![4.5, 20.0]);
    } else {
        assert_eq!(snapshot, vec![5.0, 18.0]);
    }
}

#[test]
fn month_rollover_refreshes_calendar_readers() {
    let farm = CompartmentDef::new("farm_1", "farm")
        .with_classes(["N"])
        .with_initial([("N", 0.0)])
        .unwrap();
    let mut model = Model::new("seasonal");
    model
        .build(
            &registry(&["N"]),
            &[farm],
            &one_slot_rule("births", &["N"], &[1.0], "model_month_feb*1000", &[]),
        )
        .unwrap();
    model.initialize_solver(seeded(Algorithm::Direct)).unwrap();

    let start = NaiveDate::from_ymd_opt(2021, 1, 31)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let solver = model.solver_mut().unwrap();
    solver
        .system_mut()
        .unwrap()
        .state
        .restart_at(start, TimeUnit::Days);
    solver.reset();

    // January: nothing can fire, the clock steps into February.
    assert_eq!(solver.simulate_one_step(0.0).unwrap(), Some(1.0));
    solver.advance(Some(1.0)).unwrap();
    let state = &solver.system().unwrap().state;
    assert!(state.changed_vars().contains(&"model_month_feb".to_string()));

    let next = solver.simulate_one_step(1.0).unwrap().unwrap();
    assert!(next > 1.0);
    assert_eq!(solver.system().unwrap().compartments[0].value("N"), Some(1.0));
    assert_eq!(solver.cached_total(), 1000.0);
}

fn drain_model(policy: NegativeDrawPolicy) -> Model {
    let farm = CompartmentDef::new("farm_1", "farm")
        .with_classes(["A"])
        .with_initial([("A", 5.0)])
        .unwrap();
    let mut model = Model::new("drain");
    model
        .build(
            &registry(&["A"]),
            &[farm],
            &one_slot_rule("drain", &["A"], &[-10.0], "A", &["A"]),
        )
        .unwrap();
    model
        .initialize_solver(seeded(Algorithm::TauLeap {
            step: 0.2,
            negative_draws: policy,
        }))
        .unwrap();
    model
}

#[test]
fn tau_leap_redraw_never_applies_negative_draws() {
    let mut model = drain_model(NegativeDrawPolicy::Redraw { max_attempts: 100 });
    model.simulate(&RunOptions::until(10.0)).unwrap();

    let trajectory = model.trajectory().unwrap();
    for (_, a) in trajectory.class_series(0, "A").unwrap() {
        assert_eq!(a, 5.0);
    }
    assert!(model.stats().iter().all(|s| s.leap_counts.is_empty()));
}

#[test]
fn tau_leap_ignore_applies_the_excursion_once() {
    let mut model = drain_model(NegativeDrawPolicy::Ignore);
    model.simulate(&RunOptions::until(10.0)).unwrap();

    let leaps: Vec<u64> = model
        .stats()
        .iter()
        .flat_map(|s| s.leap_counts.iter().map(|&(_, k)| k))
        .collect();
    assert_eq!(leaps.len(), 1, "expected a single applied leap, got {leaps:?}");
    let k = leaps[0];
    assert!(k >= 1);

    #[allow(clippy::cast_precision_loss)]
    let expected = 5.0 - 10.0 * k as f64;
    let last = model.trajectory().unwrap().last_values(0).unwrap()[0];
    assert_eq!(last, expected);
    assert!(last <= -5.0);
}
