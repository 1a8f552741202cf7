//! # rbmsim - Rule-Based Stochastic Compartmental Simulation
//!
//! rbmsim simulates populations spread over typed compartments (farms,
//! markets, regions) whose numeric state variables change through stochastic
//! rules. Rules are written once as templates over compartment types and
//! expanded over every matching combination of compartments.
//!
//! ## Core Concepts
//!
//! - **Class**: a named numeric state variable, e.g. `Susceptible`
//! - **Compartment**: a typed container holding a subset of the classes and
//!   its own constants (`comp_*`)
//! - **Meta-rule**: a reaction template with one slot per target compartment,
//!   a stoichiometry and a propensity expression per slot
//! - **Concrete rule**: a meta-rule matched to a type signature, with the
//!   index sets of compartments that fill its slots
//! - **Solver**: selects and applies events (Gillespie direct, first
//!   reaction, next reaction, two-level or tau-leaping)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rbmsim::{ClassRegistry, CompartmentDef, MetaRule, MetaRuleSet, Model, RunOptions, SolverConfig};
//!
//! let mut classes = ClassRegistry::new();
//! classes.add_class("S", "head")?.add_class("I", "head")?;
//!
//! let farm = CompartmentDef::new("farm_1", "farm")
//!     .with_classes(["S", "I"])
//!     .with_initial([("S", 99.0), ("I", 1.0)])?;
//!
//! let mut rules = MetaRuleSet::new();
//! rules.add_rule(
//!     MetaRule::new("infection", ["farm"])
//!         .with_stoichiometry(0, &[-1.0, 1.0], &["S", "I"])?
//!         .with_propensity(0, "S*I*0.01", &["S", "I"])?,
//! );
//!
//! let mut model = Model::new("sir");
//! model.build(&classes, &[farm], &rules)?;
//! model.initialize_solver(SolverConfig::default())?;
//! let summary = model.simulate(&RunOptions::until(30.0))?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Definitions
pub mod class;
pub mod compartment;
pub mod error;
pub mod expr;
pub mod geo;
pub mod rules;

// Build and persistence
pub mod matching;
pub mod model;
pub mod persist;

// Runtime
pub mod simulation;

pub use class::{BuiltinClass, ClassDef, ClassRegistry, ClassRestriction};
pub use compartment::{Compartment, CompartmentDef};
pub use error::{
    DefinitionError, ExpressionError, PersistenceError, RbmError, RbmResult, SimulationError,
};
pub use matching::TypeRequirement;
pub use model::Model;
pub use persist::ModelDocuments;
pub use rules::{templates, MetaRule, MetaRuleSet};
pub use simulation::{
    Algorithm, NegativeDrawPolicy, NoRulePolicy, RunOptions, RunSummary, SimulationSystem,
    Solver, SolverConfig, StepRecord, Termination, TimeUnit, Trajectory,
};
