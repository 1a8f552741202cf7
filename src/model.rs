//! Model facade: build, persist, simulate.
//!
//! A [`Model`] goes through `unbuilt -> built -> solver initialized`. Building
//! validates classes, compartments and meta-rules, matches the rules against
//! compartment types and compiles every concrete propensity once, so
//! definition errors surface before any simulation starts.

use std::collections::BTreeSet;
use std::path::Path;

use tracing::info;

use crate::class::{parse_var_name, ClassRegistry, CONSTANT_PREFIX};
use crate::compartment::CompartmentDef;
use crate::error::{DefinitionError, RbmResult, SimulationError};
use crate::geo::distance_matrix;
use crate::matching::match_rules;
use crate::persist::{Manifest, ModelDocuments};
use crate::rules::MetaRuleSet;
use crate::simulation::{
    run, RunOptions, RunSummary, SimulationSystem, Solver, SolverConfig, StepRecord, TimeUnit,
    Trajectory,
};

/// A compartmental model and, once initialized, its solver.
#[derive(Debug)]
pub struct Model {
    name: String,
    distances: bool,
    documents: Option<ModelDocuments>,
    solver: Option<Solver>,
    trajectory: Option<Trajectory>,
}

impl Model {
    /// Create an unbuilt model.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            distances: false,
            documents: None,
            solver: None,
            trajectory: None,
        }
    }

    /// Give every compartment a `comp_distance_<other>` constant holding the
    /// great-circle distance in kilometres to each other compartment.
    #[must_use]
    pub fn with_distances(mut self) -> Self {
        self.distances = true;
        self
    }

    /// Model name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether [`build`](Self::build) or [`load`](Self::load) succeeded.
    #[must_use]
    pub const fn is_built(&self) -> bool {
        self.documents.is_some()
    }

    /// Validate and compile the model.
    ///
    /// Rebuilding discards any initialized solver.
    pub fn build(
        &mut self,
        classes: &ClassRegistry,
        compartments: &[CompartmentDef],
        rules: &MetaRuleSet,
    ) -> RbmResult<()> {
        let meta_rules = rules.finalize(classes)?;

        let mut seen = BTreeSet::new();
        let mut compartment_docs = Vec::with_capacity(compartments.len());
        for def in compartments {
            if !seen.insert(def.name().to_string()) {
                return Err(DefinitionError::DuplicateCompartment {
                    name: def.name().to_string(),
                }
                .into());
            }
            compartment_docs.push(def.describe(classes)?);
        }

        if self.distances {
            let points: Vec<(f64, f64)> =
                compartments.iter().map(CompartmentDef::coordinates).collect();
            let matrix = distance_matrix(&points);
            for (i, doc) in compartment_docs.iter_mut().enumerate() {
                for (j, other) in compartments.iter().enumerate() {
                    if i != j {
                        let key =
                            format!("{CONSTANT_PREFIX}distance_{}", parse_var_name(other.name()));
                        doc.compartment_constants.insert(key, matrix[i][j]);
                    }
                }
            }
        }

        let matched_rules = match_rules(&meta_rules, &compartment_docs)?;
        let documents = ModelDocuments {
            name: self.name.clone(),
            classes: classes.to_document(),
            compartments: compartment_docs,
            meta_rules,
            matched_rules,
        };
        documents.validate()?;

        // Compile every concrete propensity now rather than at first run.
        SimulationSystem::load(&documents, RunOptions::default().start, TimeUnit::default())?;

        info!(
            model = %self.name,
            compartments = documents.compartments.len(),
            meta_rules = documents.meta_rules.len(),
            rules = documents.matched_rules.len(),
            "model built"
        );
        self.documents = Some(documents);
        self.solver = None;
        self.trajectory = None;
        Ok(())
    }

    /// Load a previously saved model from `dir`.
    pub fn load(dir: &Path) -> RbmResult<Self> {
        let documents = ModelDocuments::load(dir)?;
        SimulationSystem::load(&documents, RunOptions::default().start, TimeUnit::default())?;
        Ok(Self {
            name: documents.name.clone(),
            distances: false,
            documents: Some(documents),
            solver: None,
            trajectory: None,
        })
    }

    /// Save the built model into `dir`.
    pub fn save(&self, dir: &Path) -> RbmResult<Manifest> {
        self.documents()?.save(dir)
    }

    /// Documents of the built model.
    pub fn documents(&self) -> Result<&ModelDocuments, SimulationError> {
        self.documents.as_ref().ok_or(SimulationError::ModelNotBuilt)
    }

    /// Create and initialize a solver for the built model.
    pub fn initialize_solver(&mut self, config: SolverConfig) -> RbmResult<()> {
        let documents = self.documents()?;
        let system =
            SimulationSystem::load(documents, RunOptions::default().start, TimeUnit::default())?;
        let mut solver = Solver::new(config)?;
        solver.initialize(system);
        self.solver = Some(solver);
        self.trajectory = None;
        Ok(())
    }

    /// The initialized solver.
    pub fn solver(&self) -> Result<&Solver, SimulationError> {
        self.solver.as_ref().ok_or(SimulationError::SolverNotInitialized)
    }

    /// Mutable access to the initialized solver.
    pub fn solver_mut(&mut self) -> Result<&mut Solver, SimulationError> {
        self.solver.as_mut().ok_or(SimulationError::SolverNotInitialized)
    }

    /// Run from initial conditions under `options`.
    ///
    /// Class values, the clock and the solver cache are reset first, so
    /// repeated calls with the same seed reproduce the same trajectory.
    pub fn simulate(&mut self, options: &RunOptions) -> RbmResult<RunSummary> {
        if self.documents.is_none() {
            return Err(SimulationError::ModelNotBuilt.into());
        }
        let solver = self.solver.as_mut().ok_or(SimulationError::SolverNotInitialized)?;
        let system = solver.system_mut().ok_or(SimulationError::SolverNotInitialized)?;
        for compartment in &mut system.compartments {
            compartment.reset();
        }
        system.state.restart_at(options.start, options.time_unit);
        let mut trajectory = Trajectory::new(&system.compartments, system.state.elapsed_time());
        solver.reset();

        let summary = run(solver, options, &mut trajectory)?;
        self.trajectory = Some(trajectory);
        Ok(summary)
    }

    /// Trajectory of the most recent run.
    #[must_use]
    pub const fn trajectory(&self) -> Option<&Trajectory> {
        self.trajectory.as_ref()
    }

    /// Step diagnostics of the most recent run, when the solver is in debug mode.
    #[must_use]
    pub fn stats(&self) -> &[StepRecord] {
        self.solver.as_ref().map_or(&[][..], Solver::stats)
    }
}
