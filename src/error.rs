//! Error types for rbmsim.
//!
//! All errors are strongly typed using thiserror. Definition errors are raised
//! while a model is built or loaded and are always fatal; simulation errors are
//! raised by the solver at runtime; persistence errors cover the JSON boundary.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while parsing, compiling or probing a propensity expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpressionError {
    #[error("Unexpected character '{ch}' at position {position}")]
    UnexpectedCharacter { ch: char, position: usize },

    #[error("Malformed number '{text}' at position {position}")]
    MalformedNumber { text: String, position: usize },

    #[error("Unexpected token '{found}' at position {position}")]
    UnexpectedToken { found: String, position: usize },

    #[error("Unexpected end of expression")]
    UnexpectedEnd,

    #[error("Unknown symbol '{name}'")]
    UnknownSymbol { name: String },

    #[error("Unknown function '{name}'")]
    UnknownFunction { name: String },

    #[error("Function '{name}' takes {expected} argument(s), got {found}")]
    Arity {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("Probe evaluation produced {value}, expected a finite non-negative number")]
    InvalidProbe { value: f64 },
}

/// Which part of a rule slot a definition error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotPart {
    /// The linear stoichiometry of the slot.
    Stoichiometry,
    /// The propensity expression of the slot.
    Propensity,
}

impl std::fmt::Display for SlotPart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stoichiometry => write!(f, "stoichiometry"),
            Self::Propensity => write!(f, "propensity"),
        }
    }
}

/// Build-time errors in class, compartment or rule definitions.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DefinitionError {
    #[error("Class '{name}' is already defined")]
    DuplicateClass { name: String },

    #[error("Invalid {kind} name '{name}': expected an identifier")]
    InvalidName { kind: &'static str, name: String },

    #[error("Class '{name}' uses the reserved prefix '{prefix}'")]
    ReservedClassName { name: String, prefix: &'static str },

    #[error("Unknown built-in class '{name}'")]
    UnknownBuiltinClass { name: String },

    #[error("Class '{class}' used by compartment '{compartment}' is not defined")]
    UndefinedCompartmentClass { compartment: String, class: String },

    #[error("Initial condition for '{class}' given, but compartment '{compartment}' does not hold that class")]
    UnknownInitialClass { compartment: String, class: String },

    #[error("Constant '{constant}' is not declared at compartment '{compartment}'")]
    UndeclaredConstant {
        compartment: String,
        constant: String,
    },

    #[error("Constant '{constant}' is declared but not set at compartment '{compartment}'")]
    UnsetConstant {
        compartment: String,
        constant: String,
    },

    #[error("Constant '{constant}' required by rule '{rule}' slot {slot} is not set at compartment '{compartment}'")]
    MissingRuleConstant {
        rule: String,
        slot: usize,
        compartment: String,
        constant: String,
    },

    #[error("Duplicate compartment name '{name}'")]
    DuplicateCompartment { name: String },

    #[error("Class '{class}' required by rule '{rule}' is not defined")]
    UndefinedRuleClass { rule: String, class: String },

    #[error("Rule '{rule}' has {slots} slot(s); slot index {slot} is out of range")]
    SlotOutOfRange {
        rule: String,
        slot: usize,
        slots: usize,
    },

    #[error("Rule '{rule}' slot {slot} already has a {part} defined")]
    DuplicateSlotDefinition {
        rule: String,
        slot: usize,
        part: SlotPart,
    },

    #[error("Rule '{rule}' slot {slot} has no {part} defined")]
    MissingSlotDefinition {
        rule: String,
        slot: usize,
        part: SlotPart,
    },

    #[error("Rule '{rule}' slot {slot} has {values} stoichiometry value(s) for {classes} class(es)")]
    StoichiometryShape {
        rule: String,
        slot: usize,
        values: usize,
        classes: usize,
    },

    #[error("Rule '{rule}' slot {slot}: invalid propensity '{expression}': {source}")]
    InvalidPropensity {
        rule: String,
        slot: usize,
        expression: String,
        #[source]
        source: ExpressionError,
    },

    #[error("Rule '{rule}' has no compartment available for slot {slot} (required type '{required}')")]
    UnsatisfiableSlot {
        rule: String,
        slot: usize,
        required: String,
    },

    #[error("Rule '{rule}' slot {slot} needs class '{class}', which compartment '{compartment}' does not hold")]
    MissingCompartmentClass {
        rule: String,
        slot: usize,
        compartment: String,
        class: String,
    },

    #[error("Rule '{rule}' slot {slot}: compartment '{compartment}' class layout differs from '{representative}'")]
    LayoutMismatch {
        rule: String,
        slot: usize,
        compartment: String,
        representative: String,
    },

    #[error("Rule '{rule}' has {slots} slots; compartmentless models only support single-slot rules")]
    CompartmentlessArity { rule: String, slots: usize },
}

/// Runtime errors raised while simulating.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    #[error("Model has not been built")]
    ModelNotBuilt,

    #[error("Solver has not been initialized")]
    SolverNotInitialized,

    #[error("Invalid solver configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("Invalid run options: {reason}")]
    InvalidRunOptions { reason: String },

    #[error("Rule '{rule}' (index set {index_set}) would drive '{class}' at compartment '{compartment}' to {value}")]
    NegativeState {
        rule: String,
        index_set: usize,
        compartment: String,
        class: String,
        value: f64,
    },

    #[error("Time cannot move backwards: {current} -> {next}")]
    NonMonotonicTime { current: f64, next: f64 },

    #[error("Elapsed time {elapsed} cannot be represented as a calendar datetime")]
    CalendarOverflow { elapsed: f64 },
}

/// Errors at the persistence boundary.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to (de)serialize '{document}': {source}")]
    Json {
        document: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Malformed document '{document}': {reason}")]
    Malformed { document: String, reason: String },

    #[error("Checksum mismatch for '{document}': expected {expected}, found {actual}")]
    ChecksumMismatch {
        document: String,
        expected: String,
        actual: String,
    },
}

/// The main error type for rbmsim.
#[derive(Debug, Error)]
pub enum RbmError {
    #[error("Definition error: {0}")]
    Definition(#[from] DefinitionError),

    #[error("Simulation error: {0}")]
    Simulation(#[from] SimulationError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl RbmError {
    /// Create an internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Check if this is a build-time definition error.
    #[must_use]
    pub const fn is_definition(&self) -> bool {
        matches!(self, Self::Definition(_))
    }

    /// Check if this is a runtime simulation error.
    #[must_use]
    pub const fn is_simulation(&self) -> bool {
        matches!(self, Self::Simulation(_))
    }

    /// Check if this is a persistence error.
    #[must_use]
    pub const fn is_persistence(&self) -> bool {
        matches!(self, Self::Persistence(_))
    }
}

/// Result type alias for rbmsim operations.
pub type RbmResult<T> = Result<T, RbmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DefinitionError::UnsatisfiableSlot {
            rule: "infection".to_string(),
            slot: 1,
            required: "farm".to_string(),
        };
        assert!(err.to_string().contains("infection"));
        assert!(err.to_string().contains("slot 1"));
    }

    #[test]
    fn test_error_conversion() {
        let err: RbmError = SimulationError::SolverNotInitialized.into();
        assert!(err.is_simulation());
        assert!(!err.is_definition());
    }

    #[test]
    fn test_invalid_propensity_carries_source() {
        let err = DefinitionError::InvalidPropensity {
            rule: "r".to_string(),
            slot: 0,
            expression: "S*".to_string(),
            source: ExpressionError::UnexpectedEnd,
        };
        let message = err.to_string();
        assert!(message.contains("S*"));
        assert!(message.contains("Unexpected end"));
    }
}
