//! Expression compiler for propensity functions.
//!
//! A propensity string goes through three stages:
//!
//! 1. textual substitution of slot placeholders and compartment constants
//!    ([`substitute`]);
//! 2. tokenizing and parsing into an [`Expr`] tree ([`lexer`], [`parser`]);
//! 3. compilation into a [`CompiledExpr`] closure over the class vector
//!    ([`compile`]).

pub mod compile;
pub mod lexer;
pub mod parser;
pub mod substitute;

pub use compile::{CompiledExpr, SymbolTable, VarRef};
pub use parser::{parse, BinaryOp, Expr, Function};
