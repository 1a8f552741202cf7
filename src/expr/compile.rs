//! Compilation of expression trees into closures over a numeric vector.
//!
//! The vector a compiled expression reads is split in two: the local class
//! values of one compartment, and the built-in class values of the model.
//! Symbol `x{i}` addresses the concatenation of both.

use std::fmt;
use std::sync::Arc;

use crate::error::ExpressionError;

use super::parser::{parse, BinaryOp, Expr, Function};

/// Position of a symbol in the evaluation vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VarRef {
    /// Index into the compartment's class values.
    Local(usize),
    /// Index into the built-in class values.
    Global(usize),
}

/// Names available to an expression, in vector order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolTable {
    locals: Vec<String>,
    globals: Vec<String>,
}

impl SymbolTable {
    /// Create a table from local and global names.
    #[must_use]
    pub fn new(locals: Vec<String>, globals: Vec<String>) -> Self {
        Self { locals, globals }
    }

    /// Local names.
    #[must_use]
    pub fn locals(&self) -> &[String] {
        &self.locals
    }

    /// Global names.
    #[must_use]
    pub fn globals(&self) -> &[String] {
        &self.globals
    }

    /// Resolve a symbol by name or positional `x{i}` alias.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<VarRef> {
        if let Some(i) = self.locals.iter().position(|n| n == name) {
            return Some(VarRef::Local(i));
        }
        if let Some(j) = self.globals.iter().position(|n| n == name) {
            return Some(VarRef::Global(j));
        }
        let index: usize = name.strip_prefix('x')?.parse().ok()?;
        if index < self.locals.len() {
            Some(VarRef::Local(index))
        } else if index - self.locals.len() < self.globals.len() {
            Some(VarRef::Global(index - self.locals.len()))
        } else {
            None
        }
    }
}

type Kernel = Box<dyn Fn(&[f64], &[f64]) -> f64 + Send + Sync>;

fn kernel(f: impl Fn(&[f64], &[f64]) -> f64 + Send + Sync + 'static) -> Kernel {
    Box::new(f)
}

/// A propensity expression compiled into a numeric function.
#[derive(Clone)]
pub struct CompiledExpr {
    source: String,
    reads: Vec<VarRef>,
    kernel: Arc<Kernel>,
}

impl fmt::Debug for CompiledExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledExpr")
            .field("source", &self.source)
            .field("reads", &self.reads)
            .finish_non_exhaustive()
    }
}

impl CompiledExpr {
    /// Parse and compile `source` against `symbols`.
    pub fn compile(source: &str, symbols: &SymbolTable) -> Result<Self, ExpressionError> {
        let tree = parse(source)?;
        let mut reads = Vec::new();
        for name in tree.symbols() {
            let var = symbols
                .resolve(name)
                .ok_or_else(|| ExpressionError::UnknownSymbol {
                    name: name.to_string(),
                })?;
            reads.push(var);
        }
        reads.sort_unstable();
        reads.dedup();

        let kernel = build(&fold(tree), symbols)?;
        Ok(Self {
            source: source.to_string(),
            reads,
            kernel: Arc::new(kernel),
        })
    }

    /// Evaluate against local class values and built-in values.
    #[inline]
    #[must_use]
    pub fn evaluate(&self, locals: &[f64], globals: &[f64]) -> f64 {
        (self.kernel)(locals, globals)
    }

    /// Evaluate with every symbol set to `value`; the result must be finite
    /// and non-negative.
    pub fn probe(&self, value: f64, symbols: &SymbolTable) -> Result<f64, ExpressionError> {
        let locals = vec![value; symbols.locals().len()];
        let globals = vec![value; symbols.globals().len()];
        let result = self.evaluate(&locals, &globals);
        if result.is_finite() && result >= 0.0 {
            Ok(result)
        } else {
            Err(ExpressionError::InvalidProbe { value: result })
        }
    }

    /// Source text the expression was compiled from.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Sorted, deduplicated vector positions the expression reads.
    #[must_use]
    pub fn reads(&self) -> &[VarRef] {
        &self.reads
    }

    /// Whether the expression reads no symbol at all.
    #[must_use]
    pub fn is_constant(&self) -> bool {
        self.reads.is_empty()
    }
}

/// Fold constant sub-expressions.
fn fold(expr: Expr) -> Expr {
    match expr {
        Expr::Neg(inner) => match fold(*inner) {
            Expr::Number(v) => Expr::Number(-v),
            other => Expr::Neg(Box::new(other)),
        },
        Expr::Binary { op, left, right } => match (fold(*left), fold(*right)) {
            (Expr::Number(a), Expr::Number(b)) => Expr::Number(op.apply(a, b)),
            (left, right) => Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
        },
        Expr::Call { func, args } => {
            let args: Vec<Expr> = args.into_iter().map(fold).collect();
            match args.as_slice() {
                [Expr::Number(x)] => Expr::Number(func.apply1(*x)),
                [Expr::Number(a), Expr::Number(b)] => Expr::Number(func.apply2(*a, *b)),
                _ => Expr::Call { func, args },
            }
        }
        leaf => leaf,
    }
}

fn build(expr: &Expr, symbols: &SymbolTable) -> Result<Kernel, ExpressionError> {
    let compiled = match expr {
        Expr::Number(v) => {
            let v = *v;
            kernel(move |_, _| v)
        }
        Expr::Symbol(name) => match symbols.resolve(name) {
            Some(VarRef::Local(i)) => kernel(move |l, _| l[i]),
            Some(VarRef::Global(j)) => kernel(move |_, g| g[j]),
            None => {
                return Err(ExpressionError::UnknownSymbol { name: name.clone() });
            }
        },
        Expr::Neg(inner) => {
            let inner = build(inner, symbols)?;
            kernel(move |l, g| -inner(l, g))
        }
        Expr::Binary { op, left, right } => {
            let a = build(left, symbols)?;
            let b = build(right, symbols)?;
            match op {
                BinaryOp::Add => kernel(move |l, g| a(l, g) + b(l, g)),
                BinaryOp::Sub => kernel(move |l, g| a(l, g) - b(l, g)),
                BinaryOp::Mul => kernel(move |l, g| a(l, g) * b(l, g)),
                BinaryOp::Div => kernel(move |l, g| a(l, g) / b(l, g)),
                BinaryOp::Pow => kernel(move |l, g| a(l, g).powf(b(l, g))),
            }
        }
        Expr::Call { func, args } => {
            let func: Function = *func;
            let mut kernels = args
                .iter()
                .map(|arg| build(arg, symbols))
                .collect::<Result<Vec<_>, _>>()?;
            if func.arity() == 1 {
                let x = kernels.remove(0);
                kernel(move |l, g| func.apply1(x(l, g)))
            } else {
                let b = kernels.remove(1);
                let a = kernels.remove(0);
                kernel(move |l, g| func.apply2(a(l, g), b(l, g)))
            }
        }
    };
    Ok(compiled)
}
