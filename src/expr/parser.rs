//! Recursive-descent parser producing an expression tree.
//!
//! Grammar (lowest to highest precedence):
//!
//! ```text
//! sum     := product (('+' | '-') product)*
//! product := unary (('*' | '/') unary)*
//! unary   := ('+' | '-') unary | power
//! power   := atom ('^' unary)?
//! atom    := number | ident | ident '(' args ')' | '(' sum ')'
//! ```

use std::collections::BTreeSet;

use crate::error::ExpressionError;

use super::lexer::{tokenize, Token, TokenKind};

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// Addition.
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Division.
    Div,
    /// Exponentiation.
    Pow,
}

impl BinaryOp {
    /// Apply the operator to two values.
    #[must_use]
    pub fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            Self::Add => a + b,
            Self::Sub => a - b,
            Self::Mul => a * b,
            Self::Div => a / b,
            Self::Pow => a.powf(b),
        }
    }
}

/// Built-in functions callable from expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    /// `exp(x)`
    Exp,
    /// `ln(x)` / `log(x)`
    Ln,
    /// `sqrt(x)`
    Sqrt,
    /// `abs(x)`
    Abs,
    /// `floor(x)`
    Floor,
    /// `ceil(x)`
    Ceil,
    /// `sin(x)`
    Sin,
    /// `cos(x)`
    Cos,
    /// `min(a, b)`
    Min,
    /// `max(a, b)`
    Max,
    /// `pow(a, b)`
    Pow,
}

impl Function {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "exp" => Self::Exp,
            "ln" | "log" => Self::Ln,
            "sqrt" => Self::Sqrt,
            "abs" => Self::Abs,
            "floor" => Self::Floor,
            "ceil" => Self::Ceil,
            "sin" => Self::Sin,
            "cos" => Self::Cos,
            "min" => Self::Min,
            "max" => Self::Max,
            "pow" => Self::Pow,
            _ => return None,
        })
    }

    /// Number of arguments the function takes.
    #[must_use]
    pub const fn arity(self) -> usize {
        match self {
            Self::Min | Self::Max | Self::Pow => 2,
            _ => 1,
        }
    }

    /// Apply a unary function.
    #[must_use]
    pub fn apply1(self, x: f64) -> f64 {
        match self {
            Self::Exp => x.exp(),
            Self::Ln => x.ln(),
            Self::Sqrt => x.sqrt(),
            Self::Abs => x.abs(),
            Self::Floor => x.floor(),
            Self::Ceil => x.ceil(),
            Self::Sin => x.sin(),
            Self::Cos => x.cos(),
            Self::Min | Self::Max | Self::Pow => f64::NAN,
        }
    }

    /// Apply a binary function.
    #[must_use]
    pub fn apply2(self, a: f64, b: f64) -> f64 {
        match self {
            Self::Min => a.min(b),
            Self::Max => a.max(b),
            Self::Pow => a.powf(b),
            _ => f64::NAN,
        }
    }
}

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Numeric literal.
    Number(f64),
    /// Named symbol.
    Symbol(String),
    /// Negation.
    Neg(Box<Expr>),
    /// Binary operation.
    Binary {
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
    /// Function call.
    Call {
        /// Called function.
        func: Function,
        /// Arguments, length equal to the function arity.
        args: Vec<Expr>,
    },
}

impl Expr {
    /// Every symbol referenced by the expression.
    #[must_use]
    pub fn symbols(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_symbols(&mut out);
        out
    }

    fn collect_symbols<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Self::Number(_) => {}
            Self::Symbol(name) => {
                out.insert(name.as_str());
            }
            Self::Neg(inner) => inner.collect_symbols(out),
            Self::Binary { left, right, .. } => {
                left.collect_symbols(out);
                right.collect_symbols(out);
            }
            Self::Call { args, .. } => {
                for arg in args {
                    arg.collect_symbols(out);
                }
            }
        }
    }
}

/// Parse an expression string.
pub fn parse(source: &str) -> Result<Expr, ExpressionError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.sum()?;
    match parser.peek() {
        None => Ok(expr),
        Some(token) => Err(unexpected(token)),
    }
}

fn unexpected(token: &Token) -> ExpressionError {
    ExpressionError::UnexpectedToken {
        found: token.kind.to_string(),
        position: token.position,
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn next(&mut self) -> Result<Token, ExpressionError> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or(ExpressionError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(token)
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<(), ExpressionError> {
        let token = self.next()?;
        if &token.kind == kind {
            Ok(())
        } else {
            Err(unexpected(&token))
        }
    }

    fn sum(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.product()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Plus) => BinaryOp::Add,
                Some(TokenKind::Minus) => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.product()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn product(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Star) => BinaryOp::Mul,
                Some(TokenKind::Slash) => BinaryOp::Div,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn unary(&mut self) -> Result<Expr, ExpressionError> {
        match self.peek_kind() {
            Some(TokenKind::Minus) => {
                self.pos += 1;
                Ok(Expr::Neg(Box::new(self.unary()?)))
            }
            Some(TokenKind::Plus) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<Expr, ExpressionError> {
        let base = self.atom()?;
        if matches!(self.peek_kind(), Some(TokenKind::Caret)) {
            self.pos += 1;
            // Right associative, and binds tighter than a leading minus.
            let exponent = self.unary()?;
            return Ok(Expr::Binary {
                op: BinaryOp::Pow,
                left: Box::new(base),
                right: Box::new(exponent),
            });
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<Expr, ExpressionError> {
        let token = self.next()?;
        match token.kind {
            TokenKind::Number(value) => Ok(Expr::Number(value)),
            TokenKind::Ident(name) => {
                if matches!(self.peek_kind(), Some(TokenKind::LParen)) {
                    self.pos += 1;
                    self.call(name)
                } else {
                    Ok(Expr::Symbol(name))
                }
            }
            TokenKind::LParen => {
                let inner = self.sum()?;
                self.expect(&TokenKind::RParen)?;
                Ok(inner)
            }
            _ => Err(unexpected(&token)),
        }
    }

    fn call(&mut self, name: String) -> Result<Expr, ExpressionError> {
        let func = Function::from_name(&name)
            .ok_or_else(|| ExpressionError::UnknownFunction { name: name.clone() })?;
        let mut args = Vec::new();
        if !matches!(self.peek_kind(), Some(TokenKind::RParen)) {
            loop {
                args.push(self.sum()?);
                if matches!(self.peek_kind(), Some(TokenKind::Comma)) {
                    self.pos += 1;
                } else {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen)?;
        if args.len() != func.arity() {
            return Err(ExpressionError::Arity {
                name,
                expected: func.arity(),
                found: args.len(),
            });
        }
        Ok(Expr::Call { func, args })
    }
}
