// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Expression AST nodes.

use crate::Span;

/// An expression in the AST.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

/// The kind of expression.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ExprKind {
    /// Numeric literal, kept as written (`3`, `2.5`, `1e-3`)
    Number(String),
    /// String literal
    Str(String),
    /// Identifier: a variable or a zero-argument call
    Ident(String),
    /// `name(args)`: a call or a matrix access, decided by whether `name` is a variable
    Apply { target: String, args: Vec<Expr> },
    /// Bare `:` inside an index
    Colon,
    /// `end` inside an index
    End,
    /// `start:end` or `start:step:end`
    Range {
        start: Box<Expr>,
        step: Option<Box<Expr>>,
        end: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary { op: UnaryOp, operand: Box<Expr> },
    /// Matrix literal, one entry per row
    Matrix(Vec<Vec<Expr>>),
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BinaryOp {
    Add,
    Sub,
    /// `*`
    MatMul,
    /// `.*`
    Mul,
    /// `/`
    MatDiv,
    /// `./`
    Div,
    /// `.^`
    Pow,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    /// `&` and `&&`
    And,
    /// `|` and `||`
    Or,
}

impl BinaryOp {
    /// Name of the built-in function implementing the operator.
    pub fn function_name(self) -> &'static str {
        match self {
            BinaryOp::Add => "plus",
            BinaryOp::Sub => "minus",
            BinaryOp::MatMul => "mtimes",
            BinaryOp::Mul => "times",
            BinaryOp::MatDiv => "mrdivide",
            BinaryOp::Div => "rdivide",
            BinaryOp::Pow => "power",
            BinaryOp::Eq => "eq",
            BinaryOp::Ne => "ne",
            BinaryOp::Lt => "lt",
            BinaryOp::Gt => "gt",
            BinaryOp::Le => "le",
            BinaryOp::Ge => "ge",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum UnaryOp {
    /// Negation (-)
    Neg,
    /// Logical not (~)
    Not,
    /// Transpose (')
    Transpose,
}

impl UnaryOp {
    pub fn function_name(self) -> &'static str {
        match self {
            UnaryOp::Neg => "uminus",
            UnaryOp::Not => "not",
            UnaryOp::Transpose => "transpose",
        }
    }
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Whether `end` appears in this expression outside of a nested index.
    pub fn mentions_end(&self) -> bool {
        match &self.kind {
            ExprKind::End => true,
            ExprKind::Range { start, step, end } => {
                start.mentions_end()
                    || step.as_ref().map_or(false, |s| s.mentions_end())
                    || end.mentions_end()
            }
            ExprKind::Binary { left, right, .. } => left.mentions_end() || right.mentions_end(),
            ExprKind::Unary { operand, .. } => operand.mentions_end(),
            _ => false,
        }
    }
}
