// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Statement AST nodes.

use crate::expr::Expr;
use crate::property::LoopProperty;
use crate::Span;

/// A statement in the AST.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
    /// 1-based source line, 0 when synthesized.
    pub line: u32,
}

/// The kind of statement.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StmtKind {
    /// `a = e`, `a(i) = e`, `[a, ~, b] = f(...)`
    Assign { targets: Vec<LValue>, value: Expr },
    /// Expression statement
    Expr(Expr),
    If {
        cond: Expr,
        then_body: Vec<Stmt>,
        elseifs: Vec<(Expr, Vec<Stmt>)>,
        else_body: Option<Vec<Stmt>>,
    },
    For {
        var: String,
        range: Expr,
        body: Vec<Stmt>,
        properties: Vec<LoopProperty>,
    },
    While { cond: Expr, body: Vec<Stmt> },
    Break,
    Continue,
    Return,
    /// `global a b`
    Global(Vec<String>),
    Comment(String),
}

/// Assignment target.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LValue {
    Var(String),
    Index { name: String, indices: Vec<Expr> },
    /// `~` in a multi-output assignment
    Ignore,
}

impl LValue {
    pub fn name(&self) -> Option<&str> {
        match self {
            LValue::Var(n) | LValue::Index { name: n, .. } => Some(n),
            LValue::Ignore => None,
        }
    }
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span, line: u32) -> Self {
        Self { kind, span, line }
    }

    /// Same statement, reported at another line.
    pub fn at(mut self, line: u32) -> Self {
        self.line = line;
        self
    }

    /// Collect every variable this statement may assign, including nested bodies.
    pub fn assigned_names(&self, out: &mut Vec<String>) {
        match &self.kind {
            StmtKind::Assign { targets, .. } => {
                for target in targets {
                    if let Some(name) = target.name() {
                        push_unique(out, name);
                    }
                }
            }
            StmtKind::For { var, body, .. } => {
                push_unique(out, var);
                for s in body {
                    s.assigned_names(out);
                }
            }
            StmtKind::While { body, .. } => {
                for s in body {
                    s.assigned_names(out);
                }
            }
            StmtKind::If {
                then_body,
                elseifs,
                else_body,
                ..
            } => {
                for s in then_body {
                    s.assigned_names(out);
                }
                for (_, body) in elseifs {
                    for s in body {
                        s.assigned_names(out);
                    }
                }
                if let Some(body) = else_body {
                    for s in body {
                        s.assigned_names(out);
                    }
                }
            }
            StmtKind::Expr(_)
            | StmtKind::Break
            | StmtKind::Continue
            | StmtKind::Return
            | StmtKind::Global(_)
            | StmtKind::Comment(_) => {}
        }
    }
}

fn push_unique(out: &mut Vec<String>, name: &str) {
    if !out.iter().any(|n| n == name) {
        out.push(name.to_string());
    }
}
