// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Compact constructors for syntax trees.
//!
//! Front ends and tests build trees with these instead of spelling out
//! spans. Every node gets an empty span; statements get line 1 unless
//! moved with [`Stmt::at`].

use crate::expr::{BinaryOp, Expr, ExprKind, UnaryOp};
use crate::function::FunctionNode;
use crate::property::{FunctionProperty, LoopProperty};
use crate::stmt::{LValue, Stmt, StmtKind};
use crate::Span;

fn expr(kind: ExprKind) -> Expr {
    Expr::new(kind, Span::default())
}

fn stmt(kind: StmtKind) -> Stmt {
    Stmt::new(kind, Span::default(), 1)
}

pub fn num(text: &str) -> Expr {
    expr(ExprKind::Number(text.to_string()))
}

pub fn string(text: &str) -> Expr {
    expr(ExprKind::Str(text.to_string()))
}

pub fn ident(name: &str) -> Expr {
    expr(ExprKind::Ident(name.to_string()))
}

pub fn apply(target: &str, args: Vec<Expr>) -> Expr {
    expr(ExprKind::Apply {
        target: target.to_string(),
        args,
    })
}

pub fn colon() -> Expr {
    expr(ExprKind::Colon)
}

pub fn end() -> Expr {
    expr(ExprKind::End)
}

pub fn range(start: Expr, end: Expr) -> Expr {
    expr(ExprKind::Range {
        start: Box::new(start),
        step: None,
        end: Box::new(end),
    })
}

pub fn range_step(start: Expr, step: Expr, end: Expr) -> Expr {
    expr(ExprKind::Range {
        start: Box::new(start),
        step: Some(Box::new(step)),
        end: Box::new(end),
    })
}

pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    expr(ExprKind::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    })
}

pub fn unary(op: UnaryOp, operand: Expr) -> Expr {
    expr(ExprKind::Unary {
        op,
        operand: Box::new(operand),
    })
}

pub fn not(operand: Expr) -> Expr {
    unary(UnaryOp::Not, operand)
}

pub fn matrix(rows: Vec<Vec<Expr>>) -> Expr {
    expr(ExprKind::Matrix(rows))
}

pub fn assign(name: &str, value: Expr) -> Stmt {
    stmt(StmtKind::Assign {
        targets: vec![LValue::Var(name.to_string())],
        value,
    })
}

pub fn assign_index(name: &str, indices: Vec<Expr>, value: Expr) -> Stmt {
    stmt(StmtKind::Assign {
        targets: vec![LValue::Index {
            name: name.to_string(),
            indices,
        }],
        value,
    })
}

pub fn assign_multi(targets: Vec<LValue>, value: Expr) -> Stmt {
    stmt(StmtKind::Assign { targets, value })
}

pub fn expr_stmt(e: Expr) -> Stmt {
    stmt(StmtKind::Expr(e))
}

pub fn if_else(cond: Expr, then_body: Vec<Stmt>, else_body: Option<Vec<Stmt>>) -> Stmt {
    stmt(StmtKind::If {
        cond,
        then_body,
        elseifs: Vec::new(),
        else_body,
    })
}

pub fn if_chain(
    cond: Expr,
    then_body: Vec<Stmt>,
    elseifs: Vec<(Expr, Vec<Stmt>)>,
    else_body: Option<Vec<Stmt>>,
) -> Stmt {
    stmt(StmtKind::If {
        cond,
        then_body,
        elseifs,
        else_body,
    })
}

pub fn for_range(var: &str, range: Expr, body: Vec<Stmt>) -> Stmt {
    for_with(var, range, body, Vec::new())
}

pub fn for_with(var: &str, range: Expr, body: Vec<Stmt>, properties: Vec<LoopProperty>) -> Stmt {
    stmt(StmtKind::For {
        var: var.to_string(),
        range,
        body,
        properties,
    })
}

pub fn while_loop(cond: Expr, body: Vec<Stmt>) -> Stmt {
    stmt(StmtKind::While { cond, body })
}

pub fn brk() -> Stmt {
    stmt(StmtKind::Break)
}

pub fn cont() -> Stmt {
    stmt(StmtKind::Continue)
}

pub fn ret() -> Stmt {
    stmt(StmtKind::Return)
}

pub fn global(names: &[&str]) -> Stmt {
    stmt(StmtKind::Global(names.iter().map(|n| n.to_string()).collect()))
}

pub fn comment(text: &str) -> Stmt {
    stmt(StmtKind::Comment(text.to_string()))
}

pub fn function(name: &str, inputs: &[&str], outputs: &[&str], body: Vec<Stmt>) -> FunctionNode {
    FunctionNode {
        name: name.to_string(),
        inputs: inputs.iter().map(|s| s.to_string()).collect(),
        outputs: outputs.iter().map(|s| s.to_string()).collect(),
        body,
        properties: Vec::new(),
        span: Span::default(),
    }
}

pub fn function_with(
    name: &str,
    inputs: &[&str],
    outputs: &[&str],
    body: Vec<Stmt>,
    properties: Vec<FunctionProperty>,
) -> FunctionNode {
    FunctionNode {
        properties,
        ..function(name, inputs, outputs, body)
    }
}
