// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! `return` statements become assignments to a flag.
//!
//! Code following a statement that may have returned is guarded by
//! `if ~flag`. Inside loops the guard also breaks out, so the flag
//! propagates outward one loop at a time.

use super::{AstPass, AstPassError};
use crate::build::{assign, brk, ident, if_else, not, num};
use crate::function::FunctionNode;
use crate::stmt::{Stmt, StmtKind};

/// Name of the generated flag. The leading `$` keeps it out of the user's namespace.
pub const RETURN_FLAG: &str = "$return";

pub struct ReturnRemover;

impl AstPass for ReturnRemover {
    fn name(&self) -> &'static str {
        "remove_return"
    }

    fn apply(&self, function: &mut FunctionNode) -> Result<(), AstPassError> {
        if remove_returns(&mut function.body, false) {
            let line = function.body.first().map_or(0, |s| s.line);
            function
                .body
                .insert(0, assign(RETURN_FLAG, num("0")).at(line));
        }
        Ok(())
    }
}

fn remove_returns(stmts: &mut Vec<Stmt>, in_loop: bool) -> bool {
    for i in 0..stmts.len() {
        let line = stmts[i].line;
        if matches!(stmts[i].kind, StmtKind::Return) {
            stmts.truncate(i);
            stmts.push(assign(RETURN_FLAG, num("1")).at(line));
            if in_loop {
                stmts.push(brk().at(line));
            }
            return true;
        }
        if remove_in_children(&mut stmts[i]) {
            let rest = stmts.split_off(i + 1);
            if !rest.is_empty() {
                let else_body = in_loop.then(|| vec![brk().at(line)]);
                stmts.push(if_else(not(ident(RETURN_FLAG)), rest, else_body).at(line));
            } else if in_loop {
                stmts.push(if_else(ident(RETURN_FLAG), vec![brk().at(line)], None).at(line));
            }
            return true;
        }
    }
    false
}

fn remove_in_children(stmt: &mut Stmt) -> bool {
    match &mut stmt.kind {
        StmtKind::If {
            then_body,
            elseifs,
            else_body,
            ..
        } => {
            let mut removed = remove_returns(then_body, false);
            for (_, body) in elseifs.iter_mut() {
                removed |= remove_returns(body, false);
            }
            if let Some(body) = else_body.as_mut() {
                removed |= remove_returns(body, false);
            }
            removed
        }
        StmtKind::For { body, .. } | StmtKind::While { body, .. } => remove_returns(body, true),
        _ => false,
    }
}
