// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! `elseif` chains become nested `if`/`else` statements.

use super::{AstPass, AstPassError};
use crate::function::FunctionNode;
use crate::stmt::{Stmt, StmtKind};

pub struct ElseIfExpander;

impl AstPass for ElseIfExpander {
    fn name(&self) -> &'static str {
        "expand_elseif"
    }

    fn apply(&self, function: &mut FunctionNode) -> Result<(), AstPassError> {
        expand_all(&mut function.body);
        Ok(())
    }
}

fn expand_all(stmts: &mut [Stmt]) {
    for stmt in stmts {
        expand(stmt);
    }
}

fn expand(stmt: &mut Stmt) {
    let line = stmt.line;
    let span = stmt.span;
    match &mut stmt.kind {
        StmtKind::If {
            then_body,
            elseifs,
            else_body,
            ..
        } => {
            expand_all(then_body);
            for (_, body) in elseifs.iter_mut() {
                expand_all(body);
            }
            if let Some(body) = else_body.as_mut() {
                expand_all(body);
            }
            if elseifs.is_empty() {
                return;
            }
            let mut nested = else_body.take();
            for (cond, body) in std::mem::take(elseifs).into_iter().rev() {
                let inner = StmtKind::If {
                    cond,
                    then_body: body,
                    elseifs: Vec::new(),
                    else_body: nested,
                };
                nested = Some(vec![Stmt::new(inner, span, line)]);
            }
            *else_body = nested;
        }
        StmtKind::For { body, .. } | StmtKind::While { body, .. } => expand_all(body),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::*;

    #[test]
    fn chain_becomes_nested() {
        let mut f = function(
            "f",
            &["x"],
            &["y"],
            vec![if_chain(
                ident("a"),
                vec![assign("y", num("1"))],
                vec![
                    (ident("b"), vec![assign("y", num("2"))]),
                    (ident("c"), vec![assign("y", num("3"))]),
                ],
                Some(vec![assign("y", num("4"))]),
            )],
        );
        ElseIfExpander.apply(&mut f).unwrap();

        let StmtKind::If { elseifs, else_body, .. } = &f.body[0].kind else {
            panic!("expected if");
        };
        assert!(elseifs.is_empty());
        let outer_else = else_body.as_ref().unwrap();
        let StmtKind::If { cond, else_body, .. } = &outer_else[0].kind else {
            panic!("expected nested if");
        };
        assert_eq!(cond, &ident("b"));
        let inner_else = else_body.as_ref().unwrap();
        let StmtKind::If { cond, else_body, .. } = &inner_else[0].kind else {
            panic!("expected second nested if");
        };
        assert_eq!(cond, &ident("c"));
        assert_eq!(else_body.as_ref().unwrap(), &vec![assign("y", num("4"))]);
    }

    #[test]
    fn chain_inside_loop() {
        let mut f = function(
            "f",
            &[],
            &[],
            vec![for_range(
                "i",
                range(num("1"), num("3")),
                vec![if_chain(
                    ident("a"),
                    vec![],
                    vec![(ident("b"), vec![])],
                    None,
                )],
            )],
        );
        ElseIfExpander.apply(&mut f).unwrap();
        let StmtKind::For { body, .. } = &f.body[0].kind else {
            panic!("expected for");
        };
        let StmtKind::If { elseifs, else_body, .. } = &body[0].kind else {
            panic!("expected if");
        };
        assert!(elseifs.is_empty());
        assert_eq!(else_body.as_ref().map(|b| b.len()), Some(1));
    }
}
