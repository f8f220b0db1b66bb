// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Loop interchange.
//!
//! Matrices are stored column-major, so the innermost loop should walk the
//! first index. A perfect two-level nest whose inner variable indexes a
//! later dimension than the outer one gets its loops swapped:
//!
//! ```text
//! for i, for j, A(i, j) = ...   ->   for j, for i, A(i, j) = ...
//! ```
//!
//! Only nests where each iteration touches its own element are swapped:
//! every loop-carried value is a matrix updated and read at one index tuple
//! naming both iteration variables.

use std::collections::HashSet;

use matisse_infer::TypedInstance;
use matisse_ssa::{BlockId, FunctionBody, Instruction, InstructionType};
use tracing::debug;

use crate::error::OptError;
use crate::pass::{log_rejection, reject, Attempt, PassContext, PassOutcome, PostTypePass};
use crate::pattern::{access_of, code_end, is_decoration, iteration_variable, phis_of, same_value, uses_of, AccessKind};

const PASS: &str = "loop_interchange";

pub struct LoopInterchange;

impl PostTypePass for LoopInterchange {
    fn name(&self) -> &'static str {
        PASS
    }

    fn optimization_id(&self) -> Option<&'static str> {
        Some("loop_interchange")
    }

    fn apply(&self, instance: &mut TypedInstance, _ctx: &PassContext<'_>) -> Result<PassOutcome, OptError> {
        let mut nests = Vec::new();
        for s in instance.body.block_ids() {
            let Some(Instruction::For { loop_block, .. }) = instance.body.block(s).terminator() else {
                continue;
            };
            if !matches!(instance.body.block(*loop_block).terminator(), Some(Instruction::For { .. })) {
                continue;
            }
            match nest_at(instance, s) {
                Ok(nest) => nests.push(nest),
                Err(r) => log_rejection(PASS, instance.name(), &r),
            }
        }
        let swapped = nests.len();
        for nest in nests {
            interchange(&mut instance.body, nest);
        }
        debug!(function = %instance.name(), swapped, "loop nests interchanged");
        Ok(PassOutcome::from_changed(swapped > 0))
    }
}

/// A perfect nest: `S -> for(LO) -> for(LI) -> MI`, with `MI` closing the
/// outer body.
struct Nest {
    s: BlockId,
    outer: BlockId,
    inner: BlockId,
    /// Positions in the outer body of code that runs once, before the nest.
    invariant: Vec<usize>,
}

fn nest_at(instance: &TypedInstance, s: BlockId) -> Attempt<Nest> {
    let body = &instance.body;
    let Some(Instruction::For { loop_block: outer, .. }) = body.block(s).terminator() else {
        return reject("not a for-loop");
    };
    let Some(Instruction::For {
        loop_block: inner,
        end_block: middle,
        ..
    }) = body.block(*outer).terminator()
    else {
        return reject("outer body does not end in a for-loop");
    };
    let (outer, inner, middle) = (*outer, *inner, *middle);
    if body.block(inner).terminator().is_some() || body.block(middle).terminator().is_some() {
        return reject("nest is not perfect");
    }
    let (Some(i), Some(j)) = (iteration_variable(body.block(outer)), iteration_variable(body.block(inner))) else {
        return reject("missing iteration variable");
    };

    let carried: HashSet<String> = phis_of(body.block(outer)).into_iter().map(|(o, _, _)| o).collect();
    for name in &carried {
        if instance.type_of(name).and_then(|t| t.as_matrix()).is_none() {
            return reject(format!("`{}` carries a scalar across iterations", name));
        }
        let only_copied = uses_of(body, name).into_iter().all(|(b, p)| {
            b == outer && matches!(body.block(b).instructions[p], Instruction::ParallelCopy { .. })
        });
        if !only_copied {
            return reject(format!("`{}` is read between the loops", name));
        }
    }

    let mut invariant = Vec::new();
    for (position, inst) in body.block(outer).instructions.iter().enumerate() {
        match inst {
            Instruction::Phi { .. } | Instruction::Iter { .. } | Instruction::For { .. } => {}
            Instruction::ParallelCopy { inputs, .. } => {
                if inputs.iter().any(|n| n == i) {
                    return reject("outer iteration variable escapes");
                }
            }
            _ if is_decoration(inst) => {}
            _ if inst.instruction_type() == InstructionType::NoSideEffect => {
                if inst.inputs().iter().any(|n| *n == i || carried.contains(*n)) {
                    return reject("code between the loops depends on the outer iteration");
                }
                invariant.push(position);
            }
            _ => return reject("code between the loops has effects"),
        }
    }
    let closing_only = body.block(middle).instructions.iter().all(|inst| {
        matches!(inst, Instruction::Phi { .. } | Instruction::ParallelCopy { .. }) || is_decoration(inst)
    });
    if !closing_only {
        return reject("code after the inner loop");
    }

    for var in [i, j] {
        let inside = uses_of(body, var).into_iter().all(|(b, p)| {
            b == inner && !matches!(body.block(b).instructions[p], Instruction::ParallelCopy { .. })
        });
        if !inside {
            return reject(format!("`{}` is used outside the inner body", var));
        }
    }

    let tuple = element_tuple(instance, inner, i, j)?;
    if !profitable(body, inner, i, j) {
        return reject("inner loop already walks the leading dimension");
    }
    debug!(function = %instance.name(), tuple = ?tuple, "nest qualifies for interchange");
    Ok(Nest {
        s,
        outer,
        inner,
        invariant,
    })
}

/// The single index tuple at which the inner body reads and writes every
/// carried matrix.
fn element_tuple(instance: &TypedInstance, inner: BlockId, i: &str, j: &str) -> Attempt<Vec<String>> {
    let block = instance.body.block(inner);
    let mut chain: HashSet<String> = HashSet::new();
    for (output, _, _) in phis_of(block) {
        if instance.type_of(&output).and_then(|t| t.as_matrix()).is_none() {
            return reject(format!("`{}` carries a scalar across iterations", output));
        }
        chain.insert(output);
    }
    let mut tuple: Option<Vec<String>> = None;
    let mut agree = |indices: &[String]| -> Attempt<()> {
        match &tuple {
            Some(t) => {
                let same = t.len() == indices.len()
                    && t.iter().zip(indices).all(|(a, b)| same_value(instance, a, b));
                if !same {
                    return reject("carried matrices are accessed at different elements");
                }
            }
            None => {
                if !indices.iter().any(|n| n == i) || !indices.iter().any(|n| n == j) {
                    return reject("access does not name both iteration variables");
                }
                tuple = Some(indices.to_vec());
            }
        }
        Ok(())
    };
    for inst in &block.instructions {
        if inst.instruction_type() == InstructionType::SideEffect {
            return reject("inner body has side effects");
        }
        if matches!(inst, Instruction::Phi { .. } | Instruction::ParallelCopy { .. }) || is_decoration(inst) {
            continue;
        }
        let reads_chain = inst.inputs().iter().any(|n| chain.contains(*n));
        match access_of(inst) {
            Some(access) if chain.contains(access.matrix) => {
                if access.indices.iter().any(|n| chain.contains(n)) {
                    return reject("carried matrix used as an index");
                }
                agree(access.indices)?;
                if access.kind == AccessKind::Write {
                    if inst.inputs().last().is_some_and(|v| chain.contains(*v)) {
                        return reject("carried matrix stored into itself");
                    }
                    chain.extend(inst.outputs().into_iter().map(str::to_string));
                }
            }
            _ if reads_chain => return reject("carried matrix used by more than an element access"),
            _ => {}
        }
    }
    tuple.map_or_else(|| reject("inner body touches no carried matrix"), Ok)
}

/// Whether some access indexes the inner variable at a later position than
/// the outer one, and none does the opposite.
fn profitable(body: &FunctionBody, inner: BlockId, i: &str, j: &str) -> bool {
    let mut better = false;
    for inst in &body.block(inner).instructions {
        let Some(access) = access_of(inst) else {
            continue;
        };
        let pi = access.indices.iter().position(|n| n == i);
        let pj = access.indices.iter().position(|n| n == j);
        if let (Some(pi), Some(pj)) = (pi, pj) {
            if pj < pi {
                return false;
            }
            better = true;
        }
    }
    better
}

fn interchange(body: &mut FunctionBody, nest: Nest) {
    let outer = body.block_mut(nest.outer);
    let hoisted: Vec<Instruction> = nest
        .invariant
        .iter()
        .rev()
        .map(|p| outer.instructions.remove(*p))
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    let at = code_end(body.block(nest.s));
    body.block_mut(nest.s).instructions.splice(at..at, hoisted);

    let outer_for = body.block(nest.s).instructions.last().cloned();
    let inner_for = body.block(nest.outer).instructions.last().cloned();
    let (
        Some(Instruction::For {
            start: s1,
            interval: i1,
            end: e1,
            properties: p1,
            ..
        }),
        Some(Instruction::For {
            start: s2,
            interval: i2,
            end: e2,
            properties: p2,
            ..
        }),
    ) = (outer_for, inner_for)
    else {
        return;
    };
    set_range(body, nest.s, s2, i2, e2, p2);
    set_range(body, nest.outer, s1, i1, e1, p1);

    let outer_var = iteration_variable(body.block(nest.outer)).map(str::to_string);
    let inner_var = iteration_variable(body.block(nest.inner)).map(str::to_string);
    if let (Some(i), Some(j)) = (outer_var, inner_var) {
        set_iteration_variable(body, nest.outer, j);
        set_iteration_variable(body, nest.inner, i);
    }
}

fn set_range(
    body: &mut FunctionBody,
    block: BlockId,
    new_start: String,
    new_interval: String,
    new_end: String,
    new_properties: Vec<matisse_ast::LoopProperty>,
) {
    if let Some(Instruction::For {
        start,
        interval,
        end,
        properties,
        ..
    }) = body.block_mut(block).instructions.last_mut()
    {
        *start = new_start;
        *interval = new_interval;
        *end = new_end;
        *properties = new_properties;
    }
}

fn set_iteration_variable(body: &mut FunctionBody, block: BlockId, name: String) {
    for inst in &mut body.block_mut(block).instructions {
        if let Instruction::Iter { output } = inst {
            *output = name;
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use matisse_ast::build::*;
    use matisse_ast::{BinaryOp, Expr, FunctionNode};
    use matisse_ssa::validate;
    use matisse_types::{MatrixType, NumericClass, VariableType};

    fn square() -> VariableType {
        VariableType::Matrix(MatrixType::fixed(NumericClass::Double, &[3, 3]))
    }

    /// `for i = 1:3, for j = 1:3, <stmt>, end, end`.
    fn nest(stmt: matisse_ast::Stmt, outputs: &[&str]) -> FunctionNode {
        function(
            "f",
            &["x"],
            outputs,
            vec![for_range(
                "i",
                range(num("1"), num("3")),
                vec![for_range("j", range(num("1"), num("3")), vec![stmt])],
            )],
        )
    }

    fn scale(first: &str, second: &str) -> matisse_ast::Stmt {
        let at = || vec![ident(first), ident(second)];
        assign_index("y", at(), binary(BinaryOp::Mul, apply("x", at()), num("2")))
    }

    /// Iteration variables of the outer then the inner loop.
    fn order(inst: &TypedInstance) -> Vec<String> {
        let mut vars = Vec::new();
        let mut block = BlockId::ENTRY;
        while let Some(Instruction::For { loop_block, .. }) = inst.body.block(block).terminator() {
            block = *loop_block;
            vars.extend(iteration_variable(inst.body.block(block)).map(str::to_string));
        }
        vars
    }

    #[test]
    fn row_walk_is_swapped() {
        let (engine, _) = engine_for(vec![nest(scale("i", "j"), &["y"])]);
        let mut inst = typed(&engine, "f", &[square()]);
        let before = order(&inst);
        assert_eq!(before.len(), 2);

        let outcome = LoopInterchange.apply(&mut inst, &PassContext::new(&engine)).unwrap();
        assert!(outcome.changed());
        let after = order(&inst);
        assert_eq!(after, vec![before[1].clone(), before[0].clone()]);
        validate(&inst.body).unwrap();
    }

    #[test]
    fn column_walk_stays() {
        let (engine, _) = engine_for(vec![nest(scale("j", "i"), &["y"])]);
        let mut inst = typed(&engine, "f", &[square()]);
        let outcome = LoopInterchange.apply(&mut inst, &PassContext::new(&engine)).unwrap();
        assert_eq!(outcome, PassOutcome::Unchanged);
    }

    #[test]
    fn scalar_reductions_stay() {
        // s = s + x(i, j) would be summed in another order
        let sum: Expr = binary(BinaryOp::Add, ident("s"), apply("x", vec![ident("i"), ident("j")]));
        let mut f = nest(assign("s", sum), &["s"]);
        f.body.insert(0, assign("s", num("0")));
        let (engine, _) = engine_for(vec![f]);
        let mut inst = typed(&engine, "f", &[square()]);
        let outcome = LoopInterchange.apply(&mut inst, &PassContext::new(&engine)).unwrap();
        assert_eq!(outcome, PassOutcome::Unchanged);
    }
}
