// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Loop fusion.
//!
//! Two adjacent for-loops over the same range become one loop running both
//! bodies in order:
//!
//! ```text
//! for i = a:s:b, A(i) = ...; end        for i = a:s:b
//! for j = a:s:b, ... A(j) ...; end  ->      A(i) = ...;
//!                                           ... A(i) ...;
//!                                       end
//! ```
//!
//! The second loop may read a matrix the first one built only at the very
//! element the first loop wrote in the same iteration, so every read and
//! every write must index with the same per-dimension roles: the iteration
//! variable, a constant, or a value defined outside both loops. The read
//! then takes the partially built matrix instead of the finished one.

use std::collections::HashSet;

use matisse_ast::LoopProperty;
use matisse_infer::TypedInstance;
use matisse_ssa::{BlockId, FunctionBody, Instruction, InstructionType};
use tracing::debug;

use crate::error::OptError;
use crate::pass::{log_rejection, reject, Attempt, PassContext, PassOutcome, PostTypePass};
use crate::pattern::{
    access_of, add_copies, code_end, copied_from, defined_in, is_decoration, iteration_variable,
    phis_of, same_value, take_copies, AccessKind,
};

const PASS: &str = "loop_fusion";

/// Disabling this id lets loops that share no data fuse as well.
const ONLY_RELATED: &str = "loop_fusion_only_related";

pub struct LoopFusion;

impl PostTypePass for LoopFusion {
    fn name(&self) -> &'static str {
        PASS
    }

    fn optimization_id(&self) -> Option<&'static str> {
        Some("loop_fusion")
    }

    fn apply(&self, instance: &mut TypedInstance, ctx: &PassContext<'_>) -> Result<PassOutcome, OptError> {
        let only_related = !ctx.settings().is_disabled(ONLY_RELATED);
        let mut fused = 0;
        while let Some(plan) = find_plan(instance, only_related) {
            fuse(instance, plan);
            fused += 1;
        }
        debug!(function = %instance.name(), fused, "loops fused");
        Ok(PassOutcome::from_changed(fused > 0))
    }
}

/// Two loops `S -> for(L1) -> M -> for(L2) -> E`, checked and ready to merge.
struct Plan {
    s: BlockId,
    l1: BlockId,
    m: BlockId,
    l2: BlockId,
    e: BlockId,
    /// Iteration variables of the first and second loop.
    i: String,
    j: String,
    /// Finished matrix read by the second loop, and the value holding the
    /// same element inside the first loop's iteration.
    substitutions: Vec<(String, String)>,
    properties: Vec<LoopProperty>,
}

fn find_plan(instance: &TypedInstance, only_related: bool) -> Option<Plan> {
    for s in instance.body.block_ids() {
        let Some(Instruction::For { end_block, .. }) = instance.body.block(s).terminator() else {
            continue;
        };
        if !matches!(instance.body.block(*end_block).terminator(), Some(Instruction::For { .. })) {
            continue;
        }
        match plan_at(instance, s, only_related) {
            Ok(plan) => return Some(plan),
            Err(r) => log_rejection(PASS, instance.name(), &r),
        }
    }
    None
}

/// Per-dimension role of one index.
#[derive(Debug, Clone, PartialEq)]
enum Role {
    Iteration,
    Constant(f64),
    Free(String),
}

fn roles(
    instance: &TypedInstance,
    indices: &[String],
    iteration: &str,
    inner: &HashSet<String>,
) -> Attempt<Vec<Role>> {
    indices
        .iter()
        .map(|index| {
            if let Some(c) = instance.type_of(index).and_then(|t| t.constant()) {
                Ok(Role::Constant(c.as_f64()))
            } else if index == iteration {
                Ok(Role::Iteration)
            } else if !inner.contains(index) {
                Ok(Role::Free(index.clone()))
            } else {
                reject(format!("index `{}` changes inside the loops", index))
            }
        })
        .collect()
}

fn is_unit(body: &FunctionBody, block: BlockId) -> bool {
    body.block(block).terminator().is_none()
}

fn for_parts(body: &FunctionBody, block: BlockId) -> Option<(&str, &str, &str, BlockId, BlockId, &[LoopProperty])> {
    match body.block(block).terminator() {
        Some(Instruction::For {
            start,
            interval,
            end,
            loop_block,
            end_block,
            properties,
        }) => Some((start, interval, end, *loop_block, *end_block, properties)),
        _ => None,
    }
}

fn has_side_effect(body: &FunctionBody, block: BlockId) -> bool {
    body.block(block)
        .instructions
        .iter()
        .any(|i| i.instruction_type() == InstructionType::SideEffect)
}

fn plan_at(instance: &TypedInstance, s: BlockId, only_related: bool) -> Attempt<Plan> {
    let body = &instance.body;
    let Some((start1, step1, end1, l1, m, props1)) = for_parts(body, s) else {
        return reject("not a for-loop");
    };
    let Some((start2, step2, end2, l2, e, props2)) = for_parts(body, m) else {
        return reject("no for-loop right after");
    };
    if !is_unit(body, l1) || !is_unit(body, l2) {
        return reject("loop body has nested control flow");
    }
    if props1.contains(&LoopProperty::Infusible) || props2.contains(&LoopProperty::Infusible) {
        return reject("loop is marked infusible");
    }
    if !(same_value(instance, start1, start2)
        && same_value(instance, step1, step2)
        && same_value(instance, end1, end2))
    {
        return reject("loop ranges differ");
    }
    if has_side_effect(body, l1) && has_side_effect(body, l2) {
        return reject("both loops have side effects");
    }
    let (Some(i), Some(j)) = (iteration_variable(body.block(l1)), iteration_variable(body.block(l2))) else {
        return reject("missing iteration variable");
    };

    // between the loops: exit phis, copies, and pure code that can run first
    let m_phis: HashSet<String> = phis_of(body.block(m)).into_iter().map(|(o, _, _)| o).collect();
    for inst in &body.block(m).instructions {
        match inst {
            Instruction::Phi { sources, .. } => {
                if sources.iter().any(|b| *b != s && *b != l1) {
                    return reject("exit phi with an unexpected source");
                }
            }
            Instruction::ParallelCopy { inputs, .. } => {
                if let Some(read) = inputs.iter().find(|i| m_phis.contains(*i)) {
                    return reject(format!("second loop starts from `{}`, which the first loop finishes", read));
                }
            }
            Instruction::For { .. } => {}
            _ if is_decoration(inst) => {}
            _ if inst.instruction_type() == InstructionType::NoSideEffect => {
                if let Some(read) = inst.inputs().into_iter().find(|i| m_phis.contains(*i)) {
                    return reject(format!("code between the loops reads `{}`", read));
                }
            }
            _ => return reject("code between the loops has effects"),
        }
    }
    for (output, _, sources) in phis_of(body.block(l2)).into_iter().chain(phis_of(body.block(e))) {
        if sources.iter().any(|b| *b != m && *b != l2) {
            return reject(format!("phi `{}` has an unexpected source", output));
        }
    }

    let mut inner = defined_in(body, &[l1, l2]);
    inner.extend(m_phis.iter().cloned());
    let mut substitutions = Vec::new();
    for (finished, inputs, sources) in phis_of(body.block(m)) {
        let readers: Vec<&Instruction> = body
            .block(l2)
            .instructions
            .iter()
            .filter(|inst| inst.inputs().contains(&finished.as_str()))
            .collect();
        if readers.is_empty() {
            continue;
        }
        let partial = partial_value(instance, l1, &finished, &inputs, &sources)?;
        let written = write_roles(instance, l1, &partial, i, &inner)?;
        for reader in readers {
            let access = access_of(reader)
                .filter(|a| a.kind == AccessKind::Read && a.matrix == finished)
                .filter(|a| !a.indices.contains(&finished));
            let Some(access) = access else {
                return reject(format!("`{}` is used by more than an element read", finished));
            };
            if roles(instance, access.indices, j, &inner)? != written {
                return reject(format!("`{}` is read with other index roles than written", finished));
            }
        }
        substitutions.push((finished, partial));
    }
    if substitutions.is_empty() && only_related {
        return reject("loops share no data");
    }

    let properties = props1.iter().filter(|p| props2.contains(p)).cloned().collect();
    Ok(Plan {
        s,
        l1,
        m,
        l2,
        e,
        i: i.to_string(),
        j: j.to_string(),
        substitutions,
        properties,
    })
}

/// Value inside the first loop that `finished` takes after the last
/// iteration: what the loop copies into the exit phi's back-edge input.
fn partial_value(
    instance: &TypedInstance,
    l1: BlockId,
    finished: &str,
    inputs: &[String],
    sources: &[BlockId],
) -> Attempt<String> {
    let body = &instance.body;
    let Some(k) = sources.iter().position(|b| *b == l1) else {
        return reject(format!("`{}` gets no value from the first loop", finished));
    };
    let Some(partial) = copied_from(body, l1, &inputs[k]) else {
        return reject(format!("`{}` is not copied out of the first loop", finished));
    };
    match (instance.type_of(finished), instance.type_of(partial)) {
        (Some(a), Some(b)) if a.as_matrix().is_some() && a.same_storage(b) => Ok(partial.to_string()),
        _ => reject(format!("`{}` is not a matrix built by the first loop", finished)),
    }
}

/// Index roles shared by every write building `partial` in the first loop.
fn write_roles(
    instance: &TypedInstance,
    l1: BlockId,
    partial: &str,
    iteration: &str,
    inner: &HashSet<String>,
) -> Attempt<Vec<Role>> {
    let block = instance.body.block(l1);
    let mut shared: Option<Vec<Role>> = None;
    let mut current = partial.to_string();
    loop {
        let definition = block
            .instructions
            .iter()
            .find(|inst| inst.outputs().contains(&current.as_str()));
        let Some(inst) = definition else {
            return reject(format!("`{}` is not built inside the first loop", current));
        };
        if let Instruction::Phi { inputs, sources, .. } = inst {
            // the header phi must carry `partial` around the loop
            let back = sources.iter().position(|b| *b == l1).map(|k| inputs[k].as_str());
            if back.and_then(|b| copied_from(&instance.body, l1, b)) != Some(partial) {
                return reject(format!("`{}` is not carried by the first loop", partial));
            }
            break;
        }
        let Some(access) = access_of(inst).filter(|a| a.kind == AccessKind::Write) else {
            return reject(format!("`{}` is built by more than element writes", partial));
        };
        let r = roles(instance, access.indices, iteration, inner)?;
        if !r.contains(&Role::Iteration) {
            return reject(format!("a write to `{}` does not index by the iteration", partial));
        }
        match &shared {
            Some(s) if *s != r => return reject(format!("writes to `{}` index differently", partial)),
            _ => shared = Some(r),
        }
        current = access.matrix.to_string();
    }
    shared.map_or_else(|| reject(format!("the first loop never writes `{}`", partial)), Ok)
}

fn fuse(instance: &mut TypedInstance, plan: Plan) {
    let body = &mut instance.body;
    let remap = |b: BlockId| {
        if b == plan.m {
            plan.s
        } else if b == plan.l2 {
            plan.l1
        } else {
            b
        }
    };

    // the block between the loops empties into the preheader and the exit
    let m_copies = take_copies(body, plan.m);
    let mut m_phis = Vec::new();
    let mut early = Vec::new();
    for inst in std::mem::take(&mut body.block_mut(plan.m).instructions) {
        match inst {
            Instruction::Phi { .. } => m_phis.push(inst),
            Instruction::For { .. } => {}
            other => early.push(other),
        }
    }
    let at = code_end(body.block(plan.s));
    body.block_mut(plan.s).instructions.splice(at..at, early);
    add_copies(body, plan.s, m_copies);

    // second body, reading the partial matrices and the first iteration variable
    let l2_copies = take_copies(body, plan.l2);
    let mut l2_phis = Vec::new();
    let mut l2_code = Vec::new();
    for mut inst in std::mem::take(&mut body.block_mut(plan.l2).instructions) {
        match inst {
            Instruction::Phi { .. } => {
                inst.remap_blocks(remap);
                l2_phis.push(inst);
            }
            Instruction::Iter { .. } => {}
            _ => {
                inst.rename_inputs(|n| {
                    if n == plan.j {
                        return Some(plan.i.clone());
                    }
                    plan.substitutions
                        .iter()
                        .find(|(finished, _)| finished == n)
                        .map(|(_, partial)| partial.clone())
                });
                l2_code.push(inst);
            }
        }
    }
    let l2_copies: Vec<(String, String)> = l2_copies
        .into_iter()
        .map(|(o, i)| if i == plan.j { (o, plan.i.clone()) } else { (o, i) })
        .collect();

    let l1_copies = take_copies(body, plan.l1);
    let (l1_phis, l1_code): (Vec<Instruction>, Vec<Instruction>) =
        std::mem::take(&mut body.block_mut(plan.l1).instructions)
            .into_iter()
            .partition(|i| matches!(i, Instruction::Phi { .. }));
    let fused = &mut body.block_mut(plan.l1).instructions;
    fused.extend(l1_phis);
    fused.extend(l2_phis);
    fused.extend(l1_code);
    fused.extend(l2_code);
    add_copies(body, plan.l1, l1_copies.into_iter().chain(l2_copies).collect());

    let exit = &mut body.block_mut(plan.e).instructions;
    for inst in exit.iter_mut() {
        if matches!(inst, Instruction::Phi { .. }) {
            inst.remap_blocks(remap);
        }
    }
    exit.splice(0..0, m_phis);

    if let Some(Instruction::For {
        end_block, properties, ..
    }) = body.block_mut(plan.s).instructions.last_mut()
    {
        *end_block = plan.e;
        *properties = plan.properties;
    }
    instance.types.shift_remove(&plan.j);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use matisse_ast::build::*;
    use matisse_ast::{BinaryOp, FunctionNode, Stmt};
    use matisse_ssa::validate;

    /// `b = f(x)`: the first loop builds `a`, the second reads it at `j`.
    fn producer_consumer(first: Vec<LoopProperty>, second: Vec<LoopProperty>, read: Stmt) -> FunctionNode {
        function(
            "f",
            &["x"],
            &["b"],
            vec![
                for_with(
                    "i",
                    range(num("1"), num("3")),
                    vec![assign_index(
                        "a",
                        vec![ident("i")],
                        binary(BinaryOp::Add, apply("x", vec![ident("i")]), num("1")),
                    )],
                    first,
                ),
                for_with("j", range(num("1"), num("3")), vec![read], second),
            ],
        )
    }

    fn double_at_j() -> Stmt {
        assign_index(
            "b",
            vec![ident("j")],
            binary(BinaryOp::Mul, apply("a", vec![ident("j")]), num("2")),
        )
    }

    fn loops(inst: &TypedInstance) -> usize {
        inst.body.count_instructions(|i| matches!(i, Instruction::For { .. }))
    }

    #[test]
    fn producer_and_consumer_fuse() {
        let (engine, _) = engine_for(vec![producer_consumer(Vec::new(), Vec::new(), double_at_j())]);
        let mut inst = typed(&engine, "f", &[int32_row(3)]);
        assert_eq!(loops(&inst), 2);

        let outcome = LoopFusion.apply(&mut inst, &PassContext::new(&engine)).unwrap();
        assert!(outcome.changed());
        assert_eq!(loops(&inst), 1);
        assert_eq!(inst.body.count_instructions(|i| matches!(i, Instruction::Iter { .. })), 1);
        validate(&inst.body).unwrap();
    }

    #[test]
    fn infusible_loops_stay_apart() {
        let f = producer_consumer(vec![LoopProperty::Infusible], Vec::new(), double_at_j());
        let (engine, _) = engine_for(vec![f]);
        let mut inst = typed(&engine, "f", &[int32_row(3)]);
        let outcome = LoopFusion.apply(&mut inst, &PassContext::new(&engine)).unwrap();
        assert_eq!(outcome, PassOutcome::Unchanged);
        assert_eq!(loops(&inst), 2);
    }

    #[test]
    fn shifted_reads_block_fusion() {
        // b(j) = a(1) * 2 reads an element written in the first iteration only
        let shifted = assign_index(
            "b",
            vec![ident("j")],
            binary(BinaryOp::Mul, apply("a", vec![num("1")]), num("2")),
        );
        let (engine, _) = engine_for(vec![producer_consumer(Vec::new(), Vec::new(), shifted)]);
        let mut inst = typed(&engine, "f", &[int32_row(3)]);
        let outcome = LoopFusion.apply(&mut inst, &PassContext::new(&engine)).unwrap();
        assert_eq!(outcome, PassOutcome::Unchanged);
    }

    #[test]
    fn common_properties_survive() {
        let f = producer_consumer(
            vec![LoopProperty::EstimatedIterations(3), LoopProperty::Parallel],
            vec![LoopProperty::EstimatedIterations(3)],
            double_at_j(),
        );
        let (engine, _) = engine_for(vec![f]);
        let mut inst = typed(&engine, "f", &[int32_row(3)]);
        LoopFusion.apply(&mut inst, &PassContext::new(&engine)).unwrap();
        let properties = inst
            .body
            .instructions()
            .find_map(|(_, _, i)| match i {
                Instruction::For { properties, .. } => Some(properties.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(properties, vec![LoopProperty::EstimatedIterations(3)]);
    }
}
