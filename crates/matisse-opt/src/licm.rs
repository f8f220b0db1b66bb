// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Loop-invariant code motion.
//!
//! Pure instructions on a loop's straight-line spine whose inputs do not
//! change inside the loop move to the end of the preheader. A matrix that
//! the loop later writes in place stays put: hoisting it would hand every
//! iteration the buffer the previous one modified. A call to a function that
//! may abort on its inputs is not pure: the loop might never have run it.

use std::collections::HashSet;

use matisse_infer::TypedInstance;
use matisse_ssa::cfg::region_blocks;
use matisse_ssa::{AssignValue, BlockId, FunctionBody, Instruction, InstructionType};
use tracing::{debug, trace};

use crate::error::OptError;
use crate::pass::{log_rejection, reject, Attempt, PassContext, PassOutcome, PostTypePass};
use crate::pattern::{code_end, defined_in, is_decoration, written_matrix};

const PASS: &str = "loop_invariant_code_motion";

pub struct LoopInvariantCodeMotion;

impl PostTypePass for LoopInvariantCodeMotion {
    fn name(&self) -> &'static str {
        PASS
    }

    fn optimization_id(&self) -> Option<&'static str> {
        Some("loop_invariant_code_motion")
    }

    fn apply(&self, instance: &mut TypedInstance, _ctx: &PassContext<'_>) -> Result<PassOutcome, OptError> {
        let mut total = 0;
        loop {
            let moved = hoist_once(instance);
            if moved == 0 {
                break;
            }
            total += moved;
        }
        debug!(function = %instance.name(), hoisted = total, "loop-invariant instructions hoisted");
        Ok(PassOutcome::from_changed(total > 0))
    }
}

/// `(preheader, loop block)` of every loop.
fn loops(body: &FunctionBody) -> Vec<(BlockId, BlockId)> {
    body.block_ids()
        .filter_map(|b| match body.block(b).terminator() {
            Some(Instruction::For { loop_block, .. } | Instruction::While { loop_block, .. }) => {
                Some((b, *loop_block))
            }
            _ => None,
        })
        .collect()
}

/// Blocks every iteration that gets past the header runs in order: the loop
/// block, then the continuation of each construct it ends with.
fn spine(body: &FunctionBody, loop_block: BlockId) -> Vec<BlockId> {
    let mut blocks = vec![loop_block];
    let mut block = loop_block;
    while let Some(next) = body.block(block).terminator().and_then(Instruction::end_block) {
        blocks.push(next);
        block = next;
    }
    blocks
}

fn hoist_once(instance: &mut TypedInstance) -> usize {
    let mut moved_total = 0;
    for (preheader, loop_block) in loops(&instance.body) {
        let region = region_blocks(&instance.body, loop_block);
        let defined = defined_in(&instance.body, &region);
        let mut invariant: HashSet<String> = HashSet::new();
        let mut moved = Vec::new();

        for block in spine(&instance.body, loop_block) {
            let mut picked = Vec::new();
            for (position, inst) in instance.body.block(block).instructions.iter().enumerate() {
                match hoistable(&instance.body, &region, &defined, &invariant, inst) {
                    Ok(()) => {
                        invariant.extend(inst.outputs().into_iter().map(str::to_string));
                        picked.push(position);
                    }
                    Err(r) => {
                        if inst.instruction_type() == InstructionType::NoSideEffect {
                            log_rejection(PASS, instance.name(), &r);
                        }
                    }
                }
            }
            let instructions = &mut instance.body.block_mut(block).instructions;
            let mut taken: Vec<Instruction> = picked
                .into_iter()
                .rev()
                .map(|position| instructions.remove(position))
                .collect();
            taken.reverse();
            moved.extend(taken);
        }

        if moved.is_empty() {
            continue;
        }
        trace!(function = %instance.name(), preheader = %preheader, count = moved.len(), "hoisting");
        moved_total += moved.len();
        let at = code_end(instance.body.block(preheader));
        instance
            .body
            .block_mut(preheader)
            .instructions
            .splice(at..at, moved);
    }
    moved_total
}

fn hoistable(
    body: &FunctionBody,
    region: &[BlockId],
    defined: &HashSet<String>,
    invariant: &HashSet<String>,
    inst: &Instruction,
) -> Attempt<()> {
    if inst.instruction_type() != InstructionType::NoSideEffect || is_decoration(inst) {
        return reject("not a pure instruction");
    }
    match inst {
        Instruction::Phi { .. } | Instruction::ParallelCopy { .. } => return reject("loop-carried"),
        Instruction::ReadGlobal { .. } => return reject("globals may change inside the loop"),
        Instruction::Assign {
            value: AssignValue::Undefined,
            ..
        } => return reject("placeholder"),
        _ => {}
    }
    for input in inst.inputs() {
        if defined.contains(input) && !invariant.contains(input) {
            return reject(format!("`{}` changes inside the loop", input));
        }
    }
    for output in inst.outputs() {
        if written_in_loop(body, region, output) {
            return reject(format!("`{}` is written in place inside the loop", output));
        }
    }
    Ok(())
}

/// Whether `name`, or a copy or merge of it, is the target of an in-place
/// write inside `region`.
fn written_in_loop(body: &FunctionBody, region: &[BlockId], name: &str) -> bool {
    let mut aliases: HashSet<String> = HashSet::from([name.to_string()]);
    let mut pending = vec![name.to_string()];
    while let Some(current) = pending.pop() {
        for block in region {
            for inst in &body.block(*block).instructions {
                if written_matrix(inst) == Some(current.as_str()) {
                    return true;
                }
                let derived: Vec<&str> = match inst {
                    Instruction::Phi { output, inputs, .. } if inputs.contains(&current) => vec![output.as_str()],
                    Instruction::Assign {
                        output,
                        value: AssignValue::Variable(v),
                    } if *v == current => vec![output.as_str()],
                    Instruction::ParallelCopy { outputs, inputs } => outputs
                        .iter()
                        .zip(inputs)
                        .filter(|(_, i)| **i == current)
                        .map(|(o, _)| o.as_str())
                        .collect(),
                    _ => Vec::new(),
                };
                for d in derived {
                    if aliases.insert(d.to_string()) {
                        pending.push(d.to_string());
                    }
                }
            }
        }
    }
    false
}
