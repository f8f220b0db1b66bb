// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Instruction shapes shared by several passes.

use std::collections::HashSet;

use matisse_cir::builtins;
use matisse_infer::TypedInstance;
use matisse_ssa::{Block, BlockId, FunctionBody, Instruction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AccessKind {
    Read,
    Write,
}

/// An element read or write, before or after lowering.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Access<'a> {
    pub kind: AccessKind,
    pub matrix: &'a str,
    pub indices: &'a [String],
}

pub(crate) fn access_of(inst: &Instruction) -> Option<Access<'_>> {
    match inst {
        Instruction::MatrixGet { matrix, indices, .. } => Some(Access {
            kind: AccessKind::Read,
            matrix,
            indices,
        }),
        Instruction::MatrixSet { matrix, indices, .. } => Some(Access {
            kind: AccessKind::Write,
            matrix,
            indices,
        }),
        Instruction::TypedCall { function, inputs, .. }
            if function == builtins::MATRIX_GET || function == builtins::SIMPLE_GET =>
        {
            let (matrix, indices) = inputs.split_first()?;
            Some(Access {
                kind: AccessKind::Read,
                matrix,
                indices,
            })
        }
        Instruction::TypedSet {
            function,
            matrix,
            inputs,
            ..
        } if function == builtins::MATRIX_SET
            || function == builtins::MATRIX_SET_GROW
            || function == builtins::SIMPLE_SET =>
        {
            let (_, indices) = inputs.split_last()?;
            Some(Access {
                kind: AccessKind::Write,
                matrix,
                indices,
            })
        }
        _ => None,
    }
}

/// Matrix an instruction writes in place, if any.
pub(crate) fn written_matrix(inst: &Instruction) -> Option<&str> {
    match inst {
        Instruction::MatrixSet { matrix, .. }
        | Instruction::TypedSet { matrix, .. }
        | Instruction::SetAll { matrix, .. } => Some(matrix),
        _ => None,
    }
}

/// Source line of the instruction at `position`, from the nearest
/// preceding `Line` in its block.
pub(crate) fn line_at(body: &FunctionBody, block: BlockId, position: usize) -> u32 {
    body.block(block).instructions[..position]
        .iter()
        .rev()
        .find_map(|i| match i {
            Instruction::Line { line } => Some(*line),
            _ => None,
        })
        .unwrap_or(0)
}

/// Whether two names hold the same value: the same name, or equal constants.
pub(crate) fn same_value(instance: &TypedInstance, a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    let constant = |n: &str| instance.type_of(n).and_then(|t| t.constant());
    match (constant(a), constant(b)) {
        (Some(x), Some(y)) => x.as_f64() == y.as_f64(),
        _ => false,
    }
}

/// Every name defined in `blocks`.
pub(crate) fn defined_in(body: &FunctionBody, blocks: &[BlockId]) -> HashSet<String> {
    blocks
        .iter()
        .flat_map(|b| body.block(*b).instructions.iter())
        .flat_map(|i| i.outputs())
        .map(str::to_string)
        .collect()
}

/// Locations reading `name`.
pub(crate) fn uses_of(body: &FunctionBody, name: &str) -> Vec<(BlockId, usize)> {
    body.instructions()
        .filter(|(_, _, i)| i.inputs().contains(&name))
        .map(|(b, p, _)| (b, p))
        .collect()
}

/// Position of the parallel copy closing `block`, if there is one.
pub(crate) fn copy_position(block: &Block) -> Option<usize> {
    let at = block.insertion_point();
    at.checked_sub(1)
        .filter(|p| matches!(block.instructions[*p], Instruction::ParallelCopy { .. }))
}

/// Where code must go to run before the block's closing copies and terminator.
pub(crate) fn code_end(block: &Block) -> usize {
    copy_position(block).unwrap_or_else(|| block.insertion_point())
}

/// Adds `(output, input)` pairs to the copy closing `block`.
pub(crate) fn add_copies(body: &mut FunctionBody, block: BlockId, pairs: Vec<(String, String)>) {
    if pairs.is_empty() {
        return;
    }
    let b = body.block_mut(block);
    match copy_position(b) {
        Some(p) => {
            if let Instruction::ParallelCopy { outputs, inputs } = &mut b.instructions[p] {
                for (o, i) in pairs {
                    outputs.push(o);
                    inputs.push(i);
                }
            }
        }
        None => {
            let at = b.insertion_point();
            let (outputs, inputs) = pairs.into_iter().unzip();
            b.instructions
                .insert(at, Instruction::ParallelCopy { outputs, inputs });
        }
    }
}

/// Removes and returns the pairs of the copy closing `block`.
pub(crate) fn take_copies(body: &mut FunctionBody, block: BlockId) -> Vec<(String, String)> {
    let b = body.block_mut(block);
    match copy_position(b) {
        Some(p) => match b.instructions.remove(p) {
            Instruction::ParallelCopy { outputs, inputs } => outputs.into_iter().zip(inputs).collect(),
            _ => Vec::new(),
        },
        None => Vec::new(),
    }
}

/// Input of the copy pair defining `name` in `block`.
pub(crate) fn copied_from<'b>(body: &'b FunctionBody, block: BlockId, name: &str) -> Option<&'b str> {
    body.block(block).instructions.iter().find_map(|i| match i {
        Instruction::ParallelCopy { outputs, inputs } => outputs
            .iter()
            .position(|o| o == name)
            .map(|k| inputs[k].as_str()),
        _ => None,
    })
}

/// `(output, inputs, sources)` of every phi in `block`.
pub(crate) fn phis_of(block: &Block) -> Vec<(String, Vec<String>, Vec<BlockId>)> {
    block
        .instructions
        .iter()
        .filter_map(|i| match i {
            Instruction::Phi {
                output,
                inputs,
                sources,
            } => Some((output.clone(), inputs.clone(), sources.clone())),
            _ => None,
        })
        .collect()
}

/// Output of the `Iter` in a for-loop body block.
pub(crate) fn iteration_variable(block: &Block) -> Option<&str> {
    block.instructions.iter().find_map(|i| match i {
        Instruction::Iter { output } => Some(output.as_str()),
        _ => None,
    })
}

pub(crate) fn is_decoration(inst: &Instruction) -> bool {
    matches!(inst, Instruction::Line { .. } | Instruction::Comment { .. })
}
