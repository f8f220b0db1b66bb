// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Control-flow checks run before allocation.

use matisse_ssa::cfg::{program_order, ControlFlowGraph};
use matisse_ssa::{BlockId, FunctionBody, Instruction};

use crate::error::UnssaError;

/// Checks that every block reference exists, that control instructions end
/// their block and that each phi has one input per predecessor. Returns the
/// graph the allocator works on.
pub fn check_control_flow(body: &FunctionBody) -> Result<ControlFlowGraph, UnssaError> {
    let invalid = |message: String, line: u32| UnssaError::InvalidControlFlow {
        function: body.name.clone(),
        message,
        line,
    };

    let count = body.blocks.len();
    for (block, position, inst) in body.instructions() {
        if let Some(bad) = inst.referenced_blocks().into_iter().find(|b| b.index() >= count) {
            return Err(invalid(
                format!("{} refers to missing block {}", block, bad),
                line_at(body, block, position),
            ));
        }
        if inst.is_control() && position + 1 != body.block(block).instructions.len() {
            return Err(invalid(
                format!("control instruction in the middle of {}", block),
                line_at(body, block, position),
            ));
        }
    }

    let cfg = ControlFlowGraph::build(body);
    for block in program_order(body) {
        let preds = cfg.predecessors(block);
        for (position, inst) in body.block(block).instructions.iter().enumerate() {
            let Instruction::Phi {
                output,
                inputs,
                sources,
            } = inst
            else {
                continue;
            };
            if inputs.len() != sources.len() || sources.len() != preds.len() {
                return Err(UnssaError::PhiArity {
                    function: body.name.clone(),
                    phi: output.clone(),
                    inputs: inputs.len(),
                    predecessors: preds.len(),
                    line: line_at(body, block, position),
                });
            }
            if let Some(stray) = sources.iter().find(|s| !preds.contains(s)) {
                return Err(invalid(
                    format!("phi `{}` names {}, which does not reach {}", output, stray, block),
                    line_at(body, block, position),
                ));
            }
        }
    }
    Ok(cfg)
}

/// Source line of the instruction at `position`, 0 when the block has no
/// `Line` before it.
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::join;

    #[test]
    fn well_formed_join_passes() {
        let inst = join();
        let cfg = check_control_flow(&inst.body).unwrap();
        assert_eq!(cfg.predecessors(BlockId(3)), &[BlockId(1), BlockId(2)]);
    }

    #[test]
    fn missing_blocks_are_reported() {
        let mut inst = join();
        inst.body.block_mut(BlockId::ENTRY).instructions.pop();
        inst.body.block_mut(BlockId::ENTRY).push(Instruction::Branch {
            condition: "c$1".into(),
            true_block: BlockId(1),
            false_block: BlockId(9),
            end_block: BlockId(3),
        });
        let err = check_control_flow(&inst.body).unwrap_err();
        assert!(matches!(err, UnssaError::InvalidControlFlow { .. }));
        assert!(err.to_string().contains("#9"));
    }

    #[test]
    fn phi_arity_must_match_predecessors() {
        let mut inst = join();
        let phi = &mut inst.body.block_mut(BlockId(3)).instructions[0];
        if let Instruction::Phi { inputs, sources, .. } = phi {
            inputs.pop();
            sources.pop();
        }
        let err = check_control_flow(&inst.body).unwrap_err();
        assert!(matches!(
            err,
            UnssaError::PhiArity {
                inputs: 1,
                predecessors: 2,
                ..
            }
        ));
    }
}
