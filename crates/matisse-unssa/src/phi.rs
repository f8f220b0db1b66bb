// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Phi elimination.

use indexmap::IndexMap;
use matisse_ssa::{BlockId, FunctionBody, Instruction};
use tracing::debug;

use crate::VariableAllocation;

/// Removes every phi. An input that did not end up in its phi's variable is
/// copied at the end of the block it arrives from, before that block's
/// control instruction. Returns the number of copies inserted.
pub fn eliminate_phis(body: &mut FunctionBody, allocation: &VariableAllocation) -> usize {
    let mut copies: IndexMap<BlockId, (Vec<String>, Vec<String>)> = IndexMap::new();
    for block in body.block_ids().collect::<Vec<_>>() {
        let instructions = &mut body.block_mut(block).instructions;
        let phis: Vec<Instruction> = instructions
            .iter()
            .filter(|i| matches!(i, Instruction::Phi { .. }))
            .cloned()
            .collect();
        instructions.retain(|i| !matches!(i, Instruction::Phi { .. }));
        for phi in phis {
            let Instruction::Phi {
                output,
                inputs,
                sources,
            } = phi
            else {
                continue;
            };
            for (input, source) in inputs.into_iter().zip(sources) {
                if allocation.same_variable(&output, &input) {
                    continue;
                }
                let entry = copies.entry(source).or_default();
                entry.0.push(output.clone());
                entry.1.push(input);
            }
        }
    }

    let mut inserted = 0;
    for (source, (outputs, inputs)) in copies {
        inserted += outputs.len();
        let block = body.block_mut(source);
        let at = block.insertion_point();
        block
            .instructions
            .insert(at, Instruction::ParallelCopy { outputs, inputs });
    }
    debug!(function = %body.name, copies = inserted, "phis eliminated");
    inserted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocate;
    use crate::test_support::*;

    #[test]
    fn coalesced_phis_vanish_without_copies() {
        let mut inst = accumulate();
        let allocation = allocate(&inst).unwrap();
        let copies = eliminate_phis(&mut inst.body, &allocation);
        assert_eq!(copies, 0);
        assert_eq!(inst.body.count_instructions(|i| matches!(i, Instruction::Phi { .. })), 0);
    }

    #[test]
    fn interfering_input_is_copied_in_its_source_block() {
        let mut inst = join();
        let allocation = allocate(&inst).unwrap();
        assert!(!allocation.same_variable("y$3", "x$1"));
        assert!(allocation.same_variable("y$3", "z$1"));

        let copies = eliminate_phis(&mut inst.body, &allocation);
        assert_eq!(copies, 1);
        assert_eq!(
            inst.body.block(BlockId(1)).instructions,
            vec![Instruction::ParallelCopy {
                outputs: vec!["y$3".into()],
                inputs: vec!["x$1".into()],
            }]
        );
        assert!(!inst
            .body
            .block(BlockId(2))
            .instructions
            .iter()
            .any(|i| matches!(i, Instruction::ParallelCopy { .. })));
    }
}
