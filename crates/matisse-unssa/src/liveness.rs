// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Block-level liveness over the reconstructed control flow.
//!
//! A phi reads its input at the end of the corresponding source block, not
//! at the start of its own block. Return values stay live until the function
//! exits. A for loop keeps its step, its bound and its iteration variable
//! live through the whole body, since the emitted C loop reads them on
//! every iteration.

use std::collections::HashSet;

use matisse_ssa::cfg::{program_order, region_blocks, region_end, ControlFlowGraph};
use matisse_ssa::{Block, BlockId, FunctionBody, Instruction, RETURN_SUFFIX};
use tracing::trace;

use crate::error::UnssaError;

#[derive(Debug, Clone, Default)]
pub struct Liveness {
    live_in: Vec<HashSet<String>>,
    live_out: Vec<HashSet<String>>,
    pinned: Vec<HashSet<String>>,
}

impl Liveness {
    pub fn compute(body: &FunctionBody, cfg: &ControlFlowGraph) -> Result<Self, UnssaError> {
        let count = body.blocks.len();
        let order = program_order(body);
        let pinned = pinned_names(body, &order);

        let mut exit_live: Vec<HashSet<String>> = vec![HashSet::new(); count];
        if let Some(exit) = region_end(body, BlockId::ENTRY) {
            exit_live[exit.index()] = body
                .instructions()
                .flat_map(|(_, _, i)| i.outputs())
                .filter(|o| o.ends_with(RETURN_SUFFIX))
                .map(str::to_string)
                .collect();
        }

        let mut live = Liveness {
            live_in: vec![HashSet::new(); count],
            live_out: vec![HashSet::new(); count],
            pinned,
        };
        let mut rounds = 0;
        loop {
            rounds += 1;
            let mut changed = false;
            for &block in order.iter().rev() {
                let mut out: HashSet<String> = exit_live[block.index()].clone();
                out.extend(live.pinned[block.index()].iter().cloned());
                for &succ in cfg.successors(block) {
                    out.extend(live.live_in[succ.index()].iter().cloned());
                    out.extend(phi_inputs_from(body.block(succ), block).map(str::to_string));
                }
                let inn = transfer(body.block(block), out.clone());
                if out != live.live_out[block.index()] || inn != live.live_in[block.index()] {
                    live.live_out[block.index()] = out;
                    live.live_in[block.index()] = inn;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        trace!(function = %body.name, rounds, "liveness converged");

        let mut undefined: Vec<&String> = live.live_in[BlockId::ENTRY.index()].iter().collect();
        undefined.sort();
        if let Some(variable) = undefined.first() {
            return Err(UnssaError::LiveAtEntry {
                function: body.name.clone(),
                variable: variable.to_string(),
            });
        }
        Ok(live)
    }

    /// Names live at the start of `block`, after its phis.
    pub fn live_in(&self, block: BlockId) -> &HashSet<String> {
        &self.live_in[block.index()]
    }

    pub fn live_out(&self, block: BlockId) -> &HashSet<String> {
        &self.live_out[block.index()]
    }

    /// Names that must stay live through all of `block`, except before
    /// their own definition.
    pub fn pinned(&self, block: BlockId) -> &HashSet<String> {
        &self.pinned[block.index()]
    }
}

fn pinned_names(body: &FunctionBody, order: &[BlockId]) -> Vec<HashSet<String>> {
    let mut pinned = vec![HashSet::new(); body.blocks.len()];
    for &block in order {
        let Some(Instruction::For {
            interval,
            end,
            loop_block,
            ..
        }) = body.block(block).terminator()
        else {
            continue;
        };
        let iteration = body
            .block(*loop_block)
            .instructions
            .iter()
            .find_map(|i| match i {
                Instruction::Iter { output } => Some(output),
                _ => None,
            });
        for inner in region_blocks(body, *loop_block) {
            let set: &mut HashSet<String> = &mut pinned[inner.index()];
            set.insert(interval.clone());
            set.insert(end.clone());
            if let Some(iteration) = iteration {
                set.insert(iteration.clone());
            }
        }
    }
    pinned
}

/// Inputs of `block`'s phis that arrive from `source`.
pub(crate) fn phi_inputs_from(block: &Block, source: BlockId) -> impl Iterator<Item = &str> {
    block.phis().filter_map(move |phi| match phi {
        Instruction::Phi { inputs, sources, .. } => sources
            .iter()
            .position(|s| *s == source)
            .and_then(|k| inputs.get(k))
            .map(String::as_str),
        _ => None,
    })
}

/// Live set at the start of `block` given the set at its end.
fn transfer(block: &Block, mut live: HashSet<String>) -> HashSet<String> {
    for inst in block.instructions.iter().rev() {
        if let Instruction::Phi { output, .. } = inst {
            live.remove(output);
            continue;
        }
        for output in inst.outputs() {
            live.remove(output);
        }
        for input in inst.inputs() {
            live.insert(input.to_string());
        }
    }
    live
}
