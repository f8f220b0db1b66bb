// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Control-flow edges derived from the block tree.
//!
//! Edges are never stored; they follow from the control instructions:
//!
//! * `Branch` enters both arms; each arm that falls through reaches the end block.
//! * `For` enters the body or skips it; the body end loops back and may exit.
//! * `While` always enters the body; the body end loops back, and only
//!   `Break` reaches the end block.
//! * `Break` and `Continue` jump to the innermost loop's end and body blocks.
//!   A `Continue` in a `For` may also exit, since the loop test follows it.

use std::collections::HashMap;

use crate::body::{BlockId, FunctionBody};
use crate::instruction::Instruction;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControlFlowGraph {
    predecessors: HashMap<BlockId, Vec<BlockId>>,
    successors: HashMap<BlockId, Vec<BlockId>>,
}

impl ControlFlowGraph {
    pub fn build(body: &FunctionBody) -> Self {
        let mut cfg = ControlFlowGraph::default();
        let mut walker = Walker {
            body,
            cfg: &mut cfg,
            loops: Vec::new(),
        };
        walker.region(BlockId::ENTRY);
        cfg
    }

    /// Predecessors in edge-creation order.
    pub fn predecessors(&self, block: BlockId) -> &[BlockId] {
        self.predecessors.get(&block).map_or(&[], Vec::as_slice)
    }

    pub fn successors(&self, block: BlockId) -> &[BlockId] {
        self.successors.get(&block).map_or(&[], Vec::as_slice)
    }

    /// Blocks reachable from the entry.
    pub fn is_reachable(&self, block: BlockId) -> bool {
        block == BlockId::ENTRY || !self.predecessors(block).is_empty()
    }

    fn edge(&mut self, from: BlockId, to: BlockId) {
        let preds = self.predecessors.entry(to).or_default();
        if !preds.contains(&from) {
            preds.push(from);
        }
        let succs = self.successors.entry(from).or_default();
        if !succs.contains(&to) {
            succs.push(to);
        }
    }
}

struct Walker<'a> {
    body: &'a FunctionBody,
    cfg: &'a mut ControlFlowGraph,
    /// Enclosing loops, innermost last.
    loops: Vec<LoopEdges>,
}

#[derive(Clone, Copy)]
struct LoopEdges {
    body: BlockId,
    end: BlockId,
    /// `For` loops test their bound after a continue.
    exits_on_continue: bool,
}

impl Walker<'_> {
    /// Walks a region starting at `start`. Returns the block control falls
    /// out of, or `None` if the region ends with a jump.
    fn region(&mut self, start: BlockId) -> Option<BlockId> {
        let body = self.body;
        let mut block = start;
        loop {
            let Some(last) = body.blocks.get(block.index()).and_then(|b| b.terminator()) else {
                return Some(block);
            };
            match last {
                Instruction::Branch {
                    true_block,
                    false_block,
                    end_block,
                    ..
                } => {
                    for arm in [*true_block, *false_block] {
                        self.cfg.edge(block, arm);
                        if let Some(out) = self.region(arm) {
                            self.cfg.edge(out, *end_block);
                        }
                    }
                    block = *end_block;
                }
                Instruction::For {
                    loop_block,
                    end_block,
                    ..
                } => {
                    self.cfg.edge(block, *loop_block);
                    self.cfg.edge(block, *end_block);
                    self.loops.push(LoopEdges {
                        body: *loop_block,
                        end: *end_block,
                        exits_on_continue: true,
                    });
                    let out = self.region(*loop_block);
                    self.loops.pop();
                    if let Some(out) = out {
                        self.cfg.edge(out, *loop_block);
                        self.cfg.edge(out, *end_block);
                    }
                    block = *end_block;
                }
                Instruction::While {
                    loop_block,
                    end_block,
                } => {
                    self.cfg.edge(block, *loop_block);
                    self.loops.push(LoopEdges {
                        body: *loop_block,
                        end: *end_block,
                        exits_on_continue: false,
                    });
                    let out = self.region(*loop_block);
                    self.loops.pop();
                    if let Some(out) = out {
                        self.cfg.edge(out, *loop_block);
                    }
                    block = *end_block;
                }
                Instruction::Break => {
                    if let Some(l) = self.loops.last() {
                        self.cfg.edge(block, l.end);
                    }
                    return None;
                }
                Instruction::Continue => {
                    if let Some(&l) = self.loops.last() {
                        self.cfg.edge(block, l.body);
                        if l.exits_on_continue {
                            self.cfg.edge(block, l.end);
                        }
                    }
                    return None;
                }
                _ => return Some(block),
            }
        }
    }
}

/// Block control falls out of when running the region starting at `start`,
/// or `None` if every path ends in `break` or `continue`.
pub fn region_end(body: &FunctionBody, start: BlockId) -> Option<BlockId> {
    let mut block = start;
    loop {
        match body.block(block).terminator() {
            Some(Instruction::Break | Instruction::Continue) => return None,
            Some(inst) => match inst.end_block() {
                Some(end) => block = end,
                None => return Some(block),
            },
            None => return Some(block),
        }
    }
}

/// Every block of the region starting at `start`, nested ones included,
/// in program order.
pub fn region_blocks(body: &FunctionBody, start: BlockId) -> Vec<BlockId> {
    let mut out = Vec::new();
    collect_region(body, start, &mut out);
    out
}

fn collect_region(body: &FunctionBody, start: BlockId, out: &mut Vec<BlockId>) {
    let mut block = start;
    loop {
        if out.contains(&block) {
            return;
        }
        out.push(block);
        let Some(inst) = body.block(block).terminator() else {
            return;
        };
        for owned in inst.owned_blocks() {
            collect_region(body, owned, out);
        }
        match inst.end_block() {
            Some(end) => block = end,
            None => return,
        }
    }
}

/// Every block, each listed after the block owning or preceding it.
pub fn program_order(body: &FunctionBody) -> Vec<BlockId> {
    region_blocks(body, BlockId::ENTRY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::FunctionBody;

    fn for_body() -> FunctionBody {
        // #0: for -> loop #1, end #2
        let mut body = FunctionBody::new("f", "f.m");
        let l = body.add_block();
        let e = body.add_block();
        body.block_mut(BlockId::ENTRY).push(Instruction::For {
            start: "a".into(),
            interval: "b".into(),
            end: "c".into(),
            loop_block: l,
            end_block: e,
            properties: Vec::new(),
        });
        body
    }

    #[test]
    fn for_loop_edges() {
        let body = for_body();
        let cfg = ControlFlowGraph::build(&body);
        assert_eq!(cfg.predecessors(BlockId(1)), &[BlockId(0), BlockId(1)]);
        assert_eq!(cfg.predecessors(BlockId(2)), &[BlockId(0), BlockId(1)]);
        assert_eq!(cfg.successors(BlockId(0)), &[BlockId(1), BlockId(2)]);
    }

    #[test]
    fn break_reaches_loop_end_only() {
        let mut body = for_body();
        body.block_mut(BlockId(1)).push(Instruction::Break);
        let cfg = ControlFlowGraph::build(&body);
        assert_eq!(cfg.predecessors(BlockId(1)), &[BlockId(0)]);
        assert_eq!(cfg.predecessors(BlockId(2)), &[BlockId(0), BlockId(1)]);
        assert_eq!(region_end(&body, BlockId(1)), None);
    }

    #[test]
    fn continue_in_for_may_exit() {
        let mut body = for_body();
        body.block_mut(BlockId(1)).push(Instruction::Continue);
        let cfg = ControlFlowGraph::build(&body);
        assert_eq!(cfg.predecessors(BlockId(1)), &[BlockId(0), BlockId(1)]);
        assert_eq!(cfg.predecessors(BlockId(2)), &[BlockId(0), BlockId(1)]);
    }

    #[test]
    fn continue_in_while_only_loops_back() {
        let mut body = FunctionBody::new("f", "f.m");
        let l = body.add_block();
        let e = body.add_block();
        body.block_mut(BlockId::ENTRY).push(Instruction::While {
            loop_block: l,
            end_block: e,
        });
        body.block_mut(l).push(Instruction::Continue);
        let cfg = ControlFlowGraph::build(&body);
        assert_eq!(cfg.predecessors(l), &[BlockId(0), l]);
        assert!(cfg.predecessors(e).is_empty());
    }

    #[test]
    fn branch_arms_join() {
        let mut body = FunctionBody::new("f", "f.m");
        let t = body.add_block();
        let f = body.add_block();
        let j = body.add_block();
        body.block_mut(BlockId::ENTRY).push(Instruction::Branch {
            condition: "c".into(),
            true_block: t,
            false_block: f,
            end_block: j,
        });
        let cfg = ControlFlowGraph::build(&body);
        assert_eq!(cfg.predecessors(j), &[t, f]);
        assert_eq!(region_end(&body, BlockId::ENTRY), Some(j));
        assert_eq!(program_order(&body), vec![BlockId(0), t, f, j]);
    }
}
