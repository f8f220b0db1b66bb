// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Interference graph over SSA names.
//!
//! Two names interfere when one is written while the other is still live;
//! interfering names can never share a variable. Names are numbered in the
//! order the allocator discovered them.

use std::collections::HashSet;

use indexmap::IndexSet;
use matisse_infer::TypedInstance;
use matisse_ssa::cfg::program_order;
use matisse_ssa::{BlockId, Instruction};

use crate::liveness::Liveness;

#[derive(Debug, Clone, Default)]
pub struct InterferenceGraph {
    adjacency: Vec<HashSet<usize>>,
}

impl InterferenceGraph {
    pub fn build(instance: &TypedInstance, liveness: &Liveness, names: &IndexSet<String>) -> Self {
        let mut graph = InterferenceGraph {
            adjacency: vec![HashSet::new(); names.len()],
        };
        let body = &instance.body;
        let mut add = |a: &str, b: &str| {
            if let (Some(a), Some(b)) = (names.get_index_of(a), names.get_index_of(b)) {
                graph.connect(a, b);
            }
        };

        for block in program_order(body) {
            let instructions = &body.block(block).instructions;
            let phi_count = instructions
                .iter()
                .take_while(|i| matches!(i, Instruction::Phi { .. }))
                .count();
            let mut live = liveness.live_out(block).clone();
            let mut through = liveness.pinned(block).clone();

            for inst in instructions[phi_count..].iter().rev() {
                let outputs = inst.outputs();
                for output in &outputs {
                    for other in live.iter().filter(|l| l.as_str() != *output) {
                        add(output, other.as_str());
                    }
                }
                for (k, a) in outputs.iter().enumerate() {
                    for (m, b) in outputs.iter().enumerate().skip(k + 1) {
                        if !same_copy_source(inst, k, m) {
                            add(a, b);
                        }
                    }
                }
                for (output, input) in entry_interference(instance, inst) {
                    add(output, input);
                }
                for output in &outputs {
                    live.remove(*output);
                    through.remove(*output);
                }
                live.extend(inst.inputs().into_iter().map(str::to_string));
                live.extend(through.iter().cloned());
            }

            // phis define their outputs together on block entry
            let phi_outputs: Vec<&str> = instructions[..phi_count]
                .iter()
                .flat_map(|i| i.outputs())
                .collect();
            for (k, output) in phi_outputs.iter().enumerate() {
                for other in live.iter().filter(|l| l.as_str() != *output) {
                    add(output, other.as_str());
                }
                for other in &phi_outputs[k + 1..] {
                    add(output, other);
                }
            }

            // phi copies land before the loop instruction that reads the bounds
            if let Some(Instruction::For {
                start,
                interval,
                end,
                loop_block,
                end_block,
                ..
            }) = body.block(block).terminator()
            {
                for target in [*loop_block, *end_block] {
                    for phi in phi_outputs_of(instance, target) {
                        for bound in [start, interval, end] {
                            add(phi, bound.as_str());
                        }
                    }
                }
            }
        }
        graph
    }

    pub fn interferes(&self, a: usize, b: usize) -> bool {
        self.adjacency[a].contains(&b)
    }

    pub fn neighbors(&self, name: usize) -> &HashSet<usize> {
        &self.adjacency[name]
    }

    pub fn len(&self) -> usize {
        self.adjacency.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adjacency.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn from_edges(len: usize, edges: &[(usize, usize)]) -> Self {
        let mut graph = InterferenceGraph {
            adjacency: vec![HashSet::new(); len],
        };
        for (a, b) in edges {
            graph.connect(*a, *b);
        }
        graph
    }

    fn connect(&mut self, a: usize, b: usize) {
        if a != b {
            self.adjacency[a].insert(b);
            self.adjacency[b].insert(a);
        }
    }
}

fn phi_outputs_of(instance: &TypedInstance, block: BlockId) -> impl Iterator<Item = &str> {
    instance.body.block(block).phis().flat_map(|i| i.outputs())
}

/// Two outputs of one parallel copy that copy the same input hold the same
/// value.
fn same_copy_source(inst: &Instruction, a: usize, b: usize) -> bool {
    match inst {
        Instruction::ParallelCopy { inputs, .. } => inputs.get(a).is_some() && inputs.get(a) == inputs.get(b),
        _ => false,
    }
}

/// Pairs that interfere even when the input dies at the instruction: the
/// output is written while the inputs are still being read.
fn entry_interference<'a>(instance: &TypedInstance, inst: &'a Instruction) -> Vec<(&'a str, &'a str)> {
    let is_matrix = |name: &str| instance.type_of(name).is_some_and(|t| t.is_matrix());
    match inst {
        Instruction::TypedCall { outputs, inputs, .. } => outputs
            .iter()
            .filter(|o| is_matrix(o))
            .flat_map(|o| inputs.iter().map(move |i| (o.as_str(), i.as_str())))
            .collect(),
        // the matrix operand is updated in place
        Instruction::TypedSet { output, inputs, .. } => {
            inputs.iter().map(|i| (output.as_str(), i.as_str())).collect()
        }
        Instruction::MatrixSet {
            output,
            indices,
            value,
            ..
        } => indices
            .iter()
            .chain(std::iter::once(value))
            .map(|i| (output.as_str(), i.as_str()))
            .collect(),
        Instruction::SetAll { output, value, .. } => vec![(output.as_str(), value.as_str())],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use crate::{collect_names, Liveness};
    use matisse_ssa::cfg::ControlFlowGraph;

    fn graph_of(instance: &TypedInstance) -> (IndexSet<String>, InterferenceGraph) {
        let cfg = ControlFlowGraph::build(&instance.body);
        let live = Liveness::compute(&instance.body, &cfg).unwrap();
        let names = collect_names(&instance.body);
        let graph = InterferenceGraph::build(instance, &live, &names);
        (names, graph)
    }

    fn interfere(names: &IndexSet<String>, graph: &InterferenceGraph, a: &str, b: &str) -> bool {
        graph.interferes(names.get_index_of(a).unwrap(), names.get_index_of(b).unwrap())
    }

    #[test]
    fn values_read_after_a_phi_interfere_with_it() {
        let inst = join();
        let (names, graph) = graph_of(&inst);
        assert!(interfere(&names, &graph, "y$3", "x$1"));
        assert!(!interfere(&names, &graph, "y$3", "z$1"));
        assert!(!interfere(&names, &graph, "z$1", "c$1"));
    }

    #[test]
    fn values_live_together_interfere() {
        // a = x + 1; b = a * 2; y = a + b
        let inst = overlapping();
        let (names, graph) = graph_of(&inst);
        let a = names.iter().find(|n| n.starts_with("a$")).unwrap();
        let b = names.iter().find(|n| n.starts_with("b$")).unwrap();
        let x = names.iter().find(|n| n.starts_with("x$")).unwrap();
        assert!(interfere(&names, &graph, a, b));
        assert!(!interfere(&names, &graph, a, x));
    }
}
