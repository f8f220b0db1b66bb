// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Merge-preferred pairs and greedy coalescing.
//!
//! Pairs come from instructions that move a value from one name to another.
//! High-priority pairs are tried first; a pair merges only when neither group
//! interferes with the other and both store their values the same way.

use std::collections::HashSet;

use indexmap::IndexSet;
use matisse_cir::builtins::SIMPLE_SET;
use matisse_infer::TypedInstance;
use matisse_ssa::cfg::program_order;
use matisse_ssa::{is_temporary, source_name, AssignValue, Instruction};
use matisse_types::VariableType;
use tracing::trace;

use crate::interference::InterferenceGraph;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Priority {
    High,
    Medium,
}

/// Pairs worth giving one variable, highest priority first and in program
/// order within a priority.
pub(crate) fn merge_pairs(instance: &TypedInstance) -> Vec<(String, String)> {
    let body = &instance.body;
    let mut pairs: Vec<(Priority, String, String)> = Vec::new();
    let mut push = |priority, a: &str, b: &str| pairs.push((priority, a.to_string(), b.to_string()));

    for block in program_order(body) {
        for inst in &body.block(block).instructions {
            match inst {
                Instruction::Phi { output, inputs, .. } => {
                    for input in inputs {
                        push(Priority::High, output, input);
                    }
                }
                Instruction::ParallelCopy { outputs, inputs } => {
                    for (output, input) in outputs.iter().zip(inputs) {
                        push(Priority::High, output, input);
                    }
                }
                Instruction::Assign {
                    output,
                    value: AssignValue::Variable(input),
                } => {
                    let related = is_temporary(output)
                        || is_temporary(input)
                        || source_name(output) == source_name(input);
                    let priority = if related { Priority::High } else { Priority::Medium };
                    push(priority, output, input);
                }
                Instruction::TypedSet {
                    function,
                    output,
                    matrix,
                    ..
                } => {
                    let priority = if function == SIMPLE_SET {
                        Priority::High
                    } else {
                        Priority::Medium
                    };
                    push(priority, output, matrix);
                }
                Instruction::MatrixSet { output, matrix, .. } | Instruction::SetAll { output, matrix, .. } => {
                    push(Priority::Medium, output, matrix);
                }
                _ => {}
            }
        }
    }
    // stable: program order survives within a priority
    pairs.sort_by_key(|(priority, _, _)| *priority);
    pairs.into_iter().map(|(_, a, b)| (a, b)).collect()
}

/// Union-find over name indices with the interference of each group kept on
/// its root.
pub(crate) struct Groups<'a> {
    parent: Vec<usize>,
    neighbors: Vec<HashSet<usize>>,
    types: &'a [VariableType],
}

impl<'a> Groups<'a> {
    pub(crate) fn new(graph: &InterferenceGraph, types: &'a [VariableType]) -> Self {
        Self {
            parent: (0..graph.len()).collect(),
            neighbors: (0..graph.len()).map(|n| graph.neighbors(n).clone()).collect(),
            types,
        }
    }

    pub(crate) fn find(&mut self, mut name: usize) -> usize {
        while self.parent[name] != name {
            self.parent[name] = self.parent[self.parent[name]];
            name = self.parent[name];
        }
        name
    }

    /// Merges the groups of `a` and `b` if allowed. The group keeps the
    /// root discovered first.
    pub(crate) fn try_merge(&mut self, a: usize, b: usize) -> bool {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return true;
        }
        if self.neighbors[ra].contains(&rb) || !self.types[ra].same_storage(&self.types[rb]) {
            return false;
        }
        let (root, other) = (ra.min(rb), ra.max(rb));
        self.parent[other] = root;
        let moved = std::mem::take(&mut self.neighbors[other]);
        for n in &moved {
            self.neighbors[*n].remove(&other);
            self.neighbors[*n].insert(root);
        }
        self.neighbors[root].extend(moved);
        true
    }

    /// Members of every group, groups ordered by their first member.
    pub(crate) fn into_groups(mut self) -> Vec<Vec<usize>> {
        let mut by_root: Vec<Vec<usize>> = vec![Vec::new(); self.parent.len()];
        for name in 0..self.parent.len() {
            let root = self.find(name);
            by_root[root].push(name);
        }
        by_root.into_iter().filter(|g| !g.is_empty()).collect()
    }
}

/// Greedily coalesces `pairs`. Returns the groups in discovery order.
pub(crate) fn coalesce(
    names: &IndexSet<String>,
    types: &[VariableType],
    graph: &InterferenceGraph,
    pairs: &[(String, String)],
) -> Vec<Vec<usize>> {
    let mut groups = Groups::new(graph, types);
    for (a, b) in pairs {
        let (Some(ia), Some(ib)) = (names.get_index_of(a), names.get_index_of(b)) else {
            continue;
        };
        if !groups.try_merge(ia, ib) {
            trace!(a = %a, b = %b, "kept apart");
        }
    }
    groups.into_groups()
}

#[cfg(test)]
mod tests {
    use super::*;
    use matisse_types::NumericClass;

    fn double() -> VariableType {
        VariableType::scalar(NumericClass::Double)
    }

    fn names(list: &[&str]) -> IndexSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn interference_is_inherited_by_the_merged_group() {
        // a-b may merge, but c interferes with b, so c cannot join a
        let names = names(&["a", "b", "c"]);
        let graph = InterferenceGraph::from_edges(3, &[(1, 2)]);
        let types = vec![double(); 3];
        let pairs = vec![("a".to_string(), "b".to_string()), ("a".to_string(), "c".to_string())];
        let groups = coalesce(&names, &types, &graph, &pairs);
        assert_eq!(groups, vec![vec![0, 1], vec![2]]);
    }

    #[test]
    fn storage_must_match() {
        let names = names(&["a", "b"]);
        let graph = InterferenceGraph::from_edges(2, &[]);
        let types = vec![double(), VariableType::scalar(NumericClass::Int32)];
        let groups = coalesce(&names, &types, &graph, &[("a".into(), "b".into())]);
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn constants_share_storage_with_their_class() {
        let names = names(&["a", "b"]);
        let graph = InterferenceGraph::from_edges(2, &[]);
        let types = vec![double(), VariableType::real_constant(NumericClass::Double, 0.0)];
        let groups = coalesce(&names, &types, &graph, &[("b".into(), "a".into())]);
        assert_eq!(groups, vec![vec![0, 1]]);
    }
}
