// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Dead-code elimination.
//!
//! Pure instructions survive only if something with an effect, a control
//! instruction or a return value transitively reads one of their outputs.

use std::collections::HashSet;

use tracing::debug;

use super::SsaPass;
use crate::body::FunctionBody;
use crate::error::SsaError;
use crate::instruction::{Instruction, InstructionType};
use crate::RETURN_SUFFIX;

pub struct DeadCodeElimination;

impl SsaPass for DeadCodeElimination {
    fn name(&self) -> &'static str {
        "dead_code"
    }

    fn apply(&self, body: &mut FunctionBody) -> Result<(), SsaError> {
        let removed = eliminate_dead_code(body);
        debug!(function = %body.name, removed, "dead code eliminated");
        Ok(())
    }
}

fn is_pure(inst: &Instruction) -> bool {
    inst.instruction_type() == InstructionType::NoSideEffect
        && !inst.outputs().iter().any(|o| o.ends_with(RETURN_SUFFIX))
}

/// Removes dead pure instructions and dead parallel-copy pairs.
/// Returns the number of values removed.
pub fn eliminate_dead_code(body: &mut FunctionBody) -> usize {
    let mut live: HashSet<String> = HashSet::new();
    for (_, _, inst) in body.instructions() {
        if !is_pure(inst) {
            live.extend(inst.inputs().into_iter().map(str::to_string));
        }
    }
    loop {
        let mut changed = false;
        for (_, _, inst) in body.instructions() {
            if !is_pure(inst) {
                continue;
            }
            let reads = match inst {
                // each pair is independent
                Instruction::ParallelCopy { outputs, inputs } => outputs
                    .iter()
                    .zip(inputs)
                    .filter(|(o, _)| live.contains(*o))
                    .map(|(_, i)| i.as_str())
                    .collect::<Vec<_>>(),
                _ if inst.outputs().iter().any(|o| live.contains(*o)) => inst.inputs(),
                _ => Vec::new(),
            };
            for input in reads {
                if live.insert(input.to_string()) {
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }

    let mut removed = 0;
    for block in &mut body.blocks {
        block.instructions.retain_mut(|inst| {
            if !is_pure(inst) {
                return true;
            }
            if let Instruction::ParallelCopy { outputs, inputs } = inst {
                let before = outputs.len();
                let keep: Vec<bool> = outputs.iter().map(|o| live.contains(o)).collect();
                let mut k = keep.iter();
                outputs.retain(|_| *k.next().unwrap_or(&false));
                let mut k = keep.iter();
                inputs.retain(|_| *k.next().unwrap_or(&false));
                removed += before - outputs.len();
                return !outputs.is_empty();
            }
            let keep = inst.outputs().iter().any(|o| live.contains(*o));
            if !keep {
                removed += 1;
            }
            keep
        });
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::BlockId;
    use crate::instruction::AssignValue;

    fn num(output: &str) -> Instruction {
        Instruction::Assign {
            output: output.into(),
            value: AssignValue::Number("1".into()),
        }
    }

    fn copy(output: &str, input: &str) -> Instruction {
        Instruction::Assign {
            output: output.into(),
            value: AssignValue::Variable(input.into()),
        }
    }

    #[test]
    fn removes_unused_chains() {
        let mut body = FunctionBody::new("f", "f.m");
        let entry = body.block_mut(BlockId::ENTRY);
        entry.push(num("a$1"));
        entry.push(copy("b$1", "a$1"));
        entry.push(num("c$1"));
        entry.push(copy("y$ret", "c$1"));
        assert_eq!(eliminate_dead_code(&mut body), 2);
        assert_eq!(body.block(BlockId::ENTRY).instructions.len(), 2);
    }

    #[test]
    fn keeps_effects_and_their_inputs() {
        let mut body = FunctionBody::new("f", "f.m");
        let entry = body.block_mut(BlockId::ENTRY);
        entry.push(num("a$1"));
        entry.push(Instruction::UntypedCall {
            function: "disp".into(),
            outputs: Vec::new(),
            inputs: vec!["a$1".into()],
        });
        assert_eq!(eliminate_dead_code(&mut body), 0);
    }

    #[test]
    fn self_feeding_phi_is_dead() {
        let mut body = FunctionBody::new("f", "f.m");
        let l = body.add_block();
        body.block_mut(BlockId::ENTRY).push(num("x$1"));
        body.block_mut(l).push(Instruction::Phi {
            output: "x$2".into(),
            inputs: vec!["x$1".into(), "x$2".into()],
            sources: vec![BlockId::ENTRY, l],
        });
        assert_eq!(eliminate_dead_code(&mut body), 2);
    }

    #[test]
    fn trims_parallel_copies_pairwise() {
        let mut body = FunctionBody::new("f", "f.m");
        let entry = body.block_mut(BlockId::ENTRY);
        entry.push(num("a$1"));
        entry.push(num("b$1"));
        entry.push(Instruction::ParallelCopy {
            outputs: vec!["$a$1".into(), "$b$2".into()],
            inputs: vec!["a$1".into(), "b$1".into()],
        });
        entry.push(copy("y$ret", "$b$2"));
        assert_eq!(eliminate_dead_code(&mut body), 2);
        assert!(body.block(BlockId::ENTRY).instructions.contains(&Instruction::ParallelCopy {
            outputs: vec!["$b$2".into()],
            inputs: vec!["b$1".into()],
        }));
    }
}
