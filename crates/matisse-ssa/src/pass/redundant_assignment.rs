// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Copy propagation over variable-to-variable assignments and trivial phis.

use tracing::debug;

use super::SsaPass;
use crate::body::{BlockId, FunctionBody};
use crate::error::SsaError;
use crate::instruction::{AssignValue, Instruction};
use crate::{is_temporary, RETURN_SUFFIX};

pub struct RedundantAssignmentElimination;

enum Rewrite {
    /// Drop the instruction and read `to` wherever `from` was read.
    Forward { from: String, to: String },
    /// Drop the copy and let the defining instruction write `name` directly.
    Rename { temporary: String, name: String },
}

impl SsaPass for RedundantAssignmentElimination {
    fn name(&self) -> &'static str {
        "remove_redundant_assignments"
    }

    fn apply(&self, body: &mut FunctionBody) -> Result<(), SsaError> {
        let mut removed = 0;
        while let Some((block, position, rewrite)) = find_redundant(body) {
            body.block_mut(block).instructions.remove(position);
            match rewrite {
                Rewrite::Forward { from, to } => body.rename_uses(&from, &to),
                Rewrite::Rename { temporary, name } => {
                    for inst in body.all_instructions_mut() {
                        inst.rename_outputs(|n| (n == temporary).then(|| name.clone()));
                    }
                }
            }
            removed += 1;
        }
        debug!(function = %body.name, removed, "redundant assignments removed");
        Ok(())
    }
}

fn find_redundant(body: &FunctionBody) -> Option<(BlockId, usize, Rewrite)> {
    let uses = body.use_counts();
    for (block, position, inst) in body.instructions() {
        match inst {
            Instruction::Assign {
                output,
                value: AssignValue::Variable(input),
            } if !output.ends_with(RETURN_SUFFIX) && output != input => {
                let single_use = uses.get(input.as_str()) == Some(&1);
                let rewrite = if is_temporary(input) && single_use && body.definition(input).is_some() {
                    Rewrite::Rename {
                        temporary: input.clone(),
                        name: output.clone(),
                    }
                } else {
                    Rewrite::Forward {
                        from: output.clone(),
                        to: input.clone(),
                    }
                };
                return Some((block, position, rewrite));
            }
            Instruction::Phi { output, inputs, .. } => {
                let mut others = inputs.iter().filter(|i| *i != output);
                if let Some(first) = others.next() {
                    if others.all(|i| i == first) {
                        let rewrite = Rewrite::Forward {
                            from: output.clone(),
                            to: first.clone(),
                        };
                        return Some((block, position, rewrite));
                    }
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn copy(output: &str, input: &str) -> Instruction {
        Instruction::Assign {
            output: output.into(),
            value: AssignValue::Variable(input.into()),
        }
    }

    fn number(output: &str) -> Instruction {
        Instruction::Assign {
            output: output.into(),
            value: AssignValue::Number("3".into()),
        }
    }

    #[test]
    fn forwards_copies() {
        let mut body = FunctionBody::new("f", "f.m");
        let entry = body.block_mut(BlockId::ENTRY);
        entry.push(number("x$1"));
        entry.push(copy("y$1", "x$1"));
        entry.push(copy("z$ret", "y$1"));
        RedundantAssignmentElimination.apply(&mut body).unwrap();
        assert_eq!(
            body.block(BlockId::ENTRY).instructions,
            vec![number("x$1"), copy("z$ret", "x$1")]
        );
    }

    #[test]
    fn single_use_temporaries_take_the_name() {
        let mut body = FunctionBody::new("f", "f.m");
        let entry = body.block_mut(BlockId::ENTRY);
        entry.push(Instruction::UntypedCall {
            function: "plus".into(),
            outputs: vec!["$plus$1".into()],
            inputs: vec!["a$1".into(), "b$1".into()],
        });
        entry.push(copy("y$2", "$plus$1"));
        entry.push(copy("y$ret", "y$2"));
        RedundantAssignmentElimination.apply(&mut body).unwrap();
        assert_eq!(
            body.block(BlockId::ENTRY).instructions[0].outputs(),
            vec!["y$2"]
        );
        assert_eq!(body.block(BlockId::ENTRY).instructions.len(), 2);
    }

    #[test]
    fn trivial_phis_collapse() {
        let mut body = FunctionBody::new("f", "f.m");
        let l = body.add_block();
        body.block_mut(BlockId::ENTRY).push(number("x$1"));
        body.block_mut(l).push(Instruction::Phi {
            output: "x$2".into(),
            inputs: vec!["x$1".into(), "x$2".into()],
            sources: vec![BlockId::ENTRY, l],
        });
        body.block_mut(l).push(copy("x$ret", "x$2"));
        RedundantAssignmentElimination.apply(&mut body).unwrap();
        assert_eq!(body.block(l).instructions, vec![copy("x$ret", "x$1")]);
    }

    #[test]
    fn real_phis_stay() {
        let mut body = FunctionBody::new("f", "f.m");
        let l = body.add_block();
        body.block_mut(l).push(Instruction::Phi {
            output: "x$3".into(),
            inputs: vec!["x$1".into(), "x$2".into()],
            sources: vec![BlockId::ENTRY, l],
        });
        RedundantAssignmentElimination.apply(&mut body).unwrap();
        assert_eq!(body.block(l).instructions.len(), 1);
    }
}
