// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Structural checks every body must pass between passes.

use std::collections::HashSet;

use crate::body::FunctionBody;
use crate::cfg::ControlFlowGraph;
use crate::error::SsaError;
use crate::instruction::Instruction;

/// Checks that block references are valid, control instructions end their
/// block, every name is defined once before being read somewhere, and each
/// phi has one input per predecessor of its block.
pub fn validate(body: &FunctionBody) -> Result<(), SsaError> {
    let fail = |message: String| SsaError::Invariant {
        function: body.name.clone(),
        message,
    };

    let block_count = body.blocks.len();
    for (block, position, inst) in body.instructions() {
        if let Some(bad) = inst.referenced_blocks().into_iter().find(|b| b.index() >= block_count) {
            return Err(fail(format!("{} references missing block {}", block, bad)));
        }
        if inst.is_control() && position + 1 != body.block(block).instructions.len() {
            return Err(fail(format!("control instruction in the middle of {}", block)));
        }
    }

    let mut defined = HashSet::new();
    for (_, _, inst) in body.instructions() {
        for output in inst.outputs() {
            if !defined.insert(output) {
                return Err(fail(format!("`{}` is defined more than once", output)));
            }
        }
    }
    for (block, _, inst) in body.instructions() {
        if let Some(missing) = inst.inputs().into_iter().find(|i| !defined.contains(i)) {
            return Err(fail(format!("`{}` read in {} is never defined", missing, block)));
        }
    }

    let cfg = ControlFlowGraph::build(body);
    for (block, _, inst) in body.instructions() {
        let Instruction::Phi {
            output,
            inputs,
            sources,
        } = inst
        else {
            continue;
        };
        let preds = cfg.predecessors(block);
        if inputs.len() != sources.len() || sources.len() != preds.len() {
            return Err(fail(format!(
                "phi `{}` in {} has {} inputs for {} predecessors",
                output,
                block,
                inputs.len(),
                preds.len()
            )));
        }
        if let Some(stray) = sources.iter().find(|s| !preds.contains(s)) {
            return Err(fail(format!(
                "phi `{}` in {} names {}, which is not a predecessor",
                output, block, stray
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::BlockId;
    use crate::instruction::AssignValue;

    fn number(output: &str) -> Instruction {
        Instruction::Assign {
            output: output.into(),
            value: AssignValue::Number("1".into()),
        }
    }

    #[test]
    fn double_definition() {
        let mut body = FunctionBody::new("f", "f.m");
        body.block_mut(BlockId::ENTRY).push(number("x$1"));
        body.block_mut(BlockId::ENTRY).push(number("x$1"));
        let err = validate(&body).unwrap_err();
        assert!(err.to_string().contains("defined more than once"));
    }

    #[test]
    fn dangling_block() {
        let mut body = FunctionBody::new("f", "f.m");
        body.block_mut(BlockId::ENTRY).push(Instruction::While {
            loop_block: BlockId(4),
            end_block: BlockId(5),
        });
        assert!(validate(&body).is_err());
    }

    #[test]
    fn phi_arity_matches_predecessors() {
        let mut body = FunctionBody::new("f", "f.m");
        let t = body.add_block();
        let f = body.add_block();
        let j = body.add_block();
        body.block_mut(BlockId::ENTRY).push(number("c$1"));
        body.block_mut(BlockId::ENTRY).push(Instruction::Branch {
            condition: "c$1".into(),
            true_block: t,
            false_block: f,
            end_block: j,
        });
        body.block_mut(t).push(number("x$1"));
        body.block_mut(f).push(number("x$2"));
        body.block_mut(j).push(Instruction::Phi {
            output: "x$3".into(),
            inputs: vec!["x$1".into()],
            sources: vec![t],
        });
        assert!(validate(&body).is_err());

        body.block_mut(j).instructions[0] = Instruction::Phi {
            output: "x$3".into(),
            inputs: vec!["x$1".into(), "x$2".into()],
            sources: vec![t, f],
        };
        assert_eq!(validate(&body), Ok(()));
    }
}
