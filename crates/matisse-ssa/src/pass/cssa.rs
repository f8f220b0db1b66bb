// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Conversion to conventional SSA.
//!
//! Every phi input is copied into a fresh name at the end of its source
//! block, so the names joined by one phi never interfere with each other.

use indexmap::IndexMap;
use tracing::debug;

use super::SsaPass;
use crate::body::{BlockId, FunctionBody};
use crate::error::SsaError;
use crate::instruction::Instruction;
use crate::source_name;

pub struct ConventionalSsa;

impl SsaPass for ConventionalSsa {
    fn name(&self) -> &'static str {
        "cssa"
    }

    fn apply(&self, body: &mut FunctionBody) -> Result<(), SsaError> {
        // source block -> (fresh, original) pairs, in phi order
        let mut copies: IndexMap<BlockId, Vec<(String, String)>> = IndexMap::new();
        for block in body.block_ids().collect::<Vec<_>>() {
            let count = body.block(block).instructions.len();
            for position in 0..count {
                let Instruction::Phi { output, sources, .. } = &body.block(block).instructions[position]
                else {
                    continue;
                };
                let semantic = source_name(output).unwrap_or("phi").to_string();
                let sources = sources.clone();
                let fresh: Vec<String> = sources
                    .iter()
                    .map(|_| body.make_temporary(&semantic))
                    .collect();
                if let Instruction::Phi { inputs, .. } =
                    &mut body.block_mut(block).instructions[position]
                {
                    for ((input, name), source) in inputs.iter_mut().zip(&fresh).zip(&sources) {
                        let original = std::mem::replace(input, name.clone());
                        copies
                            .entry(*source)
                            .or_default()
                            .push((name.clone(), original));
                    }
                }
            }
        }

        let mut inserted = 0;
        for (source, pairs) in copies {
            inserted += pairs.len();
            let (outputs, inputs) = pairs.into_iter().unzip();
            let block = body.block_mut(source);
            let at = block.insertion_point();
            block
                .instructions
                .insert(at, Instruction::ParallelCopy { outputs, inputs });
        }
        debug!(function = %body.name, inserted, "phi inputs isolated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build_ssa;
    use crate::validate::validate;
    use matisse_ast::build::*;

    #[test]
    fn copies_land_before_terminators() {
        let f = function(
            "f",
            &["c"],
            &["y"],
            vec![if_else(
                ident("c"),
                vec![assign("y", num("1"))],
                Some(vec![assign("y", num("2"))]),
            )],
        );
        let mut body = build_ssa(&f, "f.m").unwrap();
        ConventionalSsa.apply(&mut body).unwrap();
        validate(&body).unwrap();

        let phi = body
            .instructions()
            .find_map(|(_, _, i)| match i {
                Instruction::Phi { inputs, sources, .. } => Some((inputs.clone(), sources.clone())),
                _ => None,
            })
            .unwrap();
        for (input, source) in phi.0.iter().zip(&phi.1) {
            assert!(input.starts_with("$y$"));
            let last = body.block(*source).instructions.last().unwrap();
            assert!(matches!(last, Instruction::ParallelCopy { outputs, .. } if outputs.contains(input)));
        }
    }

    #[test]
    fn one_copy_per_source_block() {
        let f = function(
            "f",
            &["n"],
            &["s"],
            vec![
                assign("s", num("0")),
                for_range("i", range(num("1"), ident("n")), vec![assign("s", ident("i"))]),
            ],
        );
        let mut body = build_ssa(&f, "f.m").unwrap();
        ConventionalSsa.apply(&mut body).unwrap();
        validate(&body).unwrap();
        // the entry feeds both the header and the exit
        let entry_copies = body
            .block(BlockId::ENTRY)
            .instructions
            .iter()
            .filter(|i| matches!(i, Instruction::ParallelCopy { .. }))
            .count();
        assert_eq!(entry_copies, 1);
        assert!(matches!(
            body.block(BlockId::ENTRY).terminator(),
            Some(Instruction::For { .. })
        ));
    }
}
