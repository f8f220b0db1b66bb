// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Function bodies and blocks.

use std::collections::HashMap;
use std::fmt;

use matisse_ast::FunctionProperty;

use crate::instruction::Instruction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl BlockId {
    pub const ENTRY: BlockId = BlockId(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Straight-line instructions. At most the last one transfers control.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    pub instructions: Vec<Instruction>,
}

impl Block {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    /// The trailing control instruction, if any.
    pub fn terminator(&self) -> Option<&Instruction> {
        self.instructions.last().filter(|i| i.is_control())
    }

    /// Index where code that must run before the terminator goes.
    pub fn insertion_point(&self) -> usize {
        match self.terminator() {
            Some(_) => self.instructions.len() - 1,
            None => self.instructions.len(),
        }
    }

    pub fn phis(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions
            .iter()
            .filter(|i| matches!(i, Instruction::Phi { .. }))
    }
}

/// One function in SSA form.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionBody {
    pub name: String,
    /// Source file the function came from.
    pub file: String,
    pub blocks: Vec<Block>,
    /// Source names of the parameters.
    pub inputs: Vec<String>,
    /// Source names of the return values.
    pub outputs: Vec<String>,
    pub properties: Vec<FunctionProperty>,
    next_temporary: u32,
}

impl FunctionBody {
    pub fn new(name: impl Into<String>, file: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file: file.into(),
            blocks: vec![Block::new()],
            inputs: Vec::new(),
            outputs: Vec::new(),
            properties: Vec::new(),
            next_temporary: 1,
        }
    }

    pub fn add_block(&mut self) -> BlockId {
        self.blocks.push(Block::new());
        BlockId(self.blocks.len() as u32 - 1)
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.index()]
    }

    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> {
        (0..self.blocks.len() as u32).map(BlockId)
    }

    /// Fresh name `$semantic$N`. Never returns the same name twice for one body.
    pub fn make_temporary(&mut self, semantic: &str) -> String {
        let name = format!("${}${}", semantic, self.next_temporary);
        self.next_temporary += 1;
        name
    }

    pub fn has_property(&self, property: &FunctionProperty) -> bool {
        self.properties.contains(property)
    }

    pub fn assumes_indices_in_range(&self) -> bool {
        self.has_property(&FunctionProperty::AssumeIndicesInRange)
    }

    /// Whether a directive disabled the optimization with this id.
    pub fn disables(&self, optimization: &str) -> bool {
        self.properties
            .iter()
            .any(|p| matches!(p, FunctionProperty::DisableOptimization(id) if id == optimization))
    }

    /// `(block, position, instruction)` in block order.
    pub fn instructions(&self) -> impl Iterator<Item = (BlockId, usize, &Instruction)> {
        self.blocks.iter().enumerate().flat_map(|(b, block)| {
            block
                .instructions
                .iter()
                .enumerate()
                .map(move |(i, inst)| (BlockId(b as u32), i, inst))
        })
    }

    pub fn all_instructions_mut(&mut self) -> impl Iterator<Item = &mut Instruction> {
        self.blocks.iter_mut().flat_map(|b| b.instructions.iter_mut())
    }

    /// Location of the instruction defining `name`.
    pub fn definition(&self, name: &str) -> Option<(BlockId, usize)> {
        self.instructions()
            .find(|(_, _, inst)| inst.outputs().contains(&name))
            .map(|(b, i, _)| (b, i))
    }

    pub fn defining_instruction(&self, name: &str) -> Option<&Instruction> {
        self.definition(name)
            .map(|(b, i)| &self.block(b).instructions[i])
    }

    /// Number of times each name is read.
    pub fn use_counts(&self) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for (_, _, inst) in self.instructions() {
            for input in inst.inputs() {
                *counts.entry(input.to_string()).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Replaces every read of `from` with `to`.
    pub fn rename_uses(&mut self, from: &str, to: &str) {
        for inst in self.all_instructions_mut() {
            inst.rename_inputs(|n| (n == from).then(|| to.to_string()));
        }
    }

    pub fn count_instructions(&self, pred: impl Fn(&Instruction) -> bool) -> usize {
        self.instructions().filter(|(_, _, i)| pred(i)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::AssignValue;

    #[test]
    fn temporaries_are_unique() {
        let mut body = FunctionBody::new("f", "f.m");
        let a = body.make_temporary("call");
        let b = body.make_temporary("call");
        assert_eq!(a, "$call$1");
        assert_ne!(a, b);
    }

    #[test]
    fn insertion_point_skips_terminator() {
        let mut block = Block::new();
        block.push(Instruction::Assign {
            output: "x$1".into(),
            value: AssignValue::Number("1".into()),
        });
        assert_eq!(block.insertion_point(), 1);
        block.push(Instruction::Break);
        assert_eq!(block.insertion_point(), 1);
    }

    #[test]
    fn disabled_optimizations_come_from_properties() {
        let mut body = FunctionBody::new("f", "f.m");
        body.properties
            .push(FunctionProperty::DisableOptimization("licm".into()));
        assert!(body.disables("licm"));
        assert!(!body.disables("fusion"));
    }
}
