// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! The closed SSA instruction set.

use matisse_ast::LoopProperty;
use matisse_cir::FunctionType;

use crate::body::BlockId;

/// Right-hand side of a plain assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum AssignValue {
    Variable(String),
    /// Numeric literal as written in the source.
    Number(String),
    /// Placeholder definition for a variable not yet assigned.
    Undefined,
}

/// How an instruction may be treated by optimizations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionType {
    /// Pure; removable when its outputs are unused.
    NoSideEffect,
    /// Pure unless it fails a run-time check (index out of range, shape mismatch).
    ValidationSideEffect,
    SideEffect,
    Control,
    /// Carries no computation of its own.
    Decoration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// Binds parameter `index` (0-based).
    Argument { output: String, index: usize },
    Assign { output: String, value: AssignValue },
    StringLiteral { output: String, value: String },
    /// Following instructions come from this source line.
    Line { line: u32 },
    Comment { text: String },
    /// `inputs[k]` is the value reaching from `sources[k]`.
    Phi {
        output: String,
        inputs: Vec<String>,
        sources: Vec<BlockId>,
    },
    UntypedCall {
        function: String,
        outputs: Vec<String>,
        inputs: Vec<String>,
    },
    TypedCall {
        function: String,
        signature: FunctionType,
        outputs: Vec<String>,
        inputs: Vec<String>,
    },
    /// `output = matrix(indices...)`, 1-based.
    MatrixGet {
        output: String,
        matrix: String,
        indices: Vec<String>,
    },
    /// `output = matrix` with `output(indices...) = value`.
    MatrixSet {
        output: String,
        matrix: String,
        indices: Vec<String>,
        value: String,
    },
    /// In-place call writing into `matrix`; the result is named `output`.
    /// The signature's first input is the matrix.
    TypedSet {
        function: String,
        signature: FunctionType,
        output: String,
        matrix: String,
        inputs: Vec<String>,
    },
    /// Value of `end` at 0-based position `index` of `num_indices` indices.
    End {
        output: String,
        matrix: String,
        index: usize,
        num_indices: usize,
    },
    /// `output = matrix` with `output(:) = value`.
    SetAll {
        output: String,
        matrix: String,
        value: String,
    },
    /// Simultaneous copies, `outputs[k] = inputs[k]`.
    ParallelCopy {
        outputs: Vec<String>,
        inputs: Vec<String>,
    },
    /// Current value of the enclosing for-loop's induction variable.
    Iter { output: String },
    /// Runs `true_block` or `false_block`, then continues in `end_block`.
    Branch {
        condition: String,
        true_block: BlockId,
        false_block: BlockId,
        end_block: BlockId,
    },
    /// `for start:interval:end`, body in `loop_block`, continuing in `end_block`.
    For {
        start: String,
        interval: String,
        end: String,
        loop_block: BlockId,
        end_block: BlockId,
        properties: Vec<LoopProperty>,
    },
    /// Repeats `loop_block` until it breaks, then continues in `end_block`.
    While {
        loop_block: BlockId,
        end_block: BlockId,
    },
    Break,
    Continue,
    ReadGlobal { output: String, global: String },
    WriteGlobal { global: String, input: String },
}

impl Instruction {
    pub fn outputs(&self) -> Vec<&str> {
        match self {
            Instruction::Argument { output, .. }
            | Instruction::Assign { output, .. }
            | Instruction::StringLiteral { output, .. }
            | Instruction::Phi { output, .. }
            | Instruction::MatrixGet { output, .. }
            | Instruction::MatrixSet { output, .. }
            | Instruction::TypedSet { output, .. }
            | Instruction::End { output, .. }
            | Instruction::SetAll { output, .. }
            | Instruction::Iter { output }
            | Instruction::ReadGlobal { output, .. } => vec![output.as_str()],
            Instruction::UntypedCall { outputs, .. }
            | Instruction::TypedCall { outputs, .. }
            | Instruction::ParallelCopy { outputs, .. } => {
                outputs.iter().map(String::as_str).collect()
            }
            Instruction::Line { .. }
            | Instruction::Comment { .. }
            | Instruction::Branch { .. }
            | Instruction::For { .. }
            | Instruction::While { .. }
            | Instruction::Break
            | Instruction::Continue
            | Instruction::WriteGlobal { .. } => Vec::new(),
        }
    }

    pub fn inputs(&self) -> Vec<&str> {
        match self {
            Instruction::Assign {
                value: AssignValue::Variable(v),
                ..
            } => vec![v.as_str()],
            Instruction::Phi { inputs, .. }
            | Instruction::UntypedCall { inputs, .. }
            | Instruction::TypedCall { inputs, .. }
            | Instruction::ParallelCopy { inputs, .. } => inputs.iter().map(String::as_str).collect(),
            Instruction::MatrixGet { matrix, indices, .. } => std::iter::once(matrix.as_str())
                .chain(indices.iter().map(String::as_str))
                .collect(),
            Instruction::MatrixSet {
                matrix,
                indices,
                value,
                ..
            } => std::iter::once(matrix.as_str())
                .chain(indices.iter().map(String::as_str))
                .chain(std::iter::once(value.as_str()))
                .collect(),
            Instruction::TypedSet { matrix, inputs, .. } => std::iter::once(matrix.as_str())
                .chain(inputs.iter().map(String::as_str))
                .collect(),
            Instruction::End { matrix, .. } => vec![matrix.as_str()],
            Instruction::SetAll { matrix, value, .. } => vec![matrix.as_str(), value.as_str()],
            Instruction::Branch { condition, .. } => vec![condition.as_str()],
            Instruction::For {
                start,
                interval,
                end,
                ..
            } => vec![start.as_str(), interval.as_str(), end.as_str()],
            Instruction::WriteGlobal { input, .. } => vec![input.as_str()],
            Instruction::Argument { .. }
            | Instruction::Assign { .. }
            | Instruction::StringLiteral { .. }
            | Instruction::Line { .. }
            | Instruction::Comment { .. }
            | Instruction::Iter { .. }
            | Instruction::While { .. }
            | Instruction::Break
            | Instruction::Continue
            | Instruction::ReadGlobal { .. } => Vec::new(),
        }
    }

    /// Blocks whose code belongs to this instruction (arms, loop body).
    pub fn owned_blocks(&self) -> Vec<BlockId> {
        match self {
            Instruction::Branch {
                true_block,
                false_block,
                ..
            } => vec![*true_block, *false_block],
            Instruction::For { loop_block, .. } | Instruction::While { loop_block, .. } => {
                vec![*loop_block]
            }
            _ => Vec::new(),
        }
    }

    /// Block where execution continues after this control instruction.
    pub fn end_block(&self) -> Option<BlockId> {
        match self {
            Instruction::Branch { end_block, .. }
            | Instruction::For { end_block, .. }
            | Instruction::While { end_block, .. } => Some(*end_block),
            _ => None,
        }
    }

    /// Every block id mentioned by the instruction.
    pub fn referenced_blocks(&self) -> Vec<BlockId> {
        match self {
            Instruction::Phi { sources, .. } => sources.clone(),
            _ => {
                let mut blocks = self.owned_blocks();
                blocks.extend(self.end_block());
                blocks
            }
        }
    }

    pub fn is_control(&self) -> bool {
        matches!(
            self,
            Instruction::Branch { .. }
                | Instruction::For { .. }
                | Instruction::While { .. }
                | Instruction::Break
                | Instruction::Continue
        )
    }

    pub fn is_loop(&self) -> bool {
        matches!(self, Instruction::For { .. } | Instruction::While { .. })
    }

    pub fn instruction_type(&self) -> InstructionType {
        match self {
            Instruction::Assign { .. }
            | Instruction::StringLiteral { .. }
            | Instruction::Phi { .. }
            | Instruction::End { .. }
            | Instruction::ParallelCopy { .. }
            | Instruction::ReadGlobal { .. } => InstructionType::NoSideEffect,
            Instruction::TypedCall { signature, .. } => {
                if signature.side_effects {
                    InstructionType::SideEffect
                } else if signature.validation_effects {
                    InstructionType::ValidationSideEffect
                } else {
                    InstructionType::NoSideEffect
                }
            }
            Instruction::TypedSet { signature, .. } => {
                if signature.side_effects {
                    InstructionType::SideEffect
                } else {
                    InstructionType::ValidationSideEffect
                }
            }
            Instruction::MatrixGet { .. }
            | Instruction::MatrixSet { .. }
            | Instruction::SetAll { .. } => InstructionType::ValidationSideEffect,
            // unknown until typed
            Instruction::UntypedCall { .. } | Instruction::WriteGlobal { .. } => {
                InstructionType::SideEffect
            }
            Instruction::Branch { .. }
            | Instruction::For { .. }
            | Instruction::While { .. }
            | Instruction::Break
            | Instruction::Continue
            | Instruction::Iter { .. } => InstructionType::Control,
            Instruction::Argument { .. } | Instruction::Line { .. } | Instruction::Comment { .. } => {
                InstructionType::Decoration
            }
        }
    }

    /// Renames every read for which `f` returns a new name.
    pub fn rename_inputs(&mut self, f: impl Fn(&str) -> Option<String>) {
        let apply = |name: &mut String| {
            if let Some(new) = f(name) {
                *name = new;
            }
        };
        match self {
            Instruction::Assign {
                value: AssignValue::Variable(v),
                ..
            } => apply(v),
            Instruction::Phi { inputs, .. }
            | Instruction::UntypedCall { inputs, .. }
            | Instruction::TypedCall { inputs, .. }
            | Instruction::ParallelCopy { inputs, .. } => inputs.iter_mut().for_each(apply),
            Instruction::MatrixGet { matrix, indices, .. } => {
                apply(matrix);
                indices.iter_mut().for_each(apply);
            }
            Instruction::MatrixSet {
                matrix,
                indices,
                value,
                ..
            } => {
                apply(matrix);
                indices.iter_mut().for_each(apply);
                apply(value);
            }
            Instruction::TypedSet { matrix, inputs, .. } => {
                apply(matrix);
                inputs.iter_mut().for_each(apply);
            }
            Instruction::End { matrix, .. } => apply(matrix),
            Instruction::SetAll { matrix, value, .. } => {
                apply(matrix);
                apply(value);
            }
            Instruction::Branch { condition, .. } => apply(condition),
            Instruction::For {
                start,
                interval,
                end,
                ..
            } => {
                apply(start);
                apply(interval);
                apply(end);
            }
            Instruction::WriteGlobal { input, .. } => apply(input),
            Instruction::Argument { .. }
            | Instruction::Assign { .. }
            | Instruction::StringLiteral { .. }
            | Instruction::Line { .. }
            | Instruction::Comment { .. }
            | Instruction::Iter { .. }
            | Instruction::While { .. }
            | Instruction::Break
            | Instruction::Continue
            | Instruction::ReadGlobal { .. } => {}
        }
    }

    /// Renames every definition for which `f` returns a new name.
    pub fn rename_outputs(&mut self, f: impl Fn(&str) -> Option<String>) {
        let apply = |name: &mut String| {
            if let Some(new) = f(name) {
                *name = new;
            }
        };
        match self {
            Instruction::Argument { output, .. }
            | Instruction::Assign { output, .. }
            | Instruction::StringLiteral { output, .. }
            | Instruction::Phi { output, .. }
            | Instruction::MatrixGet { output, .. }
            | Instruction::MatrixSet { output, .. }
            | Instruction::TypedSet { output, .. }
            | Instruction::End { output, .. }
            | Instruction::SetAll { output, .. }
            | Instruction::Iter { output }
            | Instruction::ReadGlobal { output, .. } => apply(output),
            Instruction::UntypedCall { outputs, .. }
            | Instruction::TypedCall { outputs, .. }
            | Instruction::ParallelCopy { outputs, .. } => outputs.iter_mut().for_each(apply),
            Instruction::Line { .. }
            | Instruction::Comment { .. }
            | Instruction::Branch { .. }
            | Instruction::For { .. }
            | Instruction::While { .. }
            | Instruction::Break
            | Instruction::Continue
            | Instruction::WriteGlobal { .. } => {}
        }
    }

    /// Rewrites every block id through `f`.
    pub fn remap_blocks(&mut self, f: impl Fn(BlockId) -> BlockId) {
        match self {
            Instruction::Phi { sources, .. } => {
                for s in sources.iter_mut() {
                    *s = f(*s);
                }
            }
            Instruction::Branch {
                true_block,
                false_block,
                end_block,
                ..
            } => {
                *true_block = f(*true_block);
                *false_block = f(*false_block);
                *end_block = f(*end_block);
            }
            Instruction::For {
                loop_block,
                end_block,
                ..
            }
            | Instruction::While {
                loop_block,
                end_block,
            } => {
                *loop_block = f(*loop_block);
                *end_block = f(*end_block);
            }
            _ => {}
        }
    }
}
