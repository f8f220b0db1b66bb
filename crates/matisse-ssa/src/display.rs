// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Textual dump of SSA bodies, for logs and tests.

use std::fmt;

use crate::body::FunctionBody;
use crate::instruction::{AssignValue, Instruction};

fn list(names: &[String]) -> String {
    names.join(", ")
}

fn outputs(names: &[String]) -> String {
    match names {
        [] => String::new(),
        [one] => format!("{} = ", one),
        many => format!("[{}] = ", list(many)),
    }
}

impl fmt::Display for AssignValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssignValue::Variable(v) => write!(f, "{}", v),
            AssignValue::Number(n) => write!(f, "{}", n),
            AssignValue::Undefined => write!(f, "undefined"),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Argument { output, index } => write!(f, "{} = arg {}", output, index),
            Instruction::Assign { output, value } => write!(f, "{} = {}", output, value),
            Instruction::StringLiteral { output, value } => write!(f, "{} = {:?}", output, value),
            Instruction::Line { line } => write!(f, "line {}", line),
            Instruction::Comment { text } => write!(f, "% {}", text),
            Instruction::Phi {
                output,
                inputs,
                sources,
            } => {
                let pairs: Vec<String> = sources
                    .iter()
                    .zip(inputs)
                    .map(|(s, i)| format!("{}: {}", s, i))
                    .collect();
                write!(f, "{} = phi({})", output, pairs.join(", "))
            }
            Instruction::UntypedCall {
                function,
                outputs: outs,
                inputs,
            } => write!(f, "{}{}({})", outputs(outs), function, list(inputs)),
            Instruction::TypedCall {
                function,
                signature,
                outputs: outs,
                inputs,
            } => write!(f, "{}{}({}) : {}", outputs(outs), function, list(inputs), signature),
            Instruction::MatrixGet {
                output,
                matrix,
                indices,
            } => write!(f, "{} = {}({})", output, matrix, list(indices)),
            Instruction::MatrixSet {
                output,
                matrix,
                indices,
                value,
            } => write!(f, "{} = {} with ({}) <- {}", output, matrix, list(indices), value),
            Instruction::TypedSet {
                function,
                signature,
                output,
                matrix,
                inputs,
            } => write!(
                f,
                "{} = {}({}; {}) : {}",
                output,
                function,
                matrix,
                list(inputs),
                signature
            ),
            Instruction::End {
                output,
                matrix,
                index,
                num_indices,
            } => write!(f, "{} = end({}, {}/{})", output, matrix, index, num_indices),
            Instruction::SetAll {
                output,
                matrix,
                value,
            } => write!(f, "{} = {} with (:) <- {}", output, matrix, value),
            Instruction::ParallelCopy {
                outputs: outs,
                inputs,
            } => write!(f, "({}) := ({})", list(outs), list(inputs)),
            Instruction::Iter { output } => write!(f, "{} = iter", output),
            Instruction::Branch {
                condition,
                true_block,
                false_block,
                end_block,
            } => write!(
                f,
                "branch {} ? {} : {} then {}",
                condition, true_block, false_block, end_block
            ),
            Instruction::For {
                start,
                interval,
                end,
                loop_block,
                end_block,
                properties,
            } => {
                write!(
                    f,
                    "for {}:{}:{} loop {} then {}",
                    start, interval, end, loop_block, end_block
                )?;
                if !properties.is_empty() {
                    write!(f, " {:?}", properties)?;
                }
                Ok(())
            }
            Instruction::While {
                loop_block,
                end_block,
            } => write!(f, "while loop {} then {}", loop_block, end_block),
            Instruction::Break => write!(f, "break"),
            Instruction::Continue => write!(f, "continue"),
            Instruction::ReadGlobal { output, global } => write!(f, "{} = global {}", output, global),
            Instruction::WriteGlobal { global, input } => write!(f, "global {} = {}", global, input),
        }
    }
}

impl fmt::Display for FunctionBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "function [{}] = {}({})",
            list(&self.outputs),
            self.name,
            list(&self.inputs)
        )?;
        for id in self.block_ids() {
            writeln!(f, "{}:", id)?;
            for inst in &self.block(id).instructions {
                writeln!(f, "  {}", inst)?;
            }
        }
        Ok(())
    }
}
