// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Matrix access lowering.
//!
//! Abstract element reads and writes become calls to the access providers:
//!
//! ```text
//! v = A(i, j)        ->  v = matrix_get(A, i, j)
//! B = A; B(i) = v    ->  B = A; matrix_set(B, i, v)     (in place)
//! B = A; B(:) = v    ->  set_all_broadcast(B, v)        (or copy, loop)
//! n = end(A, 0, 1)   ->  n = 3                          (when known)
//! ```
//!
//! Bounds checks are dropped only under "assume indices in range". A write
//! into a dynamic matrix that is not known to stay in range grows it.

use matisse_cir::builtins::{self, access::SetAllMode};
use matisse_infer::TypedInstance;
use matisse_ssa::{AssignValue, BlockId, Instruction};
use matisse_types::{Constant, VariableType};
use tracing::debug;

use crate::error::OptError;
use crate::pass::{PassContext, PassOutcome, PostTypePass};
use crate::pattern::line_at;

const PASS: &str = "access_lowering";

pub struct AccessLowering;

impl PostTypePass for AccessLowering {
    fn name(&self) -> &'static str {
        PASS
    }

    fn apply(&self, instance: &mut TypedInstance, ctx: &PassContext<'_>) -> Result<PassOutcome, OptError> {
        let mut lowered = 0;
        let blocks: Vec<BlockId> = instance.body.block_ids().collect();
        for block in blocks {
            let mut position = 0;
            while position < instance.body.block(block).instructions.len() {
                let inst = &instance.body.block(block).instructions[position];
                if !is_abstract_access(inst) {
                    position += 1;
                    continue;
                }
                let line = line_at(&instance.body, block, position);
                let inst = inst.clone();
                let (prefix, replacement) = lower(instance, ctx, inst, line)?;
                let count = prefix.len();
                let instructions = &mut instance.body.block_mut(block).instructions;
                instructions[position] = replacement;
                for (k, extra) in prefix.into_iter().enumerate() {
                    instructions.insert(position + k, extra);
                }
                position += count + 1;
                lowered += 1;
            }
        }
        debug!(function = %instance.name(), lowered, "matrix accesses lowered");
        Ok(PassOutcome::from_changed(lowered > 0))
    }
}

fn is_abstract_access(inst: &Instruction) -> bool {
    matches!(
        inst,
        Instruction::MatrixGet { .. }
            | Instruction::MatrixSet { .. }
            | Instruction::SetAll { .. }
            | Instruction::End { .. }
    )
}

fn type_of(instance: &TypedInstance, name: &str, line: u32) -> Result<VariableType, OptError> {
    instance
        .type_of(name)
        .cloned()
        .ok_or_else(|| OptError::PassFailed {
            pass: PASS,
            message: format!("`{}` has no type", name),
            line,
        })
}

fn types_of(instance: &TypedInstance, names: &[String], line: u32) -> Result<Vec<VariableType>, OptError> {
    names.iter().map(|n| type_of(instance, n, line)).collect()
}

/// Source text of an integral or real constant.
fn literal(c: Constant) -> String {
    match c.as_i64() {
        Some(i) => i.to_string(),
        None => c.as_f64().to_string(),
    }
}

/// Lowered form of one access, plus instructions that must precede it.
fn lower(
    instance: &mut TypedInstance,
    ctx: &PassContext<'_>,
    inst: Instruction,
    line: u32,
) -> Result<(Vec<Instruction>, Instruction), OptError> {
    let unchecked = instance.body.assumes_indices_in_range();
    match inst {
        Instruction::MatrixGet {
            output,
            matrix,
            indices,
        } => {
            let m = type_of(instance, &matrix, line)?;
            if m.is_scalar() {
                // indexing a scalar reads the scalar itself
                return Ok((
                    Vec::new(),
                    Instruction::Assign {
                        output,
                        value: AssignValue::Variable(matrix),
                    },
                ));
            }
            let index_types = types_of(instance, &indices, line)?;
            let operation = if unchecked && index_types.iter().all(VariableType::is_scalar) {
                builtins::SIMPLE_GET
            } else {
                builtins::MATRIX_GET
            };
            let mut args = vec![m];
            args.extend(index_types);
            let call = ctx.resolve(operation, args, 1, line)?;
            let mut inputs = vec![matrix];
            inputs.extend(indices);
            Ok((
                Vec::new(),
                Instruction::TypedCall {
                    function: operation.to_string(),
                    signature: call.key.signature,
                    outputs: vec![output],
                    inputs,
                },
            ))
        }
        Instruction::MatrixSet {
            output,
            matrix,
            indices,
            value,
        } => {
            let target = type_of(instance, &output, line)?;
            let index_types = types_of(instance, &indices, line)?;
            let value_type = type_of(instance, &value, line)?;
            let scalar_write =
                index_types.iter().all(VariableType::is_scalar) && value_type.is_scalar();
            let dynamic = target.as_matrix().is_some_and(|m| !m.is_static());
            let operation = if unchecked && scalar_write {
                builtins::SIMPLE_SET
            } else if dynamic && scalar_write && indices.len() <= 2 {
                builtins::MATRIX_SET_GROW
            } else {
                builtins::MATRIX_SET
            };
            let mut args = vec![target];
            args.extend(index_types);
            args.push(value_type);
            let call = ctx.resolve(operation, args, 0, line)?;
            let mut inputs = indices;
            inputs.push(value);
            Ok((
                Vec::new(),
                Instruction::TypedSet {
                    function: operation.to_string(),
                    signature: call.key.signature,
                    output,
                    matrix,
                    inputs,
                },
            ))
        }
        Instruction::SetAll {
            output,
            matrix,
            value,
        } => {
            let target = type_of(instance, &output, line)?;
            let value_type = type_of(instance, &value, line)?;
            let mode = SetAllMode::classify(&target, &value_type).ok_or_else(|| OptError::PassFailed {
                pass: PASS,
                message: format!("cannot assign a {} to every element of a {}", value_type, target),
                line,
            })?;
            let call = ctx.resolve(mode.operation(), vec![target, value_type], 0, line)?;
            Ok((
                Vec::new(),
                Instruction::TypedSet {
                    function: mode.operation().to_string(),
                    signature: call.key.signature,
                    output,
                    matrix,
                    inputs: vec![value],
                },
            ))
        }
        Instruction::End {
            output,
            matrix,
            index,
            num_indices,
        } => {
            if let Some(c) = instance.type_of(&output).and_then(VariableType::constant) {
                return Ok((
                    Vec::new(),
                    Instruction::Assign {
                        output,
                        value: AssignValue::Number(literal(c)),
                    },
                ));
            }
            let numerics = ctx.provider_context().numerics();
            let mut prefix = Vec::new();
            let mut inputs = vec![matrix.clone()];
            let mut args = vec![type_of(instance, &matrix, line)?];
            for n in [index, num_indices] {
                let name = instance.body.make_temporary("number");
                let ty = numerics.index_constant(n as i64);
                instance.types.insert(name.clone(), ty.clone());
                prefix.push(Instruction::Assign {
                    output: name.clone(),
                    value: AssignValue::Number(n.to_string()),
                });
                inputs.push(name);
                args.push(ty);
            }
            let call = ctx.resolve(builtins::END, args, 1, line)?;
            Ok((
                prefix,
                Instruction::TypedCall {
                    function: builtins::END.to_string(),
                    signature: call.key.signature,
                    outputs: vec![output],
                    inputs,
                },
            ))
        }
        other => Err(OptError::UnsupportedInstruction {
            pass: PASS,
            instruction: format!("{:?}", other),
            line,
        }),
    }
}
