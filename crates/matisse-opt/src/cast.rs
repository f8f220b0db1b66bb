// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Redundant cast elimination.
//!
//! A cast whose result has the storage of its input is dropped and its
//! readers use the input directly. A cast of a cast whose inner step loses
//! nothing is re-pointed at the original value:
//!
//! ```text
//! y = int32(x)    (x already int32)   ->  readers of y read x
//! y = int32(a); z = double(y)         ->  z = double(a)   (a int8)
//! ```

use matisse_infer::TypedInstance;
use matisse_ssa::{BlockId, Instruction, RETURN_SUFFIX};
use matisse_types::{classify_conversion, NumericClass};
use tracing::debug;

use crate::error::OptError;
use crate::pass::{log_rejection, reject, Attempt, PassContext, PassOutcome, PostTypePass};
use crate::pattern::line_at;

const PASS: &str = "redundant_cast";

pub struct RedundantCastElimination;

impl PostTypePass for RedundantCastElimination {
    fn name(&self) -> &'static str {
        PASS
    }

    fn optimization_id(&self) -> Option<&'static str> {
        Some("redundant_cast_elimination")
    }

    fn apply(&self, instance: &mut TypedInstance, ctx: &PassContext<'_>) -> Result<PassOutcome, OptError> {
        let mut removed = 0;
        let mut collapsed = 0;
        loop {
            let Some((block, position, input, output)) = find_identity_cast(instance) else {
                break;
            };
            instance.body.block_mut(block).instructions.remove(position);
            instance.body.rename_uses(&output, &input);
            instance.types.shift_remove(&output);
            removed += 1;
        }
        loop {
            match find_chain(instance) {
                Some((block, position, original)) => {
                    repoint(instance, ctx, block, position, original)?;
                    collapsed += 1;
                }
                None => break,
            }
            // the re-pointed cast may now be an identity
            while let Some((block, position, input, output)) = find_identity_cast(instance) {
                instance.body.block_mut(block).instructions.remove(position);
                instance.body.rename_uses(&output, &input);
                instance.types.shift_remove(&output);
                removed += 1;
            }
        }
        debug!(function = %instance.name(), removed, collapsed, "casts simplified");
        Ok(PassOutcome::from_changed(removed + collapsed > 0))
    }
}

/// `(input, output)` of a single-argument call to a class conversion.
fn as_cast(inst: &Instruction) -> Option<(NumericClass, &str, &str)> {
    match inst {
        Instruction::TypedCall {
            function,
            outputs,
            inputs,
            ..
        } if outputs.len() == 1 && inputs.len() == 1 => {
            let class = NumericClass::from_name(function)?;
            Some((class, inputs[0].as_str(), outputs[0].as_str()))
        }
        _ => None,
    }
}

fn is_identity(instance: &TypedInstance, input: &str, output: &str) -> Attempt<()> {
    if output.ends_with(RETURN_SUFFIX) {
        return reject(format!("`{}` is a return value", output));
    }
    match (instance.type_of(input), instance.type_of(output)) {
        (Some(a), Some(b)) if a.same_storage(b) => Ok(()),
        (Some(a), Some(b)) => reject(format!("cast from {} to {} changes storage", a, b)),
        _ => reject("untyped cast operand"),
    }
}

fn find_identity_cast(instance: &TypedInstance) -> Option<(BlockId, usize, String, String)> {
    for (block, position, inst) in instance.body.instructions() {
        let Some((_, input, output)) = as_cast(inst) else {
            continue;
        };
        match is_identity(instance, input, output) {
            Ok(()) => return Some((block, position, input.to_string(), output.to_string())),
            Err(r) => log_rejection(PASS, instance.name(), &r),
        }
    }
    None
}

/// Value an outer cast can read instead of its input, when that input is
/// itself a lossless cast.
fn chain_source(instance: &TypedInstance, input: &str) -> Attempt<String> {
    let Some(inner) = instance.body.defining_instruction(input) else {
        return reject("cast input has no definition");
    };
    let Some((_, original, _)) = as_cast(inner) else {
        return reject("cast input is not a cast");
    };
    match (instance.type_of(original), instance.type_of(input)) {
        (Some(from), Some(to)) if classify_conversion(from, to).is_lossless() => Ok(original.to_string()),
        (Some(from), Some(to)) => reject(format!("inner cast from {} to {} may lose values", from, to)),
        _ => reject("untyped inner cast"),
    }
}

fn find_chain(instance: &TypedInstance) -> Option<(BlockId, usize, String)> {
    for (block, position, inst) in instance.body.instructions() {
        let Some((_, input, _)) = as_cast(inst) else {
            continue;
        };
        match chain_source(instance, input) {
            Ok(original) => return Some((block, position, original)),
            Err(r) => log_rejection(PASS, instance.name(), &r),
        }
    }
    None
}

fn repoint(
    instance: &mut TypedInstance,
    ctx: &PassContext<'_>,
    block: BlockId,
    position: usize,
    original: String,
) -> Result<(), OptError> {
    let line = line_at(&instance.body, block, position);
    let arg = instance
        .type_of(&original)
        .cloned()
        .ok_or_else(|| OptError::PassFailed {
            pass: PASS,
            message: format!("`{}` has no type", original),
            line,
        })?;
    let inst = &mut instance.body.block_mut(block).instructions[position];
    if let Instruction::TypedCall {
        function,
        signature,
        inputs,
        ..
    } = inst
    {
        let call = ctx.resolve(function, vec![arg], 1, line)?;
        *signature = call.key.signature;
        inputs[0] = original;
    }
    Ok(())
}
