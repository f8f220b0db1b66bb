// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Redundant output elimination.
//!
//! Trailing outputs of a multi-output call that nothing reads are dropped.
//! A user function is re-specialized for the smaller output count, so its
//! C signature loses the matching out-parameters; a built-in is re-resolved
//! and only changed if the provider actually returns fewer values.

use std::collections::HashMap;

use matisse_infer::{TypedInstance, TypedKey};
use matisse_ssa::{BlockId, Instruction, RETURN_SUFFIX};
use matisse_types::VariableType;
use tracing::debug;

use crate::error::OptError;
use crate::pass::{log_rejection, reject, Attempt, PassContext, PassOutcome, PostTypePass};
use crate::pattern::line_at;

const PASS: &str = "redundant_output";

pub struct RedundantOutputElimination;

impl PostTypePass for RedundantOutputElimination {
    fn name(&self) -> &'static str {
        PASS
    }

    fn optimization_id(&self) -> Option<&'static str> {
        Some("redundant_output_elimination")
    }

    fn apply(&self, instance: &mut TypedInstance, ctx: &PassContext<'_>) -> Result<PassOutcome, OptError> {
        let uses = instance.body.use_counts();
        let mut candidates = Vec::new();
        for (block, position, inst) in instance.body.instructions() {
            match needed_outputs(inst, &uses) {
                Ok(keep) => candidates.push((block, position, keep)),
                Err(r) => {
                    if matches!(inst, Instruction::TypedCall { outputs, .. } if outputs.len() > 1) {
                        log_rejection(PASS, instance.name(), &r);
                    }
                }
            }
        }

        let mut shrunk = 0;
        for (block, position, keep) in candidates {
            let line = line_at(&instance.body, block, position);
            match shrink(instance, ctx, block, position, keep, line)? {
                Ok(()) => shrunk += 1,
                Err(r) => log_rejection(PASS, instance.name(), &r),
            }
        }
        if shrunk > 0 {
            retain_called(instance);
        }
        debug!(function = %instance.name(), shrunk, "unused call outputs dropped");
        Ok(PassOutcome::from_changed(shrunk > 0))
    }
}

/// Number of leading outputs that must stay.
fn needed_outputs(inst: &Instruction, uses: &HashMap<String, usize>) -> Attempt<usize> {
    let Instruction::TypedCall { outputs, .. } = inst else {
        return reject("not a typed call");
    };
    if outputs.len() < 2 {
        return reject("single output");
    }
    let used = |o: &String| uses.get(o).copied().unwrap_or(0) > 0 || o.ends_with(RETURN_SUFFIX);
    // the first output is the call's value and always stays
    let keep = outputs.iter().rposition(used).map_or(1, |k| k + 1).max(1);
    if keep == outputs.len() {
        return reject("every output is read");
    }
    Ok(keep)
}

fn shrink(
    instance: &mut TypedInstance,
    ctx: &PassContext<'_>,
    block: BlockId,
    position: usize,
    keep: usize,
    line: u32,
) -> Result<Attempt<()>, OptError> {
    let Instruction::TypedCall {
        function,
        signature,
        outputs,
        inputs,
    } = &instance.body.block(block).instructions[position]
    else {
        return Ok(reject("not a typed call"));
    };
    let current = outputs.len();
    let user = instance
        .callees
        .iter()
        .find(|k| k.function.name == *function && k.args == signature.inputs && k.nargout == current)
        .cloned();

    let new_signature = match user {
        Some(key) => {
            let callee = ctx
                .engine()
                .infer(&key.function, &key.args, keep)
                .map_err(|e| e.at_line(line))?;
            if !instance.callees.contains(&callee.key) {
                instance.callees.push(callee.key.clone());
            }
            callee.function_type.clone()
        }
        None => {
            let args: Vec<VariableType> = match inputs
                .iter()
                .map(|i| instance.type_of(i).cloned())
                .collect::<Option<Vec<_>>>()
            {
                Some(args) => args,
                None => return Ok(reject("untyped call input")),
            };
            let call = ctx.resolve(function, args, keep, line)?;
            if call.outputs().len() >= current {
                return Ok(reject(format!("`{}` returns {} values whatever is read", function, current)));
            }
            call.key.signature
        }
    };
    if new_signature.outputs.len() != keep {
        return Ok(reject(format!(
            "`{}` would return {} values for {} requested",
            function,
            new_signature.outputs.len(),
            keep
        )));
    }

    let dropped: Vec<String>;
    {
        let inst = &mut instance.body.block_mut(block).instructions[position];
        let Instruction::TypedCall {
            signature, outputs, ..
        } = inst
        else {
            return Ok(reject("not a typed call"));
        };
        dropped = outputs.split_off(keep);
        *signature = new_signature;
    }
    for name in &dropped {
        instance.types.shift_remove(name);
    }
    Ok(Ok(()))
}

/// Drops callee keys no typed call refers to any more.
fn retain_called(instance: &mut TypedInstance) {
    let called: Vec<(String, Vec<VariableType>, usize)> = instance
        .body
        .instructions()
        .filter_map(|(_, _, i)| match i {
            Instruction::TypedCall {
                function,
                signature,
                outputs,
                ..
            } => Some((function.clone(), signature.inputs.clone(), outputs.len())),
            _ => None,
        })
        .collect();
    instance.callees.retain(|k: &TypedKey| {
        called
            .iter()
            .any(|(f, args, n)| *f == k.function.name && *args == k.args && *n == k.nargout)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use matisse_ast::build::*;
    use matisse_ast::LValue;

    /// `[s, d] = pair(a, b)` returning sum and difference.
    fn pair() -> matisse_ast::FunctionNode {
        function(
            "pair",
            &["a", "b"],
            &["s", "d"],
            vec![
                assign("s", binary(matisse_ast::BinaryOp::Add, ident("a"), ident("b"))),
                assign("d", binary(matisse_ast::BinaryOp::Sub, ident("a"), ident("b"))),
            ],
        )
    }

    fn call_outputs(inst: &TypedInstance, name: &str) -> usize {
        inst.body
            .instructions()
            .find_map(|(_, _, i)| match i {
                Instruction::TypedCall { function, outputs, .. } if function == name => Some(outputs.len()),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn unread_user_output_is_dropped() {
        // [s, d] = pair(x, 1); y = s
        let f = function(
            "f",
            &["x"],
            &["y"],
            vec![
                assign_multi(
                    vec![LValue::Var("s".into()), LValue::Var("d".into())],
                    apply("pair", vec![ident("x"), num("1")]),
                ),
                assign("y", ident("s")),
            ],
        );
        let (engine, _) = engine_for(vec![f, pair()]);
        let mut inst = typed(&engine, "f", &[double()]);
        assert_eq!(call_outputs(&inst, "pair"), 2);

        let outcome = RedundantOutputElimination.apply(&mut inst, &PassContext::new(&engine)).unwrap();
        assert!(outcome.changed());
        assert_eq!(call_outputs(&inst, "pair"), 1);
        assert_eq!(inst.callees.len(), 1);
        assert_eq!(inst.callees[0].nargout, 1);
        let callee = engine.get(&inst.callees[0]).unwrap();
        assert_eq!(callee.function_type.outputs.len(), 1);
    }

    #[test]
    fn read_outputs_stay() {
        let f = function(
            "f",
            &["x"],
            &["y"],
            vec![
                assign_multi(
                    vec![LValue::Var("s".into()), LValue::Var("d".into())],
                    apply("pair", vec![ident("x"), num("1")]),
                ),
                assign("y", ident("d")),
            ],
        );
        let (engine, _) = engine_for(vec![f, pair()]);
        let mut inst = typed(&engine, "f", &[double()]);
        let outcome = RedundantOutputElimination.apply(&mut inst, &PassContext::new(&engine)).unwrap();
        assert_eq!(outcome, PassOutcome::Unchanged);
        assert_eq!(call_outputs(&inst, "pair"), 2);
    }
}
