// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Constant branch elimination.
//!
//! A branch on a condition whose value inference already knows keeps only
//! the arm that runs. The arm's code moves into the branching block, the
//! join's phis become plain copies of the value arriving from that arm,
//! and the join's code follows the arm.

use matisse_infer::TypedInstance;
use matisse_ssa::cfg::{region_blocks, region_end};
use matisse_ssa::{AssignValue, BlockId, Instruction};
use tracing::debug;

use crate::error::OptError;
use crate::pass::{log_rejection, reject, Attempt, PassContext, PassOutcome, PostTypePass};

const PASS: &str = "constant_branch";

pub struct ConstantBranchElimination;

impl PostTypePass for ConstantBranchElimination {
    fn name(&self) -> &'static str {
        PASS
    }

    fn optimization_id(&self) -> Option<&'static str> {
        Some("constant_branch_elimination")
    }

    fn apply(&self, instance: &mut TypedInstance, _ctx: &PassContext<'_>) -> Result<PassOutcome, OptError> {
        let mut folded = 0;
        while let Some(fold) = find_fold(instance) {
            apply_fold(instance, fold);
            folded += 1;
        }
        debug!(function = %instance.name(), folded, "constant branches folded");
        Ok(PassOutcome::from_changed(folded > 0))
    }
}

struct Fold {
    block: BlockId,
    taken: BlockId,
    skipped: BlockId,
    join: BlockId,
    /// Block the taken arm falls out of.
    arm_end: BlockId,
}

fn find_fold(instance: &TypedInstance) -> Option<Fold> {
    for block in instance.body.block_ids() {
        let Some(Instruction::Branch { .. }) = instance.body.block(block).terminator() else {
            continue;
        };
        match fold_at(instance, block) {
            Ok(fold) => return Some(fold),
            Err(r) => log_rejection(PASS, instance.name(), &r),
        }
    }
    None
}

fn fold_at(instance: &TypedInstance, block: BlockId) -> Attempt<Fold> {
    let Some(Instruction::Branch {
        condition,
        true_block,
        false_block,
        end_block,
    }) = instance.body.block(block).terminator()
    else {
        return reject("not a branch");
    };
    let Some(value) = instance.type_of(condition).and_then(|t| t.constant()) else {
        return reject(format!("condition `{}` is not constant", condition));
    };
    let (taken, skipped) = if value.as_f64() != 0.0 {
        (*true_block, *false_block)
    } else {
        (*false_block, *true_block)
    };
    let Some(arm_end) = region_end(&instance.body, taken) else {
        return reject("taken arm never falls through");
    };
    let jumps_out = region_blocks(&instance.body, skipped).into_iter().any(|b| {
        matches!(
            instance.body.block(b).terminator(),
            Some(Instruction::Break | Instruction::Continue)
        )
    });
    if jumps_out {
        return reject("skipped arm leaves the enclosing loop");
    }
    for inst in instance.body.block(*end_block).phis() {
        if let Instruction::Phi { output, sources, .. } = inst {
            if !sources.contains(&arm_end) {
                return reject(format!("phi `{}` has no value from the taken arm", output));
            }
        }
    }
    Ok(Fold {
        block,
        taken,
        skipped,
        join: *end_block,
        arm_end,
    })
}

fn apply_fold(instance: &mut TypedInstance, fold: Fold) {
    let body = &mut instance.body;
    let arm_end = if fold.arm_end == fold.taken {
        fold.block
    } else {
        fold.arm_end
    };

    let skipped = region_blocks(body, fold.skipped);
    let dropped: Vec<String> = skipped
        .iter()
        .flat_map(|b| body.block(*b).instructions.iter())
        .flat_map(|i| i.outputs())
        .map(str::to_string)
        .collect();
    for b in &skipped {
        body.block_mut(*b).instructions.clear();
    }

    let taken = std::mem::take(&mut body.block_mut(fold.taken).instructions);
    let head = body.block_mut(fold.block);
    head.instructions.pop();
    head.instructions.extend(taken);

    let joined: Vec<Instruction> = std::mem::take(&mut body.block_mut(fold.join).instructions)
        .into_iter()
        .map(|inst| match inst {
            Instruction::Phi {
                output,
                inputs,
                sources,
            } => {
                let k = sources.iter().position(|s| *s == fold.arm_end).unwrap_or(0);
                Instruction::Assign {
                    output,
                    value: AssignValue::Variable(inputs[k].clone()),
                }
            }
            other => other,
        })
        .collect();
    body.block_mut(arm_end).instructions.extend(joined);

    let (taken, join) = (fold.taken, fold.join);
    for inst in body.all_instructions_mut() {
        inst.remap_blocks(|b| {
            if b == taken {
                fold.block
            } else if b == join {
                arm_end
            } else {
                b
            }
        });
    }
    for name in dropped {
        instance.types.shift_remove(&name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use matisse_ast::build::*;
    use matisse_ssa::validate;

    fn branches(inst: &TypedInstance) -> usize {
        inst.body.count_instructions(|i| matches!(i, Instruction::Branch { .. }))
    }

    #[test]
    fn constant_condition_keeps_one_arm() {
        // if 1, y = x; else, y = 2; end
        let f = function(
            "f",
            &["x"],
            &["y"],
            vec![if_else(
                num("1"),
                vec![assign("y", ident("x"))],
                Some(vec![assign("y", num("2"))]),
            )],
        );
        let (engine, _) = engine_for(vec![f]);
        let mut inst = typed(&engine, "f", &[double()]);
        assert_eq!(branches(&inst), 1);

        let outcome = ConstantBranchElimination
            .apply(&mut inst, &PassContext::new(&engine))
            .unwrap();
        assert!(outcome.changed());
        assert_eq!(branches(&inst), 0);
        assert_eq!(inst.body.count_instructions(|i| matches!(i, Instruction::Phi { .. })), 0);
        validate(&inst.body).unwrap();
        // the literal 2 of the dead arm is gone
        assert!(!inst.body.instructions().any(|(_, _, i)| matches!(
            i,
            Instruction::Assign { value: AssignValue::Number(n), .. } if n == "2"
        )));
    }

    #[test]
    fn unknown_conditions_stay() {
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
        let (engine, _) = engine_for(vec![f]);
        let mut inst = typed(&engine, "f", &[double()]);
        let outcome = ConstantBranchElimination
            .apply(&mut inst, &PassContext::new(&engine))
            .unwrap();
        assert_eq!(outcome, PassOutcome::Unchanged);
        assert_eq!(branches(&inst), 1);
    }
}
