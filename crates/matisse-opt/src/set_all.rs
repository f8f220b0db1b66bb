// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Full-range writes to set-all.
//!
//! ```text
//! r = colon(1, end(A, 0, 1)); B = A; B(r) = v   ->   B = A; B(:) = v
//! ```
//!
//! The index vector usually dies afterwards, so the whole-matrix write no
//! longer materializes `1:numel(A)`.

use matisse_cir::builtins;
use matisse_infer::TypedInstance;
use matisse_ssa::{BlockId, Instruction};
use tracing::debug;

use crate::error::OptError;
use crate::pass::{log_rejection, reject, Attempt, PassContext, PassOutcome, PostTypePass};

const PASS: &str = "convert_to_set_all";

pub struct ConvertToSetAll;

impl PostTypePass for ConvertToSetAll {
    fn name(&self) -> &'static str {
        PASS
    }

    fn optimization_id(&self) -> Option<&'static str> {
        Some("convert_to_set_all")
    }

    fn apply(&self, instance: &mut TypedInstance, _ctx: &PassContext<'_>) -> Result<PassOutcome, OptError> {
        let mut found: Vec<(BlockId, usize)> = Vec::new();
        for (block, position, inst) in instance.body.instructions() {
            if !matches!(inst, Instruction::MatrixSet { .. }) {
                continue;
            }
            match full_range_write(instance, inst) {
                Ok(()) => found.push((block, position)),
                Err(r) => log_rejection(PASS, instance.name(), &r),
            }
        }
        for &(block, position) in &found {
            let slot = &mut instance.body.block_mut(block).instructions[position];
            if let Instruction::MatrixSet {
                output,
                matrix,
                value,
                ..
            } = slot
            {
                *slot = Instruction::SetAll {
                    output: std::mem::take(output),
                    matrix: std::mem::take(matrix),
                    value: std::mem::take(value),
                };
            }
        }
        debug!(function = %instance.name(), converted = found.len(), "full-range writes converted");
        Ok(PassOutcome::from_changed(!found.is_empty()))
    }
}

/// Accepts `B(colon(1, end(A, 0, 1))) = v` writing into `A`.
fn full_range_write(instance: &TypedInstance, inst: &Instruction) -> Attempt<()> {
    let Instruction::MatrixSet { matrix, indices, .. } = inst else {
        return reject("not an indexed write");
    };
    let [index] = indices.as_slice() else {
        return reject("more than one index");
    };
    let Some(Instruction::TypedCall { function, inputs, .. }) = instance.body.defining_instruction(index)
    else {
        return reject("index is not a range");
    };
    if function != builtins::COLON {
        return reject("index is not a range");
    }
    let [start, stop] = inputs.as_slice() else {
        return reject("range has a step");
    };
    let starts_at_one = instance
        .type_of(start)
        .and_then(|t| t.constant())
        .is_some_and(|c| c.as_f64() == 1.0);
    if !starts_at_one {
        return reject("range does not start at 1");
    }
    match instance.body.defining_instruction(stop) {
        Some(Instruction::End {
            matrix: of,
            index: 0,
            num_indices: 1,
            ..
        }) if of == matrix => Ok(()),
        _ => reject("range does not end at the last element"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use matisse_ast::build::*;

    #[test]
    fn colon_end_write_becomes_set_all() {
        // x(1:end) = 0
        let f = function(
            "f",
            &["x"],
            &["x"],
            vec![assign_index("x", vec![range(num("1"), end())], num("0"))],
        );
        let (engine, _) = engine_for(vec![f]);
        let mut inst = typed(&engine, "f", &[double_row(4)]);
        let outcome = ConvertToSetAll.apply(&mut inst, &PassContext::new(&engine)).unwrap();
        assert!(outcome.changed());
        assert_eq!(inst.body.count_instructions(|i| matches!(i, Instruction::SetAll { .. })), 1);
        assert_eq!(inst.body.count_instructions(|i| matches!(i, Instruction::MatrixSet { .. })), 0);
    }

    #[test]
    fn partial_ranges_stay() {
        // x(2:end) = 0
        let f = function(
            "f",
            &["x"],
            &["x"],
            vec![assign_index("x", vec![range(num("2"), end())], num("0"))],
        );
        let (engine, _) = engine_for(vec![f]);
        let mut inst = typed(&engine, "f", &[double_row(4)]);
        let outcome = ConvertToSetAll.apply(&mut inst, &PassContext::new(&engine)).unwrap();
        assert_eq!(outcome, PassOutcome::Unchanged);
    }
}
