// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Passes over untyped SSA.

mod cssa;
mod dce;
mod redundant_assignment;

pub use cssa::ConventionalSsa;
pub use dce::{eliminate_dead_code, DeadCodeElimination};
pub use redundant_assignment::RedundantAssignmentElimination;

use tracing::debug;

use crate::body::FunctionBody;
use crate::error::SsaError;
use crate::validate::validate;

/// A rewrite over one SSA body.
pub trait SsaPass: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply(&self, body: &mut FunctionBody) -> Result<(), SsaError>;
}

/// Fails the pipeline when the body breaks an SSA invariant.
pub struct SsaValidator;

impl SsaPass for SsaValidator {
    fn name(&self) -> &'static str {
        "validate"
    }

    fn apply(&self, body: &mut FunctionBody) -> Result<(), SsaError> {
        validate(body)
    }
}

/// Applies an ordered list of passes.
#[derive(Default)]
pub struct SsaPassRunner {
    passes: Vec<Box<dyn SsaPass>>,
}

impl SsaPassRunner {
    pub fn new(passes: Vec<Box<dyn SsaPass>>) -> Self {
        Self { passes }
    }

    /// Cleanups, then conversion to conventional SSA, then validation.
    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(RedundantAssignmentElimination),
            Box::new(DeadCodeElimination),
            Box::new(ConventionalSsa),
            Box::new(SsaValidator),
        ])
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    pub fn run(&self, body: &mut FunctionBody) -> Result<(), SsaError> {
        for pass in &self.passes {
            debug!(pass = pass.name(), function = %body.name, "applying SSA pass");
            pass.apply(body)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build_ssa;
    use crate::instruction::Instruction;
    use matisse_ast::build::*;
    use matisse_ast::BinaryOp;

    #[test]
    fn standard_order() {
        assert_eq!(
            SsaPassRunner::standard().pass_names(),
            vec!["remove_redundant_assignments", "dead_code", "cssa", "validate"]
        );
    }

    #[test]
    fn standard_pipeline_keeps_loops_valid() {
        let f = function(
            "f",
            &["n"],
            &["s"],
            vec![
                assign("s", num("0")),
                for_range(
                    "i",
                    range(num("1"), ident("n")),
                    vec![assign("s", binary(BinaryOp::Add, ident("s"), ident("i")))],
                ),
            ],
        );
        let mut body = build_ssa(&f, "f.m").unwrap();
        SsaPassRunner::standard().run(&mut body).unwrap();
        assert!(body.count_instructions(|i| matches!(i, Instruction::ParallelCopy { .. })) > 0);
        // the unused undefined placeholder for `i` is gone
        assert_eq!(
            body.count_instructions(|i| matches!(i, Instruction::Assign { output, .. } if output == "i$1")),
            0
        );
    }
}
