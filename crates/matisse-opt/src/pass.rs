// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! The post-type pass contract and the pipeline running it.

use std::fmt;

use matisse_cir::{InstanceRegistry, ProviderContext, ResolvedCall, Settings};
use matisse_infer::{InferenceEngine, TypedInstance};
use matisse_ssa::validate;
use matisse_types::VariableType;
use tracing::{debug, trace};

use crate::error::OptError;
use crate::{
    AccessLowering, ConstantBranchElimination, ConvertToSetAll, DeadCodeElimination,
    LoopFusion, LoopInterchange, LoopInvariantCodeMotion, RedundantCastElimination,
    RedundantOutputElimination,
};

/// Whether a pass rewrote anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    Changed,
    Unchanged,
}

impl PassOutcome {
    pub fn changed(self) -> bool {
        self == PassOutcome::Changed
    }

    pub fn from_changed(changed: bool) -> Self {
        if changed {
            PassOutcome::Changed
        } else {
            PassOutcome::Unchanged
        }
    }
}

/// A candidate a pass looked at and left alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub reason: String,
}

impl Rejection {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

/// Result of examining one candidate.
pub(crate) type Attempt<T> = Result<T, Rejection>;

pub(crate) fn reject<T>(reason: impl Into<String>) -> Attempt<T> {
    Err(Rejection::new(reason))
}

pub(crate) fn log_rejection(pass: &'static str, function: &str, rejection: &Rejection) {
    debug!(pass, function, reason = %rejection, "candidate rejected");
}

/// What a pass may consult while rewriting one instance.
pub struct PassContext<'a> {
    engine: &'a InferenceEngine,
}

impl<'a> PassContext<'a> {
    pub fn new(engine: &'a InferenceEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &'a InferenceEngine {
        self.engine
    }

    pub fn registry(&self) -> &'a InstanceRegistry {
        self.engine.registry()
    }

    pub fn provider_context(&self) -> &'a ProviderContext {
        self.engine.context()
    }

    pub fn settings(&self) -> &'a Settings {
        self.engine.context().settings()
    }

    /// Resolves a built-in call on concrete argument types.
    pub(crate) fn resolve(
        &self,
        operation: &str,
        args: Vec<VariableType>,
        nargout: usize,
        line: u32,
    ) -> Result<ResolvedCall, OptError> {
        let ctx = self
            .provider_context()
            .for_call(args, nargout, None)
            .with_line(line);
        Ok(self.registry().resolve(operation, &ctx)?)
    }
}

/// A rewrite over one typed instance.
pub trait PostTypePass: Send + Sync {
    fn name(&self) -> &'static str;

    /// Id under which settings or a directive can switch the pass off.
    /// Passes without one always run.
    fn optimization_id(&self) -> Option<&'static str> {
        None
    }

    fn apply(&self, instance: &mut TypedInstance, ctx: &PassContext<'_>) -> Result<PassOutcome, OptError>;
}

/// Applies an ordered list of post-type passes, validating the body after
/// every pass that changed it.
#[derive(Default)]
pub struct PostTypePipeline {
    passes: Vec<Box<dyn PostTypePass>>,
}

impl PostTypePipeline {
    pub fn new(passes: Vec<Box<dyn PostTypePass>>) -> Self {
        Self { passes }
    }

    /// Branch folding and value cleanups, then the loop passes, then access
    /// lowering and a final sweep for dead values.
    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(ConstantBranchElimination),
            Box::new(RedundantCastElimination),
            Box::new(RedundantOutputElimination),
            Box::new(ConvertToSetAll),
            Box::new(LoopInvariantCodeMotion),
            Box::new(LoopFusion),
            Box::new(LoopInterchange),
            Box::new(AccessLowering),
            Box::new(DeadCodeElimination),
        ])
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    /// Runs every enabled pass. Returns how many changed the body.
    pub fn run(&self, instance: &mut TypedInstance, ctx: &PassContext<'_>) -> Result<usize, OptError> {
        let mut changed = 0;
        for pass in &self.passes {
            if let Some(id) = pass.optimization_id() {
                if ctx.settings().is_disabled(id) || instance.body.disables(id) {
                    trace!(pass = pass.name(), function = %instance.name(), "pass disabled");
                    continue;
                }
            }
            debug!(pass = pass.name(), function = %instance.name(), "applying post-type pass");
            if pass.apply(instance, ctx)?.changed() {
                validate(&instance.body)?;
                changed += 1;
            }
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_order() {
        assert_eq!(
            PostTypePipeline::standard().pass_names(),
            vec![
                "constant_branch",
                "redundant_cast",
                "redundant_output",
                "convert_to_set_all",
                "loop_invariant_code_motion",
                "loop_fusion",
                "loop_interchange",
                "access_lowering",
                "dead_code",
            ]
        );
    }

    #[test]
    fn outcomes() {
        assert!(PassOutcome::from_changed(true).changed());
        assert_eq!(PassOutcome::from_changed(false), PassOutcome::Unchanged);
        assert_eq!(Rejection::new("shapes differ").to_string(), "shapes differ");
    }
}
