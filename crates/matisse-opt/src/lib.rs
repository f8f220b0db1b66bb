// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Optimizations over typed instances.
//!
//! Each pass rewrites one `TypedInstance` in place and reports whether it
//! changed anything. Passes look for a shape, check legality, and either
//! rewrite or log why the candidate was left alone; a rejected candidate is
//! never an error. Access lowering is the one mandatory pass: after it, no
//! abstract matrix access is left for the C emitter.

mod access;
mod branch;
mod cast;
mod dce;
mod error;
mod fusion;
mod interchange;
mod licm;
mod outputs;
mod pass;
mod pattern;
mod set_all;

pub use access::AccessLowering;
pub use branch::ConstantBranchElimination;
pub use cast::RedundantCastElimination;
pub use dce::DeadCodeElimination;
pub use error::OptError;
pub use fusion::LoopFusion;
pub use interchange::LoopInterchange;
pub use licm::LoopInvariantCodeMotion;
pub use outputs::RedundantOutputElimination;
pub use pass::{PassContext, PassOutcome, PostTypePass, PostTypePipeline, Rejection};
pub use set_all::ConvertToSetAll;

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::HashMap;
    use std::sync::Arc;

    use matisse_ast::build::*;
    use matisse_ast::{BinaryOp, FunctionNode};
    use matisse_cir::builtins::standard_table;
    use matisse_cir::{InstanceRegistry, ProviderContext, Settings};
    use matisse_diagnostics::DiagnosticBag;
    use matisse_infer::{FunctionIdentification, FunctionSource, InferError, InferenceEngine, TypedInstance};
    use matisse_ssa::pass::SsaPassRunner;
    use matisse_ssa::{build_ssa, FunctionBody};
    use matisse_types::{MatrixType, NumericClass, VariableType};

    /// All functions live in one file, `test.m`.
    struct Functions(HashMap<String, FunctionNode>);

    impl FunctionSource for Functions {
        fn resolve(&self, _caller: &FunctionIdentification, name: &str) -> Option<FunctionIdentification> {
            self.0
                .contains_key(name)
                .then(|| FunctionIdentification::new("test.m", name))
        }

        fn body(&self, function: &FunctionIdentification) -> Result<Arc<FunctionBody>, InferError> {
            let node = self.0.get(&function.name).ok_or_else(|| InferError::UnknownFunction {
                file: function.file.clone(),
                function: function.name.clone(),
            })?;
            let mut body = build_ssa(node, &function.file)?;
            SsaPassRunner::standard().run(&mut body)?;
            Ok(Arc::new(body))
        }
    }

    pub fn engine_with(functions: Vec<FunctionNode>, settings: Settings) -> (InferenceEngine, Arc<DiagnosticBag>) {
        let bag = Arc::new(DiagnosticBag::new());
        let source = Functions(functions.into_iter().map(|f| (f.name.clone(), f)).collect());
        let engine = InferenceEngine::new(
            Arc::new(InstanceRegistry::new(standard_table())),
            Arc::new(source),
            ProviderContext::new(Arc::new(settings), bag.clone()),
        );
        (engine, bag)
    }

    pub fn engine_for(functions: Vec<FunctionNode>) -> (InferenceEngine, Arc<DiagnosticBag>) {
        engine_with(functions, Settings::default())
    }

    /// Owned copy of `name` typed for `args`, one output requested.
    pub fn typed(engine: &InferenceEngine, name: &str, args: &[VariableType]) -> TypedInstance {
        let id = FunctionIdentification::new("test.m", name);
        engine.infer(&id, args, 1).unwrap().as_ref().clone()
    }

    pub fn double() -> VariableType {
        VariableType::scalar(NumericClass::Double)
    }

    pub fn int32_row(n: u64) -> VariableType {
        VariableType::Matrix(MatrixType::fixed(NumericClass::Int32, &[1, n]))
    }

    pub fn double_row(n: u64) -> VariableType {
        VariableType::Matrix(MatrixType::fixed(NumericClass::Double, &[1, n]))
    }

    /// `y = f(x)` with `for i = 1:3, y(i) = x(i) - 1; end`.
    pub fn decrement() -> FunctionNode {
        function(
            "f",
            &["x"],
            &["y"],
            vec![for_range(
                "i",
                range(num("1"), num("3")),
                vec![assign_index(
                    "y",
                    vec![ident("i")],
                    binary(BinaryOp::Sub, apply("x", vec![ident("i")]), num("1")),
                )],
            )],
        )
    }
}
