// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Type inference over SSA.
//!
//! MATLAB functions carry no parameter types, so each function is typed once
//! per concrete argument-type list it is called with. The result is a
//! `TypedInstance`: the body with untyped calls resolved into typed calls and
//! one `VariableType` per SSA name. Calls into other user functions recurse
//! into the same engine; calls to built-ins go through the provider table.

mod engine;
mod error;
mod instance;
mod rules;
mod source;
mod walk;

pub use engine::InferenceEngine;
pub use error::InferError;
pub use instance::{FunctionIdentification, TypedInstance, TypedKey};
pub use source::FunctionSource;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    use matisse_ast::build::*;
    use matisse_ast::{BinaryOp, Expr, FunctionNode, FunctionProperty};
    use matisse_cir::builtins::standard_table;
    use matisse_cir::{CirError, InstanceRegistry, ProviderContext, Settings};
    use matisse_diagnostics::{DiagnosticBag, Severity, ToDiagnostic};
    use matisse_ssa::pass::SsaPassRunner;
    use matisse_ssa::{build_ssa, FunctionBody, Instruction};
    use matisse_types::{Dim, MatrixType, NumericClass, Shape, VariableType};

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

    fn engine_with(functions: Vec<FunctionNode>, settings: Settings) -> (InferenceEngine, Arc<DiagnosticBag>) {
        let bag = Arc::new(DiagnosticBag::new());
        let source = Functions(functions.into_iter().map(|f| (f.name.clone(), f)).collect());
        let engine = InferenceEngine::new(
            Arc::new(InstanceRegistry::new(standard_table())),
            Arc::new(source),
            ProviderContext::new(Arc::new(settings), bag.clone()),
        );
        (engine, bag)
    }

    fn engine(functions: Vec<FunctionNode>) -> InferenceEngine {
        engine_with(functions, Settings::default()).0
    }

    fn id(name: &str) -> FunctionIdentification {
        FunctionIdentification::new("test.m", name)
    }

    fn double() -> VariableType {
        VariableType::scalar(NumericClass::Double)
    }

    fn int32_row(n: u64) -> VariableType {
        VariableType::Matrix(MatrixType::fixed(NumericClass::Int32, &[1, n]))
    }

    fn sub(a: Expr, b: Expr) -> Expr {
        binary(BinaryOp::Sub, a, b)
    }

    /// `y = f(x)` with `for i = 1:3, y(i) = x(i) - 1; end`.
    fn decrement() -> FunctionNode {
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
                    sub(apply("x", vec![ident("i")]), num("1")),
                )],
            )],
        )
    }

    #[test]
    fn loop_over_matrix_types_every_value() {
        let e = engine(vec![decrement()]);
        let inst = e.infer(&id("f"), &[int32_row(3)], 1).unwrap();

        let y = inst.function_type.outputs[0].as_matrix().unwrap();
        assert_eq!(y.element, NumericClass::Int32);
        assert_eq!(y.shape, Shape::row(Dim::Unknown));
        assert!(!y.is_static());

        for (_, _, i) in inst.body.instructions() {
            assert!(!matches!(i, Instruction::UntypedCall { .. }));
            for output in i.outputs() {
                assert!(inst.type_of(output).is_some(), "`{}` has no type", output);
            }
        }
        let minus = inst
            .body
            .instructions()
            .find_map(|(_, _, i)| match i {
                Instruction::TypedCall { function, signature, .. } if function == "minus" => Some(signature),
                _ => None,
            })
            .unwrap();
        assert_eq!(minus.outputs, vec![VariableType::scalar(NumericClass::Int32)]);
    }

    #[test]
    fn literals_follow_numeric_settings() {
        let f = function(
            "f",
            &[],
            &["a", "b"],
            vec![assign("a", num("3")), assign("b", num("2.5"))],
        );
        let e = engine(vec![f]);
        let inst = e.infer(&id("f"), &[], 2).unwrap();
        assert_eq!(
            inst.function_type.outputs,
            vec![
                VariableType::int_constant(NumericClass::Int32, 3),
                VariableType::real_constant(NumericClass::Double, 2.5),
            ]
        );
    }

    #[test]
    fn branch_merge_widens_to_common_type() {
        let f = function(
            "f",
            &["c"],
            &["y"],
            vec![if_else(
                ident("c"),
                vec![assign("y", num("1"))],
                Some(vec![assign("y", num("0.5"))]),
            )],
        );
        let e = engine(vec![f]);
        let inst = e.infer(&id("f"), &[double()], 1).unwrap();
        assert_eq!(inst.function_type.outputs, vec![double()]);
    }

    #[test]
    fn branch_merge_forgets_disagreeing_extents() {
        let zeros = |n: &str| apply("zeros", vec![num("1"), num(n)]);
        let f = function(
            "f",
            &["c"],
            &["y"],
            vec![if_else(
                ident("c"),
                vec![assign("y", zeros("3"))],
                Some(vec![assign("y", zeros("4"))]),
            )],
        );
        let e = engine(vec![f]);
        let inst = e.infer(&id("f"), &[double()], 1).unwrap();
        let y = inst.function_type.outputs[0].as_matrix().unwrap();
        assert_eq!(y.shape, Shape::row(Dim::Unknown));
        assert!(!y.is_static());
    }

    #[test]
    fn loop_counter_settles_without_constant() {
        let f = function(
            "f",
            &["n"],
            &["k"],
            vec![
                assign("k", num("0")),
                for_range(
                    "i",
                    range(num("1"), ident("n")),
                    vec![assign("k", binary(BinaryOp::Add, ident("k"), num("1")))],
                ),
            ],
        );
        let e = engine(vec![f]);
        let inst = e.infer(&id("f"), &[double()], 1).unwrap();
        let k = &inst.function_type.outputs[0];
        assert!(k.is_scalar());
        assert_eq!(k.constant(), None);
    }

    #[test]
    fn recursion_is_rejected() {
        let fact = function(
            "fact",
            &["n"],
            &["r"],
            vec![assign(
                "r",
                apply("fact", vec![sub(ident("n"), num("1"))]),
            )],
        );
        let e = engine(vec![fact]);
        let err = e.infer(&id("fact"), &[double()], 1).unwrap_err();
        assert!(matches!(err, InferError::RecursiveSpecialization { .. }));
        assert_eq!(err.to_diagnostic().code.unwrap().0, "E0305");
        // failed builds leave nothing behind
        assert!(e.is_empty());
    }

    #[test]
    fn callees_are_specialized_once() {
        let g = function("g", &["a"], &["b"], vec![assign("b", sub(ident("a"), num("1")))]);
        let f = function(
            "f",
            &["x"],
            &["y"],
            vec![
                assign("t", apply("g", vec![ident("x")])),
                assign("y", apply("g", vec![ident("t")])),
            ],
        );
        let e = engine(vec![f, g]);
        let inst = e.infer(&id("f"), &[double()], 1).unwrap();
        assert_eq!(inst.callees.len(), 1);
        assert_eq!(e.len(), 2);
        assert!(inst.callee("g", &[double()]).is_some());

        let again = e.infer(&id("f"), &[double()], 1).unwrap();
        assert!(Arc::ptr_eq(&inst, &again));
    }

    #[test]
    fn constants_do_not_split_specializations() {
        let g = function("g", &["a"], &["b"], vec![assign("b", ident("a"))]);
        let f = function(
            "f",
            &[],
            &["y", "z"],
            vec![
                assign("y", apply("g", vec![num("1")])),
                assign("z", apply("g", vec![num("2")])),
            ],
        );
        let e = engine(vec![f, g]);
        let inst = e.infer(&id("f"), &[], 2).unwrap();
        assert_eq!(inst.callees.len(), 1);
        assert_eq!(inst.callees[0].args, vec![VariableType::scalar(NumericClass::Int32)]);
    }

    #[test]
    fn reading_an_unassigned_variable_fails() {
        let f = function("f", &[], &["y"], vec![assign("y", sub(ident("q"), num("1"))), assign("q", num("1"))]);
        let e = engine(vec![f]);
        let err = e.infer(&id("f"), &[], 1).unwrap_err();
        assert!(matches!(err, InferError::UsedBeforeDefinition { ref variable, .. } if variable == "q"));
    }

    #[test]
    fn output_assigned_on_no_path() {
        let f = function("f", &["x"], &["y"], vec![assign("z", ident("x"))]);
        let e = engine(vec![f]);
        let err = e.infer(&id("f"), &[double()], 1).unwrap_err();
        assert!(matches!(err, InferError::OutputNeverDefined { ref output, .. } if output == "y"));
    }

    #[test]
    fn too_many_outputs_requested() {
        let f = function("f", &[], &["y"], vec![assign("y", num("1"))]);
        let e = engine(vec![f]);
        let err = e.infer(&id("f"), &[], 2).unwrap_err();
        assert!(matches!(err, InferError::TooManyOutputs { requested: 2, available: 1, .. }));
    }

    #[test]
    fn globals_need_declared_types() {
        let f = function(
            "f",
            &[],
            &["y"],
            vec![global(&["g"]), assign("y", ident("g"))],
        );
        let e = engine(vec![f.clone()]);
        let err = e.infer(&id("f"), &[], 1).unwrap_err();
        assert!(matches!(err, InferError::UndeclaredGlobal { ref global, .. } if global == "g"));

        let mut settings = Settings::default();
        settings.global_types.insert("g".into(), double());
        let (e, _) = engine_with(vec![f], settings);
        let inst = e.infer(&id("f"), &[], 1).unwrap();
        assert_eq!(inst.function_type.outputs, vec![double()]);
    }

    #[test]
    fn growth_inside_loop_warns() {
        let f = function(
            "f",
            &["n"],
            &["y"],
            vec![
                assign("y", apply("zeros", vec![num("1"), num("2")])),
                for_range(
                    "i",
                    range(num("1"), ident("n")),
                    vec![assign_index("y", vec![ident("i")], num("0"))],
                ),
            ],
        );
        let (e, bag) = engine_with(vec![f], Settings::default());
        let inst = e.infer(&id("f"), &[double()], 1).unwrap();
        let y = inst.function_type.outputs[0].as_matrix().unwrap();
        assert_eq!(y.shape, Shape::row(Dim::Unknown));
        let warnings = bag.snapshot();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].severity, Severity::Warning);
        assert!(warnings[0].message.contains("grow"));
    }

    #[test]
    fn writes_in_range_keep_static_storage() {
        let f = function(
            "f",
            &[],
            &["y"],
            vec![
                assign("y", apply("zeros", vec![num("1"), num("3")])),
                assign_index("y", vec![num("2")], num("7")),
            ],
        );
        let e = engine(vec![f]);
        let inst = e.infer(&id("f"), &[], 1).unwrap();
        assert_eq!(
            inst.function_type.outputs,
            vec![VariableType::Matrix(MatrixType::fixed(NumericClass::Double, &[1, 3]))]
        );
    }

    #[test]
    fn assumed_indices_never_grow() {
        let f = function_with(
            "f",
            &["i"],
            &["y"],
            vec![
                assign("y", apply("zeros", vec![num("1"), num("3")])),
                assign_index("y", vec![ident("i")], num("7")),
            ],
            vec![FunctionProperty::AssumeIndicesInRange],
        );
        let e = engine(vec![f]);
        let inst = e.infer(&id("f"), &[double()], 1).unwrap();
        assert!(inst.function_type.outputs[0].as_matrix().unwrap().is_static());
    }

    #[test]
    fn too_many_indices_for_shape() {
        let f = function(
            "f",
            &["x"],
            &["y"],
            vec![assign("y", apply("x", vec![num("1"), num("1"), num("1")]))],
        );
        let e = engine(vec![f]);
        let err = e.infer(&id("f"), &[int32_row(3)], 1).unwrap_err();
        assert!(matches!(err, InferError::Dimensionality { ndims: 2, count: 3, .. }));
        assert_eq!(err.to_diagnostic().code.unwrap().0, "E0309");
    }

    #[test]
    fn side_effects_reach_the_signature() {
        let f = function("f", &["x"], &[], vec![expr_stmt(apply("disp", vec![ident("x")]))]);
        let e = engine(vec![f]);
        let inst = e.infer(&id("f"), &[double()], 0).unwrap();
        assert!(inst.function_type.side_effects);
        assert!(inst.function_type.outputs.is_empty());
    }

    #[test]
    fn bounds_checks_reach_callers() {
        let g = function("g", &["a"], &["b"], vec![assign("b", apply("a", vec![num("5")]))]);
        let f = function("f", &["x"], &["y"], vec![assign("y", apply("g", vec![ident("x")]))]);
        let h = function("h", &["a"], &["b"], vec![assign("b", sub(ident("a"), num("1")))]);
        let e = engine(vec![f, g, h]);
        let inst = e.infer(&id("f"), &[int32_row(3)], 1).unwrap();
        assert!(inst.function_type.validation_effects);
        assert!(!inst.function_type.side_effects);

        let pure = e.infer(&id("h"), &[double()], 1).unwrap();
        assert!(!pure.function_type.validation_effects);
    }

    #[test]
    fn declared_type_must_hold_result() {
        let f = function(
            "f",
            &[],
            &["y"],
            vec![assign("y", apply("zeros", vec![num("2"), num("2")]))],
        );
        let settings = Settings::default().with_declared_type("y", double());
        let (e, _) = engine_with(vec![f], settings);
        let err = e.infer(&id("f"), &[], 1).unwrap_err();
        assert!(matches!(err, InferError::Provider(CirError::OutputTypeMismatch { .. })));
        assert_eq!(err.to_diagnostic().code.unwrap().0, "E0304");
    }

    #[test]
    fn unused_outputs_get_padding_names() {
        let g = function("g", &[], &["a", "b"], vec![assign("a", num("1")), assign("b", num("2"))]);
        let f = function("f", &[], &[], vec![expr_stmt(apply("g", vec![]))]);
        let e = engine(vec![f, g]);
        let inst = e.infer(&id("f"), &[], 0).unwrap();
        let outputs = inst
            .body
            .instructions()
            .find_map(|(_, _, i)| match i {
                Instruction::TypedCall { function, outputs, .. } if function == "g" => Some(outputs.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(outputs.len(), 1);
        assert!(outputs[0].starts_with("$unused$"));
        assert!(inst.type_of(&outputs[0]).is_some());
    }

    #[test]
    fn inference_is_deterministic() {
        let a = engine(vec![decrement()]).infer(&id("f"), &[int32_row(3)], 1).unwrap();
        let b = engine(vec![decrement()]).infer(&id("f"), &[int32_row(3)], 1).unwrap();
        assert_eq!(*a, *b);
    }
}
