// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Leaving SSA form.
//!
//! A typed instance names every value separately. Allocation decides which
//! SSA names can share one C variable: liveness over the control flow gives
//! an interference graph, move-like instructions give pairs worth merging,
//! and a greedy pass coalesces the compatible ones before every group gets
//! its identifier. Phi elimination then turns the phis whose inputs stayed
//! apart into copies.

mod check;
mod coalesce;
mod error;
mod interference;
mod liveness;
mod naming;
mod phi;

use std::collections::{HashMap, HashSet};

use indexmap::IndexSet;
use matisse_infer::TypedInstance;
use matisse_ssa::cfg::program_order;
use matisse_ssa::{AssignValue, FunctionBody, Instruction};
use matisse_types::VariableType;
use tracing::debug;

pub use check::check_control_flow;
pub use error::UnssaError;
pub use interference::InterferenceGraph;
pub use liveness::Liveness;
pub use phi::eliminate_phis;

/// One C variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub ty: VariableType,
    /// SSA names stored in this variable, in discovery order.
    pub members: Vec<String>,
}

/// Result of allocation: every live SSA name of an instance mapped to the
/// variable holding it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableAllocation {
    variables: Vec<Variable>,
    index: HashMap<String, usize>,
}

impl VariableAllocation {
    /// Variables in the order their first member was discovered, so
    /// parameters come first.
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn variable_of(&self, ssa: &str) -> Option<&Variable> {
        self.index.get(ssa).map(|&i| &self.variables[i])
    }

    pub fn name_of(&self, ssa: &str) -> Option<&str> {
        self.variable_of(ssa).map(|v| v.name.as_str())
    }

    pub fn same_variable(&self, a: &str, b: &str) -> bool {
        match (self.index.get(a), self.index.get(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}

/// Allocates the variables of one typed instance.
pub fn allocate(instance: &TypedInstance) -> Result<VariableAllocation, UnssaError> {
    let body = &instance.body;
    let cfg = check_control_flow(body)?;
    let names = collect_names(body);

    let mut types = Vec::with_capacity(names.len());
    for name in &names {
        let Some(ty) = instance.type_of(name) else {
            let line = body
                .definition(name)
                .map_or(0, |(block, position)| check::line_at(body, block, position));
            return Err(UnssaError::UntypedVariable {
                function: body.name.clone(),
                variable: name.clone(),
                line,
            });
        };
        types.push(ty.without_constant());
    }

    let liveness = Liveness::compute(body, &cfg)?;
    let graph = InterferenceGraph::build(instance, &liveness, &names);
    let pairs = coalesce::merge_pairs(instance);
    let groups = coalesce::coalesce(&names, &types, &graph, &pairs);
    let identifiers = naming::name_groups(&names, &groups, &globals(body));

    let mut allocation = VariableAllocation::default();
    for (group, name) in groups.into_iter().zip(identifiers) {
        let slot = allocation.variables.len();
        let members: Vec<String> = group.iter().map(|&m| names[m].clone()).collect();
        for member in &members {
            allocation.index.insert(member.clone(), slot);
        }
        allocation.variables.push(Variable {
            name,
            ty: types[group[0]].clone(),
            members,
        });
    }
    debug!(
        function = %instance.name(),
        names = names.len(),
        variables = allocation.len(),
        "variables allocated"
    );
    Ok(allocation)
}

/// Every SSA name that needs storage, in program order. Placeholders that
/// nothing reads are left out.
pub(crate) fn collect_names(body: &FunctionBody) -> IndexSet<String> {
    let read: HashSet<&str> = body.instructions().flat_map(|(_, _, i)| i.inputs()).collect();
    let mut names = IndexSet::new();
    for block in program_order(body) {
        for inst in &body.block(block).instructions {
            if let Instruction::Assign {
                output,
                value: AssignValue::Undefined,
            } = inst
            {
                if !read.contains(output.as_str()) {
                    continue;
                }
            }
            for name in inst.outputs().into_iter().chain(inst.inputs()) {
                if !names.contains(name) {
                    names.insert(name.to_string());
                }
            }
        }
    }
    names
}

fn globals(body: &FunctionBody) -> HashSet<String> {
    body.instructions()
        .filter_map(|(_, _, i)| match i {
            Instruction::ReadGlobal { global, .. } | Instruction::WriteGlobal { global, .. } => Some(global.clone()),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::HashMap;
    use std::sync::Arc;

    use indexmap::IndexMap;
    use matisse_ast::build::*;
    use matisse_ast::{BinaryOp, FunctionNode};
    use matisse_cir::builtins::standard_table;
    use matisse_cir::{FunctionType, InstanceRegistry, ProviderContext, Settings};
    use matisse_diagnostics::DiagnosticBag;
    use matisse_infer::{FunctionIdentification, FunctionSource, InferError, InferenceEngine, TypedInstance, TypedKey};
    use matisse_ssa::pass::SsaPassRunner;
    use matisse_ssa::{build_ssa, AssignValue, BlockId, FunctionBody, Instruction};
    use matisse_types::{NumericClass, VariableType};

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

    fn double() -> VariableType {
        VariableType::scalar(NumericClass::Double)
    }

    /// `function` typed with scalar double arguments.
    pub fn typed(function: FunctionNode) -> TypedInstance {
        let args = vec![double(); function.inputs.len()];
        let id = FunctionIdentification::new("test.m", function.name.clone());
        let source = Functions(HashMap::from([(function.name.clone(), function)]));
        let engine = InferenceEngine::new(
            Arc::new(InstanceRegistry::new(standard_table())),
            Arc::new(source),
            ProviderContext::new(Arc::new(Settings::default()), Arc::new(DiagnosticBag::new())),
        );
        engine.infer(&id, &args, 1).unwrap().as_ref().clone()
    }

    /// `s = f(x, n)`: `s = 0; for i = 1:n, s = s + x; end`.
    pub fn accumulate() -> TypedInstance {
        typed(function(
            "f",
            &["x", "n"],
            &["s"],
            vec![
                assign("s", num("0")),
                for_range(
                    "i",
                    range(num("1"), ident("n")),
                    vec![assign("s", binary(BinaryOp::Add, ident("s"), ident("x")))],
                ),
            ],
        ))
    }

    /// `y = f(x)`: `a = x + 1; b = a * 2; y = a + b`.
    pub fn overlapping() -> TypedInstance {
        typed(function(
            "f",
            &["x"],
            &["y"],
            vec![
                assign("a", binary(BinaryOp::Add, ident("x"), num("1"))),
                assign("b", binary(BinaryOp::Mul, ident("a"), num("2"))),
                assign("y", binary(BinaryOp::Add, ident("a"), ident("b"))),
            ],
        ))
    }

    /// Hand-built join where one phi input is still read after the phi:
    ///
    /// ```text
    /// #0: x$1 = arg 0; c$1 = arg 1; branch c$1 #1 #2 #3
    /// #1:
    /// #2: z$1 = 2
    /// #3: y$3 = phi(x$1 #1, z$1 #2); y$ret = plus(y$3, x$1)
    /// ```
    pub fn join() -> TypedInstance {
        let mut body = FunctionBody::new("f", "test.m");
        body.inputs = vec!["x".into(), "c".into()];
        body.outputs = vec!["y".into()];
        let (t, e, j) = (body.add_block(), body.add_block(), body.add_block());
        let entry = body.block_mut(BlockId::ENTRY);
        entry.push(Instruction::Line { line: 1 });
        entry.push(Instruction::Argument {
            output: "x$1".into(),
            index: 0,
        });
        entry.push(Instruction::Argument {
            output: "c$1".into(),
            index: 1,
        });
        entry.push(Instruction::Branch {
            condition: "c$1".into(),
            true_block: t,
            false_block: e,
            end_block: j,
        });
        body.block_mut(e).push(Instruction::Line { line: 3 });
        body.block_mut(e).push(Instruction::Assign {
            output: "z$1".into(),
            value: AssignValue::Number("2".into()),
        });
        body.block_mut(j).push(Instruction::Phi {
            output: "y$3".into(),
            inputs: vec!["x$1".into(), "z$1".into()],
            sources: vec![t, e],
        });
        let signature = FunctionType::new(vec![double(), double()], vec![double()]);
        body.block_mut(j).push(Instruction::TypedCall {
            function: "plus".into(),
            signature,
            outputs: vec!["y$ret".into()],
            inputs: vec!["y$3".into(), "x$1".into()],
        });

        let types: IndexMap<String, VariableType> = ["x$1", "c$1", "z$1", "y$3", "y$ret"]
            .into_iter()
            .map(|n| (n.to_string(), double()))
            .collect();
        TypedInstance {
            key: TypedKey {
                function: FunctionIdentification::new("test.m", "f"),
                args: vec![double(), double()],
                nargout: 1,
            },
            body,
            types,
            function_type: FunctionType::new(vec![double(), double()], vec![double()]),
            callees: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use matisse_diagnostics::{ErrorCode, ToDiagnostic};
    use matisse_ssa::{source_name, BlockId};

    #[test]
    fn loop_accumulator_keeps_one_variable() {
        let inst = accumulate();
        let allocation = allocate(&inst).unwrap();
        let s_names: Vec<&str> = inst
            .types
            .keys()
            .map(String::as_str)
            .filter(|n| source_name(n) == Some("s") && allocation.variable_of(n).is_some())
            .collect();
        assert!(s_names.len() > 2);
        for name in &s_names {
            assert_eq!(allocation.name_of(name), Some("s"), "`{}` went elsewhere", name);
        }
    }

    #[test]
    fn parameters_come_first_and_keep_their_names() {
        let inst = accumulate();
        let allocation = allocate(&inst).unwrap();
        let first: Vec<&str> = allocation.variables()[..2].iter().map(|v| v.name.as_str()).collect();
        assert_eq!(first, vec!["x", "n"]);
    }

    #[test]
    fn values_alive_together_get_distinct_variables() {
        let inst = overlapping();
        let allocation = allocate(&inst).unwrap();
        let a = inst.types.keys().find(|n| n.starts_with("a$")).unwrap();
        let b = inst.types.keys().find(|n| n.starts_with("b$")).unwrap();
        assert!(!allocation.same_variable(a, b));
        let mut seen = HashSet::new();
        for variable in allocation.variables() {
            assert!(seen.insert(variable.name.clone()), "`{}` used twice", variable.name);
        }
    }

    #[test]
    fn untyped_names_are_rejected() {
        let mut inst = join();
        inst.types.shift_remove("z$1");
        let err = allocate(&inst).unwrap_err();
        assert_eq!(
            err,
            UnssaError::UntypedVariable {
                function: "f".into(),
                variable: "z$1".into(),
                line: 3,
            }
        );
        assert_eq!(err.to_diagnostic().code, Some(ErrorCode("E0502".to_string())));
    }

    #[test]
    fn unread_placeholders_need_no_storage() {
        let mut inst = join();
        inst.body.block_mut(BlockId::ENTRY).instructions.insert(
            1,
            Instruction::Assign {
                output: "w$0".into(),
                value: AssignValue::Undefined,
            },
        );
        let allocation = allocate(&inst).unwrap();
        assert!(allocation.variable_of("w$0").is_none());
    }
}
