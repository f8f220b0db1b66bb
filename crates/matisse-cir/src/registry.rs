// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Instance registry and output graph collection.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use matisse_types::VariableType;
use tracing::debug;

use crate::context::ProviderContext;
use crate::error::CirError;
use crate::function_type::FunctionType;
use crate::instance::{FunctionInstance, InstanceKey};
use crate::memo::BuildCache;
use crate::provider::InstanceProvider;
use crate::table::ProviderTable;

/// A call resolved against the table, not yet built.
#[derive(Clone)]
pub struct ResolvedCall {
    pub provider: Arc<dyn InstanceProvider>,
    pub key: InstanceKey,
}

impl ResolvedCall {
    pub fn outputs(&self) -> &[VariableType] {
        &self.key.signature.outputs
    }
}

/// Builds each (operation, signature) pair at most once.
pub struct InstanceRegistry {
    table: ProviderTable,
    cache: BuildCache<InstanceKey, FunctionInstance>,
}

impl InstanceRegistry {
    pub fn new(table: ProviderTable) -> Self {
        Self {
            table,
            cache: BuildCache::new(),
        }
    }

    pub fn table(&self) -> &ProviderTable {
        &self.table
    }

    /// Finds the provider for `operation` and computes the call signature.
    pub fn resolve(&self, operation: &str, ctx: &ProviderContext) -> Result<ResolvedCall, CirError> {
        let provider = self.table.resolve(operation, ctx)?;
        let signature = provider.function_type(ctx)?;
        let signature = if provider.keeps_input_constants() {
            signature
        } else {
            stripped(signature)
        };
        if ctx.nargout() > signature.outputs.len().max(1) {
            return Err(CirError::TooManyOutputs {
                operation: operation.to_string(),
                requested: ctx.nargout(),
                line: ctx.line(),
            });
        }
        Ok(ResolvedCall {
            provider,
            key: InstanceKey::new(operation, signature),
        })
    }

    /// Resolves and builds, reusing an earlier instance with the same key.
    pub fn instance(
        &self,
        operation: &str,
        ctx: &ProviderContext,
    ) -> Result<Arc<FunctionInstance>, CirError> {
        let call = self.resolve(operation, ctx)?;
        self.build(&call, ctx)
    }

    pub fn build(
        &self,
        call: &ResolvedCall,
        ctx: &ProviderContext,
    ) -> Result<Arc<FunctionInstance>, CirError> {
        self.cache
            .get_or_try_build(
                &call.key,
                || {
                    debug!(operation = %call.key.operation, provider = call.provider.describe(), "building instance");
                    call.provider.build(&call.key, ctx)
                },
                || CirError::RecursiveBuild {
                    operation: call.key.operation.clone(),
                },
            )
            .map_err(|e| e.at_line(ctx.line()))
    }

    /// Registers an instance built outside the table, such as a user function.
    pub fn get_or_insert_with(
        &self,
        key: &InstanceKey,
        build: impl FnOnce() -> Result<FunctionInstance, CirError>,
    ) -> Result<Arc<FunctionInstance>, CirError> {
        self.cache.get_or_try_build(key, build, || CirError::RecursiveBuild {
            operation: key.operation.clone(),
        })
    }

    pub fn get(&self, key: &InstanceKey) -> Option<Arc<FunctionInstance>> {
        self.cache.get(key)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn clear(&self) {
        self.cache.clear();
    }
}

/// Input constants never change emitted code except through the outputs,
/// so they are dropped from the identity.
fn stripped(mut signature: FunctionType) -> FunctionType {
    for input in &mut signature.inputs {
        *input = input.without_constant();
    }
    signature
}

/// The transitive dependency closure of some root instances, deduplicated
/// by key and ordered so every instance follows its dependencies.
#[derive(Debug, Default)]
pub struct InstanceGraph {
    pub instances: Vec<Arc<FunctionInstance>>,
    pub includes: BTreeSet<String>,
}

impl InstanceGraph {
    pub fn collect(roots: &[Arc<FunctionInstance>]) -> Self {
        let mut graph = InstanceGraph::default();
        let mut seen = HashSet::new();
        for root in roots {
            graph.visit(root, &mut seen);
        }
        graph
    }

    fn visit(&mut self, instance: &Arc<FunctionInstance>, seen: &mut HashSet<InstanceKey>) {
        if !seen.insert(instance.key().clone()) {
            return;
        }
        for dep in instance.dependencies() {
            self.visit(dep, seen);
        }
        self.includes.extend(instance.includes().iter().cloned());
        self.instances.push(instance.clone());
    }

    /// Instances that emit code of their own.
    pub fn emitted(&self) -> impl Iterator<Item = &Arc<FunctionInstance>> {
        self.instances.iter().filter(|i| !i.is_inline())
    }

    /// How many emitted instances carry `key`.
    pub fn definition_count(&self, key: &InstanceKey) -> usize {
        self.emitted().filter(|i| i.key() == key).count()
    }

    /// Declarations, then implementations, in dependency order.
    pub fn to_c(&self) -> String {
        let mut out = String::new();
        for header in &self.includes {
            out.push_str(&format!("#include <{}>\n", header));
        }
        for instance in self.emitted() {
            if let Some(decl) = instance.declaration_code() {
                out.push('\n');
                out.push_str(&decl);
                out.push('\n');
            }
        }
        for instance in self.emitted() {
            if let Some(body) = instance.implementation_code() {
                out.push('\n');
                out.push_str(body);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins;
    use matisse_types::NumericClass;

    fn registry() -> InstanceRegistry {
        InstanceRegistry::new(builtins::standard_table())
    }

    fn double() -> VariableType {
        VariableType::scalar(NumericClass::Double)
    }

    #[test]
    fn same_key_same_instance() {
        let reg = registry();
        let ctx = ProviderContext::detached().with_args(vec![double(), double()]);
        let a = reg.instance("plus", &ctx).unwrap();
        let b = reg.instance("plus", &ctx).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn input_constants_do_not_split_standalone_keys() {
        let reg = registry();
        let m = VariableType::Matrix(matisse_types::MatrixType::fixed(NumericClass::Double, &[1, 3]));
        let ctx = ProviderContext::detached();
        let one = ctx.with_args(vec![m.clone(), VariableType::real_constant(NumericClass::Double, 1.0)]);
        let two = ctx.with_args(vec![m, VariableType::real_constant(NumericClass::Double, 2.0)]);
        let a = reg.instance("plus", &one).unwrap();
        let b = reg.instance("plus", &two).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn graph_dedups_and_orders() {
        let reg = registry();
        let dyn_m = VariableType::Matrix(matisse_types::MatrixType::dynamic(
            NumericClass::Double,
            matisse_types::Shape::unknown(2),
        ));
        let ctx = ProviderContext::detached().with_args(vec![dyn_m.clone(), dyn_m]);
        let plus = reg.instance("plus", &ctx).unwrap();
        let minus = reg.instance("minus", &ctx).unwrap();
        let graph = InstanceGraph::collect(&[plus.clone(), minus, plus.clone()]);
        assert_eq!(graph.definition_count(plus.key()), 1);
        let struct_pos = graph
            .instances
            .iter()
            .position(|i| i.key().operation == "tensor_d")
            .unwrap();
        let plus_pos = graph.instances.iter().position(|i| Arc::ptr_eq(i, &plus)).unwrap();
        assert!(struct_pos < plus_pos);
        assert_eq!(
            graph
                .instances
                .iter()
                .filter(|i| i.key().operation == "tensor_d")
                .count(),
            1
        );
        assert!(graph.includes.contains("stdlib.h"));
        let c = graph.to_c();
        assert_eq!(c.matches("typedef struct tensor_d").count(), 1);
    }
}
