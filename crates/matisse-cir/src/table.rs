// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! The immutable operation table.

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::trace;

use crate::context::ProviderContext;
use crate::error::CirError;
use crate::provider::InstanceProvider;

/// Ordered providers per operation name. Built once, never mutated.
#[derive(Clone, Default)]
pub struct ProviderTable {
    entries: Arc<IndexMap<String, Vec<Arc<dyn InstanceProvider>>>>,
}

/// Collects providers before freezing them into a `ProviderTable`.
#[derive(Default)]
pub struct ProviderTableBuilder {
    entries: IndexMap<String, Vec<Arc<dyn InstanceProvider>>>,
}

impl ProviderTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `provider` after those already registered for `name`.
    pub fn add(mut self, name: &str, provider: impl InstanceProvider + 'static) -> Self {
        self.entries
            .entry(name.to_string())
            .or_default()
            .push(Arc::new(provider));
        self
    }

    /// Adds `provider` ahead of those already registered for `name`.
    pub fn prepend(mut self, name: &str, provider: impl InstanceProvider + 'static) -> Self {
        self.entries
            .entry(name.to_string())
            .or_default()
            .insert(0, Arc::new(provider));
        self
    }

    /// Adds the same provider under several names.
    pub fn add_shared(mut self, names: &[&str], provider: Arc<dyn InstanceProvider>) -> Self {
        for name in names {
            self.entries
                .entry(name.to_string())
                .or_default()
                .push(provider.clone());
        }
        self
    }

    /// Appends every entry of `other`, keeping its order.
    pub fn extend(mut self, other: ProviderTableBuilder) -> Self {
        for (name, providers) in other.entries {
            self.entries.entry(name).or_default().extend(providers);
        }
        self
    }

    pub fn build(self) -> ProviderTable {
        ProviderTable {
            entries: Arc::new(self.entries),
        }
    }
}

impl ProviderTable {
    pub fn builder() -> ProviderTableBuilder {
        ProviderTableBuilder::new()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// The first provider for `name` that accepts `ctx`.
    pub fn resolve(
        &self,
        name: &str,
        ctx: &ProviderContext,
    ) -> Result<Arc<dyn InstanceProvider>, CirError> {
        let providers = self
            .entries
            .get(name)
            .ok_or_else(|| CirError::UnknownOperation {
                operation: name.to_string(),
                line: ctx.line(),
            })?;
        for provider in providers {
            if provider.accepts(ctx) {
                trace!(operation = name, provider = provider.describe(), "resolved");
                return Ok(provider.clone());
            }
        }
        Err(CirError::NoProviderAccepts {
            operation: name.to_string(),
            args: ctx.args().to_vec(),
            line: ctx.line(),
        })
    }
}

impl std::fmt::Debug for ProviderTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderTable")
            .field("operations", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::{FunctionInstance, InlineForm, InstanceKey};
    use matisse_types::{NumericClass, VariableType};

    struct Fixed {
        label: &'static str,
        accept: bool,
    }

    impl InstanceProvider for Fixed {
        fn describe(&self) -> &str {
            self.label
        }
        fn accepts(&self, _ctx: &ProviderContext) -> bool {
            self.accept
        }
        fn output_types(&self, _ctx: &ProviderContext) -> Result<Vec<VariableType>, CirError> {
            Ok(vec![VariableType::scalar(NumericClass::Double)])
        }
        fn build(&self, key: &InstanceKey, _ctx: &ProviderContext) -> Result<FunctionInstance, CirError> {
            Ok(FunctionInstance::inline(key.clone(), InlineForm::Identity))
        }
    }

    fn fixed(label: &'static str, accept: bool) -> Fixed {
        Fixed { label, accept }
    }

    #[test]
    fn first_accepting_wins() {
        let table = ProviderTable::builder()
            .add("f", fixed("a", false))
            .add("f", fixed("b", true))
            .add("f", fixed("c", true))
            .build();
        let p = table.resolve("f", &ProviderContext::detached()).unwrap();
        assert_eq!(p.describe(), "b");
    }

    #[test]
    fn prepend_takes_priority() {
        let table = ProviderTable::builder()
            .add("f", fixed("a", true))
            .prepend("f", fixed("override", true))
            .build();
        let p = table.resolve("f", &ProviderContext::detached()).unwrap();
        assert_eq!(p.describe(), "override");
    }

    #[test]
    fn no_acceptor_names_operation_and_types() {
        let table = ProviderTable::builder().add("f", fixed("a", false)).build();
        let ctx = ProviderContext::detached()
            .with_args(vec![VariableType::scalar(NumericClass::Int8)])
            .with_line(12);
        let err = table.resolve("f", &ctx).err().unwrap();
        assert_eq!(err.to_string(), "no provider accepts `f` for (int8)");
        assert_eq!(err.line(), Some(12));
    }

    #[test]
    fn unknown_operation() {
        let table = ProviderTable::builder().build();
        assert!(matches!(
            table.resolve("g", &ProviderContext::detached()),
            Err(CirError::UnknownOperation { .. })
        ));
        assert!(!table.contains("g"));
    }
}
