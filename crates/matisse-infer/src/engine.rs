// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! The inference engine and its typed-instance cache.

use std::sync::Arc;

use matisse_cir::{BuildCache, InstanceRegistry, ProviderContext};
use matisse_types::VariableType;
use tracing::{debug, instrument};

use crate::error::InferError;
use crate::instance::{FunctionIdentification, TypedInstance, TypedKey};
use crate::source::FunctionSource;
use crate::walk::TypeWalker;

/// Specializes user functions for concrete argument types.
///
/// Each (function, argument types, output count) key is inferred at most
/// once. Asking for a key while it is still being inferred on the same
/// thread is a recursive specialization and fails with E0305.
pub struct InferenceEngine {
    registry: Arc<InstanceRegistry>,
    source: Arc<dyn FunctionSource>,
    context: ProviderContext,
    cache: BuildCache<TypedKey, TypedInstance>,
}

impl InferenceEngine {
    pub fn new(
        registry: Arc<InstanceRegistry>,
        source: Arc<dyn FunctionSource>,
        context: ProviderContext,
    ) -> Self {
        Self {
            registry,
            source,
            context,
            cache: BuildCache::new(),
        }
    }

    pub fn registry(&self) -> &Arc<InstanceRegistry> {
        &self.registry
    }

    pub fn source(&self) -> &Arc<dyn FunctionSource> {
        &self.source
    }

    pub fn context(&self) -> &ProviderContext {
        &self.context
    }

    /// Typed instance of `function` for `args`, returning `nargout` values.
    #[instrument(skip(self, args), fields(function = %function))]
    pub fn infer(
        &self,
        function: &FunctionIdentification,
        args: &[VariableType],
        nargout: usize,
    ) -> Result<Arc<TypedInstance>, InferError> {
        let body = self.source.body(function)?;
        let available = body.outputs.len();
        if nargout > available {
            return Err(InferError::TooManyOutputs {
                function: function.name.clone(),
                requested: nargout,
                available,
                line: 0,
            });
        }
        // a statement call still yields the first output, if there is one
        let key = TypedKey {
            function: function.clone(),
            args: args.to_vec(),
            nargout: nargout.max(1).min(available),
        };
        self.cache.get_or_try_build(
            &key,
            || {
                debug!(args = args.len(), nargout = key.nargout, "inferring types");
                TypeWalker::new(self, &key, body.clone()).run()
            },
            || InferError::RecursiveSpecialization {
                function: function.name.clone(),
                args: args.to_vec(),
                line: 0,
            },
        )
    }

    pub fn get(&self, key: &TypedKey) -> Option<Arc<TypedInstance>> {
        self.cache.get(key)
    }

    /// Every completed instance, in no particular order.
    pub fn instances(&self) -> Vec<Arc<TypedInstance>> {
        self.cache.values()
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
