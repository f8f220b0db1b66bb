// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Where the engine gets user functions from.

use std::sync::Arc;

use matisse_ssa::FunctionBody;

use crate::error::InferError;
use crate::instance::FunctionIdentification;

/// User functions visible to the engine.
pub trait FunctionSource: Send + Sync {
    /// The user function a call to `name` inside `caller` refers to.
    /// `None` means the name is left to the built-in providers.
    fn resolve(&self, caller: &FunctionIdentification, name: &str) -> Option<FunctionIdentification>;

    /// Untyped SSA of `function`, with the pre-type passes applied.
    fn body(&self, function: &FunctionIdentification) -> Result<Arc<FunctionBody>, InferError>;
}
