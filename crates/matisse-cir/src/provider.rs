// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! The provider contract.

use matisse_types::VariableType;

use crate::context::ProviderContext;
use crate::error::CirError;
use crate::function_type::FunctionType;
use crate::instance::{FunctionInstance, InstanceKey};

/// Type-checker plus instance builder for one generic operation.
///
/// `accepts` must not build anything and must not fail: it only answers
/// whether this provider handles the call. `output_types` and `build` are
/// only called after `accepts` returned true for the same context.
pub trait InstanceProvider: Send + Sync {
    /// Short description used in logs.
    fn describe(&self) -> &str;

    fn accepts(&self, ctx: &ProviderContext) -> bool;

    fn output_types(&self, ctx: &ProviderContext) -> Result<Vec<VariableType>, CirError>;

    fn has_side_effects(&self) -> bool {
        false
    }

    /// Whether input constants change the built code and so belong in the
    /// instance key. Most providers only see constants through their outputs.
    fn keeps_input_constants(&self) -> bool {
        false
    }

    /// Builds the instance for `key`, whose signature came from `function_type`.
    fn build(&self, key: &InstanceKey, ctx: &ProviderContext) -> Result<FunctionInstance, CirError>;

    fn function_type(&self, ctx: &ProviderContext) -> Result<FunctionType, CirError> {
        let ft = FunctionType::new(ctx.args().to_vec(), self.output_types(ctx)?);
        Ok(if self.has_side_effects() {
            ft.with_side_effects()
        } else {
            ft
        })
    }
}
