// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Dead-code sweep over typed instances.

use std::collections::HashSet;

use matisse_infer::TypedInstance;
use matisse_ssa::pass::eliminate_dead_code;
use tracing::debug;

use crate::error::OptError;
use crate::pass::{PassContext, PassOutcome, PostTypePass};

pub struct DeadCodeElimination;

impl PostTypePass for DeadCodeElimination {
    fn name(&self) -> &'static str {
        "dead_code"
    }

    fn apply(&self, instance: &mut TypedInstance, _ctx: &PassContext<'_>) -> Result<PassOutcome, OptError> {
        let removed = eliminate_dead_code(&mut instance.body);
        if removed > 0 {
            let defined: HashSet<String> = instance
                .body
                .instructions()
                .flat_map(|(_, _, i)| i.outputs())
                .map(str::to_string)
                .collect();
            instance.types.retain(|name, _| defined.contains(name));
        }
        debug!(function = %instance.name(), removed, "dead typed code eliminated");
        Ok(PassOutcome::from_changed(removed > 0))
    }
}
