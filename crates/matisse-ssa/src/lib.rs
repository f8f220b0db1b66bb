// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! SSA form of one MATLAB function.
//!
//! A `FunctionBody` is a flat list of blocks. Control instructions (branch,
//! for, while) sit at the end of a block and own the blocks of their arms or
//! loop body, so the blocks also form a tree that mirrors the source nesting.
//! Phi placement follows that nesting directly; no dominance computation is
//! needed anywhere.

mod body;
mod builder;
pub mod cfg;
mod display;
mod error;
mod instruction;
pub mod pass;
mod validate;

pub use body::{Block, BlockId, FunctionBody};
pub use builder::build_ssa;
pub use error::SsaError;
pub use instruction::{AssignValue, Instruction, InstructionType};
pub use validate::validate;

/// Suffix of the names holding a function's return values.
pub const RETURN_SUFFIX: &str = "$ret";

/// Prefix of names derived from global variables.
pub const GLOBAL_PREFIX: char = '^';

/// Source variable a versioned SSA name was derived from:
/// `x$3` and `^g$1` give `x` and `g`; temporaries give `None`.
pub fn source_name(ssa: &str) -> Option<&str> {
    if ssa.starts_with('$') {
        return None;
    }
    let base = ssa.split('$').next()?;
    Some(base.trim_start_matches(GLOBAL_PREFIX))
}

pub fn is_temporary(ssa: &str) -> bool {
    ssa.starts_with('$')
}

pub fn is_global_derived(ssa: &str) -> bool {
    ssa.starts_with(GLOBAL_PREFIX)
}

pub fn return_name(output: &str) -> String {
    format!("{}{}", output, RETURN_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_kinds() {
        assert_eq!(source_name("x$3"), Some("x"));
        assert_eq!(source_name("^g$1"), Some("g"));
        assert_eq!(source_name("y$ret"), Some("y"));
        assert_eq!(source_name("$call$4"), None);
        assert!(is_temporary("$number$1"));
        assert!(is_global_derived("^g$1"));
        assert_eq!(return_name("y"), "y$ret");
    }
}
