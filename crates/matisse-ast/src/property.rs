// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Declarative properties attached by directive comments.
//!
//! The front end parses directives; passes only read these values.

/// Function-level property.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FunctionProperty {
    /// Every matrix index in the function is within bounds.
    AssumeIndicesInRange,
    /// Skip the optimization with this id for this function.
    DisableOptimization(String),
}

/// Loop-level property, attached to one `for` statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LoopProperty {
    EstimatedIterations(u64),
    /// The loop never merges with another loop.
    Infusible,
    /// Iterations are independent of each other.
    Parallel,
}

impl LoopProperty {
    /// Whether two properties describe the same aspect of a loop.
    pub fn same_kind(&self, other: &LoopProperty) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}
