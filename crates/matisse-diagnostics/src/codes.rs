// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Error code registry.
//!
//! Maps error codes (E0201, E0301, etc.) to titles and categories.

use std::collections::HashMap;

/// Registry of all known error codes.
pub struct ErrorCodeRegistry {
    codes: HashMap<&'static str, ErrorCodeInfo>,
}

/// Information about a single error code.
pub struct ErrorCodeInfo {
    pub code: &'static str,
    pub title: &'static str,
    pub category: ErrorCategory,
}

/// Error category for grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Syntax,
    Ssa,
    Type,
    Optimization,
    Allocation,
    Internal,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Syntax => write!(f, "Syntax"),
            ErrorCategory::Ssa => write!(f, "SSA"),
            ErrorCategory::Type => write!(f, "Type"),
            ErrorCategory::Optimization => write!(f, "Optimization"),
            ErrorCategory::Allocation => write!(f, "Allocation"),
            ErrorCategory::Internal => write!(f, "Internal"),
        }
    }
}

macro_rules! register_codes {
    ($($code:literal => ($title:literal, $cat:expr)),* $(,)?) => {{
        let mut map = HashMap::new();
        $(
            map.insert($code, ErrorCodeInfo {
                code: $code,
                title: $title,
                category: $cat,
            });
        )*
        map
    }};
}

impl Default for ErrorCodeRegistry {
    fn default() -> Self {
        use ErrorCategory::*;

        Self {
            codes: register_codes! {
                // Syntax-tree passes (E01xx)
                "E0100" => ("syntax tree pass failed", Syntax),
                "E0101" => ("unknown source file", Syntax),
                "E0102" => ("unknown function", Syntax),
                "E0103" => ("entry parameter without a type", Syntax),

                // SSA construction (E02xx)
                "E0200" => ("unsupported construct", Ssa),
                "E0201" => ("break outside of loop", Ssa),
                "E0202" => ("continue outside of loop", Ssa),
                "E0203" => ("invalid assignment target", Ssa),
                "E0204" => ("for loop over a non-range expression", Ssa),
                "E0205" => ("return must be removed before SSA construction", Ssa),

                // Type inference and providers (E03xx)
                "E0300" => ("mismatched types", Type),
                "E0301" => ("no provider accepts call", Type),
                "E0302" => ("arity mismatch", Type),
                "E0303" => ("variable used before definition", Type),
                "E0304" => ("output type mismatch", Type),
                "E0305" => ("unsupported recursive specialization", Type),
                "E0306" => ("output never defined", Type),
                "E0307" => ("undeclared global type", Type),
                "E0308" => ("ambiguous output type", Type),
                "E0309" => ("matrix access dimensionality mismatch", Type),
                "E0310" => ("invalid literal", Type),

                // Post-type passes (E04xx)
                "E0400" => ("optimization pass failed", Optimization),

                // Allocation and emission (E05xx)
                "E0500" => ("invalid control-flow graph", Allocation),
                "E0501" => ("phi argument count mismatch", Allocation),
                "E0502" => ("untyped variable at allocation", Allocation),

                // Internal invariant violations (E09xx)
                "E0900" => ("internal compiler error", Internal),
                "E0901" => ("pass applied to unsupported instruction", Internal),
                "E0902" => ("SSA invariant violated", Internal),
            },
        }
    }
}

impl ErrorCodeRegistry {
    pub fn get(&self, code: &str) -> Option<&ErrorCodeInfo> {
        self.codes.get(code)
    }

    pub fn all(&self) -> impl Iterator<Item = &ErrorCodeInfo> {
        self.codes.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_known_code() {
        let registry = ErrorCodeRegistry::default();
        let info = registry.get("E0305").unwrap();
        assert_eq!(info.title, "unsupported recursive specialization");
        assert_eq!(info.category, ErrorCategory::Type);
    }

    #[test]
    fn codes_match_their_range() {
        let registry = ErrorCodeRegistry::default();
        for info in registry.all() {
            let expected = match &info.code[..3] {
                "E01" => ErrorCategory::Syntax,
                "E02" => ErrorCategory::Ssa,
                "E03" => ErrorCategory::Type,
                "E04" => ErrorCategory::Optimization,
                "E05" => ErrorCategory::Allocation,
                _ => ErrorCategory::Internal,
            };
            assert_eq!(info.category, expected, "{}", info.code);
        }
    }
}
