// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Errors raised while resolving and building instances.

use matisse_diagnostics::{Diagnostic, ToDiagnostic};
use matisse_types::VariableType;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CirError {
    #[error("no provider accepts `{operation}` for ({})", format_types(.args))]
    NoProviderAccepts {
        operation: String,
        args: Vec<VariableType>,
        line: u32,
    },

    #[error("unknown function `{operation}`")]
    UnknownOperation { operation: String, line: u32 },

    #[error("`{operation}` cannot produce {requested} outputs")]
    TooManyOutputs {
        operation: String,
        requested: usize,
        line: u32,
    },

    #[error("output of `{operation}` is {actual}, which cannot be stored as the declared {declared}")]
    OutputTypeMismatch {
        operation: String,
        actual: VariableType,
        declared: VariableType,
        line: u32,
    },

    #[error("`{operation}` needs a dynamically allocated matrix, which is disabled")]
    DynamicDisabled { operation: String, line: u32 },

    #[error("instance `{operation}` is already being built")]
    RecursiveBuild { operation: String },

    #[error("provider for `{operation}` failed: {message}")]
    BuildFailed {
        operation: String,
        message: String,
        line: u32,
    },
}

impl CirError {
    pub fn line(&self) -> Option<u32> {
        match self {
            CirError::NoProviderAccepts { line, .. }
            | CirError::UnknownOperation { line, .. }
            | CirError::TooManyOutputs { line, .. }
            | CirError::OutputTypeMismatch { line, .. }
            | CirError::DynamicDisabled { line, .. }
            | CirError::BuildFailed { line, .. } => Some(*line),
            CirError::RecursiveBuild { .. } => None,
        }
    }

    /// Same error, tagged with `line` if it did not carry one.
    pub fn at_line(mut self, at: u32) -> Self {
        match &mut self {
            CirError::NoProviderAccepts { line, .. }
            | CirError::UnknownOperation { line, .. }
            | CirError::TooManyOutputs { line, .. }
            | CirError::OutputTypeMismatch { line, .. }
            | CirError::DynamicDisabled { line, .. }
            | CirError::BuildFailed { line, .. } => {
                if *line == 0 {
                    *line = at;
                }
            }
            CirError::RecursiveBuild { .. } => {}
        }
        self
    }
}

/// `(double, int32[1x3])`-style list, without the parentheses.
pub fn format_types(types: &[VariableType]) -> String {
    types
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl ToDiagnostic for CirError {
    fn to_diagnostic(&self) -> Diagnostic {
        let code = match self {
            CirError::NoProviderAccepts { .. } => "E0301",
            CirError::UnknownOperation { .. } => "E0102",
            CirError::TooManyOutputs { .. } => "E0302",
            CirError::OutputTypeMismatch { .. } => "E0304",
            CirError::DynamicDisabled { .. } => "E0300",
            CirError::RecursiveBuild { .. } => "E0305",
            CirError::BuildFailed { .. } => "E0900",
        };
        let mut diag = Diagnostic::error(self.to_string()).with_code(code);
        if let Some(line) = self.line() {
            diag = diag.with_line(line);
        }
        match self {
            CirError::NoProviderAccepts { .. } => {
                diag.with_help("check the argument types, or register a provider for them")
            }
            CirError::DynamicDisabled { .. } => {
                diag.with_help("enable `allow_dynamic_matrices` or give the matrix a fixed size")
            }
            _ => diag,
        }
    }
}
