// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Type inference errors.

use matisse_ast::pass::AstPassError;
use matisse_cir::{format_types, CirError};
use matisse_diagnostics::{Diagnostic, ToDiagnostic};
use matisse_ssa::SsaError;
use matisse_types::VariableType;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InferError {
    #[error("{message}")]
    MismatchedTypes { message: String, line: u32 },

    #[error("variable `{variable}` is used before it is defined")]
    UsedBeforeDefinition { variable: String, line: u32 },

    #[error("`{function}` called with {requested} outputs, but it declares {available}")]
    TooManyOutputs {
        function: String,
        requested: usize,
        available: usize,
        line: u32,
    },

    #[error("`{function}` is specialized for ({}) while that specialization is still being inferred", format_types(.args))]
    RecursiveSpecialization {
        function: String,
        args: Vec<VariableType>,
        line: u32,
    },

    #[error("output `{output}` of `{function}` is never defined")]
    OutputNeverDefined { function: String, output: String },

    #[error("global `{global}` has no declared type")]
    UndeclaredGlobal { global: String, line: u32 },

    #[error("`{variable}` merges values of types ({}) that have no common type", format_types(.types))]
    NoCommonType {
        variable: String,
        types: Vec<VariableType>,
        line: u32,
    },

    #[error("`{matrix}` has {ndims} dimensions but is accessed with {count} indices")]
    Dimensionality {
        matrix: String,
        ndims: usize,
        count: usize,
        line: u32,
    },

    #[error("types of loop-carried values in `{function}` did not settle")]
    LoopDiverged { function: String, line: u32 },

    #[error("invalid numeric literal `{text}`")]
    InvalidLiteral { text: String, line: u32 },

    #[error("no source file `{file}`")]
    UnknownFile { file: String },

    #[error("`{file}` defines no function `{function}`")]
    UnknownFunction { file: String, function: String },

    #[error("type inference reached an instruction it cannot type: {instruction}")]
    UnsupportedInstruction { instruction: String, line: u32 },

    #[error(transparent)]
    Provider(#[from] CirError),

    #[error(transparent)]
    Ssa(#[from] SsaError),

    #[error(transparent)]
    Ast(#[from] AstPassError),
}

impl InferError {
    pub fn line(&self) -> Option<u32> {
        match self {
            InferError::MismatchedTypes { line, .. }
            | InferError::UsedBeforeDefinition { line, .. }
            | InferError::TooManyOutputs { line, .. }
            | InferError::RecursiveSpecialization { line, .. }
            | InferError::UndeclaredGlobal { line, .. }
            | InferError::NoCommonType { line, .. }
            | InferError::Dimensionality { line, .. }
            | InferError::LoopDiverged { line, .. }
            | InferError::InvalidLiteral { line, .. }
            | InferError::UnsupportedInstruction { line, .. } => Some(*line),
            InferError::OutputNeverDefined { .. }
            | InferError::UnknownFile { .. }
            | InferError::UnknownFunction { .. } => None,
            InferError::Provider(e) => e.line(),
            InferError::Ssa(e) => e.line(),
            InferError::Ast(e) => Some(e.line()),
        }
    }
}

impl InferError {
    /// Same error, tagged with `at` if it was raised without a line.
    pub fn at_line(mut self, at: u32) -> Self {
        match &mut self {
            InferError::TooManyOutputs { line, .. }
            | InferError::RecursiveSpecialization { line, .. } => {
                if *line == 0 {
                    *line = at;
                }
            }
            InferError::Provider(e) => return InferError::Provider(e.clone().at_line(at)),
            _ => {}
        }
        self
    }
}

impl ToDiagnostic for InferError {
    fn to_diagnostic(&self) -> Diagnostic {
        let code = match self {
            InferError::Provider(e) => return e.to_diagnostic(),
            InferError::Ssa(e) => return e.to_diagnostic(),
            InferError::Ast(e) => return e.to_diagnostic(),
            InferError::UnknownFile { .. } => "E0101",
            InferError::UnknownFunction { .. } => "E0102",
            InferError::MismatchedTypes { .. } => "E0300",
            InferError::TooManyOutputs { .. } => "E0302",
            InferError::UsedBeforeDefinition { .. } => "E0303",
            InferError::RecursiveSpecialization { .. } => "E0305",
            InferError::OutputNeverDefined { .. } => "E0306",
            InferError::UndeclaredGlobal { .. } => "E0307",
            InferError::NoCommonType { .. } => "E0308",
            InferError::Dimensionality { .. } => "E0309",
            InferError::InvalidLiteral { .. } => "E0310",
            InferError::LoopDiverged { .. } => "E0900",
            InferError::UnsupportedInstruction { .. } => "E0901",
        };
        let mut diag = Diagnostic::error(self.to_string()).with_code(code);
        if let Some(line) = self.line() {
            diag = diag.with_line(line);
        }
        match self {
            InferError::RecursiveSpecialization { .. } => diag.with_help(
                "recursive functions cannot be specialized; rewrite the recursion as a loop",
            ),
            InferError::UndeclaredGlobal { .. } => {
                diag.with_help("declare the global's type in the `global_types` setting")
            }
            InferError::OutputNeverDefined { .. } => {
                diag.with_help("assign the output on every path through the function")
            }
            _ => diag,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matisse_diagnostics::ErrorCode;
    use matisse_types::NumericClass;

    #[test]
    fn codes_and_lines() {
        let e = InferError::RecursiveSpecialization {
            function: "fact".into(),
            args: vec![VariableType::scalar(NumericClass::Double)],
            line: 4,
        };
        let d = e.to_diagnostic();
        assert_eq!(d.code, Some(ErrorCode("E0305".to_string())));
        assert_eq!(d.line, Some(4));
        assert!(d.message.contains("fact"));
    }

    #[test]
    fn provider_errors_keep_their_code() {
        let e: InferError = CirError::UnknownOperation {
            operation: "foo".into(),
            line: 2,
        }
        .into();
        assert_eq!(e.line(), Some(2));
        assert_eq!(e.to_diagnostic().code, Some(ErrorCode("E0102".to_string())));
    }
}
