// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Allocation errors.

use matisse_diagnostics::{Diagnostic, ToDiagnostic};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UnssaError {
    #[error("invalid control flow in `{function}`: {message}")]
    InvalidControlFlow {
        function: String,
        message: String,
        line: u32,
    },

    #[error("phi `{phi}` in `{function}` has {inputs} inputs for {predecessors} predecessors")]
    PhiArity {
        function: String,
        phi: String,
        inputs: usize,
        predecessors: usize,
        line: u32,
    },

    #[error("`{variable}` in `{function}` has no type")]
    UntypedVariable {
        function: String,
        variable: String,
        line: u32,
    },

    #[error("`{variable}` is read in `{function}` before any definition")]
    LiveAtEntry { function: String, variable: String },
}

impl UnssaError {
    pub fn line(&self) -> Option<u32> {
        match self {
            UnssaError::InvalidControlFlow { line, .. }
            | UnssaError::PhiArity { line, .. }
            | UnssaError::UntypedVariable { line, .. } => Some(*line),
            UnssaError::LiveAtEntry { .. } => None,
        }
    }
}

impl ToDiagnostic for UnssaError {
    fn to_diagnostic(&self) -> Diagnostic {
        let code = match self {
            UnssaError::InvalidControlFlow { .. } => "E0500",
            UnssaError::PhiArity { .. } => "E0501",
            UnssaError::UntypedVariable { .. } => "E0502",
            UnssaError::LiveAtEntry { .. } => "E0902",
        };
        let mut diag = Diagnostic::error(self.to_string()).with_code(code);
        if let Some(line) = self.line().filter(|l| *l > 0) {
            diag = diag.with_line(line);
        }
        diag
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matisse_diagnostics::ErrorCode;

    #[test]
    fn codes() {
        let arity = UnssaError::PhiArity {
            function: "f".into(),
            phi: "y$2".into(),
            inputs: 1,
            predecessors: 2,
            line: 4,
        }
        .to_diagnostic();
        assert_eq!(arity.code, Some(ErrorCode("E0501".to_string())));
        assert_eq!(arity.line, Some(4));

        let entry = UnssaError::LiveAtEntry {
            function: "f".into(),
            variable: "q$1".into(),
        }
        .to_diagnostic();
        assert_eq!(entry.code, Some(ErrorCode("E0902".to_string())));
        assert_eq!(entry.line, None);
    }
}
