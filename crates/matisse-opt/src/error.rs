// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Post-type pass errors.
//!
//! A pass that merely finds nothing to do never errors; these are for
//! failures while rewriting, mostly from re-resolving calls.

use matisse_cir::CirError;
use matisse_diagnostics::{Diagnostic, ToDiagnostic};
use matisse_infer::InferError;
use matisse_ssa::SsaError;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OptError {
    #[error("pass `{pass}` failed: {message}")]
    PassFailed {
        pass: &'static str,
        message: String,
        line: u32,
    },

    #[error("pass `{pass}` reached an instruction it cannot handle: {instruction}")]
    UnsupportedInstruction {
        pass: &'static str,
        instruction: String,
        line: u32,
    },

    #[error(transparent)]
    Infer(#[from] InferError),

    #[error(transparent)]
    Provider(#[from] CirError),

    #[error(transparent)]
    Ssa(#[from] SsaError),
}

impl OptError {
    pub fn line(&self) -> Option<u32> {
        match self {
            OptError::PassFailed { line, .. } | OptError::UnsupportedInstruction { line, .. } => {
                Some(*line)
            }
            OptError::Infer(e) => e.line(),
            OptError::Provider(e) => e.line(),
            OptError::Ssa(e) => e.line(),
        }
    }
}

impl ToDiagnostic for OptError {
    fn to_diagnostic(&self) -> Diagnostic {
        let code = match self {
            OptError::Infer(e) => return e.to_diagnostic(),
            OptError::Provider(e) => return e.to_diagnostic(),
            OptError::Ssa(e) => return e.to_diagnostic(),
            OptError::PassFailed { .. } => "E0400",
            OptError::UnsupportedInstruction { .. } => "E0901",
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
    fn pass_failures_carry_code_and_line() {
        let d = OptError::PassFailed {
            pass: "loop_fusion",
            message: "lost a phi".into(),
            line: 7,
        }
        .to_diagnostic();
        assert_eq!(d.code, Some(ErrorCode("E0400".to_string())));
        assert_eq!(d.line, Some(7));
        assert!(d.message.contains("loop_fusion"));
    }

    #[test]
    fn wrapped_errors_keep_their_code() {
        let e: OptError = SsaError::Invariant {
            function: "f".into(),
            message: "bad".into(),
        }
        .into();
        assert_eq!(e.to_diagnostic().code, Some(ErrorCode("E0902".to_string())));
    }
}
