// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Errors of a top-level compile.

use matisse_ast::pass::AstPassError;
use matisse_cir::CirError;
use matisse_diagnostics::{Diagnostic, ToDiagnostic};
use matisse_infer::InferError;
use matisse_opt::OptError;
use matisse_ssa::SsaError;
use matisse_unssa::UnssaError;

/// Failure while turning an allocated instance into C.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EmitError {
    #[error("`{function}` still contains `{instruction}`, which has no C form")]
    UnsupportedInstruction {
        function: String,
        instruction: String,
        line: u32,
    },

    #[error("`{name}` in `{function}` was not given a variable")]
    Unallocated { function: String, name: String, line: u32 },

    #[error("no compiled instance of `{callee}` matches the call in `{function}`")]
    MissingCallee {
        function: String,
        callee: String,
        line: u32,
    },

    #[error(transparent)]
    Provider(#[from] CirError),
}

impl EmitError {
    pub fn line(&self) -> Option<u32> {
        match self {
            EmitError::UnsupportedInstruction { line, .. }
            | EmitError::Unallocated { line, .. }
            | EmitError::MissingCallee { line, .. } => Some(*line),
            EmitError::Provider(e) => e.line(),
        }
    }
}

impl ToDiagnostic for EmitError {
    fn to_diagnostic(&self) -> Diagnostic {
        let code = match self {
            EmitError::Provider(e) => return e.to_diagnostic(),
            EmitError::UnsupportedInstruction { .. } => "E0901",
            EmitError::Unallocated { .. } => "E0902",
            EmitError::MissingCallee { .. } => "E0900",
        };
        let mut diag = Diagnostic::error(self.to_string()).with_code(code);
        if let Some(line) = self.line().filter(|l| *l > 0) {
            diag = diag.with_line(line);
        }
        diag
    }
}

/// Anything that aborts a compile.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    #[error("parameter `{parameter}` of entry function `{function}` has no type")]
    UntypedParameter { function: String, parameter: String },

    #[error("`{function}` is compiled while its own compilation is in progress")]
    RecursiveCompile { function: String },

    #[error(transparent)]
    Ast(#[from] AstPassError),

    #[error(transparent)]
    Ssa(#[from] SsaError),

    #[error(transparent)]
    Infer(#[from] InferError),

    #[error(transparent)]
    Provider(#[from] CirError),

    #[error(transparent)]
    Opt(#[from] OptError),

    #[error(transparent)]
    Allocation(#[from] UnssaError),

    #[error(transparent)]
    Emit(#[from] EmitError),
}

impl CompileError {
    pub fn line(&self) -> Option<u32> {
        match self {
            CompileError::UntypedParameter { .. } | CompileError::RecursiveCompile { .. } => None,
            CompileError::Ast(e) => Some(e.line()),
            CompileError::Ssa(e) => e.line(),
            CompileError::Infer(e) => e.line(),
            CompileError::Provider(e) => e.line(),
            CompileError::Opt(e) => e.line(),
            CompileError::Allocation(e) => e.line(),
            CompileError::Emit(e) => e.line(),
        }
    }
}

impl ToDiagnostic for CompileError {
    fn to_diagnostic(&self) -> Diagnostic {
        match self {
            CompileError::UntypedParameter { .. } => Diagnostic::error(self.to_string())
                .with_code("E0103")
                .with_help("pass a type for every parameter of the entry function"),
            CompileError::RecursiveCompile { .. } => {
                Diagnostic::error(self.to_string()).with_code("E0900")
            }
            CompileError::Ast(e) => e.to_diagnostic(),
            CompileError::Ssa(e) => e.to_diagnostic(),
            CompileError::Infer(e) => e.to_diagnostic(),
            CompileError::Provider(e) => e.to_diagnostic(),
            CompileError::Opt(e) => e.to_diagnostic(),
            CompileError::Allocation(e) => e.to_diagnostic(),
            CompileError::Emit(e) => e.to_diagnostic(),
        }
    }
}
