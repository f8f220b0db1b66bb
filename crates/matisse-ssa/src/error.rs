// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! SSA construction and validation errors.

use matisse_ast::Span;
use matisse_diagnostics::{Diagnostic, ToDiagnostic};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SsaError {
    #[error("unsupported construct: {construct}")]
    Unsupported { construct: String, line: u32, span: Span },

    #[error("`break` outside of a loop")]
    BreakOutsideLoop { line: u32, span: Span },

    #[error("`continue` outside of a loop")]
    ContinueOutsideLoop { line: u32, span: Span },

    #[error("invalid assignment target: {message}")]
    InvalidTarget { message: String, line: u32, span: Span },

    #[error("for loop over a non-range expression")]
    NonRangeFor { line: u32, span: Span },

    #[error("`return` reached SSA construction")]
    ReturnNotRemoved { line: u32, span: Span },

    #[error("SSA invariant violated in `{function}`: {message}")]
    Invariant { function: String, message: String },
}

impl SsaError {
    pub fn line(&self) -> Option<u32> {
        self.location().map(|(line, _)| line)
    }

    /// Source range of the offending statement or expression.
    pub fn span(&self) -> Option<Span> {
        self.location().map(|(_, span)| span).filter(|s| !s.is_empty())
    }

    fn location(&self) -> Option<(u32, Span)> {
        match self {
            SsaError::Unsupported { line, span, .. }
            | SsaError::BreakOutsideLoop { line, span }
            | SsaError::ContinueOutsideLoop { line, span }
            | SsaError::InvalidTarget { line, span, .. }
            | SsaError::NonRangeFor { line, span }
            | SsaError::ReturnNotRemoved { line, span } => Some((*line, *span)),
            SsaError::Invariant { .. } => None,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            SsaError::Unsupported { .. } => "not supported here",
            SsaError::BreakOutsideLoop { .. } | SsaError::ContinueOutsideLoop { .. } => "not inside any loop",
            SsaError::InvalidTarget { .. } => "cannot be assigned",
            SsaError::NonRangeFor { .. } => "expected a range",
            SsaError::ReturnNotRemoved { .. } => "still present",
            SsaError::Invariant { .. } => "",
        }
    }
}

impl ToDiagnostic for SsaError {
    fn to_diagnostic(&self) -> Diagnostic {
        let code = match self {
            SsaError::Unsupported { .. } => "E0200",
            SsaError::BreakOutsideLoop { .. } => "E0201",
            SsaError::ContinueOutsideLoop { .. } => "E0202",
            SsaError::InvalidTarget { .. } => "E0203",
            SsaError::NonRangeFor { .. } => "E0204",
            SsaError::ReturnNotRemoved { .. } => "E0205",
            SsaError::Invariant { .. } => "E0902",
        };
        let mut diag = Diagnostic::error(self.to_string()).with_code(code);
        if let Some(line) = self.line() {
            diag = diag.with_line(line);
        }
        if let Some(span) = self.span() {
            diag = diag.with_primary(span, self.label());
        }
        match self {
            SsaError::NonRangeFor { .. } => diag.with_help("write the loop as `for i = a:b` or `for i = a:s:b`"),
            SsaError::ReturnNotRemoved { .. } => {
                diag.with_help("run the return-removal pass before building SSA")
            }
            _ => diag,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matisse_diagnostics::formatter::DiagnosticFormatter;

    #[test]
    fn codes_and_lines() {
        let diag = SsaError::BreakOutsideLoop {
            line: 7,
            span: Span::default(),
        }
        .to_diagnostic();
        assert_eq!(diag.code.map(|c| c.0), Some("E0201".to_string()));
        assert_eq!(diag.line, Some(7));
        assert!(diag.labels.is_empty());
        let internal = SsaError::Invariant {
            function: "f".into(),
            message: "x$1 defined twice".into(),
        };
        assert_eq!(internal.line(), None);
        assert_eq!(internal.span(), None);
        assert!(internal.to_string().contains("x$1 defined twice"));
    }

    #[test]
    fn span_is_underlined() {
        let src = "function f(x)\n  for i = x\n  end\nend";
        let err = SsaError::NonRangeFor {
            line: 2,
            span: Span::new(24, 25),
        };
        let diag = err.to_diagnostic();
        assert_eq!(diag.primary_span(), Some(Span::new(24, 25)));
        let text = DiagnosticFormatter::new(src).format(&diag);
        assert!(text.contains("for i = x"), "{}", text);
        assert!(text.contains("expected a range"), "{}", text);
    }
}
