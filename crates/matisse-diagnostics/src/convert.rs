// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Conversions for syntax-tree errors, which live below this crate.
//!
//! Later stages implement `ToDiagnostic` next to their own error types.

use crate::{Diagnostic, ToDiagnostic};

// ============================================================================
// AST Pass Errors
// ============================================================================

impl ToDiagnostic for matisse_ast::pass::AstPassError {
    fn to_diagnostic(&self) -> Diagnostic {
        let diag = Diagnostic::error(self.to_string())
            .with_code("E0100")
            .with_line(self.line());
        let span = self.span();
        if span.is_empty() {
            diag
        } else {
            diag.with_primary(span, "while rewriting this")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorCode;
    use matisse_ast::pass::AstPassError;
    use matisse_ast::Span;

    #[test]
    fn ast_pass_failure() {
        let d = AstPassError::Failed {
            pass: "remove_return",
            message: "unsupported".into(),
            line: 3,
            span: Span::new(40, 46),
        }
        .to_diagnostic();
        assert_eq!(d.code, Some(ErrorCode("E0100".to_string())));
        assert_eq!(d.line, Some(3));
        assert!(d.message.starts_with("remove_return"));
        assert_eq!(d.primary_span(), Some(Span::new(40, 46)));
    }

    #[test]
    fn synthesized_nodes_get_no_label() {
        let d = AstPassError::Failed {
            pass: "expand_elseif",
            message: "unsupported".into(),
            line: 1,
            span: Span::default(),
        }
        .to_diagnostic();
        assert!(d.labels.is_empty());
    }
}
