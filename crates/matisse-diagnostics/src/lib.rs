// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Matisse compiler diagnostics.
//!
//! Every stage's error type converts into a `Diagnostic` through
//! `ToDiagnostic`. Diagnostics flow into one `DiagnosticSink` per compile,
//! and are rendered either as colored terminal text or as JSON.

pub mod codes;
mod convert;
pub mod formatter;
pub mod json;
pub mod sink;

pub use sink::{DiagnosticBag, DiagnosticSink, NullSink};

use matisse_ast::Span;
use serde::Serialize;

// ============================================================================
// Core Types
// ============================================================================

/// A compiler diagnostic.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: Option<ErrorCode>,
    pub message: String,
    /// File the diagnostic belongs to, when known.
    pub file: Option<String>,
    /// 1-based source line the problem originates from.
    pub line: Option<u32>,
    pub labels: Vec<Label>,
    pub notes: Vec<String>,
    pub help: Option<String>,
}

/// A labeled source span within a diagnostic.
#[derive(Debug, Clone, Serialize)]
pub struct Label {
    pub span: Span,
    pub style: LabelStyle,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelStyle {
    Primary,
    Secondary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Note,
}

/// An error code like E0301.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ErrorCode(pub String);

// ============================================================================
// Builder API
// ============================================================================

impl Diagnostic {
    fn with_severity(severity: Severity, message: String) -> Self {
        Self {
            severity,
            code: None,
            message,
            file: None,
            line: None,
            labels: Vec::new(),
            notes: Vec::new(),
            help: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::with_severity(Severity::Error, message.into())
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::with_severity(Severity::Warning, message.into())
    }

    pub fn note(message: impl Into<String>) -> Self {
        Self::with_severity(Severity::Note, message.into())
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(ErrorCode(code.into()));
        self
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    /// Attach a source line. Line 0 means "synthesized" and is ignored.
    pub fn with_line(mut self, line: u32) -> Self {
        if line > 0 {
            self.line = Some(line);
        }
        self
    }

    pub fn with_label(mut self, span: Span, style: LabelStyle, msg: impl Into<String>) -> Self {
        self.labels.push(Label {
            span,
            style,
            message: Some(msg.into()),
        });
        self
    }

    pub fn with_primary(self, span: Span, msg: impl Into<String>) -> Self {
        self.with_label(span, LabelStyle::Primary, msg)
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Returns the primary span (first primary label, or first label).
    pub fn primary_span(&self) -> Option<Span> {
        self.labels
            .iter()
            .find(|l| l.style == LabelStyle::Primary)
            .or(self.labels.first())
            .map(|l| l.span)
    }
}

// ============================================================================
// Conversion Trait
// ============================================================================

/// Convert a compiler error into a rich diagnostic.
pub trait ToDiagnostic {
    fn to_diagnostic(&self) -> Diagnostic;
}
