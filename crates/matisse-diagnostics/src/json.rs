// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! JSON diagnostic output for machine consumption.

use serde::Serialize;

use matisse_ast::LineMap;

use crate::{codes::ErrorCodeRegistry, Diagnostic, Severity};

/// A complete JSON diagnostic report for one compile.
#[derive(Debug, Serialize)]
pub struct DiagnosticReport {
    /// Schema version for forward compatibility.
    pub version: u32,
    /// Entry function that was compiled.
    pub entry: String,
    /// Whether compilation succeeded (no errors).
    pub success: bool,
    pub diagnostics: Vec<JsonDiagnostic>,
    pub error_count: usize,
    pub warning_count: usize,
}

/// A single diagnostic in JSON form.
#[derive(Debug, Serialize)]
pub struct JsonDiagnostic {
    /// "error", "warning", or "note".
    pub severity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Error category (e.g., "Type", "SSA").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    /// The source line text, when the source was supplied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_line: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
}

/// Convert diagnostics to a structured JSON report.
///
/// `source_of` maps a file name to its text so each entry can quote its line.
pub fn to_json_report<'a>(
    diagnostics: &[Diagnostic],
    entry: &str,
    source_of: impl Fn(&str) -> Option<&'a str>,
) -> DiagnosticReport {
    let registry = ErrorCodeRegistry::default();
    let mut error_count = 0;
    let mut warning_count = 0;

    let json_diags: Vec<JsonDiagnostic> = diagnostics
        .iter()
        .map(|d| {
            match d.severity {
                Severity::Error => error_count += 1,
                Severity::Warning => warning_count += 1,
                Severity::Note => {}
            }
            let source = d.file.as_deref().and_then(&source_of);
            to_json_diagnostic(d, source, &registry)
        })
        .collect();

    DiagnosticReport {
        version: 1,
        entry: entry.to_string(),
        success: error_count == 0,
        diagnostics: json_diags,
        error_count,
        warning_count,
    }
}

fn to_json_diagnostic(
    diag: &Diagnostic,
    source: Option<&str>,
    registry: &ErrorCodeRegistry,
) -> JsonDiagnostic {
    let severity = match diag.severity {
        Severity::Error => "error",
        Severity::Warning => "warning",
        Severity::Note => "note",
    };

    let code = diag.code.as_ref().map(|c| c.0.clone());
    let category = code
        .as_ref()
        .and_then(|c| registry.get(c))
        .map(|info| info.category.to_string());

    let source_line = match (source, diag.line) {
        (Some(text), Some(line)) => LineMap::new(text)
            .line_text(text, line)
            .map(|l| l.trim_end().to_string()),
        _ => None,
    };

    JsonDiagnostic {
        severity: severity.to_string(),
        code,
        category,
        message: diag.message.clone(),
        file: diag.file.clone(),
        line: diag.line,
        source_line,
        notes: diag.notes.clone(),
        help: diag.help.clone(),
    }
}

/// Serialize a diagnostic report to pretty JSON.
pub fn to_json_string(report: &DiagnosticReport) -> String {
    serde_json::to_string_pretty(report).unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_counts_and_quotes_lines() {
        let src = "function y = f(x)\n  y = g(x);\nend\n";
        let diags = vec![
            Diagnostic::error("no provider accepts `g`")
                .with_code("E0301")
                .with_file("f.m")
                .with_line(2),
            Diagnostic::warning("unused output").with_file("f.m"),
        ];
        let report = to_json_report(&diags, "f", |file| (file == "f.m").then_some(src));
        assert!(!report.success);
        assert_eq!(report.error_count, 1);
        assert_eq!(report.warning_count, 1);
        let first = &report.diagnostics[0];
        assert_eq!(first.category.as_deref(), Some("Type"));
        assert_eq!(first.source_line.as_deref(), Some("  y = g(x);"));

        let json = to_json_string(&report);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["diagnostics"][0]["code"], "E0301");
        assert!(value["diagnostics"][1].get("line").is_none());
    }
}
