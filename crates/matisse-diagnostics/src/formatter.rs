// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Rich terminal formatter for diagnostics.
//!
//! ```text
//! error[E0301]: no provider accepts `plus` for (string, int32)
//!   --> kernel.m:4
//!    |
//!  4 |     y = s + 1;
//!    |
//!    = note: built-ins tried: plus
//! ```

use colored::Colorize;

use matisse_ast::LineMap;

use crate::{Diagnostic, LabelStyle, Severity};

/// Formats diagnostics for terminal output.
pub struct DiagnosticFormatter<'a> {
    source: Option<&'a str>,
    file_name: Option<&'a str>,
    line_map: Option<LineMap>,
}

impl<'a> DiagnosticFormatter<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source: Some(source),
            file_name: None,
            line_map: Some(LineMap::new(source)),
        }
    }

    /// Formatter for diagnostics whose source text is not available.
    pub fn without_source() -> Self {
        Self {
            source: None,
            file_name: None,
            line_map: None,
        }
    }

    pub fn with_file_name(mut self, name: &'a str) -> Self {
        self.file_name = Some(name);
        self
    }

    pub fn format(&self, diagnostic: &Diagnostic) -> String {
        let mut out = String::new();
        self.format_header(&mut out, diagnostic);

        let line = self.reported_line(diagnostic);
        let file = self
            .file_name
            .or(diagnostic.file.as_deref())
            .unwrap_or("<source>");
        if let Some(line) = line {
            out.push_str(&format!("  {} {}:{}\n", "-->".blue(), file, line));
            self.format_source_line(&mut out, diagnostic, line);
        }

        self.format_footer(&mut out, diagnostic);
        out
    }

    pub fn format_all(&self, diagnostics: &[Diagnostic]) -> String {
        diagnostics
            .iter()
            .map(|d| self.format(d))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn format_header(&self, out: &mut String, diagnostic: &Diagnostic) {
        let severity_str = match diagnostic.severity {
            Severity::Error => "error".red().bold(),
            Severity::Warning => "warning".yellow().bold(),
            Severity::Note => "note".blue().bold(),
        };

        if let Some(ref code) = diagnostic.code {
            out.push_str(&format!(
                "{}[{}]: {}\n",
                severity_str,
                code.0.clone().red().bold(),
                diagnostic.message.bold()
            ));
        } else {
            out.push_str(&format!("{}: {}\n", severity_str, diagnostic.message.bold()));
        }
    }

    /// Line from the diagnostic itself, else from its primary label.
    fn reported_line(&self, diagnostic: &Diagnostic) -> Option<u32> {
        diagnostic.line.or_else(|| {
            let span = diagnostic.primary_span()?;
            let map = self.line_map.as_ref()?;
            Some(map.offset_to_line_col(span.start).0)
        })
    }

    fn format_source_line(&self, out: &mut String, diagnostic: &Diagnostic, line: u32) {
        let (Some(source), Some(map)) = (self.source, self.line_map.as_ref()) else {
            return;
        };
        let Some(text) = map.line_text(source, line) else {
            return;
        };
        let gutter_width = line.to_string().len().max(2);

        out.push_str(&format!("{} {}\n", " ".repeat(gutter_width + 1), "|".blue()));
        out.push_str(&format!(
            "{:>width$} {} {}\n",
            line.to_string().blue().bold(),
            "|".blue(),
            text,
            width = gutter_width + 1,
        ));

        // Underline labels that start on this line
        for label in &diagnostic.labels {
            let (label_line, col) = map.offset_to_line_col(label.span.start);
            if label_line != line {
                continue;
            }
            let width = label.span.end.saturating_sub(label.span.start).max(1);
            let (mark, msg) = match label.style {
                LabelStyle::Primary => (
                    "^".repeat(width).red().bold().to_string(),
                    label.message.as_deref().unwrap_or("").red().bold().to_string(),
                ),
                LabelStyle::Secondary => (
                    "-".repeat(width).blue().to_string(),
                    label.message.as_deref().unwrap_or("").blue().to_string(),
                ),
            };
            out.push_str(&format!(
                "{} {} {}{} {}\n",
                " ".repeat(gutter_width + 1),
                "|".blue(),
                " ".repeat(col.saturating_sub(1) as usize),
                mark,
                msg,
            ));
        }
    }

    fn format_footer(&self, out: &mut String, diagnostic: &Diagnostic) {
        let gutter_width = 2;

        for note in &diagnostic.notes {
            out.push_str(&format!(
                "{} {} {}: {}\n",
                " ".repeat(gutter_width + 1),
                "=".cyan(),
                "note".cyan().bold(),
                note
            ));
        }

        if let Some(ref help) = diagnostic.help {
            out.push_str(&format!(
                "{} {} {}: {}\n",
                " ".repeat(gutter_width + 1),
                "=".cyan(),
                "help".cyan().bold(),
                help
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matisse_ast::Span;

    fn plain(s: String) -> String {
        // strip ANSI escapes so assertions read naturally
        let mut out = String::new();
        let mut in_escape = false;
        for ch in s.chars() {
            match (in_escape, ch) {
                (false, '\u{1b}') => in_escape = true,
                (true, 'm') => in_escape = false,
                (true, _) => {}
                (false, c) => out.push(c),
            }
        }
        out
    }

    #[test]
    fn header_and_source_line() {
        let src = "function y = f(x)\n  y = x + 'a';\nend";
        let d = Diagnostic::error("no provider accepts `plus`")
            .with_code("E0301")
            .with_line(2)
            .with_note("argument types: (double, string)");
        let text = plain(DiagnosticFormatter::new(src).with_file_name("f.m").format(&d));
        assert!(text.starts_with("error[E0301]: no provider accepts `plus`"));
        assert!(text.contains("--> f.m:2"));
        assert!(text.contains("y = x + 'a';"));
        assert!(text.contains("= note: argument types: (double, string)"));
    }

    #[test]
    fn label_supplies_line() {
        let src = "a = 1;\nb = c;";
        let d = Diagnostic::error("undefined").with_primary(Span::new(11, 12), "not defined");
        let text = plain(DiagnosticFormatter::new(src).format(&d));
        assert!(text.contains("--> <source>:2"));
        assert!(text.contains("^ not defined"));
    }

    #[test]
    fn no_source_available() {
        let d = Diagnostic::warning("matrix may grow").with_file("k.m").with_line(9);
        let text = plain(DiagnosticFormatter::without_source().format(&d));
        assert!(text.contains("warning: matrix may grow"));
        assert!(text.contains("--> k.m:9"));
    }
}
