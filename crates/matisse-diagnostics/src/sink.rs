// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Where diagnostics go during a compile.

use std::sync::Mutex;

use crate::{Diagnostic, Severity};

/// Receives diagnostics. Shared by every context derived during one compile.
pub trait DiagnosticSink: Send + Sync {
    fn emit(&self, diagnostic: Diagnostic);
}

/// Collects diagnostics in emission order.
#[derive(Debug, Default)]
pub struct DiagnosticBag {
    items: Mutex<Vec<Diagnostic>>,
}

impl DiagnosticBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<Diagnostic> {
        match self.items.lock() {
            Ok(items) => items.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn take(&self) -> Vec<Diagnostic> {
        match self.items.lock() {
            Ok(mut items) => std::mem::take(&mut *items),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.snapshot()
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    pub fn has_errors(&self) -> bool {
        self.count(Severity::Error) > 0
    }
}

impl DiagnosticSink for DiagnosticBag {
    fn emit(&self, diagnostic: Diagnostic) {
        match self.items.lock() {
            Ok(mut items) => items.push(diagnostic),
            Err(poisoned) => poisoned.into_inner().push(diagnostic),
        }
    }
}

/// Drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn emit(&self, _diagnostic: Diagnostic) {}
}
