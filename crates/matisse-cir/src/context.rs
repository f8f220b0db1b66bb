// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! The compilation context handed to providers.

use std::sync::Arc;

use matisse_diagnostics::{Diagnostic, DiagnosticSink, NullSink};
use matisse_types::{NumericFactory, VariableType};

use crate::settings::Settings;

/// Immutable record describing one call being resolved.
///
/// Derived contexts are built with the `with_*` constructors, which return
/// a copy; the parent is never modified. Settings and the sink are shared.
#[derive(Clone)]
pub struct ProviderContext {
    args: Vec<VariableType>,
    output_type: Option<VariableType>,
    nargout: usize,
    numerics: NumericFactory,
    settings: Arc<Settings>,
    sink: Arc<dyn DiagnosticSink>,
    line: u32,
}

impl ProviderContext {
    pub fn new(settings: Arc<Settings>, sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            args: Vec::new(),
            output_type: None,
            nargout: 1,
            numerics: settings.numerics(),
            settings,
            sink,
            line: 0,
        }
    }

    /// Default settings, diagnostics dropped.
    pub fn detached() -> Self {
        Self::new(Arc::new(Settings::default()), Arc::new(NullSink))
    }

    pub fn with_args(&self, args: Vec<VariableType>) -> Self {
        Self {
            args,
            ..self.clone()
        }
    }

    pub fn with_output_type(&self, output_type: Option<VariableType>) -> Self {
        Self {
            output_type,
            ..self.clone()
        }
    }

    pub fn with_nargout(&self, nargout: usize) -> Self {
        Self {
            nargout,
            ..self.clone()
        }
    }

    pub fn with_line(&self, line: u32) -> Self {
        Self {
            line,
            ..self.clone()
        }
    }

    /// Context for a call: arguments, nargout and declared output replaced.
    pub fn for_call(
        &self,
        args: Vec<VariableType>,
        nargout: usize,
        output_type: Option<VariableType>,
    ) -> Self {
        Self {
            args,
            nargout,
            output_type,
            ..self.clone()
        }
    }

    pub fn args(&self) -> &[VariableType] {
        &self.args
    }

    pub fn arg(&self, index: usize) -> Option<&VariableType> {
        self.args.get(index)
    }

    pub fn output_type(&self) -> Option<&VariableType> {
        self.output_type.as_ref()
    }

    pub fn nargout(&self) -> usize {
        self.nargout
    }

    pub fn numerics(&self) -> &NumericFactory {
        &self.numerics
    }

    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    pub fn sink(&self) -> &Arc<dyn DiagnosticSink> {
        &self.sink
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    /// Emits a warning tagged with the current line.
    pub fn warn(&self, message: impl Into<String>) {
        self.sink
            .emit(Diagnostic::warning(message).with_line(self.line));
    }
}

impl std::fmt::Debug for ProviderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderContext")
            .field("args", &self.args)
            .field("output_type", &self.output_type)
            .field("nargout", &self.nargout)
            .field("line", &self.line)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matisse_diagnostics::DiagnosticBag;
    use matisse_types::NumericClass;

    #[test]
    fn derive_leaves_parent_untouched() {
        let parent = ProviderContext::detached().with_line(3);
        let child = parent.with_args(vec![VariableType::scalar(NumericClass::Double)]);
        assert!(parent.args().is_empty());
        assert_eq!(child.args().len(), 1);
        assert_eq!(child.line(), 3);
    }

    #[test]
    fn warnings_reach_shared_sink() {
        let bag = Arc::new(DiagnosticBag::new());
        let ctx = ProviderContext::new(Arc::new(Settings::default()), bag.clone()).with_line(7);
        ctx.with_nargout(2).warn("matrix grows inside a loop");
        let diags = bag.snapshot();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].line, Some(7));
    }
}
