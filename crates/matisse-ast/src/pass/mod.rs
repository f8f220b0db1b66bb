// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Syntax-tree rewrites applied before SSA construction.

mod elseif;
mod return_remover;

pub use elseif::ElseIfExpander;
pub use return_remover::{ReturnRemover, RETURN_FLAG};

use tracing::debug;

use crate::function::{FileNode, FunctionNode};
use crate::Span;

/// Error raised by a syntax-tree pass.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AstPassError {
    #[error("{pass}: {message}")]
    Failed {
        pass: &'static str,
        message: String,
        line: u32,
        span: Span,
    },
}

impl AstPassError {
    pub fn line(&self) -> u32 {
        match self {
            AstPassError::Failed { line, .. } => *line,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            AstPassError::Failed { span, .. } => *span,
        }
    }
}

/// A rewrite over one function's syntax tree.
pub trait AstPass: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply(&self, function: &mut FunctionNode) -> Result<(), AstPassError>;
}

/// Applies an ordered list of passes to every function of a file.
#[derive(Default)]
pub struct AstPassRunner {
    passes: Vec<Box<dyn AstPass>>,
}

impl AstPassRunner {
    pub fn new(passes: Vec<Box<dyn AstPass>>) -> Self {
        Self { passes }
    }

    /// The passes every compile needs: `elseif` expansion, then return removal.
    pub fn standard() -> Self {
        Self::new(vec![Box::new(ElseIfExpander), Box::new(ReturnRemover)])
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    pub fn run_function(&self, function: &mut FunctionNode) -> Result<(), AstPassError> {
        for pass in &self.passes {
            debug!(pass = pass.name(), function = %function.name, "applying AST pass");
            pass.apply(function)?;
        }
        Ok(())
    }

    pub fn run(&self, file: &mut FileNode) -> Result<(), AstPassError> {
        for function in &mut file.functions {
            self.run_function(function)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::*;

    struct Rename;

    impl AstPass for Rename {
        fn name(&self) -> &'static str {
            "rename"
        }

        fn apply(&self, function: &mut FunctionNode) -> Result<(), AstPassError> {
            function.name.push_str("_renamed");
            Ok(())
        }
    }

    struct Reject;

    impl AstPass for Reject {
        fn name(&self) -> &'static str {
            "reject"
        }

        fn apply(&self, _function: &mut FunctionNode) -> Result<(), AstPassError> {
            Err(AstPassError::Failed {
                pass: "reject",
                message: "nope".to_string(),
                line: 7,
                span: Span::new(3, 9),
            })
        }
    }

    #[test]
    fn passes_run_in_order() {
        let runner = AstPassRunner::new(vec![Box::new(Rename), Box::new(Rename)]);
        let mut file = FileNode {
            name: "f.m".to_string(),
            functions: vec![function("f", &[], &[], vec![])],
        };
        runner.run(&mut file).unwrap();
        assert_eq!(file.functions[0].name, "f_renamed_renamed");
    }

    #[test]
    fn failure_stops_the_run() {
        let runner = AstPassRunner::new(vec![Box::new(Reject), Box::new(Rename)]);
        let mut f = function("f", &[], &[], vec![]);
        let err = runner.run_function(&mut f).unwrap_err();
        assert_eq!(err.line(), 7);
        assert_eq!(err.span(), Span::new(3, 9));
        assert_eq!(f.name, "f");
    }

    #[test]
    fn standard_order() {
        assert_eq!(
            AstPassRunner::standard().pass_names(),
            vec!["expand_elseif", "remove_return"]
        );
    }
}
