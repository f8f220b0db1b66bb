// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Pass pipelines a compile runs, supplied by the caller.

use matisse_ast::pass::AstPassRunner;
use matisse_opt::PostTypePipeline;
use matisse_ssa::pass::SsaPassRunner;

/// Syntax-tree passes, pre-type SSA passes and post-type passes, each an
/// ordered list. `default()` gives the standard order of every stage.
pub struct PassPipelines {
    pub ast: AstPassRunner,
    pub ssa: SsaPassRunner,
    pub post_type: PostTypePipeline,
}

impl Default for PassPipelines {
    fn default() -> Self {
        Self {
            ast: AstPassRunner::standard(),
            ssa: SsaPassRunner::standard(),
            post_type: PostTypePipeline::standard(),
        }
    }
}

impl PassPipelines {
    pub fn with_ast(mut self, ast: AstPassRunner) -> Self {
        self.ast = ast;
        self
    }

    pub fn with_ssa(mut self, ssa: SsaPassRunner) -> Self {
        self.ssa = ssa;
        self
    }

    pub fn with_post_type(mut self, post_type: PostTypePipeline) -> Self {
        self.post_type = post_type;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_runs_every_stage() {
        let p = PassPipelines::default();
        assert_eq!(p.ast.pass_names(), vec!["expand_elseif", "remove_return"]);
        assert_eq!(p.ssa.pass_names().last(), Some(&"validate"));
        assert_eq!(p.post_type.pass_names().last(), Some(&"dead_code"));
    }
}
