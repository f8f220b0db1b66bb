// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! The files of one project and the SSA built from them.

use std::sync::Arc;

use indexmap::IndexMap;
use matisse_ast::pass::AstPassRunner;
use matisse_ast::{FileNode, FunctionNode};
use matisse_cir::BuildCache;
use matisse_infer::{FunctionIdentification, FunctionSource, InferError};
use matisse_ssa::pass::SsaPassRunner;
use matisse_ssa::{build_ssa, FunctionBody};
use tracing::debug;

/// Parsed files by name, plus the passes that turn one of their functions
/// into untyped SSA. Each function's SSA is built once.
pub struct ProjectSources {
    files: IndexMap<String, FileNode>,
    ast_passes: AstPassRunner,
    ssa_passes: SsaPassRunner,
    bodies: BuildCache<FunctionIdentification, FunctionBody>,
}

impl ProjectSources {
    pub fn new(files: Vec<FileNode>, ast_passes: AstPassRunner, ssa_passes: SsaPassRunner) -> Self {
        Self {
            files: files.into_iter().map(|f| (f.name.clone(), f)).collect(),
            ast_passes,
            ssa_passes,
            bodies: BuildCache::new(),
        }
    }

    pub fn file(&self, name: &str) -> Option<&FileNode> {
        self.files.get(name)
    }

    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// The entry function of `file`.
    pub fn main_function(&self, file: &str) -> Result<FunctionIdentification, InferError> {
        let node = self.files.get(file).ok_or_else(|| InferError::UnknownFile {
            file: file.to_string(),
        })?;
        let main = node.main_function().ok_or_else(|| InferError::UnknownFunction {
            file: file.to_string(),
            function: file_stem(file).to_string(),
        })?;
        Ok(FunctionIdentification::new(file, &main.name))
    }

    /// Syntax tree of `function`, before any pass.
    pub fn function(&self, function: &FunctionIdentification) -> Result<&FunctionNode, InferError> {
        let file = self.files.get(&function.file).ok_or_else(|| InferError::UnknownFile {
            file: function.file.clone(),
        })?;
        file.function(&function.name)
            .ok_or_else(|| InferError::UnknownFunction {
                file: function.file.clone(),
                function: function.name.clone(),
            })
    }

    /// Number of functions whose SSA has been built.
    pub fn built(&self) -> usize {
        self.bodies.len()
    }

    pub fn clear(&self) {
        self.bodies.clear();
    }

    fn build(&self, function: &FunctionIdentification) -> Result<FunctionBody, InferError> {
        let mut node = self.function(function)?.clone();
        self.ast_passes.run_function(&mut node)?;
        let mut body = build_ssa(&node, &function.file)?;
        self.ssa_passes.run(&mut body)?;
        debug!(function = %function, blocks = body.blocks.len(), "SSA built");
        Ok(body)
    }
}

impl FunctionSource for ProjectSources {
    /// A subfunction of the caller's file wins; otherwise the entry
    /// function of the file named after `name`, then the entry function of
    /// any file that is called `name`.
    fn resolve(&self, caller: &FunctionIdentification, name: &str) -> Option<FunctionIdentification> {
        if let Some(file) = self.files.get(&caller.file) {
            if file.function(name).is_some() {
                return Some(FunctionIdentification::new(&caller.file, name));
            }
        }
        let by_file = self
            .files
            .values()
            .find(|f| file_stem(&f.name) == name)
            .and_then(|f| f.main_function().map(|m| (f, m)));
        if let Some((file, main)) = by_file {
            return Some(FunctionIdentification::new(&file.name, &main.name));
        }
        self.files.values().find_map(|f| {
            f.main_function()
                .filter(|m| m.name == name)
                .map(|m| FunctionIdentification::new(&f.name, &m.name))
        })
    }

    fn body(&self, function: &FunctionIdentification) -> Result<Arc<FunctionBody>, InferError> {
        self.bodies.get_or_try_build(
            function,
            || self.build(function),
            || InferError::RecursiveSpecialization {
                function: function.name.clone(),
                args: Vec::new(),
                line: 0,
            },
        )
    }
}

/// `dir/name.m` gives `name`.
fn file_stem(file: &str) -> &str {
    let base = file.rsplit(['/', '\\']).next().unwrap_or(file);
    base.strip_suffix(".m").unwrap_or(base)
}
