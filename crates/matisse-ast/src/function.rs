// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Function and file nodes.

use crate::property::FunctionProperty;
use crate::stmt::Stmt;
use crate::Span;

/// One MATLAB function.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FunctionNode {
    pub name: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub body: Vec<Stmt>,
    pub properties: Vec<FunctionProperty>,
    pub span: Span,
}

/// A parsed source file. The first function is the file's entry point,
/// the others are subfunctions visible only inside the file.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FileNode {
    pub name: String,
    pub functions: Vec<FunctionNode>,
}

impl FunctionNode {
    pub fn has_property(&self, property: &FunctionProperty) -> bool {
        self.properties.contains(property)
    }

    /// Variables assigned anywhere in the body, in first-assignment order.
    pub fn assigned_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for stmt in &self.body {
            stmt.assigned_names(&mut names);
        }
        names
    }
}

impl FileNode {
    pub fn main_function(&self) -> Option<&FunctionNode> {
        self.functions.first()
    }

    pub fn function(&self, name: &str) -> Option<&FunctionNode> {
        self.functions.iter().find(|f| f.name == name)
    }
}
