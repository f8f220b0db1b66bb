// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Syntax tree for the MATLAB subset accepted by the compiler.
//!
//! The tree is produced by an external front end. This crate only defines the
//! node types, the directive properties a front end may attach, and the
//! ordered pass runner that desugars a tree before SSA construction.

pub mod build;
pub mod expr;
pub mod function;
pub mod pass;
pub mod property;
pub mod span;
pub mod stmt;

pub use expr::{BinaryOp, Expr, ExprKind, UnaryOp};
pub use function::{FileNode, FunctionNode};
pub use property::{FunctionProperty, LoopProperty};
pub use span::{LineMap, Span};
pub use stmt::{LValue, Stmt, StmtKind};
