// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Compilation of MATLAB functions to C.
//!
//! A `CompilationManager` owns one session: the project's parsed files, the
//! caches of every stage and the sink diagnostics go to. Compiling an entry
//! point runs the syntax-tree passes and SSA construction per function, type
//! inference per specialization, the post-type pipeline, variable allocation
//! and finally C emission, callees before callers.

mod emit;
mod error;
mod manager;
mod pipelines;
mod sources;

pub use emit::{emit_function, CalleeMap, EmitContext};
pub use error::{CompileError, EmitError};
pub use manager::{with_manager, CacheStats, CompilationManager, CompiledProgram, ManagerConfig};
pub use pipelines::PassPipelines;
pub use sources::ProjectSources;

pub use matisse_cir::Settings;
pub use matisse_infer::FunctionIdentification;
