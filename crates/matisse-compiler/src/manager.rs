// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Top-level compilation: sources to typed instances to C.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use indexmap::IndexMap;
use matisse_ast::FileNode;
use matisse_cir::builtins::standard_table;
use matisse_cir::{BuildCache, FunctionInstance, InstanceGraph, InstanceRegistry, ProviderContext, ProviderTable, Settings};
use matisse_diagnostics::{DiagnosticSink, NullSink, ToDiagnostic};
use matisse_infer::{FunctionIdentification, FunctionSource, InferenceEngine, TypedInstance, TypedKey};
use matisse_opt::{PassContext, PostTypePipeline};
use matisse_types::VariableType;
use matisse_unssa::{allocate, eliminate_phis};
use tracing::{debug, info};

use crate::emit::{emit_function, CalleeMap, EmitContext};
use crate::error::CompileError;
use crate::pipelines::PassPipelines;
use crate::sources::ProjectSources;

/// Everything a compilation session is opened with.
pub struct ManagerConfig {
    pub files: Vec<FileNode>,
    pub settings: Settings,
    pub pipelines: PassPipelines,
    pub providers: ProviderTable,
    pub sink: Arc<dyn DiagnosticSink>,
}

impl ManagerConfig {
    /// Default settings, the standard pipelines and built-ins, and a sink
    /// that drops every diagnostic.
    pub fn new(files: Vec<FileNode>) -> Self {
        Self {
            files,
            settings: Settings::default(),
            pipelines: PassPipelines::default(),
            providers: standard_table(),
            sink: Arc::new(NullSink),
        }
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_pipelines(mut self, pipelines: PassPipelines) -> Self {
        self.pipelines = pipelines;
        self
    }

    pub fn with_providers(mut self, providers: ProviderTable) -> Self {
        self.providers = providers;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }
}

/// Entries held by the caches of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub ssa_bodies: usize,
    pub typed_instances: usize,
    pub optimized_instances: usize,
    pub c_functions: usize,
    pub c_instances: usize,
}

/// The C of one entry point: the entry function and every instance it
/// reaches, definitions first.
#[derive(Debug)]
pub struct CompiledProgram {
    pub entry: Arc<FunctionInstance>,
    pub graph: InstanceGraph,
}

impl CompiledProgram {
    /// C name of the entry function.
    pub fn entry_name(&self) -> &str {
        self.entry.c_name().unwrap_or_default()
    }

    pub fn to_c(&self) -> String {
        self.graph.to_c()
    }
}

/// One compilation session.
///
/// Every cache lives here: SSA bodies, typed and optimized instances, C
/// functions and built-in instances. Compiling several entry points in one
/// session shares their common callees. `close` releases all of it.
pub struct CompilationManager {
    sources: Arc<ProjectSources>,
    engine: InferenceEngine,
    post_type: PostTypePipeline,
    optimized: BuildCache<TypedKey, TypedInstance>,
    functions: BuildCache<TypedKey, FunctionInstance>,
    c_names: Mutex<HashMap<String, TypedKey>>,
    sink: Arc<dyn DiagnosticSink>,
}

impl CompilationManager {
    pub fn open(config: ManagerConfig) -> Self {
        let PassPipelines { ast, ssa, post_type } = config.pipelines;
        let sources = Arc::new(ProjectSources::new(config.files, ast, ssa));
        let registry = Arc::new(InstanceRegistry::new(config.providers));
        let context = ProviderContext::new(Arc::new(config.settings), config.sink.clone());
        let source: Arc<dyn FunctionSource> = sources.clone();
        debug!(files = sources.file_names().count(), "compilation session opened");
        Self {
            sources,
            engine: InferenceEngine::new(registry, source, context),
            post_type,
            optimized: BuildCache::new(),
            functions: BuildCache::new(),
            c_names: Mutex::new(HashMap::new()),
            sink: config.sink,
        }
    }

    pub fn sources(&self) -> &ProjectSources {
        &self.sources
    }

    pub fn engine(&self) -> &InferenceEngine {
        &self.engine
    }

    pub fn registry(&self) -> &InstanceRegistry {
        self.engine.registry()
    }

    /// Compiles `entry` for `args`, returning every output it declares.
    ///
    /// Errors are also reported to the session's sink.
    pub fn compile(&self, entry: &FunctionIdentification, args: &[VariableType]) -> Result<CompiledProgram, CompileError> {
        self.report(self.compile_entry(entry, args))
    }

    /// Compiles the entry function of `file`, taking parameter types by
    /// parameter name.
    pub fn compile_file(&self, file: &str, types: &IndexMap<String, VariableType>) -> Result<CompiledProgram, CompileError> {
        self.report(self.sources.main_function(file).map_err(CompileError::from).and_then(|entry| {
            let args = self.entry_types(&entry, types)?;
            self.compile_entry(&entry, &args)
        }))
    }

    /// Argument types of `entry` in parameter order.
    pub fn entry_types(&self, entry: &FunctionIdentification, types: &IndexMap<String, VariableType>) -> Result<Vec<VariableType>, CompileError> {
        let node = self.sources.function(entry)?;
        node.inputs
            .iter()
            .map(|param| {
                types.get(param).cloned().ok_or_else(|| CompileError::UntypedParameter {
                    function: entry.name.clone(),
                    parameter: param.clone(),
                })
            })
            .collect()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            ssa_bodies: self.sources.built(),
            typed_instances: self.engine.len(),
            optimized_instances: self.optimized.len(),
            c_functions: self.functions.len(),
            c_instances: self.registry().len(),
        }
    }

    /// Ends the session, releasing every cache. Returns what was held.
    pub fn close(self) -> CacheStats {
        let stats = self.stats();
        self.functions.clear();
        self.optimized.clear();
        self.engine.clear();
        self.registry().clear();
        self.sources.clear();
        lock(&self.c_names).clear();
        debug!(released = ?stats, "compilation session closed");
        stats
    }

    fn report<T>(&self, result: Result<T, CompileError>) -> Result<T, CompileError> {
        if let Err(e) = &result {
            self.sink.emit(e.to_diagnostic());
        }
        result
    }

    fn compile_entry(&self, entry: &FunctionIdentification, args: &[VariableType]) -> Result<CompiledProgram, CompileError> {
        let nargout = self.sources.body(entry)?.outputs.len();
        let typed = self.engine.infer(entry, args, nargout)?;
        let function = self.function_instance(&typed.key)?;
        let graph = InstanceGraph::collect(std::slice::from_ref(&function));
        info!(entry = %entry, instances = graph.instances.len(), "compiled");
        Ok(CompiledProgram { entry: function, graph })
    }

    /// The C function of a specialization, compiling its callees first.
    fn function_instance(&self, key: &TypedKey) -> Result<Arc<FunctionInstance>, CompileError> {
        self.functions.get_or_try_build(
            key,
            || self.build_function(key),
            || CompileError::RecursiveCompile {
                function: key.function.name.clone(),
            },
        )
    }

    fn build_function(&self, key: &TypedKey) -> Result<FunctionInstance, CompileError> {
        let instance = self.optimized(key)?;

        let mut callees = CalleeMap::new();
        for callee_key in &instance.callees {
            let callee = self.optimized(callee_key)?;
            let compiled = self.function_instance(callee_key)?;
            callees.insert((callee_key.function.name.clone(), callee.function_type.clone()), compiled);
        }

        let allocation = allocate(&instance)?;
        let mut lowered = (*instance).clone();
        let copies = eliminate_phis(&mut lowered.body, &allocation);
        let c_name = self.c_name(key, &instance.base_c_name());
        debug!(function = %key.function, c_name = %c_name, variables = allocation.len(), copies, "emitting");

        let ctx = EmitContext {
            registry: self.registry(),
            provider_context: self.engine.context(),
            callees: &callees,
        };
        let function = emit_function(&lowered, &allocation, &c_name, &ctx)?;
        let registered = self
            .registry()
            .get_or_insert_with(&instance.instance_key(), move || Ok(function))?;
        Ok(Arc::unwrap_or_clone(registered))
    }

    /// The specialization of `key` after the post-type pipeline.
    pub fn optimized(&self, key: &TypedKey) -> Result<Arc<TypedInstance>, CompileError> {
        self.optimized.get_or_try_build(
            key,
            || {
                let typed = match self.engine.get(key) {
                    Some(typed) => typed,
                    None => self.engine.infer(&key.function, &key.args, key.nargout)?,
                };
                let mut instance = (*typed).clone();
                let rewrites = self.post_type.run(&mut instance, &PassContext::new(&self.engine))?;
                debug!(function = %key.function, rewrites, "optimized");
                Ok(instance)
            },
            || CompileError::RecursiveCompile {
                function: key.function.name.clone(),
            },
        )
    }

    /// `base`, suffixed `_1`, `_2`, ... when another specialization already
    /// took it.
    fn c_name(&self, key: &TypedKey, base: &str) -> String {
        let mut names = lock(&self.c_names);
        if let Some((name, _)) = names.iter().find(|(_, k)| *k == key) {
            return name.clone();
        }
        let mut name = base.to_string();
        let mut suffix = 1;
        while names.contains_key(&name) {
            name = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        names.insert(name.clone(), key.clone());
        name
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Opens a session, runs `f` in it and closes it, whether or not `f`
/// succeeded.
pub fn with_manager<T>(
    config: ManagerConfig,
    f: impl FnOnce(&CompilationManager) -> Result<T, CompileError>,
) -> Result<T, CompileError> {
    let manager = CompilationManager::open(config);
    let result = f(&manager);
    manager.close();
    result
}
