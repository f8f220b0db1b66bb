// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Structured type propagation over one SSA body.
//!
//! Blocks are visited in source order by following the control
//! instructions. A loop body is visited until the types of its header phis
//! stop changing; once `loop_widening_limit` visits have changed them, the
//! loop-carried values lose their constants and extents. While a loop has
//! not settled, failures are deferred, and the settled body is visited once
//! more with errors enabled.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use matisse_cir::{FunctionType, ProviderContext};
use matisse_diagnostics::Diagnostic;
use matisse_ssa::{return_name, source_name, BlockId, FunctionBody, Instruction, InstructionType};
use matisse_types::{combine_types, MatrixType, VariableType};
use tracing::{debug, trace};

use crate::engine::InferenceEngine;
use crate::error::InferError;
use crate::instance::{TypedInstance, TypedKey};

/// Visits allowed after widening before a loop counts as divergent.
const SETTLE_AFTER_WIDENING: usize = 16;

pub(crate) struct TypeWalker<'e> {
    pub(crate) engine: &'e InferenceEngine,
    pub(crate) key: &'e TypedKey,
    source: Arc<FunctionBody>,
    /// The body being typed; untyped calls are replaced in place.
    pub(crate) body: FunctionBody,
    pub(crate) types: IndexMap<String, VariableType>,
    pub(crate) ctx: ProviderContext,
    pub(crate) callees: Vec<TypedKey>,
    /// Names given to unused call outputs, stable across loop visits.
    pub(crate) padding: HashMap<(BlockId, usize), Vec<String>>,
    /// Induction variable type of each for-loop, by loop block.
    pub(crate) induction: HashMap<BlockId, VariableType>,
    widened: HashSet<String>,
    pub(crate) warnings: IndexSet<(u32, String)>,
    pub(crate) loop_depth: usize,
    strict: bool,
    pub(crate) line: u32,
}

/// Source name of an SSA name, for messages.
pub(crate) fn display_name(name: &str) -> &str {
    source_name(name).unwrap_or(name)
}

/// Loop-carried type after widening.
fn widen(ty: &VariableType) -> VariableType {
    match ty {
        VariableType::Matrix(m) => {
            VariableType::Matrix(MatrixType::dynamic(m.element, m.shape.forget_extents()))
        }
        other => other.without_constant(),
    }
}

impl<'e> TypeWalker<'e> {
    pub(crate) fn new(engine: &'e InferenceEngine, key: &'e TypedKey, source: Arc<FunctionBody>) -> Self {
        Self {
            engine,
            key,
            body: (*source).clone(),
            source,
            types: IndexMap::new(),
            ctx: engine.context().clone(),
            callees: Vec::new(),
            padding: HashMap::new(),
            induction: HashMap::new(),
            widened: HashSet::new(),
            warnings: IndexSet::new(),
            loop_depth: 0,
            strict: true,
            line: 0,
        }
    }

    pub(crate) fn run(mut self) -> Result<TypedInstance, InferError> {
        self.walk_block(BlockId::ENTRY)?;
        self.type_undefined_values();

        let mut outputs = Vec::new();
        for output in self.body.outputs.iter().take(self.key.nargout) {
            let ty = self
                .types
                .get(&return_name(output))
                .cloned()
                .ok_or_else(|| InferError::OutputNeverDefined {
                    function: self.body.name.clone(),
                    output: output.clone(),
                })?;
            outputs.push(ty);
        }
        let mut function_type = FunctionType::new(self.key.args.clone(), outputs);
        let effects: Vec<InstructionType> = self
            .body
            .instructions()
            .map(|(_, _, i)| i.instruction_type())
            .collect();
        if effects.contains(&InstructionType::SideEffect) {
            function_type = function_type.with_side_effects();
        } else if effects.contains(&InstructionType::ValidationSideEffect) {
            // callers inherit the checks of every callee through its signature
            function_type = function_type.with_validation_effects();
        }

        for (line, message) in &self.warnings {
            self.ctx.sink().emit(
                Diagnostic::warning(message.clone())
                    .with_file(self.body.file.clone())
                    .with_line(*line),
            );
        }
        debug!(function = %self.body.name, values = self.types.len(), signature = %function_type, "types inferred");
        Ok(TypedInstance {
            key: self.key.clone(),
            body: self.body,
            types: self.types,
            function_type,
            callees: self.callees,
        })
    }

    // ========================================================================
    // Structure
    // ========================================================================

    fn walk_block(&mut self, block: BlockId) -> Result<(), InferError> {
        let count = self.source.block(block).instructions.len();
        for position in 0..count {
            let instruction = self.source.block(block).instructions[position].clone();
            match instruction {
                Instruction::Branch {
                    condition,
                    true_block,
                    false_block,
                    end_block,
                } => {
                    self.deferrable(|w| w.check_condition(&condition))?;
                    self.walk_block(true_block)?;
                    self.walk_block(false_block)?;
                    self.walk_block(end_block)?;
                }
                Instruction::For {
                    start,
                    interval,
                    end,
                    loop_block,
                    end_block,
                    ..
                } => {
                    if let Some(ty) = self.deferrable(|w| w.induction_type(&start, &interval, &end))? {
                        self.induction.insert(loop_block, ty);
                    }
                    self.walk_loop(loop_block)?;
                    self.walk_block(end_block)?;
                }
                Instruction::While {
                    loop_block,
                    end_block,
                } => {
                    self.walk_loop(loop_block)?;
                    self.walk_block(end_block)?;
                }
                Instruction::Break | Instruction::Continue => {}
                other => {
                    let typed = self.deferrable(|w| w.type_instruction(block, position, other))?;
                    if let Some(Some(typed)) = typed {
                        self.body.block_mut(block).instructions[position] = typed;
                    }
                }
            }
        }
        Ok(())
    }

    /// Runs `f`. Outside strict mode a failure is only logged.
    fn deferrable<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, InferError>,
    ) -> Result<Option<T>, InferError> {
        match f(self) {
            Ok(value) => Ok(Some(value)),
            Err(e) if !self.strict => {
                trace!(error = %e, "deferred until loop types settle");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn walk_loop(&mut self, loop_block: BlockId) -> Result<(), InferError> {
        let limit = self.ctx.settings().loop_widening_limit;
        let outer_strict = self.strict;
        self.strict = false;
        self.loop_depth += 1;

        let mut visits = 0;
        let settled = loop {
            let before = self.header_types(loop_block);
            self.walk_block(loop_block)?;
            visits += 1;
            let after = self.header_types(loop_block);
            trace!(visits, block = %loop_block, "loop visited");
            if before == after {
                break true;
            }
            if visits >= limit && self.widen_header(loop_block) {
                debug!(visits, block = %loop_block, "widening loop-carried types");
            }
            if visits > limit + SETTLE_AFTER_WIDENING {
                break false;
            }
        };

        self.strict = outer_strict;
        let result = if !settled {
            Err(InferError::LoopDiverged {
                function: self.body.name.clone(),
                line: self.line,
            })
        } else if outer_strict {
            debug!(visits, block = %loop_block, "loop types settled");
            self.walk_block(loop_block)
        } else {
            Ok(())
        };
        self.loop_depth -= 1;
        result
    }

    fn header_types(&self, block: BlockId) -> Vec<Option<VariableType>> {
        self.source
            .block(block)
            .phis()
            .flat_map(|phi| phi.outputs())
            .map(|name| self.types.get(name).cloned())
            .collect()
    }

    /// Marks the header phis of `block` as widened. True if any was new.
    fn widen_header(&mut self, block: BlockId) -> bool {
        let names: Vec<String> = self
            .source
            .block(block)
            .phis()
            .flat_map(|phi| phi.outputs())
            .map(str::to_string)
            .collect();
        let mut changed = false;
        for name in names {
            if let Some(ty) = self.types.get(&name) {
                let wide = widen(ty);
                self.types.insert(name.clone(), wide);
            }
            changed |= self.widened.insert(name);
        }
        changed
    }

    // ========================================================================
    // Merges
    // ========================================================================

    /// Least common type of the typed inputs. Undefined inputs are skipped,
    /// and drop the constant of a scalar result.
    pub(crate) fn type_phi(&mut self, output: &str, inputs: &[String]) -> Result<(), InferError> {
        let typed: Vec<VariableType> = inputs
            .iter()
            .filter_map(|i| self.types.get(i).cloned())
            .collect();
        if typed.is_empty() {
            return Ok(());
        }
        let mut ty = combine_types(&typed).ok_or_else(|| InferError::NoCommonType {
            variable: display_name(output).to_string(),
            types: typed.clone(),
            line: self.line,
        })?;
        if typed.len() < inputs.len() {
            ty = ty.without_constant();
        }
        if self.widened.contains(output) {
            ty = widen(&ty);
        }
        self.types.insert(output.to_string(), ty);
        Ok(())
    }

    /// Undefined values never get a type of their own. Once everything else
    /// is typed they take the type of the slot they flow into, so the
    /// allocator can give them storage.
    fn type_undefined_values(&mut self) {
        loop {
            let mut found: Vec<(String, VariableType)> = Vec::new();
            for (_, _, inst) in self.body.instructions() {
                match inst {
                    Instruction::Phi { output, inputs, .. } => {
                        if let Some(ty) = self.types.get(output) {
                            for input in inputs.iter().filter(|i| !self.types.contains_key(*i)) {
                                found.push((input.clone(), ty.without_constant()));
                            }
                        }
                    }
                    Instruction::ParallelCopy { outputs, inputs } => {
                        for (o, i) in outputs.iter().zip(inputs) {
                            match (self.types.get(o), self.types.get(i)) {
                                (Some(ty), None) => found.push((i.clone(), ty.clone())),
                                (None, Some(ty)) => found.push((o.clone(), ty.clone())),
                                _ => {}
                            }
                        }
                    }
                    Instruction::MatrixSet { output, matrix, .. } => {
                        if let (Some(ty), None) = (self.types.get(output), self.types.get(matrix)) {
                            found.push((matrix.clone(), ty.clone()));
                        }
                    }
                    _ => {}
                }
            }
            if found.is_empty() {
                break;
            }
            for (name, ty) in found {
                self.types.entry(name).or_insert(ty);
            }
        }
    }
}
