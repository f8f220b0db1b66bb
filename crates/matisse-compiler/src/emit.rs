// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! C bodies for allocated instances.
//!
//! The blocks of an instance form a tree that mirrors the source nesting, so
//! structured C falls out of a walk over regions: a branch becomes
//! `if`/`else`, a for loop a C `for` over the iteration variable, and a while
//! loop `while (1)` that its first block leaves with `break`. Phis must
//! already be replaced by parallel copies.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use matisse_cir::builtins::COPY;
use matisse_cir::{
    ctype, CExpr, FunctionInstance, FunctionType, InstanceKey, InstanceRegistry, ProviderContext, ResolvedCall,
};
use matisse_infer::TypedInstance;
use matisse_ssa::cfg::region_blocks;
use matisse_ssa::{return_name, source_name, AssignValue, BlockId, Instruction};
use matisse_types::VariableType;
use matisse_unssa::{Variable, VariableAllocation};
use tracing::trace;

use crate::error::EmitError;

/// Compiled user functions a body may call, by name and call signature.
pub type CalleeMap = HashMap<(String, FunctionType), Arc<FunctionInstance>>;

/// What emission consults besides the instance itself.
pub struct EmitContext<'a> {
    pub registry: &'a InstanceRegistry,
    pub provider_context: &'a ProviderContext,
    pub callees: &'a CalleeMap,
}

/// Builds the standalone C function of `instance`, whose phis have been
/// eliminated against `allocation`.
pub fn emit_function(
    instance: &TypedInstance,
    allocation: &VariableAllocation,
    c_name: &str,
    ctx: &EmitContext<'_>,
) -> Result<FunctionInstance, EmitError> {
    let mut emitter = BodyEmitter::new(instance, allocation, ctx);
    let (input_names, output_names) = emitter.emit()?;

    let inputs: Vec<&str> = input_names.iter().map(String::as_str).collect();
    let outputs: Vec<&str> = output_names.iter().map(String::as_str).collect();
    let mut builder = FunctionInstance::standalone(instance.instance_key(), c_name)
        .input_names(&inputs)
        .output_names(&outputs)
        .lines(emitter.lines);
    for var in allocation.variables() {
        for header in ctype::includes(&var.ty) {
            builder = builder.include(&header);
        }
    }
    for dep in emitter.dependencies {
        builder = builder.depends_on(dep);
    }
    Ok(builder.build())
}

struct BodyEmitter<'a> {
    instance: &'a TypedInstance,
    allocation: &'a VariableAllocation,
    registry: &'a InstanceRegistry,
    provider_context: &'a ProviderContext,
    callees: &'a CalleeMap,
    lines: Vec<String>,
    dependencies: Vec<Arc<FunctionInstance>>,
    taken: HashSet<String>,
    line: u32,
}

impl<'a> BodyEmitter<'a> {
    fn new(instance: &'a TypedInstance, allocation: &'a VariableAllocation, ctx: &EmitContext<'a>) -> Self {
        let mut taken: HashSet<String> = allocation.variables().iter().map(|v| v.name.clone()).collect();
        for (_, _, inst) in instance.body.instructions() {
            match inst {
                Instruction::ReadGlobal { global, .. } | Instruction::WriteGlobal { global, .. } => {
                    taken.insert(global.clone());
                }
                _ => {}
            }
        }
        Self {
            instance,
            allocation,
            registry: ctx.registry,
            provider_context: ctx.provider_context,
            callees: ctx.callees,
            lines: Vec::new(),
            dependencies: Vec::new(),
            taken,
            line: 0,
        }
    }

    /// Emits the whole body. Returns the C names of the parameters and of
    /// the by-reference outputs.
    fn emit(&mut self) -> Result<(Vec<String>, Vec<String>), EmitError> {
        let instance = self.instance;
        let signature = &instance.function_type;

        // parameters
        let mut arguments: HashMap<usize, &str> = HashMap::new();
        for (_, _, inst) in instance.body.instructions() {
            if let Instruction::Argument { output, index } = inst {
                arguments.insert(*index, output);
            }
        }
        let mut input_names = Vec::with_capacity(signature.inputs.len());
        let mut direct: HashSet<String> = HashSet::new();
        let mut prologue: Vec<(&'a Variable, String, VariableType)> = Vec::new();
        for (index, ty) in signature.inputs.iter().enumerate() {
            let variable = match arguments.get(&index) {
                Some(ssa) => Some(self.variable(ssa)?),
                None => None,
            };
            match variable {
                // a matrix parameter updated in place must not write through
                // to the caller's array
                Some(var) if !direct.contains(&var.name) && !(var.ty.is_matrix() && var.members.len() > 1) => {
                    direct.insert(var.name.clone());
                    input_names.push(var.name.clone());
                }
                Some(var) => {
                    let name = self.fresh(&format!("{}_in", var.name));
                    prologue.push((var, name.clone(), ty.clone()));
                    input_names.push(name);
                }
                None => input_names.push(self.fresh(&format!("unused_in{}", index + 1))),
            }
        }

        // outputs
        let returned: Vec<String> = instance
            .body
            .outputs
            .iter()
            .take(signature.outputs.len())
            .map(|o| return_name(o))
            .collect();
        let mut output_names = Vec::with_capacity(returned.len());
        if !signature.returns_by_value() {
            for ret in &returned {
                let var = self.variable(ret)?;
                output_names.push(self.fresh(&format!("{}_out", var.name)));
            }
        }

        // locals
        let mut declared = false;
        for var in self.allocation.variables() {
            if direct.contains(&var.name) || matches!(var.ty, VariableType::Void) {
                continue;
            }
            self.lines.push(format!("{};", ctype::local_declaration(&var.ty, &var.name)));
            declared = true;
        }
        if declared {
            self.lines.push(String::new());
        }
        for (var, param, ty) in prologue {
            self.copy_value(&var.name, &var.ty, &param, &ty)?;
        }

        self.emit_region(BlockId::ENTRY)?;

        if signature.returns_by_value() {
            if let Some(ret) = returned.first() {
                let name = self.name(ret)?;
                self.lines.push(format!("return {};", name));
            }
        } else {
            for ((ret, param), ty) in returned.iter().zip(&output_names).zip(&signature.outputs) {
                let var = self.variable(ret)?;
                match ty {
                    VariableType::Matrix(m) if m.is_static() => {
                        self.copy_value(param, ty, &var.name, &var.ty)?;
                    }
                    _ => self.lines.push(format!("*{} = {};", param, var.name)),
                }
            }
        }
        Ok((input_names, output_names))
    }

    fn emit_region(&mut self, start: BlockId) -> Result<(), EmitError> {
        let instance = self.instance;
        let mut block = start;
        loop {
            let mut next = None;
            for inst in &instance.body.block(block).instructions {
                match inst {
                    Instruction::Branch {
                        condition,
                        true_block,
                        false_block,
                        end_block,
                    } => {
                        let condition = self.name(condition)?;
                        self.lines.push(format!("if ({}) {{", condition));
                        self.emit_region(*true_block)?;
                        if !self.region_is_empty(*false_block) {
                            self.lines.push("} else {".to_string());
                            self.emit_region(*false_block)?;
                        }
                        self.lines.push("}".to_string());
                        next = Some(*end_block);
                    }
                    Instruction::For {
                        start,
                        interval,
                        end,
                        loop_block,
                        end_block,
                        ..
                    } => {
                        let header = self.for_header(start, interval, end, *loop_block)?;
                        self.lines.push(header);
                        self.emit_region(*loop_block)?;
                        self.lines.push("}".to_string());
                        next = Some(*end_block);
                    }
                    Instruction::While { loop_block, end_block } => {
                        self.lines.push("while (1) {".to_string());
                        self.emit_region(*loop_block)?;
                        self.lines.push("}".to_string());
                        next = Some(*end_block);
                    }
                    Instruction::Break => {
                        self.lines.push("break;".to_string());
                        return Ok(());
                    }
                    Instruction::Continue => {
                        self.lines.push("continue;".to_string());
                        return Ok(());
                    }
                    other => self.emit_instruction(other)?,
                }
            }
            match next {
                Some(end) => block = end,
                None => return Ok(()),
            }
        }
    }

    fn emit_instruction(&mut self, inst: &Instruction) -> Result<(), EmitError> {
        match inst {
            Instruction::Line { line } => self.line = *line,
            Instruction::Comment { text } => {
                for part in text.lines() {
                    self.lines.push(format!("// {}", part));
                }
            }
            // parameters are bound by the prototype, the loop counter by the
            // for header
            Instruction::Argument { .. } | Instruction::Iter { .. } => {}
            Instruction::Assign {
                value: AssignValue::Undefined,
                ..
            } => {}
            Instruction::Assign {
                output,
                value: AssignValue::Variable(input),
            } => {
                let (dst, src) = (self.variable(output)?, self.variable(input)?);
                self.copy_value(&dst.name, &dst.ty, &src.name, &src.ty)?;
            }
            Instruction::Assign {
                output,
                value: AssignValue::Number(text),
            } => {
                let name = self.name(output)?;
                let code = match self
                    .instance
                    .type_of(output)
                    .and_then(|t| t.constant().zip(t.element_class()))
                {
                    Some((value, class)) => ctype::literal(value, class),
                    None => text.clone(),
                };
                self.lines.push(format!("{} = {};", name, code));
            }
            Instruction::StringLiteral { output, value } => {
                let name = self.name(output)?;
                self.lines
                    .push(format!("{} = {};", name, ctype::string_literal(value)));
            }
            Instruction::TypedCall {
                function,
                signature,
                outputs,
                inputs,
            } => {
                let args = self.types_of(inputs)?;
                let declared = outputs
                    .first()
                    .and_then(|o| source_name(o))
                    .and_then(|v| self.provider_context.settings().declared_type(v))
                    .cloned();
                let callee = self.callee(function, signature, args, declared)?;
                let args = self.exprs(inputs)?;
                let outputs = self.exprs(outputs)?;
                self.lines.push(callee.call_statement(&args, &outputs));
                self.depend(callee);
            }
            Instruction::TypedSet {
                function,
                signature,
                output,
                matrix,
                inputs,
            } => {
                let (dst, src) = (self.variable(output)?, self.variable(matrix)?);
                self.copy_value(&dst.name, &dst.ty, &src.name, &src.ty)?;
                let mut args = vec![self.type_of(output)?];
                args.extend(self.types_of(inputs)?);
                let callee = self.callee(function, signature, args, None)?;
                let mut exprs = vec![CExpr::atom(dst.name.as_str())];
                exprs.extend(self.exprs(inputs)?);
                self.lines.push(callee.call_statement(&exprs, &[]));
                self.depend(callee);
            }
            Instruction::ParallelCopy { outputs, inputs } => self.parallel_copy(outputs, inputs)?,
            Instruction::ReadGlobal { output, global } => {
                let ty = self.global(global, output)?;
                let dst = self.variable(output)?;
                self.copy_value(&dst.name, &dst.ty, global, &ty)?;
            }
            Instruction::WriteGlobal { global, input } => {
                let ty = self.global(global, input)?;
                let src = self.variable(input)?;
                self.copy_value(global, &ty, &src.name, &src.ty)?;
            }
            Instruction::Phi { .. }
            | Instruction::UntypedCall { .. }
            | Instruction::MatrixGet { .. }
            | Instruction::MatrixSet { .. }
            | Instruction::SetAll { .. }
            | Instruction::End { .. }
            | Instruction::Branch { .. }
            | Instruction::For { .. }
            | Instruction::While { .. }
            | Instruction::Break
            | Instruction::Continue => {
                return Err(EmitError::UnsupportedInstruction {
                    function: self.instance.name().to_string(),
                    instruction: inst.to_string(),
                    line: self.line,
                });
            }
        }
        Ok(())
    }

    /// `for (i = start; i <= end; i += step) {`. The comparison follows the
    /// sign of the step when it is known.
    fn for_header(&mut self, start: &str, interval: &str, end: &str, loop_block: BlockId) -> Result<String, EmitError> {
        let iteration = self
            .instance
            .body
            .block(loop_block)
            .instructions
            .iter()
            .find_map(|i| match i {
                Instruction::Iter { output } => Some(output.as_str()),
                _ => None,
            });
        let (first, step, last) = (self.name(start)?, self.name(interval)?, self.name(end)?);
        let (counter, init) = match iteration.and_then(|i| self.allocation.name_of(i)) {
            Some(counter) => (counter.to_string(), format!("{} = {}", counter, first)),
            None => {
                let ty = ctype::c_type(&self.type_of(start)?);
                let counter = self.fresh("k");
                let init = format!("{} {} = {}", ty, counter, first);
                (counter, init)
            }
        };
        let condition = match self
            .instance
            .type_of(interval)
            .and_then(VariableType::constant)
            .map(|c| c.as_f64())
        {
            Some(s) if s > 0.0 => format!("{} <= {}", counter, last),
            Some(s) if s < 0.0 => format!("{} >= {}", counter, last),
            Some(_) => "0".to_string(),
            None => format!(
                "({step} >= 0) ? ({c} <= {last}) : ({c} >= {last})",
                step = step,
                c = counter,
                last = last
            ),
        };
        Ok(format!("for ({}; {}; {} += {}) {{", init, condition, counter, step))
    }

    /// Sequential form of simultaneous copies. A cycle is broken through a
    /// scoped temporary.
    fn parallel_copy(&mut self, outputs: &[String], inputs: &[String]) -> Result<(), EmitError> {
        let mut pending: Vec<(String, VariableType, String, VariableType)> = Vec::new();
        for (output, input) in outputs.iter().zip(inputs) {
            let (dst, src) = (self.variable(output)?, self.variable(input)?);
            if dst.name != src.name && !pending.iter().any(|p| p.0 == dst.name) {
                pending.push((dst.name.clone(), dst.ty.clone(), src.name.clone(), src.ty.clone()));
            }
        }
        let mut scoped = false;
        while !pending.is_empty() {
            let ready = pending
                .iter()
                .position(|(dst, ..)| !pending.iter().any(|(_, _, src, _)| src == dst));
            match ready {
                Some(k) => {
                    let (dst, dst_ty, src, src_ty) = pending.remove(k);
                    self.copy_value(&dst, &dst_ty, &src, &src_ty)?;
                }
                None => {
                    // every destination is still read: save one first
                    let (blocked, ty) = (pending[0].0.clone(), pending[0].1.clone());
                    if !scoped {
                        self.lines.push("{".to_string());
                        scoped = true;
                    }
                    let temp = self.fresh(&format!("{}_old", blocked));
                    self.lines.push(format!("{};", ctype::local_declaration(&ty, &temp)));
                    self.copy_value(&temp, &ty, &blocked, &ty)?;
                    for copy in &mut pending {
                        if copy.2 == blocked {
                            copy.2 = temp.clone();
                        }
                    }
                }
            }
        }
        if scoped {
            self.lines.push("}".to_string());
        }
        Ok(())
    }

    /// `dst = src`, through the copy instance when both are matrices.
    fn copy_value(&mut self, dst: &str, dst_ty: &VariableType, src: &str, src_ty: &VariableType) -> Result<(), EmitError> {
        if dst == src {
            return Ok(());
        }
        match (dst_ty, src_ty) {
            (VariableType::Matrix(_), VariableType::Matrix(_)) => {
                let ctx = self
                    .provider_context
                    .for_call(vec![src_ty.without_constant()], 1, Some(dst_ty.without_constant()))
                    .with_line(self.line);
                let copy = self.registry.instance(COPY, &ctx)?;
                self.lines
                    .push(copy.call_statement(&[CExpr::atom(src)], &[CExpr::atom(dst)]));
                self.depend(copy);
            }
            (VariableType::Matrix(_), _) | (_, VariableType::Matrix(_)) => {
                return Err(EmitError::UnsupportedInstruction {
                    function: self.instance.name().to_string(),
                    instruction: format!("{} = {} ({} from {})", dst, src, dst_ty, src_ty),
                    line: self.line,
                });
            }
            _ => self.lines.push(format!("{} = {};", dst, src)),
        }
        Ok(())
    }

    /// Instance a typed call refers to: a compiled user function, or the
    /// built-in instance with exactly the recorded signature.
    fn callee(
        &self,
        function: &str,
        signature: &FunctionType,
        args: Vec<VariableType>,
        declared: Option<VariableType>,
    ) -> Result<Arc<FunctionInstance>, EmitError> {
        if let Some(user) = self.callees.get(&(function.to_string(), signature.clone())) {
            return Ok(user.clone());
        }
        let key = InstanceKey::new(function, signature.clone());
        if let Some(existing) = self.registry.get(&key) {
            return Ok(existing);
        }
        if !self.registry.table().contains(function) {
            return Err(EmitError::MissingCallee {
                function: self.instance.name().to_string(),
                callee: function.to_string(),
                line: self.line,
            });
        }
        let ctx = self
            .provider_context
            .for_call(args, signature.outputs.len(), declared)
            .with_line(self.line);
        let provider = self.registry.table().resolve(function, &ctx)?;
        trace!(operation = function, signature = %signature, "building call instance");
        Ok(self.registry.build(&ResolvedCall { provider, key }, &ctx)?)
    }

    /// Type of global `global`, registering its definition. Globals without
    /// a declared type take the type of the value read or written.
    fn global(&mut self, global: &str, value: &str) -> Result<VariableType, EmitError> {
        let ty = match self.provider_context.settings().global_types.get(global) {
            Some(ty) => ty.without_constant(),
            None => self.type_of(value)?.without_constant(),
        };
        let mut definition = FunctionInstance::definition(
            format!("global {}", global),
            format!("{};", ctype::local_declaration(&ty, global)),
        );
        for header in ctype::includes(&ty) {
            definition = definition.with_include(&header);
        }
        let key = definition.key().clone();
        let definition = self.registry.get_or_insert_with(&key, move || Ok(definition))?;
        self.depend(definition);
        Ok(ty)
    }

    fn depend(&mut self, instance: Arc<FunctionInstance>) {
        if !self.dependencies.iter().any(|d| d.key() == instance.key()) {
            self.dependencies.push(instance);
        }
    }

    /// Whether the region starting at `start` emits no code.
    fn region_is_empty(&self, start: BlockId) -> bool {
        region_blocks(&self.instance.body, start).into_iter().all(|b| {
            self.instance.body.block(b).instructions.iter().all(|i| {
                matches!(
                    i,
                    Instruction::Line { .. }
                        | Instruction::Assign {
                            value: AssignValue::Undefined,
                            ..
                        }
                )
            })
        })
    }

    fn variable(&self, ssa: &str) -> Result<&'a Variable, EmitError> {
        self.allocation
            .variable_of(ssa)
            .ok_or_else(|| EmitError::Unallocated {
                function: self.instance.name().to_string(),
                name: ssa.to_string(),
                line: self.line,
            })
    }

    fn name(&self, ssa: &str) -> Result<String, EmitError> {
        Ok(self.variable(ssa)?.name.clone())
    }

    /// Inferred type of `ssa`, constant included.
    fn type_of(&self, ssa: &str) -> Result<VariableType, EmitError> {
        match self.instance.type_of(ssa) {
            Some(ty) => Ok(ty.clone()),
            None => Ok(self.variable(ssa)?.ty.clone()),
        }
    }

    fn types_of(&self, names: &[String]) -> Result<Vec<VariableType>, EmitError> {
        names.iter().map(|n| self.type_of(n)).collect()
    }

    fn exprs(&self, names: &[String]) -> Result<Vec<CExpr>, EmitError> {
        names
            .iter()
            .map(|n| Ok(CExpr::atom(self.variable(n)?.name.as_str())))
            .collect()
    }

    /// `base`, or `base_1`, `base_2`, ... if taken.
    fn fresh(&mut self, base: &str) -> String {
        let mut name = base.to_string();
        let mut suffix = 1;
        while self.taken.contains(&name) {
            name = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        self.taken.insert(name.clone());
        name
    }
}
