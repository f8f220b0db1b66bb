// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Syntax tree to SSA.
//!
//! A version table maps each source variable to its current SSA name while
//! statements are appended to the current block. Phis are placed from the
//! syntactic nesting alone:
//!
//! * after an `if`, one phi per variable whose versions differ between the
//!   arms that fall through;
//! * at the top of a loop body, one phi per variable written in the body,
//!   fed by the loop entry, every `continue` and the body end;
//! * after a loop, one phi per variable whose versions differ between the
//!   loop entry (for loops only), every `break` and the body end.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use matisse_ast::{Expr, ExprKind, FunctionNode, LValue, LoopProperty, Span, Stmt, StmtKind};
use tracing::debug;

use crate::body::{BlockId, FunctionBody};
use crate::error::SsaError;
use crate::instruction::{AssignValue, Instruction};
use crate::{is_temporary, return_name, GLOBAL_PREFIX};

type Versions = IndexMap<String, String>;

/// Builds the SSA form of `function`, which must already be free of `return`.
pub fn build_ssa(function: &FunctionNode, file: &str) -> Result<FunctionBody, SsaError> {
    let mut builder = SsaBuilder::new(function, file);
    builder.entry(function);
    builder.statements(&function.body)?;
    builder.exit(function);
    debug!(
        function = %function.name,
        blocks = builder.body.blocks.len(),
        "built SSA"
    );
    Ok(builder.body)
}

struct LoopFrame {
    continues: Vec<(BlockId, Versions)>,
    breaks: Vec<(BlockId, Versions)>,
}

/// Matrix being indexed, for `end` and `:` inside its indices.
struct IndexContext {
    matrix: String,
    index: usize,
    count: usize,
}

struct SsaBuilder {
    body: FunctionBody,
    current: BlockId,
    versions: Versions,
    counters: HashMap<String, u32>,
    globals: HashSet<String>,
    loops: Vec<LoopFrame>,
    line: u32,
    span: Span,
}

impl SsaBuilder {
    fn new(function: &FunctionNode, file: &str) -> Self {
        let mut body = FunctionBody::new(function.name.clone(), file);
        body.inputs = function.inputs.clone();
        body.outputs = function.outputs.clone();
        body.properties = function.properties.clone();
        Self {
            body,
            current: BlockId::ENTRY,
            versions: Versions::new(),
            counters: HashMap::new(),
            globals: HashSet::new(),
            loops: Vec::new(),
            line: 0,
            span: Span::default(),
        }
    }

    // ========================================================================
    // Names
    // ========================================================================

    fn fresh_version(&mut self, name: &str) -> String {
        let counter = self.counters.entry(name.to_string()).or_insert(0);
        *counter += 1;
        if self.globals.contains(name) {
            format!("{}{}${}", GLOBAL_PREFIX, name, counter)
        } else {
            format!("{}${}", name, counter)
        }
    }

    fn define(&mut self, name: &str) -> String {
        let version = self.fresh_version(name);
        self.versions.insert(name.to_string(), version.clone());
        version
    }

    fn emit(&mut self, instruction: Instruction) {
        self.body.block_mut(self.current).push(instruction);
    }

    fn temporary(&mut self, semantic: &str) -> String {
        self.body.make_temporary(semantic)
    }

    fn version_of(&self, name: &str) -> Result<String, SsaError> {
        self.versions
            .get(name)
            .cloned()
            .ok_or_else(|| SsaError::InvalidTarget {
                message: format!("`{}` is not a variable", name),
                line: self.line,
                span: self.span,
            })
    }

    // ========================================================================
    // Function entry and exit
    // ========================================================================

    fn entry(&mut self, function: &FunctionNode) {
        for (index, input) in function.inputs.iter().enumerate() {
            let output = self.define(input);
            self.emit(Instruction::Argument { output, index });
        }
        for name in function.assigned_names() {
            if !self.versions.contains_key(&name) {
                let output = self.define(&name);
                self.emit(Instruction::Assign {
                    output,
                    value: AssignValue::Undefined,
                });
            }
        }
    }

    fn exit(&mut self, function: &FunctionNode) {
        for output in &function.outputs {
            let value = match self.versions.get(output) {
                Some(v) => AssignValue::Variable(v.clone()),
                None => AssignValue::Undefined,
            };
            self.emit(Instruction::Assign {
                output: return_name(output),
                value,
            });
        }
    }

    // ========================================================================
    // Statements
    // ========================================================================

    /// Returns false once control cannot fall through (after `break`/`continue`).
    fn statements(&mut self, stmts: &[Stmt]) -> Result<bool, SsaError> {
        for stmt in stmts {
            if !self.statement(stmt)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn statement(&mut self, stmt: &Stmt) -> Result<bool, SsaError> {
        self.line = stmt.line;
        self.span = stmt.span;
        if stmt.line > 0 && !matches!(stmt.kind, StmtKind::Comment(_)) {
            self.emit(Instruction::Line { line: stmt.line });
        }
        match &stmt.kind {
            StmtKind::Assign { targets, value } => self.assignment(targets, value)?,
            StmtKind::Expr(e) => self.expression_statement(e)?,
            StmtKind::If {
                cond,
                then_body,
                elseifs,
                else_body,
            } => {
                if let Some(((first_cond, first_body), rest)) = elseifs.split_first() {
                    let nested = Stmt::new(
                        StmtKind::If {
                            cond: first_cond.clone(),
                            then_body: first_body.clone(),
                            elseifs: rest.to_vec(),
                            else_body: else_body.clone(),
                        },
                        stmt.span,
                        stmt.line,
                    );
                    self.if_statement(cond, then_body, std::slice::from_ref(&nested))?;
                } else {
                    self.if_statement(cond, then_body, else_body.as_deref().unwrap_or(&[]))?;
                }
            }
            StmtKind::For {
                var,
                range,
                body,
                properties,
            } => self.for_loop(var, range, body, properties)?,
            StmtKind::While { cond, body } => self.while_loop(cond, body)?,
            StmtKind::Break => {
                let frame = self
                    .loops
                    .last_mut()
                    .ok_or(SsaError::BreakOutsideLoop {
                        line: stmt.line,
                        span: stmt.span,
                    })?;
                frame.breaks.push((self.current, self.versions.clone()));
                self.emit(Instruction::Break);
                return Ok(false);
            }
            StmtKind::Continue => {
                let frame = self
                    .loops
                    .last_mut()
                    .ok_or(SsaError::ContinueOutsideLoop {
                        line: stmt.line,
                        span: stmt.span,
                    })?;
                frame.continues.push((self.current, self.versions.clone()));
                self.emit(Instruction::Continue);
                return Ok(false);
            }
            StmtKind::Return => return Err(SsaError::ReturnNotRemoved {
                line: stmt.line,
                span: stmt.span,
            }),
            StmtKind::Global(names) => {
                for name in names {
                    self.globals.insert(name.clone());
                    let output = self.define(name);
                    self.emit(Instruction::ReadGlobal {
                        output,
                        global: name.clone(),
                    });
                }
            }
            StmtKind::Comment(text) => self.emit(Instruction::Comment { text: text.clone() }),
        }
        Ok(true)
    }

    fn assignment(&mut self, targets: &[LValue], value: &Expr) -> Result<(), SsaError> {
        match targets {
            [LValue::Var(name)] => {
                let v = self.value(value, None)?;
                self.assign_var(name, v);
                Ok(())
            }
            [LValue::Index { name, indices }] => {
                let v = self.value(value, None)?;
                self.assign_index(name, indices, v)
            }
            [LValue::Ignore] | [] => Err(SsaError::InvalidTarget {
                message: "nothing to assign to".to_string(),
                line: self.line,
                span: self.span,
            }),
            _ => {
                let (function, args) = match &value.kind {
                    ExprKind::Apply { target, args } if !self.versions.contains_key(target) => {
                        (target.as_str(), args.as_slice())
                    }
                    ExprKind::Ident(name) if !self.versions.contains_key(name) => (name.as_str(), &[][..]),
                    _ => {
                        return Err(SsaError::InvalidTarget {
                            message: "multiple outputs need a function call".to_string(),
                            line: self.line,
                            span: self.span,
                        })
                    }
                };
                let outputs = self.call(function, args, targets.len(), None)?;
                for (target, output) in targets.iter().zip(outputs) {
                    match target {
                        LValue::Var(name) => self.assign_var(name, output),
                        LValue::Index { name, indices } => self.assign_index(name, indices, output)?,
                        LValue::Ignore => {}
                    }
                }
                Ok(())
            }
        }
    }

    fn assign_var(&mut self, name: &str, value: String) {
        let target = self.fresh_version(name);
        // name the temporary just computed after the variable instead of copying it
        let renamed = match self.body.block_mut(self.current).instructions.last_mut() {
            Some(last) if is_temporary(&value) && last.outputs().contains(&value.as_str()) => {
                last.rename_outputs(|n| (n == value).then(|| target.clone()));
                true
            }
            _ => false,
        };
        if !renamed {
            self.emit(Instruction::Assign {
                output: target.clone(),
                value: AssignValue::Variable(value),
            });
        }
        self.versions.insert(name.to_string(), target.clone());
        self.write_back_global(name, &target);
    }

    fn assign_index(&mut self, name: &str, indices: &[Expr], value: String) -> Result<(), SsaError> {
        let matrix = self.version_of(name)?;
        let instruction = match indices {
            [] => {
                return Err(SsaError::InvalidTarget {
                    message: format!("`{}()` cannot be assigned", name),
                    line: self.line,
                    span: self.span,
                })
            }
            [single] if matches!(single.kind, ExprKind::Colon) => {
                let output = self.fresh_version(name);
                Instruction::SetAll {
                    output,
                    matrix,
                    value,
                }
            }
            _ => {
                let indices = self.indices(&matrix, indices)?;
                let output = self.fresh_version(name);
                Instruction::MatrixSet {
                    output,
                    matrix,
                    indices,
                    value,
                }
            }
        };
        let output = instruction.outputs()[0].to_string();
        self.emit(instruction);
        self.versions.insert(name.to_string(), output.clone());
        self.write_back_global(name, &output);
        Ok(())
    }

    fn write_back_global(&mut self, name: &str, version: &str) {
        if self.globals.contains(name) {
            self.emit(Instruction::WriteGlobal {
                global: name.to_string(),
                input: version.to_string(),
            });
        }
    }

    fn expression_statement(&mut self, e: &Expr) -> Result<(), SsaError> {
        match &e.kind {
            ExprKind::Apply { target, args } if !self.versions.contains_key(target) => {
                self.call(target, args, 0, None)?;
            }
            ExprKind::Ident(name) if !self.versions.contains_key(name) => {
                self.call(name, &[], 0, None)?;
            }
            _ => {
                self.value(e, None)?;
            }
        }
        Ok(())
    }

    // ========================================================================
    // Control flow
    // ========================================================================

    fn if_statement(&mut self, cond: &Expr, then_body: &[Stmt], else_body: &[Stmt]) -> Result<(), SsaError> {
        let condition = self.value(cond, None)?;
        let true_block = self.body.add_block();
        let false_block = self.body.add_block();
        let end_block = self.body.add_block();
        self.emit(Instruction::Branch {
            condition,
            true_block,
            false_block,
            end_block,
        });
        let before = self.versions.clone();
        let mut arms = Vec::new();
        for (block, stmts) in [(true_block, then_body), (false_block, else_body)] {
            self.current = block;
            self.versions = before.clone();
            if self.statements(stmts)? {
                arms.push((self.current, self.versions.clone()));
            }
        }
        self.current = end_block;
        self.join(arms, before);
        Ok(())
    }

    fn for_loop(
        &mut self,
        var: &str,
        range: &Expr,
        body: &[Stmt],
        properties: &[LoopProperty],
    ) -> Result<(), SsaError> {
        let ExprKind::Range { start, step, end } = &range.kind else {
            return Err(SsaError::NonRangeFor {
                line: self.line,
                span: range.span,
            });
        };
        let start = self.value(start, None)?;
        let interval = match step {
            Some(step) => self.value(step, None)?,
            None => self.number("1"),
        };
        let end = self.value(end, None)?;

        let entry = self.current;
        let loop_block = self.body.add_block();
        let end_block = self.body.add_block();
        self.emit(Instruction::For {
            start,
            interval,
            end,
            loop_block,
            end_block,
            properties: properties.to_vec(),
        });
        let before = self.versions.clone();

        self.current = loop_block;
        let header = self.header_phis(body, Some(var), entry, &before);
        let iter = self.define(var);
        self.emit(Instruction::Iter { output: iter });

        let (frame, body_end) = self.loop_body(body)?;
        self.complete_header(loop_block, &header, &frame, body_end.as_ref());

        // a continue taken in the last iteration leaves the loop
        let mut arms = vec![(entry, before.clone())];
        arms.extend(frame.continues);
        arms.extend(frame.breaks);
        arms.extend(body_end);
        self.current = end_block;
        self.join(arms, before);
        Ok(())
    }

    fn while_loop(&mut self, cond: &Expr, body: &[Stmt]) -> Result<(), SsaError> {
        let entry = self.current;
        let loop_block = self.body.add_block();
        let end_block = self.body.add_block();
        self.emit(Instruction::While {
            loop_block,
            end_block,
        });
        let before = self.versions.clone();

        self.current = loop_block;
        let header = self.header_phis(body, None, entry, &before);
        self.loops.push(LoopFrame {
            continues: Vec::new(),
            breaks: Vec::new(),
        });

        // if cond, (nothing), else break, end; then the body
        let condition = self.value(cond, None)?;
        let true_block = self.body.add_block();
        let false_block = self.body.add_block();
        let join_block = self.body.add_block();
        self.emit(Instruction::Branch {
            condition,
            true_block,
            false_block,
            end_block: join_block,
        });
        self.current = false_block;
        if let Some(frame) = self.loops.last_mut() {
            frame.breaks.push((false_block, self.versions.clone()));
        }
        self.emit(Instruction::Break);
        self.current = join_block;

        let falls = self.statements(body)?;
        let body_end = falls.then(|| (self.current, self.versions.clone()));
        let frame = self.loops.pop().ok_or_else(|| SsaError::Invariant {
            function: self.body.name.clone(),
            message: "loop stack underflow".to_string(),
        })?;
        self.complete_header(loop_block, &header, &frame, body_end.as_ref());

        self.current = end_block;
        self.join(frame.breaks, before);
        Ok(())
    }

    /// Opens phis for every variable the loop body writes, fed so far by
    /// the loop entry only. Returns (source name, phi output) pairs.
    fn header_phis(
        &mut self,
        body: &[Stmt],
        induction: Option<&str>,
        entry: BlockId,
        before: &Versions,
    ) -> Vec<(String, String)> {
        let mut written = Vec::new();
        for stmt in body {
            stmt.assigned_names(&mut written);
        }
        let mut header = Vec::new();
        for name in written {
            if Some(name.as_str()) == induction {
                continue;
            }
            let Some(initial) = before.get(&name).cloned() else {
                continue;
            };
            let output = self.define(&name);
            self.emit(Instruction::Phi {
                output: output.clone(),
                inputs: vec![initial],
                sources: vec![entry],
            });
            header.push((name, output));
        }
        header
    }

    fn loop_body(&mut self, body: &[Stmt]) -> Result<(LoopFrame, Option<(BlockId, Versions)>), SsaError> {
        self.loops.push(LoopFrame {
            continues: Vec::new(),
            breaks: Vec::new(),
        });
        let falls = self.statements(body)?;
        let body_end = falls.then(|| (self.current, self.versions.clone()));
        let frame = self.loops.pop().ok_or_else(|| SsaError::Invariant {
            function: self.body.name.clone(),
            message: "loop stack underflow".to_string(),
        })?;
        Ok((frame, body_end))
    }

    /// Adds the back-edge inputs (continues, then the body end) to the header phis.
    fn complete_header(
        &mut self,
        loop_block: BlockId,
        header: &[(String, String)],
        frame: &LoopFrame,
        body_end: Option<&(BlockId, Versions)>,
    ) {
        let back_edges: Vec<&(BlockId, Versions)> = frame.continues.iter().chain(body_end).collect();
        for inst in &mut self.body.block_mut(loop_block).instructions {
            let Instruction::Phi {
                output,
                inputs,
                sources,
            } = inst
            else {
                continue;
            };
            let Some((name, _)) = header.iter().find(|(_, phi)| phi == output) else {
                continue;
            };
            for (block, versions) in &back_edges {
                if let Some(v) = versions.get(name) {
                    inputs.push(v.clone());
                    sources.push(*block);
                }
            }
        }
    }

    /// Continues after a control construct reached from `arms`, merging
    /// differing versions with phis in the current block.
    fn join(&mut self, arms: Vec<(BlockId, Versions)>, fallback: Versions) {
        match arms.len() {
            0 => self.versions = fallback,
            1 => {
                if let Some((_, versions)) = arms.into_iter().next() {
                    self.versions = versions;
                }
            }
            _ => {
                let mut merged = Versions::new();
                let names: Vec<String> = arms[0].1.keys().cloned().collect();
                for name in names {
                    let inputs: Option<Vec<String>> =
                        arms.iter().map(|(_, v)| v.get(&name).cloned()).collect();
                    let Some(inputs) = inputs else {
                        continue;
                    };
                    if inputs.iter().all(|i| *i == inputs[0]) {
                        merged.insert(name, inputs[0].clone());
                        continue;
                    }
                    let output = self.fresh_version(&name);
                    self.emit(Instruction::Phi {
                        output: output.clone(),
                        inputs,
                        sources: arms.iter().map(|(b, _)| *b).collect(),
                    });
                    merged.insert(name, output);
                }
                self.versions = merged;
            }
        }
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    fn number(&mut self, text: &str) -> String {
        let output = self.temporary("number");
        self.emit(Instruction::Assign {
            output: output.clone(),
            value: AssignValue::Number(text.to_string()),
        });
        output
    }

    /// Lowers `e` and returns the name holding its value.
    fn value(&mut self, e: &Expr, index: Option<&IndexContext>) -> Result<String, SsaError> {
        match &e.kind {
            ExprKind::Number(text) => Ok(self.number(text)),
            ExprKind::Str(text) => {
                let output = self.temporary("string");
                self.emit(Instruction::StringLiteral {
                    output: output.clone(),
                    value: text.clone(),
                });
                Ok(output)
            }
            ExprKind::Ident(name) => match self.versions.get(name) {
                Some(v) => Ok(v.clone()),
                None => self.single(name, &[], index),
            },
            ExprKind::Apply { target, args } => match self.versions.get(target).cloned() {
                Some(matrix) => self.access(matrix, args),
                None => self.single(target, args, index),
            },
            ExprKind::End => {
                let ctx = index.ok_or_else(|| SsaError::Unsupported {
                    construct: "`end` outside of an index".to_string(),
                    line: self.line,
                    span: e.span,
                })?;
                Ok(self.end_of(ctx))
            }
            ExprKind::Colon => {
                let ctx = index.ok_or_else(|| SsaError::Unsupported {
                    construct: "`:` outside of an index".to_string(),
                    line: self.line,
                    span: e.span,
                })?;
                // A(:) reads as A(1:end)
                let one = self.number("1");
                let end = self.end_of(ctx);
                self.call_values("colon", vec![one, end], 1)
                    .map(|mut outs| outs.remove(0))
            }
            ExprKind::Range { start, step, end } => {
                let mut inputs = vec![self.value(start, index)?];
                if let Some(step) = step {
                    inputs.push(self.value(step, index)?);
                }
                inputs.push(self.value(end, index)?);
                self.call_values("colon", inputs, 1).map(|mut outs| outs.remove(0))
            }
            ExprKind::Binary { op, left, right } => {
                let inputs = vec![self.value(left, index)?, self.value(right, index)?];
                self.call_values(op.function_name(), inputs, 1)
                    .map(|mut outs| outs.remove(0))
            }
            ExprKind::Unary { op, operand } => {
                let inputs = vec![self.value(operand, index)?];
                self.call_values(op.function_name(), inputs, 1)
                    .map(|mut outs| outs.remove(0))
            }
            ExprKind::Matrix(rows) => self.matrix_literal(rows, index),
        }
    }

    fn matrix_literal(&mut self, rows: &[Vec<Expr>], index: Option<&IndexContext>) -> Result<String, SsaError> {
        if rows.iter().all(Vec::is_empty) {
            let zero = self.number("0");
            let zero2 = self.number("0");
            return self
                .call_values("zeros", vec![zero, zero2], 1)
                .map(|mut outs| outs.remove(0));
        }
        let mut row_values = Vec::new();
        for row in rows.iter().filter(|r| !r.is_empty()) {
            let mut elements = Vec::new();
            for e in row {
                elements.push(self.value(e, index)?);
            }
            let value = if elements.len() == 1 {
                elements.remove(0)
            } else {
                self.call_values("horzcat", elements, 1)?.remove(0)
            };
            row_values.push(value);
        }
        if row_values.len() == 1 {
            return Ok(row_values.remove(0));
        }
        self.call_values("vertcat", row_values, 1)
            .map(|mut outs| outs.remove(0))
    }

    fn end_of(&mut self, ctx: &IndexContext) -> String {
        let output = self.temporary("end");
        self.emit(Instruction::End {
            output: output.clone(),
            matrix: ctx.matrix.clone(),
            index: ctx.index,
            num_indices: ctx.count,
        });
        output
    }

    fn indices(&mut self, matrix: &str, indices: &[Expr]) -> Result<Vec<String>, SsaError> {
        let count = indices.len();
        let mut out = Vec::with_capacity(count);
        for (index, e) in indices.iter().enumerate() {
            let ctx = IndexContext {
                matrix: matrix.to_string(),
                index,
                count,
            };
            out.push(self.value(e, Some(&ctx))?);
        }
        Ok(out)
    }

    fn access(&mut self, matrix: String, args: &[Expr]) -> Result<String, SsaError> {
        if args.is_empty() {
            return Ok(matrix);
        }
        let indices = self.indices(&matrix, args)?;
        let output = self.temporary("get");
        self.emit(Instruction::MatrixGet {
            output: output.clone(),
            matrix,
            indices,
        });
        Ok(output)
    }

    fn single(&mut self, function: &str, args: &[Expr], index: Option<&IndexContext>) -> Result<String, SsaError> {
        Ok(self.call(function, args, 1, index)?.remove(0))
    }

    fn call(
        &mut self,
        function: &str,
        args: &[Expr],
        outputs: usize,
        index: Option<&IndexContext>,
    ) -> Result<Vec<String>, SsaError> {
        let mut inputs = Vec::with_capacity(args.len());
        for arg in args {
            inputs.push(self.value(arg, index)?);
        }
        self.call_values(function, inputs, outputs)
    }

    fn call_values(&mut self, function: &str, inputs: Vec<String>, outputs: usize) -> Result<Vec<String>, SsaError> {
        let outputs: Vec<String> = (0..outputs).map(|_| self.temporary(function)).collect();
        self.emit(Instruction::UntypedCall {
            function: function.to_string(),
            outputs: outputs.clone(),
            inputs,
        });
        Ok(outputs)
    }
}
