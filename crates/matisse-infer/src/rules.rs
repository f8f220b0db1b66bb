// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Typing rules, one per instruction kind.

use matisse_cir::builtins::{self, access, query};
use matisse_cir::CirError;
use matisse_ssa::{source_name, AssignValue, BlockId, Instruction, RETURN_SUFFIX};
use matisse_types::{
    classify_conversion, combine_types, Conversion, Dim, MatrixType, Shape, VariableType,
};

use crate::error::InferError;
use crate::walk::{display_name, TypeWalker};

impl TypeWalker<'_> {
    /// Types the outputs of `inst`. Returns a replacement when the
    /// instruction changes form (untyped calls become typed calls).
    pub(crate) fn type_instruction(
        &mut self,
        block: BlockId,
        position: usize,
        inst: Instruction,
    ) -> Result<Option<Instruction>, InferError> {
        match inst {
            Instruction::Line { line } => {
                self.line = line;
                self.ctx = self.ctx.with_line(line);
            }
            Instruction::Comment { .. } => {}
            Instruction::Argument { output, index } => {
                let ty = self.key.args.get(index).cloned().ok_or_else(|| {
                    InferError::MismatchedTypes {
                        message: format!(
                            "`{}` takes parameter {} but was called with {} arguments",
                            self.body.name,
                            index + 1,
                            self.key.args.len()
                        ),
                        line: self.line,
                    }
                })?;
                self.types.insert(output, ty);
            }
            Instruction::Assign { output, value } => self.type_assign(output, value)?,
            Instruction::StringLiteral { output, value } => {
                self.types.insert(output, VariableType::string(value));
            }
            Instruction::Phi { output, inputs, .. } => self.type_phi(&output, &inputs)?,
            Instruction::ParallelCopy { outputs, inputs } => {
                for (output, input) in outputs.into_iter().zip(inputs) {
                    if let Some(ty) = self.types.get(&input).cloned() {
                        self.types.insert(output, ty);
                    }
                }
            }
            Instruction::UntypedCall {
                function,
                outputs,
                inputs,
            } => return self.type_call(block, position, function, outputs, inputs).map(Some),
            Instruction::MatrixGet {
                output,
                matrix,
                indices,
            } => self.type_matrix_get(output, &matrix, &indices)?,
            Instruction::End {
                output,
                matrix,
                index,
                num_indices,
            } => self.type_end(output, &matrix, index, num_indices)?,
            Instruction::MatrixSet {
                output,
                matrix,
                indices,
                value,
            } => self.type_matrix_set(output, &matrix, &indices, &value)?,
            Instruction::SetAll {
                output,
                matrix,
                value,
            } => {
                let dst = self.require(&matrix)?;
                let src = self.require(&value)?;
                if access::SetAllMode::classify(&dst, &src).is_none() {
                    return Err(self.mismatch(format!(
                        "cannot assign a {} to every element of `{}`, a {}",
                        src,
                        display_name(&matrix),
                        dst
                    )));
                }
                self.types.insert(output, dst);
            }
            Instruction::Iter { output } => {
                if let Some(ty) = self.induction.get(&block).cloned() {
                    self.types.insert(output, ty);
                }
            }
            Instruction::ReadGlobal { output, global } => {
                let ty = self
                    .ctx
                    .settings()
                    .global_types
                    .get(&global)
                    .cloned()
                    .ok_or_else(|| InferError::UndeclaredGlobal {
                        global: global.clone(),
                        line: self.line,
                    })?;
                self.types.insert(output, ty);
            }
            Instruction::WriteGlobal { global, input } => {
                let declared = self
                    .ctx
                    .settings()
                    .global_types
                    .get(&global)
                    .cloned()
                    .ok_or_else(|| InferError::UndeclaredGlobal {
                        global: global.clone(),
                        line: self.line,
                    })?;
                let value = self.require(&input)?;
                if classify_conversion(&value, &declared) == Conversion::Incompatible {
                    return Err(self.mismatch(format!(
                        "global `{}` is declared {} but assigned a {}",
                        global, declared, value
                    )));
                }
            }
            other @ (Instruction::TypedCall { .. }
            | Instruction::TypedSet { .. }
            | Instruction::Branch { .. }
            | Instruction::For { .. }
            | Instruction::While { .. }
            | Instruction::Break
            | Instruction::Continue) => {
                return Err(InferError::UnsupportedInstruction {
                    instruction: other.to_string(),
                    line: self.line,
                })
            }
        }
        Ok(None)
    }

    fn require(&self, name: &str) -> Result<VariableType, InferError> {
        self.types
            .get(name)
            .cloned()
            .ok_or_else(|| InferError::UsedBeforeDefinition {
                variable: display_name(name).to_string(),
                line: self.line,
            })
    }

    fn mismatch(&self, message: String) -> InferError {
        InferError::MismatchedTypes {
            message,
            line: self.line,
        }
    }

    fn type_assign(&mut self, output: String, value: AssignValue) -> Result<(), InferError> {
        match value {
            AssignValue::Number(text) => {
                let ty = self
                    .ctx
                    .numerics()
                    .literal(&text)
                    .map_err(|_| InferError::InvalidLiteral {
                        text,
                        line: self.line,
                    })?;
                self.types.insert(output, VariableType::Scalar(ty));
            }
            AssignValue::Variable(input) => match self.types.get(&input).cloned() {
                Some(ty) => {
                    self.types.insert(output, ty);
                }
                // an output left undefined is reported once the walk ends
                None if output.ends_with(RETURN_SUFFIX) => {}
                None => {
                    return Err(InferError::UsedBeforeDefinition {
                        variable: display_name(&input).to_string(),
                        line: self.line,
                    })
                }
            },
            AssignValue::Undefined => {}
        }
        Ok(())
    }

    // ========================================================================
    // Control
    // ========================================================================

    pub(crate) fn check_condition(&self, condition: &str) -> Result<(), InferError> {
        match self.require(condition)? {
            VariableType::Scalar(_) => Ok(()),
            other => Err(self.mismatch(format!(
                "condition must be a scalar, found {}",
                other
            ))),
        }
    }

    /// Type of a for-loop's induction variable: the bounds' common scalar
    /// type, without constants.
    pub(crate) fn induction_type(
        &self,
        start: &str,
        interval: &str,
        end: &str,
    ) -> Result<VariableType, InferError> {
        let bounds = [self.require(start)?, self.require(interval)?, self.require(end)?];
        if let Some(bad) = bounds.iter().find(|t| !t.is_scalar()) {
            return Err(self.mismatch(format!("for-loop bounds must be scalars, found {}", bad)));
        }
        let plain: Vec<VariableType> = bounds.iter().map(VariableType::without_constant).collect();
        combine_types(&plain).ok_or_else(|| InferError::NoCommonType {
            variable: "for-loop bounds".to_string(),
            types: plain,
            line: self.line,
        })
    }

    // ========================================================================
    // Calls
    // ========================================================================

    fn type_call(
        &mut self,
        block: BlockId,
        position: usize,
        function: String,
        mut outputs: Vec<String>,
        inputs: Vec<String>,
    ) -> Result<Instruction, InferError> {
        let args = inputs
            .iter()
            .map(|i| self.require(i))
            .collect::<Result<Vec<_>, _>>()?;

        let signature = match self.engine.source().resolve(&self.key.function, &function) {
            Some(id) => {
                let args: Vec<VariableType> = args.iter().map(VariableType::without_constant).collect();
                let callee = self
                    .engine
                    .infer(&id, &args, outputs.len())
                    .map_err(|e| e.at_line(self.line))?;
                if !self.callees.contains(&callee.key) {
                    self.callees.push(callee.key.clone());
                }
                callee.function_type.clone()
            }
            None => {
                let declared = outputs
                    .first()
                    .and_then(|o| source_name(o))
                    .and_then(|v| self.ctx.settings().declared_type(v))
                    .cloned();
                let ctx = self.ctx.for_call(args, outputs.len(), declared);
                let call = self.engine.registry().resolve(&function, &ctx)?;
                call.key.signature
            }
        };

        if outputs.len() > signature.outputs.len() {
            return Err(CirError::TooManyOutputs {
                operation: function,
                requested: outputs.len(),
                line: self.line,
            }
            .into());
        }
        let missing = signature.outputs.len() - outputs.len();
        if missing > 0 {
            let padding = match self.padding.get(&(block, position)) {
                Some(names) => names.clone(),
                None => {
                    let names: Vec<String> =
                        (0..missing).map(|_| self.body.make_temporary("unused")).collect();
                    self.padding.insert((block, position), names.clone());
                    names
                }
            };
            outputs.extend(padding);
        }

        for (output, actual) in outputs.iter().zip(&signature.outputs) {
            let ty = self.with_declared(output, actual, &function)?;
            self.types.insert(output.clone(), ty);
        }
        Ok(Instruction::TypedCall {
            function,
            signature,
            outputs,
            inputs,
        })
    }

    /// Type stored in `output` given the provider's `actual` result and any
    /// declared type for the variable.
    fn with_declared(
        &self,
        output: &str,
        actual: &VariableType,
        operation: &str,
    ) -> Result<VariableType, InferError> {
        let Some(declared) = source_name(output).and_then(|v| self.ctx.settings().declared_type(v))
        else {
            return Ok(actual.clone());
        };
        match classify_conversion(actual, declared) {
            Conversion::Incompatible => Err(CirError::OutputTypeMismatch {
                operation: operation.to_string(),
                actual: actual.clone(),
                declared: declared.clone(),
                line: self.line,
            }
            .into()),
            Conversion::Identity => Ok(declared.clone()),
            _ if declared.is_scalar() => Ok(declared.clone()),
            _ => Ok(actual.clone()),
        }
    }

    // ========================================================================
    // Matrix access
    // ========================================================================

    fn type_matrix_get(
        &mut self,
        output: String,
        matrix: &str,
        indices: &[String],
    ) -> Result<(), InferError> {
        let m = self.require(matrix)?;
        let index_types = indices
            .iter()
            .map(|i| self.require(i))
            .collect::<Result<Vec<_>, _>>()?;
        let ty = match &m {
            VariableType::Scalar(_) if index_types.iter().all(VariableType::is_scalar) => m.clone(),
            VariableType::Matrix(mt) => {
                let all_scalar = index_types.iter().all(VariableType::is_scalar);
                if all_scalar && !access::dimensionality_matches(mt, indices.len()) {
                    return Err(InferError::Dimensionality {
                        matrix: display_name(matrix).to_string(),
                        ndims: mt.shape.ndims().unwrap_or(0),
                        count: indices.len(),
                        line: self.line,
                    });
                }
                let mut args = vec![m.clone()];
                args.extend(index_types);
                let ctx = self.ctx.for_call(args, 1, None);
                let call = self.engine.registry().resolve(builtins::MATRIX_GET, &ctx)?;
                call.outputs()
                    .first()
                    .cloned()
                    .ok_or_else(|| self.mismatch(format!("`{}` cannot be indexed", display_name(matrix))))?
            }
            other => {
                return Err(self.mismatch(format!(
                    "cannot index `{}`, a {}",
                    display_name(matrix),
                    other
                )))
            }
        };
        self.types.insert(output, ty);
        Ok(())
    }

    fn type_end(
        &mut self,
        output: String,
        matrix: &str,
        index: usize,
        num_indices: usize,
    ) -> Result<(), InferError> {
        let m = self.require(matrix)?;
        let numerics = self.ctx.numerics();
        let args = vec![
            m,
            numerics.index_constant(index as i64),
            numerics.index_constant(num_indices as i64),
        ];
        let ctx = self.ctx.for_call(args, 1, None);
        let call = self.engine.registry().resolve(builtins::END, &ctx)?;
        if let Some(ty) = call.outputs().first() {
            self.types.insert(output, ty.clone());
        }
        Ok(())
    }

    fn type_matrix_set(
        &mut self,
        output: String,
        matrix: &str,
        indices: &[String],
        value: &str,
    ) -> Result<(), InferError> {
        let index_types = indices
            .iter()
            .map(|i| self.require(i))
            .collect::<Result<Vec<_>, _>>()?;
        let value_ty = self.require(value)?;

        let ty = match self.types.get(matrix).cloned() {
            None => self.first_write(matrix, &index_types, &value_ty)?,
            Some(VariableType::Matrix(m)) => self.write_into(matrix, m, &index_types, &value_ty)?,
            Some(other) => {
                return Err(self.mismatch(format!(
                    "cannot assign into an element of `{}`, a {}",
                    display_name(matrix),
                    other
                )))
            }
        };
        if let VariableType::Matrix(m) = &ty {
            if !m.is_static() && !self.ctx.settings().allow_dynamic_matrices {
                return Err(CirError::DynamicDisabled {
                    operation: format!("assignment into `{}`", display_name(matrix)),
                    line: self.line,
                }
                .into());
            }
        }
        self.types.insert(output, ty);
        Ok(())
    }

    /// Indexed write into a variable with no value yet: creates the matrix.
    fn first_write(
        &mut self,
        matrix: &str,
        indices: &[VariableType],
        value: &VariableType,
    ) -> Result<VariableType, InferError> {
        let VariableType::Scalar(v) = value else {
            return Err(self.mismatch(format!(
                "`{}` is created by an indexed assignment of a {}; only scalars are supported",
                display_name(matrix),
                value
            )));
        };
        let shape = match indices {
            [single] => match single.constant().and_then(|c| c.as_i64()) {
                Some(n) if n > 0 => Shape::row(Dim::Known(n as u64)),
                Some(n) => {
                    self.warnings.insert((
                        self.line,
                        format!("index {} into `{}` is not positive", n, display_name(matrix)),
                    ));
                    Shape::row(Dim::Unknown)
                }
                None => Shape::row(Dim::Unknown),
            },
            _ => Shape::unknown(indices.len()),
        };
        Ok(VariableType::Matrix(MatrixType::dynamic(v.class, shape)))
    }

    /// Indexed write into an existing matrix. Grows the type unless every
    /// index is known to be in range.
    fn write_into(
        &mut self,
        matrix: &str,
        m: MatrixType,
        indices: &[VariableType],
        value: &VariableType,
    ) -> Result<VariableType, InferError> {
        let unchanged = VariableType::Matrix(m.clone());
        if indices.iter().any(VariableType::is_matrix) || !value.is_scalar() {
            return Ok(unchanged);
        }
        if self.body.assumes_indices_in_range() || in_range(&m.shape, indices) {
            return Ok(unchanged);
        }
        let count = indices.len();
        let shape = match m.shape.dims() {
            Some([Dim::Known(1), _]) if count == 1 => Shape::row(Dim::Unknown),
            Some([_, Dim::Known(1)]) if count == 1 => Shape::new(vec![Dim::Unknown, Dim::Known(1)]),
            Some(dims) if count <= dims.len() => m.shape.forget_extents(),
            _ => Shape::unknown(count),
        };
        if self.loop_depth > 0 {
            self.warnings.insert((
                self.line,
                format!("`{}` may grow on every loop iteration", display_name(matrix)),
            ));
        }
        Ok(VariableType::Matrix(MatrixType::dynamic(m.element, shape)))
    }
}

/// Whether constant `indices` all fall inside `shape`.
fn in_range(shape: &Shape, indices: &[VariableType]) -> bool {
    let count = indices.len();
    indices.iter().enumerate().all(|(k, index)| {
        let value = index.constant().and_then(|c| c.as_i64());
        let extent = query::end_extent(shape, k, count);
        matches!((value, extent), (Some(v), Some(e)) if v >= 1 && (v as u64) <= e)
    })
}
