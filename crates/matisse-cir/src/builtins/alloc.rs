// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! `zeros` and `ones`.
//!
//! Constant dimensions give a static matrix, anything else a dynamic one.
//! The element class comes from a trailing class-name argument, else from
//! the declared type of the assigned variable, else the default real class.

use matisse_types::{Constant, Dim, MatrixType, NumericClass, ScalarType, Shape, Storage, VariableType};

use super::elementwise::require_dynamic_allowed;
use super::scalar::{folded_constant, mismatch};
use super::{element_ref, instance_name, tensor};
use crate::context::ProviderContext;
use crate::ctype;
use crate::error::CirError;
use crate::instance::{FunctionInstance, InstanceKey};
use crate::provider::InstanceProvider;
use crate::table::ProviderTableBuilder;

pub struct Fill {
    name: &'static str,
    value: i64,
}

impl Fill {
    pub fn zeros() -> Self {
        Self {
            name: super::ZEROS,
            value: 0,
        }
    }

    pub fn ones() -> Self {
        Self {
            name: super::ONES,
            value: 1,
        }
    }

    /// Dimension arguments and the explicit class, if the call is well formed.
    fn parse<'a>(ctx: &'a ProviderContext) -> Option<(&'a [VariableType], Option<NumericClass>)> {
        let args = ctx.args();
        let (dims, class) = match args.split_last() {
            Some((VariableType::String(s), rest)) => (rest, Some(NumericClass::from_name(&s.value)?)),
            _ => (args, None),
        };
        dims.iter().all(VariableType::is_scalar).then_some((dims, class))
    }

    fn class(ctx: &ProviderContext, explicit: Option<NumericClass>) -> NumericClass {
        explicit
            .or_else(|| ctx.output_type().and_then(VariableType::element_class))
            .unwrap_or(ctx.numerics().default_real)
    }
}

fn extent(ty: &VariableType) -> Dim {
    match ty.constant().and_then(Constant::as_i64) {
        Some(n) => Dim::Known(n.max(0) as u64),
        None => Dim::Unknown,
    }
}

impl InstanceProvider for Fill {
    fn describe(&self) -> &str {
        self.name
    }

    fn accepts(&self, ctx: &ProviderContext) -> bool {
        ctx.nargout() <= 1 && Self::parse(ctx).is_some()
    }

    fn output_types(&self, ctx: &ProviderContext) -> Result<Vec<VariableType>, CirError> {
        let (dims, explicit) = Self::parse(ctx).ok_or_else(|| mismatch(self.name, ctx))?;
        let class = Self::class(ctx, explicit);
        if dims.is_empty() {
            return Ok(vec![VariableType::Scalar(ScalarType::constant(
                class,
                Constant::for_class(self.value as f64, class),
            ))]);
        }
        let extents: Vec<Dim> = if dims.len() == 1 {
            vec![extent(&dims[0]); 2]
        } else {
            dims.iter().map(extent).collect()
        };
        let wants_dynamic = matches!(
            ctx.output_type(),
            Some(VariableType::Matrix(MatrixType { storage: Storage::Dynamic, .. }))
        );
        let out = MatrixType::best(class, Shape::new(extents), !wants_dynamic);
        require_dynamic_allowed(&out, self.name, ctx)?;
        Ok(vec![VariableType::Matrix(out)])
    }

    fn build(&self, key: &InstanceKey, _ctx: &ProviderContext) -> Result<FunctionInstance, CirError> {
        if let Some(inst) = folded_constant(key) {
            return Ok(inst);
        }
        let sig = &key.signature;
        let out = &sig.outputs[0];
        let Some(m) = out.as_matrix() else {
            return Err(CirError::BuildFailed {
                operation: self.name.to_string(),
                message: format!("unexpected output {}", out),
                line: 0,
            });
        };
        let mut name = instance_name(self.name, sig);
        name.push('_');
        name.push_str(&ctype::mangle(out));
        let value = ctype::literal(Constant::Int(self.value), m.element);
        let mut builder = FunctionInstance::standalone(key.clone(), name);
        let bound = match ctype::static_length(m) {
            Some(n) => n.to_string(),
            None => {
                let dim_inputs: Vec<String> = sig
                    .inputs
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| t.is_scalar())
                    .map(|(i, _)| format!("(int)(in{n} > 0 ? in{n} : 0)", n = i + 1))
                    .collect();
                let dims = if dim_inputs.len() == 1 {
                    vec![dim_inputs[0].clone(); 2]
                } else {
                    dim_inputs
                };
                builder = builder
                    .line(format!("int shape[{}] = {{{}}};", dims.len(), dims.join(", ")))
                    .line(format!(
                        "{}({}, shape, out1);",
                        tensor::new_tensor_name(m.element),
                        dims.len()
                    ))
                    .depends_on(tensor::new_tensor(m.element));
                "(*out1)->length".to_string()
            }
        };
        Ok(builder
            .line(format!("for (int i = 0; i < {}; ++i) {{", bound))
            .line(format!("{} = {};", element_ref(out, "out1", "i"), value))
            .line("}")
            .build())
    }
}

pub fn providers() -> ProviderTableBuilder {
    ProviderTableBuilder::new()
        .add(super::ZEROS, Fill::zeros())
        .add(super::ONES, Fill::ones())
}
