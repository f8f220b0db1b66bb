// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! `colon` ranges and `horzcat`/`vertcat` of scalars.

use matisse_types::{combine_scalars, Constant, Dim, MatrixType, ScalarType, Shape, VariableType};

use super::elementwise::require_dynamic_allowed;
use super::scalar::mismatch;
use super::{arithmetic_class, element_ref, instance_name, tensor};
use crate::context::ProviderContext;
use crate::ctype;
use crate::error::CirError;
use crate::instance::{FunctionInstance, InstanceKey};
use crate::provider::InstanceProvider;
use crate::table::ProviderTableBuilder;

/// Number of elements of `start:step:end`.
pub fn range_length(start: f64, step: f64, end: f64) -> u64 {
    if step == 0.0 || (step > 0.0 && start > end) || (step < 0.0 && start < end) {
        return 0;
    }
    ((end - start) / step + 1e-10).floor() as u64 + 1
}

/// `colon(start, end)` and `colon(start, step, end)`.
pub struct Colon;

impl Colon {
    fn operands(ctx: &ProviderContext) -> Option<Vec<ScalarType>> {
        let args = ctx.args();
        if !(2..=3).contains(&args.len()) {
            return None;
        }
        args.iter().map(|a| a.as_scalar().copied()).collect()
    }
}

impl InstanceProvider for Colon {
    fn describe(&self) -> &str {
        super::COLON
    }

    fn accepts(&self, ctx: &ProviderContext) -> bool {
        ctx.nargout() <= 1
            && Colon::operands(ctx).is_some_and(|ops| {
                ops.iter()
                    .try_fold(ops[0].class, |c, s| arithmetic_class(c, s.class))
                    .is_some()
            })
    }

    fn output_types(&self, ctx: &ProviderContext) -> Result<Vec<VariableType>, CirError> {
        let ops = Colon::operands(ctx).ok_or_else(|| mismatch(super::COLON, ctx))?;
        let class = ops
            .iter()
            .try_fold(ops[0].class, |c, s| arithmetic_class(c, s.class))
            .ok_or_else(|| mismatch(super::COLON, ctx))?;
        let values: Option<Vec<f64>> = ops.iter().map(|s| s.constant.map(Constant::as_f64)).collect();
        let length = values.map(|v| match v.as_slice() {
            [a, b] => range_length(*a, 1.0, *b),
            [a, s, b] => range_length(*a, *s, *b),
            _ => 0,
        });
        let out = match length {
            Some(n) => MatrixType::fixed(class, &[1, n]),
            None => MatrixType::dynamic(class, Shape::row(Dim::Unknown)),
        };
        require_dynamic_allowed(&out, super::COLON, ctx)?;
        Ok(vec![VariableType::Matrix(out)])
    }

    fn build(&self, key: &InstanceKey, _ctx: &ProviderContext) -> Result<FunctionInstance, CirError> {
        let sig = &key.signature;
        let out = &sig.outputs[0];
        let Some(m) = out.as_matrix() else {
            return Err(mismatch_key(key));
        };
        let (step, end) = if sig.inputs.len() == 3 { ("in2", "in3") } else { ("1", "in2") };
        let mut name = instance_name(super::COLON, sig);
        name.push('_');
        name.push_str(&ctype::mangle(out));
        let mut builder = FunctionInstance::standalone(key.clone(), name);
        let bound = match ctype::static_length(m) {
            Some(n) => n.to_string(),
            None => {
                builder = builder
                    .line(format!(
                        "int count = ({s} == 0 || ({s} > 0 && in1 > {e}) || ({s} < 0 && in1 < {e})) ? 0 : (int)(({e} - in1) / {s}) + 1;",
                        s = step,
                        e = end
                    ))
                    .line("int shape[2] = {1, count};")
                    .line(format!("{}(2, shape, out1);", tensor::new_tensor_name(m.element)))
                    .depends_on(tensor::new_tensor(m.element));
                "count".to_string()
            }
        };
        Ok(builder
            .line(format!("for (int i = 0; i < {}; ++i) {{", bound))
            .line(format!("{} = in1 + i * {};", element_ref(out, "out1", "i"), step))
            .line("}")
            .build())
    }
}

fn mismatch_key(key: &InstanceKey) -> CirError {
    CirError::BuildFailed {
        operation: key.operation.clone(),
        message: "unexpected signature".to_string(),
        line: 0,
    }
}

/// `[a, b, c]` and `[a; b; c]` where every element is a scalar.
pub struct ScalarConcat {
    name: &'static str,
    horizontal: bool,
}

impl ScalarConcat {
    fn element(ctx: &ProviderContext) -> Option<ScalarType> {
        let (first, rest) = ctx.args().split_first()?;
        let mut acc = first.as_scalar()?.without_constant();
        for arg in rest {
            acc = combine_scalars(&acc, &arg.as_scalar()?.without_constant())?;
        }
        Some(acc)
    }
}

impl InstanceProvider for ScalarConcat {
    fn describe(&self) -> &str {
        self.name
    }

    fn accepts(&self, ctx: &ProviderContext) -> bool {
        ctx.nargout() <= 1 && ScalarConcat::element(ctx).is_some()
    }

    fn output_types(&self, ctx: &ProviderContext) -> Result<Vec<VariableType>, CirError> {
        let element = ScalarConcat::element(ctx).ok_or_else(|| mismatch(self.name, ctx))?;
        let n = ctx.args().len() as u64;
        let dims = if self.horizontal { [1, n] } else { [n, 1] };
        Ok(vec![VariableType::Matrix(MatrixType::fixed(element.class, &dims))])
    }

    fn build(&self, key: &InstanceKey, _ctx: &ProviderContext) -> Result<FunctionInstance, CirError> {
        let sig = &key.signature;
        let lines: Vec<String> = (0..sig.inputs.len())
            .map(|i| format!("out1[{}] = in{};", i, i + 1))
            .collect();
        Ok(FunctionInstance::standalone(key.clone(), instance_name(self.name, sig))
            .lines(lines)
            .build())
    }
}

pub fn providers() -> ProviderTableBuilder {
    ProviderTableBuilder::new()
        .add(super::COLON, Colon)
        .add(
            "horzcat",
            ScalarConcat {
                name: "horzcat",
                horizontal: true,
            },
        )
        .add(
            "vertcat",
            ScalarConcat {
                name: "vertcat",
                horizontal: false,
            },
        )
}
