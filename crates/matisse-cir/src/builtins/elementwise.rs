// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Element-wise operators with at least one matrix operand.

use matisse_types::{MatrixType, NumericClass, VariableType};

use super::scalar::{mismatch, BinaryKind, BINARY_OPERATIONS};
use super::{element, element_ref, instance_name, is_numeric, length, tensor};
use crate::context::ProviderContext;
use crate::ctype;
use crate::error::CirError;
use crate::instance::{FunctionInstance, InstanceKey, StandaloneBuilder};
use crate::provider::InstanceProvider;
use crate::table::ProviderTableBuilder;

pub struct ElementwiseBinary {
    name: &'static str,
    kind: BinaryKind,
}

impl ElementwiseBinary {
    /// `mtimes`, `mrdivide` and `mpower` are only element-wise against a scalar.
    fn needs_scalar_operand(&self) -> bool {
        self.name.starts_with('m') && self.name != "minus"
    }

    fn output(&self, ctx: &ProviderContext) -> Option<MatrixType> {
        let [a, b] = ctx.args() else {
            return None;
        };
        if !is_numeric(a) || !is_numeric(b) || !(a.is_matrix() || b.is_matrix()) {
            return None;
        }
        if self.needs_scalar_operand() && !(a.is_scalar() || b.is_scalar()) {
            return None;
        }
        if self.name == "mpower" {
            return None;
        }
        let class = self.kind.result_class(a.element_class()?, b.element_class()?)?;
        match (a, b) {
            (VariableType::Matrix(m), VariableType::Scalar(_))
            | (VariableType::Scalar(_), VariableType::Matrix(m)) => Some(m.with_element(class)),
            (VariableType::Matrix(x), VariableType::Matrix(y)) => {
                if x.shape.is_fully_defined() && y.shape.is_fully_defined() && x.shape != y.shape {
                    return None;
                }
                if x.is_static() && y.is_static() {
                    Some(x.with_element(class))
                } else {
                    Some(MatrixType::dynamic(class, x.shape.combine(&y.shape)))
                }
            }
            _ => None,
        }
    }
}

impl InstanceProvider for ElementwiseBinary {
    fn describe(&self) -> &str {
        self.name
    }

    fn accepts(&self, ctx: &ProviderContext) -> bool {
        ctx.nargout() <= 1 && self.output(ctx).is_some()
    }

    fn output_types(&self, ctx: &ProviderContext) -> Result<Vec<VariableType>, CirError> {
        let out = self.output(ctx).ok_or_else(|| mismatch(self.name, ctx))?;
        require_dynamic_allowed(&out, self.name, ctx)?;
        Ok(vec![VariableType::Matrix(out)])
    }

    fn build(&self, key: &InstanceKey, _ctx: &ProviderContext) -> Result<FunctionInstance, CirError> {
        let sig = &key.signature;
        let (a, b) = (&sig.inputs[0], &sig.inputs[1]);
        let value = |i: &str| {
            let (x, y) = (element(a, "in1", i), element(b, "in2", i));
            match self.kind.c_operator() {
                Some((op, _)) => format!("{} {} {}", x, op, y),
                None => format!("pow({}, {})", x, y),
            }
        };
        let mut builder = FunctionInstance::standalone(key.clone(), instance_name(self.name, sig));
        if self.kind == BinaryKind::Pow {
            builder = builder.include("math.h");
        }
        if let (VariableType::Matrix(x), VariableType::Matrix(y)) = (a, b) {
            if !(x.is_static() && y.is_static()) {
                builder = builder
                    .line(format!(
                        "if ({l} != {r}) {{ {f}({l}, {r}); }}",
                        l = length(a, "in1"),
                        r = length(b, "in2"),
                        f = tensor::SHAPE_ERROR
                    ))
                    .depends_on(tensor::shape_error());
            }
        }
        Ok(fill_output(builder, &sig.outputs[0], [a, b], value).build())
    }
}

/// `uminus`, `not` and friends over a matrix.
pub struct ElementwiseUnary {
    name: &'static str,
}

impl InstanceProvider for ElementwiseUnary {
    fn describe(&self) -> &str {
        self.name
    }

    fn accepts(&self, ctx: &ProviderContext) -> bool {
        matches!(ctx.args(), [VariableType::Matrix(_)]) && ctx.nargout() <= 1
    }

    fn output_types(&self, ctx: &ProviderContext) -> Result<Vec<VariableType>, CirError> {
        let m = ctx
            .arg(0)
            .and_then(|t| t.as_matrix())
            .ok_or_else(|| mismatch(self.name, ctx))?;
        let out = match self.name {
            "not" => m.with_element(NumericClass::Logical),
            "uminus" if matches!(m.element, NumericClass::Logical | NumericClass::Char) => {
                m.with_element(NumericClass::Double)
            }
            _ => m.clone(),
        };
        Ok(vec![VariableType::Matrix(out)])
    }

    fn build(&self, key: &InstanceKey, _ctx: &ProviderContext) -> Result<FunctionInstance, CirError> {
        let sig = &key.signature;
        let input = &sig.inputs[0];
        let op = match self.name {
            "not" => "!",
            "uminus" => "-",
            _ => "",
        };
        let builder = FunctionInstance::standalone(key.clone(), instance_name(self.name, sig));
        Ok(fill_output(builder, &sig.outputs[0], [input], |i| {
            format!("{}{}", op, element(input, "in1", i))
        })
        .build())
    }
}

/// Allocates `out1` when dynamic (shaped like the first dynamic operand)
/// and fills it element by element with `value(i)`.
pub(crate) fn fill_output<'a, const N: usize>(
    mut builder: StandaloneBuilder,
    out: &VariableType,
    operands: [&'a VariableType; N],
    value: impl Fn(&str) -> String,
) -> StandaloneBuilder {
    let Some(m) = out.as_matrix() else {
        return builder.line(format!("return {};", value("0")));
    };
    let bound = match ctype::static_length(m) {
        Some(n) => n.to_string(),
        None => {
            let class = m.element;
            let source = operands
                .iter()
                .position(|t| matches!(t, VariableType::Matrix(x) if !x.is_static()));
            builder = match source {
                Some(i) => builder.line(format!(
                    "{}(in{n}->ndims, in{n}->shape, out1);",
                    tensor::new_tensor_name(class),
                    n = i + 1
                )),
                None => {
                    let dims = static_dims(operands.iter().copied());
                    builder
                        .line(format!("int shape[{}] = {{{}}};", dims.len(), dims.join(", ")))
                        .line(format!("{}({}, shape, out1);", tensor::new_tensor_name(class), dims.len()))
                }
            };
            builder = builder.depends_on(tensor::new_tensor(class));
            "(*out1)->length".to_string()
        }
    };
    builder
        .line(format!("for (int i = 0; i < {}; ++i) {{", bound))
        .line(format!("{} = {};", element_ref(out, "out1", "i"), value("i")))
        .line("}")
}

fn static_dims<'a>(operands: impl Iterator<Item = &'a VariableType>) -> Vec<String> {
    operands
        .filter_map(|t| t.as_matrix())
        .find_map(|m| m.shape.known_dims())
        .unwrap_or_else(|| vec![1, 1])
        .iter()
        .map(|d| d.to_string())
        .collect()
}

pub(crate) fn require_dynamic_allowed(
    out: &MatrixType,
    operation: &str,
    ctx: &ProviderContext,
) -> Result<(), CirError> {
    if !out.is_static() && !ctx.settings().allow_dynamic_matrices {
        return Err(CirError::DynamicDisabled {
            operation: operation.to_string(),
            line: ctx.line(),
        });
    }
    Ok(())
}

pub fn providers() -> ProviderTableBuilder {
    let mut builder = ProviderTableBuilder::new();
    for (name, kind) in BINARY_OPERATIONS {
        builder = builder.add(name, ElementwiseBinary { name, kind });
    }
    for name in ["uminus", "uplus", "not"] {
        builder = builder.add(name, ElementwiseUnary { name });
    }
    builder
}
