// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Numeric casts, registered under each class name (`int32(x)`, `double(x)`).

use matisse_types::{NumericClass, ScalarType, VariableType};

use super::elementwise::fill_output;
use super::scalar::{folded_constant, mismatch, store};
use super::{element, instance_name};
use crate::context::ProviderContext;
use crate::ctype::scalar_c_type;
use crate::error::CirError;
use crate::instance::{FunctionInstance, InlineForm, InstanceKey};
use crate::precedence::PrecedenceLevel;
use crate::provider::InstanceProvider;
use crate::table::ProviderTableBuilder;

pub struct Cast {
    class: NumericClass,
}

impl Cast {
    pub fn new(class: NumericClass) -> Self {
        Self { class }
    }
}

/// C expression converting `code` of class `from` to `to`.
pub(crate) fn convert_code(code: &str, from: NumericClass, to: NumericClass) -> String {
    if from == to {
        code.to_string()
    } else if to == NumericClass::Logical {
        format!("{} != 0", code)
    } else if to.is_integer() && from.is_floating() {
        format!("({}){}({})", scalar_c_type(to), round_fn(from), code)
    } else {
        format!("({}){}", scalar_c_type(to), code)
    }
}

fn round_fn(from: NumericClass) -> &'static str {
    if from == NumericClass::Single {
        "roundf"
    } else {
        "round"
    }
}

impl InstanceProvider for Cast {
    fn describe(&self) -> &str {
        self.class.matlab_name()
    }

    fn accepts(&self, ctx: &ProviderContext) -> bool {
        matches!(ctx.args(), [VariableType::Scalar(_)] | [VariableType::Matrix(_)]) && ctx.nargout() <= 1
    }

    fn output_types(&self, ctx: &ProviderContext) -> Result<Vec<VariableType>, CirError> {
        let out = match ctx.arg(0) {
            Some(VariableType::Scalar(s)) => {
                let base = ScalarType::new(self.class);
                VariableType::Scalar(match s.constant.and_then(|c| store(c.as_f64(), self.class)) {
                    Some(c) => base.with_constant(c),
                    None => base,
                })
            }
            Some(VariableType::Matrix(m)) => VariableType::Matrix(m.with_element(self.class)),
            _ => return Err(mismatch(self.class.matlab_name(), ctx)),
        };
        Ok(vec![out])
    }

    fn build(&self, key: &InstanceKey, _ctx: &ProviderContext) -> Result<FunctionInstance, CirError> {
        if let Some(inst) = folded_constant(key) {
            return Ok(inst);
        }
        let sig = &key.signature;
        let input = &sig.inputs[0];
        let Some(from) = input.element_class() else {
            return Err(CirError::BuildFailed {
                operation: self.class.matlab_name().to_string(),
                message: format!("cannot cast {}", input),
                line: 0,
            });
        };
        if let VariableType::Matrix(_) = input {
            let name = instance_name(self.class.matlab_name(), sig);
            let builder = FunctionInstance::standalone(key.clone(), name)
                .include("math.h");
            let to = self.class;
            return Ok(fill_output(builder, &sig.outputs[0], [input], |i| {
                convert_code(&element(input, "in1", i), from, to)
            })
            .build());
        }
        let to = self.class;
        let inst = if from == to {
            FunctionInstance::inline(key.clone(), InlineForm::Identity)
        } else if to == NumericClass::Logical {
            FunctionInstance::inline(
                key.clone(),
                InlineForm::Template {
                    template: "$0 != 0".to_string(),
                    level: PrecedenceLevel::Equality,
                },
            )
        } else if to.is_integer() && from.is_floating() {
            FunctionInstance::inline(
                key.clone(),
                InlineForm::Template {
                    template: format!("({}){}($0)", scalar_c_type(to), round_fn(from)),
                    level: PrecedenceLevel::Prefix,
                },
            )
            .with_include("math.h")
        } else {
            FunctionInstance::inline(
                key.clone(),
                InlineForm::Cast {
                    c_type: scalar_c_type(to).to_string(),
                },
            )
        };
        Ok(inst)
    }
}

pub fn providers() -> ProviderTableBuilder {
    let mut builder = ProviderTableBuilder::new();
    for class in NumericClass::all() {
        builder = builder.add(class.matlab_name(), Cast::new(*class));
    }
    builder
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::precedence::CExpr;
    use crate::registry::InstanceRegistry;
    use matisse_types::{Constant, MatrixType};

    fn registry() -> InstanceRegistry {
        InstanceRegistry::new(providers().build())
    }

    #[test]
    fn constant_cast_folds_with_rounding() {
        let ctx = ProviderContext::detached()
            .with_args(vec![VariableType::real_constant(NumericClass::Double, 2.6)]);
        let call = registry().resolve("int8", &ctx).unwrap();
        assert_eq!(
            call.outputs()[0].constant(),
            Some(Constant::Int(3))
        );
    }

    #[test]
    fn same_class_cast_is_identity() {
        let reg = registry();
        let ctx = ProviderContext::detached().with_args(vec![VariableType::scalar(NumericClass::Int32)]);
        let inst = reg.instance("int32", &ctx).unwrap();
        assert_eq!(inst.call_expr(&[CExpr::atom("x")]).unwrap().code, "x");
    }

    #[test]
    fn float_to_integer_rounds() {
        let reg = registry();
        let ctx = ProviderContext::detached().with_args(vec![VariableType::scalar(NumericClass::Double)]);
        let inst = reg.instance("int16", &ctx).unwrap();
        assert_eq!(
            inst.call_expr(&[CExpr::atom("x")]).unwrap().code,
            "(int16_t)round(x)"
        );
        assert!(inst.includes().contains("math.h"));
    }

    #[test]
    fn matrix_cast() {
        let reg = registry();
        let m = VariableType::Matrix(MatrixType::fixed(NumericClass::Int32, &[2, 2]));
        let ctx = ProviderContext::detached().with_args(vec![m]);
        let inst = reg.instance("double", &ctx).unwrap();
        assert_eq!(
            inst.function_type().outputs[0],
            VariableType::Matrix(MatrixType::fixed(NumericClass::Double, &[2, 2]))
        );
        assert!(inst.implementation_code().unwrap().contains("out1[i] = (double)in1[i];"));
    }
}
