// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Elementary math functions from `<math.h>`.

use matisse_types::{NumericClass, ScalarType, VariableType};

use super::elementwise::fill_output;
use super::scalar::{folded_constant, mismatch, store};
use super::{element, instance_name};
use crate::context::ProviderContext;
use crate::error::CirError;
use crate::instance::{FunctionInstance, InlineForm, InstanceKey};
use crate::precedence::PrecedenceLevel;
use crate::provider::InstanceProvider;
use crate::table::ProviderTableBuilder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MathFn {
    Abs,
    Sqrt,
    Floor,
    Ceil,
    Round,
    Exp,
    Log,
    Sin,
    Cos,
}

impl MathFn {
    fn name(self) -> &'static str {
        match self {
            MathFn::Abs => "abs",
            MathFn::Sqrt => "sqrt",
            MathFn::Floor => "floor",
            MathFn::Ceil => "ceil",
            MathFn::Round => "round",
            MathFn::Exp => "exp",
            MathFn::Log => "log",
            MathFn::Sin => "sin",
            MathFn::Cos => "cos",
        }
    }

    /// Keeps integer classes unchanged.
    fn preserves_integers(self) -> bool {
        matches!(self, MathFn::Abs | MathFn::Floor | MathFn::Ceil | MathFn::Round)
    }

    fn eval(self, x: f64) -> f64 {
        match self {
            MathFn::Abs => x.abs(),
            MathFn::Sqrt => x.sqrt(),
            MathFn::Floor => x.floor(),
            MathFn::Ceil => x.ceil(),
            // MATLAB rounds halves away from zero, as does f64::round
            MathFn::Round => x.round(),
            MathFn::Exp => x.exp(),
            MathFn::Log => x.ln(),
            MathFn::Sin => x.sin(),
            MathFn::Cos => x.cos(),
        }
    }

    fn result_class(self, input: NumericClass, default_real: NumericClass) -> NumericClass {
        if input.is_floating() {
            input
        } else if input.is_integer() && self.preserves_integers() {
            input
        } else {
            default_real
        }
    }

    fn c_name(self, class: NumericClass) -> String {
        let base = if self == MathFn::Abs { "fabs" } else { self.name() };
        if class == NumericClass::Single {
            format!("{}f", base)
        } else {
            base.to_string()
        }
    }

    /// C code applying the function to `x` of class `input`, producing `out`.
    fn apply_code(self, x: &str, input: NumericClass, out: NumericClass) -> String {
        if input.is_integer() && out == input {
            return match self {
                MathFn::Abs => format!("({x} < 0 ? -{x} : {x})", x = x),
                _ => x.to_string(),
            };
        }
        format!("{}({})", self.c_name(out), x)
    }
}

pub struct MathProvider {
    function: MathFn,
}

impl InstanceProvider for MathProvider {
    fn describe(&self) -> &str {
        self.function.name()
    }

    fn accepts(&self, ctx: &ProviderContext) -> bool {
        matches!(ctx.args(), [VariableType::Scalar(_)] | [VariableType::Matrix(_)]) && ctx.nargout() <= 1
    }

    fn output_types(&self, ctx: &ProviderContext) -> Result<Vec<VariableType>, CirError> {
        let default_real = ctx.numerics().default_real;
        let out = match ctx.arg(0) {
            Some(VariableType::Scalar(s)) => {
                let class = self.function.result_class(s.class, default_real);
                let folded = s
                    .constant
                    .map(|c| self.function.eval(c.as_f64()))
                    .filter(|v| v.is_finite())
                    .and_then(|v| store(v, class));
                VariableType::Scalar(match folded {
                    Some(c) => ScalarType::constant(class, c),
                    None => ScalarType::new(class),
                })
            }
            Some(VariableType::Matrix(m)) => {
                VariableType::Matrix(m.with_element(self.function.result_class(m.element, default_real)))
            }
            _ => return Err(mismatch(self.function.name(), ctx)),
        };
        Ok(vec![out])
    }

    fn build(&self, key: &InstanceKey, _ctx: &ProviderContext) -> Result<FunctionInstance, CirError> {
        if let Some(inst) = folded_constant(key) {
            return Ok(inst);
        }
        let sig = &key.signature;
        let input = &sig.inputs[0];
        let (Some(from), Some(to)) = (input.element_class(), sig.outputs[0].element_class()) else {
            return Err(CirError::BuildFailed {
                operation: self.function.name().to_string(),
                message: format!("unsupported argument {}", input),
                line: 0,
            });
        };
        let f = self.function;
        if input.is_matrix() {
            let builder = FunctionInstance::standalone(key.clone(), instance_name(f.name(), sig))
                .include("math.h");
            return Ok(fill_output(builder, &sig.outputs[0], [input], |i| {
                f.apply_code(&element(input, "in1", i), from, to)
            })
            .build());
        }
        let inst = if from.is_integer() && from == to {
            match f {
                MathFn::Abs => FunctionInstance::inline(
                    key.clone(),
                    InlineForm::Template {
                        template: "($0 < 0 ? -$0 : $0)".to_string(),
                        level: PrecedenceLevel::Atom,
                    },
                ),
                _ => FunctionInstance::inline(key.clone(), InlineForm::Identity),
            }
        } else {
            FunctionInstance::inline(key.clone(), InlineForm::Call { c_name: f.c_name(to) })
                .with_include("math.h")
        };
        Ok(inst)
    }
}

pub fn providers() -> ProviderTableBuilder {
    [
        MathFn::Abs,
        MathFn::Sqrt,
        MathFn::Floor,
        MathFn::Ceil,
        MathFn::Round,
        MathFn::Exp,
        MathFn::Log,
        MathFn::Sin,
        MathFn::Cos,
    ]
    .into_iter()
    .fold(ProviderTableBuilder::new(), |b, function| {
        b.add(function.name(), MathProvider { function })
    })
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
    fn folds_constants() {
        let ctx = ProviderContext::detached()
            .with_args(vec![VariableType::real_constant(NumericClass::Double, 16.0)]);
        let call = registry().resolve("sqrt", &ctx).unwrap();
        assert_eq!(call.outputs()[0].constant(), Some(Constant::Real(4.0)));
    }

    #[test]
    fn log_of_zero_not_folded() {
        let ctx = ProviderContext::detached()
            .with_args(vec![VariableType::real_constant(NumericClass::Double, 0.0)]);
        let call = registry().resolve("log", &ctx).unwrap();
        assert_eq!(call.outputs()[0].constant(), None);
    }

    #[test]
    fn integer_sqrt_is_real() {
        let ctx = ProviderContext::detached().with_args(vec![VariableType::scalar(NumericClass::Int32)]);
        let call = registry().resolve("sqrt", &ctx).unwrap();
        assert_eq!(call.outputs()[0], VariableType::scalar(NumericClass::Double));
        let call = registry().resolve("floor", &ctx).unwrap();
        assert_eq!(call.outputs()[0], VariableType::scalar(NumericClass::Int32));
    }

    #[test]
    fn single_uses_float_variants() {
        let reg = registry();
        let ctx = ProviderContext::detached().with_args(vec![VariableType::scalar(NumericClass::Single)]);
        let inst = reg.instance("abs", &ctx).unwrap();
        assert_eq!(inst.call_expr(&[CExpr::atom("x")]).unwrap().code, "fabsf(x)");
    }

    #[test]
    fn matrix_math() {
        let reg = registry();
        let m = VariableType::Matrix(MatrixType::fixed(NumericClass::Double, &[1, 4]));
        let inst = reg.instance("exp", &ProviderContext::detached().with_args(vec![m])).unwrap();
        assert!(inst.implementation_code().unwrap().contains("out1[i] = exp(in1[i]);"));
    }
}
