// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Scalar operators: inline C expressions with constant folding.

use matisse_types::{Constant, NumericClass, ScalarType, VariableType};

use super::{arithmetic_class, scalar_class};
use crate::context::ProviderContext;
use crate::ctype;
use crate::error::CirError;
use crate::instance::{FunctionInstance, InlineForm, InstanceKey};
use crate::precedence::PrecedenceLevel;
use crate::provider::InstanceProvider;
use crate::table::ProviderTableBuilder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryKind {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
}

impl BinaryKind {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryKind::Eq | BinaryKind::Ne | BinaryKind::Lt | BinaryKind::Gt | BinaryKind::Le | BinaryKind::Ge
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryKind::And | BinaryKind::Or)
    }

    /// C operator and its precedence. `None` for `Pow`, which is a call.
    pub fn c_operator(self) -> Option<(&'static str, PrecedenceLevel)> {
        use PrecedenceLevel::*;
        Some(match self {
            BinaryKind::Add => ("+", Additive),
            BinaryKind::Sub => ("-", Additive),
            BinaryKind::Mul => ("*", Multiplicative),
            BinaryKind::Div => ("/", Multiplicative),
            BinaryKind::Eq => ("==", Equality),
            BinaryKind::Ne => ("!=", Equality),
            BinaryKind::Lt => ("<", Relational),
            BinaryKind::Gt => (">", Relational),
            BinaryKind::Le => ("<=", Relational),
            BinaryKind::Ge => (">=", Relational),
            BinaryKind::And => ("&&", LogicalAnd),
            BinaryKind::Or => ("||", LogicalOr),
            BinaryKind::Pow => return None,
        })
    }

    /// Result element class for operands of classes `a` and `b`.
    pub fn result_class(self, a: NumericClass, b: NumericClass) -> Option<NumericClass> {
        if self.is_comparison() || self.is_logical() {
            arithmetic_class(a, b).map(|_| NumericClass::Logical)
        } else {
            arithmetic_class(a, b)
        }
    }

    /// Folds two constants. `None` when the result is not representable.
    pub fn fold(self, a: f64, b: f64, class: NumericClass) -> Option<Constant> {
        let truth = |c: bool| Some(Constant::Int(c as i64));
        let value = match self {
            BinaryKind::Add => a + b,
            BinaryKind::Sub => a - b,
            BinaryKind::Mul => a * b,
            BinaryKind::Div => {
                if class.is_integer() && b == 0.0 {
                    return None;
                }
                a / b
            }
            BinaryKind::Pow => a.powf(b),
            BinaryKind::Eq => return truth(a == b),
            BinaryKind::Ne => return truth(a != b),
            BinaryKind::Lt => return truth(a < b),
            BinaryKind::Gt => return truth(a > b),
            BinaryKind::Le => return truth(a <= b),
            BinaryKind::Ge => return truth(a >= b),
            BinaryKind::And => return truth(a != 0.0 && b != 0.0),
            BinaryKind::Or => return truth(a != 0.0 || b != 0.0),
        };
        store(value, class)
    }
}

/// Rounds and saturates `value` as MATLAB stores it in `class`.
pub(crate) fn store(value: f64, class: NumericClass) -> Option<Constant> {
    if value.is_nan() && class.is_integer() {
        return Some(Constant::Int(0));
    }
    match class {
        NumericClass::Logical => Some(Constant::Int((value != 0.0) as i64)),
        NumericClass::Single => Some(Constant::Real(value as f32 as f64)),
        NumericClass::Double => Some(Constant::Real(value)),
        c => {
            let (lo, hi) = c.range();
            Some(Constant::for_class(value.round().clamp(lo, hi), c))
        }
    }
}

/// `plus`, `minus`, `times`, ... on two scalars.
pub struct ScalarBinary {
    name: &'static str,
    kind: BinaryKind,
}

impl ScalarBinary {
    pub fn new(name: &'static str, kind: BinaryKind) -> Self {
        Self { name, kind }
    }

    fn operands(ctx: &ProviderContext) -> Option<(ScalarType, ScalarType)> {
        match ctx.args() {
            [VariableType::Scalar(a), VariableType::Scalar(b)] => Some((*a, *b)),
            _ => None,
        }
    }
}

impl InstanceProvider for ScalarBinary {
    fn describe(&self) -> &str {
        self.name
    }

    fn accepts(&self, ctx: &ProviderContext) -> bool {
        match Self::operands(ctx) {
            Some((a, b)) => ctx.nargout() <= 1 && self.kind.result_class(a.class, b.class).is_some(),
            None => false,
        }
    }

    fn output_types(&self, ctx: &ProviderContext) -> Result<Vec<VariableType>, CirError> {
        let (a, b) = Self::operands(ctx).ok_or_else(|| mismatch(self.name, ctx))?;
        let class = self
            .kind
            .result_class(a.class, b.class)
            .ok_or_else(|| mismatch(self.name, ctx))?;
        let folded = match (a.constant, b.constant) {
            (Some(x), Some(y)) => self.kind.fold(x.as_f64(), y.as_f64(), class),
            _ => None,
        };
        let out = match folded {
            Some(c) => ScalarType::constant(class, c),
            None => ScalarType::new(class),
        };
        Ok(vec![VariableType::Scalar(out)])
    }

    fn build(&self, key: &InstanceKey, _ctx: &ProviderContext) -> Result<FunctionInstance, CirError> {
        if let Some(inst) = folded_constant(key) {
            return Ok(inst);
        }
        let out_class = output_class(key);
        Ok(match self.kind.c_operator() {
            Some((op, level)) => FunctionInstance::inline(
                key.clone(),
                InlineForm::Binary {
                    op: op.to_string(),
                    level,
                },
            ),
            None => {
                let c_name = if out_class == Some(NumericClass::Single) { "powf" } else { "pow" };
                FunctionInstance::inline(
                    key.clone(),
                    InlineForm::Call {
                        c_name: c_name.to_string(),
                    },
                )
                .with_include("math.h")
            }
        })
    }
}

/// `uminus`, `uplus`, `not` and scalar `transpose`.
pub struct ScalarUnary {
    name: &'static str,
}

impl InstanceProvider for ScalarUnary {
    fn describe(&self) -> &str {
        self.name
    }

    fn accepts(&self, ctx: &ProviderContext) -> bool {
        matches!(ctx.args(), [VariableType::Scalar(_)]) && ctx.nargout() <= 1
    }

    fn output_types(&self, ctx: &ProviderContext) -> Result<Vec<VariableType>, CirError> {
        let s = ctx
            .arg(0)
            .and_then(|t| t.as_scalar())
            .ok_or_else(|| mismatch(self.name, ctx))?;
        let out = match self.name {
            "not" => {
                let base = ScalarType::new(NumericClass::Logical);
                match s.constant {
                    Some(c) => base.with_constant(Constant::Int(!c.is_truthy() as i64)),
                    None => base,
                }
            }
            "uminus" => {
                let class = if matches!(s.class, NumericClass::Logical | NumericClass::Char) {
                    NumericClass::Double
                } else {
                    s.class
                };
                match s.constant.and_then(|c| store(-c.as_f64(), class)) {
                    Some(c) => ScalarType::constant(class, c),
                    None => ScalarType::new(class),
                }
            }
            _ => *s,
        };
        Ok(vec![VariableType::Scalar(out)])
    }

    fn build(&self, key: &InstanceKey, _ctx: &ProviderContext) -> Result<FunctionInstance, CirError> {
        if let Some(inst) = folded_constant(key) {
            return Ok(inst);
        }
        let form = match self.name {
            "not" => InlineForm::Prefix { op: "!".to_string() },
            "uminus" => InlineForm::Prefix { op: "-".to_string() },
            _ => InlineForm::Identity,
        };
        Ok(FunctionInstance::inline(key.clone(), form))
    }
}

/// Inline constant when the output type carries a folded value.
pub(crate) fn folded_constant(key: &InstanceKey) -> Option<FunctionInstance> {
    match key.signature.outputs.as_slice() {
        [VariableType::Scalar(ScalarType {
            class,
            constant: Some(c),
        })] => Some(FunctionInstance::inline(
            key.clone(),
            InlineForm::Constant {
                code: ctype::literal(*c, *class),
            },
        )),
        _ => None,
    }
}

fn output_class(key: &InstanceKey) -> Option<NumericClass> {
    key.signature.outputs.first().and_then(scalar_class)
}

pub(crate) fn mismatch(operation: &str, ctx: &ProviderContext) -> CirError {
    CirError::NoProviderAccepts {
        operation: operation.to_string(),
        args: ctx.args().to_vec(),
        line: ctx.line(),
    }
}

/// Operation names paired with their kind, shared with the matrix providers.
pub const BINARY_OPERATIONS: [(&str, BinaryKind); 16] = [
    ("plus", BinaryKind::Add),
    ("minus", BinaryKind::Sub),
    ("times", BinaryKind::Mul),
    ("mtimes", BinaryKind::Mul),
    ("rdivide", BinaryKind::Div),
    ("mrdivide", BinaryKind::Div),
    ("power", BinaryKind::Pow),
    ("mpower", BinaryKind::Pow),
    ("eq", BinaryKind::Eq),
    ("ne", BinaryKind::Ne),
    ("lt", BinaryKind::Lt),
    ("gt", BinaryKind::Gt),
    ("le", BinaryKind::Le),
    ("ge", BinaryKind::Ge),
    ("and", BinaryKind::And),
    ("or", BinaryKind::Or),
];

pub fn providers() -> ProviderTableBuilder {
    let mut builder = ProviderTableBuilder::new();
    for (name, kind) in BINARY_OPERATIONS {
        builder = builder.add(name, ScalarBinary::new(name, kind));
    }
    for name in ["uminus", "uplus", "not", "transpose", "ctranspose"] {
        builder = builder.add(name, ScalarUnary { name });
    }
    builder
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::precedence::CExpr;
    use crate::registry::InstanceRegistry;

    fn int32(v: Option<i64>) -> VariableType {
        match v {
            Some(v) => VariableType::int_constant(NumericClass::Int32, v),
            None => VariableType::scalar(NumericClass::Int32),
        }
    }

    fn registry() -> InstanceRegistry {
        InstanceRegistry::new(providers().build())
    }

    #[test]
    fn folds_constants() {
        let reg = registry();
        let ctx = ProviderContext::detached().with_args(vec![int32(Some(2)), int32(Some(3))]);
        let call = reg.resolve("times", &ctx).unwrap();
        assert_eq!(call.outputs(), &[int32(Some(6))]);
        let inst = reg.build(&call, &ctx).unwrap();
        assert_eq!(inst.call_expr(&[]).unwrap().code, "6");
    }

    #[test]
    fn integer_division_rounds() {
        assert_eq!(BinaryKind::Div.fold(7.0, 2.0, NumericClass::Int32), Some(Constant::Int(4)));
        assert_eq!(BinaryKind::Div.fold(7.0, 0.0, NumericClass::Int32), None);
        assert_eq!(BinaryKind::Add.fold(200.0, 100.0, NumericClass::UInt8), Some(Constant::Int(255)));
    }

    #[test]
    fn integer_with_double_keeps_integer() {
        let reg = registry();
        let ctx = ProviderContext::detached()
            .with_args(vec![int32(None), VariableType::real_constant(NumericClass::Double, 1.0)]);
        let call = reg.resolve("minus", &ctx).unwrap();
        assert_eq!(call.outputs(), &[int32(None)]);
        let inst = reg.build(&call, &ctx).unwrap();
        let expr = inst
            .call_expr(&[CExpr::atom("a"), CExpr::atom("1.0")])
            .unwrap();
        assert_eq!(expr.code, "a - 1.0");
    }

    #[test]
    fn mixed_integer_classes_rejected() {
        let ctx = ProviderContext::detached()
            .with_args(vec![int32(None), VariableType::scalar(NumericClass::Int8)]);
        assert!(matches!(
            registry().resolve("plus", &ctx),
            Err(CirError::NoProviderAccepts { .. })
        ));
    }

    #[test]
    fn comparisons_are_logical() {
        let ctx = ProviderContext::detached().with_args(vec![int32(None), int32(None)]);
        let call = registry().resolve("lt", &ctx).unwrap();
        assert_eq!(call.outputs(), &[VariableType::scalar(NumericClass::Logical)]);
    }

    #[test]
    fn power_is_a_math_call() {
        let reg = registry();
        let d = VariableType::scalar(NumericClass::Double);
        let ctx = ProviderContext::detached().with_args(vec![d.clone(), d]);
        let inst = reg.instance("power", &ctx).unwrap();
        assert!(inst.includes().contains("math.h"));
        assert_eq!(
            inst.call_expr(&[CExpr::atom("x"), CExpr::atom("y")]).unwrap().code,
            "pow(x, y)"
        );
    }

    #[test]
    fn unary_operators() {
        let reg = registry();
        let ctx = ProviderContext::detached().with_args(vec![int32(Some(4))]);
        let call = reg.resolve("uminus", &ctx).unwrap();
        assert_eq!(call.outputs(), &[int32(Some(-4))]);
        let ctx = ProviderContext::detached().with_args(vec![int32(None)]);
        let inst = reg.instance("not", &ctx).unwrap();
        assert_eq!(
            inst.call_expr(&[CExpr::new("a + b", PrecedenceLevel::Additive)]).unwrap().code,
            "!(a + b)"
        );
    }
}
