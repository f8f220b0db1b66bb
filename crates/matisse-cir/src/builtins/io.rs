// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Console output.

use matisse_types::{NumericClass, VariableType};

use super::scalar::mismatch;
use super::{element, extent, instance_name, length};
use crate::context::ProviderContext;
use crate::error::CirError;
use crate::instance::{FunctionInstance, InlineForm, InstanceKey};
use crate::precedence::PrecedenceLevel;
use crate::provider::InstanceProvider;
use crate::table::ProviderTableBuilder;

/// printf conversion and the argument cast it expects.
fn format_for(class: NumericClass) -> (&'static str, &'static str) {
    if class.is_floating() {
        ("%g", "(double)")
    } else if class == NumericClass::Logical || class == NumericClass::Char {
        ("%d", "(int)")
    } else {
        ("%lld", "(long long)")
    }
}

/// `disp(x)`: one line per scalar or string, one line per row of a matrix.
pub struct Disp;

impl InstanceProvider for Disp {
    fn describe(&self) -> &str {
        "disp"
    }

    fn accepts(&self, ctx: &ProviderContext) -> bool {
        matches!(
            ctx.args(),
            [VariableType::Scalar(_) | VariableType::Matrix(_) | VariableType::String(_)]
        ) && ctx.nargout() <= 1
    }

    fn output_types(&self, ctx: &ProviderContext) -> Result<Vec<VariableType>, CirError> {
        if ctx.args().len() != 1 {
            return Err(mismatch("disp", ctx));
        }
        Ok(Vec::new())
    }

    fn has_side_effects(&self) -> bool {
        true
    }

    fn build(&self, key: &InstanceKey, _ctx: &ProviderContext) -> Result<FunctionInstance, CirError> {
        let sig = &key.signature;
        let x = &sig.inputs[0];
        let inline = |template: String| {
            FunctionInstance::inline(
                key.clone(),
                InlineForm::Template {
                    template,
                    level: PrecedenceLevel::Postfix,
                },
            )
            .with_include("stdio.h")
        };
        let class = match x {
            VariableType::String(_) => return Ok(inline("puts($0)".to_string())),
            VariableType::Scalar(s) => {
                let (fmt, cast) = format_for(s.class);
                return Ok(inline(format!("printf(\"{}\\n\", {}$0)", fmt, cast)));
            }
            VariableType::Matrix(m) => m.element,
            VariableType::Void => return Err(CirError::BuildFailed {
                operation: "disp".to_string(),
                message: "cannot display a value of type void".to_string(),
                line: 0,
            }),
        };
        let (fmt, cast) = format_for(class);
        let rows = extent(x, "in1", 0);
        Ok(FunctionInstance::standalone(key.clone(), instance_name("disp", sig))
            .line(format!("int rows = {};", rows))
            .line(format!("int cols = rows > 0 ? {} / rows : 0;", length(x, "in1")))
            .line("for (int r = 0; r < rows; ++r) {")
            .line("for (int c = 0; c < cols; ++c) {")
            .line(format!(
                "printf(\"%s{}\", c > 0 ? \" \" : \"\", {}{});",
                fmt,
                cast,
                element(x, "in1", "r + c * rows")
            ))
            .line("}")
            .line("printf(\"\\n\");")
            .line("}")
            .include("stdio.h")
            .build())
    }
}

pub fn providers() -> ProviderTableBuilder {
    ProviderTableBuilder::new().add("disp", Disp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::precedence::CExpr;
    use crate::registry::InstanceRegistry;
    use matisse_types::MatrixType;

    fn registry() -> InstanceRegistry {
        InstanceRegistry::new(providers().build())
    }

    #[test]
    fn scalar_disp_is_inline_printf() {
        let reg = registry();
        let ctx = ProviderContext::detached().with_args(vec![VariableType::scalar(NumericClass::Int32)]);
        let inst = reg.instance("disp", &ctx).unwrap();
        assert!(inst.function_type().side_effects);
        assert!(inst.function_type().outputs.is_empty());
        assert_eq!(
            inst.call_statement(&[CExpr::atom("x")], &[]),
            "printf(\"%lld\\n\", (long long)x);"
        );
        assert!(inst.includes().contains("stdio.h"));
    }

    #[test]
    fn matrix_disp_prints_rows() {
        let reg = registry();
        let m = VariableType::Matrix(MatrixType::fixed(NumericClass::Double, &[2, 2]));
        let inst = reg
            .instance("disp", &ProviderContext::detached().with_args(vec![m]))
            .unwrap();
        let code = inst.implementation_code().unwrap();
        assert!(code.contains("int rows = 2;"));
        assert!(code.contains("(double)in1[r + c * rows]"));
    }

    #[test]
    fn strings_use_puts() {
        let reg = registry();
        let ctx = ProviderContext::detached().with_args(vec![VariableType::string("hi")]);
        let inst = reg.instance("disp", &ctx).unwrap();
        assert_eq!(inst.call_statement(&[CExpr::atom("\"hi\"")], &[]), "puts(\"hi\");");
    }
}
