// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Shape queries: `numel`, `size`, `length`, `ndims` and `end`.
//!
//! Known extents fold into index-class constants; otherwise the value is
//! read from the tensor at run time.

use matisse_types::{Constant, MatrixType, NumericClass, ScalarType, Shape, VariableType};

use super::scalar::{folded_constant, mismatch};
use super::{extent, instance_name, length};
use crate::context::ProviderContext;
use crate::ctype::scalar_c_type;
use crate::error::CirError;
use crate::instance::{FunctionInstance, InlineForm, InstanceKey};
use crate::precedence::PrecedenceLevel;
use crate::provider::InstanceProvider;
use crate::table::ProviderTableBuilder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Query {
    Numel,
    Size,
    Length,
    Ndims,
    End,
}

pub struct ShapeQuery {
    name: &'static str,
    query: Query,
}

fn shape_of(ty: &VariableType) -> Option<Shape> {
    match ty {
        VariableType::Scalar(_) => Some(Shape::scalar()),
        VariableType::Matrix(m) => Some(m.shape.clone()),
        _ => None,
    }
}

fn int_arg(ty: Option<&VariableType>) -> Option<i64> {
    ty.and_then(VariableType::constant).and_then(Constant::as_i64)
}

/// Value of `end` at position `index` of `count` indices.
pub fn end_extent(shape: &Shape, index: usize, count: usize) -> Option<u64> {
    if count == 1 {
        return shape.numel();
    }
    let dims = shape.dims()?;
    if index + 1 < count {
        return shape.dim(index).known();
    }
    dims.iter()
        .skip(index)
        .try_fold(1u64, |acc, d| d.known().map(|n| acc * n))
}

impl ShapeQuery {
    fn known_value(&self, ctx: &ProviderContext) -> Option<u64> {
        let shape = shape_of(ctx.arg(0)?)?;
        match self.query {
            Query::Numel => shape.numel(),
            Query::Ndims => shape.ndims().map(|n| n as u64),
            Query::Length => {
                let dims = shape.known_dims()?;
                if dims.contains(&0) {
                    Some(0)
                } else {
                    dims.into_iter().max()
                }
            }
            Query::Size => {
                let dim = int_arg(ctx.arg(1))?;
                if dim < 1 {
                    return None;
                }
                shape.dim(dim as usize - 1).known()
            }
            Query::End => {
                let index = int_arg(ctx.arg(1))? as usize;
                let count = int_arg(ctx.arg(2))? as usize;
                end_extent(&shape, index, count)
            }
        }
    }

    fn arity_ok(&self, ctx: &ProviderContext) -> bool {
        let args = ctx.args();
        let Some(first) = args.first() else {
            return false;
        };
        if shape_of(first).is_none() {
            return false;
        }
        let rest_scalar = args[1..].iter().all(VariableType::is_scalar);
        match self.query {
            Query::Numel | Query::Ndims | Query::Length => args.len() == 1 && ctx.nargout() <= 1,
            Query::Size => {
                rest_scalar
                    && match args.len() {
                        1 => true,
                        2 => ctx.nargout() <= 1,
                        _ => false,
                    }
            }
            // end(matrix, index, count) with constant position arguments
            Query::End => {
                args.len() == 3 && int_arg(args.get(1)).is_some() && int_arg(args.get(2)).is_some()
            }
        }
    }
}

impl InstanceProvider for ShapeQuery {
    fn describe(&self) -> &str {
        self.name
    }

    fn accepts(&self, ctx: &ProviderContext) -> bool {
        self.arity_ok(ctx)
    }

    fn keeps_input_constants(&self) -> bool {
        self.query == Query::End
    }

    fn output_types(&self, ctx: &ProviderContext) -> Result<Vec<VariableType>, CirError> {
        let index = ctx.numerics().index;
        let shape = ctx.arg(0).and_then(shape_of).ok_or_else(|| mismatch(self.name, ctx))?;
        if self.query == Query::Size && ctx.args().len() == 1 {
            if ctx.nargout() > 1 {
                let outs = (0..ctx.nargout())
                    .map(|d| {
                        let known = if d + 1 == ctx.nargout() {
                            end_extent(&shape, d, ctx.nargout())
                        } else {
                            shape.dim(d).known()
                        };
                        index_scalar(index, known)
                    })
                    .collect();
                return Ok(outs);
            }
            // an undefined shape still has at least two dimensions
            let ndims = shape.ndims().unwrap_or(2) as u64;
            return Ok(vec![VariableType::Matrix(MatrixType::fixed(index, &[1, ndims]))]);
        }
        Ok(vec![index_scalar(index, self.known_value(ctx))])
    }

    fn build(&self, key: &InstanceKey, _ctx: &ProviderContext) -> Result<FunctionInstance, CirError> {
        if let Some(inst) = folded_constant(key) {
            return Ok(inst);
        }
        let sig = &key.signature;
        let input = &sig.inputs[0];
        let idx_type = sig
            .outputs
            .first()
            .and_then(VariableType::element_class)
            .map(scalar_c_type)
            .unwrap_or("int32_t");
        let template = |t: String| {
            FunctionInstance::inline(
                key.clone(),
                InlineForm::Template {
                    template: format!("({}){}", idx_type, t),
                    level: PrecedenceLevel::Prefix,
                },
            )
        };
        match self.query {
            Query::Numel => Ok(template(length(input, "$0"))),
            Query::Ndims => Ok(template("$0->ndims".to_string())),
            Query::Size if sig.inputs.len() == 2 => Ok(FunctionInstance::standalone(
                key.clone(),
                instance_name(self.name, sig),
            )
            .lines(dim_lookup(input, "in2 - 1"))
            .build()),
            Query::Size if sig.outputs.len() > 1 => {
                let mut builder = FunctionInstance::standalone(key.clone(), instance_name(self.name, sig));
                let n = sig.outputs.len();
                for d in 0..n {
                    let value = if d + 1 == n {
                        trailing_product(input, d)
                    } else {
                        extent(input, "in1", d)
                    };
                    builder = builder.line(format!("*out{} = {};", d + 1, value));
                }
                Ok(builder.build())
            }
            Query::Size => {
                let mut builder = FunctionInstance::standalone(key.clone(), instance_name(self.name, sig));
                let n = sig.outputs[0]
                    .shape()
                    .and_then(|s| s.dim(1).known())
                    .unwrap_or(2) as usize;
                for d in 0..n {
                    builder = builder.line(format!("out1[{}] = {};", d, extent(input, "in1", d)));
                }
                Ok(builder.build())
            }
            Query::Length => Ok(FunctionInstance::standalone(key.clone(), instance_name(self.name, sig))
                .lines([
                    "int best = 0;".to_string(),
                    "for (int d = 0; d < in1->ndims; ++d) {".to_string(),
                    "if (in1->shape[d] == 0) {".to_string(),
                    "return 0;".to_string(),
                    "}".to_string(),
                    "if (in1->shape[d] > best) {".to_string(),
                    "best = in1->shape[d];".to_string(),
                    "}".to_string(),
                    "}".to_string(),
                    "return best;".to_string(),
                ])
                .build()),
            Query::End => {
                let index = int_arg(sig.inputs.get(1)).unwrap_or(0) as usize;
                let count = int_arg(sig.inputs.get(2)).unwrap_or(1) as usize;
                if count == 1 {
                    return Ok(template(length(input, "$0")));
                }
                if index + 1 < count {
                    return Ok(template(extent(input, "$0", index)));
                }
                Ok(FunctionInstance::standalone(key.clone(), format!("{}_{}", instance_name(self.name, sig), index))
                    .line(format!("return {};", trailing_product(input, index)))
                    .build())
            }
        }
    }
}

fn index_scalar(index: NumericClass, known: Option<u64>) -> VariableType {
    match known {
        Some(n) => VariableType::Scalar(ScalarType::constant(index, Constant::Int(n as i64))),
        None => VariableType::scalar(index),
    }
}

fn dim_lookup(input: &VariableType, dim: &str) -> Vec<String> {
    match input {
        VariableType::Matrix(m) if !m.is_static() => vec![format!(
            "return {d} < in1->ndims ? in1->shape[{d}] : 1;",
            d = dim
        )],
        _ => {
            let dims = input
                .shape()
                .and_then(|s| s.known_dims())
                .unwrap_or_else(|| vec![1, 1]);
            let list: Vec<String> = dims.iter().map(|d| d.to_string()).collect();
            vec![
                format!("static const int dims[{}] = {{{}}};", dims.len(), list.join(", ")),
                format!("return {d} < {n} ? dims[{d}] : 1;", d = dim, n = dims.len()),
            ]
        }
    }
}

/// Product of extents from `from` onwards.
fn trailing_product(input: &VariableType, from: usize) -> String {
    match input {
        VariableType::Matrix(m) if !m.is_static() => format!(
            "({f} < in1->ndims ? in1->length / {prefix} : 1)",
            f = from,
            prefix = prefix_product(from)
        ),
        _ => {
            let product: u64 = input
                .shape()
                .and_then(|s| s.known_dims())
                .map(|d| d.iter().skip(from).product())
                .unwrap_or(1);
            product.to_string()
        }
    }
}

fn prefix_product(to: usize) -> String {
    if to == 0 {
        return "1".to_string();
    }
    let parts: Vec<String> = (0..to).map(|d| format!("in1->shape[{}]", d)).collect();
    format!("({})", parts.join(" * "))
}

pub fn providers() -> ProviderTableBuilder {
    [
        ("numel", Query::Numel),
        ("size", Query::Size),
        ("length", Query::Length),
        ("ndims", Query::Ndims),
        (super::END, Query::End),
    ]
    .into_iter()
    .fold(ProviderTableBuilder::new(), |b, (name, query)| {
        b.add(name, ShapeQuery { name, query })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::precedence::CExpr;
    use crate::registry::InstanceRegistry;
    use matisse_types::Dim;

    fn registry() -> InstanceRegistry {
        InstanceRegistry::new(providers().build())
    }

    fn fixed(dims: &[u64]) -> VariableType {
        VariableType::Matrix(MatrixType::fixed(NumericClass::Double, dims))
    }

    fn dynamic() -> VariableType {
        VariableType::Matrix(MatrixType::dynamic(NumericClass::Double, Shape::unknown(2)))
    }

    fn int(v: i64) -> VariableType {
        VariableType::int_constant(NumericClass::Int32, v)
    }

    #[test]
    fn end_positions() {
        let shape = Shape::fixed(&[2, 3, 4]);
        assert_eq!(end_extent(&shape, 0, 1), Some(24));
        assert_eq!(end_extent(&shape, 0, 2), Some(2));
        assert_eq!(end_extent(&shape, 1, 2), Some(12));
        assert_eq!(end_extent(&Shape::new(vec![Dim::Known(1), Dim::Unknown]), 0, 2), Some(1));
    }

    #[test]
    fn static_queries_fold() {
        let reg = registry();
        let ctx = ProviderContext::detached().with_args(vec![fixed(&[1, 3])]);
        assert_eq!(reg.resolve("numel", &ctx).unwrap().outputs(), &[int(3)]);
        assert_eq!(reg.resolve("length", &ctx).unwrap().outputs(), &[int(3)]);
        assert_eq!(reg.resolve("ndims", &ctx).unwrap().outputs(), &[int(2)]);
        let ctx = ProviderContext::detached().with_args(vec![fixed(&[1, 3]), int(2)]);
        assert_eq!(reg.resolve("size", &ctx).unwrap().outputs(), &[int(3)]);
        let ctx = ProviderContext::detached().with_args(vec![fixed(&[1, 3]), int(0), int(1)]);
        let inst = reg.instance("end", &ctx).unwrap();
        assert_eq!(inst.call_expr(&[]).unwrap().code, "3");
    }

    #[test]
    fn dynamic_numel_reads_tensor() {
        let reg = registry();
        let ctx = ProviderContext::detached().with_args(vec![dynamic()]);
        let inst = reg.instance("numel", &ctx).unwrap();
        assert_eq!(
            inst.call_expr(&[CExpr::atom("A")]).unwrap().code,
            "(int32_t)A->length"
        );
    }

    #[test]
    fn size_row_vector() {
        let reg = registry();
        let ctx = ProviderContext::detached().with_args(vec![dynamic()]);
        let inst = reg.instance("size", &ctx).unwrap();
        assert_eq!(
            inst.function_type().outputs[0],
            VariableType::Matrix(MatrixType::fixed(NumericClass::Int32, &[1, 2]))
        );
        assert!(inst
            .implementation_code()
            .unwrap()
            .contains("out1[1] = (1 < in1->ndims ? in1->shape[1] : 1);"));
    }

    #[test]
    fn size_multiple_outputs() {
        let ctx = ProviderContext::detached()
            .with_args(vec![fixed(&[2, 3, 4])])
            .with_nargout(2);
        let call = registry().resolve("size", &ctx).unwrap();
        assert_eq!(call.outputs(), &[int(2), int(12)]);
    }

    #[test]
    fn end_of_dynamic_last_index() {
        let reg = registry();
        let ctx = ProviderContext::detached().with_args(vec![dynamic(), int(1), int(2)]);
        let inst = reg.instance("end", &ctx).unwrap();
        assert!(inst
            .implementation_code()
            .unwrap()
            .contains("return (1 < in1->ndims ? in1->length / (in1->shape[0]) : 1);"));
    }
}
