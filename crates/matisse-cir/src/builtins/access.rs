// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Matrix element access.
//!
//! Indices are 1-based and column-major. A single index is linear; several
//! indices address one dimension each, the last one spanning all remaining
//! dimensions. The checked forms abort on out-of-range indices; the simple
//! forms are inline and trust their indices.

use matisse_types::{MatrixType, NumericClass, VariableType};

use super::cast::convert_code;
use super::elementwise::require_dynamic_allowed;
use super::scalar::mismatch;
use super::{element, element_ref, extent, instance_name, length, tensor};
use crate::context::ProviderContext;
use crate::ctype;
use crate::error::CirError;
use crate::instance::{FunctionInstance, InlineForm, InstanceKey, StandaloneBuilder};
use crate::precedence::PrecedenceLevel;
use crate::provider::InstanceProvider;
use crate::table::ProviderTableBuilder;

/// Whether `count` indices are a valid access into `m`.
pub fn dimensionality_matches(m: &MatrixType, count: usize) -> bool {
    match m.shape.ndims() {
        _ if count == 1 => true,
        Some(n) => count >= 2 && count <= n,
        None => count >= 2,
    }
}

/// Index value as a C integer expression.
fn index_code(ty: &VariableType, code: &str) -> String {
    match ty.element_class() {
        Some(c) if c.is_floating() => format!("(long long){}", code),
        _ => code.to_string(),
    }
}

/// Extents each index is checked against, for matrix `base` (a C expression).
fn index_extents(m: &VariableType, base: &str, count: usize) -> Vec<String> {
    if count == 1 {
        return vec![length(m, base)];
    }
    (0..count)
        .map(|d| {
            if d + 1 < count {
                extent(m, base, d)
            } else {
                trailing_extent(m, base, d)
            }
        })
        .collect()
}

fn trailing_extent(m: &VariableType, base: &str, from: usize) -> String {
    match m.as_matrix() {
        Some(x) if x.is_static() => x
            .shape
            .known_dims()
            .map(|d| d.iter().skip(from).product::<u64>().max(1))
            .unwrap_or(1)
            .to_string(),
        _ if from == 0 => length(m, base),
        _ => {
            let prefix: Vec<String> = (0..from).map(|d| extent(m, base, d)).collect();
            format!("({}->length / ({}))", base, prefix.join(" * "))
        }
    }
}

/// Zero-based linear offset for 1-based `indices` into matrix `base`.
fn linear_offset(m: &VariableType, base: &str, indices: &[String]) -> String {
    if indices.len() == 1 {
        return format!("{} - 1", indices[0]);
    }
    let mut terms = Vec::with_capacity(indices.len());
    let mut stride: Vec<String> = Vec::new();
    let mut static_stride = 1u64;
    let static_dims = m
        .as_matrix()
        .filter(|x| x.is_static())
        .and_then(|x| x.shape.known_dims());
    for (d, index) in indices.iter().enumerate() {
        let term = match &static_dims {
            Some(_) if d == 0 => format!("({} - 1)", index),
            Some(_) => format!("({} - 1) * {}", index, static_stride),
            None if d == 0 => format!("({} - 1)", index),
            None => format!("({} - 1) * {}", index, stride.join(" * ")),
        };
        terms.push(term);
        match &static_dims {
            Some(dims) => static_stride *= dims.get(d).copied().unwrap_or(1),
            None => stride.push(extent(m, base, d)),
        }
    }
    terms.join(" + ")
}

/// `base[offset]` or `base->data[offset]`.
fn slot(m: &VariableType, base: &str, offset: &str) -> String {
    match m.as_matrix() {
        Some(x) if x.is_static() => format!("{}[{}]", base, offset),
        _ => format!("{}->data[{}]", base, offset),
    }
}

fn checks(builder: StandaloneBuilder, indices: &[String], extents: &[String]) -> StandaloneBuilder {
    let lines: Vec<String> = indices
        .iter()
        .zip(extents)
        .map(|(i, e)| tensor::check(i, e))
        .collect();
    builder.lines(lines).depends_on(tensor::index_error())
}

/// Splits `[matrix, indices...]`.
fn split_get(args: &[VariableType]) -> Option<(&MatrixType, &[VariableType])> {
    let (first, indices) = args.split_first()?;
    let m = first.as_matrix()?;
    (!indices.is_empty()).then_some((m, indices))
}

/// Splits `[matrix, indices..., value]`.
fn split_set(args: &[VariableType]) -> Option<(&MatrixType, &[VariableType], &VariableType)> {
    let (value, rest) = args.split_last()?;
    let (m, indices) = split_get(rest)?;
    Some((m, indices, value))
}

fn all_scalar(indices: &[VariableType]) -> bool {
    indices.iter().all(VariableType::is_scalar)
}

/// Single matrix index, as in `A(idx)`.
fn vector_index(indices: &[VariableType]) -> Option<&MatrixType> {
    match indices {
        [VariableType::Matrix(i)] => Some(i),
        _ => None,
    }
}

fn index_names(count: usize, first: usize, types: &[VariableType]) -> Vec<String> {
    (0..count)
        .map(|k| index_code(&types[k], &format!("in{}", first + k)))
        .collect()
}

/// Checked element read, or a gather with a matrix index.
pub struct MatrixGet;

impl InstanceProvider for MatrixGet {
    fn describe(&self) -> &str {
        super::MATRIX_GET
    }

    fn accepts(&self, ctx: &ProviderContext) -> bool {
        match split_get(ctx.args()) {
            Some((m, idx)) if all_scalar(idx) => dimensionality_matches(m, idx.len()),
            Some((_, idx)) => vector_index(idx).is_some(),
            None => false,
        }
    }

    fn output_types(&self, ctx: &ProviderContext) -> Result<Vec<VariableType>, CirError> {
        let (m, idx) = split_get(ctx.args()).ok_or_else(|| mismatch(super::MATRIX_GET, ctx))?;
        if let Some(i) = vector_index(idx) {
            let out = MatrixType::best(m.element, i.shape.clone(), m.is_static() && i.is_static());
            require_dynamic_allowed(&out, super::MATRIX_GET, ctx)?;
            return Ok(vec![VariableType::Matrix(out)]);
        }
        Ok(vec![VariableType::scalar(m.element)])
    }

    fn build(&self, key: &InstanceKey, _ctx: &ProviderContext) -> Result<FunctionInstance, CirError> {
        let sig = &key.signature;
        let m = &sig.inputs[0];
        let idx = &sig.inputs[1..];
        let name = instance_name(super::MATRIX_GET, sig);
        if let [index] = idx {
            if index.is_matrix() {
                return Ok(gather(key, name, m, index));
            }
        }
        let indices = index_names(idx.len(), 2, idx);
        let extents = index_extents(m, "in1", idx.len());
        let offset = linear_offset(m, "in1", &indices);
        let builder = FunctionInstance::standalone(key.clone(), name);
        Ok(checks(builder, &indices, &extents)
            .line(format!("return {};", slot(m, "in1", &offset)))
            .build())
    }
}

fn gather(key: &InstanceKey, name: String, m: &VariableType, index: &VariableType) -> FunctionInstance {
    let out = &key.signature.outputs[0];
    let mut builder = FunctionInstance::standalone(key.clone(), name);
    let bound = match out.as_matrix() {
        Some(o) if !o.is_static() => {
            let class = o.element;
            builder = match index.as_matrix() {
                Some(i) if !i.is_static() => builder.line(format!(
                    "{}(in2->ndims, in2->shape, out1);",
                    tensor::new_tensor_name(class)
                )),
                _ => {
                    let dims: Vec<String> = index
                        .shape()
                        .and_then(|s| s.known_dims())
                        .unwrap_or_else(|| vec![1, 1])
                        .iter()
                        .map(|d| d.to_string())
                        .collect();
                    builder
                        .line(format!("int shape[{}] = {{{}}};", dims.len(), dims.join(", ")))
                        .line(format!("{}({}, shape, out1);", tensor::new_tensor_name(class), dims.len()))
                }
            };
            builder = builder.depends_on(tensor::new_tensor(class));
            "(*out1)->length".to_string()
        }
        _ => length(index, "in2"),
    };
    let k = index_code(index, &element(index, "in2", "i"));
    builder
        .line(format!("for (int i = 0; i < {}; ++i) {{", bound))
        .line(format!("long long k = {};", k))
        .line(tensor::check("k", &length(m, "in1")))
        .line(format!("{} = {};", element_ref(out, "out1", "i"), slot(m, "in1", "k - 1")))
        .line("}")
        .depends_on(tensor::index_error())
        .build()
}

/// Unchecked element read, inline.
pub struct SimpleGet;

impl InstanceProvider for SimpleGet {
    fn describe(&self) -> &str {
        super::SIMPLE_GET
    }

    fn accepts(&self, ctx: &ProviderContext) -> bool {
        matches!(split_get(ctx.args()), Some((m, idx)) if all_scalar(idx) && dimensionality_matches(m, idx.len()))
    }

    fn output_types(&self, ctx: &ProviderContext) -> Result<Vec<VariableType>, CirError> {
        let (m, _) = split_get(ctx.args()).ok_or_else(|| mismatch(super::SIMPLE_GET, ctx))?;
        Ok(vec![VariableType::scalar(m.element)])
    }

    fn build(&self, key: &InstanceKey, _ctx: &ProviderContext) -> Result<FunctionInstance, CirError> {
        let sig = &key.signature;
        let m = &sig.inputs[0];
        let idx = &sig.inputs[1..];
        let indices: Vec<String> = idx
            .iter()
            .enumerate()
            .map(|(k, t)| index_code(t, &format!("${}", k + 1)))
            .collect();
        let offset = linear_offset(m, "$0", &indices);
        Ok(FunctionInstance::inline(
            key.clone(),
            InlineForm::Template {
                template: slot(m, "$0", &offset),
                level: PrecedenceLevel::Postfix,
            },
        ))
    }
}

/// Checked in-place write without growth, or a scatter with a matrix index.
pub struct MatrixSet;

impl InstanceProvider for MatrixSet {
    fn describe(&self) -> &str {
        super::MATRIX_SET
    }

    fn accepts(&self, ctx: &ProviderContext) -> bool {
        match split_set(ctx.args()) {
            Some((m, idx, value)) if all_scalar(idx) => {
                value.is_scalar() && dimensionality_matches(m, idx.len())
            }
            Some((_, idx, value)) => vector_index(idx).is_some() && super::is_numeric(value),
            None => false,
        }
    }

    fn output_types(&self, _ctx: &ProviderContext) -> Result<Vec<VariableType>, CirError> {
        Ok(Vec::new())
    }

    fn build(&self, key: &InstanceKey, _ctx: &ProviderContext) -> Result<FunctionInstance, CirError> {
        let sig = &key.signature;
        let m = &sig.inputs[0];
        let n = sig.inputs.len();
        let value = &sig.inputs[n - 1];
        let idx = &sig.inputs[1..n - 1];
        let base = reference_base(m);
        let to = m.element_class().unwrap_or(NumericClass::Double);
        let from = value.element_class().unwrap_or(to);
        let builder = FunctionInstance::standalone(key.clone(), instance_name(super::MATRIX_SET, sig))
            .by_reference(0);
        if let [index] = idx {
            if index.is_matrix() {
                let v = convert_code(&element(value, &format!("in{}", n), "i"), from, to);
                let mut builder = builder;
                if value.is_matrix() {
                    builder = builder
                        .line(format!(
                            "if ({l} != {r}) {{ {f}({l}, {r}); }}",
                            l = length(index, "in2"),
                            r = length(value, &format!("in{}", n)),
                            f = tensor::SHAPE_ERROR
                        ))
                        .depends_on(tensor::shape_error());
                }
                return Ok(builder
                    .line(format!("for (int i = 0; i < {}; ++i) {{", length(index, "in2")))
                    .line(format!("long long k = {};", index_code(index, &element(index, "in2", "i"))))
                    .line(tensor::check("k", &length(m, &base)))
                    .line(format!("{} = {};", slot(m, &base, "k - 1"), v))
                    .line("}")
                    .depends_on(tensor::index_error())
                    .build());
            }
        }
        let indices = index_names(idx.len(), 2, idx);
        let extents = index_extents(m, &base, idx.len());
        let offset = linear_offset(m, &base, &indices);
        let v = convert_code(&format!("in{}", n), from, to);
        Ok(checks(builder, &indices, &extents)
            .line(format!("{} = {};", slot(m, &base, &offset), v))
            .build())
    }
}

/// Matrix expression inside a function receiving it by reference.
fn reference_base(m: &VariableType) -> String {
    match m.as_matrix() {
        Some(x) if x.is_static() => "in1".to_string(),
        _ => "(*in1)".to_string(),
    }
}

/// In-place write into a dynamic matrix that grows to fit the index.
pub struct MatrixSetGrow;

impl InstanceProvider for MatrixSetGrow {
    fn describe(&self) -> &str {
        super::MATRIX_SET_GROW
    }

    fn accepts(&self, ctx: &ProviderContext) -> bool {
        matches!(
            split_set(ctx.args()),
            Some((m, idx, value)) if !m.is_static()
                && (1..=2).contains(&idx.len())
                && all_scalar(idx)
                && value.is_scalar()
                && m.shape.ndims().map_or(true, |n| n <= 2)
        )
    }

    fn output_types(&self, _ctx: &ProviderContext) -> Result<Vec<VariableType>, CirError> {
        Ok(Vec::new())
    }

    fn build(&self, key: &InstanceKey, _ctx: &ProviderContext) -> Result<FunctionInstance, CirError> {
        let sig = &key.signature;
        let m = &sig.inputs[0];
        let n = sig.inputs.len();
        let class = m.element_class().unwrap_or(NumericClass::Double);
        let from = sig.inputs[n - 1].element_class().unwrap_or(class);
        let idx = &sig.inputs[1..n - 1];
        let indices = index_names(idx.len(), 2, idx);
        let resize = tensor::resize_tensor_name(class);
        let mut builder = FunctionInstance::standalone(key.clone(), instance_name(super::MATRIX_SET_GROW, sig))
            .by_reference(0)
            .lines([
                "int rows = (*in1 != NULL && (*in1)->ndims > 0) ? (*in1)->shape[0] : 0;".to_string(),
                "int length = (*in1 != NULL) ? (*in1)->length : 0;".to_string(),
                "int cols = rows > 0 ? length / rows : 0;".to_string(),
            ]);
        let offset = if let [i] = indices.as_slice() {
            builder = builder.lines([
                format!("if ({} < 1) {{ {}({}, length); }}", i, tensor::INDEX_ERROR, i),
                format!("if ({} > length) {{", i),
                "if (rows <= 1) {".to_string(),
                format!("{}(in1, 1, (int){});", resize, i),
                "} else if (cols == 1) {".to_string(),
                format!("{}(in1, (int){}, 1);", resize, i),
                "} else {".to_string(),
                format!("{}({}, length);", tensor::INDEX_ERROR, i),
                "}".to_string(),
                "}".to_string(),
            ]);
            format!("{} - 1", i)
        } else {
            let (r, c) = (&indices[0], &indices[1]);
            builder = builder.lines([
                format!("if ({r} < 1) {{ {f}({r}, rows); }}", r = r, f = tensor::INDEX_ERROR),
                format!("if ({c} < 1) {{ {f}({c}, cols); }}", c = c, f = tensor::INDEX_ERROR),
                format!("if ({r} > rows || {c} > cols) {{", r = r, c = c),
                format!(
                    "{}(in1, (int)({r} > rows ? {r} : rows), (int)({c} > cols ? {c} : cols));",
                    resize,
                    r = r,
                    c = c
                ),
                "}".to_string(),
            ]);
            format!("({} - 1) + ({} - 1) * (*in1)->shape[0]", r, c)
        };
        Ok(builder
            .line(format!(
                "(*in1)->data[{}] = {};",
                offset,
                convert_code(&format!("in{}", n), from, class)
            ))
            .depends_on(tensor::resize_tensor(class))
            .depends_on(tensor::index_error())
            .build())
    }
}

/// Unchecked in-place write, inline.
pub struct SimpleSet;

impl InstanceProvider for SimpleSet {
    fn describe(&self) -> &str {
        super::SIMPLE_SET
    }

    fn accepts(&self, ctx: &ProviderContext) -> bool {
        matches!(
            split_set(ctx.args()),
            Some((m, idx, value)) if all_scalar(idx) && value.is_scalar() && dimensionality_matches(m, idx.len())
        )
    }

    fn output_types(&self, _ctx: &ProviderContext) -> Result<Vec<VariableType>, CirError> {
        Ok(Vec::new())
    }

    fn build(&self, key: &InstanceKey, _ctx: &ProviderContext) -> Result<FunctionInstance, CirError> {
        let sig = &key.signature;
        let m = &sig.inputs[0];
        let n = sig.inputs.len();
        let idx = &sig.inputs[1..n - 1];
        let indices: Vec<String> = idx
            .iter()
            .enumerate()
            .map(|(k, t)| index_code(t, &format!("${}", k + 1)))
            .collect();
        let offset = linear_offset(m, "$0", &indices);
        let to = m.element_class().unwrap_or(NumericClass::Double);
        let from = sig.inputs[n - 1].element_class().unwrap_or(to);
        let value = convert_code(&format!("${}", n - 1), from, to);
        Ok(FunctionInstance::inline(
            key.clone(),
            InlineForm::Template {
                template: format!("{} = {}", slot(m, "$0", &offset), value),
                level: PrecedenceLevel::Assignment,
            },
        ))
    }
}

/// Copies a matrix into a new value, converting storage when the declared
/// destination type differs.
pub struct CopyMatrix;

impl InstanceProvider for CopyMatrix {
    fn describe(&self) -> &str {
        super::COPY
    }

    fn accepts(&self, ctx: &ProviderContext) -> bool {
        let [VariableType::Matrix(src)] = ctx.args() else {
            return false;
        };
        match ctx.output_type() {
            Some(VariableType::Matrix(dst)) => {
                dst.element == src.element
                    && (!dst.is_static() || !src.is_static() || dst.shape == src.shape)
            }
            Some(_) => false,
            None => true,
        }
    }

    fn output_types(&self, ctx: &ProviderContext) -> Result<Vec<VariableType>, CirError> {
        match (ctx.output_type(), ctx.arg(0)) {
            (Some(dst), _) => Ok(vec![dst.without_constant()]),
            (None, Some(src)) => Ok(vec![src.clone()]),
            _ => Err(mismatch(super::COPY, ctx)),
        }
    }

    fn build(&self, key: &InstanceKey, _ctx: &ProviderContext) -> Result<FunctionInstance, CirError> {
        let sig = &key.signature;
        let src = &sig.inputs[0];
        let dst = &sig.outputs[0];
        let mut name = instance_name(super::COPY, sig);
        name.push('_');
        name.push_str(&ctype::mangle(dst));
        let mut builder = FunctionInstance::standalone(key.clone(), name);
        let bound = match dst.as_matrix() {
            Some(d) if !d.is_static() => {
                builder = match src.as_matrix() {
                    Some(s) if !s.is_static() => {
                        builder.line(format!("{}(in1->ndims, in1->shape, out1);", tensor::new_tensor_name(d.element)))
                    }
                    _ => {
                        let dims: Vec<String> = src
                            .shape()
                            .and_then(|s| s.known_dims())
                            .unwrap_or_else(|| vec![1, 1])
                            .iter()
                            .map(|d| d.to_string())
                            .collect();
                        builder
                            .line(format!("int shape[{}] = {{{}}};", dims.len(), dims.join(", ")))
                            .line(format!("{}({}, shape, out1);", tensor::new_tensor_name(d.element), dims.len()))
                    }
                };
                builder = builder.depends_on(tensor::new_tensor(d.element));
                "(*out1)->length".to_string()
            }
            _ => {
                if src.as_matrix().is_some_and(|s| !s.is_static()) {
                    builder = builder
                        .line(format!(
                            "if (in1->length != {n}) {{ {f}(in1->length, {n}); }}",
                            n = length(dst, "out1"),
                            f = tensor::SHAPE_ERROR
                        ))
                        .depends_on(tensor::shape_error());
                }
                length(dst, "out1")
            }
        };
        Ok(builder
            .line(format!("for (int i = 0; i < {}; ++i) {{", bound))
            .line(format!("{} = {};", element_ref(dst, "out1", "i"), element(src, "in1", "i")))
            .line("}")
            .build())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetAllMode {
    /// Source has the destination's static shape.
    BulkCopy,
    /// Source is a scalar.
    Broadcast,
    /// Source is a matrix whose shape is only checked at run time.
    ElementLoop,
}

impl SetAllMode {
    pub fn operation(self) -> &'static str {
        match self {
            SetAllMode::BulkCopy => super::SET_ALL_COPY,
            SetAllMode::Broadcast => super::SET_ALL_BROADCAST,
            SetAllMode::ElementLoop => super::SET_ALL_LOOP,
        }
    }

    /// Mode for writing `src` into every element of `dst`, decided from
    /// static shape information alone.
    pub fn classify(dst: &VariableType, src: &VariableType) -> Option<SetAllMode> {
        let d = dst.as_matrix()?;
        match src {
            VariableType::Scalar(_) => Some(SetAllMode::Broadcast),
            VariableType::Matrix(s) => {
                if d.is_static() && s.is_static() && s.shape.numel() == d.shape.numel() {
                    Some(SetAllMode::BulkCopy)
                } else {
                    Some(SetAllMode::ElementLoop)
                }
            }
            _ => None,
        }
    }
}

/// Writes every element of a matrix in place.
pub struct SetAll {
    mode: SetAllMode,
}

impl InstanceProvider for SetAll {
    fn describe(&self) -> &str {
        self.mode.operation()
    }

    fn accepts(&self, ctx: &ProviderContext) -> bool {
        match ctx.args() {
            [dst, src] => SetAllMode::classify(dst, src) == Some(self.mode),
            _ => false,
        }
    }

    fn output_types(&self, _ctx: &ProviderContext) -> Result<Vec<VariableType>, CirError> {
        Ok(Vec::new())
    }

    fn build(&self, key: &InstanceKey, _ctx: &ProviderContext) -> Result<FunctionInstance, CirError> {
        let sig = &key.signature;
        let (dst, src) = (&sig.inputs[0], &sig.inputs[1]);
        let base = reference_base(dst);
        let to = dst.element_class().unwrap_or(NumericClass::Double);
        let from = src.element_class().unwrap_or(to);
        let mut builder = FunctionInstance::standalone(key.clone(), instance_name(self.mode.operation(), sig))
            .by_reference(0);
        if self.mode == SetAllMode::ElementLoop {
            builder = builder
                .line(format!(
                    "if ({l} != {r}) {{ {f}({l}, {r}); }}",
                    l = length(dst, &base),
                    r = length(src, "in2"),
                    f = tensor::SHAPE_ERROR
                ))
                .depends_on(tensor::shape_error());
        }
        let value = convert_code(&element(src, "in2", "i"), from, to);
        Ok(builder
            .line(format!("for (int i = 0; i < {}; ++i) {{", length(dst, &base)))
            .line(format!("{} = {};", slot(dst, &base, "i"), value))
            .line("}")
            .build())
    }
}

pub fn providers() -> ProviderTableBuilder {
    ProviderTableBuilder::new()
        .add(super::MATRIX_GET, MatrixGet)
        .add(super::SIMPLE_GET, SimpleGet)
        .add(super::MATRIX_SET, MatrixSet)
        .add(super::MATRIX_SET_GROW, MatrixSetGrow)
        .add(super::SIMPLE_SET, SimpleSet)
        .add(super::COPY, CopyMatrix)
        .add(super::SET_ALL_COPY, SetAll { mode: SetAllMode::BulkCopy })
        .add(super::SET_ALL_BROADCAST, SetAll { mode: SetAllMode::Broadcast })
        .add(super::SET_ALL_LOOP, SetAll { mode: SetAllMode::ElementLoop })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::precedence::CExpr;
    use crate::registry::InstanceRegistry;
    use matisse_types::Shape;

    fn registry() -> InstanceRegistry {
        InstanceRegistry::new(providers().build())
    }

    fn fixed(dims: &[u64]) -> VariableType {
        VariableType::Matrix(MatrixType::fixed(NumericClass::Int32, dims))
    }

    fn dynamic() -> VariableType {
        VariableType::Matrix(MatrixType::dynamic(NumericClass::Double, Shape::unknown(2)))
    }

    fn int() -> VariableType {
        VariableType::scalar(NumericClass::Int32)
    }

    fn double() -> VariableType {
        VariableType::scalar(NumericClass::Double)
    }

    #[test]
    fn checked_linear_get() {
        let reg = registry();
        let inst = reg
            .instance("matrix_get", &ProviderContext::detached().with_args(vec![fixed(&[1, 3]), int()]))
            .unwrap();
        assert_eq!(inst.function_type().outputs, vec![int()]);
        let code = inst.implementation_code().unwrap();
        assert!(code.contains("if (in2 < 1 || in2 > 3) { matisse_index_error(in2, 3); }"));
        assert!(code.contains("return in1[in2 - 1];"));
    }

    #[test]
    fn two_dimensional_offsets() {
        let reg = registry();
        let inst = reg
            .instance(
                "simple_get",
                &ProviderContext::detached().with_args(vec![fixed(&[2, 3]), int(), int()]),
            )
            .unwrap();
        let expr = inst
            .call_expr(&[CExpr::atom("A"), CExpr::atom("i"), CExpr::atom("j")])
            .unwrap();
        assert_eq!(expr.code, "A[(i - 1) + (j - 1) * 2]");
    }

    #[test]
    fn double_indices_are_converted() {
        let reg = registry();
        let inst = reg
            .instance("simple_get", &ProviderContext::detached().with_args(vec![dynamic(), double()]))
            .unwrap();
        let expr = inst.call_expr(&[CExpr::atom("A"), CExpr::atom("k")]).unwrap();
        assert_eq!(expr.code, "A->data[(long long)k - 1]");
    }

    #[test]
    fn dimensionality_is_checked() {
        let reg = registry();
        let three = ProviderContext::detached().with_args(vec![fixed(&[2, 3]), int(), int(), int()]);
        assert!(reg.resolve("matrix_get", &three).is_err());
        let m = MatrixType::fixed(NumericClass::Double, &[2, 3, 4]);
        assert!(dimensionality_matches(&m, 1));
        assert!(dimensionality_matches(&m, 2));
        assert!(dimensionality_matches(&m, 3));
        assert!(!dimensionality_matches(&m, 4));
    }

    #[test]
    fn simple_set_is_an_assignment() {
        let reg = registry();
        let inst = reg
            .instance(
                "simple_set",
                &ProviderContext::detached().with_args(vec![fixed(&[1, 3]), int(), double()]),
            )
            .unwrap();
        assert_eq!(
            inst.call_statement(&[CExpr::atom("y"), CExpr::atom("i"), CExpr::atom("v")], &[]),
            "y[i - 1] = (int32_t)round(v);"
        );
    }

    #[test]
    fn checked_set_in_place() {
        let reg = registry();
        let inst = reg
            .instance(
                "matrix_set",
                &ProviderContext::detached().with_args(vec![dynamic(), int(), double()]),
            )
            .unwrap();
        assert_eq!(
            inst.call_statement(&[CExpr::atom("y"), CExpr::atom("i"), CExpr::atom("v")], &[]),
            "matrix_set_td_i32_d(&y, i, v);"
        );
        assert!(inst
            .implementation_code()
            .unwrap()
            .contains("(*in1)->data[in2 - 1] = in3;"));
    }

    #[test]
    fn growing_set_resizes() {
        let reg = registry();
        let inst = reg
            .instance(
                "matrix_set_grow",
                &ProviderContext::detached().with_args(vec![dynamic(), int(), double()]),
            )
            .unwrap();
        let code = inst.implementation_code().unwrap();
        assert!(code.contains("resize_tensor_d(in1, 1, (int)in2);"));
        assert!(inst
            .dependencies()
            .iter()
            .any(|d| d.key().operation == "resize_tensor_d"));
        assert!(reg
            .resolve("matrix_set_grow", &ProviderContext::detached().with_args(vec![fixed(&[1, 3]), int(), int()]))
            .is_err());
    }

    #[test]
    fn gather_with_matrix_index() {
        let reg = registry();
        let inst = reg
            .instance(
                "matrix_get",
                &ProviderContext::detached().with_args(vec![fixed(&[1, 5]), fixed(&[1, 3])]),
            )
            .unwrap();
        assert_eq!(inst.function_type().outputs, vec![fixed(&[1, 3])]);
        assert!(inst.implementation_code().unwrap().contains("out1[i] = in1[k - 1];"));
    }

    #[test]
    fn set_all_modes() {
        assert_eq!(SetAllMode::classify(&fixed(&[1, 3]), &fixed(&[3, 1])), Some(SetAllMode::BulkCopy));
        assert_eq!(SetAllMode::classify(&fixed(&[1, 3]), &int()), Some(SetAllMode::Broadcast));
        assert_eq!(SetAllMode::classify(&dynamic(), &fixed(&[1, 3])), Some(SetAllMode::ElementLoop));
        assert_eq!(SetAllMode::classify(&int(), &int()), None);
    }

    #[test]
    fn broadcast_body() {
        let reg = registry();
        let inst = reg
            .instance(
                "set_all_broadcast",
                &ProviderContext::detached().with_args(vec![dynamic(), double()]),
            )
            .unwrap();
        let code = inst.implementation_code().unwrap();
        assert!(code.contains("for (int i = 0; i < (*in1)->length; ++i) {"));
        assert!(code.contains("(*in1)->data[i] = in2;"));
    }

    #[test]
    fn copy_static_to_dynamic() {
        let reg = registry();
        let src = VariableType::Matrix(MatrixType::fixed(NumericClass::Double, &[1, 3]));
        let ctx = ProviderContext::detached()
            .with_args(vec![src])
            .with_output_type(Some(dynamic()));
        let inst = reg.instance("copy", &ctx).unwrap();
        let code = inst.implementation_code().unwrap();
        assert!(code.contains("int shape[2] = {1, 3};"));
        assert!(code.contains("(*out1)->data[i] = in1[i];"));
    }
}
