// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Built-in operation providers.
//!
//! Each submodule contributes a `providers()` builder; `standard_providers`
//! concatenates them in priority order. Callers wanting to override a
//! built-in prepend their own provider under the same name.

pub mod access;
pub mod alloc;
pub mod cast;
pub mod concat;
pub mod elementwise;
pub mod io;
pub mod math;
pub mod query;
pub mod scalar;
pub mod tensor;

use matisse_types::{NumericClass, VariableType};

use crate::ctype;
use crate::function_type::FunctionType;
use crate::table::{ProviderTable, ProviderTableBuilder};

pub const MATRIX_GET: &str = "matrix_get";
pub const SIMPLE_GET: &str = "simple_get";
pub const MATRIX_SET: &str = "matrix_set";
pub const MATRIX_SET_GROW: &str = "matrix_set_grow";
pub const SIMPLE_SET: &str = "simple_set";
pub const END: &str = "end";
pub const COLON: &str = "colon";
pub const COPY: &str = "copy";
pub const SET_ALL_COPY: &str = "set_all_copy";
pub const SET_ALL_BROADCAST: &str = "set_all_broadcast";
pub const SET_ALL_LOOP: &str = "set_all_loop";
pub const ZEROS: &str = "zeros";
pub const ONES: &str = "ones";

pub fn standard_providers() -> ProviderTableBuilder {
    ProviderTableBuilder::new()
        .extend(scalar::providers())
        .extend(elementwise::providers())
        .extend(cast::providers())
        .extend(alloc::providers())
        .extend(query::providers())
        .extend(math::providers())
        .extend(concat::providers())
        .extend(access::providers())
        .extend(io::providers())
}

pub fn standard_table() -> ProviderTable {
    standard_providers().build()
}

/// Numeric scalar or matrix.
pub(crate) fn is_numeric(ty: &VariableType) -> bool {
    matches!(ty, VariableType::Scalar(_) | VariableType::Matrix(_))
}

/// Class of a binary arithmetic result: integers dominate and must agree,
/// single dominates double, logical and char compute as double.
pub(crate) fn arithmetic_class(a: NumericClass, b: NumericClass) -> Option<NumericClass> {
    match (a.is_integer(), b.is_integer()) {
        (true, true) if a == b => Some(a),
        (true, true) => None,
        (true, false) => Some(a),
        (false, true) => Some(b),
        (false, false) => {
            if a == NumericClass::Single || b == NumericClass::Single {
                Some(NumericClass::Single)
            } else {
                Some(NumericClass::Double)
            }
        }
    }
}

/// Generated C name: operation plus mangled input types.
pub(crate) fn instance_name(operation: &str, signature: &FunctionType) -> String {
    let mut name = operation.to_string();
    for ty in &signature.inputs {
        name.push('_');
        name.push_str(&ctype::mangle(ty));
    }
    name
}

/// Element `index` of a by-value input named `name`.
pub(crate) fn element(ty: &VariableType, name: &str, index: &str) -> String {
    match ty {
        VariableType::Matrix(m) if m.is_static() => format!("{}[{}]", name, index),
        VariableType::Matrix(_) => format!("{}->data[{}]", name, index),
        _ => name.to_string(),
    }
}

/// Element `index` of a by-reference output or in-place input named `name`.
pub(crate) fn element_ref(ty: &VariableType, name: &str, index: &str) -> String {
    match ty {
        VariableType::Matrix(m) if m.is_static() => format!("{}[{}]", name, index),
        VariableType::Matrix(_) => format!("(*{})->data[{}]", name, index),
        _ => format!("(*{})", name),
    }
}

/// Element count of a by-value input.
pub(crate) fn length(ty: &VariableType, name: &str) -> String {
    match ty {
        VariableType::Matrix(m) => match ctype::static_length(m) {
            Some(n) => n.to_string(),
            None => format!("{}->length", name),
        },
        _ => "1".to_string(),
    }
}

/// Extent of dimension `dim` (0-based) of a by-value input.
pub(crate) fn extent(ty: &VariableType, name: &str, dim: usize) -> String {
    match ty {
        VariableType::Matrix(m) if m.is_static() => {
            m.shape.dim(dim).known().unwrap_or(1).to_string()
        }
        VariableType::Matrix(_) => format!("({} < {}->ndims ? {}->shape[{}] : 1)", dim, name, name, dim),
        _ => "1".to_string(),
    }
}

pub(crate) fn scalar_class(ty: &VariableType) -> Option<NumericClass> {
    ty.as_scalar().map(|s| s.class)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_classes() {
        use NumericClass::*;
        assert_eq!(arithmetic_class(Int32, Double), Some(Int32));
        assert_eq!(arithmetic_class(Double, UInt8), Some(UInt8));
        assert_eq!(arithmetic_class(Int32, Int16), None);
        assert_eq!(arithmetic_class(Single, Double), Some(Single));
        assert_eq!(arithmetic_class(Logical, Char), Some(Double));
    }

    #[test]
    fn standard_table_has_core_operations() {
        let table = standard_table();
        for op in ["plus", "mtimes", "zeros", "numel", MATRIX_GET, MATRIX_SET, END, "disp", "int32"] {
            assert!(table.contains(op), "missing {}", op);
        }
    }
}
