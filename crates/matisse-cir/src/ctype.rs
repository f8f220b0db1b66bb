// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! C emission capability of variable types.
//!
//! Scalars map onto `<stdint.h>`/`<stdbool.h>` types, static matrices onto
//! flat column-major arrays, dynamic matrices onto a heap tensor struct
//! per element class and strings onto `const char*`.

use std::collections::BTreeSet;

use matisse_types::{Constant, MatrixType, NumericClass, VariableType};

/// C scalar type of a numeric class.
pub fn scalar_c_type(class: NumericClass) -> &'static str {
    match class {
        NumericClass::Int8 => "int8_t",
        NumericClass::Int16 => "int16_t",
        NumericClass::Int32 => "int32_t",
        NumericClass::Int64 => "int64_t",
        NumericClass::UInt8 => "uint8_t",
        NumericClass::UInt16 => "uint16_t",
        NumericClass::UInt32 => "uint32_t",
        NumericClass::UInt64 => "uint64_t",
        NumericClass::Single => "float",
        NumericClass::Double => "double",
        NumericClass::Logical => "bool",
        NumericClass::Char => "char",
    }
}

/// Short mangling code of a class, used in generated names.
pub fn class_code(class: NumericClass) -> &'static str {
    match class {
        NumericClass::Int8 => "i8",
        NumericClass::Int16 => "i16",
        NumericClass::Int32 => "i32",
        NumericClass::Int64 => "i64",
        NumericClass::UInt8 => "u8",
        NumericClass::UInt16 => "u16",
        NumericClass::UInt32 => "u32",
        NumericClass::UInt64 => "u64",
        NumericClass::Single => "f",
        NumericClass::Double => "d",
        NumericClass::Logical => "l",
        NumericClass::Char => "c",
    }
}

/// Name of the heap tensor struct holding elements of `class`.
pub fn tensor_struct(class: NumericClass) -> String {
    format!("tensor_{}", class_code(class))
}

/// Mangled fragment identifying a type in generated function names.
pub fn mangle(ty: &VariableType) -> String {
    match ty {
        VariableType::Scalar(s) => class_code(s.class).to_string(),
        VariableType::Matrix(m) if m.is_static() => match m.shape.known_dims() {
            Some(dims) => {
                let dims: Vec<String> = dims.iter().map(|d| d.to_string()).collect();
                format!("{}_{}", class_code(m.element), dims.join("x"))
            }
            None => format!("t{}", class_code(m.element)),
        },
        VariableType::Matrix(m) => format!("t{}", class_code(m.element)),
        VariableType::String(_) => "s".to_string(),
        VariableType::Void => "v".to_string(),
    }
}

/// C type used for a value of `ty` when passed by value. Static matrices
/// report their element type; the extent goes on the declarator.
pub fn c_type(ty: &VariableType) -> String {
    match ty {
        VariableType::Scalar(s) => scalar_c_type(s.class).to_string(),
        VariableType::Matrix(m) if m.is_static() => scalar_c_type(m.element).to_string(),
        VariableType::Matrix(m) => format!("{}*", tensor_struct(m.element)),
        VariableType::String(_) => "const char*".to_string(),
        VariableType::Void => "void".to_string(),
    }
}

/// Number of elements of a static matrix.
pub fn static_length(m: &MatrixType) -> Option<u64> {
    if m.is_static() {
        m.shape.numel()
    } else {
        None
    }
}

/// Local variable or by-value parameter declaration.
pub fn declaration(ty: &VariableType, name: &str) -> String {
    match ty {
        VariableType::Matrix(m) => match static_length(m) {
            Some(n) => format!("{} {}[{}]", scalar_c_type(m.element), name, n.max(1)),
            None => format!("{}* {}", tensor_struct(m.element), name),
        },
        _ => format!("{} {}", c_type(ty), name),
    }
}

/// Local declaration with its initializer. Dynamic matrices start out null.
pub fn local_declaration(ty: &VariableType, name: &str) -> String {
    match ty {
        VariableType::Matrix(m) if !m.is_static() => format!("{} = NULL", declaration(ty, name)),
        _ => declaration(ty, name),
    }
}

/// Parameter declaration for an output passed by reference.
pub fn output_parameter(ty: &VariableType, name: &str) -> String {
    match ty {
        VariableType::Matrix(m) if m.is_static() => declaration(ty, name),
        VariableType::Matrix(m) => format!("{}** {}", tensor_struct(m.element), name),
        _ => format!("{}* {}", c_type(ty), name),
    }
}

/// Expression passing `code` to an output parameter.
pub fn reference_to(ty: &VariableType, code: &str) -> String {
    match ty {
        VariableType::Matrix(m) if m.is_static() => code.to_string(),
        _ => format!("&{}", code),
    }
}

/// Expression reading a by-reference output parameter inside its function.
pub fn dereference(ty: &VariableType, name: &str) -> String {
    match ty {
        VariableType::Matrix(m) if m.is_static() => name.to_string(),
        _ => format!("(*{})", name),
    }
}

/// Headers the declaration of a value of `ty` needs.
pub fn includes(ty: &VariableType) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    let class = match ty {
        VariableType::Scalar(s) => Some(s.class),
        VariableType::Matrix(m) => {
            if !m.is_static() {
                out.insert("stdlib.h".to_string());
            }
            Some(m.element)
        }
        VariableType::String(_) | VariableType::Void => None,
    };
    if let Some(class) = class {
        if class.is_integer() {
            out.insert("stdint.h".to_string());
        }
        if class == NumericClass::Logical {
            out.insert("stdbool.h".to_string());
        }
    }
    out
}

/// C literal for a constant stored in `class`.
pub fn literal(value: Constant, class: NumericClass) -> String {
    match class {
        NumericClass::Logical => {
            if value.is_truthy() {
                "true".to_string()
            } else {
                "false".to_string()
            }
        }
        NumericClass::Single => format!("{}f", real_literal(value.as_f64())),
        NumericClass::Double => real_literal(value.as_f64()),
        NumericClass::Int64 => format!("{}LL", integer_part(value)),
        NumericClass::UInt32 => format!("{}U", integer_part(value)),
        NumericClass::UInt64 => format!("{}ULL", integer_part(value)),
        _ => integer_part(value).to_string(),
    }
}

fn integer_part(value: Constant) -> i64 {
    match value {
        Constant::Int(v) => v,
        Constant::Real(v) => v.round() as i64,
    }
}

fn real_literal(v: f64) -> String {
    if v.is_nan() {
        "NAN".to_string()
    } else if v.is_infinite() {
        if v > 0.0 { "INFINITY" } else { "-INFINITY" }.to_string()
    } else if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{:.1}", v)
    } else {
        format!("{:?}", v)
    }
}

/// String literal with C escapes.
pub fn string_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use matisse_types::Shape;

    #[test]
    fn scalar_declarations() {
        let ty = VariableType::scalar(NumericClass::Int32);
        assert_eq!(declaration(&ty, "x"), "int32_t x");
        assert_eq!(output_parameter(&ty, "y"), "int32_t* y");
        assert_eq!(reference_to(&ty, "y"), "&y");
        assert!(includes(&ty).contains("stdint.h"));
    }

    #[test]
    fn static_matrix_is_flat_array() {
        let ty = VariableType::Matrix(MatrixType::fixed(NumericClass::Int32, &[1, 3]));
        assert_eq!(declaration(&ty, "A"), "int32_t A[3]");
        assert_eq!(output_parameter(&ty, "A"), "int32_t A[3]");
        assert_eq!(reference_to(&ty, "A"), "A");
        assert_eq!(mangle(&ty), "i32_1x3");
    }

    #[test]
    fn dynamic_matrix_is_tensor() {
        let ty = VariableType::Matrix(MatrixType::dynamic(NumericClass::Double, Shape::unknown(2)));
        assert_eq!(declaration(&ty, "A"), "tensor_d* A");
        assert_eq!(local_declaration(&ty, "A"), "tensor_d* A = NULL");
        assert_eq!(output_parameter(&ty, "A"), "tensor_d** A");
        assert_eq!(dereference(&ty, "A"), "(*A)");
        assert!(includes(&ty).contains("stdlib.h"));
    }

    #[test]
    fn literals() {
        assert_eq!(literal(Constant::Int(3), NumericClass::Int32), "3");
        assert_eq!(literal(Constant::Int(3), NumericClass::Double), "3.0");
        assert_eq!(literal(Constant::Real(0.5), NumericClass::Single), "0.5f");
        assert_eq!(literal(Constant::Int(0), NumericClass::Logical), "false");
        assert_eq!(string_literal("a\"b"), "\"a\\\"b\"");
    }
}
