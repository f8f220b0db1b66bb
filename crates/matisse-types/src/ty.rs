// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! The closed variable-type sum.

use serde::{Deserialize, Serialize};

use crate::numeric::{Constant, NumericClass};
use crate::shape::Shape;

/// Type of one SSA value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableType {
    Scalar(ScalarType),
    Matrix(MatrixType),
    String(StringType),
    Void,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScalarType {
    pub class: NumericClass,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constant: Option<Constant>,
}

/// How a matrix's storage is allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Storage {
    /// Fixed-size array; requires a fully known shape.
    Static,
    /// Heap-allocated, resizable.
    Dynamic,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatrixType {
    pub element: NumericClass,
    pub shape: Shape,
    pub storage: Storage,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StringType {
    pub value: String,
}

impl ScalarType {
    pub fn new(class: NumericClass) -> Self {
        Self {
            class,
            constant: None,
        }
    }

    pub fn constant(class: NumericClass, value: Constant) -> Self {
        Self {
            class,
            constant: Some(value),
        }
    }

    pub fn without_constant(self) -> Self {
        Self {
            constant: None,
            ..self
        }
    }

    pub fn with_constant(self, value: Constant) -> Self {
        Self {
            constant: Some(value),
            ..self
        }
    }
}

impl MatrixType {
    /// Static matrix of a fully known shape.
    pub fn fixed(element: NumericClass, dims: &[u64]) -> Self {
        Self {
            element,
            shape: Shape::fixed(dims),
            storage: Storage::Static,
        }
    }

    pub fn dynamic(element: NumericClass, shape: Shape) -> Self {
        Self {
            element,
            shape,
            storage: Storage::Dynamic,
        }
    }

    /// Static storage when the shape allows it, dynamic otherwise.
    pub fn best(element: NumericClass, shape: Shape, allow_static: bool) -> Self {
        let storage = if allow_static && shape.is_fully_defined() {
            Storage::Static
        } else {
            Storage::Dynamic
        };
        Self {
            element,
            shape,
            storage,
        }
    }

    pub fn is_static(&self) -> bool {
        self.storage == Storage::Static
    }

    pub fn to_dynamic(&self) -> Self {
        Self {
            storage: Storage::Dynamic,
            ..self.clone()
        }
    }

    pub fn with_shape(&self, shape: Shape) -> Self {
        let storage = if shape.is_fully_defined() {
            self.storage
        } else {
            Storage::Dynamic
        };
        Self {
            element: self.element,
            shape,
            storage,
        }
    }

    pub fn with_element(&self, element: NumericClass) -> Self {
        Self {
            element,
            ..self.clone()
        }
    }
}

impl VariableType {
    pub fn scalar(class: NumericClass) -> Self {
        VariableType::Scalar(ScalarType::new(class))
    }

    pub fn int_constant(class: NumericClass, value: i64) -> Self {
        VariableType::Scalar(ScalarType::constant(class, Constant::Int(value)))
    }

    pub fn real_constant(class: NumericClass, value: f64) -> Self {
        VariableType::Scalar(ScalarType::constant(class, Constant::Real(value)))
    }

    pub fn string(value: impl Into<String>) -> Self {
        VariableType::String(StringType {
            value: value.into(),
        })
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, VariableType::Scalar(_))
    }

    pub fn is_matrix(&self) -> bool {
        matches!(self, VariableType::Matrix(_))
    }

    pub fn as_scalar(&self) -> Option<&ScalarType> {
        match self {
            VariableType::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_matrix(&self) -> Option<&MatrixType> {
        match self {
            VariableType::Matrix(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            VariableType::String(s) => Some(&s.value),
            _ => None,
        }
    }

    /// Numeric class of a scalar, or of a matrix's elements.
    pub fn element_class(&self) -> Option<NumericClass> {
        match self {
            VariableType::Scalar(s) => Some(s.class),
            VariableType::Matrix(m) => Some(m.element),
            VariableType::String(_) | VariableType::Void => None,
        }
    }

    pub fn constant(&self) -> Option<Constant> {
        self.as_scalar().and_then(|s| s.constant)
    }

    /// Shape seen by indexing: scalars are 1x1.
    pub fn shape(&self) -> Option<Shape> {
        match self {
            VariableType::Scalar(_) => Some(Shape::scalar()),
            VariableType::Matrix(m) => Some(m.shape.clone()),
            VariableType::String(s) => Some(Shape::fixed(&[1, s.value.chars().count() as u64])),
            VariableType::Void => None,
        }
    }

    pub fn without_constant(&self) -> VariableType {
        match self {
            VariableType::Scalar(s) => VariableType::Scalar(s.without_constant()),
            other => other.clone(),
        }
    }

    /// Whether the type lowers to a C object passed around by pointer.
    pub fn is_reference_like(&self) -> bool {
        match self {
            VariableType::Matrix(_) | VariableType::String(_) => true,
            VariableType::Scalar(_) | VariableType::Void => false,
        }
    }

    /// Equality ignoring compile-time constants; two such types share a C type.
    pub fn same_storage(&self, other: &VariableType) -> bool {
        self.without_constant() == other.without_constant()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutators_return_new_values() {
        let c = VariableType::int_constant(NumericClass::Int32, 3);
        let plain = c.without_constant();
        assert_eq!(c.constant(), Some(Constant::Int(3)));
        assert_eq!(plain.constant(), None);
        assert!(c.same_storage(&plain));
    }

    #[test]
    fn shape_change_keeps_static_only_when_known() {
        let m = MatrixType::fixed(NumericClass::Double, &[1, 3]);
        assert!(m.is_static());
        assert!(m.with_shape(Shape::fixed(&[1, 4])).is_static());
        assert!(!m.with_shape(Shape::unknown(2)).is_static());
        assert!(!m.to_dynamic().is_static());
    }

    #[test]
    fn best_storage() {
        let s = MatrixType::best(NumericClass::Int32, Shape::fixed(&[2, 2]), true);
        assert!(s.is_static());
        let d = MatrixType::best(NumericClass::Int32, Shape::fixed(&[2, 2]), false);
        assert!(!d.is_static());
    }

    #[test]
    fn serde_round_trip() {
        let t = VariableType::Matrix(MatrixType::dynamic(NumericClass::Single, Shape::unknown(2)));
        let json = serde_json::to_string(&t).unwrap();
        let back: VariableType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);
    }
}
