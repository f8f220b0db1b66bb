// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Numeric type factory for the target.

use serde::{Deserialize, Serialize};

use crate::numeric::{Constant, NumericClass};
use crate::ty::{ScalarType, VariableType};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LiteralError {
    #[error("invalid numeric literal `{0}`")]
    Invalid(String),
    #[error("complex literals are not supported: `{0}`")]
    Complex(String),
}

/// Target-specific choices for numeric types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumericFactory {
    /// Class of non-integer literals and of `zeros`/`ones` without a class argument.
    pub default_real: NumericClass,
    /// Class of integer literals, sizes and indices.
    pub index: NumericClass,
}

impl Default for NumericFactory {
    fn default() -> Self {
        Self {
            default_real: NumericClass::Double,
            index: NumericClass::Int32,
        }
    }
}

impl NumericFactory {
    pub fn new(default_real: NumericClass, index: NumericClass) -> Self {
        Self {
            default_real,
            index,
        }
    }

    pub fn default_real(&self) -> VariableType {
        VariableType::scalar(self.default_real)
    }

    pub fn index(&self) -> VariableType {
        VariableType::scalar(self.index)
    }

    pub fn logical(&self) -> VariableType {
        VariableType::scalar(NumericClass::Logical)
    }

    pub fn index_constant(&self, value: i64) -> VariableType {
        VariableType::int_constant(self.index, value)
    }

    pub fn real_constant(&self, value: f64) -> VariableType {
        VariableType::real_constant(self.default_real, value)
    }

    /// Type of a numeric literal: integers become index-class constants,
    /// anything else a default-real constant.
    pub fn literal(&self, text: &str) -> Result<ScalarType, LiteralError> {
        let trimmed = text.trim();
        if trimmed.ends_with('i') || trimmed.ends_with('j') {
            return Err(LiteralError::Complex(text.to_string()));
        }
        let looks_integral = trimmed.chars().all(|c| c.is_ascii_digit());
        if looks_integral {
            if let Ok(v) = trimmed.parse::<i64>() {
                if self.index.holds(v as f64) {
                    return Ok(ScalarType::constant(self.index, Constant::Int(v)));
                }
            }
        }
        trimmed
            .parse::<f64>()
            .map(|v| ScalarType::constant(self.default_real, Constant::Real(v)))
            .map_err(|_| LiteralError::Invalid(text.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_literal_is_index_constant() {
        let f = NumericFactory::default();
        let t = f.literal("3").unwrap();
        assert_eq!(t.class, NumericClass::Int32);
        assert_eq!(t.constant, Some(Constant::Int(3)));
    }

    #[test]
    fn real_literal_uses_default_real() {
        let f = NumericFactory::new(NumericClass::Single, NumericClass::Int32);
        let t = f.literal("2.5").unwrap();
        assert_eq!(t.class, NumericClass::Single);
        assert_eq!(t.constant, Some(Constant::Real(2.5)));
        let t = f.literal("1e3").unwrap();
        assert_eq!(t.class, NumericClass::Single);
    }

    #[test]
    fn oversized_integer_becomes_real() {
        let f = NumericFactory::default();
        let t = f.literal("3000000000").unwrap();
        assert_eq!(t.class, NumericClass::Double);
    }

    #[test]
    fn bad_literals() {
        let f = NumericFactory::default();
        assert_eq!(f.literal("2i"), Err(LiteralError::Complex("2i".to_string())));
        assert!(matches!(f.literal("1.2.3"), Err(LiteralError::Invalid(_))));
    }
}
