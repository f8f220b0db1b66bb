// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Parsing the textual type format used in settings and test fixtures.
//!
//! ```text
//! int32            double(2.5)        logical
//! double[1x3]      dyn single[1x?]    dyn int32[?]
//! string("abc")    void
//! ```

use std::str::FromStr;

use crate::numeric::{Constant, NumericClass};
use crate::shape::{Dim, Shape};
use crate::ty::{MatrixType, ScalarType, Storage, VariableType};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid type `{text}`: {reason}")]
pub struct TypeParseError {
    pub text: String,
    pub reason: &'static str,
}

fn error(text: &str, reason: &'static str) -> TypeParseError {
    TypeParseError {
        text: text.to_string(),
        reason,
    }
}

impl FromStr for VariableType {
    type Err = TypeParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let s = text.trim();
        if s == "void" {
            return Ok(VariableType::Void);
        }
        if let Some(inner) = s.strip_prefix("string(").and_then(|r| r.strip_suffix(')')) {
            let value = inner
                .strip_prefix('"')
                .and_then(|r| r.strip_suffix('"'))
                .ok_or_else(|| error(text, "string value must be quoted"))?;
            return Ok(VariableType::string(value));
        }

        let (storage, rest) = match s.strip_prefix("dyn ") {
            Some(rest) => (Storage::Dynamic, rest.trim_start()),
            None => (Storage::Static, s),
        };

        if let Some(open) = rest.find('[') {
            let class = parse_class(text, &rest[..open])?;
            let dims = rest[open + 1..]
                .strip_suffix(']')
                .ok_or_else(|| error(text, "missing `]`"))?;
            let shape = parse_shape(text, dims)?;
            if storage == Storage::Static && !shape.is_fully_defined() {
                return Err(error(text, "static matrices need a fully known shape"));
            }
            return Ok(VariableType::Matrix(MatrixType {
                element: class,
                shape,
                storage,
            }));
        }
        if storage == Storage::Dynamic {
            return Err(error(text, "`dyn` applies to matrices only"));
        }

        if let Some(open) = rest.find('(') {
            let class = parse_class(text, &rest[..open])?;
            let value = rest[open + 1..]
                .strip_suffix(')')
                .ok_or_else(|| error(text, "missing `)`"))?;
            let constant = if class.is_integer() {
                value
                    .parse::<i64>()
                    .map(Constant::Int)
                    .map_err(|_| error(text, "bad integer constant"))?
            } else {
                value
                    .parse::<f64>()
                    .map(Constant::Real)
                    .map_err(|_| error(text, "bad real constant"))?
            };
            return Ok(VariableType::Scalar(ScalarType::constant(class, constant)));
        }

        Ok(VariableType::scalar(parse_class(text, rest)?))
    }
}

fn parse_class(text: &str, name: &str) -> Result<NumericClass, TypeParseError> {
    NumericClass::from_name(name.trim()).ok_or_else(|| error(text, "unknown numeric class"))
}

fn parse_shape(text: &str, dims: &str) -> Result<Shape, TypeParseError> {
    if dims.trim() == "?" {
        return Ok(Shape::undefined());
    }
    let parsed = dims
        .split('x')
        .map(|d| match d.trim() {
            "?" => Ok(Dim::Unknown),
            n => n
                .parse::<u64>()
                .map(Dim::Known)
                .map_err(|_| error(text, "bad dimension")),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Shape::new(parsed))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(text: &str) {
        let ty: VariableType = text.parse().unwrap();
        assert_eq!(ty.to_string(), text);
    }

    #[test]
    fn display_round_trips() {
        round_trip("int32");
        round_trip("int32(3)");
        round_trip("double(2.5)");
        round_trip("double[1x3]");
        round_trip("dyn single[1x?]");
        round_trip("dyn int32[?]");
        round_trip("string(\"abc\")");
        round_trip("void");
    }

    #[test]
    fn parsed_values() {
        let t: VariableType = "int32[1x3]".parse().unwrap();
        assert_eq!(t, VariableType::Matrix(MatrixType::fixed(NumericClass::Int32, &[1, 3])));
        let t: VariableType = "double(4)".parse().unwrap();
        assert_eq!(t.constant(), Some(Constant::Real(4.0)));
    }

    #[test]
    fn rejects_bad_types() {
        assert!("quad".parse::<VariableType>().is_err());
        assert!("double[1x?]".parse::<VariableType>().is_err());
        assert!("dyn double".parse::<VariableType>().is_err());
        assert!("int8(1.5)".parse::<VariableType>().is_err());
    }
}
