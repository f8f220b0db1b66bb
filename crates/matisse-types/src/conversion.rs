// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Conversion capability: can a value of one type stand in for another?

use crate::ty::VariableType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    /// Same C type.
    Identity,
    /// Every value survives the conversion.
    Widening,
    /// Some values are rounded or clipped.
    Narrowing,
    Incompatible,
}

impl Conversion {
    pub fn is_lossless(self) -> bool {
        matches!(self, Conversion::Identity | Conversion::Widening)
    }
}

pub fn classify_conversion(from: &VariableType, to: &VariableType) -> Conversion {
    match (from, to) {
        (VariableType::Scalar(a), VariableType::Scalar(b)) => {
            if a.class == b.class {
                return Conversion::Identity;
            }
            if a.class.fits_into(b.class) {
                return Conversion::Widening;
            }
            match a.constant {
                Some(c) if b.class.holds(c.as_f64()) => Conversion::Widening,
                _ => Conversion::Narrowing,
            }
        }
        (VariableType::Matrix(a), VariableType::Matrix(b)) => {
            let shapes_agree = a.shape == b.shape
                || b.shape.is_undefined()
                || (!b.is_static() && a.shape.ndims() == b.shape.ndims());
            if !shapes_agree {
                return Conversion::Incompatible;
            }
            if a.element == b.element {
                if a.storage == b.storage && a.shape == b.shape {
                    Conversion::Identity
                } else {
                    Conversion::Widening
                }
            } else if a.element.fits_into(b.element) {
                Conversion::Widening
            } else {
                Conversion::Narrowing
            }
        }
        (VariableType::String(a), VariableType::String(b)) if a == b => Conversion::Identity,
        (VariableType::Void, VariableType::Void) => Conversion::Identity,
        _ => Conversion::Incompatible,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numeric::NumericClass;
    use crate::shape::Shape;
    use crate::ty::MatrixType;

    #[test]
    fn scalar_conversions() {
        let i8 = VariableType::scalar(NumericClass::Int8);
        let i32 = VariableType::scalar(NumericClass::Int32);
        let d = VariableType::scalar(NumericClass::Double);
        assert_eq!(classify_conversion(&i32, &i32), Conversion::Identity);
        assert_eq!(classify_conversion(&i8, &i32), Conversion::Widening);
        assert_eq!(classify_conversion(&d, &i32), Conversion::Narrowing);
        assert!(!classify_conversion(&d, &i8).is_lossless());
    }

    #[test]
    fn constant_that_fits_is_widening() {
        let c = VariableType::real_constant(NumericClass::Double, 7.0);
        let u8 = VariableType::scalar(NumericClass::UInt8);
        assert_eq!(classify_conversion(&c, &u8), Conversion::Widening);
        let c = VariableType::real_constant(NumericClass::Double, 7.5);
        assert_eq!(classify_conversion(&c, &u8), Conversion::Narrowing);
    }

    #[test]
    fn matrix_conversions() {
        let s = VariableType::Matrix(MatrixType::fixed(NumericClass::Int32, &[1, 3]));
        let d = VariableType::Matrix(MatrixType::dynamic(NumericClass::Double, Shape::unknown(2)));
        let other = VariableType::Matrix(MatrixType::fixed(NumericClass::Int32, &[3, 1]));
        assert_eq!(classify_conversion(&s, &d), Conversion::Widening);
        assert_eq!(classify_conversion(&s, &other), Conversion::Incompatible);
        assert_eq!(classify_conversion(&s, &VariableType::Void), Conversion::Incompatible);
    }
}
