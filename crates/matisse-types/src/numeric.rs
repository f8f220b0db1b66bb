// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Numeric classes and compile-time constants.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// MATLAB numeric class of a scalar or matrix element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumericClass {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Single,
    Double,
    Logical,
    Char,
}

const ALL_CLASSES: [NumericClass; 12] = [
    NumericClass::Int8,
    NumericClass::Int16,
    NumericClass::Int32,
    NumericClass::Int64,
    NumericClass::UInt8,
    NumericClass::UInt16,
    NumericClass::UInt32,
    NumericClass::UInt64,
    NumericClass::Single,
    NumericClass::Double,
    NumericClass::Logical,
    NumericClass::Char,
];

impl NumericClass {
    pub fn all() -> &'static [NumericClass] {
        &ALL_CLASSES
    }

    pub fn bits(self) -> u8 {
        match self {
            NumericClass::Int8 | NumericClass::UInt8 | NumericClass::Char => 8,
            NumericClass::Int16 | NumericClass::UInt16 => 16,
            NumericClass::Int32 | NumericClass::UInt32 | NumericClass::Single => 32,
            NumericClass::Int64 | NumericClass::UInt64 | NumericClass::Double => 64,
            NumericClass::Logical => 1,
        }
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            NumericClass::Int8
                | NumericClass::Int16
                | NumericClass::Int32
                | NumericClass::Int64
                | NumericClass::Single
                | NumericClass::Double
        )
    }

    pub fn is_floating(self) -> bool {
        matches!(self, NumericClass::Single | NumericClass::Double)
    }

    pub fn is_integer(self) -> bool {
        !self.is_floating()
    }

    /// Name used by MATLAB for the class, which is also the name of its cast function.
    pub fn matlab_name(self) -> &'static str {
        match self {
            NumericClass::Int8 => "int8",
            NumericClass::Int16 => "int16",
            NumericClass::Int32 => "int32",
            NumericClass::Int64 => "int64",
            NumericClass::UInt8 => "uint8",
            NumericClass::UInt16 => "uint16",
            NumericClass::UInt32 => "uint32",
            NumericClass::UInt64 => "uint64",
            NumericClass::Single => "single",
            NumericClass::Double => "double",
            NumericClass::Logical => "logical",
            NumericClass::Char => "char",
        }
    }

    pub fn from_name(name: &str) -> Option<NumericClass> {
        ALL_CLASSES.iter().copied().find(|c| c.matlab_name() == name)
    }

    /// Smallest and largest representable values.
    pub fn range(self) -> (f64, f64) {
        match self {
            NumericClass::Logical => (0.0, 1.0),
            NumericClass::Single => (-(f32::MAX as f64), f32::MAX as f64),
            NumericClass::Double => (f64::MIN, f64::MAX),
            c if c.is_signed() => {
                let half = 2f64.powi(c.bits() as i32 - 1);
                (-half, half - 1.0)
            }
            c => (0.0, 2f64.powi(c.bits() as i32) - 1.0),
        }
    }

    /// Mantissa bits available for exact integers.
    fn exact_integer_bits(self) -> u8 {
        match self {
            NumericClass::Single => 24,
            NumericClass::Double => 53,
            c => c.bits(),
        }
    }

    /// Whether every value of `self` is exactly representable in `other`.
    pub fn fits_into(self, other: NumericClass) -> bool {
        if self == other {
            return true;
        }
        if self == NumericClass::Logical {
            return true;
        }
        match (self.is_floating(), other.is_floating()) {
            (true, true) => self.bits() <= other.bits(),
            (true, false) => false,
            (false, true) => self.bits() <= other.exact_integer_bits(),
            (false, false) => match (self.is_signed(), other.is_signed()) {
                (false, true) => self.bits() < other.bits(),
                (true, false) => false,
                _ => self.bits() <= other.bits() && other != NumericClass::Logical,
            },
        }
    }

    /// Whether `value` is representable in this class without rounding or overflow.
    pub fn holds(self, value: f64) -> bool {
        let (lo, hi) = self.range();
        if value < lo || value > hi {
            return false;
        }
        self.is_floating() || value.fract() == 0.0
    }
}

/// A compile-time constant carried by a scalar type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Constant {
    Int(i64),
    Real(f64),
}

impl Constant {
    pub fn as_f64(self) -> f64 {
        match self {
            Constant::Int(v) => v as f64,
            Constant::Real(v) => v,
        }
    }

    /// Integral value, if the constant has one.
    pub fn as_i64(self) -> Option<i64> {
        match self {
            Constant::Int(v) => Some(v),
            Constant::Real(v) if v.fract() == 0.0 && v.abs() < 9.0e15 => Some(v as i64),
            Constant::Real(_) => None,
        }
    }

    pub fn is_truthy(self) -> bool {
        self.as_f64() != 0.0
    }

    /// Normalize a value computed in `f64` for storage in `class`.
    pub fn for_class(value: f64, class: NumericClass) -> Constant {
        if class.is_integer() && value.fract() == 0.0 {
            Constant::Int(value as i64)
        } else {
            Constant::Real(value)
        }
    }
}

impl PartialEq for Constant {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Constant::Int(a), Constant::Int(b)) => a == b,
            (Constant::Real(a), Constant::Real(b)) => a.to_bits() == b.to_bits(),
            _ => false,
        }
    }
}

impl Eq for Constant {}

impl Hash for Constant {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Constant::Int(v) => {
                0u8.hash(state);
                v.hash(state);
            }
            Constant::Real(v) => {
                1u8.hash(state);
                v.to_bits().hash(state);
            }
        }
    }
}

impl std::fmt::Display for Constant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Constant::Int(v) => write!(f, "{}", v),
            Constant::Real(v) if v.fract() == 0.0 && v.is_finite() => write!(f, "{:.1}", v),
            Constant::Real(v) => write!(f, "{}", v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for class in NumericClass::all() {
            assert_eq!(NumericClass::from_name(class.matlab_name()), Some(*class));
        }
        assert_eq!(NumericClass::from_name("cell"), None);
    }

    #[test]
    fn fitting() {
        use NumericClass::*;
        assert!(Int8.fits_into(Int16));
        assert!(UInt8.fits_into(Int16));
        assert!(!UInt16.fits_into(Int16));
        assert!(!Int8.fits_into(UInt64));
        assert!(Int32.fits_into(Double));
        assert!(!Int64.fits_into(Double));
        assert!(Int16.fits_into(Single));
        assert!(!Int32.fits_into(Single));
        assert!(Single.fits_into(Double));
        assert!(!Double.fits_into(Single));
        assert!(!Double.fits_into(Int64));
        assert!(Logical.fits_into(UInt8));
        assert!(!Int8.fits_into(Logical));
    }

    #[test]
    fn holds_values() {
        assert!(NumericClass::Int8.holds(-128.0));
        assert!(!NumericClass::Int8.holds(128.0));
        assert!(!NumericClass::Int32.holds(1.5));
        assert!(NumericClass::Double.holds(1.5));
        assert!(!NumericClass::UInt8.holds(-1.0));
    }

    #[test]
    fn constants_compare_bitwise() {
        assert_eq!(Constant::Real(0.5), Constant::Real(0.5));
        assert_ne!(Constant::Real(0.0), Constant::Real(-0.0));
        assert_ne!(Constant::Int(1), Constant::Real(1.0));
        assert_eq!(Constant::Real(3.0).as_i64(), Some(3));
        assert_eq!(Constant::Real(3.5).as_i64(), None);
        assert_eq!(Constant::for_class(4.0, NumericClass::Int32), Constant::Int(4));
        assert_eq!(Constant::for_class(4.0, NumericClass::Double), Constant::Real(4.0));
    }
}
