// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Human-readable type rendering. The format round-trips through `FromStr`.

use std::fmt;

use crate::numeric::NumericClass;
use crate::ty::{MatrixType, ScalarType, Storage, VariableType};

impl fmt::Display for NumericClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.matlab_name())
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.constant {
            Some(c) => write!(f, "{}({})", self.class, c),
            None => write!(f, "{}", self.class),
        }
    }
}

impl fmt::Display for MatrixType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.storage {
            Storage::Static => write!(f, "{}[{}]", self.element, self.shape),
            Storage::Dynamic => write!(f, "dyn {}[{}]", self.element, self.shape),
        }
    }
}

impl fmt::Display for VariableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariableType::Scalar(s) => write!(f, "{}", s),
            VariableType::Matrix(m) => write!(f, "{}", m),
            VariableType::String(s) => write!(f, "string({:?})", s.value),
            VariableType::Void => write!(f, "void"),
        }
    }
}
