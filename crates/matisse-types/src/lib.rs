// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Variable types for the MATLAB-to-C pipeline.
//!
//! A `VariableType` is an immutable value: scalar, matrix, string or void.
//! Mutators return new values. Capabilities (combination at merge points,
//! conversion checks, C emission) are free functions matching on the variant.

pub mod combine;
pub mod conversion;
mod display;
pub mod factory;
pub mod numeric;
mod parse;
pub mod shape;
mod ty;

pub use combine::{combine_types, combine_scalars};
pub use conversion::{classify_conversion, Conversion};
pub use factory::{LiteralError, NumericFactory};
pub use numeric::{Constant, NumericClass};
pub use parse::TypeParseError;
pub use shape::{Dim, Shape};
pub use ty::{MatrixType, ScalarType, Storage, StringType, VariableType};
