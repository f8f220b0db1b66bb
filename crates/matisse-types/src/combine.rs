// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Least common supertype of values merged at a phi.
//!
//! Scalars widen: when one class fits into the other the wider one wins,
//! integer with floating gives the floating class. Differing constants are
//! dropped. Matrices combine element classes and shapes; the result stays
//! static only when both sides are static with equal shapes.

use crate::numeric::NumericClass;
use crate::shape::Shape;
use crate::ty::{MatrixType, ScalarType, Storage, VariableType};

/// Combine a list of types. `None` when some pair has no common type.
pub fn combine_types(types: &[VariableType]) -> Option<VariableType> {
    let (first, rest) = types.split_first()?;
    let mut candidate = first.clone();
    for ty in rest {
        candidate = combine_pair(&candidate, ty)?;
    }
    Some(candidate)
}

fn combine_pair(a: &VariableType, b: &VariableType) -> Option<VariableType> {
    match (a, b) {
        (VariableType::Scalar(x), VariableType::Scalar(y)) => {
            combine_scalars(x, y).map(VariableType::Scalar)
        }
        (VariableType::String(x), VariableType::String(y)) => {
            (x == y).then(|| VariableType::String(x.clone()))
        }
        (VariableType::Void, VariableType::Void) => Some(VariableType::Void),
        (VariableType::Matrix(x), VariableType::Matrix(y)) => {
            combine_matrices(x, y).map(VariableType::Matrix)
        }
        // a scalar is a 1x1 matrix
        (VariableType::Scalar(s), VariableType::Matrix(m))
        | (VariableType::Matrix(m), VariableType::Scalar(s)) => {
            let as_matrix = MatrixType::fixed(s.class, &[1, 1]);
            combine_matrices(&as_matrix, m).map(|c| VariableType::Matrix(c.to_dynamic()))
        }
        _ => None,
    }
}

pub fn combine_scalars(a: &ScalarType, b: &ScalarType) -> Option<ScalarType> {
    if a.class == b.class {
        if a.constant == b.constant {
            return Some(*a);
        }
        return Some(a.without_constant());
    }
    combine_classes(a.class, b.class).map(ScalarType::new)
}

fn combine_classes(a: NumericClass, b: NumericClass) -> Option<NumericClass> {
    if a.fits_into(b) {
        return Some(b);
    }
    if b.fits_into(a) {
        return Some(a);
    }
    match (a.is_floating(), b.is_floating()) {
        (false, true) => return Some(b),
        (true, false) => return Some(a),
        _ => {}
    }
    // mixed-sign integers: smallest signed class holding both
    let bits = a.bits().max(b.bits());
    [NumericClass::Int16, NumericClass::Int32, NumericClass::Int64]
        .into_iter()
        .find(|c| c.bits() > bits)
}

fn combine_matrices(a: &MatrixType, b: &MatrixType) -> Option<MatrixType> {
    let element = combine_classes(a.element, b.element)?;
    if a.storage == Storage::Static && b.storage == Storage::Static && a.shape == b.shape {
        return Some(MatrixType::fixed(element, &a.shape.known_dims()?));
    }
    let shape: Shape = a.shape.combine(&b.shape);
    Some(MatrixType::dynamic(element, shape))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numeric::Constant;
    use crate::shape::Dim;

    fn int(v: i64) -> VariableType {
        VariableType::int_constant(NumericClass::Int32, v)
    }

    #[test]
    fn same_constant_kept() {
        assert_eq!(combine_types(&[int(1), int(1)]), Some(int(1)));
    }

    #[test]
    fn different_constants_dropped() {
        assert_eq!(
            combine_types(&[int(1), int(2)]),
            Some(VariableType::scalar(NumericClass::Int32))
        );
    }

    #[test]
    fn integer_and_floating_gives_floating() {
        let r = combine_types(&[
            VariableType::scalar(NumericClass::Int64),
            VariableType::real_constant(NumericClass::Single, 0.5),
        ]);
        assert_eq!(r, Some(VariableType::scalar(NumericClass::Single)));
    }

    #[test]
    fn narrower_fits_into_wider() {
        let r = combine_types(&[
            VariableType::scalar(NumericClass::Int8),
            VariableType::scalar(NumericClass::Int32),
        ]);
        assert_eq!(r, Some(VariableType::scalar(NumericClass::Int32)));
        let r = combine_types(&[
            VariableType::scalar(NumericClass::Int32),
            VariableType::scalar(NumericClass::Double),
        ]);
        assert_eq!(r, Some(VariableType::scalar(NumericClass::Double)));
    }

    #[test]
    fn mixed_sign_integers() {
        let r = combine_scalars(
            &ScalarType::new(NumericClass::Int8),
            &ScalarType::new(NumericClass::UInt8),
        );
        assert_eq!(r.map(|s| s.class), Some(NumericClass::Int16));
        let r = combine_scalars(
            &ScalarType::new(NumericClass::Int64),
            &ScalarType::new(NumericClass::UInt64),
        );
        assert_eq!(r, None);
    }

    #[test]
    fn static_matrices_with_equal_shapes_stay_static() {
        let m = VariableType::Matrix(MatrixType::fixed(NumericClass::Double, &[1, 3]));
        assert_eq!(combine_types(&[m.clone(), m.clone()]), Some(m));
    }

    #[test]
    fn differing_matrices_become_dynamic() {
        let a = VariableType::Matrix(MatrixType::fixed(NumericClass::Int32, &[1, 3]));
        let b = VariableType::Matrix(MatrixType::fixed(NumericClass::Double, &[1, 4]));
        let r = combine_types(&[a, b]).unwrap();
        let m = r.as_matrix().unwrap();
        assert_eq!(m.storage, Storage::Dynamic);
        assert_eq!(m.element, NumericClass::Double);
        assert_eq!(m.shape, Shape::row(Dim::Unknown));
    }

    #[test]
    fn scalar_merges_with_matrix() {
        let s = VariableType::real_constant(NumericClass::Double, 0.0);
        let m = VariableType::Matrix(MatrixType::dynamic(NumericClass::Double, Shape::unknown(2)));
        let r = combine_types(&[s, m]).unwrap();
        assert!(r.is_matrix());
        assert_eq!(r.constant(), None::<Constant>);
    }

    #[test]
    fn incompatible_kinds() {
        assert_eq!(combine_types(&[int(1), VariableType::string("a")]), None);
        assert_eq!(combine_types(&[]), None);
    }
}
