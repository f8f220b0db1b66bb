// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! C operator precedence, used to place parentheses in emitted expressions.

/// C precedence levels, tightest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PrecedenceLevel {
    /// Identifiers, literals, parenthesized expressions.
    Atom,
    /// Calls, array subscripts, member access.
    Postfix,
    /// Unary operators and casts.
    Prefix,
    Multiplicative,
    Additive,
    Shift,
    Relational,
    Equality,
    BitAnd,
    BitXor,
    BitOr,
    LogicalAnd,
    LogicalOr,
    Conditional,
    Assignment,
    Comma,
    /// Unknown: always parenthesize when nested.
    Unspecified,
}

/// A C expression together with the precedence of its outermost operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CExpr {
    pub code: String,
    pub precedence: PrecedenceLevel,
}

impl CExpr {
    pub fn new(code: impl Into<String>, precedence: PrecedenceLevel) -> Self {
        Self {
            code: code.into(),
            precedence,
        }
    }

    pub fn atom(code: impl Into<String>) -> Self {
        Self::new(code, PrecedenceLevel::Atom)
    }

    /// Code for use as the left operand of an operator at `parent` level.
    /// C binary operators are left-associative, so equal levels need no parentheses.
    pub fn left_of(&self, parent: PrecedenceLevel) -> String {
        if self.precedence == PrecedenceLevel::Unspecified || self.precedence > parent {
            format!("({})", self.code)
        } else {
            self.code.clone()
        }
    }

    /// Code for use as the right operand of an operator at `parent` level.
    pub fn right_of(&self, parent: PrecedenceLevel) -> String {
        if self.precedence == PrecedenceLevel::Unspecified || self.precedence >= parent {
            format!("({})", self.code)
        } else {
            self.code.clone()
        }
    }

    /// Code for use as the operand of a prefix operator or cast.
    pub fn operand_of_prefix(&self) -> String {
        if self.precedence <= PrecedenceLevel::Prefix {
            self.code.clone()
        } else {
            format!("({})", self.code)
        }
    }

    /// Code safe to place anywhere a primary expression is expected.
    pub fn as_primary(&self) -> String {
        if self.precedence <= PrecedenceLevel::Postfix {
            self.code.clone()
        } else {
            format!("({})", self.code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn left_associative_operands() {
        let sum = CExpr::new("a + b", PrecedenceLevel::Additive);
        assert_eq!(sum.left_of(PrecedenceLevel::Additive), "a + b");
        assert_eq!(sum.right_of(PrecedenceLevel::Additive), "(a + b)");
        assert_eq!(sum.left_of(PrecedenceLevel::Multiplicative), "(a + b)");
    }

    #[test]
    fn tighter_operands_are_bare() {
        let prod = CExpr::new("a * b", PrecedenceLevel::Multiplicative);
        assert_eq!(prod.right_of(PrecedenceLevel::Additive), "a * b");
        assert_eq!(CExpr::atom("x").right_of(PrecedenceLevel::Multiplicative), "x");
    }

    #[test]
    fn unspecified_always_wrapped() {
        let e = CExpr::new("f() ? 1 : 2", PrecedenceLevel::Unspecified);
        assert_eq!(e.left_of(PrecedenceLevel::Comma), "(f() ? 1 : 2)");
        assert_eq!(e.as_primary(), "(f() ? 1 : 2)");
    }

    #[test]
    fn prefix_operands() {
        assert_eq!(CExpr::atom("x").operand_of_prefix(), "x");
        assert_eq!(
            CExpr::new("x - 1", PrecedenceLevel::Additive).operand_of_prefix(),
            "(x - 1)"
        );
    }
}
