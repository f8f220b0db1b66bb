// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Compiler settings.

use indexmap::IndexMap;
use matisse_types::{NumericClass, NumericFactory, VariableType};
use serde::{Deserialize, Serialize};

/// Settings shared by every stage of one compile.
///
/// Unset fields take their defaults, so a partial JSON object is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Class of non-integer literals.
    pub default_real: NumericClass,
    /// Class of integer literals, sizes and indices.
    pub index_class: NumericClass,
    /// Loop fixpoint iterations before phi types widen to unknown shapes.
    pub loop_widening_limit: usize,
    /// Optimization ids that must not run.
    pub disabled_optimizations: Vec<String>,
    /// Whether heap-allocated matrices may be emitted.
    pub allow_dynamic_matrices: bool,
    /// Declared types of source variables, by name.
    pub declared_types: IndexMap<String, VariableType>,
    /// Types of global variables, by name.
    pub global_types: IndexMap<String, VariableType>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_real: NumericClass::Double,
            index_class: NumericClass::Int32,
            loop_widening_limit: 4,
            disabled_optimizations: Vec::new(),
            allow_dynamic_matrices: true,
            declared_types: IndexMap::new(),
            global_types: IndexMap::new(),
        }
    }
}

impl Settings {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn numerics(&self) -> NumericFactory {
        NumericFactory::new(self.default_real, self.index_class)
    }

    pub fn is_disabled(&self, optimization: &str) -> bool {
        self.disabled_optimizations.iter().any(|o| o == optimization)
    }

    pub fn declared_type(&self, variable: &str) -> Option<&VariableType> {
        self.declared_types.get(variable)
    }

    pub fn with_declared_type(mut self, variable: impl Into<String>, ty: VariableType) -> Self {
        self.declared_types.insert(variable.into(), ty);
        self
    }

    pub fn with_disabled(mut self, optimization: impl Into<String>) -> Self {
        self.disabled_optimizations.push(optimization.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = Settings::default();
        assert_eq!(s.loop_widening_limit, 4);
        assert_eq!(s.numerics(), NumericFactory::default());
        assert!(!s.is_disabled("licm"));
    }

    #[test]
    fn partial_json() {
        let s = Settings::from_json(
            r#"{ "default_real": "single", "disabled_optimizations": ["licm"] }"#,
        )
        .unwrap();
        assert_eq!(s.default_real, NumericClass::Single);
        assert_eq!(s.index_class, NumericClass::Int32);
        assert!(s.is_disabled("licm"));
    }

    #[test]
    fn declared_types_from_json() {
        let s = Settings::from_json(
            r#"{ "declared_types": { "y": { "scalar": { "class": "int16" } } } }"#,
        )
        .unwrap();
        assert_eq!(
            s.declared_type("y"),
            Some(&VariableType::scalar(NumericClass::Int16))
        );
    }

    #[test]
    fn rejects_bad_json() {
        assert!(Settings::from_json("{ \"loop_widening_limit\": \"many\" }").is_err());
    }
}
