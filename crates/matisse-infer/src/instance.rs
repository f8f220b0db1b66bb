// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Typed instances: one function body specialized for concrete argument types.

use std::fmt;

use indexmap::IndexMap;
use matisse_cir::{ctype, FunctionType, InstanceKey};
use matisse_ssa::FunctionBody;
use matisse_types::VariableType;

/// A user function, by the file that defines it and its name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionIdentification {
    pub file: String,
    pub name: String,
}

impl FunctionIdentification {
    pub fn new(file: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for FunctionIdentification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.name)
    }
}

/// Cache key of a typed instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypedKey {
    pub function: FunctionIdentification,
    pub args: Vec<VariableType>,
    pub nargout: usize,
}

/// A function body with one type per SSA name.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedInstance {
    pub key: TypedKey,
    pub body: FunctionBody,
    pub types: IndexMap<String, VariableType>,
    /// C-level signature: argument types in, the first `nargout` outputs out.
    pub function_type: FunctionType,
    /// Specializations of user functions this instance calls.
    pub callees: Vec<TypedKey>,
}

impl TypedInstance {
    pub fn name(&self) -> &str {
        &self.key.function.name
    }

    pub fn type_of(&self, name: &str) -> Option<&VariableType> {
        self.types.get(name)
    }

    /// Specialization called by a typed call to `function` with `inputs`.
    pub fn callee(&self, function: &str, inputs: &[VariableType]) -> Option<&TypedKey> {
        self.callees
            .iter()
            .find(|k| k.function.name == function && k.args == inputs)
    }

    /// Key of the C function built for this instance. Functions are told
    /// apart by file as well as name.
    pub fn instance_key(&self) -> InstanceKey {
        InstanceKey::new(self.key.function.to_string(), self.function_type.clone())
    }

    /// Function name plus mangled argument types. Distinct specializations
    /// can share it; the compiler disambiguates.
    pub fn base_c_name(&self) -> String {
        let mut name = self.name().to_string();
        for ty in &self.function_type.inputs {
            name.push('_');
            name.push_str(&ctype::mangle(ty));
        }
        name
    }
}
