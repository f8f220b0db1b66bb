// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Signatures of function instances.

use std::fmt;

use matisse_types::VariableType;

use crate::ctype;
use crate::error::format_types;

/// Inputs, outputs and calling convention of one instance.
///
/// A lone scalar or string output is returned by value; any other output
/// list is written through reference parameters placed after the inputs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionType {
    pub inputs: Vec<VariableType>,
    pub outputs: Vec<VariableType>,
    /// Observable effects beyond the outputs, such as I/O.
    pub side_effects: bool,
    /// The body checks its inputs at run time and may abort, so a call
    /// must run exactly where the source puts it.
    pub validation_effects: bool,
}

impl fmt::Display for FunctionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}) -> ({})",
            format_types(&self.inputs),
            format_types(&self.outputs)
        )
    }
}

impl FunctionType {
    pub fn new(inputs: Vec<VariableType>, outputs: Vec<VariableType>) -> Self {
        Self {
            inputs,
            outputs,
            side_effects: false,
            validation_effects: false,
        }
    }

    pub fn with_side_effects(mut self) -> Self {
        self.side_effects = true;
        self
    }

    pub fn with_validation_effects(mut self) -> Self {
        self.validation_effects = true;
        self
    }

    /// Whether the single output is the C return value.
    pub fn returns_by_value(&self) -> bool {
        matches!(
            self.outputs.as_slice(),
            [VariableType::Scalar(_)] | [VariableType::String(_)]
        )
    }

    pub fn c_return_type(&self) -> String {
        if self.returns_by_value() {
            ctype::c_type(&self.outputs[0])
        } else {
            "void".to_string()
        }
    }

    /// C parameter list, inputs first, then reference outputs.
    pub fn c_parameters(&self, input_names: &[String], output_names: &[String]) -> String {
        let mut params: Vec<String> = self
            .inputs
            .iter()
            .zip(input_names)
            .map(|(ty, name)| ctype::declaration(ty, name))
            .collect();
        if !self.returns_by_value() {
            params.extend(
                self.outputs
                    .iter()
                    .zip(output_names)
                    .map(|(ty, name)| ctype::output_parameter(ty, name)),
            );
        }
        if params.is_empty() {
            "void".to_string()
        } else {
            params.join(", ")
        }
    }

    /// `ret name(params)` without the trailing semicolon.
    pub fn c_prototype(&self, name: &str, input_names: &[String], output_names: &[String]) -> String {
        format!(
            "{} {}({})",
            self.c_return_type(),
            name,
            self.c_parameters(input_names, output_names)
        )
    }
}
