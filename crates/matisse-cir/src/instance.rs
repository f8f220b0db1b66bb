// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Function instances: concrete C realizations of one operation at one signature.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::sync::Arc;

use crate::ctype;
use crate::function_type::FunctionType;
use crate::precedence::{CExpr, PrecedenceLevel};

/// Identity of an instance: the generic operation plus its signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceKey {
    pub operation: String,
    pub signature: FunctionType,
}

impl InstanceKey {
    pub fn new(operation: impl Into<String>, signature: FunctionType) -> Self {
        Self {
            operation: operation.into(),
            signature,
        }
    }
}

/// Shape of an inline instance's expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InlineForm {
    /// `a op b`.
    Binary { op: String, level: PrecedenceLevel },
    /// `op a`.
    Prefix { op: String },
    /// `(T)a`.
    Cast { c_type: String },
    /// `name(args)` for an external C function such as `sqrt`.
    Call { c_name: String },
    /// Fixed code; arguments are not evaluated. Used for folded constants.
    Constant { code: String },
    /// Code with `$0`, `$1`, ... placeholders replaced by the arguments.
    Template { template: String, level: PrecedenceLevel },
    /// The first argument, unchanged.
    Identity,
}

/// How a standalone instance receives one input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgMode {
    Value,
    /// The instance updates the argument in place.
    Reference,
}

#[derive(Debug, Clone)]
pub struct InlineInstance {
    pub key: InstanceKey,
    pub form: InlineForm,
    pub includes: BTreeSet<String>,
    pub dependencies: Vec<Arc<FunctionInstance>>,
}

#[derive(Debug, Clone)]
pub struct StandaloneInstance {
    pub key: InstanceKey,
    pub c_name: String,
    pub input_modes: Vec<ArgMode>,
    /// Prototype without the trailing semicolon.
    pub prototype: String,
    /// Full definition, prototype included.
    pub implementation: String,
    pub includes: BTreeSet<String>,
    pub dependencies: Vec<Arc<FunctionInstance>>,
}

/// Code emitted once ahead of all functions, such as a struct typedef.
#[derive(Debug, Clone)]
pub struct DefinitionInstance {
    pub key: InstanceKey,
    pub code: String,
    pub includes: BTreeSet<String>,
    pub dependencies: Vec<Arc<FunctionInstance>>,
}

#[derive(Debug, Clone)]
pub enum FunctionInstance {
    Inline(InlineInstance),
    Standalone(StandaloneInstance),
    Definition(DefinitionInstance),
}

impl FunctionInstance {
    pub fn inline(key: InstanceKey, form: InlineForm) -> Self {
        let includes = signature_includes(&key.signature);
        FunctionInstance::Inline(InlineInstance {
            key,
            form,
            includes,
            dependencies: Vec::new(),
        })
    }

    /// Starts a standalone C function named `c_name`.
    pub fn standalone(key: InstanceKey, c_name: impl Into<String>) -> StandaloneBuilder {
        let inputs = key.signature.inputs.len();
        let outputs = key.signature.outputs.len();
        StandaloneBuilder {
            c_name: c_name.into(),
            input_names: (1..=inputs).map(|i| format!("in{}", i)).collect(),
            output_names: (1..=outputs).map(|i| format!("out{}", i)).collect(),
            input_modes: vec![ArgMode::Value; inputs],
            raw_parameters: None,
            key,
            lines: Vec::new(),
            includes: BTreeSet::new(),
            dependencies: Vec::new(),
        }
    }

    /// A definition keyed by `name` alone.
    pub fn definition(name: impl Into<String>, code: impl Into<String>) -> Self {
        FunctionInstance::Definition(DefinitionInstance {
            key: InstanceKey::new(name, FunctionType::new(Vec::new(), Vec::new())),
            code: code.into(),
            includes: BTreeSet::new(),
            dependencies: Vec::new(),
        })
    }

    pub fn with_include(mut self, header: &str) -> Self {
        let includes = match &mut self {
            FunctionInstance::Inline(i) => &mut i.includes,
            FunctionInstance::Standalone(s) => &mut s.includes,
            FunctionInstance::Definition(d) => &mut d.includes,
        };
        includes.insert(header.to_string());
        self
    }

    pub fn with_dependency(mut self, dep: Arc<FunctionInstance>) -> Self {
        match &mut self {
            FunctionInstance::Inline(i) => i.dependencies.push(dep),
            FunctionInstance::Standalone(s) => s.dependencies.push(dep),
            FunctionInstance::Definition(d) => d.dependencies.push(dep),
        }
        self
    }

    pub fn key(&self) -> &InstanceKey {
        match self {
            FunctionInstance::Inline(i) => &i.key,
            FunctionInstance::Standalone(s) => &s.key,
            FunctionInstance::Definition(d) => &d.key,
        }
    }

    pub fn function_type(&self) -> &FunctionType {
        &self.key().signature
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, FunctionInstance::Inline(_))
    }

    pub fn c_name(&self) -> Option<&str> {
        match self {
            FunctionInstance::Standalone(s) => Some(&s.c_name),
            FunctionInstance::Inline(_) | FunctionInstance::Definition(_) => None,
        }
    }

    pub fn includes(&self) -> &BTreeSet<String> {
        match self {
            FunctionInstance::Inline(i) => &i.includes,
            FunctionInstance::Standalone(s) => &s.includes,
            FunctionInstance::Definition(d) => &d.includes,
        }
    }

    pub fn dependencies(&self) -> &[Arc<FunctionInstance>] {
        match self {
            FunctionInstance::Inline(i) => &i.dependencies,
            FunctionInstance::Standalone(s) => &s.dependencies,
            FunctionInstance::Definition(d) => &d.dependencies,
        }
    }

    /// `prototype;` for standalone instances, the code itself for definitions.
    pub fn declaration_code(&self) -> Option<String> {
        match self {
            FunctionInstance::Inline(_) => None,
            FunctionInstance::Standalone(s) => Some(format!("{};", s.prototype)),
            FunctionInstance::Definition(d) => Some(d.code.clone()),
        }
    }

    pub fn implementation_code(&self) -> Option<&str> {
        match self {
            FunctionInstance::Standalone(s) => Some(&s.implementation),
            FunctionInstance::Inline(_) | FunctionInstance::Definition(_) => None,
        }
    }

    /// The call as an expression. `None` when outputs are written through
    /// reference parameters.
    pub fn call_expr(&self, args: &[CExpr]) -> Option<CExpr> {
        match self {
            FunctionInstance::Definition(_) => None,
            FunctionInstance::Inline(i) => Some(inline_expr(&i.form, args)),
            FunctionInstance::Standalone(s) => {
                let ft = &s.key.signature;
                if !ft.returns_by_value() && !ft.outputs.is_empty() {
                    return None;
                }
                Some(CExpr::new(
                    format!("{}({})", s.c_name, standalone_args(s, args).join(", ")),
                    PrecedenceLevel::Postfix,
                ))
            }
        }
    }

    /// The call as a statement storing into `outputs`.
    pub fn call_statement(&self, args: &[CExpr], outputs: &[CExpr]) -> String {
        if let Some(expr) = self.call_expr(args) {
            return match outputs.first() {
                Some(out) if !self.function_type().outputs.is_empty() => {
                    format!("{} = {};", out.code, expr.code)
                }
                _ => format!("{};", expr.code),
            };
        }
        let FunctionInstance::Standalone(s) = self else {
            return String::new();
        };
        let mut all = standalone_args(s, args);
        for (ty, out) in s.key.signature.outputs.iter().zip(outputs) {
            all.push(ctype::reference_to(ty, &out.code));
        }
        format!("{}({});", s.c_name, all.join(", "))
    }
}

fn signature_includes(ft: &FunctionType) -> BTreeSet<String> {
    let mut includes = BTreeSet::new();
    for ty in ft.inputs.iter().chain(&ft.outputs) {
        includes.extend(ctype::includes(ty));
    }
    includes
}

fn call_arg(arg: &CExpr) -> String {
    if arg.precedence >= PrecedenceLevel::Comma {
        format!("({})", arg.code)
    } else {
        arg.code.clone()
    }
}

fn standalone_args(s: &StandaloneInstance, args: &[CExpr]) -> Vec<String> {
    args.iter()
        .enumerate()
        .map(|(i, arg)| match (s.input_modes.get(i), s.key.signature.inputs.get(i)) {
            (Some(ArgMode::Reference), Some(ty)) => ctype::reference_to(ty, &arg.as_primary()),
            _ => call_arg(arg),
        })
        .collect()
}

fn inline_expr(form: &InlineForm, args: &[CExpr]) -> CExpr {
    match form {
        InlineForm::Binary { op, level } => {
            let (Some(a), Some(b)) = (args.first(), args.get(1)) else {
                return CExpr::new(op.clone(), PrecedenceLevel::Unspecified);
            };
            CExpr::new(
                format!("{} {} {}", a.left_of(*level), op, b.right_of(*level)),
                *level,
            )
        }
        InlineForm::Prefix { op } => {
            let operand = args.first().map(|a| a.operand_of_prefix()).unwrap_or_default();
            CExpr::new(format!("{}{}", op, operand), PrecedenceLevel::Prefix)
        }
        InlineForm::Cast { c_type } => {
            let operand = args.first().map(|a| a.operand_of_prefix()).unwrap_or_default();
            CExpr::new(format!("({}){}", c_type, operand), PrecedenceLevel::Prefix)
        }
        InlineForm::Call { c_name } => {
            let args: Vec<String> = args.iter().map(call_arg).collect();
            CExpr::new(format!("{}({})", c_name, args.join(", ")), PrecedenceLevel::Postfix)
        }
        InlineForm::Constant { code } => {
            let level = if code.starts_with('-') {
                PrecedenceLevel::Prefix
            } else {
                PrecedenceLevel::Atom
            };
            CExpr::new(code.clone(), level)
        }
        InlineForm::Template { template, level } => {
            CExpr::new(substitute(template, args), *level)
        }
        InlineForm::Identity => args
            .first()
            .cloned()
            .unwrap_or_else(|| CExpr::new("", PrecedenceLevel::Unspecified)),
    }
}

fn substitute(template: &str, args: &[CExpr]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        let mut digits = String::new();
        while let Some(d) = chars.peek().filter(|d| d.is_ascii_digit()) {
            digits.push(*d);
            chars.next();
        }
        match digits.parse::<usize>().ok().and_then(|i| args.get(i)) {
            Some(arg) => out.push_str(&arg.as_primary()),
            None => {
                out.push('$');
                out.push_str(&digits);
            }
        }
    }
    out
}

/// Builder for standalone instances.
pub struct StandaloneBuilder {
    key: InstanceKey,
    c_name: String,
    input_names: Vec<String>,
    output_names: Vec<String>,
    input_modes: Vec<ArgMode>,
    raw_parameters: Option<String>,
    lines: Vec<String>,
    includes: BTreeSet<String>,
    dependencies: Vec<Arc<FunctionInstance>>,
}

impl StandaloneBuilder {
    pub fn input_names(mut self, names: &[&str]) -> Self {
        for (slot, name) in self.input_names.iter_mut().zip(names) {
            *slot = name.to_string();
        }
        self
    }

    pub fn output_names(mut self, names: &[&str]) -> Self {
        for (slot, name) in self.output_names.iter_mut().zip(names) {
            *slot = name.to_string();
        }
        self
    }

    /// Marks input `index` as updated in place.
    pub fn by_reference(mut self, index: usize) -> Self {
        if let Some(mode) = self.input_modes.get_mut(index) {
            *mode = ArgMode::Reference;
        }
        self
    }

    /// Replaces the generated parameter list, for runtime helpers whose
    /// parameters are not variable types.
    pub fn raw_parameters(mut self, params: impl Into<String>) -> Self {
        self.raw_parameters = Some(params.into());
        self
    }

    pub fn line(mut self, line: impl Into<String>) -> Self {
        self.lines.push(line.into());
        self
    }

    pub fn lines<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lines.extend(lines.into_iter().map(Into::into));
        self
    }

    pub fn include(mut self, header: &str) -> Self {
        self.includes.insert(header.to_string());
        self
    }

    pub fn depends_on(mut self, dep: Arc<FunctionInstance>) -> Self {
        self.dependencies.push(dep);
        self
    }

    pub fn build(self) -> FunctionInstance {
        let ft = &self.key.signature;
        let mut params: Vec<String> = ft
            .inputs
            .iter()
            .zip(&self.input_names)
            .zip(&self.input_modes)
            .map(|((ty, name), mode)| match mode {
                ArgMode::Value => ctype::declaration(ty, name),
                ArgMode::Reference => ctype::output_parameter(ty, name),
            })
            .collect();
        if !ft.returns_by_value() {
            params.extend(
                ft.outputs
                    .iter()
                    .zip(&self.output_names)
                    .map(|(ty, name)| ctype::output_parameter(ty, name)),
            );
        }
        let params = match self.raw_parameters {
            Some(raw) => raw,
            None if params.is_empty() => "void".to_string(),
            None => params.join(", "),
        };
        let prototype = format!("{} {}({})", ft.c_return_type(), self.c_name, params);

        let mut implementation = format!("{}\n{{\n", prototype);
        let mut depth = 1usize;
        for line in &self.lines {
            let trimmed = line.trim();
            if trimmed.starts_with('}') {
                depth = depth.saturating_sub(1);
            }
            if trimmed.is_empty() {
                implementation.push('\n');
            } else {
                let _ = writeln!(implementation, "{}{}", "   ".repeat(depth), trimmed);
            }
            if trimmed.ends_with('{') {
                depth += 1;
            }
        }
        implementation.push_str("}\n");

        let mut includes = signature_includes(ft);
        includes.extend(self.includes);
        FunctionInstance::Standalone(StandaloneInstance {
            key: self.key,
            c_name: self.c_name,
            input_modes: self.input_modes,
            prototype,
            implementation,
            includes,
            dependencies: self.dependencies,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matisse_types::{MatrixType, NumericClass, VariableType};

    fn double() -> VariableType {
        VariableType::scalar(NumericClass::Double)
    }

    fn key(name: &str, inputs: Vec<VariableType>, outputs: Vec<VariableType>) -> InstanceKey {
        InstanceKey::new(name, FunctionType::new(inputs, outputs))
    }

    #[test]
    fn binary_respects_precedence() {
        let inst = FunctionInstance::inline(
            key("times", vec![double(), double()], vec![double()]),
            InlineForm::Binary {
                op: "*".to_string(),
                level: PrecedenceLevel::Multiplicative,
            },
        );
        let sum = CExpr::new("a + b", PrecedenceLevel::Additive);
        let expr = inst.call_expr(&[sum, CExpr::atom("c")]).unwrap();
        assert_eq!(expr.code, "(a + b) * c");
        assert_eq!(
            inst.call_statement(&[CExpr::atom("x"), CExpr::atom("y")], &[CExpr::atom("z")]),
            "z = x * y;"
        );
    }

    #[test]
    fn template_substitution() {
        let inst = FunctionInstance::inline(
            key("simple_get", vec![double(), double()], vec![double()]),
            InlineForm::Template {
                template: "$0[$1 - 1]".to_string(),
                level: PrecedenceLevel::Postfix,
            },
        );
        let expr = inst
            .call_expr(&[CExpr::atom("A"), CExpr::new("i + 1", PrecedenceLevel::Additive)])
            .unwrap();
        assert_eq!(expr.code, "A[(i + 1) - 1]");
    }

    #[test]
    fn standalone_by_reference_outputs() {
        let m = VariableType::Matrix(MatrixType::fixed(NumericClass::Double, &[1, 3]));
        let inst = FunctionInstance::standalone(key("f", vec![double()], vec![m, double()]), "f_d")
            .line("out1[0] = in1;")
            .line("*out2 = in1;")
            .build();
        assert!(inst.call_expr(&[CExpr::atom("x")]).is_none());
        assert_eq!(
            inst.call_statement(&[CExpr::atom("x")], &[CExpr::atom("A"), CExpr::atom("s")]),
            "f_d(x, A, &s);"
        );
        assert_eq!(
            inst.declaration_code().unwrap(),
            "void f_d(double in1, double out1[3], double* out2);"
        );
        assert!(inst.implementation_code().unwrap().contains("   out1[0] = in1;"));
    }

    #[test]
    fn in_place_input() {
        let m = VariableType::Matrix(MatrixType::dynamic(
            NumericClass::Double,
            matisse_types::Shape::unknown(2),
        ));
        let inst = FunctionInstance::standalone(key("grow", vec![m, double()], vec![]), "grow_d")
            .by_reference(0)
            .build();
        assert_eq!(
            inst.declaration_code().unwrap(),
            "void grow_d(tensor_d** in1, double in2);"
        );
        assert_eq!(
            inst.call_statement(&[CExpr::atom("A"), CExpr::atom("v")], &[]),
            "grow_d(&A, v);"
        );
        assert!(inst.includes().contains("stdlib.h"));
    }

    #[test]
    fn nested_blocks_indented() {
        let inst = FunctionInstance::standalone(key("loop", vec![], vec![]), "loop_fn")
            .line("for (int i = 0; i < 3; ++i) {")
            .line("g(i);")
            .line("}")
            .build();
        assert_eq!(
            inst.implementation_code().unwrap(),
            "void loop_fn(void)\n{\n   for (int i = 0; i < 3; ++i) {\n      g(i);\n   }\n}\n"
        );
    }
}
