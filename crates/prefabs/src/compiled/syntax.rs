//! A small Python syntax tree for generated methods, and its printer.
//!
//! Only the node kinds synthesized methods need are modelled. Text taken
//! from the user's source travels as [`PyExpr::Raw`] and is printed verbatim.

use std::fmt::Write;

use crate::reflective::string_repr_into;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Is,
    IsNot,
    NotIn,
}

impl CmpOp {
    fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Is => "is",
            Self::IsNot => "is not",
            Self::NotIn => "not in",
        }
    }
}

/// A piece of an f-string.
#[derive(Debug, Clone, PartialEq)]
pub enum FPart {
    Text(String),
    /// `{expr!r}`
    Repr(PyExpr),
    /// `{expr}`
    Value(PyExpr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PyExpr {
    /// Source text, already safe to use as an operand.
    Raw(String),
    Name(String),
    Str(String),
    Bool(bool),
    None,
    Attr(Box<PyExpr>, String),
    Call {
        func: Box<PyExpr>,
        args: Vec<PyExpr>,
        keywords: Vec<(String, PyExpr)>,
    },
    Tuple(Vec<PyExpr>),
    List(Vec<PyExpr>),
    Set(Vec<PyExpr>),
    Dict(Vec<(PyExpr, PyExpr)>),
    IfElse {
        body: Box<PyExpr>,
        test: Box<PyExpr>,
        orelse: Box<PyExpr>,
    },
    Compare {
        left: Box<PyExpr>,
        op: CmpOp,
        right: Box<PyExpr>,
    },
    Or(Vec<PyExpr>),
    FString(Vec<FPart>),
}

impl PyExpr {
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    pub fn str(value: impl Into<String>) -> Self {
        Self::Str(value.into())
    }

    #[must_use]
    pub fn attr(self, name: impl Into<String>) -> Self {
        Self::Attr(Box::new(self), name.into())
    }

    /// `self.<field>`
    pub fn self_attr(field: &str) -> Self {
        Self::name("self").attr(field)
    }

    #[must_use]
    pub fn call(self, args: Vec<Self>) -> Self {
        Self::Call {
            func: Box::new(self),
            args,
            keywords: Vec::new(),
        }
    }

    #[must_use]
    pub fn call_kw(self, keywords: Vec<(String, Self)>) -> Self {
        Self::Call {
            func: Box::new(self),
            args: Vec::new(),
            keywords,
        }
    }

    #[must_use]
    pub fn compare(self, op: CmpOp, right: Self) -> Self {
        Self::Compare {
            left: Box::new(self),
            op,
            right: Box::new(right),
        }
    }

    #[must_use]
    pub fn if_else(self, test: Self, orelse: Self) -> Self {
        Self::IfElse {
            body: Box::new(self),
            test: Box::new(test),
            orelse: Box::new(orelse),
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Self::IfElse { .. } => 1,
            Self::Or(_) => 2,
            Self::Compare { .. } => 4,
            _ => 10,
        }
    }

    fn write_operand(&self, out: &mut String, min: u8) {
        if self.precedence() < min {
            out.push('(');
            self.write(out);
            out.push(')');
        } else {
            self.write(out);
        }
    }

    fn write_seq(items: &[Self], out: &mut String) {
        for (index, item) in items.iter().enumerate() {
            if index > 0 {
                out.push_str(", ");
            }
            item.write_operand(out, 1);
        }
    }

    pub fn write(&self, out: &mut String) {
        match self {
            Self::Raw(text) | Self::Name(text) => out.push_str(text),
            Self::Str(value) => string_repr_into(value, out),
            Self::Bool(true) => out.push_str("True"),
            Self::Bool(false) => out.push_str("False"),
            Self::None => out.push_str("None"),
            Self::Attr(value, name) => {
                value.write_operand(out, 10);
                out.push('.');
                out.push_str(name);
            }
            Self::Call { func, args, keywords } => {
                func.write_operand(out, 10);
                out.push('(');
                Self::write_seq(args, out);
                for (index, (name, value)) in keywords.iter().enumerate() {
                    if index > 0 || !args.is_empty() {
                        out.push_str(", ");
                    }
                    out.push_str(name);
                    out.push('=');
                    value.write_operand(out, 1);
                }
                out.push(')');
            }
            Self::Tuple(items) => {
                out.push('(');
                Self::write_seq(items, out);
                if items.len() == 1 {
                    out.push(',');
                }
                out.push(')');
            }
            Self::List(items) => {
                out.push('[');
                Self::write_seq(items, out);
                out.push(']');
            }
            Self::Set(items) => {
                out.push('{');
                Self::write_seq(items, out);
                out.push('}');
            }
            Self::Dict(items) => {
                out.push('{');
                for (index, (key, value)) in items.iter().enumerate() {
                    if index > 0 {
                        out.push_str(", ");
                    }
                    key.write_operand(out, 1);
                    out.push_str(": ");
                    value.write_operand(out, 1);
                }
                out.push('}');
            }
            Self::IfElse { body, test, orelse } => {
                body.write_operand(out, 2);
                out.push_str(" if ");
                test.write_operand(out, 2);
                out.push_str(" else ");
                orelse.write_operand(out, 1);
            }
            Self::Compare { left, op, right } => {
                left.write_operand(out, 5);
                let _ = write!(out, " {} ", op.as_str());
                right.write_operand(out, 5);
            }
            Self::Or(values) => {
                for (index, value) in values.iter().enumerate() {
                    if index > 0 {
                        out.push_str(" or ");
                    }
                    value.write_operand(out, 3);
                }
            }
            Self::FString(parts) => write_fstring(parts, out),
        }
    }

    #[must_use]
    pub fn to_source(&self) -> String {
        let mut out = String::new();
        self.write(&mut out);
        out
    }
}

fn write_fstring(parts: &[FPart], out: &mut String) {
    out.push_str("f'");
    for part in parts {
        match part {
            FPart::Text(text) => {
                for c in text.chars() {
                    match c {
                        '{' => out.push_str("{{"),
                        '}' => out.push_str("}}"),
                        '\'' => out.push_str("\\'"),
                        '\\' => out.push_str("\\\\"),
                        '\n' => out.push_str("\\n"),
                        c => out.push(c),
                    }
                }
            }
            FPart::Repr(expr) => {
                out.push('{');
                expr.write(out);
                out.push_str("!r}");
            }
            FPart::Value(expr) => {
                out.push('{');
                expr.write(out);
                out.push('}');
            }
        }
    }
    out.push('\'');
}

/// One parameter of a generated `def`.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub annotation: Option<String>,
    pub default: Option<PyExpr>,
}

impl Param {
    pub fn plain(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            annotation: None,
            default: None,
        }
    }

    fn write(&self, out: &mut String) {
        out.push_str(&self.name);
        match (&self.annotation, &self.default) {
            (Some(annotation), Some(default)) => {
                let _ = write!(out, ": {annotation} = ");
                default.write_operand(out, 1);
            }
            (Some(annotation), None) => {
                let _ = write!(out, ": {annotation}");
            }
            (None, Some(default)) => {
                out.push('=');
                default.write_operand(out, 1);
            }
            (None, None) => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<Param>,
    pub kwonly: Vec<Param>,
    pub body: Vec<PyStmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PyStmt {
    Assign { target: PyExpr, value: PyExpr },
    Def(FunctionDef),
    Return(PyExpr),
    If {
        test: PyExpr,
        body: Vec<PyStmt>,
        orelse: Vec<PyStmt>,
    },
    Raise(PyExpr),
    Expr(PyExpr),
    Yield(PyExpr),
    YieldFrom(PyExpr),
    Pass,
}

impl PyStmt {
    pub fn assign(target: PyExpr, value: PyExpr) -> Self {
        Self::Assign { target, value }
    }
}

/// Prints statements, one per line, each prefixed with `indent`. Nested
/// blocks add one `unit` of indentation per level.
pub struct Printer<'a> {
    unit: &'a str,
    out: String,
}

impl<'a> Printer<'a> {
    pub fn new(unit: &'a str) -> Self {
        Self { unit, out: String::new() }
    }

    pub fn finish(self) -> String {
        self.out
    }

    pub fn stmts(&mut self, stmts: &[PyStmt], indent: &str) {
        if stmts.is_empty() {
            self.stmt(&PyStmt::Pass, indent);
        }
        for stmt in stmts {
            self.stmt(stmt, indent);
        }
    }

    fn line(&mut self, indent: &str, text: &str) {
        self.out.push_str(indent);
        self.out.push_str(text);
        self.out.push('\n');
    }

    pub fn stmt(&mut self, stmt: &PyStmt, indent: &str) {
        let nested = format!("{indent}{}", self.unit);
        match stmt {
            PyStmt::Assign { target, value } => {
                let mut text = target.to_source();
                text.push_str(" = ");
                value.write(&mut text);
                self.line(indent, &text);
            }
            PyStmt::Def(def) => {
                let mut text = format!("def {}(self", def.name);
                for param in &def.params {
                    text.push_str(", ");
                    param.write(&mut text);
                }
                if !def.kwonly.is_empty() {
                    text.push_str(", *");
                    for param in &def.kwonly {
                        text.push_str(", ");
                        param.write(&mut text);
                    }
                }
                text.push_str("):");
                self.line(indent, &text);
                self.stmts(&def.body, &nested);
            }
            PyStmt::Return(value) => self.line(indent, &format!("return {}", value.to_source())),
            PyStmt::If { test, body, orelse } => {
                self.line(indent, &format!("if {}:", test.to_source()));
                self.stmts(body, &nested);
                if !orelse.is_empty() {
                    self.line(indent, "else:");
                    self.stmts(orelse, &nested);
                }
            }
            PyStmt::Raise(value) => self.line(indent, &format!("raise {}", value.to_source())),
            PyStmt::Expr(value) => self.line(indent, &value.to_source()),
            PyStmt::Yield(value) => self.line(indent, &format!("yield {}", value.to_source())),
            PyStmt::YieldFrom(value) => self.line(indent, &format!("yield from {}", value.to_source())),
            PyStmt::Pass => self.line(indent, "pass"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conditional_with_comparison() {
        let expr = PyExpr::name("x").if_else(
            PyExpr::name("x").compare(CmpOp::IsNot, PyExpr::None),
            PyExpr::name("list").call(vec![]),
        );
        assert_eq!(expr.to_source(), "x if x is not None else list()");
    }

    #[test]
    fn single_element_tuple() {
        assert_eq!(PyExpr::Tuple(vec![PyExpr::str("a")]).to_source(), "('a',)");
    }

    #[test]
    fn fstring_escapes_braces_and_quotes() {
        let expr = PyExpr::FString(vec![
            FPart::Text("<{it's}>".to_owned()),
            FPart::Repr(PyExpr::self_attr("x")),
        ]);
        assert_eq!(expr.to_source(), r"f'<{{it\'s}}>{self.x!r}'");
    }

    #[test]
    fn function_with_keyword_only_section() {
        let def = FunctionDef {
            name: "__init__".to_owned(),
            params: vec![Param {
                name: "a".to_owned(),
                annotation: Some("int".to_owned()),
                default: None,
            }],
            kwonly: vec![Param {
                name: "b".to_owned(),
                annotation: None,
                default: Some(PyExpr::None),
            }],
            body: vec![],
        };
        let mut printer = Printer::new("    ");
        printer.stmt(&PyStmt::Def(def), "  ");
        assert_eq!(printer.finish(), "  def __init__(self, a: int, *, b=None):\n      pass\n");
    }
}
