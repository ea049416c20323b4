//! Reads record declarations out of a parsed compilation unit.

use std::borrow::Cow;

use ahash::AHashSet;
use ruff_python_ast::{self as ast, Expr as AstExpr, Stmt};
use ruff_text_size::Ranged;

use crate::{
    compiled::syntax::PyExpr,
    error::SpecError,
    field::FieldArgs,
    names::{ATTRIBUTE_FUNCNAME, Behavior, COMPILE_ARGUMENT, DECORATOR_NAME, POST_INIT_FUNC, PRE_INIT_FUNC},
    record::{DeclaredValue, HookSignature, RecordDecl, RecordFlags},
};

/// A default or factory expression, kept as the unit's own source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceExpr {
    text: String,
    /// Binds tighter than a call, so `text()` needs no parentheses.
    primary: bool,
    /// Only valid where a bare tuple or starred expression is.
    bare: bool,
}

impl SourceExpr {
    pub(crate) fn from_ast(source: &str, expr: &AstExpr) -> Self {
        let primary = match expr {
            AstExpr::Tuple(tuple) => tuple.parenthesized,
            AstExpr::Name(_)
            | AstExpr::Attribute(_)
            | AstExpr::Call(_)
            | AstExpr::Subscript(_)
            | AstExpr::StringLiteral(_)
            | AstExpr::BytesLiteral(_)
            | AstExpr::FString(_)
            | AstExpr::NumberLiteral(_)
            | AstExpr::BooleanLiteral(_)
            | AstExpr::NoneLiteral(_)
            | AstExpr::EllipsisLiteral(_)
            | AstExpr::List(_)
            | AstExpr::ListComp(_)
            | AstExpr::Set(_)
            | AstExpr::SetComp(_)
            | AstExpr::Dict(_)
            | AstExpr::DictComp(_)
            | AstExpr::Generator(_) => true,
            _ => false,
        };
        let bare = matches!(
            expr,
            AstExpr::Tuple(ast::ExprTuple { parenthesized: false, .. })
                | AstExpr::Starred(_)
                | AstExpr::Named(_)
                | AstExpr::Yield(_)
                | AstExpr::YieldFrom(_)
        );
        Self {
            text: source[expr.range()].to_owned(),
            primary,
            bare,
        }
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    pub(crate) fn to_expr(&self) -> PyExpr {
        if self.bare {
            PyExpr::Raw(format!("({})", self.text))
        } else {
            PyExpr::Raw(self.text.clone())
        }
    }

    pub(crate) fn to_callee(&self) -> PyExpr {
        if self.primary {
            PyExpr::Raw(self.text.clone())
        } else {
            PyExpr::Raw(format!("({})", self.text))
        }
    }
}

/// How a class definition is decorated.
#[derive(Debug)]
pub(crate) enum Decoration {
    Undecorated,
    /// A prefab processed at runtime by the reflective engine.
    Dynamic,
    /// `@prefab(compile_prefab=True, ...)`; `decorator` indexes `decorator_list`.
    Compiled { decorator: usize, flags: RecordFlags },
}

fn names_prefab(expr: &AstExpr, name: &str) -> bool {
    match expr {
        AstExpr::Name(ast::ExprName { id, .. }) => id.as_str() == name,
        AstExpr::Attribute(ast::ExprAttribute { attr, .. }) => attr.as_str() == name,
        _ => false,
    }
}

fn invalid(context: &str, argument: &str, reason: impl Into<Cow<'static, str>>) -> SpecError {
    SpecError::InvalidArgument {
        context: context.to_owned(),
        argument: argument.to_owned(),
        reason: reason.into(),
    }
}

fn literal_bool(context: &str, argument: &str, value: &AstExpr) -> Result<bool, SpecError> {
    match value {
        AstExpr::BooleanLiteral(ast::ExprBooleanLiteral { value, .. }) => Ok(*value),
        _ => Err(invalid(context, argument, "must be a literal True or False")),
    }
}

/// Classifies the decorators of `class`.
pub(crate) fn decoration(class: &ast::StmtClassDef) -> Result<Decoration, SpecError> {
    let context = format!("@{DECORATOR_NAME} on {}", class.name);
    let mut found = Decoration::Undecorated;
    for (index, decorator) in class.decorator_list.iter().enumerate() {
        let call = match &decorator.expression {
            AstExpr::Call(call) if names_prefab(&call.func, DECORATOR_NAME) => call,
            expr if names_prefab(expr, DECORATOR_NAME) => {
                found = Decoration::Dynamic;
                continue;
            }
            _ => continue,
        };

        let compile = call
            .arguments
            .keywords
            .iter()
            .find(|keyword| keyword.arg.as_ref().is_some_and(|arg| arg.as_str() == COMPILE_ARGUMENT));
        let Some(compile) = compile else {
            found = Decoration::Dynamic;
            continue;
        };
        if !literal_bool(&context, COMPILE_ARGUMENT, &compile.value)? {
            found = Decoration::Dynamic;
            continue;
        }

        if !call.arguments.args.is_empty() {
            return Err(invalid(&context, "*args", "takes keyword arguments only"));
        }
        let mut flags = RecordFlags::default();
        for keyword in &call.arguments.keywords {
            let Some(arg) = &keyword.arg else {
                return Err(invalid(&context, "**kwargs", "keyword unpacking is not supported"));
            };
            let value = literal_bool(&context, arg.as_str(), &keyword.value)?;
            match arg.as_str() {
                "init" => flags.init = value,
                "repr" => flags.repr = value,
                "eq" => flags.eq = value,
                "iter" => flags.iter = value,
                "match_args" => flags.match_args = value,
                "kw_only" => flags.kw_only = value,
                "frozen" => flags.frozen = value,
                "compile_slots" => flags.slots = value,
                "compile_plain" => flags.plain = value,
                COMPILE_ARGUMENT | "compile_fallback" => {}
                other => return Err(invalid(&context, other, "unexpected keyword argument")),
            }
        }
        return Ok(Decoration::Compiled { decorator: index, flags });
    }
    Ok(found)
}

fn attribute_call(expr: &AstExpr) -> Option<&ast::ExprCall> {
    match expr {
        AstExpr::Call(call) if names_prefab(&call.func, ATTRIBUTE_FUNCNAME) => Some(call),
        _ => None,
    }
}

fn field_args(source: &str, field: &str, call: &ast::ExprCall) -> Result<FieldArgs<SourceExpr>, SpecError> {
    let context = format!("{ATTRIBUTE_FUNCNAME}() for field {field:?}");
    if !call.arguments.args.is_empty() {
        return Err(invalid(&context, "*args", "takes keyword arguments only"));
    }
    let mut args = FieldArgs::new();
    for keyword in &call.arguments.keywords {
        let Some(arg) = &keyword.arg else {
            return Err(invalid(&context, "**kwargs", "keyword unpacking is not supported"));
        };
        let value = &keyword.value;
        args = match arg.as_str() {
            "default" => args.default_value(SourceExpr::from_ast(source, value)),
            "default_factory" => args.default_factory(SourceExpr::from_ast(source, value)),
            "init" => args.init(literal_bool(&context, "init", value)?),
            "repr" => args.repr(literal_bool(&context, "repr", value)?),
            "compare" => args.compare(literal_bool(&context, "compare", value)?),
            "kw_only" => args.kw_only(literal_bool(&context, "kw_only", value)?),
            "exclude_field" => args.exclude_field(literal_bool(&context, "exclude_field", value)?),
            "doc" => match value {
                AstExpr::StringLiteral(ast::ExprStringLiteral { value, .. }) => args.doc(value.to_str()),
                AstExpr::NoneLiteral(_) => args,
                _ => return Err(invalid(&context, "doc", "must be a string literal")),
            },
            "type" => args.declared_type(&source[value.range()]),
            other => return Err(invalid(&context, other, "unexpected keyword argument")),
        };
    }
    Ok(args)
}

fn hook_signature(function: &ast::StmtFunctionDef) -> HookSignature {
    let params = &function.parameters;
    let is_static = function
        .decorator_list
        .iter()
        .any(|decorator| names_prefab(&decorator.expression, "staticmethod"));
    let mut names: Vec<String> = params
        .posonlyargs
        .iter()
        .chain(&params.args)
        .chain(&params.kwonlyargs)
        .map(|param| param.parameter.name.to_string())
        .collect();
    if !is_static && !names.is_empty() {
        names.remove(0);
    }
    HookSignature {
        params: names,
        positional_only: !params.posonlyargs.is_empty(),
    }
}

/// A class-body statement binding a single name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Binding {
    /// Index into the class body.
    pub index: usize,
    pub name: String,
}

/// What the static engine needs from one compiled class definition.
#[derive(Debug)]
pub(crate) struct Discovered {
    pub decl: RecordDecl<SourceExpr>,
    pub overrides: AHashSet<Behavior>,
    /// Statements that can declare fields; removed when their name is consumed.
    pub bindings: Vec<Binding>,
}

/// Scrapes `class` into a record declaration. Parents are left to the caller.
pub(crate) fn discover(source: &str, class: &ast::StmtClassDef, flags: RecordFlags) -> Result<Discovered, SpecError> {
    let mut decl = RecordDecl::new(class.name.as_str());
    decl.flags = flags;
    let mut overrides = AHashSet::new();
    let mut bindings = Vec::new();
    let match_args = <&'static str>::from(Behavior::MatchArgs);

    for (index, stmt) in class.body.iter().enumerate() {
        match stmt {
            Stmt::AnnAssign(ast::StmtAnnAssign {
                target,
                annotation,
                value,
                ..
            }) => {
                let AstExpr::Name(ast::ExprName { id, .. }) = target.as_ref() else {
                    continue;
                };
                let name = id.to_string();
                if name == match_args {
                    overrides.insert(Behavior::MatchArgs);
                    continue;
                }
                decl.annotations.push((name.clone(), source[annotation.range()].to_owned()));
                if let Some(value) = value {
                    let value = match attribute_call(value) {
                        Some(call) => DeclaredValue::Field(field_args(source, &name, call)?),
                        None => DeclaredValue::Plain(SourceExpr::from_ast(source, value)),
                    };
                    decl.values.push((name.clone(), value));
                }
                bindings.push(Binding { index, name });
            }
            Stmt::Assign(ast::StmtAssign { targets, value, .. }) => {
                let [AstExpr::Name(ast::ExprName { id, .. })] = targets.as_slice() else {
                    continue;
                };
                let name = id.to_string();
                if name == match_args {
                    overrides.insert(Behavior::MatchArgs);
                    continue;
                }
                let value = match attribute_call(value) {
                    Some(call) => DeclaredValue::Field(field_args(source, &name, call)?),
                    None => DeclaredValue::Plain(SourceExpr::from_ast(source, value)),
                };
                decl.values.push((name.clone(), value));
                bindings.push(Binding { index, name });
            }
            Stmt::FunctionDef(function) => match function.name.as_str() {
                PRE_INIT_FUNC => decl.pre_init = Some(hook_signature(function)),
                POST_INIT_FUNC => decl.post_init = Some(hook_signature(function)),
                name => {
                    if let Some(behavior) = Behavior::from_dunder(name)
                        && matches!(behavior, Behavior::Init | Behavior::Repr | Behavior::Eq | Behavior::Iter)
                    {
                        overrides.insert(behavior);
                    }
                }
            },
            _ => {}
        }
    }

    Ok(Discovered {
        decl,
        overrides,
        bindings,
    })
}
