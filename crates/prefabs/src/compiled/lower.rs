//! Lowers a [`ClassPlan`] to Python statements.

use crate::{
    compiled::{
        SourceExpr,
        syntax::{CmpOp, FPart, FunctionDef, Param, Printer, PyExpr, PyStmt},
    },
    error::Mutation,
    names::{Behavior, COMPILED_FLAG, FIELDS_ATTRIBUTE, HookKind},
    plan::{
        ClassPlan, EqPlan, FrozenPlan, HookCall, InitParam, InitPlan, InitStep, IterPlan, ParamDefault, ReprForm, ReprPlan, SlotLayout,
        ValueSource,
    },
    reflective::Value,
};

/// How a default or factory of an engine's expression type appears in source.
pub trait ExprText {
    /// Expression for the default value of `field`.
    fn default_expr(&self, field: &str) -> PyExpr;
    /// Expression naming the factory of `field`; callers add the call.
    fn factory_expr(&self, field: &str) -> PyExpr;
}

impl ExprText for SourceExpr {
    fn default_expr(&self, _field: &str) -> PyExpr {
        self.to_expr()
    }

    fn factory_expr(&self, _field: &str) -> PyExpr {
        self.to_callee()
    }
}

/// Live values: literals are inlined, anything else is a closure-table entry.
impl ExprText for Value {
    fn default_expr(&self, field: &str) -> PyExpr {
        match self.py_repr() {
            Ok(text) if self.is_literal() => PyExpr::Raw(text),
            _ => PyExpr::name(format!("_{field}_default")),
        }
    }

    fn factory_expr(&self, field: &str) -> PyExpr {
        PyExpr::name(format!("_{field}_factory"))
    }
}

fn value_expr<E: ExprText>(field: &str, source: &ValueSource<E>) -> PyExpr {
    match source {
        ValueSource::Param | ValueSource::Local => PyExpr::name(field),
        ValueSource::ParamOrFactory(factory) => PyExpr::name(field).if_else(
            PyExpr::name(field).compare(CmpOp::IsNot, PyExpr::None),
            factory.factory_expr(field).call(Vec::new()),
        ),
        ValueSource::Factory(factory) => factory.factory_expr(field).call(Vec::new()),
        ValueSource::Default(value) => value.default_expr(field),
        ValueSource::Unset => PyExpr::None,
    }
}

fn hook_call<E: ExprText>(kind: HookKind, call: &HookCall<E>) -> PyStmt {
    let keywords = call
        .args
        .iter()
        .map(|(name, source)| (name.clone(), value_expr(name, source)))
        .collect();
    PyStmt::Expr(PyExpr::name("self").attr(<&'static str>::from(kind)).call_kw(keywords))
}

fn init_def<E: ExprText>(plan: &InitPlan<E>) -> FunctionDef {
    let to_param = |param: &InitParam<E>| Param {
        name: param.name.clone(),
        annotation: param.annotation.clone(),
        default: match &param.default {
            ParamDefault::Required => None,
            ParamDefault::Value(value) => Some(value.default_expr(&param.name)),
            ParamDefault::Unset => Some(PyExpr::None),
        },
    };

    let mut body = Vec::with_capacity(plan.steps.len() + 2);
    if let Some(call) = &plan.pre_init {
        body.push(hook_call(HookKind::PreInit, call));
    }
    for step in &plan.steps {
        body.push(match step {
            InitStep::Assign { field, value } => PyStmt::assign(PyExpr::self_attr(field), value_expr(field, value)),
            InitStep::Realize { field, value } => PyStmt::assign(PyExpr::name(field), value_expr(field, value)),
        });
    }
    if let Some(call) = &plan.post_init {
        body.push(hook_call(HookKind::PostInit, call));
    }

    FunctionDef {
        name: plan.name.to_owned(),
        params: plan.positional().map(to_param).collect(),
        kwonly: plan.keyword_only().map(to_param).collect(),
        body,
    }
}

fn repr_def(plan: &ReprPlan) -> FunctionDef {
    let qualname = FPart::Value(PyExpr::name("type").call(vec![PyExpr::name("self")]).attr("__qualname__"));
    let mut parts = Vec::with_capacity(plan.fields.len() * 2 + 3);
    let (open, close) = match plan.form {
        ReprForm::Eval => ("(", ")"),
        ReprForm::Diagnostic if plan.fields.is_empty() => (">", ""),
        ReprForm::Diagnostic => ("; ", ">"),
    };
    if plan.form == ReprForm::Diagnostic {
        parts.push(FPart::Text("<prefab ".to_owned()));
    }
    parts.push(qualname);
    parts.push(FPart::Text(open.to_owned()));
    for (index, field) in plan.fields.iter().enumerate() {
        let separator = if index == 0 { "" } else { ", " };
        parts.push(FPart::Text(format!("{separator}{field}=")));
        parts.push(FPart::Repr(PyExpr::self_attr(field)));
    }
    parts.push(FPart::Text(close.to_owned()));
    parts.retain(|part| !matches!(part, FPart::Text(text) if text.is_empty()));

    FunctionDef {
        name: Behavior::Repr.to_string(),
        params: Vec::new(),
        kwonly: Vec::new(),
        body: vec![PyStmt::Return(PyExpr::FString(parts))],
    }
}

fn eq_def(plan: &EqPlan) -> FunctionDef {
    let same_class = PyExpr::self_attr("__class__").compare(CmpOp::Is, PyExpr::name("other").attr("__class__"));
    let result = if plan.fields.is_empty() {
        PyExpr::Bool(true)
    } else {
        let side = |name: &str| PyExpr::Tuple(plan.fields.iter().map(|field| PyExpr::name(name).attr(field)).collect());
        side("self").compare(CmpOp::Eq, side("other"))
    };
    FunctionDef {
        name: Behavior::Eq.to_string(),
        params: vec![Param::plain("other")],
        kwonly: Vec::new(),
        body: vec![PyStmt::Return(result.if_else(same_class, PyExpr::name("NotImplemented")))],
    }
}

fn iter_def(plan: &IterPlan) -> FunctionDef {
    let body = if plan.fields.is_empty() {
        vec![PyStmt::YieldFrom(PyExpr::Tuple(Vec::new()))]
    } else {
        plan.fields.iter().map(|field| PyStmt::Yield(PyExpr::self_attr(field))).collect()
    };
    FunctionDef {
        name: Behavior::Iter.to_string(),
        params: Vec::new(),
        kwonly: Vec::new(),
        body,
    }
}

fn immutable_error(class: &str, mutation: Mutation) -> PyStmt {
    PyStmt::Raise(PyExpr::name("TypeError").call(vec![PyExpr::str(format!(
        "'{class}' object does not support attribute {mutation}"
    ))]))
}

fn setattr_def(class: &str, plan: &FrozenPlan) -> FunctionDef {
    let fields: Vec<PyExpr> = plan.fields.iter().map(PyExpr::str).collect();
    let fields = if fields.is_empty() {
        PyExpr::Tuple(fields)
    } else {
        PyExpr::Set(fields)
    };
    let rejected = PyExpr::Or(vec![
        PyExpr::name("hasattr").call(vec![PyExpr::name("self"), PyExpr::name("name")]),
        PyExpr::name("name").compare(CmpOp::NotIn, fields),
    ]);
    FunctionDef {
        name: Behavior::SetAttr.to_string(),
        params: vec![Param::plain("name"), Param::plain("value")],
        kwonly: Vec::new(),
        body: vec![PyStmt::If {
            test: rejected,
            body: vec![immutable_error(class, Mutation::Assign)],
            orelse: vec![PyStmt::Expr(PyExpr::name("object").attr("__setattr__").call(vec![
                PyExpr::name("self"),
                PyExpr::name("name"),
                PyExpr::name("value"),
            ]))],
        }],
    }
}

fn delattr_def(class: &str) -> FunctionDef {
    FunctionDef {
        name: Behavior::DelAttr.to_string(),
        params: vec![Param::plain("name")],
        kwonly: Vec::new(),
        body: vec![immutable_error(class, Mutation::Delete)],
    }
}

fn names_tuple(names: &[String]) -> PyExpr {
    PyExpr::Tuple(names.iter().map(PyExpr::str).collect())
}

fn slots_expr(layout: &SlotLayout) -> PyExpr {
    match layout {
        SlotLayout::Names(names) => names_tuple(names),
        SlotLayout::Documented(docs) => PyExpr::Dict(
            docs.iter()
                .map(|(name, doc)| (PyExpr::str(name), doc.as_ref().map_or(PyExpr::None, PyExpr::str)))
                .collect(),
        ),
    }
}

/// Every statement the plan adds to a class body, in emission order.
///
/// `plain` omits the processed marker and the public field list.
pub fn lower_class<E: ExprText>(plan: &ClassPlan<E>, plain: bool) -> Vec<PyStmt> {
    let mut body = Vec::new();
    if !plain {
        body.push(PyStmt::assign(PyExpr::name(COMPILED_FLAG), PyExpr::Bool(true)));
        body.push(PyStmt::assign(
            PyExpr::name(FIELDS_ATTRIBUTE),
            PyExpr::List(plan.public_fields.iter().map(PyExpr::str).collect()),
        ));
    }
    if let Some(slots) = &plan.slots {
        body.push(PyStmt::assign(PyExpr::name("__slots__"), slots_expr(slots)));
    }
    if let Some(match_args) = &plan.match_args {
        body.push(PyStmt::assign(PyExpr::name(Behavior::MatchArgs.to_string()), names_tuple(match_args)));
    }
    body.push(PyStmt::Def(init_def(&plan.init)));
    if let Some(repr) = &plan.repr {
        body.push(PyStmt::Def(repr_def(repr)));
    }
    if let Some(eq) = &plan.eq {
        body.push(PyStmt::Def(eq_def(eq)));
    }
    if let Some(iter) = &plan.iter {
        body.push(PyStmt::Def(iter_def(iter)));
    }
    if let Some(frozen) = &plan.frozen {
        body.push(PyStmt::Def(setattr_def(&plan.name, frozen)));
        body.push(PyStmt::Def(delattr_def(&plan.name)));
    }
    body
}

/// Python source of one synthesized behavior, or `None` if the plan does
/// not synthesize it.
pub fn render_behavior<E: ExprText>(plan: &ClassPlan<E>, behavior: Behavior) -> Option<String> {
    let stmt = match behavior {
        Behavior::Init => PyStmt::Def(init_def(&plan.init)),
        Behavior::Repr => PyStmt::Def(repr_def(plan.repr.as_ref()?)),
        Behavior::Eq => PyStmt::Def(eq_def(plan.eq.as_ref()?)),
        Behavior::Iter => PyStmt::Def(iter_def(plan.iter.as_ref()?)),
        Behavior::MatchArgs => PyStmt::assign(PyExpr::name(behavior.to_string()), names_tuple(plan.match_args.as_ref()?)),
        Behavior::SetAttr => PyStmt::Def(setattr_def(&plan.name, plan.frozen.as_ref()?)),
        Behavior::DelAttr => {
            plan.frozen.as_ref()?;
            PyStmt::Def(delattr_def(&plan.name))
        }
    };
    let mut printer = Printer::new("    ");
    printer.stmt(&stmt, "");
    Some(printer.finish())
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use ahash::AHashSet;

    use super::*;
    use crate::{
        field::FieldArgs,
        record::{DeclaredValue, HookSignature, RecordDecl, build_record_spec},
        reflective::Callable,
        resolve::merge,
    };

    fn plan(decl: RecordDecl<Value>) -> ClassPlan<Value> {
        let spec = build_record_spec(decl).unwrap();
        let merged = Rc::new(merge(&spec, Vec::new()).unwrap());
        ClassPlan::build(&merged, &AHashSet::new())
    }

    #[test]
    fn init_inlines_literals_and_names_closures() {
        let mut decl = RecordDecl::new("P");
        decl.annotations.push(("x".to_owned(), "int".to_owned()));
        decl.annotations.push(("y".to_owned(), "list".to_owned()));
        decl.annotations.push(("z".to_owned(), "tuple".to_owned()));
        decl.values.push(("x".to_owned(), DeclaredValue::Plain(Value::Int(1))));
        decl.values.push((
            "y".to_owned(),
            DeclaredValue::Field(FieldArgs::new().default_factory(Value::from(Callable::list()))),
        ));
        decl.values.push(("z".to_owned(), DeclaredValue::Plain(Value::tuple(vec![]))));
        let source = render_behavior(&plan(decl), Behavior::Init).unwrap();
        assert_eq!(
            source,
            "def __init__(self, x: int = 1, y: list = None, z: tuple = _z_default):\n    \
             self.x = x\n    \
             self.y = y if y is not None else _y_factory()\n    \
             self.z = z\n"
        );
    }

    #[test]
    fn post_init_receives_realized_locals() {
        let mut decl = RecordDecl::new("P");
        decl.values.push(("a".to_owned(), DeclaredValue::Field(FieldArgs::new())));
        decl.values.push((
            "b".to_owned(),
            DeclaredValue::Field(FieldArgs::new().init(false).default_value(Value::str("d"))),
        ));
        decl.post_init = Some(HookSignature::new(["b"]));
        let source = render_behavior(&plan(decl), Behavior::Init).unwrap();
        assert_eq!(
            source,
            "def __init__(self, a):\n    self.a = a\n    b = 'd'\n    self.__prefab_post_init__(b=b)\n"
        );
    }

    #[test]
    fn diagnostic_repr_without_fields() {
        let plan = ReprPlan {
            form: ReprForm::Diagnostic,
            fields: Vec::new(),
        };
        let mut printer = Printer::new("    ");
        printer.stmt(&PyStmt::Def(repr_def(&plan)), "");
        assert_eq!(
            printer.finish(),
            "def __repr__(self):\n    return f'<prefab {type(self).__qualname__}>'\n"
        );
    }

    #[test]
    fn frozen_guards() {
        let mut decl = RecordDecl::new("P");
        decl.flags.frozen = true;
        decl.values.push(("a".to_owned(), DeclaredValue::Field(FieldArgs::new())));
        let plan = plan(decl);
        assert_eq!(
            render_behavior(&plan, Behavior::SetAttr).unwrap(),
            "def __setattr__(self, name, value):\n    \
             if hasattr(self, name) or name not in {'a'}:\n        \
             raise TypeError(\"'P' object does not support attribute assignment\")\n    \
             else:\n        \
             object.__setattr__(self, name, value)\n"
        );
        assert!(render_behavior(&plan, Behavior::DelAttr).unwrap().contains("attribute deletion"));
        assert_eq!(render_behavior(&plan, Behavior::Iter), None);
    }
}
