//! Lowers a [`ClassPlan`](crate::plan::ClassPlan) to closures over live instances.
//!
//! Each function here runs once per behavior per record type, the first
//! time the behavior is used; the returned closure is cached on the type.

use std::{fmt::Write, rc::Rc};

use ahash::AHashSet;
use indexmap::IndexMap;

use crate::{
    error::{ImmutabilityError, Mutation, PrefabError},
    plan::{EqPlan, FrozenPlan, HookCall, InitPlan, InitStep, IterPlan, ReprForm, ReprPlan, ValueSource},
    reflective::{
        Comparison, Instance, Value,
        args::bind,
        namespace::{EqFn, Hook, HookArgs, InitFn, IterFn, ReprFn, ValueIter},
        value::guard_repr,
    },
};

pub(crate) type GuardFn = Rc<dyn Fn(&Instance, &str, Mutation) -> Result<(), ImmutabilityError>>;

fn call_factory(factory: &Value) -> Value {
    match factory {
        Value::Callable(callable) => callable.call(),
        other => other.clone(),
    }
}

fn realize(field: &str, source: &ValueSource<Value>, bound: &IndexMap<String, Value>, locals: &IndexMap<String, Value>) -> Value {
    let param = || bound.get(field).cloned().unwrap_or(Value::None);
    match source {
        ValueSource::Param => param(),
        ValueSource::ParamOrFactory(factory) => match param() {
            Value::None => call_factory(factory),
            value => value,
        },
        ValueSource::Factory(factory) => call_factory(factory),
        ValueSource::Default(value) => value.clone(),
        ValueSource::Local => locals.get(field).cloned().unwrap_or(Value::None),
        ValueSource::Unset => Value::None,
    }
}

fn hook_args(call: &HookCall<Value>, bound: &IndexMap<String, Value>, locals: &IndexMap<String, Value>) -> HookArgs {
    call.args
        .iter()
        .map(|(name, source)| (name.clone(), realize(name, source, bound, locals)))
        .collect()
}

pub(crate) fn lower_init(record: &str, plan: &InitPlan<Value>, pre_init: Option<Hook>, post_init: Option<Hook>) -> InitFn {
    let callee = format!("{record}.{}", plan.name);
    let params = plan.params.clone();
    let steps = plan.steps.clone();
    let pre = pre_init.zip(plan.pre_init.clone());
    let post = post_init.zip(plan.post_init.clone());

    Rc::new(move |instance, args| {
        let bound = bind(&callee, &params, args)?;
        let mut locals = IndexMap::new();
        if let Some((hook, call)) = &pre {
            (hook.func)(instance, &hook_args(call, &bound, &locals))?;
        }
        for step in &steps {
            match step {
                InitStep::Assign { field, value } => {
                    instance.set_attr(field, realize(field, value, &bound, &locals))?;
                }
                InitStep::Realize { field, value } => {
                    let value = realize(field, value, &bound, &locals);
                    locals.insert(field.clone(), value);
                }
            }
        }
        if let Some((hook, call)) = &post {
            (hook.func)(instance, &hook_args(call, &bound, &locals))?;
        }
        Ok(())
    })
}

pub(crate) fn lower_repr(plan: &ReprPlan) -> ReprFn {
    let form = plan.form;
    let fields = plan.fields.clone();

    Rc::new(move |instance| {
        let key = Rc::as_ptr(instance).cast::<()>();
        guard_repr(key, || render_repr(instance, form, &fields)).unwrap_or_else(|| Ok("...".to_owned()))
    })
}

fn render_repr(instance: &Rc<Instance>, form: ReprForm, fields: &[String]) -> Result<String, PrefabError> {
    let name = instance.record_type().name();
    let mut out = String::new();
    match form {
        ReprForm::Eval => {
            out.push_str(name);
            out.push('(');
        }
        ReprForm::Diagnostic if fields.is_empty() => {
            let _ = write!(out, "<prefab {name}>");
            return Ok(out);
        }
        ReprForm::Diagnostic => {
            let _ = write!(out, "<prefab {name}; ");
        }
    }
    for (index, field) in fields.iter().enumerate() {
        if index > 0 {
            out.push_str(", ");
        }
        out.push_str(field);
        out.push('=');
        instance.get_attr(field)?.repr_into(&mut out)?;
    }
    out.push(if form == ReprForm::Eval { ')' } else { '>' });
    Ok(out)
}

pub(crate) fn lower_eq(plan: &EqPlan) -> EqFn {
    let fields = plan.fields.clone();

    Rc::new(move |instance, other| {
        let Value::Instance(other) = other else {
            return Ok(Comparison::NotImplemented);
        };
        if !Rc::ptr_eq(instance.record_type(), other.record_type()) {
            return Ok(Comparison::NotImplemented);
        }
        for field in &fields {
            let left = instance.get_attr(field)?;
            let right = other.get_attr(field)?;
            if !left.is(&right) && !left.py_eq(&right)? {
                return Ok(Comparison::NotEqual);
            }
        }
        Ok(Comparison::Equal)
    })
}

/// Lazy walk over an instance's fields; every `__iter__` call starts a new one.
struct FieldIter {
    instance: Rc<Instance>,
    fields: Rc<[String]>,
    next: usize,
}

impl Iterator for FieldIter {
    type Item = Result<Value, PrefabError>;

    fn next(&mut self) -> Option<Self::Item> {
        let field = self.fields.get(self.next)?;
        self.next += 1;
        Some(self.instance.get_attr(field))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.fields.len() - self.next;
        (remaining, Some(remaining))
    }
}

pub(crate) fn lower_iter(plan: &IterPlan) -> IterFn {
    let fields: Rc<[String]> = plan.fields.clone().into();

    Rc::new(move |instance| -> ValueIter {
        Box::new(FieldIter {
            instance: Rc::clone(instance),
            fields: Rc::clone(&fields),
            next: 0,
        })
    })
}

/// Only the first write to a declared field passes; every other write or
/// delete, including one to a name that is not a field, is rejected.
pub(crate) fn lower_frozen(plan: &FrozenPlan) -> GuardFn {
    let fields: AHashSet<String> = plan.fields.iter().cloned().collect();

    Rc::new(move |instance, name, mutation| {
        let allowed = match mutation {
            Mutation::Assign => !instance.has_own_attr(name) && fields.contains(name),
            Mutation::Delete => false,
        };
        if allowed {
            Ok(())
        } else {
            Err(ImmutabilityError {
                type_name: instance.record_type().name().to_owned(),
                attribute: name.to_owned(),
                mutation,
            })
        }
    })
}
