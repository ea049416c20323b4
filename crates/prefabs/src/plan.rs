//! Engine-neutral plan of the synthesized behaviors.
//!
//! Every ordering and participation decision is made here, once, from a
//! [`MergedSpec`]. The reflective engine lowers a [`ClassPlan`] to closures and
//! the static engine lowers the same plan to Python statements, so the two
//! cannot disagree about parameter order, defaults or which fields a
//! behavior sees.

use ahash::AHashSet;
use indexmap::IndexMap;

use crate::{
    field::FieldDefault,
    names::{Behavior, PREFAB_INIT_FUNC},
    resolve::MergedSpec,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Positional,
    KeywordOnly,
}

/// Default of one constructor parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamDefault<E> {
    Required,
    Value(E),
    /// The shared "unset" sentinel (`None`); the body calls the factory instead.
    Unset,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InitParam<E> {
    pub name: String,
    pub kind: ParamKind,
    pub default: ParamDefault<E>,
    pub annotation: Option<String>,
}

/// Where a value in the constructor body comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueSource<E> {
    /// The parameter of the same name.
    Param,
    /// The parameter unless it is `None`, otherwise a fresh factory result.
    ParamOrFactory(E),
    Factory(E),
    Default(E),
    /// A local realized by an earlier [`InitStep::Realize`].
    Local,
    /// `None`.
    Unset,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InitStep<E> {
    /// `self.<field> = <value>`
    Assign { field: String, value: ValueSource<E> },
    /// `<field> = <value>`, a local handed to the post-construction hook.
    Realize { field: String, value: ValueSource<E> },
}

/// Keyword call of a construction hook.
#[derive(Debug, Clone, PartialEq)]
pub struct HookCall<E> {
    pub args: Vec<(String, ValueSource<E>)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InitPlan<E> {
    /// `__init__`, or `__prefab_init__` when the class keeps its own constructor.
    pub name: &'static str,
    pub params: Vec<InitParam<E>>,
    pub pre_init: Option<HookCall<E>>,
    pub steps: Vec<InitStep<E>>,
    pub post_init: Option<HookCall<E>>,
}

impl<E> InitPlan<E> {
    pub fn positional(&self) -> impl Iterator<Item = &InitParam<E>> {
        self.params.iter().filter(|param| param.kind == ParamKind::Positional)
    }

    pub fn keyword_only(&self) -> impl Iterator<Item = &InitParam<E>> {
        self.params.iter().filter(|param| param.kind == ParamKind::KeywordOnly)
    }

    #[must_use]
    pub fn param(&self, name: &str) -> Option<&InitParam<E>> {
        self.params.iter().find(|param| param.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReprForm {
    /// `Name(a=1, b='x')`, which evaluates back to an equal instance.
    Eval,
    /// `<prefab Name; a=1>`, used when some field cannot be reconstructed.
    Diagnostic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReprPlan {
    pub form: ReprForm,
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EqPlan {
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterPlan {
    pub fields: Vec<String>,
}

/// Write and delete guards of a frozen record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrozenPlan {
    /// Every field, excluded ones included, may be written once.
    pub fields: Vec<String>,
}

/// Slot declaration: plain names, or names with documentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotLayout {
    Names(Vec<String>),
    Documented(IndexMap<String, Option<String>>),
}

impl SlotLayout {
    pub fn names(&self) -> Vec<&str> {
        match self {
            Self::Names(names) => names.iter().map(String::as_str).collect(),
            Self::Documented(docs) => docs.keys().map(String::as_str).collect(),
        }
    }
}

/// The full set of behaviors to install on one record type.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassPlan<E> {
    pub name: String,
    pub init: InitPlan<E>,
    pub repr: Option<ReprPlan>,
    pub eq: Option<EqPlan>,
    pub iter: Option<IterPlan>,
    pub frozen: Option<FrozenPlan>,
    /// Non-excluded field names, always exposed.
    pub public_fields: Vec<String>,
    pub match_args: Option<Vec<String>>,
    pub slots: Option<SlotLayout>,
}

impl<E: Clone> ClassPlan<E> {
    /// Plans every behavior of `merged`. Behaviors named in `overrides` are
    /// user-defined on the class and are left alone, except the constructor,
    /// which moves to `__prefab_init__`.
    pub fn build(merged: &MergedSpec<E>, overrides: &AHashSet<Behavior>) -> Self {
        let flags = merged.flags;
        let public_fields: Vec<String> = merged.public_fields().map(str::to_owned).collect();
        let wants = |behavior: Behavior, flag: bool| flag && !overrides.contains(&behavior);

        Self {
            name: merged.name.clone(),
            init: plan_init(merged, flags.init && !overrides.contains(&Behavior::Init)),
            repr: wants(Behavior::Repr, flags.repr).then(|| plan_repr(merged)),
            eq: wants(Behavior::Eq, flags.eq).then(|| EqPlan {
                fields: merged
                    .fields
                    .iter()
                    .filter(|(_, field)| field.compare && field.is_public())
                    .map(|(name, _)| name.clone())
                    .collect(),
            }),
            iter: wants(Behavior::Iter, flags.iter).then(|| IterPlan {
                fields: public_fields.clone(),
            }),
            frozen: flags.frozen.then(|| FrozenPlan {
                fields: merged.fields.keys().cloned().collect(),
            }),
            match_args: wants(Behavior::MatchArgs, flags.match_args).then(|| public_fields.clone()),
            slots: flags.slots.then(|| plan_slots(merged)),
            public_fields,
        }
    }
}

fn plan_init<E: Clone>(merged: &MergedSpec<E>, as_init: bool) -> InitPlan<E> {
    let mut params = Vec::new();
    let mut keyword_only = Vec::new();
    let mut steps = Vec::new();

    for (name, field) in &merged.fields {
        if field.init {
            let default = match &field.default {
                FieldDefault::Nothing => ParamDefault::Required,
                FieldDefault::Value(value) => ParamDefault::Value(value.clone()),
                FieldDefault::Factory(_) => ParamDefault::Unset,
            };
            let param = InitParam {
                name: name.clone(),
                kind: if field.kw_only {
                    ParamKind::KeywordOnly
                } else {
                    ParamKind::Positional
                },
                default,
                annotation: field.declared_type.clone(),
            };
            if field.kw_only {
                keyword_only.push(param);
            } else {
                params.push(param);
            }
        }

        let value = match (&field.default, field.init) {
            (FieldDefault::Factory(factory), true) => Some(ValueSource::ParamOrFactory(factory.clone())),
            (_, true) => Some(ValueSource::Param),
            (FieldDefault::Factory(factory), false) => Some(ValueSource::Factory(factory.clone())),
            (FieldDefault::Value(value), false) => Some(ValueSource::Default(value.clone())),
            (FieldDefault::Nothing, false) => None,
        };

        if merged.is_post_init_arg(name) {
            if let Some(value) = value
                && !matches!(value, ValueSource::Param)
            {
                steps.push(InitStep::Realize {
                    field: name.clone(),
                    value,
                });
            }
        } else if let Some(value) = value {
            steps.push(InitStep::Assign {
                field: name.clone(),
                value,
            });
        }
    }
    params.extend(keyword_only);

    let pre_init = merged.pre_init.as_ref().map(|hook| HookCall {
        args: hook
            .params
            .iter()
            .map(|name| {
                let source = match merged.fields.get(name) {
                    Some(field) if field.init => ValueSource::Param,
                    Some(field) => match &field.default {
                        FieldDefault::Value(value) => ValueSource::Default(value.clone()),
                        _ => ValueSource::Unset,
                    },
                    None => ValueSource::Unset,
                };
                (name.clone(), source)
            })
            .collect(),
    });

    let post_init = merged.post_init.as_ref().map(|hook| HookCall {
        args: hook
            .params
            .iter()
            .map(|name| {
                let realized = steps
                    .iter()
                    .any(|step| matches!(step, InitStep::Realize { field, .. } if field == name));
                let source = if realized {
                    ValueSource::Local
                } else if merged.fields.get(name).is_some_and(|field| field.init) {
                    ValueSource::Param
                } else {
                    ValueSource::Unset
                };
                (name.clone(), source)
            })
            .collect(),
    });

    InitPlan {
        name: if as_init {
            <&'static str>::from(Behavior::Init)
        } else {
            PREFAB_INIT_FUNC
        },
        params,
        pre_init,
        steps,
        post_init,
    }
}

fn plan_repr<E>(merged: &MergedSpec<E>) -> ReprPlan {
    let reconstructable = merged
        .fields
        .values()
        .all(|field| field.is_public() && field.init == field.repr);
    ReprPlan {
        form: if reconstructable {
            ReprForm::Eval
        } else {
            ReprForm::Diagnostic
        },
        fields: merged
            .fields
            .iter()
            .filter(|(_, field)| field.repr && field.is_public())
            .map(|(name, _)| name.clone())
            .collect(),
    }
}

fn plan_slots<E>(merged: &MergedSpec<E>) -> SlotLayout {
    let local = merged.local_fields.iter().filter_map(|name| Some((name, merged.fields.get(name)?)));
    if merged
        .local_fields
        .iter()
        .any(|name| merged.fields.get(name).is_some_and(|field| field.doc.is_some()))
    {
        SlotLayout::Documented(local.map(|(name, field)| (name.clone(), field.doc.clone())).collect())
    } else {
        SlotLayout::Names(local.map(|(name, _)| name.clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::{
        field::FieldArgs,
        record::{DeclaredValue, HookSignature, RecordDecl, build_record_spec},
        resolve::merge,
    };

    fn plan(decl: RecordDecl<i64>) -> ClassPlan<i64> {
        let spec = build_record_spec(decl).unwrap();
        let merged: Rc<MergedSpec<i64>> = Rc::new(merge(&spec, Vec::new()).unwrap());
        ClassPlan::build(&merged, &AHashSet::new())
    }

    fn field(decl: &mut RecordDecl<i64>, name: &str, args: FieldArgs<i64>) {
        decl.values.push((name.to_owned(), DeclaredValue::Field(args)));
    }

    #[test]
    fn keyword_only_params_follow_positional() {
        let mut decl = RecordDecl::new("P");
        field(&mut decl, "a", FieldArgs::new().kw_only(true));
        field(&mut decl, "b", FieldArgs::new());
        let plan = plan(decl);
        let names: Vec<_> = plan.init.params.iter().map(|p| (p.name.as_str(), p.kind)).collect();
        assert_eq!(names, [("b", ParamKind::Positional), ("a", ParamKind::KeywordOnly)]);
    }

    #[test]
    fn post_init_factory_is_realized_not_assigned() {
        let mut decl = RecordDecl::new("P");
        field(&mut decl, "a", FieldArgs::new());
        field(&mut decl, "b", FieldArgs::new().default_factory(0));
        decl.post_init = Some(HookSignature::new(["a", "b"]));
        let plan = plan(decl);
        assert_eq!(
            plan.init.steps,
            [InitStep::Realize {
                field: "b".to_owned(),
                value: ValueSource::ParamOrFactory(0)
            }]
        );
        let args = &plan.init.post_init.unwrap().args;
        assert_eq!(args[0], ("a".to_owned(), ValueSource::Param));
        assert_eq!(args[1], ("b".to_owned(), ValueSource::Local));
    }

    #[test]
    fn asymmetric_field_forces_diagnostic_repr() {
        let mut decl = RecordDecl::new("P");
        field(&mut decl, "a", FieldArgs::new());
        field(&mut decl, "b", FieldArgs::new().repr(false));
        let repr = plan(decl).repr.unwrap();
        assert_eq!(repr.form, ReprForm::Diagnostic);
        assert_eq!(repr.fields, ["a"]);
    }

    #[test]
    fn documented_slots() {
        let mut decl = RecordDecl::new("P");
        decl.flags.slots = true;
        field(&mut decl, "a", FieldArgs::new().doc("first"));
        field(&mut decl, "b", FieldArgs::new());
        let Some(SlotLayout::Documented(docs)) = plan(decl).slots else {
            panic!("expected documented slots");
        };
        assert_eq!(docs["a"].as_deref(), Some("first"));
        assert_eq!(docs["b"], None);
    }
}
