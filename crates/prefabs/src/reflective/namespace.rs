//! Class bodies for live record types.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::{
    error::PrefabError,
    field::FieldArgs,
    names::Behavior,
    record::{DeclaredValue, HookSignature},
    reflective::{Comparison, Instance, Value, args::CallArgs},
};

/// Keyword arguments handed to a construction hook.
pub type HookArgs = IndexMap<String, Value>;

pub(crate) type InitFn = Rc<dyn Fn(&Rc<Instance>, CallArgs) -> Result<(), PrefabError>>;
pub(crate) type ReprFn = Rc<dyn Fn(&Rc<Instance>) -> Result<String, PrefabError>>;
pub(crate) type EqFn = Rc<dyn Fn(&Rc<Instance>, &Value) -> Result<Comparison, PrefabError>>;
pub(crate) type IterFn = Rc<dyn Fn(&Rc<Instance>) -> ValueIter>;

/// Iterator returned by a record's `__iter__`.
pub type ValueIter = Box<dyn Iterator<Item = Result<Value, PrefabError>>>;

/// A pre- or post-construction hook.
#[derive(Clone)]
pub struct Hook {
    pub(crate) signature: HookSignature,
    pub(crate) func: Rc<dyn Fn(&Rc<Instance>, &HookArgs) -> Result<(), PrefabError>>,
}

impl Hook {
    /// A hook receiving the named fields as keyword arguments.
    pub fn new<'a>(
        params: impl IntoIterator<Item = &'a str>,
        func: impl Fn(&Rc<Instance>, &HookArgs) -> Result<(), PrefabError> + 'static,
    ) -> Self {
        Self::with_signature(HookSignature::new(params), func)
    }

    pub fn with_signature(
        signature: HookSignature,
        func: impl Fn(&Rc<Instance>, &HookArgs) -> Result<(), PrefabError> + 'static,
    ) -> Self {
        Self {
            signature,
            func: Rc::new(func),
        }
    }

    #[must_use]
    pub fn signature(&self) -> &HookSignature {
        &self.signature
    }
}

impl std::fmt::Debug for Hook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hook").field("signature", &self.signature).finish_non_exhaustive()
    }
}

/// Behaviors written by hand in the class body.
#[derive(Clone, Default)]
pub(crate) struct UserMethods {
    pub init: Option<InitFn>,
    pub repr: Option<ReprFn>,
    pub eq: Option<EqFn>,
    pub iter: Option<IterFn>,
    pub match_args: Option<Vec<String>>,
}

impl UserMethods {
    pub fn defines(&self, behavior: Behavior) -> bool {
        match behavior {
            Behavior::Init => self.init.is_some(),
            Behavior::Repr => self.repr.is_some(),
            Behavior::Eq => self.eq.is_some(),
            Behavior::Iter => self.iter.is_some(),
            Behavior::MatchArgs => self.match_args.is_some(),
            Behavior::SetAttr | Behavior::DelAttr => false,
        }
    }
}

/// The body of a class statement, in declaration order.
///
/// ```
/// use prefabs::{ClassNamespace, FieldArgs, Value};
///
/// // class Point:
/// //     x: int
/// //     y: int = 0
/// //     tags: list = attribute(default_factory=list)
/// let ns = ClassNamespace::new()
///     .annotate("x", "int")
///     .annotated("y", "int", Value::Int(0))
///     .annotated_field("tags", "list", FieldArgs::new().default_factory(Value::from(prefabs::Callable::list())));
/// ```
#[derive(Clone, Default)]
pub struct ClassNamespace {
    pub(crate) annotations: Vec<(String, String)>,
    pub(crate) values: Vec<(String, DeclaredValue<Value>)>,
    pub(crate) slots: Option<Vec<(String, DeclaredValue<Value>)>>,
    pub(crate) pre_init: Option<Hook>,
    pub(crate) post_init: Option<Hook>,
    pub(crate) user: UserMethods,
}

impl ClassNamespace {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `name: annotation`
    #[must_use]
    pub fn annotate(mut self, name: &str, annotation: &str) -> Self {
        self.annotations.push((name.to_owned(), annotation.to_owned()));
        self
    }

    /// `name = value`
    #[must_use]
    pub fn value(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.values.push((name.to_owned(), DeclaredValue::Plain(value.into())));
        self
    }

    /// `name = attribute(...)`
    #[must_use]
    pub fn field(mut self, name: &str, args: FieldArgs<Value>) -> Self {
        self.values.push((name.to_owned(), DeclaredValue::Field(args)));
        self
    }

    /// `name: annotation = value`
    #[must_use]
    pub fn annotated(self, name: &str, annotation: &str, value: impl Into<Value>) -> Self {
        self.annotate(name, annotation).value(name, value)
    }

    /// `name: annotation = attribute(...)`
    #[must_use]
    pub fn annotated_field(self, name: &str, annotation: &str, args: FieldArgs<Value>) -> Self {
        self.annotate(name, annotation).field(name, args)
    }

    /// `_: KW_ONLY`
    #[must_use]
    pub fn kw_only_marker(self) -> Self {
        self.annotate("_", crate::names::KW_ONLY_NAME)
    }

    /// One entry of a `__slots__ = SlotAttributes(...)` layout with a plain default.
    #[must_use]
    pub fn slot_value(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.slots
            .get_or_insert_with(Vec::new)
            .push((name.to_owned(), DeclaredValue::Plain(value.into())));
        self
    }

    /// One entry of a slot layout with a field specifier.
    #[must_use]
    pub fn slot_field(mut self, name: &str, args: FieldArgs<Value>) -> Self {
        self.slots
            .get_or_insert_with(Vec::new)
            .push((name.to_owned(), DeclaredValue::Field(args)));
        self
    }

    #[must_use]
    pub fn pre_init(mut self, hook: Hook) -> Self {
        self.pre_init = Some(hook);
        self
    }

    #[must_use]
    pub fn post_init(mut self, hook: Hook) -> Self {
        self.post_init = Some(hook);
        self
    }

    /// A hand-written `__init__`; the synthesized one becomes `__prefab_init__`.
    #[must_use]
    pub fn user_init(mut self, init: impl Fn(&Rc<Instance>, CallArgs) -> Result<(), PrefabError> + 'static) -> Self {
        self.user.init = Some(Rc::new(init));
        self
    }

    #[must_use]
    pub fn user_repr(mut self, repr: impl Fn(&Rc<Instance>) -> Result<String, PrefabError> + 'static) -> Self {
        self.user.repr = Some(Rc::new(repr));
        self
    }

    #[must_use]
    pub fn user_eq(mut self, eq: impl Fn(&Rc<Instance>, &Value) -> Result<Comparison, PrefabError> + 'static) -> Self {
        self.user.eq = Some(Rc::new(eq));
        self
    }

    #[must_use]
    pub fn user_iter(mut self, iter: impl Fn(&Rc<Instance>) -> ValueIter + 'static) -> Self {
        self.user.iter = Some(Rc::new(iter));
        self
    }

    #[must_use]
    pub fn user_match_args<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.user.match_args = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Latest plain value bound to `name` in the body.
    pub(crate) fn plain_value(&self, name: &str) -> Option<&Value> {
        self.values.iter().rev().find_map(|(key, value)| match value {
            DeclaredValue::Plain(value) if key == name => Some(value),
            _ => None,
        })
    }
}
