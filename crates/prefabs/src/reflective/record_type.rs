//! Live record types and their instances.

use std::{
    cell::{OnceCell, RefCell},
    fmt,
    rc::Rc,
};

use ahash::AHashSet;
use indexmap::IndexMap;

use crate::{
    error::{CallError, Mutation, PrefabError, SpecError},
    field::{FieldArgs, FieldDefault},
    names::{Behavior, FIELDS_ATTRIBUTE, HookKind, PREFAB_INIT_FUNC},
    plan::ClassPlan,
    record::{DeclaredValue, RecordDecl, RecordFlags, build_record_spec},
    resolve::{MergedSpec, Registry, ResolveMode},
    reflective::{
        Value,
        args::CallArgs,
        lower::{GuardFn, lower_eq, lower_frozen, lower_init, lower_iter, lower_repr},
        namespace::{ClassNamespace, EqFn, Hook, InitFn, IterFn, ReprFn, ValueIter},
    },
};

/// Outcome of a record's `__eq__`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Equal,
    NotEqual,
    /// The other operand is not the same record type; never raised as an error.
    NotImplemented,
}

/// Behaviors lowered on first use.
#[derive(Default)]
struct Compiled {
    init: OnceCell<InitFn>,
    repr: OnceCell<ReprFn>,
    eq: OnceCell<EqFn>,
    iter: OnceCell<IterFn>,
    guard: OnceCell<GuardFn>,
}

/// State installed by [`prefab`].
struct Synthesized {
    merged: Rc<MergedSpec<Value>>,
    plan: ClassPlan<Value>,
    pre_init: Option<Hook>,
    post_init: Option<Hook>,
    /// Class-body values that did not become fields.
    class_attrs: IndexMap<String, Value>,
    compiled: Compiled,
}

/// A live type object.
///
/// Created plain with [`RecordType::new`]; [`prefab`] turns it into a record
/// type in place, exactly once.
pub struct RecordType {
    name: String,
    namespace: ClassNamespace,
    parents: Vec<Rc<RecordType>>,
    synthesized: OnceCell<Synthesized>,
}

impl fmt::Debug for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordType")
            .field("name", &self.name)
            .field("processed", &self.is_processed())
            .finish_non_exhaustive()
    }
}

impl RecordType {
    pub fn new(name: &str, namespace: ClassNamespace, parents: Vec<Rc<Self>>) -> Rc<Self> {
        Rc::new(Self {
            name: name.to_owned(),
            namespace,
            parents,
            synthesized: OnceCell::new(),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn parents(&self) -> &[Rc<Self>] {
        &self.parents
    }

    #[must_use]
    pub fn is_processed(&self) -> bool {
        self.synthesized.get().is_some()
    }

    fn synthesized(&self) -> Result<&Synthesized, PrefabError> {
        self.synthesized.get().ok_or_else(|| PrefabError::NotProcessed { name: self.name.clone() })
    }

    /// The merged field map this type was synthesized from.
    pub fn merged_spec(&self) -> Result<&Rc<MergedSpec<Value>>, PrefabError> {
        Ok(&self.synthesized()?.merged)
    }

    /// The public, ordered, non-excluded field names (`PREFAB_FIELDS`).
    pub fn fields(&self) -> Result<&[String], PrefabError> {
        Ok(&self.synthesized()?.plan.public_fields)
    }

    /// `__match_args__`, hand-written or synthesized.
    #[must_use]
    pub fn match_args(&self) -> Option<Vec<String>> {
        self.find(&|ty: &Self| {
            ty.namespace.user.match_args.clone().or_else(|| ty.synthesized.get()?.plan.match_args.clone())
        })
    }

    /// Slot names mapped to their documentation, for slot-storage types.
    #[must_use]
    pub fn slot_docs(&self) -> Option<IndexMap<String, Option<String>>> {
        let synthesized = self.synthesized.get()?;
        synthesized.plan.slots.as_ref()?;
        Some(
            synthesized
                .merged
                .local_fields
                .iter()
                .filter_map(|name| Some((name.clone(), synthesized.merged.fields.get(name)?.doc.clone())))
                .collect(),
        )
    }

    /// Whether `behavior` has been lowered to a closure yet.
    #[must_use]
    pub fn is_compiled(&self, behavior: Behavior) -> bool {
        let Some(synthesized) = self.synthesized.get() else {
            return false;
        };
        let compiled = &synthesized.compiled;
        match behavior {
            Behavior::Init => compiled.init.get().is_some(),
            Behavior::Repr => compiled.repr.get().is_some(),
            Behavior::Eq => compiled.eq.get().is_some(),
            Behavior::Iter => compiled.iter.get().is_some(),
            Behavior::MatchArgs => synthesized.plan.match_args.is_some(),
            Behavior::SetAttr | Behavior::DelAttr => compiled.guard.get().is_some(),
        }
    }

    /// Python source equivalent to the synthesized `behavior`, with
    /// non-literal defaults and factories named as closure-table entries.
    #[must_use]
    pub fn generated_source(&self, behavior: Behavior) -> Option<String> {
        crate::compiled::render_behavior(&self.synthesized.get()?.plan, behavior)
    }

    /// Class attribute lookup through the type and its parents.
    #[must_use]
    pub fn class_attr(&self, name: &str) -> Option<Value> {
        self.find(&|ty: &Self| match ty.synthesized.get() {
            Some(synthesized) if name == FIELDS_ATTRIBUTE => Some(Value::list(
                synthesized.plan.public_fields.iter().map(|field| Value::str(field)).collect(),
            )),
            Some(synthesized) => synthesized.class_attrs.get(name).cloned(),
            None => ty.namespace.plain_value(name).cloned(),
        })
    }

    /// Depth-first search over this type and its ancestors.
    fn find<T>(&self, pick: &dyn Fn(&Self) -> Option<T>) -> Option<T> {
        pick(self).or_else(|| self.parents.iter().find_map(|parent| parent.find(pick)))
    }

    fn own_hook(&self, kind: HookKind) -> Option<Hook> {
        match kind {
            HookKind::PreInit => self.namespace.pre_init.clone(),
            HookKind::PostInit => self.namespace.post_init.clone(),
        }
    }

    fn own_init(&self) -> Option<InitFn> {
        if let Some(init) = &self.namespace.user.init {
            return Some(Rc::clone(init));
        }
        let synthesized = self.synthesized.get()?;
        if synthesized.plan.init.name == PREFAB_INIT_FUNC {
            return None;
        }
        Some(synthesized.compiled_init(&self.name))
    }

    fn own_repr(&self) -> Option<ReprFn> {
        if let Some(repr) = &self.namespace.user.repr {
            return Some(Rc::clone(repr));
        }
        let synthesized = self.synthesized.get()?;
        let plan = synthesized.plan.repr.as_ref()?;
        Some(Rc::clone(synthesized.compiled.repr.get_or_init(|| lower_repr(plan))))
    }

    fn own_eq(&self) -> Option<EqFn> {
        if let Some(eq) = &self.namespace.user.eq {
            return Some(Rc::clone(eq));
        }
        let synthesized = self.synthesized.get()?;
        let plan = synthesized.plan.eq.as_ref()?;
        Some(Rc::clone(synthesized.compiled.eq.get_or_init(|| lower_eq(plan))))
    }

    fn own_iter(&self) -> Option<IterFn> {
        if let Some(iter) = &self.namespace.user.iter {
            return Some(Rc::clone(iter));
        }
        let synthesized = self.synthesized.get()?;
        let plan = synthesized.plan.iter.as_ref()?;
        Some(Rc::clone(synthesized.compiled.iter.get_or_init(|| lower_iter(plan))))
    }

    fn own_guard(&self) -> Option<GuardFn> {
        let synthesized = self.synthesized.get()?;
        let plan = synthesized.plan.frozen.as_ref()?;
        Some(Rc::clone(synthesized.compiled.guard.get_or_init(|| lower_frozen(plan))))
    }

    fn uses_slots(&self) -> bool {
        self.synthesized.get().is_some_and(|synthesized| synthesized.plan.slots.is_some())
    }

    fn slot_index(&self, name: &str) -> Option<usize> {
        self.synthesized.get()?.merged.fields.get_index_of(name)
    }

    /// Calls the type: allocates an instance and runs its constructor.
    pub fn call(self: &Rc<Self>, args: CallArgs) -> Result<Rc<Instance>, PrefabError> {
        let storage = if self.uses_slots() {
            let len = self.synthesized.get().map_or(0, |synthesized| synthesized.merged.fields.len());
            Storage::Slots(vec![None; len])
        } else {
            Storage::Dict(IndexMap::new())
        };
        let instance = Rc::new(Instance {
            record: Rc::clone(self),
            storage: RefCell::new(storage),
        });
        match self.find(&Self::own_init) {
            Some(init) => init(&instance, args)?,
            None if args.is_empty() => {}
            None if args.positional.is_empty() => {
                let name = args.keywords.into_keys().next().unwrap_or_default();
                return Err(CallError::UnexpectedKeyword {
                    callee: self.name.clone(),
                    name,
                }
                .into());
            }
            None => {
                return Err(CallError::TooManyPositional {
                    callee: self.name.clone(),
                    expected: 1,
                    given: args.positional.len() + 1,
                }
                .into());
            }
        }
        Ok(instance)
    }
}

impl Synthesized {
    fn compiled_init(&self, record: &str) -> InitFn {
        Rc::clone(self.compiled.init.get_or_init(|| {
            lower_init(record, &self.plan.init, self.pre_init.clone(), self.post_init.clone())
        }))
    }
}

/// Turns `record` into a record type in place.
///
/// Fails with [`PrefabError::AlreadyProcessed`] on a second call, and with a
/// specification error if the class body does not describe a valid record.
pub fn prefab(record: &Rc<RecordType>, flags: RecordFlags) -> Result<(), PrefabError> {
    if record.is_processed() {
        return Err(PrefabError::AlreadyProcessed { name: record.name.clone() });
    }

    let namespace = &record.namespace;
    let hook = |kind| record.find(&|ty: &RecordType| ty.own_hook(kind));
    let pre_init = hook(HookKind::PreInit);
    let post_init = hook(HookKind::PostInit);

    let mut flags = flags;
    flags.slots |= namespace.slots.is_some();
    let decl = RecordDecl {
        name: record.name.clone(),
        annotations: namespace.annotations.clone(),
        values: namespace.values.clone(),
        slots: namespace.slots.clone(),
        parents: record.parents.iter().map(|parent| parent.name.clone()).collect(),
        flags,
        pre_init: pre_init.as_ref().map(|hook| hook.signature.clone()),
        post_init: post_init.as_ref().map(|hook| hook.signature.clone()),
    };
    let spec = build_record_spec(decl)?;

    let mut registry = Registry::new(ResolveMode::Live);
    for parent in &record.parents {
        if let Some(synthesized) = parent.synthesized.get() {
            registry.register(Rc::clone(&synthesized.merged));
        }
    }
    let merged = registry.resolve(&spec)?;

    for (name, field) in &merged.fields {
        if let FieldDefault::Factory(factory) = &field.default
            && !matches!(factory, Value::Callable(_))
        {
            return Err(SpecError::InvalidArgument {
                context: format!("field {name:?}"),
                argument: "default_factory".to_owned(),
                reason: format!("{} object is not callable", factory.type_name()).into(),
            }
            .into());
        }
    }

    let overrides: AHashSet<Behavior> = [Behavior::Init, Behavior::Repr, Behavior::Eq, Behavior::Iter, Behavior::MatchArgs]
        .into_iter()
        .filter(|behavior| namespace.user.defines(*behavior))
        .collect();
    let plan = ClassPlan::build(&merged, &overrides);

    let mut class_attrs = IndexMap::new();
    for (name, value) in &namespace.values {
        if let DeclaredValue::Plain(value) = value
            && !spec.consumed.contains(name)
        {
            class_attrs.insert(name.clone(), value.clone());
        }
    }

    tracing::debug!(
        record = %record.name,
        fields = merged.fields.len(),
        init = plan.init.name,
        frozen = flags.frozen,
        slots = flags.slots,
        "synthesized record type"
    );

    let synthesized = Synthesized {
        merged,
        plan,
        pre_init,
        post_init,
        class_attrs,
        compiled: Compiled::default(),
    };
    record
        .synthesized
        .set(synthesized)
        .map_err(|_| PrefabError::AlreadyProcessed { name: record.name.clone() })
}

/// Creates and processes a record type from `(name, field)` pairs.
pub fn build_prefab(
    name: &str,
    fields: Vec<(String, FieldArgs<Value>)>,
    parents: Vec<Rc<RecordType>>,
    namespace: Option<ClassNamespace>,
    flags: RecordFlags,
) -> Result<Rc<RecordType>, PrefabError> {
    let mut namespace = namespace.unwrap_or_default();
    for (field, args) in fields {
        namespace = namespace.field(&field, args);
    }
    let record = RecordType::new(name, namespace, parents);
    prefab(&record, flags)?;
    Ok(record)
}

#[derive(Debug)]
enum Storage {
    Dict(IndexMap<String, Value>),
    Slots(Vec<Option<Value>>),
}

/// An instance of a live type.
pub struct Instance {
    record: Rc<RecordType>,
    storage: RefCell<Storage>,
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("record", &self.record.name)
            .field("storage", &self.storage)
            .finish()
    }
}

impl Instance {
    #[must_use]
    pub fn record_type(&self) -> &Rc<RecordType> {
        &self.record
    }

    fn no_attribute(&self, name: &str) -> PrefabError {
        PrefabError::NoAttribute {
            type_name: self.record.name.clone(),
            attribute: name.to_owned(),
        }
    }

    /// Whether the instance itself holds `name`, ignoring class attributes.
    #[must_use]
    pub fn has_own_attr(&self, name: &str) -> bool {
        match &*self.storage.borrow() {
            Storage::Dict(values) => values.contains_key(name),
            Storage::Slots(values) => self
                .record
                .slot_index(name)
                .is_some_and(|index| values.get(index).is_some_and(Option::is_some)),
        }
    }

    #[must_use]
    pub fn has_attr(&self, name: &str) -> bool {
        self.has_own_attr(name) || self.record.class_attr(name).is_some()
    }

    pub fn get_attr(&self, name: &str) -> Result<Value, PrefabError> {
        let own = match &*self.storage.borrow() {
            Storage::Dict(values) => values.get(name).cloned(),
            Storage::Slots(values) => self
                .record
                .slot_index(name)
                .and_then(|index| values.get(index).cloned().flatten()),
        };
        own.or_else(|| self.record.class_attr(name))
            .ok_or_else(|| self.no_attribute(name))
    }

    /// `setattr`, going through a frozen record's guard.
    pub fn set_attr(&self, name: &str, value: Value) -> Result<(), PrefabError> {
        if let Some(guard) = self.record.find(&RecordType::own_guard) {
            guard(self, name, Mutation::Assign)?;
        }
        match &mut *self.storage.borrow_mut() {
            Storage::Dict(values) => {
                values.insert(name.to_owned(), value);
            }
            Storage::Slots(values) => {
                let slot = self
                    .record
                    .slot_index(name)
                    .and_then(|index| values.get_mut(index))
                    .ok_or_else(|| self.no_attribute(name))?;
                *slot = Some(value);
            }
        }
        Ok(())
    }

    /// `delattr`, going through a frozen record's guard.
    pub fn del_attr(&self, name: &str) -> Result<(), PrefabError> {
        if let Some(guard) = self.record.find(&RecordType::own_guard) {
            guard(self, name, Mutation::Delete)?;
        }
        let removed = match &mut *self.storage.borrow_mut() {
            Storage::Dict(values) => values.shift_remove(name).is_some(),
            Storage::Slots(values) => self
                .record
                .slot_index(name)
                .and_then(|index| values.get_mut(index))
                .and_then(Option::take)
                .is_some(),
        };
        if removed { Ok(()) } else { Err(self.no_attribute(name)) }
    }

    /// `repr(instance)`.
    pub fn repr(self: &Rc<Self>) -> Result<String, PrefabError> {
        match self.record.find(&RecordType::own_repr) {
            Some(repr) => repr(self),
            None => Ok(format!("<{} object>", self.record.name)),
        }
    }

    /// `instance.__eq__(other)`, without the reflected fallback of `==`.
    pub fn compare(self: &Rc<Self>, other: &Value) -> Result<Comparison, PrefabError> {
        match self.record.find(&RecordType::own_eq) {
            Some(eq) => eq(self, other),
            None => Ok(if matches!(other, Value::Instance(other) if Rc::ptr_eq(self, other)) {
                Comparison::Equal
            } else {
                Comparison::NotImplemented
            }),
        }
    }

    /// `a == b`: tries `a.__eq__(b)`, then `b.__eq__(a)`, then identity.
    pub fn equals(a: &Rc<Self>, b: &Rc<Self>) -> Result<bool, PrefabError> {
        let forward = a.compare(&Value::Instance(Rc::clone(b)))?;
        let outcome = match forward {
            Comparison::NotImplemented => b.compare(&Value::Instance(Rc::clone(a)))?,
            outcome => outcome,
        };
        Ok(match outcome {
            Comparison::Equal => true,
            Comparison::NotEqual => false,
            Comparison::NotImplemented => Rc::ptr_eq(a, b),
        })
    }

    /// `iter(instance)`: a fresh lazy sequence per call.
    pub fn iter(self: &Rc<Self>) -> Result<ValueIter, PrefabError> {
        match self.record.find(&RecordType::own_iter) {
            Some(iter) => Ok(iter(self)),
            None => Err(PrefabError::NotIterable {
                type_name: self.record.name.clone(),
            }),
        }
    }

    /// Runs the synthesized constructor when the class kept its own `__init__`.
    pub fn prefab_init(self: &Rc<Self>, args: CallArgs) -> Result<(), PrefabError> {
        let init = self
            .record
            .find(&|ty: &RecordType| {
                let synthesized = ty.synthesized.get()?;
                (synthesized.plan.init.name == PREFAB_INIT_FUNC).then(|| synthesized.compiled_init(&ty.name))
            })
            .ok_or_else(|| self.no_attribute(PREFAB_INIT_FUNC))?;
        init(self, args)
    }
}
