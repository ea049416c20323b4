//! Record declarations and the per-record specification built from them.
//!
//! A [`RecordDecl`] is what either engine scraped from a class body: the
//! annotations and class-body values in declaration order, the parent names,
//! the decorator flags and the hook signatures. [`build_record_spec`] reduces it
//! to the local field map of a [`RecordSpec`]; merging with parents and the
//! checks that need the merged view live in [`crate::resolve`].

use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashSet;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    error::SpecError,
    field::{FieldArgs, FieldSpec},
    names::{CLASSVAR_NAME, KW_ONLY_NAME},
};

/// Decorator flags of a record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordFlags {
    /// Synthesize `__init__`, or `__prefab_init__` when the class defines its own.
    pub init: bool,
    pub repr: bool,
    pub eq: bool,
    pub iter: bool,
    pub match_args: bool,
    /// Every field becomes keyword-only.
    pub kw_only: bool,
    /// Reject writes to fields after construction.
    pub frozen: bool,
    /// Slot storage instead of a per-instance dictionary.
    #[serde(alias = "compile_slots")]
    pub slots: bool,
    /// Omit the processed marker and public field list from static output.
    #[serde(alias = "compile_plain")]
    pub plain: bool,
    /// Reject records without fields.
    pub strict: bool,
}

impl Default for RecordFlags {
    fn default() -> Self {
        Self {
            init: true,
            repr: true,
            eq: true,
            iter: false,
            match_args: true,
            kw_only: false,
            frozen: false,
            slots: false,
            plain: false,
            strict: false,
        }
    }
}

/// Parameters of a pre- or post-construction hook, receiver already removed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HookSignature {
    pub params: Vec<String>,
    /// The hook declares positional-only parameters, which cannot be bound by name.
    pub positional_only: bool,
}

impl HookSignature {
    pub fn new<S: Into<String>>(params: impl IntoIterator<Item = S>) -> Self {
        Self {
            params: params.into_iter().map(Into::into).collect(),
            positional_only: false,
        }
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.params.iter().any(|param| param == name)
    }
}

/// A class-body value bound to a name.
#[derive(Debug, Clone)]
pub enum DeclaredValue<E> {
    /// An ordinary value; becomes a default when the name is annotated.
    Plain(E),
    /// An `attribute(...)` field specifier.
    Field(FieldArgs<E>),
}

/// Everything an engine scraped from one class definition.
#[derive(Debug, Clone)]
pub struct RecordDecl<E> {
    pub name: String,
    /// `(name, annotation text)` in declaration order.
    pub annotations: Vec<(String, String)>,
    /// Class-body values in declaration order.
    pub values: Vec<(String, DeclaredValue<E>)>,
    /// Slot layout; when present it alone defines the fields.
    pub slots: Option<Vec<(String, DeclaredValue<E>)>>,
    pub parents: Vec<String>,
    pub flags: RecordFlags,
    pub pre_init: Option<HookSignature>,
    pub post_init: Option<HookSignature>,
}

impl<E> RecordDecl<E> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            annotations: Vec::new(),
            values: Vec::new(),
            slots: None,
            parents: Vec::new(),
            flags: RecordFlags::default(),
            pre_init: None,
            post_init: None,
        }
    }
}

/// Identity of one record declaration, used as the resolver's memo key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(u64);

impl RecordId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// One record type after local field discovery.
#[derive(Debug, Clone)]
pub struct RecordSpec<E> {
    pub id: RecordId,
    pub name: String,
    /// Fields declared on this record itself, in declaration order.
    pub fields: IndexMap<String, FieldSpec<E>>,
    pub parents: Vec<String>,
    pub flags: RecordFlags,
    pub pre_init: Option<HookSignature>,
    pub post_init: Option<HookSignature>,
    /// Class-body names consumed by field discovery; engines remove these from the body.
    pub consumed: AHashSet<String>,
}

fn is_classvar(annotation: &str) -> bool {
    annotation.contains(CLASSVAR_NAME)
}

fn is_kw_only_marker(annotation: &str) -> bool {
    annotation == KW_ONLY_NAME || annotation.strip_suffix(KW_ONLY_NAME).is_some_and(|rest| rest.ends_with('.'))
}

/// Folds the class-body values into one entry per name, later values replacing
/// earlier ones. Two field specifiers for one name is a duplicate.
fn fold_values<E>(record: &str, values: Vec<(String, DeclaredValue<E>)>) -> Result<IndexMap<String, DeclaredValue<E>>, SpecError> {
    let mut folded: IndexMap<String, DeclaredValue<E>> = IndexMap::with_capacity(values.len());
    for (name, value) in values {
        if matches!(value, DeclaredValue::Field(_)) && matches!(folded.get(&name), Some(DeclaredValue::Field(_))) {
            return Err(SpecError::DuplicateField {
                record: record.to_owned(),
                name,
            });
        }
        folded.insert(name, value);
    }
    Ok(folded)
}

fn value_into_spec<E>(name: &str, value: DeclaredValue<E>) -> Result<FieldSpec<E>, SpecError> {
    match value {
        DeclaredValue::Plain(value) => Ok(FieldSpec::with_default(value)),
        DeclaredValue::Field(args) => args.into_spec(name),
    }
}

fn mark_kw_only<E>(spec: &mut FieldSpec<E>) {
    if spec.init {
        spec.kw_only = true;
    }
}

/// Builds the local specification of one record.
///
/// Fields come from the slot layout when one is given. Otherwise, when every
/// name bound to a field specifier is also annotated, the annotations define
/// the fields in annotation order and plain values become defaults; if any
/// specifier is unannotated, only specifier-bound names are fields.
pub fn build_record_spec<E>(decl: RecordDecl<E>) -> Result<RecordSpec<E>, SpecError> {
    let RecordDecl {
        name,
        annotations,
        values,
        slots,
        parents,
        flags,
        pre_init,
        post_init,
    } = decl;

    let mut annotation_map: IndexMap<String, String> = IndexMap::with_capacity(annotations.len());
    for (field, annotation) in annotations {
        if annotation_map.contains_key(&field) {
            return Err(SpecError::DuplicateField { record: name, name: field });
        }
        annotation_map.insert(field, annotation);
    }

    let mut fields: IndexMap<String, FieldSpec<E>> = IndexMap::new();
    let mut consumed = AHashSet::new();

    if let Some(slots) = slots {
        for (field, value) in fold_values(&name, slots)? {
            let mut spec = value_into_spec(&field, value)?;
            if spec.declared_type.is_none() {
                spec.declared_type = annotation_map.get(&field).cloned();
            }
            if flags.kw_only {
                mark_kw_only(&mut spec);
            }
            consumed.insert(field.clone());
            fields.insert(field, spec);
        }
    } else {
        let mut values = fold_values(&name, values)?;
        let annotation_mode = values
            .iter()
            .filter(|(_, value)| matches!(value, DeclaredValue::Field(_)))
            .all(|(field, _)| annotation_map.contains_key(field));

        if annotation_mode {
            let mut kw_flag = false;
            for (field, annotation) in annotation_map {
                if is_classvar(&annotation) {
                    continue;
                }
                if is_kw_only_marker(&annotation) {
                    if kw_flag {
                        return Err(SpecError::KeywordOnlyTwice { record: name });
                    }
                    kw_flag = true;
                    consumed.insert(field);
                    continue;
                }
                let mut spec = match values.shift_remove(&field) {
                    Some(value) => value_into_spec(&field, value)?,
                    None => FieldSpec::new(),
                };
                spec.declared_type = Some(annotation);
                if kw_flag || flags.kw_only {
                    mark_kw_only(&mut spec);
                }
                consumed.insert(field.clone());
                fields.insert(field, spec);
            }
        } else {
            for (field, value) in values {
                let DeclaredValue::Field(args) = value else { continue };
                let mut spec = args.into_spec(&field)?;
                if let Some(annotation) = annotation_map.get(&field) {
                    spec.declared_type = Some(annotation.clone());
                }
                if flags.kw_only {
                    mark_kw_only(&mut spec);
                }
                consumed.insert(field.clone());
                fields.insert(field, spec);
            }
        }
    }

    Ok(RecordSpec {
        id: RecordId::next(),
        name,
        fields,
        parents,
        flags,
        pre_init,
        post_init,
        consumed,
    })
}
