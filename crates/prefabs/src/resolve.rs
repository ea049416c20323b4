//! Inheritance resolution.
//!
//! A record's merged field map is the fold of its parents' merged maps, in
//! declared parent order, followed by its own fields. A redeclared field keeps
//! the position of its first insertion and takes the newest definition.
//! Checks that depend on the merged view (hook arguments, excluded fields,
//! default ordering, strict emptiness) run here rather than in
//! [`build_record_spec`](crate::record::build_record_spec).

use std::rc::Rc;

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::{
    error::SpecError,
    field::FieldSpec,
    names::HookKind,
    record::{HookSignature, RecordFlags, RecordId, RecordSpec},
};

/// How a registry treats a parent name it does not know.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMode {
    /// Parents must be records already resolved in the same unit.
    Static,
    /// Unknown parents are ordinary base classes and contribute nothing.
    Live,
}

/// A record with its inheritance folded in.
#[derive(Debug)]
pub struct MergedSpec<E> {
    pub id: RecordId,
    pub name: String,
    pub fields: IndexMap<String, FieldSpec<E>>,
    /// Names declared by the record itself, in declaration order.
    pub local_fields: Vec<String>,
    pub flags: RecordFlags,
    pub pre_init: Option<HookSignature>,
    pub post_init: Option<HookSignature>,
    /// Record parents in declared order.
    pub parents: Vec<Rc<Self>>,
}

impl<E> MergedSpec<E> {
    #[must_use]
    pub fn hook(&self, kind: HookKind) -> Option<&HookSignature> {
        match kind {
            HookKind::PreInit => self.pre_init.as_ref(),
            HookKind::PostInit => self.post_init.as_ref(),
        }
    }

    /// Whether `name` is assigned by the post-construction hook.
    #[must_use]
    pub fn is_post_init_arg(&self, name: &str) -> bool {
        self.post_init.as_ref().is_some_and(|hook| hook.contains(name))
    }

    /// Non-excluded field names in merged order.
    pub fn public_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|(_, field)| field.is_public())
            .map(|(name, _)| name.as_str())
    }

    fn path_to(&self, target: &str) -> Option<Vec<String>> {
        if self.name == target {
            return Some(vec![self.name.clone()]);
        }
        self.parents.iter().find_map(|parent| {
            let mut path = parent.path_to(target)?;
            path.insert(0, self.name.clone());
            Some(path)
        })
    }
}

/// Folds `spec` over its already-merged `parents` and validates the result.
pub fn merge<E: Clone>(spec: &RecordSpec<E>, parents: Vec<Rc<MergedSpec<E>>>) -> Result<MergedSpec<E>, SpecError> {
    for parent in &parents {
        if let Some(mut chain) = parent.path_to(&spec.name) {
            if chain.len() == 1 {
                return Err(SpecError::SelfInheritance { name: spec.name.clone() });
            }
            chain.insert(0, spec.name.clone());
            return Err(SpecError::InheritanceCycle { chain });
        }
    }

    let mut fields: IndexMap<String, FieldSpec<E>> = IndexMap::new();
    for parent in &parents {
        for (name, field) in &parent.fields {
            fields.insert(name.clone(), field.clone());
        }
    }
    for (name, field) in &spec.fields {
        fields.insert(name.clone(), field.clone());
    }

    let inherited_hook = |kind: HookKind| parents.iter().find_map(|parent| parent.hook(kind).cloned());
    let pre_init = spec.pre_init.clone().or_else(|| inherited_hook(HookKind::PreInit));
    let post_init = spec.post_init.clone().or_else(|| inherited_hook(HookKind::PostInit));

    let merged = MergedSpec {
        id: spec.id,
        name: spec.name.clone(),
        fields,
        local_fields: spec.fields.keys().cloned().collect(),
        flags: spec.flags,
        pre_init,
        post_init,
        parents,
    };
    validate(&merged)?;
    Ok(merged)
}

fn validate<E>(merged: &MergedSpec<E>) -> Result<(), SpecError> {
    for kind in [HookKind::PreInit, HookKind::PostInit] {
        let Some(hook) = merged.hook(kind) else { continue };
        if hook.positional_only {
            return Err(SpecError::PositionalOnlyHookArgument { hook: kind });
        }
        if let Some(argument) = hook.params.iter().find(|param| !merged.fields.contains_key(*param)) {
            return Err(SpecError::HookArgumentNotField {
                hook: kind,
                argument: argument.clone(),
            });
        }
    }

    let mut defaults: Vec<String> = Vec::new();
    for (name, field) in &merged.fields {
        let post_assigned = merged.is_post_init_arg(name);
        if field.exclude_field && !post_assigned {
            return Err(SpecError::ExcludedWithoutPostInit { name: name.clone() });
        }
        if !field.init && !field.has_default() && !post_assigned {
            return Err(SpecError::UnassignedField { name: name.clone() });
        }
        if field.is_positional_init() {
            if field.has_default() {
                defaults.push(name.clone());
            } else if !defaults.is_empty() {
                return Err(SpecError::NonDefaultAfterDefault {
                    field: name.clone(),
                    defaults,
                });
            }
        }
    }

    if merged.flags.strict && merged.fields.is_empty() {
        return Err(SpecError::EmptyRecord {
            name: merged.name.clone(),
        });
    }
    Ok(())
}

/// Ordered name → merged spec table for one resolution context.
///
/// Resolution is memoized per record, keyed by the parent entries it was
/// resolved against, so re-resolving against an unchanged registry returns
/// the same merged spec.
#[derive(Debug)]
pub struct Registry<E> {
    mode: ResolveMode,
    records: IndexMap<String, Rc<MergedSpec<E>>>,
    memo: AHashMap<RecordId, (Vec<Option<RecordId>>, Rc<MergedSpec<E>>)>,
}

impl<E: Clone> Registry<E> {
    #[must_use]
    pub fn new(mode: ResolveMode) -> Self {
        Self {
            mode,
            records: IndexMap::new(),
            memo: AHashMap::new(),
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Rc<MergedSpec<E>>> {
        self.records.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.records.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Resolves `spec` against the current entries without registering it.
    pub fn resolve(&mut self, spec: &RecordSpec<E>) -> Result<Rc<MergedSpec<E>>, SpecError> {
        let mut snapshot = Vec::with_capacity(spec.parents.len());
        let mut parents = Vec::with_capacity(spec.parents.len());
        for parent in &spec.parents {
            if *parent == spec.name && !self.records.contains_key(parent) {
                return Err(SpecError::SelfInheritance { name: spec.name.clone() });
            }
            match self.records.get(parent) {
                Some(merged) => {
                    snapshot.push(Some(merged.id));
                    parents.push(Rc::clone(merged));
                }
                None if self.mode == ResolveMode::Live => snapshot.push(None),
                None => {
                    return Err(SpecError::UnresolvedParent {
                        record: spec.name.clone(),
                        parent: parent.clone(),
                    });
                }
            }
        }

        if let Some((seen, merged)) = self.memo.get(&spec.id)
            && *seen == snapshot
        {
            return Ok(Rc::clone(merged));
        }

        let merged = Rc::new(merge(spec, parents)?);
        tracing::trace!(record = %spec.name, fields = merged.fields.len(), "resolved record");
        self.memo.insert(spec.id, (snapshot, Rc::clone(&merged)));
        Ok(merged)
    }

    /// Makes `merged` visible to later records under its name.
    pub fn register(&mut self, merged: Rc<MergedSpec<E>>) {
        self.records.insert(merged.name.clone(), merged);
    }

    pub fn resolve_and_register(&mut self, spec: &RecordSpec<E>) -> Result<Rc<MergedSpec<E>>, SpecError> {
        let merged = self.resolve(spec)?;
        self.register(Rc::clone(&merged));
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        field::FieldArgs,
        record::{DeclaredValue, RecordDecl, build_record_spec},
    };

    fn record(name: &str, parents: &[&str], fields: &[(&str, Option<i64>)]) -> RecordSpec<i64> {
        let mut decl = RecordDecl::new(name);
        decl.parents = parents.iter().map(|p| (*p).to_owned()).collect();
        for (field, default) in fields {
            let mut args = FieldArgs::new();
            if let Some(value) = default {
                args = args.default_value(*value);
            }
            decl.values.push(((*field).to_owned(), DeclaredValue::Field(args)));
        }
        build_record_spec(decl).unwrap()
    }

    #[test]
    fn redeclared_field_keeps_first_position() {
        let mut registry = Registry::new(ResolveMode::Static);
        registry
            .resolve_and_register(&record("Base", &[], &[("a", None), ("b", Some(1))]))
            .unwrap();
        let merged = registry
            .resolve_and_register(&record("Child", &["Base"], &[("c", Some(3)), ("a", Some(9))]))
            .unwrap();
        assert_eq!(merged.fields.keys().collect::<Vec<_>>(), ["a", "b", "c"]);
        assert_eq!(merged.fields["a"].default.value(), Some(&9));
    }

    #[test]
    fn unresolved_parent_depends_on_mode() {
        let spec = record("Child", &["Missing"], &[("a", None)]);
        let mut strict = Registry::new(ResolveMode::Static);
        assert!(matches!(strict.resolve(&spec), Err(SpecError::UnresolvedParent { .. })));
        let mut live = Registry::new(ResolveMode::Live);
        assert_eq!(live.resolve(&spec).unwrap().fields.len(), 1);
    }

    #[test]
    fn self_inheritance_is_rejected() {
        let spec = record("Loop", &["Loop"], &[]);
        let mut registry = Registry::new(ResolveMode::Static);
        assert_eq!(
            registry.resolve(&spec).unwrap_err(),
            SpecError::SelfInheritance { name: "Loop".to_owned() }
        );
    }

    #[test]
    fn cycle_through_shadowed_name_is_rejected() {
        let mut registry = Registry::new(ResolveMode::Static);
        registry.resolve_and_register(&record("A", &[], &[])).unwrap();
        registry.resolve_and_register(&record("B", &["A"], &[])).unwrap();
        let err = registry.resolve(&record("A", &["B"], &[])).unwrap_err();
        assert_eq!(
            err,
            SpecError::InheritanceCycle {
                chain: vec!["A".to_owned(), "B".to_owned(), "A".to_owned()]
            }
        );
    }
}
