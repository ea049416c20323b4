//! Field discovery and inheritance resolution, independent of either engine.

use std::rc::Rc;

use ahash::AHashSet;
use pretty_assertions::assert_eq;
use prefabs::{
    Behavior, ClassPlan, DeclaredValue, FieldArgs, InitStep, ParamKind, RecordDecl, RecordSpec, Registry, ResolveMode,
    SpecError, ValueSource, build_record_spec,
};

fn decl(name: &str, parents: &[&str]) -> RecordDecl<i64> {
    let mut decl = RecordDecl::new(name);
    decl.parents = parents.iter().map(|parent| (*parent).to_owned()).collect();
    decl
}

fn annotate(decl: &mut RecordDecl<i64>, name: &str, annotation: &str) {
    decl.annotations.push((name.to_owned(), annotation.to_owned()));
}

fn value(decl: &mut RecordDecl<i64>, name: &str, value: DeclaredValue<i64>) {
    decl.values.push((name.to_owned(), value));
}

fn spec(name: &str, parents: &[&str], fields: &[(&str, Option<i64>)]) -> RecordSpec<i64> {
    let mut record = decl(name, parents);
    for (field, default) in fields {
        annotate(&mut record, field, "int");
        if let Some(default) = default {
            value(&mut record, field, DeclaredValue::Plain(*default));
        }
    }
    build_record_spec(record).unwrap()
}

fn names<V>(fields: &indexmap::IndexMap<String, V>) -> Vec<&str> {
    fields.keys().map(String::as_str).collect()
}

#[test]
fn resolution_is_memoized() {
    let mut registry = Registry::new(ResolveMode::Static);
    registry.resolve_and_register(&spec("Base", &[], &[("a", None)])).unwrap();
    let child = spec("Child", &["Base"], &[("b", Some(1))]);

    let first = registry.resolve(&child).unwrap();
    registry.resolve_and_register(&spec("Unrelated", &[], &[])).unwrap();
    let second = registry.resolve(&child).unwrap();
    assert!(Rc::ptr_eq(&first, &second));
    assert_eq!(names(&second.fields), ["a", "b"]);

    registry.resolve_and_register(&spec("Base", &[], &[("z", None)])).unwrap();
    let third = registry.resolve(&child).unwrap();
    assert!(!Rc::ptr_eq(&first, &third));
    assert_eq!(names(&third.fields), ["z", "b"]);
}

#[test]
fn parents_fold_in_declared_order() {
    let mut registry = Registry::new(ResolveMode::Static);
    registry.resolve_and_register(&spec("Left", &[], &[("l", None), ("shared", None)])).unwrap();
    registry.resolve_and_register(&spec("Right", &[], &[("shared", Some(1)), ("r", Some(2))])).unwrap();
    let merged = registry
        .resolve_and_register(&spec("Both", &["Left", "Right"], &[("own", Some(3))]))
        .unwrap();

    assert_eq!(names(&merged.fields), ["l", "shared", "r", "own"]);
    assert_eq!(merged.fields["shared"].default.value(), Some(&1));
    assert_eq!(merged.local_fields, ["own"]);
    assert_eq!(merged.parents.len(), 2);
}

#[test]
fn ordering_is_checked_on_the_merged_view() {
    let mut registry = Registry::new(ResolveMode::Static);
    registry.resolve_and_register(&spec("Base", &[], &[("a", Some(1))])).unwrap();
    let error = registry.resolve(&spec("Child", &["Base"], &[("b", None)])).unwrap_err();
    assert_eq!(
        error,
        SpecError::NonDefaultAfterDefault {
            field: "b".to_owned(),
            defaults: vec!["a".to_owned()],
        }
    );
}

#[test]
fn unannotated_specifiers_switch_to_specifier_mode() {
    let mut record = decl("P", &[]);
    annotate(&mut record, "x", "int");
    value(&mut record, "y", DeclaredValue::Field(FieldArgs::new().default_value(2)));
    value(&mut record, "x", DeclaredValue::Plain(1));
    let spec = build_record_spec(record).unwrap();
    assert_eq!(names(&spec.fields), ["y"]);
    assert!(!spec.consumed.contains("x"));
}

#[test]
fn class_vars_and_kw_only_markers_are_not_fields() {
    let mut record = decl("P", &[]);
    annotate(&mut record, "a", "int");
    annotate(&mut record, "registry", "ClassVar[dict]");
    annotate(&mut record, "_", "KW_ONLY");
    annotate(&mut record, "b", "int");
    value(&mut record, "registry", DeclaredValue::Plain(0));
    let spec = build_record_spec(record).unwrap();

    assert_eq!(names(&spec.fields), ["a", "b"]);
    assert!(!spec.fields["a"].kw_only);
    assert!(spec.fields["b"].kw_only);
    assert!(spec.consumed.contains("_"));
    assert!(!spec.consumed.contains("registry"));
}

#[test]
fn declaration_errors() {
    let mut twice = decl("P", &[]);
    annotate(&mut twice, "_", "KW_ONLY");
    annotate(&mut twice, "__", "prefab_classes.KW_ONLY");
    assert_eq!(
        build_record_spec(twice).unwrap_err(),
        SpecError::KeywordOnlyTwice { record: "P".to_owned() }
    );

    let mut both = decl("P", &[]);
    annotate(&mut both, "a", "list");
    value(&mut both, "a", DeclaredValue::Field(FieldArgs::new().default_value(1).default_factory(2)));
    assert_eq!(
        build_record_spec(both).unwrap_err(),
        SpecError::DefaultAndFactory { name: "a".to_owned() }
    );

    let mut duplicate = decl("P", &[]);
    value(&mut duplicate, "a", DeclaredValue::Field(FieldArgs::new()));
    value(&mut duplicate, "a", DeclaredValue::Field(FieldArgs::new()));
    assert!(matches!(build_record_spec(duplicate), Err(SpecError::DuplicateField { .. })));

    let mut hidden = decl("P", &[]);
    value(&mut hidden, "a", DeclaredValue::Field(FieldArgs::new().init(false).kw_only(true)));
    assert_eq!(
        build_record_spec(hidden).unwrap_err(),
        SpecError::KeywordOnlyWithoutInit { name: "a".to_owned() }
    );
}

#[test]
fn unassigned_and_excluded_fields_need_a_source() {
    let mut registry = Registry::new(ResolveMode::Static);

    let mut unassigned = decl("P", &[]);
    value(&mut unassigned, "a", DeclaredValue::Field(FieldArgs::new().init(false)));
    let error = registry.resolve(&build_record_spec(unassigned).unwrap()).unwrap_err();
    assert_eq!(error, SpecError::UnassignedField { name: "a".to_owned() });

    let mut excluded = decl("P", &[]);
    value(&mut excluded, "a", DeclaredValue::Field(FieldArgs::new().exclude_field(true)));
    let error = registry.resolve(&build_record_spec(excluded).unwrap()).unwrap_err();
    assert_eq!(error, SpecError::ExcludedWithoutPostInit { name: "a".to_owned() });
}

#[test]
fn plans_follow_the_merged_fields() {
    let mut record = decl("P", &[]);
    annotate(&mut record, "a", "int");
    annotate(&mut record, "b", "list");
    annotate(&mut record, "c", "int");
    value(&mut record, "b", DeclaredValue::Field(FieldArgs::new().default_factory(7)));
    value(&mut record, "c", DeclaredValue::Field(FieldArgs::new().default_value(0).kw_only(true).repr(false)));
    let mut registry = Registry::new(ResolveMode::Static);
    let merged = registry.resolve_and_register(&build_record_spec(record).unwrap()).unwrap();

    let plan = ClassPlan::build(&merged, &AHashSet::new());
    assert_eq!(plan.init.name, "__init__");
    let kinds: Vec<(&str, ParamKind)> = plan.init.params.iter().map(|param| (param.name.as_str(), param.kind)).collect();
    assert_eq!(
        kinds,
        [("a", ParamKind::Positional), ("b", ParamKind::Positional), ("c", ParamKind::KeywordOnly)]
    );
    assert!(matches!(
        &plan.init.steps[1],
        InitStep::Assign { field, value: ValueSource::ParamOrFactory(7) } if field == "b"
    ));
    assert_eq!(plan.repr.map(|repr| repr.fields), Some(vec!["a".to_owned(), "b".to_owned()]));
    assert_eq!(plan.match_args, Some(vec!["a".to_owned(), "b".to_owned(), "c".to_owned()]));
    assert!(plan.iter.is_none());

    let overrides: AHashSet<Behavior> = [Behavior::Init, Behavior::Repr].into_iter().collect();
    let plan = ClassPlan::build(&merged, &overrides);
    assert_eq!(plan.init.name, "__prefab_init__");
    assert!(plan.repr.is_none());
    assert!(plan.eq.is_some());
}
