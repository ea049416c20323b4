//! Rewriting whole compilation units with the static engine.

use std::fs;

use pretty_assertions::assert_eq;
use prefabs::{
    CompileError, SpecError,
    compiled::{Rewriter, compile_prefabs, preview, rewrite_to_file},
};

fn rewrite(source: &str) -> String {
    compile_prefabs(source).unwrap_or_else(|error| panic!("rewrite failed: {error}\n{source}"))
}

#[test]
fn basic_record() {
    let source = r#"# COMPILE_PREFABS
from prefab_classes import prefab, attribute


@prefab(compile_prefab=True)
class Point:
    """A point."""
    x: int
    y: int = 0
    # tags are copied per instance
    tags: list = attribute(default_factory=list)

    def norm(self):
        return self.x
"#;
    let expected = r#"# COMPILE_PREFABS


class Point:
    """A point."""
    COMPILED = True
    PREFAB_FIELDS = ['x', 'y', 'tags']
    __match_args__ = ('x', 'y', 'tags')
    def __init__(self, x: int, y: int = 0, tags: list = None):
        self.x = x
        self.y = y
        self.tags = tags if tags is not None else list()
    def __repr__(self):
        return f'{type(self).__qualname__}(x={self.x!r}, y={self.y!r}, tags={self.tags!r})'
    def __eq__(self, other):
        return (self.x, self.y, self.tags) == (other.x, other.y, other.tags) if self.__class__ is other.__class__ else NotImplemented

    def norm(self):
        return self.x
"#;
    assert_eq!(rewrite(source), expected);
}

#[test]
fn body_on_the_header_line() {
    let source = "@prefab(compile_prefab=True, repr=False, eq=False, match_args=False, compile_plain=True)\nclass P: x: int\n";
    assert_eq!(rewrite(source), "class P:\n    def __init__(self, x: int):\n        self.x = x\n");
}

#[test]
fn other_decorators_and_code_are_kept() {
    let source = "\
import functools
from prefab_classes import prefab

def helper():
    return 1

@functools.total_ordering
@prefab(compile_prefab=True, compile_plain=True, eq=False, repr=False)
class Ordered:
    rank: int

    def __lt__(self, other):
        return self.rank < other.rank

value = helper()
";
    let out = rewrite(source);
    assert!(out.starts_with("import functools\n\ndef helper():\n    return 1\n\n@functools.total_ordering\nclass Ordered:\n"), "{out}");
    assert!(out.contains("    __match_args__ = ('rank',)\n"), "{out}");
    assert!(out.ends_with("        return self.rank < other.rank\n\nvalue = helper()\n"), "{out}");
}

#[test]
fn children_extend_parents_from_the_same_unit() {
    let source = "\
from prefab_classes import prefab

@prefab(compile_prefab=True)
class Base:
    a: int

@prefab(compile_prefab=True)
class Child(Base):
    a: int = 2
    b: int = 1
";
    let out = rewrite(source);
    assert!(out.contains("class Child(Base):\n"), "{out}");
    assert!(out.contains("    PREFAB_FIELDS = ['a', 'b']\n"), "{out}");
    assert!(out.contains("    def __init__(self, a: int = 2, b: int = 1):\n"), "{out}");
    assert!(out.contains("    def __init__(self, a: int):\n"), "{out}");
}

#[test]
fn parents_must_be_compiled_earlier_in_the_unit() {
    let later = "\
@prefab(compile_prefab=True)
class Child(Base):
    b: int = 1

@prefab(compile_prefab=True)
class Base:
    a: int = 0
";
    assert_eq!(
        compile_prefabs(later).unwrap_err(),
        CompileError::Spec {
            class: "Child".to_owned(),
            line: 2,
            error: SpecError::UnresolvedParent {
                record: "Child".to_owned(),
                parent: "Base".to_owned(),
            },
        }
    );

    let dynamic = "\
@prefab
class Base:
    a: int = 0

@prefab(compile_prefab=True)
class Child(Base):
    b: int = 1
";
    assert!(matches!(
        compile_prefabs(dynamic),
        Err(CompileError::Spec {
            error: SpecError::UnresolvedParent { .. },
            ..
        })
    ));

    let ordinary = "\
class Mixin:
    pass

@prefab(compile_prefab=True, compile_plain=True)
class Child(Mixin):
    b: int = 1
";
    assert!(rewrite(ordinary).contains("class Child(Mixin):\n    __match_args__ = ('b',)\n"));
}

#[test]
fn specification_errors_name_the_class() {
    let source = "\nx = 1\n\n@prefab(compile_prefab=True)\nclass Bad:\n    a: int = 1\n    b: int\n";
    let error = compile_prefabs(source).unwrap_err();
    assert_eq!(
        error.to_string(),
        "in class \"Bad\" (line 5): non-default argument follows default argument (defaults: a; non_default after default: b)"
    );
}

#[test]
fn user_methods_win() {
    let source = "\
@prefab(compile_prefab=True, compile_plain=True, eq=False)
class Custom:
    x: int
    __match_args__ = ('x', 'extra')

    def __init__(self, x):
        self.__prefab_init__(x * 2)

    def __repr__(self):
        return 'Custom'
";
    let out = rewrite(source);
    assert!(out.contains("    def __prefab_init__(self, x: int):\n        self.x = x\n"), "{out}");
    assert!(out.contains("    __match_args__ = ('x', 'extra')\n"), "{out}");
    assert!(!out.contains("__repr__(self):\n        return f'"), "{out}");
    assert_eq!(out.matches("def __repr__").count(), 1);
}

#[test]
fn hooks_and_excluded_fields() {
    let source = r#"
@prefab(compile_prefab=True, compile_plain=True, repr=False, eq=False)
class Reading:
    celsius: float
    raw: str = attribute(default="0", exclude_field=True)

    def __prefab_pre_init__(self, celsius):
        assert celsius > -273.15

    def __prefab_post_init__(self, raw):
        self.raw_length = len(raw)
"#;
    let out = rewrite(source);
    assert!(
        out.contains(
            "    def __init__(self, celsius: float, raw: str = \"0\"):\n        \
             self.__prefab_pre_init__(celsius=celsius)\n        \
             self.celsius = celsius\n        \
             self.__prefab_post_init__(raw=raw)\n"
        ),
        "{out}"
    );
    assert!(out.contains("__match_args__ = ('celsius',)"), "{out}");
}

#[test]
fn frozen_and_slotted_records() {
    let source = "\
@prefab(compile_prefab=True, compile_plain=True, frozen=True, compile_slots=True, repr=False, eq=False, match_args=False)
class Frozen:
    x: int
    y: str = 'd'
";
    let out = rewrite(source);
    let expected = "\
class Frozen:
    __slots__ = ('x', 'y')
    def __init__(self, x: int, y: str = 'd'):
        self.x = x
        self.y = y
    def __setattr__(self, name, value):
        if hasattr(self, name) or name not in {'x', 'y'}:
            raise TypeError(\"'Frozen' object does not support attribute assignment\")
        else:
            object.__setattr__(self, name, value)
    def __delattr__(self, name):
        raise TypeError(\"'Frozen' object does not support attribute deletion\")
";
    assert_eq!(out, expected);
}

#[test]
fn documented_slots_become_a_dict() {
    let source = "\
@prefab(compile_prefab=True, compile_plain=True, compile_slots=True)
class Doc:
    x: int = attribute(doc='horizontal')
    y: int = 0
";
    assert!(rewrite(source).contains("    __slots__ = {'x': 'horizontal', 'y': None}\n"));
}

#[test]
fn iteration_and_keyword_only() {
    let source = "\
from prefab_classes import prefab, KW_ONLY

@prefab(compile_prefab=True, compile_plain=True, iter=True, repr=False, eq=False)
class Options:
    name: str
    _: KW_ONLY
    verbose: bool = False
";
    let out = rewrite(source);
    assert!(out.contains("    def __init__(self, name: str, *, verbose: bool = False):\n"), "{out}");
    assert!(out.contains("    def __iter__(self):\n        yield self.name\n        yield self.verbose\n"), "{out}");
    assert!(out.contains("    __match_args__ = ('name', 'verbose')\n"), "{out}");
    assert!(!out.contains("KW_ONLY"), "{out}");
    assert!(!out.contains("_: "), "{out}");
}

#[test]
fn custom_library_module() {
    let source = "from mylib import prefab, attribute\n\n@prefab(compile_prefab=True, compile_plain=True)\nclass A:\n    x = attribute(default=1)\n";
    let out = Rewriter::new("mylib").rewrite(source).unwrap();
    assert!(!out.contains("mylib"), "{out}");
    let kept = compile_prefabs(source).unwrap();
    assert!(kept.starts_with("from mylib import prefab, attribute\n"), "{kept}");
}

#[test]
fn rewrite_to_file_adds_a_header() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("models.py");
    let dest = dir.path().join("models_compiled.py");
    fs::write(&src, "@prefab(compile_prefab=True, compile_plain=True)\nclass A:\n    x: int\n").unwrap();

    rewrite_to_file(&src, &dest).unwrap();
    let written = fs::read_to_string(&dest).unwrap();
    let header = format!(
        "# DO NOT MANUALLY EDIT THIS FILE\n# MODULE: models_compiled.py\n# GENERATED FROM: models.py\n# USING prefab_classes VERSION: {}\n\n",
        env!("CARGO_PKG_VERSION")
    );
    assert!(written.starts_with(&header), "{written}");
    assert_eq!(&written[header.len()..], preview(&src).unwrap());

    assert!(matches!(rewrite_to_file(&src, &src), Err(CompileError::SameFile(_))));
    let aliased = dir.path().join(".").join("models.py");
    assert!(matches!(rewrite_to_file(&src, &aliased), Err(CompileError::SameFile(_))));
}

#[test]
fn missing_source_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(preview(dir.path().join("absent.py")), Err(CompileError::Io { .. })));
}

#[test]
fn empty_records_are_allowed() {
    let out = rewrite("@prefab(compile_prefab=True)\nclass Empty:\n    pass\n");
    assert!(out.contains("    PREFAB_FIELDS = []\n"), "{out}");
    assert!(out.contains("    __match_args__ = ()\n"), "{out}");
    assert!(out.contains("    def __init__(self):\n        pass\n"), "{out}");
}
