//! Names shared by the reflective and static engines.
//!
//! These strings form the surface user code is written against, so both
//! engines must agree on them exactly.

/// Hook run before any field is assigned.
pub const PRE_INIT_FUNC: &str = "__prefab_pre_init__";
/// Hook run after the constructor body, responsible for its own fields.
pub const POST_INIT_FUNC: &str = "__prefab_post_init__";
/// Name of the synthesized constructor when the class defines `__init__` itself.
pub const PREFAB_INIT_FUNC: &str = "__prefab_init__";
/// Class decorator recognized by the static engine.
pub const DECORATOR_NAME: &str = "prefab";
/// Field specifier call recognized in class bodies.
pub const ATTRIBUTE_FUNCNAME: &str = "attribute";
/// Public, ordered list of non-excluded field names.
pub const FIELDS_ATTRIBUTE: &str = "PREFAB_FIELDS";
/// Processed-marker assignment emitted by the static engine.
pub const COMPILED_FLAG: &str = "COMPILED";
/// Decorator keyword that opts a class into static processing.
pub const COMPILE_ARGUMENT: &str = "compile_prefab";
/// Annotation marking class variables, which are never fields.
pub const CLASSVAR_NAME: &str = "ClassVar";
/// Annotation marking every following field keyword-only.
pub const KW_ONLY_NAME: &str = "KW_ONLY";
/// Module the runtime helpers are imported from.
pub const LIBRARY_MODULE: &str = "prefab_classes";

/// Which construction hook a parameter list belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::IntoStaticStr)]
pub enum HookKind {
    #[strum(serialize = "__prefab_pre_init__")]
    PreInit,
    #[strum(serialize = "__prefab_post_init__")]
    PostInit,
}

/// A synthesized behavior, named by the dunder it installs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::IntoStaticStr, strum::EnumIter)]
pub enum Behavior {
    #[strum(serialize = "__init__")]
    Init,
    #[strum(serialize = "__repr__")]
    Repr,
    #[strum(serialize = "__eq__")]
    Eq,
    #[strum(serialize = "__iter__")]
    Iter,
    #[strum(serialize = "__match_args__")]
    MatchArgs,
    #[strum(serialize = "__setattr__")]
    SetAttr,
    #[strum(serialize = "__delattr__")]
    DelAttr,
}

impl Behavior {
    /// Maps a dunder name back to the behavior it stands for.
    #[must_use]
    pub fn from_dunder(name: &str) -> Option<Self> {
        use strum::IntoEnumIterator;
        Self::iter().find(|behavior| <&'static str>::from(*behavior) == name)
    }
}
