//! Error types for specification checks, synthesized behaviors and source rewriting.
//!
//! Specification errors are raised while a record is being synthesized and are
//! never deferred to first use. Immutability and call errors are raised per
//! violating call and leave the instance usable.

use std::borrow::Cow;

use crate::names::HookKind;

/// A record declaration that cannot be synthesized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpecError {
    #[error("field {name:?} is declared more than once in {record:?}")]
    DuplicateField { record: String, name: String },
    #[error("field {name:?} cannot define both a default value and a default factory")]
    DefaultAndFactory { name: String },
    #[error("field {name:?} cannot be keyword only if it is not in init")]
    KeywordOnlyWithoutInit { name: String },
    #[error("{name} is an excluded attribute but is not passed to {}", HookKind::PostInit)]
    ExcludedWithoutPostInit { name: String },
    #[error(
        "non-default argument follows default argument (defaults: {}; non_default after default: {field})",
        defaults.join(", ")
    )]
    NonDefaultAfterDefault { field: String, defaults: Vec<String> },
    #[error("field {name:?} is not in init, has no default and is not passed to {}", HookKind::PostInit)]
    UnassignedField { name: String },
    #[error("{argument} argument in {hook} is not a valid attribute")]
    HookArgumentNotField { hook: HookKind, argument: String },
    #[error("positional only arguments are not supported in {hook}")]
    PositionalOnlyHookArgument { hook: HookKind },
    #[error("class {record:?} can not be defined as keyword only twice")]
    KeywordOnlyTwice { record: String },
    #[error("record {name:?} cannot inherit from itself")]
    SelfInheritance { name: String },
    #[error("inheritance cycle: {}", chain.join(" -> "))]
    InheritanceCycle { chain: Vec<String> },
    #[error("record {record:?} inherits from {parent:?}, which is not a record resolved earlier in the same unit")]
    UnresolvedParent { record: String, parent: String },
    #[error("record {name:?} declares no fields")]
    EmptyRecord { name: String },
    #[error("invalid {argument:?} in {context}: {reason}")]
    InvalidArgument {
        context: String,
        argument: String,
        reason: Cow<'static, str>,
    },
}

/// The kind of write a frozen instance refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Mutation {
    #[strum(serialize = "assignment")]
    Assign,
    #[strum(serialize = "deletion")]
    Delete,
}

/// Raised by a frozen record for each rejected write or delete.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{type_name}' object does not support attribute {mutation}")]
pub struct ImmutabilityError {
    pub type_name: String,
    pub attribute: String,
    pub mutation: Mutation,
}

/// Argument binding failures for a synthesized constructor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallError {
    #[error("{callee}() takes {expected} positional arguments but {given} were given")]
    TooManyPositional {
        callee: String,
        expected: usize,
        given: usize,
    },
    #[error("{callee}() got an unexpected keyword argument {name:?}")]
    UnexpectedKeyword { callee: String, name: String },
    #[error("{callee}() got multiple values for argument {name:?}")]
    MultipleValues { callee: String, name: String },
    #[error("{callee}() missing {} required argument(s): {}", names.len(), names.join(", "))]
    MissingArguments { callee: String, names: Vec<String> },
}

/// Location-carrying failure from the static engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    /// The unit is not valid Python.
    #[error("syntax error at line {line}, column {column}: {message}")]
    Syntax {
        message: String,
        line: usize,
        column: usize,
    },
    /// A compiled record in the unit failed a specification check.
    #[error("in class {class:?} (line {line}): {error}")]
    Spec {
        class: String,
        line: usize,
        #[source]
        error: SpecError,
    },
    /// `rewrite_to_file` was asked to overwrite its own input.
    #[error("can not overwrite source file {0:?}")]
    SameFile(std::path::PathBuf),
    #[error("{path:?}: {message}")]
    Io { path: std::path::PathBuf, message: String },
}

/// Any failure surfaced by a live record type.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PrefabError {
    #[error(transparent)]
    Spec(#[from] SpecError),
    #[error("decorated class {name:?} has already been processed as a prefab")]
    AlreadyProcessed { name: String },
    #[error("class {name:?} has not been processed as a prefab")]
    NotProcessed { name: String },
    #[error(transparent)]
    Immutable(#[from] ImmutabilityError),
    #[error(transparent)]
    Call(#[from] CallError),
    #[error("'{type_name}' object has no attribute '{attribute}'")]
    NoAttribute { type_name: String, attribute: String },
    #[error("'{type_name}' object is not iterable")]
    NotIterable { type_name: String },
    /// A formatter output that is not a reconstructable record expression.
    #[error("can not evaluate {text:?}: {reason}")]
    Eval { text: String, reason: String },
    #[error("{name:?} is not a known record type")]
    UnknownType { name: String },
    /// Raised from inside a user hook; aborts construction.
    #[error("{message}")]
    Hook { message: String },
    #[error(transparent)]
    Compile(#[from] CompileError),
}

/// Failure to load a compilation unit through a loader chain.
///
/// Cache problems never appear here: an unreadable or stale artifact is a
/// cache miss, and a failed artifact write only logs a warning.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("{path:?}: {message}")]
    Io { path: std::path::PathBuf, message: String },
    /// A marked unit is not valid UTF-8.
    #[error("can not decode {path:?}: {message}")]
    Decode { path: std::path::PathBuf, message: String },
    #[error("no loader claims {path:?}")]
    NotFound { path: std::path::PathBuf },
    /// A marked unit failed to rewrite.
    #[error("{path:?}: {error}")]
    Transform {
        path: std::path::PathBuf,
        #[source]
        error: CompileError,
    },
    #[error("host compiler rejected {path:?}: {message}")]
    Host { path: std::path::PathBuf, message: String },
    #[error("invalid configuration in {path:?}: {message}")]
    Config { path: std::path::PathBuf, message: String },
}

impl LoadError {
    pub(crate) fn io(path: &std::path::Path, error: &std::io::Error) -> Self {
        Self::Io {
            path: path.to_owned(),
            message: error.to_string(),
        }
    }
}

impl CompileError {
    pub(crate) fn io(path: &std::path::Path, error: &std::io::Error) -> Self {
        Self::Io {
            path: path.to_owned(),
            message: error.to_string(),
        }
    }
}

impl PrefabError {
    /// Builds the error a user hook returns to abort construction.
    pub fn hook(message: impl Into<String>) -> Self {
        Self::Hook {
            message: message.into(),
        }
    }
}
