#![doc = include_str!("../README.md")]
#![expect(clippy::struct_excessive_bools, reason = "record flags mirror the decorator's keyword arguments")]

mod config;
mod error;
mod field;
mod names;
mod plan;
mod record;
mod resolve;

pub mod compiled;
pub mod loader;
pub mod reflective;

pub use crate::{
    config::{DEFAULT_MARKER, DONT_WRITE_CACHE_ENV, InterceptorConfig, PREFAB_MAGIC_BYTES},
    error::{CallError, CompileError, ImmutabilityError, LoadError, Mutation, PrefabError, SpecError},
    field::{FieldArgs, FieldDefault, FieldSpec},
    names::{
        ATTRIBUTE_FUNCNAME, Behavior, COMPILE_ARGUMENT, COMPILED_FLAG, DECORATOR_NAME, FIELDS_ATTRIBUTE, HookKind,
        KW_ONLY_NAME, LIBRARY_MODULE, POST_INIT_FUNC, PRE_INIT_FUNC, PREFAB_INIT_FUNC,
    },
    plan::{
        ClassPlan, EqPlan, FrozenPlan, HookCall, InitParam, InitPlan, InitStep, IterPlan, ParamDefault, ParamKind,
        ReprForm, ReprPlan, SlotLayout, ValueSource,
    },
    record::{DeclaredValue, HookSignature, RecordDecl, RecordFlags, RecordId, RecordSpec, build_record_spec},
    reflective::{
        CallArgs, Callable, ClassNamespace, Comparison, Hook, HookArgs, Instance, RecordType, TypeRegistry, Value,
        ValueIter, build_prefab, eval_repr, prefab,
    },
    resolve::{MergedSpec, Registry, ResolveMode, merge},
};
