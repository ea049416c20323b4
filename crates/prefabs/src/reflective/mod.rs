//! The reflective engine: synthesizes behaviors on live type objects.
//!
//! A [`RecordType`] starts as a plain class built from a [`ClassNamespace`].
//! [`prefab`] resolves its fields against its processed parents, plans every
//! behavior once and installs the plan. Each behavior is lowered to a closure
//! the first time it runs and the closure is cached on the type from then on.

mod args;
mod eval;
mod lower;
mod namespace;
mod record_type;
mod value;

pub use args::CallArgs;
pub use eval::{TypeRegistry, eval_repr};
pub use namespace::{ClassNamespace, Hook, HookArgs, ValueIter};
pub use record_type::{Comparison, Instance, RecordType, build_prefab, prefab};
pub use value::{Callable, Value};
pub(crate) use value::string_repr_into;
