//! The static engine: rewrites a Python compilation unit before the host compiles it.
//!
//! Every module-level class decorated with `@prefab(compile_prefab=True, ...)`
//! is replaced by the same class with its field declarations removed and its
//! synthesized methods written out as ordinary source. The decorator goes
//! away, as do library imports nothing uses afterwards. Everything else in
//! the unit, comments included, is copied through.
//!
//! Parents are resolved within the unit only: a record may inherit from a
//! compiled record defined above it, never from one defined later or from a
//! record processed at runtime.

mod discover;
mod lower;
mod rewrite;
mod syntax;

use std::{fs, path::Path};

pub use discover::SourceExpr;
pub use lower::{ExprText, lower_class, render_behavior};
pub use rewrite::{Rewriter, compile_prefabs};
pub use syntax::{CmpOp, FPart, FunctionDef, Param, Printer, PyExpr, PyStmt};

use crate::error::CompileError;

/// Reads `path` and returns its rewritten text.
pub fn preview(path: impl AsRef<Path>) -> Result<String, CompileError> {
    let path = path.as_ref();
    let source = fs::read_to_string(path).map_err(|error| CompileError::io(path, &error))?;
    compile_prefabs(&source)
}

/// Rewrites `source_path` into `dest_path` under a "do not edit" header.
///
/// Refuses to overwrite the source file.
pub fn rewrite_to_file(source_path: impl AsRef<Path>, dest_path: impl AsRef<Path>) -> Result<(), CompileError> {
    let (source_path, dest_path) = (source_path.as_ref(), dest_path.as_ref());
    let same = source_path == dest_path
        || matches!(
            (fs::canonicalize(source_path), fs::canonicalize(dest_path)),
            (Ok(source), Ok(dest)) if source == dest
        );
    if same {
        return Err(CompileError::SameFile(source_path.to_owned()));
    }

    let compiled = preview(source_path)?;
    let file_name = |path: &Path| path.file_name().map(|name| name.to_string_lossy().into_owned()).unwrap_or_default();
    let header = format!(
        "# DO NOT MANUALLY EDIT THIS FILE\n# MODULE: {}\n# GENERATED FROM: {}\n# USING prefab_classes VERSION: {}\n\n",
        file_name(dest_path),
        file_name(source_path),
        env!("CARGO_PKG_VERSION"),
    );
    fs::write(dest_path, header + &compiled).map_err(|error| CompileError::io(dest_path, &error))?;
    tracing::info!(source = %source_path.display(), dest = %dest_path.display(), "wrote compiled unit");
    Ok(())
}
