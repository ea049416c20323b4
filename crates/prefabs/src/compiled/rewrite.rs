//! Rewrites a compilation unit, splicing generated methods into every
//! compiled record and leaving the rest of the text untouched.

use ahash::AHashSet;
use ruff_python_ast::{
    self as ast, Expr as AstExpr, Stmt,
    visitor::{self, Visitor},
};
use ruff_python_parser::parse_module;
use ruff_text_size::{Ranged, TextRange};

use crate::{
    compiled::{
        discover::{Decoration, Discovered, SourceExpr, decoration, discover},
        lower::lower_class,
        syntax::{Printer, PyStmt},
    },
    error::{CompileError, SpecError},
    names::LIBRARY_MODULE,
    plan::ClassPlan,
    record::build_record_spec,
    resolve::{Registry, ResolveMode},
};

/// 1-based line and column of a byte offset.
fn line_col(source: &str, offset: usize) -> (usize, usize) {
    let before = &source[..offset.min(source.len())];
    let line = before.matches('\n').count() + 1;
    let column = before.rfind('\n').map_or(before.len(), |newline| before.len() - newline - 1) + 1;
    (line, column)
}

fn line_start(source: &str, offset: usize) -> usize {
    source[..offset].rfind('\n').map_or(0, |newline| newline + 1)
}

/// Offset just past the newline ending the line that contains `offset`.
fn line_end(source: &str, offset: usize) -> usize {
    source[offset..].find('\n').map_or(source.len(), |newline| offset + newline + 1)
}

fn start(range: TextRange) -> usize {
    usize::from(range.start())
}

fn end(range: TextRange) -> usize {
    usize::from(range.end())
}

struct Edit {
    start: usize,
    end: usize,
    text: String,
}

fn apply(source: &str, mut edits: Vec<Edit>) -> String {
    edits.sort_by_key(|edit| edit.start);
    let mut out = String::with_capacity(source.len());
    let mut cursor = 0;
    for edit in edits {
        out.push_str(&source[cursor..edit.start]);
        out.push_str(&edit.text);
        cursor = edit.end;
    }
    out.push_str(&source[cursor..]);
    out
}

fn parse(source: &str) -> Result<ast::ModModule, CompileError> {
    parse_module(source).map(ruff_python_parser::Parsed::into_syntax).map_err(|error| {
        let (line, column) = line_col(source, start(error.range()));
        CompileError::Syntax {
            message: error.error.to_string(),
            line,
            column,
        }
    })
}

/// Rewrites the compiled records of one unit.
#[derive(Debug, Clone)]
pub struct Rewriter {
    library_module: String,
}

impl Default for Rewriter {
    fn default() -> Self {
        Self::new(LIBRARY_MODULE)
    }
}

impl Rewriter {
    /// `library_module` is the module whose unused imports are dropped.
    pub fn new(library_module: impl Into<String>) -> Self {
        Self {
            library_module: library_module.into(),
        }
    }

    /// Returns the rewritten unit. A unit without compiled records comes back unchanged.
    pub fn rewrite(&self, source: &str) -> Result<String, CompileError> {
        let module = parse(source)?;

        let mut classes = Vec::new();
        let mut compiled_names = AHashSet::new();
        let mut dynamic_names = AHashSet::new();
        for stmt in &module.body {
            let Stmt::ClassDef(class) = stmt else { continue };
            let found = decoration(class).map_err(|error| spec_error(source, class, error))?;
            match found {
                Decoration::Compiled { decorator, flags } => {
                    compiled_names.insert(class.name.as_str());
                    classes.push((class, decorator, flags));
                }
                Decoration::Dynamic => {
                    dynamic_names.insert(class.name.as_str());
                }
                Decoration::Undecorated => {}
            }
        }
        if classes.is_empty() {
            return Ok(source.to_owned());
        }

        let mut registry: Registry<SourceExpr> = Registry::new(ResolveMode::Static);
        let mut edits = Vec::with_capacity(classes.len());
        for (class, decorator, flags) in classes {
            let wrap = |error: SpecError| spec_error(source, class, error);
            let Discovered {
                mut decl,
                overrides,
                bindings,
            } = discover(source, class, flags).map_err(wrap)?;

            for base in class.arguments.iter().flat_map(|arguments| arguments.args.iter()) {
                if let AstExpr::Name(ast::ExprName { id, .. }) = base {
                    let name = id.as_str();
                    if registry.contains(name) || compiled_names.contains(name) || dynamic_names.contains(name) {
                        decl.parents.push(name.to_owned());
                    }
                }
            }

            let spec = build_record_spec(decl).map_err(wrap)?;
            let merged = registry.resolve_and_register(&spec).map_err(wrap)?;
            let plan = ClassPlan::build(&merged, &overrides);
            let generated = lower_class(&plan, flags.plain);
            let removed: AHashSet<usize> = bindings
                .iter()
                .filter(|binding| spec.consumed.contains(&binding.name))
                .map(|binding| binding.index)
                .collect();

            tracing::debug!(
                record = %class.name,
                fields = merged.fields.len(),
                removed = removed.len(),
                "rewrote compiled record"
            );
            edits.push(class_edit(source, class, decorator, &generated, &removed));
        }

        let rewritten = apply(source, edits);
        self.clean_imports(&rewritten)
    }

    /// Drops names imported from the library module that nothing references any more.
    fn clean_imports(&self, source: &str) -> Result<String, CompileError> {
        let module = parse(source)?;
        let mut uses = NameUses::default();
        for stmt in &module.body {
            if !matches!(stmt, Stmt::ImportFrom(_)) {
                uses.visit_stmt(stmt);
            }
        }

        let mut edits = Vec::new();
        for stmt in &module.body {
            let Stmt::ImportFrom(import) = stmt else { continue };
            if import.level != 0 || import.module.as_ref().is_none_or(|module| module.as_str() != self.library_module) {
                continue;
            }
            let kept: Vec<&ast::Alias> = import
                .names
                .iter()
                .filter(|alias| {
                    let bound = alias.asname.as_ref().unwrap_or(&alias.name);
                    alias.name.as_str() == "*" || uses.names.contains(bound.as_str())
                })
                .collect();
            if kept.len() == import.names.len() {
                continue;
            }
            let range = import.range();
            let alone = source[line_start(source, start(range))..start(range)].trim().is_empty()
                && matches!(source[end(range)..line_end(source, end(range))].trim_start().chars().next(), None | Some('#'));
            let edit = match (kept.is_empty(), alone) {
                (true, true) => Edit {
                    start: line_start(source, start(range)),
                    end: line_end(source, end(range)),
                    text: String::new(),
                },
                (true, false) => Edit {
                    start: start(range),
                    end: end(range),
                    text: "pass".to_owned(),
                },
                (false, _) => Edit {
                    start: start(range),
                    end: end(range),
                    text: format!(
                        "from {} import {}",
                        self.library_module,
                        kept.iter().map(|alias| &source[alias.range()]).collect::<Vec<_>>().join(", ")
                    ),
                },
            };
            edits.push(edit);
        }
        if edits.is_empty() {
            return Ok(source.to_owned());
        }
        tracing::trace!(statements = edits.len(), module = %self.library_module, "cleaned imports");
        Ok(apply(source, edits))
    }
}

fn spec_error(source: &str, class: &ast::StmtClassDef, error: SpecError) -> CompileError {
    CompileError::Spec {
        class: class.name.to_string(),
        line: line_col(source, start(class.name.range())).0,
        error,
    }
}

#[derive(Default)]
struct NameUses {
    names: AHashSet<String>,
}

impl<'a> Visitor<'a> for NameUses {
    fn visit_expr(&mut self, expr: &'a AstExpr) {
        if let AstExpr::Name(ast::ExprName { id, .. }) = expr {
            self.names.insert(id.to_string());
        }
        visitor::walk_expr(self, expr);
    }
}

fn is_docstring(stmt: &Stmt) -> bool {
    matches!(stmt, Stmt::Expr(ast::StmtExpr { value, .. }) if value.is_string_literal_expr())
}

/// Rebuilds the text of one compiled class.
///
/// Kept decorators and the header are regenerated; kept body statements are
/// copied with their leading comments. Bodies that share a line with the
/// header, or statements joined by `;`, are copied statement by statement.
fn class_edit(source: &str, class: &ast::StmtClassDef, decorator: usize, generated: &[PyStmt], removed: &AHashSet<usize>) -> Edit {
    let class_start = class
        .decorator_list
        .iter()
        .map(|decorator| start(decorator.range()))
        .fold(start(class.range()), usize::min);
    let edit_start = line_start(source, class_start);
    let indent = &source[edit_start..class_start];

    let mut out = String::new();
    for (index, kept) in class.decorator_list.iter().enumerate() {
        if index != decorator {
            out.push_str(indent);
            out.push('@');
            out.push_str(&source[kept.expression.range()]);
            out.push('\n');
        }
    }
    out.push_str(indent);
    out.push_str("class ");
    out.push_str(class.name.as_str());
    let mut header_end = end(class.name.range());
    if let Some(type_params) = &class.type_params {
        out.push_str(&source[type_params.range()]);
        header_end = end(type_params.range());
    }
    if let Some(arguments) = &class.arguments {
        out.push_str(&source[arguments.range()]);
        header_end = end(arguments.range());
    }
    out.push_str(":\n");
    let colon = source[header_end..].find(':').map_or(header_end, |offset| header_end + offset);
    let body_cursor = line_end(source, colon);

    let body = &class.body;
    let first_start = body.first().map_or(body_cursor, |stmt| start(stmt.range()));
    let compact = first_start < body_cursor
        || body
            .windows(2)
            .any(|pair| start(pair[1].range()) < line_end(source, end(pair[0].range())));
    let body_indent = if compact {
        format!("{indent}    ")
    } else {
        source[line_start(source, first_start)..first_start].to_owned()
    };
    let unit = body_indent
        .strip_prefix(indent)
        .filter(|unit| !unit.is_empty())
        .unwrap_or("    ")
        .to_owned();

    let mut chunks: Vec<String> = Vec::with_capacity(body.len());
    let mut cursor = body_cursor;
    for stmt in body {
        let range = stmt.range();
        let mut chunk = if compact {
            format!("{body_indent}{}", &source[range])
        } else {
            let chunk_end = line_end(source, end(range));
            let chunk = source[cursor..chunk_end].to_owned();
            cursor = chunk_end;
            chunk
        };
        if !chunk.ends_with('\n') {
            chunk.push('\n');
        }
        chunks.push(chunk);
    }

    let docstring = body.first().is_some_and(is_docstring);
    if docstring && let Some(chunk) = chunks.first() {
        out.push_str(chunk);
    }
    let mut printer = Printer::new(&unit);
    for stmt in generated {
        printer.stmt(stmt, &body_indent);
    }
    out.push_str(&printer.finish());
    for (index, chunk) in chunks.iter().enumerate() {
        if (docstring && index == 0) || removed.contains(&index) {
            continue;
        }
        out.push_str(chunk);
    }

    Edit {
        start: edit_start,
        end: line_end(source, end(class.range())),
        text: out,
    }
}

/// Rewrites `source` with the default library module.
pub fn compile_prefabs(source: &str) -> Result<String, CompileError> {
    Rewriter::default().rewrite(source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_and_column() {
        assert_eq!(line_col("ab\ncd", 4), (2, 2));
        assert_eq!(line_col("ab", 0), (1, 1));
    }

    #[test]
    fn units_without_compiled_records_are_untouched() {
        let source = "from prefab_classes import prefab\n\n@prefab\nclass A:\n    x: int\n";
        assert_eq!(compile_prefabs(source).unwrap(), source);
    }

    #[test]
    fn syntax_errors_carry_a_location() {
        let err = compile_prefabs("x = 1\nclass A(:\n").unwrap_err();
        assert!(matches!(err, CompileError::Syntax { line: 2, .. }), "{err:?}");
    }

    #[test]
    fn empty_generated_body_keeps_trailing_statements() {
        let source = "@prefab(compile_prefab=True, init=False, repr=False, eq=False, match_args=False, compile_plain=True)\nclass A:\n    pass\n";
        let out = compile_prefabs(source).unwrap();
        assert_eq!(out, "class A:\n    def __prefab_init__(self):\n        pass\n    pass\n");
    }

    #[test]
    fn partially_used_import_is_trimmed() {
        let source = "from prefab_classes import prefab, attribute, KW_ONLY\n\n@prefab(compile_prefab=True)\nclass A:\n    x = attribute(default=1)\n\n@prefab\nclass B:\n    pass\n";
        let out = compile_prefabs(source).unwrap();
        assert!(out.starts_with("from prefab_classes import prefab\n"), "{out}");
    }
}
