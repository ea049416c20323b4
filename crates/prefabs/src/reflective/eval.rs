//! Evaluates reconstructable formatter output back into values.
//!
//! Only the expression forms a synthesized `__repr__` produces are accepted:
//! literals, lists, tuples, negated numbers and calls to known record types.

use std::rc::Rc;

use indexmap::IndexMap;
use ruff_python_ast::{self as ast, Expr as AstExpr, Number, UnaryOp};
use ruff_python_parser::parse_expression;

use crate::{
    error::PrefabError,
    reflective::{RecordType, Value, args::CallArgs},
};

/// Record types callable by name from [`eval_repr`].
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: IndexMap<String, Rc<RecordType>>,
}

impl TypeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, record: &Rc<RecordType>) {
        self.types.insert(record.name().to_owned(), Rc::clone(record));
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Rc<RecordType>> {
        self.types.get(name)
    }
}

/// Parses and evaluates `text`, the output of a reconstructable `__repr__`.
pub fn eval_repr(text: &str, types: &TypeRegistry) -> Result<Value, PrefabError> {
    let parsed = parse_expression(text).map_err(|error| PrefabError::Eval {
        text: text.to_owned(),
        reason: error.to_string(),
    })?;
    Evaluator { text, types }.eval(&parsed.syntax().body)
}

struct Evaluator<'a> {
    text: &'a str,
    types: &'a TypeRegistry,
}

impl Evaluator<'_> {
    fn error(&self, reason: impl Into<String>) -> PrefabError {
        PrefabError::Eval {
            text: self.text.to_owned(),
            reason: reason.into(),
        }
    }

    fn eval(&self, expr: &AstExpr) -> Result<Value, PrefabError> {
        match expr {
            AstExpr::NoneLiteral(_) => Ok(Value::None),
            AstExpr::BooleanLiteral(ast::ExprBooleanLiteral { value, .. }) => Ok(Value::Bool(*value)),
            AstExpr::NumberLiteral(ast::ExprNumberLiteral { value, .. }) => match value {
                Number::Int(int) => int
                    .as_i64()
                    .map(Value::Int)
                    .ok_or_else(|| self.error(format!("integer {int} does not fit in 64 bits"))),
                Number::Float(float) => Ok(Value::Float(*float)),
                Number::Complex { .. } => Err(self.error("complex numbers are not supported")),
            },
            AstExpr::StringLiteral(ast::ExprStringLiteral { value, .. }) => Ok(Value::str(value.to_str())),
            AstExpr::UnaryOp(ast::ExprUnaryOp {
                op: UnaryOp::USub,
                operand,
                ..
            }) => match self.eval(operand)? {
                Value::Int(int) => int
                    .checked_neg()
                    .map(Value::Int)
                    .ok_or_else(|| self.error("integer overflow")),
                Value::Float(float) => Ok(Value::Float(-float)),
                other => Err(self.error(format!("bad operand type for unary -: {}", other.type_name()))),
            },
            AstExpr::List(ast::ExprList { elts, .. }) => Ok(Value::list(self.eval_all(elts)?)),
            AstExpr::Tuple(ast::ExprTuple { elts, .. }) => Ok(Value::tuple(self.eval_all(elts)?)),
            AstExpr::Call(ast::ExprCall { func, arguments, .. }) => {
                let AstExpr::Name(ast::ExprName { id, .. }) = func.as_ref() else {
                    return Err(self.error("only calls to record types by name are supported"));
                };
                let record = self
                    .types
                    .get(id.as_str())
                    .ok_or_else(|| PrefabError::UnknownType { name: id.to_string() })?;
                let mut args = CallArgs::positional(self.eval_all(&arguments.args)?);
                for keyword in &arguments.keywords {
                    let Some(name) = &keyword.arg else {
                        return Err(self.error("keyword unpacking is not supported"));
                    };
                    args = args.kwarg(name.as_str(), self.eval(&keyword.value)?);
                }
                Ok(Value::Instance(record.call(args)?))
            }
            _ => Err(self.error("unsupported expression")),
        }
    }

    fn eval_all(&self, exprs: &[AstExpr]) -> Result<Vec<Value>, PrefabError> {
        exprs.iter().map(|expr| self.eval(expr)).collect()
    }
}
