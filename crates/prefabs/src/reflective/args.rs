//! Call arguments and parameter binding for synthesized constructors.

use indexmap::IndexMap;

use crate::{
    error::CallError,
    plan::{InitParam, ParamDefault, ParamKind},
    reflective::Value,
};

/// Positional and keyword arguments of one call.
#[derive(Debug, Clone, Default)]
pub struct CallArgs {
    pub positional: Vec<Value>,
    pub keywords: IndexMap<String, Value>,
}

impl CallArgs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn positional(values: impl IntoIterator<Item = Value>) -> Self {
        Self {
            positional: values.into_iter().collect(),
            keywords: IndexMap::new(),
        }
    }

    #[must_use]
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    #[must_use]
    pub fn kwarg(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.keywords.insert(name.to_owned(), value.into());
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keywords.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.positional.len() + self.keywords.len()
    }
}

/// Binds `args` to `params` the way a Python `def` with a keyword-only
/// section would, filling in defaults. The factory sentinel binds as `None`.
pub(crate) fn bind(callee: &str, params: &[InitParam<Value>], args: CallArgs) -> Result<IndexMap<String, Value>, CallError> {
    let positional: Vec<&InitParam<Value>> = params.iter().filter(|param| param.kind == ParamKind::Positional).collect();
    if args.positional.len() > positional.len() {
        // the receiver counts, as in CPython's message
        return Err(CallError::TooManyPositional {
            callee: callee.to_owned(),
            expected: positional.len() + 1,
            given: args.positional.len() + 1,
        });
    }

    let mut bound: IndexMap<String, Value> = IndexMap::with_capacity(params.len());
    for (param, value) in positional.iter().zip(args.positional) {
        bound.insert(param.name.clone(), value);
    }
    for (name, value) in args.keywords {
        if !params.iter().any(|param| param.name == name) {
            return Err(CallError::UnexpectedKeyword {
                callee: callee.to_owned(),
                name,
            });
        }
        if bound.contains_key(&name) {
            return Err(CallError::MultipleValues {
                callee: callee.to_owned(),
                name,
            });
        }
        bound.insert(name, value);
    }

    let mut missing = Vec::new();
    let mut ordered = IndexMap::with_capacity(params.len());
    for param in params {
        let value = match bound.swap_remove(&param.name) {
            Some(value) => value,
            None => match &param.default {
                ParamDefault::Value(value) => value.clone(),
                ParamDefault::Unset => Value::None,
                ParamDefault::Required => {
                    missing.push(param.name.clone());
                    continue;
                }
            },
        };
        ordered.insert(param.name.clone(), value);
    }
    if !missing.is_empty() {
        return Err(CallError::MissingArguments {
            callee: callee.to_owned(),
            names: missing,
        });
    }
    Ok(ordered)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param(name: &str, kind: ParamKind, default: ParamDefault<Value>) -> InitParam<Value> {
        InitParam {
            name: name.to_owned(),
            kind,
            default,
            annotation: None,
        }
    }

    fn params() -> Vec<InitParam<Value>> {
        vec![
            param("a", ParamKind::Positional, ParamDefault::Required),
            param("b", ParamKind::Positional, ParamDefault::Value(Value::Int(2))),
            param("c", ParamKind::KeywordOnly, ParamDefault::Unset),
        ]
    }

    #[test]
    fn defaults_fill_in() {
        let bound = bind("P.__init__", &params(), CallArgs::new().arg(1)).unwrap();
        assert_eq!(bound.keys().collect::<Vec<_>>(), ["a", "b", "c"]);
        assert!(bound["c"].is_none());
    }

    #[test]
    fn keyword_only_cannot_be_positional() {
        let err = bind("P.__init__", &params(), CallArgs::positional([Value::Int(1), Value::Int(2), Value::Int(3)])).unwrap_err();
        assert_eq!(
            err,
            CallError::TooManyPositional {
                callee: "P.__init__".to_owned(),
                expected: 3,
                given: 4
            }
        );
    }

    #[test]
    fn binding_errors() {
        let err = bind("P.__init__", &params(), CallArgs::new().arg(1).kwarg("a", 2)).unwrap_err();
        assert!(matches!(err, CallError::MultipleValues { name, .. } if name == "a"));
        let err = bind("P.__init__", &params(), CallArgs::new().kwarg("z", 2)).unwrap_err();
        assert!(matches!(err, CallError::UnexpectedKeyword { name, .. } if name == "z"));
        let err = bind("P.__init__", &params(), CallArgs::new()).unwrap_err();
        assert!(matches!(err, CallError::MissingArguments { names, .. } if names == ["a"]));
    }
}
