//! Runtime values held by live record instances.

use std::{cell::RefCell, cmp::Ordering, fmt, fmt::Write, rc::Rc};

use ahash::AHashSet;

use crate::{error::PrefabError, reflective::Instance};

thread_local! {
    /// Lists and instances whose `repr` is currently being rendered on this thread.
    static REPR_ACTIVE: RefCell<AHashSet<usize>> = RefCell::new(AHashSet::new());
}

/// Runs `render` unless the object at `key` is already being rendered
/// further up the stack, in which case the caller prints an ellipsis.
pub(crate) fn guard_repr<T>(key: *const (), render: impl FnOnce() -> T) -> Option<T> {
    let key = key as usize;
    if !REPR_ACTIVE.with_borrow_mut(|active| active.insert(key)) {
        return None;
    }
    let rendered = render();
    REPR_ACTIVE.with_borrow_mut(|active| active.remove(&key));
    Some(rendered)
}

/// Zero-argument callable used as a default factory.
#[derive(Clone)]
pub struct Callable {
    name: Rc<str>,
    func: Rc<dyn Fn() -> Value>,
}

impl Callable {
    pub fn new(name: &str, func: impl Fn() -> Value + 'static) -> Self {
        Self {
            name: Rc::from(name),
            func: Rc::new(func),
        }
    }

    /// The `list` builtin: a fresh empty list per call.
    #[must_use]
    pub fn list() -> Self {
        Self::new("list", || Value::list(Vec::new()))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn call(&self) -> Value {
        (self.func)()
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<function {}>", self.name)
    }
}

/// A dynamically typed value.
///
/// `List`, `Instance` and `Callable` are reference values: clones share the
/// same object and [`Value::is`] compares identity.
#[derive(Debug, Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Tuple(Rc<[Value]>),
    List(Rc<RefCell<Vec<Value>>>),
    Instance(Rc<Instance>),
    Callable(Callable),
}

impl Value {
    pub fn str(value: &str) -> Self {
        Self::Str(Rc::from(value))
    }

    #[must_use]
    pub fn list(items: Vec<Self>) -> Self {
        Self::List(Rc::new(RefCell::new(items)))
    }

    #[must_use]
    pub fn tuple(items: Vec<Self>) -> Self {
        Self::Tuple(items.into())
    }

    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Literals are inlined into generated source; everything else goes
    /// through the closure table.
    #[must_use]
    pub fn is_literal(&self) -> bool {
        matches!(self, Self::None | Self::Bool(_) | Self::Int(_) | Self::Float(_) | Self::Str(_))
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        match self {
            Self::None => "NoneType",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::Tuple(_) => "tuple",
            Self::List(_) => "list",
            Self::Instance(instance) => instance.record_type().name(),
            Self::Callable(_) => "function",
        }
    }

    /// Object identity (`is`).
    #[must_use]
    pub fn is(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Str(a), Self::Str(b)) => Rc::ptr_eq(a, b),
            (Self::Tuple(a), Self::Tuple(b)) => Rc::ptr_eq(a, b),
            (Self::List(a), Self::List(b)) => Rc::ptr_eq(a, b),
            (Self::Instance(a), Self::Instance(b)) => Rc::ptr_eq(a, b),
            (Self::Callable(a), Self::Callable(b)) => Rc::ptr_eq(&a.func, &b.func),
            _ => false,
        }
    }

    /// Equality (`==`), delegating to a record's comparator for instances.
    pub fn py_eq(&self, other: &Self) -> Result<bool, PrefabError> {
        Ok(match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Bool(a), Self::Int(b)) | (Self::Int(b), Self::Bool(a)) => i64::from(*a) == *b,
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b) == Some(Ordering::Equal),
            (Self::Int(a), Self::Float(b)) | (Self::Float(b), Self::Int(a)) => (*a as f64).partial_cmp(b) == Some(Ordering::Equal),
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Tuple(a), Self::Tuple(b)) => seq_eq(a, b)?,
            (Self::List(a), Self::List(b)) => Rc::ptr_eq(a, b) || seq_eq(&a.borrow(), &b.borrow())?,
            (Self::Instance(a), Self::Instance(b)) => Instance::equals(a, b)?,
            _ => self.is(other),
        })
    }

    /// The Python `repr()` of this value.
    pub fn py_repr(&self) -> Result<String, PrefabError> {
        let mut out = String::new();
        self.repr_into(&mut out)?;
        Ok(out)
    }

    pub(crate) fn repr_into(&self, out: &mut String) -> Result<(), PrefabError> {
        match self {
            Self::None => out.push_str("None"),
            Self::Bool(true) => out.push_str("True"),
            Self::Bool(false) => out.push_str("False"),
            Self::Int(v) => {
                let _ = write!(out, "{v}");
            }
            Self::Float(v) => float_repr_into(*v, out),
            Self::Str(s) => string_repr_into(s, out),
            Self::Tuple(items) => {
                out.push('(');
                seq_repr_into(items, out)?;
                if items.len() == 1 {
                    out.push(',');
                }
                out.push(')');
            }
            Self::List(items) => {
                let inner = guard_repr(Rc::as_ptr(items).cast(), || {
                    let mut inner = String::new();
                    seq_repr_into(&items.borrow(), &mut inner).map(|()| inner)
                });
                match inner {
                    Some(inner) => {
                        out.push('[');
                        out.push_str(&inner?);
                        out.push(']');
                    }
                    None => out.push_str("[...]"),
                }
            }
            Self::Instance(instance) => out.push_str(&instance.repr()?),
            Self::Callable(callable) => {
                let _ = write!(out, "<function {}>", callable.name);
            }
        }
        Ok(())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::str(value)
    }
}

impl From<Rc<Instance>> for Value {
    fn from(value: Rc<Instance>) -> Self {
        Self::Instance(value)
    }
}

impl From<Callable> for Value {
    fn from(value: Callable) -> Self {
        Self::Callable(value)
    }
}

fn seq_eq(a: &[Value], b: &[Value]) -> Result<bool, PrefabError> {
    if a.len() != b.len() {
        return Ok(false);
    }
    for (left, right) in a.iter().zip(b) {
        if !left.is(right) && !left.py_eq(right)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn seq_repr_into(items: &[Value], out: &mut String) -> Result<(), PrefabError> {
    let mut iter = items.iter();
    if let Some(first) = iter.next() {
        first.repr_into(out)?;
        for item in iter {
            out.push_str(", ");
            item.repr_into(out)?;
        }
    }
    Ok(())
}

fn float_repr_into(value: f64, out: &mut String) {
    if value.is_nan() {
        out.push_str("nan");
    } else if value.is_infinite() {
        out.push_str(if value > 0.0 { "inf" } else { "-inf" });
    } else {
        // Python switches to exponent notation outside 1e-4 <= |v| < 1e16
        let scientific = format!("{value:e}");
        if let Some((mantissa, exponent)) = scientific.split_once('e')
            && let Ok(exponent) = exponent.parse::<i32>()
            && !(-4..16).contains(&exponent)
        {
            let sign = if exponent < 0 { '-' } else { '+' };
            let _ = write!(out, "{mantissa}e{sign}{:02}", exponent.unsigned_abs());
            return;
        }
        let s = value.to_string();
        out.push_str(&s);
        if !s.contains('.') {
            out.push_str(".0");
        }
    }
}

/// Writes `s` as a Python string literal, preferring single quotes.
pub(crate) fn string_repr_into(s: &str, out: &mut String) {
    let quote = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_control() => {
                let code = u32::from(c);
                let _ = if code <= 0xff {
                    write!(out, "\\x{code:02x}")
                } else {
                    write!(out, "\\u{code:04x}")
                };
            }
            c => out.push(c),
        }
    }
    out.push(quote);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repr(value: &Value) -> String {
        value.py_repr().unwrap()
    }

    #[test]
    fn string_quoting_follows_python() {
        assert_eq!(repr(&Value::str("plain")), "'plain'");
        assert_eq!(repr(&Value::str("it's")), r#""it's""#);
        assert_eq!(repr(&Value::str("both ' \"")), r#"'both \' "'"#);
        assert_eq!(repr(&Value::str("tab\there")), r"'tab\there'");
    }

    #[test]
    fn numbers_and_containers() {
        assert_eq!(repr(&Value::Float(2.0)), "2.0");
        assert_eq!(repr(&Value::Float(0.5)), "0.5");
        assert_eq!(repr(&Value::Float(1e20)), "1e+20");
        assert_eq!(repr(&Value::Float(-1.5e-7)), "-1.5e-07");
        assert_eq!(repr(&Value::Float(1e16)), "1e+16");
        assert_eq!(repr(&Value::Float(1e15)), "1000000000000000.0");
        assert_eq!(repr(&Value::Float(0.0001)), "0.0001");
        assert_eq!(repr(&Value::Float(0.0)), "0.0");
        assert_eq!(repr(&Value::tuple(vec![Value::Int(1)])), "(1,)");
        assert_eq!(repr(&Value::list(vec![Value::None, Value::Bool(true)])), "[None, True]");
    }

    #[test]
    fn self_containing_lists_render_an_ellipsis() {
        let list = Value::list(vec![Value::Int(1)]);
        let Value::List(items) = &list else { unreachable!() };
        items.borrow_mut().push(list.clone());
        assert_eq!(repr(&list), "[1, [...]]");
        assert_eq!(repr(&Value::tuple(vec![list.clone(), list.clone()])), "([1, [...]], [1, [...]])");

        items.borrow_mut().pop();
        assert_eq!(repr(&list), "[1]");
    }

    #[test]
    fn lists_have_identity() {
        let a = Value::list(Vec::new());
        let b = Value::list(Vec::new());
        assert!(a.py_eq(&b).unwrap());
        assert!(!a.is(&b));
        assert!(a.is(&a.clone()));
    }

    #[test]
    fn int_float_equality() {
        assert!(Value::Int(1).py_eq(&Value::Float(1.0)).unwrap());
        assert!(Value::Bool(true).py_eq(&Value::Int(1)).unwrap());
    }
}
