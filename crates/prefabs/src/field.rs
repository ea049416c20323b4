//! Per-field configuration shared by both synthesis engines.
//!
//! `E` is the engine's representation of a default: a runtime [`Value`](crate::Value)
//! for the reflective engine, a source expression for the static one.

use crate::error::SpecError;

/// The default of a field. Value and factory are mutually exclusive by construction.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FieldDefault<E> {
    #[default]
    Nothing,
    /// Used as-is for every instance that does not supply the field.
    Value(E),
    /// Zero-argument callable, invoked once per instance.
    Factory(E),
}

impl<E> FieldDefault<E> {
    #[must_use]
    pub fn is_nothing(&self) -> bool {
        matches!(self, Self::Nothing)
    }

    #[must_use]
    pub fn is_factory(&self) -> bool {
        matches!(self, Self::Factory(_))
    }

    #[must_use]
    pub fn value(&self) -> Option<&E> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn factory(&self) -> Option<&E> {
        match self {
            Self::Factory(factory) => Some(factory),
            _ => None,
        }
    }
}

/// One declared field of a record type.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec<E> {
    pub default: FieldDefault<E>,
    /// Field is a constructor parameter.
    pub init: bool,
    /// Field appears in the formatter output.
    pub repr: bool,
    /// Field takes part in equality.
    pub compare: bool,
    /// Parameter can only be passed by keyword.
    pub kw_only: bool,
    /// Field is hidden from the formatter, comparator and public field list.
    pub exclude_field: bool,
    /// Documentation, only used by slot storage.
    pub doc: Option<String>,
    /// Annotation text, carried through to signatures but never enforced.
    pub declared_type: Option<String>,
}

impl<E> Default for FieldSpec<E> {
    fn default() -> Self {
        Self {
            default: FieldDefault::Nothing,
            init: true,
            repr: true,
            compare: true,
            kw_only: false,
            exclude_field: false,
            doc: None,
            declared_type: None,
        }
    }
}

impl<E> FieldSpec<E> {
    /// A required field with every behavior enabled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A field whose plain class-body value becomes its default.
    #[must_use]
    pub fn with_default(value: E) -> Self {
        Self {
            default: FieldDefault::Value(value),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn has_default(&self) -> bool {
        !self.default.is_nothing()
    }

    /// Positional constructor parameters are subject to the default-ordering rule.
    #[must_use]
    pub fn is_positional_init(&self) -> bool {
        self.init && !self.kw_only
    }

    /// Visible to the formatter, comparator and public field list.
    #[must_use]
    pub fn is_public(&self) -> bool {
        !self.exclude_field
    }
}

/// Arguments of an `attribute(...)` field specifier before validation.
///
/// Unlike [`FieldSpec`] this can express a default *and* a factory, which is
/// what user code can write; [`FieldArgs::into_spec`] rejects that.
#[derive(Debug, Clone)]
pub struct FieldArgs<E> {
    pub default: Option<E>,
    pub default_factory: Option<E>,
    pub init: bool,
    pub repr: bool,
    pub compare: bool,
    pub kw_only: bool,
    pub exclude_field: bool,
    pub doc: Option<String>,
    pub declared_type: Option<String>,
}

impl<E> FieldArgs<E> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            default: None,
            default_factory: None,
            init: true,
            repr: true,
            compare: true,
            kw_only: false,
            exclude_field: false,
            doc: None,
            declared_type: None,
        }
    }

    #[must_use]
    pub fn default_value(mut self, value: E) -> Self {
        self.default = Some(value);
        self
    }

    #[must_use]
    pub fn default_factory(mut self, factory: E) -> Self {
        self.default_factory = Some(factory);
        self
    }

    #[must_use]
    pub fn init(mut self, init: bool) -> Self {
        self.init = init;
        self
    }

    #[must_use]
    pub fn repr(mut self, repr: bool) -> Self {
        self.repr = repr;
        self
    }

    #[must_use]
    pub fn compare(mut self, compare: bool) -> Self {
        self.compare = compare;
        self
    }

    #[must_use]
    pub fn kw_only(mut self, kw_only: bool) -> Self {
        self.kw_only = kw_only;
        self
    }

    #[must_use]
    pub fn exclude_field(mut self, exclude_field: bool) -> Self {
        self.exclude_field = exclude_field;
        self
    }

    #[must_use]
    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    #[must_use]
    pub fn declared_type(mut self, declared_type: impl Into<String>) -> Self {
        self.declared_type = Some(declared_type.into());
        self
    }

    /// Validates the arguments for the field called `name`.
    pub fn into_spec(self, name: &str) -> Result<FieldSpec<E>, SpecError> {
        let default = match (self.default, self.default_factory) {
            (Some(_), Some(_)) => return Err(SpecError::DefaultAndFactory { name: name.to_owned() }),
            (Some(value), None) => FieldDefault::Value(value),
            (None, Some(factory)) => FieldDefault::Factory(factory),
            (None, None) => FieldDefault::Nothing,
        };
        if self.kw_only && !self.init {
            return Err(SpecError::KeywordOnlyWithoutInit { name: name.to_owned() });
        }
        Ok(FieldSpec {
            default,
            init: self.init,
            repr: self.repr,
            compare: self.compare,
            kw_only: self.kw_only,
            exclude_field: self.exclude_field,
            doc: self.doc,
            declared_type: self.declared_type,
        })
    }
}

impl<E> Default for FieldArgs<E> {
    fn default() -> Self {
        Self::new()
    }
}
