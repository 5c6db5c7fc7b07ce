//! # Values & Records
//!
//! Services are stored type-erased. A [`Value`] is a shared handle to any
//! `Send + Sync` value; a [`Record`] is an ordered set of named values and is
//! the shape that capability projection works on.
//!
//! ```rust
//! use modwire::{Record, Value};
//!
//! let record = Record::new().with("one", 1_i32).with("two", "second");
//! assert_eq!(*record.get::<i32>("one").unwrap(), 1);
//!
//! let value = Value::new(record);
//! assert!(value.as_record().is_some());
//! ```

use crate::error::{Result, WiringError};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A cheaply cloneable, type-erased service value.
#[derive(Clone)]
pub struct Value {
    inner: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Value {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            inner: Arc::new(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Wraps an existing `Arc` without another allocation.
    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self {
            inner: value,
            type_name: std::any::type_name::<T>(),
        }
    }

    pub fn is<T: Any>(&self) -> bool {
        self.inner.is::<T>()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// Returns a shared handle to the inner value if it is a `T`.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.inner).downcast::<T>().ok()
    }

    pub fn as_record(&self) -> Option<&Record> {
        self.downcast_ref::<Record>()
    }

    /// Name of the stored type, for diagnostics only.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_record() {
            Some(record) => record.fmt(f),
            None => write!(f, "Value<{}>", self.type_name),
        }
    }
}

/// An insertion-ordered, field-keyed collection of values.
///
/// Records are what constructors and hooks receive as input, what the bundle
/// exposes per module, and what narrowed projections produce.
#[derive(Clone, Default)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with<T: Any + Send + Sync>(mut self, field: impl Into<String>, value: T) -> Self {
        self.insert(field, Value::new(value));
        self
    }

    /// Inserts a value, replacing any previous value under the same field.
    pub fn insert(&mut self, field: impl Into<String>, value: Value) {
        let field = field.into();
        match self.fields.iter_mut().find(|(name, _)| *name == field) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((field, value)),
        }
    }

    pub fn value(&self, field: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }

    /// Typed access to a field.
    pub fn get<T: Any>(&self, field: &str) -> Result<&T> {
        let value = self
            .value(field)
            .ok_or_else(|| WiringError::MissingField(field.to_string()))?;
        value
            .downcast_ref::<T>()
            .ok_or_else(|| WiringError::TypeMismatch {
                field: field.to_string(),
                expected: std::any::type_name::<T>(),
                found: value.type_name(),
            })
    }

    /// Typed access returning a shared handle, for values that outlive the record.
    pub fn get_arc<T: Any + Send + Sync>(&self, field: &str) -> Result<Arc<T>> {
        let value = self
            .value(field)
            .ok_or_else(|| WiringError::MissingField(field.to_string()))?;
        value.downcast::<T>().ok_or_else(|| WiringError::TypeMismatch {
            field: field.to_string(),
            expected: std::any::type_name::<T>(),
            found: value.type_name(),
        })
    }

    pub fn contains(&self, field: &str) -> bool {
        self.value(field).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}
