//! # Capability Projection
//!
//! A consumer can ask for a whole service or only some of its fields. The same
//! request shape is used for import bindings, internal constructor dependencies,
//! export constructor dependencies and lifecycle hooks.
//!
//! ```rust
//! use modwire::projection::{project, Request};
//! use modwire::{Record, Value};
//!
//! let source = Value::new(Record::new().with("a", 1).with("b", 2).with("c", 3));
//! let narrowed = project(&source, &Request::fields(["b"])).unwrap();
//! let narrowed = narrowed.as_record().unwrap();
//!
//! assert_eq!(narrowed.keys().collect::<Vec<_>>(), vec!["b"]);
//! assert_eq!(*narrowed.get::<i32>("b").unwrap(), 2);
//! ```

use crate::value::{Record, Value};

/// What part of a value a consumer wants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// The value unchanged.
    Whole,
    /// A new record holding exactly these fields.
    Fields(Vec<String>),
}

impl Request {
    pub fn fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Request::Fields(fields.into_iter().map(Into::into).collect())
    }

    pub(crate) fn is_empty_projection(&self) -> bool {
        matches!(self, Request::Fields(fields) if fields.is_empty())
    }
}

/// Errors raised when a narrowed request cannot be served.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProjectionError {
    #[error("value of type {type_name} is not a record")]
    NotARecord { type_name: &'static str },
    #[error("field '{field}' is not present")]
    MissingField { field: String },
}

/// Narrows `value` according to `request`.
///
/// Absent fields are an error rather than silently dropped.
pub fn project(value: &Value, request: &Request) -> Result<Value, ProjectionError> {
    let fields = match request {
        Request::Whole => return Ok(value.clone()),
        Request::Fields(fields) => fields,
    };
    let record = value.as_record().ok_or(ProjectionError::NotARecord {
        type_name: value.type_name(),
    })?;

    let mut narrowed = Record::new();
    for field in fields {
        let picked = record
            .value(field)
            .ok_or_else(|| ProjectionError::MissingField {
                field: field.clone(),
            })?;
        narrowed.insert(field.clone(), picked.clone());
    }
    Ok(Value::new(narrowed))
}

/// Ordered `key → request` list, used both for dependency requests and for
/// import picks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Deps {
    entries: Vec<(String, Request)>,
}

impl Deps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests every key as a whole value.
    pub fn keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        keys.into_iter().fold(Self::new(), |deps, key| deps.whole(key))
    }

    pub fn whole(self, key: impl Into<String>) -> Self {
        self.request(key, Request::Whole)
    }

    pub fn fields<I, S>(self, key: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.request(key, Request::fields(fields))
    }

    /// Adds or replaces the request for `key`.
    pub fn request(mut self, key: impl Into<String>, request: Request) -> Self {
        let key = key.into();
        match self.entries.iter_mut().find(|(name, _)| *name == key) {
            Some((_, slot)) => *slot = request,
            None => self.entries.push((key, request)),
        }
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Request)> {
        self.entries.iter().map(|(key, request)| (key.as_str(), request))
    }

    pub fn key_names(&self) -> Vec<String> {
        self.entries.iter().map(|(key, _)| key.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
