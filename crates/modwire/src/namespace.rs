//! Per-module slots of resolved values.

use crate::error::{Result, WiringError};
use crate::projection::{project, Deps};
use crate::value::{Record, Value};
use std::collections::HashMap;

/// Write-once map from key to resolved value for a single module.
#[derive(Debug, Default)]
pub(crate) struct Namespace {
    slots: HashMap<String, Value>,
}

impl Namespace {
    pub(crate) fn get(&self, key: &str) -> Option<&Value> {
        self.slots.get(key)
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    /// Keys are only ever added.
    pub(crate) fn insert(&mut self, module: &str, key: &str, value: Value) -> Result<()> {
        if self.slots.contains_key(key) {
            return Err(WiringError::DuplicateKey {
                module: module.to_string(),
                key: key.to_string(),
            });
        }
        self.slots.insert(key.to_string(), value);
        Ok(())
    }

    pub(crate) fn satisfies(&self, deps: &Deps) -> bool {
        deps.iter().all(|(key, _)| self.contains(key))
    }

    pub(crate) fn missing(&self, deps: &Deps) -> Vec<String> {
        deps.iter()
            .filter(|(key, _)| !self.contains(key))
            .map(|(key, _)| key.to_string())
            .collect()
    }

    /// Builds the input record for a constructor or hook, narrowing each
    /// requested key. Every key must already be present.
    pub(crate) fn gather(&self, module: &str, deps: &Deps) -> Result<Record> {
        let mut input = Record::new();
        for (key, request) in deps.iter() {
            let value = self
                .get(key)
                .ok_or_else(|| WiringError::MissingField(format!("{module}.{key}")))?;
            let projected = project(value, request).map_err(|source| WiringError::Projection {
                module: module.to_string(),
                key: key.to_string(),
                source,
            })?;
            input.insert(key, projected);
        }
        Ok(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_are_write_once() {
        let mut ns = Namespace::default();
        ns.insert("m", "k", Value::new(1)).unwrap();
        assert!(ns.insert("m", "k", Value::new(2)).is_err());
        assert_eq!(ns.get("k").and_then(|v| v.downcast_ref::<i32>()), Some(&1));
    }

    #[test]
    fn gather_projects_each_request() {
        let mut ns = Namespace::default();
        ns.insert("m", "obj", Value::new(Record::new().with("one", 1).with("two", 2)))
            .unwrap();
        ns.insert("m", "name", Value::new("n")).unwrap();

        let deps = Deps::new().fields("obj", ["two"]).whole("name");
        assert!(ns.satisfies(&deps));
        let input = ns.gather("m", &deps).unwrap();
        let obj = input.get::<Record>("obj").unwrap();
        assert_eq!(obj.keys().collect::<Vec<_>>(), vec!["two"]);
        assert_eq!(*input.get::<&str>("name").unwrap(), "n");
        assert_eq!(ns.missing(&Deps::keys(["name", "other"])), vec!["other"]);
    }
}
