//! # Module Declarations
//!
//! A module is a named bundle of internal services, exported services, import
//! bindings and optional `run`/`stop` hooks. Modules live in a [`Catalog`],
//! which hands out a stable [`ModuleId`] per module. The id is the module's
//! identity: two declarations are the same module only if they share an id.
//!
//! Reserving ids before defining modules lets two modules refer to each other:
//!
//! ```rust
//! use modwire::{Catalog, ModuleDecl, Provider};
//!
//! let mut catalog = Catalog::new();
//! let first = catalog.reserve("first");
//! let second = catalog.reserve("second");
//!
//! catalog
//!     .define(
//!         first,
//!         ModuleDecl::new()
//!             .imports(second.import(["third"]))
//!             .export(
//!                 "first",
//!                 first
//!                     .inject(["third"])
//!                     .build(|deps| Ok(format!("first -> {}", deps.get::<String>("third")?))),
//!             ),
//!     )
//!     .unwrap();
//! catalog
//!     .define(
//!         second,
//!         ModuleDecl::new()
//!             .imports(first.import(["first"]))
//!             .export("third", Provider::value(String::from("third"))),
//!     )
//!     .unwrap();
//!
//! let bundle = catalog.resolve([("first", first), ("second", second)]).unwrap();
//! assert_eq!(bundle.service::<String>("first", "first").unwrap(), "first -> third");
//! ```

use crate::bundle::Bundle;
use crate::error::{Result, WiringError};
use crate::projection::{Deps, Request};
use crate::provider::{DependencySignal, Hook, Provider};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_CATALOG: AtomicU64 = AtomicU64::new(0);

/// Stable handle of a module inside its [`Catalog`].
///
/// The handle remembers which catalog issued it; any other catalog treats it
/// as undefined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId {
    catalog: u64,
    index: usize,
}

impl ModuleId {
    pub fn index(self) -> usize {
        self.index
    }

    /// Binds each exported key under the same local name.
    pub fn import<I, S>(self, keys: I) -> Vec<ImportBinding>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        keys.into_iter().map(|key| self.import_key(key)).collect()
    }

    /// Binds exported keys with a projection each.
    pub fn import_pick(self, pick: Deps) -> Vec<ImportBinding> {
        pick.iter()
            .map(|(key, request)| self.import_key(key).narrow(request.clone()))
            .collect()
    }

    /// A single binding, which can then be renamed or narrowed.
    pub fn import_key(self, key: impl Into<String>) -> ImportBinding {
        let key = key.into();
        ImportBinding {
            local: key.clone(),
            from: self,
            key,
            request: Request::Whole,
        }
    }

    /// Declares that a constructor of this module needs `keys` whole.
    pub fn inject<I, S>(self, keys: I) -> DependencySignal
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        DependencySignal::new(self, Deps::keys(keys))
    }

    /// Declares that a constructor of this module needs `pick`.
    pub fn inject_pick(self, pick: Deps) -> DependencySignal {
        DependencySignal::new(self, pick)
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "module#{}.{}", self.catalog, self.index)
    }
}

/// A local key of one module bound to an exported key of another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportBinding {
    pub local: String,
    pub from: ModuleId,
    pub key: String,
    pub request: Request,
}

impl ImportBinding {
    pub fn rename(mut self, local: impl Into<String>) -> Self {
        self.local = local.into();
        self
    }

    pub fn narrow(mut self, request: Request) -> Self {
        self.request = request;
        self
    }
}

/// Declaration of one module, assembled builder-style.
#[derive(Debug, Clone, Default)]
pub struct ModuleDecl {
    pub(crate) imports: Vec<ImportBinding>,
    pub(crate) internal: Vec<(String, Provider)>,
    pub(crate) exports: Vec<(String, Provider)>,
    pub(crate) reexports: Vec<String>,
    pub(crate) run: Option<Hook>,
    pub(crate) stop: Option<Hook>,
}

impl ModuleDecl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn import(mut self, binding: ImportBinding) -> Self {
        self.imports.push(binding);
        self
    }

    pub fn imports(mut self, bindings: impl IntoIterator<Item = ImportBinding>) -> Self {
        self.imports.extend(bindings);
        self
    }

    /// A service visible only inside this module.
    pub fn internal(mut self, key: impl Into<String>, provider: Provider) -> Self {
        self.internal.push((key.into(), provider));
        self
    }

    /// A service other modules may import.
    pub fn export(mut self, key: impl Into<String>, provider: Provider) -> Self {
        self.exports.push((key.into(), provider));
        self
    }

    /// Makes an imported key part of this module's exports.
    pub fn reexport(mut self, local: impl Into<String>) -> Self {
        self.reexports.push(local.into());
        self
    }

    pub fn on_run(mut self, hook: Hook) -> Self {
        self.run = Some(hook);
        self
    }

    pub fn on_stop(mut self, hook: Hook) -> Self {
        self.stop = Some(hook);
        self
    }

    /// Keys other modules can import, in declaration order.
    pub fn export_keys(&self) -> impl Iterator<Item = &str> {
        self.exports
            .iter()
            .map(|(key, _)| key.as_str())
            .chain(self.reexports.iter().map(String::as_str))
    }

    pub fn exports_key(&self, key: &str) -> bool {
        self.export_keys().any(|exported| exported == key)
    }

    pub fn run_hook(&self) -> Option<&Hook> {
        self.run.as_ref()
    }

    pub fn stop_hook(&self) -> Option<&Hook> {
        self.stop.as_ref()
    }

    fn validate(&self, id: ModuleId, label: &str) -> Result<()> {
        let mut seen = HashSet::new();
        let keys = self
            .imports
            .iter()
            .map(|binding| binding.local.as_str())
            .chain(self.internal.iter().map(|(key, _)| key.as_str()))
            .chain(self.exports.iter().map(|(key, _)| key.as_str()));
        for key in keys {
            if !seen.insert(key) {
                return Err(WiringError::DuplicateKey {
                    module: label.to_string(),
                    key: key.to_string(),
                });
            }
        }

        for binding in &self.imports {
            if binding.request.is_empty_projection() {
                return Err(WiringError::EmptyProjection {
                    module: label.to_string(),
                    key: binding.local.clone(),
                });
            }
        }

        let providers = self.internal.iter().chain(self.exports.iter());
        let declared = providers
            .map(|(key, provider)| (key.as_str(), provider.owner(), provider.deps()))
            .chain(
                self.run
                    .iter()
                    .map(|hook| ("run", hook.owner(), hook.deps())),
            )
            .chain(
                self.stop
                    .iter()
                    .map(|hook| ("stop", hook.owner(), hook.deps())),
            );
        for (key, owner, deps) in declared {
            if let Some(owner) = owner.filter(|owner| *owner != id) {
                return Err(WiringError::ForeignInjection {
                    module: label.to_string(),
                    key: key.to_string(),
                    owner: owner.to_string(),
                });
            }
            if let Some((dep, _)) = deps.iter().find(|(_, req)| req.is_empty_projection()) {
                return Err(WiringError::EmptyProjection {
                    module: label.to_string(),
                    key: format!("{key}.{dep}"),
                });
            }
        }

        for key in &self.reexports {
            if !self.imports.iter().any(|binding| binding.local == *key) {
                return Err(WiringError::UnknownReexport {
                    module: label.to_string(),
                    key: key.clone(),
                });
            }
        }
        Ok(())
    }
}

struct Entry {
    label: String,
    decl: Option<Arc<ModuleDecl>>,
}

/// Arena of module declarations.
pub struct Catalog {
    tag: u64,
    entries: Vec<Entry>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            tag: NEXT_CATALOG.fetch_add(1, Ordering::Relaxed),
            entries: Vec::new(),
        }
    }
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, id: ModuleId) -> Option<&Entry> {
        (id.catalog == self.tag)
            .then(|| self.entries.get(id.index))
            .flatten()
    }

    /// Allocates an id for a module that will be defined later.
    pub fn reserve(&mut self, label: impl Into<String>) -> ModuleId {
        self.entries.push(Entry {
            label: label.into(),
            decl: None,
        });
        ModuleId {
            catalog: self.tag,
            index: self.entries.len() - 1,
        }
    }

    /// Validates and stores the declaration of a reserved module.
    pub fn define(&mut self, id: ModuleId, decl: ModuleDecl) -> Result<()> {
        let owned = id.catalog == self.tag;
        let entry = self
            .entries
            .get_mut(id.index)
            .filter(|_| owned)
            .ok_or_else(|| WiringError::UndefinedModule {
                module: id.to_string(),
            })?;
        if entry.decl.is_some() {
            return Err(WiringError::AlreadyDefined {
                module: entry.label.clone(),
            });
        }
        decl.validate(id, &entry.label)?;
        entry.decl = Some(Arc::new(decl));
        Ok(())
    }

    /// Reserves and defines in one step; the closure receives the new id so
    /// constructors can inject from their own module.
    pub fn declare<F>(&mut self, label: impl Into<String>, declare: F) -> Result<ModuleId>
    where
        F: FnOnce(ModuleId) -> ModuleDecl,
    {
        let id = self.reserve(label);
        self.define(id, declare(id))?;
        Ok(id)
    }

    pub fn label(&self, id: ModuleId) -> Option<&str> {
        self.entry(id).map(|entry| entry.label.as_str())
    }

    pub(crate) fn decl(&self, id: ModuleId) -> Result<&Arc<ModuleDecl>> {
        let entry = self
            .entry(id)
            .ok_or_else(|| WiringError::UndefinedModule {
                module: id.to_string(),
            })?;
        entry
            .decl
            .as_ref()
            .ok_or_else(|| WiringError::UndefinedModule {
                module: entry.label.clone(),
            })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolves the named root modules and everything they import.
    ///
    /// Only root modules appear in the returned bundle's exports; run hooks
    /// of every reached module have executed when this returns.
    pub fn resolve<I, S>(&self, roots: I) -> Result<Bundle>
    where
        I: IntoIterator<Item = (S, ModuleId)>,
        S: Into<String>,
    {
        let roots = roots
            .into_iter()
            .map(|(name, id)| (name.into(), id))
            .collect::<Vec<_>>();
        crate::engine::resolve(self, roots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_keys_are_rejected_at_declaration() {
        let mut catalog = Catalog::new();
        let err = catalog
            .declare("dup", |_| {
                ModuleDecl::new()
                    .internal("service", Provider::value(1))
                    .export("service", Provider::value(2))
            })
            .unwrap_err();
        assert!(matches!(err, WiringError::DuplicateKey { key, .. } if key == "service"));
    }

    #[test]
    fn injection_from_another_module_is_rejected() {
        let mut catalog = Catalog::new();
        let other = catalog.reserve("other");
        let err = catalog
            .declare("mine", |_| {
                ModuleDecl::new().export("x", other.inject(["y"]).build(|_| Ok(0)))
            })
            .unwrap_err();
        assert!(matches!(err, WiringError::ForeignInjection { .. }));
    }

    #[test]
    fn empty_projection_is_rejected() {
        let mut catalog = Catalog::new();
        let source = catalog.reserve("source");
        let err = catalog
            .declare("sink", |_| {
                ModuleDecl::new().imports(source.import_pick(Deps::new().fields(
                    "config",
                    Vec::<String>::new(),
                )))
            })
            .unwrap_err();
        assert!(matches!(err, WiringError::EmptyProjection { .. }));
    }

    #[test]
    fn reexport_must_name_an_import() {
        let mut catalog = Catalog::new();
        let err = catalog
            .declare("m", |_| ModuleDecl::new().reexport("missing"))
            .unwrap_err();
        assert!(matches!(err, WiringError::UnknownReexport { .. }));
    }

    #[test]
    fn modules_cannot_be_defined_twice() {
        let mut catalog = Catalog::new();
        let id = catalog.declare("m", |_| ModuleDecl::new()).unwrap();
        let err = catalog.define(id, ModuleDecl::new()).unwrap_err();
        assert!(matches!(err, WiringError::AlreadyDefined { .. }));
    }

    #[test]
    fn handles_belong_to_their_catalog() {
        let mut first = Catalog::new();
        let mut second = Catalog::new();
        let id = first.reserve("m");
        let same_index = second.reserve("other");
        assert_eq!(id.index(), same_index.index());
        assert_ne!(id, same_index);
        assert_eq!(second.label(id), None);

        let err = second.define(id, ModuleDecl::new()).unwrap_err();
        assert!(matches!(err, WiringError::UndefinedModule { .. }));
        assert_eq!(second.label(same_index), Some("other"));
    }

    #[test]
    fn import_pick_carries_projection() {
        let mut catalog = Catalog::new();
        let source = catalog.reserve("source");
        let bindings =
            source.import_pick(Deps::new().whole("value").fields("object", ["two"]));
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0].request, Request::Whole);
        assert_eq!(bindings[1].request, Request::fields(["two"]));
        let renamed = source.import_key("service").rename("local");
        assert_eq!((renamed.local.as_str(), renamed.key.as_str()), ("local", "service"));
    }
}
