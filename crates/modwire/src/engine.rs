//! # Resolution Engine
//!
//! Turns a set of named root modules into a [`Bundle`].
//!
//! ## Algorithm
//!
//! 1. **Discovery**: every root and, transitively, every module reachable
//!    through import bindings is visited once per [`ModuleId`]. Modules reached
//!    only through imports are *anonymous*; naming one later in the root set
//!    promotes it, whatever the visiting order.
//! 2. **Probe**: zero-dependency constructors are built on the spot. The rest,
//!    and every import binding, go on the worklist.
//! 3. **Fixed point**: the worklist is scanned pass after pass. An item runs as
//!    soon as everything it needs is in its module's namespace. A pass that
//!    satisfies nothing means the remaining items can never run, and they are
//!    reported together as [`WiringError::Unresolved`].
//! 4. **Lifecycle**: `run` hooks execute in discovery order. `stop` hooks are
//!    handed to the bundle and only run through [`Bundle::stop`].
//!
//! Each pass satisfies at least one item, so at most `|worklist|` passes run.

use crate::bundle::{Bundle, StopEntry};
use crate::error::{BoxError, Result, WiringError};
use crate::module::{Catalog, ImportBinding, ModuleDecl, ModuleId};
use crate::namespace::Namespace;
use crate::projection::project;
use crate::provider::{Hook, Probe, Provider};
use crate::value::Record;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

struct Loading {
    decl: Arc<ModuleDecl>,
    label: String,
    names: Vec<String>,
    namespace: Namespace,
}

impl Loading {
    /// First root name, or the declared label for anonymous modules.
    fn name(&self) -> &str {
        self.names
            .first()
            .map(String::as_str)
            .unwrap_or(&self.label)
    }
}

enum WorkItem<'c> {
    Import {
        slot: usize,
        binding: &'c ImportBinding,
    },
    Service {
        slot: usize,
        key: &'c str,
        provider: &'c Provider,
    },
}

struct Resolver<'c> {
    catalog: &'c Catalog,
    slots: HashMap<ModuleId, usize>,
    modules: Vec<Loading>,
    worklist: Vec<WorkItem<'c>>,
}

pub(crate) fn resolve(catalog: &Catalog, roots: Vec<(String, ModuleId)>) -> Result<Bundle> {
    let mut resolver = Resolver {
        catalog,
        slots: HashMap::new(),
        modules: Vec::new(),
        worklist: Vec::new(),
    };

    for (name, id) in &roots {
        resolver.visit(*id, Some(name))?;
    }
    info!(
        roots = roots.len(),
        modules = resolver.modules.len(),
        pending = resolver.worklist.len(),
        "Modules discovered"
    );

    let passes = resolver.settle()?;
    resolver.check_hooks()?;
    let exports = resolver.export_records();
    resolver.run_hooks()?;

    info!(
        modules = resolver.modules.len(),
        passes,
        named = exports.len(),
        "Resolution complete"
    );
    Ok(Bundle::new(exports, resolver.into_stop_entries()))
}

impl<'c> Resolver<'c> {
    fn visit(&mut self, id: ModuleId, name: Option<&str>) -> Result<()> {
        if let Some(&slot) = self.slots.get(&id) {
            if let Some(name) = name {
                let module = &mut self.modules[slot];
                if !module.names.iter().any(|known| known == name) {
                    debug!(module = %module.label, name, "Module promoted");
                    module.names.push(name.to_string());
                }
            }
            return Ok(());
        }

        let catalog: &'c Catalog = self.catalog;
        let decl: &'c Arc<ModuleDecl> = catalog.decl(id)?;
        let label = catalog.label(id).unwrap_or_default().to_string();
        let slot = self.modules.len();
        debug!(module = %label, anonymous = name.is_none(), "Module discovered");
        self.slots.insert(id, slot);
        self.modules.push(Loading {
            decl: Arc::clone(decl),
            label,
            names: name.map(str::to_string).into_iter().collect(),
            namespace: Namespace::default(),
        });

        for binding in &decl.imports {
            self.worklist.push(WorkItem::Import { slot, binding });
            self.visit(binding.from, None)?;
        }

        for (key, provider) in decl.internal.iter().chain(decl.exports.iter()) {
            let probe = provider
                .probe()
                .map_err(|source| self.service_error(slot, key, source))?;
            match probe {
                Probe::Ready(value) => {
                    let module = &mut self.modules[slot];
                    module.namespace.insert(&module.label, key, value)?;
                }
                Probe::Needs(_) => self.worklist.push(WorkItem::Service {
                    slot,
                    key: key.as_str(),
                    provider,
                }),
            }
        }
        Ok(())
    }

    fn settle(&mut self) -> Result<usize> {
        let mut passes = 0;
        while !self.worklist.is_empty() {
            passes += 1;
            let pending = std::mem::take(&mut self.worklist);
            let before = pending.len();
            let mut carried = Vec::with_capacity(before);
            for item in pending {
                if !self.try_satisfy(&item)? {
                    carried.push(item);
                }
            }
            debug!(
                pass = passes,
                resolved = before - carried.len(),
                remaining = carried.len(),
                "Pass complete"
            );

            if carried.len() == before {
                let items = carried
                    .iter()
                    .map(|item| self.describe(item))
                    .collect::<Vec<_>>();
                warn!(stuck = items.len(), "Resolution stalled");
                return Err(WiringError::Unresolved { items });
            }
            self.worklist = carried;
        }
        Ok(passes)
    }

    fn try_satisfy(&mut self, item: &WorkItem<'c>) -> Result<bool> {
        match *item {
            WorkItem::Import { slot, binding } => {
                let Some(&source_slot) = self.slots.get(&binding.from) else {
                    return Ok(false);
                };
                let source = &self.modules[source_slot];
                if !source.decl.exports_key(&binding.key) {
                    return Ok(false);
                }
                let Some(value) = source.namespace.get(&binding.key) else {
                    return Ok(false);
                };
                let value = project(value, &binding.request).map_err(|source| {
                    WiringError::Projection {
                        module: self.modules[slot].name().to_string(),
                        key: binding.local.clone(),
                        source,
                    }
                })?;

                let module = &mut self.modules[slot];
                module.namespace.insert(&module.label, &binding.local, value)?;
                debug!(module = %module.label, key = %binding.local, "Import bound");
                Ok(true)
            }
            WorkItem::Service {
                slot,
                key,
                provider,
            } => {
                let module = &self.modules[slot];
                if !module.namespace.satisfies(provider.deps()) {
                    return Ok(false);
                }
                let input = module.namespace.gather(module.name(), provider.deps())?;
                let value = provider
                    .invoke(&input)
                    .map_err(|source| self.service_error(slot, key, source))?;

                let module = &mut self.modules[slot];
                module.namespace.insert(&module.label, key, value)?;
                debug!(module = %module.label, key, "Service constructed");
                Ok(true)
            }
        }
    }

    fn describe(&self, item: &WorkItem<'c>) -> String {
        match item {
            WorkItem::Import { slot, binding } => {
                format!("{}.{}", self.modules[*slot].name(), binding.local)
            }
            WorkItem::Service { slot, key, .. } => {
                format!("{}.{}", self.modules[*slot].name(), key)
            }
        }
    }

    fn service_error(&self, slot: usize, key: &str, source: BoxError) -> WiringError {
        let module = self.modules[slot].name().to_string();
        warn!(module = %module, key, error = %source, "Service failed");
        WiringError::Service {
            module,
            key: key.to_string(),
            source,
        }
    }

    /// Fails before any hook runs if a hook asks for a key that never resolved.
    fn check_hooks(&self) -> Result<()> {
        for module in &self.modules {
            let hooks = [("run", module.decl.run_hook()), ("stop", module.decl.stop_hook())];
            for (kind, hook) in hooks {
                let Some(hook) = hook else { continue };
                let keys = module.namespace.missing(hook.deps());
                if !keys.is_empty() {
                    return Err(WiringError::MissingHookDependency {
                        module: module.name().to_string(),
                        hook: kind,
                        keys,
                    });
                }
            }
        }
        Ok(())
    }

    fn export_records(&self) -> BTreeMap<String, Record> {
        let mut exports = BTreeMap::new();
        for module in self.modules.iter().filter(|module| !module.names.is_empty()) {
            let mut record = Record::new();
            for key in module.decl.export_keys() {
                if let Some(value) = module.namespace.get(key) {
                    record.insert(key, value.clone());
                }
            }
            for name in &module.names {
                exports.insert(name.clone(), record.clone());
            }
        }
        exports
    }

    fn run_hooks(&self) -> Result<()> {
        for module in &self.modules {
            if let Some(hook) = module.decl.run_hook() {
                info!(module = %module.name(), "Running module");
                invoke_hook(module.name(), "run", hook, &module.namespace)?;
            }
        }
        Ok(())
    }

    fn into_stop_entries(self) -> Vec<StopEntry> {
        self.modules
            .into_iter()
            .filter_map(|module| {
                let hook = module.decl.stop_hook()?.clone();
                Some(StopEntry {
                    module: module.name().to_string(),
                    hook,
                    namespace: module.namespace,
                })
            })
            .collect()
    }
}

/// Runs a lifecycle hook against a module's complete namespace.
pub(crate) fn invoke_hook(
    module: &str,
    kind: &'static str,
    hook: &Hook,
    namespace: &Namespace,
) -> Result<()> {
    let input = namespace.gather(module, hook.deps())?;
    debug!(module, hook = kind, keys = namespace.len(), "Invoking hook");
    hook.invoke(&input).map_err(|source| {
        warn!(module, hook = kind, error = %source, "Hook failed");
        WiringError::Service {
            module: module.to_string(),
            key: kind.to_string(),
            source,
        }
    })
}
