//! # Bundle & Shutdown
//!
//! The [`Bundle`] is what a resolution run hands back: the export records of
//! every module named in the root set, and the means to stop the system.
//!
//! ## Shutdown
//!
//! Stop hooks never run on their own, not even when the bundle is dropped.
//! [`Bundle::stop`] runs every declared stop hook once, in discovery order,
//! each receiving its requested keys from the module's resolved namespace.
//! Calling it again does nothing.
//!
//! ```rust
//! use modwire::{Catalog, ModuleDecl, Provider};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let stops = Arc::new(AtomicUsize::new(0));
//! let counter = Arc::clone(&stops);
//!
//! let mut catalog = Catalog::new();
//! let server = catalog
//!     .declare("server", |me| {
//!         ModuleDecl::new()
//!             .export("port", Provider::value(8080_u16))
//!             .on_stop(me.inject(["port"]).hook(move |deps| {
//!                 assert_eq!(*deps.get::<u16>("port")?, 8080);
//!                 counter.fetch_add(1, Ordering::SeqCst);
//!                 Ok(())
//!             }))
//!     })
//!     .unwrap();
//!
//! let bundle = catalog.resolve([("server", server)]).unwrap();
//! assert_eq!(stops.load(Ordering::SeqCst), 0);
//!
//! bundle.stop().unwrap();
//! bundle.stop().unwrap();
//! assert_eq!(stops.load(Ordering::SeqCst), 1);
//! ```

use crate::engine::invoke_hook;
use crate::error::{Result, WiringError};
use crate::namespace::Namespace;
use crate::provider::Hook;
use crate::value::Record;
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// A module's stop hook together with the namespace it reads from.
pub(crate) struct StopEntry {
    pub(crate) module: String,
    pub(crate) hook: Hook,
    pub(crate) namespace: Namespace,
}

/// Result of a resolution run.
pub struct Bundle {
    exports: BTreeMap<String, Record>,
    stops: Vec<StopEntry>,
    stopped: AtomicBool,
}

impl Bundle {
    pub(crate) fn new(exports: BTreeMap<String, Record>, stops: Vec<StopEntry>) -> Self {
        Self {
            exports,
            stops,
            stopped: AtomicBool::new(false),
        }
    }

    /// Export records keyed by root name.
    pub fn exports(&self) -> &BTreeMap<String, Record> {
        &self.exports
    }

    pub fn module(&self, name: &str) -> Option<&Record> {
        self.exports.get(name)
    }

    /// Typed access to one exported service.
    pub fn service<T: Any>(&self, module: &str, key: &str) -> Result<&T> {
        self.module(module)
            .ok_or_else(|| WiringError::NotInBundle {
                module: module.to_string(),
            })?
            .get::<T>(key)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Runs every stop hook once. Later calls return `Ok(())` immediately.
    ///
    /// A failing hook aborts the remaining ones; the bundle still counts as
    /// stopped.
    pub fn stop(&self) -> Result<()> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            debug!("Bundle already stopped");
            return Ok(());
        }

        info!(hooks = self.stops.len(), "Stopping modules");
        for entry in &self.stops {
            invoke_hook(&entry.module, "stop", &entry.hook, &entry.namespace)?;
        }
        info!("Shutdown complete");
        Ok(())
    }
}

impl std::fmt::Debug for Bundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bundle")
            .field("exports", &self.exports)
            .field("stop_hooks", &self.stops.len())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}
