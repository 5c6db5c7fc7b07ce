//! # Service Constructors & Hooks
//!
//! Every constructor declares what it needs up front as a [`DependencySignal`]
//! (the keys it wants from its own module). The engine reads that declaration
//! instead of calling the constructor to find out, so probing never executes
//! service code for a constructor that has dependencies.
//!
//! ```rust
//! use modwire::{Catalog, ModuleDecl, Provider};
//!
//! let mut catalog = Catalog::new();
//! let shop = catalog.reserve("shop");
//!
//! let greeting = Provider::value(String::from("hello"));
//! let shout = shop
//!     .inject(["greeting"])
//!     .build(|deps| Ok(deps.get::<String>("greeting")?.to_uppercase()));
//!
//! // A constructor with dependencies cannot run on its own.
//! let err = shout.construct(&catalog).unwrap_err();
//! assert_eq!(
//!     err.to_string(),
//!     "cannot inject outside of module resolution: shop requested greeting"
//! );
//! assert!(greeting.construct(&catalog).is_ok());
//! ```

use crate::error::{BoxError, WiringError};
use crate::module::{Catalog, ModuleId};
use crate::projection::Deps;
use crate::value::{Record, Value};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

type BuildFn = dyn Fn(&Record) -> Result<Value, BoxError> + Send + Sync;
type HookFn = dyn Fn(&Record) -> Result<(), BoxError> + Send + Sync;

/// A request, owned by one module, for some of that module's keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencySignal {
    module: ModuleId,
    deps: Deps,
}

impl DependencySignal {
    pub fn new(module: ModuleId, deps: Deps) -> Self {
        Self { module, deps }
    }

    pub fn module(&self) -> ModuleId {
        self.module
    }

    pub fn deps(&self) -> &Deps {
        &self.deps
    }

    /// Attaches a constructor body, producing a [`Provider`].
    pub fn build<T, F>(self, build: F) -> Provider
    where
        T: Any + Send + Sync,
        F: Fn(&Record) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        Provider {
            owner: Some(self.module),
            deps: self.deps,
            build: Arc::new(move |input: &Record| build(input).map(Value::new)),
        }
    }

    /// Attaches a lifecycle body, producing a [`Hook`].
    pub fn hook<F>(self, call: F) -> Hook
    where
        F: Fn(&Record) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        Hook {
            owner: Some(self.module),
            deps: self.deps,
            call: Arc::new(call),
        }
    }

    /// The error reported when the signal escapes a resolution run. The
    /// module is named by its label in `catalog`.
    pub fn into_error(self, catalog: &Catalog) -> WiringError {
        let module = catalog
            .label(self.module)
            .map_or_else(|| self.module.to_string(), str::to_string);
        WiringError::InjectOutsideResolution {
            module,
            keys: self.deps.key_names(),
        }
    }
}

/// Outcome of probing a constructor without real input.
#[derive(Debug)]
pub enum Probe {
    /// Zero-dependency constructor, already built.
    Ready(Value),
    /// Constructor waiting for these keys.
    Needs(DependencySignal),
}

/// A service constructor together with its declared dependencies.
#[derive(Clone)]
pub struct Provider {
    owner: Option<ModuleId>,
    deps: Deps,
    build: Arc<BuildFn>,
}

impl Provider {
    /// A finished value.
    pub fn value<T: Any + Send + Sync>(value: T) -> Self {
        let value = Value::new(value);
        Self::from_build(move |_| Ok(value.clone()))
    }

    /// A zero-dependency constructor.
    pub fn lazy<T, F>(build: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::from_build(move |_| Ok(Value::new(build())))
    }

    /// A zero-dependency constructor that may fail.
    pub fn try_lazy<T, F>(build: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn() -> Result<T, BoxError> + Send + Sync + 'static,
    {
        Self::from_build(move |_| build().map(Value::new))
    }

    fn from_build<F>(build: F) -> Self
    where
        F: Fn(&Record) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        Self {
            owner: None,
            deps: Deps::new(),
            build: Arc::new(build),
        }
    }

    pub fn owner(&self) -> Option<ModuleId> {
        self.owner
    }

    pub fn deps(&self) -> &Deps {
        &self.deps
    }

    /// Builds zero-dependency constructors immediately; reports the
    /// dependency request of everything else without running it.
    pub fn probe(&self) -> Result<Probe, BoxError> {
        match self.owner {
            Some(module) if !self.deps.is_empty() => Ok(Probe::Needs(DependencySignal::new(
                module,
                self.deps.clone(),
            ))),
            _ => (self.build)(&Record::new()).map(Probe::Ready),
        }
    }

    /// Runs the constructor outside of resolution. Fails for constructors
    /// with dependencies, naming the owning module as labelled in `catalog`.
    pub fn construct(&self, catalog: &Catalog) -> Result<Value, BoxError> {
        match self.probe()? {
            Probe::Ready(value) => Ok(value),
            Probe::Needs(signal) => Err(Box::new(signal.into_error(catalog))),
        }
    }

    pub(crate) fn invoke(&self, input: &Record) -> Result<Value, BoxError> {
        (self.build)(input)
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("owner", &self.owner)
            .field("deps", &self.deps)
            .finish_non_exhaustive()
    }
}

/// A `run` or `stop` lifecycle callable.
#[derive(Clone)]
pub struct Hook {
    owner: Option<ModuleId>,
    deps: Deps,
    call: Arc<HookFn>,
}

impl Hook {
    /// A hook without dependencies; it receives an empty record.
    pub fn new<F>(call: F) -> Self
    where
        F: Fn(&Record) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        Self {
            owner: None,
            deps: Deps::new(),
            call: Arc::new(call),
        }
    }

    pub fn owner(&self) -> Option<ModuleId> {
        self.owner
    }

    pub fn deps(&self) -> &Deps {
        &self.deps
    }

    pub(crate) fn invoke(&self, input: &Record) -> Result<(), BoxError> {
        (self.call)(input)
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("owner", &self.owner)
            .field("deps", &self.deps)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Catalog;

    #[test]
    fn probing_a_dependent_constructor_does_not_run_it() {
        let mut catalog = Catalog::new();
        let module = catalog.reserve("m");
        let provider = module
            .inject(["x"])
            .build(|_| -> Result<u8, BoxError> { panic!("constructor ran during probe") });

        match provider.probe().unwrap() {
            Probe::Needs(signal) => {
                assert_eq!(signal.module(), module);
                assert_eq!(signal.deps().key_names(), vec!["x"]);
            }
            Probe::Ready(_) => panic!("expected a dependency signal"),
        }
    }

    #[test]
    fn direct_construction_names_module_and_keys() {
        let mut catalog = Catalog::new();
        let module = catalog.reserve("auth");
        let provider = module.inject(["a", "b"]).build(|_| Ok(1_u8));

        let err = provider.construct(&catalog).unwrap_err();
        let err = err.downcast_ref::<WiringError>().unwrap();
        assert!(matches!(
            err,
            WiringError::InjectOutsideResolution { module, keys }
                if module == "auth" && keys == &["a", "b"]
        ));
        assert_eq!(
            err.to_string(),
            "cannot inject outside of module resolution: auth requested a, b"
        );

        // A catalog that never issued the handle falls back to the id.
        let elsewhere = Catalog::new();
        let err = provider.construct(&elsewhere).unwrap_err();
        assert!(err.to_string().ends_with(&format!("{module} requested a, b")));
    }

    #[test]
    fn zero_dependency_constructor_builds_on_probe() {
        let provider = Provider::lazy(|| 41_u32 + 1);
        match provider.probe().unwrap() {
            Probe::Ready(value) => assert_eq!(value.downcast_ref::<u32>(), Some(&42)),
            Probe::Needs(_) => panic!("expected a ready value"),
        }
    }
}
