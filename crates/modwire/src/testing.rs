//! # Test Utilities
//!
//! [`CallLog`] records which constructors and hooks ran, and in which order.
//! It is cheap to clone, so every closure in a test catalog can hold a copy.
//!
//! ```rust
//! use modwire::testing::CallLog;
//! use modwire::{Catalog, ModuleDecl};
//!
//! let log = CallLog::new();
//! let mut catalog = Catalog::new();
//! let module = catalog
//!     .declare("m", |_| {
//!         ModuleDecl::new().export("answer", log.provider("answer", || 42_u32))
//!     })
//!     .unwrap();
//!
//! catalog.resolve([("m", module)]).unwrap();
//! assert_eq!(log.count("answer"), 1);
//! ```

use crate::error::BoxError;
use crate::provider::{Hook, Provider};
use crate::value::Record;
use std::any::Any;
use std::sync::{Arc, Mutex, PoisonError};

/// Shared, ordered record of events.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    events: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: impl Into<String>) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events().iter().filter(|seen| *seen == event).count()
    }

    /// A zero-dependency provider that logs `event` each time it is built.
    pub fn provider<T, F>(&self, event: &str, build: F) -> Provider
    where
        T: Any + Send + Sync,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let log = self.clone();
        let event = event.to_string();
        Provider::lazy(move || {
            log.record(event.clone());
            build()
        })
    }

    /// Wraps a constructor body so each invocation is logged as `event`.
    pub fn wrap<T, F>(
        &self,
        event: &str,
        build: F,
    ) -> impl Fn(&Record) -> Result<T, BoxError> + Send + Sync + 'static
    where
        F: Fn(&Record) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        let log = self.clone();
        let event = event.to_string();
        move |deps| {
            log.record(event.clone());
            build(deps)
        }
    }

    /// A dependency-free hook that only logs `event`.
    pub fn hook(&self, event: &str) -> Hook {
        let log = self.clone();
        let event = event.to_string();
        Hook::new(move |_| {
            log.record(event.clone());
            Ok(())
        })
    }
}
