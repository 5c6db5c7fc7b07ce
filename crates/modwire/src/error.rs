//! # Wiring Errors
//!
//! This module defines the error types used throughout the wiring runtime.
//! Declaration problems, stalled resolution, and failures raised by service
//! code all surface through [`WiringError`].

use crate::projection::ProjectionError;

/// Boxed error returned by service constructors and lifecycle hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while declaring or resolving modules.
#[derive(Debug, thiserror::Error)]
pub enum WiringError {
    /// The fixed-point loop stalled. Lists every stuck `module.key` pair.
    #[error("Cannot resolve: {}", items.join(", "))]
    Unresolved { items: Vec<String> },

    /// A constructor with dependencies was invoked outside of a resolution run.
    #[error("cannot inject outside of module resolution: {module} requested {}", keys.join(", "))]
    InjectOutsideResolution { module: String, keys: Vec<String> },

    /// A constructor or hook failed. Displays as the original error.
    #[error("{source}")]
    Service {
        module: String,
        key: String,
        #[source]
        source: BoxError,
    },

    #[error("Projection of {module}.{key} failed: {source}")]
    Projection {
        module: String,
        key: String,
        #[source]
        source: ProjectionError,
    },

    #[error("Module {module} declares key '{key}' more than once")]
    DuplicateKey { module: String, key: String },

    #[error("Module {module} requests an empty field list for '{key}'")]
    EmptyProjection { module: String, key: String },

    #[error("Service {module}.{key} injects from {owner}, not from its own module")]
    ForeignInjection {
        module: String,
        key: String,
        owner: String,
    },

    #[error("Module {module} re-exports '{key}', which it does not import")]
    UnknownReexport { module: String, key: String },

    #[error("Module {module} is already defined")]
    AlreadyDefined { module: String },

    #[error("Module {module} was reserved but never defined")]
    UndefinedModule { module: String },

    #[error("{hook} hook of {module} requests unknown keys: {}", keys.join(", "))]
    MissingHookDependency {
        module: String,
        hook: &'static str,
        keys: Vec<String>,
    },

    /// A bundle lookup named a module that is not among its roots.
    #[error("Module '{module}' is not in the bundle")]
    NotInBundle { module: String },

    #[error("Field not found: {0}")]
    MissingField(String),

    #[error("Field '{field}' holds {found}, not {expected}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        found: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, WiringError>;
