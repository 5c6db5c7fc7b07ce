//! # modwire
//!
//! A declarative module-wiring runtime. Independently written modules declare
//! private services, services they export, and services they want from other
//! modules. The runtime composes them into one running application without any
//! module knowing the construction order of its dependencies.
//!
//! ## Why declarative wiring?
//!
//! Hand-written bootstrapping code has to create every service in the right
//! order and pass each one to whoever needs it. That code grows with every new
//! dependency and breaks whenever two parts of the system start to need each
//! other. Here, each module only states *what* it needs; the engine works out
//! *when* to build it.
//!
//! - **Isolation**: internal services never leave their module
//! - **Least privilege**: a consumer can import only some fields of a service
//! - **Mutual imports**: two modules may import from each other as long as no
//!   single key depends on itself
//! - **Exactly once**: every service constructor runs once per resolution run
//!
//! ## Architecture Overview
//!
//! 1. **Declaration** ([`Catalog`], [`ModuleDecl`], [`Provider`]) - modules and
//!    their constructors, each constructor listing its dependencies up front
//! 2. **Resolution** ([`Catalog::resolve`]) - discovery, worklist and fixed point,
//!    see the [`engine`] module
//! 3. **Lifecycle** ([`Bundle`]) - `run` hooks after resolution, `stop` hooks on demand
//!
//! ## Example
//!
//! ```rust
//! use modwire::projection::Deps;
//! use modwire::{Catalog, ModuleDecl, Provider, Record};
//!
//! let mut catalog = Catalog::new();
//!
//! let config = catalog
//!     .declare("config", |_| {
//!         ModuleDecl::new().export(
//!             "settings",
//!             Provider::value(Record::new().with("secret", "s3cr3t").with("port", 8080_u16)),
//!         )
//!     })
//!     .unwrap();
//!
//! let auth = catalog
//!     .declare("auth", |me| {
//!         ModuleDecl::new()
//!             .imports(config.import_pick(Deps::new().fields("settings", ["secret"])))
//!             .internal(
//!                 "signer",
//!                 me.inject(["settings"]).build(|deps| {
//!                     let settings = deps.get::<Record>("settings")?;
//!                     // Only the picked field crossed the module boundary.
//!                     assert!(!settings.contains("port"));
//!                     Ok(format!("signed with {}", settings.get::<&str>("secret")?))
//!                 }),
//!             )
//!             .export(
//!                 "login",
//!                 me.inject(["signer"])
//!                     .build(|deps| Ok(format!("login ({})", deps.get::<String>("signer")?))),
//!             )
//!     })
//!     .unwrap();
//!
//! // `config` is pulled in through the import without being named.
//! let bundle = catalog.resolve([("auth", auth)]).unwrap();
//! assert_eq!(bundle.service::<String>("auth", "login").unwrap(), "login (signed with s3cr3t)");
//! assert!(bundle.module("config").is_none());
//! ```
//!
//! ## Errors
//!
//! Everything fails through [`WiringError`]. A stalled resolution names every
//! stuck `module.key` pair, e.g. `Cannot resolve: auth.authService, cart.cartService`.
//! Errors raised by service code come back as [`WiringError::Service`], which
//! displays as the original error and keeps it as its `source()`.
//!
//! ## Concurrency
//!
//! Resolution is synchronous and single-threaded. A constructor may return an
//! asynchronous handle (a task handle, a channel, a lazily connected client);
//! the engine stores it like any other value and never awaits it.
//!
//! ## Testing
//!
//! See [`testing::CallLog`] for recording constructor and hook invocations.

pub mod bundle;
pub mod engine;
pub mod error;
pub mod module;
mod namespace;
pub mod projection;
pub mod provider;
pub mod testing;
pub mod tracing;
pub mod value;

// Re-export core types for convenience
pub use bundle::Bundle;
pub use error::{BoxError, WiringError};
pub use module::{Catalog, ImportBinding, ModuleDecl, ModuleId};
pub use projection::{Deps, Request};
pub use provider::{DependencySignal, Hook, Probe, Provider};
pub use value::{Record, Value};
