//! # System Lifecycle
//!
//! [`ShopSystem`] owns a running shop: the resolved [`Bundle`] and the app
//! server taken from it.
//!
//! ## Startup
//!
//! 1. **Declare** - every module goes into a fresh [`Catalog`]
//! 2. **Resolve** - constructors run once each in dependency order, then the
//!    `run` hooks register their routes on the shared [`App`]
//! 3. **Serve** - the app's server loop is spawned on the current runtime
//!
//! ## Shutdown
//!
//! [`ShopSystem::shutdown`] calls [`Bundle::stop`], whose `infra` stop hook
//! closes the app, then waits for the server loop to finish. Dropping a
//! `ShopSystem` without calling it leaves the server task running until the
//! runtime ends.

use crate::app::{App, Request, Response};
use crate::config::ShopConfig;
use crate::db::Database;
use crate::error::ShopError;
use crate::modules::ShopModules;
use modwire::{Bundle, Catalog};
use tracing::{error, info};

pub struct ShopSystem {
    pub modules: ShopModules,
    pub bundle: Bundle,
    app: App,
}

impl ShopSystem {
    /// Declares and resolves the shop without serving it.
    pub fn build(config: ShopConfig) -> Result<Self, ShopError> {
        let mut catalog = Catalog::new();
        let modules = ShopModules::declare(&mut catalog, config)?;
        let bundle = catalog.resolve(modules.roots())?;
        let app = bundle.service::<App>("infra", "app")?.clone();
        info!(routes = app.route_table().len(), "Shop resolved");
        Ok(Self {
            modules,
            bundle,
            app,
        })
    }

    /// Builds the shop and starts serving. Must run inside a `tokio` runtime.
    pub fn start(config: ShopConfig) -> Result<Self, ShopError> {
        let system = Self::build(config)?;
        system.app.serve();
        info!("Shop started");
        Ok(system)
    }

    pub fn app(&self) -> &App {
        &self.app
    }

    /// The database, reached through `infra`'s re-export.
    pub fn db(&self) -> Result<&Database, ShopError> {
        Ok(self.bundle.service::<Database>("infra", "db")?)
    }

    pub async fn request(&self, request: Request) -> Result<Response, ShopError> {
        self.app.handle(request).await
    }

    pub async fn shutdown(self) -> Result<(), ShopError> {
        info!("Shutting down shop");
        if let Err(e) = self.bundle.stop() {
            error!(error = %e, "Stop hook failed");
            return Err(e.into());
        }
        self.app.join().await;
        info!("Shutdown complete");
        Ok(())
    }
}
