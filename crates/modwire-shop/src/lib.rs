//! # modwire-shop
//!
//! A storefront assembled from `modwire` modules: configuration, an in-memory
//! database, an in-process app server, authentication, products, carts,
//! payments and orders.
//!
//! See [`modules`] for the module graph and [`lifecycle::ShopSystem`] for
//! starting and stopping it.

pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod lifecycle;
pub mod model;
pub mod modules;
pub mod services;

pub use config::ShopConfig;
pub use error::ShopError;
pub use lifecycle::ShopSystem;
