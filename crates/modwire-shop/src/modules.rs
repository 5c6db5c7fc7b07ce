//! # Shop Module Graph
//!
//! Declares every shop module in a [`Catalog`]:
//!
//! | module    | imports                                                        | exports                 |
//! |-----------|----------------------------------------------------------------|-------------------------|
//! | `config`  |                                                                | `config`                |
//! | `db`      | `config: [database_url]`                                       | `db`                    |
//! | `infra`   | `config`, `db`                                                 | `app`, `gateway`, `config`, `db` |
//! | `auth`    | `app`, `config: [jwt_secret]`, `db`                            | `auth_middleware`       |
//! | `product` | `app`, `db`                                                    | `product_service`       |
//! | `cart`    | `app`, `db`, `auth_middleware: [authenticate]`, `product_service` | `cart_service`       |
//! | `payment` | `app`, `gateway`, `auth_middleware: [authenticate]`            | `payment_service`       |
//! | `order`   | `app`, `db`, `config: [tax_rate]`, `auth_middleware: [authenticate, require_admin]`, `cart_service`, `payment_service` | |
//!
//! `infra` re-exports `config` and `db`, so feature modules import everything
//! infrastructural from one place. Only `config` and `db` are left out of the
//! root set: they resolve because `infra` imports them.

use crate::app::App;
use crate::config::ShopConfig;
use crate::db::Database;
use crate::gateway::{FakeGateway, PaymentGateway};
use crate::services::auth::{self, AuthService, Authenticate, RequireAdmin};
use crate::services::cart::{self, CartService};
use crate::services::order::{self, OrderService};
use crate::services::payment::{self, PaymentService};
use crate::services::product::{self, ProductService};
use modwire::{Catalog, Deps, ModuleDecl, ModuleId, Provider, Record, WiringError};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

/// Ids of the declared shop modules.
#[derive(Debug, Clone, Copy)]
pub struct ShopModules {
    pub config: ModuleId,
    pub db: ModuleId,
    pub infra: ModuleId,
    pub auth: ModuleId,
    pub product: ModuleId,
    pub cart: ModuleId,
    pub payment: ModuleId,
    pub order: ModuleId,
}

impl ShopModules {
    pub fn declare(catalog: &mut Catalog, config: ShopConfig) -> Result<Self, WiringError> {
        let config = config_module(catalog, config)?;
        let db = db_module(catalog, config)?;
        let infra = infra_module(catalog, config, db)?;
        let auth = auth_module(catalog, infra)?;
        let product = product_module(catalog, infra)?;
        let cart = cart_module(catalog, infra, auth, product)?;
        let payment = payment_module(catalog, infra, auth)?;
        let order = order_module(catalog, infra, auth, cart, payment)?;
        debug!(modules = catalog.len(), "Shop modules declared");
        Ok(Self {
            config,
            db,
            infra,
            auth,
            product,
            cart,
            payment,
            order,
        })
    }

    /// The modules the application names when resolving.
    pub fn roots(&self) -> [(&'static str, ModuleId); 6] {
        [
            ("infra", self.infra),
            ("auth", self.auth),
            ("cart", self.cart),
            ("order", self.order),
            ("payment", self.payment),
            ("product", self.product),
        ]
    }
}

fn config_module(catalog: &mut Catalog, config: ShopConfig) -> Result<ModuleId, WiringError> {
    catalog.declare("config", |_| {
        ModuleDecl::new().export("config", Provider::value(config.to_record()))
    })
}

fn db_module(catalog: &mut Catalog, config: ModuleId) -> Result<ModuleId, WiringError> {
    catalog.declare("db", |me| {
        ModuleDecl::new()
            .imports(config.import_pick(Deps::new().fields("config", ["database_url"])))
            .export(
                "db",
                me.inject(["config"]).build(|deps| {
                    let url = deps.get::<Record>("config")?.get::<String>("database_url")?;
                    Ok(Database::connect(url)?)
                }),
            )
    })
}

fn infra_module(
    catalog: &mut Catalog,
    config: ModuleId,
    db: ModuleId,
) -> Result<ModuleId, WiringError> {
    catalog.declare("infra", |me| {
        ModuleDecl::new()
            .imports(config.import(["config"]))
            .imports(db.import(["db"]))
            .export(
                "app",
                me.inject_pick(Deps::new().fields("config", ["request_buffer"]))
                    .build(|deps| {
                        let buffer = deps.get::<Record>("config")?.get::<usize>("request_buffer")?;
                        Ok(App::new(*buffer))
                    }),
            )
            .export(
                "gateway",
                me.inject_pick(Deps::new().fields("config", ["payment_secret_key"]))
                    .build(|deps| {
                        let key = deps
                            .get::<Record>("config")?
                            .get::<String>("payment_secret_key")?;
                        let gateway: Arc<dyn PaymentGateway> = Arc::new(FakeGateway::new(key.clone()));
                        Ok(gateway)
                    }),
            )
            .reexport("config")
            .reexport("db")
            .on_run(me.inject(["app", "db"]).hook(|deps| {
                let app = deps.get::<App>("app")?;
                let db = deps.get::<Database>("db")?.clone();
                app.get("/health", move |_req| health(db.clone()));
                Ok(())
            }))
            .on_stop(me.inject(["app"]).hook(|deps| {
                deps.get::<App>("app")?.close();
                Ok(())
            }))
    })
}

async fn health(db: Database) -> Result<Value, crate::ShopError> {
    Ok(json!({
        "status": "healthy",
        "services": { "database": db.url(), "payments": "configured" },
    }))
}

fn auth_module(catalog: &mut Catalog, infra: ModuleId) -> Result<ModuleId, WiringError> {
    catalog.declare("auth", |me| {
        ModuleDecl::new()
            .imports(infra.import_pick(
                Deps::new()
                    .whole("app")
                    .fields("config", ["jwt_secret"])
                    .whole("db"),
            ))
            .internal(
                "auth_service",
                me.inject(["config", "db"]).build(|deps| {
                    let secret = deps.get::<Record>("config")?.get::<String>("jwt_secret")?;
                    let db = deps.get::<Database>("db")?.clone();
                    Ok(Arc::new(AuthService::new(db, secret.clone())))
                }),
            )
            .export(
                "auth_middleware",
                me.inject(["auth_service"]).build(|deps| {
                    let service = deps.get::<Arc<AuthService>>("auth_service")?;
                    Ok(auth::middleware(Arc::clone(service)))
                }),
            )
            .on_run(
                me.inject_pick(
                    Deps::new()
                        .whole("app")
                        .whole("auth_service")
                        .fields("auth_middleware", ["authenticate"]),
                )
                .hook(|deps| {
                    let authenticate = authenticate(deps)?;
                    let service = deps.get::<Arc<AuthService>>("auth_service")?;
                    auth::routes(deps.get::<App>("app")?, Arc::clone(service), authenticate);
                    Ok(())
                }),
            )
    })
}

fn product_module(catalog: &mut Catalog, infra: ModuleId) -> Result<ModuleId, WiringError> {
    catalog.declare("product", |me| {
        ModuleDecl::new()
            .imports(infra.import(["app", "db"]))
            .export(
                "product_service",
                me.inject(["db"]).build(|deps| {
                    Ok(Arc::new(ProductService::new(deps.get::<Database>("db")?.clone())))
                }),
            )
            .on_run(me.inject(["app", "product_service"]).hook(|deps| {
                let service = deps.get::<Arc<ProductService>>("product_service")?;
                product::routes(deps.get::<App>("app")?, Arc::clone(service));
                Ok(())
            }))
    })
}

fn cart_module(
    catalog: &mut Catalog,
    infra: ModuleId,
    auth: ModuleId,
    product: ModuleId,
) -> Result<ModuleId, WiringError> {
    catalog.declare("cart", |me| {
        ModuleDecl::new()
            .imports(infra.import(["app", "db"]))
            .imports(auth.import_pick(Deps::new().fields("auth_middleware", ["authenticate"])))
            .imports(product.import(["product_service"]))
            .export(
                "cart_service",
                me.inject(["db", "product_service"]).build(|deps| {
                    let db = deps.get::<Database>("db")?.clone();
                    let products = deps.get::<Arc<ProductService>>("product_service")?;
                    Ok(Arc::new(CartService::new(db, Arc::clone(products))))
                }),
            )
            .on_run(
                me.inject(["app", "auth_middleware", "cart_service"])
                    .hook(|deps| {
                        let service = deps.get::<Arc<CartService>>("cart_service")?;
                        cart::routes(deps.get::<App>("app")?, Arc::clone(service), authenticate(deps)?);
                        Ok(())
                    }),
            )
    })
}

fn payment_module(
    catalog: &mut Catalog,
    infra: ModuleId,
    auth: ModuleId,
) -> Result<ModuleId, WiringError> {
    catalog.declare("payment", |me| {
        ModuleDecl::new()
            .imports(infra.import(["app", "gateway"]))
            .imports(auth.import_pick(Deps::new().fields("auth_middleware", ["authenticate"])))
            .export(
                "payment_service",
                me.inject(["gateway"]).build(|deps| {
                    let gateway = deps.get::<Arc<dyn PaymentGateway>>("gateway")?;
                    Ok(Arc::new(PaymentService::new(Arc::clone(gateway))))
                }),
            )
            .on_run(
                me.inject(["app", "auth_middleware", "payment_service"])
                    .hook(|deps| {
                        let service = deps.get::<Arc<PaymentService>>("payment_service")?;
                        payment::routes(
                            deps.get::<App>("app")?,
                            Arc::clone(service),
                            authenticate(deps)?,
                        );
                        Ok(())
                    }),
            )
    })
}

fn order_module(
    catalog: &mut Catalog,
    infra: ModuleId,
    auth: ModuleId,
    cart: ModuleId,
    payment: ModuleId,
) -> Result<ModuleId, WiringError> {
    catalog.declare("order", |me| {
        ModuleDecl::new()
            .imports(infra.import_pick(
                Deps::new()
                    .whole("app")
                    .whole("db")
                    .fields("config", ["tax_rate"]),
            ))
            .imports(auth.import_pick(
                Deps::new().fields("auth_middleware", ["authenticate", "require_admin"]),
            ))
            .imports(cart.import(["cart_service"]))
            .imports(payment.import(["payment_service"]))
            .internal(
                "order_service",
                me.inject(["db", "config", "cart_service", "payment_service"])
                    .build(|deps| {
                        let tax_rate = *deps.get::<Record>("config")?.get::<f64>("tax_rate")?;
                        Ok(Arc::new(OrderService::new(
                            deps.get::<Database>("db")?.clone(),
                            Arc::clone(deps.get::<Arc<CartService>>("cart_service")?),
                            Arc::clone(deps.get::<Arc<PaymentService>>("payment_service")?),
                            tax_rate,
                        )))
                    }),
            )
            .on_run(
                me.inject(["app", "auth_middleware", "order_service"])
                    .hook(|deps| {
                        let middleware = deps.get::<Record>("auth_middleware")?;
                        let require_admin = *middleware.get::<RequireAdmin>("require_admin")?;
                        let service = deps.get::<Arc<OrderService>>("order_service")?;
                        order::routes(
                            deps.get::<App>("app")?,
                            Arc::clone(service),
                            authenticate(deps)?,
                            require_admin,
                        );
                        Ok(())
                    }),
            )
    })
}

/// The `authenticate` field of an injected `auth_middleware` record.
fn authenticate(deps: &Record) -> Result<Authenticate, WiringError> {
    deps.get::<Record>("auth_middleware")?
        .get::<Authenticate>("authenticate")
        .cloned()
}
