//! Demo storefront: resolves the shop, then registers a customer, fills a cart
//! and checks out through the in-process app server.
//!
//! ```bash
//! RUST_LOG=info cargo run -p modwire-shop
//! SHOP_CONFIG=shop.toml SHOP_TAX_RATE=0.2 cargo run -p modwire-shop
//! ```

use modwire::tracing::setup_tracing;
use modwire_shop::app::Request;
use modwire_shop::model::{Order, Product};
use modwire_shop::services::auth::Session;
use modwire_shop::{ShopConfig, ShopError, ShopSystem};
use serde_json::json;
use std::path::PathBuf;
use tracing::{error, info, Instrument};

#[tokio::main]
async fn main() -> Result<(), ShopError> {
    setup_tracing();

    let path = std::env::var_os("SHOP_CONFIG").map(PathBuf::from);
    let config = ShopConfig::load(path.as_deref())?;
    let system = ShopSystem::start(config)?;
    system.db()?.seed().await?;

    let health = system.request(Request::get("/health")).await?;
    info!(status = health.status, body = %health.body, "Health check");

    let session: Session = async {
        info!("Registering customer");
        system
            .request(Request::post(
                "/auth/register",
                json!({
                    "email": "alice@example.com",
                    "password": "wonderland",
                    "first_name": "Alice",
                    "last_name": "Liddell",
                }),
            ))
            .await?
            .json()
    }
    .instrument(tracing::info_span!("registration"))
    .await?;
    info!(user = %session.user.id, "Customer registered");

    let products: Vec<Product> = system.request(Request::get("/products")).await?.json()?;
    for product in products.iter().take(2) {
        let response = system
            .request(
                Request::post(
                    "/cart/items",
                    json!({ "product_id": product.id, "quantity": 1 }),
                )
                .with_bearer(&session.token),
            )
            .await?;
        info!(product = %product.id, status = response.status, "Added to cart");
    }

    let checkout = async {
        system
            .request(
                Request::post(
                    "/orders",
                    json!({
                        "shipping_address": {
                            "street": "1 Rabbit Hole",
                            "city": "Oxford",
                            "state": "Oxfordshire",
                            "zip_code": "OX1",
                            "country": "GB",
                        },
                        "payment_method_id": "pm_card_visa",
                        "coupon_code": "WELCOME10",
                    }),
                )
                .with_bearer(&session.token),
            )
            .await
    }
    .instrument(tracing::info_span!("checkout"))
    .await?;

    if checkout.is_success() {
        let order: Order = checkout.json()?;
        info!(order = %order.id, total = order.total, status = ?order.status, "Order placed");
    } else {
        error!(status = checkout.status, body = %checkout.body, "Checkout failed");
    }

    system.shutdown().await?;
    info!("Demo completed");
    Ok(())
}
