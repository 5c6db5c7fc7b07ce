//! # Shopping Carts
//!
//! One cart per user, stored as product id to quantity. Prices and names are
//! read from the catalog every time a cart is shown, so a cart always reflects
//! current prices.

use crate::app::{App, Request};
use crate::db::Database;
use crate::error::ShopError;
use crate::model::{round_cents, Cart, CartItem, ProductId, UserId};
use crate::services::auth::Authenticate;
use crate::services::product::ProductService;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, instrument};

/// Most units of one product a cart line may hold.
pub const MAX_LINE_QUANTITY: u32 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryCheck {
    pub valid: bool,
    pub issues: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AddItem {
    product_id: ProductId,
    quantity: u32,
}

#[derive(Debug, Deserialize)]
struct SetQuantity {
    quantity: u32,
}

#[derive(Debug, Clone)]
pub struct CartService {
    db: Database,
    products: Arc<ProductService>,
}

impl CartService {
    pub fn new(db: Database, products: Arc<ProductService>) -> Self {
        Self { db, products }
    }

    pub async fn get_cart(&self, user: UserId) -> Result<Cart, ShopError> {
        let lines = self
            .db
            .read(|tables| tables.carts.get(&user).cloned().unwrap_or_default())
            .await;
        let mut items = Vec::with_capacity(lines.len());
        for (product_id, quantity) in lines {
            // Deactivated products silently drop out of the cart.
            let Ok(product) = self.products.get(product_id).await else {
                continue;
            };
            items.push(CartItem {
                product_id,
                product_name: product.name,
                product_price: product.price,
                quantity,
                subtotal: round_cents(product.price * f64::from(quantity)),
            });
        }
        Ok(Cart::from_items(items))
    }

    #[instrument(skip(self), fields(user = %user))]
    pub async fn add_to_cart(
        &self,
        user: UserId,
        product: ProductId,
        quantity: u32,
    ) -> Result<CartItem, ShopError> {
        check_quantity(quantity)?;
        let details = self.products.details(product).await?;
        if details.stock < quantity {
            return Err(ShopError::InsufficientInventory);
        }

        let total = self
            .db
            .transaction(|tables| {
                let line = tables.carts.entry(user).or_default().entry(product).or_default();
                let total = *line + quantity;
                if total > details.stock {
                    return Err(ShopError::BadRequest(
                        "total quantity exceeds available inventory".to_string(),
                    ));
                }
                *line = total;
                Ok(total)
            })
            .await?;
        info!(%product, quantity = total, "Cart line updated");
        Ok(line_item(&details.product, total))
    }

    pub async fn update_cart_item(
        &self,
        user: UserId,
        product: ProductId,
        quantity: u32,
    ) -> Result<CartItem, ShopError> {
        check_quantity(quantity)?;
        let details = self.products.details(product).await?;
        if details.stock < quantity {
            return Err(ShopError::InsufficientInventory);
        }
        self.db
            .transaction(|tables| {
                let line = tables
                    .carts
                    .get_mut(&user)
                    .and_then(|cart| cart.get_mut(&product))
                    .ok_or_else(|| ShopError::NotFound("Cart item".to_string()))?;
                *line = quantity;
                Ok(())
            })
            .await?;
        Ok(line_item(&details.product, quantity))
    }

    pub async fn remove_from_cart(&self, user: UserId, product: ProductId) -> Result<(), ShopError> {
        self.db
            .transaction(|tables| {
                tables
                    .carts
                    .get_mut(&user)
                    .and_then(|cart| cart.remove(&product))
                    .map(|_| ())
                    .ok_or_else(|| ShopError::NotFound("Cart item".to_string()))
            })
            .await
    }

    pub async fn clear_cart(&self, user: UserId) -> Result<(), ShopError> {
        self.db
            .transaction(|tables| {
                tables.carts.remove(&user);
                Ok(())
            })
            .await
    }

    /// Compares every cart line with current stock.
    pub async fn validate_inventory(&self, user: UserId) -> Result<InventoryCheck, ShopError> {
        let cart = self.get_cart(user).await?;
        let mut issues = Vec::new();
        for item in &cart.items {
            let available = self.products.check_stock(item.product_id).await?;
            if available < item.quantity {
                issues.push(format!(
                    "Only {available} units of {} available (you have {} in cart)",
                    item.product_name, item.quantity
                ));
            }
        }
        Ok(InventoryCheck {
            valid: issues.is_empty(),
            issues,
        })
    }
}

fn check_quantity(quantity: u32) -> Result<(), ShopError> {
    if quantity == 0 || quantity > MAX_LINE_QUANTITY {
        return Err(ShopError::BadRequest(format!(
            "quantity must be between 1 and {MAX_LINE_QUANTITY}"
        )));
    }
    Ok(())
}

fn line_item(product: &crate::model::Product, quantity: u32) -> CartItem {
    CartItem {
        product_id: product.id,
        product_name: product.name.clone(),
        product_price: product.price,
        quantity,
        subtotal: round_cents(product.price * f64::from(quantity)),
    }
}

/// Every cart route requires a signed-in user.
pub fn routes(app: &App, carts: Arc<CartService>, authenticate: Authenticate) {
    let ctx = CartRoutes {
        carts,
        authenticate,
    };
    let c = ctx.clone();
    app.get("/cart", move |req| c.clone().get(req));
    let c = ctx.clone();
    app.post("/cart/items", move |req| c.clone().add(req));
    let c = ctx.clone();
    app.put("/cart/items/:product_id", move |req| c.clone().update(req));
    let c = ctx.clone();
    app.delete("/cart/items/:product_id", move |req| c.clone().remove(req));
    app.delete("/cart", move |req| ctx.clone().clear(req));
}

#[derive(Clone)]
struct CartRoutes {
    carts: Arc<CartService>,
    authenticate: Authenticate,
}

impl CartRoutes {
    async fn get(self, req: Request) -> Result<Cart, ShopError> {
        let user = self.authenticate.user(&req).await?;
        self.carts.get_cart(user.id).await
    }

    async fn add(self, req: Request) -> Result<CartItem, ShopError> {
        let user = self.authenticate.user(&req).await?;
        let body: AddItem = req.json()?;
        self.carts
            .add_to_cart(user.id, body.product_id, body.quantity)
            .await
    }

    async fn update(self, req: Request) -> Result<CartItem, ShopError> {
        let user = self.authenticate.user(&req).await?;
        let product = ProductId(req.param("product_id")?);
        let body: SetQuantity = req.json()?;
        self.carts
            .update_cart_item(user.id, product, body.quantity)
            .await
    }

    async fn remove(self, req: Request) -> Result<Value, ShopError> {
        let user = self.authenticate.user(&req).await?;
        let product = ProductId(req.param("product_id")?);
        self.carts.remove_from_cart(user.id, product).await?;
        Ok(json!({ "success": true }))
    }

    async fn clear(self, req: Request) -> Result<Value, ShopError> {
        let user = self.authenticate.user(&req).await?;
        self.carts.clear_cart(user.id).await?;
        Ok(json!({ "success": true }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn fixture() -> (CartService, Vec<crate::model::Product>) {
        let db = Database::connect("memory://cart").unwrap();
        let products = db.seed().await.unwrap();
        let service = CartService::new(db.clone(), Arc::new(ProductService::new(db)));
        (service, products)
    }

    #[tokio::test]
    async fn test_add_merges_lines_and_totals() {
        let (carts, products) = fixture().await;
        let user = UserId(100);

        carts.add_to_cart(user, products[0].id, 1).await.unwrap();
        let line = carts.add_to_cart(user, products[0].id, 2).await.unwrap();
        assert_eq!(line.quantity, 3);
        carts.add_to_cart(user, products[1].id, 2).await.unwrap();

        let cart = carts.get_cart(user).await.unwrap();
        assert_eq!(cart.total_items, 5);
        assert_eq!(cart.total_amount, 451.0);
    }

    #[tokio::test]
    async fn test_stock_limits() {
        let (carts, products) = fixture().await;
        let hub = products[2].id;
        let user = UserId(100);

        assert!(matches!(
            carts.add_to_cart(user, hub, 4).await,
            Err(ShopError::InsufficientInventory)
        ));
        carts.add_to_cart(user, hub, 2).await.unwrap();
        assert!(carts.add_to_cart(user, hub, 2).await.is_err());
        assert_eq!(carts.get_cart(user).await.unwrap().total_items, 2);
        assert!(carts.add_to_cart(user, hub, 0).await.is_err());
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let (carts, products) = fixture().await;
        let user = UserId(100);
        carts.add_to_cart(user, products[0].id, 1).await.unwrap();
        carts.add_to_cart(user, products[1].id, 1).await.unwrap();

        carts.remove_from_cart(user, products[0].id).await.unwrap();
        assert!(carts.remove_from_cart(user, products[0].id).await.is_err());
        assert_eq!(carts.get_cart(user).await.unwrap().items.len(), 1);

        carts.clear_cart(user).await.unwrap();
        assert!(carts.get_cart(user).await.unwrap().items.is_empty());
        assert!(carts.validate_inventory(user).await.unwrap().valid);
    }
}
