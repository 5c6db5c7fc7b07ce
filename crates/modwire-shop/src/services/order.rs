//! # Orders
//!
//! Checkout turns a user's cart into an order in three steps:
//!
//! 1. Price the cart, apply an optional coupon and the configured tax rate
//! 2. Reserve stock and store the order as pending, in one transaction
//! 3. Charge the payment method; on success the cart is cleared, on failure
//!    the order is cancelled and its stock released

use crate::app::{App, Request};
use crate::db::Database;
use crate::error::ShopError;
use crate::model::{
    round_cents, NewOrder, Order, OrderId, OrderItem, OrderStatus, PaymentStatus, UserId,
};
use crate::services::auth::{Authenticate, RequireAdmin};
use crate::services::cart::CartService;
use crate::services::payment::{PaymentRequest, PaymentService};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};

pub const CURRENCY: &str = "usd";

#[derive(Debug, Clone, Deserialize)]
pub struct OrderQuery {
    #[serde(default = "first_page")]
    pub page: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub status: Option<OrderStatus>,
}

fn first_page() -> usize {
    1
}

fn default_limit() -> usize {
    10
}

impl Default for OrderQuery {
    fn default() -> Self {
        Self {
            page: first_page(),
            limit: default_limit(),
            status: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub total: usize,
    pub page: usize,
    pub total_pages: usize,
}

#[derive(Debug, Deserialize)]
struct StatusChange {
    status: OrderStatus,
}

#[derive(Debug, Clone)]
pub struct OrderService {
    db: Database,
    carts: Arc<CartService>,
    payments: Arc<PaymentService>,
    tax_rate: f64,
}

impl OrderService {
    pub fn new(
        db: Database,
        carts: Arc<CartService>,
        payments: Arc<PaymentService>,
        tax_rate: f64,
    ) -> Self {
        Self {
            db,
            carts,
            payments,
            tax_rate,
        }
    }

    #[instrument(skip(self, new), fields(user = %user))]
    pub async fn create_order(&self, user: UserId, new: NewOrder) -> Result<Order, ShopError> {
        let cart = self.carts.get_cart(user).await?;
        if cart.items.is_empty() {
            return Err(ShopError::EmptyCart);
        }
        let check = self.carts.validate_inventory(user).await?;
        if !check.valid {
            return Err(ShopError::BadRequest(format!(
                "Inventory issues: {}",
                check.issues.join(", ")
            )));
        }

        let subtotal = cart.total_amount;
        let tax_rate = self.tax_rate;
        let order = self
            .db
            .transaction(|tables| {
                let discount = match new.coupon_code.as_deref() {
                    Some(code) => match tables.coupons.get_mut(code) {
                        Some(coupon) => match coupon.discount_for(subtotal) {
                            Some(discount) => {
                                coupon.usage_count += 1;
                                discount
                            }
                            None => 0.0,
                        },
                        None => 0.0,
                    },
                    None => 0.0,
                };
                let tax = round_cents((subtotal - discount) * tax_rate);
                let items = cart
                    .items
                    .iter()
                    .map(|item| OrderItem {
                        product_id: item.product_id,
                        product_name: item.product_name.clone(),
                        product_price: item.product_price,
                        quantity: item.quantity,
                        subtotal: item.subtotal,
                    })
                    .collect::<Vec<_>>();
                for item in &items {
                    tables.take_stock(item.product_id, item.quantity)?;
                }

                let order = Order {
                    id: tables.next_order_id(),
                    user_id: user,
                    subtotal,
                    discount,
                    tax,
                    total: round_cents(subtotal - discount + tax),
                    status: OrderStatus::Pending,
                    shipping_address: new.shipping_address.clone(),
                    payment_id: None,
                    payment_status: PaymentStatus::Pending,
                    items,
                };
                tables.orders.insert(order.id, order.clone());
                Ok(order)
            })
            .await?;
        info!(order = %order.id, total = order.total, "Order created");

        let charge = self
            .payments
            .process_payment(PaymentRequest {
                amount: (order.total * 100.0).round() as u64,
                currency: CURRENCY.to_string(),
                payment_method_id: new.payment_method_id,
                order_id: order.id,
            })
            .await;

        match charge {
            Ok(payment) => {
                let paid = self
                    .db
                    .transaction(|tables| {
                        let stored = order_mut(tables, order.id)?;
                        stored.payment_id = Some(payment.payment_id.clone());
                        stored.payment_status = payment.status;
                        if payment.status == PaymentStatus::Succeeded {
                            stored.status = OrderStatus::Processing;
                        }
                        Ok(stored.clone())
                    })
                    .await?;
                self.carts.clear_cart(user).await?;
                info!(order = %paid.id, payment = ?paid.payment_status, "Order paid");
                Ok(paid)
            }
            Err(e) => {
                warn!(order = %order.id, error = %e, "Payment failed, releasing stock");
                self.db
                    .transaction(|tables| {
                        release(tables, order.id, PaymentStatus::Failed)?;
                        Ok(())
                    })
                    .await?;
                if matches!(e, ShopError::PaymentFailed(_)) {
                    Err(e)
                } else {
                    Err(ShopError::PaymentFailed(e.to_string()))
                }
            }
        }
    }

    pub async fn user_orders(&self, user: UserId, query: &OrderQuery) -> OrderPage {
        let matching = self
            .db
            .read(|tables| {
                tables
                    .orders
                    .values()
                    .rev()
                    .filter(|order| order.user_id == user)
                    .filter(|order| query.status.map_or(true, |status| order.status == status))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .await;
        let limit = query.limit.max(1);
        let page = query.page.max(1);
        let total = matching.len();
        OrderPage {
            orders: matching
                .into_iter()
                .skip((page - 1) * limit)
                .take(limit)
                .collect(),
            total,
            page,
            total_pages: total.div_ceil(limit),
        }
    }

    /// The order if it belongs to `user`.
    pub async fn get_order(&self, id: OrderId, user: UserId) -> Result<Order, ShopError> {
        self.db
            .read(|tables| tables.orders.get(&id).cloned())
            .await
            .filter(|order| order.user_id == user)
            .ok_or_else(|| ShopError::NotFound(format!("Order {id}")))
    }

    pub async fn update_status(&self, id: OrderId, status: OrderStatus) -> Result<Order, ShopError> {
        let order = self
            .db
            .transaction(|tables| {
                let stored = order_mut(tables, id)?;
                stored.status = status;
                Ok(stored.clone())
            })
            .await?;
        info!(order = %id, ?status, "Order status changed");
        Ok(order)
    }

    /// Cancels an order that has not shipped yet and refunds its payment.
    pub async fn cancel_order(&self, id: OrderId, user: UserId) -> Result<Order, ShopError> {
        let order = self.get_order(id, user).await?;
        if !matches!(order.status, OrderStatus::Pending | OrderStatus::Processing) {
            return Err(ShopError::BadRequest(format!(
                "order {id} can no longer be cancelled"
            )));
        }
        if let (Some(payment_id), PaymentStatus::Succeeded) =
            (order.payment_id.as_deref(), order.payment_status)
        {
            self.payments.refund(payment_id, None).await?;
        }
        let cancelled = self
            .db
            .transaction(|tables| release(tables, id, order.payment_status))
            .await?;
        info!(order = %id, "Order cancelled");
        Ok(cancelled)
    }
}

fn order_mut(tables: &mut crate::db::Tables, id: OrderId) -> Result<&mut Order, ShopError> {
    tables
        .orders
        .get_mut(&id)
        .ok_or_else(|| ShopError::NotFound(format!("Order {id}")))
}

/// Marks the order cancelled and puts its items back in stock.
fn release(
    tables: &mut crate::db::Tables,
    id: OrderId,
    payment_status: PaymentStatus,
) -> Result<Order, ShopError> {
    let order = order_mut(tables, id)?;
    order.status = OrderStatus::Cancelled;
    order.payment_status = payment_status;
    let order = order.clone();
    for item in &order.items {
        tables.restock(item.product_id, item.quantity);
    }
    Ok(order)
}

pub fn routes(
    app: &App,
    orders: Arc<OrderService>,
    authenticate: Authenticate,
    require_admin: RequireAdmin,
) {
    let ctx = OrderRoutes {
        orders,
        authenticate,
        require_admin,
    };
    let c = ctx.clone();
    app.post("/orders", move |req| c.clone().create(req));
    let c = ctx.clone();
    app.get("/orders", move |req| c.clone().list(req));
    let c = ctx.clone();
    app.get("/orders/:id", move |req| c.clone().get(req));
    let c = ctx.clone();
    app.post("/orders/:id/cancel", move |req| c.clone().cancel(req));
    app.put("/orders/:id/status", move |req| ctx.clone().set_status(req));
}

#[derive(Clone)]
struct OrderRoutes {
    orders: Arc<OrderService>,
    authenticate: Authenticate,
    require_admin: RequireAdmin,
}

impl OrderRoutes {
    async fn create(self, req: Request) -> Result<Order, ShopError> {
        let user = self.authenticate.user(&req).await?;
        self.orders.create_order(user.id, req.json()?).await
    }

    async fn list(self, req: Request) -> Result<OrderPage, ShopError> {
        let user = self.authenticate.user(&req).await?;
        let query = if req.body.is_null() {
            OrderQuery::default()
        } else {
            req.json()?
        };
        Ok(self.orders.user_orders(user.id, &query).await)
    }

    async fn get(self, req: Request) -> Result<Order, ShopError> {
        let user = self.authenticate.user(&req).await?;
        self.orders.get_order(OrderId(req.param("id")?), user.id).await
    }

    async fn cancel(self, req: Request) -> Result<Order, ShopError> {
        let user = self.authenticate.user(&req).await?;
        self.orders.cancel_order(OrderId(req.param("id")?), user.id).await
    }

    async fn set_status(self, req: Request) -> Result<Order, ShopError> {
        let user = self.authenticate.user(&req).await?;
        self.require_admin.check(&user)?;
        let change: StatusChange = req.json()?;
        self.orders
            .update_status(OrderId(req.param("id")?), change.status)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{FakeGateway, DECLINED_METHOD};
    use crate::model::{Role, ShippingAddress};
    use crate::services::product::ProductService;

    async fn fixture() -> (OrderService, Database, UserId, Vec<crate::model::Product>) {
        let db = Database::connect("memory://orders").unwrap();
        let products = db.seed().await.unwrap();
        let user = db
            .insert_user("olga@example.com", "Olga", "Orders", String::new(), Role::Customer)
            .await
            .unwrap();
        let carts = Arc::new(CartService::new(
            db.clone(),
            Arc::new(ProductService::new(db.clone())),
        ));
        let payments = Arc::new(PaymentService::new(Arc::new(FakeGateway::new("sk_test_orders"))));
        let service = OrderService::new(db.clone(), carts, payments, 0.1);
        (service, db, user.id, products)
    }

    fn checkout(method: &str, coupon: Option<&str>) -> NewOrder {
        NewOrder {
            shipping_address: ShippingAddress {
                street: "2 Ledger Lane".into(),
                city: "Leeds".into(),
                state: "West Yorkshire".into(),
                zip_code: "LS1".into(),
                country: "GB".into(),
            },
            payment_method_id: method.into(),
            coupon_code: coupon.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_empty_cart_is_rejected() {
        let (orders, _, user, _) = fixture().await;
        let result = orders.create_order(user, checkout("pm_card_visa", None)).await;
        assert!(matches!(result, Err(ShopError::EmptyCart)));
    }

    #[tokio::test]
    async fn test_coupon_and_tax_are_applied() {
        let (orders, _, user, products) = fixture().await;
        orders.carts.add_to_cart(user, products[0].id, 1).await.unwrap();

        let order = orders
            .create_order(user, checkout("pm_card_visa", Some("WELCOME10")))
            .await
            .unwrap();
        assert_eq!(order.subtotal, 120.0);
        assert_eq!(order.discount, 12.0);
        assert_eq!(order.tax, 10.8);
        assert_eq!(order.total, 118.8);
        assert_eq!(order.status, OrderStatus::Processing);
    }

    #[tokio::test]
    async fn test_unknown_coupon_is_ignored() {
        let (orders, _, user, products) = fixture().await;
        orders.carts.add_to_cart(user, products[1].id, 2).await.unwrap();

        let order = orders
            .create_order(user, checkout("pm_card_visa", Some("NOPE")))
            .await
            .unwrap();
        assert_eq!(order.discount, 0.0);
    }

    #[tokio::test]
    async fn test_declined_payment_cancels_order() {
        let (orders, db, user, products) = fixture().await;
        let hub = products[2].id;
        orders.carts.add_to_cart(user, hub, 3).await.unwrap();

        let result = orders.create_order(user, checkout(DECLINED_METHOD, None)).await;
        assert!(matches!(result, Err(ShopError::PaymentFailed(_))));
        assert_eq!(db.stock(hub).await, Some(3));

        let page = orders.user_orders(user, &OrderQuery::default()).await;
        assert_eq!(page.total, 1);
        assert_eq!(page.orders[0].status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_orders_are_paged_newest_first() {
        let (orders, _, user, products) = fixture().await;
        for _ in 0..3 {
            orders.carts.add_to_cart(user, products[1].id, 1).await.unwrap();
            orders
                .create_order(user, checkout("pm_card_visa", None))
                .await
                .unwrap();
        }

        let query = OrderQuery {
            page: 2,
            limit: 2,
            status: None,
        };
        let page = orders.user_orders(user, &query).await;
        assert_eq!(page.total, 3);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.orders.len(), 1);

        let first = orders.user_orders(user, &OrderQuery::default()).await;
        assert!(first.orders[0].id > first.orders[2].id);
    }
}
