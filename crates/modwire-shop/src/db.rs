//! # In-Memory Database
//!
//! A cloneable handle over shared [`Tables`] behind a `tokio` `RwLock`.
//! Writes that must land together go through [`Database::transaction`], which
//! works on a copy and only commits it when the closure succeeds.

use crate::error::ShopError;
use crate::model::{
    Coupon, Discount, NewProduct, Order, OrderId, Product, ProductId, Role, User, UserId,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const SCHEME: &str = "memory://";

#[derive(Debug, Clone)]
pub struct StoredUser {
    pub user: User,
    /// Argon2id PHC string.
    pub password_hash: String,
}

#[derive(Debug, Clone, Default)]
pub struct Tables {
    pub users: BTreeMap<UserId, StoredUser>,
    pub products: BTreeMap<ProductId, Product>,
    pub inventory: HashMap<ProductId, u32>,
    pub carts: HashMap<UserId, BTreeMap<ProductId, u32>>,
    pub orders: BTreeMap<OrderId, Order>,
    pub coupons: HashMap<String, Coupon>,
    next_id: u32,
}

impl Tables {
    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    pub fn next_order_id(&mut self) -> OrderId {
        OrderId(self.next_id())
    }

    /// Takes `quantity` units out of stock, failing without change if short.
    pub fn take_stock(&mut self, product: ProductId, quantity: u32) -> Result<(), ShopError> {
        let stock = self
            .inventory
            .get_mut(&product)
            .ok_or_else(|| ShopError::NotFound(product.to_string()))?;
        if *stock < quantity {
            return Err(ShopError::InsufficientInventory);
        }
        *stock -= quantity;
        Ok(())
    }

    pub fn restock(&mut self, product: ProductId, quantity: u32) {
        *self.inventory.entry(product).or_default() += quantity;
    }
}

#[derive(Debug, Clone)]
pub struct Database {
    url: String,
    tables: Arc<RwLock<Tables>>,
}

impl Database {
    /// Opens an empty database. Only `memory://` URLs are supported.
    pub fn connect(url: &str) -> Result<Self, ShopError> {
        if !url.starts_with(SCHEME) {
            return Err(ShopError::Config(format!(
                "unsupported database url {url}, expected {SCHEME}<name>"
            )));
        }
        info!(url, "Database opened");
        Ok(Self {
            url: url.to_string(),
            tables: Arc::new(RwLock::new(Tables::default())),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Runs `change` on a copy of the tables; the copy replaces the live
    /// tables only if `change` returns `Ok`.
    pub async fn transaction<R, F>(&self, change: F) -> Result<R, ShopError>
    where
        F: FnOnce(&mut Tables) -> Result<R, ShopError>,
    {
        let mut tables = self.tables.write().await;
        let mut draft = tables.clone();
        match change(&mut draft) {
            Ok(result) => {
                *tables = draft;
                debug!("Transaction committed");
                Ok(result)
            }
            Err(e) => {
                warn!(error = %e, "Transaction rolled back");
                Err(e)
            }
        }
    }

    pub async fn read<R>(&self, query: impl FnOnce(&Tables) -> R) -> R {
        query(&*self.tables.read().await)
    }

    pub async fn insert_user(
        &self,
        email: &str,
        first_name: &str,
        last_name: &str,
        password_hash: String,
        role: Role,
    ) -> Result<User, ShopError> {
        self.transaction(|tables| {
            if tables.users.values().any(|stored| stored.user.email == email) {
                return Err(ShopError::UserExists);
            }
            let user = User {
                id: UserId(tables.next_id()),
                email: email.to_string(),
                first_name: first_name.to_string(),
                last_name: last_name.to_string(),
                role,
            };
            tables.users.insert(
                user.id,
                StoredUser {
                    user: user.clone(),
                    password_hash,
                },
            );
            Ok(user)
        })
        .await
    }

    pub async fn user_by_email(&self, email: &str) -> Option<StoredUser> {
        self.read(|tables| {
            tables
                .users
                .values()
                .find(|stored| stored.user.email == email)
                .cloned()
        })
        .await
    }

    pub async fn user(&self, id: UserId) -> Option<User> {
        self.read(|tables| tables.users.get(&id).map(|stored| stored.user.clone()))
            .await
    }

    pub async fn set_role(&self, id: UserId, role: Role) -> Result<User, ShopError> {
        self.transaction(|tables| {
            let stored = tables
                .users
                .get_mut(&id)
                .ok_or_else(|| ShopError::NotFound(id.to_string()))?;
            stored.user.role = role;
            Ok(stored.user.clone())
        })
        .await
    }

    pub async fn insert_product(&self, new: NewProduct) -> Result<Product, ShopError> {
        if new.price < 0.0 {
            return Err(ShopError::BadRequest("price must not be negative".to_string()));
        }
        self.transaction(|tables| {
            let product = Product {
                id: ProductId(tables.next_id()),
                name: new.name,
                description: new.description,
                price: new.price,
                active: true,
            };
            tables.inventory.insert(product.id, new.stock);
            tables.products.insert(product.id, product.clone());
            Ok(product)
        })
        .await
    }

    pub async fn product(&self, id: ProductId) -> Option<Product> {
        self.read(|tables| tables.products.get(&id).cloned()).await
    }

    pub async fn active_products(&self) -> Vec<Product> {
        self.read(|tables| {
            tables
                .products
                .values()
                .filter(|product| product.active)
                .cloned()
                .collect()
        })
        .await
    }

    pub async fn stock(&self, id: ProductId) -> Option<u32> {
        self.read(|tables| tables.inventory.get(&id).copied()).await
    }

    pub async fn insert_coupon(&self, coupon: Coupon) {
        let mut tables = self.tables.write().await;
        tables.coupons.insert(coupon.code.clone(), coupon);
    }

    /// Demo catalog used by the binary and the integration tests.
    pub async fn seed(&self) -> Result<Vec<Product>, ShopError> {
        let mut products = Vec::new();
        for (name, description, price, stock) in [
            ("Mechanical Keyboard", "Tactile switches, full size", 120.0, 10),
            ("Wireless Mouse", "Ergonomic, rechargeable", 45.5, 25),
            ("USB-C Hub", "Seven ports", 30.0, 3),
        ] {
            products.push(
                self.insert_product(NewProduct {
                    name: name.to_string(),
                    description: description.to_string(),
                    price,
                    stock,
                })
                .await?,
            );
        }
        self.insert_coupon(Coupon {
            code: "WELCOME10".to_string(),
            discount: Discount::Percentage(10.0),
            minimum_amount: 50.0,
            usage_limit: Some(100),
            usage_count: 0,
        })
        .await;
        info!(products = products.len(), "Database seeded");
        Ok(products)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_unknown_scheme() {
        assert!(Database::connect("postgres://localhost/shop").is_err());
    }

    #[tokio::test]
    async fn test_failed_transaction_rolls_back() {
        let db = Database::connect("memory://test").unwrap();
        let products = db.seed().await.unwrap();
        let hub = products[2].id;

        let result = db
            .transaction(|tables| {
                tables.take_stock(hub, 2)?;
                tables.take_stock(hub, 2)
            })
            .await;
        assert!(matches!(result, Err(ShopError::InsufficientInventory)));
        assert_eq!(db.stock(hub).await, Some(3));

        db.transaction(|tables| tables.take_stock(hub, 2)).await.unwrap();
        assert_eq!(db.stock(hub).await, Some(1));
    }

    #[tokio::test]
    async fn test_duplicate_email() {
        let db = Database::connect("memory://test").unwrap();
        db.insert_user("a@b.c", "A", "B", "hash".into(), Role::Customer).await.unwrap();
        let err = db
            .insert_user("a@b.c", "A", "B", "hash".into(), Role::Customer)
            .await
            .unwrap_err();
        assert!(matches!(err, ShopError::UserExists));
    }
}
