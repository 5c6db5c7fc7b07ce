//! Product catalog and stock lookups.

use crate::app::{App, Request};
use crate::db::Database;
use crate::error::ShopError;
use crate::model::{Product, ProductId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductDetails {
    #[serde(flatten)]
    pub product: Product,
    pub stock: u32,
}

#[derive(Debug, Clone)]
pub struct ProductService {
    db: Database,
}

impl ProductService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn list(&self) -> Vec<Product> {
        self.db.active_products().await
    }

    /// An active product, or `NotFound`.
    pub async fn get(&self, id: ProductId) -> Result<Product, ShopError> {
        self.db
            .product(id)
            .await
            .filter(|product| product.active)
            .ok_or_else(|| ShopError::NotFound(format!("Product {id}")))
    }

    #[instrument(skip(self))]
    pub async fn check_stock(&self, id: ProductId) -> Result<u32, ShopError> {
        let stock = self.db.stock(id).await.unwrap_or_default();
        debug!(%id, stock, "Stock level");
        Ok(stock)
    }

    pub async fn details(&self, id: ProductId) -> Result<ProductDetails, ShopError> {
        let product = self.get(id).await?;
        let stock = self.check_stock(id).await?;
        Ok(ProductDetails { product, stock })
    }
}

pub fn routes(app: &App, products: Arc<ProductService>) {
    let service = Arc::clone(&products);
    app.get("/products", move |_req| list(Arc::clone(&service)));
    app.get("/products/:id", move |req| details(Arc::clone(&products), req));
}

async fn list(products: Arc<ProductService>) -> Result<Vec<Product>, ShopError> {
    Ok(products.list().await)
}

async fn details(products: Arc<ProductService>, req: Request) -> Result<ProductDetails, ShopError> {
    let id = ProductId(req.param("id")?);
    products.details(id).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_details_include_stock() {
        let db = Database::connect("memory://products").unwrap();
        let seeded = db.seed().await.unwrap();
        let products = ProductService::new(db);

        assert_eq!(products.list().await.len(), 3);
        let details = products.details(seeded[2].id).await.unwrap();
        assert_eq!(details.stock, 3);
        assert!(matches!(
            products.get(ProductId(99)).await,
            Err(ShopError::NotFound(_))
        ));
    }
}
