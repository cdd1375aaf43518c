use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::products::repo_types::{NewProduct, Product};

#[async_trait]
pub trait ProductStore: Send + Sync {
    /// All products in insertion order.
    async fn list(&self) -> anyhow::Result<Vec<Product>>;
    async fn insert(&self, product: NewProduct) -> anyhow::Result<Product>;
}

#[derive(Default)]
pub struct InMemoryProductStore {
    products: RwLock<Vec<Product>>,
}

impl InMemoryProductStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProductStore for InMemoryProductStore {
    async fn list(&self) -> anyhow::Result<Vec<Product>> {
        Ok(self.products.read().await.clone())
    }

    async fn insert(&self, product: NewProduct) -> anyhow::Result<Product> {
        let record = Product {
            id: Uuid::new_v4(),
            name: product.name,
            price: product.price,
            description: product.description,
            user_id: product.user_id,
            created_at: OffsetDateTime::now_utc(),
        };
        self.products.write().await.push(record.clone());
        Ok(record)
    }
}

pub struct PgProductStore {
    db: PgPool,
}

impl PgProductStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ProductStore for PgProductStore {
    async fn list(&self) -> anyhow::Result<Vec<Product>> {
        let rows = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, name, price, description, user_id, created_at
            FROM products
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .fetch_all(&self.db)
        .await
        .context("list products")?;
        Ok(rows)
    }

    async fn insert(&self, product: NewProduct) -> anyhow::Result<Product> {
        let row = sqlx::query_as::<_, Product>(
            r#"
            INSERT INTO products (id, name, price, description, user_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, name, price, description, user_id, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&product.name)
        .bind(product.price)
        .bind(&product.description)
        .bind(&product.user_id)
        .fetch_one(&self.db)
        .await
        .context("insert product")?;
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_store_keeps_insertion_order() {
        let store = InMemoryProductStore::new();
        for name in ["Zambian Maize", "Cassava Flour", "Dry Fish"] {
            store
                .insert(NewProduct {
                    name: name.into(),
                    price: 1.0,
                    description: None,
                    user_id: "+260961234567".into(),
                })
                .await
                .unwrap();
        }
        let names: Vec<String> = store.list().await.unwrap().into_iter().map(|p| p.name).collect();
        assert_eq!(names, ["Zambian Maize", "Cassava Flour", "Dry Fish"]);
    }
}
