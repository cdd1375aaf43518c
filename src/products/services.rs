use std::sync::Arc;

use tracing::{info, instrument};

use crate::{
    auth::claims::Claims,
    error::AppError,
    products::{
        dto::CreateProductRequest,
        repo::ProductStore,
        repo_types::{NewProduct, Product},
    },
    realtime::bus::{EventBus, MarketEvent},
};

/// Owner recorded on the seeded demo catalogue.
pub const DEMO_OWNER: &str = "system";

const DEMO_CATALOGUE: [(&str, f64); 3] = [
    ("Zambian Maize", 100.0),
    ("Cassava Flour", 85.0),
    ("Dry Fish", 200.0),
];

#[derive(Clone)]
pub struct ProductService {
    products: Arc<dyn ProductStore>,
    events: EventBus,
}

impl ProductService {
    pub fn new(products: Arc<dyn ProductStore>, events: EventBus) -> Self {
        Self { products, events }
    }

    #[instrument(skip_all)]
    pub async fn list(&self) -> Result<Vec<Product>, AppError> {
        Ok(self.products.list().await?)
    }

    /// Owner comes from the verified claims, never from the request body.
    #[instrument(skip_all, fields(owner = %owner.sub))]
    pub async fn create(&self, req: CreateProductRequest, owner: &Claims) -> Result<Product, AppError> {
        let name = req
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| AppError::validation("Name and price required"))?;
        let price = req
            .price
            .ok_or_else(|| AppError::validation("Name and price required"))?;
        if !price.is_finite() || price < 0.0 {
            return Err(AppError::validation("price must be a non-negative number"));
        }
        let description = req
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());

        let product = self
            .products
            .insert(NewProduct {
                name,
                price,
                description,
                user_id: owner.sub.clone(),
            })
            .await?;

        info!(product_id = %product.id, "product created");
        self.events.publish(MarketEvent::ProductCreated(product.clone()));
        Ok(product)
    }

    /// Inserts the demo catalogue when the store is empty. Returns how many were added.
    pub async fn seed_demo_catalogue(&self) -> anyhow::Result<usize> {
        if !self.products.list().await?.is_empty() {
            return Ok(0);
        }
        for (name, price) in DEMO_CATALOGUE {
            self.products
                .insert(NewProduct {
                    name: name.to_string(),
                    price,
                    description: None,
                    user_id: DEMO_OWNER.to_string(),
                })
                .await?;
        }
        info!(count = DEMO_CATALOGUE.len(), "seeded demo catalogue");
        Ok(DEMO_CATALOGUE.len())
    }
}
