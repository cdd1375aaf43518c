use serde::Deserialize;

/// Request body for product creation. The owner is never read from here.
#[derive(Debug, Default, Deserialize)]
pub struct CreateProductRequest {
    pub name: Option<String>,
    pub price: Option<f64>,
    pub description: Option<String>,
}
