use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Product record. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub price: f64,
    pub description: Option<String>,
    pub user_id: String, // mobile of the owner, taken from the verified token
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub price: f64,
    pub description: Option<String>,
    pub user_id: String,
}
