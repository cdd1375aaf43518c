use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::extractors::AuthUser,
    error::AppError,
    products::{dto::CreateProductRequest, repo_types::Product},
    state::AppState,
};

pub fn product_routes() -> Router<AppState> {
    Router::new().route("/products", get(list_products).post(create_product))
}

#[instrument(skip_all, fields(caller = %claims.sub))]
pub async fn list_products(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<Json<Vec<Product>>, AppError> {
    Ok(Json(state.products.list().await?))
}

#[instrument(skip_all, fields(caller = %claims.sub))]
pub async fn create_product(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    payload: Result<Json<CreateProductRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Product>), AppError> {
    let Json(payload) = payload?;
    let product = state.products.create(payload, &claims).await?;
    Ok((StatusCode::CREATED, Json(product)))
}
