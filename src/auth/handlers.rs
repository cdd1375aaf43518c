use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::dto::{LoginRequest, RegisterRequest, TokenResponse},
    error::AppError,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
}

#[instrument(skip_all)]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TokenResponse>), AppError> {
    let Json(payload) = payload?;
    let token = state.auth.register(payload).await?;
    Ok((StatusCode::CREATED, Json(TokenResponse { token })))
}

#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, AppError> {
    let Json(payload) = payload?;
    let token = state.auth.login(payload).await?;
    Ok(Json(TokenResponse { token }))
}
