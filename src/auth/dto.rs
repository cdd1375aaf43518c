use serde::{Deserialize, Serialize};

use crate::auth::repo_types::ProfileMetadata;

/// Request body for user registration. Missing fields are reported as validation errors.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub full_name: Option<String>,
    #[serde(alias = "identifier")]
    pub mobile: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
    #[serde(flatten)]
    pub profile: ProfileMetadata,
}

/// Request body for login.
#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    #[serde(alias = "identifier")]
    pub mobile: Option<String>,
    pub password: Option<String>,
}

/// Response returned after login or register.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}
