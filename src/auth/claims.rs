use serde::{Deserialize, Serialize};

use crate::auth::repo_types::Role;

/// JWT payload carried by a session token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: String, // mobile number of the user
    pub role: Role,
    pub iat: usize, // issued at (unix timestamp)
    pub exp: usize, // expires at (unix timestamp)
    pub iss: String,
    pub aud: String,
}
