use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Free-form role tag ("farmer", "buyer", ...). Carried in tokens, not enforced.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct Role(pub String);

impl Role {
    pub fn new(tag: &str) -> Self {
        Self(tag.trim().to_lowercase())
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Optional profile fields captured at registration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ProfileMetadata {
    pub email: Option<String>,
    pub province: Option<String>,
    pub district: Option<String>,
    pub referral_code: Option<String>,
    pub profile_image: Option<String>,
}

/// User record in the credential store.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub mobile: String, // unique lookup key
    pub full_name: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // Argon2 PHC string, never exposed in JSON
    pub role: Role,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub profile: ProfileMetadata,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}
