use std::sync::Arc;

use anyhow::Context;
use tokio::task::spawn_blocking;
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{LoginRequest, RegisterRequest},
        jwt::JwtKeys,
        password::{hash_password, verify_stored_or_dummy},
        repo::{CredentialStore, NewUser},
        repo_types::Role,
    },
    config::IdentifierPolicy,
    error::AppError,
    realtime::bus::{EventBus, MarketEvent},
};

/// Registration and login. Stateless per request; everything shared is injected.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn CredentialStore>,
    keys: JwtKeys,
    events: EventBus,
    identifier: IdentifierPolicy,
}

/// Trimmed, non-blank value or a validation error naming the field.
fn required(value: Option<String>, field: &str) -> Result<String, AppError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(AppError::validation(format!("{field} is required"))),
    }
}

impl AuthService {
    pub fn new(
        users: Arc<dyn CredentialStore>,
        keys: JwtKeys,
        events: EventBus,
        identifier: IdentifierPolicy,
    ) -> Self {
        Self {
            users,
            keys,
            events,
            identifier,
        }
    }

    #[instrument(skip_all)]
    pub async fn register(&self, req: RegisterRequest) -> Result<String, AppError> {
        let full_name = required(req.full_name, "fullName")?;
        let mobile = required(req.mobile, "mobile")?;
        // Passwords are taken verbatim, never trimmed.
        let password = req
            .password
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| AppError::validation("password is required"))?;
        let role = Role::new(&required(req.role, "role")?);

        if !self.identifier.accepts(&mobile) {
            warn!(mobile = %mobile, "invalid mobile format");
            return Err(AppError::validation("Invalid mobile number format"));
        }

        if self.users.find_by_mobile(&mobile).await?.is_some() {
            warn!(mobile = %mobile, "mobile already registered");
            return Err(AppError::DuplicateIdentifier);
        }

        let password_hash = spawn_blocking(move || hash_password(&password))
            .await
            .context("password hash task")??;

        // A concurrent registration may have won since the lookup above.
        let user = self
            .users
            .insert_if_absent(NewUser {
                mobile,
                full_name,
                password_hash,
                role,
                profile: req.profile,
            })
            .await?
            .ok_or(AppError::DuplicateIdentifier)?;

        let token = self.keys.sign(&user.mobile, &user.role)?;

        info!(user_id = %user.id, mobile = %user.mobile, role = %user.role, "user registered");
        self.events.publish(MarketEvent::UserRegistered {
            full_name: user.full_name,
            role: user.role,
        });

        Ok(token)
    }

    #[instrument(skip_all)]
    pub async fn login(&self, req: LoginRequest) -> Result<String, AppError> {
        let mobile = required(req.mobile, "mobile")?;
        let password = req
            .password
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| AppError::validation("password is required"))?;

        let user = self.users.find_by_mobile(&mobile).await?;

        // Unknown mobiles still pay for one Argon2 verification.
        let stored = user.as_ref().map(|u| u.password_hash.clone());
        let matched = spawn_blocking(move || verify_stored_or_dummy(&password, stored.as_deref()))
            .await
            .context("password verify task")?;

        let Some(user) = user else {
            warn!(mobile = %mobile, "login unknown mobile");
            return Err(AppError::InvalidCredentials);
        };

        if !matched {
            warn!(mobile = %mobile, user_id = %user.id, "login invalid password");
            return Err(AppError::InvalidCredentials);
        }

        let token = self.keys.sign(&user.mobile, &user.role)?;
        info!(user_id = %user.id, mobile = %user.mobile, "user logged in");
        Ok(token)
    }
}
