use anyhow::{bail, Context};
use regex::Regex;
use serde::Deserialize;

pub const DEFAULT_MOBILE_PATTERN: &str = r"^\+?[0-9]{9,15}$";

/// Longest accepted session lifetime: one year.
pub const MAX_TTL_MINUTES: i64 = 60 * 24 * 365;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

/// Identifier format check. One toggle for every deployment.
#[derive(Debug, Clone)]
pub struct IdentifierPolicy {
    pub enforce: bool,
    pub pattern: Regex,
}

impl IdentifierPolicy {
    pub fn new(enforce: bool, pattern: &str) -> anyhow::Result<Self> {
        let pattern = Regex::new(pattern).with_context(|| format!("invalid MOBILE_PATTERN {pattern:?}"))?;
        Ok(Self { enforce, pattern })
    }

    pub fn accepts(&self, mobile: &str) -> bool {
        !self.enforce || self.pattern.is_match(mobile)
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    pub identifier: IdentifierPolicy,
    pub event_bus_capacity: usize,
    pub seed_demo_products: bool,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(var: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret = var("JWT_SECRET").context("JWT_SECRET must be set")?;
        if secret.trim().is_empty() {
            bail!("JWT_SECRET must not be empty");
        }

        let jwt = JwtConfig {
            secret,
            issuer: var("JWT_ISSUER").unwrap_or_else(|| "marketplace".into()),
            audience: var("JWT_AUDIENCE").unwrap_or_else(|| "marketplace-clients".into()),
            ttl_minutes: parsed(&var, "JWT_TTL_MINUTES")?.unwrap_or(60 * 24),
        };
        if jwt.ttl_minutes <= 0 {
            bail!("JWT_TTL_MINUTES must be positive");
        }
        if jwt.ttl_minutes > MAX_TTL_MINUTES {
            bail!("JWT_TTL_MINUTES must be at most {MAX_TTL_MINUTES}");
        }

        let identifier = IdentifierPolicy::new(
            flag(&var, "MOBILE_VALIDATION")?.unwrap_or(true),
            &var("MOBILE_PATTERN").unwrap_or_else(|| DEFAULT_MOBILE_PATTERN.into()),
        )?;

        Ok(Self {
            host: var("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parsed(&var, "APP_PORT")?.unwrap_or(5000),
            database_url: var("DATABASE_URL").filter(|v| !v.trim().is_empty()),
            jwt,
            identifier,
            event_bus_capacity: parsed::<_, usize>(&var, "EVENT_BUS_CAPACITY")?.unwrap_or(256).max(1),
            seed_demo_products: flag(&var, "SEED_DEMO_PRODUCTS")?.unwrap_or(false),
        })
    }
}

fn parsed<F, T>(var: &F, key: &str) -> anyhow::Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    var(key)
        .map(|v| v.trim().parse::<T>().with_context(|| format!("invalid {key}")))
        .transpose()
}

fn flag<F>(var: &F, key: &str) -> anyhow::Result<Option<bool>>
where
    F: Fn(&str) -> Option<String>,
{
    match var(key).as_deref().map(str::trim) {
        None => Ok(None),
        Some("1" | "true" | "yes" | "on") => Ok(Some(true)),
        Some("0" | "false" | "no" | "off") => Ok(Some(false)),
        Some(other) => bail!("invalid {key}: {other:?}"),
    }
}
