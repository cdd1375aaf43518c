use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

use crate::{
    auth::{
        jwt::JwtKeys,
        repo::{CredentialStore, InMemoryCredentialStore, PgCredentialStore},
        services::AuthService,
    },
    config::AppConfig,
    products::{
        repo::{InMemoryProductStore, PgProductStore, ProductStore},
        services::ProductService,
    },
    realtime::bus::EventBus,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub keys: JwtKeys,
    pub events: EventBus,
    pub auth: AuthService,
    pub products: ProductService,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let state = match &config.database_url {
            Some(url) => {
                let db = PgPoolOptions::new()
                    .max_connections(10)
                    .connect(url)
                    .await
                    .context("connect to database")?;

                sqlx::migrate!("./migrations")
                    .run(&db)
                    .await
                    .context("run migrations")?;

                info!("using postgres stores");
                Self::from_parts(
                    config.clone(),
                    Arc::new(PgCredentialStore::new(db.clone())),
                    Arc::new(PgProductStore::new(db)),
                )
            }
            None => {
                warn!("DATABASE_URL not set; using in-memory stores, data is lost on restart");
                Self::in_memory(config.clone())
            }
        };

        if config.seed_demo_products {
            state.products.seed_demo_catalogue().await?;
        }

        Ok(state)
    }

    pub fn in_memory(config: Arc<AppConfig>) -> Self {
        Self::from_parts(
            config,
            Arc::new(InMemoryCredentialStore::new()),
            Arc::new(InMemoryProductStore::new()),
        )
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn CredentialStore>,
        products: Arc<dyn ProductStore>,
    ) -> Self {
        let keys = JwtKeys::from_config(&config.jwt);
        let events = EventBus::new(config.event_bus_capacity);
        let auth = AuthService::new(users, keys.clone(), events.clone(), config.identifier.clone());
        let products = ProductService::new(products, events.clone());
        Self {
            config,
            keys,
            events,
            auth,
            products,
        }
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        let config = AppConfig::from_lookup(|key| match key {
            "JWT_SECRET" => Some("test".into()),
            "JWT_ISSUER" => Some("test".into()),
            "JWT_AUDIENCE" => Some("test".into()),
            _ => None,
        })
        .expect("test config");
        Self::in_memory(Arc::new(config))
    }
}
