use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use crate::config::{AppConfig, StoreBackend};
use crate::store::{CredentialStore, MemStore, PgStore};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CredentialStore>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let store: Arc<dyn CredentialStore> = match config.store {
            StoreBackend::Postgres => {
                let db = PgPoolOptions::new()
                    .max_connections(10)
                    .connect(&config.database_url)
                    .await
                    .context("connect to database")?;
                // The unique indexes created here are what make concurrent
                // registration safe; refusing to start without them beats
                // running with racy inserts.
                sqlx::migrate!("./migrations")
                    .run(&db)
                    .await
                    .context("run migrations")?;
                Arc::new(PgStore::new(db))
            }
            StoreBackend::Memory => {
                tracing::warn!("using in-memory credential store; records vanish on restart");
                Arc::new(MemStore::default())
            }
        };

        Ok(Self { store, config })
    }

    pub fn from_parts(store: Arc<dyn CredentialStore>, config: Arc<AppConfig>) -> Self {
        Self { store, config }
    }
}
