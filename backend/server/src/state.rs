use std::sync::Arc;

use anyhow::Result;

use super::{
    config::Config,
    database::{SqlOrderStore, init_database},
    store::OrderStore,
};

pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn OrderStore>,
}

impl AppState {
    pub async fn new() -> Result<Arc<Self>> {
        let config = Config::load()?;

        let pool = init_database(&config.database_url, config.database_max_connections).await?;

        Ok(Self::with_store(config, Arc::new(SqlOrderStore::new(pool))))
    }

    pub fn with_store(config: Config, store: Arc<dyn OrderStore>) -> Arc<Self> {
        Arc::new(Self { config, store })
    }
}
