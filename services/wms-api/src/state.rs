//! Application state and shared resources.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use map_service::{MapService, ServiceConfig, StyleRegistry};
use se_parser::relational::{PgStyleDatabase, PostgresStyleReader};
use tracing::{info, warn};

/// Shared application state.
pub struct AppState {
    pub service: MapService,
    /// Styles stored in PostgreSQL, when a database is configured.
    pub styles_db: Option<PostgresStyleReader<PgStyleDatabase>>,
}

impl AppState {
    /// Load the layer configuration and connect to the style database.
    pub async fn new(config_path: &Path, database_url: Option<&str>, schema: &str) -> Result<Self> {
        let config = ServiceConfig::load(config_path)
            .with_context(|| format!("Failed to load layer configuration {}", config_path.display()))?;

        let registry = Arc::new(StyleRegistry::new());
        let service = MapService::new(&config, registry, HashMap::new());

        let styles_db = match database_url {
            Some(url) => {
                let db = PgStyleDatabase::connect(url, schema)
                    .await
                    .context("Failed to connect to the style database")?;
                info!(schema, "Connected to style database");
                Some(PostgresStyleReader::new(db, Some(config.styles_dir.clone())))
            }
            None => None,
        };

        let state = Self { service, styles_db };
        if let Some(interval) = config.reload_interval {
            // Runs for the lifetime of the process.
            state.service.registry().spawn_watcher(interval);
        } else {
            warn!("Style file polling is disabled");
        }
        Ok(state)
    }

    /// State around an already built service, without a database.
    pub fn from_service(service: MapService) -> Self {
        Self {
            service,
            styles_db: None,
        }
    }
}
