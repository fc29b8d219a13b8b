//! Server configuration loaded from AIRA_* environment variables

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ServiceError, ServiceResult};

/// Runtime configuration for the Aira server.
///
/// Every field has a default so a bare `aira serve` works out of the box
/// with a SQLite database under the data directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP API binds to
    pub address: String,
    /// Database connection URL (Postgres in production, SQLite for local use)
    pub database_url: String,
    /// Directory for locally persisted state
    pub data_dir: PathBuf,
}

impl ServerConfig {
    pub fn from_env() -> ServiceResult<Self> {
        let data_dir = PathBuf::from(
            std::env::var("AIRA_DATA_DIR").unwrap_or_else(|_| "./data".to_string()),
        );

        std::fs::create_dir_all(&data_dir).map_err(|e| ServiceError::Configuration {
            message: format!("failed to create data dir {}: {}", data_dir.display(), e),
        })?;

        let database_url = match std::env::var("AIRA_DATABASE_URL") {
            Ok(url) if !url.is_empty() => url,
            _ => format!("sqlite://{}/aira.db?mode=rwc", data_dir.display()),
        };

        let address =
            std::env::var("AIRA_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        Ok(Self {
            address,
            database_url,
            data_dir,
        })
    }
}
