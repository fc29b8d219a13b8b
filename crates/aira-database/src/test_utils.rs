//! Test utilities for database integration tests
//!
//! Tests run against in-memory SQLite with the full migration set applied,
//! which keeps them hermetic and fast enough to run per-test.

use crate::DbConnection;
use aira_migrations::Migrator;
use sea_orm::{
    ConnectOptions, Database, DatabaseBackend, ExecResult, QueryResult, Statement,
};
use sea_orm_migration::MigratorTrait;
use std::sync::Arc;

/// In-memory test database with migrations applied
pub struct TestDatabase {
    pub db: Arc<DbConnection>,
}

impl TestDatabase {
    /// Create a fresh in-memory database and apply all migrations.
    ///
    /// The pool is pinned to a single connection: each pooled connection to
    /// `sqlite::memory:` would otherwise get its own empty database.
    pub async fn new() -> anyhow::Result<Self> {
        let mut opt = ConnectOptions::new("sqlite::memory:");
        opt.max_connections(1)
            .min_connections(1)
            .sqlx_logging(false);

        let db = Database::connect(opt).await?;

        Migrator::up(&db, None)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Execute raw SQL for test setup
    pub async fn execute_sql(&self, sql: &str) -> anyhow::Result<ExecResult> {
        let statement = Statement::from_string(DatabaseBackend::Sqlite, sql.to_owned());
        let result = self
            .db
            .execute(statement)
            .await
            .map_err(anyhow::Error::from)?;
        Ok(result)
    }

    /// Query raw SQL and return results
    pub async fn query_sql(&self, sql: &str) -> anyhow::Result<Vec<QueryResult>> {
        let statement = Statement::from_string(DatabaseBackend::Sqlite, sql.to_owned());
        let result = self
            .db
            .query_all(statement)
            .await
            .map_err(anyhow::Error::from)?;
        Ok(result)
    }

    /// Get the database connection
    pub fn connection(&self) -> &DbConnection {
        &self.db
    }

    /// Get the database connection as Arc
    pub fn connection_arc(&self) -> Arc<DbConnection> {
        Arc::clone(&self.db)
    }
}

/// Helper to wait for a condition with timeout
///
/// Used to observe the effects of detached background tasks in tests.
pub async fn wait_for<F, Fut>(
    condition: F,
    timeout_secs: u64,
    check_interval_ms: u64,
) -> anyhow::Result<()>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = std::time::Instant::now();
    let timeout = std::time::Duration::from_secs(timeout_secs);
    let interval = std::time::Duration::from_millis(check_interval_ms);

    while start.elapsed() < timeout {
        if condition().await {
            return Ok(());
        }
        tokio::time::sleep(interval).await;
    }

    Err(anyhow::anyhow!("Timeout waiting for condition"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{ActiveModelTrait, ActiveValue::Set, EntityTrait};

    #[tokio::test]
    async fn test_database_setup() -> anyhow::Result<()> {
        let test_db = TestDatabase::new().await?;

        let result = test_db.query_sql("SELECT 1 as test_value").await?;
        assert_eq!(result.len(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_migrations_create_webhook_tables() -> anyhow::Result<()> {
        let test_db = TestDatabase::new().await?;

        let tables = test_db
            .query_sql("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .await?;
        let names: Vec<String> = tables
            .iter()
            .filter_map(|row| row.try_get::<String>("", "name").ok())
            .collect();

        for expected in [
            "organizations",
            "users",
            "api_keys",
            "webhook_endpoints",
            "webhook_events",
            "webhook_delivery_attempts",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing {expected}");
        }

        Ok(())
    }

    #[tokio::test]
    async fn test_entity_round_trip() -> anyhow::Result<()> {
        let test_db = TestDatabase::new().await?;

        let org = aira_entities::organizations::ActiveModel {
            name: Set("Acme".to_string()),
            slug: Set("acme".to_string()),
            ..Default::default()
        }
        .insert(test_db.connection())
        .await?;

        let found = aira_entities::organizations::Entity::find_by_id(org.id)
            .one(test_db.connection())
            .await?;
        assert_eq!(found.map(|o| o.slug), Some("acme".to_string()));

        Ok(())
    }

    #[tokio::test]
    async fn test_wait_for_times_out() {
        let result = wait_for(|| async { false }, 0, 10).await;
        assert!(result.is_err());
    }
}
