//! Database migrations for the Aira application

pub use sea_orm_migration::prelude::*;

mod migration;

pub use migration::Migrator;

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm_migration::MigratorTrait;

    #[tokio::test]
    async fn test_migrations_apply_cleanly() {
        let db = sea_orm::Database::connect("sqlite::memory:")
            .await
            .expect("connect to in-memory sqlite");

        Migrator::up(&db, None).await.expect("apply migrations");

        // Applying again must be a no-op
        Migrator::up(&db, None).await.expect("re-apply migrations");
    }

    #[tokio::test]
    async fn test_migrations_roll_back() {
        let db = sea_orm::Database::connect("sqlite::memory:")
            .await
            .expect("connect to in-memory sqlite");

        Migrator::up(&db, None).await.expect("apply migrations");
        Migrator::down(&db, None).await.expect("revert migrations");
    }
}
