use fieldops_core::CoreError;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::info;

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Migrations completed successfully.");
        Ok(())
    }
}

/// Map a driver error into the workflow taxonomy. Unique violations mean a
/// concurrent writer got there first.
pub(crate) fn db_err(e: sqlx::Error) -> CoreError {
    if let sqlx::Error::Database(ref db) = e {
        if db.is_unique_violation() {
            return CoreError::Conflict(db.message().to_string());
        }
        if db.is_foreign_key_violation() {
            return CoreError::Validation(db.message().to_string());
        }
    }
    tracing::error!("Database error: {}", e);
    CoreError::Internal(e.to_string())
}

/// Stored text that no longer parses into a domain enum.
pub(crate) fn corrupt(column: &str, value: &str) -> CoreError {
    tracing::error!("Unexpected value '{}' in column {}", value, column);
    CoreError::Internal(format!("Unexpected value '{}' in column {}", value, column))
}
