use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::RagError;


pub mod models;
pub mod queries;

pub use models::{NewWorksheet, Worksheet};
pub use queries::WorksheetQueries;

pub type DbPool = Pool<Sqlite>;

/// History of generated worksheets, stored in SQLite
#[derive(Debug, Clone)]
pub struct WorksheetHistory {
    pool: DbPool,
}

impl WorksheetHistory {
    #[inline]
    pub async fn open<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let database_path = database_path.as_ref();
        if let Some(parent) = database_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create history directory: {}", parent.display())
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .context("Failed to create history connection pool")?;

        let history = Self { pool };
        history.run_migrations().await?;

        debug!("Worksheet history opened at {}", database_path.display());
        Ok(history)
    }

    #[inline]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    #[inline]
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running history database migrations");

        sqlx::migrate!("src/database/sqlite/migrations")
            .run(&self.pool)
            .await
            .context("Failed to run schema migration")?;

        debug!("History migrations completed successfully");
        Ok(())
    }

    /// Save a generated worksheet. On failure the error message carries the
    /// worksheet content so the generated text is never lost.
    #[inline]
    pub async fn record(&self, worksheet: &NewWorksheet) -> crate::Result<Worksheet> {
        let missing = worksheet.missing_fields();
        if !missing.is_empty() {
            return Err(RagError::History(format!(
                "Missing required fields: {}. Generated content:\n{}",
                missing.join(", "),
                worksheet.content
            )));
        }

        WorksheetQueries::create(&self.pool, worksheet)
            .await
            .map_err(|e| {
                warn!("Failed to save worksheet '{}': {:#}", worksheet.topic, e);
                RagError::History(format!(
                    "Failed to save worksheet: {:#}. Generated content:\n{}",
                    e, worksheet.content
                ))
            })
    }

    #[inline]
    pub async fn list_recent(&self, limit: u32) -> Result<Vec<Worksheet>> {
        WorksheetQueries::list_recent(&self.pool, limit).await
    }

    /// Number of worksheets ever saved
    #[inline]
    pub async fn count(&self) -> Result<i64> {
        WorksheetQueries::count(&self.pool).await
    }

    #[inline]
    pub async fn close(&self) {
        self.pool.close().await;
        debug!("Worksheet history closed");
    }
}
