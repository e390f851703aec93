
use super::models::{NewWorksheet, Worksheet};
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

pub struct WorksheetQueries;

impl WorksheetQueries {
    /// Insert and return the stored row, id and timestamp included
    #[inline]
    pub async fn create(pool: &SqlitePool, new_worksheet: &NewWorksheet) -> Result<Worksheet> {
        let stored = sqlx::query_as::<_, Worksheet>(
            r#"
            INSERT INTO worksheets (topic, subject, student_profile, content, created_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id, topic, subject, student_profile, content, created_at
            "#,
        )
        .bind(&new_worksheet.topic)
        .bind(&new_worksheet.subject)
        .bind(&new_worksheet.student_profile)
        .bind(&new_worksheet.content)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
        .context("Failed to insert worksheet")?;

        debug!("Inserted worksheet {} on {:?}", stored.id, stored.topic);
        Ok(stored)
    }

    /// Most recent first
    #[inline]
    pub async fn list_recent(pool: &SqlitePool, limit: u32) -> Result<Vec<Worksheet>> {
        let results = sqlx::query_as::<_, Worksheet>(
            r#"
            SELECT id, topic, subject, student_profile, content, created_at
            FROM worksheets
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(pool)
        .await
        .context("Failed to list worksheets")?;

        Ok(results)
    }

    #[inline]
    pub async fn count(pool: &SqlitePool) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM worksheets")
            .fetch_one(pool)
            .await
            .context("Failed to count worksheets")?;

        Ok(count)
    }
}
