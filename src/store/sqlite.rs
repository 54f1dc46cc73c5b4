//! SQLite-backed store behind the `database` feature.
//!
//! Records are stored as JSON bodies with the columns needed for the
//! conditional writes and queries pulled out alongside. The version check on
//! workflows and the `resolved` flag on reviews are enforced in the UPDATE's
//! WHERE clause, so the write-once guarantees hold across processes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{migrate::MigrateDatabase, Row, SqlitePool};
use tracing::info;
use uuid::Uuid;

use super::{StateStore, StoreError};
use crate::review::types::{Resolution, ReviewRequest};
use crate::workflow::types::Workflow;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if necessary) and migrate the database.
    pub async fn new(database_url: &str, auto_migrate: bool) -> Result<Self, StoreError> {
        if !sqlx::Sqlite::database_exists(database_url)
            .await
            .map_err(backend)?
        {
            info!("Creating database at {}", database_url);
            sqlx::Sqlite::create_database(database_url)
                .await
                .map_err(backend)?;
        }

        let pool = SqlitePool::connect(database_url).await.map_err(backend)?;

        if auto_migrate {
            info!("Running database migrations...");
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            info!("Database migrations completed");
        }

        Ok(Self { pool })
    }

    pub async fn shutdown(&self) {
        info!("Shutting down database connections...");
        self.pool.close().await;
    }
}

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn encode<T: serde::Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Backend(e.to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(body: &str) -> Result<T, StoreError> {
    serde_json::from_str(body).map_err(|e| StoreError::Backend(e.to_string()))
}

#[async_trait]
impl StateStore for SqliteStore {
    async fn put_workflow(&self, workflow: &Workflow) -> Result<u64, StoreError> {
        let mut next = workflow.clone();
        next.version = workflow.version + 1;
        let body = encode(&next)?;

        if workflow.version == 0 {
            sqlx::query(
                r#"
                INSERT INTO workflows (id, owner_id, status, version, body)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )
            .bind(workflow.id.to_string())
            .bind(&workflow.owner_id)
            .bind(workflow.status.to_string())
            .bind(next.version as i64)
            .bind(&body)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
            return Ok(next.version);
        }

        let result = sqlx::query(
            r#"
            UPDATE workflows
            SET owner_id = ?2, status = ?3, version = ?4, body = ?5
            WHERE id = ?1 AND version = ?6
            "#,
        )
        .bind(workflow.id.to_string())
        .bind(&workflow.owner_id)
        .bind(workflow.status.to_string())
        .bind(next.version as i64)
        .bind(&body)
        .bind(workflow.version as i64)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            let found: Option<i64> = sqlx::query("SELECT version FROM workflows WHERE id = ?1")
                .bind(workflow.id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)?
                .map(|row| row.get("version"));
            return match found {
                Some(found) => Err(StoreError::VersionConflict {
                    id: workflow.id,
                    expected: workflow.version,
                    found: found as u64,
                }),
                None => Err(StoreError::WorkflowNotFound(workflow.id)),
            };
        }
        Ok(next.version)
    }

    async fn get_workflow(&self, id: Uuid) -> Result<Option<Workflow>, StoreError> {
        let row = sqlx::query("SELECT body FROM workflows WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        match row {
            Some(row) => {
                let body: String = row.get("body");
                Ok(Some(decode(&body)?))
            }
            None => Ok(None),
        }
    }

    async fn insert_review(&self, review: &ReviewRequest) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO reviews (id, workflow_id, reviewer_id, deadline_ts, resolved, body)
            VALUES (?1, ?2, ?3, ?4, 0, ?5)
            "#,
        )
        .bind(review.id.to_string())
        .bind(review.workflow_id.to_string())
        .bind(review.reviewer_id.as_deref())
        .bind(review.deadline.timestamp())
        .bind(encode(review)?)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn get_review(&self, id: Uuid) -> Result<Option<ReviewRequest>, StoreError> {
        let row = sqlx::query("SELECT body FROM reviews WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        match row {
            Some(row) => {
                let body: String = row.get("body");
                Ok(Some(decode(&body)?))
            }
            None => Ok(None),
        }
    }

    async fn resolve_review(
        &self,
        id: Uuid,
        resolution: Resolution,
    ) -> Result<ReviewRequest, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let row = sqlx::query("SELECT body, resolved FROM reviews WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(backend)?
            .ok_or(StoreError::ReviewNotFound(id))?;
        let resolved: i64 = row.get("resolved");
        if resolved != 0 {
            return Err(StoreError::AlreadyResolved(id));
        }

        let body: String = row.get("body");
        let mut review: ReviewRequest = decode(&body)?;
        review.resolution = Some(resolution);

        let result = sqlx::query(
            r#"
            UPDATE reviews SET resolved = 1, body = ?2
            WHERE id = ?1 AND resolved = 0
            "#,
        )
        .bind(id.to_string())
        .bind(encode(&review)?)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::AlreadyResolved(id));
        }

        tx.commit().await.map_err(backend)?;
        Ok(review)
    }

    async fn reviews_pending_before(
        &self,
        deadline: DateTime<Utc>,
    ) -> Result<Vec<ReviewRequest>, StoreError> {
        let rows = sqlx::query(
            "SELECT body FROM reviews WHERE resolved = 0 AND deadline_ts <= ?1",
        )
        .bind(deadline.timestamp())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.into_iter()
            .map(|row| {
                let body: String = row.get("body");
                decode(&body)
            })
            .collect()
    }

    async fn pending_reviews(
        &self,
        reviewer_id: Option<&str>,
    ) -> Result<Vec<ReviewRequest>, StoreError> {
        let rows = match reviewer_id {
            Some(reviewer) => {
                sqlx::query("SELECT body FROM reviews WHERE resolved = 0 AND reviewer_id = ?1")
                    .bind(reviewer)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(backend)?
            }
            None => sqlx::query("SELECT body FROM reviews WHERE resolved = 0")
                .fetch_all(&self.pool)
                .await
                .map_err(backend)?,
        };
        rows.into_iter()
            .map(|row| {
                let body: String = row.get("body");
                decode(&body)
            })
            .collect()
    }

    async fn workflows_by_owner(&self, owner_id: &str) -> Result<Vec<Workflow>, StoreError> {
        let rows = sqlx::query("SELECT body FROM workflows WHERE owner_id = ?1")
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.into_iter()
            .map(|row| {
                let body: String = row.get("body");
                decode(&body)
            })
            .collect()
    }
}
