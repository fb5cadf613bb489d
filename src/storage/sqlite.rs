//! SQLite storage backend
//!
//! Each table keeps the record as a JSON body next to the columns that scans
//! filter on. Timestamps are stored as microseconds since the epoch so range
//! filters compare as integers. Connections come from a deadpool-sqlite pool
//! and every query runs inside `interact` on the blocking thread pool.

use crate::directory::ReviewerProfile;
use crate::error::{AgroError, Result};
use crate::field_test::FieldTest;
use crate::storage::{FieldTestQuery, RecordStore, ValidationQuery};
use crate::types::{FieldTestId, ValidationId};
use crate::validation::{ExpertReview, ValidationRequest};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_sqlite::{Config, Pool, PoolConfig, Runtime};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Default connection pool size
const DEFAULT_POOL_SIZE: usize = 8;

const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS reviewers (
    id TEXT PRIMARY KEY,
    active INTEGER NOT NULL,
    onboarded_at INTEGER NOT NULL,
    body TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_reviewers_active ON reviewers(active);

CREATE TABLE IF NOT EXISTS validations (
    id TEXT PRIMARY KEY,
    status TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    deadline INTEGER NOT NULL,
    completed_at INTEGER,
    body TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_validations_status ON validations(status);
CREATE INDEX IF NOT EXISTS idx_validations_deadline ON validations(deadline);
CREATE INDEX IF NOT EXISTS idx_validations_completed_at ON validations(completed_at);

CREATE TABLE IF NOT EXISTS reviews (
    id TEXT PRIMARY KEY,
    validation_id TEXT NOT NULL,
    submitted_at INTEGER NOT NULL,
    body TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_reviews_validation_id ON reviews(validation_id);
CREATE INDEX IF NOT EXISTS idx_reviews_submitted_at ON reviews(submitted_at);

CREATE TABLE IF NOT EXISTS field_tests (
    id TEXT PRIMARY KEY,
    farm_id TEXT NOT NULL,
    status TEXT NOT NULL,
    implemented_at INTEGER NOT NULL,
    completed_at INTEGER,
    body TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_field_tests_status ON field_tests(status);
CREATE INDEX IF NOT EXISTS idx_field_tests_farm_id ON field_tests(farm_id);
CREATE INDEX IF NOT EXISTS idx_field_tests_completed_at ON field_tests(completed_at);
";

fn micros(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

fn decode_all<T: DeserializeOwned>(bodies: Vec<String>) -> Result<Vec<T>> {
    bodies
        .iter()
        .map(|body| serde_json::from_str(body).map_err(AgroError::from))
        .collect()
}

fn query_bodies(conn: &Connection, sql: &str, values: Vec<Value>) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params_from_iter(values), |row| row.get::<_, String>(0))?;
    let mut bodies = Vec::new();
    for row in rows {
        bodies.push(row?);
    }
    Ok(bodies)
}

/// Persistent record store on a single SQLite file
pub struct SqliteStore {
    pool: Pool,
}

impl SqliteStore {
    /// Open (or create) the database at `db_path` and apply the schema
    pub async fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        Self::with_pool_size(db_path, DEFAULT_POOL_SIZE).await
    }

    /// Open with a custom pool size
    pub async fn with_pool_size<P: AsRef<Path>>(db_path: P, pool_size: usize) -> Result<Self> {
        let path = db_path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        info!(
            "Opening record store at: {} (pool_size: {})",
            path.display(),
            pool_size
        );

        let mut config = Config::new(path);
        config.pool = Some(PoolConfig::new(pool_size.max(1)));
        let pool = config.create_pool(Runtime::Tokio1).map_err(|e| {
            AgroError::Database(format!("Failed to create connection pool: {}", e))
        })?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create tables and indexes; safe to call repeatedly
    async fn init_schema(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                row.get::<_, String>(0)
            })?;
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;
        debug!("Record store schema ready");
        Ok(())
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.pool.get().await.map_err(|e| {
            AgroError::Database(format!("Failed to get connection from pool: {}", e))
        })?;

        conn.interact(move |conn| {
            conn.busy_timeout(BUSY_TIMEOUT)?;
            f(conn)
        })
        .await
        .map_err(|e| AgroError::Database(format!("Pool interaction failed: {}", e)))?
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn put_reviewer(&self, profile: &ReviewerProfile) -> Result<()> {
        let id = profile.id.to_string();
        let active = profile.active;
        let onboarded_at = micros(profile.onboarded_at);
        let body = serde_json::to_string(profile)?;

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO reviewers (id, active, onboarded_at, body)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id, active, onboarded_at, body],
            )?;
            Ok(())
        })
        .await
    }

    async fn list_reviewers(&self) -> Result<Vec<ReviewerProfile>> {
        let bodies = self
            .with_conn(|conn| {
                query_bodies(
                    conn,
                    "SELECT body FROM reviewers ORDER BY onboarded_at, id",
                    Vec::new(),
                )
            })
            .await?;
        decode_all(bodies)
    }

    async fn put_validation(&self, request: &ValidationRequest) -> Result<()> {
        let id = request.id.to_string();
        let status = request.status.as_str();
        let created_at = micros(request.created_at);
        let deadline = micros(request.deadline);
        let completed_at = request.completed_at.map(micros);
        let body = serde_json::to_string(request)?;

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO validations
                    (id, status, created_at, deadline, completed_at, body)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id, status, created_at, deadline, completed_at, body],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_validation(&self, id: ValidationId) -> Result<Option<ValidationRequest>> {
        let key = id.to_string();
        let body = self
            .with_conn(move |conn| {
                let body = conn
                    .query_row(
                        "SELECT body FROM validations WHERE id = ?1",
                        params![key],
                        |row| row.get::<_, String>(0),
                    )
                    .optional()?;
                Ok(body)
            })
            .await?;

        body.map(|b| serde_json::from_str(&b).map_err(AgroError::from))
            .transpose()
    }

    async fn list_validations(&self, query: &ValidationQuery) -> Result<Vec<ValidationRequest>> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(status) = query.status {
            clauses.push("status = ?");
            values.push(Value::Text(status.as_str().to_string()));
        }
        if let Some(since) = query.created_since {
            clauses.push("created_at >= ?");
            values.push(Value::Integer(micros(since)));
        }
        if let Some(since) = query.completed_since {
            clauses.push("completed_at IS NOT NULL AND completed_at >= ?");
            values.push(Value::Integer(micros(since)));
        }
        if let Some(before) = query.deadline_before {
            clauses.push("deadline < ?");
            values.push(Value::Integer(micros(before)));
        }

        let mut sql = String::from("SELECT body FROM validations");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY created_at, id");

        let bodies = self
            .with_conn(move |conn| query_bodies(conn, &sql, values))
            .await?;
        decode_all(bodies)
    }

    async fn insert_review(&self, review: &ExpertReview) -> Result<()> {
        let id = review.id.to_string();
        let validation_id = review.validation_id.to_string();
        let submitted_at = micros(review.submitted_at);
        let body = serde_json::to_string(review)?;

        let inserted = self
            .with_conn(move |conn| {
                let changed = conn.execute(
                    "INSERT OR IGNORE INTO reviews (id, validation_id, submitted_at, body)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![id, validation_id, submitted_at, body],
                )?;
                Ok(changed)
            })
            .await?;

        if inserted == 0 {
            return Err(AgroError::AlreadyExists(format!("review {}", review.id)));
        }
        Ok(())
    }

    async fn list_reviews(&self, validation_id: ValidationId) -> Result<Vec<ExpertReview>> {
        let key = validation_id.to_string();
        let bodies = self
            .with_conn(move |conn| {
                query_bodies(
                    conn,
                    "SELECT body FROM reviews WHERE validation_id = ?
                     ORDER BY submitted_at, rowid",
                    vec![Value::Text(key)],
                )
            })
            .await?;
        decode_all(bodies)
    }

    async fn list_reviews_since(&self, since: DateTime<Utc>) -> Result<Vec<ExpertReview>> {
        let since = micros(since);
        let bodies = self
            .with_conn(move |conn| {
                query_bodies(
                    conn,
                    "SELECT body FROM reviews WHERE submitted_at >= ?
                     ORDER BY submitted_at, rowid",
                    vec![Value::Integer(since)],
                )
            })
            .await?;
        decode_all(bodies)
    }

    async fn put_field_test(&self, test: &FieldTest) -> Result<()> {
        let id = test.id.to_string();
        let farm_id = test.farm_id.clone();
        let status = test.status.as_str();
        let implemented_at = micros(test.implemented_at);
        let completed_at = test.completed_at.map(micros);
        let body = serde_json::to_string(test)?;

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO field_tests
                    (id, farm_id, status, implemented_at, completed_at, body)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id, farm_id, status, implemented_at, completed_at, body],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_field_test(&self, id: FieldTestId) -> Result<Option<FieldTest>> {
        let key = id.to_string();
        let body = self
            .with_conn(move |conn| {
                let body = conn
                    .query_row(
                        "SELECT body FROM field_tests WHERE id = ?1",
                        params![key],
                        |row| row.get::<_, String>(0),
                    )
                    .optional()?;
                Ok(body)
            })
            .await?;

        body.map(|b| serde_json::from_str(&b).map_err(AgroError::from))
            .transpose()
    }

    async fn list_field_tests(&self, query: &FieldTestQuery) -> Result<Vec<FieldTest>> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(status) = query.status {
            clauses.push("status = ?");
            values.push(Value::Text(status.as_str().to_string()));
        }
        if let Some(farm_id) = &query.farm_id {
            clauses.push("farm_id = ?");
            values.push(Value::Text(farm_id.clone()));
        }
        if let Some(since) = query.completed_since {
            clauses.push("completed_at IS NOT NULL AND completed_at >= ?");
            values.push(Value::Integer(micros(since)));
        }

        let mut sql = String::from("SELECT body FROM field_tests");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY implemented_at, id");

        let bodies = self
            .with_conn(move |conn| query_bodies(conn, &sql, values))
            .await?;
        decode_all(bodies)
    }
}
