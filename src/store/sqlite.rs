//! SQLite repository.
//!
//! Each release is stored as one JSON document. The `name`, `version`,
//! `status`, `category` and timestamp columns duplicate document fields so
//! listings can filter and order in SQL. `search_text` holds the searchable
//! fields lowercased in Rust, since SQLite's `lower()` only folds ASCII.

use super::{Catalog, ReleaseQuery, ReleaseRepository};
use crate::db::{self, pool::DbPool};
use crate::error::AppError;
use crate::models::{Environment, Release, Team, Workflow};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite, Transaction};
use std::path::Path;

/// Release storage backed by a SQLite database file.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: DbPool,
}

/// Fixed-width UTC timestamps so text ordering matches time ordering.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for ch in term.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Name, version and description, lowercased and separated by a unit
/// separator so a term cannot match across two fields.
fn search_text(release: &Release) -> String {
    [&release.name, &release.version, &release.description]
        .map(|field| field.to_lowercase())
        .join("\u{1f}")
}

fn decode<T: DeserializeOwned>(document: &str, table: &str) -> Result<T, AppError> {
    serde_json::from_str(document).map_err(|e| {
        AppError::database_with_op(format!("Corrupt {} document: {}", table, e), "decode")
    })
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Open the database at `db_path`, applying migrations.
    pub async fn open(db_path: &Path) -> Result<Self, AppError> {
        Ok(Self::new(db::initialize(db_path).await?))
    }

    async fn list_documents<T: DeserializeOwned>(&self, table: &'static str) -> Result<Vec<T>, AppError> {
        let rows: Vec<(String,)> =
            sqlx::query_as(&format!("SELECT document FROM {} ORDER BY position, id", table))
                .fetch_all(&self.pool)
                .await?;
        rows.iter().map(|(doc,)| decode(doc, table)).collect()
    }
}

async fn replace_documents<T: Serialize>(
    tx: &mut Transaction<'_, Sqlite>,
    table: &'static str,
    records: &[T],
    id_of: impl Fn(&T) -> &str,
) -> Result<(), AppError> {
    sqlx::query(&format!("DELETE FROM {}", table))
        .execute(&mut **tx)
        .await?;

    let insert = format!(
        "INSERT INTO {} (id, position, document) VALUES (?, ?, ?)",
        table
    );
    for (position, record) in records.iter().enumerate() {
        sqlx::query(&insert)
            .bind(id_of(record))
            .bind(position as i64)
            .bind(serde_json::to_string(record)?)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

#[async_trait]
impl ReleaseRepository for SqliteStore {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    async fn list_releases(&self, query: &ReleaseQuery) -> Result<Vec<Release>, AppError> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT document FROM releases WHERE 1 = 1");

        if let Some(status) = query.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(category) = query.category {
            qb.push(" AND category = ").push_bind(category.as_str());
        }
        if let Some(term) = query.search_term() {
            let pattern = format!("%{}%", escape_like(&term));
            qb.push(" AND search_text LIKE ")
                .push_bind(pattern)
                .push(" ESCAPE '\\'");
        }

        // SQLite treats a negative LIMIT as unbounded.
        let limit = query.limit.map(|l| l as i64).unwrap_or(-1);
        qb.push(" ORDER BY created_at ASC, id ASC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(query.skip as i64);

        let rows = qb
            .build_query_as::<(String,)>()
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(|(doc,)| decode(doc, "releases")).collect()
    }

    async fn get_release(&self, id: &str) -> Result<Option<Release>, AppError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT document FROM releases WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|(doc,)| decode(&doc, "releases")).transpose()
    }

    async fn insert_release(&self, release: &Release) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO releases
                (id, name, version, status, category, created_at, updated_at, search_text, document)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&release.id)
        .bind(&release.name)
        .bind(&release.version)
        .bind(release.status.as_str())
        .bind(release.category.as_str())
        .bind(timestamp(release.created_at))
        .bind(timestamp(release.updated_at))
        .bind(search_text(release))
        .bind(serde_json::to_string(release)?)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::conflict(format!(
                "Release {} already exists",
                release.id
            )));
        }
        log::debug!("[store] Inserted release {}", release.id);
        Ok(())
    }

    async fn save_release(&self, release: &Release) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE releases
            SET name = ?, version = ?, status = ?, category = ?, updated_at = ?,
                search_text = ?, document = ?
            WHERE id = ?
            "#,
        )
        .bind(&release.name)
        .bind(&release.version)
        .bind(release.status.as_str())
        .bind(release.category.as_str())
        .bind(timestamp(release.updated_at))
        .bind(search_text(release))
        .bind(serde_json::to_string(release)?)
        .bind(&release.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found_with_id("Release", &release.id));
        }
        Ok(())
    }

    async fn delete_release(&self, id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM releases WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_environments(&self) -> Result<Vec<Environment>, AppError> {
        self.list_documents("environments").await
    }

    async fn list_teams(&self) -> Result<Vec<Team>, AppError> {
        self.list_documents("teams").await
    }

    async fn list_workflows(&self) -> Result<Vec<Workflow>, AppError> {
        self.list_documents("workflows").await
    }

    async fn replace_catalog(&self, catalog: Catalog) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        replace_documents(&mut tx, "environments", &catalog.environments, |e| e.id.as_str()).await?;
        replace_documents(&mut tx, "teams", &catalog.teams, |t| t.id.as_str()).await?;
        replace_documents(&mut tx, "workflows", &catalog.workflows, |w| w.id.as_str()).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
        log::debug!("[store] Closed SQLite pool");
    }
}
