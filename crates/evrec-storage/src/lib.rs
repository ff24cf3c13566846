//! Historization sinks with replace-on-write table semantics.

use std::collections::HashMap;

use async_trait::async_trait;
use evrec_core::{OpenEvent, ReceiptEvent};
use sqlx::PgPool;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

pub const CRATE_NAME: &str = "evrec-storage";

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("invalid identifier `{0}`")]
    InvalidIdentifier(String),
}

/// Rows destined for one logical table.
#[derive(Debug, Clone, PartialEq)]
pub enum TableRows {
    Open(Vec<OpenEvent>),
    Receipt(Vec<ReceiptEvent>),
}

impl TableRows {
    pub fn len(&self) -> usize {
        match self {
            Self::Open(rows) => rows.len(),
            Self::Receipt(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Replace-semantics table writer keyed by destination table name.
///
/// Each call independently replaces the whole table. There is no
/// transactional coupling between calls: a failed write leaves previously
/// replaced tables as they are, and concurrent writers are the caller's
/// problem to serialize.
#[async_trait]
pub trait TableSink: Send + Sync {
    async fn replace_table(&self, table: &str, rows: &TableRows) -> Result<(), SinkError>;
}

/// Create the destination schema if it does not exist yet. Creating the
/// database itself is the operator's responsibility.
pub async fn ensure_schema(pool: &PgPool, schema: &str) -> Result<(), SinkError> {
    let schema = checked_identifier(schema)?;
    sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS \"{schema}\""))
        .execute(pool)
        .await?;
    Ok(())
}

// DDL cannot take bind parameters, so names are validated and interpolated.
fn checked_identifier(name: &str) -> Result<&str, SinkError> {
    let mut chars = name.chars();
    let head_ok = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    if head_ok && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(name)
    } else {
        Err(SinkError::InvalidIdentifier(name.to_string()))
    }
}

/// Postgres-backed sink writing into one schema.
#[derive(Debug, Clone)]
pub struct PgTableSink {
    pool: PgPool,
    schema: String,
}

impl PgTableSink {
    pub fn new(pool: PgPool, schema: impl Into<String>) -> Self {
        Self {
            pool,
            schema: schema.into(),
        }
    }

    fn qualified(&self, table: &str) -> Result<String, SinkError> {
        let schema = checked_identifier(&self.schema)?;
        let table = checked_identifier(table)?;
        Ok(format!("\"{schema}\".\"{table}\""))
    }

    async fn replace_open_table(
        &self,
        qualified: &str,
        rows: &[OpenEvent],
    ) -> Result<(), SinkError> {
        sqlx::query(&format!(
            r#"
            CREATE TABLE {qualified} (
                id BIGINT NOT NULL,
                date TIMESTAMPTZ,
                receipt_id BIGINT,
                user_agent TEXT,
                page_url TEXT,
                brand_id TEXT,
                email_domain TEXT
            )
            "#
        ))
        .execute(&self.pool)
        .await?;

        let insert = format!(
            "INSERT INTO {qualified} \
             (id, date, receipt_id, user_agent, page_url, brand_id, email_domain) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)"
        );
        for row in rows {
            sqlx::query(&insert)
                .bind(row.id)
                .bind(row.date)
                .bind(row.receipt_id)
                .bind(&row.user_agent)
                .bind(&row.page_url)
                .bind(&row.brand_id)
                .bind(&row.email_domain)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    async fn replace_receipt_table(
        &self,
        qualified: &str,
        rows: &[ReceiptEvent],
    ) -> Result<(), SinkError> {
        sqlx::query(&format!(
            r#"
            CREATE TABLE {qualified} (
                id BIGINT NOT NULL,
                date TIMESTAMPTZ,
                brand_id TEXT,
                trans_amt DOUBLE PRECISION,
                email_address TEXT,
                name_on_email TEXT,
                email_domain TEXT
            )
            "#
        ))
        .execute(&self.pool)
        .await?;

        let insert = format!(
            "INSERT INTO {qualified} \
             (id, date, brand_id, trans_amt, email_address, name_on_email, email_domain) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)"
        );
        for row in rows {
            sqlx::query(&insert)
                .bind(row.id)
                .bind(row.date)
                .bind(&row.brand_id)
                .bind(row.trans_amt)
                .bind(&row.email_address)
                .bind(&row.name_on_email)
                .bind(&row.email_domain)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl TableSink for PgTableSink {
    async fn replace_table(&self, table: &str, rows: &TableRows) -> Result<(), SinkError> {
        let qualified = self.qualified(table)?;
        info!(table, rows = rows.len(), "replacing table");

        sqlx::query(&format!("DROP TABLE IF EXISTS {qualified}"))
            .execute(&self.pool)
            .await?;
        match rows {
            TableRows::Open(rows) => self.replace_open_table(&qualified, rows).await,
            TableRows::Receipt(rows) => self.replace_receipt_table(&qualified, rows).await,
        }
    }
}

/// In-memory sink for tests and dry runs. Remembers the last rows written to
/// each table and how many times each table was replaced.
#[derive(Debug, Default)]
pub struct MemoryTableSink {
    tables: Mutex<HashMap<String, TableRows>>,
    write_counts: Mutex<HashMap<String, usize>>,
}

impl MemoryTableSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn table(&self, table: &str) -> Option<TableRows> {
        self.tables.lock().await.get(table).cloned()
    }

    pub async fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.lock().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn write_count(&self, table: &str) -> usize {
        self.write_counts
            .lock()
            .await
            .get(table)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl TableSink for MemoryTableSink {
    async fn replace_table(&self, table: &str, rows: &TableRows) -> Result<(), SinkError> {
        self.tables
            .lock()
            .await
            .insert(table.to_string(), rows.clone());
        *self
            .write_counts
            .lock()
            .await
            .entry(table.to_string())
            .or_default() += 1;
        Ok(())
    }
}
