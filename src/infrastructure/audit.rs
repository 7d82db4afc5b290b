//! Sqlite-backed audit sink.
//!
//! Append-only invocation log. Write failures are returned to the caller
//! for logging but must never fail the primary operation.

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::domain::errors::DomainResult;
use crate::domain::ports::audit::{AuditRecord, AuditSink};

/// Audit sink writing to a sqlite database.
pub struct SqliteAuditSink {
    pool: SqlitePool,
}

impl SqliteAuditSink {
    /// Open (creating if needed) the audit database.
    pub async fn open(url: &str) -> DomainResult<Self> {
        let url = if url.starts_with("sqlite:") {
            url.to_string()
        } else {
            format!("sqlite://{url}?mode=rwc")
        };
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS audit_log (
                id TEXT PRIMARY KEY,
                at TEXT NOT NULL,
                tenant TEXT NOT NULL,
                actor TEXT NOT NULL,
                service TEXT NOT NULL,
                tool TEXT NOT NULL,
                request TEXT NOT NULL,
                response TEXT,
                error TEXT,
                provider TEXT,
                resource_ref TEXT,
                ip TEXT,
                user_agent TEXT
            )",
        )
        .execute(&pool)
        .await?;
        Ok(Self { pool })
    }

    /// Number of records written. Diagnostics only.
    pub async fn count(&self) -> DomainResult<u64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM audit_log")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0 as u64)
    }
}

#[async_trait]
impl AuditSink for SqliteAuditSink {
    async fn record(&self, record: AuditRecord) -> DomainResult<()> {
        sqlx::query(
            "INSERT INTO audit_log
             (id, at, tenant, actor, service, tool, request, response, error,
              provider, resource_ref, ip, user_agent)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        )
        .bind(record.id.to_string())
        .bind(record.at.to_rfc3339())
        .bind(&record.tenant)
        .bind(&record.actor)
        .bind(&record.service)
        .bind(&record.tool)
        .bind(record.request.to_string())
        .bind(record.response.as_ref().map(ToString::to_string))
        .bind(&record.error)
        .bind(&record.provider)
        .bind(&record.resource_ref)
        .bind(&record.ip)
        .bind(&record.user_agent)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_append_only_inserts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.db");
        let sink = SqliteAuditSink::open(path.to_str().unwrap()).await.unwrap();

        sink.record(AuditRecord::new(
            "tenant-1",
            "actor-1",
            "swarm",
            "submit",
            json!({"objective": "analyze"}),
        ))
        .await
        .unwrap();
        sink.record(
            AuditRecord::new("tenant-1", "actor-1", "swarm", "task_finished", json!({}))
                .with_error("boom"),
        )
        .await
        .unwrap();

        assert_eq!(sink.count().await.unwrap(), 2);
    }
}
