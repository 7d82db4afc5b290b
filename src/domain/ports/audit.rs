//! Audit sink port.
//!
//! Append-only invocation records. Audit failures never fail the primary
//! operation; callers log and continue.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::errors::DomainResult;

/// One audited invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub at: DateTime<Utc>,
    pub tenant: String,
    pub actor: String,
    pub service: String,
    pub tool: String,
    pub request: Value,
    pub response: Option<Value>,
    pub error: Option<String>,
    pub provider: Option<String>,
    pub resource_ref: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl AuditRecord {
    pub fn new(
        tenant: impl Into<String>,
        actor: impl Into<String>,
        service: impl Into<String>,
        tool: impl Into<String>,
        request: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            at: Utc::now(),
            tenant: tenant.into(),
            actor: actor.into(),
            service: service.into(),
            tool: tool.into(),
            request,
            response: None,
            error: None,
            provider: None,
            resource_ref: None,
            ip: None,
            user_agent: None,
        }
    }

    pub fn with_response(mut self, response: Value) -> Self {
        self.response = Some(response);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Port to the audit sink.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Append one record.
    async fn record(&self, record: AuditRecord) -> DomainResult<()>;
}

/// No-op sink used when no audit store is configured.
#[derive(Debug, Default)]
pub struct NullAuditSink;

#[async_trait]
impl AuditSink for NullAuditSink {
    async fn record(&self, _record: AuditRecord) -> DomainResult<()> {
        Ok(())
    }
}
