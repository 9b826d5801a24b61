//! Append-only audit journal records.
//!
//! The journal is keyed by `(aggregate_id, version)` and is used for audit
//! and replay; current state lives on the rows themselves, not here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use mozfiscal_core::{AggregateId, TenantId, UserId};

use crate::event::DomainEvent;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit payload serialization failed: {0}")]
    Serialize(String),
}

/// A record ready to be appended to the journal (not yet assigned a version).
///
/// The journal assigns the per-aggregate version during append, inside the
/// same transaction as the state change it documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAudit {
    pub record_id: Uuid,
    pub tenant_id: TenantId,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,
    pub event_type: String,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
    pub payload: JsonValue,
}

impl PendingAudit {
    /// Build a pending record from a typed domain event.
    ///
    /// Serializes the event to JSON while keeping the metadata needed to
    /// deserialize it back during replay/inspection.
    pub fn from_typed<E>(
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        actor: UserId,
        event: &E,
    ) -> Result<Self, AuditError>
    where
        E: DomainEvent + Serialize,
    {
        let payload =
            serde_json::to_value(event).map_err(|e| AuditError::Serialize(e.to_string()))?;

        Ok(Self {
            record_id: Uuid::now_v7(),
            tenant_id,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            event_type: event.event_type().to_string(),
            actor,
            occurred_at: event.occurred_at(),
            payload,
        })
    }
}

/// A journal record persisted with its per-aggregate version.
///
/// Versions are assigned by the journal during append and are:
/// - **monotonically increasing** per aggregate (1, 2, 3, ...)
/// - **immutable** once assigned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub record_id: Uuid,
    pub tenant_id: TenantId,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    /// Monotonically increasing position in the aggregate's journal.
    pub version: u64,

    pub event_type: String,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
    pub payload: JsonValue,
}

impl AuditRecord {
    pub fn from_pending(pending: PendingAudit, version: u64) -> Self {
        Self {
            record_id: pending.record_id,
            tenant_id: pending.tenant_id,
            aggregate_id: pending.aggregate_id,
            aggregate_type: pending.aggregate_type,
            version,
            event_type: pending.event_type,
            actor: pending.actor,
            occurred_at: pending.occurred_at,
            payload: pending.payload,
        }
    }
}
