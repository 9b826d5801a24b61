//! Typed domain events emitted by escrow transitions.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use mozfiscal_core::TenantId;
use mozfiscal_events::DomainEvent;

use crate::escrow::EscrowId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EscrowEvent {
    EscrowOpened {
        tenant_id: TenantId,
        escrow_id: EscrowId,
        amount: Decimal,
        occurred_at: DateTime<Utc>,
    },
    DepositConfirmed {
        tenant_id: TenantId,
        escrow_id: EscrowId,
        reference: String,
        occurred_at: DateTime<Utc>,
    },
    FundsReleased {
        tenant_id: TenantId,
        escrow_id: EscrowId,
        amount: Decimal,
        auto: bool,
        occurred_at: DateTime<Utc>,
    },
    FundsRefunded {
        tenant_id: TenantId,
        escrow_id: EscrowId,
        amount: Decimal,
        reason: String,
        occurred_at: DateTime<Utc>,
    },
    DisputeOpened {
        tenant_id: TenantId,
        escrow_id: EscrowId,
        reason: String,
        occurred_at: DateTime<Utc>,
    },
}

impl DomainEvent for EscrowEvent {
    fn event_type(&self) -> &'static str {
        match self {
            EscrowEvent::EscrowOpened { .. } => "escrow.opened",
            EscrowEvent::DepositConfirmed { .. } => "escrow.deposit_confirmed",
            EscrowEvent::FundsReleased { .. } => "escrow.released",
            EscrowEvent::FundsRefunded { .. } => "escrow.refunded",
            EscrowEvent::DisputeOpened { .. } => "escrow.dispute_opened",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            EscrowEvent::EscrowOpened { occurred_at, .. }
            | EscrowEvent::DepositConfirmed { occurred_at, .. }
            | EscrowEvent::FundsReleased { occurred_at, .. }
            | EscrowEvent::FundsRefunded { occurred_at, .. }
            | EscrowEvent::DisputeOpened { occurred_at, .. } => *occurred_at,
        }
    }
}
