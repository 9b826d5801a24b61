//! Typed domain events emitted by document transitions.
//!
//! One audit record and one outbound event per transition; the payload is
//! the serialized variant.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use mozfiscal_core::TenantId;
use mozfiscal_events::DomainEvent;

use crate::document::DocumentId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DocumentEvent {
    QuoteEmitted {
        tenant_id: TenantId,
        document_id: DocumentId,
        full_number: String,
        grand_total: Decimal,
        occurred_at: DateTime<Utc>,
    },
    QuoteAccepted {
        tenant_id: TenantId,
        document_id: DocumentId,
        proforma_id: DocumentId,
        occurred_at: DateTime<Utc>,
    },
    CounterOfferRecorded {
        tenant_id: TenantId,
        document_id: DocumentId,
        round: usize,
        occurred_at: DateTime<Utc>,
    },
    QuoteRejected {
        tenant_id: TenantId,
        document_id: DocumentId,
        reason: Option<String>,
        occurred_at: DateTime<Utc>,
    },
    QuoteExpired {
        tenant_id: TenantId,
        document_id: DocumentId,
        occurred_at: DateTime<Utc>,
    },
    ProformaEmitted {
        tenant_id: TenantId,
        document_id: DocumentId,
        origin_id: DocumentId,
        full_number: String,
        grand_total: Decimal,
        occurred_at: DateTime<Utc>,
    },
    PaymentSettled {
        tenant_id: TenantId,
        document_id: DocumentId,
        method: String,
        reference: String,
        occurred_at: DateTime<Utc>,
    },
    InvoiceEmitted {
        tenant_id: TenantId,
        document_id: DocumentId,
        origin_id: DocumentId,
        full_number: String,
        grand_total: Decimal,
        occurred_at: DateTime<Utc>,
    },
    ReceiptEmitted {
        tenant_id: TenantId,
        document_id: DocumentId,
        origin_id: DocumentId,
        full_number: String,
        occurred_at: DateTime<Utc>,
    },
    CreditNoteEmitted {
        tenant_id: TenantId,
        document_id: DocumentId,
        origin_id: DocumentId,
        full_number: String,
        grand_total: Decimal,
        occurred_at: DateTime<Utc>,
    },
    PurchaseInvoiceRecorded {
        tenant_id: TenantId,
        document_id: DocumentId,
        full_number: String,
        grand_total: Decimal,
        occurred_at: DateTime<Utc>,
    },
    DocumentCancelled {
        tenant_id: TenantId,
        document_id: DocumentId,
        reason: String,
        occurred_at: DateTime<Utc>,
    },
}

impl DomainEvent for DocumentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            DocumentEvent::QuoteEmitted { .. } => "document.quote.emitted",
            DocumentEvent::QuoteAccepted { .. } => "document.quote.accepted",
            DocumentEvent::CounterOfferRecorded { .. } => "document.quote.counter_offer",
            DocumentEvent::QuoteRejected { .. } => "document.quote.rejected",
            DocumentEvent::QuoteExpired { .. } => "document.quote.expired",
            DocumentEvent::ProformaEmitted { .. } => "document.proforma.emitted",
            DocumentEvent::PaymentSettled { .. } => "document.proforma.paid",
            DocumentEvent::InvoiceEmitted { .. } => "document.invoice.emitted",
            DocumentEvent::ReceiptEmitted { .. } => "document.receipt.emitted",
            DocumentEvent::CreditNoteEmitted { .. } => "document.credit_note.emitted",
            DocumentEvent::PurchaseInvoiceRecorded { .. } => "document.purchase_invoice.recorded",
            DocumentEvent::DocumentCancelled { .. } => "document.cancelled",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            DocumentEvent::QuoteEmitted { occurred_at, .. }
            | DocumentEvent::QuoteAccepted { occurred_at, .. }
            | DocumentEvent::CounterOfferRecorded { occurred_at, .. }
            | DocumentEvent::QuoteRejected { occurred_at, .. }
            | DocumentEvent::QuoteExpired { occurred_at, .. }
            | DocumentEvent::ProformaEmitted { occurred_at, .. }
            | DocumentEvent::PaymentSettled { occurred_at, .. }
            | DocumentEvent::InvoiceEmitted { occurred_at, .. }
            | DocumentEvent::ReceiptEmitted { occurred_at, .. }
            | DocumentEvent::CreditNoteEmitted { occurred_at, .. }
            | DocumentEvent::PurchaseInvoiceRecorded { occurred_at, .. }
            | DocumentEvent::DocumentCancelled { occurred_at, .. } => *occurred_at,
        }
    }
}
