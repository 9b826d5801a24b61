//! `mozfiscal-documents` — the fiscal document entity and its lifecycle.
//!
//! A document is created by a workflow command, mutated only through
//! state-machine transitions, and never hard-deleted: cancellation is a
//! state. Current state lives on the row; the audit journal only documents
//! how it got there.

pub mod document;
pub mod events;
pub mod fiscal;
pub mod numbering;
pub mod transition;

pub use document::{
    CancellationInfo, Document, DocumentId, DocumentLine, DocumentState, DocumentType, LineId,
    LineInput, NegotiationRecord, PaymentCondition,
};
pub use events::DocumentEvent;
pub use fiscal::{fiscal_hash, qr_payload};
pub use numbering::FiscalNumber;
pub use transition::transition_allowed;
