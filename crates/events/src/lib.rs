//! `mozfiscal-events` — typed audit journal records and outbound events.
//!
//! There is deliberately no generic event bus here: command handlers append
//! typed records to the audit journal and hand outbound events to a
//! fire-and-forget publisher after commit.

pub mod audit;
pub mod event;
pub mod outbound;

pub use audit::{AuditError, AuditRecord, PendingAudit};
pub use event::DomainEvent;
pub use outbound::{OutboundEvent, OutboundPublisher, RecordingPublisher, TracingPublisher};
