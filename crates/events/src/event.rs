use chrono::{DateTime, Utc};

/// A domain event emitted by a state transition.
///
/// Events are:
/// - **immutable** (treat them as facts)
/// - designed to be **append-only** (the audit journal never rewrites)
pub trait DomainEvent: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name/type identifier (e.g. "document.quote.emitted").
    fn event_type(&self) -> &'static str;

    /// When the event occurred (business time).
    fn occurred_at(&self) -> DateTime<Utc>;
}
