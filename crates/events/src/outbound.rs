//! Outbound events for notification/email/websocket collaborators.
//!
//! Publication is fire-and-forget and happens strictly **after** the
//! transaction commits; nothing is ever published for a rolled-back unit.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use mozfiscal_core::{AggregateId, TenantId};

/// Payload handed to external delivery collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundEvent {
    pub tenant_id: TenantId,
    pub aggregate_id: AggregateId,
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    pub payload: JsonValue,
}

/// Fire-and-forget publisher seam.
///
/// Implementations must not fail the calling command: delivery problems are
/// their own concern (retry queues, dead letters) outside this engine.
pub trait OutboundPublisher: Send + Sync {
    fn publish(&self, event: OutboundEvent);
}

impl<P> OutboundPublisher for std::sync::Arc<P>
where
    P: OutboundPublisher + ?Sized,
{
    fn publish(&self, event: OutboundEvent) {
        (**self).publish(event)
    }
}

/// Publisher that logs every event; the default wiring.
#[derive(Debug, Default)]
pub struct TracingPublisher;

impl OutboundPublisher for TracingPublisher {
    fn publish(&self, event: OutboundEvent) {
        tracing::info!(
            tenant_id = %event.tenant_id,
            aggregate_id = %event.aggregate_id,
            event_type = %event.event_type,
            "outbound event"
        );
    }
}

/// Publisher that records events in memory, for tests.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<OutboundEvent>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<OutboundEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn event_types(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .map(|e| e.event_type)
            .collect()
    }
}

impl OutboundPublisher for RecordingPublisher {
    fn publish(&self, event: OutboundEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
