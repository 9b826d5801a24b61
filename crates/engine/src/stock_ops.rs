//! Stock ledger commands: receiving and corrections.
//!
//! Document-driven OUT movements live in the settlement transition; these
//! are the inbound/adjustment operations that give invoices something to
//! decrement.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use mozfiscal_core::{ActorContext, AggregateId, Clock, DomainError, DomainResult, TenantId};
use mozfiscal_documents::DocumentId;
use mozfiscal_events::{DomainEvent, OutboundPublisher};
use mozfiscal_inventory::{MovementKind, StockItem, StockItemId, StockMovement};

use crate::lifecycle::{record_event, FiscalEngine};

/// Events of the stock ledger's explicit operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StockEvent {
    StockItemCreated {
        tenant_id: TenantId,
        item_id: StockItemId,
        name: String,
        tracked: bool,
        occurred_at: DateTime<Utc>,
    },
    StockReceived {
        tenant_id: TenantId,
        item_id: StockItemId,
        quantity: Decimal,
        unit_cost: Decimal,
        occurred_at: DateTime<Utc>,
    },
    StockAdjusted {
        tenant_id: TenantId,
        item_id: StockItemId,
        delta: Decimal,
        occurred_at: DateTime<Utc>,
    },
}

impl DomainEvent for StockEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StockEvent::StockItemCreated { .. } => "stock.item.created",
            StockEvent::StockReceived { .. } => "stock.received",
            StockEvent::StockAdjusted { .. } => "stock.adjusted",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            StockEvent::StockItemCreated { occurred_at, .. }
            | StockEvent::StockReceived { occurred_at, .. }
            | StockEvent::StockAdjusted { occurred_at, .. } => *occurred_at,
        }
    }
}

impl<P, C> FiscalEngine<P, C>
where
    P: OutboundPublisher,
    C: Clock,
{
    /// Register a catalog item with the ledger.
    pub fn create_stock_item(
        &self,
        ctx: ActorContext,
        name: String,
        unit: String,
        tracked: bool,
    ) -> DomainResult<StockItemId> {
        let now = self.now();
        self.execute("create_stock_item", |tx| {
            if name.trim().is_empty() {
                return Err(DomainError::validation("item name cannot be empty"));
            }
            let item_id = StockItemId::new(AggregateId::new());
            let item = StockItem::new(item_id, ctx.tenant_id, name.clone(), unit.clone(), tracked);
            tx.state.stock_items.insert(item_id, item);

            record_event(
                tx,
                ctx.tenant_id,
                item_id.0,
                "stock_item",
                ctx.user_id,
                &StockEvent::StockItemCreated {
                    tenant_id: ctx.tenant_id,
                    item_id,
                    name: name.clone(),
                    tracked,
                    occurred_at: now,
                },
            )?;
            Ok(item_id)
        })
    }

    /// Receive stock (IN movement), folding cost into the weighted average.
    pub fn receive_stock(
        &self,
        ctx: ActorContext,
        item_id: StockItemId,
        quantity: Decimal,
        unit_cost: Decimal,
    ) -> DomainResult<()> {
        let now = self.now();
        self.execute("receive_stock", |tx| {
            let movement = {
                let item = tx.state.stock_item_mut(ctx.tenant_id, item_id)?;
                let before = item.quantity;
                item.receive(quantity, unit_cost)?;
                StockMovement::record(
                    ctx.tenant_id,
                    item_id,
                    None,
                    MovementKind::In,
                    quantity,
                    before,
                    item.quantity,
                    unit_cost,
                    now,
                )
            };
            tx.state.stock_movements.push(movement);

            record_event(
                tx,
                ctx.tenant_id,
                item_id.0,
                "stock_item",
                ctx.user_id,
                &StockEvent::StockReceived {
                    tenant_id: ctx.tenant_id,
                    item_id,
                    quantity,
                    unit_cost,
                    occurred_at: now,
                },
            )?;
            Ok(())
        })
    }

    /// Signed correction (ADJUST movement); cannot drive the level negative.
    pub fn adjust_stock(
        &self,
        ctx: ActorContext,
        item_id: StockItemId,
        delta: Decimal,
    ) -> DomainResult<()> {
        let now = self.now();
        self.execute("adjust_stock", |tx| {
            let movement = {
                let item = tx.state.stock_item_mut(ctx.tenant_id, item_id)?;
                let before = item.quantity;
                item.adjust(delta)?;
                StockMovement::record(
                    ctx.tenant_id,
                    item_id,
                    None,
                    MovementKind::Adjust,
                    delta,
                    before,
                    item.quantity,
                    item.average_cost,
                    now,
                )
            };
            tx.state.stock_movements.push(movement);

            record_event(
                tx,
                ctx.tenant_id,
                item_id.0,
                "stock_item",
                ctx.user_id,
                &StockEvent::StockAdjusted {
                    tenant_id: ctx.tenant_id,
                    item_id,
                    delta,
                    occurred_at: now,
                },
            )?;
            Ok(())
        })
    }

    /// Current level of one item.
    pub fn stock_level(&self, ctx: ActorContext, item_id: StockItemId) -> DomainResult<Decimal> {
        self.store()
            .read(|state| Ok(state.stock_item(ctx.tenant_id, item_id)?.quantity))
    }

    /// Ledger entries of one item, oldest first.
    pub fn movements_for_item(
        &self,
        ctx: ActorContext,
        item_id: StockItemId,
    ) -> DomainResult<Vec<StockMovement>> {
        self.store().read(|state| {
            Ok(state
                .stock_movements
                .iter()
                .filter(|m| m.tenant_id == ctx.tenant_id && m.item_id == item_id)
                .cloned()
                .collect())
        })
    }

    /// Movements recorded against one document (e.g. an invoice emission).
    pub fn movements_for_document(
        &self,
        ctx: ActorContext,
        document_id: DocumentId,
    ) -> DomainResult<Vec<StockMovement>> {
        self.store().read(|state| {
            Ok(state
                .stock_movements
                .iter()
                .filter(|m| m.tenant_id == ctx.tenant_id && m.document_id == Some(document_id.0))
                .cloned()
                .collect())
        })
    }
}
