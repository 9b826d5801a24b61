//! Stock items and movements.
//!
//! Movements are an immutable ledger: each one snapshots the stock level
//! before and after, so the ledger reconciles against the item row at any
//! point in time.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use mozfiscal_core::money::{round_money, round_quantity};
use mozfiscal_core::{AggregateId, DomainError, DomainResult, TenantId};

/// Stock item identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StockItemId(pub AggregateId);

impl StockItemId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for StockItemId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Kind of ledger movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    In,
    Out,
    Adjust,
    Return,
    Count,
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::In => "in",
            MovementKind::Out => "out",
            MovementKind::Adjust => "adjust",
            MovementKind::Return => "return",
            MovementKind::Count => "count",
        }
    }
}

/// A sellable catalog item tracked by the ledger.
///
/// Items with `tracked == false` (services, fees) never move stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockItem {
    pub id: StockItemId,
    pub tenant_id: TenantId,
    pub name: String,
    pub unit: String,
    pub quantity: Decimal,
    pub average_cost: Decimal,
    pub tracked: bool,
}

impl StockItem {
    pub fn new(
        id: StockItemId,
        tenant_id: TenantId,
        name: impl Into<String>,
        unit: impl Into<String>,
        tracked: bool,
    ) -> Self {
        Self {
            id,
            tenant_id,
            name: name.into(),
            unit: unit.into(),
            quantity: Decimal::ZERO,
            average_cost: Decimal::ZERO,
            tracked,
        }
    }

    /// Sufficient-stock guard for OUT movements.
    pub fn ensure_available(&self, requested: Decimal) -> DomainResult<()> {
        if self.quantity < requested {
            return Err(DomainError::InsufficientStock {
                item: self.id.0,
                requested: round_quantity(requested),
                available: round_quantity(self.quantity),
            });
        }
        Ok(())
    }

    /// Receive stock, folding the unit cost into the weighted average.
    pub fn receive(&mut self, quantity: Decimal, unit_cost: Decimal) -> DomainResult<()> {
        if quantity <= Decimal::ZERO {
            return Err(DomainError::validation("received quantity must be positive"));
        }
        if unit_cost < Decimal::ZERO {
            return Err(DomainError::validation("unit cost cannot be negative"));
        }

        let new_quantity = self.quantity + quantity;
        if new_quantity > Decimal::ZERO {
            let pooled = self.quantity * self.average_cost + quantity * unit_cost;
            self.average_cost = round_money(pooled / new_quantity);
        }
        self.quantity = round_quantity(new_quantity);
        Ok(())
    }

    /// Deduct stock for an OUT movement. Callers check availability first;
    /// the guard here is the last line of the invariant.
    pub fn deduct(&mut self, quantity: Decimal) -> DomainResult<()> {
        if quantity <= Decimal::ZERO {
            return Err(DomainError::validation("deducted quantity must be positive"));
        }
        self.ensure_available(quantity)?;
        self.quantity = round_quantity(self.quantity - quantity);
        Ok(())
    }

    /// Signed correction; the result may not go negative.
    pub fn adjust(&mut self, delta: Decimal) -> DomainResult<()> {
        if delta.is_zero() {
            return Err(DomainError::validation("adjustment delta cannot be zero"));
        }
        let new_quantity = self.quantity + delta;
        if new_quantity < Decimal::ZERO {
            return Err(DomainError::InsufficientStock {
                item: self.id.0,
                requested: round_quantity(delta.abs()),
                available: round_quantity(self.quantity),
            });
        }
        self.quantity = round_quantity(new_quantity);
        Ok(())
    }
}

/// Immutable ledger entry. Created by the stock ledger inside the same
/// transaction as the item mutation; never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub movement_id: Uuid,
    pub tenant_id: TenantId,
    pub item_id: StockItemId,
    /// Originating document, when the movement was document-driven.
    pub document_id: Option<AggregateId>,
    pub kind: MovementKind,
    pub quantity: Decimal,
    pub level_before: Decimal,
    pub level_after: Decimal,
    pub unit_cost: Decimal,
    pub occurred_at: DateTime<Utc>,
}

impl StockMovement {
    #[allow(clippy::too_many_arguments)]
    pub fn record(
        tenant_id: TenantId,
        item_id: StockItemId,
        document_id: Option<AggregateId>,
        kind: MovementKind,
        quantity: Decimal,
        level_before: Decimal,
        level_after: Decimal,
        unit_cost: Decimal,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            movement_id: Uuid::now_v7(),
            tenant_id,
            item_id,
            document_id,
            kind,
            quantity: round_quantity(quantity),
            level_before: round_quantity(level_before),
            level_after: round_quantity(level_after),
            unit_cost,
            occurred_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn item() -> StockItem {
        StockItem::new(
            StockItemId::new(AggregateId::new()),
            TenantId::new(),
            "Cimento 50kg",
            "saco",
            true,
        )
    }

    #[test]
    fn receive_updates_weighted_average_cost() {
        let mut it = item();
        it.receive(dec!(10), dec!(100)).unwrap();
        assert_eq!(it.average_cost, dec!(100));

        it.receive(dec!(10), dec!(200)).unwrap();
        assert_eq!(it.quantity, dec!(20));
        assert_eq!(it.average_cost, dec!(150));
    }

    #[test]
    fn deduct_rejects_shortfall_with_context() {
        let mut it = item();
        it.receive(dec!(5), dec!(80)).unwrap();

        let err = it.deduct(dec!(8)).unwrap_err();
        match err {
            DomainError::InsufficientStock {
                item: id,
                requested,
                available,
            } => {
                assert_eq!(id, it.id.0);
                assert_eq!(requested, dec!(8));
                assert_eq!(available, dec!(5));
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }
        // Untouched on failure.
        assert_eq!(it.quantity, dec!(5));
    }

    #[test]
    fn adjust_cannot_go_negative() {
        let mut it = item();
        it.receive(dec!(2), dec!(50)).unwrap();
        assert!(it.adjust(dec!(-3)).is_err());
        it.adjust(dec!(-2)).unwrap();
        assert_eq!(it.quantity, Decimal::ZERO);
    }

    #[test]
    fn movement_snapshots_levels() {
        let it = item();
        let m = StockMovement::record(
            it.tenant_id,
            it.id,
            None,
            MovementKind::In,
            dec!(10),
            dec!(0),
            dec!(10),
            dec!(100),
            Utc::now(),
        );
        assert_eq!(m.level_after - m.level_before, m.quantity);
    }
}
