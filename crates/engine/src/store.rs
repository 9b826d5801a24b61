//! In-memory transactional store.
//!
//! One mutex guards the whole state; a transaction clones the state, runs
//! against the working copy, and swaps it back on success. An error anywhere
//! discards the copy, so every partial write (document, lines, counters,
//! stock, audit) rolls back as one unit. Intended for tests/dev and as the
//! reference semantics for a SQL-backed implementation.

use std::collections::HashMap;
use std::sync::Mutex;

use rust_decimal::Decimal;

use mozfiscal_core::{AggregateId, DomainError, DomainResult, TenantId};
use mozfiscal_documents::{Document, DocumentId};
use mozfiscal_escrow::{EscrowId, EscrowTransaction};
use mozfiscal_events::{AuditRecord, OutboundEvent, PendingAudit};
use mozfiscal_inventory::{StockItem, StockItemId, StockMovement};
use mozfiscal_tax::{Period, TaxDeclaration};

/// Counter row key: one authoritative sequence per (tenant, series, year).
///
/// Series map 1:1 onto document types for the sales flow; purchase
/// registrations carry their own series so the sales sequences stay dense.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterKey {
    pub tenant_id: TenantId,
    pub series: String,
    pub year: i32,
}

/// Declaration key: one row per (tenant, period).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct DeclarationKey {
    pub tenant_id: TenantId,
    pub period: Period,
}

/// The persistent tables (logical layout per the data model).
#[derive(Debug, Default, Clone)]
pub struct StoreState {
    pub documents: HashMap<DocumentId, Document>,
    pub counters: HashMap<CounterKey, u64>,
    pub stock_items: HashMap<StockItemId, StockItem>,
    pub stock_movements: Vec<StockMovement>,
    pub declarations: HashMap<DeclarationKey, TaxDeclaration>,
    pub escrows: HashMap<EscrowId, EscrowTransaction>,
    pub seller_balances: HashMap<TenantId, Decimal>,
    pub audit: Vec<AuditRecord>,
    audit_versions: HashMap<AggregateId, u64>,
}

impl StoreState {
    pub fn document(&self, tenant_id: TenantId, id: DocumentId) -> DomainResult<&Document> {
        self.documents
            .get(&id)
            .filter(|d| d.tenant_id == tenant_id)
            .ok_or_else(|| DomainError::not_found(format!("document {id}")))
    }

    pub fn document_mut(
        &mut self,
        tenant_id: TenantId,
        id: DocumentId,
    ) -> DomainResult<&mut Document> {
        self.documents
            .get_mut(&id)
            .filter(|d| d.tenant_id == tenant_id)
            .ok_or_else(|| DomainError::not_found(format!("document {id}")))
    }

    /// Documents generated from `origin` (the forward edges of the chain).
    pub fn dependents_of(&self, tenant_id: TenantId, origin: DocumentId) -> Vec<&Document> {
        let mut deps: Vec<&Document> = self
            .documents
            .values()
            .filter(|d| d.tenant_id == tenant_id && d.origin == Some(origin))
            .collect();
        deps.sort_by_key(|d| d.id);
        deps
    }

    pub fn escrow(&self, tenant_id: TenantId, id: EscrowId) -> DomainResult<&EscrowTransaction> {
        self.escrows
            .get(&id)
            .filter(|e| e.tenant_id == tenant_id)
            .ok_or_else(|| DomainError::not_found(format!("escrow {id}")))
    }

    pub fn escrow_mut(
        &mut self,
        tenant_id: TenantId,
        id: EscrowId,
    ) -> DomainResult<&mut EscrowTransaction> {
        self.escrows
            .get_mut(&id)
            .filter(|e| e.tenant_id == tenant_id)
            .ok_or_else(|| DomainError::not_found(format!("escrow {id}")))
    }

    pub fn escrow_for_proforma(
        &self,
        tenant_id: TenantId,
        proforma_id: DocumentId,
    ) -> Option<&EscrowTransaction> {
        self.escrows
            .values()
            .find(|e| e.tenant_id == tenant_id && e.proforma_id == proforma_id)
    }

    pub fn stock_item(&self, tenant_id: TenantId, id: StockItemId) -> DomainResult<&StockItem> {
        self.stock_items
            .get(&id)
            .filter(|i| i.tenant_id == tenant_id)
            .ok_or_else(|| DomainError::not_found(format!("stock item {id}")))
    }

    pub fn stock_item_mut(
        &mut self,
        tenant_id: TenantId,
        id: StockItemId,
    ) -> DomainResult<&mut StockItem> {
        self.stock_items
            .get_mut(&id)
            .filter(|i| i.tenant_id == tenant_id)
            .ok_or_else(|| DomainError::not_found(format!("stock item {id}")))
    }

    pub fn audit_for(&self, tenant_id: TenantId, aggregate_id: AggregateId) -> Vec<&AuditRecord> {
        self.audit
            .iter()
            .filter(|r| r.tenant_id == tenant_id && r.aggregate_id == aggregate_id)
            .collect()
    }
}

/// The unit of work handed to a transaction closure.
///
/// Outbound events queued here are only published after the commit swaps the
/// working copy in; a rolled-back unit publishes nothing.
pub struct Tx<'a> {
    pub state: &'a mut StoreState,
    outbound: Vec<OutboundEvent>,
}

impl Tx<'_> {
    /// Append to the audit journal, assigning the next per-aggregate version.
    pub fn append_audit(&mut self, pending: PendingAudit) -> u64 {
        let version = self
            .state
            .audit_versions
            .get(&pending.aggregate_id)
            .copied()
            .unwrap_or(0)
            + 1;
        self.state
            .audit_versions
            .insert(pending.aggregate_id, version);
        self.state
            .audit
            .push(AuditRecord::from_pending(pending, version));
        version
    }

    /// Queue an outbound event for post-commit publication.
    pub fn publish_after_commit(&mut self, event: OutboundEvent) {
        self.outbound.push(event);
    }
}

/// Store handle: serialized transactions over the shared state.
#[derive(Debug, Default)]
pub struct TxStore {
    state: Mutex<StoreState>,
}

impl TxStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run one atomic unit of work.
    ///
    /// On success returns the closure's value plus the outbound events queued
    /// during the unit; the caller publishes them after this method returns
    /// (i.e. strictly after commit).
    pub fn transaction<T>(
        &self,
        f: impl FnOnce(&mut Tx) -> DomainResult<T>,
    ) -> DomainResult<(T, Vec<OutboundEvent>)> {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| DomainError::concurrency("store lock poisoned"))?;

        let mut working = guard.clone();
        let mut tx = Tx {
            state: &mut working,
            outbound: Vec::new(),
        };

        let result = f(&mut tx);
        let outbound = std::mem::take(&mut tx.outbound);
        drop(tx);

        match result {
            Ok(value) => {
                *guard = working;
                Ok((value, outbound))
            }
            Err(e) => Err(e),
        }
    }

    /// Read-only access outside a unit of work.
    pub fn read<T>(&self, f: impl FnOnce(&StoreState) -> DomainResult<T>) -> DomainResult<T> {
        let guard = self
            .state
            .lock()
            .map_err(|_| DomainError::concurrency("store lock poisoned"))?;
        f(&guard)
    }
}
