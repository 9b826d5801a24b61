//! Escrow commands and the auto-release sweep.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use mozfiscal_core::{ActorContext, Clock, DomainResult, TenantId, UserId};
use mozfiscal_escrow::{DisputeOutcome, EscrowEvent, EscrowId};
use mozfiscal_events::OutboundPublisher;

use crate::lifecycle::{record_event, system_actor, FiscalEngine};
use crate::store::Tx;

/// Release held funds and credit the seller's settleable balance, inside
/// the caller's transaction. The state machine guarantees the credit is
/// applied at most once per escrow.
fn release_in(
    tx: &mut Tx,
    tenant_id: TenantId,
    escrow_id: EscrowId,
    actor: UserId,
    auto: bool,
    now: DateTime<Utc>,
) -> DomainResult<Decimal> {
    let amount = {
        let escrow = tx.state.escrow_mut(tenant_id, escrow_id)?;
        escrow.release(now)?;
        if auto {
            escrow.mark_auto_release_processed();
        }
        escrow.amount
    };

    *tx.state
        .seller_balances
        .entry(tenant_id)
        .or_insert(Decimal::ZERO) += amount;

    record_event(
        tx,
        tenant_id,
        escrow_id.0,
        "escrow",
        actor,
        &EscrowEvent::FundsReleased {
            tenant_id,
            escrow_id,
            amount,
            auto,
            occurred_at: now,
        },
    )?;
    Ok(amount)
}

fn refund_in(
    tx: &mut Tx,
    tenant_id: TenantId,
    escrow_id: EscrowId,
    actor: UserId,
    reason: String,
    now: DateTime<Utc>,
) -> DomainResult<()> {
    let amount = {
        let escrow = tx.state.escrow_mut(tenant_id, escrow_id)?;
        escrow.refund(now, reason.clone())?;
        escrow.amount
    };

    record_event(
        tx,
        tenant_id,
        escrow_id.0,
        "escrow",
        actor,
        &EscrowEvent::FundsRefunded {
            tenant_id,
            escrow_id,
            amount,
            reason,
            occurred_at: now,
        },
    )
}

impl<P, C> FiscalEngine<P, C>
where
    P: OutboundPublisher,
    C: Clock,
{
    /// Buyer's funds arrived at the holding account.
    pub fn confirm_escrow_deposit(
        &self,
        ctx: ActorContext,
        escrow_id: EscrowId,
        reference: String,
    ) -> DomainResult<()> {
        let now = self.now();
        self.execute("confirm_escrow_deposit", |tx| {
            tx.state
                .escrow_mut(ctx.tenant_id, escrow_id)?
                .confirm_deposit(now, reference.clone())?;

            record_event(
                tx,
                ctx.tenant_id,
                escrow_id.0,
                "escrow",
                ctx.user_id,
                &EscrowEvent::DepositConfirmed {
                    tenant_id: ctx.tenant_id,
                    escrow_id,
                    reference: reference.clone(),
                    occurred_at: now,
                },
            )?;
            tracing::info!(%escrow_id, "escrow deposit confirmed");
            Ok(())
        })
    }

    /// Delivery confirmed: move the held amount to the seller's balance.
    pub fn release_escrow(&self, ctx: ActorContext, escrow_id: EscrowId) -> DomainResult<()> {
        let now = self.now();
        self.execute("release_escrow", |tx| {
            release_in(tx, ctx.tenant_id, escrow_id, ctx.user_id, false, now)?;
            tracing::info!(%escrow_id, "escrow released");
            Ok(())
        })
    }

    /// Return the held funds to the buyer.
    pub fn refund_escrow(
        &self,
        ctx: ActorContext,
        escrow_id: EscrowId,
        reason: String,
    ) -> DomainResult<()> {
        let now = self.now();
        self.execute("refund_escrow", |tx| {
            refund_in(tx, ctx.tenant_id, escrow_id, ctx.user_id, reason.clone(), now)?;
            tracing::info!(%escrow_id, "escrow refunded");
            Ok(())
        })
    }

    /// Freeze the auto-release clock pending manual resolution.
    pub fn open_escrow_dispute(
        &self,
        ctx: ActorContext,
        escrow_id: EscrowId,
        reason: String,
    ) -> DomainResult<()> {
        let now = self.now();
        self.execute("open_escrow_dispute", |tx| {
            tx.state
                .escrow_mut(ctx.tenant_id, escrow_id)?
                .open_dispute(now, reason.clone())?;

            record_event(
                tx,
                ctx.tenant_id,
                escrow_id.0,
                "escrow",
                ctx.user_id,
                &EscrowEvent::DisputeOpened {
                    tenant_id: ctx.tenant_id,
                    escrow_id,
                    reason: reason.clone(),
                    occurred_at: now,
                },
            )?;
            Ok(())
        })
    }

    /// Manual resolution of a dispute into either terminal state.
    pub fn resolve_escrow_dispute(
        &self,
        ctx: ActorContext,
        escrow_id: EscrowId,
        outcome: DisputeOutcome,
        reason: Option<String>,
    ) -> DomainResult<()> {
        let now = self.now();
        self.execute("resolve_escrow_dispute", |tx| {
            // Guard the dispute state before applying the terminal move.
            {
                let escrow = tx.state.escrow(ctx.tenant_id, escrow_id)?;
                if escrow.state != mozfiscal_escrow::EscrowState::EmDisputa {
                    return Err(mozfiscal_core::DomainError::state_conflict(format!(
                        "escrow {escrow_id} has no open dispute"
                    )));
                }
            }
            match outcome {
                DisputeOutcome::Release => {
                    release_in(tx, ctx.tenant_id, escrow_id, ctx.user_id, false, now)?;
                }
                DisputeOutcome::Refund => {
                    let reason = reason.clone().unwrap_or_else(|| "dispute resolved".to_string());
                    refund_in(tx, ctx.tenant_id, escrow_id, ctx.user_id, reason, now)?;
                }
            }
            Ok(())
        })
    }

    /// The periodic sweep: release every undisputed escrow whose window has
    /// elapsed since deposit confirmation.
    ///
    /// The `processed` flag is set in the same transaction as each release,
    /// so a crashed or re-run sweep never double-releases; already-released
    /// rows no longer match the scan.
    pub fn run_escrow_auto_release(&self, now: DateTime<Utc>) -> DomainResult<Vec<EscrowId>> {
        let window = self.config().escrow_release_window;
        self.execute("run_escrow_auto_release", |tx| {
            let due: Vec<(TenantId, EscrowId)> = tx
                .state
                .escrows
                .values()
                .filter(|e| e.eligible_for_auto_release(now, window))
                .map(|e| (e.tenant_id, e.id))
                .collect();

            for (tenant_id, escrow_id) in &due {
                release_in(tx, *tenant_id, *escrow_id, system_actor(), true, now)?;
            }
            if !due.is_empty() {
                tracing::info!(count = due.len(), "auto-released escrows");
            }
            Ok(due.into_iter().map(|(_, id)| id).collect())
        })
    }

    /// The seller's settleable balance accumulated from released escrows.
    pub fn seller_balance(&self, ctx: ActorContext) -> DomainResult<Decimal> {
        self.store().read(|state| {
            Ok(state
                .seller_balances
                .get(&ctx.tenant_id)
                .copied()
                .unwrap_or(Decimal::ZERO))
        })
    }

    /// Tenant-scoped escrow lookup.
    pub fn escrow(
        &self,
        ctx: ActorContext,
        escrow_id: EscrowId,
    ) -> DomainResult<mozfiscal_escrow::EscrowTransaction> {
        self.store()
            .read(|state| state.escrow(ctx.tenant_id, escrow_id).cloned())
    }

    /// The escrow opened for a proforma, if any.
    pub fn escrow_for_proforma(
        &self,
        ctx: ActorContext,
        proforma_id: mozfiscal_documents::DocumentId,
    ) -> DomainResult<Option<mozfiscal_escrow::EscrowTransaction>> {
        self.store().read(|state| {
            Ok(state
                .escrow_for_proforma(ctx.tenant_id, proforma_id)
                .cloned())
        })
    }
}
