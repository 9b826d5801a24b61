//! Periodic declaration aggregation and submission.
//!
//! The aggregator is read-only over settled documents: same inputs, same
//! accumulators. The declaration row is created lazily, recomputed freely
//! while draft, and frozen at submission.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use mozfiscal_core::{ActorContext, AggregateId, Clock, DomainError, DomainResult, TenantId};
use mozfiscal_events::{DomainEvent, OutboundPublisher};
use mozfiscal_tax::{
    line_computation, DeclarationAccumulators, DeclarationId, DeclarationState, IvaBracket,
    Period, Settlement, TaxDeclaration,
};

use crate::lifecycle::{record_event, FiscalEngine};
use crate::store::{DeclarationKey, StoreState, Tx};

/// Events of the declaration lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeclarationEvent {
    DeclarationRegenerated {
        tenant_id: TenantId,
        declaration_id: DeclarationId,
        period: Period,
        document_count: usize,
        tax_payable: Decimal,
        credit_carried_forward: Decimal,
        occurred_at: DateTime<Utc>,
    },
    DeclarationValidated {
        tenant_id: TenantId,
        declaration_id: DeclarationId,
        period: Period,
        occurred_at: DateTime<Utc>,
    },
    DeclarationSubmitted {
        tenant_id: TenantId,
        declaration_id: DeclarationId,
        period: Period,
        confirmation_code: String,
        occurred_at: DateTime<Utc>,
    },
}

impl DomainEvent for DeclarationEvent {
    fn event_type(&self) -> &'static str {
        match self {
            DeclarationEvent::DeclarationRegenerated { .. } => "declaration.regenerated",
            DeclarationEvent::DeclarationValidated { .. } => "declaration.validated",
            DeclarationEvent::DeclarationSubmitted { .. } => "declaration.submitted",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            DeclarationEvent::DeclarationRegenerated { occurred_at, .. }
            | DeclarationEvent::DeclarationValidated { occurred_at, .. }
            | DeclarationEvent::DeclarationSubmitted { occurred_at, .. } => *occurred_at,
        }
    }
}

/// Fold the period's settled documents into the named accumulators.
///
/// Credit notes contribute negatively. Lines are recomputed at full
/// precision; rounding happens once, on the accumulator totals.
pub(crate) fn aggregate_period(
    state: &StoreState,
    tenant_id: TenantId,
    period: Period,
) -> DomainResult<(DeclarationAccumulators, usize)> {
    let mut accumulators = DeclarationAccumulators::default();
    let mut document_count = 0usize;

    for doc in state.documents.values().filter(|d| {
        d.tenant_id == tenant_id && d.counts_for_declaration() && period.contains(d.issue_date)
    }) {
        document_count += 1;
        let sign = doc.doc_type.declaration_sign();
        for line in &doc.lines {
            let bracket = IvaBracket::from_rate(line.tax_rate).ok_or_else(|| {
                DomainError::validation(format!(
                    "document {} line {} carries unknown IVA rate {}",
                    doc.id, line.line_id, line.tax_rate
                ))
            })?;
            let computed = line_computation(
                line.quantity,
                line.unit_price,
                line.discount_pct,
                line.tax_rate,
            );
            accumulators.add(
                doc.operation,
                bracket,
                computed.taxable_base * sign,
                computed.tax_amount * sign,
            );
        }
    }

    Ok((accumulators, document_count))
}

fn prior_credit(state: &StoreState, tenant_id: TenantId, period: Period) -> Decimal {
    state
        .declarations
        .get(&DeclarationKey {
            tenant_id,
            period: period.prev(),
        })
        .map(|d| d.settlement.credit_carried_forward)
        .unwrap_or(Decimal::ZERO)
}

fn regenerate_in(
    tx: &mut Tx,
    ctx: ActorContext,
    period: Period,
    now: DateTime<Utc>,
) -> DomainResult<TaxDeclaration> {
    let key = DeclarationKey {
        tenant_id: ctx.tenant_id,
        period,
    };

    let (accumulators, document_count) = aggregate_period(tx.state, ctx.tenant_id, period)?;
    let credit = prior_credit(tx.state, ctx.tenant_id, period);

    let mut declaration = tx.state.declarations.get(&key).cloned().unwrap_or_else(|| {
        TaxDeclaration {
            id: DeclarationId::new(AggregateId::new()),
            tenant_id: ctx.tenant_id,
            period,
            accumulators: DeclarationAccumulators::default(),
            settlement: Settlement::default(),
            state: DeclarationState::Draft,
            confirmation_code: None,
            document_count: 0,
            generated_at: now,
        }
    });
    declaration.regenerate(accumulators, credit, document_count, now)?;

    record_event(
        tx,
        ctx.tenant_id,
        declaration.id.0,
        "declaration",
        ctx.user_id,
        &DeclarationEvent::DeclarationRegenerated {
            tenant_id: ctx.tenant_id,
            declaration_id: declaration.id,
            period,
            document_count,
            tax_payable: declaration.settlement.tax_payable,
            credit_carried_forward: declaration.settlement.credit_carried_forward,
            occurred_at: now,
        },
    )?;

    tx.state.declarations.insert(key, declaration.clone());
    Ok(declaration)
}

fn find_declaration(
    state: &StoreState,
    tenant_id: TenantId,
    id: DeclarationId,
) -> DomainResult<DeclarationKey> {
    state
        .declarations
        .values()
        .find(|d| d.tenant_id == tenant_id && d.id == id)
        .map(|d| DeclarationKey {
            tenant_id,
            period: d.period,
        })
        .ok_or_else(|| DomainError::not_found(format!("declaration {id}")))
}

impl<P, C> FiscalEngine<P, C>
where
    P: OutboundPublisher,
    C: Clock,
{
    /// Fetch the declaration for (tenant, year, month), creating or
    /// recomputing it while draft. Frozen periods are returned as stored.
    pub fn get_declaration(
        &self,
        ctx: ActorContext,
        year: i32,
        month: u32,
    ) -> DomainResult<TaxDeclaration> {
        let period = Period::new(year, month)?;
        let now = self.now();

        self.execute("get_declaration", |tx| {
            let key = DeclarationKey {
                tenant_id: ctx.tenant_id,
                period,
            };
            if let Some(existing) = tx.state.declarations.get(&key) {
                if existing.state.is_frozen() {
                    return Ok(existing.clone());
                }
            }
            regenerate_in(tx, ctx, period, now)
        })
    }

    /// Force a recomputation. Fails with a state conflict once the period
    /// has been submitted.
    pub fn regenerate_declaration(
        &self,
        ctx: ActorContext,
        year: i32,
        month: u32,
    ) -> DomainResult<TaxDeclaration> {
        let period = Period::new(year, month)?;
        let now = self.now();

        self.execute("regenerate_declaration", |tx| {
            let key = DeclarationKey {
                tenant_id: ctx.tenant_id,
                period,
            };
            if let Some(existing) = tx.state.declarations.get(&key) {
                if existing.state.is_frozen() {
                    return Err(DomainError::state_conflict(format!(
                        "declaration {} for {} is already submitted",
                        existing.id, period
                    )));
                }
            }
            regenerate_in(tx, ctx, period, now)
        })
    }

    /// Draft -> Validated.
    pub fn validate_declaration(
        &self,
        ctx: ActorContext,
        declaration_id: DeclarationId,
    ) -> DomainResult<()> {
        let now = self.now();
        self.execute("validate_declaration", |tx| {
            let key = find_declaration(tx.state, ctx.tenant_id, declaration_id)?;
            let declaration = tx
                .state
                .declarations
                .get_mut(&key)
                .ok_or_else(|| DomainError::not_found(format!("declaration {declaration_id}")))?;
            declaration.validate()?;
            let period = declaration.period;

            record_event(
                tx,
                ctx.tenant_id,
                declaration_id.0,
                "declaration",
                ctx.user_id,
                &DeclarationEvent::DeclarationValidated {
                    tenant_id: ctx.tenant_id,
                    declaration_id,
                    period,
                    occurred_at: now,
                },
            )?;
            Ok(())
        })
    }

    /// Freeze the declaration and return the confirmation code.
    pub fn submit_declaration(
        &self,
        ctx: ActorContext,
        declaration_id: DeclarationId,
    ) -> DomainResult<String> {
        let now = self.now();
        self.execute("submit_declaration", |tx| {
            let key = find_declaration(tx.state, ctx.tenant_id, declaration_id)?;
            let declaration = tx
                .state
                .declarations
                .get_mut(&key)
                .ok_or_else(|| DomainError::not_found(format!("declaration {declaration_id}")))?;
            let code = declaration.submit()?;
            let period = declaration.period;

            record_event(
                tx,
                ctx.tenant_id,
                declaration_id.0,
                "declaration",
                ctx.user_id,
                &DeclarationEvent::DeclarationSubmitted {
                    tenant_id: ctx.tenant_id,
                    declaration_id,
                    period,
                    confirmation_code: code.clone(),
                    occurred_at: now,
                },
            )?;
            tracing::info!(%declaration_id, %period, "declaration submitted");
            Ok(code)
        })
    }
}
