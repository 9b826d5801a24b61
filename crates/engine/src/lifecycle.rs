//! Workflow commands of the document state machine.
//!
//! Every command is one transaction: validate state, validate business
//! rules, recompute totals, number at emission, apply side effects exactly
//! once, append audit records. Outbound events queued during the unit are
//! published only after commit.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use mozfiscal_core::{
    AggregateId, ActorContext, Clock, CounterpartyId, DomainError, DomainResult, TenantId, UserId,
};
use mozfiscal_documents::{
    fiscal_hash, qr_payload, Document, DocumentEvent, DocumentId, DocumentLine, DocumentState,
    DocumentType, LineId, LineInput, NegotiationRecord, PaymentCondition,
};
use mozfiscal_escrow::{
    EscrowEvent, EscrowId, EscrowTransaction, PaymentMethod, PaymentOutcome, PaymentRequest,
};
use mozfiscal_events::{AuditRecord, DomainEvent, OutboundEvent, OutboundPublisher, PendingAudit};
use mozfiscal_inventory::{MovementKind, StockMovement};
use mozfiscal_tax::TaxOperation;

use crate::config::EngineConfig;
use crate::sequencer::next_fiscal_number;
use crate::store::{Tx, TxStore};

/// Actor recorded for sweep-driven transitions.
pub(crate) fn system_actor() -> UserId {
    UserId::from_uuid(Uuid::nil())
}

/// A buyer's counter-offer carried by an accept command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterOffer {
    pub lines: Vec<LineInput>,
    pub note: Option<String>,
}

/// What accepting a quote produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptOutcome {
    /// Plain acceptance: the proforma was generated atomically.
    Accepted {
        proforma_id: DocumentId,
        full_number: String,
    },
    /// A counter-offer was recorded; totals unchanged until resolved.
    Negotiating { round: usize },
}

/// The engine: store + publisher + clock + configuration.
pub struct FiscalEngine<P, C> {
    store: TxStore,
    publisher: P,
    clock: C,
    config: EngineConfig,
}

/// Append one audit record and queue the matching outbound event.
pub(crate) fn record_event<E>(
    tx: &mut Tx,
    tenant_id: TenantId,
    aggregate_id: AggregateId,
    aggregate_type: &str,
    actor: UserId,
    event: &E,
) -> DomainResult<()>
where
    E: DomainEvent + Serialize,
{
    let pending = PendingAudit::from_typed(tenant_id, aggregate_id, aggregate_type, actor, event)
        .map_err(|e| DomainError::validation(e.to_string()))?;

    let outbound = OutboundEvent {
        tenant_id,
        aggregate_id,
        event_type: pending.event_type.clone(),
        occurred_at: pending.occurred_at,
        payload: pending.payload.clone(),
    };
    tx.append_audit(pending);
    tx.publish_after_commit(outbound);
    Ok(())
}

/// Assign the fiscal identity and emit, inside the caller's transaction.
pub(crate) fn emit_document(
    tx: &mut Tx,
    config: &EngineConfig,
    doc: &mut Document,
) -> DomainResult<String> {
    let year = doc.issue_date.year();
    let series = if doc.operation == TaxOperation::Purchases {
        config.purchase_series.clone()
    } else {
        config.series_for(doc.doc_type)
    };
    let number = next_fiscal_number(tx.state, doc.tenant_id, series, year);
    let full = number.render();
    let hash = fiscal_hash(
        doc.tenant_id,
        doc.doc_type,
        &number,
        doc.issue_date,
        doc.totals.grand_total,
    );
    let qr = qr_payload(&number, doc.issue_date, doc.totals.grand_total, &hash);
    doc.emit(number, hash, qr)?;
    Ok(full)
}

fn build_lines(inputs: &[LineInput]) -> DomainResult<Vec<DocumentLine>> {
    inputs
        .iter()
        .cloned()
        .map(|input| DocumentLine::from_input(LineId::new(AggregateId::new()), input))
        .collect()
}

/// Fresh copies of an origin document's lines, with the stock idempotency
/// state reset for the new document.
fn derive_lines(lines: &[DocumentLine]) -> Vec<DocumentLine> {
    lines
        .iter()
        .map(|l| DocumentLine {
            line_id: LineId::new(AggregateId::new()),
            stock_moved: false,
            moved_quantity: None,
            ..l.clone()
        })
        .collect()
}

impl<P, C> FiscalEngine<P, C>
where
    P: OutboundPublisher,
    C: Clock,
{
    pub fn new(publisher: P, clock: C, config: EngineConfig) -> Self {
        Self {
            store: TxStore::new(),
            publisher,
            clock,
            config,
        }
    }

    pub fn store(&self) -> &TxStore {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) fn today(&self) -> NaiveDate {
        self.clock.now().date_naive()
    }

    /// Run a command transactionally, publishing outbound events after
    /// commit and retrying bounded times on concurrency conflicts.
    pub(crate) fn execute<T>(
        &self,
        command: &str,
        f: impl Fn(&mut Tx) -> DomainResult<T>,
    ) -> DomainResult<T> {
        let mut attempt = 0u32;
        loop {
            match self.store.transaction(&f) {
                Ok((value, outbound)) => {
                    for event in outbound {
                        self.publisher.publish(event);
                    }
                    tracing::debug!(command, "command committed");
                    return Ok(value);
                }
                Err(e) if e.is_retryable() && attempt < self.config.max_conflict_retries => {
                    attempt += 1;
                    tracing::warn!(command, attempt, error = %e, "retrying after conflict");
                }
                Err(e) => {
                    tracing::debug!(command, error = %e, "command rejected");
                    return Err(e);
                }
            }
        }
    }

    /// Create and emit a quote in one unit.
    pub fn create_quote(
        &self,
        ctx: ActorContext,
        counterparty_id: CounterpartyId,
        lines: Vec<LineInput>,
        validity_days: u32,
    ) -> DomainResult<(DocumentId, String)> {
        let today = self.today();
        let now = self.now();

        self.execute("create_quote", |tx| {
            let doc_lines = build_lines(&lines)?;
            let id = DocumentId::new(AggregateId::new());
            let valid_until = today + chrono::Duration::days(i64::from(validity_days));

            let mut doc = Document::draft(
                id,
                ctx.tenant_id,
                counterparty_id,
                DocumentType::Quote,
                TaxOperation::Sales,
                doc_lines,
                today,
                Some(valid_until),
                None,
            )?;

            let full_number = emit_document(tx, &self.config, &mut doc)?;
            let grand_total = doc.totals.grand_total;
            tx.state.documents.insert(id, doc);

            record_event(
                tx,
                ctx.tenant_id,
                id.0,
                "document",
                ctx.user_id,
                &DocumentEvent::QuoteEmitted {
                    tenant_id: ctx.tenant_id,
                    document_id: id,
                    full_number: full_number.clone(),
                    grand_total,
                    occurred_at: now,
                },
            )?;

            tracing::info!(%id, %full_number, "quote emitted");
            Ok((id, full_number))
        })
    }

    /// Accept a quote, or record a counter-offer.
    ///
    /// Plain acceptance generates the proforma atomically. Acceptance past
    /// the validity date commits the `Expired` transition and surfaces the
    /// expiry to the caller.
    pub fn accept_quote(
        &self,
        ctx: ActorContext,
        quote_id: DocumentId,
        counter_offer: Option<CounterOffer>,
        payment_condition: Option<PaymentCondition>,
    ) -> DomainResult<AcceptOutcome> {
        let today = self.today();
        let now = self.now();

        // Validity check first: a lapsed quote expires even though the
        // accept itself fails, so the expiry is its own committed unit.
        let lapsed = self.execute("accept_quote.validity", |tx| {
            let doc = tx.state.document(ctx.tenant_id, quote_id)?;
            if doc.doc_type != DocumentType::Quote {
                return Err(DomainError::state_conflict(format!(
                    "document {quote_id} is a {}, not a quote",
                    doc.doc_type.as_str()
                )));
            }
            let open = matches!(
                doc.state,
                DocumentState::Emitted | DocumentState::Negotiating
            );
            if !(open && doc.is_past_validity(today)) {
                return Ok(false);
            }

            tx.state.document_mut(ctx.tenant_id, quote_id)?.mark_expired()?;
            record_event(
                tx,
                ctx.tenant_id,
                quote_id.0,
                "document",
                ctx.user_id,
                &DocumentEvent::QuoteExpired {
                    tenant_id: ctx.tenant_id,
                    document_id: quote_id,
                    occurred_at: now,
                },
            )?;
            Ok(true)
        })?;
        if lapsed {
            return Err(DomainError::expired(format!(
                "quote {quote_id} validity date has passed"
            )));
        }

        self.execute("accept_quote", |tx| {
            if let Some(offer) = &counter_offer {
                let round = {
                    let doc = tx.state.document_mut(ctx.tenant_id, quote_id)?;
                    doc.record_counter_offer(NegotiationRecord {
                        proposed_by: ctx.user_id,
                        lines: offer.lines.clone(),
                        note: offer.note.clone(),
                        occurred_at: now,
                    })?;
                    doc.negotiations.len()
                };
                record_event(
                    tx,
                    ctx.tenant_id,
                    quote_id.0,
                    "document",
                    ctx.user_id,
                    &DocumentEvent::CounterOfferRecorded {
                        tenant_id: ctx.tenant_id,
                        document_id: quote_id,
                        round,
                        occurred_at: now,
                    },
                )?;
                return Ok(AcceptOutcome::Negotiating { round });
            }

            {
                let doc = tx.state.document_mut(ctx.tenant_id, quote_id)?;
                // Resolving an open negotiation adopts the latest offer.
                if doc.state == DocumentState::Negotiating {
                    let latest = doc
                        .negotiations
                        .last()
                        .cloned()
                        .ok_or_else(|| {
                            DomainError::state_conflict(format!(
                                "quote {quote_id} is negotiating without an offer on record"
                            ))
                        })?;
                    doc.revise_lines(build_lines(&latest.lines)?)?;
                }
                doc.ensure_acceptable(today)?;
                doc.mark_accepted()?;
            }

            let quote = tx.state.document(ctx.tenant_id, quote_id)?.clone();
            let condition = payment_condition.unwrap_or_default();
            let (proforma_id, full_number) =
                self.emit_proforma_in(tx, ctx, &quote, condition, today, now)?;

            record_event(
                tx,
                ctx.tenant_id,
                quote_id.0,
                "document",
                ctx.user_id,
                &DocumentEvent::QuoteAccepted {
                    tenant_id: ctx.tenant_id,
                    document_id: quote_id,
                    proforma_id,
                    occurred_at: now,
                },
            )?;

            tracing::info!(%quote_id, %proforma_id, "quote accepted");
            Ok(AcceptOutcome::Accepted {
                proforma_id,
                full_number,
            })
        })
    }

    /// Reject an open quote.
    pub fn reject_quote(
        &self,
        ctx: ActorContext,
        quote_id: DocumentId,
        reason: Option<String>,
    ) -> DomainResult<()> {
        let now = self.now();
        self.execute("reject_quote", |tx| {
            {
                let doc = tx.state.document_mut(ctx.tenant_id, quote_id)?;
                if doc.doc_type != DocumentType::Quote {
                    return Err(DomainError::state_conflict(format!(
                        "document {quote_id} is a {}, not a quote",
                        doc.doc_type.as_str()
                    )));
                }
                doc.mark_rejected()?;
            }
            record_event(
                tx,
                ctx.tenant_id,
                quote_id.0,
                "document",
                ctx.user_id,
                &DocumentEvent::QuoteRejected {
                    tenant_id: ctx.tenant_id,
                    document_id: quote_id,
                    reason: reason.clone(),
                    occurred_at: now,
                },
            )?;
            Ok(())
        })
    }

    /// Explicitly generate a proforma for an accepted quote.
    ///
    /// Normally auto-invoked by acceptance; callable again only if the
    /// earlier proforma was cancelled.
    pub fn generate_proforma(
        &self,
        ctx: ActorContext,
        quote_id: DocumentId,
        payment_condition: Option<PaymentCondition>,
    ) -> DomainResult<(DocumentId, String)> {
        let today = self.today();
        let now = self.now();

        self.execute("generate_proforma", |tx| {
            let quote = tx.state.document(ctx.tenant_id, quote_id)?.clone();
            if quote.doc_type != DocumentType::Quote {
                return Err(DomainError::state_conflict(format!(
                    "document {quote_id} is a {}, not a quote",
                    quote.doc_type.as_str()
                )));
            }
            if quote.state != DocumentState::Accepted {
                return Err(DomainError::state_conflict(format!(
                    "quote {quote_id} is {:?}, only accepted quotes convert to proformas",
                    quote.state
                )));
            }
            let active = tx
                .state
                .dependents_of(ctx.tenant_id, quote_id)
                .iter()
                .any(|d| d.state.blocks_origin_cancellation());
            if active {
                return Err(DomainError::state_conflict(format!(
                    "quote {quote_id} already has an active proforma"
                )));
            }

            let condition = payment_condition.unwrap_or_default();
            self.emit_proforma_in(tx, ctx, &quote, condition, today, now)
        })
    }

    /// Proforma emission + escrow opening, inside the caller's transaction.
    fn emit_proforma_in(
        &self,
        tx: &mut Tx,
        ctx: ActorContext,
        quote: &Document,
        condition: PaymentCondition,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> DomainResult<(DocumentId, String)> {
        let due = match condition {
            PaymentCondition::Credit { days } => today + chrono::Duration::days(i64::from(days)),
            PaymentCondition::Immediate | PaymentCondition::Escrow => today,
        };

        let id = DocumentId::new(AggregateId::new());
        let mut proforma = Document::draft(
            id,
            ctx.tenant_id,
            quote.counterparty_id,
            DocumentType::Proforma,
            TaxOperation::Sales,
            derive_lines(&quote.lines),
            today,
            Some(due),
            Some(quote.id),
        )?;
        proforma.payment_condition = Some(condition);

        let full_number = emit_document(tx, &self.config, &mut proforma)?;
        let grand_total = proforma.totals.grand_total;
        tx.state.documents.insert(id, proforma);

        record_event(
            tx,
            ctx.tenant_id,
            id.0,
            "document",
            ctx.user_id,
            &DocumentEvent::ProformaEmitted {
                tenant_id: ctx.tenant_id,
                document_id: id,
                origin_id: quote.id,
                full_number: full_number.clone(),
                grand_total,
                occurred_at: now,
            },
        )?;

        if condition == PaymentCondition::Escrow {
            let escrow_id = EscrowId::new(AggregateId::new());
            let escrow = EscrowTransaction::open(
                escrow_id,
                ctx.tenant_id,
                quote.counterparty_id,
                id,
                grand_total,
            )?;
            tx.state.escrows.insert(escrow_id, escrow);
            record_event(
                tx,
                ctx.tenant_id,
                escrow_id.0,
                "escrow",
                ctx.user_id,
                &EscrowEvent::EscrowOpened {
                    tenant_id: ctx.tenant_id,
                    escrow_id,
                    amount: grand_total,
                    occurred_at: now,
                },
            )?;
        }

        Ok((id, full_number))
    }

    /// Settle a proforma: emit the invoice and receipt atomically, moving
    /// stock exactly once per tracked line.
    pub fn settle_payment(
        &self,
        ctx: ActorContext,
        proforma_id: DocumentId,
        method: PaymentMethod,
        reference: Option<String>,
    ) -> DomainResult<(DocumentId, DocumentId)> {
        let today = self.today();
        let now = self.now();

        self.execute("settle_payment", |tx| {
            let proforma = tx.state.document(ctx.tenant_id, proforma_id)?.clone();
            if proforma.doc_type != DocumentType::Proforma {
                return Err(DomainError::state_conflict(format!(
                    "document {proforma_id} is a {}, not a proforma",
                    proforma.doc_type.as_str()
                )));
            }
            if proforma.state != DocumentState::Emitted {
                return Err(DomainError::state_conflict(format!(
                    "proforma {proforma_id} is {:?}, not open for settlement",
                    proforma.state
                )));
            }
            let has_active_invoice = tx
                .state
                .dependents_of(ctx.tenant_id, proforma_id)
                .iter()
                .any(|d| d.doc_type == DocumentType::Invoice && d.state.blocks_origin_cancellation());
            if has_active_invoice {
                return Err(DomainError::state_conflict(format!(
                    "proforma {proforma_id} already has an active invoice"
                )));
            }

            // Escrow-backed settlement requires confirmed funds.
            let escrow_snapshot = tx
                .state
                .escrow_for_proforma(ctx.tenant_id, proforma_id)
                .cloned();
            if escrow_snapshot.is_some() && method != PaymentMethod::Escrow {
                return Err(DomainError::state_conflict(format!(
                    "proforma {proforma_id} expects escrow settlement, not {}",
                    method.as_str()
                )));
            }
            let payment_reference = if method == PaymentMethod::Escrow {
                let escrow = escrow_snapshot.as_ref().ok_or_else(|| {
                    DomainError::state_conflict(format!(
                        "proforma {proforma_id} has no escrow to settle against"
                    ))
                })?;
                if !escrow.is_funded() {
                    return Err(DomainError::state_conflict(format!(
                        "escrow {} holds no confirmed deposit",
                        escrow.id
                    )));
                }
                reference.clone().or_else(|| escrow.payment_reference.clone())
            } else {
                reference.clone()
            };

            let request = PaymentRequest {
                tenant_id: ctx.tenant_id,
                document_id: proforma_id,
                amount: proforma.totals.grand_total,
                reference: payment_reference,
            };
            let outcome = method.processor().process(&request)?;
            let settled_reference = outcome.reference().to_string();
            if matches!(outcome, PaymentOutcome::Held { .. }) && method != PaymentMethod::Escrow {
                return Err(DomainError::state_conflict(format!(
                    "method {} reported held funds for a non-escrow settlement",
                    method.as_str()
                )));
            }

            tx.state
                .document_mut(ctx.tenant_id, proforma_id)?
                .mark_paid()?;

            // Invoice: stock OUT per tracked line, all-or-nothing.
            let invoice_id = DocumentId::new(AggregateId::new());
            let mut invoice = Document::draft(
                invoice_id,
                ctx.tenant_id,
                proforma.counterparty_id,
                DocumentType::Invoice,
                TaxOperation::Sales,
                derive_lines(&proforma.lines),
                today,
                Some(today),
                Some(proforma_id),
            )?;
            let invoice_number = emit_document(tx, &self.config, &mut invoice)?;

            for line in invoice.lines.iter_mut() {
                let Some(item_id) = line.item_id else {
                    continue;
                };
                let (movement, moved_qty) = {
                    let item = tx.state.stock_item_mut(ctx.tenant_id, item_id)?;
                    if !item.tracked {
                        continue;
                    }
                    let before = item.quantity;
                    item.deduct(line.quantity)?;
                    (
                        StockMovement::record(
                            ctx.tenant_id,
                            item_id,
                            Some(invoice_id.0),
                            MovementKind::Out,
                            line.quantity,
                            before,
                            item.quantity,
                            item.average_cost,
                            now,
                        ),
                        line.quantity,
                    )
                };
                tx.state.stock_movements.push(movement);
                line.mark_stock_moved(moved_qty)?;
            }

            let invoice_total = invoice.totals.grand_total;
            tx.state.documents.insert(invoice_id, invoice);

            record_event(
                tx,
                ctx.tenant_id,
                invoice_id.0,
                "document",
                ctx.user_id,
                &DocumentEvent::InvoiceEmitted {
                    tenant_id: ctx.tenant_id,
                    document_id: invoice_id,
                    origin_id: proforma_id,
                    full_number: invoice_number.clone(),
                    grand_total: invoice_total,
                    occurred_at: now,
                },
            )?;

            // Receipt, emitted together with the invoice.
            let receipt_id = DocumentId::new(AggregateId::new());
            let mut receipt = Document::draft(
                receipt_id,
                ctx.tenant_id,
                proforma.counterparty_id,
                DocumentType::Receipt,
                TaxOperation::Sales,
                derive_lines(&proforma.lines),
                today,
                None,
                Some(invoice_id),
            )?;
            let receipt_number = emit_document(tx, &self.config, &mut receipt)?;
            tx.state.documents.insert(receipt_id, receipt);

            record_event(
                tx,
                ctx.tenant_id,
                receipt_id.0,
                "document",
                ctx.user_id,
                &DocumentEvent::ReceiptEmitted {
                    tenant_id: ctx.tenant_id,
                    document_id: receipt_id,
                    origin_id: invoice_id,
                    full_number: receipt_number,
                    occurred_at: now,
                },
            )?;

            if let Some(escrow) = &escrow_snapshot {
                tx.state
                    .escrow_mut(ctx.tenant_id, escrow.id)?
                    .link_invoice(invoice_id);
            }

            record_event(
                tx,
                ctx.tenant_id,
                proforma_id.0,
                "document",
                ctx.user_id,
                &DocumentEvent::PaymentSettled {
                    tenant_id: ctx.tenant_id,
                    document_id: proforma_id,
                    method: method.as_str().to_string(),
                    reference: settled_reference.clone(),
                    occurred_at: now,
                },
            )?;

            tracing::info!(
                %proforma_id,
                %invoice_id,
                %receipt_id,
                method = method.as_str(),
                reference = %settled_reference,
                "payment settled"
            );
            Ok((invoice_id, receipt_id))
        })
    }

    /// Cancel an emitted/accepted document, recording reason and actor.
    ///
    /// Rejected while the document has non-cancelled dependents; rows are
    /// never deleted.
    pub fn cancel_document(
        &self,
        ctx: ActorContext,
        document_id: DocumentId,
        reason: String,
    ) -> DomainResult<()> {
        let now = self.now();
        self.execute("cancel_document", |tx| {
            let active_dependents = tx
                .state
                .dependents_of(ctx.tenant_id, document_id)
                .iter()
                .filter(|d| d.state.blocks_origin_cancellation())
                .count();
            if active_dependents > 0 {
                return Err(DomainError::state_conflict(format!(
                    "document {document_id} has {active_dependents} active dependent document(s)"
                )));
            }

            tx.state
                .document_mut(ctx.tenant_id, document_id)?
                .cancel(reason.clone(), ctx.user_id, now)?;

            record_event(
                tx,
                ctx.tenant_id,
                document_id.0,
                "document",
                ctx.user_id,
                &DocumentEvent::DocumentCancelled {
                    tenant_id: ctx.tenant_id,
                    document_id,
                    reason: reason.clone(),
                    occurred_at: now,
                },
            )?;
            tracing::info!(%document_id, "document cancelled");
            Ok(())
        })
    }

    /// Register a supplier invoice for the deductible side of the
    /// declaration. Back-dating is allowed: the paper document often arrives
    /// days after its issue date.
    pub fn record_purchase_invoice(
        &self,
        ctx: ActorContext,
        supplier_id: CounterpartyId,
        lines: Vec<LineInput>,
        issue_date: Option<NaiveDate>,
    ) -> DomainResult<(DocumentId, String)> {
        let today = self.today();
        let now = self.now();
        let issue = issue_date.unwrap_or(today);

        self.execute("record_purchase_invoice", |tx| {
            if issue > today {
                return Err(DomainError::validation(format!(
                    "purchase invoice issue date {issue} lies in the future"
                )));
            }
            let id = DocumentId::new(AggregateId::new());
            let mut doc = Document::draft(
                id,
                ctx.tenant_id,
                supplier_id,
                DocumentType::Invoice,
                TaxOperation::Purchases,
                build_lines(&lines)?,
                issue,
                None,
                None,
            )?;
            let full_number = emit_document(tx, &self.config, &mut doc)?;
            let grand_total = doc.totals.grand_total;
            tx.state.documents.insert(id, doc);

            record_event(
                tx,
                ctx.tenant_id,
                id.0,
                "document",
                ctx.user_id,
                &DocumentEvent::PurchaseInvoiceRecorded {
                    tenant_id: ctx.tenant_id,
                    document_id: id,
                    full_number: full_number.clone(),
                    grand_total,
                    occurred_at: now,
                },
            )?;
            Ok((id, full_number))
        })
    }

    /// Emit a credit note reversing an emitted invoice in full.
    ///
    /// The note enters the declaration with a negative contribution for its
    /// own period.
    pub fn issue_credit_note(
        &self,
        ctx: ActorContext,
        invoice_id: DocumentId,
        reason: String,
    ) -> DomainResult<(DocumentId, String)> {
        let today = self.today();
        let now = self.now();

        self.execute("issue_credit_note", |tx| {
            if reason.trim().is_empty() {
                return Err(DomainError::validation("credit note reason cannot be empty"));
            }
            let invoice = tx.state.document(ctx.tenant_id, invoice_id)?.clone();
            if invoice.doc_type != DocumentType::Invoice {
                return Err(DomainError::state_conflict(format!(
                    "document {invoice_id} is a {}, credit notes reverse invoices",
                    invoice.doc_type.as_str()
                )));
            }
            if !matches!(invoice.state, DocumentState::Emitted | DocumentState::Paid) {
                return Err(DomainError::state_conflict(format!(
                    "invoice {invoice_id} is {:?}, nothing to reverse",
                    invoice.state
                )));
            }
            let already_reversed = tx
                .state
                .dependents_of(ctx.tenant_id, invoice_id)
                .iter()
                .any(|d| {
                    d.doc_type == DocumentType::CreditNote && d.state.blocks_origin_cancellation()
                });
            if already_reversed {
                return Err(DomainError::state_conflict(format!(
                    "invoice {invoice_id} already has an active credit note"
                )));
            }

            let id = DocumentId::new(AggregateId::new());
            let mut note = Document::draft(
                id,
                ctx.tenant_id,
                invoice.counterparty_id,
                DocumentType::CreditNote,
                invoice.operation,
                derive_lines(&invoice.lines),
                today,
                None,
                Some(invoice_id),
            )?;
            let full_number = emit_document(tx, &self.config, &mut note)?;
            let grand_total = note.totals.grand_total;
            tx.state.documents.insert(id, note);

            // Returned goods go back on the shelf.
            let invoice_lines = invoice.lines.clone();
            for line in &invoice_lines {
                let Some(item_id) = line.item_id else {
                    continue;
                };
                if !line.stock_moved {
                    continue;
                }
                let movement = {
                    let item = tx.state.stock_item_mut(ctx.tenant_id, item_id)?;
                    let before = item.quantity;
                    item.adjust(line.quantity)?;
                    StockMovement::record(
                        ctx.tenant_id,
                        item_id,
                        Some(id.0),
                        MovementKind::Return,
                        line.quantity,
                        before,
                        item.quantity,
                        item.average_cost,
                        now,
                    )
                };
                tx.state.stock_movements.push(movement);
            }

            record_event(
                tx,
                ctx.tenant_id,
                id.0,
                "document",
                ctx.user_id,
                &DocumentEvent::CreditNoteEmitted {
                    tenant_id: ctx.tenant_id,
                    document_id: id,
                    origin_id: invoice_id,
                    full_number: full_number.clone(),
                    grand_total,
                    occurred_at: now,
                },
            )?;
            tracing::info!(%invoice_id, credit_note = %id, "credit note emitted");
            Ok((id, full_number))
        })
    }

    /// Sweep: expire open quotes whose validity date has passed.
    ///
    /// Idempotent; expired quotes no longer match the scan.
    pub fn expire_overdue_quotes(&self, now: DateTime<Utc>) -> DomainResult<usize> {
        let today = now.date_naive();
        self.execute("expire_overdue_quotes", |tx| {
            let overdue: Vec<(TenantId, DocumentId)> = tx
                .state
                .documents
                .values()
                .filter(|d| {
                    d.doc_type == DocumentType::Quote
                        && matches!(
                            d.state,
                            DocumentState::Emitted | DocumentState::Negotiating
                        )
                        && d.is_past_validity(today)
                })
                .map(|d| (d.tenant_id, d.id))
                .collect();

            for (tenant_id, id) in &overdue {
                tx.state.document_mut(*tenant_id, *id)?.mark_expired()?;
                record_event(
                    tx,
                    *tenant_id,
                    id.0,
                    "document",
                    system_actor(),
                    &DocumentEvent::QuoteExpired {
                        tenant_id: *tenant_id,
                        document_id: *id,
                        occurred_at: now,
                    },
                )?;
            }
            if !overdue.is_empty() {
                tracing::info!(count = overdue.len(), "expired overdue quotes");
            }
            Ok(overdue.len())
        })
    }

    /// Tenant-scoped document lookup.
    pub fn document(&self, ctx: ActorContext, id: DocumentId) -> DomainResult<Document> {
        self.store
            .read(|state| state.document(ctx.tenant_id, id).cloned())
    }

    /// The append-only journal of one aggregate, in version order.
    pub fn audit_trail(
        &self,
        ctx: ActorContext,
        aggregate_id: AggregateId,
    ) -> DomainResult<Vec<AuditRecord>> {
        self.store.read(|state| {
            let mut records: Vec<AuditRecord> = state
                .audit_for(ctx.tenant_id, aggregate_id)
                .into_iter()
                .cloned()
                .collect();
            records.sort_by_key(|r| r.version);
            Ok(records)
        })
    }
}
