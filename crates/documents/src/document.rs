//! The document entity and its state-machine guards.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use mozfiscal_core::money::{round_money, round_quantity};
use mozfiscal_core::{AggregateId, CounterpartyId, DomainError, DomainResult, TenantId, UserId};
use mozfiscal_inventory::StockItemId;
use mozfiscal_tax::{document_totals, line_computation, DocumentTotals, IvaBracket, TaxOperation};

use crate::numbering::FiscalNumber;
use crate::transition::transition_allowed;

/// Document identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub AggregateId);

impl DocumentId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Line identifier; with the document id it forms the stock idempotency key.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineId(pub AggregateId);

impl LineId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for LineId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Commercial document types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Quote,
    Proforma,
    Invoice,
    Receipt,
    CreditNote,
    DebitNote,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Quote => "quote",
            DocumentType::Proforma => "proforma",
            DocumentType::Invoice => "invoice",
            DocumentType::Receipt => "receipt",
            DocumentType::CreditNote => "credit_note",
            DocumentType::DebitNote => "debit_note",
        }
    }

    /// Default series code used in the fiscal full number.
    pub fn default_series(&self) -> &'static str {
        match self {
            DocumentType::Quote => "COT",
            DocumentType::Proforma => "PPF",
            DocumentType::Invoice => "FAC",
            DocumentType::Receipt => "REC",
            DocumentType::CreditNote => "NCR",
            DocumentType::DebitNote => "NDB",
        }
    }

    /// Types whose settled documents enter the periodic declaration.
    pub fn is_taxable(&self) -> bool {
        matches!(
            self,
            DocumentType::Invoice | DocumentType::CreditNote | DocumentType::DebitNote
        )
    }

    /// Credit notes contribute negatively to the declaration accumulators.
    pub fn declaration_sign(&self) -> Decimal {
        match self {
            DocumentType::CreditNote => Decimal::NEGATIVE_ONE,
            _ => Decimal::ONE,
        }
    }
}

/// Document lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentState {
    Draft,
    Pending,
    Emitted,
    Negotiating,
    Accepted,
    Rejected,
    Paid,
    Cancelled,
    Expired,
}

impl DocumentState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DocumentState::Rejected
                | DocumentState::Paid
                | DocumentState::Cancelled
                | DocumentState::Expired
        )
    }

    /// States that count as "active" when checking a document's dependents
    /// before cancellation.
    pub fn blocks_origin_cancellation(&self) -> bool {
        !matches!(self, DocumentState::Cancelled)
    }
}

/// How a proforma expects to be settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentCondition {
    Immediate,
    Credit { days: u32 },
    Escrow,
}

impl Default for PaymentCondition {
    fn default() -> Self {
        PaymentCondition::Immediate
    }
}

/// Raw line input carried by workflow commands (quotes, counter-offers).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineInput {
    pub item_id: Option<StockItemId>,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub discount_pct: Decimal,
    pub tax_rate: Decimal,
}

impl LineInput {
    pub fn validate(&self) -> DomainResult<()> {
        if self.description.trim().is_empty() {
            return Err(DomainError::validation("line description cannot be empty"));
        }
        if self.quantity <= Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "quantity must be positive, got {}",
                self.quantity
            )));
        }
        if self.unit_price <= Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "unit price must be positive, got {}",
                self.unit_price
            )));
        }
        if self.discount_pct < Decimal::ZERO || self.discount_pct > Decimal::ONE_HUNDRED {
            return Err(DomainError::validation(format!(
                "discount percentage must be within 0..=100, got {}",
                self.discount_pct
            )));
        }
        if IvaBracket::from_rate(self.tax_rate).is_none() {
            return Err(DomainError::validation(format!(
                "unknown IVA rate {} (expected 16, 5 or 0)",
                self.tax_rate
            )));
        }
        Ok(())
    }
}

/// A line owned exclusively by one document.
///
/// Raw inputs (quantity, price, percentages) are kept at capture precision so
/// totals can always be recomputed without accumulating rounding drift; the
/// monetary fields are the rounded persisted values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentLine {
    pub line_id: LineId,
    pub item_id: Option<StockItemId>,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub discount_pct: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub line_total: Decimal,
    /// Stock idempotency: flips to `true` at most once, in the transaction
    /// that records the OUT movement.
    pub stock_moved: bool,
    pub moved_quantity: Option<Decimal>,
}

impl DocumentLine {
    pub fn from_input(line_id: LineId, input: LineInput) -> DomainResult<Self> {
        input.validate()?;
        let computed = line_computation(
            input.quantity,
            input.unit_price,
            input.discount_pct,
            input.tax_rate,
        );
        Ok(Self {
            line_id,
            item_id: input.item_id,
            description: input.description,
            quantity: round_quantity(input.quantity),
            unit_price: input.unit_price,
            discount_pct: input.discount_pct,
            tax_rate: input.tax_rate,
            tax_amount: round_money(computed.tax_amount),
            line_total: round_money(computed.line_total),
            stock_moved: false,
            moved_quantity: None,
        })
    }

    /// Flip the stock flag. A line moves stock at most once.
    pub fn mark_stock_moved(&mut self, quantity: Decimal) -> DomainResult<()> {
        if self.stock_moved {
            return Err(DomainError::state_conflict(format!(
                "line {} already moved stock",
                self.line_id
            )));
        }
        self.stock_moved = true;
        self.moved_quantity = Some(round_quantity(quantity));
        Ok(())
    }
}

/// Counter-offer record appended while a quote is being negotiated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiationRecord {
    pub proposed_by: UserId,
    pub lines: Vec<LineInput>,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Cancellation metadata; cancellation never deletes rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancellationInfo {
    pub reason: String,
    pub actor: UserId,
    pub cancelled_at: DateTime<Utc>,
}

/// The central entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub tenant_id: TenantId,
    pub counterparty_id: CounterpartyId,
    pub doc_type: DocumentType,
    pub state: DocumentState,
    pub operation: TaxOperation,

    /// Assigned exactly once, at emission.
    pub fiscal_number: Option<FiscalNumber>,
    pub fiscal_hash: Option<String>,
    pub qr_payload: Option<String>,

    pub issue_date: NaiveDate,
    /// Validity date for quotes, due date for proformas/invoices.
    pub valid_until: Option<NaiveDate>,

    /// The document this one was generated from (conversion chain). A
    /// document may only reference a strictly earlier one, so the chain is
    /// acyclic by construction.
    pub origin: Option<DocumentId>,

    pub payment_condition: Option<PaymentCondition>,
    pub lines: Vec<DocumentLine>,
    pub totals: DocumentTotals,

    pub negotiations: Vec<NegotiationRecord>,
    pub cancellation: Option<CancellationInfo>,

    /// Optimistic concurrency counter, bumped on every state mutation.
    pub version: u64,
}

impl Document {
    /// Create a draft document from validated line inputs.
    #[allow(clippy::too_many_arguments)]
    pub fn draft(
        id: DocumentId,
        tenant_id: TenantId,
        counterparty_id: CounterpartyId,
        doc_type: DocumentType,
        operation: TaxOperation,
        lines: Vec<DocumentLine>,
        issue_date: NaiveDate,
        valid_until: Option<NaiveDate>,
        origin: Option<DocumentId>,
    ) -> DomainResult<Self> {
        if lines.is_empty() {
            return Err(DomainError::validation("document must have at least one line"));
        }

        let mut doc = Self {
            id,
            tenant_id,
            counterparty_id,
            doc_type,
            state: DocumentState::Draft,
            operation,
            fiscal_number: None,
            fiscal_hash: None,
            qr_payload: None,
            issue_date,
            valid_until,
            origin,
            payment_condition: None,
            lines,
            totals: DocumentTotals::default(),
            negotiations: Vec::new(),
            cancellation: None,
            version: 0,
        };
        doc.recompute_totals();
        Ok(doc)
    }

    /// Recompute the four persisted totals from the raw line inputs.
    ///
    /// Totals are derived, never trusted from the caller; every persist path
    /// goes through here.
    pub fn recompute_totals(&mut self) {
        let computations: Vec<_> = self
            .lines
            .iter()
            .map(|l| line_computation(l.quantity, l.unit_price, l.discount_pct, l.tax_rate))
            .collect();
        self.totals = document_totals(computations.iter());
    }

    pub fn has_fiscal_number(&self) -> bool {
        self.fiscal_number.is_some()
    }

    pub fn full_number(&self) -> Option<String> {
        self.fiscal_number.as_ref().map(FiscalNumber::render)
    }

    fn ensure_transition(&self, to: DocumentState) -> DomainResult<()> {
        if !transition_allowed(self.doc_type, self.state, to) {
            return Err(DomainError::state_conflict(format!(
                "{} {} cannot move from {:?} to {to:?}",
                self.doc_type.as_str(),
                self.id,
                self.state
            )));
        }
        Ok(())
    }

    fn move_to(&mut self, to: DocumentState) -> DomainResult<()> {
        self.ensure_transition(to)?;
        self.state = to;
        self.version += 1;
        Ok(())
    }

    /// Emission: assign the fiscal identity exactly once and make the
    /// document visible to the counterparty.
    pub fn emit(&mut self, number: FiscalNumber, hash: String, qr: String) -> DomainResult<()> {
        if self.has_fiscal_number() {
            return Err(DomainError::state_conflict(format!(
                "document {} already carries fiscal number {}",
                self.id,
                self.full_number().unwrap_or_default()
            )));
        }
        self.ensure_transition(DocumentState::Emitted)?;
        self.recompute_totals();
        self.fiscal_number = Some(number);
        self.state = DocumentState::Emitted;
        self.fiscal_hash = Some(hash);
        self.qr_payload = Some(qr);
        self.version += 1;
        Ok(())
    }

    /// Quote acceptance guard: state and validity date.
    pub fn ensure_acceptable(&self, today: NaiveDate) -> DomainResult<()> {
        if self.doc_type != DocumentType::Quote {
            return Err(DomainError::state_conflict(format!(
                "document {} is a {}, not a quote",
                self.id,
                self.doc_type.as_str()
            )));
        }
        self.ensure_transition(DocumentState::Accepted)?;
        if let Some(valid_until) = self.valid_until {
            if today > valid_until {
                return Err(DomainError::expired(format!(
                    "quote {} validity ended {valid_until}",
                    self.id
                )));
            }
        }
        Ok(())
    }

    pub fn is_past_validity(&self, today: NaiveDate) -> bool {
        self.valid_until.is_some_and(|v| today > v)
    }

    pub fn mark_accepted(&mut self) -> DomainResult<()> {
        self.move_to(DocumentState::Accepted)
    }

    pub fn mark_rejected(&mut self) -> DomainResult<()> {
        self.move_to(DocumentState::Rejected)
    }

    pub fn mark_expired(&mut self) -> DomainResult<()> {
        self.move_to(DocumentState::Expired)
    }

    pub fn mark_paid(&mut self) -> DomainResult<()> {
        self.move_to(DocumentState::Paid)
    }

    /// Record a counter-offer: state moves to (or stays in) `Negotiating`,
    /// totals untouched until the seller resolves it.
    pub fn record_counter_offer(&mut self, record: NegotiationRecord) -> DomainResult<()> {
        for line in &record.lines {
            line.validate()?;
        }
        self.ensure_transition(DocumentState::Negotiating)?;
        self.negotiations.push(record);
        self.state = DocumentState::Negotiating;
        self.version += 1;
        Ok(())
    }

    /// Replace the line set with the resolved counter-offer and recompute.
    pub fn revise_lines(&mut self, lines: Vec<DocumentLine>) -> DomainResult<()> {
        if lines.is_empty() {
            return Err(DomainError::validation("document must have at least one line"));
        }
        if self.state != DocumentState::Negotiating {
            return Err(DomainError::state_conflict(format!(
                "document {} has no open negotiation to resolve",
                self.id
            )));
        }
        self.lines = lines;
        self.recompute_totals();
        self.version += 1;
        Ok(())
    }

    /// Cancellation escape hatch. Dependent-document checks happen in the
    /// engine, which can see the rest of the chain.
    pub fn cancel(&mut self, reason: String, actor: UserId, at: DateTime<Utc>) -> DomainResult<()> {
        if reason.trim().is_empty() {
            return Err(DomainError::validation("cancellation reason cannot be empty"));
        }
        self.move_to(DocumentState::Cancelled)?;
        self.cancellation = Some(CancellationInfo {
            reason,
            actor,
            cancelled_at: at,
        });
        Ok(())
    }

    /// Whether this settled document enters the declaration for its period.
    pub fn counts_for_declaration(&self) -> bool {
        self.doc_type.is_taxable()
            && matches!(self.state, DocumentState::Emitted | DocumentState::Paid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn line(qty: Decimal, price: Decimal, rate: Decimal) -> DocumentLine {
        DocumentLine::from_input(
            LineId::new(AggregateId::new()),
            LineInput {
                item_id: None,
                description: "Serviço de consultoria".into(),
                quantity: qty,
                unit_price: price,
                discount_pct: Decimal::ZERO,
                tax_rate: rate,
            },
        )
        .unwrap()
    }

    fn quote(lines: Vec<DocumentLine>) -> Document {
        Document::draft(
            DocumentId::new(AggregateId::new()),
            TenantId::new(),
            CounterpartyId::new(),
            DocumentType::Quote,
            TaxOperation::Sales,
            lines,
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            Some(NaiveDate::from_ymd_opt(2025, 3, 31).unwrap()),
            None,
        )
        .unwrap()
    }

    fn emitted_quote() -> Document {
        let mut doc = quote(vec![line(dec!(10), dec!(1000), dec!(16))]);
        let number = FiscalNumber::new("COT", 2025, 1);
        doc.emit(number, "hash".into(), "qr".into()).unwrap();
        doc
    }

    #[test]
    fn draft_rejects_empty_line_set() {
        let err = Document::draft(
            DocumentId::new(AggregateId::new()),
            TenantId::new(),
            CounterpartyId::new(),
            DocumentType::Quote,
            TaxOperation::Sales,
            vec![],
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn line_input_validation_catches_bad_values() {
        let mut input = LineInput {
            item_id: None,
            description: "x".into(),
            quantity: dec!(1),
            unit_price: dec!(10),
            discount_pct: Decimal::ZERO,
            tax_rate: dec!(16),
        };
        assert!(input.validate().is_ok());

        input.quantity = Decimal::ZERO;
        assert!(input.validate().is_err());
        input.quantity = dec!(1);

        input.unit_price = dec!(-5);
        assert!(input.validate().is_err());
        input.unit_price = dec!(10);

        input.tax_rate = dec!(21);
        assert!(input.validate().is_err());
    }

    #[test]
    fn emit_assigns_number_exactly_once() {
        let mut doc = quote(vec![line(dec!(10), dec!(1000), dec!(16))]);
        assert_eq!(doc.state, DocumentState::Draft);

        doc.emit(FiscalNumber::new("COT", 2025, 1), "h".into(), "q".into())
            .unwrap();
        assert_eq!(doc.state, DocumentState::Emitted);
        assert_eq!(doc.full_number().unwrap(), "COT/2025/00001");
        assert_eq!(doc.totals.grand_total, dec!(11600.00));

        let err = doc
            .emit(FiscalNumber::new("COT", 2025, 2), "h".into(), "q".into())
            .unwrap_err();
        assert!(matches!(err, DomainError::StateConflict(_)));
        assert_eq!(doc.full_number().unwrap(), "COT/2025/00001");
    }

    #[test]
    fn accept_past_validity_is_expired() {
        let doc = emitted_quote();
        let err = doc
            .ensure_acceptable(NaiveDate::from_ymd_opt(2025, 4, 1).unwrap())
            .unwrap_err();
        assert!(matches!(err, DomainError::Expired(_)));

        doc.ensure_acceptable(NaiveDate::from_ymd_opt(2025, 3, 31).unwrap())
            .unwrap();
    }

    #[test]
    fn counter_offer_keeps_totals_until_resolved() {
        let mut doc = emitted_quote();
        let before = doc.totals;

        doc.record_counter_offer(NegotiationRecord {
            proposed_by: UserId::new(),
            lines: vec![LineInput {
                item_id: None,
                description: "Serviço de consultoria".into(),
                quantity: dec!(10),
                unit_price: dec!(900),
                discount_pct: Decimal::ZERO,
                tax_rate: dec!(16),
            }],
            note: Some("contraproposta".into()),
            occurred_at: Utc::now(),
        })
        .unwrap();

        assert_eq!(doc.state, DocumentState::Negotiating);
        assert_eq!(doc.totals, before);
        assert_eq!(doc.negotiations.len(), 1);

        doc.revise_lines(vec![line(dec!(10), dec!(900), dec!(16))])
            .unwrap();
        doc.mark_accepted().unwrap();
        assert_eq!(doc.totals.grand_total, dec!(10440.00));
    }

    #[test]
    fn cancel_records_metadata_and_blocks_further_moves() {
        let mut doc = emitted_quote();
        let actor = UserId::new();
        doc.cancel("emitida por engano".into(), actor, Utc::now())
            .unwrap();

        assert_eq!(doc.state, DocumentState::Cancelled);
        let info = doc.cancellation.as_ref().unwrap();
        assert_eq!(info.actor, actor);

        assert!(doc.mark_accepted().is_err());
    }

    #[test]
    fn stock_flag_flips_once() {
        let mut doc = emitted_quote();
        doc.lines[0].mark_stock_moved(dec!(10)).unwrap();
        assert!(doc.lines[0].stock_moved);
        assert_eq!(doc.lines[0].moved_quantity, Some(dec!(10)));

        let err = doc.lines[0].mark_stock_moved(dec!(10)).unwrap_err();
        assert!(matches!(err, DomainError::StateConflict(_)));
    }

    #[test]
    fn totals_are_recomputed_not_trusted() {
        let mut doc = quote(vec![line(dec!(2), dec!(100), dec!(16))]);
        // Tamper with the stored totals; any persist path recomputes.
        doc.totals.grand_total = dec!(1.00);
        doc.recompute_totals();
        assert_eq!(doc.totals.grand_total, dec!(232.00));
        assert_eq!(
            doc.totals.grand_total,
            doc.totals.subtotal - doc.totals.discount_total + doc.totals.tax_total
        );
    }
}
