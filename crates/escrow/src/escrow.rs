//! The escrow transaction state machine.
//!
//! `Pendente -> EmEscrow -> {Liberado | EmDisputa}`;
//! `EmEscrow -> Reembolsado`; `EmDisputa -> {Liberado | Reembolsado}`.
//! `Liberado` and `Reembolsado` are final.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use mozfiscal_core::{AggregateId, CounterpartyId, DomainError, DomainResult, TenantId};
use mozfiscal_documents::DocumentId;

/// Escrow transaction identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EscrowId(pub AggregateId);

impl EscrowId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for EscrowId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Escrow lifecycle states (Portuguese, as they appear on statements).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscrowState {
    Pendente,
    EmEscrow,
    Liberado,
    EmDisputa,
    Reembolsado,
}

impl EscrowState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, EscrowState::Liberado | EscrowState::Reembolsado)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EscrowState::Pendente => "pendente",
            EscrowState::EmEscrow => "em_escrow",
            EscrowState::Liberado => "liberado",
            EscrowState::EmDisputa => "em_disputa",
            EscrowState::Reembolsado => "reembolsado",
        }
    }
}

/// Manual resolution of a dispute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeOutcome {
    Release,
    Refund,
}

/// Held buyer funds linked to a proforma.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowTransaction {
    pub id: EscrowId,
    pub tenant_id: TenantId,
    pub counterparty_id: CounterpartyId,
    pub proforma_id: DocumentId,
    pub invoice_id: Option<DocumentId>,
    pub amount: Decimal,
    pub state: EscrowState,
    pub payment_reference: Option<String>,

    pub deposit_confirmed_at: Option<DateTime<Utc>>,
    pub released_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub disputed_at: Option<DateTime<Utc>>,

    pub dispute_reason: Option<String>,
    pub refund_reason: Option<String>,

    /// Set by the auto-release sweep in the same transaction as the release,
    /// so a crashed or re-run sweep never double-releases.
    pub auto_release_processed: bool,

    pub version: u64,
}

impl EscrowTransaction {
    pub fn open(
        id: EscrowId,
        tenant_id: TenantId,
        counterparty_id: CounterpartyId,
        proforma_id: DocumentId,
        amount: Decimal,
    ) -> DomainResult<Self> {
        if amount <= Decimal::ZERO {
            return Err(DomainError::validation("escrow amount must be positive"));
        }
        Ok(Self {
            id,
            tenant_id,
            counterparty_id,
            proforma_id,
            invoice_id: None,
            amount,
            state: EscrowState::Pendente,
            payment_reference: None,
            deposit_confirmed_at: None,
            released_at: None,
            refunded_at: None,
            disputed_at: None,
            dispute_reason: None,
            refund_reason: None,
            auto_release_processed: false,
            version: 0,
        })
    }

    fn conflict(&self, attempted: &str) -> DomainError {
        DomainError::state_conflict(format!(
            "escrow {} is {}, cannot {attempted}",
            self.id,
            self.state.as_str()
        ))
    }

    /// Buyer's funds arrived: `Pendente -> EmEscrow`. Anchors the
    /// auto-release window.
    pub fn confirm_deposit(&mut self, at: DateTime<Utc>, reference: impl Into<String>) -> DomainResult<()> {
        if self.state != EscrowState::Pendente {
            return Err(self.conflict("confirm deposit"));
        }
        self.state = EscrowState::EmEscrow;
        self.deposit_confirmed_at = Some(at);
        self.payment_reference = Some(reference.into());
        self.version += 1;
        Ok(())
    }

    /// Whether the funds are held and can back a settlement.
    pub fn is_funded(&self) -> bool {
        matches!(self.state, EscrowState::EmEscrow | EscrowState::EmDisputa)
    }

    /// Move the held amount into the seller's settleable balance:
    /// `EmEscrow | EmDisputa -> Liberado`.
    pub fn release(&mut self, at: DateTime<Utc>) -> DomainResult<()> {
        match self.state {
            EscrowState::EmEscrow | EscrowState::EmDisputa => {
                self.state = EscrowState::Liberado;
                self.released_at = Some(at);
                self.version += 1;
                Ok(())
            }
            _ => Err(self.conflict("release")),
        }
    }

    /// Return funds to the buyer: `EmEscrow | EmDisputa -> Reembolsado`.
    pub fn refund(&mut self, at: DateTime<Utc>, reason: impl Into<String>) -> DomainResult<()> {
        match self.state {
            EscrowState::EmEscrow | EscrowState::EmDisputa => {
                self.state = EscrowState::Reembolsado;
                self.refunded_at = Some(at);
                self.refund_reason = Some(reason.into());
                self.version += 1;
                Ok(())
            }
            _ => Err(self.conflict("refund")),
        }
    }

    /// `EmEscrow -> EmDisputa`; stops the auto-release clock.
    pub fn open_dispute(&mut self, at: DateTime<Utc>, reason: impl Into<String>) -> DomainResult<()> {
        if self.state != EscrowState::EmEscrow {
            return Err(self.conflict("open dispute"));
        }
        self.state = EscrowState::EmDisputa;
        self.disputed_at = Some(at);
        self.dispute_reason = Some(reason.into());
        self.version += 1;
        Ok(())
    }

    /// Manual resolution into either terminal state.
    pub fn resolve_dispute(
        &mut self,
        outcome: DisputeOutcome,
        at: DateTime<Utc>,
        reason: impl Into<String>,
    ) -> DomainResult<()> {
        if self.state != EscrowState::EmDisputa {
            return Err(self.conflict("resolve dispute"));
        }
        match outcome {
            DisputeOutcome::Release => self.release(at),
            DisputeOutcome::Refund => self.refund(at, reason),
        }
    }

    /// Sweep eligibility: held, undisputed, unprocessed, and the window has
    /// fully elapsed since deposit confirmation.
    pub fn eligible_for_auto_release(&self, now: DateTime<Utc>, window: Duration) -> bool {
        if self.state != EscrowState::EmEscrow || self.auto_release_processed {
            return false;
        }
        match self.deposit_confirmed_at {
            Some(confirmed) => now - confirmed >= window,
            None => false,
        }
    }

    pub fn mark_auto_release_processed(&mut self) {
        self.auto_release_processed = true;
        self.version += 1;
    }

    pub fn link_invoice(&mut self, invoice_id: DocumentId) {
        self.invoice_id = Some(invoice_id);
        self.version += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn escrow() -> EscrowTransaction {
        EscrowTransaction::open(
            EscrowId::new(AggregateId::new()),
            TenantId::new(),
            CounterpartyId::new(),
            DocumentId::new(AggregateId::new()),
            dec!(11600),
        )
        .unwrap()
    }

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn happy_path_deposit_then_release() {
        let mut e = escrow();
        e.confirm_deposit(ts("2025-03-01T10:00:00Z"), "MPESA-123").unwrap();
        assert_eq!(e.state, EscrowState::EmEscrow);

        e.release(ts("2025-03-02T09:00:00Z")).unwrap();
        assert_eq!(e.state, EscrowState::Liberado);
        assert!(e.released_at.is_some());
    }

    #[test]
    fn deposit_confirmation_is_single_shot() {
        let mut e = escrow();
        e.confirm_deposit(ts("2025-03-01T10:00:00Z"), "REF-1").unwrap();
        let err = e
            .confirm_deposit(ts("2025-03-01T11:00:00Z"), "REF-2")
            .unwrap_err();
        assert!(matches!(err, DomainError::StateConflict(_)));
        assert_eq!(e.payment_reference.as_deref(), Some("REF-1"));
    }

    #[test]
    fn release_requires_held_funds() {
        let mut e = escrow();
        let err = e.release(ts("2025-03-01T10:00:00Z")).unwrap_err();
        assert!(matches!(err, DomainError::StateConflict(_)));
    }

    #[test]
    fn terminal_states_are_final() {
        let mut e = escrow();
        e.confirm_deposit(ts("2025-03-01T10:00:00Z"), "REF").unwrap();
        e.release(ts("2025-03-02T10:00:00Z")).unwrap();

        assert!(e.release(ts("2025-03-03T10:00:00Z")).is_err());
        assert!(e.refund(ts("2025-03-03T10:00:00Z"), "x").is_err());
        assert!(e.open_dispute(ts("2025-03-03T10:00:00Z"), "x").is_err());
    }

    #[test]
    fn dispute_resolution_goes_both_ways() {
        let mut a = escrow();
        a.confirm_deposit(ts("2025-03-01T10:00:00Z"), "REF").unwrap();
        a.open_dispute(ts("2025-03-01T12:00:00Z"), "entrega incompleta").unwrap();
        assert_eq!(a.state, EscrowState::EmDisputa);
        a.resolve_dispute(DisputeOutcome::Release, ts("2025-03-02T10:00:00Z"), "")
            .unwrap();
        assert_eq!(a.state, EscrowState::Liberado);

        let mut b = escrow();
        b.confirm_deposit(ts("2025-03-01T10:00:00Z"), "REF").unwrap();
        b.open_dispute(ts("2025-03-01T12:00:00Z"), "produto errado").unwrap();
        b.resolve_dispute(DisputeOutcome::Refund, ts("2025-03-02T10:00:00Z"), "acordado")
            .unwrap();
        assert_eq!(b.state, EscrowState::Reembolsado);
        assert_eq!(b.refund_reason.as_deref(), Some("acordado"));
    }

    #[test]
    fn auto_release_window_arithmetic() {
        let mut e = escrow();
        let window = Duration::hours(48);
        assert!(!e.eligible_for_auto_release(ts("2025-03-05T10:00:00Z"), window));

        e.confirm_deposit(ts("2025-03-01T10:00:00Z"), "REF").unwrap();
        assert!(!e.eligible_for_auto_release(ts("2025-03-03T09:59:59Z"), window));
        assert!(e.eligible_for_auto_release(ts("2025-03-03T10:00:00Z"), window));

        // A dispute stops the clock.
        e.open_dispute(ts("2025-03-02T10:00:00Z"), "atraso").unwrap();
        assert!(!e.eligible_for_auto_release(ts("2025-03-10T10:00:00Z"), window));
    }
}
