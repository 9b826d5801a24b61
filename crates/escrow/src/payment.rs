//! Payment-method dispatch.
//!
//! Each method implements the same capability set (process, check status,
//! handle a gateway callback) and the variant is selected by the tagged
//! enum, never by reflection. Gateway interactions are simulated; the real
//! integrations live outside this engine.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use mozfiscal_core::{DomainError, DomainResult, TenantId};
use mozfiscal_documents::DocumentId;

/// Supported settlement methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Mpesa,
    Cash,
    Card,
    Escrow,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Mpesa => "mpesa",
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::Escrow => "escrow",
        }
    }

    /// The processor variant for this method.
    pub fn processor(&self) -> &'static dyn PaymentProcessor {
        match self {
            PaymentMethod::Mpesa => &MpesaProcessor,
            PaymentMethod::Cash => &CashProcessor,
            PaymentMethod::Card => &CardProcessor,
            PaymentMethod::Escrow => &EscrowProcessor,
        }
    }
}

/// A settlement request for one proforma.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    pub tenant_id: TenantId,
    pub document_id: DocumentId,
    pub amount: Decimal,
    pub reference: Option<String>,
}

/// What processing produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// Funds are settled; invoice + receipt may be emitted.
    Settled { reference: String },
    /// Funds are held in escrow pending delivery confirmation.
    Held { reference: String },
}

impl PaymentOutcome {
    pub fn reference(&self) -> &str {
        match self {
            PaymentOutcome::Settled { reference } | PaymentOutcome::Held { reference } => reference,
        }
    }
}

/// Gateway-side view of a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Confirmed,
    Failed,
}

/// A callback from a gateway (simulated).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayEvent {
    pub reference: String,
    pub status: PaymentStatus,
}

/// The capability set every method implements.
pub trait PaymentProcessor: Send + Sync {
    fn process(&self, request: &PaymentRequest) -> DomainResult<PaymentOutcome>;
    fn check_status(&self, reference: &str) -> PaymentStatus;
    fn handle_event(&self, event: &GatewayEvent) -> PaymentStatus;
}

fn validate_amount(request: &PaymentRequest) -> DomainResult<()> {
    if request.amount <= Decimal::ZERO {
        return Err(DomainError::validation(format!(
            "payment amount must be positive, got {}",
            request.amount
        )));
    }
    Ok(())
}

fn derived_reference(prefix: &str, request: &PaymentRequest) -> String {
    match &request.reference {
        Some(r) if !r.trim().is_empty() => r.clone(),
        _ => {
            let id = request.document_id.to_string();
            let short = &id[id.len().saturating_sub(12)..];
            format!("{prefix}-{short}")
        }
    }
}

/// Simulated M-Pesa (mobile money) processor.
pub struct MpesaProcessor;

impl PaymentProcessor for MpesaProcessor {
    fn process(&self, request: &PaymentRequest) -> DomainResult<PaymentOutcome> {
        validate_amount(request)?;
        Ok(PaymentOutcome::Settled {
            reference: derived_reference("MPESA", request),
        })
    }

    fn check_status(&self, _reference: &str) -> PaymentStatus {
        PaymentStatus::Confirmed
    }

    fn handle_event(&self, event: &GatewayEvent) -> PaymentStatus {
        event.status
    }
}

/// Over-the-counter cash settlement.
pub struct CashProcessor;

impl PaymentProcessor for CashProcessor {
    fn process(&self, request: &PaymentRequest) -> DomainResult<PaymentOutcome> {
        validate_amount(request)?;
        Ok(PaymentOutcome::Settled {
            reference: derived_reference("CASH", request),
        })
    }

    fn check_status(&self, _reference: &str) -> PaymentStatus {
        // Cash has no asynchronous leg.
        PaymentStatus::Confirmed
    }

    fn handle_event(&self, _event: &GatewayEvent) -> PaymentStatus {
        PaymentStatus::Confirmed
    }
}

/// Simulated card processor.
pub struct CardProcessor;

impl PaymentProcessor for CardProcessor {
    fn process(&self, request: &PaymentRequest) -> DomainResult<PaymentOutcome> {
        validate_amount(request)?;
        Ok(PaymentOutcome::Settled {
            reference: derived_reference("CARD", request),
        })
    }

    fn check_status(&self, _reference: &str) -> PaymentStatus {
        PaymentStatus::Confirmed
    }

    fn handle_event(&self, event: &GatewayEvent) -> PaymentStatus {
        event.status
    }
}

/// Escrow-backed settlement: the engine verifies the linked escrow holds the
/// funds before invoicing, so processing reports the funds as held.
pub struct EscrowProcessor;

impl PaymentProcessor for EscrowProcessor {
    fn process(&self, request: &PaymentRequest) -> DomainResult<PaymentOutcome> {
        validate_amount(request)?;
        Ok(PaymentOutcome::Held {
            reference: derived_reference("ESCROW", request),
        })
    }

    fn check_status(&self, _reference: &str) -> PaymentStatus {
        PaymentStatus::Pending
    }

    fn handle_event(&self, event: &GatewayEvent) -> PaymentStatus {
        event.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mozfiscal_core::AggregateId;
    use rust_decimal_macros::dec;

    fn request(amount: Decimal) -> PaymentRequest {
        PaymentRequest {
            tenant_id: TenantId::new(),
            document_id: DocumentId::new(AggregateId::new()),
            amount,
            reference: None,
        }
    }

    #[test]
    fn every_method_dispatches_a_processor() {
        for method in [
            PaymentMethod::Mpesa,
            PaymentMethod::Cash,
            PaymentMethod::Card,
            PaymentMethod::Escrow,
        ] {
            let outcome = method.processor().process(&request(dec!(100))).unwrap();
            assert!(!outcome.reference().is_empty());
        }
    }

    #[test]
    fn escrow_holds_instead_of_settling() {
        let outcome = PaymentMethod::Escrow
            .processor()
            .process(&request(dec!(500)))
            .unwrap();
        assert!(matches!(outcome, PaymentOutcome::Held { .. }));
    }

    #[test]
    fn explicit_reference_wins() {
        let mut req = request(dec!(100));
        req.reference = Some("TX-000123".into());
        let outcome = PaymentMethod::Mpesa.processor().process(&req).unwrap();
        assert_eq!(outcome.reference(), "TX-000123");
    }

    #[test]
    fn non_positive_amounts_are_rejected_before_any_side_effect() {
        let err = PaymentMethod::Cash
            .processor()
            .process(&request(Decimal::ZERO))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }
}
