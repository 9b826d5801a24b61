//! Gap-free fiscal numbering.
//!
//! One authoritative counter row per (tenant, series, year), updated inside
//! the same unit of work as the document emission. A failed emission rolls
//! the increment back with everything else, so committed numbers are dense
//! and never reused.

use mozfiscal_core::TenantId;
use mozfiscal_documents::FiscalNumber;

use crate::store::{CounterKey, StoreState};

/// Claim the next sequence for (tenant, series, year).
///
/// Must be called from within a transaction; the returned number is only
/// durable if that transaction commits.
pub fn next_sequence(
    state: &mut StoreState,
    tenant_id: TenantId,
    series: &str,
    year: i32,
) -> u64 {
    let key = CounterKey {
        tenant_id,
        series: series.to_string(),
        year,
    };
    let counter = state.counters.entry(key).or_insert(0);
    *counter += 1;
    *counter
}

/// Claim the next sequence and render the fiscal number.
pub fn next_fiscal_number(
    state: &mut StoreState,
    tenant_id: TenantId,
    series: String,
    year: i32,
) -> FiscalNumber {
    let sequence = next_sequence(state, tenant_id, &series, year);
    FiscalNumber::new(series, year, sequence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::TxStore;
    use mozfiscal_core::{DomainError, DomainResult};

    #[test]
    fn sequences_are_dense_per_tenant_series_and_year() {
        let mut state = StoreState::default();
        let tenant = TenantId::new();
        let other = TenantId::new();

        assert_eq!(next_sequence(&mut state, tenant, "FAC", 2025), 1);
        assert_eq!(next_sequence(&mut state, tenant, "FAC", 2025), 2);
        // Independent keys do not interleave.
        assert_eq!(next_sequence(&mut state, tenant, "COT", 2025), 1);
        assert_eq!(next_sequence(&mut state, tenant, "FAC", 2026), 1);
        assert_eq!(next_sequence(&mut state, other, "FAC", 2025), 1);
        assert_eq!(next_sequence(&mut state, tenant, "FAC", 2025), 3);
    }

    #[test]
    fn failed_emission_does_not_consume_a_number() {
        let store = TxStore::new();
        let tenant = TenantId::new();

        let err = store
            .transaction(|tx| -> DomainResult<()> {
                let n = next_sequence(tx.state, tenant, "FAC", 2025);
                assert_eq!(n, 1);
                Err(DomainError::validation("emission failed after numbering"))
            })
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        // The retry gets the same number: nothing was consumed.
        let ((), _) = store
            .transaction(|tx| {
                let n = next_sequence(tx.state, tenant, "FAC", 2025);
                assert_eq!(n, 1);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn renders_the_full_number() {
        let mut state = StoreState::default();
        let tenant = TenantId::new();
        let number = next_fiscal_number(&mut state, tenant, "REC".to_string(), 2025);
        assert_eq!(number.render(), "REC/2025/00001");
    }
}
