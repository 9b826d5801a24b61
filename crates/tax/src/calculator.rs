//! Per-line tax computation.
//!
//! Arithmetic runs at full `Decimal` precision through the whole chain;
//! only the four persisted document totals are rounded, after summation.
//! Rounding per line and then summing would accumulate drift.

use rust_decimal::Decimal;

use mozfiscal_core::money::round_money;

/// Full-precision result of computing one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineComputation {
    pub gross: Decimal,
    pub discount_amount: Decimal,
    pub taxable_base: Decimal,
    pub tax_amount: Decimal,
    pub line_total: Decimal,
}

/// Persisted monetary totals of a document (2-decimal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct DocumentTotals {
    pub subtotal: Decimal,
    pub discount_total: Decimal,
    pub tax_total: Decimal,
    pub grand_total: Decimal,
}

/// Compute one line from its raw inputs.
///
/// `discount_pct` and `tax_rate` are percentages (e.g. `16` for 16%).
pub fn line_computation(
    quantity: Decimal,
    unit_price: Decimal,
    discount_pct: Decimal,
    tax_rate: Decimal,
) -> LineComputation {
    let hundred = Decimal::ONE_HUNDRED;
    let gross = quantity * unit_price;
    let discount_amount = gross * discount_pct / hundred;
    let taxable_base = gross - discount_amount;
    let tax_amount = taxable_base * tax_rate / hundred;
    let line_total = taxable_base + tax_amount;

    LineComputation {
        gross,
        discount_amount,
        taxable_base,
        tax_amount,
        line_total,
    }
}

/// Sum full-precision line computations into rounded document totals.
///
/// The grand total is derived from the same full-precision sums as the other
/// three fields, so `grand_total == subtotal - discount_total + tax_total`
/// holds to the cent for any line set and any summation order.
pub fn document_totals<'a, I>(lines: I) -> DocumentTotals
where
    I: IntoIterator<Item = &'a LineComputation>,
{
    let mut gross = Decimal::ZERO;
    let mut discount = Decimal::ZERO;
    let mut tax = Decimal::ZERO;

    for line in lines {
        gross += line.gross;
        discount += line.discount_amount;
        tax += line.tax_amount;
    }

    let subtotal = round_money(gross);
    let discount_total = round_money(discount);
    let tax_total = round_money(tax);

    DocumentTotals {
        subtotal,
        discount_total,
        tax_total,
        grand_total: subtotal - discount_total + tax_total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn computes_the_reference_line() {
        // qty 10 x 1000 @ 16%
        let line = line_computation(dec!(10), dec!(1000), Decimal::ZERO, dec!(16));
        assert_eq!(line.taxable_base, dec!(10000));
        assert_eq!(line.tax_amount, dec!(1600));
        assert_eq!(line.line_total, dec!(11600));

        let totals = document_totals([&line]);
        assert_eq!(totals.subtotal, dec!(10000.00));
        assert_eq!(totals.tax_total, dec!(1600.00));
        assert_eq!(totals.grand_total, dec!(11600.00));
    }

    #[test]
    fn applies_discount_before_tax() {
        let line = line_computation(dec!(2), dec!(150), dec!(10), dec!(16));
        // gross 300, discount 30, base 270, tax 43.2
        assert_eq!(line.discount_amount, dec!(30));
        assert_eq!(line.taxable_base, dec!(270));
        assert_eq!(line.tax_amount, dec!(43.2));
        assert_eq!(line.line_total, dec!(313.2));
    }

    #[test]
    fn fractional_quantities_keep_precision_until_the_end() {
        // 3 lines whose per-line rounded tax would drift by a cent.
        let lines = [
            line_computation(dec!(0.333), dec!(9.99), Decimal::ZERO, dec!(16)),
            line_computation(dec!(0.333), dec!(9.99), Decimal::ZERO, dec!(16)),
            line_computation(dec!(0.334), dec!(9.99), Decimal::ZERO, dec!(16)),
        ];
        let totals = document_totals(lines.iter());
        assert_eq!(
            totals.grand_total,
            totals.subtotal - totals.discount_total + totals.tax_total
        );
        // Full-precision sum: 9.99 * 16% = 1.5984 -> 1.60
        assert_eq!(totals.subtotal, dec!(9.99));
        assert_eq!(totals.tax_total, dec!(1.60));
    }

    fn arb_money() -> impl Strategy<Value = Decimal> {
        // 0.01 .. 99_999.99
        (1i64..10_000_000).prop_map(|cents| Decimal::new(cents, 2))
    }

    fn arb_quantity() -> impl Strategy<Value = Decimal> {
        // 0.001 .. 1000.000
        (1i64..1_000_000).prop_map(|mils| Decimal::new(mils, 3))
    }

    fn arb_pct() -> impl Strategy<Value = Decimal> {
        (0i64..=10_000).prop_map(|bps| Decimal::new(bps, 2))
    }

    fn arb_rate() -> impl Strategy<Value = Decimal> {
        prop_oneof![
            Just(Decimal::ZERO),
            Just(Decimal::from(5)),
            Just(Decimal::from(16)),
        ]
    }

    proptest! {
        /// §: grand_total == subtotal - discount_total + tax_total, to the
        /// cent, for arbitrary line sets and any summation order.
        #[test]
        fn totals_invariant_holds(
            raw in proptest::collection::vec(
                (arb_quantity(), arb_money(), arb_pct(), arb_rate()),
                1..12,
            )
        ) {
            let lines: Vec<LineComputation> = raw
                .iter()
                .map(|(q, p, d, r)| line_computation(*q, *p, *d, *r))
                .collect();

            let totals = document_totals(lines.iter());
            prop_assert_eq!(
                totals.grand_total,
                totals.subtotal - totals.discount_total + totals.tax_total
            );

            // Order independence.
            let mut reversed = lines.clone();
            reversed.reverse();
            let totals_rev = document_totals(reversed.iter());
            prop_assert_eq!(totals, totals_rev);
        }
    }
}
