//! Monetary and quantity precision conventions.
//!
//! All arithmetic runs at full `Decimal` precision; only **persisted** fields
//! are rounded. Monetary fields round to 2 decimals, quantities to 3.

use rust_decimal::{Decimal, RoundingStrategy};

/// Decimal places of persisted monetary fields.
pub const MONEY_DP: u32 = 2;

/// Decimal places of persisted quantities.
pub const QUANTITY_DP: u32 = 3;

/// Round a monetary amount for persistence (half away from zero).
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// Round a quantity for persistence (half away from zero).
pub fn round_quantity(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(QUANTITY_DP, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn money_rounds_half_away_from_zero() {
        assert_eq!(round_money(dec!(1.005)), dec!(1.01));
        assert_eq!(round_money(dec!(-1.005)), dec!(-1.01));
        assert_eq!(round_money(dec!(1.004)), dec!(1.00));
    }

    #[test]
    fn quantity_keeps_three_decimals() {
        assert_eq!(round_quantity(dec!(0.1234)), dec!(0.123));
        assert_eq!(round_quantity(dec!(0.1235)), dec!(0.124));
    }
}
