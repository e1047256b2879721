use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::model::DateRange;

/// Pricing class derived from the caller's authentication state. How the tier
/// was derived is the auth collaborator's business; the calculator only
/// applies it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Tier {
    #[default]
    Standard,
    /// Verified-identity callers get a fixed 15% reduction on the nightly rate.
    Discounted,
}

/// 0.85 as an exact decimal.
const DISCOUNT_FACTOR: Decimal = Decimal::from_parts(85, 0, 0, false, 2);

/// Nightly rate after the tier discount. The discount applies to the rate,
/// not the final total, so rounding cannot compound across nights.
pub fn tier_rate(rate: Decimal, tier: Tier) -> Decimal {
    match tier {
        Tier::Standard => rate,
        Tier::Discounted => rate * DISCOUNT_FACTOR,
    }
}

/// Total price for a stay: tier-adjusted rate × nights, rounded to two
/// decimal places, midpoint away from zero (round-half-up for currency).
pub fn quote(rate: Decimal, range: &DateRange, tier: Tier) -> Decimal {
    let total = tier_rate(rate, tier) * Decimal::from(range.nights());
    total.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Tier-adjusted rate as displayed by search results, rounded to cents.
pub fn display_rate(rate: Decimal, tier: Tier) -> Decimal {
    tier_rate(rate, tier).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
