//! Conversion helpers shared by the repository models.

use num_traits::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

/// Currency amounts are stored as SQLite REALs (matching the legacy numeric
/// fields); domain arithmetic happens in `Decimal`. Four places is enough to
/// hold any legacy cents value without float noise.
pub(crate) fn to_decimal(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or_default().round_dp(4)
}

pub(crate) fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or_default()
}
