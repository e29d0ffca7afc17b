//! Conversions between human-readable decimal amounts and integer
//! smallest-unit amounts.

use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use num_traits::pow;

/// `10^exp` as an integer
fn ten_pow(exp: u32) -> BigInt {
    pow(BigInt::from(10u8), exp as usize)
}

/// Scale `amount` by `10^decimals` and truncate the fractional part.
///
/// Truncation is toward zero, so `0.999` at 0 decimals is `0`.
pub fn to_lowest_denomination(amount: &BigDecimal, decimals: u8) -> BigInt {
    let scaled = amount * &BigDecimal::new(ten_pow(decimals as u32), 0);
    let (int_value, _) = scaled.with_scale(0).into_bigint_and_exponent();
    int_value
}

/// Rescale an integer amount from `current_decimals` to `target_decimals`.
///
/// Downscaling uses integer division and drops the remainder, so it can
/// return zero for small amounts crossing a large decimal gap.
pub fn to_target_amount(current_decimals: u8, target_decimals: u8, amount: &BigInt) -> BigInt {
    if current_decimals > target_decimals {
        amount / ten_pow((current_decimals - target_decimals) as u32)
    } else if current_decimals < target_decimals {
        amount * ten_pow((target_decimals - current_decimals) as u32)
    } else {
        amount.clone()
    }
}
