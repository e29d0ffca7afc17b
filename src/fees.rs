//! Minimum transfer amount policy
//!
//! A bridge transfer pays a percentage fee. The minimum amount is chosen so
//! that the fee deducted from it still covers the asset's USD fee floor:
//!
//! ```text
//! floor      = to_lowest_denomination(min_fee_usd / price_usd, decimals)
//! multiplier = FEE_MAX_PERCENTAGE / fee_percentage
//! min_amount = floor * multiplier
//! ```

use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use num_traits::{Signed, Zero};

use crate::decimal::to_lowest_denomination;
use crate::error::FeeError;
use crate::types::{NativeAsset, FEE_MAX_PERCENTAGE};

/// Minimum amount (smallest unit of the target token) that leaves the USD
/// fee floor after the percentage fee is taken.
///
/// `target_decimals` is the precision of the token being priced, which is the
/// native asset itself or one of its wrapped forms. `price_in_usd` is always
/// the native asset's price.
///
/// Falls back to `default_min_amount` when the asset has no fee floor or the
/// price is not positive.
pub fn calculate_min_amount_with_fee(
    native_asset: &NativeAsset,
    target_decimals: u8,
    price_in_usd: &BigDecimal,
    default_min_amount: &BigInt,
) -> Result<BigInt, FeeError> {
    if native_asset.fee_percentage == 0 {
        return Err(FeeError::ZeroFeePercentage {
            chain_id: native_asset.chain_id,
            asset: native_asset.asset.clone(),
        });
    }

    let min_fee_in_usd = match &native_asset.min_fee_amount_in_usd {
        Some(fee) => fee,
        None => return Ok(default_min_amount.clone()),
    };
    if min_fee_in_usd.is_zero() {
        return Ok(BigInt::zero());
    }
    if !price_in_usd.is_positive() {
        return Ok(default_min_amount.clone());
    }

    let min_amount_in_asset = min_fee_in_usd / price_in_usd;
    let floor = to_lowest_denomination(&min_amount_in_asset, target_decimals);
    let multiplier = FEE_MAX_PERCENTAGE / native_asset.fee_percentage;

    Ok(floor * BigInt::from(multiplier))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChainId;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn native(min_fee: Option<&str>, fee_percentage: u64) -> NativeAsset {
        NativeAsset {
            chain_id: ChainId(296),
            asset: "HBAR".to_string(),
            min_fee_amount_in_usd: min_fee.map(dec),
            fee_percentage,
        }
    }

    #[test]
    fn test_one_dollar_floor_at_twenty_cents() {
        // 1 USD / 0.20 = 5 units = 500_000_000 at 8 decimals, x100 for a 1% fee
        let asset = native(Some("1"), 1_000);
        let result =
            calculate_min_amount_with_fee(&asset, 8, &dec("0.20"), &BigInt::zero()).unwrap();
        assert_eq!(result, BigInt::from(50_000_000_000u64));
    }

    #[test]
    fn test_wrapped_decimals_change_scale_not_price() {
        let asset = native(Some("1"), 1_000);
        let result =
            calculate_min_amount_with_fee(&asset, 18, &dec("0.20"), &BigInt::zero()).unwrap();
        assert_eq!(result, BigInt::from_str("500000000000000000000").unwrap());
    }

    #[test]
    fn test_ten_percent_fee_multiplier() {
        let asset = native(Some("2"), 10_000);
        let result = calculate_min_amount_with_fee(&asset, 6, &dec("1"), &BigInt::zero()).unwrap();
        // 2 units * 10^6 * (100_000 / 10_000)
        assert_eq!(result, BigInt::from(20_000_000u64));
    }

    #[test]
    fn test_zero_usd_floor_is_zero_regardless_of_price() {
        let asset = native(Some("0"), 1_000);
        let default = BigInt::from(777);
        for price in ["0", "0.0001", "1", "12345.678"] {
            let result = calculate_min_amount_with_fee(&asset, 8, &dec(price), &default).unwrap();
            assert_eq!(result, BigInt::zero(), "price {}", price);
        }
    }

    #[test]
    fn test_no_floor_uses_default() {
        let asset = native(None, 1_000);
        let result =
            calculate_min_amount_with_fee(&asset, 8, &dec("0.2"), &BigInt::from(1234)).unwrap();
        assert_eq!(result, BigInt::from(1234));
    }

    #[test]
    fn test_zero_price_uses_default() {
        let asset = native(Some("1"), 1_000);
        let result =
            calculate_min_amount_with_fee(&asset, 8, &dec("0"), &BigInt::from(99)).unwrap();
        assert_eq!(result, BigInt::from(99));
    }

    #[test]
    fn test_zero_fee_percentage_is_rejected() {
        let asset = native(Some("1"), 0);
        let err = calculate_min_amount_with_fee(&asset, 8, &dec("0.2"), &BigInt::zero()).unwrap_err();
        assert_eq!(
            err,
            FeeError::ZeroFeePercentage {
                chain_id: ChainId(296),
                asset: "HBAR".to_string()
            }
        );
    }

    #[test]
    fn test_result_is_non_negative() {
        let asset = native(Some("0.000001"), 1_000);
        let result =
            calculate_min_amount_with_fee(&asset, 0, &dec("50000"), &BigInt::zero()).unwrap();
        assert_eq!(result, BigInt::zero());
        assert!(!result.is_negative());
    }
}
