//! Conversion from a human-denominated token amount to base units.

use crate::error::TransferError;

/// Scale `human` whole tokens by the mint's decimal precision.
///
/// The result is exact or an error; nothing is truncated. A mint with 6
/// decimals turns `100_000` into `100_000_000_000`.
pub fn scale_amount(human: u64, decimals: u8) -> Result<u64, TransferError> {
    if human == 0 {
        return Err(TransferError::InvalidRequest(
            "amount must be greater than zero".into(),
        ));
    }

    let overflow = || TransferError::AmountOverflow {
        amount: human,
        decimals,
    };

    let factor = 10u64.checked_pow(u32::from(decimals)).ok_or_else(overflow)?;
    human.checked_mul(factor).ok_or_else(overflow)
}

/// Render base units back as a decimal string, for display only.
pub fn format_base_units(base_units: u64, decimals: u8) -> String {
    if decimals == 0 {
        return base_units.to_string();
    }
    let digits = format!("{:0>width$}", base_units, width = decimals as usize + 1);
    let (whole, frac) = digits.split_at(digits.len() - decimals as usize);
    let frac = frac.trim_end_matches('0');
    if frac.is_empty() {
        whole.to_string()
    } else {
        format!("{}.{}", whole, frac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scales_fixed_amount_with_six_decimals() {
        assert_eq!(scale_amount(100_000, 6).unwrap(), 100_000_000_000);
    }

    #[test]
    fn scaling_is_exact_for_all_supported_decimals() {
        for decimals in 0u8..=18 {
            let expected = 10u128.pow(u32::from(decimals));
            assert_eq!(u128::from(scale_amount(1, decimals).unwrap()), expected);
        }
        assert_eq!(scale_amount(18, 18).unwrap(), 18_000_000_000_000_000_000);
    }

    #[test]
    fn zero_amount_is_rejected() {
        assert!(matches!(
            scale_amount(0, 6),
            Err(TransferError::InvalidRequest(_))
        ));
    }

    #[test]
    fn product_overflow_fails_fast() {
        let err = scale_amount(100_000, 18).unwrap_err();
        assert!(matches!(
            err,
            TransferError::AmountOverflow {
                amount: 100_000,
                decimals: 18
            }
        ));
    }

    #[test]
    fn factor_overflow_fails_fast() {
        assert!(matches!(
            scale_amount(1, 20),
            Err(TransferError::AmountOverflow { .. })
        ));
    }

    #[test]
    fn formats_base_units() {
        assert_eq!(format_base_units(100_000_000_000, 6), "100000");
        assert_eq!(format_base_units(1_500_000, 6), "1.5");
        assert_eq!(format_base_units(5, 3), "0.005");
        assert_eq!(format_base_units(42, 0), "42");
    }
}
