//! Checked fixed-point helpers.
//!
//! Rates and fractions are wad values (18 decimals). Every helper reports
//! overflow, underflow and division by zero as a `PoolError` instead of
//! wrapping or panicking.

use odra::casper_types::U256;

use crate::errors::{PoolError, PoolResult};

/// 1 wad = 1e18
pub const WAD: u128 = 1_000_000_000_000_000_000;

pub const SECONDS_PER_HOUR: u64 = 3_600;
pub const SECONDS_PER_DAY: u64 = SECONDS_PER_HOUR * 24;
/// Seconds per year (365 days)
pub const SECONDS_PER_YEAR: u64 = SECONDS_PER_DAY * 365;

pub fn wad() -> U256 {
    U256::from(WAD)
}

/// Percentage expressed in wad, `percent(5)` is 5%.
pub fn percent(value: u64) -> U256 {
    U256::from(value) * U256::from(WAD / 100)
}

pub fn add(a: U256, b: U256) -> PoolResult<U256> {
    a.checked_add(b).ok_or_else(|| PoolError::ArithmeticOverflow.into())
}

pub fn sub(a: U256, b: U256) -> PoolResult<U256> {
    a.checked_sub(b).ok_or_else(|| PoolError::ArithmeticUnderflow.into())
}

pub fn mul(a: U256, b: U256) -> PoolResult<U256> {
    a.checked_mul(b).ok_or_else(|| PoolError::ArithmeticOverflow.into())
}

pub fn div(a: U256, b: U256) -> PoolResult<U256> {
    a.checked_div(b).ok_or_else(|| PoolError::DivisionByZero.into())
}

/// `a * b / denominator`, rounded down.
pub fn mul_div(a: U256, b: U256, denominator: U256) -> PoolResult<U256> {
    div(mul(a, b)?, denominator)
}

/// `a * b / denominator`, rounded up.
pub fn mul_div_up(a: U256, b: U256, denominator: U256) -> PoolResult<U256> {
    let product = mul(a, b)?;
    let quotient = div(product, denominator)?;
    if (quotient * denominator) == product {
        Ok(quotient)
    } else {
        add(quotient, U256::one())
    }
}

/// `a * b / 1e18`, rounded down.
pub fn wad_mul(a: U256, b: U256) -> PoolResult<U256> {
    mul_div(a, b, wad())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mul_div_rounds_in_requested_direction() {
        let a = U256::from(10u64);
        let b = U256::from(10u64);
        let d = U256::from(3u64);
        assert_eq!(mul_div(a, b, d).unwrap(), U256::from(33u64));
        assert_eq!(mul_div_up(a, b, d).unwrap(), U256::from(34u64));
        assert_eq!(mul_div_up(a, d, U256::from(5u64)).unwrap(), U256::from(6u64));
    }

    #[test]
    fn faults_are_reported_not_wrapped() {
        assert_eq!(
            sub(U256::one(), U256::from(2u64)).unwrap_err(),
            PoolError::ArithmeticUnderflow.into()
        );
        assert_eq!(
            mul(U256::MAX, U256::from(2u64)).unwrap_err(),
            PoolError::ArithmeticOverflow.into()
        );
        assert_eq!(
            mul_div(U256::one(), U256::one(), U256::zero()).unwrap_err(),
            PoolError::DivisionByZero.into()
        );
    }

    #[test]
    fn percent_is_wad_scaled() {
        assert_eq!(percent(50), wad() / U256::from(2u64));
        assert_eq!(wad_mul(percent(50), U256::from(200u64)).unwrap(), U256::from(100u64));
    }
}
