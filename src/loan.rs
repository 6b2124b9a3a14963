//! Loan records and the time rules around them.

use odra::casper_types::U256;
use odra::prelude::*;

use crate::errors::PoolResult;
use crate::math::{self, percent, SECONDS_PER_DAY, SECONDS_PER_HOUR};

/// Time a borrower has between payments.
pub const LOAN_INTERVAL: u64 = 35 * SECONDS_PER_DAY;
/// Extra time after a missed deadline before the NFT can be auctioned.
pub const GRACE_PERIOD: u64 = 7 * SECONDS_PER_DAY;
pub const DAILY_PENALTY_PERCENT: u64 = 1;
pub const MAX_PENALTY_DAYS: u64 = 7;
/// Time for the auction price to fall from full valuation to its floor.
pub const AUCTION_TIMEFRAME: u64 = 42 * SECONDS_PER_HOUR;

#[odra::odra_type]
pub struct Loan {
    pub owner: Address,
    pub borrow_shares: U256,
    /// Asset units lent out, net of repayments.
    pub principal_tokens: U256,
    pub origin_time: u64,
    pub last_paid_time: u64,
}

impl Loan {
    pub fn new(owner: Address, borrow_shares: U256, principal_tokens: U256, now: u64) -> Self {
        Self {
            owner,
            borrow_shares,
            principal_tokens,
            origin_time: now,
            last_paid_time: now,
        }
    }

    pub fn payment_deadline(&self) -> u64 {
        self.last_paid_time.saturating_add(LOAN_INTERVAL)
    }

    pub fn is_overdue(&self, now: u64) -> bool {
        now > self.payment_deadline()
    }

    /// First moment the loan may be liquidated.
    pub fn liquidatable_at(&self) -> u64 {
        self.payment_deadline().saturating_add(GRACE_PERIOD)
    }

    /// Days past the deadline, partial days rounded up, capped at `MAX_PENALTY_DAYS`.
    pub fn late_days(&self, now: u64) -> u64 {
        if !self.is_overdue(now) {
            return 0;
        }
        let late = now - self.payment_deadline();
        late.div_ceil(SECONDS_PER_DAY).min(MAX_PENALTY_DAYS)
    }

    pub fn late_penalty(&self, value: U256, now: u64) -> PoolResult<U256> {
        let days = self.late_days(now);
        if days == 0 {
            return Ok(U256::zero());
        }
        math::wad_mul(value, percent(days * DAILY_PENALTY_PERCENT))
    }
}

/// Dutch auction price `elapsed` seconds into the auction; bottoms out at half the valuation.
pub fn auction_price(valuation: U256, elapsed: u64) -> PoolResult<U256> {
    let elapsed = elapsed.min(AUCTION_TIMEFRAME);
    let discount = math::mul_div(
        valuation,
        U256::from(elapsed),
        U256::from(2 * AUCTION_TIMEFRAME),
    )?;
    math::sub(valuation, discount)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::wad;
    use odra::casper_types::account::AccountHash;

    fn loan() -> Loan {
        let owner = Address::Account(AccountHash::new([7u8; 32]));
        Loan::new(owner, U256::from(100u64), U256::from(100u64), 1_000)
    }

    #[test]
    fn no_penalty_before_deadline() {
        let loan = loan();
        let deadline = loan.payment_deadline();
        assert_eq!(loan.late_days(deadline), 0);
        assert!(loan.late_penalty(wad(), deadline).unwrap().is_zero());
        assert!(!loan.is_overdue(deadline));
    }

    #[test]
    fn partial_late_day_counts_as_full_day() {
        let loan = loan();
        let deadline = loan.payment_deadline();
        assert_eq!(loan.late_days(deadline + 1), 1);
        assert_eq!(loan.late_days(deadline + SECONDS_PER_DAY), 1);
        assert_eq!(loan.late_days(deadline + SECONDS_PER_DAY + 1), 2);
        assert_eq!(loan.late_penalty(wad(), deadline + 1).unwrap(), percent(1));
    }

    #[test]
    fn penalty_is_capped() {
        let loan = loan();
        let much_later = loan.payment_deadline() + 30 * SECONDS_PER_DAY;
        assert_eq!(loan.late_days(much_later), MAX_PENALTY_DAYS);
        assert_eq!(loan.late_penalty(wad(), much_later).unwrap(), percent(7));
    }

    #[test]
    fn liquidation_opens_after_grace() {
        let loan = loan();
        assert_eq!(loan.liquidatable_at(), 1_000 + LOAN_INTERVAL + GRACE_PERIOD);
    }

    #[test]
    fn auction_price_decays_to_half() {
        let valuation = U256::from(1_000u64);
        assert_eq!(auction_price(valuation, 0).unwrap(), valuation);
        assert_eq!(
            auction_price(valuation, AUCTION_TIMEFRAME / 2).unwrap(),
            U256::from(750u64)
        );
        assert_eq!(
            auction_price(valuation, AUCTION_TIMEFRAME).unwrap(),
            U256::from(500u64)
        );
        assert_eq!(
            auction_price(valuation, AUCTION_TIMEFRAME * 10).unwrap(),
            U256::from(500u64)
        );
    }
}
