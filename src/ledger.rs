//! Pseudo-balance ledger.
//!
//! Tracks what the pool really holds, what it is owed, and the share supplies
//! that split both between depositors and borrowers. The accounting identity
//!
//! `pseudo_total_tokens = 1 + total_pool + total_tokens_due + bad_debt`
//!
//! holds after every operation, up to rounding dust. Bad debt stays inside the
//! pseudo-total as a claim that future profit has to make real, so profit
//! absorbed by bad debt does not grow the pseudo-total again.

use odra::casper_types::U256;
use odra::prelude::*;

use crate::errors::{PoolError, PoolResult};
use crate::math::{self, SECONDS_PER_YEAR};

/// Initial value of the pseudo-total and both share supplies.
pub const BASE_UNIT: u64 = 1;

#[odra::odra_type]
pub struct PoolLedger {
    /// Asset units physically held by the pool.
    pub total_pool: U256,
    /// Pool value including interest not yet paid back.
    pub pseudo_total_tokens: U256,
    /// Outstanding principal plus accrued interest of all open loans.
    pub total_tokens_due: U256,
    pub total_borrow_shares: U256,
    /// Denominator of depositor claims, internal and tokenised alike.
    pub total_internal_shares: U256,
    pub bad_debt: U256,
    /// Seconds.
    pub last_interaction: u64,
}

/// How a profit amount was split.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProfitSplit {
    /// Part that cleared bad debt.
    pub absorbed: U256,
    /// Part that grew the pool value.
    pub distributed: U256,
    /// Shares minted to the fee destination for `distributed`.
    pub fee_shares: U256,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Realization {
    pub interest: U256,
    pub profit: ProfitSplit,
}

/// Outcome of closing a loan through liquidation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Reconciliation {
    pub shortfall: U256,
    pub profit: ProfitSplit,
}

impl PoolLedger {
    pub fn new(now: u64) -> Self {
        Self {
            total_pool: U256::zero(),
            pseudo_total_tokens: U256::from(BASE_UNIT),
            total_tokens_due: U256::zero(),
            total_borrow_shares: U256::from(BASE_UNIT),
            total_internal_shares: U256::from(BASE_UNIT),
            bad_debt: U256::zero(),
            last_interaction: now,
        }
    }

    /// `total_tokens_due` over `pseudo_total_tokens`, in wad.
    pub fn utilisation(&self) -> PoolResult<U256> {
        if self.pseudo_total_tokens.is_zero() {
            return Ok(U256::zero());
        }
        math::mul_div(self.total_tokens_due, math::wad(), self.pseudo_total_tokens)
    }

    /// Accrues interest since the last interaction and distributes it.
    ///
    /// Calling it twice at the same timestamp changes nothing.
    pub fn realize(&mut self, now: u64, borrow_rate: U256, fee: U256) -> PoolResult<Realization> {
        if now <= self.last_interaction {
            return Ok(Realization::default());
        }
        let elapsed = U256::from(now - self.last_interaction);
        self.last_interaction = now;

        let interest = math::mul_div(
            math::mul(borrow_rate, self.total_tokens_due)?,
            elapsed,
            math::mul(U256::from(SECONDS_PER_YEAR), math::wad())?,
        )?;
        if interest.is_zero() {
            return Ok(Realization::default());
        }

        self.total_tokens_due = math::add(self.total_tokens_due, interest)?;
        let profit = self.distribute_profit(interest, fee)?;
        Ok(Realization { interest, profit })
    }

    /// Clears bad debt first; only what is left grows the pool and pays the fee.
    pub fn distribute_profit(&mut self, amount: U256, fee: U256) -> PoolResult<ProfitSplit> {
        let absorbed = amount.min(self.bad_debt);
        self.bad_debt = math::sub(self.bad_debt, absorbed)?;

        let distributed = math::sub(amount, absorbed)?;
        if distributed.is_zero() {
            return Ok(ProfitSplit {
                absorbed,
                ..Default::default()
            });
        }
        self.pseudo_total_tokens = math::add(self.pseudo_total_tokens, distributed)?;

        let fee_amount = math::wad_mul(distributed, fee)?;
        let fee_shares = if fee_amount.is_zero() {
            U256::zero()
        } else {
            math::mul_div(
                fee_amount,
                self.total_internal_shares,
                math::sub(self.pseudo_total_tokens, fee_amount)?,
            )?
        };
        self.total_internal_shares = math::add(self.total_internal_shares, fee_shares)?;

        Ok(ProfitSplit {
            absorbed,
            distributed,
            fee_shares,
        })
    }

    /// Shares a deposit of `amount` is worth at the current pseudo-total.
    pub fn calculate_deposit_shares(&self, amount: U256) -> PoolResult<U256> {
        math::mul_div(amount, self.total_internal_shares, self.pseudo_total_tokens)
    }

    /// Asset units `shares` redeem for at the current pseudo-total.
    pub fn calculate_withdraw_amount(&self, shares: U256) -> PoolResult<U256> {
        math::mul_div(shares, self.pseudo_total_tokens, self.total_internal_shares)
    }

    pub fn deposit(&mut self, amount: U256) -> PoolResult<U256> {
        let shares = self.calculate_deposit_shares(amount)?;
        if shares.is_zero() {
            return Err(PoolError::ZeroAmount.into());
        }
        self.total_pool = math::add(self.total_pool, amount)?;
        self.pseudo_total_tokens = math::add(self.pseudo_total_tokens, amount)?;
        self.total_internal_shares = math::add(self.total_internal_shares, shares)?;
        Ok(shares)
    }

    pub fn withdraw(&mut self, shares: U256) -> PoolResult<U256> {
        let amount = self.calculate_withdraw_amount(shares)?;
        if amount > self.total_pool {
            return Err(PoolError::InsufficientLiquidity.into());
        }
        self.total_pool = math::sub(self.total_pool, amount)?;
        self.pseudo_total_tokens = math::sub(self.pseudo_total_tokens, amount)?;
        self.total_internal_shares = math::sub(self.total_internal_shares, shares)?;
        Ok(amount)
    }

    fn outstanding_borrow_shares(&self) -> PoolResult<U256> {
        math::sub(self.total_borrow_shares, U256::from(BASE_UNIT))
    }

    /// Current debt, in asset units, carried by `shares` borrow shares.
    pub fn loan_tokens(&self, shares: U256) -> PoolResult<U256> {
        let outstanding = self.outstanding_borrow_shares()?;
        if outstanding.is_zero() {
            return Ok(U256::zero());
        }
        // the last open loan owns the whole due total
        if shares == outstanding {
            return Ok(self.total_tokens_due);
        }
        math::mul_div(shares, self.total_tokens_due, outstanding)
    }

    /// Hands `amount` out as a loan and returns the borrow shares minted for it.
    pub fn borrow(&mut self, amount: U256) -> PoolResult<U256> {
        if amount > self.total_pool {
            return Err(PoolError::InsufficientLiquidity.into());
        }
        let outstanding = self.outstanding_borrow_shares()?;
        let shares = if self.total_tokens_due.is_zero() || outstanding.is_zero() {
            amount
        } else {
            math::mul_div_up(amount, outstanding, self.total_tokens_due)?
        };
        self.total_pool = math::sub(self.total_pool, amount)?;
        self.total_tokens_due = math::add(self.total_tokens_due, amount)?;
        self.total_borrow_shares = math::add(self.total_borrow_shares, shares)?;
        Ok(shares)
    }

    /// Pays back `tokens` of debt and returns the borrow shares burned.
    /// Never burns every share of a loan holding `loan_shares`.
    pub fn repay_partial(&mut self, tokens: U256, loan_shares: U256) -> PoolResult<U256> {
        let outstanding = self.outstanding_borrow_shares()?;
        let shares = math::mul_div(tokens, outstanding, self.total_tokens_due)?;
        if shares >= loan_shares {
            return Err(PoolError::ArithmeticUnderflow.into());
        }
        self.total_pool = math::add(self.total_pool, tokens)?;
        self.total_tokens_due = math::sub(self.total_tokens_due, tokens)?;
        self.total_borrow_shares = math::sub(self.total_borrow_shares, shares)?;
        Ok(shares)
    }

    /// Closes a loan of `shares` worth `tokens` that was paid back in full.
    pub fn repay_full(&mut self, shares: U256, tokens: U256) -> PoolResult<()> {
        self.total_pool = math::add(self.total_pool, tokens)?;
        self.total_tokens_due = math::sub(self.total_tokens_due, tokens)?;
        self.total_borrow_shares = math::sub(self.total_borrow_shares, shares)?;
        Ok(())
    }

    /// Takes in a late penalty; it is profit and never touched the debt.
    pub fn collect_penalty(&mut self, amount: U256, fee: U256) -> PoolResult<ProfitSplit> {
        if amount.is_zero() {
            return Ok(ProfitSplit::default());
        }
        self.total_pool = math::add(self.total_pool, amount)?;
        self.distribute_profit(amount, fee)
    }

    /// Closes a loan of `shares` worth `owed` with `proceeds` from its auction.
    pub fn liquidate(
        &mut self,
        shares: U256,
        owed: U256,
        proceeds: U256,
        fee: U256,
    ) -> PoolResult<Reconciliation> {
        self.total_pool = math::add(self.total_pool, proceeds)?;
        self.total_tokens_due = math::sub(self.total_tokens_due, owed)?;
        self.total_borrow_shares = math::sub(self.total_borrow_shares, shares)?;

        if proceeds < owed {
            let shortfall = owed - proceeds;
            self.bad_debt = math::add(self.bad_debt, shortfall)?;
            return Ok(Reconciliation {
                shortfall,
                ..Default::default()
            });
        }
        let profit = self.distribute_profit(proceeds - owed, fee)?;
        Ok(Reconciliation {
            shortfall: U256::zero(),
            profit,
        })
    }

    /// Checks the ordering invariants between the balances.
    pub fn is_consistent(&self) -> bool {
        self.total_tokens_due <= self.pseudo_total_tokens
            && self.total_pool <= self.pseudo_total_tokens
            && !self.total_internal_shares.is_zero()
            && !self.total_borrow_shares.is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{percent, wad};

    fn tokens(amount: u64) -> U256 {
        U256::from(amount) * wad()
    }

    fn funded(amount: u64) -> PoolLedger {
        let mut ledger = PoolLedger::new(0);
        ledger.deposit(tokens(amount)).unwrap();
        ledger
    }

    #[test]
    fn deposit_then_withdraw_round_trips() {
        let mut ledger = PoolLedger::new(0);
        let shares = ledger.deposit(tokens(1000)).unwrap();
        assert_eq!(shares, tokens(1000));
        assert_eq!(ledger.withdraw(shares).unwrap(), tokens(1000));
        assert_eq!(ledger.total_pool, U256::zero());
        assert_eq!(ledger.pseudo_total_tokens, U256::from(BASE_UNIT));
    }

    #[test]
    fn realize_twice_at_same_time_is_noop() {
        let mut ledger = funded(1000);
        ledger.borrow(tokens(100)).unwrap();
        let rate = percent(10);

        let first = ledger.realize(SECONDS_PER_YEAR, rate, percent(20)).unwrap();
        assert_eq!(first.interest, tokens(10));
        let due = ledger.total_tokens_due;
        let pseudo = ledger.pseudo_total_tokens;
        let shares = ledger.total_internal_shares;

        let second = ledger.realize(SECONDS_PER_YEAR, rate, percent(20)).unwrap();
        assert_eq!(second, Realization::default());
        assert_eq!(ledger.total_tokens_due, due);
        assert_eq!(ledger.pseudo_total_tokens, pseudo);
        assert_eq!(ledger.total_internal_shares, shares);
    }

    #[test]
    fn interest_fully_absorbed_by_bad_debt_mints_no_fee_shares() {
        let mut ledger = funded(1000);
        ledger.borrow(tokens(100)).unwrap();
        ledger.bad_debt = tokens(50);
        ledger.pseudo_total_tokens = ledger.pseudo_total_tokens + tokens(50);
        let shares_before = ledger.total_internal_shares;
        let pseudo_before = ledger.pseudo_total_tokens;

        let realization = ledger.realize(SECONDS_PER_YEAR, percent(10), percent(20)).unwrap();

        assert_eq!(realization.profit.absorbed, tokens(10));
        assert_eq!(realization.profit.fee_shares, U256::zero());
        assert_eq!(ledger.bad_debt, tokens(40));
        assert_eq!(ledger.total_internal_shares, shares_before);
        assert_eq!(ledger.pseudo_total_tokens, pseudo_before);
        assert_eq!(ledger.total_tokens_due, tokens(110));
    }

    #[test]
    fn interest_beyond_bad_debt_pays_fee_on_remainder_only() {
        let mut ledger = funded(1000);
        ledger.borrow(tokens(100)).unwrap();
        ledger.bad_debt = tokens(4);
        ledger.pseudo_total_tokens = ledger.pseudo_total_tokens + tokens(4);

        let realization = ledger.realize(SECONDS_PER_YEAR, percent(10), percent(20)).unwrap();

        assert_eq!(realization.profit.absorbed, tokens(4));
        assert_eq!(realization.profit.distributed, tokens(6));
        assert!(!realization.profit.fee_shares.is_zero());
        assert!(ledger.bad_debt.is_zero());
        assert!(ledger.is_consistent());
    }

    #[test]
    fn last_loan_carries_whole_due_total() {
        let mut ledger = funded(1000);
        let first = ledger.borrow(tokens(100)).unwrap();
        let second = ledger.borrow(tokens(50)).unwrap();
        ledger.realize(SECONDS_PER_YEAR / 3, percent(7), U256::zero()).unwrap();

        let first_value = ledger.loan_tokens(first).unwrap();
        ledger.repay_full(first, first_value).unwrap();

        let second_value = ledger.loan_tokens(second).unwrap();
        assert_eq!(second_value, ledger.total_tokens_due);
        ledger.repay_full(second, second_value).unwrap();

        assert!(ledger.total_tokens_due.is_zero());
        assert_eq!(ledger.total_borrow_shares, U256::from(BASE_UNIT));
    }

    #[test]
    fn partial_repay_keeps_loan_open() {
        let mut ledger = funded(1000);
        let shares = ledger.borrow(tokens(100)).unwrap();
        let burned = ledger.repay_partial(tokens(40), shares).unwrap();
        assert_eq!(burned, tokens(40));
        assert_eq!(ledger.loan_tokens(shares - burned).unwrap(), tokens(60));

        assert_eq!(
            ledger.repay_partial(tokens(60), shares - burned).unwrap_err(),
            PoolError::ArithmeticUnderflow.into()
        );
    }

    #[test]
    fn borrow_beyond_liquidity_fails() {
        let mut ledger = funded(10);
        assert_eq!(
            ledger.borrow(tokens(11)).unwrap_err(),
            PoolError::InsufficientLiquidity.into()
        );
    }

    #[test]
    fn penalty_grows_pool_and_keeps_identity() {
        let mut ledger = funded(1000);
        ledger.borrow(tokens(100)).unwrap();
        let split = ledger.collect_penalty(tokens(2), percent(20)).unwrap();
        assert_eq!(split.distributed, tokens(2));
        assert_eq!(
            ledger.pseudo_total_tokens,
            U256::from(BASE_UNIT) + ledger.total_pool + ledger.total_tokens_due + ledger.bad_debt
        );
    }

    #[test]
    fn liquidation_shortfall_becomes_bad_debt() {
        let mut ledger = funded(1000);
        let shares = ledger.borrow(tokens(100)).unwrap();
        let pseudo_before = ledger.pseudo_total_tokens;

        let outcome = ledger
            .liquidate(shares, tokens(100), tokens(70), percent(20))
            .unwrap();

        assert_eq!(outcome.shortfall, tokens(30));
        assert_eq!(ledger.bad_debt, tokens(30));
        assert_eq!(ledger.pseudo_total_tokens, pseudo_before);
        assert_eq!(ledger.total_pool, tokens(970));
        assert!(ledger.total_tokens_due.is_zero());
        assert!(ledger.is_consistent());
    }

    #[test]
    fn liquidation_overhang_clears_bad_debt_before_fees() {
        let mut ledger = funded(1000);
        let shares = ledger.borrow(tokens(100)).unwrap();
        ledger.bad_debt = tokens(5);
        ledger.pseudo_total_tokens = ledger.pseudo_total_tokens + tokens(5);
        let fee_supply = ledger.total_internal_shares;

        let outcome = ledger
            .liquidate(shares, tokens(100), tokens(103), percent(20))
            .unwrap();

        assert_eq!(outcome.profit.absorbed, tokens(3));
        assert_eq!(outcome.profit.fee_shares, U256::zero());
        assert_eq!(ledger.bad_debt, tokens(2));
        assert_eq!(ledger.total_internal_shares, fee_supply);
    }
}
