//! Utilisation-driven borrow rate with a self-tuning pole.
//!
//! The rate follows `mf * u / ((pole - u) * pole)`, which stays cheap at low
//! utilisation and grows without bound as `u` approaches the pole. The pole
//! itself is moved once per epoch depending on whether the share supply grew.

use odra::casper_types::U256;
use odra::prelude::*;

use crate::errors::{PoolError, PoolResult};
use crate::loan::LOAN_INTERVAL;
use crate::math::{self, SECONDS_PER_HOUR, SECONDS_PER_YEAR};

/// Length of one pole-scaling epoch.
pub const EPOCH: u64 = 3 * SECONDS_PER_HOUR;
/// Number of pole steps between `min_pole` and `max_pole` (two months of epochs).
pub const NORM_FACTOR: u64 = 448;
/// Utilisation above which a shrinking pool sharpens the curve.
pub const HIGH_UTILISATION: u128 = 600_000_000_000_000_000;

const MARKOV_KEEP: u64 = 98;
const MARKOV_TAKE: u64 = 2;
const MARKOV_SCALE: u64 = 100;

#[odra::odra_type]
pub struct RateCurve {
    pub pole: U256,
    pub min_pole: U256,
    pub max_pole: U256,
    pub delta_pole: U256,
    pub multiplicative_factor: U256,
    pub utilisation: U256,
    pub borrow_rate: U256,
    /// Exponentially smoothed borrow rate.
    pub markov_mean: U256,
    /// Highest share supply seen in the running epoch.
    pub max_pool_shares: U256,
    pub last_epoch_max_shares: U256,
    pub last_epoch_timestamp: u64,
}

/// A pole move made at an epoch rollover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoleChange {
    pub old_pole: U256,
    pub new_pole: U256,
}

impl RateCurve {
    pub fn new(
        multiplicative_factor: U256,
        min_pole: U256,
        max_pole: U256,
        total_shares: U256,
        now: u64,
    ) -> PoolResult<Self> {
        if min_pole <= math::wad() || max_pole <= min_pole || multiplicative_factor.is_zero() {
            return Err(PoolError::InvalidConfiguration.into());
        }
        let delta_pole = math::div(max_pole - min_pole, U256::from(NORM_FACTOR))?;
        if delta_pole.is_zero() {
            return Err(PoolError::InvalidConfiguration.into());
        }
        let pole = min_pole + (max_pole - min_pole) / U256::from(2u64);
        Ok(Self {
            pole,
            min_pole,
            max_pole,
            delta_pole,
            multiplicative_factor,
            utilisation: U256::zero(),
            borrow_rate: U256::zero(),
            markov_mean: U256::zero(),
            max_pool_shares: total_shares,
            last_epoch_max_shares: total_shares,
            last_epoch_timestamp: now,
        })
    }

    /// Annual borrow rate (wad) at `utilisation` for the current pole.
    pub fn rate_at(&self, utilisation: U256) -> PoolResult<U256> {
        if utilisation.is_zero() {
            return Ok(U256::zero());
        }
        if utilisation >= self.pole {
            return Err(PoolError::ArithmeticOverflow.into());
        }
        let numerator = math::mul(self.multiplicative_factor, utilisation)?;
        let denominator = math::mul(self.pole - utilisation, self.pole)?;
        math::mul_div(numerator, math::wad(), denominator)
    }

    /// Stores the new utilisation and the rate that goes with it.
    pub fn refresh(&mut self, utilisation: U256) -> PoolResult<()> {
        self.borrow_rate = self.rate_at(utilisation)?;
        self.utilisation = utilisation;
        Ok(())
    }

    pub fn track_shares(&mut self, total_shares: U256) {
        if total_shares > self.max_pool_shares {
            self.max_pool_shares = total_shares;
        }
    }

    /// Runs the scaling loop once the running epoch is over.
    ///
    /// Growth moves the pole up, shrinking under high utilisation moves it
    /// down, an exact tie leaves it where it is.
    pub fn scale_pole(&mut self, now: u64, total_shares: U256) -> Option<PoleChange> {
        if now < self.last_epoch_timestamp.saturating_add(EPOCH) {
            return None;
        }
        let old_pole = self.pole;
        if self.max_pool_shares > self.last_epoch_max_shares {
            self.pole = self.pole.saturating_add(self.delta_pole).min(self.max_pole);
        } else if self.max_pool_shares < self.last_epoch_max_shares
            && self.utilisation >= U256::from(HIGH_UTILISATION)
        {
            self.pole = self.pole.saturating_sub(self.delta_pole).max(self.min_pole);
        }

        self.last_epoch_max_shares = self.max_pool_shares;
        self.max_pool_shares = total_shares;
        self.last_epoch_timestamp = now;

        if self.pole == old_pole {
            return None;
        }
        Some(PoleChange {
            old_pole,
            new_pole: self.pole,
        })
    }

    pub fn update_markov_mean(&mut self) -> PoolResult<()> {
        let kept = math::mul(self.markov_mean, U256::from(MARKOV_KEEP))?;
        let taken = math::mul(self.borrow_rate, U256::from(MARKOV_TAKE))?;
        self.markov_mean = math::add(kept, taken)? / U256::from(MARKOV_SCALE);
        Ok(())
    }

    /// Loan value at the next payment deadline if rates follow the Markov mean.
    pub fn predict_future_loan_value(&self, value: U256) -> PoolResult<U256> {
        let growth = math::mul_div(
            math::mul(value, self.markov_mean)?,
            U256::from(LOAN_INTERVAL),
            math::mul(U256::from(SECONDS_PER_YEAR), math::wad())?,
        )?;
        math::add(value, growth)
    }

    /// Yearly return for depositors after the fee, in wad.
    pub fn deposit_apy(&self, fee: U256) -> PoolResult<U256> {
        let gross = math::wad_mul(self.borrow_rate, self.utilisation)?;
        math::wad_mul(gross, math::sub(math::wad(), fee)?)
    }
}
