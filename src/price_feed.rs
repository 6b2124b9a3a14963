//! Price Feed External Contract Interface
//!
//! Round-based price feeds quote how many units of a collection's valuation
//! currency one pool asset unit is worth. Rounds are numbered from 1 and each
//! carries the timestamp (seconds) of its last update.

use odra::casper_types::U256;
use odra::prelude::*;

use crate::errors::PoolError;

/// One published price round.
#[odra::odra_type]
pub struct RoundData {
    pub round_id: u64,
    pub answer: U256,
    /// Seconds.
    pub updated_at: u64,
}

/// Price Feed External Contract Interface
#[odra::external_contract]
pub trait PriceFeed {
    /// Latest round. Reverts if the feed never published.
    fn latest_round_data(&self) -> RoundData;

    /// A historical round, or None if it was never published.
    fn get_round_data(&self, round_id: u64) -> Option<RoundData>;

    /// Decimals of `answer`.
    fn decimals(&self) -> u8;
}

/// Feed whose rounds are pushed by hand, for tests and demo deployments.
#[odra::module(errors = PoolError)]
pub struct TestPriceFeed {
    decimals: Var<u8>,
    latest_round: Var<u64>,
    rounds: Mapping<u64, RoundData>,
}

#[odra::module]
impl TestPriceFeed {
    pub fn init(&mut self, decimals: u8) {
        self.decimals.set(decimals);
        self.latest_round.set(0);
    }

    /// Publishes `answer` stamped with the current block time.
    pub fn push_round(&mut self, answer: U256) {
        let now = self.env().get_block_time() / 1000;
        self.push_round_at(answer, now);
    }

    /// Publishes `answer` with an explicit update time in seconds.
    pub fn push_round_at(&mut self, answer: U256, updated_at: u64) {
        let round_id = self.latest_round.get_or_default() + 1;
        self.rounds.set(
            &round_id,
            RoundData {
                round_id,
                answer,
                updated_at,
            },
        );
        self.latest_round.set(round_id);
    }

    pub fn latest_round_data(&self) -> RoundData {
        let round_id = self.latest_round.get_or_default();
        self.rounds
            .get(&round_id)
            .unwrap_or_revert_with(&self.env(), PoolError::NoRoundData)
    }

    pub fn get_round_data(&self, round_id: u64) -> Option<RoundData> {
        self.rounds.get(&round_id)
    }

    pub fn decimals(&self) -> u8 {
        self.decimals.get_or_default()
    }
}
