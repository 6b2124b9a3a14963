//! Pool Router Contract
//!
//! Single entry point for user flows. Forwards each call to the chosen pool
//! with the calling account as depositor, borrower, payer or liquidator, and
//! moves liquidity between two pools of the same asset in one call.

use alloc::vec::Vec;
use odra::casper_types::bytesrepr::Bytes;
use odra::casper_types::U256;
use odra::prelude::*;
use odra::ContractRef;

use crate::errors::PoolError;

/// User-flow entry points a routable pool exposes.
#[odra::external_contract]
pub trait LendingPoolEntry {
    fn pool_asset(&self) -> Address;
    fn deposit_funds(&mut self, amount: U256, depositor: Address) -> U256;
    fn withdraw_funds(&mut self, shares: U256, depositor: Address) -> U256;
    fn borrow_funds(
        &mut self,
        borrower: Address,
        collection: Address,
        item_id: U256,
        amount: U256,
        proof_index: u32,
        claimed_value: U256,
        proof: Vec<Bytes>,
    );
    fn borrow_more_funds(
        &mut self,
        borrower: Address,
        collection: Address,
        item_id: U256,
        amount: U256,
        proof_index: u32,
        claimed_value: U256,
        proof: Vec<Bytes>,
    );
    fn payback_funds(
        &mut self,
        payer: Address,
        collection: Address,
        item_id: U256,
        amount: U256,
        proof_index: u32,
        claimed_value: U256,
        proof: Vec<Bytes>,
    );
    fn liquidate_nft(
        &mut self,
        liquidator: Address,
        collection: Address,
        item_id: U256,
        proof_index: u32,
        claimed_value: U256,
        proof: Vec<Bytes>,
    );
}

pub mod events {
    use odra::casper_types::U256;
    use odra::prelude::*;

    #[odra::event]
    pub struct FundsMoved {
        pub owner: Address,
        pub from_pool: Address,
        pub to_pool: Address,
        pub shares_burned: U256,
        pub amount: U256,
        pub shares_minted: U256,
    }
}

#[odra::module(events = [events::FundsMoved], errors = PoolError)]
pub struct PoolRouter {
    /// Completed `move_funds` calls.
    moves: Var<u64>,
}

#[odra::module]
impl PoolRouter {
    #[odra(non_reentrant)]
    pub fn deposit_funds(&mut self, pool: Address, amount: U256) -> U256 {
        let depositor = self.env().caller();
        self.pool(pool).deposit_funds(amount, depositor)
    }

    #[odra(non_reentrant)]
    pub fn withdraw_funds(&mut self, pool: Address, shares: U256) -> U256 {
        let depositor = self.env().caller();
        self.pool(pool).withdraw_funds(shares, depositor)
    }

    #[odra(non_reentrant)]
    pub fn borrow_funds(
        &mut self,
        pool: Address,
        collection: Address,
        item_id: U256,
        amount: U256,
        proof_index: u32,
        claimed_value: U256,
        proof: Vec<Bytes>,
    ) {
        let borrower = self.env().caller();
        self.pool(pool).borrow_funds(
            borrower,
            collection,
            item_id,
            amount,
            proof_index,
            claimed_value,
            proof,
        );
    }

    #[odra(non_reentrant)]
    pub fn borrow_more_funds(
        &mut self,
        pool: Address,
        collection: Address,
        item_id: U256,
        amount: U256,
        proof_index: u32,
        claimed_value: U256,
        proof: Vec<Bytes>,
    ) {
        let borrower = self.env().caller();
        self.pool(pool).borrow_more_funds(
            borrower,
            collection,
            item_id,
            amount,
            proof_index,
            claimed_value,
            proof,
        );
    }

    #[odra(non_reentrant)]
    pub fn payback_funds(
        &mut self,
        pool: Address,
        collection: Address,
        item_id: U256,
        amount: U256,
        proof_index: u32,
        claimed_value: U256,
        proof: Vec<Bytes>,
    ) {
        let payer = self.env().caller();
        self.pool(pool).payback_funds(
            payer,
            collection,
            item_id,
            amount,
            proof_index,
            claimed_value,
            proof,
        );
    }

    #[odra(non_reentrant)]
    pub fn liquidate_nft(
        &mut self,
        pool: Address,
        collection: Address,
        item_id: U256,
        proof_index: u32,
        claimed_value: U256,
        proof: Vec<Bytes>,
    ) {
        let liquidator = self.env().caller();
        self.pool(pool).liquidate_nft(
            liquidator,
            collection,
            item_id,
            proof_index,
            claimed_value,
            proof,
        );
    }

    /// Withdraw `shares` from `from_pool` and deposit the proceeds into
    /// `to_pool`. The caller must have approved `to_pool` for the asset.
    /// Returns the shares minted by `to_pool`.
    #[odra(non_reentrant)]
    pub fn move_funds(&mut self, shares: U256, from_pool: Address, to_pool: Address) -> U256 {
        let owner = self.env().caller();
        let mut source = self.pool(from_pool);
        let mut target = self.pool(to_pool);
        if source.pool_asset() != target.pool_asset() {
            self.env().revert(PoolError::TokenMismatch);
        }

        let amount = source.withdraw_funds(shares, owner);
        let shares_minted = target.deposit_funds(amount, owner);

        self.moves.set(self.moves.get_or_default() + 1);
        self.env().emit_event(events::FundsMoved {
            owner,
            from_pool,
            to_pool,
            shares_burned: shares,
            amount,
            shares_minted,
        });
        shares_minted
    }

    pub fn moves_count(&self) -> u64 {
        self.moves.get_or_default()
    }
}

impl PoolRouter {
    fn pool(&self, address: Address) -> LendingPoolEntryContractRef {
        LendingPoolEntryContractRef::new(self.env(), address)
    }
}
