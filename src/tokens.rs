//! Assets the pool talks to.
//!
//! - `Cep18Asset`: the fungible asset a pool lends out
//! - `CollateralCollection`: an NFT collection accepted as collateral
//! - `TestAsset` / `TestCollection`: faucet implementations of both, used by
//!   tests and demo deployments

use alloc::string::String;
use odra::casper_types::U256;
use odra::prelude::*;
use odra_modules::cep18::events::{
    Burn, DecreaseAllowance, IncreaseAllowance, Mint, SetAllowance, Transfer, TransferFrom,
};
use odra_modules::cep18_token::Cep18;

/// CEP-18 calls a pool makes on its asset.
#[odra::external_contract]
pub trait Cep18Asset {
    fn decimals(&self) -> u8;
    fn transfer(&mut self, recipient: Address, amount: U256);
    fn transfer_from(&mut self, owner: Address, recipient: Address, amount: U256);
}

/// NFT calls a pool makes on a collateral collection.
#[odra::external_contract]
pub trait CollateralCollection {
    fn transfer_from(&mut self, from: Address, to: Address, token_id: U256);
}

pub mod events {
    use odra::casper_types::U256;
    use odra::prelude::*;

    #[odra::event]
    pub struct NftMinted {
        pub owner: Address,
        pub token_id: U256,
    }

    #[odra::event]
    pub struct NftApproved {
        pub owner: Address,
        pub spender: Address,
        pub token_id: U256,
    }

    #[odra::event]
    pub struct NftTransferred {
        pub from: Address,
        pub to: Address,
        pub token_id: U256,
    }
}

#[odra::odra_error]
pub enum TokenError {
    Unauthorized = 60004,
    TokenAlreadyMinted = 60010,
    UnknownToken = 60011,
    NotTokenOwner = 60012,
}

/// Test asset with faucet mint capability.
/// Anyone can call faucet_mint to get test tokens.
#[odra::module(
    events = [
        Mint,
        Burn,
        SetAllowance,
        IncreaseAllowance,
        DecreaseAllowance,
        Transfer,
        TransferFrom
    ],
    errors = TokenError
)]
pub struct TestAsset {
    token: SubModule<Cep18>,
}

#[odra::module]
impl TestAsset {
    pub fn init(&mut self, symbol: String, name: String, decimals: u8) {
        self.token.init(symbol, name, decimals, U256::zero());
    }

    pub fn name(&self) -> String {
        self.token.name()
    }

    pub fn symbol(&self) -> String {
        self.token.symbol()
    }

    pub fn decimals(&self) -> u8 {
        self.token.decimals()
    }

    pub fn total_supply(&self) -> U256 {
        self.token.total_supply()
    }

    pub fn balance_of(&self, owner: Address) -> U256 {
        self.token.balance_of(&owner)
    }

    pub fn allowance(&self, owner: Address, spender: Address) -> U256 {
        self.token.allowance(&owner, &spender)
    }

    pub fn transfer(&mut self, recipient: Address, amount: U256) {
        self.token.transfer(&recipient, &amount);
    }

    pub fn approve(&mut self, spender: Address, amount: U256) {
        self.token.approve(&spender, &amount);
    }

    pub fn transfer_from(&mut self, owner: Address, recipient: Address, amount: U256) {
        self.token.transfer_from(&owner, &recipient, &amount);
    }

    /// Faucet mint - anyone can call to get test tokens
    pub fn faucet_mint(&mut self, to: Address, amount: U256) {
        self.token.raw_mint(&to, &amount);
    }
}

/// Minimal NFT collection: single-token approvals, anyone may mint.
#[odra::module(
    events = [events::NftMinted, events::NftApproved, events::NftTransferred],
    errors = TokenError
)]
pub struct TestCollection {
    name: Var<String>,
    owners: Mapping<U256, Address>,
    approvals: Mapping<U256, Option<Address>>,
    balances: Mapping<Address, u64>,
}

#[odra::module]
impl TestCollection {
    pub fn init(&mut self, name: String) {
        self.name.set(name);
    }

    pub fn name(&self) -> String {
        self.name.get_or_default()
    }

    pub fn mint(&mut self, to: Address, token_id: U256) {
        if self.owners.get(&token_id).is_some() {
            self.env().revert(TokenError::TokenAlreadyMinted);
        }
        self.owners.set(&token_id, to);
        self.balances.set(&to, self.balances.get(&to).unwrap_or_default() + 1);
        self.env().emit_event(events::NftMinted {
            owner: to,
            token_id,
        });
    }

    pub fn owner_of(&self, token_id: U256) -> Address {
        self.owners
            .get(&token_id)
            .unwrap_or_revert_with(&self.env(), TokenError::UnknownToken)
    }

    pub fn balance_of(&self, owner: Address) -> u64 {
        self.balances.get(&owner).unwrap_or_default()
    }

    pub fn get_approved(&self, token_id: U256) -> Option<Address> {
        self.approvals.get(&token_id).flatten()
    }

    pub fn approve(&mut self, spender: Address, token_id: U256) {
        let owner = self.owner_of(token_id);
        if owner != self.env().caller() {
            self.env().revert(TokenError::NotTokenOwner);
        }
        self.approvals.set(&token_id, Some(spender));
        self.env().emit_event(events::NftApproved {
            owner,
            spender,
            token_id,
        });
    }

    /// Moves `token_id`; the caller must own it or be approved for it.
    pub fn transfer_from(&mut self, from: Address, to: Address, token_id: U256) {
        let owner = self.owner_of(token_id);
        if owner != from {
            self.env().revert(TokenError::NotTokenOwner);
        }
        let caller = self.env().caller();
        if caller != owner && self.get_approved(token_id) != Some(caller) {
            self.env().revert(TokenError::Unauthorized);
        }

        self.approvals.set(&token_id, None);
        self.owners.set(&token_id, to);
        self.balances
            .set(&from, self.balances.get(&from).unwrap_or_default().saturating_sub(1));
        self.balances.set(&to, self.balances.get(&to).unwrap_or_default() + 1);
        self.env().emit_event(events::NftTransferred { from, to, token_id });
    }
}
