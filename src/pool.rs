//! NFT Lending Pool Contract
//!
//! A single-asset lending pool on Casper Network.
//! - Depositors supply the pool asset and receive pool shares
//! - Borrowers lock an NFT from an allow-listed collection and borrow up to a
//!   fraction of its oracle-backed valuation
//! - Interest follows a utilisation curve whose pole tunes itself every epoch
//! - Overdue loans are sold in a falling-price auction; shortfalls become bad
//!   debt that later profit pays off before any fee is taken
//!
//! ## Units
//! - Asset amounts: smallest unit of the pool asset (U256)
//! - Rates and fractions: wad (U256), 1e18 = 100%
//! - Time: seconds
//!
//! ## Access
//! User flows (deposit, withdraw, borrow, payback, liquidate) arrive through
//! the router. Share tokenisation and share token transfers are user-direct.
//! Collection management and the fee destination belong to the controller.

use alloc::string::String;
use alloc::vec::Vec;
use odra::casper_types::bytesrepr::Bytes;
use odra::casper_types::U256;
use odra::prelude::*;
use odra::ContractRef;
use odra_modules::cep18::events::{
    Burn, DecreaseAllowance, IncreaseAllowance, Mint, SetAllowance, Transfer, TransferFrom,
};
use odra_modules::cep18_token::Cep18;

use crate::errors::{PoolError, PoolResult};
use crate::heartbeat::{self, HeartbeatEntry};
use crate::ledger::{PoolLedger, ProfitSplit};
use crate::loan::{self, Loan};
use crate::math::{self, SECONDS_PER_DAY};
use crate::price_feed::PriceFeedContractRef;
use crate::rate_curve::RateCurve;
use crate::tokens::{Cep18AssetContractRef, CollateralCollectionContractRef};
use crate::valuation;

// ==========================================
// Constants
// ==========================================

/// Time a scheduled Merkle root waits before it can be applied.
pub const ROOT_UPDATE_DELAY: u64 = 3 * SECONDS_PER_DAY;

const MILLIS_PER_SECOND: u64 = 1_000;

// ==========================================
// Events
// ==========================================

pub mod events {
    use odra::casper_types::bytesrepr::Bytes;
    use odra::casper_types::U256;
    use odra::prelude::*;

    #[odra::event]
    pub struct FundsDeposited {
        pub depositor: Address,
        pub amount: U256,
        pub shares: U256,
    }

    #[odra::event]
    pub struct FundsWithdrawn {
        pub depositor: Address,
        pub amount: U256,
        pub shares: U256,
    }

    #[odra::event]
    pub struct SharesTokenised {
        pub owner: Address,
        pub shares: U256,
    }

    #[odra::event]
    pub struct FundsBorrowed {
        pub borrower: Address,
        pub collection: Address,
        pub item_id: U256,
        pub amount: U256,
        pub borrow_shares: U256,
    }

    #[odra::event]
    pub struct FundsBorrowedMore {
        pub borrower: Address,
        pub collection: Address,
        pub item_id: U256,
        pub amount: U256,
        pub borrow_shares: U256,
    }

    #[odra::event]
    pub struct FundsPaidBack {
        pub payer: Address,
        pub collection: Address,
        pub item_id: U256,
        pub amount: U256,
        pub penalty: U256,
        pub closed: bool,
    }

    #[odra::event]
    pub struct LoanLiquidated {
        pub liquidator: Address,
        pub collection: Address,
        pub item_id: U256,
        pub price: U256,
        pub owed: U256,
        pub shortfall: U256,
    }

    #[odra::event]
    pub struct BadDebtChanged {
        pub bad_debt: U256,
    }

    #[odra::event]
    pub struct FeesMinted {
        pub destination: Address,
        pub profit: U256,
        pub shares: U256,
    }

    #[odra::event]
    pub struct PoleAdjusted {
        pub old_pole: U256,
        pub new_pole: U256,
    }

    #[odra::event]
    pub struct HeartbeatRecalibrated {
        pub feed: Address,
        pub heartbeat: u64,
        pub round_id: u64,
    }

    #[odra::event]
    pub struct CollectionAdded {
        pub collection: Address,
        pub root: Bytes,
    }

    #[odra::event]
    pub struct RootUpdateStarted {
        pub collection: Address,
        pub root: Bytes,
        pub available_at: u64,
    }

    #[odra::event]
    pub struct RootUpdated {
        pub collection: Address,
        pub root: Bytes,
    }

    #[odra::event]
    pub struct FeeDestinationChanged {
        pub old_destination: Address,
        pub new_destination: Address,
    }
}

// ==========================================
// Types
// ==========================================

/// Constructor parameters of a pool.
#[odra::odra_type]
pub struct PoolConfig {
    pub pool_asset: Address,
    pub price_feed: Address,
    pub router: Address,
    pub fee_destination: Address,
    /// Share of a collateral valuation that may be borrowed (wad).
    pub max_loan_fraction: U256,
    /// Share of distributed profit paid to `fee_destination` (wad).
    pub fee: U256,
    pub multiplicative_factor: U256,
    pub min_pole: U256,
    pub max_pole: U256,
    pub share_name: String,
    pub share_symbol: String,
}

/// A Merkle root waiting for its delay to pass.
#[odra::odra_type]
pub struct PendingRoot {
    pub root: Bytes,
    pub available_at: u64,
}

/// An item offered as collateral together with its value proof.
struct Collateral {
    collection: Address,
    item_id: U256,
    proof_index: u32,
    claimed_value: U256,
    proof: Vec<Bytes>,
}

/// Valuation in pool units, plus a heartbeat calibrated on the way.
struct Appraisal {
    value: U256,
    calibration: Option<(Address, HeartbeatEntry)>,
}

// ==========================================
// Contract
// ==========================================

#[odra::module(
    events = [
        events::FundsDeposited,
        events::FundsWithdrawn,
        events::SharesTokenised,
        events::FundsBorrowed,
        events::FundsBorrowedMore,
        events::FundsPaidBack,
        events::LoanLiquidated,
        events::BadDebtChanged,
        events::FeesMinted,
        events::PoleAdjusted,
        events::HeartbeatRecalibrated,
        events::CollectionAdded,
        events::RootUpdateStarted,
        events::RootUpdated,
        events::FeeDestinationChanged,
        Mint,
        Burn,
        SetAllowance,
        IncreaseAllowance,
        DecreaseAllowance,
        Transfer,
        TransferFrom
    ],
    errors = PoolError
)]
pub struct LendingPool {
    config: Var<PoolConfig>,
    controller: Var<Address>,

    // Accounting
    ledger: Var<PoolLedger>,
    curve: Var<RateCurve>,
    internal_shares: Mapping<Address, U256>,
    share_token: SubModule<Cep18>,

    // Loans keyed by (collection, item id)
    loans: Mapping<(Address, U256), Option<Loan>>,

    // Collateral allow-list
    roots: Mapping<Address, Bytes>,
    pending_roots: Mapping<Address, Option<PendingRoot>>,
    heartbeats: Mapping<Address, HeartbeatEntry>,
}

#[odra::module]
impl LendingPool {
    // ==========================================
    // Initialization
    // ==========================================

    /// Initialize the pool. The deployer becomes the controller.
    pub fn init(&mut self, config: PoolConfig, collections: Vec<Address>, roots: Vec<Bytes>) {
        if config.max_loan_fraction.is_zero()
            || config.max_loan_fraction > math::wad()
            || config.fee >= math::wad()
            || collections.len() != roots.len()
        {
            self.env().revert(PoolError::InvalidConfiguration);
        }

        let now = self.now();
        let ledger = PoolLedger::new(now);
        let curve = RateCurve::new(
            config.multiplicative_factor,
            config.min_pole,
            config.max_pole,
            ledger.total_internal_shares,
            now,
        )
        .unwrap_or_revert(&self.env());

        let decimals = Cep18AssetContractRef::new(self.env(), config.pool_asset).decimals();
        self.share_token.init(
            config.share_symbol.clone(),
            config.share_name.clone(),
            decimals,
            U256::zero(),
        );

        self.controller.set(self.env().caller());
        self.ledger.set(ledger);
        self.curve.set(curve);
        self.config.set(config);

        for (collection, root) in collections.into_iter().zip(roots) {
            self.add_collection(collection, root)
                .unwrap_or_revert(&self.env());
        }
    }

    // ==========================================
    // Depositor Functions (router only)
    // ==========================================

    /// Deposit `amount` of the pool asset for `depositor`, who must have
    /// approved the pool. Returns the internal shares minted.
    #[odra(non_reentrant)]
    pub fn deposit_funds(&mut self, amount: U256, depositor: Address) -> U256 {
        self.require_router();
        self.execute_deposit(amount, depositor)
            .unwrap_or_revert(&self.env())
    }

    /// Redeem `shares` of `depositor`, internal shares first and share tokens
    /// after. Returns the asset amount paid out.
    #[odra(non_reentrant)]
    pub fn withdraw_funds(&mut self, shares: U256, depositor: Address) -> U256 {
        self.require_router();
        self.execute_withdraw(shares, depositor)
            .unwrap_or_revert(&self.env())
    }

    /// Turn internal shares of the caller into transferable share tokens.
    #[odra(non_reentrant)]
    pub fn tokenise_shares(&mut self, shares: U256) {
        let owner = self.env().caller();
        if shares.is_zero() {
            self.env().revert(PoolError::ZeroAmount);
        }
        let internal = self.internal_shares.get(&owner).unwrap_or_default();
        if shares > internal {
            self.env().revert(PoolError::InsufficientShares);
        }
        self.internal_shares.set(&owner, internal - shares);
        self.share_token.raw_mint(&owner, &shares);
        self.env()
            .emit_event(events::SharesTokenised { owner, shares });
    }

    // ==========================================
    // Borrower Functions (router only)
    // ==========================================

    /// Open a loan of `amount` against an NFT the borrower approved to the pool.
    #[odra(non_reentrant)]
    pub fn borrow_funds(
        &mut self,
        borrower: Address,
        collection: Address,
        item_id: U256,
        amount: U256,
        proof_index: u32,
        claimed_value: U256,
        proof: Vec<Bytes>,
    ) {
        self.require_router();
        let collateral = Collateral {
            collection,
            item_id,
            proof_index,
            claimed_value,
            proof,
        };
        self.execute_borrow(borrower, collateral, amount)
            .unwrap_or_revert(&self.env());
    }

    /// Add `amount` to an existing, not overdue loan of `borrower`.
    #[odra(non_reentrant)]
    pub fn borrow_more_funds(
        &mut self,
        borrower: Address,
        collection: Address,
        item_id: U256,
        amount: U256,
        proof_index: u32,
        claimed_value: U256,
        proof: Vec<Bytes>,
    ) {
        self.require_router();
        let collateral = Collateral {
            collection,
            item_id,
            proof_index,
            claimed_value,
            proof,
        };
        self.execute_borrow_more(borrower, collateral, amount)
            .unwrap_or_revert(&self.env());
    }

    /// Pay back a loan. Paying at least the full quote closes the loan and
    /// returns the NFT to its owner; anything less must cover the late penalty.
    ///
    /// A partial payment has no minimum beyond the penalty: it is accepted as
    /// long as the predicted value of the remaining loan stays within the
    /// borrow maximum, and it always restarts the payment deadline.
    #[odra(non_reentrant)]
    pub fn payback_funds(
        &mut self,
        payer: Address,
        collection: Address,
        item_id: U256,
        amount: U256,
        proof_index: u32,
        claimed_value: U256,
        proof: Vec<Bytes>,
    ) {
        self.require_router();
        let collateral = Collateral {
            collection,
            item_id,
            proof_index,
            claimed_value,
            proof,
        };
        self.execute_payback(payer, collateral, amount)
            .unwrap_or_revert(&self.env());
    }

    /// Buy a defaulted NFT at the current auction price.
    #[odra(non_reentrant)]
    pub fn liquidate_nft(
        &mut self,
        liquidator: Address,
        collection: Address,
        item_id: U256,
        proof_index: u32,
        claimed_value: U256,
        proof: Vec<Bytes>,
    ) {
        self.require_router();
        let collateral = Collateral {
            collection,
            item_id,
            proof_index,
            claimed_value,
            proof,
        };
        self.execute_liquidation(liquidator, collateral)
            .unwrap_or_revert(&self.env());
    }

    // ==========================================
    // Oracle
    // ==========================================

    /// Re-estimate the heartbeat of `feed` from its recent rounds. Anyone may call.
    pub fn recalibrate(&mut self, feed: Address) {
        let entry = heartbeat::calibrate(&PriceFeedContractRef::new(self.env(), feed), self.now())
            .unwrap_or_revert(&self.env());
        self.store_heartbeat(feed, entry);
    }

    pub fn heartbeat_of(&self, feed: Address) -> Option<HeartbeatEntry> {
        self.heartbeats.get(&feed)
    }

    // ==========================================
    // Admin Functions (controller only)
    // ==========================================

    pub fn change_fee_destination(&mut self, new_destination: Address) {
        self.require_controller();
        let mut config = self.config().unwrap_or_revert(&self.env());
        let old_destination = config.fee_destination;
        config.fee_destination = new_destination;
        self.config.set(config);
        self.env().emit_event(events::FeeDestinationChanged {
            old_destination,
            new_destination,
        });
    }

    /// Accept a new collateral collection valued by `root`.
    pub fn expand_pool(&mut self, collection: Address, root: Bytes) {
        self.require_controller();
        self.add_collection(collection, root)
            .unwrap_or_revert(&self.env());
    }

    /// Schedule a new Merkle root for a listed collection.
    pub fn start_root_update(&mut self, collection: Address, root: Bytes) {
        self.require_controller();
        if self.roots.get(&collection).is_none() {
            self.env().revert(PoolError::UnknownCollection);
        }
        if valuation::to_hash(&root).is_none() {
            self.env().revert(PoolError::InvalidConfiguration);
        }
        if self.pending_roots.get(&collection).flatten().is_some() {
            self.env().revert(PoolError::RootOverwriteDenied);
        }
        let available_at = self.now() + ROOT_UPDATE_DELAY;
        self.pending_roots.set(
            &collection,
            Some(PendingRoot {
                root: root.clone(),
                available_at,
            }),
        );
        self.env().emit_event(events::RootUpdateStarted {
            collection,
            root,
            available_at,
        });
    }

    /// Apply a scheduled root once its delay has passed.
    pub fn finish_root_update(&mut self, collection: Address) {
        self.require_controller();
        let pending = self
            .pending_roots
            .get(&collection)
            .flatten()
            .unwrap_or_revert_with(&self.env(), PoolError::NoPendingRootUpdate);
        if self.now() < pending.available_at {
            self.env().revert(PoolError::TooEarly);
        }
        self.roots.set(&collection, pending.root.clone());
        self.pending_roots.set(&collection, None);
        self.env().emit_event(events::RootUpdated {
            collection,
            root: pending.root,
        });
    }

    // ==========================================
    // Share Token (CEP-18, user-direct)
    // ==========================================

    pub fn name(&self) -> String {
        self.share_token.name()
    }

    pub fn symbol(&self) -> String {
        self.share_token.symbol()
    }

    pub fn decimals(&self) -> u8 {
        self.share_token.decimals()
    }

    pub fn total_supply(&self) -> U256 {
        self.share_token.total_supply()
    }

    pub fn balance_of(&self, owner: Address) -> U256 {
        self.share_token.balance_of(&owner)
    }

    pub fn allowance(&self, owner: Address, spender: Address) -> U256 {
        self.share_token.allowance(&owner, &spender)
    }

    pub fn transfer(&mut self, recipient: Address, amount: U256) {
        self.share_token.transfer(&recipient, &amount);
    }

    pub fn approve(&mut self, spender: Address, amount: U256) {
        self.share_token.approve(&spender, &amount);
    }

    pub fn transfer_from(&mut self, owner: Address, recipient: Address, amount: U256) {
        self.share_token.transfer_from(&owner, &recipient, &amount);
    }

    // ==========================================
    // View Functions
    // ==========================================

    pub fn pool_asset(&self) -> Address {
        self.config().unwrap_or_revert(&self.env()).pool_asset
    }

    pub fn router(&self) -> Address {
        self.config().unwrap_or_revert(&self.env()).router
    }

    pub fn fee_destination(&self) -> Address {
        self.config().unwrap_or_revert(&self.env()).fee_destination
    }

    pub fn controller(&self) -> Option<Address> {
        self.controller.get()
    }

    pub fn utilisation_rate(&self) -> U256 {
        self.curve().unwrap_or_revert(&self.env()).utilisation
    }

    pub fn borrow_rate(&self) -> U256 {
        self.curve().unwrap_or_revert(&self.env()).borrow_rate
    }

    pub fn markov_mean(&self) -> U256 {
        self.curve().unwrap_or_revert(&self.env()).markov_mean
    }

    pub fn pole(&self) -> U256 {
        self.curve().unwrap_or_revert(&self.env()).pole
    }

    pub fn total_pool(&self) -> U256 {
        self.ledger().unwrap_or_revert(&self.env()).total_pool
    }

    pub fn pseudo_total_tokens_held(&self) -> U256 {
        self.ledger().unwrap_or_revert(&self.env()).pseudo_total_tokens
    }

    pub fn total_tokens_due(&self) -> U256 {
        self.ledger().unwrap_or_revert(&self.env()).total_tokens_due
    }

    pub fn total_borrow_shares(&self) -> U256 {
        self.ledger().unwrap_or_revert(&self.env()).total_borrow_shares
    }

    pub fn total_internal_shares(&self) -> U256 {
        self.ledger().unwrap_or_revert(&self.env()).total_internal_shares
    }

    pub fn bad_debt(&self) -> U256 {
        self.ledger().unwrap_or_revert(&self.env()).bad_debt
    }

    pub fn internal_shares_of(&self, owner: Address) -> U256 {
        self.internal_shares.get(&owner).unwrap_or_default()
    }

    /// Yearly depositor return after the fee, in wad.
    pub fn current_deposit_apy(&self) -> U256 {
        let fee = self.config().unwrap_or_revert(&self.env()).fee;
        self.curve()
            .and_then(|curve| curve.deposit_apy(fee))
            .unwrap_or_revert(&self.env())
    }

    /// Shares a deposit of `amount` would mint right now.
    pub fn calculate_deposit_shares(&self, amount: U256) -> U256 {
        self.projected_ledger()
            .and_then(|ledger| ledger.calculate_deposit_shares(amount))
            .unwrap_or_revert(&self.env())
    }

    /// Asset amount `shares` would redeem for right now.
    pub fn calculate_withdraw_amount(&self, shares: U256) -> U256 {
        self.projected_ledger()
            .and_then(|ledger| ledger.calculate_withdraw_amount(shares))
            .unwrap_or_revert(&self.env())
    }

    /// Largest loan the proven item supports.
    pub fn get_borrow_maximum(
        &self,
        collection: Address,
        item_id: U256,
        proof_index: u32,
        claimed_value: U256,
        proof: Vec<Bytes>,
    ) -> U256 {
        let collateral = Collateral {
            collection,
            item_id,
            proof_index,
            claimed_value,
            proof,
        };
        self.appraise(&collateral)
            .and_then(|appraisal| self.borrow_maximum(appraisal.value))
            .unwrap_or_revert(&self.env())
    }

    /// Price a liquidator pays for the item right now.
    pub fn get_current_auction_price(
        &self,
        collection: Address,
        item_id: U256,
        proof_index: u32,
        claimed_value: U256,
        proof: Vec<Bytes>,
    ) -> U256 {
        let collateral = Collateral {
            collection,
            item_id,
            proof_index,
            claimed_value,
            proof,
        };
        self.auction_price(&collateral)
            .unwrap_or_revert(&self.env())
    }

    pub fn current_loan(&self, collection: Address, item_id: U256) -> Option<Loan> {
        self.loans.get(&(collection, item_id)).flatten()
    }

    /// Debt of the loan including interest accrued up to now.
    pub fn loan_value(&self, collection: Address, item_id: U256) -> U256 {
        self.quote(collection, item_id)
            .map(|(value, _)| value)
            .unwrap_or_revert(&self.env())
    }

    /// Amount that closes the loan right now, late penalty included.
    pub fn payback_quote(&self, collection: Address, item_id: U256) -> U256 {
        self.quote(collection, item_id)
            .and_then(|(value, penalty)| math::add(value, penalty))
            .unwrap_or_revert(&self.env())
    }

    pub fn predict_future_loan_value(&self, value: U256) -> U256 {
        self.curve()
            .and_then(|curve| curve.predict_future_loan_value(value))
            .unwrap_or_revert(&self.env())
    }

    pub fn merkle_root(&self, collection: Address) -> Option<Bytes> {
        self.roots.get(&collection)
    }

    pub fn pending_root(&self, collection: Address) -> Option<PendingRoot> {
        self.pending_roots.get(&collection).flatten()
    }
}

// ==========================================
// Internal Functions
// ==========================================

impl LendingPool {
    fn now(&self) -> u64 {
        self.env().get_block_time() / MILLIS_PER_SECOND
    }

    fn require_router(&self) {
        let router = self.config().unwrap_or_revert(&self.env()).router;
        if self.env().caller() != router {
            self.env().revert(PoolError::NotRouter);
        }
    }

    fn require_controller(&self) {
        if self.controller.get() != Some(self.env().caller()) {
            self.env().revert(PoolError::NotController);
        }
    }

    fn config(&self) -> PoolResult<PoolConfig> {
        self.config
            .get()
            .ok_or_else(|| PoolError::InvalidConfiguration.into())
    }

    fn ledger(&self) -> PoolResult<PoolLedger> {
        self.ledger
            .get()
            .ok_or_else(|| PoolError::InvalidConfiguration.into())
    }

    fn curve(&self) -> PoolResult<RateCurve> {
        self.curve
            .get()
            .ok_or_else(|| PoolError::InvalidConfiguration.into())
    }

    fn asset(&self) -> PoolResult<Cep18AssetContractRef> {
        Ok(Cep18AssetContractRef::new(self.env(), self.config()?.pool_asset))
    }

    fn stored_loan(&self, key: &(Address, U256)) -> PoolResult<Loan> {
        self.loans
            .get(key)
            .flatten()
            .ok_or_else(|| PoolError::LoanNotFound.into())
    }

    /// Ledger as it would look after realising interest up to now.
    fn projected_ledger(&self) -> PoolResult<PoolLedger> {
        let mut ledger = self.ledger()?;
        let curve = self.curve()?;
        ledger.realize(self.now(), curve.borrow_rate, self.config()?.fee)?;
        Ok(ledger)
    }

    /// Realises pending interest. Every state change starts here.
    fn prepare(&mut self) -> PoolResult<(PoolLedger, RateCurve)> {
        let fee = self.config()?.fee;
        let mut ledger = self.ledger()?;
        let curve = self.curve()?;
        let realization = ledger.realize(self.now(), curve.borrow_rate, fee)?;
        self.settle_profit(&ledger, realization.profit)?;
        Ok((ledger, curve))
    }

    /// Recomputes the rate, runs the pole epoch and stores both halves of the state.
    fn finish(
        &mut self,
        ledger: PoolLedger,
        mut curve: RateCurve,
        loan_action: bool,
    ) -> PoolResult<()> {
        let utilisation = ledger.utilisation()?;
        curve.refresh(utilisation)?;
        curve.track_shares(ledger.total_internal_shares);
        if let Some(change) = curve.scale_pole(self.now(), ledger.total_internal_shares) {
            curve.refresh(utilisation)?;
            self.env().emit_event(events::PoleAdjusted {
                old_pole: change.old_pole,
                new_pole: change.new_pole,
            });
        }
        if loan_action {
            curve.update_markov_mean()?;
        }
        self.ledger.set(ledger);
        self.curve.set(curve);
        Ok(())
    }

    fn settle_profit(&mut self, ledger: &PoolLedger, profit: ProfitSplit) -> PoolResult<()> {
        if !profit.fee_shares.is_zero() {
            let destination = self.config()?.fee_destination;
            self.credit_internal(destination, profit.fee_shares)?;
            self.env().emit_event(events::FeesMinted {
                destination,
                profit: profit.distributed,
                shares: profit.fee_shares,
            });
        }
        if !profit.absorbed.is_zero() {
            self.env().emit_event(events::BadDebtChanged {
                bad_debt: ledger.bad_debt,
            });
        }
        Ok(())
    }

    fn credit_internal(&mut self, owner: Address, shares: U256) -> PoolResult<()> {
        let current = self.internal_shares.get(&owner).unwrap_or_default();
        self.internal_shares.set(&owner, math::add(current, shares)?);
        Ok(())
    }

    fn add_collection(&mut self, collection: Address, root: Bytes) -> PoolResult<()> {
        if valuation::to_hash(&root).is_none() {
            return Err(PoolError::InvalidConfiguration.into());
        }
        if self.roots.get(&collection).is_some() {
            return Err(PoolError::CollectionAlreadyListed.into());
        }
        self.roots.set(&collection, root.clone());
        self.env()
            .emit_event(events::CollectionAdded { collection, root });
        Ok(())
    }

    fn store_heartbeat(&mut self, feed: Address, entry: HeartbeatEntry) {
        self.env().emit_event(events::HeartbeatRecalibrated {
            feed,
            heartbeat: entry.heartbeat,
            round_id: entry.last_recalibration_round,
        });
        self.heartbeats.set(&feed, entry);
    }

    /// Verifies the value proof and converts it with a fresh feed answer.
    /// A feed seen for the first time is calibrated on the spot.
    fn appraise(&self, collateral: &Collateral) -> PoolResult<Appraisal> {
        let root = self
            .roots
            .get(&collateral.collection)
            .ok_or(PoolError::UnknownCollection)?;
        let root = valuation::to_hash(&root).ok_or(PoolError::InvalidProof)?;
        let leaf = valuation::leaf_hash(
            collateral.proof_index,
            collateral.item_id,
            collateral.claimed_value,
        );
        valuation::verify_proof(&root, leaf, &collateral.proof)?;

        let feed_address = self.config()?.price_feed;
        let feed = PriceFeedContractRef::new(self.env(), feed_address);
        let (entry, calibration) = match self.heartbeats.get(&feed_address) {
            Some(entry) => (entry, None),
            None => {
                let entry = heartbeat::calibrate(&feed, self.now())?;
                (entry.clone(), Some((feed_address, entry)))
            }
        };
        let round = feed.latest_round_data();
        heartbeat::ensure_fresh(&round, &entry, self.now())?;

        Ok(Appraisal {
            value: valuation::to_pool_units(
                collateral.claimed_value,
                round.answer,
                feed.decimals(),
            )?,
            calibration,
        })
    }

    fn remember(&mut self, appraisal: Appraisal) -> U256 {
        if let Some((feed, entry)) = appraisal.calibration {
            self.store_heartbeat(feed, entry);
        }
        appraisal.value
    }

    fn borrow_maximum(&self, value: U256) -> PoolResult<U256> {
        math::wad_mul(value, self.config()?.max_loan_fraction)
    }

    fn auction_price(&self, collateral: &Collateral) -> PoolResult<U256> {
        let loan = self.stored_loan(&(collateral.collection, collateral.item_id))?;
        let opens = loan.liquidatable_at();
        let now = self.now();
        if now < opens {
            return Err(PoolError::TooEarly.into());
        }
        let value = self.appraise(collateral)?.value;
        loan::auction_price(value, now - opens)
    }

    /// Current value and late penalty of a loan.
    fn quote(&self, collection: Address, item_id: U256) -> PoolResult<(U256, U256)> {
        let loan = self.stored_loan(&(collection, item_id))?;
        let value = self.projected_ledger()?.loan_tokens(loan.borrow_shares)?;
        let penalty = loan.late_penalty(value, self.now())?;
        Ok((value, penalty))
    }

    /// Pulls `amount` of the pool asset from `from`, who approved the pool.
    fn pull(&self, from: Address, amount: U256) -> PoolResult<()> {
        if !amount.is_zero() {
            self.asset()?
                .transfer_from(from, self.env().self_address(), amount);
        }
        Ok(())
    }

    fn pay(&self, to: Address, amount: U256) -> PoolResult<()> {
        if !amount.is_zero() {
            self.asset()?.transfer(to, amount);
        }
        Ok(())
    }

    fn move_nft(&self, collection: Address, from: Address, to: Address, item_id: U256) {
        CollateralCollectionContractRef::new(self.env(), collection).transfer_from(from, to, item_id);
    }

    fn execute_deposit(&mut self, amount: U256, depositor: Address) -> PoolResult<U256> {
        if amount.is_zero() {
            return Err(PoolError::ZeroAmount.into());
        }
        let (mut ledger, curve) = self.prepare()?;
        let shares = ledger.deposit(amount)?;
        self.credit_internal(depositor, shares)?;
        self.pull(depositor, amount)?;
        self.finish(ledger, curve, false)?;

        self.env().emit_event(events::FundsDeposited {
            depositor,
            amount,
            shares,
        });
        Ok(shares)
    }

    fn execute_withdraw(&mut self, shares: U256, depositor: Address) -> PoolResult<U256> {
        if shares.is_zero() {
            return Err(PoolError::ZeroAmount.into());
        }
        let (mut ledger, curve) = self.prepare()?;

        let internal = self.internal_shares.get(&depositor).unwrap_or_default();
        let from_internal = shares.min(internal);
        let from_tokens = shares - from_internal;
        if from_tokens > self.share_token.balance_of(&depositor) {
            return Err(PoolError::InsufficientShares.into());
        }

        let amount = ledger.withdraw(shares)?;
        self.internal_shares.set(&depositor, internal - from_internal);
        if !from_tokens.is_zero() {
            self.share_token.raw_burn(&depositor, &from_tokens);
        }
        self.pay(depositor, amount)?;
        self.finish(ledger, curve, false)?;

        self.env().emit_event(events::FundsWithdrawn {
            depositor,
            amount,
            shares,
        });
        Ok(amount)
    }

    fn execute_borrow(
        &mut self,
        borrower: Address,
        collateral: Collateral,
        amount: U256,
    ) -> PoolResult<()> {
        if amount.is_zero() {
            return Err(PoolError::ZeroAmount.into());
        }
        let key = (collateral.collection, collateral.item_id);
        if self.loans.get(&key).flatten().is_some() {
            return Err(PoolError::LoanAlreadyExists.into());
        }
        let (mut ledger, curve) = self.prepare()?;

        let appraisal = self.appraise(&collateral)?;
        let value = self.remember(appraisal);
        if amount > self.borrow_maximum(value)? {
            return Err(PoolError::LoanTooLarge.into());
        }

        let borrow_shares = ledger.borrow(amount)?;
        let now = self.now();
        self.loans
            .set(&key, Some(Loan::new(borrower, borrow_shares, amount, now)));

        let this = self.env().self_address();
        self.move_nft(collateral.collection, borrower, this, collateral.item_id);
        self.pay(borrower, amount)?;
        self.finish(ledger, curve, true)?;

        self.env().emit_event(events::FundsBorrowed {
            borrower,
            collection: collateral.collection,
            item_id: collateral.item_id,
            amount,
            borrow_shares,
        });
        Ok(())
    }

    fn execute_borrow_more(
        &mut self,
        borrower: Address,
        collateral: Collateral,
        amount: U256,
    ) -> PoolResult<()> {
        if amount.is_zero() {
            return Err(PoolError::ZeroAmount.into());
        }
        let key = (collateral.collection, collateral.item_id);
        let mut loan = self.stored_loan(&key)?;
        if loan.owner != borrower {
            return Err(PoolError::NotLoanOwner.into());
        }
        if loan.is_overdue(self.now()) {
            return Err(PoolError::PaybackFirst.into());
        }
        let (mut ledger, curve) = self.prepare()?;

        let appraisal = self.appraise(&collateral)?;
        let value = self.remember(appraisal);
        let current = ledger.loan_tokens(loan.borrow_shares)?;
        let predicted = curve.predict_future_loan_value(math::add(current, amount)?)?;
        if predicted > self.borrow_maximum(value)? {
            return Err(PoolError::LoanTooLarge.into());
        }

        let borrow_shares = ledger.borrow(amount)?;
        loan.borrow_shares = math::add(loan.borrow_shares, borrow_shares)?;
        loan.principal_tokens = math::add(loan.principal_tokens, amount)?;
        self.loans.set(&key, Some(loan));

        self.pay(borrower, amount)?;
        self.finish(ledger, curve, true)?;

        self.env().emit_event(events::FundsBorrowedMore {
            borrower,
            collection: collateral.collection,
            item_id: collateral.item_id,
            amount,
            borrow_shares,
        });
        Ok(())
    }

    fn execute_payback(
        &mut self,
        payer: Address,
        collateral: Collateral,
        amount: U256,
    ) -> PoolResult<()> {
        if amount.is_zero() {
            return Err(PoolError::ZeroAmount.into());
        }
        let key = (collateral.collection, collateral.item_id);
        let mut loan = self.stored_loan(&key)?;
        let (mut ledger, curve) = self.prepare()?;
        let fee = self.config()?.fee;
        let now = self.now();

        let value = ledger.loan_tokens(loan.borrow_shares)?;
        let penalty = loan.late_penalty(value, now)?;
        let full_quote = math::add(value, penalty)?;
        let closed = amount >= full_quote;

        let paid = if closed {
            ledger.repay_full(loan.borrow_shares, value)?;
            self.loans.set(&key, None);
            full_quote
        } else {
            if amount < penalty {
                return Err(PoolError::PaymentBelowPenalty.into());
            }
            let burned = ledger.repay_partial(amount - penalty, loan.borrow_shares)?;
            let principal_cut = math::mul_div(loan.principal_tokens, burned, loan.borrow_shares)?;
            loan.borrow_shares = math::sub(loan.borrow_shares, burned)?;
            loan.principal_tokens = math::sub(loan.principal_tokens, principal_cut)?;
            loan.last_paid_time = now;

            let appraisal = self.appraise(&collateral)?;
            let collateral_value = self.remember(appraisal);
            let remaining = ledger.loan_tokens(loan.borrow_shares)?;
            if curve.predict_future_loan_value(remaining)? > self.borrow_maximum(collateral_value)? {
                return Err(PoolError::LoanTooLarge.into());
            }
            self.loans.set(&key, Some(loan.clone()));
            amount
        };

        let profit = ledger.collect_penalty(penalty, fee)?;
        self.settle_profit(&ledger, profit)?;

        self.pull(payer, paid)?;
        if closed {
            let this = self.env().self_address();
            self.move_nft(collateral.collection, this, loan.owner, collateral.item_id);
        }
        self.finish(ledger, curve, true)?;

        self.env().emit_event(events::FundsPaidBack {
            payer,
            collection: collateral.collection,
            item_id: collateral.item_id,
            amount: paid,
            penalty,
            closed,
        });
        Ok(())
    }

    fn execute_liquidation(&mut self, liquidator: Address, collateral: Collateral) -> PoolResult<()> {
        let key = (collateral.collection, collateral.item_id);
        let loan = self.stored_loan(&key)?;
        let now = self.now();
        let opens = loan.liquidatable_at();
        if now < opens {
            return Err(PoolError::TooEarly.into());
        }
        let (mut ledger, curve) = self.prepare()?;
        let fee = self.config()?.fee;

        let appraisal = self.appraise(&collateral)?;
        let value = self.remember(appraisal);
        let price = loan::auction_price(value, now - opens)?;
        let owed = ledger.loan_tokens(loan.borrow_shares)?;

        let outcome = ledger.liquidate(loan.borrow_shares, owed, price, fee)?;
        self.loans.set(&key, None);
        self.settle_profit(&ledger, outcome.profit)?;
        if !outcome.shortfall.is_zero() {
            self.env().emit_event(events::BadDebtChanged {
                bad_debt: ledger.bad_debt,
            });
        }

        self.pull(liquidator, price)?;
        let this = self.env().self_address();
        self.move_nft(collateral.collection, this, liquidator, collateral.item_id);
        self.finish(ledger, curve, true)?;

        self.env().emit_event(events::LoanLiquidated {
            liquidator,
            collection: collateral.collection,
            item_id: collateral.item_id,
            price,
            owed,
            shortfall: outcome.shortfall,
        });
        Ok(())
    }
}
