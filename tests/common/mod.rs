//! Shared deployment for the pool flow tests.

#![allow(dead_code)]

use odra::casper_types::bytesrepr::Bytes;
use odra::casper_types::U256;
use odra::host::{Deployer, HostEnv, HostRef, NoArgs};
use odra::prelude::*;

use pool_lending::math::{percent, wad, SECONDS_PER_DAY, SECONDS_PER_HOUR};
use pool_lending::pool::{LendingPool, LendingPoolHostRef, LendingPoolInitArgs, PoolConfig};
use pool_lending::price_feed::{TestPriceFeed, TestPriceFeedHostRef, TestPriceFeedInitArgs};
use pool_lending::router::{PoolRouter, PoolRouterHostRef};
use pool_lending::tokens::{
    TestAsset, TestAssetHostRef, TestAssetInitArgs, TestCollection, TestCollectionHostRef,
    TestCollectionInitArgs,
};
use pool_lending::valuation::{hash_pair, leaf_hash, Hash};

/// Items listed in the collection's Merkle tree: (item id, value in whole tokens).
pub const ITEMS: [(u64, u64); 4] = [(1, 200), (2, 200), (3, 400), (4, 1_000)];

pub fn tokens(whole: u64) -> U256 {
    U256::from(whole) * wad()
}

pub fn bytes(hash: Hash) -> Bytes {
    Bytes::from(hash.to_vec())
}

/// Four-leaf value tree over `ITEMS`.
pub struct ValueTree {
    leaves: Vec<Hash>,
}

impl ValueTree {
    pub fn new() -> Self {
        let leaves = ITEMS
            .iter()
            .enumerate()
            .map(|(index, (item, value))| {
                leaf_hash(index as u32, U256::from(*item), tokens(*value))
            })
            .collect();
        Self { leaves }
    }

    pub fn root(&self) -> Bytes {
        bytes(hash_pair(
            &hash_pair(&self.leaves[0], &self.leaves[1]),
            &hash_pair(&self.leaves[2], &self.leaves[3]),
        ))
    }

    pub fn proof(&self, index: usize) -> Vec<Bytes> {
        let sibling = index ^ 1;
        let other_pair = if index < 2 {
            hash_pair(&self.leaves[2], &self.leaves[3])
        } else {
            hash_pair(&self.leaves[0], &self.leaves[1])
        };
        vec![bytes(self.leaves[sibling]), bytes(other_pair)]
    }
}

pub struct Fixture {
    pub env: HostEnv,
    pub asset: TestAssetHostRef,
    pub feed: TestPriceFeedHostRef,
    pub collection: TestCollectionHostRef,
    pub router: PoolRouterHostRef,
    pub pool: LendingPoolHostRef,
    pub tree: ValueTree,
    pub controller: Address,
    pub depositor: Address,
    pub borrower: Address,
    pub liquidator: Address,
    pub fee_destination: Address,
}

pub fn pool_config(
    asset: Address,
    feed: Address,
    router: Address,
    fee_destination: Address,
) -> PoolConfig {
    PoolConfig {
        pool_asset: asset,
        price_feed: feed,
        router,
        fee_destination,
        max_loan_fraction: percent(50),
        fee: percent(20),
        multiplicative_factor: percent(30),
        min_pole: percent(110),
        max_pole: percent(150),
        share_name: "Pool Share".to_string(),
        share_symbol: "PSH".to_string(),
    }
}

/// Deploys asset, feed, collection, router and one pool. The feed has an
/// hourly history, so the pool sees a one hour heartbeat.
pub fn setup() -> Fixture {
    let env = odra_test::env();
    let controller = env.get_account(0);
    let depositor = env.get_account(1);
    let borrower = env.get_account(2);
    let liquidator = env.get_account(3);
    let fee_destination = env.get_account(4);

    env.advance_block_time(SECONDS_PER_DAY * 1000);
    env.set_caller(controller);

    let asset = TestAsset::deploy(
        &env,
        TestAssetInitArgs {
            symbol: "tUSD".to_string(),
            name: "Test USD".to_string(),
            decimals: 18,
        },
    );
    let mut feed = TestPriceFeed::deploy(&env, TestPriceFeedInitArgs { decimals: 18 });
    let now = env.block_time() / 1000;
    for hours_ago in [3u64, 2, 1, 0] {
        feed.push_round_at(wad(), now - hours_ago * SECONDS_PER_HOUR);
    }
    let collection = TestCollection::deploy(
        &env,
        TestCollectionInitArgs {
            name: "Collateral".to_string(),
        },
    );
    let router = PoolRouter::deploy(&env, NoArgs);
    let tree = ValueTree::new();
    let pool = LendingPool::deploy(
        &env,
        LendingPoolInitArgs {
            config: pool_config(asset.address(), feed.address(), router.address(), fee_destination),
            collections: vec![collection.address()],
            roots: vec![tree.root()],
        },
    );

    Fixture {
        env,
        asset,
        feed,
        collection,
        router,
        pool,
        tree,
        controller,
        depositor,
        borrower,
        liquidator,
        fee_destination,
    }
}

impl Fixture {
    pub fn advance(&self, seconds: u64) {
        self.env.advance_block_time(seconds * 1000);
    }

    pub fn now(&self) -> u64 {
        self.env.block_time() / 1000
    }

    /// Publishes a new round at the current time.
    pub fn refresh_feed(&mut self) {
        self.feed.push_round(wad());
    }

    /// Mints `amount` to `account` and approves the pool for it.
    pub fn fund(&mut self, account: Address, amount: U256) {
        self.env.set_caller(account);
        self.asset.faucet_mint(account, amount);
        self.asset.approve(self.pool.address(), amount);
    }

    pub fn deposit(&mut self, account: Address, amount: U256) -> U256 {
        self.fund(account, amount);
        self.router.deposit_funds(self.pool.address(), amount)
    }

    /// Mints item `ITEMS[index]` to the borrower and approves the pool for it.
    pub fn lend_item(&mut self, index: usize) {
        let item = U256::from(ITEMS[index].0);
        self.env.set_caller(self.borrower);
        self.collection.mint(self.borrower, item);
        self.collection.approve(self.pool.address(), item);
    }

    pub fn try_borrow(&mut self, index: usize, amount: U256) -> Result<(), OdraError> {
        let (item, value) = ITEMS[index];
        self.env.set_caller(self.borrower);
        self.router.try_borrow_funds(
            self.pool.address(),
            self.collection.address(),
            U256::from(item),
            amount,
            index as u32,
            tokens(value),
            self.tree.proof(index),
        )
    }

    pub fn borrow(&mut self, index: usize, amount: U256) {
        self.lend_item(index);
        self.try_borrow(index, amount).unwrap();
    }

    pub fn try_payback(&mut self, payer: Address, index: usize, amount: U256) -> Result<(), OdraError> {
        let (item, value) = ITEMS[index];
        self.fund(payer, amount);
        self.router.try_payback_funds(
            self.pool.address(),
            self.collection.address(),
            U256::from(item),
            amount,
            index as u32,
            tokens(value),
            self.tree.proof(index),
        )
    }

    pub fn try_liquidate(&mut self, index: usize, budget: U256) -> Result<(), OdraError> {
        let (item, value) = ITEMS[index];
        self.fund(self.liquidator, budget);
        self.router.try_liquidate_nft(
            self.pool.address(),
            self.collection.address(),
            U256::from(item),
            index as u32,
            tokens(value),
            self.tree.proof(index),
        )
    }

    pub fn auction_price(&self, index: usize) -> U256 {
        let (item, value) = ITEMS[index];
        self.pool.get_current_auction_price(
            self.collection.address(),
            U256::from(item),
            index as u32,
            tokens(value),
            self.tree.proof(index),
        )
    }

    pub fn item(&self, index: usize) -> U256 {
        U256::from(ITEMS[index].0)
    }

    /// `pseudo_total == 1 + total_pool + total_due + bad_debt`
    pub fn assert_identity(&self) {
        assert_eq!(
            self.pool.pseudo_total_tokens_held(),
            U256::one() + self.pool.total_pool() + self.pool.total_tokens_due() + self.pool.bad_debt()
        );
    }
}
