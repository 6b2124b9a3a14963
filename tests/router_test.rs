//! Router tests: forwarding and moving liquidity between pools.

mod common;

use odra::casper_types::U256;
use odra::host::{Deployer, HostRef};
use odra::prelude::*;

use common::{pool_config, setup, tokens, Fixture};
use pool_lending::errors::PoolError;
use pool_lending::pool::{LendingPool, LendingPoolHostRef, LendingPoolInitArgs};
use pool_lending::tokens::{TestAsset, TestAssetInitArgs};

fn second_pool(f: &Fixture, asset: Address) -> LendingPoolHostRef {
    f.env.set_caller(f.controller);
    LendingPool::deploy(
        &f.env,
        LendingPoolInitArgs {
            config: pool_config(asset, f.feed.address(), f.router.address(), f.fee_destination),
            collections: vec![f.collection.address()],
            roots: vec![f.tree.root()],
        },
    )
}

#[test]
fn test_router_passes_caller_as_depositor() {
    let mut f = setup();
    let depositor = f.depositor;
    f.deposit(depositor, tokens(50));

    assert_eq!(f.pool.internal_shares_of(depositor), tokens(50));
    assert_eq!(f.pool.internal_shares_of(f.router.address()), U256::zero());
    assert_eq!(f.asset.balance_of(f.pool.address()), tokens(50));
}

#[test]
fn test_move_funds_between_pools_of_same_asset() {
    let mut f = setup();
    let depositor = f.depositor;
    let target = second_pool(&f, f.asset.address());
    let shares = f.deposit(depositor, tokens(1000));

    f.env.set_caller(depositor);
    f.asset.approve(target.address(), tokens(1000));
    let minted = f
        .router
        .move_funds(shares, f.pool.address(), target.address());

    assert_eq!(minted, tokens(1000));
    assert_eq!(f.pool.total_pool(), U256::zero());
    assert_eq!(f.pool.internal_shares_of(depositor), U256::zero());
    assert_eq!(target.total_pool(), tokens(1000));
    assert_eq!(target.internal_shares_of(depositor), minted);
    assert_eq!(f.asset.balance_of(depositor), U256::zero());
    assert_eq!(f.router.moves_count(), 1);
}

#[test]
fn test_move_funds_across_assets_reverts() {
    let mut f = setup();
    let depositor = f.depositor;
    f.env.set_caller(f.controller);
    let other_asset = TestAsset::deploy(
        &f.env,
        TestAssetInitArgs {
            symbol: "tEUR".to_string(),
            name: "Test EUR".to_string(),
            decimals: 18,
        },
    );
    let target = second_pool(&f, other_asset.address());
    let shares = f.deposit(depositor, tokens(100));

    f.env.set_caller(depositor);
    let err = f
        .router
        .try_move_funds(shares, f.pool.address(), target.address())
        .unwrap_err();
    assert_eq!(err, PoolError::TokenMismatch.into());
    assert_eq!(f.pool.internal_shares_of(depositor), shares);
    assert_eq!(f.router.moves_count(), 0);
}

#[test]
fn test_failed_move_leaves_source_untouched() {
    let mut f = setup();
    let depositor = f.depositor;
    let target = second_pool(&f, f.asset.address());
    let shares = f.deposit(depositor, tokens(100));

    // no allowance for the target pool
    f.env.set_caller(depositor);
    assert!(f
        .router
        .try_move_funds(shares, f.pool.address(), target.address())
        .is_err());
    assert_eq!(f.pool.internal_shares_of(depositor), shares);
    assert_eq!(f.pool.total_pool(), tokens(100));
    assert_eq!(target.total_pool(), U256::zero());
}
