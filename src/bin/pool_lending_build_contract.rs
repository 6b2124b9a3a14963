//! Build contract binary for Odra WASM generation
//!
//! This binary is compiled to WASM and contains the contract entry points.

#![cfg_attr(target_arch = "wasm32", no_std)]
#![cfg_attr(target_arch = "wasm32", no_main)]

#[cfg(target_arch = "wasm32")]
extern crate odra_casper_wasm_env;

#[cfg(target_arch = "wasm32")]
use odra_casper_wasm_env as _;
#[cfg(target_arch = "wasm32")]
use pool_lending::pool::LendingPool;
#[cfg(target_arch = "wasm32")]
use pool_lending::price_feed::TestPriceFeed;
#[cfg(target_arch = "wasm32")]
use pool_lending::router::PoolRouter;
#[cfg(target_arch = "wasm32")]
use pool_lending::tokens::{TestAsset, TestCollection};

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    panic!("pool_lending_build_contract is intended to be built for wasm32-unknown-unknown only");
}
