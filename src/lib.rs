//! NFT-collateralised lending pools on Casper (Odra)
//!
//! - `pool`: the lending pool contract, itself the CEP-18 token of its shares
//! - `router`: entry point that forwards user flows to pools
//! - `ledger`, `rate_curve`, `loan`, `valuation`, `heartbeat`: the pool's
//!   accounting and risk rules as plain, storable state
//! - `price_feed`, `tokens`: external contract interfaces and test doubles

#![cfg_attr(target_arch = "wasm32", no_std)]

extern crate alloc;

pub mod errors;
pub mod heartbeat;
pub mod ledger;
pub mod loan;
pub mod math;
pub mod pool;
pub mod price_feed;
pub mod rate_curve;
pub mod router;
pub mod tokens;
pub mod valuation;
