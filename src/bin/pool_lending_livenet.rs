//! Livenet deploy and demo binary for the NFT lending pool.
//!
//! Run with:
//! - Deploy only:       POOL_LIVENET_MODE=deploy cargo run --bin pool_lending_livenet --features=livenet
//! - Deploy + demo:     POOL_LIVENET_MODE=deploy_and_demo cargo run --bin pool_lending_livenet --features=livenet
//! - Query existing:    POOL_LIVENET_MODE=query POOL_EXISTING_POOL=... POOL_EXISTING_ROUTER=... cargo run ...
//!
//! Required environment variables (Odra livenet):
//! - ODRA_CASPER_LIVENET_SECRET_KEY_PATH
//! - ODRA_CASPER_LIVENET_NODE_ADDRESS
//! - ODRA_CASPER_LIVENET_EVENTS_URL
//! - ODRA_CASPER_LIVENET_CHAIN_NAME
//!
//! Optional:
//! - ODRA_CASPER_LIVENET_DEPLOY_GAS          (motes)
//! - ODRA_CASPER_LIVENET_CALL_GAS            (motes)
//! - POOL_EXISTING_ASSET / POOL_EXISTING_FEED / POOL_EXISTING_COLLECTION
//!                                           (reuse instead of deploying test doubles)
//! - POOL_EXISTING_POOL / POOL_EXISTING_ROUTER
//! - POOL_MAX_LOAN_PERCENT                   (default: 50)
//! - POOL_FEE_PERCENT                        (default: 20)
//! - POOL_DEMO_DEPOSIT                       (whole tokens, default: 1000)
//! - POOL_DEMO_BORROW                        (whole tokens, default: 100)
//! - POOL_DEMO_ITEM_VALUE                    (whole tokens, default: 400)

use odra::casper_types::bytesrepr::Bytes;
use odra::casper_types::U256;
use odra::host::{Deployer, HostEnv, HostRef, HostRefLoader, NoArgs};
use odra::prelude::*;

use pool_lending::math::{percent, wad};
use pool_lending::pool::{LendingPool, LendingPoolHostRef, LendingPoolInitArgs, PoolConfig};
use pool_lending::price_feed::{TestPriceFeed, TestPriceFeedInitArgs};
use pool_lending::router::{PoolRouter, PoolRouterHostRef};
use pool_lending::tokens::{TestAsset, TestAssetInitArgs, TestCollection, TestCollectionInitArgs};
use pool_lending::valuation;

const DEFAULT_DEPLOY_GAS_MOTES: u64 = 600_000_000_000; // 600 CSPR
const DEFAULT_CALL_GAS_MOTES: u64 = 50_000_000_000; // 50 CSPR
const DEMO_ITEM_ID: u64 = 1;

fn main() {
    println!("============================================");
    println!("  NFT Lending Pool - Livenet");
    println!("============================================\n");

    let env = odra_casper_livenet_env::env();

    let mode = std::env::var("POOL_LIVENET_MODE").unwrap_or_else(|_| "deploy".to_string());
    let should_deploy = mode == "deploy" || mode == "deploy_and_demo";
    let should_demo = mode == "deploy_and_demo";

    let deploy_gas = read_u64_env("ODRA_CASPER_LIVENET_DEPLOY_GAS", DEFAULT_DEPLOY_GAS_MOTES);
    let call_gas = read_u64_env("ODRA_CASPER_LIVENET_CALL_GAS", DEFAULT_CALL_GAS_MOTES);
    let item_value = tokens(read_u64_env("POOL_DEMO_ITEM_VALUE", 400));

    println!("[INFO] Mode: {}", mode);
    println!("[INFO] Caller: {:?}", env.caller());
    println!("[INFO] Gas (motes): deploy={}, calls={}", deploy_gas, call_gas);
    println!();

    if !should_deploy {
        let pool = LendingPool::load(&env, required_address("POOL_EXISTING_POOL"));
        print_pool_state(&pool);
        return;
    }

    // ==========================================
    // Step 1: Asset, feed and collection
    // ==========================================
    env.set_gas(deploy_gas);
    let asset = match optional_address("POOL_EXISTING_ASSET") {
        Some(address) => address,
        None => {
            println!("[STEP 1] Deploying test asset...");
            let asset = TestAsset::deploy(
                &env,
                TestAssetInitArgs {
                    symbol: "tUSD".to_string(),
                    name: "Test USD".to_string(),
                    decimals: 18,
                },
            );
            asset.address()
        }
    };
    let feed = match optional_address("POOL_EXISTING_FEED") {
        Some(address) => address,
        None => {
            println!("[STEP 1] Deploying test price feed...");
            let mut feed = TestPriceFeed::deploy(&env, TestPriceFeedInitArgs { decimals: 18 });
            // two rounds an hour apart give the pool a one hour heartbeat
            let now = chrono::Utc::now().timestamp() as u64;
            env.set_gas(call_gas);
            feed.push_round_at(wad(), now - 3_600);
            feed.push_round_at(wad(), now);
            env.set_gas(deploy_gas);
            feed.address()
        }
    };
    let collection = match optional_address("POOL_EXISTING_COLLECTION") {
        Some(address) => address,
        None => {
            println!("[STEP 1] Deploying test collection...");
            let collection = TestCollection::deploy(
                &env,
                TestCollectionInitArgs {
                    name: "Demo Collateral".to_string(),
                },
            );
            collection.address()
        }
    };
    println!("[OK] asset: {:?}", asset);
    println!("[OK] feed: {:?}", feed);
    println!("[OK] collection: {:?}", collection);
    println!();

    // ==========================================
    // Step 2: Router and pool
    // ==========================================
    println!("[STEP 2] Deploying router and pool...");
    let mut router = match optional_address("POOL_EXISTING_ROUTER") {
        Some(address) => PoolRouter::load(&env, address),
        None => PoolRouter::deploy(&env, NoArgs),
    };
    let root = valuation::leaf_hash(0, U256::from(DEMO_ITEM_ID), item_value);
    let pool = LendingPool::deploy(
        &env,
        LendingPoolInitArgs {
            config: PoolConfig {
                pool_asset: asset,
                price_feed: feed,
                router: router.address(),
                fee_destination: env.caller(),
                max_loan_fraction: percent(read_u64_env("POOL_MAX_LOAN_PERCENT", 50)),
                fee: percent(read_u64_env("POOL_FEE_PERCENT", 20)),
                multiplicative_factor: percent(30),
                min_pole: percent(110),
                max_pole: percent(150),
                share_name: "Pool Share".to_string(),
                share_symbol: "PSH".to_string(),
            },
            collections: vec![collection],
            roots: vec![Bytes::from(root.to_vec())],
        },
    );
    println!("[OK] router: {:?}", router.address());
    println!("[OK] pool: {:?}", pool.address());
    println!();

    // ==========================================
    // Step 3: Demo flow
    // ==========================================
    if should_demo {
        env.set_gas(call_gas);
        run_demo(&env, &mut router, &pool, asset, collection, item_value);
    }

    print_pool_state(&pool);
    output_deploy_json(asset, feed, collection, router.address(), pool.address());
}

fn run_demo(
    env: &HostEnv,
    router: &mut PoolRouterHostRef,
    pool: &LendingPoolHostRef,
    asset: Address,
    collection: Address,
    item_value: U256,
) {
    let caller = env.caller();
    let deposit = tokens(read_u64_env("POOL_DEMO_DEPOSIT", 1000));
    let borrow = tokens(read_u64_env("POOL_DEMO_BORROW", 100));

    println!("[STEP 3] Depositing {} through the router...", deposit);
    let mut asset = TestAsset::load(env, asset);
    asset.faucet_mint(caller, deposit);
    asset.approve(pool.address(), deposit);
    let shares = router.deposit_funds(pool.address(), deposit);
    println!("[OK] shares minted: {}", shares);

    println!("[STEP 3] Borrowing {} against item {}...", borrow, DEMO_ITEM_ID);
    let mut nft = TestCollection::load(env, collection);
    nft.mint(caller, U256::from(DEMO_ITEM_ID));
    nft.approve(pool.address(), U256::from(DEMO_ITEM_ID));
    router.borrow_funds(
        pool.address(),
        collection,
        U256::from(DEMO_ITEM_ID),
        borrow,
        0,
        item_value,
        vec![],
    );
    println!("[OK] loan: {:?}", pool.current_loan(collection, U256::from(DEMO_ITEM_ID)));
    println!();
}

fn print_pool_state(pool: &LendingPoolHostRef) {
    println!("[STATE] pool {:?}", pool.address());
    println!("     total_pool: {}", pool.total_pool());
    println!("     pseudo_total_tokens_held: {}", pool.pseudo_total_tokens_held());
    println!("     total_tokens_due: {}", pool.total_tokens_due());
    println!("     bad_debt: {}", pool.bad_debt());
    println!("     utilisation: {}", pool.utilisation_rate());
    println!("     borrow_rate: {}", pool.borrow_rate());
    println!("     pole: {}", pool.pole());
    println!("     deposit_apy: {}", pool.current_deposit_apy());
    println!();
}

fn tokens(whole: u64) -> U256 {
    U256::from(whole) * wad()
}

fn read_u64_env(name: &str, default_value: u64) -> u64 {
    match std::env::var(name) {
        Ok(raw) => {
            let cleaned = raw.trim().replace('_', "");
            cleaned.parse::<u64>().unwrap_or(default_value)
        }
        Err(_) => default_value,
    }
}

fn optional_address(name: &str) -> Option<Address> {
    std::env::var(name)
        .ok()
        .filter(|raw| !raw.trim().is_empty())
        .map(|raw| parse_contract_address(&raw))
}

fn required_address(name: &str) -> Address {
    optional_address(name).unwrap_or_else(|| panic!("{} must be set", name))
}

fn output_deploy_json(
    asset: Address,
    feed: Address,
    collection: Address,
    router: Address,
    pool: Address,
) {
    let chain_name =
        std::env::var("ODRA_CASPER_LIVENET_CHAIN_NAME").unwrap_or_else(|_| "casper-test".to_string());

    println!(
        r#"POOL_DEPLOY_JSON={{"chain_name":"{}","asset":"{}","price_feed":"{}","collection":"{}","router":"{}","pool":"{}","deployed_at":"{}"}}"#,
        chain_name,
        format_address_hash(&asset),
        format_address_hash(&feed),
        format_address_hash(&collection),
        format_address_hash(&router),
        format_address_hash(&pool),
        chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ")
    );
}

fn format_address_hash(addr: &Address) -> String {
    let debug_str = format!("{:?}", addr);
    if let (Some(start), Some(end)) = (debug_str.find('['), debug_str.rfind(']')) {
        return debug_str[start + 1..end]
            .split(", ")
            .filter_map(|part| part.strip_prefix("0x").or_else(|| part.strip_prefix("0X")))
            .collect();
    }
    debug_str
}

fn parse_contract_address(raw: &str) -> Address {
    use odra::casper_types::account::AccountHash;
    use odra::casper_types::contracts::ContractPackageHash;

    fn decode_hex_32(s: &str) -> [u8; 32] {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            panic!("Invalid address hash (expected 64 hex): {}", s);
        }
        let mut out = [0u8; 32];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .unwrap_or_else(|_| panic!("Invalid hex in address: {}", s));
        }
        out
    }

    let trimmed = raw.trim();
    if let Some(hex) = trimmed.strip_prefix("account-hash-") {
        return Address::Account(AccountHash::new(decode_hex_32(hex)));
    }
    let hex = ["contract-package-", "package-", "hash-"]
        .iter()
        .find_map(|prefix| trimmed.strip_prefix(prefix))
        .unwrap_or(trimmed);
    Address::Contract(ContractPackageHash::new(decode_hex_32(hex)))
}
