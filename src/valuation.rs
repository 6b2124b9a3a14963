//! Collateral valuation.
//!
//! Each collection publishes a Merkle root over `(index, item_id, value)`
//! leaves. A borrower proves the claimed value of an item, and the value is
//! converted into pool asset units with the collection's price feed.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use odra::casper_types::bytesrepr::Bytes;
use odra::casper_types::U256;

use crate::errors::{PoolError, PoolResult};
use crate::math;

type Blake2b256 = Blake2b<U32>;

pub type Hash = [u8; 32];

fn finalize(hasher: Blake2b256) -> Hash {
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

fn be_bytes(value: U256) -> Hash {
    let mut out = [0u8; 32];
    value.to_big_endian(&mut out);
    out
}

/// `blake2b-256(index || item_id || value)`, all big-endian.
pub fn leaf_hash(index: u32, item_id: U256, value: U256) -> Hash {
    let mut hasher = Blake2b256::new();
    hasher.update(index.to_be_bytes());
    hasher.update(be_bytes(item_id));
    hasher.update(be_bytes(value));
    finalize(hasher)
}

/// Hashes two nodes smallest first.
pub fn hash_pair(a: &Hash, b: &Hash) -> Hash {
    let (left, right) = if a <= b { (a, b) } else { (b, a) };
    let mut hasher = Blake2b256::new();
    hasher.update(left);
    hasher.update(right);
    finalize(hasher)
}

/// Reads a 32 byte node.
pub fn to_hash(node: &Bytes) -> Option<Hash> {
    if node.len() != 32 {
        return None;
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(node);
    Some(out)
}

pub fn verify_proof(root: &Hash, leaf: Hash, proof: &[Bytes]) -> PoolResult<()> {
    let mut node = leaf;
    for sibling in proof {
        let sibling = to_hash(sibling).ok_or(PoolError::InvalidProof)?;
        node = hash_pair(&node, &sibling);
    }
    if &node != root {
        return Err(PoolError::InvalidProof.into());
    }
    Ok(())
}

/// `claimed_value * 10^decimals / answer`.
pub fn to_pool_units(claimed_value: U256, answer: U256, decimals: u8) -> PoolResult<U256> {
    if answer.is_zero() {
        return Err(PoolError::InvalidPrice.into());
    }
    math::mul_div(claimed_value, U256::exp10(decimals as usize), answer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn bytes(hash: Hash) -> Bytes {
        Bytes::from(hash.to_vec())
    }

    #[test]
    fn pair_hash_is_order_independent() {
        let a = leaf_hash(0, U256::from(1u64), U256::from(10u64));
        let b = leaf_hash(1, U256::from(2u64), U256::from(20u64));
        assert_eq!(hash_pair(&a, &b), hash_pair(&b, &a));
        assert_ne!(a, b);
    }

    #[test]
    fn four_leaf_tree_proves_every_leaf() {
        let leaves: Vec<Hash> = (0..4u32)
            .map(|i| leaf_hash(i, U256::from(100 + i), U256::from(1_000 * (i + 1))))
            .collect();
        let left = hash_pair(&leaves[0], &leaves[1]);
        let right = hash_pair(&leaves[2], &leaves[3]);
        let root = hash_pair(&left, &right);

        verify_proof(&root, leaves[0], &[bytes(leaves[1]), bytes(right)]).unwrap();
        verify_proof(&root, leaves[3], &[bytes(leaves[2]), bytes(left)]).unwrap();
    }

    #[test]
    fn tampered_value_fails() {
        let leaf = leaf_hash(0, U256::from(7u64), U256::from(200u64));
        let sibling = leaf_hash(1, U256::from(8u64), U256::from(300u64));
        let root = hash_pair(&leaf, &sibling);

        let forged = leaf_hash(0, U256::from(7u64), U256::from(201u64));
        assert_eq!(
            verify_proof(&root, forged, &[bytes(sibling)]).unwrap_err(),
            PoolError::InvalidProof.into()
        );
        assert_eq!(
            verify_proof(&root, leaf, &[Bytes::from(vec![1u8; 31])]).unwrap_err(),
            PoolError::InvalidProof.into()
        );
    }

    #[test]
    fn single_leaf_tree_has_empty_proof() {
        let leaf = leaf_hash(0, U256::from(1u64), U256::from(1u64));
        verify_proof(&leaf, leaf, &[]).unwrap();
    }

    #[test]
    fn conversion_uses_feed_decimals() {
        let value = U256::from(200u64);
        assert_eq!(
            to_pool_units(value, U256::exp10(18), 18).unwrap(),
            U256::from(200u64)
        );
        // one pool unit costs two valuation units
        assert_eq!(
            to_pool_units(value, U256::from(200u64), 2).unwrap(),
            U256::from(100u64)
        );
        assert_eq!(
            to_pool_units(value, U256::zero(), 18).unwrap_err(),
            PoolError::InvalidPrice.into()
        );
    }
}
