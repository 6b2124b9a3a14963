//! Oracle heartbeat estimation.
//!
//! A feed's heartbeat is the longest gap it normally leaves between updates.
//! It is estimated from the recent round history as the second-largest gap,
//! which tolerates a single outage without inflating the estimate.

use alloc::vec::Vec;

use odra::prelude::*;

use crate::errors::{PoolError, PoolResult};
use crate::price_feed::{PriceFeedContractRef, RoundData};

/// Rounds inspected per calibration, latest included.
pub const MAX_ROUNDS: u64 = 50;

#[odra::odra_type]
pub struct HeartbeatEntry {
    /// Seconds.
    pub heartbeat: u64,
    pub last_recalibration_round: u64,
    pub recalibrated_at: u64,
}

/// Second-largest gap between consecutive update times.
///
/// A single gap is used as is. Input order does not matter.
pub fn estimate_heartbeat(timestamps: &[u64]) -> PoolResult<u64> {
    if timestamps.len() < 2 {
        return Err(PoolError::InsufficientRoundHistory.into());
    }
    let mut sorted = timestamps.to_vec();
    sorted.sort_unstable();

    let mut largest = 0u64;
    let mut second = 0u64;
    for pair in sorted.windows(2) {
        let gap = pair[1] - pair[0];
        if gap > largest {
            second = largest;
            largest = gap;
        } else if gap > second {
            second = gap;
        }
    }
    if sorted.len() == 2 {
        return Ok(largest);
    }
    Ok(second)
}

/// Walks back from the latest round and estimates the feed's heartbeat.
pub fn calibrate(feed: &PriceFeedContractRef, now: u64) -> PoolResult<HeartbeatEntry> {
    let latest = feed.latest_round_data();
    let mut timestamps = Vec::new();
    timestamps.push(latest.updated_at);

    for back in 1..MAX_ROUNDS {
        if back >= latest.round_id {
            break;
        }
        match feed.get_round_data(latest.round_id - back) {
            Some(round) => timestamps.push(round.updated_at),
            None => break,
        }
    }

    Ok(HeartbeatEntry {
        heartbeat: estimate_heartbeat(&timestamps)?,
        last_recalibration_round: latest.round_id,
        recalibrated_at: now,
    })
}

/// Fails with `DeadLink` once the round is older than the heartbeat allows.
pub fn ensure_fresh(round: &RoundData, entry: &HeartbeatEntry, now: u64) -> PoolResult<()> {
    if now.saturating_sub(round.updated_at) > entry.heartbeat {
        return Err(PoolError::DeadLink.into());
    }
    Ok(())
}
