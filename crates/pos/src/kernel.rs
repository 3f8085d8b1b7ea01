//! Stake modifier chaining and the kernel hash predicate.
//!
//! The kernel protocol: input 0 of a coinstake meets the target when
//! `sha256d(modifier || blockFromTime || prevout.hash || prevout.index ||
//! nTimeTx) <= target * amount`. The modifier chains through every accepted
//! block so nobody can precompute proofs for future tips, and the prevout
//! fields decorrelate stakers hashing at the same second. This serialization
//! is consensus-critical; reordering or resizing any field forks the chain.

use blackd_chainstate::index::BlockIndexEntry;
use blackd_consensus::{ConsensusParams, Hash256};
use blackd_log::{log_category, Category};
use blackd_primitives::encoding::{Encodable, Encoder};
use blackd_primitives::hash::sha256d;
use blackd_primitives::hash256_to_hex;
use blackd_primitives::outpoint::OutPoint;

use crate::target::{hash_to_u256, weighted_target};

/// Modifier for the block following `prev`: sha256d(kernel || prev modifier).
/// Genesis has no predecessor and takes the zero modifier.
pub fn compute_stake_modifier(prev: Option<&BlockIndexEntry>, kernel: &Hash256) -> Hash256 {
    let Some(prev) = prev else {
        return [0u8; 32];
    };

    let mut encoder = Encoder::new();
    encoder.write_hash_le(kernel);
    encoder.write_hash_le(&prev.stake_modifier);
    sha256d(&encoder.into_inner())
}

/// The proof hash for one (prevout, attempt-time) pair. Pure; no target
/// comparison.
pub fn stake_kernel_hash(
    stake_modifier: &Hash256,
    block_from_time: u32,
    prevout: &OutPoint,
    time_tx: u32,
) -> Hash256 {
    let mut encoder = Encoder::new();
    encoder.write_hash_le(stake_modifier);
    encoder.write_u32_le(block_from_time);
    prevout.consensus_encode(&mut encoder);
    encoder.write_u32_le(time_tx);
    sha256d(&encoder.into_inner())
}

/// Check whether the kernel at `prevout` satisfies the weighted target at
/// `time_tx`. Returns false (and logs) on any precondition violation.
pub fn check_stake_kernel_hash(
    prev: &BlockIndexEntry,
    bits: u32,
    block_from_time: u32,
    amount: i64,
    prevout: &OutPoint,
    time_tx: u32,
) -> bool {
    if time_tx < block_from_time {
        log_category!(
            Category::Coinstake,
            "check_stake_kernel_hash: nTime violation ({time_tx} < {block_from_time})"
        );
        return false;
    }

    if amount <= 0 {
        log_category!(Category::Coinstake, "check_stake_kernel_hash: amount is zero");
        return false;
    }

    let target = match weighted_target(bits, amount) {
        Ok(target) => target,
        Err(err) => {
            log_category!(Category::Coinstake, "check_stake_kernel_hash: {err}");
            return false;
        }
    };

    let proof = stake_kernel_hash(&prev.stake_modifier, block_from_time, prevout, time_tx);
    let accepted = hash_to_u256(&proof) <= target;

    log_category!(
        Category::Coinstake,
        "check_stake_kernel_hash: modifier={} blockFromTime={} prevout={}:{} nTimeTx={} proof={} accepted={}",
        hash256_to_hex(&prev.stake_modifier),
        block_from_time,
        hash256_to_hex(&prevout.hash),
        prevout.index,
        time_tx,
        hash256_to_hex(&proof),
        accepted
    );

    accepted
}

/// Whether a coinstake timestamp is acceptable for a block timestamp. Under
/// protocol V2 the two must match and sit on a mask boundary; before V2 they
/// only need to match.
pub fn check_coinstake_timestamp(params: &ConsensusParams, time_block: i64, time_tx: i64) -> bool {
    if params.is_protocol_v2(time_block) {
        time_block == time_tx && (time_tx & i64::from(params.stake_timestamp_mask)) == 0
    } else {
        time_block == time_tx
    }
}

/// Header-only specialization of [`check_coinstake_timestamp`].
pub fn check_stake_block_timestamp(params: &ConsensusParams, time_block: i64) -> bool {
    check_coinstake_timestamp(params, time_block, time_block)
}
