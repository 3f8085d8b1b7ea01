//! Full coinstake validation: kernel target, maturity, and signature.

use blackd_chainstate::coins::UtxoView;
use blackd_chainstate::index::{ancestor_at, BlockIndexEntry, ChainView};
use blackd_chainstate::validation::{BlockValidationResult, ValidationFailure};
use blackd_consensus::ConsensusParams;
use blackd_log::{log_category, Category};
use blackd_primitives::hash256_to_hex;
use blackd_primitives::outpoint::OutPoint;
use blackd_primitives::transaction::Transaction;
use blackd_script::verify_input_signature;

use crate::cache::StakeCache;
use crate::kernel::check_stake_kernel_hash;

/// Validate a coinstake transaction against the chain at `prev`.
///
/// Kernel failure is reported as `HeaderSync`: during initial download the
/// predecessor's modifier may not be reconstructible yet, so the caller
/// defers rather than bans.
pub fn check_proof_of_stake(
    prev: &BlockIndexEntry,
    tx: &Transaction,
    bits: u32,
    chain: &dyn ChainView,
    view: &dyn UtxoView,
    params: &ConsensusParams,
    time_tx: u32,
) -> Result<(), ValidationFailure> {
    if !tx.is_coinstake() {
        return Err(ValidationFailure::new(
            BlockValidationResult::InvalidConsensus,
            "non-coinstake",
            format!(
                "check_proof_of_stake called on non-coinstake {}",
                hash256_to_hex(&tx.txid())
            ),
        ));
    }

    // Kernel (input 0) must match the stake hash target per weighted bits.
    let kernel_input = &tx.vin[0];

    let Some(coin) = view.get_coin(&kernel_input.prevout) else {
        return Err(ValidationFailure::new(
            BlockValidationResult::InvalidHeader,
            "stake-prevout-not-exist",
            format!(
                "stake prevout does not exist {}:{}",
                hash256_to_hex(&kernel_input.prevout.hash),
                kernel_input.prevout.index
            ),
        ));
    };

    let depth = prev.height + 1 - coin.height as i32;
    if depth < params.coinbase_maturity {
        return Err(ValidationFailure::new(
            BlockValidationResult::InvalidHeader,
            "stake-prevout-not-mature",
            format!(
                "stake prevout is not mature, expecting {} and only matured to {}",
                params.coinbase_maturity, depth
            ),
        ));
    }

    let Some(block_from) = ancestor_at(chain, prev, coin.height as i32) else {
        return Err(ValidationFailure::new(
            BlockValidationResult::InvalidHeader,
            "stake-prevout-not-loaded",
            format!(
                "block at height {} for prevout can not be loaded",
                coin.height
            ),
        ));
    };

    if verify_input_signature(&coin.script_pubkey, tx, 0).is_err() {
        return Err(ValidationFailure::new(
            BlockValidationResult::InvalidHeader,
            "stake-verify-signature-failed",
            format!(
                "signature verification failed on coinstake {}",
                hash256_to_hex(&tx.txid())
            ),
        ));
    }

    let block_from_time = if coin.time != 0 {
        coin.time
    } else {
        block_from.time
    };
    if !check_stake_kernel_hash(
        prev,
        bits,
        block_from_time,
        coin.value,
        &kernel_input.prevout,
        time_tx,
    ) {
        // May occur during initial download or when behind on sync.
        return Err(ValidationFailure::new(
            BlockValidationResult::HeaderSync,
            "stake-check-kernel-failed",
            format!(
                "kernel check failed on coinstake {}",
                hash256_to_hex(&tx.txid())
            ),
        ));
    }

    Ok(())
}

/// Kernel pre-screen used by the timestamp search. With a cache, a passing
/// cached entry is re-verified through the uncached branch so a stale cache
/// after a reorg can never produce a false positive.
pub fn check_kernel(
    prev: &BlockIndexEntry,
    bits: u32,
    time_tx: u32,
    prevout: &OutPoint,
    chain: &dyn ChainView,
    view: &dyn UtxoView,
    params: &ConsensusParams,
    cache: Option<&StakeCache>,
) -> bool {
    let Some(entry) = cache.and_then(|cache| cache.get(prevout)) else {
        return check_kernel_uncached(prev, bits, time_tx, prevout, chain, view, params);
    };

    if !check_stake_kernel_hash(
        prev,
        bits,
        entry.block_from_time,
        entry.amount,
        prevout,
        time_tx,
    ) {
        return false;
    }

    check_kernel_uncached(prev, bits, time_tx, prevout, chain, view, params)
}

fn check_kernel_uncached(
    prev: &BlockIndexEntry,
    bits: u32,
    time_tx: u32,
    prevout: &OutPoint,
    chain: &dyn ChainView,
    view: &dyn UtxoView,
    params: &ConsensusParams,
) -> bool {
    let Some(coin) = view.get_coin(prevout) else {
        return false;
    };

    let depth = prev.height + 1 - coin.height as i32;
    if depth < params.coinbase_maturity {
        log_category!(Category::Coinstake, "check_kernel: coin is not mature");
        return false;
    }

    let Some(block_from) = ancestor_at(chain, prev, coin.height as i32) else {
        log_category!(Category::Coinstake, "check_kernel: could not find origin block");
        return false;
    };

    let block_from_time = if coin.time != 0 {
        coin.time
    } else {
        block_from.time
    };
    check_stake_kernel_hash(prev, bits, block_from_time, coin.value, prevout, time_tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use blackd_chainstate::coins::{Coin, MemoryUtxoView};
    use blackd_chainstate::index::MemoryChainView;
    use blackd_consensus::params::{consensus_params, Network};

    const EASY_BITS: u32 = 0x1f00ffff;

    fn entry(height: i32) -> BlockIndexEntry {
        BlockIndexEntry {
            hash: [height as u8; 32],
            prev_hash: [(height - 1).max(0) as u8; 32],
            height,
            time: 1_700_000_000 + height as u32 * 16,
            bits: EASY_BITS,
            stake_modifier: [0u8; 32],
            median_time_past: 1_700_000_000,
        }
    }

    fn chain_to(height: i32) -> MemoryChainView {
        MemoryChainView::new((0..=height).map(entry).collect(), EASY_BITS, EASY_BITS)
    }

    fn staked_coin() -> Coin {
        Coin {
            // Large enough to saturate the weighted target at EASY_BITS.
            value: 1_000_000_000,
            script_pubkey: vec![0x51],
            height: 2,
            is_coinbase: false,
            is_coinstake: true,
            time: 1_700_000_000,
        }
    }

    #[test]
    fn uncached_kernel_passes_for_mature_saturating_coin() {
        let params = consensus_params(Network::Regtest);
        let chain = chain_to(50);
        let prev = chain.tip().expect("tip");
        let view = MemoryUtxoView::new();
        let prevout = OutPoint::new([0x11; 32], 0);
        view.add(prevout.clone(), staked_coin());

        assert!(check_kernel(
            &prev,
            EASY_BITS,
            1_700_001_600,
            &prevout,
            &chain,
            &view,
            &params,
            None
        ));
    }

    #[test]
    fn cached_hit_is_rechecked_against_live_view() {
        let params = consensus_params(Network::Regtest);
        let chain = chain_to(50);
        let prev = chain.tip().expect("tip");
        let view = MemoryUtxoView::new();
        let prevout = OutPoint::new([0x22; 32], 0);
        view.add(prevout.clone(), staked_coin());

        let mut cache = StakeCache::new();
        cache.advance_to(&prev);
        cache.cache_kernel(&prevout, &prev, &chain, &view, &params);
        assert_eq!(cache.len(), 1);

        // With the coin still unspent the cached path agrees with the live one.
        assert!(check_kernel(
            &prev,
            EASY_BITS,
            1_700_001_600,
            &prevout,
            &chain,
            &view,
            &params,
            Some(&cache)
        ));

        // Spend the coin behind the cache's back: the cached pre-screen still
        // passes, the live re-check must veto.
        view.spend(&prevout);
        assert!(!check_kernel(
            &prev,
            EASY_BITS,
            1_700_001_600,
            &prevout,
            &chain,
            &view,
            &params,
            Some(&cache)
        ));
    }

    #[test]
    fn proof_of_stake_rejects_non_coinstake() {
        let params = consensus_params(Network::Regtest);
        let chain = chain_to(50);
        let prev = chain.tip().expect("tip");
        let view = MemoryUtxoView::new();

        let mut tx = Transaction::new();
        tx.vin
            .push(blackd_primitives::transaction::TxIn::new(OutPoint::null()));
        tx.vout.push(blackd_primitives::transaction::TxOut {
            value: 1,
            script_pubkey: vec![0x51],
        });

        let err = check_proof_of_stake(&prev, &tx, EASY_BITS, &chain, &view, &params, 1_700_001_600)
            .expect_err("non-coinstake");
        assert_eq!(err.reject_reason, "non-coinstake");
        assert_eq!(err.result, BlockValidationResult::InvalidConsensus);
        assert!(!err.is_transient());
    }

    fn coinstake_spending(prevout: &OutPoint) -> Transaction {
        let mut tx = Transaction::new();
        tx.time = 1_700_001_600;
        tx.vin
            .push(blackd_primitives::transaction::TxIn::new(prevout.clone()));
        tx.vout
            .push(blackd_primitives::transaction::TxOut::empty());
        tx.vout.push(blackd_primitives::transaction::TxOut {
            value: 1_000_000_100,
            script_pubkey: vec![0x51],
        });
        tx
    }

    #[test]
    fn proof_of_stake_reports_missing_and_immature_prevouts() {
        let params = consensus_params(Network::Regtest);
        let chain = chain_to(50);
        let prev = chain.tip().expect("tip");
        let view = MemoryUtxoView::new();
        let prevout = OutPoint::new([0x33; 32], 0);
        let tx = coinstake_spending(&prevout);

        let err = check_proof_of_stake(&prev, &tx, EASY_BITS, &chain, &view, &params, tx.time)
            .expect_err("missing prevout");
        assert_eq!(err.reject_reason, "stake-prevout-not-exist");
        assert_eq!(err.result, BlockValidationResult::InvalidHeader);

        let mut young = staked_coin();
        young.height = 45; // depth 6 < regtest maturity 10
        view.add(prevout.clone(), young);
        let err = check_proof_of_stake(&prev, &tx, EASY_BITS, &chain, &view, &params, tx.time)
            .expect_err("immature prevout");
        assert_eq!(err.reject_reason, "stake-prevout-not-mature");
    }

    #[test]
    fn proof_of_stake_reports_bad_signature_before_kernel() {
        let params = consensus_params(Network::Regtest);
        let chain = chain_to(50);
        let prev = chain.tip().expect("tip");
        let view = MemoryUtxoView::new();
        let prevout = OutPoint::new([0x44; 32], 0);
        // An anyone-can-spend script is not a supported kernel script, so
        // signature verification fails before the kernel is consulted.
        view.add(prevout.clone(), staked_coin());
        let tx = coinstake_spending(&prevout);

        let err = check_proof_of_stake(&prev, &tx, EASY_BITS, &chain, &view, &params, tx.time)
            .expect_err("bad signature");
        assert_eq!(err.reject_reason, "stake-verify-signature-failed");
        assert_eq!(err.result, BlockValidationResult::InvalidHeader);
    }
}
