//! Stake cache: memoized (blockFromTime, amount) per candidate outpoint.
//!
//! The timestamp search hits the same outpoints once per mask step; caching
//! the UTXO lookup keeps the search loop off the coin database. Entries are
//! only trusted for kernel pre-screening: a cache hit that passes is always
//! re-verified against the live view, so the cache can never produce a block
//! the uncached path would reject.

use std::collections::HashMap;

use blackd_chainstate::coins::UtxoView;
use blackd_chainstate::index::{ancestor_at, BlockIndexEntry, ChainView};
use blackd_consensus::ConsensusParams;
use blackd_log::{log_category, Category};
use blackd_primitives::outpoint::OutPoint;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StakeCacheEntry {
    pub block_from_time: u32,
    pub amount: i64,
}

/// Cache keyed by outpoint, valid for one chain branch. The remembered tip
/// pins the branch: advancing by one block keeps entries, anything else
/// (reorg, regression, jump) clears them.
#[derive(Default)]
pub struct StakeCache {
    tip: Option<(i32, [u8; 32])>,
    entries: HashMap<OutPoint, StakeCacheEntry>,
}

impl StakeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, prevout: &OutPoint) -> Option<&StakeCacheEntry> {
        self.entries.get(prevout)
    }

    /// Re-anchor the cache at `tip`. Entries survive only a same-tip rebuild
    /// or a single-block advance whose predecessor is the remembered tip.
    pub fn advance_to(&mut self, tip: &BlockIndexEntry) {
        let keep = match self.tip {
            None => self.entries.is_empty(),
            Some((height, hash)) => {
                hash == tip.hash || (tip.height == height + 1 && tip.prev_hash == hash)
            }
        };
        if !keep && !self.entries.is_empty() {
            log_category!(
                Category::Coinstake,
                "stake cache cleared at height {} ({} entries dropped)",
                tip.height,
                self.entries.len()
            );
            self.entries.clear();
        }
        self.tip = Some((tip.height, tip.hash));
    }

    /// Memoize the kernel inputs for `prevout` if the coin exists, is mature,
    /// and its origin block is reachable. Silently a no-op otherwise; the
    /// search loop just skips outpoints it cannot cache.
    pub fn cache_kernel(
        &mut self,
        prevout: &OutPoint,
        prev: &BlockIndexEntry,
        chain: &dyn ChainView,
        view: &dyn UtxoView,
        params: &ConsensusParams,
    ) {
        if self.entries.contains_key(prevout) {
            return;
        }

        let Some(coin) = view.get_coin(prevout) else {
            return;
        };

        let depth = prev.height + 1 - coin.height as i32;
        if depth < params.coinbase_maturity {
            return;
        }

        let Some(block_from) = ancestor_at(chain, prev, coin.height as i32) else {
            return;
        };

        let block_from_time = if coin.time != 0 {
            coin.time
        } else {
            block_from.time
        };
        self.entries.insert(
            prevout.clone(),
            StakeCacheEntry {
                block_from_time,
                amount: coin.value,
            },
        );
    }
}
