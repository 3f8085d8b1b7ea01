//! Block-index snapshots and the chain view consumed by staking code.

use std::sync::Mutex;

use blackd_consensus::params::Deployment;
use blackd_consensus::Hash256;

/// Snapshot of one block-index node. The persistent `stake_modifier` travels
/// with every accepted block; genesis carries zero.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BlockIndexEntry {
    pub hash: Hash256,
    pub prev_hash: Hash256,
    pub height: i32,
    pub time: u32,
    pub bits: u32,
    pub stake_modifier: Hash256,
    pub median_time_past: i64,
}

/// Read access to the active chain. Implementations synchronize internally;
/// callers snapshot the tip once per operation and detect staleness at submit
/// time rather than holding the chain still.
pub trait ChainView {
    fn tip(&self) -> Option<BlockIndexEntry>;
    /// The active-chain block at `height`, if within the chain.
    fn block_at(&self, height: i32) -> Option<BlockIndexEntry>;
    fn is_initial_block_download(&self) -> bool;
    fn verification_progress(&self) -> f64;
    /// Compact difficulty target required for the block after `prev`.
    fn next_target(&self, prev: &BlockIndexEntry, proof_of_stake: bool) -> u32;
    fn deployment_active_after(&self, prev: &BlockIndexEntry, deployment: Deployment) -> bool;
    /// Version-bits computation for the block after `prev`.
    fn compute_block_version(&self, prev: &BlockIndexEntry) -> i32;
}

/// Ancestor lookup relative to a snapshot: the active-chain block at `height`,
/// provided it is actually an ancestor of `prev`.
pub fn ancestor_at(
    chain: &dyn ChainView,
    prev: &BlockIndexEntry,
    height: i32,
) -> Option<BlockIndexEntry> {
    if height < 0 || height > prev.height {
        return None;
    }
    chain.block_at(height)
}

/// In-memory chain used by tests and tools: a contiguous run of entries plus
/// settable sync state.
pub struct MemoryChainView {
    inner: Mutex<MemoryChainInner>,
    pos_bits: u32,
    pow_bits: u32,
    segwit_active: bool,
}

struct MemoryChainInner {
    entries: Vec<BlockIndexEntry>,
    initial_block_download: bool,
    verification_progress: f64,
}

impl MemoryChainView {
    pub fn new(entries: Vec<BlockIndexEntry>, pos_bits: u32, pow_bits: u32) -> Self {
        Self {
            inner: Mutex::new(MemoryChainInner {
                entries,
                initial_block_download: false,
                verification_progress: 1.0,
            }),
            pos_bits,
            pow_bits,
            segwit_active: true,
        }
    }

    pub fn push(&self, entry: BlockIndexEntry) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.entries.push(entry);
        }
    }

    pub fn set_initial_block_download(&self, value: bool) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.initial_block_download = value;
        }
    }

    pub fn set_verification_progress(&self, value: f64) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.verification_progress = value;
        }
    }
}

impl ChainView for MemoryChainView {
    fn tip(&self) -> Option<BlockIndexEntry> {
        self.inner.lock().ok()?.entries.last().cloned()
    }

    fn block_at(&self, height: i32) -> Option<BlockIndexEntry> {
        let inner = self.inner.lock().ok()?;
        inner
            .entries
            .iter()
            .find(|entry| entry.height == height)
            .cloned()
    }

    fn is_initial_block_download(&self) -> bool {
        self.inner
            .lock()
            .map(|inner| inner.initial_block_download)
            .unwrap_or(true)
    }

    fn verification_progress(&self) -> f64 {
        self.inner
            .lock()
            .map(|inner| inner.verification_progress)
            .unwrap_or(0.0)
    }

    fn next_target(&self, _prev: &BlockIndexEntry, proof_of_stake: bool) -> u32 {
        if proof_of_stake {
            self.pos_bits
        } else {
            self.pow_bits
        }
    }

    fn deployment_active_after(&self, _prev: &BlockIndexEntry, deployment: Deployment) -> bool {
        match deployment {
            Deployment::Segwit => self.segwit_active,
        }
    }

    fn compute_block_version(&self, _prev: &BlockIndexEntry) -> i32 {
        blackd_primitives::block::CURRENT_BLOCK_VERSION
    }
}
