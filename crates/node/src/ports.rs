//! Capability ports the staking subsystem consumes. Production wires the real
//! node components; tests wire fakes. The staking code owns nothing beyond its
//! thread and its enable flag.

use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use blackd_chainstate::coins::UtxoView;
use blackd_chainstate::index::ChainView;
use blackd_consensus::ConsensusParams;
use blackd_primitives::block::Block;
use blackd_primitives::outpoint::OutPoint;
use blackd_primitives::transaction::Transaction;

use crate::mempool::Mempool;

/// Network-adjusted wall clock.
pub trait Clock: Send + Sync {
    fn now_seconds(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_seconds(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }
}

/// The wallet surface the staker needs. Key management, coin selection, and
/// coinstake construction stay on the wallet's side of this seam.
pub trait StakingWallet: Send + Sync {
    fn is_locked(&self) -> bool;
    fn keypool_size(&self) -> usize;
    fn private_keys_disabled(&self) -> bool;
    /// Reserve a destination script for the (PoW fallback) coinbase payout.
    fn reserve_destination(&self) -> Option<Vec<u8>>;
    fn available_coins_for_staking(&self) -> Vec<(OutPoint, i64)>;
    /// Search `search_interval` seconds of timestamps for a kernel; on
    /// success returns the signed coinstake distributing stake plus `fees`.
    fn create_coin_stake(&self, bits: u32, search_interval: i64, fees: i64)
        -> Option<Transaction>;
    fn sign_block(&self, block: &mut Block) -> bool;
    /// Drop wallet transactions for coinstakes that lost their block.
    fn abandon_orphaned_coinstakes(&self);
}

/// Connection manager: peer visibility and the interruptible sleep primitive
/// every staking wait goes through.
pub trait Connman: Send + Sync {
    fn node_count(&self) -> usize;
    /// Sleep unless interrupted; false means shut down now.
    fn sleep_for(&self, duration: Duration) -> bool;
}

/// Hands completed blocks to the node's block-processing pipeline.
pub trait BlockProcessor: Send + Sync {
    fn process_new_block(&self, block: &Block, force_processing: bool, mined_by_us: bool) -> bool;
}

/// Alert publication toward the user interface.
pub trait UiInterface: Send + Sync {
    fn notify_alert(&self, message: &str);
}

/// Bundle of capabilities handed to the assembler and the staking loop.
/// Everything is shared by handle; cloning is cheap.
#[derive(Clone)]
pub struct NodeContext {
    pub params: ConsensusParams,
    pub chain: Arc<dyn ChainView + Send + Sync>,
    pub utxo: Arc<dyn UtxoView + Send + Sync>,
    pub mempool: Arc<Mutex<Mempool>>,
    pub connman: Arc<dyn Connman>,
    pub block_processor: Arc<dyn BlockProcessor>,
    pub ui: Arc<dyn UiInterface>,
    pub clock: Arc<dyn Clock>,
}
