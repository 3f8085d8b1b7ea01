//! Fake ports shared by the miner and staker integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use blackd_chainstate::coins::{Coin, MemoryUtxoView};
use blackd_chainstate::index::{BlockIndexEntry, MemoryChainView};
use blackd_consensus::params::{consensus_params, ConsensusParams, Network};
use blackd_consensus::Hash256;
use blackd_node::mempool::Mempool;
use blackd_node::ports::{
    BlockProcessor, Clock, Connman, NodeContext, StakingWallet, UiInterface,
};
use blackd_primitives::block::Block;
use blackd_primitives::hash::hash160;
use blackd_primitives::outpoint::OutPoint;
use blackd_primitives::transaction::{Transaction, TxIn, TxOut};
use blackd_script::p2pkh_script;
use blackd_script::sighash::{legacy_signature_hash, SIGHASH_ALL};
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};

pub const EASY_BITS: u32 = 0x1f00ffff;
pub const BASE_TIME: i64 = 1_700_001_600; // divisible by 16

pub fn entry(height: i32) -> BlockIndexEntry {
    BlockIndexEntry {
        hash: [height as u8; 32],
        prev_hash: [(height - 1).max(0) as u8; 32],
        height,
        time: (BASE_TIME - 4096 + i64::from(height) * 16) as u32,
        bits: EASY_BITS,
        stake_modifier: [0x05; 32],
        median_time_past: BASE_TIME - 4096 + i64::from(height) * 16 - 8,
    }
}

pub fn chain_to(height: i32) -> MemoryChainView {
    MemoryChainView::new((0..=height).map(entry).collect(), EASY_BITS, EASY_BITS)
}

pub struct FixedClock {
    now: AtomicI64,
    step: i64,
}

impl FixedClock {
    pub fn new(now: i64) -> Self {
        Self {
            now: AtomicI64::new(now),
            step: 0,
        }
    }

    /// A clock that advances by `step` seconds on every read.
    pub fn stepping(now: i64, step: i64) -> Self {
        Self {
            now: AtomicI64::new(now),
            step,
        }
    }
}

impl Clock for FixedClock {
    fn now_seconds(&self) -> i64 {
        self.now.fetch_add(self.step, Ordering::Relaxed)
    }
}

pub struct FakeConnman {
    pub peers: AtomicUsize,
    pub sleeps: AtomicUsize,
    /// Return false (interrupt) once this many sleeps have happened; -1
    /// never interrupts.
    pub interrupt_after: AtomicI64,
}

impl FakeConnman {
    pub fn new(peers: usize) -> Self {
        Self {
            peers: AtomicUsize::new(peers),
            sleeps: AtomicUsize::new(0),
            interrupt_after: AtomicI64::new(-1),
        }
    }

}

impl Connman for FakeConnman {
    fn node_count(&self) -> usize {
        self.peers.load(Ordering::Relaxed)
    }

    fn sleep_for(&self, _duration: Duration) -> bool {
        let done = self.sleeps.fetch_add(1, Ordering::Relaxed) as i64 + 1;
        let limit = self.interrupt_after.load(Ordering::Relaxed);
        !(limit >= 0 && done > limit)
    }
}

#[derive(Default)]
pub struct FakeUi {
    pub alerts: Mutex<Vec<String>>,
}

impl FakeUi {
    pub fn snapshot(&self) -> Vec<String> {
        self.alerts.lock().map(|a| a.clone()).unwrap_or_default()
    }
}

impl UiInterface for FakeUi {
    fn notify_alert(&self, message: &str) {
        if let Ok(mut alerts) = self.alerts.lock() {
            alerts.push(message.to_string());
        }
    }
}

pub struct FakeProcessor {
    pub accepted: Mutex<Vec<Hash256>>,
    pub accept: bool,
}

impl FakeProcessor {
    pub fn new(accept: bool) -> Self {
        Self {
            accepted: Mutex::new(Vec::new()),
            accept,
        }
    }
}

impl BlockProcessor for FakeProcessor {
    fn process_new_block(&self, block: &Block, _force: bool, _mined_by_us: bool) -> bool {
        if let Ok(mut accepted) = self.accepted.lock() {
            accepted.push(block.hash());
        }
        self.accept
    }
}

pub fn secret_key(last_byte: u8) -> SecretKey {
    let mut bytes = [0u8; 32];
    bytes[31] = last_byte;
    SecretKey::from_slice(&bytes).expect("secret key")
}

pub fn pubkey_of(secret: &SecretKey) -> [u8; 33] {
    let secp = Secp256k1::signing_only();
    PublicKey::from_secret_key(&secp, secret).serialize()
}

fn push(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 1);
    out.push(data.len() as u8);
    out.extend_from_slice(data);
    out
}

/// Build and sign a P2PKH coinstake spending `prevout`.
pub fn signed_coinstake(
    prevout: &OutPoint,
    script_pubkey: &[u8],
    secret: &SecretKey,
    value_out: i64,
    time: u32,
) -> Transaction {
    let mut tx = Transaction::new();
    tx.time = time;
    tx.vin.push(TxIn::new(prevout.clone()));
    tx.vout.push(TxOut::empty());
    tx.vout.push(TxOut {
        value: value_out,
        script_pubkey: script_pubkey.to_vec(),
    });

    let secp = Secp256k1::signing_only();
    let digest = legacy_signature_hash(&tx, 0, script_pubkey, SIGHASH_ALL).expect("sighash");
    let message = Message::from_digest_slice(&digest).expect("message");
    let mut sig = secp.sign_ecdsa(&message, secret).serialize_der().to_vec();
    sig.push(SIGHASH_ALL as u8);

    let mut script_sig = push(&sig);
    script_sig.extend_from_slice(&push(&pubkey_of(secret)));
    tx.vin[0].script_sig = script_sig;
    tx
}

/// Stakeable coin a [`FakeWallet`] will build coinstakes from.
pub struct StakeSetup {
    pub prevout: OutPoint,
    pub script_pubkey: Vec<u8>,
    pub secret: SecretKey,
    pub value: i64,
}

impl StakeSetup {
    pub fn new(secret_byte: u8, value: i64) -> Self {
        let secret = secret_key(secret_byte);
        let script_pubkey = p2pkh_script(&hash160(&pubkey_of(&secret)));
        Self {
            prevout: OutPoint::new([0x70 + secret_byte; 32], 0),
            script_pubkey,
            secret,
            value,
        }
    }

    pub fn coin(&self, height: u32, time: u32) -> Coin {
        Coin {
            value: self.value,
            script_pubkey: self.script_pubkey.clone(),
            height,
            is_coinbase: false,
            is_coinstake: true,
            time,
        }
    }
}

pub struct FakeWallet {
    pub locked: AtomicBool,
    pub keypool: usize,
    pub keys_disabled: bool,
    pub stake: Option<StakeSetup>,
    pub clock: Arc<FixedClock>,
    pub mask: u32,
}

impl FakeWallet {
    pub fn idle(clock: Arc<FixedClock>) -> Self {
        Self {
            locked: AtomicBool::new(false),
            keypool: 10,
            keys_disabled: false,
            stake: None,
            clock,
            mask: 0x0f,
        }
    }

    pub fn staking(clock: Arc<FixedClock>, stake: StakeSetup) -> Self {
        Self {
            stake: Some(stake),
            ..Self::idle(clock)
        }
    }
}

impl StakingWallet for FakeWallet {
    fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }

    fn keypool_size(&self) -> usize {
        self.keypool
    }

    fn private_keys_disabled(&self) -> bool {
        self.keys_disabled
    }

    fn reserve_destination(&self) -> Option<Vec<u8>> {
        if self.keypool == 0 {
            return None;
        }
        Some(p2pkh_script(&[0x42; 20]))
    }

    fn available_coins_for_staking(&self) -> Vec<(OutPoint, i64)> {
        self.stake
            .as_ref()
            .map(|stake| vec![(stake.prevout.clone(), stake.value)])
            .unwrap_or_default()
    }

    fn create_coin_stake(&self, _bits: u32, _search_interval: i64, fees: i64) -> Option<Transaction> {
        let stake = self.stake.as_ref()?;
        let time = (self.clock.now_seconds() & !i64::from(self.mask)) as u32;
        Some(signed_coinstake(
            &stake.prevout,
            &stake.script_pubkey,
            &stake.secret,
            stake.value + fees,
            time,
        ))
    }

    fn sign_block(&self, block: &mut Block) -> bool {
        block.signature = vec![0x30, 0x01, 0x02];
        true
    }

    fn abandon_orphaned_coinstakes(&self) {}
}

pub struct ContextParts {
    pub chain: Arc<MemoryChainView>,
    pub utxo: Arc<MemoryUtxoView>,
    pub mempool: Arc<Mutex<Mempool>>,
    pub connman: Arc<FakeConnman>,
    pub processor: Arc<FakeProcessor>,
    pub ui: Arc<FakeUi>,
    pub clock: Arc<FixedClock>,
    pub params: ConsensusParams,
}

impl ContextParts {
    pub fn regtest(tip_height: i32, clock: FixedClock) -> Self {
        Self {
            chain: Arc::new(chain_to(tip_height)),
            utxo: Arc::new(MemoryUtxoView::new()),
            mempool: Arc::new(Mutex::new(Mempool::new())),
            connman: Arc::new(FakeConnman::new(3)),
            processor: Arc::new(FakeProcessor::new(true)),
            ui: Arc::new(FakeUi::default()),
            clock: Arc::new(clock),
            params: consensus_params(Network::Regtest),
        }
    }

    pub fn context(&self) -> NodeContext {
        NodeContext {
            params: self.params.clone(),
            chain: self.chain.clone(),
            utxo: self.utxo.clone(),
            mempool: self.mempool.clone(),
            connman: self.connman.clone(),
            block_processor: self.processor.clone(),
            ui: self.ui.clone(),
            clock: self.clock.clone(),
        }
    }

    pub fn add_coin(&self, outpoint: OutPoint, coin: Coin) {
        self.utxo.add(outpoint, coin);
    }
}
