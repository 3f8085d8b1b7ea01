//! The supervised staking loop: wait for a usable wallet and a synced chain,
//! search for kernels, sign found blocks, and hand them to the node.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use blackd_log::{log_debug, log_error, log_info, log_warn};
use blackd_pos::check_proof_of_stake;
use blackd_primitives::block::Block;
use blackd_primitives::hash256_to_hex;
use rand::Rng;

use crate::config::{AssemblerOptions, StakingOptions};
use crate::miner::{BlockAssembler, CoinStakeSearch, CreateBlockError};
use crate::ports::{NodeContext, StakingWallet};

pub const ALERT_WALLET_LOCKED: &str = "Staking suspended due to locked wallet";
pub const ALERT_SYNCING: &str = "Staking suspended while synchronizing wallet";
pub const ALERT_DISABLED: &str = "Staking disabled by 'nostaking' option";
pub const ALERT_BLOCK_CREATION: &str = "Staking suspended due to block creation failure";

const LOCKED_WALLET_POLL: Duration = Duration::from_secs(5);
const NETWORK_POLL: Duration = Duration::from_secs(10);
const SYNC_PROGRESS_THRESHOLD: f64 = 0.996;
const COOLDOWN_BASE_SECS: u64 = 16;

/// Why the miner body returned; decides whether the supervisor restarts it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MinerExit {
    /// Interrupted or disabled; the supervisor lets the thread end.
    Shutdown,
    /// Unexpected failure; the supervisor restarts the miner.
    Failure,
}

struct AlertState {
    current: Option<&'static str>,
}

impl AlertState {
    fn new() -> Self {
        Self { current: None }
    }

    fn publish(&mut self, ctx: &NodeContext, message: &'static str) {
        if self.current != Some(message) {
            self.current = Some(message);
            ctx.ui.notify_alert(message);
        }
    }

    fn clear(&mut self, ctx: &NodeContext) {
        if self.current.take().is_some() {
            ctx.ui.notify_alert("");
        }
    }
}

/// Verify a freshly staked block against the current tip and submit it.
/// Stale or self-invalid blocks are dropped here, never forwarded.
pub fn process_block_found(block: &Block, ctx: &NodeContext) -> bool {
    let Some(tip) = ctx.chain.tip() else {
        log_error!("process_block_found: no chain tip");
        return false;
    };

    if block.header.prev_block != tip.hash {
        log_warn!("process_block_found: generated block is stale");
        return false;
    }

    let Some(coinstake) = block.vtx.get(1) else {
        log_error!("process_block_found: block has no coinstake");
        return false;
    };
    let time_tx = if coinstake.time != 0 {
        coinstake.time
    } else {
        block.header.time
    };

    if let Err(failure) = check_proof_of_stake(
        &tip,
        coinstake,
        block.header.bits,
        ctx.chain.as_ref(),
        ctx.utxo.as_ref(),
        &ctx.params,
        time_tx,
    ) {
        log_error!("process_block_found: proof-of-stake check failed: {failure}");
        return false;
    }

    if !ctx
        .block_processor
        .process_new_block(block, true, true)
    {
        log_error!("process_block_found: block not accepted");
        return false;
    }

    true
}

/// One pass of the staking state machine. Runs until interrupted (Shutdown)
/// or until something breaks badly enough that a restart is warranted.
pub fn stake_miner(
    wallet: &Arc<dyn StakingWallet>,
    ctx: &NodeContext,
    options: &StakingOptions,
    assembler_options: &AssemblerOptions,
    enable: &AtomicBool,
) -> MinerExit {
    log_info!("stake miner started");

    if !options.staking_enabled {
        ctx.ui.notify_alert(ALERT_DISABLED);
        log_info!("proof-of-stake miner disabled");
        return MinerExit::Shutdown;
    }

    let Some(script_pub_key) = wallet.reserve_destination() else {
        log_error!("stake miner: keypool ran out, call keypoolrefill and restart staking");
        return MinerExit::Shutdown;
    };

    // Idle period scales with the square root of the stakeable UTXO count.
    let utxo_count = wallet.available_coins_for_staking().len();
    let pos_timio = Duration::from_millis(
        options.stake_timio_ms + (30.0 * (utxo_count as f64).sqrt()) as u64,
    );
    log_info!(
        "set proof-of-stake timeout: {}ms for {} UTXOs",
        pos_timio.as_millis(),
        utxo_count
    );

    let mut assembler = BlockAssembler::new(assembler_options.clone());
    let mut search = CoinStakeSearch {
        last_search_time: ctx.clock.now_seconds(),
        last_search_interval: 0,
    };
    let mut alert = AlertState::new();

    while enable.load(Ordering::Relaxed) {
        // Wait out a locked wallet.
        while wallet.is_locked() {
            if !enable.load(Ordering::Relaxed) {
                return MinerExit::Shutdown;
            }
            alert.publish(ctx, ALERT_WALLET_LOCKED);
            if !ctx.connman.sleep_for(LOCKED_WALLET_POLL) {
                return MinerExit::Shutdown;
            }
        }

        // Wait for peers so we do not stake on an obsolete chain.
        while ctx.connman.node_count() == 0 || ctx.chain.is_initial_block_download() {
            if !enable.load(Ordering::Relaxed) {
                return MinerExit::Shutdown;
            }
            alert.publish(ctx, ALERT_SYNCING);
            if !ctx.connman.sleep_for(NETWORK_POLL) {
                return MinerExit::Shutdown;
            }
        }

        while ctx.chain.verification_progress() < SYNC_PROGRESS_THRESHOLD {
            if !enable.load(Ordering::Relaxed) {
                return MinerExit::Shutdown;
            }
            log_debug!(
                "staker sleeps while sync at {:.3}",
                ctx.chain.verification_progress()
            );
            alert.publish(ctx, ALERT_SYNCING);
            if !ctx.connman.sleep_for(NETWORK_POLL) {
                return MinerExit::Shutdown;
            }
        }

        alert.clear(ctx);

        // Build a candidate block on the current tip.
        let template = match assembler.create_new_block(
            ctx,
            &script_pub_key,
            Some(wallet.as_ref()),
            Some(&mut search),
        ) {
            Ok(template) => template,
            Err(CreateBlockError::CoinstakeSearchExhausted) => {
                if !ctx.connman.sleep_for(pos_timio) {
                    return MinerExit::Shutdown;
                }
                continue;
            }
            Err(err) => {
                alert.publish(ctx, ALERT_BLOCK_CREATION);
                log_error!("stake miner: block creation failed: {err}");
                if !ctx.connman.sleep_for(Duration::from_secs(10)) {
                    return MinerExit::Shutdown;
                }
                return MinerExit::Failure;
            }
        };

        let mut block = template.block;
        if block.is_proof_of_stake() {
            if !wallet.sign_block(&mut block) {
                log_error!("stake miner: failed to sign proof-of-stake block");
                continue;
            }
            log_info!(
                "stake miner: proof-of-stake block found {}",
                hash256_to_hex(&block.hash())
            );
            if process_block_found(&block, ctx) {
                // Rest after a successful block so we do not immediately
                // re-stake on the same tip.
                let jitter = rand::thread_rng().gen_range(0..4);
                if !ctx
                    .connman
                    .sleep_for(Duration::from_secs(COOLDOWN_BASE_SECS + jitter))
                {
                    return MinerExit::Shutdown;
                }
            }
        }

        if !ctx.connman.sleep_for(pos_timio) {
            return MinerExit::Shutdown;
        }
    }

    MinerExit::Shutdown
}

fn thread_stake_miner(
    wallet: Arc<dyn StakingWallet>,
    ctx: NodeContext,
    options: StakingOptions,
    assembler_options: AssemblerOptions,
    enable: Arc<AtomicBool>,
) {
    log_info!("stake miner supervisor started");
    while enable.load(Ordering::Relaxed) {
        let result = catch_unwind(AssertUnwindSafe(|| {
            stake_miner(&wallet, &ctx, &options, &assembler_options, &enable)
        }));
        match result {
            Ok(MinerExit::Shutdown) => break,
            Ok(MinerExit::Failure) => {
                log_warn!("stake miner exited with failure, restarting");
            }
            Err(_) => {
                log_error!("stake miner panicked, restarting");
            }
        }
    }
    log_info!("stake miner supervisor stopped");
}

/// Owns the staking thread and its enable flag; the only mutable state the
/// staking subsystem keeps.
pub struct StakingSupervisor {
    enable: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl StakingSupervisor {
    pub fn new() -> Self {
        Self {
            enable: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }

    pub fn staking_enabled(&self) -> bool {
        self.enable.load(Ordering::Relaxed)
    }

    /// Launch the staking thread for a wallet. Refuses wallets that cannot
    /// stake at all: no keys in the pool, or private keys disabled.
    pub fn start(
        &mut self,
        wallet: Arc<dyn StakingWallet>,
        ctx: NodeContext,
        options: StakingOptions,
        assembler_options: AssemblerOptions,
    ) {
        if wallet.keypool_size() == 0 {
            log_error!(
                "keypool is empty, call keypoolrefill before restarting the staking thread"
            );
            self.enable.store(false, Ordering::Relaxed);
            return;
        }

        if !options.staking_enabled || wallet.private_keys_disabled() {
            self.enable.store(false, Ordering::Relaxed);
            return;
        }

        if !self.staking_enabled() {
            self.enable.store(true, Ordering::Relaxed);
            let enable = Arc::clone(&self.enable);
            self.thread = Some(std::thread::spawn(move || {
                thread_stake_miner(wallet, ctx, options, assembler_options, enable);
            }));
        }
    }

    /// Request shutdown and join the thread.
    pub fn interrupt(&mut self) {
        log_info!("interrupting stake miner");
        self.enable.store(false, Ordering::Relaxed);
        self.stop();
    }

    /// Join the thread if it is still running.
    pub fn stop(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Default for StakingSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for StakingSupervisor {
    fn drop(&mut self) {
        self.interrupt();
    }
}
