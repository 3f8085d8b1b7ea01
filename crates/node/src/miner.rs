//! Block assembly: package selection by ancestor feerate, coinbase/coinstake
//! placement, witness commitment, and header finalization.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use blackd_chainstate::index::{BlockIndexEntry, ChainView};
use blackd_consensus::constants::{
    DEFAULT_BLOCK_MAX_WEIGHT, COINBASE_SIGOPS_RESERVE, COINBASE_WEIGHT_RESERVE,
    LOCKTIME_THRESHOLD, MAX_BLOCK_SIGOPS_COST, MAX_CONSECUTIVE_FAILURES, SEQUENCE_FINAL,
    WITNESS_COMMITMENT_HEADER, WITNESS_SCALE_FACTOR,
};
use blackd_consensus::params::{ConsensusParams, Deployment, Network};
use blackd_consensus::rewards::pow_block_subsidy;
use blackd_consensus::Hash256;
use blackd_log::{log_category, log_debug, log_info, Category};
use blackd_primitives::block::{Block, BlockHeader};
use blackd_primitives::hash::sha256d;
use blackd_primitives::hash256_to_hex;
use blackd_primitives::merkle::{block_merkle_root, block_witness_merkle_root};
use blackd_primitives::outpoint::OutPoint;
use blackd_primitives::transaction::{Transaction, TxIn, TxOut};
use blackd_script::legacy_sigop_count;

use crate::config::AssemblerOptions;
use crate::fees::FeeRate;
use crate::mempool::{compare_ancestor_feerate, Mempool, MempoolEntry, MempoolError};
use crate::ports::{Clock, NodeContext, StakingWallet};

/// A drafted block plus the bookkeeping the caller needs: per-transaction
/// fees (slot 0 carries minus the total) and sigop costs, and the coinbase
/// commitment bytes when witness data is committed.
#[derive(Clone, Debug)]
pub struct BlockTemplate {
    pub block: Block,
    pub tx_fees: Vec<i64>,
    pub tx_sigops_cost: Vec<i64>,
    pub coinbase_commitment: Option<Vec<u8>>,
}

#[derive(Debug)]
pub enum CreateBlockError {
    NoChainTip,
    /// No kernel was found this tick; the staking loop idles and retries.
    CoinstakeSearchExhausted,
    Mempool(MempoolError),
    MempoolPoisoned,
}

impl std::fmt::Display for CreateBlockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CreateBlockError::NoChainTip => write!(f, "no chain tip to build on"),
            CreateBlockError::CoinstakeSearchExhausted => {
                write!(f, "no coinstake found this search interval")
            }
            CreateBlockError::Mempool(err) => write!(f, "{err}"),
            CreateBlockError::MempoolPoisoned => write!(f, "mempool lock poisoned"),
        }
    }
}

impl std::error::Error for CreateBlockError {}

impl From<MempoolError> for CreateBlockError {
    fn from(err: MempoolError) -> Self {
        CreateBlockError::Mempool(err)
    }
}

/// Coinstake search progress, owned by the staking thread and threaded
/// through each build.
#[derive(Clone, Copy, Debug, Default)]
pub struct CoinStakeSearch {
    pub last_search_time: i64,
    pub last_search_interval: i64,
}

fn clamp_options(mut options: AssemblerOptions) -> AssemblerOptions {
    // Limit weight to between 4K and DEFAULT_BLOCK_MAX_WEIGHT for sanity.
    options.block_max_weight = options
        .block_max_weight
        .clamp(COINBASE_WEIGHT_RESERVE, DEFAULT_BLOCK_MAX_WEIGHT);
    options
}

pub struct BlockAssembler {
    options: AssemblerOptions,

    in_block: HashSet<Hash256>,
    height: i32,
    block_weight: usize,
    block_sigops: i64,
    block_tx_count: usize,
    fees: i64,
    include_witness: bool,
    lock_time_cutoff: i64,
}

impl BlockAssembler {
    pub fn new(options: AssemblerOptions) -> Self {
        Self {
            options: clamp_options(options),
            in_block: HashSet::new(),
            height: 0,
            block_weight: 0,
            block_sigops: 0,
            block_tx_count: 0,
            fees: 0,
            include_witness: false,
            lock_time_cutoff: 0,
        }
    }

    pub fn options(&self) -> &AssemblerOptions {
        &self.options
    }

    fn reset(&mut self) {
        self.in_block.clear();
        // Reserve room for the coinbase before any package lands.
        self.block_weight = COINBASE_WEIGHT_RESERVE;
        self.block_sigops = COINBASE_SIGOPS_RESERVE;
        self.block_tx_count = 0;
        self.fees = 0;
        self.include_witness = false;
    }

    /// Build a candidate block on the current tip. With a wallet this is the
    /// proof-of-stake path: a failed kernel search returns
    /// [`CreateBlockError::CoinstakeSearchExhausted`] and the caller idles.
    pub fn create_new_block(
        &mut self,
        ctx: &NodeContext,
        script_pub_key: &[u8],
        wallet: Option<&dyn StakingWallet>,
        mut search: Option<&mut CoinStakeSearch>,
    ) -> Result<BlockTemplate, CreateBlockError> {
        self.reset();
        let params = &ctx.params;

        let mut template = BlockTemplate {
            block: Block::default(),
            tx_fees: vec![-1],
            tx_sigops_cost: vec![-1],
            coinbase_commitment: None,
        };
        // Dummy coinbase keeps vtx[0] reserved while packages land.
        template.block.vtx.push(Transaction::new());

        let prev = ctx.chain.tip().ok_or(CreateBlockError::NoChainTip)?;
        self.height = prev.height + 1;

        let mut version = ctx.chain.compute_block_version(&prev);
        if params.network == Network::Regtest {
            if let Some(override_version) = self.options.block_version_override {
                version = override_version;
            }
        }
        template.block.header.version = version;

        let now = ctx.clock.now_seconds();
        // Stake candidates only exist on mask boundaries, so a PoS build caps
        // transaction times at the aligned search time; that keeps the final
        // header time equal to the coinstake time.
        let mask = i64::from(params.stake_timestamp_mask);
        let candidate_time = if wallet.is_some() { now & !mask } else { now };
        template.block.header.time = candidate_time as u32;

        let median_time_past = prev.median_time_past;
        self.lock_time_cutoff = if params.is_protocol_v3_1(candidate_time) {
            median_time_past
        } else {
            candidate_time
        };

        self.include_witness = ctx.chain.deployment_active_after(&prev, Deployment::Segwit);

        let (packages_selected, descendants_updated) = {
            let mempool = ctx
                .mempool
                .lock()
                .map_err(|_| CreateBlockError::MempoolPoisoned)?;
            self.add_package_txs(&mempool, &mut template, candidate_time as u32, now)?
        };

        let mut coinbase = Transaction::new();
        coinbase.time = candidate_time as u32;
        coinbase.vin.push(TxIn::new(OutPoint::null()));
        coinbase.vout.push(TxOut::empty());

        // Proof-of-work fallback: pay subsidy plus fees to the given script.
        if wallet.is_none() {
            template.block.header.bits = ctx.chain.next_target(&prev, false);
            coinbase.vout[0] = TxOut {
                value: self.fees + pow_block_subsidy(self.height),
                script_pubkey: script_pub_key.to_vec(),
            };
        }

        // Proof-of-stake: ask the wallet for a coinstake over the interval
        // since the last search.
        if let Some(wallet) = wallet {
            wallet.abandon_orphaned_coinstakes();
            template.block.header.bits = ctx.chain.next_target(&prev, true);

            let mut found = false;
            if let Some(state) = search.as_deref_mut() {
                let search_time = candidate_time;
                if search_time > state.last_search_time {
                    let interval = search_time - state.last_search_time;
                    if let Some(coinstake) =
                        wallet.create_coin_stake(template.block.header.bits, interval, self.fees)
                    {
                        if i64::from(coinstake.time) >= median_time_past + 1 {
                            coinbase.vout[0] = TxOut::empty();
                            coinbase.time = coinstake.time;
                            template.block.header.time = coinstake.time;
                            let coinstake_sigops = (WITNESS_SCALE_FACTOR as i64)
                                * i64::from(legacy_tx_sigop_count(&coinstake));
                            template.block.vtx.insert(1, coinstake);
                            template.tx_fees.insert(1, 0);
                            template.tx_sigops_cost.insert(1, coinstake_sigops);
                            state.last_search_interval = interval;
                            found = true;
                        }
                    }
                    state.last_search_time = search_time;
                }
            }
            if !found {
                // No point continuing without a coinstake.
                return Err(CreateBlockError::CoinstakeSearchExhausted);
            }
        }

        coinbase.vin[0].script_sig = bip34_coinbase_script_sig(self.height);
        template.block.vtx[0] = coinbase;
        if self.include_witness {
            template.coinbase_commitment = Some(generate_coinbase_commitment(&mut template.block));
        }
        template.tx_fees[0] = -self.fees;

        log_info!(
            "create_new_block: weight {} txs {} fees {} sigops {}",
            self.block_weight,
            self.block_tx_count,
            self.fees,
            self.block_sigops
        );
        log_category!(
            Category::Bench,
            "create_new_block: {packages_selected} packages, {descendants_updated} updated descendants"
        );

        // Fill in the header.
        template.block.header.prev_block = prev.hash;
        let max_tx_time = get_max_transaction_time(&template.block);
        template.block.header.time =
            std::cmp::max(median_time_past + 1, max_tx_time) as u32;
        if !template.block.is_proof_of_stake() {
            update_time(
                &mut template.block.header,
                params,
                &prev,
                ctx.chain.as_ref(),
                ctx.clock.as_ref(),
            );
        }
        template.block.header.nonce = 0;
        template.tx_sigops_cost[0] =
            (WITNESS_SCALE_FACTOR as i64) * i64::from(legacy_tx_sigop_count(&template.block.vtx[0]));
        template.block.header.merkle_root = block_merkle_root(&template.block);

        Ok(template)
    }

    fn test_package(&self, package_size: u64, package_sigops: i64) -> bool {
        if self.block_weight + WITNESS_SCALE_FACTOR * (package_size as usize)
            >= self.options.block_max_weight
        {
            return false;
        }
        if self.block_sigops + package_sigops >= MAX_BLOCK_SIGOPS_COST {
            return false;
        }
        true
    }

    /// Transaction-level checks before a package is committed: finality,
    /// premature witness, and the timestamp ceiling.
    fn test_package_transactions(
        &self,
        mempool: &Mempool,
        package: &HashSet<Hash256>,
        time_limit: u32,
        now: i64,
    ) -> bool {
        for txid in package {
            let Some(entry) = mempool.get(txid) else {
                return false;
            };
            if !is_final_tx(&entry.tx, self.height, self.lock_time_cutoff) {
                return false;
            }
            if !self.include_witness && entry.tx.has_witness() {
                return false;
            }
            if i64::from(entry.tx.time) > now || (time_limit != 0 && entry.tx.time > time_limit) {
                return false;
            }
        }
        true
    }

    fn add_to_block(&mut self, template: &mut BlockTemplate, entry: &MempoolEntry) {
        template.block.vtx.push(entry.tx.clone());
        template.tx_fees.push(entry.fee);
        template.tx_sigops_cost.push(entry.sigop_cost);
        self.block_weight += entry.tx.weight();
        self.block_sigops += entry.sigop_cost;
        self.block_tx_count += 1;
        self.fees += entry.fee;
        self.in_block.insert(entry.txid);

        if self.options.print_priority {
            log_info!(
                "fee rate {} txid {}",
                FeeRate::from_fee_and_size(entry.fee, entry.vsize()),
                hash256_to_hex(&entry.txid)
            );
        }
    }

    /// The selection loop: walk the ancestor-feerate view against the set of
    /// entries whose cached aggregates went stale because ancestors already
    /// landed in the block, always working on the better of the two.
    fn add_package_txs(
        &mut self,
        mempool: &Mempool,
        template: &mut BlockTemplate,
        time_limit: u32,
        now: i64,
    ) -> Result<(usize, usize), CreateBlockError> {
        let sorted = mempool.by_ancestor_score();
        let mut cursor = 0usize;
        let mut modified: HashMap<Hash256, ModifiedEntry> = HashMap::new();
        let mut failed: HashSet<Hash256> = HashSet::new();
        let mut consecutive_failures = 0i64;
        let mut packages_selected = 0usize;
        let mut descendants_updated = 0usize;

        loop {
            // Skip cursor entries already handled or tracked as modified.
            while cursor < sorted.len() {
                let txid = &sorted[cursor];
                if self.in_block.contains(txid)
                    || failed.contains(txid)
                    || modified.contains_key(txid)
                {
                    cursor += 1;
                } else {
                    break;
                }
            }

            let cursor_txid = sorted.get(cursor).copied();
            let best_modified = modified
                .values()
                .max_by(|a, b| {
                    compare_ancestor_feerate(
                        a.fees_with_ancestors,
                        a.size_with_ancestors,
                        b.fees_with_ancestors,
                        b.size_with_ancestors,
                    )
                    .then_with(|| b.txid.cmp(&a.txid))
                })
                .map(|entry| entry.txid);

            let (txid, using_modified) = match (cursor_txid, best_modified) {
                (None, None) => break,
                (Some(txid), None) => {
                    cursor += 1;
                    (txid, false)
                }
                (None, Some(modified_txid)) => (modified_txid, true),
                (Some(cursor_id), Some(modified_txid)) => {
                    let cursor_entry = mempool.get(&cursor_id).ok_or_else(|| {
                        MempoolError::InvariantViolation("sorted view references missing entry".into())
                    })?;
                    let modified_entry = &modified[&modified_txid];
                    if compare_ancestor_feerate(
                        modified_entry.fees_with_ancestors,
                        modified_entry.size_with_ancestors,
                        cursor_entry.fees_with_ancestors,
                        cursor_entry.size_with_ancestors,
                    ) == Ordering::Greater
                    {
                        (modified_txid, true)
                    } else {
                        cursor += 1;
                        (cursor_id, false)
                    }
                }
            };

            let (package_count, package_size, package_fees, package_sigops) = if using_modified {
                let entry = &modified[&txid];
                (
                    entry.count_with_ancestors,
                    entry.size_with_ancestors,
                    entry.fees_with_ancestors,
                    entry.sigops_with_ancestors,
                )
            } else {
                let entry = mempool.get(&txid).ok_or_else(|| {
                    MempoolError::InvariantViolation("sorted view references missing entry".into())
                })?;
                (
                    entry.count_with_ancestors,
                    entry.size_with_ancestors,
                    entry.fees_with_ancestors,
                    entry.sigops_with_ancestors,
                )
            };
            let _ = package_count;

            if package_fees
                < self
                    .options
                    .block_min_fee_rate
                    .fee(usize::try_from(package_size).unwrap_or(usize::MAX))
            {
                // Everything else in the sorted view pays worse.
                return Ok((packages_selected, descendants_updated));
            }

            if !self.test_package(package_size, package_sigops) {
                if using_modified {
                    // Drop it so the next-best modified entry gets a turn.
                    modified.remove(&txid);
                    failed.insert(txid);
                }
                consecutive_failures += 1;
                if consecutive_failures > MAX_CONSECUTIVE_FAILURES
                    && self.block_weight > self.options.block_max_weight - COINBASE_WEIGHT_RESERVE
                {
                    // Close to full and nothing fits; stop trying.
                    break;
                }
                continue;
            }

            let mut package = mempool.assume_calculate_ancestors(&txid)?;
            package.retain(|ancestor| !self.in_block.contains(ancestor));
            package.insert(txid);

            if !self.test_package_transactions(mempool, &package, time_limit, now) {
                if using_modified {
                    modified.remove(&txid);
                    failed.insert(txid);
                }
                continue;
            }

            // This package makes it in; reset the failure streak.
            consecutive_failures = 0;

            // Parents first: ancestor count strictly increases down a chain.
            let mut ordered: Vec<Hash256> = package.iter().copied().collect();
            ordered.sort_by(|a, b| {
                let count_a = mempool.get(a).map(|e| e.count_with_ancestors).unwrap_or(0);
                let count_b = mempool.get(b).map(|e| e.count_with_ancestors).unwrap_or(0);
                count_a.cmp(&count_b).then_with(|| a.cmp(b))
            });
            for member in &ordered {
                let entry = mempool.get(member).ok_or_else(|| {
                    MempoolError::InvariantViolation("package references missing entry".into())
                })?;
                self.add_to_block(template, entry);
                modified.remove(member);
            }

            packages_selected += 1;
            descendants_updated += update_packages_for_added(mempool, &package, &mut modified);
        }

        Ok((packages_selected, descendants_updated))
    }
}

/// A mempool entry whose ancestor aggregates have been adjusted for parents
/// already placed in the block.
struct ModifiedEntry {
    txid: Hash256,
    count_with_ancestors: u64,
    size_with_ancestors: u64,
    fees_with_ancestors: i64,
    sigops_with_ancestors: i64,
}

impl ModifiedEntry {
    fn from_entry(entry: &MempoolEntry) -> Self {
        Self {
            txid: entry.txid,
            count_with_ancestors: entry.count_with_ancestors,
            size_with_ancestors: entry.size_with_ancestors,
            fees_with_ancestors: entry.fees_with_ancestors,
            sigops_with_ancestors: entry.sigops_with_ancestors,
        }
    }

    fn update_for_parent_inclusion(&mut self, parent: &MempoolEntry) {
        self.count_with_ancestors = self.count_with_ancestors.saturating_sub(1);
        self.size_with_ancestors = self
            .size_with_ancestors
            .saturating_sub(parent.vsize() as u64);
        self.fees_with_ancestors -= parent.fee;
        self.sigops_with_ancestors -= parent.sigop_cost;
    }
}

/// Fold a freshly added package into the modified set for every descendant
/// left in the pool. Returns the number of descendant updates applied.
fn update_packages_for_added(
    mempool: &Mempool,
    added: &HashSet<Hash256>,
    modified: &mut HashMap<Hash256, ModifiedEntry>,
) -> usize {
    let mut updated = 0usize;
    for txid in added {
        let Some(parent_entry) = mempool.get(txid) else {
            continue;
        };
        for descendant in mempool.calculate_descendants(txid) {
            if added.contains(&descendant) {
                continue;
            }
            let Some(descendant_entry) = mempool.get(&descendant) else {
                continue;
            };
            updated += 1;
            modified
                .entry(descendant)
                .or_insert_with(|| ModifiedEntry::from_entry(descendant_entry))
                .update_for_parent_inclusion(parent_entry);
        }
    }
    updated
}

/// BIP113-style finality at the next block: zero locktime is always final,
/// otherwise the locktime must be strictly below the height or time cutoff,
/// unless every input opted out with a final sequence.
pub fn is_final_tx(tx: &Transaction, block_height: i32, cutoff_time: i64) -> bool {
    if tx.lock_time == 0 {
        return true;
    }
    let threshold = if tx.lock_time < LOCKTIME_THRESHOLD {
        i64::from(block_height)
    } else {
        cutoff_time
    };
    if i64::from(tx.lock_time) < threshold {
        return true;
    }
    tx.vin.iter().all(|input| input.sequence == SEQUENCE_FINAL)
}

pub fn get_max_transaction_time(block: &Block) -> i64 {
    block
        .vtx
        .iter()
        .map(|tx| i64::from(tx.time))
        .max()
        .unwrap_or(0)
}

/// Bump a proof-of-work header to the present; on min-difficulty chains this
/// may also move the target.
pub fn update_time(
    header: &mut BlockHeader,
    params: &ConsensusParams,
    prev: &BlockIndexEntry,
    chain: &dyn ChainView,
    clock: &dyn Clock,
) -> i64 {
    let old_time = i64::from(header.time);
    let new_time = std::cmp::max(prev.median_time_past + 1, clock.now_seconds());
    if old_time < new_time {
        header.time = new_time as u32;
    }

    if params.pow_allow_min_difficulty_blocks {
        header.bits = chain.next_target(prev, false);
    }

    new_time - old_time
}

fn script_num_encode(value: i64) -> Vec<u8> {
    let mut out = Vec::new();
    let negative = value < 0;
    let mut magnitude = value.unsigned_abs();
    while magnitude > 0 {
        out.push((magnitude & 0xff) as u8);
        magnitude >>= 8;
    }
    if let Some(&last) = out.last() {
        if last & 0x80 != 0 {
            out.push(if negative { 0x80 } else { 0x00 });
        } else if negative {
            let index = out.len() - 1;
            out[index] |= 0x80;
        }
    }
    out
}

/// BIP34 coinbase scriptSig: `<height> OP_0`.
pub fn bip34_coinbase_script_sig(height: i32) -> Vec<u8> {
    let number = script_num_encode(i64::from(height));
    let mut script = Vec::with_capacity(number.len() + 2);
    if number.is_empty() {
        script.push(0x00);
    } else {
        script.push(number.len() as u8);
        script.extend_from_slice(&number);
    }
    script.push(0x00);
    script
}

fn legacy_tx_sigop_count(tx: &Transaction) -> u32 {
    let mut count = 0u32;
    for input in &tx.vin {
        count = count.saturating_add(legacy_sigop_count(&input.script_sig, false));
    }
    for output in &tx.vout {
        count = count.saturating_add(legacy_sigop_count(&output.script_pubkey, false));
    }
    count
}

/// Attach the BIP141 witness commitment to the coinbase and return the
/// commitment script bytes. The reserved value is 32 zero bytes carried as
/// the coinbase input witness.
pub fn generate_coinbase_commitment(block: &mut Block) -> Vec<u8> {
    if let Some(input) = block.vtx.get_mut(0).and_then(|tx| tx.vin.get_mut(0)) {
        input.witness = vec![vec![0u8; 32]];
    }

    let witness_root = block_witness_merkle_root(block);
    let mut preimage = [0u8; 64];
    preimage[..32].copy_from_slice(&witness_root);
    let commitment = sha256d(&preimage);

    let mut script = Vec::with_capacity(38);
    script.extend_from_slice(&WITNESS_COMMITMENT_HEADER);
    script.extend_from_slice(&commitment);
    if let Some(coinbase) = block.vtx.get_mut(0) {
        coinbase.vout.push(TxOut {
            value: 0,
            script_pubkey: script.clone(),
        });
    }
    script
}

pub fn witness_commitment_index(block: &Block) -> Option<usize> {
    let coinbase = block.vtx.first()?;
    coinbase.vout.iter().rposition(|output| {
        output.script_pubkey.len() >= 38
            && output.script_pubkey[..WITNESS_COMMITMENT_HEADER.len()] == WITNESS_COMMITMENT_HEADER
    })
}

/// Strip and regenerate the witness commitment, then recompute the merkle
/// root. Used after any mutation of the block body.
pub fn regenerate_commitments(block: &mut Block) {
    if let Some(index) = witness_commitment_index(block) {
        if let Some(coinbase) = block.vtx.get_mut(0) {
            coinbase.vout.remove(index);
        }
        generate_coinbase_commitment(block);
    }
    block.header.merkle_root = block_merkle_root(block);
    log_debug!(
        "regenerated commitments, merkle root {}",
        hash256_to_hex(&block.header.merkle_root)
    );
}
