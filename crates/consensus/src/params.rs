//! Consensus parameter definitions.

use crate::Hash256;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
}

/// Soft-fork deployments whose activation state the assembler consults.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Deployment {
    Segwit,
}

#[derive(Clone, Debug)]
pub struct ConsensusParams {
    pub network: Network,
    /// Depth a coin must reach before it may be spent or staked.
    pub coinbase_maturity: i32,
    /// Coinstake timestamps must satisfy `time & mask == 0` under protocol V2.
    pub stake_timestamp_mask: u32,
    /// Unix time at which kernel protocol V2 (masked timestamps) activates.
    pub protocol_v2_time: i64,
    /// Unix time at which protocol V3.1 (median-time-past locktime cutoff) activates.
    pub protocol_v3_1_time: i64,
    /// Upper bound for proof-of-stake targets, little-endian.
    pub pos_limit: Hash256,
    /// Upper bound for proof-of-work targets, little-endian.
    pub pow_limit: Hash256,
    /// Testnet/regtest rule: difficulty may collapse after long gaps.
    pub pow_allow_min_difficulty_blocks: bool,
}

impl ConsensusParams {
    pub fn is_protocol_v2(&self, time: i64) -> bool {
        time >= self.protocol_v2_time
    }

    pub fn is_protocol_v3_1(&self, time: i64) -> bool {
        time >= self.protocol_v3_1_time
    }

    /// The step between candidate coinstake timestamps.
    pub fn stake_timestamp_granularity(&self) -> u32 {
        self.stake_timestamp_mask + 1
    }
}

fn limit_shifted_down(bits: u32) -> Hash256 {
    // ~uint256(0) >> bits, stored little-endian.
    let mut out = [0xffu8; 32];
    let full_bytes = (bits / 8) as usize;
    let rem = bits % 8;
    for byte in out.iter_mut().rev().take(full_bytes) {
        *byte = 0;
    }
    if rem != 0 && full_bytes < 32 {
        out[31 - full_bytes] = 0xff >> rem;
    }
    out
}

pub fn consensus_params(network: Network) -> ConsensusParams {
    match network {
        Network::Mainnet => ConsensusParams {
            network,
            coinbase_maturity: 500,
            stake_timestamp_mask: 0x0f,
            protocol_v2_time: 1_407_053_625,
            protocol_v3_1_time: 1_669_680_000,
            pos_limit: limit_shifted_down(20),
            pow_limit: limit_shifted_down(20),
            pow_allow_min_difficulty_blocks: false,
        },
        Network::Testnet => ConsensusParams {
            network,
            coinbase_maturity: 10,
            stake_timestamp_mask: 0x0f,
            protocol_v2_time: 1_407_053_625,
            protocol_v3_1_time: 1_667_260_800,
            pos_limit: limit_shifted_down(16),
            pow_limit: limit_shifted_down(16),
            pow_allow_min_difficulty_blocks: true,
        },
        Network::Regtest => ConsensusParams {
            network,
            coinbase_maturity: 10,
            stake_timestamp_mask: 0x0f,
            protocol_v2_time: 0,
            protocol_v3_1_time: 0,
            pos_limit: limit_shifted_down(1),
            pow_limit: limit_shifted_down(1),
            pow_allow_min_difficulty_blocks: true,
        },
    }
}
