//! Consensus-wide constants shared across validation and block assembly.

/// Factor by which base (non-witness) bytes count toward block weight.
pub const WITNESS_SCALE_FACTOR: usize = 4;
/// The maximum allowed weight for a block (network rule).
pub const MAX_BLOCK_WEIGHT: usize = 4_000_000;
/// Default upper bound for `-blockmaxweight`.
pub const DEFAULT_BLOCK_MAX_WEIGHT: usize = 4_000_000;
/// The maximum allowed number of signature check operations in a block (network rule).
pub const MAX_BLOCK_SIGOPS_COST: i64 = 80_000;

/// Weight reserved for the coinbase (and coinstake) before packages are added.
pub const COINBASE_WEIGHT_RESERVE: usize = 4_000;
/// Sigop cost reserved for the coinbase before packages are added.
pub const COINBASE_SIGOPS_RESERVE: i64 = 400;

/// Lock times at or above this value are interpreted as unix timestamps.
pub const LOCKTIME_THRESHOLD: u32 = 500_000_000;
/// Sequence value that exempts an input from lock-time enforcement.
pub const SEQUENCE_FINAL: u32 = 0xffff_ffff;

/// BIP141 witness commitment marker: OP_RETURN, push 36, 0xaa21a9ed.
pub const WITNESS_COMMITMENT_HEADER: [u8; 6] = [0x6a, 0x24, 0xaa, 0x21, 0xa9, 0xed];

/// Maximum consecutive package rejections near the weight cap before the
/// selector gives up early.
pub const MAX_CONSECUTIVE_FAILURES: i64 = 1_000;
