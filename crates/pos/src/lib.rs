//! Proof-of-stake kernel: stake modifier chaining, kernel hashing, the stake
//! cache, and full coinstake validation.

pub mod cache;
pub mod kernel;
pub mod target;
pub mod validation;

pub use cache::{StakeCache, StakeCacheEntry};
pub use kernel::{
    check_coinstake_timestamp, check_stake_block_timestamp, check_stake_kernel_hash,
    compute_stake_modifier, stake_kernel_hash,
};
pub use validation::{check_kernel, check_proof_of_stake};
