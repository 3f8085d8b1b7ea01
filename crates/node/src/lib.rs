//! Node-side staking machinery: mempool packaging, block assembly, and the
//! supervised staking loop.

pub mod config;
pub mod fees;
pub mod mempool;
pub mod miner;
pub mod ports;
pub mod staker;

pub use config::{apply_args, AssemblerOptions, OptionError, StakingOptions};
pub use fees::FeeRate;
pub use mempool::{Mempool, MempoolEntry, MempoolError};
pub use miner::{BlockAssembler, BlockTemplate, CoinStakeSearch, CreateBlockError};
pub use ports::{BlockProcessor, Clock, Connman, NodeContext, StakingWallet, SystemClock, UiInterface};
pub use staker::{stake_miner, MinerExit, StakingSupervisor};
