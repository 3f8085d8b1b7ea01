//! Consensus constants, parameters, and monetary rules.

pub mod constants;
pub mod money;
pub mod params;
pub mod rewards;

pub use params::{consensus_params, ConsensusParams, Network};

pub type Hash256 = [u8; 32];
