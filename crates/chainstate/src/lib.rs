//! Chainstate capability surface: coins, block-index views, validation state.
//!
//! The block/chain index store and the UTXO database live outside this
//! subsystem; these are the views it consumes.

pub mod coins;
pub mod index;
pub mod validation;

pub use coins::{Coin, MemoryUtxoView, UtxoView};
pub use index::{BlockIndexEntry, ChainView};
pub use validation::{BlockValidationResult, ValidationFailure};
