//! Chain primitives: hashing, consensus serialization, transactions, blocks.

pub mod block;
pub mod encoding;
pub mod hash;
pub mod merkle;
pub mod outpoint;
pub mod transaction;

pub use blackd_consensus::Hash256;

/// Render a hash the way block explorers do: big-endian hex.
pub fn hash256_to_hex(hash: &Hash256) -> String {
    let mut out = String::with_capacity(64);
    for byte in hash.iter().rev() {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
