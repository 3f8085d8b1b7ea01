//! Legacy (pre-witness) signature hash.

use blackd_consensus::Hash256;
use blackd_primitives::encoding::{Encodable, Encoder};
use blackd_primitives::hash::sha256d;
use blackd_primitives::transaction::Transaction;

pub const SIGHASH_ALL: u32 = 0x01;

/// Compute the legacy SIGHASH_ALL digest for one input: every scriptSig is
/// blanked except the signed input, which carries the spent scriptPubKey, and
/// the hash type is appended to the preimage.
pub fn legacy_signature_hash(
    tx: &Transaction,
    input_index: usize,
    script_code: &[u8],
    hash_type: u32,
) -> Option<Hash256> {
    if input_index >= tx.vin.len() {
        return None;
    }

    let mut encoder = Encoder::new();
    encoder.write_i32_le(tx.version);
    encoder.write_u32_le(tx.time);

    encoder.write_varint(tx.vin.len() as u64);
    for (index, input) in tx.vin.iter().enumerate() {
        input.prevout.consensus_encode(&mut encoder);
        if index == input_index {
            encoder.write_var_bytes(script_code);
        } else {
            encoder.write_var_bytes(&[]);
        }
        encoder.write_u32_le(input.sequence);
    }

    encoder.write_varint(tx.vout.len() as u64);
    for output in &tx.vout {
        output.consensus_encode(&mut encoder);
    }

    encoder.write_u32_le(tx.lock_time);
    encoder.write_u32_le(hash_type);

    Some(sha256d(&encoder.into_inner()))
}
