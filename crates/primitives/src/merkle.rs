//! Merkle root computation for blocks and witness commitments.

use blackd_consensus::Hash256;

use crate::block::Block;
use crate::hash::sha256d;

/// Classic Bitcoin merkle tree: pairwise double-SHA-256, odd leaf duplicated.
pub fn merkle_root(hashes: &[Hash256]) -> Hash256 {
    if hashes.is_empty() {
        return [0u8; 32];
    }

    let mut level: Vec<Hash256> = hashes.to_vec();
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            let left = pair[0];
            let right = if pair.len() == 2 { pair[1] } else { pair[0] };
            let mut concat = [0u8; 64];
            concat[..32].copy_from_slice(&left);
            concat[32..].copy_from_slice(&right);
            next.push(sha256d(&concat));
        }
        level = next;
    }
    level[0]
}

pub fn block_merkle_root(block: &Block) -> Hash256 {
    let txids: Vec<Hash256> = block.vtx.iter().map(|tx| tx.txid()).collect();
    merkle_root(&txids)
}

/// Witness merkle root per BIP141: the coinbase wtxid is treated as zero.
pub fn block_witness_merkle_root(block: &Block) -> Hash256 {
    let mut hashes: Vec<Hash256> = Vec::with_capacity(block.vtx.len());
    for (index, tx) in block.vtx.iter().enumerate() {
        if index == 0 {
            hashes.push([0u8; 32]);
        } else {
            hashes.push(tx.wtxid());
        }
    }
    merkle_root(&hashes)
}
