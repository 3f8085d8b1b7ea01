//! Block header and block types.

use blackd_consensus::Hash256;

use crate::encoding::{DecodeError, Decoder, Encoder};
use crate::hash::sha256d;
use crate::transaction::Transaction;

pub const CURRENT_BLOCK_VERSION: i32 = 4;

#[derive(Clone, Debug, PartialEq)]
pub struct BlockHeader {
    pub version: i32,
    pub prev_block: Hash256,
    pub merkle_root: Hash256,
    pub time: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    pub fn consensus_encode(&self) -> Vec<u8> {
        let mut encoder = Encoder::new();
        encoder.write_i32_le(self.version);
        encoder.write_hash_le(&self.prev_block);
        encoder.write_hash_le(&self.merkle_root);
        encoder.write_u32_le(self.time);
        encoder.write_u32_le(self.bits);
        encoder.write_u32_le(self.nonce);
        encoder.into_inner()
    }

    pub fn consensus_decode_from(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        Ok(Self {
            version: decoder.read_i32_le()?,
            prev_block: decoder.read_hash_le()?,
            merkle_root: decoder.read_hash_le()?,
            time: decoder.read_u32_le()?,
            bits: decoder.read_u32_le()?,
            nonce: decoder.read_u32_le()?,
        })
    }

    pub fn hash(&self) -> Hash256 {
        sha256d(&self.consensus_encode())
    }
}

impl Default for BlockHeader {
    fn default() -> Self {
        Self {
            version: CURRENT_BLOCK_VERSION,
            prev_block: [0u8; 32],
            merkle_root: [0u8; 32],
            time: 0,
            bits: 0,
            nonce: 0,
        }
    }
}

/// A full block. `signature` is the staker's block signature over the header
/// hash, empty on proof-of-work blocks.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Block {
    pub header: BlockHeader,
    pub vtx: Vec<Transaction>,
    pub signature: Vec<u8>,
}

impl Block {
    /// A proof-of-stake block carries its coinstake at `vtx[1]`.
    pub fn is_proof_of_stake(&self) -> bool {
        self.vtx.len() > 1 && self.vtx[1].is_coinstake()
    }

    pub fn hash(&self) -> Hash256 {
        self.header.hash()
    }

    pub fn consensus_encode(&self) -> Vec<u8> {
        let mut encoder = Encoder::new();
        encoder.write_bytes(&self.header.consensus_encode());
        encoder.write_varint(self.vtx.len() as u64);
        for tx in &self.vtx {
            encoder.write_bytes(&tx.consensus_encode());
        }
        encoder.write_var_bytes(&self.signature);
        encoder.into_inner()
    }

    pub fn consensus_decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut decoder = Decoder::new(bytes);
        let header = BlockHeader::consensus_decode_from(&mut decoder)?;
        let count = decoder.read_varint()?;
        let count = usize::try_from(count).map_err(|_| DecodeError::SizeTooLarge)?;
        let mut vtx = Vec::with_capacity(count);
        for _ in 0..count {
            vtx.push(Transaction::decode_from(&mut decoder)?);
        }
        let signature = decoder.read_var_bytes()?;
        if !decoder.is_empty() {
            return Err(DecodeError::TrailingBytes);
        }
        Ok(Self {
            header,
            vtx,
            signature,
        })
    }

    /// Total block weight, the sum of transaction weights plus the
    /// header/structure overhead counted at base rate.
    pub fn weight(&self) -> usize {
        let tx_weight: usize = self.vtx.iter().map(|tx| tx.weight()).sum();
        let overhead = self.consensus_encode().len()
            - self
                .vtx
                .iter()
                .map(|tx| tx.consensus_encode().len())
                .sum::<usize>();
        overhead * 4 + tx_weight
    }
}
