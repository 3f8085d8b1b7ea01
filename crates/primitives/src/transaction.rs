//! Transaction types and serialization.
//!
//! Transactions in this chain carry a timestamp (`time`) right after the
//! version, in the PPC lineage; witness data serializes per BIP144 with the
//! 0x00 marker / 0x01 flag sandwich.

use blackd_consensus::constants::{SEQUENCE_FINAL, WITNESS_SCALE_FACTOR};
use blackd_consensus::Hash256;

use crate::encoding::{Decodable, DecodeError, Decoder, Encodable, Encoder};
use crate::hash::sha256d;
use crate::outpoint::OutPoint;

pub const CURRENT_TX_VERSION: i32 = 2;

const WITNESS_MARKER: u8 = 0x00;
const WITNESS_FLAG: u8 = 0x01;

#[derive(Clone, Debug, PartialEq)]
pub struct TxIn {
    pub prevout: OutPoint,
    pub script_sig: Vec<u8>,
    pub sequence: u32,
    pub witness: Vec<Vec<u8>>,
}

impl TxIn {
    pub fn new(prevout: OutPoint) -> Self {
        Self {
            prevout,
            script_sig: Vec::new(),
            sequence: SEQUENCE_FINAL,
            witness: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TxOut {
    pub value: i64,
    pub script_pubkey: Vec<u8>,
}

impl TxOut {
    /// The all-zero output a coinstake carries at index 0.
    pub fn empty() -> Self {
        Self {
            value: 0,
            script_pubkey: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.value == 0 && self.script_pubkey.is_empty()
    }
}

impl Encodable for TxOut {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        encoder.write_i64_le(self.value);
        encoder.write_var_bytes(&self.script_pubkey);
    }
}

impl Decodable for TxOut {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let value = decoder.read_i64_le()?;
        let script_pubkey = decoder.read_var_bytes()?;
        Ok(Self {
            value,
            script_pubkey,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Transaction {
    pub version: i32,
    pub time: u32,
    pub vin: Vec<TxIn>,
    pub vout: Vec<TxOut>,
    pub lock_time: u32,
}

impl Transaction {
    pub fn new() -> Self {
        Self {
            version: CURRENT_TX_VERSION,
            time: 0,
            vin: Vec::new(),
            vout: Vec::new(),
            lock_time: 0,
        }
    }

    pub fn is_coinbase(&self) -> bool {
        self.vin.len() == 1 && self.vin[0].prevout.is_null()
    }

    pub fn is_coinstake(&self) -> bool {
        !self.vin.is_empty()
            && !self.vin[0].prevout.is_null()
            && self.vout.len() >= 2
            && self.vout[0].is_empty()
    }

    pub fn has_witness(&self) -> bool {
        self.vin.iter().any(|input| !input.witness.is_empty())
    }

    pub fn consensus_encode(&self) -> Vec<u8> {
        self.encode_with_mode(true)
    }

    /// Serialization without witness data; the txid preimage.
    pub fn consensus_encode_stripped(&self) -> Vec<u8> {
        self.encode_with_mode(false)
    }

    fn encode_with_mode(&self, include_witness: bool) -> Vec<u8> {
        let include_witness = include_witness && self.has_witness();
        let mut encoder = Encoder::new();
        encoder.write_i32_le(self.version);
        encoder.write_u32_le(self.time);
        if include_witness {
            encoder.write_u8(WITNESS_MARKER);
            encoder.write_u8(WITNESS_FLAG);
        }
        encoder.write_varint(self.vin.len() as u64);
        for input in &self.vin {
            input.prevout.consensus_encode(&mut encoder);
            encoder.write_var_bytes(&input.script_sig);
            encoder.write_u32_le(input.sequence);
        }
        encoder.write_varint(self.vout.len() as u64);
        for output in &self.vout {
            output.consensus_encode(&mut encoder);
        }
        if include_witness {
            for input in &self.vin {
                encoder.write_varint(input.witness.len() as u64);
                for item in &input.witness {
                    encoder.write_var_bytes(item);
                }
            }
        }
        encoder.write_u32_le(self.lock_time);
        encoder.into_inner()
    }

    pub fn consensus_decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut decoder = Decoder::new(bytes);
        let tx = Self::decode_from(&mut decoder)?;
        if !decoder.is_empty() {
            return Err(DecodeError::TrailingBytes);
        }
        Ok(tx)
    }

    pub fn decode_from(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let version = decoder.read_i32_le()?;
        let time = decoder.read_u32_le()?;

        let mut has_witness = false;
        if decoder.peek_u8()? == WITNESS_MARKER {
            decoder.read_u8()?;
            if decoder.read_u8()? != WITNESS_FLAG {
                return Err(DecodeError::InvalidData("unknown transaction flag"));
            }
            has_witness = true;
        }

        let vin_count = decoder.read_varint()?;
        let vin_count = usize::try_from(vin_count).map_err(|_| DecodeError::SizeTooLarge)?;
        let mut vin = Vec::with_capacity(vin_count);
        for _ in 0..vin_count {
            let prevout = OutPoint::consensus_decode(decoder)?;
            let script_sig = decoder.read_var_bytes()?;
            let sequence = decoder.read_u32_le()?;
            vin.push(TxIn {
                prevout,
                script_sig,
                sequence,
                witness: Vec::new(),
            });
        }

        let vout_count = decoder.read_varint()?;
        let vout_count = usize::try_from(vout_count).map_err(|_| DecodeError::SizeTooLarge)?;
        let mut vout = Vec::with_capacity(vout_count);
        for _ in 0..vout_count {
            vout.push(TxOut::consensus_decode(decoder)?);
        }

        if has_witness {
            for input in vin.iter_mut() {
                let item_count = decoder.read_varint()?;
                let item_count =
                    usize::try_from(item_count).map_err(|_| DecodeError::SizeTooLarge)?;
                let mut witness = Vec::with_capacity(item_count);
                for _ in 0..item_count {
                    witness.push(decoder.read_var_bytes()?);
                }
                input.witness = witness;
            }
            if vin.iter().all(|input| input.witness.is_empty()) {
                return Err(DecodeError::InvalidData("witness flag without witness"));
            }
        }

        let lock_time = decoder.read_u32_le()?;
        Ok(Self {
            version,
            time,
            vin,
            vout,
            lock_time,
        })
    }

    pub fn txid(&self) -> Hash256 {
        sha256d(&self.consensus_encode_stripped())
    }

    pub fn wtxid(&self) -> Hash256 {
        sha256d(&self.consensus_encode())
    }

    /// BIP141 weight: stripped size counts four times, witness bytes once.
    pub fn weight(&self) -> usize {
        let stripped = self.consensus_encode_stripped().len();
        let total = self.consensus_encode().len();
        stripped * (WITNESS_SCALE_FACTOR - 1) + total
    }

    /// Virtual size in bytes, rounded up.
    pub fn vsize(&self) -> usize {
        self.weight().div_ceil(WITNESS_SCALE_FACTOR)
    }

    pub fn total_value_out(&self) -> i64 {
        self.vout
            .iter()
            .fold(0i64, |acc, out| acc.saturating_add(out.value))
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}
